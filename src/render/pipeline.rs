//! The per-frame render pipeline: clear, update transforms, cull, batch, draw.

use std::time::Instant;

use tracing::warn;

use crate::foundation::core::{Affine, Point, Rect, Rgba8, TextAlign, TextBaseline, Viewport};
use crate::foundation::error::CanopyResult;
use crate::render::surface::Surface;
use crate::scene::graph::{NodeId, NodeKind, SceneGraph, SceneNode};
use crate::scene::transform::TransformSystem;

/// Per-frame counters returned by [`render_frame`].
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RenderStats {
    pub nodes_rendered: u64,
    pub nodes_culled: u64,
    pub render_time_ms: f64,
}

/// One culled, flattened draw entry: the node with its precomputed world matrix.
struct DrawEntry {
    id: NodeId,
    world: Affine,
    depth: u32,
}

/// Draw the tree under `root` onto `surface`.
///
/// Steps, in order: clear to `background`; recompute stale matrices; collect a flat
/// list of every node that passes viewport culling; sort by depth (ties broken by
/// node kind so like draw calls batch together); draw each entry with its world
/// matrix composed onto the viewport transform — no nested save/restore. With
/// `debug` set, a frame-stats overlay is drawn in screen space at the end.
///
/// A draw error on a single node is logged and skipped; the frame always
/// completes.
pub fn render_frame(
    graph: &mut SceneGraph,
    transforms: &mut TransformSystem,
    root: NodeId,
    surface: &mut dyn Surface,
    viewport: &Viewport,
    background: Rgba8,
    debug: bool,
) -> RenderStats {
    let start = Instant::now();
    let mut stats = RenderStats::default();

    surface.clear(background);
    transforms.update_transforms(graph, root);

    let view_affine = viewport.to_affine();
    let visible_world = viewport.world_rect();

    // Cull and flatten. A node whose own bounds miss the viewport is not drawn,
    // but traversal still descends: children carry independent local offsets that
    // can land them back inside the viewport.
    let mut entries: Vec<DrawEntry> = Vec::new();
    let mut stack: Vec<(NodeId, u32)> = vec![(root, 0)];
    while let Some((id, depth)) = stack.pop() {
        let Some(node) = graph.get(id) else {
            continue;
        };
        if !node.visible {
            continue;
        }
        // Reversed push so siblings pop in insertion order and the stable sort
        // keeps their paint order.
        for child in node.children().iter().rev() {
            stack.push((*child, depth + 1));
        }
        if matches!(node.kind, NodeKind::Group) {
            continue;
        }

        let world = node.world();
        let world_bounds = world.transform_rect_bbox(node.local_bounds());
        if !rects_intersect(world_bounds, visible_world) {
            stats.nodes_culled += 1;
            continue;
        }
        entries.push(DrawEntry { id, world, depth });
    }

    entries.sort_by_key(|e| (e.depth, kind_rank(graph, e.id)));

    for entry in &entries {
        let Some(node) = graph.get(entry.id) else {
            continue;
        };
        surface.set_transform(view_affine * entry.world);
        if let Err(err) = draw_node(surface, node) {
            warn!(node = entry.id.index(), %err, "node draw failed, skipping");
            continue;
        }
        stats.nodes_rendered += 1;
    }

    stats.render_time_ms = start.elapsed().as_secs_f64() * 1000.0;

    if debug {
        draw_debug_overlay(surface, &stats);
    }
    stats
}

fn kind_rank(graph: &SceneGraph, id: NodeId) -> u8 {
    match graph.get(id).map(|n| &n.kind) {
        Some(NodeKind::Rectangle { .. }) => 0,
        Some(NodeKind::Custom(_)) => 1,
        Some(NodeKind::Text { .. }) => 2,
        _ => 3,
    }
}

fn rects_intersect(a: Rect, b: Rect) -> bool {
    a.x0 < b.x1 && a.x1 > b.x0 && a.y0 < b.y1 && a.y1 > b.y0
}

fn draw_node(surface: &mut dyn Surface, node: &SceneNode) -> CanopyResult<()> {
    let opacity = node.style.opacity;
    match &node.kind {
        NodeKind::Rectangle { corner_radius } => {
            let rect = node.local_bounds();
            if let Some(fill) = node.style.fill {
                surface.fill_rect(rect, *corner_radius, fill, opacity)?;
            }
            if let Some(stroke) = &node.style.stroke {
                surface.stroke_rect(rect, *corner_radius, stroke, opacity)?;
            }
            Ok(())
        }
        NodeKind::Text {
            content,
            align,
            baseline,
        } => {
            let size = surface.measure_text(content, &node.style.font);
            let origin = text_anchor(node, *align, *baseline, size.width, size.height);
            let color = node.style.fill.unwrap_or(Rgba8::BLACK);
            surface.fill_text(content, origin, &node.style.font, color, opacity)?;
            if let Some(stroke) = &node.style.stroke {
                surface.stroke_text(content, origin, &node.style.font, stroke, opacity)?;
            }
            Ok(())
        }
        NodeKind::Group => Ok(()),
        NodeKind::Custom(hook) => hook(surface, node),
    }
}

/// Top-left origin of the text box inside the node's bounds for the requested
/// alignment and baseline.
fn text_anchor(
    node: &SceneNode,
    align: TextAlign,
    baseline: TextBaseline,
    text_width: f64,
    text_height: f64,
) -> Point {
    let x = match align {
        TextAlign::Left => 0.0,
        TextAlign::Center => (node.width - text_width) / 2.0,
        TextAlign::Right => node.width - text_width,
    };
    let y = match baseline {
        TextBaseline::Top => 0.0,
        TextBaseline::Middle => (node.height - text_height) / 2.0,
        TextBaseline::Bottom => node.height - text_height,
    };
    Point::new(x, y)
}

fn draw_debug_overlay(surface: &mut dyn Surface, stats: &RenderStats) {
    surface.set_transform(Affine::IDENTITY);
    let line = format!(
        "drawn {} | culled {} | {:.2} ms",
        stats.nodes_rendered, stats.nodes_culled, stats.render_time_ms
    );
    let font = crate::foundation::core::TextFont {
        family: "sans-serif".to_string(),
        size_px: 12.0,
    };
    if let Err(err) = surface.fill_text(&line, Point::new(8.0, 8.0), &font, Rgba8::WHITE, 1.0) {
        warn!(%err, "debug overlay draw failed");
    }
}
