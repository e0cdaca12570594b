//! Per-canvas diagram renderer: owns a surface and a retained scene graph, and
//! mirrors the shared view state into it whenever the version counters move.

use std::cell::RefCell;
use std::rc::Rc;

use tracing::debug;

use crate::foundation::core::{Point, Rgba8, Stroke, TextAlign, TextBaseline};
use crate::foundation::error::CanopyResult;
use crate::layout::reflow::CollapseBehavior;
use crate::render::camera::{Camera, fit_to_content};
use crate::render::cpu::CpuSurface;
use crate::render::factory::{
    ContextKind, Renderer, RendererConfig, RendererFactory, RendererState, ViewType,
};
use crate::render::pipeline::{RenderStats, render_frame};
use crate::render::surface::Surface;
use crate::scene::graph::{NodeId, NodeKind, SceneGraph, SceneNode};
use crate::scene::transform::TransformSystem;
use crate::view::model::{ViewNode, ViewState};

const CONTAINER_FILL: Rgba8 = Rgba8::new(34, 42, 58, 235);
const NODE_FILL: Rgba8 = Rgba8::opaque(58, 74, 102);
const NODE_STROKE: Rgba8 = Rgba8::opaque(96, 112, 140);
const SELECTED_STROKE: Rgba8 = Rgba8::opaque(255, 184, 76);
const LABEL_COLOR: Rgba8 = Rgba8::opaque(222, 226, 235);
const EDGE_COLOR: Rgba8 = Rgba8::opaque(130, 140, 155);
/// Inherited edges draw thicker, dashed, and darker than base edges.
const INHERITED_EDGE_COLOR: Rgba8 = Rgba8::opaque(74, 80, 92);
const EDGE_WIDTH: f64 = 1.5;
const INHERITED_EDGE_WIDTH: f64 = 3.0;
const CORNER_RADIUS: f64 = 6.0;
const ZOOM_STEP: f64 = 1.1;

/// Everything multiple canvases may observe about one diagram: entity/selection
/// state, the camera, and the configured collapse behavior.
#[derive(Debug)]
pub struct CanvasShared {
    pub view: ViewState,
    pub camera: Camera,
    pub collapse_behavior: CollapseBehavior,
}

/// Single-threaded shared handle; every canvas renders from the same state.
pub type SharedCanvas = Rc<RefCell<CanvasShared>>;

impl CanvasShared {
    pub fn shared(view: ViewState) -> SharedCanvas {
        Rc::new(RefCell::new(Self {
            view,
            camera: Camera::new(),
            collapse_behavior: CollapseBehavior::default(),
        }))
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseButton {
    Left,
    Right,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MouseEventKind {
    Down,
    Up,
    Move,
}

/// Pointer event in screen coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct MouseEvent {
    pub kind: MouseEventKind,
    pub pos: Point,
    pub button: Option<MouseButton>,
}

impl MouseEvent {
    pub fn down(pos: Point) -> Self {
        Self {
            kind: MouseEventKind::Down,
            pos,
            button: Some(MouseButton::Left),
        }
    }

    pub fn moved(pos: Point) -> Self {
        Self {
            kind: MouseEventKind::Move,
            pos,
            button: None,
        }
    }

    pub fn up(pos: Point) -> Self {
        Self {
            kind: MouseEventKind::Up,
            pos,
            button: Some(MouseButton::Left),
        }
    }
}

/// Wheel event in screen coordinates; positive delta scrolls away (zoom out).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WheelEvent {
    pub pos: Point,
    pub delta: f64,
}

enum Drag {
    Pan { last: Point },
    Node { id: String, last: Point },
}

/// The renderer every backend shares: a [`Surface`] for pixels, a retained
/// [`SceneGraph`] rebuilt when the view-state versions move, and interaction
/// state for pan/drag/select/zoom.
pub struct DiagramRenderer<S: Surface> {
    instance_id: String,
    state: RendererState,
    shared: SharedCanvas,
    surface: S,
    background: Rgba8,
    graph: SceneGraph,
    transforms: TransformSystem,
    root: Option<NodeId>,
    seen_versions: Option<(u64, u64)>,
    needs_redraw: bool,
    debug_overlay: bool,
    drag: Option<Drag>,
    last_stats: RenderStats,
    rebuilds: u64,
}

impl<S: Surface> DiagramRenderer<S> {
    pub fn new(config: &RendererConfig, shared: SharedCanvas, surface: S) -> Self {
        Self {
            instance_id: config.instance_id.clone(),
            state: RendererState::Uninitialized,
            shared,
            surface,
            background: config.background,
            graph: SceneGraph::new(),
            transforms: TransformSystem::new(),
            root: None,
            seen_versions: None,
            needs_redraw: true,
            debug_overlay: false,
            drag: None,
            last_stats: RenderStats::default(),
            rebuilds: 0,
        }
    }

    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    pub fn set_debug_overlay(&mut self, on: bool) {
        self.debug_overlay = on;
        self.needs_redraw = true;
    }

    pub fn last_stats(&self) -> RenderStats {
        self.last_stats
    }

    /// Times the retained scene was rebuilt from view state.
    pub fn rebuild_count(&self) -> u64 {
        self.rebuilds
    }

    pub fn surface_mut(&mut self) -> &mut S {
        &mut self.surface
    }

    /// Frame the whole diagram in the canvas.
    pub fn fit_view_to_content(&mut self) {
        let mut shared = self.shared.borrow_mut();
        if let Some(bounds) = shared.view.content_bounds() {
            shared.camera = fit_to_content(bounds, self.surface.canvas());
            self.needs_redraw = true;
        }
    }

    /// Mirror the shared view state into the retained scene graph: an edge layer
    /// beneath a node subtree, parents before children, one rectangle plus label
    /// per visible view node.
    fn rebuild_scene(&mut self) {
        self.graph = SceneGraph::new();
        self.transforms = TransformSystem::new();
        let root = self.graph.insert(None, SceneNode::group());

        let shared = Rc::clone(&self.shared);
        let shared = shared.borrow();
        let view = &shared.view;

        insert_edge_layer(&mut self.graph, root, view);

        // Nodes live one level below the edge layer, so edges always paint first.
        let nodes_group = self.graph.insert(Some(root), SceneNode::group());
        let roots: Vec<String> = view
            .view_nodes
            .values()
            .filter(|n| n.parent_id.is_none() && n.visible)
            .map(|n| n.id.clone())
            .collect();
        for id in roots {
            insert_view_subtree(&mut self.graph, nodes_group, view, &id, (0.0, 0.0));
        }
        drop(shared);

        self.transforms.mark_dirty(&mut self.graph, root);
        self.root = Some(root);
        self.rebuilds += 1;
        debug!(
            instance = %self.instance_id,
            nodes = self.graph.len(),
            "scene rebuilt from view state"
        );
    }
}

fn insert_edge_layer(graph: &mut SceneGraph, root: NodeId, view: &ViewState) {
    let mut segments: Vec<(Point, Point, bool)> = Vec::new();
    for edge in view.resolved_edges() {
        let (Some(s), Some(t)) = (
            view.view_nodes.get(&edge.source),
            view.view_nodes.get(&edge.target),
        ) else {
            continue;
        };
        let (sx, sy) = s.center();
        let (tx, ty) = t.center();
        segments.push((Point::new(sx, sy), Point::new(tx, ty), edge.inherited));
    }
    if segments.is_empty() {
        return;
    }

    let min_x = segments
        .iter()
        .flat_map(|(a, b, _)| [a.x, b.x])
        .fold(f64::INFINITY, f64::min);
    let min_y = segments
        .iter()
        .flat_map(|(a, b, _)| [a.y, b.y])
        .fold(f64::INFINITY, f64::min);
    let max_x = segments
        .iter()
        .flat_map(|(a, b, _)| [a.x, b.x])
        .fold(f64::NEG_INFINITY, f64::max);
    let max_y = segments
        .iter()
        .flat_map(|(a, b, _)| [a.y, b.y])
        .fold(f64::NEG_INFINITY, f64::max);

    let local: Vec<(Point, Point, bool)> = segments
        .iter()
        .map(|(a, b, inherited)| {
            (
                Point::new(a.x - min_x, a.y - min_y),
                Point::new(b.x - min_x, b.y - min_y),
                *inherited,
            )
        })
        .collect();

    let hook = move |surface: &mut dyn Surface, _node: &SceneNode| -> CanopyResult<()> {
        for (from, to, inherited) in &local {
            let stroke = if *inherited {
                Stroke {
                    color: INHERITED_EDGE_COLOR,
                    width: INHERITED_EDGE_WIDTH,
                    dashed: true,
                }
            } else {
                Stroke::solid(EDGE_COLOR, EDGE_WIDTH)
            };
            surface.stroke_line(*from, *to, &stroke, 1.0)?;
        }
        Ok(())
    };

    let mut layer = SceneNode::new(NodeKind::Custom(Rc::new(hook)));
    layer.x = min_x;
    layer.y = min_y;
    layer.width = (max_x - min_x).max(1.0);
    layer.height = (max_y - min_y).max(1.0);
    graph.insert(Some(root), layer);
}

fn insert_view_subtree(
    graph: &mut SceneGraph,
    parent_scene: NodeId,
    view: &ViewState,
    id: &str,
    parent_origin: (f64, f64),
) {
    let Some(node) = view.view_nodes.get(id) else {
        return;
    };
    if !node.visible {
        return;
    }
    let children = view.children_of(id);
    let is_container = !children.is_empty() || node.collapsed;

    let mut rect = SceneNode::new(NodeKind::Rectangle {
        corner_radius: CORNER_RADIUS,
    });
    rect.x = node.x - parent_origin.0;
    rect.y = node.y - parent_origin.1;
    rect.width = node.width;
    rect.height = node.height;
    rect.style.fill = Some(if is_container { CONTAINER_FILL } else { NODE_FILL });
    rect.style.stroke = Some(if node.selected {
        Stroke::solid(SELECTED_STROKE, 2.5)
    } else {
        Stroke::solid(NODE_STROKE, 1.0)
    });
    let scene_id = graph.insert(Some(parent_scene), rect);

    let mut label = SceneNode::new(NodeKind::Text {
        content: label_for(view, id),
        align: TextAlign::Center,
        baseline: if is_container {
            TextBaseline::Top
        } else {
            TextBaseline::Middle
        },
    });
    label.width = node.width;
    label.height = if is_container {
        crate::view::model::HEADER_HEIGHT.min(node.height)
    } else {
        node.height
    };
    label.style.fill = Some(LABEL_COLOR);
    graph.insert(Some(scene_id), label);

    for child in children {
        insert_view_subtree(graph, scene_id, view, &child, (node.x, node.y));
    }
}

fn label_for(view: &ViewState, id: &str) -> String {
    if let Some(domain) = view.domain_nodes.get(id) {
        if let Some(name) = domain.properties.get("name").and_then(|v| v.as_str()) {
            return name.to_string();
        }
        if let Some(label) = domain.labels.first() {
            return label.clone();
        }
        return domain.kind.clone();
    }
    id.to_string()
}

/// Deepest visible view node whose rect contains the world point.
fn hit_test(view: &ViewState, world: Point) -> Option<String> {
    let mut best: Option<(usize, String)> = None;
    for n in view.view_nodes.values().filter(|n| n.visible) {
        let inside = world.x >= n.x
            && world.x <= n.x + n.width
            && world.y >= n.y
            && world.y <= n.y + n.height;
        if !inside {
            continue;
        }
        let depth = nesting_depth(view, n);
        if best.as_ref().is_none_or(|(d, _)| depth >= *d) {
            best = Some((depth, n.id.clone()));
        }
    }
    best.map(|(_, id)| id)
}

fn nesting_depth(view: &ViewState, node: &ViewNode) -> usize {
    let mut depth = 0;
    let mut cur = node.parent_id.as_deref();
    while let Some(p) = cur {
        depth += 1;
        cur = view.view_nodes.get(p).and_then(|n| n.parent_id.as_deref());
    }
    depth
}

impl<S: Surface> Renderer for DiagramRenderer<S> {
    fn state(&self) -> RendererState {
        self.state
    }

    fn initialize(&mut self) -> CanopyResult<()> {
        if self.state == RendererState::Running {
            return Ok(());
        }
        self.state = RendererState::Initializing;
        self.surface.initialize()?;
        self.state = RendererState::Running;
        self.needs_redraw = true;
        Ok(())
    }

    fn render(&mut self) -> RenderStats {
        if self.state != RendererState::Running {
            return self.last_stats;
        }

        let versions = {
            let shared = self.shared.borrow();
            (shared.view.nodes_version(), shared.view.edges_version())
        };
        if self.root.is_none() || self.seen_versions != Some(versions) {
            self.rebuild_scene();
            self.seen_versions = Some(versions);
        }
        let Some(root) = self.root else {
            return self.last_stats;
        };

        let viewport = {
            let shared = self.shared.borrow();
            shared.camera.viewport(self.surface.canvas())
        };

        let stats = render_frame(
            &mut self.graph,
            &mut self.transforms,
            root,
            &mut self.surface,
            &viewport,
            self.background,
            self.debug_overlay,
        );
        self.last_stats = stats;
        self.needs_redraw = false;
        stats
    }

    fn needs_redraw(&self) -> bool {
        self.state == RendererState::Running && self.needs_redraw
    }

    fn handle_mouse_event(&mut self, event: &MouseEvent) {
        if self.state != RendererState::Running {
            return;
        }
        match event.kind {
            MouseEventKind::Down => {
                if event.button != Some(MouseButton::Left) {
                    return;
                }
                let mut shared = self.shared.borrow_mut();
                let world = shared
                    .camera
                    .viewport(self.surface.canvas())
                    .screen_to_world(event.pos);
                let hit = hit_test(&shared.view, world);
                shared.view.clear_selection();
                match hit {
                    Some(id) => {
                        shared.view.set_selected(&id, true);
                        self.drag = Some(Drag::Node {
                            id,
                            last: event.pos,
                        });
                    }
                    None => {
                        self.drag = Some(Drag::Pan { last: event.pos });
                    }
                }
                self.needs_redraw = true;
            }
            MouseEventKind::Move => match &mut self.drag {
                Some(Drag::Pan { last }) => {
                    let mut shared = self.shared.borrow_mut();
                    shared.camera.pan.x += event.pos.x - last.x;
                    shared.camera.pan.y += event.pos.y - last.y;
                    *last = event.pos;
                    self.needs_redraw = true;
                }
                Some(Drag::Node { id, last }) => {
                    let id = id.clone();
                    let mut shared = self.shared.borrow_mut();
                    let zoom = shared.camera.zoom;
                    let dx = (event.pos.x - last.x) / zoom;
                    let dy = (event.pos.y - last.y) / zoom;
                    shared.view.translate_subtree(&id, dx, dy);
                    *last = event.pos;
                    self.needs_redraw = true;
                }
                None => {}
            },
            MouseEventKind::Up => {
                self.drag = None;
            }
        }
    }

    fn handle_wheel_event(&mut self, event: &WheelEvent) {
        if self.state != RendererState::Running {
            return;
        }
        let factor = if event.delta < 0.0 {
            ZOOM_STEP
        } else {
            1.0 / ZOOM_STEP
        };
        self.shared
            .borrow_mut()
            .camera
            .zoom_about(factor, event.pos);
        self.needs_redraw = true;
    }

    fn frame_rgba8(&mut self) -> CanopyResult<Vec<u8>> {
        self.surface.frame_rgba8()
    }

    fn dispose(&mut self) {
        if self.state == RendererState::Disposed {
            return;
        }
        debug!(instance = %self.instance_id, "disposing renderer");
        self.state = RendererState::Disposed;
        self.graph = SceneGraph::new();
        self.transforms = TransformSystem::new();
        self.root = None;
        self.drag = None;
        self.needs_redraw = false;
    }
}

/// The always-available software factory: supports every view type, so renderer
/// selection can never come up empty.
#[derive(Default)]
pub struct CpuRendererFactory {
    pub font_bytes: Option<Vec<u8>>,
}

impl RendererFactory for CpuRendererFactory {
    fn name(&self) -> &'static str {
        "cpu"
    }

    fn supports_view_type(&self, _view_type: ViewType) -> bool {
        true
    }

    fn accelerated(&self) -> bool {
        false
    }

    fn context_kind(&self) -> ContextKind {
        ContextKind::Pixmap
    }

    fn create(
        &self,
        config: &RendererConfig,
        shared: SharedCanvas,
    ) -> CanopyResult<Box<dyn Renderer>> {
        let surface = CpuSurface::with_font(config.canvas, self.font_bytes.clone())?;
        Ok(Box::new(DiagramRenderer::new(config, shared, surface)))
    }
}

/// Hardware-accelerated factory on vello/wgpu. Device acquisition is deferred to
/// `initialize`, so a failed acquisition surfaces as an absent renderer, not a
/// panic.
#[cfg(feature = "gpu")]
#[derive(Default)]
pub struct GpuRendererFactory {
    pub font_bytes: Option<Vec<u8>>,
}

#[cfg(feature = "gpu")]
impl RendererFactory for GpuRendererFactory {
    fn name(&self) -> &'static str {
        "gpu"
    }

    fn supports_view_type(&self, _view_type: ViewType) -> bool {
        true
    }

    fn accelerated(&self) -> bool {
        true
    }

    fn context_kind(&self) -> ContextKind {
        ContextKind::Wgpu
    }

    fn create(
        &self,
        config: &RendererConfig,
        shared: SharedCanvas,
    ) -> CanopyResult<Box<dyn Renderer>> {
        let surface =
            crate::render::gpu::GpuSurface::with_font(config.canvas, self.font_bytes.clone());
        Ok(Box::new(DiagramRenderer::new(config, shared, surface)))
    }
}
