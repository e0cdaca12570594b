use std::collections::HashSet;

use crate::foundation::core::{Affine, Point};
use crate::scene::graph::{NodeId, SceneGraph};

/// Determinants below this are treated as singular when inverting.
const SINGULAR_EPS: f64 = 1e-12;

/// Propagates local/world matrices through a [`SceneGraph`] with dirty-flag
/// invalidation.
///
/// The dirty set is owned by the system instance (one per graph); it mirrors the
/// per-node `dirty` flags and lets [`update_transforms`] bail out in O(1) on clean
/// frames.
///
/// [`update_transforms`]: TransformSystem::update_transforms
#[derive(Debug, Default)]
pub struct TransformSystem {
    dirty: HashSet<NodeId>,
}

impl TransformSystem {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn dirty_count(&self) -> usize {
        self.dirty.len()
    }

    /// Mark `id` and, transitively, every descendant as needing matrix recompute.
    ///
    /// Idempotent: a node that is already dirty implies its descendants are too, so
    /// the walk stops there.
    pub fn mark_dirty(&mut self, graph: &mut SceneGraph, id: NodeId) {
        let mut stack = vec![id];
        // The root of the request is re-marked even if clean children were attached
        // under an already-dirty node; descent still prunes on dirty nodes below.
        let mut first = true;
        while let Some(cur) = stack.pop() {
            let Some(node) = graph.get_mut(cur) else {
                continue;
            };
            if node.dirty && !first {
                continue;
            }
            first = false;
            node.dirty = true;
            self.dirty.insert(cur);
            stack.extend(node.children().iter().copied());
        }
    }

    /// Recompute every stale matrix under `root`, parents before children.
    ///
    /// No-op when the dirty set is empty. Local matrices compose in the fixed order
    /// translate → rotate → scale; world matrices compose parent-first. Flags and the
    /// dirty set are cleared as the walk proceeds.
    pub fn update_transforms(&mut self, graph: &mut SceneGraph, root: NodeId) {
        if self.dirty.is_empty() {
            return;
        }

        let parent_world = match graph.get(root).and_then(|n| n.parent()) {
            Some(p) => self.world_matrix(graph, p),
            None => Affine::IDENTITY,
        };

        let mut stack = vec![(root, parent_world)];
        while let Some((id, parent_world)) = stack.pop() {
            let Some(node) = graph.get_mut(id) else {
                continue;
            };
            if node.dirty {
                node.local = local_matrix(node.x, node.y, node.rotation, node.scale_x, node.scale_y);
                node.world = parent_world * node.local;
                node.dirty = false;
                self.dirty.remove(&id);
            }
            let world = node.world;
            stack.extend(node.children().iter().map(|c| (*c, world)));
        }

        // Ids of nodes removed while dirty would otherwise pin the set non-empty.
        self.dirty.retain(|id| graph.contains(*id));
    }

    /// Current world matrix for `id`, lazily forcing stale ancestors first so a
    /// direct lookup never observes a child computed before its parent.
    pub fn world_matrix(&mut self, graph: &mut SceneGraph, id: NodeId) -> Affine {
        // Collect the parent chain, then recompute top-down from the highest stale
        // ancestor.
        let mut chain = Vec::new();
        let mut cur = Some(id);
        while let Some(c) = cur {
            chain.push(c);
            cur = graph.get(c).and_then(|n| n.parent());
        }

        let mut world = Affine::IDENTITY;
        for &ancestor in chain.iter().rev() {
            let Some(node) = graph.get_mut(ancestor) else {
                continue;
            };
            if node.dirty {
                node.local = local_matrix(node.x, node.y, node.rotation, node.scale_x, node.scale_y);
                node.world = world * node.local;
                node.dirty = false;
                self.dirty.remove(&ancestor);
                // Children other than the one on our chain stay dirty; the flag was
                // already propagated to them by mark_dirty.
            }
            world = node.world;
        }
        world
    }

    /// Map a point from `id`'s local space to world space.
    pub fn local_to_world(&mut self, graph: &mut SceneGraph, id: NodeId, p: Point) -> Point {
        self.world_matrix(graph, id) * p
    }

    /// Map a world-space point into `id`'s local space.
    ///
    /// A singular world matrix (for example zero scale) has no inverse; the identity
    /// is used instead and the point comes back untransformed.
    pub fn world_to_local(&mut self, graph: &mut SceneGraph, id: NodeId, p: Point) -> Point {
        let world = self.world_matrix(graph, id);
        safe_inverse(world) * p
    }

    /// Translate `id` by `(dx, dy)` in its parent's space.
    pub fn translate_node(&mut self, graph: &mut SceneGraph, id: NodeId, dx: f64, dy: f64) {
        if let Some(node) = graph.get_mut(id) {
            node.x += dx;
            node.y += dy;
        }
        self.mark_dirty(graph, id);
    }

    /// Multiply `id`'s scale by `(sx, sy)`, optionally about a pivot expressed in the
    /// parent's space. The pivot is absorbed algebraically into x/y rather than via a
    /// temporary matrix stack.
    pub fn scale_node(
        &mut self,
        graph: &mut SceneGraph,
        id: NodeId,
        sx: f64,
        sy: f64,
        origin: Option<Point>,
    ) {
        if let Some(node) = graph.get_mut(id) {
            node.scale_x *= sx;
            node.scale_y *= sy;
            if let Some(o) = origin {
                node.x = o.x + (node.x - o.x) * sx;
                node.y = o.y + (node.y - o.y) * sy;
            }
        }
        self.mark_dirty(graph, id);
    }

    /// Add `angle` (radians) to `id`'s rotation, optionally orbiting a pivot
    /// expressed in the parent's space.
    pub fn rotate_node(
        &mut self,
        graph: &mut SceneGraph,
        id: NodeId,
        angle: f64,
        origin: Option<Point>,
    ) {
        if let Some(node) = graph.get_mut(id) {
            node.rotation += angle;
            if let Some(o) = origin {
                let (sin, cos) = angle.sin_cos();
                let dx = node.x - o.x;
                let dy = node.y - o.y;
                node.x = o.x + dx * cos - dy * sin;
                node.y = o.y + dx * sin + dy * cos;
            }
        }
        self.mark_dirty(graph, id);
    }
}

/// translate → rotate → scale, the one composition order used everywhere.
pub(crate) fn local_matrix(x: f64, y: f64, rotation: f64, sx: f64, sy: f64) -> Affine {
    Affine::translate((x, y)) * Affine::rotate(rotation) * Affine::scale_non_uniform(sx, sy)
}

pub(crate) fn safe_inverse(a: Affine) -> Affine {
    if a.determinant().abs() < SINGULAR_EPS {
        Affine::IDENTITY
    } else {
        a.inverse()
    }
}
