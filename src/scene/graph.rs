use std::rc::Rc;

use crate::foundation::core::{Affine, Rect, Rgba8, Stroke, TextAlign, TextBaseline, TextFont};
use crate::foundation::error::CanopyResult;
use crate::render::surface::Surface;

/// Stable index of a node inside a [`SceneGraph`] arena.
///
/// Ids are never reused while the node is alive; removing a subtree frees its slots
/// for later inserts.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(pub(crate) u32);

impl NodeId {
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Custom draw hook: called with the surface already carrying the node's compound
/// world transform. Single-threaded by design, hence `Rc`.
pub type DrawHook = Rc<dyn Fn(&mut dyn Surface, &SceneNode) -> CanopyResult<()>>;

/// What a node draws, dispatched by a single `match` in the pipeline.
#[derive(Clone)]
pub enum NodeKind {
    Rectangle {
        corner_radius: f64,
    },
    Text {
        content: String,
        align: TextAlign,
        baseline: TextBaseline,
    },
    Group,
    Custom(DrawHook),
}

impl std::fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Rectangle { corner_radius } => f
                .debug_struct("Rectangle")
                .field("corner_radius", corner_radius)
                .finish(),
            Self::Text {
                content,
                align,
                baseline,
            } => f
                .debug_struct("Text")
                .field("content", content)
                .field("align", align)
                .field("baseline", baseline)
                .finish(),
            Self::Group => f.write_str("Group"),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

#[derive(Clone, Debug)]
pub struct NodeStyle {
    pub fill: Option<Rgba8>,
    pub stroke: Option<Stroke>,
    pub opacity: f64,
    pub font: TextFont,
}

impl Default for NodeStyle {
    fn default() -> Self {
        Self {
            fill: None,
            stroke: None,
            opacity: 1.0,
            font: TextFont::default(),
        }
    }
}

/// One element of the drawable tree.
///
/// `x`/`y`/`scale_*`/`rotation` are the authoritative transform inputs; `local` and
/// `world` are caches kept consistent by the [`TransformSystem`]
/// (`dirty == false` implies both match the inputs).
///
/// [`TransformSystem`]: crate::scene::transform::TransformSystem
#[derive(Clone, Debug)]
pub struct SceneNode {
    pub(crate) parent: Option<NodeId>,
    pub(crate) children: Vec<NodeId>,

    pub x: f64,
    pub y: f64,
    pub scale_x: f64,
    pub scale_y: f64,
    /// Radians, clockwise in screen space.
    pub rotation: f64,

    pub width: f64,
    pub height: f64,

    pub style: NodeStyle,
    pub visible: bool,
    pub kind: NodeKind,

    pub(crate) dirty: bool,
    pub(crate) local: Affine,
    pub(crate) world: Affine,
}

impl SceneNode {
    pub fn new(kind: NodeKind) -> Self {
        Self {
            parent: None,
            children: Vec::new(),
            x: 0.0,
            y: 0.0,
            scale_x: 1.0,
            scale_y: 1.0,
            rotation: 0.0,
            width: 0.0,
            height: 0.0,
            style: NodeStyle::default(),
            visible: true,
            kind,
            dirty: true,
            local: Affine::IDENTITY,
            world: Affine::IDENTITY,
        }
    }

    pub fn rectangle(width: f64, height: f64) -> Self {
        let mut n = Self::new(NodeKind::Rectangle { corner_radius: 0.0 });
        n.width = width;
        n.height = height;
        n
    }

    pub fn text(content: impl Into<String>) -> Self {
        Self::new(NodeKind::Text {
            content: content.into(),
            align: TextAlign::default(),
            baseline: TextBaseline::default(),
        })
    }

    pub fn group() -> Self {
        Self::new(NodeKind::Group)
    }

    pub fn at(mut self, x: f64, y: f64) -> Self {
        self.x = x;
        self.y = y;
        self
    }

    pub fn with_fill(mut self, fill: Rgba8) -> Self {
        self.style.fill = Some(fill);
        self
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    /// Local-space bounding rect, origin at the node's top-left corner.
    pub fn local_bounds(&self) -> Rect {
        Rect::new(0.0, 0.0, self.width, self.height)
    }

    pub fn is_dirty(&self) -> bool {
        self.dirty
    }

    /// Cached world matrix. Only meaningful when the node is clean; use
    /// [`TransformSystem::world_matrix`] to force recomputation first.
    ///
    /// [`TransformSystem::world_matrix`]: crate::scene::transform::TransformSystem::world_matrix
    pub fn world(&self) -> Affine {
        self.world
    }

    pub fn local(&self) -> Affine {
        self.local
    }
}

/// Arena-backed drawable tree: a flat vector of node slots, parent back-references
/// for lookup, child lists for ownership. Removing a node removes its whole subtree.
#[derive(Clone, Debug, Default)]
pub struct SceneGraph {
    slots: Vec<Option<SceneNode>>,
    free: Vec<u32>,
}

impl SceneGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of live nodes.
    pub fn len(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.slots.get(id.index()).is_some_and(|s| s.is_some())
    }

    pub fn get(&self, id: NodeId) -> Option<&SceneNode> {
        self.slots.get(id.index()).and_then(|s| s.as_ref())
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut SceneNode> {
        self.slots.get_mut(id.index()).and_then(|s| s.as_mut())
    }

    /// Insert `node` under `parent` (or as a root when `parent` is `None`).
    pub fn insert(&mut self, parent: Option<NodeId>, mut node: SceneNode) -> NodeId {
        node.parent = parent.filter(|p| self.contains(*p));
        node.children.clear();
        node.dirty = true;

        let id = match self.free.pop() {
            Some(slot) => {
                self.slots[slot as usize] = Some(node);
                NodeId(slot)
            }
            None => {
                self.slots.push(Some(node));
                NodeId((self.slots.len() - 1) as u32)
            }
        };

        if let Some(p) = id_parent(self, id)
            && let Some(parent_node) = self.get_mut(p)
        {
            parent_node.children.push(id);
        }
        id
    }

    /// Remove `id` and every descendant. A missing id is a no-op.
    pub fn remove(&mut self, id: NodeId) {
        let Some(node) = self.get(id) else {
            return;
        };
        let parent = node.parent;

        let mut stack = vec![id];
        while let Some(cur) = stack.pop() {
            if let Some(node) = self.slots.get_mut(cur.index()).and_then(Option::take) {
                stack.extend(node.children.iter().copied());
                self.free.push(cur.0);
            }
        }

        if let Some(p) = parent
            && let Some(parent_node) = self.get_mut(p)
        {
            parent_node.children.retain(|c| *c != id);
        }
    }

    /// Move `id` under `new_parent` (or to root level with `None`).
    ///
    /// Rejected when it would create a cycle (`new_parent` inside `id`'s subtree) or
    /// when either id is missing.
    pub fn reparent(&mut self, id: NodeId, new_parent: Option<NodeId>) -> bool {
        if !self.contains(id) {
            return false;
        }
        if let Some(np) = new_parent {
            if !self.contains(np) || np == id || self.is_ancestor(id, np) {
                return false;
            }
        }

        let old_parent = self.get(id).and_then(SceneNode::parent);
        if let Some(p) = old_parent
            && let Some(parent_node) = self.get_mut(p)
        {
            parent_node.children.retain(|c| *c != id);
        }
        if let Some(np) = new_parent
            && let Some(parent_node) = self.get_mut(np)
        {
            parent_node.children.push(id);
        }
        if let Some(node) = self.get_mut(id) {
            node.parent = new_parent;
            node.dirty = true;
        }
        true
    }

    /// True when `ancestor` lies on `id`'s parent chain (strictly above it).
    pub fn is_ancestor(&self, ancestor: NodeId, id: NodeId) -> bool {
        let mut cur = self.get(id).and_then(SceneNode::parent);
        while let Some(c) = cur {
            if c == ancestor {
                return true;
            }
            cur = self.get(c).and_then(SceneNode::parent);
        }
        false
    }

    /// Iterate live node ids in slot order.
    pub fn ids(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.slots
            .iter()
            .enumerate()
            .filter_map(|(i, s)| s.as_ref().map(|_| NodeId(i as u32)))
    }
}

fn id_parent(graph: &SceneGraph, id: NodeId) -> Option<NodeId> {
    graph.get(id).and_then(SceneNode::parent)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tree() -> (SceneGraph, NodeId, NodeId, NodeId) {
        let mut g = SceneGraph::new();
        let root = g.insert(None, SceneNode::group());
        let a = g.insert(Some(root), SceneNode::rectangle(10.0, 10.0));
        let b = g.insert(Some(a), SceneNode::rectangle(5.0, 5.0));
        (g, root, a, b)
    }

    #[test]
    fn insert_links_parent_and_children() {
        let (g, root, a, b) = tree();
        assert_eq!(g.get(a).unwrap().parent(), Some(root));
        assert_eq!(g.get(root).unwrap().children(), &[a]);
        assert_eq!(g.get(a).unwrap().children(), &[b]);
        assert_eq!(g.len(), 3);
    }

    #[test]
    fn remove_destroys_subtree() {
        let (mut g, root, a, b) = tree();
        g.remove(a);
        assert!(g.contains(root));
        assert!(!g.contains(a));
        assert!(!g.contains(b));
        assert!(g.get(root).unwrap().children().is_empty());
        assert_eq!(g.len(), 1);
    }

    #[test]
    fn removed_slots_are_reused() {
        let (mut g, _root, a, _b) = tree();
        g.remove(a);
        let c = g.insert(None, SceneNode::group());
        assert!(c.index() < 3);
    }

    #[test]
    fn reparent_rejects_cycles() {
        let (mut g, root, a, b) = tree();
        assert!(!g.reparent(a, Some(b)));
        assert!(!g.reparent(root, Some(b)));
        assert!(g.reparent(b, Some(root)));
        assert_eq!(g.get(b).unwrap().parent(), Some(root));
        assert_eq!(g.get(root).unwrap().children(), &[a, b]);
    }

    #[test]
    fn reparent_to_root_detaches() {
        let (mut g, _root, a, b) = tree();
        assert!(g.reparent(b, None));
        assert_eq!(g.get(b).unwrap().parent(), None);
        assert!(g.get(a).unwrap().children().is_empty());
    }
}
