use std::collections::BTreeMap;

use tracing::debug;

use crate::foundation::core::Size;
use crate::foundation::error::{CanopyError, CanopyResult};

/// Height a container keeps when collapsed (its header strip stays visible).
pub const HEADER_HEIGHT: f64 = 60.0;

/// Business facts for one diagram entity. No visual data lives here.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct DomainNode {
    pub id: String,
    pub kind: String,
    #[serde(default)]
    pub labels: Vec<String>,
    #[serde(default)]
    pub properties: serde_json::Value,
}

/// Business facts for one relationship between domain nodes.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct DomainEdge {
    pub id: String,
    pub source: String,
    pub target: String,
    pub kind: String,
}

/// Visual/layout state for the entity with the same `id` as its [`DomainNode`].
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ViewNode {
    pub id: String,
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub collapsed: bool,
    #[serde(default = "default_true")]
    pub visible: bool,
    #[serde(default)]
    pub selected: bool,
    /// Size before the last collapse; restored on expand, and consulted by reflow to
    /// compute exactly how much space a collapse freed.
    #[serde(default)]
    pub expanded_size: Option<Size>,
}

fn default_true() -> bool {
    true
}

impl ViewNode {
    pub fn new(id: impl Into<String>, x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            id: id.into(),
            x,
            y,
            width,
            height,
            parent_id: None,
            collapsed: false,
            visible: true,
            selected: false,
            expanded_size: None,
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    /// Height the node occupies when expanded, regardless of its current collapse
    /// state.
    pub fn expanded_height(&self) -> f64 {
        self.expanded_size.map_or(self.height, |s| s.height)
    }

    pub fn center(&self) -> (f64, f64) {
        (self.x + self.width / 2.0, self.y + self.height / 2.0)
    }
}

/// Visual edge; endpoints reference *domain* identities, so folding a container
/// never invalidates the true endpoints.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct ViewEdge {
    pub id: String,
    pub source_id: String,
    pub target_id: String,
}

/// A tree of layout records supplied by the external data-transform collaborator.
#[derive(Clone, Debug, serde::Serialize, serde::Deserialize)]
pub struct LayoutNode {
    pub id: String,
    pub width: f64,
    pub height: f64,
    #[serde(default)]
    pub parent_id: Option<String>,
    #[serde(default)]
    pub children: Vec<LayoutNode>,
}

/// A base edge after visibility resolution. When an endpoint is hidden inside a
/// collapsed container it is rerouted to the nearest visible ancestor and the edge
/// is flagged `inherited` (drawn thicker, dashed, darker).
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedEdge {
    pub edge_id: String,
    pub source: String,
    pub target: String,
    pub inherited: bool,
}

/// The shared store for diagram content: domain facts, visual state, and version
/// counters that tell derived views (render lists, resolved edges) to recompute.
#[derive(Clone, Debug, Default, serde::Serialize, serde::Deserialize)]
pub struct ViewState {
    pub domain_nodes: BTreeMap<String, DomainNode>,
    pub domain_edges: BTreeMap<String, DomainEdge>,
    pub view_nodes: BTreeMap<String, ViewNode>,
    pub view_edges: BTreeMap<String, ViewEdge>,
    nodes_version: u64,
    edges_version: u64,
}

impl ViewState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes_version(&self) -> u64 {
        self.nodes_version
    }

    pub fn edges_version(&self) -> u64 {
        self.edges_version
    }

    /// Every mutation of node visual state must route through this.
    pub fn touch_nodes(&mut self) {
        self.nodes_version += 1;
    }

    pub fn touch_edges(&mut self) {
        self.edges_version += 1;
    }

    pub fn insert_domain_node(&mut self, node: DomainNode) {
        self.domain_nodes.insert(node.id.clone(), node);
    }

    pub fn insert_domain_edge(&mut self, edge: DomainEdge) {
        self.domain_edges.insert(edge.id.clone(), edge);
    }

    pub fn insert_view_node(&mut self, node: ViewNode) {
        self.view_nodes.insert(node.id.clone(), node);
        self.touch_nodes();
    }

    pub fn insert_view_edge(&mut self, edge: ViewEdge) {
        self.view_edges.insert(edge.id.clone(), edge);
        self.touch_edges();
    }

    /// Structural invariants: every non-root view node's parent exists.
    pub fn validate(&self) -> CanopyResult<()> {
        for node in self.view_nodes.values() {
            if let Some(parent) = &node.parent_id
                && !self.view_nodes.contains_key(parent)
            {
                return Err(CanopyError::data(format!(
                    "view node '{}' references missing parent '{}'",
                    node.id, parent
                )));
            }
        }
        Ok(())
    }

    /// Build view nodes from a layout tree (sizes come from the collaborator,
    /// positions are assigned later by reflow).
    pub fn ingest_layout(&mut self, roots: &[LayoutNode]) {
        fn walk(state: &mut ViewState, node: &LayoutNode, parent: Option<&str>) {
            let mut view = ViewNode::new(&node.id, 0.0, 0.0, node.width, node.height);
            view.parent_id = node
                .parent_id
                .clone()
                .or_else(|| parent.map(str::to_string));
            state.view_nodes.insert(view.id.clone(), view);
            for child in &node.children {
                walk(state, child, Some(&node.id));
            }
        }
        for root in roots {
            walk(self, root, None);
        }
        self.touch_nodes();
    }

    pub fn move_node(&mut self, id: &str, x: f64, y: f64) {
        if let Some(node) = self.view_nodes.get_mut(id) {
            node.x = x;
            node.y = y;
            self.touch_nodes();
        }
    }

    pub fn resize_node(&mut self, id: &str, width: f64, height: f64) {
        if let Some(node) = self.view_nodes.get_mut(id) {
            node.width = width;
            node.height = height;
            self.touch_nodes();
        }
    }

    /// Move a node and its whole subtree by the same delta (dragging a container
    /// carries its contents).
    pub fn translate_subtree(&mut self, id: &str, dx: f64, dy: f64) {
        if !self.view_nodes.contains_key(id) {
            return;
        }
        let mut targets = self.descendants_of(id);
        targets.push(id.to_string());
        for t in targets {
            if let Some(node) = self.view_nodes.get_mut(&t) {
                node.x += dx;
                node.y += dy;
            }
        }
        self.touch_nodes();
    }

    pub fn set_selected(&mut self, id: &str, selected: bool) {
        if let Some(node) = self.view_nodes.get_mut(id) {
            if node.selected != selected {
                node.selected = selected;
                self.touch_nodes();
            }
        }
    }

    pub fn clear_selection(&mut self) {
        let mut changed = false;
        for node in self.view_nodes.values_mut() {
            changed |= node.selected;
            node.selected = false;
        }
        if changed {
            self.touch_nodes();
        }
    }

    /// Ids of `id`'s direct children, in key order.
    pub fn children_of(&self, id: &str) -> Vec<String> {
        self.view_nodes
            .values()
            .filter(|n| n.parent_id.as_deref() == Some(id))
            .map(|n| n.id.clone())
            .collect()
    }

    /// Ids of every strict descendant of `id`.
    pub fn descendants_of(&self, id: &str) -> Vec<String> {
        let mut out = Vec::new();
        let mut stack = self.children_of(id);
        while let Some(cur) = stack.pop() {
            stack.extend(self.children_of(&cur));
            out.push(cur);
        }
        out
    }

    /// Collapse a container: remember its expanded size, shrink it to the header
    /// strip, hide every strict descendant. No-op when already collapsed.
    pub fn collapse(&mut self, id: &str) {
        let descendants = self.descendants_of(id);
        let Some(node) = self.view_nodes.get_mut(id) else {
            return;
        };
        if node.collapsed {
            return;
        }
        node.collapsed = true;
        node.expanded_size = Some(Size::new(node.width, node.height));
        node.height = HEADER_HEIGHT;
        for d in descendants {
            if let Some(n) = self.view_nodes.get_mut(&d) {
                n.visible = false;
            }
        }
        self.touch_nodes();
    }

    /// Expand a collapsed container: restore its size and reveal descendants down to
    /// (but not through) any nested collapsed container.
    pub fn expand(&mut self, id: &str) {
        let Some(node) = self.view_nodes.get_mut(id) else {
            return;
        };
        if !node.collapsed {
            return;
        }
        node.collapsed = false;
        if let Some(size) = node.expanded_size.take() {
            node.width = size.width;
            node.height = size.height;
        }

        let mut stack = self.children_of(id);
        while let Some(cur) = stack.pop() {
            let Some(n) = self.view_nodes.get_mut(&cur) else {
                continue;
            };
            n.visible = true;
            if !n.collapsed {
                stack.extend(self.children_of(&cur));
            }
        }
        self.touch_nodes();
    }

    /// Nearest visible view node anchoring the domain entity `domain_id`: the node
    /// itself when visible, else the first visible ancestor.
    fn visible_anchor(&self, domain_id: &str) -> Option<&ViewNode> {
        let mut cur = self.view_nodes.get(domain_id)?;
        loop {
            if cur.visible {
                return Some(cur);
            }
            cur = self.view_nodes.get(cur.parent_id.as_deref()?)?;
        }
    }

    /// Resolve every base edge against current visibility.
    ///
    /// Edges with both endpoints visible pass through unchanged; a hidden endpoint
    /// reroutes to its nearest visible ancestor and marks the edge inherited; an
    /// inherited edge collapsing onto itself is dropped, as is any edge with a
    /// missing or fully hidden endpoint (data errors are skipped, not raised).
    pub fn resolved_edges(&self) -> Vec<ResolvedEdge> {
        let mut out = Vec::with_capacity(self.view_edges.len());
        for edge in self.view_edges.values() {
            let Some(source) = self.visible_anchor(&edge.source_id) else {
                debug!(edge = %edge.id, endpoint = %edge.source_id, "edge endpoint unresolvable, skipping");
                continue;
            };
            let Some(target) = self.visible_anchor(&edge.target_id) else {
                debug!(edge = %edge.id, endpoint = %edge.target_id, "edge endpoint unresolvable, skipping");
                continue;
            };

            let inherited = source.id != edge.source_id || target.id != edge.target_id;
            if inherited && source.id == target.id {
                continue;
            }
            out.push(ResolvedEdge {
                edge_id: edge.id.clone(),
                source: source.id.clone(),
                target: target.id.clone(),
                inherited,
            });
        }
        out
    }

    /// Bounding box of all visible view nodes, if any.
    pub fn content_bounds(&self) -> Option<crate::foundation::core::Rect> {
        let mut rect: Option<crate::foundation::core::Rect> = None;
        for n in self.view_nodes.values().filter(|n| n.visible) {
            let r = crate::foundation::core::Rect::new(n.x, n.y, n.x + n.width, n.y + n.height);
            rect = Some(match rect {
                Some(acc) => acc.union(r),
                None => r,
            });
        }
        rect
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// container "box" holding "a" and "b"; "c" outside; edges a->c, a->b, c->box.
    fn folded_fixture() -> ViewState {
        let mut vs = ViewState::new();
        vs.insert_view_node(ViewNode::new("box", 0.0, 0.0, 300.0, 200.0));
        vs.insert_view_node(ViewNode::new("a", 20.0, 20.0, 80.0, 40.0).with_parent("box"));
        vs.insert_view_node(ViewNode::new("b", 20.0, 80.0, 80.0, 40.0).with_parent("box"));
        vs.insert_view_node(ViewNode::new("c", 400.0, 0.0, 80.0, 40.0));
        vs.insert_view_edge(ViewEdge {
            id: "e1".into(),
            source_id: "a".into(),
            target_id: "c".into(),
        });
        vs.insert_view_edge(ViewEdge {
            id: "e2".into(),
            source_id: "a".into(),
            target_id: "b".into(),
        });
        vs.insert_view_edge(ViewEdge {
            id: "e3".into(),
            source_id: "c".into(),
            target_id: "box".into(),
        });
        vs
    }

    #[test]
    fn collapse_hides_strict_descendants() {
        let mut vs = folded_fixture();
        vs.collapse("box");
        assert!(vs.view_nodes["box"].visible);
        assert!(!vs.view_nodes["a"].visible);
        assert!(!vs.view_nodes["b"].visible);
        assert!(vs.view_nodes["c"].visible);
        assert_eq!(vs.view_nodes["box"].height, HEADER_HEIGHT);
    }

    #[test]
    fn expand_restores_size_and_visibility() {
        let mut vs = folded_fixture();
        vs.collapse("box");
        vs.expand("box");
        assert_eq!(vs.view_nodes["box"].height, 200.0);
        assert!(vs.view_nodes["a"].visible);
        assert!(vs.view_nodes["b"].visible);
        assert!(vs.view_nodes["box"].expanded_size.is_none());
    }

    #[test]
    fn expand_stops_at_nested_collapsed_container() {
        let mut vs = ViewState::new();
        vs.insert_view_node(ViewNode::new("outer", 0.0, 0.0, 400.0, 300.0));
        vs.insert_view_node(ViewNode::new("inner", 10.0, 10.0, 200.0, 150.0).with_parent("outer"));
        vs.insert_view_node(ViewNode::new("leaf", 20.0, 20.0, 50.0, 30.0).with_parent("inner"));
        vs.collapse("inner");
        vs.collapse("outer");
        vs.expand("outer");
        assert!(vs.view_nodes["inner"].visible);
        assert!(!vs.view_nodes["leaf"].visible);
    }

    #[test]
    fn folding_reroutes_boundary_edges_and_drops_interior_ones() {
        let mut vs = folded_fixture();
        vs.collapse("box");
        let edges = vs.resolved_edges();

        // a->c becomes box->c, inherited.
        let e1 = edges.iter().find(|e| e.edge_id == "e1").unwrap();
        assert_eq!((e1.source.as_str(), e1.target.as_str()), ("box", "c"));
        assert!(e1.inherited);

        // a->b is interior to the fold: gone.
        assert!(!edges.iter().any(|e| e.edge_id == "e2"));

        // c->box was untouched.
        let e3 = edges.iter().find(|e| e.edge_id == "e3").unwrap();
        assert!(!e3.inherited);
    }

    #[test]
    fn unfolded_edges_pass_through_unchanged() {
        let vs = folded_fixture();
        let edges = vs.resolved_edges();
        assert_eq!(edges.len(), 3);
        assert!(edges.iter().all(|e| !e.inherited));
    }

    #[test]
    fn missing_endpoints_are_skipped_silently() {
        let mut vs = folded_fixture();
        vs.insert_view_edge(ViewEdge {
            id: "dangling".into(),
            source_id: "a".into(),
            target_id: "ghost".into(),
        });
        let edges = vs.resolved_edges();
        assert!(!edges.iter().any(|e| e.edge_id == "dangling"));
    }

    #[test]
    fn versions_increase_monotonically() {
        let mut vs = ViewState::new();
        let v0 = vs.nodes_version();
        vs.insert_view_node(ViewNode::new("n", 0.0, 0.0, 10.0, 10.0));
        let v1 = vs.nodes_version();
        vs.move_node("n", 5.0, 5.0);
        let v2 = vs.nodes_version();
        assert!(v0 < v1 && v1 < v2);
    }

    #[test]
    fn validate_rejects_missing_parent() {
        let mut vs = ViewState::new();
        vs.insert_view_node(ViewNode::new("orphan", 0.0, 0.0, 10.0, 10.0).with_parent("ghost"));
        assert!(vs.validate().is_err());
    }

    #[test]
    fn ingest_layout_builds_parent_links() {
        let mut vs = ViewState::new();
        vs.ingest_layout(&[LayoutNode {
            id: "root".into(),
            width: 100.0,
            height: 100.0,
            parent_id: None,
            children: vec![LayoutNode {
                id: "child".into(),
                width: 40.0,
                height: 20.0,
                parent_id: None,
                children: Vec::new(),
            }],
        }]);
        assert_eq!(vs.view_nodes["child"].parent_id.as_deref(), Some("root"));
        assert!(vs.validate().is_ok());
    }
}
