//! Whole-tree properties of the transform system: composition invariant,
//! transitive dirtying, and coordinate round-trips.

use canopy::{Affine, NodeId, Point, SceneGraph, SceneNode, TransformSystem};

fn approx(a: Point, b: Point) -> bool {
    (a.x - b.x).abs() < 1e-9 && (a.y - b.y).abs() < 1e-9
}

/// root -> a -> b, plus a second root child c, with rotation and non-uniform
/// scale sprinkled in.
fn build_tree() -> (SceneGraph, TransformSystem, Vec<NodeId>) {
    let mut g = SceneGraph::new();
    let mut ts = TransformSystem::new();

    let root = g.insert(None, SceneNode::group().at(50.0, 25.0));

    let mut a = SceneNode::rectangle(120.0, 80.0).at(10.0, 20.0);
    a.rotation = 0.3;
    let a = g.insert(Some(root), a);

    let mut b = SceneNode::rectangle(40.0, 40.0).at(-5.0, 12.0);
    b.scale_x = 2.0;
    b.scale_y = 0.5;
    let b = g.insert(Some(a), b);

    let c = g.insert(Some(root), SceneNode::rectangle(60.0, 60.0).at(300.0, 0.0));

    ts.mark_dirty(&mut g, root);
    (g, ts, vec![root, a, b, c])
}

#[test]
fn world_equals_parent_world_times_local_for_every_node() {
    let (mut g, mut ts, ids) = build_tree();
    ts.update_transforms(&mut g, ids[0]);

    for &id in &ids {
        let node = g.get(id).unwrap();
        let expected = match node.parent() {
            Some(p) => g.get(p).unwrap().world() * node.local(),
            None => node.local(),
        };
        assert_eq!(node.world(), expected, "composition invariant for {id:?}");
        assert!(!node.is_dirty());
    }
}

#[test]
fn marking_a_mid_node_dirties_exactly_its_subtree() {
    let (mut g, mut ts, ids) = build_tree();
    let (root, a, b, c) = (ids[0], ids[1], ids[2], ids[3]);
    ts.update_transforms(&mut g, root);

    ts.mark_dirty(&mut g, a);
    assert!(g.get(a).unwrap().is_dirty());
    assert!(g.get(b).unwrap().is_dirty());
    assert!(!g.get(root).unwrap().is_dirty());
    assert!(!g.get(c).unwrap().is_dirty());

    ts.update_transforms(&mut g, root);
    assert_eq!(ts.dirty_count(), 0);
}

#[test]
fn update_after_moving_a_parent_repositions_descendants() {
    let (mut g, mut ts, ids) = build_tree();
    let (root, a, b, _) = (ids[0], ids[1], ids[2], ids[3]);
    ts.update_transforms(&mut g, root);
    let before = ts.local_to_world(&mut g, b, Point::ZERO);

    ts.translate_node(&mut g, a, 100.0, -30.0);
    ts.update_transforms(&mut g, root);
    let after = ts.local_to_world(&mut g, b, Point::ZERO);

    // b's world position moves by a's delta rotated into root space; with the
    // root unrotated that is exactly (100, -30).
    assert!(approx(after, Point::new(before.x + 100.0, before.y - 30.0)));
}

#[test]
fn roundtrip_through_every_node_within_tolerance() {
    let (mut g, mut ts, ids) = build_tree();
    let samples = [
        Point::ZERO,
        Point::new(17.0, -3.5),
        Point::new(-250.0, 1000.0),
    ];
    for &id in &ids {
        for &p in &samples {
            let there = ts.world_to_local(&mut g, id, p);
            let back = ts.local_to_world(&mut g, id, there);
            assert!(approx(back, p), "roundtrip through {id:?} for {p:?}");
        }
    }
}

#[test]
fn removing_a_subtree_keeps_remaining_matrices_valid() {
    let (mut g, mut ts, ids) = build_tree();
    let (root, a, _b, c) = (ids[0], ids[1], ids[2], ids[3]);
    ts.update_transforms(&mut g, root);

    g.remove(a);
    ts.mark_dirty(&mut g, root);
    ts.update_transforms(&mut g, root);

    let expected = Affine::translate((50.0, 25.0)) * Affine::translate((300.0, 0.0));
    assert_eq!(g.get(c).unwrap().world(), expected);
}
