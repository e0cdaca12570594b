//! Registry lifecycle against the real software factory: selection fallback,
//! instance replacement, disposal, and frame pumping.

use canopy::{
    Canvas, CanvasShared, ContextKind, CpuRendererFactory, FramePump, ManualDriver, Point,
    Renderer, RendererConfig, RendererRegistry, RendererState, SharedCanvas, ViewNode, ViewState,
    ViewType, WheelEvent,
};

fn shared() -> SharedCanvas {
    let mut view = ViewState::new();
    view.insert_view_node(ViewNode::new("n1", 10.0, 10.0, 100.0, 50.0));
    view.insert_view_node(ViewNode::new("n2", 200.0, 10.0, 100.0, 50.0));
    CanvasShared::shared(view)
}

fn registry() -> RendererRegistry {
    let mut reg = RendererRegistry::new();
    reg.register_factory(Box::new(CpuRendererFactory::default()));
    reg
}

fn config(id: &str) -> RendererConfig {
    RendererConfig::new(
        id,
        ViewType::Graph,
        Canvas {
            width: 160,
            height: 120,
        },
    )
}

#[test]
fn acceleration_request_falls_back_to_software() {
    let mut reg = registry();
    let shared = shared();

    let mut cfg = config("a");
    cfg.want_accelerated = true;
    cfg.want_context = Some(ContextKind::Wgpu);

    let renderer = reg.create_renderer(&cfg, &shared).expect("fallback works");
    assert_eq!(renderer.state(), RendererState::Running);
    let stats = renderer.render();
    assert!(stats.nodes_rendered > 0);
}

#[test]
fn recreating_an_instance_replaces_it() {
    let mut reg = registry();
    let shared = shared();

    reg.create_renderer(&config("a"), &shared).unwrap();
    assert_eq!(reg.active_count(), 1);
    reg.create_renderer(&config("a"), &shared).unwrap();
    assert_eq!(reg.active_count(), 1);

    let renderer = reg.get_renderer("a").unwrap();
    assert_eq!(renderer.state(), RendererState::Running);
}

#[test]
fn dispose_renderer_reports_presence() {
    let mut reg = registry();
    let shared = shared();
    reg.create_renderer(&config("a"), &shared).unwrap();

    assert!(reg.dispose_renderer("a"));
    assert!(!reg.dispose_renderer("a"));
    assert!(reg.get_renderer("a").is_none());
}

#[test]
fn two_canvases_share_one_view_state() {
    let mut reg = registry();
    let shared = shared();
    reg.create_renderer(&config("left"), &shared).unwrap();
    reg.create_renderer(&config("right"), &shared).unwrap();
    assert_eq!(reg.active_count(), 2);

    // A model mutation makes both canvases rebuild on their next frame.
    let mut pump = FramePump::new(ManualDriver::ticks(1));
    assert_eq!(pump.run(&mut reg), 2);

    shared.borrow_mut().view.move_node("n1", 50.0, 50.0);
    for id in ["left", "right"] {
        let r = reg.get_renderer(id).unwrap();
        let stats = r.render();
        assert!(stats.nodes_rendered > 0);
    }
}

#[test]
fn pump_runs_only_dirty_instances() {
    let mut reg = registry();
    let shared = shared();
    reg.create_renderer(&config("a"), &shared).unwrap();
    reg.create_renderer(&config("b"), &shared).unwrap();

    let mut pump = FramePump::new(ManualDriver::ticks(1));
    assert_eq!(pump.run(&mut reg), 2);

    // Only "a" gets interacted with; the next tick renders just it.
    reg.get_renderer("a").unwrap().handle_wheel_event(&WheelEvent {
        pos: Point::new(80.0, 60.0),
        delta: -120.0,
    });
    let mut pump = FramePump::new(ManualDriver::ticks(3));
    assert_eq!(pump.run(&mut reg), 1);
}
