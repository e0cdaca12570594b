//! Capability-based renderer selection and per-canvas instance lifecycle.
//!
//! Factories register into a table; selection is a priority-ordered filter over
//! that table, never reflection. A software fallback factory supports every view
//! type, so selection always terminates.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::foundation::core::{Canvas, Rgba8};
use crate::foundation::error::CanopyResult;
use crate::render::canvas::{MouseEvent, SharedCanvas, WheelEvent};
use crate::render::pipeline::RenderStats;

/// Lifecycle of one renderer instance.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RendererState {
    Uninitialized,
    Initializing,
    Running,
    Disposed,
}

/// What kind of diagram a canvas shows; factories advertise which they support.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ViewType {
    Graph,
    Tree,
    Timeline,
}

/// Drawing-context capability a caller can request.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ContextKind {
    /// CPU pixmap rasterization.
    Pixmap,
    /// wgpu-backed accelerated context.
    Wgpu,
}

/// Request for one logical canvas.
#[derive(Clone, Debug)]
pub struct RendererConfig {
    pub instance_id: String,
    pub view_type: ViewType,
    pub canvas: Canvas,
    pub background: Rgba8,
    /// Prefer a hardware-accelerated factory when one is registered.
    pub want_accelerated: bool,
    /// Prefer a factory providing this context kind.
    pub want_context: Option<ContextKind>,
}

impl RendererConfig {
    pub fn new(instance_id: impl Into<String>, view_type: ViewType, canvas: Canvas) -> Self {
        Self {
            instance_id: instance_id.into(),
            view_type,
            canvas,
            background: Rgba8::opaque(18, 20, 28),
            want_accelerated: false,
            want_context: None,
        }
    }
}

/// One live renderer bound to a logical canvas.
///
/// `render` performs a single synchronous pass over the shared canvas state;
/// `dispose` releases resources and is idempotent. Event handlers update
/// interaction state and mark the instance as needing redraw.
pub trait Renderer {
    fn state(&self) -> RendererState;
    fn initialize(&mut self) -> CanopyResult<()>;
    fn render(&mut self) -> RenderStats;
    fn needs_redraw(&self) -> bool;
    fn handle_mouse_event(&mut self, event: &MouseEvent);
    fn handle_wheel_event(&mut self, event: &WheelEvent);
    /// Read back the last rendered frame as RGBA8, for offscreen canvases.
    fn frame_rgba8(&mut self) -> CanopyResult<Vec<u8>>;
    fn dispose(&mut self);
}

/// Constructs renderers for the view types and capabilities it advertises.
pub trait RendererFactory {
    fn name(&self) -> &'static str;
    fn supports_view_type(&self, view_type: ViewType) -> bool;
    fn accelerated(&self) -> bool;
    fn context_kind(&self) -> ContextKind;
    fn create(
        &self,
        config: &RendererConfig,
        shared: SharedCanvas,
    ) -> CanopyResult<Box<dyn Renderer>>;
}

/// Owns the factory table and every active renderer instance, at most one per
/// instance id.
#[derive(Default)]
pub struct RendererRegistry {
    factories: Vec<Box<dyn RendererFactory>>,
    active: HashMap<String, Box<dyn Renderer>>,
}

impl RendererRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register_factory(&mut self, factory: Box<dyn RendererFactory>) {
        debug!(factory = factory.name(), "registering renderer factory");
        self.factories.push(factory);
    }

    pub fn factory_count(&self) -> usize {
        self.factories.len()
    }

    pub fn active_count(&self) -> usize {
        self.active.len()
    }

    /// Create (or replace) the renderer for `config.instance_id`.
    ///
    /// Any renderer already registered under the id is disposed first, so at most
    /// one instance per id is ever active. Factory selection priority:
    /// 1. accelerated and providing the requested context kind, when both wanted;
    /// 2. accelerated, when wanted;
    /// 3. providing the requested context kind;
    /// 4. the first supporting factory (unconditional fallback).
    ///
    /// Configuration errors (no supporting factory) and initialization failures
    /// are logged and yield `None`; the failed instance is torn down and no other
    /// factory is retried.
    pub fn create_renderer(
        &mut self,
        config: &RendererConfig,
        shared: &SharedCanvas,
    ) -> Option<&mut dyn Renderer> {
        if let Some(mut old) = self.active.remove(&config.instance_id) {
            debug!(instance = %config.instance_id, "disposing previous renderer for id");
            old.dispose();
        }

        let supporting: Vec<&dyn RendererFactory> = self
            .factories
            .iter()
            .map(AsRef::as_ref)
            .filter(|f| f.supports_view_type(config.view_type))
            .collect();
        if supporting.is_empty() {
            warn!(
                view_type = ?config.view_type,
                "no registered factory supports the requested view type"
            );
            return None;
        }

        let factory = select_factory(&supporting, config);
        debug!(
            factory = factory.name(),
            instance = %config.instance_id,
            accelerated = factory.accelerated(),
            "factory selected"
        );

        let mut renderer = match factory.create(config, shared.clone()) {
            Ok(r) => r,
            Err(err) => {
                warn!(factory = factory.name(), %err, "renderer construction failed");
                return None;
            }
        };
        if let Err(err) = renderer.initialize() {
            warn!(factory = factory.name(), %err, "renderer initialization failed");
            renderer.dispose();
            return None;
        }

        self.active.insert(config.instance_id.clone(), renderer);
        self.active
            .get_mut(&config.instance_id)
            .map(|r| r.as_mut() as &mut dyn Renderer)
    }

    pub fn get_renderer(&mut self, instance_id: &str) -> Option<&mut dyn Renderer> {
        self.active
            .get_mut(instance_id)
            .map(|r| r.as_mut() as &mut dyn Renderer)
    }

    /// Dispose and drop the renderer for `instance_id`. Returns whether one
    /// existed.
    pub fn dispose_renderer(&mut self, instance_id: &str) -> bool {
        match self.active.remove(instance_id) {
            Some(mut renderer) => {
                renderer.dispose();
                true
            }
            None => false,
        }
    }

    pub fn dispose_all(&mut self) {
        for (_, mut renderer) in self.active.drain() {
            renderer.dispose();
        }
    }

    /// Render every active instance that needs it. Returns frames drawn; the
    /// frame pump calls this once per tick.
    pub fn render_dirty(&mut self) -> u64 {
        let mut frames = 0;
        for renderer in self.active.values_mut() {
            if renderer.needs_redraw() {
                renderer.render();
                frames += 1;
            }
        }
        frames
    }
}

fn select_factory<'a>(
    supporting: &[&'a dyn RendererFactory],
    config: &RendererConfig,
) -> &'a dyn RendererFactory {
    if config.want_accelerated
        && let Some(ctx) = config.want_context
        && let Some(f) = supporting
            .iter()
            .find(|f| f.accelerated() && f.context_kind() == ctx)
    {
        return *f;
    }
    if config.want_accelerated
        && let Some(f) = supporting.iter().find(|f| f.accelerated())
    {
        return *f;
    }
    if let Some(ctx) = config.want_context
        && let Some(f) = supporting.iter().find(|f| f.context_kind() == ctx)
    {
        return *f;
    }
    supporting[0]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::render::canvas::CanvasShared;
    use crate::view::model::ViewState;
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    #[derive(Default)]
    struct Probe {
        disposals: Cell<u32>,
        initialized: RefCell<Vec<&'static str>>,
    }

    struct MockRenderer {
        tag: &'static str,
        state: RendererState,
        probe: Rc<Probe>,
        fail_init: bool,
    }

    impl Renderer for MockRenderer {
        fn state(&self) -> RendererState {
            self.state
        }
        fn initialize(&mut self) -> CanopyResult<()> {
            self.state = RendererState::Initializing;
            if self.fail_init {
                return Err(crate::foundation::error::CanopyError::backend(
                    "mock init failure",
                ));
            }
            self.probe.initialized.borrow_mut().push(self.tag);
            self.state = RendererState::Running;
            Ok(())
        }
        fn render(&mut self) -> RenderStats {
            RenderStats::default()
        }
        fn needs_redraw(&self) -> bool {
            false
        }
        fn handle_mouse_event(&mut self, _event: &MouseEvent) {}
        fn handle_wheel_event(&mut self, _event: &WheelEvent) {}
        fn frame_rgba8(&mut self) -> CanopyResult<Vec<u8>> {
            Ok(Vec::new())
        }
        fn dispose(&mut self) {
            if self.state == RendererState::Disposed {
                return;
            }
            self.state = RendererState::Disposed;
            self.probe.disposals.set(self.probe.disposals.get() + 1);
        }
    }

    struct MockFactory {
        tag: &'static str,
        accelerated: bool,
        context: ContextKind,
        only_graph: bool,
        fail_init: bool,
        probe: Rc<Probe>,
    }

    impl RendererFactory for MockFactory {
        fn name(&self) -> &'static str {
            self.tag
        }
        fn supports_view_type(&self, view_type: ViewType) -> bool {
            !self.only_graph || view_type == ViewType::Graph
        }
        fn accelerated(&self) -> bool {
            self.accelerated
        }
        fn context_kind(&self) -> ContextKind {
            self.context
        }
        fn create(
            &self,
            _config: &RendererConfig,
            _shared: SharedCanvas,
        ) -> CanopyResult<Box<dyn Renderer>> {
            Ok(Box::new(MockRenderer {
                tag: self.tag,
                state: RendererState::Uninitialized,
                probe: self.probe.clone(),
                fail_init: self.fail_init,
            }))
        }
    }

    fn fallback(probe: &Rc<Probe>) -> Box<dyn RendererFactory> {
        Box::new(MockFactory {
            tag: "fallback",
            accelerated: false,
            context: ContextKind::Pixmap,
            only_graph: false,
            fail_init: false,
            probe: probe.clone(),
        })
    }

    fn accelerated(probe: &Rc<Probe>) -> Box<dyn RendererFactory> {
        Box::new(MockFactory {
            tag: "accelerated",
            accelerated: true,
            context: ContextKind::Wgpu,
            only_graph: true,
            fail_init: false,
            probe: probe.clone(),
        })
    }

    fn config(id: &str) -> RendererConfig {
        RendererConfig::new(
            id,
            ViewType::Graph,
            Canvas {
                width: 64,
                height: 64,
            },
        )
    }

    fn shared() -> SharedCanvas {
        CanvasShared::shared(ViewState::new())
    }

    #[test]
    fn accelerated_request_prefers_accelerated_factory() {
        let probe = Rc::new(Probe::default());
        let mut reg = RendererRegistry::new();
        reg.register_factory(fallback(&probe));
        reg.register_factory(accelerated(&probe));

        let mut cfg = config("a");
        cfg.want_accelerated = true;
        assert!(reg.create_renderer(&cfg, &shared()).is_some());
        assert_eq!(*probe.initialized.borrow(), vec!["accelerated"]);
    }

    #[test]
    fn fallback_only_registry_satisfies_acceleration_request() {
        let probe = Rc::new(Probe::default());
        let mut reg = RendererRegistry::new();
        reg.register_factory(fallback(&probe));

        let mut cfg = config("a");
        cfg.want_accelerated = true;
        cfg.want_context = Some(ContextKind::Wgpu);
        assert!(reg.create_renderer(&cfg, &shared()).is_some());
        assert_eq!(*probe.initialized.borrow(), vec!["fallback"]);
    }

    #[test]
    fn context_kind_request_routes_past_accelerated() {
        let probe = Rc::new(Probe::default());
        let mut reg = RendererRegistry::new();
        reg.register_factory(accelerated(&probe));
        reg.register_factory(fallback(&probe));

        let mut cfg = config("a");
        cfg.want_context = Some(ContextKind::Pixmap);
        assert!(reg.create_renderer(&cfg, &shared()).is_some());
        assert_eq!(*probe.initialized.borrow(), vec!["fallback"]);
    }

    #[test]
    fn unsupported_view_type_returns_none() {
        let probe = Rc::new(Probe::default());
        let mut reg = RendererRegistry::new();
        reg.register_factory(accelerated(&probe)); // graph only

        let mut cfg = config("a");
        cfg.view_type = ViewType::Timeline;
        assert!(reg.create_renderer(&cfg, &shared()).is_none());
        assert_eq!(reg.active_count(), 0);
    }

    #[test]
    fn double_create_disposes_the_first_exactly_once() {
        let probe = Rc::new(Probe::default());
        let mut reg = RendererRegistry::new();
        reg.register_factory(fallback(&probe));

        let cfg = config("a");
        assert!(reg.create_renderer(&cfg, &shared()).is_some());
        assert_eq!(probe.disposals.get(), 0);
        assert!(reg.create_renderer(&cfg, &shared()).is_some());
        assert_eq!(probe.disposals.get(), 1);
        assert_eq!(reg.active_count(), 1);
        assert_eq!(*probe.initialized.borrow(), vec!["fallback", "fallback"]);
        assert!(reg.get_renderer("a").is_some());
    }

    #[test]
    fn init_failure_tears_down_and_returns_none() {
        let probe = Rc::new(Probe::default());
        let mut reg = RendererRegistry::new();
        reg.register_factory(Box::new(MockFactory {
            tag: "flaky",
            accelerated: false,
            context: ContextKind::Pixmap,
            only_graph: false,
            fail_init: true,
            probe: probe.clone(),
        }));

        assert!(reg.create_renderer(&config("a"), &shared()).is_none());
        assert_eq!(probe.disposals.get(), 1);
        assert!(reg.get_renderer("a").is_none());
    }

    #[test]
    fn dispose_all_clears_every_instance() {
        let probe = Rc::new(Probe::default());
        let mut reg = RendererRegistry::new();
        reg.register_factory(fallback(&probe));
        reg.create_renderer(&config("a"), &shared());
        reg.create_renderer(&config("b"), &shared());
        assert_eq!(reg.active_count(), 2);
        reg.dispose_all();
        assert_eq!(reg.active_count(), 0);
        assert_eq!(probe.disposals.get(), 2);
    }
}
