//! The frame pump: one scheduled callback per tick, suspension between frames.
//!
//! The driver is injectable so tests can tick deterministically instead of
//! depending on wall-clock timing.

use std::time::{Duration, Instant};

use tracing::debug;

use crate::render::factory::RendererRegistry;

/// Produces frame ticks. Returning `None` ends the loop.
pub trait TickDriver {
    fn next_tick(&mut self) -> Option<Duration>;
}

/// Real-time driver: sleeps out the remainder of each frame interval. The sleep
/// is the render path's only suspension point.
pub struct WallClockDriver {
    interval: Duration,
    last: Option<Instant>,
}

impl WallClockDriver {
    pub fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: None,
        }
    }

    pub fn at_fps(fps: u32) -> Self {
        let fps = fps.max(1);
        Self::new(Duration::from_secs_f64(1.0 / f64::from(fps)))
    }
}

impl TickDriver for WallClockDriver {
    fn next_tick(&mut self) -> Option<Duration> {
        let now = Instant::now();
        let elapsed = match self.last {
            Some(last) => now.duration_since(last),
            None => self.interval,
        };
        if elapsed < self.interval {
            std::thread::sleep(self.interval - elapsed);
        }
        let after = Instant::now();
        let dt = self.last.map_or(self.interval, |l| after.duration_since(l));
        self.last = Some(after);
        Some(dt)
    }
}

/// Deterministic driver: a fixed number of ticks with a fixed delta, no
/// sleeping. For tests and offline rendering.
pub struct ManualDriver {
    remaining: u32,
    dt: Duration,
}

impl ManualDriver {
    pub fn new(ticks: u32, dt: Duration) -> Self {
        Self {
            remaining: ticks,
            dt,
        }
    }

    pub fn ticks(ticks: u32) -> Self {
        Self::new(ticks, Duration::from_millis(16))
    }
}

impl TickDriver for ManualDriver {
    fn next_tick(&mut self) -> Option<Duration> {
        if self.remaining == 0 {
            return None;
        }
        self.remaining -= 1;
        Some(self.dt)
    }
}

/// Drives every active renderer in a registry: each tick renders the instances
/// that need redraw and yields (via the driver) in between.
pub struct FramePump<D: TickDriver> {
    driver: D,
}

impl<D: TickDriver> FramePump<D> {
    pub fn new(driver: D) -> Self {
        Self { driver }
    }

    /// Run until the driver stops. Returns total frames rendered.
    pub fn run(&mut self, registry: &mut RendererRegistry) -> u64 {
        let mut frames = 0;
        while self.driver.next_tick().is_some() {
            frames += registry.render_dirty();
        }
        debug!(frames, "frame pump stopped");
        frames
    }

    /// Single tick, if the driver still has one.
    pub fn run_once(&mut self, registry: &mut RendererRegistry) -> u64 {
        match self.driver.next_tick() {
            Some(_) => registry.render_dirty(),
            None => 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::foundation::core::{Canvas, Point};
    use crate::render::canvas::{CanvasShared, CpuRendererFactory, WheelEvent};
    use crate::render::factory::{Renderer, RendererConfig, ViewType};
    use crate::view::model::{ViewNode, ViewState};

    fn registry_with_canvas() -> (RendererRegistry, crate::render::canvas::SharedCanvas) {
        let mut view = ViewState::new();
        view.insert_view_node(ViewNode::new("n", 0.0, 0.0, 40.0, 20.0));
        let shared = CanvasShared::shared(view);
        let mut reg = RendererRegistry::new();
        reg.register_factory(Box::new(CpuRendererFactory::default()));
        let cfg = RendererConfig::new(
            "main",
            ViewType::Graph,
            Canvas {
                width: 64,
                height: 64,
            },
        );
        assert!(reg.create_renderer(&cfg, &shared).is_some());
        (reg, shared)
    }

    #[test]
    fn manual_driver_yields_exactly_n_ticks() {
        let mut d = ManualDriver::ticks(3);
        assert!(d.next_tick().is_some());
        assert!(d.next_tick().is_some());
        assert!(d.next_tick().is_some());
        assert!(d.next_tick().is_none());
    }

    #[test]
    fn pump_renders_once_until_marked_dirty_again() {
        let (mut reg, _shared) = registry_with_canvas();
        let mut pump = FramePump::new(ManualDriver::ticks(5));
        // First tick renders the fresh instance; the other four find it clean.
        assert_eq!(pump.run(&mut reg), 1);
    }

    #[test]
    fn interaction_marks_needing_redraw_for_the_next_tick() {
        let (mut reg, _shared) = registry_with_canvas();
        let mut pump = FramePump::new(ManualDriver::ticks(1));
        assert_eq!(pump.run(&mut reg), 1);

        let renderer = reg.get_renderer("main").unwrap();
        renderer.handle_wheel_event(&WheelEvent {
            pos: Point::new(32.0, 32.0),
            delta: -120.0,
        });
        let mut pump = FramePump::new(ManualDriver::ticks(2));
        assert_eq!(pump.run(&mut reg), 1);
    }
}
