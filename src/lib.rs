//! Canopy renders interactive, hierarchical diagrams onto 2D surfaces.
//!
//! The crate turns a mutable diagram model into pixels at interactive rates:
//!
//! 1. **Model**: a domain/view split ([`ViewState`]) holds business facts and visual
//!    state for diagram nodes and edges, with version counters for derived views.
//! 2. **Scene**: a [`SceneGraph`] arena carries the drawable tree; the
//!    [`TransformSystem`] propagates local/world matrices with dirty-flag
//!    invalidation.
//! 3. **Render**: [`render_frame`] culls against the viewport, flattens the tree into
//!    a depth-sorted, type-batched draw list, and draws onto a [`Surface`].
//! 4. **Reflow**: collapsing or expanding a container repositions siblings and
//!    resizes ancestors ([`reflow_siblings`]).
//! 5. **Backends**: a [`RendererRegistry`] selects among registered factories
//!    (hardware-accelerated `gpu` feature vs. the always-available CPU fallback) and
//!    owns per-canvas renderer lifecycles driven by a frame pump.
//!
//! Key design constraints:
//!
//! - **No unsafe**: `unsafe` is forbidden in this crate.
//! - **Single-threaded**: all scene/view mutation happens on one cooperative thread;
//!   shared canvas state is `Rc<RefCell<..>>`, never locked.
//! - **Nothing is fatal**: draw errors are recovered per node, backend failures
//!   surface as an absent renderer, never a crash.

#![forbid(unsafe_code)]

pub mod foundation;
pub mod layout;
pub mod render;
pub mod scene;
pub mod view;

pub use foundation::core::{
    Affine, Canvas, Point, Rect, Rgba8, Size, Stroke, TextAlign, TextBaseline, TextFont, Vec2,
    Viewport,
};
pub use foundation::error::{CanopyError, CanopyResult};
pub use layout::reflow::{
    CollapseBehavior, ReflowLimits, ensure_parent_contains_children, reflow_container,
    reflow_siblings, resize_container_to_fit_children,
};
pub use render::camera::{Camera, fit_to_content};
#[cfg(feature = "gpu")]
pub use render::canvas::GpuRendererFactory;
pub use render::canvas::{
    CanvasShared, CpuRendererFactory, DiagramRenderer, MouseButton, MouseEvent, MouseEventKind,
    SharedCanvas, WheelEvent,
};
pub use render::cpu::CpuSurface;
pub use render::factory::{
    ContextKind, Renderer, RendererConfig, RendererFactory, RendererRegistry, RendererState,
    ViewType,
};
pub use render::frame_loop::{FramePump, ManualDriver, TickDriver, WallClockDriver};
#[cfg(feature = "gpu")]
pub use render::gpu::GpuSurface;
pub use render::pipeline::{RenderStats, render_frame};
pub use render::surface::{DrawCall, RecordingSurface, Surface};
pub use scene::graph::{DrawHook, NodeId, NodeKind, NodeStyle, SceneGraph, SceneNode};
pub use scene::transform::TransformSystem;
pub use view::model::{
    DomainEdge, DomainNode, HEADER_HEIGHT, LayoutNode, ResolvedEdge, ViewEdge, ViewNode, ViewState,
};
