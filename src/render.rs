pub mod camera;
pub mod canvas;
pub mod cpu;
pub mod factory;
pub mod frame_loop;
#[cfg(feature = "gpu")]
pub mod gpu;
pub mod pipeline;
pub mod surface;
