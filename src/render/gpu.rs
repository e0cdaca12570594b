//! Hardware-accelerated drawing surface: vello scenes rendered through wgpu into
//! an offscreen texture, read back as RGBA8.
//!
//! Device acquisition happens in [`Surface::initialize`]; construction is cheap
//! and never touches the GPU, so factory selection can build an instance before
//! committing.

use kurbo::Shape;
use tracing::debug;

use crate::foundation::core::{
    Affine, Canvas, Point, Rect, Rgba8, Size, Stroke, TextFont,
};
use crate::foundation::error::{CanopyError, CanopyResult};
use crate::render::cpu::{TextBrush, TextEngine};
use crate::render::surface::Surface;

struct GpuContext {
    device: vello::wgpu::Device,
    queue: vello::wgpu::Queue,
    renderer: vello::Renderer,
    texture: vello::wgpu::Texture,
    view: vello::wgpu::TextureView,
    readback: vello::wgpu::Buffer,
    readback_bytes_per_row: u32,
}

/// GPU [`Surface`] accumulating into a `vello::Scene`, flushed to pixels by
/// [`GpuSurface::to_rgba8`].
pub struct GpuSurface {
    canvas: Canvas,
    scene: vello::Scene,
    transform: Affine,
    text: TextEngine,
    base_color: Rgba8,
    ctx: Option<GpuContext>,
}

impl GpuSurface {
    pub fn new(canvas: Canvas) -> Self {
        Self::with_font(canvas, None)
    }

    pub fn with_font(canvas: Canvas, font_bytes: Option<Vec<u8>>) -> Self {
        Self {
            canvas,
            scene: vello::Scene::new(),
            transform: Affine::IDENTITY,
            text: TextEngine::new(font_bytes),
            base_color: Rgba8::TRANSPARENT,
            ctx: None,
        }
    }

    fn acquire_context(canvas: Canvas) -> CanopyResult<GpuContext> {
        let instance = vello::wgpu::Instance::new(&vello::wgpu::InstanceDescriptor::default());
        let adapter = pollster::block_on(instance.request_adapter(
            &vello::wgpu::RequestAdapterOptions {
                power_preference: vello::wgpu::PowerPreference::HighPerformance,
                compatible_surface: None,
                force_fallback_adapter: false,
            },
        ))
        .map_err(|e| match e {
            vello::wgpu::RequestAdapterError::NotFound { .. } => {
                CanopyError::backend("no gpu adapter available")
            }
            other => CanopyError::backend(format!("wgpu request_adapter failed: {other:?}")),
        })?;

        let (device, queue) =
            pollster::block_on(adapter.request_device(&vello::wgpu::DeviceDescriptor {
                label: None,
                required_features: vello::wgpu::Features::empty(),
                required_limits: vello::wgpu::Limits::default(),
                experimental_features: vello::wgpu::ExperimentalFeatures::default(),
                memory_hints: vello::wgpu::MemoryHints::Performance,
                trace: vello::wgpu::Trace::Off,
            }))
            .map_err(|e| CanopyError::backend(format!("wgpu request_device failed: {e:?}")))?;

        let renderer = vello::Renderer::new(&device, vello::RendererOptions::default())
            .map_err(|e| CanopyError::backend(format!("vello renderer init failed: {e:?}")))?;

        let texture = device.create_texture(&vello::wgpu::TextureDescriptor {
            label: Some("canopy_target"),
            size: vello::wgpu::Extent3d {
                width: canvas.width,
                height: canvas.height,
                depth_or_array_layers: 1,
            },
            mip_level_count: 1,
            sample_count: 1,
            dimension: vello::wgpu::TextureDimension::D2,
            format: vello::wgpu::TextureFormat::Rgba8Unorm,
            usage: vello::wgpu::TextureUsages::STORAGE_BINDING
                | vello::wgpu::TextureUsages::TEXTURE_BINDING
                | vello::wgpu::TextureUsages::RENDER_ATTACHMENT
                | vello::wgpu::TextureUsages::COPY_SRC,
            view_formats: &[],
        });
        let view = texture.create_view(&vello::wgpu::TextureViewDescriptor::default());

        let bytes_per_row_unpadded = canvas
            .width
            .checked_mul(4)
            .ok_or_else(|| CanopyError::backend("render target width overflow"))?;
        let bytes_per_row = align_to(
            bytes_per_row_unpadded,
            vello::wgpu::COPY_BYTES_PER_ROW_ALIGNMENT,
        );
        let buffer_size = (bytes_per_row as u64)
            .checked_mul(u64::from(canvas.height))
            .ok_or_else(|| CanopyError::backend("readback buffer size overflow"))?;
        let readback = device.create_buffer(&vello::wgpu::BufferDescriptor {
            label: Some("canopy_readback"),
            size: buffer_size,
            usage: vello::wgpu::BufferUsages::MAP_READ | vello::wgpu::BufferUsages::COPY_DST,
            mapped_at_creation: false,
        });

        Ok(GpuContext {
            device,
            queue,
            renderer,
            texture,
            view,
            readback,
            readback_bytes_per_row: bytes_per_row,
        })
    }

    /// Render the accumulated scene and read the target texture back as tightly
    /// packed premultiplied RGBA8.
    pub fn to_rgba8(&mut self) -> CanopyResult<Vec<u8>> {
        let ctx = self
            .ctx
            .as_mut()
            .ok_or_else(|| CanopyError::backend("gpu surface not initialized"))?;

        let bg = self.base_color;
        ctx.renderer
            .render_to_texture(
                &ctx.device,
                &ctx.queue,
                &self.scene,
                &ctx.view,
                &vello::RenderParams {
                    base_color: vello::peniko::Color::from_rgba8(bg.r, bg.g, bg.b, bg.a),
                    width: self.canvas.width,
                    height: self.canvas.height,
                    antialiasing_method: vello::AaConfig::Area,
                },
            )
            .map_err(|e| CanopyError::backend(format!("vello render failed: {e:?}")))?;

        let mut encoder = ctx
            .device
            .create_command_encoder(&vello::wgpu::CommandEncoderDescriptor {
                label: Some("canopy_readback_encoder"),
            });
        encoder.copy_texture_to_buffer(
            vello::wgpu::TexelCopyTextureInfo {
                texture: &ctx.texture,
                mip_level: 0,
                origin: vello::wgpu::Origin3d::ZERO,
                aspect: vello::wgpu::TextureAspect::All,
            },
            vello::wgpu::TexelCopyBufferInfo {
                buffer: &ctx.readback,
                layout: vello::wgpu::TexelCopyBufferLayout {
                    offset: 0,
                    bytes_per_row: Some(ctx.readback_bytes_per_row),
                    rows_per_image: Some(self.canvas.height),
                },
            },
            vello::wgpu::Extent3d {
                width: self.canvas.width,
                height: self.canvas.height,
                depth_or_array_layers: 1,
            },
        );
        ctx.queue.submit(Some(encoder.finish()));

        let buffer_slice = ctx.readback.slice(..);
        let (tx, rx) = std::sync::mpsc::channel();
        buffer_slice.map_async(vello::wgpu::MapMode::Read, move |res| {
            let _ = tx.send(res);
        });
        ctx.device
            .poll(vello::wgpu::PollType::wait_indefinitely())
            .map_err(|e| CanopyError::backend(format!("wgpu poll failed: {e:?}")))?;
        rx.recv()
            .map_err(|_| CanopyError::backend("readback channel closed"))?
            .map_err(|e| CanopyError::backend(format!("readback map failed: {e:?}")))?;

        let mapped = buffer_slice.get_mapped_range();
        let row_bytes = self.canvas.width as usize * 4;
        let padded_row_bytes = ctx.readback_bytes_per_row as usize;
        let mut out = Vec::with_capacity(row_bytes * self.canvas.height as usize);
        for row in 0..self.canvas.height as usize {
            let start = row * padded_row_bytes;
            out.extend_from_slice(&mapped[start..start + row_bytes]);
        }
        drop(mapped);
        ctx.readback.unmap();
        Ok(out)
    }

    fn push_opacity(&mut self, opacity: f64) -> bool {
        if opacity < 1.0 {
            self.scene.push_layer(
                vello::peniko::Fill::NonZero,
                vello::peniko::BlendMode::default(),
                opacity as f32,
                Affine::IDENTITY,
                &self.canvas.rect(),
            );
            true
        } else {
            false
        }
    }

    fn kurbo_stroke(stroke: &Stroke) -> kurbo::Stroke {
        let mut style = kurbo::Stroke::new(stroke.width);
        if stroke.dashed {
            style = style.with_dashes(0.0, [6.0, 4.0]);
        }
        style
    }

    fn color(c: Rgba8) -> vello::peniko::Color {
        vello::peniko::Color::from_rgba8(c.r, c.g, c.b, c.a)
    }
}

impl Surface for GpuSurface {
    fn canvas(&self) -> Canvas {
        self.canvas
    }

    fn initialize(&mut self) -> CanopyResult<()> {
        if self.ctx.is_some() {
            return Ok(());
        }
        debug!(
            width = self.canvas.width,
            height = self.canvas.height,
            "acquiring wgpu device for gpu surface"
        );
        self.ctx = Some(Self::acquire_context(self.canvas)?);
        Ok(())
    }

    fn clear(&mut self, color: Rgba8) {
        self.scene.reset();
        self.base_color = color;
        self.transform = Affine::IDENTITY;
    }

    fn set_transform(&mut self, transform: Affine) {
        self.transform = transform;
    }

    fn fill_rect(
        &mut self,
        rect: Rect,
        corner_radius: f64,
        color: Rgba8,
        opacity: f64,
    ) -> CanopyResult<()> {
        let layered = self.push_opacity(opacity);
        if corner_radius > 0.0 {
            let shape = kurbo::RoundedRect::from_rect(rect, corner_radius);
            self.scene.fill(
                vello::peniko::Fill::NonZero,
                self.transform,
                Self::color(color),
                None,
                &shape,
            );
        } else {
            self.scene.fill(
                vello::peniko::Fill::NonZero,
                self.transform,
                Self::color(color),
                None,
                &rect,
            );
        }
        if layered {
            self.scene.pop_layer();
        }
        Ok(())
    }

    fn stroke_rect(
        &mut self,
        rect: Rect,
        corner_radius: f64,
        stroke: &Stroke,
        opacity: f64,
    ) -> CanopyResult<()> {
        let layered = self.push_opacity(opacity);
        let style = Self::kurbo_stroke(stroke);
        if corner_radius > 0.0 {
            let shape = kurbo::RoundedRect::from_rect(rect, corner_radius);
            self.scene
                .stroke(&style, self.transform, Self::color(stroke.color), None, &shape);
        } else {
            self.scene
                .stroke(&style, self.transform, Self::color(stroke.color), None, &rect);
        }
        if layered {
            self.scene.pop_layer();
        }
        Ok(())
    }

    fn stroke_line(
        &mut self,
        from: Point,
        to: Point,
        stroke: &Stroke,
        opacity: f64,
    ) -> CanopyResult<()> {
        let layered = self.push_opacity(opacity);
        let line = kurbo::Line::new(from, to);
        self.scene.stroke(
            &Self::kurbo_stroke(stroke),
            self.transform,
            Self::color(stroke.color),
            None,
            &line.to_path(0.1),
        );
        if layered {
            self.scene.pop_layer();
        }
        Ok(())
    }

    fn fill_text(
        &mut self,
        text: &str,
        origin: Point,
        font: &TextFont,
        color: Rgba8,
        opacity: f64,
    ) -> CanopyResult<()> {
        let color = color.with_opacity(opacity);
        let layout = self.text.layout(
            text,
            font,
            TextBrush {
                r: color.r,
                g: color.g,
                b: color.b,
                a: color.a,
            },
        )?;
        let bytes = self
            .text
            .font_bytes()
            .ok_or_else(|| CanopyError::draw("no font bytes supplied for text drawing"))?
            .to_vec();
        let font_data = vello::peniko::FontData::new(vello::peniko::Blob::from(bytes), 0);

        let transform = self.transform * Affine::translate((origin.x, origin.y));
        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                let brush = run.style().brush;
                self.scene
                    .draw_glyphs(&font_data)
                    .transform(transform)
                    .font_size(run.run().font_size())
                    .brush(vello::peniko::Color::from_rgba8(
                        brush.r, brush.g, brush.b, brush.a,
                    ))
                    .draw(
                        vello::peniko::Fill::NonZero,
                        run.glyphs().map(|g| vello::Glyph {
                            id: g.id,
                            x: g.x,
                            y: g.y,
                        }),
                    );
            }
        }
        Ok(())
    }

    fn stroke_text(
        &mut self,
        text: &str,
        origin: Point,
        font: &TextFont,
        stroke: &Stroke,
        opacity: f64,
    ) -> CanopyResult<()> {
        // vello glyph runs draw fills; the stroke pass renders as a fill in the
        // stroke color, which is indistinguishable at diagram text sizes.
        self.fill_text(text, origin, font, stroke.color, opacity)
    }

    fn measure_text(&mut self, text: &str, font: &TextFont) -> Size {
        self.text.measure(text, font)
    }

    fn frame_rgba8(&mut self) -> CanopyResult<Vec<u8>> {
        self.to_rgba8()
    }
}

fn align_to(value: u32, alignment: u32) -> u32 {
    let mask = alignment - 1;
    (value + mask) & !mask
}
