//! Software drawing surface: vello_cpu sparse-strip rasterization into a pixmap.
//!
//! This is the fallback every renderer selection terminates on; it needs no
//! device, no window, and no feature flags.

use crate::foundation::core::{
    Affine, Canvas, Point, Rect, Rgba8, Size, Stroke, TextFont,
};
use crate::foundation::error::{CanopyError, CanopyResult};
use crate::render::surface::Surface;

/// RGBA8 brush color carried through parley text layout.
#[allow(dead_code)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct TextBrush {
    pub(crate) r: u8,
    pub(crate) g: u8,
    pub(crate) b: u8,
    pub(crate) a: u8,
}

/// Shapes and lays out plain text. Fonts are supplied as raw bytes by the
/// embedder; without them, text operations fail recoverably.
pub(crate) struct TextEngine {
    font_ctx: parley::FontContext,
    layout_ctx: parley::LayoutContext<TextBrush>,
    font_bytes: Option<Vec<u8>>,
    family_name: Option<String>,
}

impl TextEngine {
    pub(crate) fn new(font_bytes: Option<Vec<u8>>) -> Self {
        Self {
            font_ctx: parley::FontContext::default(),
            layout_ctx: parley::LayoutContext::new(),
            font_bytes,
            family_name: None,
        }
    }

    pub(crate) fn font_bytes(&self) -> Option<&[u8]> {
        self.font_bytes.as_deref()
    }

    fn ensure_family(&mut self) -> CanopyResult<String> {
        if let Some(name) = &self.family_name {
            return Ok(name.clone());
        }
        let bytes = self
            .font_bytes
            .as_ref()
            .ok_or_else(|| CanopyError::draw("no font bytes supplied for text drawing"))?;
        let families = self
            .font_ctx
            .collection
            .register_fonts(parley::fontique::Blob::from(bytes.clone()), None);
        let family_id = families
            .first()
            .map(|(id, _)| *id)
            .ok_or_else(|| CanopyError::draw("no font families registered from font bytes"))?;
        let name = self
            .font_ctx
            .collection
            .family_name(family_id)
            .ok_or_else(|| CanopyError::draw("registered font family has no name"))?
            .to_string();
        self.family_name = Some(name.clone());
        Ok(name)
    }

    pub(crate) fn layout(
        &mut self,
        text: &str,
        font: &TextFont,
        brush: TextBrush,
    ) -> CanopyResult<parley::Layout<TextBrush>> {
        if !font.size_px.is_finite() || font.size_px <= 0.0 {
            return Err(CanopyError::draw("text size_px must be finite and > 0"));
        }
        let family = self.ensure_family()?;
        let mut builder = self
            .layout_ctx
            .ranged_builder(&mut self.font_ctx, text, 1.0, true);
        builder.push_default(parley::style::StyleProperty::FontStack(
            parley::style::FontStack::Source(std::borrow::Cow::Owned(family)),
        ));
        builder.push_default(parley::style::StyleProperty::FontSize(font.size_px));
        builder.push_default(parley::style::StyleProperty::Brush(brush));
        let mut layout: parley::Layout<TextBrush> = builder.build(text);
        layout.break_all_lines(None);
        Ok(layout)
    }

    pub(crate) fn measure(&mut self, text: &str, font: &TextFont) -> Size {
        match self.layout(text, font, TextBrush::default()) {
            Ok(layout) => {
                let mut w = 0.0f64;
                let mut h = 0.0f64;
                for line in layout.lines() {
                    let m = line.metrics();
                    w = w.max(f64::from(m.advance));
                    h += f64::from(m.ascent + m.descent + m.leading);
                }
                Size::new(w, h)
            }
            // Keep alignment math stable even without a font.
            Err(_) => Size::new(
                text.chars().count() as f64 * f64::from(font.size_px) * 0.6,
                f64::from(font.size_px) * 1.2,
            ),
        }
    }
}

/// CPU [`Surface`] rendering through a retained `vello_cpu::RenderContext` into a
/// pixmap read back with [`CpuSurface::to_rgba8`].
pub struct CpuSurface {
    width: u16,
    height: u16,
    ctx: vello_cpu::RenderContext,
    pixmap: vello_cpu::Pixmap,
    text: TextEngine,
    transform: Affine,
    flushed: bool,
}

impl CpuSurface {
    pub fn new(canvas: Canvas) -> CanopyResult<Self> {
        Self::with_font(canvas, None)
    }

    /// Construct with font bytes for text drawing (TTF/OTF). Text operations on a
    /// surface without font bytes fail with a recoverable draw error.
    pub fn with_font(canvas: Canvas, font_bytes: Option<Vec<u8>>) -> CanopyResult<Self> {
        let width: u16 = canvas
            .width
            .try_into()
            .map_err(|_| CanopyError::backend("surface width exceeds u16"))?;
        let height: u16 = canvas
            .height
            .try_into()
            .map_err(|_| CanopyError::backend("surface height exceeds u16"))?;
        Ok(Self {
            width,
            height,
            ctx: vello_cpu::RenderContext::new(width, height),
            pixmap: vello_cpu::Pixmap::new(width, height),
            text: TextEngine::new(font_bytes),
            transform: Affine::IDENTITY,
            flushed: false,
        })
    }

    /// Flush pending ops and return tightly packed premultiplied RGBA8 pixels.
    pub fn to_rgba8(&mut self) -> Vec<u8> {
        if !self.flushed {
            self.ctx.flush();
            self.ctx.render_to_pixmap(&mut self.pixmap);
            self.flushed = true;
        }
        self.pixmap.data_as_u8_slice().to_vec()
    }

    fn begin_op(&mut self) {
        self.flushed = false;
        self.ctx.set_paint_transform(vello_cpu::kurbo::Affine::IDENTITY);
        self.ctx.set_transform(affine_to_cpu(self.transform));
    }

    fn set_color_paint(&mut self, color: Rgba8, opacity: f64) {
        let color = color.with_opacity(opacity);
        self.ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
            color.r, color.g, color.b, color.a,
        ));
    }

    fn set_stroke_style(&mut self, stroke: &Stroke) {
        let mut style = vello_cpu::kurbo::Stroke::new(stroke.width);
        if stroke.dashed {
            style = style.with_dashes(0.0, [6.0, 4.0]);
        }
        self.ctx.set_stroke(style);
    }

    fn rounded_rect_path(rect: Rect, corner_radius: f64) -> vello_cpu::kurbo::BezPath {
        use kurbo::Shape;
        let path = if corner_radius > 0.0 {
            kurbo::RoundedRect::from_rect(rect, corner_radius).to_path(0.1)
        } else {
            rect.to_path(0.1)
        };
        bezpath_to_cpu(&path)
    }

    fn draw_glyph_runs(
        &mut self,
        layout: &parley::Layout<TextBrush>,
        origin: Point,
        stroked: bool,
    ) -> CanopyResult<()> {
        let bytes = self
            .text
            .font_bytes
            .as_ref()
            .ok_or_else(|| CanopyError::draw("no font bytes supplied for text drawing"))?
            .clone();
        let font = vello_cpu::peniko::FontData::new(vello_cpu::peniko::Blob::from(bytes), 0);

        // Glyphs come out of parley already positioned within the layout box, so
        // the origin rides on the transform.
        self.ctx
            .set_transform(affine_to_cpu(self.transform * Affine::translate((origin.x, origin.y))));
        for line in layout.lines() {
            for item in line.items() {
                let parley::layout::PositionedLayoutItem::GlyphRun(run) = item else {
                    continue;
                };
                let brush = run.style().brush;
                self.ctx.set_paint(vello_cpu::peniko::Color::from_rgba8(
                    brush.r, brush.g, brush.b, brush.a,
                ));
                let glyphs = run.glyphs().map(|g| vello_cpu::Glyph {
                    id: g.id,
                    x: g.x,
                    y: g.y,
                });
                let builder = self.ctx.glyph_run(&font).font_size(run.run().font_size());
                if stroked {
                    builder.stroke_glyphs(glyphs);
                } else {
                    builder.fill_glyphs(glyphs);
                }
            }
        }
        self.ctx.set_transform(affine_to_cpu(self.transform));
        Ok(())
    }
}

impl Surface for CpuSurface {
    fn canvas(&self) -> Canvas {
        Canvas {
            width: u32::from(self.width),
            height: u32::from(self.height),
        }
    }

    fn clear(&mut self, color: Rgba8) {
        self.ctx = vello_cpu::RenderContext::new(self.width, self.height);
        let premul = color.to_premul_bytes();
        for px in self.pixmap.data_as_u8_slice_mut().chunks_exact_mut(4) {
            px.copy_from_slice(&premul);
        }
        self.transform = Affine::IDENTITY;
        self.flushed = false;
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
        self.begin_op();
        self.set_color_paint(color, opacity);
        let path = Self::rounded_rect_path(rect, corner_radius);
        self.ctx.fill_path(&path);
        Ok(())
    }

    fn stroke_rect(
        &mut self,
        rect: Rect,
        corner_radius: f64,
        stroke: &Stroke,
        opacity: f64,
    ) -> CanopyResult<()> {
        self.begin_op();
        self.set_color_paint(stroke.color, opacity);
        self.set_stroke_style(stroke);
        let path = Self::rounded_rect_path(rect, corner_radius);
        self.ctx.stroke_path(&path);
        Ok(())
    }

    fn stroke_line(
        &mut self,
        from: Point,
        to: Point,
        stroke: &Stroke,
        opacity: f64,
    ) -> CanopyResult<()> {
        self.begin_op();
        self.set_color_paint(stroke.color, opacity);
        self.set_stroke_style(stroke);
        let mut path = vello_cpu::kurbo::BezPath::new();
        path.move_to(point_to_cpu(from));
        path.line_to(point_to_cpu(to));
        self.ctx.stroke_path(&path);
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
        self.begin_op();
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
        self.draw_glyph_runs(&layout, origin, false)
    }

    fn stroke_text(
        &mut self,
        text: &str,
        origin: Point,
        font: &TextFont,
        stroke: &Stroke,
        opacity: f64,
    ) -> CanopyResult<()> {
        self.begin_op();
        let color = stroke.color.with_opacity(opacity);
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
        self.set_stroke_style(stroke);
        self.draw_glyph_runs(&layout, origin, true)
    }

    fn measure_text(&mut self, text: &str, font: &TextFont) -> Size {
        self.text.measure(text, font)
    }

    fn frame_rgba8(&mut self) -> CanopyResult<Vec<u8>> {
        Ok(self.to_rgba8())
    }
}

fn affine_to_cpu(a: Affine) -> vello_cpu::kurbo::Affine {
    vello_cpu::kurbo::Affine::new(a.as_coeffs())
}

fn point_to_cpu(p: Point) -> vello_cpu::kurbo::Point {
    vello_cpu::kurbo::Point::new(p.x, p.y)
}

fn bezpath_to_cpu(path: &kurbo::BezPath) -> vello_cpu::kurbo::BezPath {
    use kurbo::PathEl;

    let mut out = vello_cpu::kurbo::BezPath::new();
    for &el in path.elements() {
        match el {
            PathEl::MoveTo(p) => out.move_to(point_to_cpu(p)),
            PathEl::LineTo(p) => out.line_to(point_to_cpu(p)),
            PathEl::QuadTo(p1, p2) => out.quad_to(point_to_cpu(p1), point_to_cpu(p2)),
            PathEl::CurveTo(p1, p2, p3) => {
                out.curve_to(point_to_cpu(p1), point_to_cpu(p2), point_to_cpu(p3));
            }
            PathEl::ClosePath => out.close_path(),
        }
    }
    out
}
