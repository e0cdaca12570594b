use crate::foundation::core::{
    Affine, Canvas, Point, Rect, Rgba8, Size, Stroke, TextFont,
};
use crate::foundation::error::CanopyResult;

/// A 2D drawing target.
///
/// Callers install a compound transform with [`set_transform`] and then issue draw
/// calls in local coordinates; implementations apply the transform themselves (no
/// nested save/restore stack). Text origins are the top-left corner of the text box.
///
/// [`set_transform`]: Surface::set_transform
pub trait Surface {
    fn canvas(&self) -> Canvas;

    /// Acquire drawing-context resources. Infallible for surfaces without any.
    fn initialize(&mut self) -> CanopyResult<()> {
        Ok(())
    }

    fn clear(&mut self, color: Rgba8);

    fn set_transform(&mut self, transform: Affine);

    fn fill_rect(
        &mut self,
        rect: Rect,
        corner_radius: f64,
        color: Rgba8,
        opacity: f64,
    ) -> CanopyResult<()>;

    fn stroke_rect(
        &mut self,
        rect: Rect,
        corner_radius: f64,
        stroke: &Stroke,
        opacity: f64,
    ) -> CanopyResult<()>;

    fn stroke_line(
        &mut self,
        from: Point,
        to: Point,
        stroke: &Stroke,
        opacity: f64,
    ) -> CanopyResult<()>;

    fn fill_text(
        &mut self,
        text: &str,
        origin: Point,
        font: &TextFont,
        color: Rgba8,
        opacity: f64,
    ) -> CanopyResult<()>;

    fn stroke_text(
        &mut self,
        text: &str,
        origin: Point,
        font: &TextFont,
        stroke: &Stroke,
        opacity: f64,
    ) -> CanopyResult<()>;

    /// Size of `text` as laid out in `font`, for alignment anchoring.
    fn measure_text(&mut self, text: &str, font: &TextFont) -> Size;

    /// Flush and return the frame as tightly packed premultiplied RGBA8, for
    /// offscreen consumers. Surfaces without pixels return an empty buffer.
    fn frame_rgba8(&mut self) -> CanopyResult<Vec<u8>> {
        Ok(Vec::new())
    }
}

/// A recorded draw call, for asserting on pipeline output in tests.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawCall {
    Clear(Rgba8),
    SetTransform(Affine),
    FillRect {
        rect: Rect,
        corner_radius: f64,
        color: Rgba8,
        opacity: f64,
    },
    StrokeRect {
        rect: Rect,
        stroke: Stroke,
    },
    StrokeLine {
        from: Point,
        to: Point,
        stroke: Stroke,
    },
    FillText {
        text: String,
        origin: Point,
        color: Rgba8,
    },
    StrokeText {
        text: String,
        origin: Point,
        stroke: Stroke,
    },
}

/// In-memory [`Surface`] that records every call instead of producing pixels.
#[derive(Clone, Debug)]
pub struct RecordingSurface {
    canvas: Canvas,
    pub calls: Vec<DrawCall>,
}

impl RecordingSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            canvas: Canvas { width, height },
            calls: Vec::new(),
        }
    }

    pub fn count<F: Fn(&DrawCall) -> bool>(&self, pred: F) -> usize {
        self.calls.iter().filter(|c| pred(c)).count()
    }
}

impl Surface for RecordingSurface {
    fn canvas(&self) -> Canvas {
        self.canvas
    }

    fn clear(&mut self, color: Rgba8) {
        self.calls.clear();
        self.calls.push(DrawCall::Clear(color));
    }

    fn set_transform(&mut self, transform: Affine) {
        self.calls.push(DrawCall::SetTransform(transform));
    }

    fn fill_rect(
        &mut self,
        rect: Rect,
        corner_radius: f64,
        color: Rgba8,
        opacity: f64,
    ) -> CanopyResult<()> {
        self.calls.push(DrawCall::FillRect {
            rect,
            corner_radius,
            color,
            opacity,
        });
        Ok(())
    }

    fn stroke_rect(
        &mut self,
        rect: Rect,
        _corner_radius: f64,
        stroke: &Stroke,
        _opacity: f64,
    ) -> CanopyResult<()> {
        self.calls.push(DrawCall::StrokeRect {
            rect,
            stroke: *stroke,
        });
        Ok(())
    }

    fn stroke_line(
        &mut self,
        from: Point,
        to: Point,
        stroke: &Stroke,
        _opacity: f64,
    ) -> CanopyResult<()> {
        self.calls.push(DrawCall::StrokeLine {
            from,
            to,
            stroke: *stroke,
        });
        Ok(())
    }

    fn fill_text(
        &mut self,
        text: &str,
        origin: Point,
        _font: &TextFont,
        color: Rgba8,
        _opacity: f64,
    ) -> CanopyResult<()> {
        self.calls.push(DrawCall::FillText {
            text: text.to_string(),
            origin,
            color,
        });
        Ok(())
    }

    fn stroke_text(
        &mut self,
        text: &str,
        origin: Point,
        _font: &TextFont,
        stroke: &Stroke,
        _opacity: f64,
    ) -> CanopyResult<()> {
        self.calls.push(DrawCall::StrokeText {
            text: text.to_string(),
            origin,
            stroke: *stroke,
        });
        Ok(())
    }

    fn measure_text(&mut self, text: &str, font: &TextFont) -> Size {
        // Monospace-ish estimate, stable for alignment assertions.
        let width = text.chars().count() as f64 * f64::from(font.size_px) * 0.6;
        Size::new(width, f64::from(font.size_px) * 1.2)
    }
}
