use crate::foundation::error::{CanopyError, CanopyResult};

pub use kurbo::{Affine, Point, Rect, Size, Vec2};

/// Logical drawing-surface size in physical pixels.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Canvas {
    pub width: u32,
    pub height: u32,
}

impl Canvas {
    pub fn new(width: u32, height: u32) -> CanopyResult<Self> {
        if width == 0 || height == 0 {
            return Err(CanopyError::config("canvas width/height must be > 0"));
        }
        Ok(Self { width, height })
    }

    pub fn rect(self) -> Rect {
        Rect::new(0.0, 0.0, f64::from(self.width), f64::from(self.height))
    }
}

/// Straight (non-premultiplied) RGBA8 color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct Rgba8 {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Rgba8 {
    pub const fn new(r: u8, g: u8, b: u8, a: u8) -> Self {
        Self { r, g, b, a }
    }

    pub const fn opaque(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const TRANSPARENT: Self = Self::new(0, 0, 0, 0);
    pub const BLACK: Self = Self::opaque(0, 0, 0);
    pub const WHITE: Self = Self::opaque(255, 255, 255);

    /// Premultiply into RGBA8 bytes for surfaces that store premultiplied pixels.
    pub fn to_premul_bytes(self) -> [u8; 4] {
        fn premul(c: u8, a: u8) -> u8 {
            let c = u16::from(c);
            let a = u16::from(a);
            (((c * a) + 127) / 255) as u8
        }
        [
            premul(self.r, self.a),
            premul(self.g, self.a),
            premul(self.b, self.a),
            self.a,
        ]
    }

    /// Scale alpha by `opacity` in `[0, 1]`.
    pub fn with_opacity(self, opacity: f64) -> Self {
        let a = (f64::from(self.a) * opacity.clamp(0.0, 1.0)).round() as u8;
        Self { a, ..self }
    }
}

/// Stroke description for outlines and edge lines.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Stroke {
    pub color: Rgba8,
    pub width: f64,
    #[serde(default)]
    pub dashed: bool,
}

impl Stroke {
    pub fn solid(color: Rgba8, width: f64) -> Self {
        Self {
            color,
            width,
            dashed: false,
        }
    }
}

/// Horizontal text anchoring within a node's bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextAlign {
    Left,
    #[default]
    Center,
    Right,
}

/// Vertical text anchoring within a node's bounds.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TextBaseline {
    Top,
    #[default]
    Middle,
    Bottom,
}

/// Font request for text nodes. Resolution against actual font data happens inside
/// the drawing surface (parley owns shaping).
#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct TextFont {
    pub family: String,
    pub size_px: f32,
}

impl Default for TextFont {
    fn default() -> Self {
        Self {
            family: "sans-serif".to_string(),
            size_px: 14.0,
        }
    }
}

/// The visible window onto world space: screen = pan + zoom * world.
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Viewport {
    pub pan: Vec2,
    pub zoom: f64,
    pub canvas: Canvas,
}

impl Viewport {
    pub fn new(canvas: Canvas) -> Self {
        Self {
            pan: Vec2::ZERO,
            zoom: 1.0,
            canvas,
        }
    }

    /// World-to-screen transform applied once per frame, ahead of every node's
    /// world matrix.
    pub fn to_affine(self) -> Affine {
        Affine::translate(self.pan) * Affine::scale(self.zoom)
    }

    /// The world-space rectangle currently visible, used for culling.
    ///
    /// With a non-positive zoom there is no meaningful window; callers get an empty
    /// rect and cull everything rather than an error.
    pub fn world_rect(self) -> Rect {
        if self.zoom <= 0.0 {
            return Rect::ZERO;
        }
        let x0 = (0.0 - self.pan.x) / self.zoom;
        let y0 = (0.0 - self.pan.y) / self.zoom;
        let x1 = (f64::from(self.canvas.width) - self.pan.x) / self.zoom;
        let y1 = (f64::from(self.canvas.height) - self.pan.y) / self.zoom;
        Rect::new(x0, y0, x1, y1)
    }

    pub fn screen_to_world(self, p: Point) -> Point {
        if self.zoom <= 0.0 {
            return p;
        }
        Point::new((p.x - self.pan.x) / self.zoom, (p.y - self.pan.y) / self.zoom)
    }

    pub fn world_to_screen(self, p: Point) -> Point {
        Point::new(p.x * self.zoom + self.pan.x, p.y * self.zoom + self.pan.y)
    }
}
