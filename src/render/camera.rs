use crate::foundation::core::{Canvas, Point, Rect, Vec2, Viewport};

const MIN_ZOOM: f64 = 0.05;
const MAX_ZOOM: f64 = 20.0;
/// Fraction of the canvas that fitted content occupies, leaving a margin.
const FIT_MARGIN: f64 = 0.9;

/// Pan/zoom state for one canvas. `screen = pan + zoom * world`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Camera {
    pub pan: Vec2,
    pub zoom: f64,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            pan: Vec2::ZERO,
            zoom: 1.0,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn viewport(self, canvas: Canvas) -> Viewport {
        Viewport {
            pan: self.pan,
            zoom: self.zoom,
            canvas,
        }
    }

    /// Multiply zoom by `factor`, keeping the world point under `screen_point`
    /// stationary.
    pub fn zoom_about(&mut self, factor: f64, screen_point: Point) {
        let old_zoom = self.zoom;
        let new_zoom = (old_zoom * factor).clamp(MIN_ZOOM, MAX_ZOOM);
        if new_zoom == old_zoom {
            return;
        }
        let world_x = (screen_point.x - self.pan.x) / old_zoom;
        let world_y = (screen_point.y - self.pan.y) / old_zoom;
        self.pan = Vec2::new(
            screen_point.x - world_x * new_zoom,
            screen_point.y - world_y * new_zoom,
        );
        self.zoom = new_zoom;
    }
}

/// Camera that centers `bounds` in `canvas` with a margin. Pure function of the
/// entity bounding box and the canvas size.
pub fn fit_to_content(bounds: Rect, canvas: Canvas) -> Camera {
    let cw = f64::from(canvas.width);
    let ch = f64::from(canvas.height);
    if bounds.width() <= 0.0 || bounds.height() <= 0.0 {
        return Camera::new();
    }
    let zoom = ((cw / bounds.width()).min(ch / bounds.height()) * FIT_MARGIN)
        .clamp(MIN_ZOOM, MAX_ZOOM);
    let center = bounds.center();
    Camera {
        pan: Vec2::new(cw / 2.0 - center.x * zoom, ch / 2.0 - center.y * zoom),
        zoom,
    }
}
