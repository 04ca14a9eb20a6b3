//! UV-space geometry and the screen/image coordinate mapping.
//!
//! Annotations are stored in UV coordinates: fractions (0–1) of the image
//! width/height, independent of how large the image is drawn on screen.

/// Width the displayed image is fitted to when the native image is wider.
pub const TARGET_DISPLAY_WIDTH: f32 = 800.0;

/// Minimum committed rectangle extent, in UV units, on each axis.
pub const MIN_RECT_SIZE: f32 = 0.01;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UvPoint {
    pub x: f32,
    pub y: f32,
}

impl UvPoint {
    pub fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }
}

/// Axis-aligned rectangle in UV space. `from_corners` normalizes the two
/// gesture endpoints so x1 ≤ x2 and y1 ≤ y2 always hold.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct UvRect {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl UvRect {
    pub fn from_corners(a: UvPoint, b: UvPoint) -> Self {
        Self {
            x1: a.x.min(b.x),
            y1: a.y.min(b.y),
            x2: a.x.max(b.x),
            y2: a.y.max(b.y),
        }
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    /// Too small to keep as an annotation.
    pub fn is_degenerate(&self) -> bool {
        self.width() <= MIN_RECT_SIZE || self.height() <= MIN_RECT_SIZE
    }

    pub fn contains(&self, p: UvPoint) -> bool {
        p.x >= self.x1 && p.x <= self.x2 && p.y >= self.y1 && p.y <= self.y2
    }
}

/// Display geometry of the loaded image: native pixel size plus the scale
/// factor applied when drawing it on the canvas. Constructed once the image
/// has decoded; UV mapping is unavailable before that point.
#[derive(Clone, Copy, Debug)]
pub struct ImageView {
    native_width: f32,
    native_height: f32,
    scale: f32,
}

impl ImageView {
    /// Returns `None` for empty images, which would make UV math divide by
    /// zero.
    pub fn new(native_width: u32, native_height: u32) -> Option<Self> {
        if native_width == 0 || native_height == 0 {
            return None;
        }
        let w = native_width as f32;
        let scale = if w > TARGET_DISPLAY_WIDTH {
            TARGET_DISPLAY_WIDTH / w
        } else {
            1.0
        };
        Some(Self {
            native_width: w,
            native_height: native_height as f32,
            scale,
        })
    }

    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Size of the image as drawn on the canvas.
    pub fn display_size(&self) -> egui::Vec2 {
        egui::vec2(
            self.native_width * self.scale,
            self.native_height * self.scale,
        )
    }

    /// Map a pointer position to UV, relative to the canvas origin.
    pub fn to_uv(&self, canvas_origin: egui::Pos2, pointer: egui::Pos2) -> UvPoint {
        let size = self.display_size();
        UvPoint {
            x: (pointer.x - canvas_origin.x) / size.x,
            y: (pointer.y - canvas_origin.y) / size.y,
        }
    }

    /// Map a UV position back to canvas pixels.
    pub fn to_canvas(&self, canvas_origin: egui::Pos2, uv: UvPoint) -> egui::Pos2 {
        let size = self.display_size();
        egui::pos2(
            canvas_origin.x + uv.x * size.x,
            canvas_origin.y + uv.y * size.y,
        )
    }

    /// Canvas rectangle for a UV rectangle.
    pub fn rect_to_canvas(&self, canvas_origin: egui::Pos2, rect: &UvRect) -> egui::Rect {
        egui::Rect::from_min_max(
            self.to_canvas(canvas_origin, UvPoint::new(rect.x1, rect.y1)),
            self.to_canvas(canvas_origin, UvPoint::new(rect.x2, rect.y2)),
        )
    }
}
