//! Coordinate mapping between detector boxes, raster pixels and view space.
//!
//! Three conventions meet here:
//! - detector boxes are normalized to `[0, 1]` with a bottom-left origin,
//! - rasters (`OwnedImage`) are pixel-addressed with a top-left origin,
//! - views are top-left origin and show the raster aspect-fit and centered.
//!
//! The Y flip happens only where a bottom-left quantity meets a top-left one.

#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Size {
    pub width: f64,
    pub height: f64,
}

impl Size {
    pub const fn new(width: f64, height: f64) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }
}

/// Axis-aligned rectangle with a top-left origin (view or raster space).
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub const ZERO: Self = Self::new(0.0, 0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// A `side`×`side` square centered on `center`.
    pub fn square_around(center: Point, side: f64) -> Self {
        let half = side / 2.0;
        Self::new(center.x - half, center.y - half, side, side)
    }

    #[inline]
    pub fn max_x(&self) -> f64 {
        self.x + self.width
    }

    #[inline]
    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    #[inline]
    pub fn mid(&self) -> Point {
        Point::new(self.x + self.width / 2.0, self.y + self.height / 2.0)
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        !(self.width > 0.0 && self.height > 0.0)
    }

    /// Half-open containment: the min edges are inside, the max edges are not.
    pub fn contains(&self, p: Point) -> bool {
        !self.is_empty() && p.x >= self.x && p.x < self.max_x() && p.y >= self.y && p.y < self.max_y()
    }

    /// Shrink by `dx` on the left and right and by `dy` on top and bottom.
    ///
    /// Negative values grow the rectangle. Returns `None` once the rectangle collapses.
    pub fn inset(&self, dx: f64, dy: f64) -> Option<Self> {
        let r = Self::new(
            self.x + dx,
            self.y + dy,
            self.width - 2.0 * dx,
            self.height - 2.0 * dy,
        );
        (!r.is_empty()).then_some(r)
    }

    pub fn intersection(&self, other: &Rect) -> Option<Self> {
        let x1 = self.x.max(other.x);
        let y1 = self.y.max(other.y);
        let x2 = self.max_x().min(other.max_x());
        let y2 = self.max_y().min(other.max_y());
        let r = Self::new(x1, y1, x2 - x1, y2 - y1);
        (!r.is_empty()).then_some(r)
    }
}

/// Detector box: fractions of image width/height, bottom-left origin.
#[derive(Debug, Clone, Copy, Default, PartialEq, serde::Deserialize, serde::Serialize)]
pub struct NormalizedRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl NormalizedRect {
    pub const fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Box from top-left pixel coordinates in a `image_width`×`image_height` raster.
    pub fn from_pixel_rect(rect: Rect, image_width: u32, image_height: u32) -> Self {
        let w = image_width.max(1) as f64;
        let h = image_height.max(1) as f64;
        Self::new(
            rect.x / w,
            1.0 - rect.max_y() / h,
            rect.width / w,
            rect.height / h,
        )
    }

    #[inline]
    pub fn max_y(&self) -> f64 {
        self.y + self.height
    }

    /// Non-zero, finite area. Degenerate boxes are discarded before any sampling.
    pub fn is_valid(&self) -> bool {
        [self.x, self.y, self.width, self.height]
            .iter()
            .all(|v| v.is_finite())
            && self.width > 0.0
            && self.height > 0.0
    }

    /// Top-left raster rectangle for an image of the given pixel size.
    pub fn to_pixel_rect(&self, image_width: u32, image_height: u32) -> Rect {
        let w = image_width as f64;
        let h = image_height as f64;
        Rect::new(
            self.x * w,
            (1.0 - self.max_y()) * h,
            self.width * w,
            self.height * h,
        )
    }
}

/// Where an `image` of the given size lands when aspect-fit and centered in `view`.
pub fn fitted_rect(image: Size, view: Size) -> Rect {
    if image.is_empty() || view.is_empty() {
        return Rect::ZERO;
    }

    let image_aspect = image.width / image.height;
    let view_aspect = view.width / view.height;

    if image_aspect > view_aspect {
        let width = view.width;
        let height = width / image_aspect;
        Rect::new(0.0, (view.height - height) / 2.0, width, height)
    } else {
        let height = view.height;
        let width = height * image_aspect;
        Rect::new((view.width - width) / 2.0, 0.0, width, height)
    }
}

/// Project a detector box into view coordinates.
pub fn overlay_rect(bbox: NormalizedRect, image: Size, view: Size) -> Rect {
    let fitted = fitted_rect(image, view);
    if fitted.is_empty() {
        return Rect::ZERO;
    }

    let x = fitted.x + bbox.x * fitted.width;
    let width = bbox.width * fitted.width;
    let height = bbox.height * fitted.height;
    let y = fitted.max_y() - bbox.y * fitted.height - height;
    Rect::new(x, y, width, height)
}

/// View point to normalized detector coordinates (bottom-left origin).
///
/// `None` when the point misses the fitted image.
pub fn view_point_to_normalized(point: Point, view: Size, image: Size) -> Option<Point> {
    let fitted = fitted_rect(image, view);
    if !fitted.contains(point) {
        return None;
    }
    Some(Point::new(
        (point.x - fitted.x) / fitted.width,
        1.0 - (point.y - fitted.y) / fitted.height,
    ))
}

/// View point to raster pixel coordinates (top-left origin).
///
/// View and raster share the top-left origin, so no flip happens on this path.
pub fn view_point_to_image_point(point: Point, view: Size, image: Size) -> Option<Point> {
    let fitted = fitted_rect(image, view);
    if !fitted.contains(point) {
        return None;
    }
    Some(Point::new(
        (point.x - fitted.x) / fitted.width * image.width,
        (point.y - fitted.y) / fitted.height * image.height,
    ))
}
