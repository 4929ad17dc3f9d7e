//! Image primitives and utilities.
//!
//! Frames are held in a lightweight owned RGB image type (`OwnedImage`).
//! Capture backends hand over RGBA or RGB buffers; alpha is discarded at
//! ingestion, so every transform downstream only ever touches color channels.
//!
//! For sampling we borrow a view (`Image<'a>`) instead of copying pixels, which
//! keeps the per-frame path free of allocations apart from the transform output.
//!
//! Raster coordinates are top-left origin, row-major.

use anyhow::{Context, Result};

use crate::Sample;

/// Owned RGB image (no alpha).
#[derive(Clone, Debug, PartialEq)]
pub struct OwnedImage {
    width: u32,
    height: u32,
    data: Vec<Color>,
}

impl OwnedImage {
    /// Build an image from raw pixels. `data.len()` must equal `width * height`.
    pub fn from_pixels(width: u32, height: u32, data: Vec<Color>) -> Result<Self> {
        anyhow::ensure!(
            data.len() == (width as usize) * (height as usize),
            "pixel count {} does not match {}x{}",
            data.len(),
            width,
            height
        );
        Ok(Self {
            width,
            height,
            data,
        })
    }

    /// A `width`×`height` image filled with one color.
    pub fn filled(width: u32, height: u32, color: Color) -> Self {
        Self {
            width,
            height,
            data: vec![color; (width as usize) * (height as usize)],
        }
    }

    /// Build an `OwnedImage` from RGBA bytes (alpha is discarded).
    ///
    /// The buffer is expected to be tightly packed: `width * height * 4` bytes.
    pub fn from_rgba(width: usize, bytes: &[u8]) -> Self {
        let height = bytes.len() / width.max(1) / 4;
        let data = bytes
            .chunks_exact(4)
            .take(width * height)
            .map(|v| Color::new(v[0], v[1], v[2]))
            .collect::<Vec<_>>();

        Self {
            width: width as u32,
            height: height as u32,
            data,
        }
    }

    pub fn from_rgb_image(img: &image::RgbImage) -> Self {
        let (width, height) = img.dimensions();
        let data = img
            .pixels()
            .map(|p| Color::new(p.0[0], p.0[1], p.0[2]))
            .collect();
        Self {
            width,
            height,
            data,
        }
    }

    /// Load an image file from disk.
    pub fn open<P: AsRef<std::path::Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let img = image::open(path)
            .with_context(|| format!("open {:?}", path))?
            .to_rgb8();
        Ok(Self::from_rgb_image(&img))
    }

    pub fn to_rgb_image(&self) -> image::RgbImage {
        self.as_image().to_rgb_image()
    }

    #[inline(always)]
    pub fn width(&self) -> u32 {
        self.width
    }

    #[inline(always)]
    pub fn height(&self) -> u32 {
        self.height
    }

    #[inline]
    pub fn pixels(&self) -> &[Color] {
        &self.data
    }

    #[inline]
    pub fn pixel(&self, x: u32, y: u32) -> Color {
        self.data[(x + y * self.width) as usize]
    }

    /// Resize this image to the given height (preserving aspect ratio).
    ///
    /// Uses `fast_image_resize` (SIMD-optimized) and keeps output in `Vec<Color>`.
    pub fn resize_h(&mut self, height: u32) -> Result<()> {
        if self.height == height || self.width == 0 || self.height == 0 {
            return Ok(());
        }

        let height = height.max(1);
        let width = ((self.width as u64 * height as u64 / self.height as u64) as u32).max(1);

        // SAFETY: `Color` is `#[repr(C)]` with 3 x `u8`, so it is layout-compatible
        // with `fast_image_resize::pixels::U8x3` (alignment 1).
        let src_pixels = unsafe {
            std::slice::from_raw_parts(
                self.data.as_ptr() as *const fast_image_resize::pixels::U8x3,
                self.data.len(),
            )
        };

        let src = fast_image_resize::images::ImageRef::from_pixels(self.width, self.height, src_pixels)
            .context("fast_image_resize: ImageRef::from_pixels failed")?;

        let mut dst = fast_image_resize::images::Image::new(width, height, fast_image_resize::PixelType::U8x3);

        let mut resizer = fast_image_resize::Resizer::new();
        let options = fast_image_resize::ResizeOptions::new().resize_alg(
            fast_image_resize::ResizeAlg::Convolution(fast_image_resize::FilterType::Bilinear),
        );

        resizer
            .resize(&src, &mut dst, &Some(options))
            .context("fast_image_resize: resize failed")?;

        let bytes: Vec<u8> = dst.into_vec();
        let mut data = Vec::with_capacity((width * height) as usize);
        for px in bytes.chunks_exact(3) {
            data.push(Color::new(px[0], px[1], px[2]));
        }

        self.width = width;
        self.height = height;
        self.data = data;
        Ok(())
    }

    /// Downscale so the height does not exceed `max_height`. Smaller images are returned as-is.
    pub fn downscaled_to(mut self, max_height: u32) -> Result<Self> {
        if self.height > max_height {
            self.resize_h(max_height)?;
        }
        Ok(self)
    }

    pub fn map_pixels(&mut self, f: impl Fn(&mut Color)) {
        for v in &mut self.data {
            f(v);
        }
    }

    /// Rotate the buffer so that it is displayed upright.
    pub fn oriented(self, orientation: Orientation) -> Self {
        let (w, h) = (self.width, self.height);
        match orientation {
            Orientation::Up => self,
            Orientation::Down => {
                let mut data = self.data;
                data.reverse();
                Self {
                    width: w,
                    height: h,
                    data,
                }
            }
            Orientation::Right => {
                // Rotate 90° clockwise: source column x becomes destination row x.
                let mut data = Vec::with_capacity(self.data.len());
                for x in 0..w {
                    for y in (0..h).rev() {
                        data.push(self.pixel(x, y));
                    }
                }
                Self {
                    width: h,
                    height: w,
                    data,
                }
            }
            Orientation::Left => {
                let mut data = Vec::with_capacity(self.data.len());
                for x in (0..w).rev() {
                    for y in 0..h {
                        data.push(self.pixel(x, y));
                    }
                }
                Self {
                    width: h,
                    height: w,
                    data,
                }
            }
        }
    }

    /// Create a borrowed view of this entire image.
    pub fn as_image<'a>(&'a self) -> Image<'a> {
        Image {
            x1: 0,
            y1: 0,
            x2: self.width,
            y2: self.height,
            true_width: self.width,
            data: &self.data,
        }
    }
}

/// How a delivered buffer must be rotated to appear upright.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
pub enum Orientation {
    #[default]
    Up,
    /// Needs a 90° clockwise turn (portrait back camera).
    Right,
    Down,
    /// Needs a 90° counter-clockwise turn.
    Left,
}

// ----------

/// Borrowed image view into an `OwnedImage`.
#[derive(Clone, Copy)]
pub struct Image<'a> {
    x1: u32,
    y1: u32,
    x2: u32,
    y2: u32,
    true_width: u32,
    data: &'a [Color],
}

impl<'a> Image<'a> {
    #[inline(always)]
    pub fn width(&self) -> u32 {
        self.x2 - self.x1
    }

    #[inline(always)]
    pub fn height(&self) -> u32 {
        self.y2 - self.y1
    }

    #[inline(always)]
    fn pixel(&self, x: u32, y: u32) -> &Color {
        &self.data[(x + y * self.true_width) as usize]
    }

    pub fn get_bytes(&self) -> Vec<u8> {
        let mut bytes = vec![0; (self.width() * self.height() * 3) as usize];
        let mut i = 0;
        for y in self.y1..self.y2 {
            for x in self.x1..self.x2 {
                let clr = self.pixel(x, y);
                bytes[i] = clr.r;
                bytes[i + 1] = clr.g;
                bytes[i + 2] = clr.b;
                i += 3;
            }
        }
        bytes
    }

    pub fn to_rgb_image(&self) -> image::RgbImage {
        let mut out = image::RgbImage::new(self.width(), self.height());
        for (x, y, p) in out.enumerate_pixels_mut() {
            let c = self.pixel(self.x1 + x, self.y1 + y);
            *p = image::Rgb([c.r, c.g, c.b]);
        }
        out
    }

    pub fn save_png<P: AsRef<std::path::Path>>(&self, path: P) -> Result<()> {
        self.to_rgb_image()
            .save_with_format(path, image::ImageFormat::Png)
            .context("save png")?;
        Ok(())
    }

    /// Create an arbitrary subimage (relative coordinates), clipped to this view.
    pub fn sub_image(&self, x: u32, y: u32, width: u32, height: u32) -> Self {
        let x = x.min(self.width());
        let y = y.min(self.height());
        let width = width.min(self.width() - x);
        let height = height.min(self.height() - y);

        Self {
            x1: self.x1 + x,
            y1: self.y1 + y,
            x2: self.x1 + x + width,
            y2: self.y1 + y + height,
            true_width: self.true_width,
            data: self.data,
        }
    }

    /// Area-average of every pixel in the view, at full precision.
    ///
    /// Returns `None` for an empty view.
    pub fn average_sample(&self) -> Option<Sample> {
        let count = self.width() as u64 * self.height() as u64;
        if count == 0 {
            return None;
        }

        let mut r = 0u64;
        let mut g = 0u64;
        let mut b = 0u64;
        for y in self.y1..self.y2 {
            for x in self.x1..self.x2 {
                let clr = self.pixel(x, y);
                r += clr.r as u64;
                g += clr.g as u64;
                b += clr.b as u64;
            }
        }

        let scale = 255.0 * count as f64;
        Some(Sample::new(r as f64 / scale, g as f64 / scale, b as f64 / scale))
    }
}

// ----------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize, serde::Serialize)]
#[repr(C)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Color {
    pub const WHITE: Self = Self::new(255, 255, 255);
    pub const BLACK: Self = Self::new(0, 0, 0);

    #[inline]
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    #[inline]
    pub fn to_sample(self) -> Sample {
        Sample::new(
            self.r as f64 / 255.0,
            self.g as f64 / 255.0,
            self.b as f64 / 255.0,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn gradient(width: u32, height: u32) -> OwnedImage {
        let data = (0..width * height)
            .map(|i| Color::new((i % 256) as u8, (i / 256) as u8, 7))
            .collect();
        OwnedImage::from_pixels(width, height, data).unwrap()
    }

    #[test]
    fn from_pixels_rejects_mismatched_length() {
        assert!(OwnedImage::from_pixels(3, 3, vec![Color::BLACK; 8]).is_err());
    }

    #[test]
    fn rgba_drops_alpha() {
        let rgba = [10, 20, 30, 255, 40, 50, 60, 0];
        let img = OwnedImage::from_rgba(2, &rgba);
        assert_eq!(img.pixels(), &[Color::new(10, 20, 30), Color::new(40, 50, 60)]);
    }

    #[test]
    fn orientation_right_then_left_is_identity() {
        let img = gradient(5, 3);
        let turned = img.clone().oriented(Orientation::Right);
        assert_eq!((turned.width(), turned.height()), (3, 5));
        // Bottom-left pixel of the source ends up top-left after a clockwise turn.
        assert_eq!(turned.pixel(0, 0), img.pixel(0, 2));
        assert_eq!(turned.oriented(Orientation::Left), img);
    }

    #[test]
    fn orientation_down_twice_is_identity() {
        let img = gradient(4, 4);
        assert_eq!(img.clone().oriented(Orientation::Down).oriented(Orientation::Down), img);
    }

    #[test]
    fn sub_image_clips_to_bounds() {
        let img = OwnedImage::filled(10, 10, Color::WHITE);
        let view = img.as_image().sub_image(8, 8, 10, 10);
        assert_eq!((view.width(), view.height()), (2, 2));
        assert!(img.as_image().sub_image(10, 0, 5, 5).average_sample().is_none());
    }

    #[test]
    fn average_sample_is_area_average() {
        let mut data = vec![Color::BLACK; 4];
        data[0] = Color::WHITE;
        data[1] = Color::WHITE;
        let img = OwnedImage::from_pixels(2, 2, data).unwrap();
        let avg = img.as_image().average_sample().unwrap();
        assert!((avg.r - 0.5).abs() < 1e-12);
        assert!((avg.g - 0.5).abs() < 1e-12);
    }

    #[test]
    fn downscale_keeps_aspect() {
        let img = OwnedImage::filled(400, 200, Color::new(9, 9, 9))
            .downscaled_to(100)
            .unwrap();
        assert_eq!((img.width(), img.height()), (200, 100));
        assert_eq!(img.pixel(50, 50), Color::new(9, 9, 9));
    }

    #[test]
    fn rgb_image_round_trip() {
        let img = gradient(6, 2);
        assert_eq!(OwnedImage::from_rgb_image(&img.to_rgb_image()), img);
    }
}
