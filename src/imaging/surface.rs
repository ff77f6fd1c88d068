//! Raster surfaces with a canvas-style drawing context.
//!
//! A [`Surface`] is an RGBA pixel buffer plus a current [`Affine`] transform.
//! Destination surfaces start filled with opaque white so that transparent
//! sources flatten cleanly into JPEG, which has no alpha channel.
//!
//! [`Surface::draw_image`] follows the usual 2D-canvas contract: a source
//! rectangle is scaled into a destination rectangle given in user space,
//! user space is mapped to device pixels through the current transform, and
//! the result is alpha-blended onto what is already there.

use super::params::Rect;
use image::buffer::ConvertBuffer;
use image::imageops::{self, FilterType};
use image::{DynamicImage, Pixel, Rgba, RgbaImage, RgbImage};

/// Fill color of freshly allocated destination surfaces.
pub const BACKGROUND: Rgba<u8> = Rgba([255, 255, 255, 255]);

const RESAMPLE_FILTER: FilterType = FilterType::Triangle;

/// 2×3 affine matrix `[a, b, c, d, e, f]` mapping user `(x, y)` to
/// device `(a·x + c·y + e, b·x + d·y + f)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Affine(pub [f64; 6]);

impl Affine {
    pub const IDENTITY: Affine = Affine([1.0, 0.0, 0.0, 1.0, 0.0, 0.0]);

    pub fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        let [a, b, c, d, e, f] = self.0;
        (a * x + c * y + e, b * x + d * y + f)
    }

    /// `None` for singular matrices.
    pub fn inverse(&self) -> Option<Affine> {
        let [a, b, c, d, e, f] = self.0;
        let det = a * d - b * c;
        if det == 0.0 || !det.is_finite() {
            return None;
        }
        Some(Affine([
            d / det,
            -b / det,
            -c / det,
            a / det,
            (c * f - d * e) / det,
            (b * e - a * f) / det,
        ]))
    }

    pub fn is_identity(&self) -> bool {
        *self == Self::IDENTITY
    }
}

impl Default for Affine {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Pixel buffer with a drawing transform.
#[derive(Debug, Clone, PartialEq)]
pub struct Surface {
    pixels: RgbaImage,
    transform: Affine,
}

impl Surface {
    /// Allocate a destination surface filled with [`BACKGROUND`].
    ///
    /// Zero dimensions are bumped to one pixel.
    pub fn new(width: u32, height: u32) -> Self {
        Self::from_rgba(RgbaImage::from_pixel(
            width.max(1),
            height.max(1),
            BACKGROUND,
        ))
    }

    /// Wrap a decoded image as a source surface (alpha is preserved).
    pub fn from_image(image: DynamicImage) -> Self {
        Self::from_rgba(image.into_rgba8())
    }

    pub fn from_rgba(pixels: RgbaImage) -> Self {
        Self {
            pixels,
            transform: Affine::IDENTITY,
        }
    }

    pub fn width(&self) -> u32 {
        self.pixels.width()
    }

    pub fn height(&self) -> u32 {
        self.pixels.height()
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.pixels.dimensions()
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    /// Opaque RGB copy for encoders without alpha support.
    pub fn to_rgb8(&self) -> RgbImage {
        self.pixels.convert()
    }

    pub fn transform(&self) -> Affine {
        self.transform
    }

    pub fn set_transform(&mut self, transform: Affine) {
        self.transform = transform;
    }

    pub fn reset_transform(&mut self) {
        self.transform = Affine::IDENTITY;
    }

    /// Draw `src` (in `source` pixels) into `dst` (in user space).
    pub fn draw_image(&mut self, source: &Surface, src: Rect, dst: Rect) {
        if src.width <= 0.0 || src.height <= 0.0 || dst.width <= 0.0 || dst.height <= 0.0 {
            return;
        }
        if self.transform.is_identity() {
            self.draw_scaled(&source.pixels, src, dst);
        } else {
            self.draw_transformed(&source.pixels, src, dst);
        }
    }

    /// Identity-transform draw: crop, resample, blend.
    fn draw_scaled(&mut self, source: &RgbaImage, src: Rect, dst: Rect) {
        let scale_x = dst.width / src.width;
        let scale_y = dst.height / src.height;

        // Clip the source rectangle to the source bounds and shrink the
        // destination by the same proportion.
        let x0 = src.x.max(0.0);
        let y0 = src.y.max(0.0);
        let x1 = src.right().min(source.width() as f64);
        let y1 = src.bottom().min(source.height() as f64);
        if x1 <= x0 || y1 <= y0 {
            return;
        }
        let dst = Rect::new(
            dst.x + (x0 - src.x) * scale_x,
            dst.y + (y0 - src.y) * scale_y,
            (x1 - x0) * scale_x,
            (y1 - y0) * scale_y,
        );

        let crop_x = x0.floor() as u32;
        let crop_y = y0.floor() as u32;
        let crop_w = (x1.ceil() as u32).saturating_sub(crop_x).max(1);
        let crop_h = (y1.ceil() as u32).saturating_sub(crop_y).max(1);
        let out_w = dst.width.round() as u32;
        let out_h = dst.height.round() as u32;
        if out_w == 0 || out_h == 0 {
            return;
        }

        let region = imageops::crop_imm(source, crop_x, crop_y, crop_w, crop_h).to_image();
        let scaled = if (crop_w, crop_h) == (out_w, out_h) {
            region
        } else {
            imageops::resize(&region, out_w, out_h, RESAMPLE_FILTER)
        };

        let origin_x = dst.x.round() as i64;
        let origin_y = dst.y.round() as i64;
        for (x, y, pixel) in scaled.enumerate_pixels() {
            let (Ok(tx), Ok(ty)) = (
                u32::try_from(origin_x + x as i64),
                u32::try_from(origin_y + y as i64),
            ) else {
                continue;
            };
            if let Some(target) = self.pixels.get_pixel_mut_checked(tx, ty) {
                blend_over(target, pixel);
            }
        }
    }

    /// General affine draw by inverse mapping each device pixel center.
    ///
    /// Nearest-neighbour sampling keeps quarter-turn rotations lossless.
    fn draw_transformed(&mut self, source: &RgbaImage, src: Rect, dst: Rect) {
        let Some(inverse) = self.transform.inverse() else {
            return;
        };
        let scale_x = src.width / dst.width;
        let scale_y = src.height / dst.height;
        let (src_w, src_h) = (source.width() as f64, source.height() as f64);

        for (x, y, pixel) in self.pixels.enumerate_pixels_mut() {
            let (ux, uy) = inverse.apply(x as f64 + 0.5, y as f64 + 0.5);
            if ux < dst.x || ux >= dst.right() || uy < dst.y || uy >= dst.bottom() {
                continue;
            }
            let sx = (src.x + (ux - dst.x) * scale_x).floor();
            let sy = (src.y + (uy - dst.y) * scale_y).floor();
            if sx < 0.0 || sy < 0.0 || sx >= src_w || sy >= src_h {
                continue;
            }
            blend_over(pixel, source.get_pixel(sx as u32, sy as u32));
        }
    }
}

/// Source-over compositing; opaque and fully transparent pixels are exact.
fn blend_over(target: &mut Rgba<u8>, source: &Rgba<u8>) {
    match source.0[3] {
        0 => {}
        255 => *target = *source,
        _ => target.blend(source),
    }
}
