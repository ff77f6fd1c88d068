//! Parameter types for image operations.
//!
//! These structs describe *what* to do, not *how* to do it. They are the
//! interface between the pure [`calculations`](super::calculations) (which
//! decide sizes and tile layouts) and the pixel code in
//! [`surface`](super::surface) and [`tiling`](super::tiling).
//!
//! ## Types
//!
//! - [`Quality`]: JPEG encode quality as a ratio in `(0, 1]`, default `1.0`.
//! - [`SizeConstraint`]: target dimensions plus the downscale ratio that produced them.
//! - [`Rect`]: a floating-point rectangle in surface coordinates.
//! - [`Tile`]: one source/destination rectangle pair of a tiled composite.

use serde::Serialize;

/// Encode quality expressed as a ratio in `(0, 1]`.
///
/// Out-of-range and non-finite values fall back to the default of `1.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Quality(f64);

impl Quality {
    pub fn new(ratio: f64) -> Self {
        if Self::is_valid_ratio(ratio) {
            Self(ratio)
        } else {
            Self::default()
        }
    }

    /// `true` when `ratio` is finite and in `(0, 1]`.
    pub fn is_valid_ratio(ratio: f64) -> bool {
        ratio.is_finite() && ratio > 0.0 && ratio <= 1.0
    }

    pub fn ratio(self) -> f64 {
        self.0
    }

    /// Quality on the JPEG encoder's 1–100 scale.
    pub fn jpeg_quality(self) -> u8 {
        (self.0 * 100.0).round().clamp(1.0, 100.0) as u8
    }
}

impl Default for Quality {
    fn default() -> Self {
        Self(1.0)
    }
}

/// Target dimensions chosen under a pixel budget.
///
/// `ratio` is the factor the source was divided by; `1.0` means the source
/// already fit the budget and the dimensions are unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SizeConstraint {
    pub width: u32,
    pub height: u32,
    pub ratio: f64,
}

impl SizeConstraint {
    pub fn needs_downscale(&self) -> bool {
        self.ratio > 1.0
    }
}

/// Axis-aligned rectangle in surface coordinates.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Rect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl Rect {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Rectangle anchored at the origin.
    pub fn sized(width: f64, height: f64) -> Self {
        Self::new(0.0, 0.0, width, height)
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }
}

/// One cell of a tiled composite.
///
/// `src` is read from the source surface (already scaled by the outer
/// downscale ratio); `dst` is where the intermediate tile lands on the
/// destination surface. Adjacent `dst` rectangles overlap by the tile
/// padding so resampling seams are painted over.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Tile {
    pub column: u32,
    pub row: u32,
    pub src: Rect,
    pub dst: Rect,
}
