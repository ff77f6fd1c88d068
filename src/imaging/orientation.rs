//! EXIF orientation values and the rotation that undoes them.
//!
//! Only the three pure rotations (tags 3, 6 and 8) are corrected. Mirrored
//! orientations are recognised but left as they are, with a warning.

use super::params::Rect;
use super::surface::{Affine, Surface};
use serde::Serialize;

/// EXIF Orientation tag values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum Orientation {
    #[default]
    Normal = 1,
    MirrorHorizontal = 2,
    Rotate180 = 3,
    MirrorVertical = 4,
    Transpose = 5,
    Rotate90Cw = 6,
    Transverse = 7,
    Rotate90Ccw = 8,
}

impl Orientation {
    pub fn from_tag(tag: u16) -> Option<Self> {
        Some(match tag {
            1 => Self::Normal,
            2 => Self::MirrorHorizontal,
            3 => Self::Rotate180,
            4 => Self::MirrorVertical,
            5 => Self::Transpose,
            6 => Self::Rotate90Cw,
            7 => Self::Transverse,
            8 => Self::Rotate90Ccw,
            _ => return None,
        })
    }

    pub fn tag(self) -> u16 {
        self as u16
    }

    pub fn is_mirrored(self) -> bool {
        matches!(
            self,
            Self::MirrorHorizontal | Self::MirrorVertical | Self::Transpose | Self::Transverse
        )
    }

    /// Whether [`correct`] changes anything for this value.
    pub fn needs_correction(self) -> bool {
        matches!(self, Self::Rotate180 | Self::Rotate90Cw | Self::Rotate90Ccw)
    }

    /// Quarter turns swap width and height.
    pub fn swaps_dimensions(self) -> bool {
        matches!(self, Self::Rotate90Cw | Self::Rotate90Ccw)
    }

    /// Drawing transform that undoes the rotation.
    pub fn matrix(self) -> Affine {
        match self {
            Self::Rotate180 => Affine([-1.0, 0.0, 0.0, -1.0, 0.0, 0.0]),
            Self::Rotate90Cw => Affine([0.0, 1.0, -1.0, 0.0, 0.0, 0.0]),
            Self::Rotate90Ccw => Affine([0.0, -1.0, 1.0, 0.0, 0.0, 0.0]),
            _ => Affine::IDENTITY,
        }
    }
}

/// Redraw `surface` upright.
///
/// Normal, unknown and mirrored orientations return the input untouched.
pub fn correct(surface: Surface, orientation: Orientation) -> Surface {
    if !orientation.needs_correction() {
        if orientation.is_mirrored() {
            log::warn!(
                "mirrored orientation {} is not corrected",
                orientation.tag()
            );
        }
        return surface;
    }

    let (width, height) = if orientation.swaps_dimensions() {
        (surface.height(), surface.width())
    } else {
        (surface.width(), surface.height())
    };
    let matrix = orientation.matrix();
    let [a, b, c, d, e, f] = matrix.0;

    // Source extent in user space, negative along axes the matrix flips.
    let (w, h) = (width as f64, height as f64);
    let span_x = w * a + h * -c - e;
    let span_y = w * -b + h * d - f;
    let dst = Rect::new(span_x.min(0.0), span_y.min(0.0), span_x.abs(), span_y.abs());

    let mut upright = Surface::new(width, height);
    upright.set_transform(matrix);
    upright.draw_image(
        &surface,
        Rect::sized(surface.width() as f64, surface.height() as f64),
        dst,
    );
    upright.reset_transform();

    log::debug!(
        "corrected orientation {}: {}x{} -> {}x{}",
        orientation.tag(),
        surface.width(),
        surface.height(),
        width,
        height
    );
    upright
}
