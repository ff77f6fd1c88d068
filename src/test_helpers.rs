//! Shared test utilities for the pixpost test suite.
//!
//! Provides synthetic images (patterned surfaces, in-memory JPEG and PNG
//! files) and hand-built EXIF segments for splicing into JPEGs, so no test
//! depends on fixture files on disk.
//!
//! # Usage
//!
//! ```rust
//! use crate::test_helpers::*;
//!
//! let jpeg = jpeg_with_orientation(64, 48, 6);
//! assert_eq!(read_orientation(&jpeg), Orientation::Rotate90Cw);
//! ```

use crate::imaging::surface::Surface;
use image::codecs::jpeg::JpegEncoder;
use image::codecs::png::PngEncoder;
use image::{ExtendedColorType, ImageEncoder, Rgba, RgbaImage};

// =========================================================================
// Surfaces
// =========================================================================

/// Opaque surface where every pixel encodes its own coordinates.
pub fn pattern_surface(width: u32, height: u32) -> Surface {
    Surface::from_rgba(RgbaImage::from_fn(width, height, |x, y| {
        Rgba([
            x as u8,
            y as u8,
            (x.wrapping_mul(7) ^ y.wrapping_mul(13)) as u8,
            255,
        ])
    }))
}

/// Opaque deterministic noise; compresses poorly, so quality changes show
/// up in the encoded size.
pub fn noise_surface(width: u32, height: u32) -> Surface {
    let mut state: u32 = 0x2545_F491;
    Surface::from_rgba(RgbaImage::from_fn(width, height, |_, _| {
        state ^= state << 13;
        state ^= state >> 17;
        state ^= state << 5;
        let [r, g, b, _] = state.to_le_bytes();
        Rgba([r, g, b, 255])
    }))
}

// =========================================================================
// Encoded files
// =========================================================================

/// Baseline JPEG of a patterned image, no metadata segments.
pub fn synthetic_jpeg(width: u32, height: u32) -> Vec<u8> {
    let rgb = pattern_surface(width, height).to_rgb8();
    let mut out = Vec::new();
    JpegEncoder::new_with_quality(&mut out, 90)
        .write_image(rgb.as_raw(), width, height, ExtendedColorType::Rgb8)
        .unwrap();
    out
}

pub fn png_bytes(image: &RgbaImage) -> Vec<u8> {
    let mut out = Vec::new();
    PngEncoder::new(&mut out)
        .write_image(
            image.as_raw(),
            image.width(),
            image.height(),
            ExtendedColorType::Rgba8,
        )
        .unwrap();
    out
}

/// Synthetic JPEG carrying an EXIF Orientation tag.
pub fn jpeg_with_orientation(width: u32, height: u32, tag: u16) -> Vec<u8> {
    let jpeg = synthetic_jpeg(width, height);
    let mut out = jpeg[..2].to_vec();
    out.extend(exif_segment(tag, true));
    out.extend(&jpeg[2..]);
    out
}

// =========================================================================
// EXIF
// =========================================================================

/// APP1 segment with a one-entry IFD0 holding Orientation = `tag`.
///
/// Byte layout (offsets into the returned vector):
///
/// | Offset | Field |
/// |---|---|
/// | 0..2 | `FF E1` marker |
/// | 2..4 | segment length (big-endian) |
/// | 4..10 | `Exif\0\0` |
/// | 10..12 | byte order, `II` or `MM` |
/// | 12..14 | magic `0x002A` |
/// | 14..18 | IFD0 offset (8) |
/// | 18..20 | entry count (1) |
/// | 20..32 | Orientation entry, value at 28..30 |
/// | 32..36 | next IFD offset (0) |
pub fn exif_segment(tag: u16, little_endian: bool) -> Vec<u8> {
    let u16b = |v: u16| {
        if little_endian {
            v.to_le_bytes()
        } else {
            v.to_be_bytes()
        }
    };
    let u32b = |v: u32| {
        if little_endian {
            v.to_le_bytes()
        } else {
            v.to_be_bytes()
        }
    };

    let mut tiff = Vec::new();
    tiff.extend(if little_endian { b"II" } else { b"MM" });
    tiff.extend(u16b(0x002A));
    tiff.extend(u32b(8));
    tiff.extend(u16b(1));
    tiff.extend(u16b(0x0112)); // Orientation
    tiff.extend(u16b(3)); // SHORT
    tiff.extend(u32b(1));
    tiff.extend(u16b(tag));
    tiff.extend([0, 0]);
    tiff.extend(u32b(0));

    let mut segment = vec![0xFF, 0xE1];
    let len = (2 + 6 + tiff.len()) as u16;
    segment.extend(len.to_be_bytes());
    segment.extend(b"Exif\0\0");
    segment.extend(tiff);
    segment
}

/// Minimal SOI + `segment` + EOI, no image data.
pub fn jpeg_with_exif_segment(segment: &[u8]) -> Vec<u8> {
    let mut out = vec![0xFF, 0xD8];
    out.extend_from_slice(segment);
    out.extend([0xFF, 0xD9]);
    out
}
