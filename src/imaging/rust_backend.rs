//! Pure Rust raster backend.
//!
//! Everything is statically linked into the binary.
//!
//! ## Crate mapping
//!
//! | Operation | Crate / function |
//! |---|---|
//! | Sniff container | `image::guess_format` |
//! | Decode (JPEG, PNG, GIF, BMP) | `image::load_from_memory_with_format` |
//! | Encode → JPEG | `image::codecs::jpeg::JpegEncoder::new_with_quality` on RGB8 |
//!
//! EXIF orientation is not applied by the decoder; the pipeline reads it
//! separately with [`exif_parser`](super::exif_parser) and corrects after
//! compositing.

use super::backend::{BackendError, RasterBackend};
use super::params::Quality;
use super::surface::Surface;
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageEncoder, ImageFormat};
use std::sync::LazyLock;

/// MIME types whose decoders are compiled in.
const DECODER_CANDIDATES: &[(&str, ImageFormat)] = &[
    ("image/jpeg", ImageFormat::Jpeg),
    ("image/png", ImageFormat::Png),
    ("image/gif", ImageFormat::Gif),
    ("image/bmp", ImageFormat::Bmp),
];

static DECODABLE_MIME_TYPES: LazyLock<Vec<&'static str>> = LazyLock::new(|| {
    DECODER_CANDIDATES
        .iter()
        .filter(|(_, fmt)| fmt.reading_enabled())
        .map(|(mime, _)| *mime)
        .collect()
});

/// MIME types this backend can decode.
pub fn decodable_mime_types() -> &'static [&'static str] {
    &DECODABLE_MIME_TYPES
}

/// Pure Rust backend using the `image` crate ecosystem.
///
/// See the [module docs](self) for the crate-to-operation mapping.
pub struct RustBackend;

impl RustBackend {
    pub fn new() -> Self {
        Self
    }
}

impl Default for RustBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl RasterBackend for RustBackend {
    fn decode(&self, data: &[u8]) -> Result<Surface, BackendError> {
        let format = image::guess_format(data)
            .map_err(|e| BackendError::Decode(format!("Unrecognised image data: {}", e)))?;
        let img = image::load_from_memory_with_format(data, format)
            .map_err(|e| BackendError::Decode(format!("Failed to decode {:?}: {}", format, e)))?;
        Ok(Surface::from_image(img))
    }

    fn encode_jpeg(&self, surface: &Surface, quality: Quality) -> Result<Vec<u8>, BackendError> {
        let rgb = surface.to_rgb8();
        let mut out = Vec::new();
        JpegEncoder::new_with_quality(&mut out, quality.jpeg_quality())
            .write_image(
                rgb.as_raw(),
                rgb.width(),
                rgb.height(),
                ExtendedColorType::Rgb8,
            )
            .map_err(|e| BackendError::Encode(format!("JPEG encode failed: {}", e)))?;
        Ok(out)
    }
}
