//! Raster backend trait and shared types.
//!
//! The [`RasterBackend`] trait is the seam between the pipeline and the
//! codecs: bytes go in and come out through it, everything in between
//! (sizing, tiling, orientation) happens on [`Surface`]s.
//!
//! The production implementation is
//! [`RustBackend`](super::rust_backend::RustBackend), built on the `image`
//! crate's pure Rust decoders and JPEG encoder.

use super::params::Quality;
use super::surface::Surface;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("Decode failed: {0}")]
    Decode(String),
    #[error("Encode failed: {0}")]
    Encode(String),
}

/// Decode and encode primitives.
pub trait RasterBackend: Sync {
    /// Decode any supported container into a source surface.
    fn decode(&self, data: &[u8]) -> Result<Surface, BackendError>;

    /// Serialize a surface to JPEG bytes.
    fn encode_jpeg(&self, surface: &Surface, quality: Quality) -> Result<Vec<u8>, BackendError>;
}
