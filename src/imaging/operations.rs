//! High-level image operations.
//!
//! These functions combine calculations with backend execution: decode the
//! source, size it under the outer budget, paint it through the tiled
//! compositor, correct its orientation, encode it, and keep whichever of
//! encode and original is smaller.

use super::backend::{BackendError, RasterBackend};
use super::calculations::{
    OUTER_PIXEL_BUDGET, RECOMMENDED_MAX_LONG_EDGE, RECOMMENDED_MAX_SHORT_EDGE, SolveMode,
    TILE_PADDING, TILE_PIXEL_BUDGET, TilePlan, plan_tiles, solve_size_constraint,
    within_recommended_aspect, within_recommended_size,
};
use super::orientation::{self, Orientation};
use super::params::{Quality, SizeConstraint};
use super::surface::Surface;
use super::tiling;
use crate::types::{EncodedAsset, JPEG_MIME};
use bytes::Bytes;
use serde::Serialize;

/// Result type for image operations.
pub type Result<T> = std::result::Result<T, BackendError>;

/// How a source of a given size will be resampled.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResamplePlan {
    pub source: (u32, u32),
    pub outer: SizeConstraint,
    /// `None` when a single direct draw fits the tile budget.
    pub tiles: Option<TilePlan>,
}

/// Size plan for a `width × height` source, without touching pixels.
pub fn plan_resample(width: u32, height: u32) -> ResamplePlan {
    let outer = solve_size_constraint(width, height, OUTER_PIXEL_BUDGET, SolveMode::Continuous);
    let tiles = plan_tiles(
        (width, height),
        (outer.width, outer.height),
        outer.ratio,
        TILE_PIXEL_BUDGET,
    );
    ResamplePlan {
        source: (width, height),
        outer,
        tiles,
    }
}

/// Advisory messages for sources outside the recommended envelope.
///
/// Processing always continues; callers log these.
pub fn source_warnings(width: u32, height: u32) -> Vec<String> {
    let mut warnings = Vec::new();
    if !within_recommended_size(width, height) {
        warnings.push(format!(
            "source is {}x{}; recommended is at most {}x{} and at least {}px on the short edge",
            width,
            height,
            RECOMMENDED_MAX_LONG_EDGE,
            RECOMMENDED_MAX_SHORT_EDGE,
            TILE_PADDING * 2
        ));
    }
    if !within_recommended_aspect(width, height) {
        warnings.push(format!(
            "source aspect ratio {}:{} is beyond 1000:1",
            width, height
        ));
    }
    warnings
}

/// Decode `data` and log any size warnings.
pub fn decode(backend: &impl RasterBackend, data: &[u8]) -> Result<Surface> {
    let surface = backend.decode(data)?;
    for warning in source_warnings(surface.width(), surface.height()) {
        log::warn!("{}", warning);
    }
    Ok(surface)
}

/// Resample, orient and encode `source`.
///
/// `original` and `original_mime` describe the bytes `source` was decoded
/// from; they are returned unchanged when the encode comes out larger.
pub fn compress(
    backend: &impl RasterBackend,
    source: &Surface,
    original: &Bytes,
    original_mime: &str,
    orientation: Orientation,
    quality: Quality,
) -> Result<EncodedAsset> {
    let (width, height) = source.dimensions();
    let outer = solve_size_constraint(width, height, OUTER_PIXEL_BUDGET, SolveMode::Continuous);
    if outer.needs_downscale() {
        log::debug!(
            "downscaling {}x{} to {}x{} (ratio {:.3})",
            width,
            height,
            outer.width,
            outer.height,
            outer.ratio
        );
    }

    let composited = tiling::composite(source, outer);
    let upright = orientation::correct(composited, orientation);
    let encoded = backend.encode_jpeg(&upright, quality)?;

    if encoded.len() > original.len() {
        log::info!(
            "encoded {} bytes exceeds original {} bytes, keeping original",
            encoded.len(),
            original.len()
        );
        return Ok(EncodedAsset::original(
            original.clone(),
            original_mime,
            quality.ratio(),
        ));
    }

    Ok(EncodedAsset {
        bytes: Bytes::from(encoded),
        mime: JPEG_MIME.to_string(),
        quality: quality.ratio(),
        fell_back: false,
    })
}
