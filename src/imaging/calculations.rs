//! Pure calculation functions for image dimensions.
//!
//! All functions here are pure and testable without any I/O or images.
//!
//! Two budgets drive the resample:
//!
//! - [`OUTER_PIXEL_BUDGET`] caps the whole output surface. The downscale
//!   factor is continuous (`sqrt(area / budget)`), so the output keeps the
//!   source aspect ratio and lands just under the budget.
//! - [`TILE_PIXEL_BUDGET`] caps a single draw. When the output surface is
//!   larger than that, it is painted as a `count × count` grid of tiles whose
//!   count is an integer, each tile enlarged by [`TILE_PADDING`] on both
//!   sides so neighbours overlap.

use super::params::{Rect, SizeConstraint, Tile};
use serde::Serialize;

/// Maximum pixel count of the output surface.
pub const OUTER_PIXEL_BUDGET: u64 = 4_000_000;

/// Maximum pixel count of a single tile draw.
pub const TILE_PIXEL_BUDGET: u64 = 1_000_000;

/// Overlap, in pixels, added on each side of a tile.
pub const TILE_PADDING: u32 = 5;

/// Longest edge above which a source is reported as oversized.
pub const RECOMMENDED_MAX_LONG_EDGE: u32 = 3264;

/// Shortest edge above which a source is reported as oversized.
pub const RECOMMENDED_MAX_SHORT_EDGE: u32 = 2448;

/// How [`solve_size_constraint`] picks its ratio.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SolveMode {
    /// Continuous ratio; target dimensions are truncated to whole pixels.
    Continuous,
    /// Integer ratio (tile count per axis); target dimensions are the
    /// per-tile size including padding on both sides.
    Tiled,
}

/// Fit `width × height` under `pixel_budget`.
///
/// # Examples
/// ```
/// # use pixpost::imaging::calculations::{solve_size_constraint, SolveMode};
/// let c = solve_size_constraint(4000, 3000, 4_000_000, SolveMode::Continuous);
/// assert_eq!((c.width, c.height), (2309, 1732));
///
/// let c = solve_size_constraint(800, 600, 4_000_000, SolveMode::Continuous);
/// assert_eq!((c.width, c.height, c.ratio), (800, 600, 1.0));
/// ```
pub fn solve_size_constraint(
    width: u32,
    height: u32,
    pixel_budget: u64,
    mode: SolveMode,
) -> SizeConstraint {
    let area = width as f64 * height as f64;
    let over = area / pixel_budget.max(1) as f64;

    if over <= 1.0 {
        return SizeConstraint {
            width,
            height,
            ratio: 1.0,
        };
    }

    match mode {
        SolveMode::Continuous => {
            let ratio = over.sqrt();
            SizeConstraint {
                width: shrink(width, ratio),
                height: shrink(height, ratio),
                ratio,
            }
        }
        SolveMode::Tiled => {
            let ratio = over.sqrt().floor() + 1.0;
            SizeConstraint {
                width: (width as f64 / ratio).floor() as u32 + TILE_PADDING * 2,
                height: (height as f64 / ratio).floor() as u32 + TILE_PADDING * 2,
                ratio,
            }
        }
    }
}

/// Divide an edge by `ratio`, truncating, never below one pixel.
fn shrink(edge: u32, ratio: f64) -> u32 {
    ((edge as f64 / ratio).floor() as u32).max(1)
}

/// Tile overlap for a destination: `floor(min(w / 2, h / 2, TILE_PADDING))`.
pub fn tile_padding(dest_width: u32, dest_height: u32) -> u32 {
    (dest_width as f64 / 2.0)
        .min(dest_height as f64 / 2.0)
        .min(TILE_PADDING as f64)
        .floor() as u32
}

/// Layout of a tiled composite.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TilePlan {
    /// Intermediate tile surface size (padding included).
    pub tile_width: u32,
    pub tile_height: u32,
    /// Overlap applied at interior seams.
    pub padding: u32,
    /// Tiles per axis.
    pub count: u32,
    /// Column-major: every row of column 0, then column 1, ...
    pub tiles: Vec<Tile>,
}

/// Plan the tiles for drawing `source` into a `dest` surface.
///
/// Returns `None` when the destination fits `tile_budget` and a single
/// direct draw is enough.
///
/// `outer_ratio` maps destination pixels back to source pixels. Every
/// rectangle is clamped so it starts inside its surface and does not run
/// past the far edge.
pub fn plan_tiles(
    source: (u32, u32),
    dest: (u32, u32),
    outer_ratio: f64,
    tile_budget: u64,
) -> Option<TilePlan> {
    let (src_w, src_h) = (source.0 as f64, source.1 as f64);
    let (dst_w, dst_h) = (dest.0 as f64, dest.1 as f64);

    let tile = solve_size_constraint(dest.0, dest.1, tile_budget, SolveMode::Tiled);
    if !tile.needs_downscale() {
        return None;
    }

    let padding = tile_padding(dest.0, dest.1);
    let pad = padding as f64;
    let count = tile.ratio as u32;
    let (tile_w, tile_h) = (tile.width as f64, tile.height as f64);

    let mut tiles = Vec::with_capacity(grid_len(count));
    for column in 0..count {
        for row in 0..count {
            let step_x = column as f64 * (tile_w - pad * 2.0) - pad;
            let step_y = row as f64 * (tile_h - pad * 2.0) - pad;

            let src = Rect::new(
                (step_x * outer_ratio).max(0.0).min(src_w - tile_w * outer_ratio),
                (step_y * outer_ratio).max(0.0).min(src_h - tile_h * outer_ratio),
                tile_w * outer_ratio,
                tile_h * outer_ratio,
            );
            let dst = Rect::new(
                step_x.max(0.0).min(dst_w - tile_w),
                step_y.max(0.0).min(dst_h - tile_h),
                tile_w,
                tile_h,
            );

            tiles.push(Tile {
                column,
                row,
                src,
                dst,
            });
        }
    }

    Some(TilePlan {
        tile_width: tile.width,
        tile_height: tile.height,
        padding,
        count,
        tiles,
    })
}

/// Cells in a `count` x `count` grid.
fn grid_len(count: u32) -> usize {
    (count as usize).saturating_mul(count as usize)
}

/// `false` when the source is larger than recommended or too thin to tile.
pub fn within_recommended_size(width: u32, height: u32) -> bool {
    width.max(height) <= RECOMMENDED_MAX_LONG_EDGE
        && width.min(height) <= RECOMMENDED_MAX_SHORT_EDGE
        && width.min(height) >= TILE_PADDING * 2
}

/// `false` when the aspect ratio is beyond 1000:1 either way.
pub fn within_recommended_aspect(width: u32, height: u32) -> bool {
    let aspect = width as f64 / height as f64;
    (1e-3..=1e3).contains(&aspect)
}
