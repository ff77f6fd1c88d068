//! Paint a source into a downscaled destination, tile by tile.
//!
//! Large destinations are drawn as a grid of small intermediate surfaces so
//! that no single resample exceeds [`TILE_PIXEL_BUDGET`] pixels. The grid
//! layout comes from [`plan_tiles`]; this module only moves pixels.

use super::calculations::{TILE_PIXEL_BUDGET, plan_tiles};
use super::params::{Rect, SizeConstraint};
use super::surface::Surface;

/// Draw `source` into a fresh white surface sized by `target`.
pub fn composite(source: &Surface, target: SizeConstraint) -> Surface {
    composite_with_budget(source, target, TILE_PIXEL_BUDGET)
}

pub(crate) fn composite_with_budget(
    source: &Surface,
    target: SizeConstraint,
    tile_budget: u64,
) -> Surface {
    let mut dest = Surface::new(target.width, target.height);
    let whole = Rect::sized(source.width() as f64, source.height() as f64);

    let Some(plan) = plan_tiles(
        source.dimensions(),
        dest.dimensions(),
        target.ratio,
        tile_budget,
    ) else {
        let (w, h) = dest.dimensions();
        dest.draw_image(source, whole, Rect::sized(w as f64, h as f64));
        return dest;
    };

    log::debug!(
        "tiling {}x{} as {}x{} tiles of {}x{}",
        target.width,
        target.height,
        plan.count,
        plan.count,
        plan.tile_width,
        plan.tile_height
    );

    let cell_rect = Rect::sized(plan.tile_width as f64, plan.tile_height as f64);
    for tile in &plan.tiles {
        let mut cell = Surface::new(plan.tile_width, plan.tile_height);
        cell.draw_image(source, tile.src, cell_rect);
        dest.draw_image(&cell, cell_rect, tile.dst);
    }
    dest
}
