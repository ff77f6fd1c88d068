//! Image processing in pure Rust, statically linked.
//!
//! | Operation | Crate / function |
//! |---|---|
//! | **Orientation** | custom EXIF reader (JPEG APP1, tag `0x0112`) |
//! | **Decode** | `image::load_from_memory_with_format` |
//! | **Resample** | tiled `crop_imm` + `resize` (Triangle) onto white surfaces |
//! | **Rotate** | affine draw, nearest-neighbour inverse mapping |
//! | **Encode → JPEG** | `JpegEncoder::new_with_quality` |
//!
//! The module is split into:
//! - **Calculations**: Pure functions for size and tile math (unit testable)
//! - **Parameters**: Data structures describing image operations
//! - **Surface**: Pixel buffers with a canvas-style affine drawing context
//! - **Tiling / Orientation**: Pixel work built on surfaces
//! - **Backend**: [`RasterBackend`] trait + [`RustBackend`]
//! - **Operations**: High-level functions combining all of the above

pub mod backend;
pub mod calculations;
pub mod exif_parser;
pub mod operations;
pub mod orientation;
mod params;
pub mod rust_backend;
pub mod surface;
pub mod tiling;

pub use backend::{BackendError, RasterBackend};
pub use exif_parser::read_orientation;
pub use operations::{ResamplePlan, compress, decode, plan_resample};
pub use orientation::Orientation;
pub use params::{Quality, Rect, SizeConstraint, Tile};
pub use rust_backend::RustBackend;
pub use surface::Surface;
