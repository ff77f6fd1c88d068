//! # pixpost
//!
//! Takes one photo a user picked, makes it safe and cheap to send, and
//! uploads it. Phone cameras store pixels sideways and record the intended
//! rotation in an EXIF tag; many receivers ignore that tag, and full-size
//! camera files are larger than most endpoints want. pixpost fixes both on
//! the client side.
//!
//! # Architecture: One Photo, Four Stages
//!
//! ```text
//! 1. Read      selection → bytes          (exactly one image file)
//! 2. Orient    bytes     → EXIF tag 1..8  (JPEG APP1 segment, defaults to 1)
//! 3. Compress  bytes     → JPEG           (≤ 4 MP, drawn upright, re-encoded)
//! 4. Upload    JPEG      → server         (multipart POST/PUT with progress)
//! ```
//!
//! Stages run one after another inside [`process::Pipeline::handle_selection`],
//! with hook calls in between. A pipeline refuses a new selection while one
//! is in flight.
//!
//! # Module Map
//!
//! | Module | Role |
//! |--------|------|
//! | [`process`] | The pipeline: stage order, hooks, processing flag, events |
//! | [`imaging`] | EXIF orientation, size solving, tiled resampling, rotation, JPEG encode |
//! | [`upload`] | Multipart transport with two-phase progress |
//! | [`config`] | `pixpost.toml` loading, merging and sanitizing |
//! | [`types`] | Selected files and encoded assets shared between stages |
//! | [`naming`] | Content hash and `<stem>.<hash>.jpg` upload names |
//! | [`output`] | CLI output formatting for events and results |
//!
//! # Design Decisions
//!
//! ## Bounded Memory While Resampling
//!
//! The output is held under 4,000,000 pixels, and no single resampling draw
//! touches more than 1,000,000. Larger sources are painted as a square grid
//! of overlapping tiles so that peak scratch memory stays small no matter
//! how big the camera sensor was. See [`imaging::calculations`].
//!
//! ## Never Larger Than the Source
//!
//! Re-encoding an already small JPEG can grow it. When that happens the
//! original bytes are uploaded untouched, still under a content-hash name.
//!
//! ## Mirrored Orientations
//!
//! EXIF tags 2, 4, 5 and 7 describe mirrored images. Cameras essentially
//! never write them, and they are passed through uncorrected with a
//! warning; only the rotations (3, 6, 8) are applied.
//!
//! ## Pure-Rust Imaging
//!
//! Decoding and encoding use the `image` crate only, so the binary has no
//! system library dependencies.

pub mod config;
pub mod imaging;
pub mod naming;
pub mod output;
pub mod process;
pub mod types;
pub mod upload;

#[cfg(test)]
pub(crate) mod test_helpers;
