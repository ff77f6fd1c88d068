//! Shared types passed between pipeline stages.
//!
//! [`SelectedFile`] is what the input surface hands over, [`EncodedAsset`]
//! is what compression produces and upload consumes.

use bytes::Bytes;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// MIME types the pipeline accepts, compared case-insensitively.
pub const ACCEPTED_MIME_TYPES: &[&str] = &["image/jpeg", "image/png", "image/gif", "image/bmp"];

/// Output MIME type of a fresh encode.
pub const JPEG_MIME: &str = "image/jpeg";

/// A file chosen for processing.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SelectedFile {
    pub path: PathBuf,
    /// File name as shown to the user; the upload name is derived from it.
    pub name: String,
    /// Detected MIME type, empty when unknown.
    pub mime: String,
}

impl SelectedFile {
    /// Describe `path`, sniffing the MIME type from its leading bytes.
    ///
    /// Falls back to the extension when the content is not recognised.
    /// Unreadable files get an empty MIME type and fail the type check later.
    pub fn from_path(path: &Path) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();

        let mime = match infer::get_from_path(path) {
            Ok(Some(kind)) => kind.mime_type().to_string(),
            _ => mime_from_extension(path).unwrap_or_default().to_string(),
        };

        Self {
            path: path.to_path_buf(),
            name,
            mime,
        }
    }

    pub fn is_accepted_type(&self) -> bool {
        is_accepted_mime(&self.mime)
    }
}

pub fn is_accepted_mime(mime: &str) -> bool {
    ACCEPTED_MIME_TYPES
        .iter()
        .any(|accepted| accepted.eq_ignore_ascii_case(mime))
}

fn mime_from_extension(path: &Path) -> Option<&'static str> {
    let ext = path.extension()?.to_str()?.to_lowercase();
    Some(match ext.as_str() {
        "jpg" | "jpeg" | "jpe" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "tif" | "tiff" => "image/tiff",
        _ => return None,
    })
}

/// Compressed output of the pipeline.
///
/// Never longer than the source: when the encoder would grow the file the
/// original bytes are kept, `fell_back` is set and `mime` stays the
/// source's type.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EncodedAsset {
    #[serde(skip)]
    pub bytes: Bytes,
    pub mime: String,
    /// Quality ratio requested from the encoder.
    pub quality: f64,
    pub fell_back: bool,
}

impl EncodedAsset {
    /// Keep the source bytes unchanged.
    pub fn original(bytes: Bytes, mime: &str, quality: f64) -> Self {
        Self {
            bytes,
            mime: mime.to_string(),
            quality,
            fell_back: true,
        }
    }

    pub fn len(&self) -> usize {
        self.bytes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bytes.is_empty()
    }
}
