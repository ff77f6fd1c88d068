//! Content-derived upload filenames.
//!
//! Uploaded files are named `<stem>.<hash>.jpg`, where the stem is the
//! selected file's name without its last extension and the hash is a short
//! id computed from the asset bytes:
//! - `holiday.png` + asset → `holiday.FgkkMx2O5H.jpg`
//! - `IMG_0042.JPG` + asset → `IMG_0042.<hash>.jpg`
//! - `README` + asset → `README.<hash>.jpg`
//!
//! The hash is a fast rolling shift-add over the bytes, last to first. It
//! distinguishes uploads; it is not an integrity check.

const ALPHABET: &[u8; 64] = b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789_-";
const SEED: u32 = 0b001010100000101;

/// Short deterministic id over `bytes`, drawn from `[A-Za-z0-9_-]`.
pub fn content_hash(bytes: &[u8]) -> String {
    let mut hash = SEED;
    for &b in bytes.iter().rev() {
        hash = hash.wrapping_add(hash.wrapping_shl(5 + b as u32));
    }

    let mut value = hash & 0x7fff_ffff;
    let mut out = String::new();
    loop {
        out.push(ALPHABET[(value & 63) as usize] as char);
        value >>= 3;
        if value == 0 {
            break;
        }
    }
    out
}

/// Name without its last non-empty extension.
///
/// - `"a.b.png"` → `"a.b"`
/// - `"README"` → `"README"`
/// - `"trailing."` → `"trailing."`
pub fn file_stem(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) if dot + 1 < name.len() => &name[..dot],
        _ => name,
    }
}

/// Upload name for `original_name` carrying `bytes`.
pub fn upload_filename(original_name: &str, bytes: &[u8]) -> String {
    format!("{}.{}.jpg", file_stem(original_name), content_hash(bytes))
}
