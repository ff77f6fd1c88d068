//! Minimal EXIF orientation reader for JPEG bytes.
//!
//! Only one field is extracted: the Orientation tag (`0x0112`) from the
//! first IFD of the APP1 "Exif" segment. Anything that does not look like a
//! well-formed JPEG/EXIF structure yields orientation `1` (normal); the
//! reader never panics on truncated or hostile input.
//!
//! Layout walked, offsets relative to the APP1 marker:
//!
//! ```text
//! FF E1 <len:2> "Exif" 00 00 <II|MM> <0x002A> <ifd:4> ... <count:2> <entry:12>*
//! ```

use super::orientation::Orientation;

const SOI: [u8; 2] = [0xFF, 0xD8];
const APP1: [u8; 2] = [0xFF, 0xE1];
const EXIF_HEADER: &[u8] = b"Exif";
const LITTLE_ENDIAN: u16 = 0x4949;
const BIG_ENDIAN: u16 = 0x4D4D;
const TIFF_MAGIC: u16 = 0x002A;
const ORIENTATION_TAG: u16 = 0x0112;
const IFD_ENTRY_LEN: usize = 12;

/// Orientation of a JPEG, or [`Orientation::Normal`] when absent,
/// unreadable, or outside 1–8.
pub fn read_orientation(data: &[u8]) -> Orientation {
    Orientation::from_tag(read_orientation_tag(data)).unwrap_or_default()
}

/// Raw Orientation tag value, `1` on any parse failure.
///
/// Out-of-range values are returned as found; [`read_orientation`] maps
/// them to normal.
pub fn read_orientation_tag(data: &[u8]) -> u16 {
    find_orientation(data).unwrap_or(1)
}

fn find_orientation(data: &[u8]) -> Option<u16> {
    if data.get(..2)? != SOI {
        return None;
    }

    // Linear scan for the first APP1 marker.
    let marker = data
        .get(2..)?
        .windows(2)
        .position(|w| w == APP1)
        .map(|p| p + 2)?;

    // Skip marker and segment length.
    let mut pos = marker + 4;
    if data.get(pos..pos + EXIF_HEADER.len())? != EXIF_HEADER {
        return None;
    }
    pos += 6;

    let reader = match read_u16(data, pos, false)? {
        LITTLE_ENDIAN => Reader { little_endian: true },
        BIG_ENDIAN => Reader { little_endian: false },
        _ => return None,
    };
    let tiff_start = pos;
    pos += 2;

    if reader.u16(data, pos)? != TIFF_MAGIC {
        return None;
    }
    pos += 2;

    let ifd_offset = reader.u32(data, pos)? as usize;
    if ifd_offset < 8 {
        return None;
    }
    pos = tiff_start.checked_add(ifd_offset)?;

    let count = reader.u16(data, pos)? as usize;
    pos += 2;

    for _ in 0..count {
        if reader.u16(data, pos)? == ORIENTATION_TAG {
            return reader.u16(data, pos + 8);
        }
        pos += IFD_ENTRY_LEN;
    }
    None
}

/// Byte-order-aware reads bounded by the input slice.
#[derive(Clone, Copy)]
struct Reader {
    little_endian: bool,
}

impl Reader {
    fn u16(self, data: &[u8], offset: usize) -> Option<u16> {
        read_u16(data, offset, self.little_endian)
    }

    fn u32(self, data: &[u8], offset: usize) -> Option<u32> {
        let bytes: [u8; 4] = data.get(offset..offset.checked_add(4)?)?.try_into().ok()?;
        Some(if self.little_endian {
            u32::from_le_bytes(bytes)
        } else {
            u32::from_be_bytes(bytes)
        })
    }
}

fn read_u16(data: &[u8], offset: usize, little_endian: bool) -> Option<u16> {
    let bytes: [u8; 2] = data.get(offset..offset.checked_add(2)?)?.try_into().ok()?;
    Some(if little_endian {
        u16::from_le_bytes(bytes)
    } else {
        u16::from_be_bytes(bytes)
    })
}
