//! SJPG container format: a fixed 22-byte geometry header, a u16 table with
//! one entry per strip, then the concatenated JPEG strip payloads.
//!
//! ```text
//! offset  size  field
//! 0       7     magic "_SJPG__"
//! 7       7     version "\x00V1.00\x00"
//! 14      2     width  (u16 le)
//! 16      2     height (u16 le)
//! 18      2     strip count (u16 le)
//! 20      2     strip height (u16 le)
//! 22      2*N   per-strip table (u16 le each)
//! 22+2N   ...   strip payloads, in index order
//! ```
//!
//! This tool always writes a *length* table (per-strip byte sizes). Some
//! historical tooling wrote *offset* tables (distances from the start of the
//! strip data) instead; the decoder accepts both, see [`classify_table`].

use crate::encode::JpegStrip;
use crate::error::{Error, Result};

pub const MAGIC: &[u8; 7] = b"_SJPG__";
pub const VERSION: &[u8; 7] = b"\x00V1.00\x00";

/// Bytes before the per-strip table.
const FIXED_HEADER_LEN: usize = 22;

/// An SJPG image: geometry plus the ordered, independently decodable strips.
/// Immutable once constructed; both the encode path ([`SjpgContainer::new`])
/// and the decode path ([`SjpgContainer::from_bytes`]) produce one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SjpgContainer {
    pub width: u16,
    pub height: u16,
    pub strip_height: u16,
    pub strips: Vec<Vec<u8>>,
}

impl SjpgContainer {
    /// Build a container from freshly encoded strips, validating the format's
    /// geometry constraints.
    pub fn new(
        width: u32,
        height: u32,
        strip_height: u16,
        strips: Vec<Vec<u8>>,
    ) -> Result<Self> {
        if strip_height == 0 {
            return Err(Error::InvalidParameter("strip height must be non-zero".into()));
        }
        if width == 0 || height == 0 {
            return Err(Error::InvalidParameter(format!(
                "image dimensions must be non-zero, got {width}x{height}"
            )));
        }
        if width > u16::MAX as u32 || height > u16::MAX as u32 {
            return Err(Error::Encode(format!(
                "image dimensions {width}x{height} exceed the format's u16 range"
            )));
        }
        let expected = height.div_ceil(strip_height as u32) as usize;
        if strips.len() != expected {
            return Err(Error::Encode(format!(
                "strip count {} does not match ceil({height}/{strip_height}) = {expected}",
                strips.len()
            )));
        }
        Ok(Self {
            width: width as u16,
            height: height as u16,
            strip_height,
            strips,
        })
    }

    /// Convenience constructor from the strip encoder's output.
    pub fn from_encoded_strips(
        width: u32,
        height: u32,
        strip_height: u16,
        strips: Vec<JpegStrip>,
    ) -> Result<Self> {
        Self::new(
            width,
            height,
            strip_height,
            strips.into_iter().map(|s| s.data).collect(),
        )
    }

    pub fn strip_count(&self) -> usize {
        self.strips.len()
    }

    pub fn data_len(&self) -> usize {
        self.strips.iter().map(Vec::len).sum()
    }

    /// Serialize as SJPG bytes with a length table. Each strip must fit the
    /// table's u16 ceiling; an oversized strip is an error, never a
    /// truncated entry.
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut out =
            Vec::with_capacity(FIXED_HEADER_LEN + 2 * self.strips.len() + self.data_len());
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(VERSION);
        out.extend_from_slice(&self.width.to_le_bytes());
        out.extend_from_slice(&self.height.to_le_bytes());
        out.extend_from_slice(&(self.strips.len() as u16).to_le_bytes());
        out.extend_from_slice(&self.strip_height.to_le_bytes());
        for (i, strip) in self.strips.iter().enumerate() {
            if strip.is_empty() {
                return Err(Error::Encode(format!("strip {i} is empty")));
            }
            if strip.len() > u16::MAX as usize {
                return Err(Error::Encode(format!(
                    "strip {i} is {} bytes, exceeding the u16 length field",
                    strip.len()
                )));
            }
            out.extend_from_slice(&(strip.len() as u16).to_le_bytes());
        }
        for strip in &self.strips {
            out.extend_from_slice(strip);
        }
        Ok(out)
    }

    /// Parse SJPG bytes, accepting both length and offset tables.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        if bytes.len() < 4 || &bytes[0..4] != b"_SJP" {
            return Err(Error::CorruptContainer("missing magic bytes".into()));
        }
        if bytes.len() < FIXED_HEADER_LEN {
            return Err(Error::CorruptContainer("truncated header".into()));
        }
        let width = read_u16(bytes, 14);
        let height = read_u16(bytes, 16);
        let strip_count = read_u16(bytes, 18) as usize;
        let strip_height = read_u16(bytes, 20);

        let header_len = FIXED_HEADER_LEN + 2 * strip_count;
        if bytes.len() < header_len {
            return Err(Error::CorruptContainer(format!(
                "table needs {strip_count} entries but the file ends inside it"
            )));
        }
        let table: Vec<u16> = (0..strip_count)
            .map(|i| read_u16(bytes, FIXED_HEADER_LEN + 2 * i))
            .collect();
        let data_len = bytes.len() - header_len;

        let strips = match classify_table(&table, data_len) {
            TableKind::Empty => Vec::new(),
            TableKind::Offsets => slice_by_offsets(bytes, header_len, &table)?,
            TableKind::Lengths => slice_by_lengths(bytes, header_len, &table)?,
        };

        Ok(Self {
            width,
            height,
            strip_height,
            strips,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableKind {
    Empty,
    /// Entries are distances from the start of the strip data; strip `i`
    /// ends where strip `i+1` begins (the last one at end of file).
    Offsets,
    /// Entries are per-strip byte sizes (this tool's producer convention).
    Lengths,
}

/// Decide how to read the per-strip table. A table starting at 0 that is
/// non-decreasing and stays within the data region can only be an offset
/// table (a length table never contains a zero entry, since every strip
/// holds at least a JPEG header); everything else reads as lengths. This is
/// a compatibility shim for divergent historical producers, not a general
/// format disambiguator.
pub fn classify_table(table: &[u16], data_len: usize) -> TableKind {
    let Some((&first, &last)) = table.first().zip(table.last()) else {
        return TableKind::Empty;
    };
    if first == 0
        && table.windows(2).all(|w| w[0] <= w[1])
        && (last as usize) <= data_len
    {
        TableKind::Offsets
    } else {
        TableKind::Lengths
    }
}

fn slice_by_offsets(bytes: &[u8], header_len: usize, table: &[u16]) -> Result<Vec<Vec<u8>>> {
    let mut strips = Vec::with_capacity(table.len());
    for (i, &offset) in table.iter().enumerate() {
        let start = header_len + offset as usize;
        let end = match table.get(i + 1) {
            Some(&next) => header_len + next as usize,
            None => bytes.len(),
        };
        if start >= end || end > bytes.len() {
            return Err(Error::CorruptContainer(format!(
                "offset table entry {i} yields an empty or out-of-bounds strip"
            )));
        }
        strips.push(bytes[start..end].to_vec());
    }
    Ok(strips)
}

fn slice_by_lengths(bytes: &[u8], header_len: usize, table: &[u16]) -> Result<Vec<Vec<u8>>> {
    let mut strips = Vec::with_capacity(table.len());
    let mut start = header_len;
    for (i, &len) in table.iter().enumerate() {
        let end = start + len as usize;
        if len == 0 || end > bytes.len() {
            return Err(Error::CorruptContainer(format!(
                "length table entry {i} yields an empty or out-of-bounds strip"
            )));
        }
        strips.push(bytes[start..end].to_vec());
        start = end;
    }
    Ok(strips)
}

fn read_u16(bytes: &[u8], offset: usize) -> u16 {
    u16::from_le_bytes([bytes[offset], bytes[offset + 1]])
}

#[cfg(test)]
mod tests {
    use super::*;

    fn container(strips: &[&[u8]]) -> SjpgContainer {
        let height = (strips.len() as u32) * 32;
        SjpgContainer::new(
            240,
            height,
            32,
            strips.iter().map(|s| s.to_vec()).collect(),
        )
        .unwrap()
    }

    /// Hand-build a container with an *offset* table (the historical
    /// producer convention this tool never writes but must read).
    fn offset_table_bytes(width: u16, height: u16, strip_height: u16, strips: &[&[u8]]) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(MAGIC);
        out.extend_from_slice(VERSION);
        out.extend_from_slice(&width.to_le_bytes());
        out.extend_from_slice(&height.to_le_bytes());
        out.extend_from_slice(&(strips.len() as u16).to_le_bytes());
        out.extend_from_slice(&strip_height.to_le_bytes());
        let mut offset = 0u16;
        for strip in strips {
            out.extend_from_slice(&offset.to_le_bytes());
            offset += strip.len() as u16;
        }
        for strip in strips {
            out.extend_from_slice(strip);
        }
        out
    }

    #[test]
    fn header_layout_is_exact() {
        let c = container(&[b"aaaa", b"bb"]);
        let bytes = c.to_bytes().unwrap();
        assert_eq!(&bytes[0..7], b"_SJPG__");
        assert_eq!(&bytes[7..14], b"\x00V1.00\x00");
        assert_eq!(&bytes[14..16], &240u16.to_le_bytes());
        assert_eq!(&bytes[16..18], &64u16.to_le_bytes());
        assert_eq!(&bytes[18..20], &2u16.to_le_bytes());
        assert_eq!(&bytes[20..22], &32u16.to_le_bytes());
        // length table: 4, 2
        assert_eq!(&bytes[22..24], &4u16.to_le_bytes());
        assert_eq!(&bytes[24..26], &2u16.to_le_bytes());
        assert_eq!(&bytes[26..], b"aaaabb");
    }

    #[test]
    fn round_trips_through_length_table() {
        let c = container(&[b"first strip", b"second", b"third one here"]);
        let decoded = SjpgContainer::from_bytes(&c.to_bytes().unwrap()).unwrap();
        assert_eq!(decoded, c);
    }

    #[test]
    fn offset_table_decodes_to_the_same_strips() {
        let strips: &[&[u8]] = &[b"first strip", b"second", b"third one here"];
        let by_length = container(strips).to_bytes().unwrap();
        let by_offset = offset_table_bytes(240, 96, 32, strips);
        assert_ne!(by_length, by_offset, "tables must actually differ");
        let a = SjpgContainer::from_bytes(&by_length).unwrap();
        let b = SjpgContainer::from_bytes(&by_offset).unwrap();
        assert_eq!(a.strips, b.strips);
    }

    #[test]
    fn table_classification() {
        // starts at zero, non-decreasing, within data: offsets
        assert_eq!(classify_table(&[0, 4, 6], 10), TableKind::Offsets);
        // non-zero first entry: lengths
        assert_eq!(classify_table(&[4, 2, 4], 10), TableKind::Lengths);
        // zero first entry but decreasing: lengths (and will fail slicing)
        assert_eq!(classify_table(&[0, 6, 4], 10), TableKind::Lengths);
        // zero first entry but last offset beyond data: lengths
        assert_eq!(classify_table(&[0, 4, 200], 10), TableKind::Lengths);
        assert_eq!(classify_table(&[], 0), TableKind::Empty);
        // single zero entry classifies as offsets: one strip spanning all data
        assert_eq!(classify_table(&[0], 5), TableKind::Offsets);
    }

    #[test]
    fn ambiguous_shapes_resolve_deterministically() {
        // A table whose first entry is zero is never a valid length table
        // (strips cannot be empty), so the two interpretations are mutually
        // exclusive and the heuristic always picks offsets for it.
        let strips: &[&[u8]] = &[b"xxxx", b"yyyy"];
        let bytes = offset_table_bytes(8, 64, 32, strips);
        let decoded = SjpgContainer::from_bytes(&bytes).unwrap();
        assert_eq!(decoded.strips, vec![b"xxxx".to_vec(), b"yyyy".to_vec()]);
    }

    #[test]
    fn zero_strips_decodes_empty() {
        let c = offset_table_bytes(240, 280, 32, &[]);
        let decoded = SjpgContainer::from_bytes(&c).unwrap();
        assert_eq!(decoded.strip_count(), 0);
        assert_eq!(decoded.width, 240);
        assert_eq!(decoded.height, 280);
    }

    #[test]
    fn bad_magic_rejected() {
        let err = SjpgContainer::from_bytes(b"_SJX__\x00rest").unwrap_err();
        assert!(matches!(err, Error::CorruptContainer(_)));
        // the check only covers the first four bytes
        let mut ok = container(&[b"data"]).to_bytes().unwrap();
        ok[4] = b'X';
        assert!(SjpgContainer::from_bytes(&ok).is_ok());
    }

    #[test]
    fn truncated_inputs_rejected() {
        let full = container(&[b"aaaa", b"bb"]).to_bytes().unwrap();
        // inside the fixed header
        assert!(matches!(
            SjpgContainer::from_bytes(&full[..10]).unwrap_err(),
            Error::CorruptContainer(_)
        ));
        // inside the table
        assert!(matches!(
            SjpgContainer::from_bytes(&full[..23]).unwrap_err(),
            Error::CorruptContainer(_)
        ));
        // inside the strip data
        assert!(matches!(
            SjpgContainer::from_bytes(&full[..full.len() - 1]).unwrap_err(),
            Error::CorruptContainer(_)
        ));
    }

    #[test]
    fn oversized_strip_rejected_not_truncated() {
        let big = vec![0xAB; u16::MAX as usize + 1];
        let c = SjpgContainer::new(240, 32, 32, vec![big]).unwrap();
        assert!(matches!(c.to_bytes().unwrap_err(), Error::Encode(_)));
        // one byte under the ceiling still encodes
        let max = vec![0xAB; u16::MAX as usize];
        let c = SjpgContainer::new(240, 32, 32, vec![max]).unwrap();
        assert!(c.to_bytes().is_ok());
    }

    #[test]
    fn oversized_geometry_rejected() {
        assert!(matches!(
            SjpgContainer::new(70_000, 32, 32, vec![b"x".to_vec()]).unwrap_err(),
            Error::Encode(_)
        ));
        assert!(matches!(
            SjpgContainer::new(240, 0, 32, vec![]).unwrap_err(),
            Error::InvalidParameter(_)
        ));
        assert!(matches!(
            SjpgContainer::new(240, 32, 0, vec![b"x".to_vec()]).unwrap_err(),
            Error::InvalidParameter(_)
        ));
    }

    #[test]
    fn strip_count_must_match_geometry() {
        // 280 rows at 32px per strip needs exactly 9 strips
        let strips = vec![b"x".to_vec(); 8];
        assert!(matches!(
            SjpgContainer::new(240, 280, 32, strips).unwrap_err(),
            Error::Encode(_)
        ));
    }

    #[test]
    fn empty_strip_rejected_on_encode() {
        let c = SjpgContainer::new(240, 64, 32, vec![b"ok".to_vec(), Vec::new()]).unwrap();
        assert!(matches!(c.to_bytes().unwrap_err(), Error::Encode(_)));
    }

    #[test]
    fn zero_length_table_entry_rejected_on_decode() {
        // hand-craft a length table containing a zero after a non-zero entry
        let mut bytes = Vec::new();
        bytes.extend_from_slice(MAGIC);
        bytes.extend_from_slice(VERSION);
        bytes.extend_from_slice(&8u16.to_le_bytes());
        bytes.extend_from_slice(&64u16.to_le_bytes());
        bytes.extend_from_slice(&2u16.to_le_bytes());
        bytes.extend_from_slice(&32u16.to_le_bytes());
        bytes.extend_from_slice(&4u16.to_le_bytes());
        bytes.extend_from_slice(&0u16.to_le_bytes());
        bytes.extend_from_slice(b"data");
        assert!(matches!(
            SjpgContainer::from_bytes(&bytes).unwrap_err(),
            Error::CorruptContainer(_)
        ));
    }
}
