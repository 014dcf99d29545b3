//! ID3 tag detection
//!
//! Only the size of each tag matters here; tag contents are skipped.
//!
//! - **ID3v2** sits in front of the audio. Its 10-byte header is
//!   `"ID3"` + version + revision + flags + a 28-bit synchsafe size (four
//!   bytes carrying 7 bits each, MSB always zero so the size can never look
//!   like a frame sync). The size excludes the header and the optional
//!   10-byte footer.
//! - **ID3v1** is a fixed 128-byte `"TAG"` block at the very end of a file,
//!   optionally preceded by a 227-byte extended `"TAG+"` block.
//! - **APEv2** tags end with a 32-byte `"APETAGEX"` footer, placed before any
//!   ID3v1 block.

use super::cursor::ByteCursor;
use crate::error::{Error, Result};
use serde::Serialize;

pub const ID3V2_HEADER_LEN: usize = 10;
pub const ID3V1_LEN: u32 = 128;
pub const ID3V1_EXT_LEN: u32 = 227;
pub const APE_FOOTER_LEN: u32 = 32;

const APE_FLAG_HAS_HEADER: u32 = 1 << 31;
const APE_FLAG_IS_HEADER: u32 = 1 << 29;
const ID3V2_FLAG_FOOTER: u8 = 0x10;

/// Parsed ID3v2 header
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Id3v2Info {
    pub version: u8,
    pub revision: u8,
    pub flags: u8,
    /// Declared tag size, excluding header and footer
    pub size: u32,
}

impl Id3v2Info {
    pub fn has_footer(&self) -> bool {
        self.flags & ID3V2_FLAG_FOOTER != 0
    }

    /// Bytes the tag occupies in the stream, header and footer included
    pub fn total_size(&self) -> u64 {
        let footer = if self.has_footer() { ID3V2_HEADER_LEN } else { 0 };
        (ID3V2_HEADER_LEN + footer) as u64 + u64::from(self.size)
    }
}

/// Decode a 28-bit synchsafe integer, ignoring each byte's top bit
pub fn synchsafe(bytes: [u8; 4]) -> u32 {
    bytes
        .iter()
        .fold(0u32, |acc, &b| (acc << 7) | u32::from(b & 0x7F))
}

/// Look for an ID3v2 header at the start of `buf`.
///
/// Returns `Err(NeedMoreData)` with fewer than 10 bytes, `Ok(None)` when there
/// is no usable tag and `Ok(Some(_))` otherwise. A header with an unknown
/// major version, a zero size or reserved flag bits is treated as absent. The
/// top bit of each size byte is ignored.
pub fn detect_id3v2(buf: &[u8]) -> Result<Option<Id3v2Info>> {
    if buf.len() < ID3V2_HEADER_LEN {
        return Err(Error::NeedMoreData);
    }

    let mut cursor = ByteCursor::new(buf);
    let magic = cursor.take(3).ok_or(Error::NeedMoreData)?;
    if magic != b"ID3" {
        return Ok(None);
    }

    let version = cursor.byte().ok_or(Error::NeedMoreData)?;
    let revision = cursor.byte().ok_or(Error::NeedMoreData)?;
    let flags = cursor.byte().ok_or(Error::NeedMoreData)?;
    let size_bytes = cursor.tag().ok_or(Error::NeedMoreData)?;

    if !(2..=4).contains(&version) {
        return Ok(None);
    }
    if flags & 0x0F != 0 {
        return Ok(None);
    }

    let size = synchsafe(size_bytes);
    if size == 0 {
        return Ok(None);
    }

    Ok(Some(Id3v2Info {
        version,
        revision,
        flags,
        size,
    }))
}

/// Sizes of the tags found at the end of a stream
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TrailerInfo {
    /// 128 when an ID3v1 block is present
    pub id3v1: u32,
    /// 227 when an extended `TAG+` block precedes the ID3v1 block
    pub id3v1_ext: u32,
    /// Full APEv2 tag size including footer and optional header
    pub ape: u32,
}

impl TrailerInfo {
    /// ID3v1 bytes including the extended block
    pub fn id3v1_size(&self) -> u32 {
        self.id3v1 + self.id3v1_ext
    }

    pub fn total(&self) -> u32 {
        self.id3v1 + self.id3v1_ext + self.ape
    }
}

/// How far the trailing tags may reach from a `TAG` or `APETAGEX` marker
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrailerSpan {
    /// Not enough bytes to read the APE block
    Incomplete,
    /// The marker does not start a well-formed tag
    Invalid,
    /// Every distance from the marker to the end of the stream at which the
    /// marker would be a genuine trailer
    Lengths([u64; 3]),
}

/// Classify the tag marker at the start of `data`.
///
/// ID3v1 is always 128 bytes. `TAG+` opens a 227-byte extended block ahead
/// of the ID3v1 block, unless it is an ID3v1 tag whose title starts with `+`.
/// An APE header gives the size of the whole tag, an APE footer covers 32
/// bytes. Either may be followed by ID3v1, with or without the extension.
pub fn trailer_span(data: &[u8]) -> TrailerSpan {
    const ID3V1: u64 = ID3V1_LEN as u64;
    const ID3V1_EXT: u64 = (ID3V1_LEN + ID3V1_EXT_LEN) as u64;

    if data.starts_with(b"TAG+") {
        return TrailerSpan::Lengths([ID3V1_EXT, ID3V1, ID3V1]);
    }
    if data.starts_with(b"TAG") {
        return TrailerSpan::Lengths([ID3V1; 3]);
    }

    let magic = &data[..data.len().min(8)];
    if !b"APETAGEX".starts_with(magic) {
        return TrailerSpan::Invalid;
    }
    if data.len() < APE_FOOTER_LEN as usize {
        return TrailerSpan::Incomplete;
    }

    let mut cursor = ByteCursor::new(&data[8..]);
    let (Some(_version), Some(size), Some(_items), Some(flags)) =
        (cursor.le32(), cursor.le32(), cursor.le32(), cursor.le32())
    else {
        return TrailerSpan::Incomplete;
    };
    if size < APE_FOOTER_LEN {
        return TrailerSpan::Invalid;
    }

    let block = if flags & APE_FLAG_IS_HEADER != 0 {
        u64::from(APE_FOOTER_LEN) + u64::from(size)
    } else {
        u64::from(APE_FOOTER_LEN)
    };
    TrailerSpan::Lengths([block, block + ID3V1, block + ID3V1_EXT])
}

/// Measure the ID3v1 / extended ID3v1 / APE tags at the end of `buf`.
///
/// `buf` must end exactly where the stream ends. `preceding` is the number of
/// stream bytes before `buf`; an APE tag may start there when only its footer
/// is still buffered.
pub fn measure_trailer(buf: &[u8], preceding: u64) -> Option<TrailerInfo> {
    let mut info = TrailerInfo::default();
    let mut end = buf.len();

    if end >= ID3V1_LEN as usize && buf[end - ID3V1_LEN as usize..].starts_with(b"TAG") {
        info.id3v1 = ID3V1_LEN;
        end -= ID3V1_LEN as usize;

        if end >= ID3V1_EXT_LEN as usize
            && buf[end - ID3V1_EXT_LEN as usize..end].starts_with(b"TAG+")
        {
            info.id3v1_ext = ID3V1_EXT_LEN;
            end -= ID3V1_EXT_LEN as usize;
        }
    }

    if let Some(ape) = ape_size_before(&buf[..end], preceding) {
        info.ape = ape;
    }

    (info.total() > 0).then_some(info)
}

/// Size of an APEv2 tag whose footer ends exactly at the end of `buf`
fn ape_size_before(buf: &[u8], preceding: u64) -> Option<u32> {
    let footer_start = buf.len().checked_sub(APE_FOOTER_LEN as usize)?;
    let mut cursor = ByteCursor::new(&buf[footer_start..]);

    if cursor.take(8)? != b"APETAGEX" {
        return None;
    }
    let _version = cursor.le32()?;
    let size = cursor.le32()?;
    let _items = cursor.le32()?;
    let flags = cursor.le32()?;

    if size < APE_FOOTER_LEN {
        return None;
    }
    let total = if flags & APE_FLAG_HAS_HEADER != 0 {
        size.checked_add(APE_FOOTER_LEN)?
    } else {
        size
    };

    (u64::from(total) <= buf.len() as u64 + preceding).then_some(total)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id3v2_header(version: u8, flags: u8, size: [u8; 4]) -> Vec<u8> {
        let mut h = b"ID3".to_vec();
        h.extend_from_slice(&[version, 0, flags]);
        h.extend_from_slice(&size);
        h
    }

    fn ape_footer(size: u32, with_header: bool) -> Vec<u8> {
        let mut f = b"APETAGEX".to_vec();
        f.extend_from_slice(&2000u32.to_le_bytes());
        f.extend_from_slice(&size.to_le_bytes());
        f.extend_from_slice(&1u32.to_le_bytes());
        let flags = if with_header { APE_FLAG_HAS_HEADER } else { 0 };
        f.extend_from_slice(&flags.to_le_bytes());
        f.extend_from_slice(&[0u8; 8]);
        f
    }

    // ==========================================================================
    // ID3v2 TESTS
    // ==========================================================================

    #[test]
    fn test_synchsafe_decoding() {
        assert_eq!(synchsafe([0, 0, 0, 100]), 100);
        assert_eq!(synchsafe([0, 0, 1, 0]), 128);
        assert_eq!(synchsafe([0x7F, 0x7F, 0x7F, 0x7F]), 0x0FFF_FFFF);
        // Top bits are ignored
        assert_eq!(synchsafe([0x80, 0x80, 0x81, 0x80]), 128);
    }

    #[test]
    fn test_detect_id3v2() {
        let mut data = id3v2_header(4, 0, [0, 0, 0x02, 0x01]);
        data.extend_from_slice(&[0u8; 16]);

        let tag = detect_id3v2(&data).unwrap().expect("tag present");
        assert_eq!(tag.version, 4);
        assert_eq!(tag.size, 257);
        assert!(!tag.has_footer());
        assert_eq!(tag.total_size(), 267);
    }

    #[test]
    fn test_detect_id3v2_footer() {
        let data = id3v2_header(4, 0x10, [0, 0, 0, 50]);
        let tag = detect_id3v2(&data).unwrap().unwrap();
        assert!(tag.has_footer());
        assert_eq!(tag.total_size(), 70);
    }

    #[test]
    fn test_detect_needs_ten_bytes() {
        let data = id3v2_header(3, 0, [0, 0, 0, 1]);
        assert!(matches!(detect_id3v2(&data[..9]), Err(Error::NeedMoreData)));
        assert!(detect_id3v2(&data).unwrap().is_some());
    }

    #[test]
    fn test_no_id3v2() {
        let data = [0xFF, 0xFB, 0x90, 0x04, 0, 0, 0, 0, 0, 0];
        assert!(detect_id3v2(&data).unwrap().is_none());
    }

    #[test]
    fn test_reject_malformed_id3v2() {
        // Unknown major version
        assert!(detect_id3v2(&id3v2_header(5, 0, [0, 0, 0, 1])).unwrap().is_none());
        assert!(detect_id3v2(&id3v2_header(1, 0, [0, 0, 0, 1])).unwrap().is_none());
        // Zero size
        assert!(detect_id3v2(&id3v2_header(3, 0, [0, 0, 0, 0])).unwrap().is_none());
        // Reserved flag bits
        assert!(detect_id3v2(&id3v2_header(3, 0x01, [0, 0, 0, 1])).unwrap().is_none());
    }

    #[test]
    fn test_size_byte_top_bits_ignored() {
        let tag = detect_id3v2(&id3v2_header(3, 0, [0x80, 0x80, 0x82, 0x01]))
            .unwrap()
            .expect("tag present");
        assert_eq!(tag.size, 257);
        assert_eq!(tag.total_size(), 267);

        let tag = detect_id3v2(&id3v2_header(3, 0, [0, 0, 0x80, 1])).unwrap().unwrap();
        assert_eq!(tag.size, 1);
    }

    // ==========================================================================
    // TRAILER TESTS
    // ==========================================================================

    #[test]
    fn test_measure_id3v1() {
        let mut data = vec![0xAAu8; 500];
        let mut tag = b"TAG".to_vec();
        tag.resize(128, b' ');
        data.extend_from_slice(&tag);

        let info = measure_trailer(&data, 0).expect("trailer");
        assert_eq!(info.id3v1, 128);
        assert_eq!(info.id3v1_ext, 0);
        assert_eq!(info.ape, 0);
        assert_eq!(info.total(), 128);
    }

    #[test]
    fn test_measure_extended_id3v1() {
        let mut data = vec![0u8; 300];
        let mut ext = b"TAG+".to_vec();
        ext.resize(227, 0);
        data.extend_from_slice(&ext);
        let mut tag = b"TAG".to_vec();
        tag.resize(128, 0);
        data.extend_from_slice(&tag);

        let info = measure_trailer(&data, 0).unwrap();
        assert_eq!(info.id3v1_size(), 355);
        assert_eq!(info.total(), 355);
    }

    #[test]
    fn test_measure_ape_before_id3v1() {
        let mut data = vec![0u8; 400];
        // 32-byte header + 40 bytes of items + 32-byte footer
        data.extend_from_slice(b"APETAGEX");
        data.extend_from_slice(&[0u8; 24]);
        data.extend_from_slice(&[0x55u8; 40]);
        data.extend_from_slice(&ape_footer(72, true));
        let mut tag = b"TAG".to_vec();
        tag.resize(128, 0);
        data.extend_from_slice(&tag);

        let info = measure_trailer(&data, 0).unwrap();
        assert_eq!(info.id3v1, 128);
        assert_eq!(info.ape, 104);
        assert_eq!(info.total(), 232);
    }

    #[test]
    fn test_measure_ape_only() {
        let mut data = vec![0u8; 100];
        data.extend_from_slice(&[1u8; 10]);
        data.extend_from_slice(&ape_footer(42, false));

        let info = measure_trailer(&data, 0).unwrap();
        assert_eq!(info.ape, 42);
        assert_eq!(info.id3v1, 0);
    }

    #[test]
    fn test_ape_size_larger_than_buffer_is_ignored() {
        let mut data = vec![0u8; 10];
        data.extend_from_slice(&ape_footer(5000, false));
        assert!(measure_trailer(&data, 0).is_none());
    }

    #[test]
    fn test_ape_footer_after_consumed_items() {
        // Only the footer is left; the items were already consumed
        let footer = ape_footer(72, false);
        assert!(measure_trailer(&footer, 10).is_none());
        assert_eq!(measure_trailer(&footer, 40).map(|t| t.ape), Some(72));
    }

    #[test]
    fn test_trailer_span() {
        assert_eq!(trailer_span(b"TAGtitle"), TrailerSpan::Lengths([128; 3]));
        assert_eq!(trailer_span(b"TAG+title"), TrailerSpan::Lengths([355, 128, 128]));
        assert_eq!(trailer_span(b"APETnoise"), TrailerSpan::Invalid);
        assert_eq!(trailer_span(b"APETAG"), TrailerSpan::Incomplete);
        assert_eq!(trailer_span(b"APETAGEX and more"), TrailerSpan::Incomplete);

        assert_eq!(
            trailer_span(&ape_footer(72, true)),
            TrailerSpan::Lengths([32, 160, 387])
        );

        let mut header = ape_footer(72, true);
        header[20..24].copy_from_slice(&(APE_FLAG_HAS_HEADER | APE_FLAG_IS_HEADER).to_le_bytes());
        assert_eq!(trailer_span(&header), TrailerSpan::Lengths([104, 232, 459]));

        // A declared size smaller than the footer itself
        assert_eq!(trailer_span(&ape_footer(8, false)), TrailerSpan::Invalid);
    }

    #[test]
    fn test_no_trailer() {
        assert!(measure_trailer(&[0u8; 1000], 0).is_none());
        assert!(measure_trailer(&[], 0).is_none());
        assert!(measure_trailer(b"TAG", 0).is_none());
    }
}
