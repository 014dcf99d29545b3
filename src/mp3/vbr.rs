//! Xing/Info, VBRI and LAME header extraction
//!
//! Encoders store a summary of the whole stream in the payload of the first
//! audio frame, which otherwise carries silence:
//! - **Xing** (VBR) or **Info** (CBR), written by LAME and most encoders,
//!   placed right after the Layer III side information.
//! - **VBRI**, written by the Fraunhofer encoder, always 32 bytes after the
//!   frame header.
//!
//! Both declare the total frame count and byte size, which gives the duration
//! without scanning the file. LAME (and FFmpeg's Lavc) append an extension to
//! the Xing/Info fields recording the encoder version, the VBR method, the
//! lowpass filter and the gapless encoder delay/padding.

use super::cursor::ByteCursor;
use super::frame::{FrameHeader, HEADER_LEN};
use log::debug;
use serde::Serialize;

/// Offset of the VBRI tag from the start of the frame header
pub const VBRI_OFFSET: usize = HEADER_LEN + 32;

const XING_FLAG_FRAMES: u32 = 0x01;
const XING_FLAG_BYTES: u32 = 0x02;
const XING_FLAG_TOC: u32 = 0x04;
const XING_FLAG_QUALITY: u32 = 0x08;
const XING_TOC_LEN: usize = 100;

const LAME_TAG_LEN: usize = 24;
const LAME_ENCODER_LEN: usize = 9;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum BitrateType {
    Cbr,
    Vbr,
    Abr,
    Free,
    Unknown,
}

impl std::fmt::Display for BitrateType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            BitrateType::Cbr => write!(f, "CBR"),
            BitrateType::Vbr => write!(f, "VBR"),
            BitrateType::Abr => write!(f, "ABR"),
            BitrateType::Free => write!(f, "free"),
            BitrateType::Unknown => write!(f, "unknown"),
        }
    }
}

/// Which tag the VBR information came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum VbrSource {
    Xing,
    Info,
    Vbri,
}

/// LAME/Lavc extension following the Xing/Info fields
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LameTag {
    /// Encoder version string (e.g., "LAME3.100", "Lavc58.13")
    pub encoder: String,
    /// Low nibble of the info byte: 1 = CBR, 2 = ABR, 3-6 = VBR,
    /// 8 = CBR 2-pass, 9 = ABR 2-pass
    pub vbr_method: u8,
    /// Lowpass filter frequency in Hz, when recorded
    pub lowpass: Option<u32>,
    /// Samples the encoder added at the start
    pub encoder_delay: u32,
    /// Samples the encoder added at the end
    pub encoder_padding: u32,
}

impl LameTag {
    fn bitrate_type(&self) -> Option<BitrateType> {
        match self.vbr_method {
            1 | 8 => Some(BitrateType::Cbr),
            2 | 9 => Some(BitrateType::Abr),
            3..=6 => Some(BitrateType::Vbr),
            _ => None,
        }
    }
}

/// Stream summary taken from the first frame
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct VbrInfo {
    pub bitrate_type: BitrateType,
    pub source: Option<VbrSource>,
    pub total_frames: Option<u32>,
    pub total_bytes: Option<u32>,
    /// Milliseconds, only when the frame count is declared
    pub duration_ms: Option<u64>,
    pub lame: Option<LameTag>,
}

impl VbrInfo {
    /// Inspect the first accepted frame for a VBRI or Xing/Info tag.
    ///
    /// `frame` starts at the frame header and should span the whole frame.
    /// Without a tag the stream is reported as free format (for free-format
    /// frames) or unknown.
    pub fn detect(frame: &[u8], header: &FrameHeader) -> Self {
        if let Some(info) = parse_vbri(frame, header) {
            debug!(
                "VBRI tag: frames={:?} bytes={:?}",
                info.total_frames, info.total_bytes
            );
            return info;
        }

        if let Some(info) = parse_xing(frame, header) {
            debug!(
                "{:?} tag: type={} frames={:?} bytes={:?} encoder={:?}",
                info.source,
                info.bitrate_type,
                info.total_frames,
                info.total_bytes,
                info.lame.as_ref().map(|l| l.encoder.as_str())
            );
            return info;
        }

        let bitrate_type = if header.is_free_format() {
            BitrateType::Free
        } else {
            BitrateType::Unknown
        };
        VbrInfo {
            bitrate_type,
            source: None,
            total_frames: None,
            total_bytes: None,
            duration_ms: None,
            lame: None,
        }
    }

    /// True when a Xing, Info or VBRI tag was found
    pub fn has_tag(&self) -> bool {
        self.source.is_some()
    }
}

/// Duration in milliseconds of `frames` frames
pub fn duration_ms(frames: u64, samples_per_frame: u32, sample_rate: u32) -> u64 {
    if sample_rate == 0 {
        return 0;
    }
    1000 * frames * u64::from(samples_per_frame) / u64::from(sample_rate)
}

fn parse_vbri(frame: &[u8], header: &FrameHeader) -> Option<VbrInfo> {
    let mut cursor = ByteCursor::new(frame);
    cursor.seek(VBRI_OFFSET);

    if &cursor.tag()? != b"VBRI" {
        return None;
    }
    if cursor.be16()? != 1 {
        return None;
    }
    // delay + quality
    cursor.skip(4);
    let total_bytes = cursor.be32()?;
    let total_frames = cursor.be32()?;

    Some(VbrInfo {
        bitrate_type: BitrateType::Vbr,
        source: Some(VbrSource::Vbri),
        total_frames: Some(total_frames),
        total_bytes: Some(total_bytes),
        duration_ms: Some(duration_ms(
            u64::from(total_frames),
            header.samples_per_frame,
            header.sample_rate,
        )),
        lame: None,
    })
}

fn parse_xing(frame: &[u8], header: &FrameHeader) -> Option<VbrInfo> {
    let mut cursor = ByteCursor::new(frame);
    cursor.skip(HEADER_LEN);
    if header.crc_protected {
        cursor.skip(2);
    }
    cursor.skip(header.side_info_size());

    let (source, mut bitrate_type) = match &cursor.tag()? {
        b"Xing" => (VbrSource::Xing, BitrateType::Vbr),
        b"Info" => (VbrSource::Info, BitrateType::Cbr),
        _ => return None,
    };

    let flags = cursor.be32()?;
    let total_frames = if flags & XING_FLAG_FRAMES != 0 {
        Some(cursor.be32()?)
    } else {
        None
    };
    let total_bytes = if flags & XING_FLAG_BYTES != 0 {
        Some(cursor.be32()?)
    } else {
        None
    };
    if flags & XING_FLAG_TOC != 0 {
        cursor.skip(XING_TOC_LEN);
    }
    if flags & XING_FLAG_QUALITY != 0 {
        cursor.skip(4);
    }

    let lame = cursor.peek(LAME_TAG_LEN).and_then(parse_lame);
    if let Some(refined) = lame.as_ref().and_then(LameTag::bitrate_type) {
        bitrate_type = refined;
    }

    let duration_ms = total_frames.map(|frames| {
        duration_ms(
            u64::from(frames),
            header.samples_per_frame,
            header.sample_rate,
        )
    });

    Some(VbrInfo {
        bitrate_type,
        source: Some(source),
        total_frames,
        total_bytes,
        duration_ms,
        lame,
    })
}

/// Parse the 24-byte LAME/Lavc extension
///
/// Layout:
///   [0..9]   encoder version string
///   [9]      tag revision (high nibble) + VBR method (low nibble)
///   [10]     lowpass / 100
///   [11..21] replay gain, flags, bitrate
///   [21..24] encoder delay (12 bits) + padding (12 bits)
fn parse_lame(tag: &[u8]) -> Option<LameTag> {
    let encoder = &tag[..LAME_ENCODER_LEN];
    if !(encoder.starts_with(b"LAME") || encoder.starts_with(b"Lavc") || encoder.starts_with(b"Lavf"))
    {
        return None;
    }

    let encoder = String::from_utf8_lossy(encoder)
        .trim_end_matches(['\0', ' '])
        .to_string();

    let vbr_method = tag[9] & 0x0F;

    // Valid lowpass values are 50-220 (5kHz to 22kHz); Lavc writes 0
    let lowpass = match tag[10] {
        b @ 50..=220 => Some(u32::from(b) * 100),
        _ => None,
    };

    let d = &tag[21..24];
    let encoder_delay = (u32::from(d[0]) << 4) | (u32::from(d[1]) >> 4);
    let encoder_padding = ((u32::from(d[1]) & 0x0F) << 8) | u32::from(d[2]);

    Some(LameTag {
        encoder,
        vbr_method,
        lowpass,
        encoder_delay,
        encoder_padding,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // TEST DATA
    // ==========================================================================
    //
    // A 128 kbps / 44.1 kHz MPEG-1 Layer III stereo frame is 417 bytes. The
    // Xing tag sits after the header (4) and the stereo side info (32), at 36.
    // The VBRI tag is always at 36 as well; the two never coexist.
    // ==========================================================================

    const HEADER_128K: [u8; 4] = [0xFF, 0xFB, 0x90, 0x04];

    fn header(bytes: [u8; 4]) -> FrameHeader {
        FrameHeader::parse(bytes).unwrap()
    }

    fn empty_frame(bytes: [u8; 4]) -> Vec<u8> {
        let h = header(bytes);
        let mut frame = vec![0u8; h.frame_length as usize];
        frame[..4].copy_from_slice(&bytes);
        frame
    }

    /// Build the first frame of a LAME-encoded file
    fn xing_frame(
        marker: &[u8; 4],
        flags: u32,
        frames: u32,
        bytes: u32,
        lame: Option<(&str, u8, u8)>,
    ) -> Vec<u8> {
        let mut frame = empty_frame(HEADER_128K);
        let mut tag = marker.to_vec();
        tag.extend_from_slice(&flags.to_be_bytes());
        if flags & XING_FLAG_FRAMES != 0 {
            tag.extend_from_slice(&frames.to_be_bytes());
        }
        if flags & XING_FLAG_BYTES != 0 {
            tag.extend_from_slice(&bytes.to_be_bytes());
        }
        if flags & XING_FLAG_TOC != 0 {
            tag.extend_from_slice(&[0u8; 100]);
        }
        if flags & XING_FLAG_QUALITY != 0 {
            tag.extend_from_slice(&[0, 0, 0, 0x64]);
        }
        if let Some((version, method, lowpass)) = lame {
            let mut ext = [0u8; LAME_TAG_LEN];
            let v = version.as_bytes();
            let n = v.len().min(LAME_ENCODER_LEN);
            ext[..n].copy_from_slice(&v[..n]);
            ext[9] = 0x10 | method;
            ext[10] = lowpass;
            // delay 576, padding 1200
            ext[21] = 0x24;
            ext[22] = 0x04;
            ext[23] = 0xB0;
            tag.extend_from_slice(&ext);
        }
        frame[36..36 + tag.len()].copy_from_slice(&tag);
        frame
    }

    fn vbri_frame(version: u16, bytes: u32, frames: u32) -> Vec<u8> {
        let mut frame = empty_frame(HEADER_128K);
        let mut tag = b"VBRI".to_vec();
        tag.extend_from_slice(&version.to_be_bytes());
        tag.extend_from_slice(&[0x00, 0x10, 0x00, 0x4B]); // delay, quality
        tag.extend_from_slice(&bytes.to_be_bytes());
        tag.extend_from_slice(&frames.to_be_bytes());
        frame[VBRI_OFFSET..VBRI_OFFSET + tag.len()].copy_from_slice(&tag);
        frame
    }

    // ==========================================================================
    // XING / INFO TESTS
    // ==========================================================================

    #[test]
    fn test_xing_frames_and_bytes() {
        let frame = xing_frame(b"Xing", 0x03, 4096, 1_048_576, None);
        let info = VbrInfo::detect(&frame, &header(HEADER_128K));

        assert_eq!(info.source, Some(VbrSource::Xing));
        assert_eq!(info.bitrate_type, BitrateType::Vbr);
        assert_eq!(info.total_frames, Some(4096));
        assert_eq!(info.total_bytes, Some(1_048_576));
        // 1000 * 4096 * 1152 / 44100
        assert_eq!(info.duration_ms, Some(106_997));
        assert!(info.lame.is_none());
    }

    #[test]
    fn test_info_tag_is_cbr() {
        let frame = xing_frame(b"Info", 0x01, 100, 0, None);
        let info = VbrInfo::detect(&frame, &header(HEADER_128K));

        assert_eq!(info.source, Some(VbrSource::Info));
        assert_eq!(info.bitrate_type, BitrateType::Cbr);
        assert_eq!(info.total_frames, Some(100));
        assert_eq!(info.total_bytes, None);
    }

    #[test]
    fn test_xing_without_frame_count_has_no_duration() {
        let frame = xing_frame(b"Xing", 0x02, 0, 5000, None);
        let info = VbrInfo::detect(&frame, &header(HEADER_128K));

        assert_eq!(info.total_frames, None);
        assert_eq!(info.total_bytes, Some(5000));
        assert_eq!(info.duration_ms, None);
    }

    #[test]
    fn test_xing_offset_for_mono_and_crc() {
        // Mono MPEG-1 with CRC: header(4) + crc(2) + side info(17) = 23
        let bytes = [0xFF, 0xFA, 0x90, 0xC4];
        let h = header(bytes);
        let mut frame = empty_frame(bytes);
        let mut tag = b"Xing".to_vec();
        tag.extend_from_slice(&1u32.to_be_bytes());
        tag.extend_from_slice(&77u32.to_be_bytes());
        frame[23..23 + tag.len()].copy_from_slice(&tag);

        let info = VbrInfo::detect(&frame, &h);
        assert_eq!(info.source, Some(VbrSource::Xing));
        assert_eq!(info.total_frames, Some(77));
    }

    #[test]
    fn test_xing_offset_for_lsf_stereo() {
        // MPEG-2 stereo: header(4) + side info(17) = 21
        let bytes = [0xFF, 0xF3, 0x80, 0x04];
        let h = header(bytes);
        let mut frame = empty_frame(bytes);
        let mut tag = b"Info".to_vec();
        tag.extend_from_slice(&1u32.to_be_bytes());
        tag.extend_from_slice(&10u32.to_be_bytes());
        frame[21..21 + tag.len()].copy_from_slice(&tag);

        let info = VbrInfo::detect(&frame, &h);
        assert_eq!(info.total_frames, Some(10));
        // 1000 * 10 * 576 / 22050
        assert_eq!(info.duration_ms, Some(261));
    }

    // ==========================================================================
    // LAME EXTENSION TESTS
    // ==========================================================================

    #[test]
    fn test_extract_lame_extension() {
        let frame = xing_frame(b"Info", 0x0F, 4096, 1_048_576, Some(("LAME3.100", 1, 205)));
        let info = VbrInfo::detect(&frame, &header(HEADER_128K));

        let lame = info.lame.expect("LAME tag");
        assert_eq!(lame.encoder, "LAME3.100");
        assert_eq!(lame.vbr_method, 1);
        assert_eq!(lame.lowpass, Some(20500));
        assert_eq!(lame.encoder_delay, 576);
        assert_eq!(lame.encoder_padding, 1200);
        assert_eq!(info.bitrate_type, BitrateType::Cbr);
    }

    #[test]
    fn test_lame_abr_method_refines_type() {
        let frame = xing_frame(b"Xing", 0x03, 10, 10, Some(("LAME3.99r", 2, 170)));
        let info = VbrInfo::detect(&frame, &header(HEADER_128K));
        assert_eq!(info.bitrate_type, BitrateType::Abr);
    }

    #[test]
    fn test_lavc_has_no_lowpass() {
        let frame = xing_frame(b"Info", 0x03, 10, 10, Some(("Lavc58.54", 0, 0)));
        let info = VbrInfo::detect(&frame, &header(HEADER_128K));

        let lame = info.lame.unwrap();
        assert_eq!(lame.encoder, "Lavc58.54");
        assert_eq!(lame.lowpass, None);
        assert_eq!(info.bitrate_type, BitrateType::Cbr);
    }

    // ==========================================================================
    // VBRI TESTS
    // ==========================================================================

    #[test]
    fn test_vbri_tag() {
        let frame = vbri_frame(1, 2_000_000, 5000);
        let info = VbrInfo::detect(&frame, &header(HEADER_128K));

        assert_eq!(info.source, Some(VbrSource::Vbri));
        assert_eq!(info.bitrate_type, BitrateType::Vbr);
        assert_eq!(info.total_bytes, Some(2_000_000));
        assert_eq!(info.total_frames, Some(5000));
        assert_eq!(info.duration_ms, Some(130_612));
    }

    #[test]
    fn test_vbri_wrong_version_is_ignored() {
        let frame = vbri_frame(2, 2_000_000, 5000);
        let info = VbrInfo::detect(&frame, &header(HEADER_128K));
        assert!(!info.has_tag());
        assert_eq!(info.bitrate_type, BitrateType::Unknown);
    }

    // ==========================================================================
    // NO TAG
    // ==========================================================================

    #[test]
    fn test_plain_frame_has_no_tag() {
        let frame = empty_frame(HEADER_128K);
        let info = VbrInfo::detect(&frame, &header(HEADER_128K));

        assert!(!info.has_tag());
        assert_eq!(info.bitrate_type, BitrateType::Unknown);
        assert_eq!(info.duration_ms, None);
    }

    #[test]
    fn test_free_format_without_tag() {
        let bytes = [0xFF, 0xFB, 0x00, 0x04];
        let frame = vec![0xFF, 0xFB, 0x00, 0x04, 0, 0, 0, 0];
        let info = VbrInfo::detect(&frame, &header(bytes));
        assert_eq!(info.bitrate_type, BitrateType::Free);
    }

    #[test]
    fn test_truncated_frame_is_safe() {
        let frame = xing_frame(b"Xing", 0x03, 4096, 1_048_576, None);
        let info = VbrInfo::detect(&frame[..42], &header(HEADER_128K));
        assert!(!info.has_tag());
    }

    #[test]
    fn test_duration_helper() {
        assert_eq!(duration_ms(100, 1152, 44100), 2612);
        assert_eq!(duration_ms(100, 1152, 0), 0);
    }
}
