//! MPEG audio frame header decoding
//!
//! Every MPEG audio frame starts with a 4-byte header. Frame header structure:
//! AAAAAAAA AAABBCCD EEEEFFGH IIJJKLMM
//!
//! A = sync (11 bits)
//! B = MPEG version (2 bits): 00=2.5, 01=reserved, 10=2, 11=1
//! C = Layer (2 bits): 00=reserved, 01=III, 10=II, 11=I
//! D = Protection bit (0 = 16-bit CRC follows the header)
//! E = Bitrate index (4 bits, 0 = free format, 15 = bad)
//! F = Sample rate index (2 bits, 3 = reserved)
//! G = Padding bit
//! H = Private bit
//! I = Channel mode (2 bits)
//! J = Mode extension (2 bits, joint stereo only)
//! K = Copyright
//! L = Original
//! M = Emphasis (2 bits)

use super::cursor::BitCursor;
use super::tables;
use serde::Serialize;

/// Length of an MPEG audio frame header in bytes
pub const HEADER_LEN: usize = 4;

const SYNC_WORD: u64 = 0x7FF;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum MpegVersion {
    Mpeg1,
    Mpeg2,
    Mpeg25,
}

impl MpegVersion {
    /// Lower sampling frequencies: MPEG-2 and MPEG-2.5
    pub fn is_lsf(self) -> bool {
        !matches!(self, MpegVersion::Mpeg1)
    }
}

impl std::fmt::Display for MpegVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            MpegVersion::Mpeg1 => write!(f, "MPEG-1"),
            MpegVersion::Mpeg2 => write!(f, "MPEG-2"),
            MpegVersion::Mpeg25 => write!(f, "MPEG-2.5"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Layer {
    Layer1,
    Layer2,
    Layer3,
}

impl std::fmt::Display for Layer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Layer::Layer1 => write!(f, "Layer I"),
            Layer::Layer2 => write!(f, "Layer II"),
            Layer::Layer3 => write!(f, "Layer III"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ChannelMode {
    Stereo,
    JointStereo,
    DualChannel,
    Mono,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Emphasis {
    None,
    Ms50_15,
    Reserved,
    CcittJ17,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameHeader {
    /// The raw header bytes as found in the stream
    pub bytes: [u8; 4],
    pub version: MpegVersion,
    pub layer: Layer,
    /// True when a 16-bit CRC follows the header
    pub crc_protected: bool,
    /// Bits per second, 0 for free format
    pub bitrate: u32,
    pub sample_rate: u32,
    pub padding: bool,
    pub private: bool,
    pub channel_mode: ChannelMode,
    /// Only meaningful for joint stereo
    pub mode_extension: Option<u8>,
    pub copyright: bool,
    pub original: bool,
    pub emphasis: Emphasis,
    /// Frame size in bytes including the header; 0 for free format until the
    /// length has been inferred from the frame spacing
    pub frame_length: u32,
    pub samples_per_frame: u32,
}

impl FrameHeader {
    /// Decode a 4-byte frame header.
    ///
    /// Returns `None` when the sync word is missing or any field uses a
    /// reserved value (version 01, layer 00, bitrate index 15, sample rate
    /// index 3).
    pub fn parse(bytes: [u8; 4]) -> Option<Self> {
        let mut bits = BitCursor::new(&bytes);

        if bits.read(11) != SYNC_WORD {
            return None;
        }

        let version = match bits.read_u8(2) {
            0 => MpegVersion::Mpeg25,
            2 => MpegVersion::Mpeg2,
            3 => MpegVersion::Mpeg1,
            _ => return None, // Reserved
        };

        let layer = match bits.read_u8(2) {
            1 => Layer::Layer3,
            2 => Layer::Layer2,
            3 => Layer::Layer1,
            _ => return None, // Reserved
        };

        let crc_protected = !bits.read_flag();
        let bitrate = tables::bitrate(version, layer, bits.read_u8(4))?;
        let sample_rate = tables::sample_rate(version, bits.read_u8(2))?;
        let padding = bits.read_flag();
        let private = bits.read_flag();

        let channel_mode = match bits.read_u8(2) {
            0 => ChannelMode::Stereo,
            1 => ChannelMode::JointStereo,
            2 => ChannelMode::DualChannel,
            _ => ChannelMode::Mono,
        };

        let mode_ext = bits.read_u8(2);
        let mode_extension = (channel_mode == ChannelMode::JointStereo).then_some(mode_ext);

        let copyright = bits.read_flag();
        let original = bits.read_flag();

        let emphasis = match bits.read_u8(2) {
            0 => Emphasis::None,
            1 => Emphasis::Ms50_15,
            2 => Emphasis::Reserved,
            _ => Emphasis::CcittJ17,
        };

        let mut header = FrameHeader {
            bytes,
            version,
            layer,
            crc_protected,
            bitrate,
            sample_rate,
            padding,
            private,
            channel_mode,
            mode_extension,
            copyright,
            original,
            emphasis,
            frame_length: 0,
            samples_per_frame: tables::samples_per_frame(version, layer),
        };
        header.frame_length = header.computed_length();

        Some(header)
    }

    /// Decode a header from the start of a slice, if at least 4 bytes exist
    pub fn parse_slice(data: &[u8]) -> Option<Self> {
        match data {
            [a, b, c, d, ..] => Self::parse([*a, *b, *c, *d]),
            _ => None,
        }
    }

    fn computed_length(&self) -> u32 {
        if self.bitrate == 0 {
            return 0;
        }

        let pad = u32::from(self.padding);
        match self.layer {
            Layer::Layer1 => 4 * (12 * self.bitrate / self.sample_rate + pad),
            Layer::Layer2 => 144 * self.bitrate / self.sample_rate + pad,
            Layer::Layer3 if self.version.is_lsf() => 72 * self.bitrate / self.sample_rate + pad,
            Layer::Layer3 => 144 * self.bitrate / self.sample_rate + pad,
        }
    }

    pub fn is_free_format(&self) -> bool {
        self.bitrate == 0
    }

    /// Bytes added by the padding bit (a Layer I slot is 4 bytes)
    pub fn padding_bytes(&self) -> u32 {
        match (self.padding, self.layer) {
            (false, _) => 0,
            (true, Layer::Layer1) => 4,
            (true, _) => 1,
        }
    }

    /// Frame length, using the inferred unpadded size for free-format frames.
    /// Returns 0 when a free-format size is not known yet.
    pub fn length_with(&self, free_format_bytes: u32) -> u32 {
        if !self.is_free_format() {
            self.frame_length
        } else if free_format_bytes == 0 {
            0
        } else {
            free_format_bytes + self.padding_bytes()
        }
    }

    /// Copy of this header with a resolved free-format length
    pub fn with_frame_length(mut self, frame_length: u32) -> Self {
        self.frame_length = frame_length;
        self
    }

    /// Whether `other` plausibly belongs to the same stream: same version,
    /// layer, sample rate and free-format-ness. Bitrate and padding may vary.
    pub fn same_stream(&self, other: &FrameHeader) -> bool {
        self.version == other.version
            && self.layer == other.layer
            && self.sample_rate == other.sample_rate
            && self.is_free_format() == other.is_free_format()
    }

    pub fn is_mono(&self) -> bool {
        self.channel_mode == ChannelMode::Mono
    }

    pub fn channels(&self) -> u32 {
        if self.is_mono() {
            1
        } else {
            2
        }
    }

    /// Layer III side information size for this header
    pub fn side_info_size(&self) -> usize {
        tables::side_info_size(self.version, self.is_mono())
    }
}

/// One accepted frame and where it starts in the stream
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameRecord {
    /// Absolute byte offset of the frame header in the logical stream
    pub frame_pos: u64,
    #[serde(flatten)]
    pub header: FrameHeader,
}

impl FrameRecord {
    /// Offset of the first byte after this frame
    pub fn end_pos(&self) -> u64 {
        self.frame_pos + u64::from(self.header.frame_length)
    }
}

/// Unclaimed bytes between two consecutive frames
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FrameGap {
    /// Index of the frame the gap follows
    pub after_frame: usize,
    pub offset: u64,
    pub len: u64,
}

/// Find every place where a frame does not start right where the previous
/// one ended (garbage, junk between frames, resyncs)
pub fn find_gaps(frames: &[FrameRecord]) -> Vec<FrameGap> {
    frames
        .windows(2)
        .enumerate()
        .filter_map(|(idx, pair)| {
            let end = pair[0].end_pos();
            (pair[1].frame_pos > end).then(|| FrameGap {
                after_frame: idx,
                offset: end,
                len: pair[1].frame_pos - end,
            })
        })
        .collect()
}

/// Statistics about the frames found in a stream
#[derive(Debug, Clone, Default, Serialize)]
pub struct FrameStats {
    pub frame_count: usize,
    /// True when more than one bitrate occurs
    pub is_vbr: bool,
    pub avg_bitrate: u32,
    pub min_bitrate: u32,
    pub max_bitrate: u32,
    /// Coefficient of variation of frame sizes, in percent
    pub frame_size_cv: f64,
}

impl FrameStats {
    pub fn from_frames(frames: &[FrameRecord]) -> Self {
        let mut stats = FrameStats {
            frame_count: frames.len(),
            ..Default::default()
        };

        if frames.is_empty() {
            return stats;
        }

        let bitrates: Vec<u32> = frames.iter().map(|f| f.header.bitrate).collect();
        stats.min_bitrate = bitrates.iter().copied().min().unwrap_or(0);
        stats.max_bitrate = bitrates.iter().copied().max().unwrap_or(0);
        stats.avg_bitrate = (bitrates.iter().map(|&b| u64::from(b)).sum::<u64>()
            / bitrates.len() as u64) as u32;
        stats.is_vbr = stats.min_bitrate != stats.max_bitrate;
        stats.frame_size_cv = frame_size_cv(frames);

        stats
    }
}

fn frame_size_cv(frames: &[FrameRecord]) -> f64 {
    let mean: f64 = frames
        .iter()
        .map(|f| f64::from(f.header.frame_length))
        .sum::<f64>()
        / frames.len() as f64;

    if mean == 0.0 {
        return 0.0;
    }

    let variance: f64 = frames
        .iter()
        .map(|f| {
            let diff = f64::from(f.header.frame_length) - mean;
            diff * diff
        })
        .sum::<f64>()
        / frames.len() as f64;

    (variance.sqrt() / mean) * 100.0
}
