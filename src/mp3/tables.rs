//! Static lookup tables for MPEG audio frame headers
//!
//! Bitrates are in kbps (the `k` means 1000, not 1024). Index 0 is the free
//! format and index 15 is reserved; both map to 0 here and are handled by the
//! caller.

use super::frame::{Layer, MpegVersion};

/// Bitrate tables (kbps), indexed `[lsf][layer][bitrate_index]`
///
/// `lsf` is 0 for MPEG-1 and 1 for MPEG-2/2.5, `layer` is 0..=2 for I..=III.
const BITRATES_KBPS: [[[u32; 16]; 3]; 2] = [
    [
        // MPEG-1 Layer I
        [0, 32, 64, 96, 128, 160, 192, 224, 256, 288, 320, 352, 384, 416, 448, 0],
        // MPEG-1 Layer II
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 384, 0],
        // MPEG-1 Layer III
        [0, 32, 40, 48, 56, 64, 80, 96, 112, 128, 160, 192, 224, 256, 320, 0],
    ],
    [
        // MPEG-2/2.5 Layer I
        [0, 32, 48, 56, 64, 80, 96, 112, 128, 144, 160, 176, 192, 224, 256, 0],
        // MPEG-2/2.5 Layer II
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],
        // MPEG-2/2.5 Layer III
        [0, 8, 16, 24, 32, 40, 48, 56, 64, 80, 96, 112, 128, 144, 160, 0],
    ],
];

// Sample rate lookup tables (Hz), index 3 is reserved
const SAMPLE_RATES_V1: [u32; 4] = [44100, 48000, 32000, 0];
const SAMPLE_RATES_V2: [u32; 4] = [22050, 24000, 16000, 0];
const SAMPLE_RATES_V25: [u32; 4] = [11025, 12000, 8000, 0];

/// Samples per frame, indexed `[lsf][layer]`
const SAMPLES_PER_FRAME: [[u32; 3]; 2] = [[384, 1152, 1152], [384, 1152, 576]];

/// Xing/Info side information size, indexed `[lsf][mono]`
const SIDE_INFO_SIZE: [[usize; 2]; 2] = [[32, 17], [17, 9]];

fn lsf_index(version: MpegVersion) -> usize {
    usize::from(version.is_lsf())
}

fn layer_index(layer: Layer) -> usize {
    match layer {
        Layer::Layer1 => 0,
        Layer::Layer2 => 1,
        Layer::Layer3 => 2,
    }
}

/// Bitrate in bits per second; `None` for the reserved index 15.
/// `Some(0)` means free format.
pub fn bitrate(version: MpegVersion, layer: Layer, index: u8) -> Option<u32> {
    match index {
        0 => Some(0),
        1..=14 => {
            Some(BITRATES_KBPS[lsf_index(version)][layer_index(layer)][index as usize] * 1000)
        }
        _ => None,
    }
}

/// Sample rate in Hz; `None` for the reserved index 3
pub fn sample_rate(version: MpegVersion, index: u8) -> Option<u32> {
    let table = match version {
        MpegVersion::Mpeg1 => &SAMPLE_RATES_V1,
        MpegVersion::Mpeg2 => &SAMPLE_RATES_V2,
        MpegVersion::Mpeg25 => &SAMPLE_RATES_V25,
    };
    table
        .get(index as usize)
        .copied()
        .filter(|&rate| rate != 0)
}

pub fn samples_per_frame(version: MpegVersion, layer: Layer) -> u32 {
    SAMPLES_PER_FRAME[lsf_index(version)][layer_index(layer)]
}

/// Bytes of Layer III side information between the header (and CRC) and
/// the start of a Xing/Info tag
pub fn side_info_size(version: MpegVersion, mono: bool) -> usize {
    SIDE_INFO_SIZE[lsf_index(version)][usize::from(mono)]
}
