//! MPEG audio stream structure
//!
//! Low-level pieces the [`Decoder`](crate::Decoder) is built from:
//!
//! - [`cursor`]: byte and bit readers over borrowed buffers
//! - [`tables`]: bitrate, sample rate and frame size tables
//! - [`frame`]: frame header decoding, frame records and statistics
//! - [`sync`]: finding and verifying frame boundaries
//! - [`id3`]: ID3v2 detection and ID3v1/APE trailer measurement
//! - [`vbr`]: Xing/Info, VBRI and LAME header extraction

pub mod cursor;
pub mod frame;
pub mod id3;
pub mod sync;
pub mod tables;
pub mod vbr;

pub use frame::{FrameHeader, FrameRecord, FrameStats, Layer, MpegVersion};
pub use id3::{Id3v2Info, TrailerInfo};
pub use vbr::{BitrateType, VbrInfo};
