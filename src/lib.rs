//! mpastream - Incremental MPEG audio stream parser
//!
//! mpastream walks an MPEG-1/2/2.5 audio stream (Layer I, II or III) and
//! reports its structure: where every frame starts, which tags surround the
//! audio, and how long the stream plays, without decoding any audio.
//!
//! # Overview
//!
//! Data can arrive in chunks of any size. The [`Decoder`] buffers what it
//! cannot decide yet and only ever looks a bounded distance ahead, so the
//! frames it reports do not depend on how the input was split.
//!
//! A stream is processed in three stages:
//!
//! 1. **Header**: an ID3v2 tag at the start is measured and skipped.
//! 2. **Audio frames**: frame boundaries are located by sync words and
//!    confirmed against the frames that follow. Junk between frames is
//!    skipped. Free-format streams have their frame length inferred from
//!    the spacing of consecutive headers.
//! 3. **Tail**: ID3v1, extended ID3v1 (`TAG+`) and APEv2 trailers are measured.
//!
//! The first frame is checked for a Xing/Info or VBRI header. When one
//! declares a frame count, the stream duration is reported from it.
//!
//! # Quick Start
//!
//! ```no_run
//! use mpastream::{Decoder, EventLog, ParseFlags};
//!
//! let mut decoder = Decoder::new()?;
//! let mut events = EventLog::new();
//! decoder.parse_file("song.mp3", &mut events, ParseFlags::empty())?;
//!
//! println!("Frames: {}", decoder.frames().len());
//! println!("ID3v2: {:?} bytes", events.id3v2_size());
//! println!("Duration: {:?} ms", events.duration_ms());
//! # Ok::<(), mpastream::Error>(())
//! ```
//!
//! # Modules
//!
//! - [`decoder`]: The staged, chunk-driven parser
//! - [`events`]: Callbacks and flags for a parse
//! - [`mp3`]: Frame headers, sync search, tags
//! - [`probe`]: Whole-file parsing into report rows
//! - [`report`]: Output formatters (JSON, CSV)

pub mod decoder;
pub mod error;
pub mod events;
pub mod mp3;
pub mod probe;
pub mod report;

pub use decoder::{Decoder, ParseSummary, Stage, DEFAULT_BUFFER_CAPACITY, MIN_BUFFER_CAPACITY};
pub use error::{Error, Result};
pub use events::{EventLog, MetaData, ParseEvents, ParseFlags};
pub use probe::{FileReport, Prober};

#[cfg(test)]
mod tests {
    use super::*;

    // ==========================================================================
    // PUBLIC API TESTS
    // ==========================================================================
    //
    // These tests verify the public API surface is reachable from the crate
    // root.
    // ==========================================================================

    #[test]
    fn test_public_exports() {
        let decoder = Decoder::new().unwrap();
        assert_eq!(decoder.stage(), Stage::ParseHeader);
        assert_eq!(decoder.capacity(), DEFAULT_BUFFER_CAPACITY);

        let _ = Prober::new();
        let _ = EventLog::new();
        let _ = ParseFlags::STOP_AFTER_DURATION | ParseFlags::EOF;
    }

    #[test]
    fn test_decode_from_crate_root() {
        let mut data = Vec::new();
        for _ in 0..20 {
            data.extend_from_slice(&[0xFF, 0xFB, 0x90, 0x04]);
            data.resize(data.len() + 413, 0);
        }

        let mut decoder = Decoder::new().unwrap();
        let mut events = EventLog::new();
        decoder
            .submit(&data, &mut events, ParseFlags::empty(), true)
            .unwrap();

        assert!(decoder.is_completed());
        assert!(events.is_complete());
        assert_eq!(decoder.frames().len(), 20);
    }

    #[test]
    fn test_error_kinds() {
        let err = Decoder::with_capacity(16).unwrap_err();
        assert!(matches!(err, Error::InvalidArgument(_)));
        assert_eq!(err.kind(), "invalid_argument");
        assert!(MIN_BUFFER_CAPACITY > 16);
    }
}
