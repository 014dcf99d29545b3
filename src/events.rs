//! Parse events and flags
//!
//! The decoder reports what it learns through a [`ParseEvents`] implementation
//! passed to every call. Each [`MetaData`] kind is delivered at most once per
//! stream and `on_complete` exactly once, when parsing finishes.

use bitflags::bitflags;
use serde::Serialize;

/// A fact about the stream, reported as soon as it is known
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "key", content = "value", rename_all = "snake_case")]
pub enum MetaData {
    /// Bytes taken by ID3v1 (128, or 355 with an extended `TAG+` block)
    Id3v1Size(u32),
    /// Bytes taken by the ID3v2 tag, header and footer included
    Id3v2Size(u32),
    /// Bytes taken by an APEv2 tag at the end of the stream
    ApeSize(u32),
    /// Stream duration in milliseconds, from a Xing/Info or VBRI tag
    Duration(u64),
}

/// Receiver for decoder events. Both hooks default to doing nothing.
pub trait ParseEvents {
    fn on_meta_data(&mut self, _meta: &MetaData) {}

    fn on_complete(&mut self) {}
}

/// Ignore every event
impl ParseEvents for () {}

/// Records every event, in order
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct EventLog {
    pub meta: Vec<MetaData>,
    pub completions: usize,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn id3v1_size(&self) -> Option<u32> {
        self.meta.iter().find_map(|m| match m {
            MetaData::Id3v1Size(size) => Some(*size),
            _ => None,
        })
    }

    pub fn id3v2_size(&self) -> Option<u32> {
        self.meta.iter().find_map(|m| match m {
            MetaData::Id3v2Size(size) => Some(*size),
            _ => None,
        })
    }

    pub fn ape_size(&self) -> Option<u32> {
        self.meta.iter().find_map(|m| match m {
            MetaData::ApeSize(size) => Some(*size),
            _ => None,
        })
    }

    pub fn duration_ms(&self) -> Option<u64> {
        self.meta.iter().find_map(|m| match m {
            MetaData::Duration(ms) => Some(*ms),
            _ => None,
        })
    }

    pub fn is_complete(&self) -> bool {
        self.completions > 0
    }
}

impl ParseEvents for EventLog {
    fn on_meta_data(&mut self, meta: &MetaData) {
        self.meta.push(*meta);
    }

    fn on_complete(&mut self) {
        self.completions += 1;
    }
}

bitflags! {
    /// Options for a parse run
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ParseFlags: u32 {
        /// Finish as soon as the duration is known from a VBR tag
        const STOP_AFTER_DURATION = 1 << 0;
        /// Final chunk marker. Ignored by `submit`, whose `eof` argument is
        /// authoritative; rejected by `parse_file`.
        const EOF = 1 << 1;
    }
}
