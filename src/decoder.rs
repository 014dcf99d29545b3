//! Streaming decoder state machine
//!
//! The decoder owns a fixed-capacity accumulation buffer. Each `submit` call
//! appends as much input as fits, runs the active stage, drops the consumed
//! bytes from the front of the buffer and repeats until the input is used up:
//!
//! ```text
//! ParseHeader ──▶ ParseAudioFrame ──▶ ParseTail ──▶ ParseCompleted
//!  (ID3v2 skip)     (frame sync)       (ID3v1/APE)
//! ```
//!
//! A stage that makes progress hands over to the next one within the same
//! call. Stages never decide on partial information: when the bytes needed for
//! a decision are not buffered yet they ask for more, so the result is the same
//! however the input is chunked.

use crate::error::{Error, Result};
use crate::events::{MetaData, ParseEvents, ParseFlags};
use crate::mp3::frame::{
    self, ChannelMode, FrameGap, FrameHeader, FrameRecord, FrameStats, Layer, MpegVersion,
    HEADER_LEN,
};
use crate::mp3::id3::{self, Id3v2Info, TrailerInfo, ID3V2_HEADER_LEN};
use crate::mp3::sync::{self, SyncResult};
use crate::mp3::vbr::VbrInfo;
use log::{debug, trace, warn};
use serde::Serialize;
use std::fs::File;
use std::io::{self, Read};
use std::path::Path;

/// Default accumulation buffer size, enough for several worst-case frames
pub const DEFAULT_BUFFER_CAPACITY: usize = 16 * 1024;

/// Smallest accepted buffer. Free-format inference looks up to two maximum
/// size frames ahead.
pub const MIN_BUFFER_CAPACITY: usize = 8 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Stage {
    ParseHeader,
    ParseAudioFrame,
    ParseTail,
    ParseCompleted,
}

/// Incremental MPEG audio stream parser
#[derive(Debug)]
pub struct Decoder {
    stage: Stage,
    /// Unconsumed bytes; `buf.len()` is the valid data size
    buf: Vec<u8>,
    capacity: usize,
    /// Absolute stream offset of `buf[0]`
    total_parsed: u64,
    id3v2_checked: bool,
    id3v2: Option<Id3v2Info>,
    trailer: Option<TrailerInfo>,
    vbr: Option<VbrInfo>,
    frames: Vec<FrameRecord>,
    frame_counter: u64,
    free_format_bytes: u32,
    duration_notified: bool,
    complete_notified: bool,
}

impl Decoder {
    pub fn new() -> Result<Self> {
        Self::with_capacity(DEFAULT_BUFFER_CAPACITY)
    }

    /// Create a decoder with a custom buffer capacity (at least
    /// [`MIN_BUFFER_CAPACITY`] bytes)
    pub fn with_capacity(capacity: usize) -> Result<Self> {
        if capacity < MIN_BUFFER_CAPACITY {
            return Err(Error::InvalidArgument(format!(
                "buffer capacity {} is below the minimum of {}",
                capacity, MIN_BUFFER_CAPACITY
            )));
        }

        let mut buf = Vec::new();
        buf.try_reserve_exact(capacity)
            .map_err(|e| Error::OutOfMemory(format!("{} byte buffer: {}", capacity, e)))?;

        Ok(Self {
            stage: Stage::ParseHeader,
            buf,
            capacity,
            total_parsed: 0,
            id3v2_checked: false,
            id3v2: None,
            trailer: None,
            vbr: None,
            frames: Vec::new(),
            frame_counter: 0,
            free_format_bytes: 0,
            duration_notified: false,
            complete_notified: false,
        })
    }

    /// Feed the next chunk of the stream.
    ///
    /// `eof` marks `data` as the final chunk; it is authoritative and the
    /// `EOF` flag is ignored here. All of `data` is consumed unless parsing
    /// completes early. On a parse failure the decoder is reset before the
    /// error is returned.
    pub fn submit(
        &mut self,
        data: &[u8],
        events: &mut dyn ParseEvents,
        flags: ParseFlags,
        eof: bool,
    ) -> Result<()> {
        if data.is_empty() {
            return Err(Error::InvalidArgument("empty input".into()));
        }
        if self.stage == Stage::ParseCompleted {
            return Err(Error::IllegalState("parsing already completed".into()));
        }

        let mut input = data;
        loop {
            let room = self.capacity - self.buf.len();
            let (chunk, rest) = input.split_at(room.min(input.len()));
            self.buf.extend_from_slice(chunk);
            input = rest;
            let at_eof = eof && input.is_empty();

            if let Err(e) = self.run_stages(events, flags, at_eof) {
                warn!("parse failure at offset {}: {}", self.total_parsed, e);
                self.reset();
                return Err(e);
            }

            if self.stage == Stage::ParseCompleted || input.is_empty() {
                return Ok(());
            }
            if self.buf.len() == self.capacity {
                let offset = self.total_parsed;
                self.reset();
                return Err(Error::ParseFailure(format!(
                    "no progress with a full buffer at offset {}",
                    offset
                )));
            }
        }
    }

    /// Parse a whole file, reading chunks of the buffer capacity.
    ///
    /// The `EOF` flag is not accepted here; the end of the file is detected
    /// while reading.
    pub fn parse_file<P: AsRef<Path>>(
        &mut self,
        path: P,
        events: &mut dyn ParseEvents,
        flags: ParseFlags,
    ) -> Result<()> {
        if flags.contains(ParseFlags::EOF) {
            return Err(Error::InvalidArgument(
                "the EOF flag cannot be used with parse_file".into(),
            ));
        }

        let path = path.as_ref();
        if path.as_os_str().is_empty() {
            return Err(Error::InvalidArgument("empty path".into()));
        }

        let file = File::open(path)?;
        let len = file.metadata()?.len();
        if len < HEADER_LEN as u64 {
            return Err(Error::InvalidFile(format!(
                "{} is {} bytes, smaller than a frame header",
                path.display(),
                len
            )));
        }

        debug!("parsing {} ({} bytes)", path.display(), len);
        self.parse_reader(file, events, flags)
    }

    /// Parse everything `reader` yields. One chunk is read ahead so the final
    /// chunk can be submitted with `eof` set.
    pub fn parse_reader<R: Read>(
        &mut self,
        mut reader: R,
        events: &mut dyn ParseEvents,
        flags: ParseFlags,
    ) -> Result<()> {
        let mut current = vec![0u8; self.capacity];
        let mut next = vec![0u8; self.capacity];

        let mut current_len = read_chunk(&mut reader, &mut current)?;
        if current_len == 0 {
            return Err(Error::InvalidFile("empty stream".into()));
        }

        loop {
            let next_len = read_chunk(&mut reader, &mut next)?;
            let eof = next_len == 0;

            self.submit(&current[..current_len], events, flags, eof)?;
            if eof || self.is_completed() {
                return Ok(());
            }

            std::mem::swap(&mut current, &mut next);
            current_len = next_len;
        }
    }

    /// Return to the freshly constructed state. Calling it twice is harmless.
    pub fn reset(&mut self) {
        self.stage = Stage::ParseHeader;
        self.buf.clear();
        self.total_parsed = 0;
        self.id3v2_checked = false;
        self.id3v2 = None;
        self.trailer = None;
        self.vbr = None;
        self.frames = Vec::new();
        self.frame_counter = 0;
        self.free_format_bytes = 0;
        self.duration_notified = false;
        self.complete_notified = false;
    }

    // ==========================================================================
    // STAGES
    // ==========================================================================

    fn run_stages(
        &mut self,
        events: &mut dyn ParseEvents,
        flags: ParseFlags,
        eof: bool,
    ) -> Result<()> {
        loop {
            let progressed = match self.stage {
                Stage::ParseHeader => self.parse_header(events, eof)?,
                Stage::ParseAudioFrame => self.parse_audio_frame(events, flags, eof),
                Stage::ParseTail => self.parse_tail(events, eof),
                Stage::ParseCompleted => return Ok(()),
            };
            if !progressed {
                return Ok(());
            }
        }
    }

    /// Detect the ID3v2 tag once, then skip its body
    fn parse_header(&mut self, events: &mut dyn ParseEvents, eof: bool) -> Result<bool> {
        if !self.id3v2_checked {
            let detected = match id3::detect_id3v2(&self.buf) {
                Ok(tag) => tag,
                // Fewer than 10 bytes in the whole stream
                Err(Error::NeedMoreData) if eof => None,
                Err(Error::NeedMoreData) => return Ok(false),
                Err(e) => return Err(e),
            };
            self.id3v2_checked = true;

            let Some(tag) = detected else {
                self.set_stage(Stage::ParseAudioFrame);
                return Ok(true);
            };

            debug!(
                "ID3v2.{}.{} tag, {} bytes",
                tag.version,
                tag.revision,
                tag.total_size()
            );
            self.consume(ID3V2_HEADER_LEN);
            events.on_meta_data(&MetaData::Id3v2Size(tag.total_size() as u32));
            self.id3v2 = Some(tag);
        }

        let end = self.id3v2.map_or(0, |tag| tag.total_size());
        let left = end.saturating_sub(self.total_parsed);
        let skipped = left.min(self.buf.len() as u64) as usize;
        self.consume(skipped);

        if self.total_parsed < end && !eof {
            return Ok(skipped > 0);
        }

        self.set_stage(Stage::ParseAudioFrame);
        Ok(true)
    }

    fn parse_audio_frame(
        &mut self,
        events: &mut dyn ParseEvents,
        flags: ParseFlags,
        eof: bool,
    ) -> bool {
        let previous = self
            .frames
            .last()
            .filter(|f| f.end_pos() == self.total_parsed)
            .map(|f| f.header);
        let resumed = previous.and_then(|prev| {
            sync::resume(&self.buf, &prev, self.free_format_bytes, eof, self.capacity)
        });
        let result = match resumed {
            Some(result) => result,
            None => sync::scan(&self.buf, &mut self.free_format_bytes, eof, self.capacity),
        };

        match result {
            SyncResult::Frame { offset, header } => {
                self.record_frame(offset, header, events, flags);
                true
            }
            SyncResult::Trailer { offset } => {
                debug_assert!(eof, "trailers are only reported at the end of the stream");
                self.consume(offset);
                self.enter_tail();
                true
            }
            SyncResult::NeedMoreData { skip } => {
                self.consume(skip);
                if eof {
                    self.enter_tail();
                    true
                } else {
                    skip > 0
                }
            }
        }
    }

    fn record_frame(
        &mut self,
        offset: usize,
        header: FrameHeader,
        events: &mut dyn ParseEvents,
        flags: ParseFlags,
    ) {
        let frame_pos = self.total_parsed + offset as u64;
        // Every recorded frame is consumed in full before the next scan
        debug_assert!(self.frames.last().map_or(0, |last| last.end_pos()) <= frame_pos);

        let end = (offset + header.frame_length as usize).min(self.buf.len());
        if self.vbr.is_none() {
            self.vbr = Some(VbrInfo::detect(&self.buf[offset..end], &header));
        }

        trace!(
            "frame {} at {}: {} {}, {} bps, {} bytes",
            self.frames.len(),
            frame_pos,
            header.version,
            header.layer,
            header.bitrate,
            header.frame_length
        );
        self.frames.push(FrameRecord { frame_pos, header });

        match self.declared_frames() {
            Some(declared) => self.frame_counter = declared,
            None => self.frame_counter += 1,
        }
        self.consume(end);

        if let Some(ms) = self.vbr.as_ref().and_then(|v| v.duration_ms) {
            if !self.duration_notified {
                self.duration_notified = true;
                events.on_meta_data(&MetaData::Duration(ms));
            }
            if flags.contains(ParseFlags::STOP_AFTER_DURATION) {
                debug!("duration known after {} bytes, stopping", self.total_parsed);
                self.complete(events);
            }
        }
    }

    /// Measure the trailing tags once the whole stream has been seen
    fn parse_tail(&mut self, events: &mut dyn ParseEvents, eof: bool) -> bool {
        if !eof {
            return false;
        }

        if let Some(trailer) = id3::measure_trailer(&self.buf, self.total_parsed) {
            debug!(
                "trailer: id3v1={} ape={} bytes",
                trailer.id3v1_size(),
                trailer.ape
            );
            if trailer.id3v1_size() > 0 {
                events.on_meta_data(&MetaData::Id3v1Size(trailer.id3v1_size()));
            }
            if trailer.ape > 0 {
                events.on_meta_data(&MetaData::ApeSize(trailer.ape));
            }
            self.trailer = Some(trailer);
        }

        let rest = self.buf.len();
        self.consume(rest);
        self.complete(events);
        true
    }

    fn enter_tail(&mut self) {
        debug!(
            "end of audio: {} frames recorded, {} total, bitrate type {}",
            self.frames.len(),
            self.frame_counter,
            self.vbr
                .as_ref()
                .map_or("none".to_string(), |v| v.bitrate_type.to_string())
        );
        self.set_stage(Stage::ParseTail);
    }

    fn complete(&mut self, events: &mut dyn ParseEvents) {
        self.set_stage(Stage::ParseCompleted);
        if !self.complete_notified {
            self.complete_notified = true;
            events.on_complete();
        }
    }

    fn set_stage(&mut self, stage: Stage) {
        if self.stage != stage {
            debug!("{:?} -> {:?} at offset {}", self.stage, stage, self.total_parsed);
            self.stage = stage;
        }
    }

    /// Drop `n` bytes from the front of the buffer
    fn consume(&mut self, n: usize) {
        let n = n.min(self.buf.len());
        self.buf.drain(..n);
        self.total_parsed += n as u64;
    }

    fn declared_frames(&self) -> Option<u64> {
        self.vbr
            .as_ref()
            .and_then(|v| v.total_frames)
            .map(u64::from)
    }

    // ==========================================================================
    // ACCESSORS
    // ==========================================================================

    pub fn stage(&self) -> Stage {
        self.stage
    }

    pub fn is_completed(&self) -> bool {
        self.stage == Stage::ParseCompleted
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Bytes buffered but not consumed yet
    pub fn remain(&self) -> usize {
        self.buf.len()
    }

    /// Absolute offset of the first unconsumed byte
    pub fn total_parsed(&self) -> u64 {
        self.total_parsed
    }

    /// Accepted frames, in stream order
    pub fn frames(&self) -> &[FrameRecord] {
        &self.frames
    }

    pub fn gaps(&self) -> Vec<FrameGap> {
        frame::find_gaps(&self.frames)
    }

    /// Declared frame count from a VBR tag, otherwise the frames counted
    pub fn total_frames(&self) -> u64 {
        self.frame_counter
    }

    pub fn id3v2(&self) -> Option<&Id3v2Info> {
        self.id3v2.as_ref()
    }

    pub fn trailer(&self) -> Option<&TrailerInfo> {
        self.trailer.as_ref()
    }

    pub fn vbr_info(&self) -> Option<&VbrInfo> {
        self.vbr.as_ref()
    }

    /// Inferred unpadded free-format frame size, 0 while unknown
    pub fn free_format_bytes(&self) -> u32 {
        self.free_format_bytes
    }

    pub fn summary(&self) -> ParseSummary {
        let first = self.frames.first().map(|f| &f.header);
        ParseSummary {
            completed: self.is_completed(),
            bytes_parsed: self.total_parsed,
            frame_count: self.frames.len(),
            total_frames: self.frame_counter,
            id3v2_size: self.id3v2.map(|t| t.total_size()),
            id3v1_size: self
                .trailer
                .map(|t| t.id3v1_size())
                .filter(|&size| size > 0),
            ape_size: self.trailer.map(|t| t.ape).filter(|&size| size > 0),
            version: first.map(|h| h.version),
            layer: first.map(|h| h.layer),
            sample_rate: first.map(|h| h.sample_rate),
            channel_mode: first.map(|h| h.channel_mode),
            free_format: first.is_some_and(|h| h.is_free_format()),
            duration_ms: self.vbr.as_ref().and_then(|v| v.duration_ms),
            vbr: self.vbr.clone(),
            gap_count: self.gaps().len(),
            stats: FrameStats::from_frames(&self.frames),
        }
    }
}

/// Snapshot of what a decoder has learned about its stream
#[derive(Debug, Clone, Serialize)]
pub struct ParseSummary {
    pub completed: bool,
    pub bytes_parsed: u64,
    /// Frames actually found in the stream
    pub frame_count: usize,
    /// Declared count from a VBR tag, or `frame_count`
    pub total_frames: u64,
    pub id3v2_size: Option<u64>,
    pub id3v1_size: Option<u32>,
    pub ape_size: Option<u32>,
    pub version: Option<MpegVersion>,
    pub layer: Option<Layer>,
    pub sample_rate: Option<u32>,
    pub channel_mode: Option<ChannelMode>,
    pub free_format: bool,
    pub duration_ms: Option<u64>,
    pub vbr: Option<VbrInfo>,
    pub gap_count: usize,
    pub stats: FrameStats,
}

/// Fill `buf` as far as the reader allows; returns 0 only at end of input
fn read_chunk<R: Read>(reader: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
