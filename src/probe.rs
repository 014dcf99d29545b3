//! Per-file parsing driver
//!
//! [`Prober`] runs a fresh [`Decoder`] over one file and folds the outcome
//! (or the error) into a [`FileReport`], the row type used by the CLI and the
//! report writers. It is `Sync`, so one prober can serve a whole rayon pool.

use crate::decoder::{Decoder, ParseSummary, DEFAULT_BUFFER_CAPACITY};
use crate::error::{Error, Result};
use crate::events::{EventLog, MetaData, ParseFlags};
use crate::mp3::frame::{FrameRecord, HEADER_LEN};
use serde::Serialize;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// Outcome of parsing one file
#[derive(Debug, Clone, Serialize)]
pub struct FileReport {
    pub file_path: String,
    pub file_name: String,
    pub file_size: u64,
    pub summary: Option<ParseSummary>,
    /// Events in the order the decoder reported them
    pub events: Vec<MetaData>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub frames: Option<Vec<FrameRecord>>,
    pub error: Option<String>,
    pub error_kind: Option<String>,
}

impl FileReport {
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Encoder string from a LAME/Lavc tag, if any
    pub fn encoder(&self) -> Option<&str> {
        self.summary
            .as_ref()
            .and_then(|s| s.vbr.as_ref())
            .and_then(|v| v.lame.as_ref())
            .map(|l| l.encoder.as_str())
    }
}

/// Parses files into [`FileReport`]s
#[derive(Debug, Clone)]
pub struct Prober {
    /// Read size per `submit` call; `None` lets `Decoder::parse_file` pick
    pub chunk_size: Option<usize>,
    pub capacity: usize,
    pub flags: ParseFlags,
    /// Keep every frame record in the report
    pub keep_frames: bool,
}

impl Default for Prober {
    fn default() -> Self {
        Self::new()
    }
}

impl Prober {
    pub fn new() -> Self {
        Self {
            chunk_size: None,
            capacity: DEFAULT_BUFFER_CAPACITY,
            flags: ParseFlags::empty(),
            keep_frames: false,
        }
    }

    pub fn with_chunk_size(mut self, chunk_size: Option<usize>) -> Self {
        self.chunk_size = chunk_size;
        self
    }

    pub fn with_capacity(mut self, capacity: usize) -> Self {
        self.capacity = capacity;
        self
    }

    pub fn with_stop_after_duration(mut self, stop: bool) -> Self {
        self.flags.set(ParseFlags::STOP_AFTER_DURATION, stop);
        self
    }

    pub fn with_frames(mut self, keep: bool) -> Self {
        self.keep_frames = keep;
        self
    }

    /// Parse `path`; failures are recorded in the report instead of returned
    pub fn probe<P: AsRef<Path>>(&self, path: P) -> FileReport {
        let path = path.as_ref();
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        let file_size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);

        let mut report = FileReport {
            file_path: path.display().to_string(),
            file_name,
            file_size,
            summary: None,
            events: Vec::new(),
            frames: None,
            error: None,
            error_kind: None,
        };

        let mut log = EventLog::new();
        match self.run(path, &mut log) {
            Ok(decoder) => {
                report.summary = Some(decoder.summary());
                if self.keep_frames {
                    report.frames = Some(decoder.frames().to_vec());
                }
            }
            Err(e) => {
                report.error_kind = Some(e.kind().to_string());
                report.error = Some(e.to_string());
            }
        }
        report.events = log.meta;

        report
    }

    fn run(&self, path: &Path, log: &mut EventLog) -> Result<Decoder> {
        let mut decoder = Decoder::with_capacity(self.capacity)?;

        match self.chunk_size {
            None => decoder.parse_file(path, log, self.flags)?,
            Some(0) => {
                return Err(Error::InvalidArgument("chunk size must be positive".into()));
            }
            Some(size) => submit_in_chunks(&mut decoder, path, size, log, self.flags)?,
        }

        Ok(decoder)
    }
}

/// Feed a file to `decoder` in chunks of exactly `size` bytes
fn submit_in_chunks(
    decoder: &mut Decoder,
    path: &Path,
    size: usize,
    log: &mut EventLog,
    flags: ParseFlags,
) -> Result<()> {
    let mut data = Vec::new();
    File::open(path)?.read_to_end(&mut data)?;
    if data.len() < HEADER_LEN {
        return Err(Error::InvalidFile(format!(
            "{} is {} bytes, smaller than a frame header",
            path.display(),
            data.len()
        )));
    }

    let mut chunks = data.chunks(size).peekable();
    while let Some(chunk) = chunks.next() {
        let eof = chunks.peek().is_none();
        decoder.submit(chunk, log, flags, eof)?;
        if decoder.is_completed() {
            break;
        }
    }

    Ok(())
}
