//! Error types shared by the parser, the file driver and the CLI.

use thiserror::Error;

/// Everything that can go wrong while parsing an MPEG audio stream
#[derive(Debug, Error)]
pub enum Error {
    /// Empty input, bad flags or an unusable configuration
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// The accumulation buffer could not be allocated
    #[error("out of memory: {0}")]
    OutOfMemory(String),

    /// The file cannot hold even a single frame header
    #[error("invalid file: {0}")]
    InvalidFile(String),

    /// The decoder is not in a state that accepts this call
    #[error("illegal state: {0}")]
    IllegalState(String),

    /// Not a failure: the caller should come back with more bytes
    #[error("need more data")]
    NeedMoreData,

    /// Unrecoverable structural inconsistency; the decoder has been reset
    #[error("parse failure: {0}")]
    ParseFailure(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    /// Short machine-friendly name, used in report rows
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidArgument(_) => "invalid_argument",
            Error::OutOfMemory(_) => "out_of_memory",
            Error::InvalidFile(_) => "invalid_file",
            Error::IllegalState(_) => "illegal_state",
            Error::NeedMoreData => "need_more_data",
            Error::ParseFailure(_) => "parse_failure",
            Error::Io(_) => "io",
        }
    }
}
