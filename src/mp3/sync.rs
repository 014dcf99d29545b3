//! Frame synchronization
//!
//! A valid-looking 4-byte header can occur anywhere in compressed audio or in
//! junk between tags, so a candidate is only accepted when the headers that
//! its frame length predicts are really there:
//! - Each following header must parse and describe the same stream (version,
//!   layer, sample rate, free-format-ness). At least one must.
//! - Up to `MAX_FRAME_SYNC_MATCHES` successors are walked. The walk stops at
//!   the first break; the matches before it still vouch for the candidate.
//!   Reaching the trailing tags or the end of the stream also ends it.
//! - `TAG` and `APET` bytes only count as trailing tags when the tag they
//!   start would end exactly at the end of the stream. Anywhere else they are
//!   junk, so trailers are only ever reported once the stream has ended.
//! - Once locked onto a stream, a frame that starts exactly where the previous
//!   one ended only needs its immediate successor ([`resume`]).
//! - Free-format frames have no length in the header. The length is inferred
//!   by searching for the next free-format header of the same stream and
//!   checking that a third header follows at the implied distance.
//!
//! The scanner only looks at bytes in `[candidate, candidate + horizon)` and at
//! whether the stream ends inside that range. As long as the caller passes the
//! same horizon and always offers a full window (or the end of the stream), the
//! result for a given stream position does not depend on how the input was
//! split into chunks.

use super::frame::{FrameHeader, HEADER_LEN};
use super::id3::{self, TrailerSpan};
use log::trace;

/// Maximum number of successor headers checked before a candidate is accepted
pub const MAX_FRAME_SYNC_MATCHES: usize = 10;

/// Largest distance searched for the second header of a free-format stream
pub const MAX_FREE_FORMAT_FRAME_SIZE: usize = 2304;

/// What the scanner found in a window
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncResult {
    /// An accepted frame at `offset`. The header's `frame_length` is resolved,
    /// free format included.
    Frame { offset: usize, header: FrameHeader },
    /// The trailing ID3v1/APE tags start at `offset` and run to the end of
    /// the stream. Only reported at the end of the stream.
    Trailer { offset: usize },
    /// Nothing can be decided yet; the first `skip` bytes hold no frame start
    NeedMoreData { skip: usize },
}

/// Whether `data` starts with an ID3v1 or APEv2 marker
pub fn is_trailer_marker(data: &[u8]) -> bool {
    data.starts_with(b"TAG") || data.starts_with(b"APET")
}

enum Verdict {
    Accept,
    Reject,
    NeedMore,
}

enum TrailerCheck {
    Trailer,
    NotTrailer,
    NeedMore,
    /// The tag would reach past the look-ahead limit
    BeyondHorizon,
}

enum FreeFormat {
    Found(u32),
    NotFound,
    NeedMore,
}

/// Find the first acceptable frame in `window`.
///
/// `free_format_bytes` carries the inferred unpadded free-format frame size
/// between calls (0 while unknown) and is updated when a new size is inferred.
/// `eof` says the stream ends with `window`.
pub fn scan(window: &[u8], free_format_bytes: &mut u32, eof: bool, horizon: usize) -> SyncResult {
    let last = window.len().saturating_sub(HEADER_LEN - 1);

    for i in 0..last {
        match trailer_at(window, i, eof, i.saturating_add(horizon)) {
            TrailerCheck::Trailer => return SyncResult::Trailer { offset: i },
            TrailerCheck::NeedMore => return SyncResult::NeedMoreData { skip: i },
            TrailerCheck::NotTrailer | TrailerCheck::BeyondHorizon => {}
        }

        let Some(header) = FrameHeader::parse_slice(&window[i..]) else {
            continue;
        };

        if header.is_free_format() {
            if *free_format_bytes != 0 {
                let verdict = corroborate(
                    window,
                    i,
                    &header,
                    *free_format_bytes,
                    eof,
                    horizon,
                    MAX_FRAME_SYNC_MATCHES,
                );
                match verdict {
                    Verdict::Accept => {
                        let length = header.length_with(*free_format_bytes);
                        return SyncResult::Frame {
                            offset: i,
                            header: header.with_frame_length(length),
                        };
                    }
                    Verdict::NeedMore => return SyncResult::NeedMoreData { skip: i },
                    // The stream may have changed size, search again
                    Verdict::Reject => {}
                }
            }

            match infer_free_format(window, i, &header, eof, horizon) {
                FreeFormat::Found(bytes) => {
                    trace!("free format frame size {} at {}", bytes, i);
                    *free_format_bytes = bytes;
                    return SyncResult::Frame {
                        offset: i,
                        header: header.with_frame_length(header.length_with(bytes)),
                    };
                }
                FreeFormat::NeedMore => return SyncResult::NeedMoreData { skip: i },
                FreeFormat::NotFound => continue,
            }
        }

        let verdict = corroborate(
            window,
            i,
            &header,
            *free_format_bytes,
            eof,
            horizon,
            MAX_FRAME_SYNC_MATCHES,
        );
        match verdict {
            Verdict::Accept => return SyncResult::Frame { offset: i, header },
            Verdict::NeedMore => return SyncResult::NeedMoreData { skip: i },
            Verdict::Reject => trace!("rejected sync candidate at {}", i),
        }
    }

    SyncResult::NeedMoreData { skip: last }
}

/// Fast path for a frame that starts right where `previous` ended.
///
/// Only the immediate successor is checked. Returns `None` when the window
/// does not start with a frame of the same stream or the successor does not
/// match; the caller then falls back to [`scan`].
pub fn resume(
    window: &[u8],
    previous: &FrameHeader,
    free_format_bytes: u32,
    eof: bool,
    horizon: usize,
) -> Option<SyncResult> {
    let header = FrameHeader::parse_slice(window)?;
    if !header.same_stream(previous) {
        return None;
    }

    let length = header.length_with(free_format_bytes);
    if length == 0 {
        return None;
    }

    match corroborate(window, 0, &header, free_format_bytes, eof, horizon, 1) {
        Verdict::Accept => Some(SyncResult::Frame {
            offset: 0,
            header: header.with_frame_length(length),
        }),
        Verdict::NeedMore => Some(SyncResult::NeedMoreData { skip: 0 }),
        Verdict::Reject => None,
    }
}

/// Follow the chain of frame lengths starting at `start`
fn corroborate(
    window: &[u8],
    start: usize,
    first: &FrameHeader,
    free_format_bytes: u32,
    eof: bool,
    horizon: usize,
    max_matches: usize,
) -> Verdict {
    let limit = start.saturating_add(horizon);
    let mut header = *first;
    let mut pos = start;
    let mut matches = 0;

    while matches < max_matches {
        let length = header.length_with(free_format_bytes) as usize;
        if length == 0 {
            return Verdict::Reject;
        }
        pos += length;

        if pos + HEADER_LEN > limit {
            return Verdict::Accept;
        }
        if pos + HEADER_LEN > window.len() {
            if matches > 0 {
                return Verdict::Accept;
            }
            if !eof {
                return Verdict::NeedMore;
            }
            // The stream ends here: accept a final frame that fits completely
            return if pos <= window.len() {
                Verdict::Accept
            } else {
                Verdict::Reject
            };
        }

        match trailer_at(window, pos, eof, limit) {
            TrailerCheck::Trailer | TrailerCheck::BeyondHorizon => return Verdict::Accept,
            TrailerCheck::NeedMore if matches > 0 => return Verdict::Accept,
            TrailerCheck::NeedMore => return Verdict::NeedMore,
            TrailerCheck::NotTrailer => {}
        }

        match FrameHeader::parse_slice(&window[pos..]) {
            Some(h) if h.same_stream(first) => {
                header = h;
                matches += 1;
            }
            _ if matches > 0 => break,
            _ => return Verdict::Reject,
        }
    }

    trace!("sync at {} confirmed by {} frames", start, matches);
    Verdict::Accept
}

/// Decide whether a `TAG`/`APET` marker at `pos` starts the trailing tags.
///
/// Only bytes before `limit` are looked at. The tag has to end exactly at the
/// end of the stream, so a definite answer needs `eof`.
fn trailer_at(window: &[u8], pos: usize, eof: bool, limit: usize) -> TrailerCheck {
    if pos >= limit {
        return TrailerCheck::BeyondHorizon;
    }
    let cut = window.len() > limit || (window.len() == limit && !eof);
    let view = &window[pos..window.len().min(limit)];
    if !is_trailer_marker(view) {
        return TrailerCheck::NotTrailer;
    }

    let lengths = match id3::trailer_span(view) {
        TrailerSpan::Invalid => return TrailerCheck::NotTrailer,
        TrailerSpan::Incomplete if cut => return TrailerCheck::BeyondHorizon,
        TrailerSpan::Incomplete if eof => return TrailerCheck::NotTrailer,
        TrailerSpan::Incomplete => return TrailerCheck::NeedMore,
        TrailerSpan::Lengths(lengths) => lengths,
    };

    let remaining = view.len() as u64;
    if lengths.iter().all(|&len| remaining > len) {
        TrailerCheck::NotTrailer
    } else if cut {
        TrailerCheck::BeyondHorizon
    } else if !eof {
        TrailerCheck::NeedMore
    } else if lengths.contains(&remaining) {
        TrailerCheck::Trailer
    } else {
        TrailerCheck::NotTrailer
    }
}

/// Infer the unpadded size of a free-format frame starting at `start`.
///
/// The first distance `k` that has a matching free-format header at
/// `start + k` and a third header (or the end of the stream) one frame after
/// that wins.
fn infer_free_format(
    window: &[u8],
    start: usize,
    first: &FrameHeader,
    eof: bool,
    horizon: usize,
) -> FreeFormat {
    let first_pad = first.padding_bytes();

    for k in HEADER_LEN..MAX_FREE_FORMAT_FRAME_SIZE {
        let second_pos = start + k;
        if second_pos + HEADER_LEN > window.len() {
            return if eof {
                FreeFormat::NotFound
            } else {
                FreeFormat::NeedMore
            };
        }

        let Some(second) = FrameHeader::parse_slice(&window[second_pos..]) else {
            continue;
        };
        if !second.same_stream(first) {
            continue;
        }

        let bytes = match (k as u32).checked_sub(first_pad) {
            Some(b) if b > 0 => b,
            _ => continue,
        };

        let third_pos = second_pos + (bytes + second.padding_bytes()) as usize;
        if third_pos + HEADER_LEN > window.len() {
            if !eof {
                return FreeFormat::NeedMore;
            }
            if third_pos <= window.len() {
                return FreeFormat::Found(bytes);
            }
            continue;
        }

        match trailer_at(window, third_pos, eof, start.saturating_add(horizon)) {
            TrailerCheck::Trailer | TrailerCheck::BeyondHorizon => {
                return FreeFormat::Found(bytes)
            }
            TrailerCheck::NeedMore => return FreeFormat::NeedMore,
            TrailerCheck::NotTrailer => {}
        }
        let third = &window[third_pos..];
        if matches!(FrameHeader::parse_slice(third), Some(h) if h.same_stream(first)) {
            return FreeFormat::Found(bytes);
        }
    }

    FreeFormat::NotFound
}
