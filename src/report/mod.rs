//! Report generation for parse results
//!
//! This module provides output formatters for a batch of [`FileReport`]s:
//!
//! - **JSON**: Machine-readable format, including stream details and events
//! - **CSV**: Spreadsheet-compatible format, one row per file
//!
//! # Usage
//!
//! ```ignore
//! use mpastream::report;
//!
//! // Automatically picks format based on extension
//! report::generate("report.json", &reports)?;  // JSON
//! report::generate("report.csv", &reports)?;   // CSV
//! ```

pub mod csv;
pub mod json;

use crate::mp3::vbr::BitrateType;
use crate::probe::FileReport;
use std::io;
use std::path::Path;

/// Generate a report in the appropriate format based on file extension
pub fn generate<P: AsRef<Path>>(path: P, reports: &[FileReport]) -> io::Result<()> {
    let path = path.as_ref();
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_lowercase();

    let mut file = std::fs::File::create(path)?;

    match ext.as_str() {
        "json" => json::write(&mut file, reports),
        _ => csv::write(&mut file, reports),
    }
}

/// Summary statistics for a batch of reports
#[derive(Debug, Clone, Default)]
pub struct Summary {
    pub total: usize,
    pub parsed: usize,
    pub error: usize,
    /// Files whose first frame carried a Xing/Info or VBRI tag
    pub tagged: usize,
    pub free_format: usize,
    pub frames: u64,
}

impl Summary {
    pub fn from_reports(reports: &[FileReport]) -> Self {
        let mut summary = Self {
            total: reports.len(),
            ..Self::default()
        };

        for r in reports {
            let Some(s) = r.summary.as_ref() else {
                summary.error += 1;
                continue;
            };
            summary.parsed += 1;
            summary.frames += s.frame_count as u64;
            if s.vbr.as_ref().is_some_and(|v| v.has_tag()) {
                summary.tagged += 1;
            }
            if s.vbr.as_ref().map(|v| v.bitrate_type) == Some(BitrateType::Free) {
                summary.free_format += 1;
            }
        }

        summary
    }
}
