//! JSON report generation

use crate::probe::FileReport;
use crate::report::Summary;
use chrono::Local;
use serde::Serialize;
use std::io::{self, Write};

#[derive(Serialize)]
struct JsonReport<'a> {
    generated: String,
    summary: JsonSummary,
    files: &'a [FileReport],
}

#[derive(Serialize)]
struct JsonSummary {
    total: usize,
    parsed: usize,
    error: usize,
    tagged: usize,
    free_format: usize,
    frames: u64,
}

pub fn write<W: Write>(writer: &mut W, reports: &[FileReport]) -> io::Result<()> {
    let summary = Summary::from_reports(reports);

    let report = JsonReport {
        generated: Local::now().to_rfc3339(),
        summary: JsonSummary {
            total: summary.total,
            parsed: summary.parsed,
            error: summary.error,
            tagged: summary.tagged,
            free_format: summary.free_format,
            frames: summary.frames,
        },
        files: reports,
    };

    let json = serde_json::to_string_pretty(&report).map_err(io::Error::other)?;

    writer.write_all(json.as_bytes())
}
