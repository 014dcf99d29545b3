//! CSV report generation

use crate::probe::FileReport;
use std::io::{self, Write};

pub fn write<W: Write>(writer: &mut W, reports: &[FileReport]) -> io::Result<()> {
    // Header
    writeln!(
        writer,
        "status,filepath,version,layer,sample_rate,frames,total_frames,bitrate_type,avg_bitrate_kbps,duration_ms,id3v2_size,id3v1_size,ape_size,gaps,encoder,error"
    )?;

    // Rows
    for r in reports {
        let Some(s) = r.summary.as_ref() else {
            writeln!(
                writer,
                "error,{},,,,,,,,,,,,,,{}",
                escape_csv(&r.file_path),
                escape_csv(r.error.as_deref().unwrap_or("unknown error"))
            )?;
            continue;
        };

        let status = if s.completed { "ok" } else { "partial" };
        let bitrate_type = s
            .vbr
            .as_ref()
            .map(|v| v.bitrate_type.to_string())
            .unwrap_or_else(|| "n/a".to_string());

        writeln!(
            writer,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},",
            status,
            escape_csv(&r.file_path),
            opt(s.version),
            opt(s.layer),
            opt(s.sample_rate),
            s.frame_count,
            s.total_frames,
            bitrate_type,
            s.stats.avg_bitrate / 1000,
            opt(s.duration_ms),
            opt(s.id3v2_size),
            opt(s.id3v1_size),
            opt(s.ape_size),
            s.gap_count,
            escape_csv(r.encoder().unwrap_or("")),
        )?;
    }

    Ok(())
}

fn opt<T: std::fmt::Display>(value: Option<T>) -> String {
    value.map(|v| v.to_string()).unwrap_or_default()
}

fn escape_csv(s: &str) -> String {
    if s.contains(',') || s.contains('"') || s.contains('\n') {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}
