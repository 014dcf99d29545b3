use chrono::Local;
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use mpastream::{FileReport, Prober, DEFAULT_BUFFER_CAPACITY};
use rayon::prelude::*;
use std::collections::HashSet;
use std::path::PathBuf;
use walkdir::WalkDir;

#[derive(Parser, Debug)]
#[command(name = "mpastream")]
#[command(author, version, about = "Inventory the frames and tags of MPEG audio files")]
struct Args {
    /// File or directory to parse
    path: PathBuf,

    /// Output report file (.csv, .json)
    #[arg(short, long)]
    output: Option<PathBuf>,

    /// Directory for auto-generated reports
    #[arg(long, default_value = "mpastream-reports")]
    report_dir: PathBuf,

    /// Don't auto-generate CSV report
    #[arg(long)]
    no_report: bool,

    /// Number of parallel workers (default: number of CPUs)
    #[arg(short, long)]
    jobs: Option<usize>,

    /// Bytes handed to the parser per call (default: read whole buffers)
    #[arg(long)]
    chunk_size: Option<usize>,

    /// Parser buffer capacity in bytes
    #[arg(long, default_value_t = DEFAULT_BUFFER_CAPACITY)]
    buffer_size: usize,

    /// Stop as soon as a VBR tag gives the duration
    #[arg(long)]
    stop_after_duration: bool,

    /// List every frame (and include them in JSON reports)
    #[arg(long)]
    frames: bool,

    /// Show stream details and debug logging
    #[arg(short, long)]
    verbose: bool,

    /// Only show summary
    #[arg(short, long)]
    quiet: bool,
}

fn main() {
    let args = Args::parse();

    let default_filter = if args.verbose { "debug" } else { "warn" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_filter))
        .init();

    // Set up thread pool
    if let Some(jobs) = args.jobs {
        rayon::ThreadPoolBuilder::new()
            .num_threads(jobs)
            .build_global()
            .ok();
    }

    // Supported MPEG audio extensions
    let supported_extensions: HashSet<&str> = ["mp3", "mp2", "mp1", "mpa"].into_iter().collect();

    // Collect audio files
    let files: Vec<PathBuf> = if args.path.is_dir() {
        WalkDir::new(&args.path)
            .into_iter()
            .filter_map(|e| e.ok())
            .filter(|e| {
                e.path()
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| supported_extensions.contains(ext.to_ascii_lowercase().as_str()))
                    .unwrap_or(false)
            })
            .map(|e| e.path().to_path_buf())
            .collect()
    } else {
        vec![args.path.clone()]
    };

    if files.is_empty() {
        eprintln!("No MPEG audio files found (supported: mp3, mp2, mp1, mpa)");
        std::process::exit(1);
    }

    if !args.quiet {
        eprintln!("\x1b[1mmpastream - MPEG Audio Stream Inventory\x1b[0m");
        eprintln!("{}", "─".repeat(70));
        eprintln!("Found {} file(s)\n", files.len());
    }

    // Set up progress bar
    let pb = if !args.quiet && files.len() > 1 {
        let pb = ProgressBar::new(files.len() as u64);
        let style = ProgressStyle::default_bar()
            .template("{spinner:.green} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar())
            .progress_chars("=>-");
        pb.set_style(style);
        Some(pb)
    } else {
        None
    };

    let prober = Prober::new()
        .with_capacity(args.buffer_size)
        .with_chunk_size(args.chunk_size)
        .with_stop_after_duration(args.stop_after_duration)
        .with_frames(args.frames);

    // Parse files in parallel, one decoder per file
    let reports: Vec<FileReport> = files
        .par_iter()
        .map(|path| {
            let report = prober.probe(path);
            if let Some(ref pb) = pb {
                pb.inc(1);
                pb.set_message(report.file_name.clone());
            }
            report
        })
        .collect();

    if let Some(pb) = pb {
        pb.finish_and_clear();
    }

    // Print results
    if !args.quiet {
        for r in &reports {
            print_report(r, args.verbose, args.frames);
        }
    }

    let summary = mpastream::report::Summary::from_reports(&reports);

    if !args.quiet {
        eprintln!("\n{}", "─".repeat(70));
        eprintln!("\x1b[1mSummary:\x1b[0m");
        eprintln!("  \x1b[32m✓ Parsed:\x1b[0m      {}", summary.parsed);
        eprintln!("  Frames:        {}", summary.frames);
        eprintln!("  VBR tagged:    {}", summary.tagged);
        if summary.free_format > 0 {
            eprintln!("  Free format:   {}", summary.free_format);
        }
        if summary.error > 0 {
            eprintln!("  \x1b[31m✗ Errors:\x1b[0m      {}", summary.error);
        }
    }

    // Determine report path
    let report_path = if let Some(ref output) = args.output {
        Some(output.clone())
    } else if !args.no_report {
        // Auto-generate report
        std::fs::create_dir_all(&args.report_dir).ok();
        let timestamp = Local::now().format("%Y%m%d_%H%M%S");
        let filename = format!("mpastream_report_{}.csv", timestamp);
        Some(args.report_dir.join(filename))
    } else {
        None
    };

    // Generate report
    if let Some(ref output_path) = report_path {
        if let Err(e) = mpastream::report::generate(output_path, &reports) {
            eprintln!("Failed to write report: {}", e);
            std::process::exit(1);
        }
        if !args.quiet {
            eprintln!("\n\x1b[32mReport saved: {}\x1b[0m", output_path.display());
        }
    }

    if summary.error > 0 {
        std::process::exit(1);
    }
}

fn print_report(r: &FileReport, verbose: bool, frames: bool) {
    let reset = "\x1b[0m";

    let Some(s) = r.summary.as_ref() else {
        println!(
            "\x1b[31m{:<10}{} {}  {}",
            "[ERROR]",
            reset,
            &r.file_name,
            r.error.as_deref().unwrap_or("unknown error")
        );
        return;
    };

    let (color, status) = if s.completed {
        ("\x1b[32m", "[OK]")
    } else {
        ("\x1b[33m", "[PARTIAL]")
    };
    let stream = match (s.version, s.layer, s.sample_rate) {
        (Some(v), Some(l), Some(rate)) => format!("{} {} {}Hz", v, l, rate),
        _ => "no audio frames".to_string(),
    };
    let bitrate_type = s
        .vbr
        .as_ref()
        .map(|v| v.bitrate_type.to_string())
        .unwrap_or_else(|| "-".to_string());
    let duration = s
        .duration_ms
        .map(format_duration)
        .unwrap_or_else(|| "--:--".to_string());

    println!(
        "{}{:<10}{} {:>6} frames  {:>4}kbps {:<7}  {:>8}  {:<28}  {}",
        color,
        status,
        reset,
        s.frame_count,
        s.stats.avg_bitrate / 1000,
        bitrate_type,
        duration,
        truncate(&stream, 28),
        &r.file_name
    );

    if verbose {
        eprintln!(
            "    Tags: id3v2={} id3v1={} ape={} | encoder={}",
            size_or_dash(s.id3v2_size),
            size_or_dash(s.id3v1_size.map(u64::from)),
            size_or_dash(s.ape_size.map(u64::from)),
            r.encoder().unwrap_or("n/a")
        );
        eprintln!(
            "    Frames: found={} declared={} gaps={} bitrate={}-{}kbps frame_cv={:.1}%",
            s.frame_count,
            s.total_frames,
            s.gap_count,
            s.stats.min_bitrate / 1000,
            s.stats.max_bitrate / 1000,
            s.stats.frame_size_cv
        );
        if let Some(lame) = s.vbr.as_ref().and_then(|v| v.lame.as_ref()) {
            eprintln!(
                "    LAME: method={} lowpass={} delay={} padding={}",
                lame.vbr_method,
                lame.lowpass
                    .map(|l| format!("{}Hz", l))
                    .unwrap_or_else(|| "n/a".to_string()),
                lame.encoder_delay,
                lame.encoder_padding
            );
        }
    }

    if frames {
        for (idx, f) in r.frames.iter().flatten().enumerate() {
            println!(
                "    #{:<6} @{:<10} {:>4}kbps {:>5}Hz {:>5} bytes{}",
                idx,
                f.frame_pos,
                f.header.bitrate / 1000,
                f.header.sample_rate,
                f.header.frame_length,
                if f.header.padding { " (padded)" } else { "" }
            );
        }
    }
}

fn format_duration(ms: u64) -> String {
    let secs = ms / 1000;
    format!("{}:{:02}", secs / 60, secs % 60)
}

fn size_or_dash(size: Option<u64>) -> String {
    size.map(|s| s.to_string()).unwrap_or_else(|| "-".to_string())
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        let cut: String = s.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
