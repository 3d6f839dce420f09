//! jcarve - JPEG carving tool
//!
//! Scans a regular file, disc image or block device for embedded JPEG images
//! and writes each one to its own file.

mod cli;
mod progress;

use anyhow::{Context, Result};
use clap::Parser;
use humansize::{format_size, BINARY};
use jcarve_core::{BlockSource, ScanSummary, Scanner};
use jcarve_io::{BufferedCopySink, OffsetReplaySink, Reader};
use std::io::{self, Write};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::level_filters::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::EnvFilter;

use cli::{Args, StrategyArg};
use progress::{format_hms, ProgressReporter};

const EXIT_SUCCESS: u8 = 0;
const EXIT_FAILURE: u8 = 1;

fn main() -> ExitCode {
    let args = Args::parse();
    init_logging(args.verbose);

    let result = run(&args);
    ExitCode::from(conclude(
        &args,
        result,
        &mut io::stdout().lock(),
        &mut io::stderr().lock(),
    ))
}

/// Reports how the scan ended and returns the process exit status.
fn conclude(
    args: &Args,
    result: Result<ScanSummary>,
    out: &mut impl Write,
    err: &mut impl Write,
) -> u8 {
    match result {
        Ok(summary) if summary.cancelled => {
            let _ = writeln!(err, "\nCanceled");
            EXIT_FAILURE
        }
        Ok(summary) => match print_summary(out, args, &summary) {
            Ok(()) => EXIT_SUCCESS,
            Err(_) => EXIT_FAILURE,
        },
        Err(e) => {
            let _ = writeln!(err, "Error: {e:#}");
            EXIT_FAILURE
        }
    }
}

fn init_logging(verbose: u8) {
    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    tracing_subscriber::registry()
        .with(
            EnvFilter::builder()
                .with_default_directive(level.into())
                .from_env_lossy(),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .compact(),
        )
        .init();
}

fn run(args: &Args) -> Result<ScanSummary> {
    let options = args.scan_options()?;
    let output_dir = args.output_dir();

    let running = Arc::new(AtomicBool::new(true));
    let r = running.clone();
    ctrlc::set_handler(move || {
        r.store(false, Ordering::SeqCst);
    })
    .context("Failed to set Ctrl+C handler")?;

    let mut reader = Reader::new(&args.source)
        .with_context(|| format!("Failed to open source: {}", args.source.display()))?;
    let total = reader.size();

    println!(
        "Scanning {} ({}) into {}",
        args.source.display(),
        format_size(total, BINARY),
        output_dir.display()
    );

    let mut progress = if args.no_progress {
        ProgressReporter::hidden()
    } else {
        ProgressReporter::new(total)
    };
    let scanner = Scanner::new(options).with_running_flag(running);

    let summary = match args.strategy {
        StrategyArg::Offset => {
            let replay = Reader::new(&args.source)
                .with_context(|| format!("Failed to reopen source: {}", args.source.display()))?;
            let mut sink = OffsetReplaySink::new(replay, &output_dir).with_context(|| {
                format!("Failed to create output directory: {}", output_dir.display())
            })?;
            scanner.run(&mut reader, &mut sink, &mut progress)
        }
        StrategyArg::Buffered => {
            let mut sink = BufferedCopySink::new(&output_dir).with_context(|| {
                format!("Failed to create output directory: {}", output_dir.display())
            })?;
            scanner.run(&mut reader, &mut sink, &mut progress)
        }
    }
    .with_context(|| format!("Scan of {} failed", args.source.display()))?;

    progress.finish(&summary);
    Ok(summary)
}

fn print_summary(out: &mut impl Write, args: &Args, summary: &ScanSummary) -> io::Result<()> {
    writeln!(out)?;
    writeln!(out, "Images extracted: {}", summary.files_extracted())?;
    writeln!(
        out,
        "Bytes extracted:  {}",
        format_size(summary.bytes_extracted, BINARY)
    )?;
    writeln!(
        out,
        "Bytes scanned:    {}",
        format_size(summary.bytes_scanned, BINARY)
    )?;
    if summary.anomalies.total() > 0 {
        writeln!(out, "Abandoned:        {}", summary.anomalies.total())?;
    }
    if summary.truncated_candidate {
        writeln!(out, "Truncated image at end of source was not extracted")?;
    }
    writeln!(out, "Elapsed:          {}", format_hms(summary.duration))?;
    writeln!(out, "Output folder:    {}", args.output_dir().display())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn args() -> Args {
        Args::try_parse_from(["jcarve", "disk.img", "out/"]).unwrap()
    }

    #[test]
    fn test_cancelled_scan_fails() {
        let mut summary = ScanSummary::new(1024);
        summary.cancelled = true;
        let (mut out, mut err) = (Vec::new(), Vec::new());

        let status = conclude(&args(), Ok(summary), &mut out, &mut err);

        assert_eq!(status, EXIT_FAILURE);
        assert_eq!(String::from_utf8(err).unwrap(), "\nCanceled\n");
        assert!(out.is_empty());
    }

    #[test]
    fn test_completed_scan_prints_summary() {
        let mut summary = ScanSummary::new(1024);
        summary.bytes_scanned = 1024;
        summary.extracted.push("out/0.jpg".into());
        let (mut out, mut err) = (Vec::new(), Vec::new());

        let status = conclude(&args(), Ok(summary), &mut out, &mut err);

        assert_eq!(status, EXIT_SUCCESS);
        let text = String::from_utf8(out).unwrap();
        assert!(text.contains("Images extracted: 1"));
        assert!(text.contains("Output folder:    out"));
        assert!(err.is_empty());
    }

    #[test]
    fn test_failed_scan_reports_error() {
        let (mut out, mut err) = (Vec::new(), Vec::new());

        let status = conclude(
            &args(),
            Err(anyhow::anyhow!("Failed to open source")),
            &mut out,
            &mut err,
        );

        assert_eq!(status, EXIT_FAILURE);
        assert!(String::from_utf8(err).unwrap().starts_with("Error: Failed to open source"));
    }
}
