use anyhow::{bail, Result};
use clap::{ArgAction, Parser, ValueEnum};
use jcarve_core::scanner::DEFAULT_CHUNK_SIZE;
use jcarve_core::{DuplicateSoiPolicy, ScanOptions, SkipMode};
use std::path::{Path, PathBuf};

pub const DEFAULT_OUTPUT_DIR: &str = "./jpeg-files";

#[derive(Parser, Debug)]
#[command(name = "jcarve")]
#[command(author, version)]
#[command(about = "Carve JPEG images out of files, disc images and block devices", long_about = None)]
pub struct Args {
    /// The file to scan; could be a regular file, disc image or block device
    pub source: PathBuf,

    /// Directory to save extracted files to
    #[arg(default_value = DEFAULT_OUTPUT_DIR)]
    pub output: PathBuf,

    /// How extracted images are written
    #[arg(long, value_enum, default_value_t = StrategyArg::Offset)]
    pub strategy: StrategyArg,

    /// How segment bodies are skipped
    #[arg(long, value_enum, default_value_t = SkipArg::Count)]
    pub skip: SkipArg,

    /// Treat an SOI inside scan data as the start of a fresh image header
    #[arg(long, default_value_t = false)]
    pub strict_soi: bool,

    /// Bytes read from the source per I/O call
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,

    /// Do not draw the progress bar
    #[arg(long, default_value_t = false)]
    pub no_progress: bool,

    /// Increase log verbosity (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum StrategyArg {
    /// Re-read each image from the source, name it by its start offset
    Offset,
    /// Keep each image in memory while scanning, name it randomly
    Buffered,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum SkipArg {
    /// Count segment bodies down byte by byte
    Count,
    /// Seek past segment bodies (offset strategy only)
    Seek,
}

impl Args {
    pub fn scan_options(&self) -> Result<ScanOptions> {
        if self.chunk_size == 0 {
            bail!("--chunk-size must be greater than zero");
        }

        let skip_mode = match self.skip {
            SkipArg::Count => SkipMode::Count,
            SkipArg::Seek => SkipMode::Seek,
        };
        if skip_mode == SkipMode::Seek && self.strategy == StrategyArg::Buffered {
            bail!("--skip seek requires --strategy offset");
        }

        let duplicate_soi = if self.strict_soi {
            DuplicateSoiPolicy::StrictReset
        } else {
            DuplicateSoiPolicy::RestartOffset
        };

        Ok(ScanOptions::default()
            .with_chunk_size(self.chunk_size)
            .with_skip_mode(skip_mode)
            .with_duplicate_soi(duplicate_soi))
    }

    pub fn output_dir(&self) -> PathBuf {
        normalize_dir(&self.output)
    }
}

/// Drops a trailing separator, so `out/` and `out` name the same directory.
pub fn normalize_dir(path: &Path) -> PathBuf {
    let normalized: PathBuf = path.components().collect();
    if normalized.as_os_str().is_empty() {
        path.to_path_buf()
    } else {
        normalized
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::try_parse_from(["jcarve", "disk.img"]).unwrap();
        assert_eq!(args.source, PathBuf::from("disk.img"));
        assert_eq!(args.output, PathBuf::from(DEFAULT_OUTPUT_DIR));
        assert_eq!(args.strategy, StrategyArg::Offset);
        assert_eq!(args.skip, SkipArg::Count);

        let options = args.scan_options().unwrap();
        assert_eq!(options.chunk_size, DEFAULT_CHUNK_SIZE);
        assert_eq!(options.skip_mode, SkipMode::Count);
        assert_eq!(options.duplicate_soi, DuplicateSoiPolicy::RestartOffset);
    }

    #[test]
    fn test_missing_source_is_usage_error() {
        let err = Args::try_parse_from(["jcarve"]).unwrap_err();
        assert_eq!(
            err.kind(),
            clap::error::ErrorKind::MissingRequiredArgument
        );
    }

    #[test]
    fn test_output_and_flags() {
        let args = Args::try_parse_from([
            "jcarve",
            "/dev/sdb",
            "recovered/",
            "--strategy",
            "buffered",
            "--strict-soi",
            "--chunk-size",
            "4096",
            "-vv",
        ])
        .unwrap();

        assert_eq!(args.output_dir(), PathBuf::from("recovered"));
        assert_eq!(args.strategy, StrategyArg::Buffered);
        assert_eq!(args.verbose, 2);

        let options = args.scan_options().unwrap();
        assert_eq!(options.chunk_size, 4096);
        assert_eq!(options.duplicate_soi, DuplicateSoiPolicy::StrictReset);
    }

    #[test]
    fn test_seek_needs_offset_strategy() {
        let args = Args::try_parse_from([
            "jcarve", "disk.img", "--strategy", "buffered", "--skip", "seek",
        ])
        .unwrap();
        assert!(args.scan_options().is_err());

        let args = Args::try_parse_from(["jcarve", "disk.img", "--skip", "seek"]).unwrap();
        assert_eq!(args.scan_options().unwrap().skip_mode, SkipMode::Seek);
    }

    #[test]
    fn test_zero_chunk_size_rejected() {
        let args = Args::try_parse_from(["jcarve", "disk.img", "--chunk-size", "0"]).unwrap();
        assert!(args.scan_options().is_err());
    }

    #[test]
    fn test_normalize_dir() {
        assert_eq!(normalize_dir(Path::new("out/")), PathBuf::from("out"));
        assert_eq!(normalize_dir(Path::new("./jpeg-files")), PathBuf::from("./jpeg-files"));
        assert_eq!(normalize_dir(Path::new("/")), PathBuf::from("/"));
    }
}
