//! Extraction sinks writing carved images to a local directory.
//!
//! Both sinks create their output directory on construction and refuse to
//! overwrite: a file that already exists under the generated name is
//! reported as [`CoreError::FileExists`].

use jcarve_core::{
    BlockSource, CoreError, Extraction, ExtractionSink, JPEG_EXTENSION, Result, Strategy,
};
use rand::RngCore;
use std::fs::{self, File, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

const REPLAY_CHUNK_SIZE: usize = 1024 * 1024;
const RANDOM_NAME_BYTES: usize = 16;

/// Creates `dir` and its parents if needed. Existing directories are fine.
pub fn ensure_output_dir(dir: &Path) -> Result<()> {
    fs::create_dir_all(dir)?;
    Ok(())
}

fn create_output_file(path: &Path) -> Result<File> {
    OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(path)
        .map_err(|e| {
            if e.kind() == ErrorKind::AlreadyExists {
                CoreError::FileExists(path.display().to_string())
            } else {
                CoreError::Io(e)
            }
        })
}

/// Writes `write` into a new file at `path`, removing the file again if
/// anything fails so no partial image is left behind.
fn write_new_file<F>(path: &Path, write: F) -> Result<()>
where
    F: FnOnce(&mut File) -> Result<()>,
{
    let mut file = create_output_file(path)?;

    let result = write(&mut file).and_then(|()| file.sync_all().map_err(CoreError::from));
    if result.is_err() {
        drop(file);
        let _ = fs::remove_file(path);
    }
    result
}

/// Re-reads each carved range from the source and names the file after its
/// start offset, e.g. `1048576.jpg`.
pub struct OffsetReplaySink<S: BlockSource> {
    source: S,
    output_dir: PathBuf,
    buffer: Vec<u8>,
    files_written: usize,
    bytes_written: u64,
}

impl<S: BlockSource> OffsetReplaySink<S> {
    /// `source` must be a separate handle on the stream being scanned.
    pub fn new(source: S, output_dir: &Path) -> Result<Self> {
        ensure_output_dir(output_dir)?;

        Ok(Self {
            source,
            output_dir: output_dir.to_path_buf(),
            buffer: vec![0u8; REPLAY_CHUNK_SIZE],
            files_written: 0,
            bytes_written: 0,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn files_written(&self) -> usize {
        self.files_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn file_name(start: u64) -> String {
        format!("{start}.{JPEG_EXTENSION}")
    }

    fn copy_range(&mut self, file: &mut File, start: u64, end: u64) -> Result<()> {
        let mut offset = start;

        while offset < end {
            let want = usize::try_from(end - offset)
                .unwrap_or(usize::MAX)
                .min(self.buffer.len());
            let n = self.source.read_chunk(offset, &mut self.buffer[..want])?;
            if n == 0 {
                return Err(CoreError::OutOfBounds {
                    offset,
                    max: self.source.size(),
                });
            }

            file.write_all(&self.buffer[..n])?;
            offset += n as u64;
        }

        Ok(())
    }
}

impl<S: BlockSource> ExtractionSink for OffsetReplaySink<S> {
    fn strategy(&self) -> Strategy {
        Strategy::OffsetReplay
    }

    fn extract(&mut self, extraction: Extraction) -> Result<PathBuf> {
        let (start, end) = (extraction.start(), extraction.end());
        if end <= start {
            return Err(CoreError::InvalidRange { start, end });
        }

        let size = self.source.size();
        if size > 0 && end > size {
            return Err(CoreError::OutOfBounds {
                offset: end,
                max: size,
            });
        }

        let path = self.output_dir.join(Self::file_name(start));
        write_new_file(&path, |file| self.copy_range(file, start, end))?;

        self.files_written += 1;
        self.bytes_written += end - start;
        Ok(path)
    }
}

/// Writes the bytes retained during the scan under a random hexadecimal
/// name, e.g. `3f9c0d7e5a1b2c4d8e6f7a9b0c1d2e3f.jpg`.
///
/// Needs no access to the source after scanning, so it also works for
/// streams that cannot be re-read.
pub struct BufferedCopySink {
    output_dir: PathBuf,
    files_written: usize,
    bytes_written: u64,
}

impl BufferedCopySink {
    pub fn new(output_dir: &Path) -> Result<Self> {
        ensure_output_dir(output_dir)?;

        Ok(Self {
            output_dir: output_dir.to_path_buf(),
            files_written: 0,
            bytes_written: 0,
        })
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    pub fn files_written(&self) -> usize {
        self.files_written
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn random_file_name() -> String {
        let mut id = [0u8; RANDOM_NAME_BYTES];
        rand::thread_rng().fill_bytes(&mut id);
        format!("{}.{JPEG_EXTENSION}", hex::encode(id))
    }

    /// Writes `data` under `name` inside the output directory.
    pub fn write_named(&mut self, name: &str, data: &[u8]) -> Result<PathBuf> {
        let path = self.output_dir.join(name);
        write_new_file(&path, |file| Ok(file.write_all(data)?))?;

        self.files_written += 1;
        self.bytes_written += data.len() as u64;
        Ok(path)
    }
}

impl ExtractionSink for BufferedCopySink {
    fn strategy(&self) -> Strategy {
        Strategy::BufferedCopy
    }

    fn extract(&mut self, extraction: Extraction) -> Result<PathBuf> {
        match extraction {
            Extraction::Buffered { data, .. } => {
                self.write_named(&Self::random_file_name(), &data)
            }
            Extraction::Range { start, .. } => Err(CoreError::InvalidFormat(format!(
                "image at offset {start} has no retained bytes"
            ))),
        }
    }
}
