//! Ports between the carving engine and the outside world.
//!
//! The engine never touches the filesystem directly: bytes come in through a
//! [`BlockSource`], finished images leave through an [`ExtractionSink`], and
//! progress is pushed to a [`ProgressObserver`].

use crate::error::Result;
use crate::types::{Extraction, ScanProgress};
use std::path::PathBuf;

/// A source of raw bytes, typically a disk, partition or image file.
///
/// # Example
///
/// ```ignore
/// struct DiskDevice { /* ... */ }
///
/// impl BlockSource for DiskDevice {
///     fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
///         // Read from physical disk at offset
///     }
///
///     fn size(&self) -> u64 {
///         // Return total size in bytes
///     }
/// }
/// ```
pub trait BlockSource {
    /// Reads up to `buffer.len()` bytes starting at `offset`.
    ///
    /// Returns the number of bytes read, which is smaller than the buffer
    /// only at the end of the source. Zero means end of source.
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize>;

    /// Returns the total size of the source in bytes.
    fn size(&self) -> u64;
}

/// In-memory source, used for carving buffers that are already loaded.
impl BlockSource for &[u8] {
    fn read_chunk(&mut self, offset: u64, buffer: &mut [u8]) -> Result<usize> {
        let Ok(start) = usize::try_from(offset) else {
            return Ok(0);
        };
        if start >= self.len() {
            return Ok(0);
        }
        let n = buffer.len().min(self.len() - start);
        buffer[..n].copy_from_slice(&self[start..start + n]);
        Ok(n)
    }

    fn size(&self) -> u64 {
        self.len() as u64
    }
}

/// How a sink obtains the bytes of an extracted image.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Re-read `[start, end)` from the source after the EOI is seen.
    OffsetReplay,
    /// Keep the candidate in memory while scanning and write it verbatim.
    BufferedCopy,
}

/// Destination for completed images.
pub trait ExtractionSink {
    /// Which kind of [`Extraction`] this sink expects.
    fn strategy(&self) -> Strategy;

    /// Persists one image and returns the path it was written to.
    ///
    /// The sink owns `extraction` from here on. Writing must be complete
    /// when this returns.
    fn extract(&mut self, extraction: Extraction) -> Result<PathBuf>;
}

/// Best-effort observer of scan progress. Must not fail or block.
pub trait ProgressObserver {
    fn on_progress(&mut self, progress: &ScanProgress);
}

/// Observer that discards every update.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoProgress;

impl ProgressObserver for NoProgress {
    fn on_progress(&mut self, _progress: &ScanProgress) {}
}

impl<F: FnMut(&ScanProgress)> ProgressObserver for F {
    fn on_progress(&mut self, progress: &ScanProgress) {
        self(progress)
    }
}
