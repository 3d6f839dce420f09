//! Sequential scan driver.
//!
//! Reads a [`BlockSource`] in fixed-size chunks, pushes every byte through a
//! [`Carver`] in stream order and hands completed images to an
//! [`ExtractionSink`]. Chunking is an I/O detail only: any chunk size gives
//! the same extractions.

use crate::carver::{CarveEvent, Carver, CarverConfig, DuplicateSoiPolicy};
use crate::error::{CoreError, Result};
use crate::traits::{BlockSource, ExtractionSink, ProgressObserver, Strategy};
use crate::types::{Anomaly, ScanProgress, ScanSummary};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn, Level};

pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;
pub const DEFAULT_PROGRESS_INTERVAL: u64 = 10 * 1024;

/// How segment bodies are passed over.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SkipMode {
    /// Count the body down through the bytes already read.
    #[default]
    Count,
    /// Move the read cursor past the body; bodies that extend beyond the
    /// current chunk are never read. Offset-replay only.
    Seek,
}

#[derive(Debug, Clone, Copy)]
pub struct ScanOptions {
    pub chunk_size: usize,
    /// Minimum number of bytes between two periodic progress updates.
    pub progress_interval: u64,
    pub skip_mode: SkipMode,
    pub duplicate_soi: DuplicateSoiPolicy,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            progress_interval: DEFAULT_PROGRESS_INTERVAL,
            skip_mode: SkipMode::Count,
            duplicate_soi: DuplicateSoiPolicy::RestartOffset,
        }
    }
}

impl ScanOptions {
    pub fn with_chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    pub fn with_progress_interval(mut self, bytes: u64) -> Self {
        self.progress_interval = bytes;
        self
    }

    pub fn with_skip_mode(mut self, mode: SkipMode) -> Self {
        self.skip_mode = mode;
        self
    }

    pub fn with_duplicate_soi(mut self, policy: DuplicateSoiPolicy) -> Self {
        self.duplicate_soi = policy;
        self
    }
}

pub struct Scanner {
    options: ScanOptions,
    running: Option<Arc<AtomicBool>>,
}

impl Scanner {
    pub fn new(options: ScanOptions) -> Self {
        Self {
            options,
            running: None,
        }
    }

    /// Stops the scan between two chunks once `running` is cleared.
    pub fn with_running_flag(mut self, running: Arc<AtomicBool>) -> Self {
        self.running = Some(running);
        self
    }

    #[inline]
    fn is_running(&self) -> bool {
        self.running
            .as_ref()
            .is_none_or(|flag| flag.load(Ordering::SeqCst))
    }

    pub fn run<S, K, P>(
        &self,
        source: &mut S,
        sink: &mut K,
        observer: &mut P,
    ) -> Result<ScanSummary>
    where
        S: BlockSource + ?Sized,
        K: ExtractionSink + ?Sized,
        P: ProgressObserver + ?Sized,
    {
        let retain_bytes = sink.strategy() == Strategy::BufferedCopy;
        if retain_bytes && self.options.skip_mode == SkipMode::Seek {
            return Err(CoreError::UnsupportedSkip);
        }

        let mut carver = Carver::new(CarverConfig {
            retain_bytes,
            duplicate_soi: self.options.duplicate_soi,
        });

        let total = source.size();
        let started = Instant::now();
        let mut summary = ScanSummary::new(total);
        let mut buffer = vec![0u8; self.options.chunk_size.max(1)];
        let mut offset = 0u64;
        let mut last_report = 0u64;

        info!(
            total_bytes = total,
            chunk_size = buffer.len(),
            strategy = ?sink.strategy(),
            skip_mode = ?self.options.skip_mode,
            "starting scan"
        );
        report(observer, &summary, started);

        loop {
            if !self.is_running() {
                summary.cancelled = true;
                info!(offset, "scan cancelled");
                break;
            }

            let n = source
                .read_chunk(offset, &mut buffer)
                .map_err(|e| CoreError::Read {
                    offset,
                    source: Box::new(e),
                })?;
            if n == 0 {
                break;
            }

            let chunk = &buffer[..n];
            let mut next_offset = offset + n as u64;
            let mut extracted = false;
            let mut i = 0usize;

            while i < n {
                let pending = carver.skip_remaining();
                if pending > 0 {
                    match self.options.skip_mode {
                        SkipMode::Count => {
                            i += carver.skip(&chunk[i..]);
                        }
                        SkipMode::Seek => {
                            let in_chunk = (n - i) as u64;
                            carver.skip_len(pending)?;
                            if pending <= in_chunk {
                                i += pending as usize;
                            } else {
                                next_offset = offset + i as u64 + pending;
                                break;
                            }
                        }
                    }
                    continue;
                }

                let position = offset + i as u64;
                if let Some(event) = carver.feed(chunk[i], position) {
                    extracted |= handle_event(event, sink, &mut summary)?;
                }
                i += 1;
            }

            offset = next_offset;
            summary.bytes_scanned = if total > 0 { offset.min(total) } else { offset };

            if extracted || offset - last_report >= self.options.progress_interval {
                last_report = offset;
                report(observer, &summary, started);
            }
        }

        if carver.finish() {
            summary.truncated_candidate = true;
            debug!("source ended inside a candidate image, dropped");
        }

        summary.duration = started.elapsed();
        report(observer, &summary, started);

        info!(
            files = summary.files_extracted(),
            bytes_scanned = summary.bytes_scanned,
            anomalies = summary.anomalies.total(),
            cancelled = summary.cancelled,
            "scan finished"
        );

        Ok(summary)
    }
}

/// Returns whether an image was written.
fn handle_event<K>(event: CarveEvent, sink: &mut K, summary: &mut ScanSummary) -> Result<bool>
where
    K: ExtractionSink + ?Sized,
{
    match event {
        CarveEvent::Completed(extraction) => {
            let start = extraction.start();
            let len = extraction.len();
            let path = sink.extract(extraction).map_err(|e| CoreError::Extract {
                offset: start,
                source: Box::new(e),
            })?;

            info!(offset = start, bytes = len, path = %path.display(), "extracted JPEG");
            summary.bytes_extracted += len;
            summary.extracted.push(path);
            Ok(true)
        }
        CarveEvent::Anomaly(anomaly) => {
            if anomaly_level(&anomaly) == Level::WARN {
                warn!(%anomaly, "candidate abandoned");
            } else {
                debug!(%anomaly, "candidate abandoned");
            }
            summary.anomalies.record(&anomaly);
            Ok(false)
        }
    }
}

/// Only an impossible range is reported above debug.
fn anomaly_level(anomaly: &Anomaly) -> Level {
    match anomaly {
        Anomaly::NonPositiveLength { .. } => Level::WARN,
        _ => Level::DEBUG,
    }
}

fn report<P>(observer: &mut P, summary: &ScanSummary, started: Instant)
where
    P: ProgressObserver + ?Sized,
{
    observer.on_progress(&ScanProgress {
        total_bytes: summary.total_bytes,
        scanned_bytes: summary.bytes_scanned,
        files_extracted: summary.files_extracted(),
        elapsed: started.elapsed(),
    });
}
