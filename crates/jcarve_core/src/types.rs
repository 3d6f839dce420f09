use std::fmt;
use std::path::PathBuf;
use std::time::Duration;

pub const JPEG_EXTENSION: &str = "jpg";

/// A completed candidate image handed from the carver to a sink.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Extraction {
    /// Byte range `[start, end)` of the source; the sink re-reads it.
    Range { start: u64, end: u64 },
    /// Bytes accumulated during the scan, together with where they came from.
    Buffered { start: u64, end: u64, data: Vec<u8> },
}

impl Extraction {
    #[inline]
    pub fn start(&self) -> u64 {
        match self {
            Self::Range { start, .. } | Self::Buffered { start, .. } => *start,
        }
    }

    #[inline]
    pub fn end(&self) -> u64 {
        match self {
            Self::Range { end, .. } | Self::Buffered { end, .. } => *end,
        }
    }

    #[inline]
    pub fn len(&self) -> u64 {
        self.end() - self.start()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Non-fatal carving problems. The current candidate is abandoned and the
/// scan continues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Anomaly {
    /// A marker that cannot appear at this point of the codestream.
    UnexpectedMarker { offset: u64, marker: u8 },
    /// A non-marker byte between segments, before scan data started.
    UnexpectedByte { offset: u64, byte: u8 },
    /// A segment length field smaller than the field itself.
    MalformedSegmentLength { offset: u64, length: u16 },
    /// EOI found but the candidate would be empty or inverted.
    NonPositiveLength { start: u64, end: u64 },
}

impl Anomaly {
    pub fn kind(&self) -> AnomalyKind {
        match self {
            Self::UnexpectedMarker { .. } => AnomalyKind::UnexpectedMarker,
            Self::UnexpectedByte { .. } => AnomalyKind::UnexpectedByte,
            Self::MalformedSegmentLength { .. } => AnomalyKind::MalformedSegmentLength,
            Self::NonPositiveLength { .. } => AnomalyKind::NonPositiveLength,
        }
    }
}

impl fmt::Display for Anomaly {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnexpectedMarker { offset, marker } => {
                write!(f, "unexpected marker FF{marker:02X} at offset {offset}")
            }
            Self::UnexpectedByte { offset, byte } => {
                write!(f, "unexpected byte {byte:02X} at offset {offset}")
            }
            Self::MalformedSegmentLength { offset, length } => {
                write!(f, "malformed segment length {length} at offset {offset}")
            }
            Self::NonPositiveLength { start, end } => {
                write!(
                    f,
                    "cannot extract zero or negative size: SOI={start} EOI={end}"
                )
            }
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AnomalyKind {
    UnexpectedMarker,
    UnexpectedByte,
    MalformedSegmentLength,
    NonPositiveLength,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AnomalyCounts {
    pub unexpected_marker: u64,
    pub unexpected_byte: u64,
    pub malformed_segment_length: u64,
    pub non_positive_length: u64,
}

impl AnomalyCounts {
    pub fn record(&mut self, anomaly: &Anomaly) {
        match anomaly.kind() {
            AnomalyKind::UnexpectedMarker => self.unexpected_marker += 1,
            AnomalyKind::UnexpectedByte => self.unexpected_byte += 1,
            AnomalyKind::MalformedSegmentLength => self.malformed_segment_length += 1,
            AnomalyKind::NonPositiveLength => self.non_positive_length += 1,
        }
    }

    pub fn total(&self) -> u64 {
        self.unexpected_marker
            + self.unexpected_byte
            + self.malformed_segment_length
            + self.non_positive_length
    }
}

/// Snapshot handed to progress observers.
#[derive(Debug, Clone, Copy)]
pub struct ScanProgress {
    pub total_bytes: u64,
    pub scanned_bytes: u64,
    pub files_extracted: usize,
    pub elapsed: Duration,
}

impl ScanProgress {
    /// Returns the progress percentage (0.0 - 100.0)
    pub fn percentage(&self) -> f64 {
        if self.total_bytes == 0 {
            return 100.0;
        }
        (self.scanned_bytes as f64 / self.total_bytes as f64) * 100.0
    }

    pub fn speed_bps(&self) -> u64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0;
        }
        (self.scanned_bytes as f64 / secs) as u64
    }

    pub fn estimated_remaining(&self) -> Option<Duration> {
        let speed = self.speed_bps();
        if speed == 0 {
            return None;
        }
        let remaining = self.total_bytes.saturating_sub(self.scanned_bytes);
        Some(Duration::from_secs(remaining / speed))
    }
}

/// Result of a complete scan.
#[derive(Debug, Clone, Default)]
pub struct ScanSummary {
    pub total_bytes: u64,
    pub bytes_scanned: u64,
    pub bytes_extracted: u64,
    pub extracted: Vec<PathBuf>,
    pub anomalies: AnomalyCounts,
    /// A candidate was still open when the source ended.
    pub truncated_candidate: bool,
    pub cancelled: bool,
    pub duration: Duration,
}

impl ScanSummary {
    pub fn new(total_bytes: u64) -> Self {
        Self {
            total_bytes,
            ..Default::default()
        }
    }

    #[inline]
    pub fn files_extracted(&self) -> usize {
        self.extracted.len()
    }
}
