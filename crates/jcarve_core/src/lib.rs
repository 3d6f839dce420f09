//! Carving engine for JPEG images embedded in raw byte streams.
//!
//! The engine follows the JPEG marker structure only. It never decodes pixel
//! data, so it keeps working on corrupted media and on images embedded in
//! unrelated bytes.

pub mod carver;
mod error;
pub mod marker;
pub mod scanner;
mod traits;
mod types;

pub use carver::{CarveEvent, Carver, CarverConfig, DuplicateSoiPolicy, Phase, Section};
pub use error::{CoreError, Result};
pub use marker::{classify, Category};
pub use scanner::{ScanOptions, Scanner, SkipMode};
pub use traits::{BlockSource, ExtractionSink, NoProgress, ProgressObserver, Strategy};
pub use types::{
    Anomaly, AnomalyCounts, AnomalyKind, Extraction, JPEG_EXTENSION, ScanProgress, ScanSummary,
};
