use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    #[error("Offset {offset} is out of bounds (max: {max})")]
    OutOfBounds { offset: u64, max: u64 },

    #[error("Invalid extraction range: start {start}, end {end}")]
    InvalidRange { start: u64, end: u64 },

    #[error("File already exists: {0}")]
    FileExists(String),

    #[error("Read error at offset {offset}: {source}")]
    Read {
        offset: u64,
        #[source]
        source: Box<CoreError>,
    },

    #[error("Failed to extract image at offset {offset}: {source}")]
    Extract {
        offset: u64,
        #[source]
        source: Box<CoreError>,
    },

    #[error("Seek-based segment skipping requires offset-replay extraction")]
    UnsupportedSkip,
}

pub type Result<T> = std::result::Result<T, CoreError>;
