//! JPEG marker classification.
//!
//! Every byte the carver sees is mapped to a [`Category`]. The mapping only
//! depends on the byte value; what a category means depends on the carver's
//! current phase.

pub const PREFIX: u8 = 0xFF;
pub const STUFFED_ZERO: u8 = 0x00;
pub const SOI: u8 = 0xD8;
pub const EOI: u8 = 0xD9;
pub const SOS: u8 = 0xDA;
pub const DQT: u8 = 0xDB;
pub const DHT: u8 = 0xC4;
pub const SOF0: u8 = 0xC0;
pub const SOF2: u8 = 0xC2;
pub const DRI: u8 = 0xDD;
pub const COM: u8 = 0xFE;
pub const APP0: u8 = 0xE0;
pub const APP9: u8 = 0xE9;
pub const RST0: u8 = 0xD0;
pub const RST7: u8 = 0xD7;

/// Marker pair that opens a JPEG codestream.
pub const SOI_MARKER: [u8; 2] = [PREFIX, SOI];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Category {
    MarkerPrefix,
    StartOfImage,
    StartOfScan,
    EndOfImage,
    StuffedZero,
    RestartMarker,
    /// Marker followed by a length-prefixed segment the carver skips.
    SegmentHeader,
    Other,
}

#[inline]
pub const fn is_restart_marker(byte: u8) -> bool {
    byte >= RST0 && byte <= RST7
}

#[inline]
pub const fn is_segment_marker(byte: u8) -> bool {
    matches!(byte, SOF0 | SOF2 | DHT | DQT | APP0..=APP9 | COM | DRI)
}

#[inline]
pub const fn classify(byte: u8) -> Category {
    match byte {
        PREFIX => Category::MarkerPrefix,
        SOI => Category::StartOfImage,
        SOS => Category::StartOfScan,
        EOI => Category::EndOfImage,
        STUFFED_ZERO => Category::StuffedZero,
        b if is_restart_marker(b) => Category::RestartMarker,
        b if is_segment_marker(b) => Category::SegmentHeader,
        _ => Category::Other,
    }
}
