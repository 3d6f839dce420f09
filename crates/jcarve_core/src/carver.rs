//! Byte-at-a-time JPEG carving state machine.
//!
//! [`Carver`] consumes a stream in order, one byte per [`Carver::feed`] call,
//! and reports a [`CarveEvent`] whenever a candidate image is completed or
//! abandoned. How the bytes are batched for I/O never changes the outcome.
//!
//! The machine only follows the marker structure:
//!
//! ```text
//! FF D8 ( FF <segment> LL LL <body> )* FF DA <scan data> FF D9
//! ```
//!
//! Inside scan data `FF 00` (stuffed zero) and `FF D0`..`FF D7` (restart
//! markers) are benign. Segment markers between progressive scans are skipped
//! like header segments.

use crate::error::{CoreError, Result};
use crate::marker::{classify, Category, PREFIX, SOI_MARKER};
use crate::types::{Anomaly, Extraction};

/// What to do with an SOI found while already inside scan data.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DuplicateSoiPolicy {
    /// Move the candidate start to the new SOI but keep treating the
    /// following bytes as scan data.
    #[default]
    RestartOffset,
    /// Move the candidate start to the new SOI and expect header segments
    /// again, as after any other SOI.
    StrictReset,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CarverConfig {
    /// Keep the candidate's bytes in memory and hand them out with
    /// [`Extraction::Buffered`].
    pub retain_bytes: bool,
    pub duplicate_soi: DuplicateSoiPolicy,
}

impl CarverConfig {
    pub fn buffered() -> Self {
        Self {
            retain_bytes: true,
            ..Default::default()
        }
    }

    pub fn with_duplicate_soi(mut self, policy: DuplicateSoiPolicy) -> Self {
        self.duplicate_soi = policy;
        self
    }
}

/// Part of a candidate image a marker or segment was found in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Section {
    /// After SOI, before the first SOS.
    Image,
    /// Entropy-coded scan data.
    Scan,
}

impl Section {
    #[inline]
    fn phase(self) -> Phase {
        match self {
            Self::Image => Phase::InImage,
            Self::Scan => Phase::InScan,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    /// A 0xFF was just consumed. `within` is `None` while no SOI is known.
    MarkerPending { within: Option<Section> },
    InImage,
    InScan,
    /// Collecting the two length bytes that follow a segment marker.
    SegmentHeader { resume: Section, high: Option<u8> },
    SkippingSegment { resume: Section, remaining: u64 },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CarveEvent {
    Completed(Extraction),
    Anomaly(Anomaly),
}

#[derive(Debug)]
pub struct Carver {
    config: CarverConfig,
    phase: Phase,
    start_offset: Option<u64>,
    buffer: Vec<u8>,
}

impl Default for Carver {
    fn default() -> Self {
        Self::new(CarverConfig::default())
    }
}

impl Carver {
    pub fn new(config: CarverConfig) -> Self {
        Self {
            config,
            phase: Phase::Idle,
            start_offset: None,
            buffer: Vec::new(),
        }
    }

    #[inline]
    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// Offset of the leading 0xFF of the current candidate's SOI.
    #[inline]
    pub fn start_offset(&self) -> Option<u64> {
        self.start_offset
    }

    #[inline]
    pub fn has_candidate(&self) -> bool {
        self.start_offset.is_some()
    }

    #[inline]
    pub fn buffered_len(&self) -> usize {
        self.buffer.len()
    }

    /// Advances the machine by one byte found at absolute `position`.
    pub fn feed(&mut self, byte: u8, position: u64) -> Option<CarveEvent> {
        if self.config.retain_bytes && self.start_offset.is_some() {
            self.buffer.push(byte);
        }

        match self.phase {
            Phase::SkippingSegment { resume, remaining } => {
                self.phase = Self::after_skip(resume, remaining.saturating_sub(1));
                None
            }
            Phase::SegmentHeader { resume, high: None } => {
                self.phase = Phase::SegmentHeader {
                    resume,
                    high: Some(byte),
                };
                None
            }
            Phase::SegmentHeader {
                resume,
                high: Some(high),
            } => self.on_segment_length(resume, high, byte, position),
            Phase::MarkerPending { within } => self.on_marker(byte, position, within),
            Phase::Idle => {
                if byte == PREFIX {
                    self.phase = Phase::MarkerPending { within: None };
                }
                None
            }
            Phase::InImage => {
                if byte == PREFIX {
                    self.phase = Phase::MarkerPending {
                        within: Some(Section::Image),
                    };
                    None
                } else {
                    Some(self.abandon(Anomaly::UnexpectedByte {
                        offset: position,
                        byte,
                    }))
                }
            }
            Phase::InScan => {
                if byte == PREFIX {
                    self.phase = Phase::MarkerPending {
                        within: Some(Section::Scan),
                    };
                }
                None
            }
        }
    }

    /// Segment body bytes still to be skipped, zero outside a segment.
    #[inline]
    pub fn skip_remaining(&self) -> u64 {
        match self.phase {
            Phase::SkippingSegment { remaining, .. } => remaining,
            _ => 0,
        }
    }

    /// Consumes as much of `bytes` as belongs to the segment body being
    /// skipped and returns how many bytes were used. Equivalent to feeding
    /// them one at a time.
    pub fn skip(&mut self, bytes: &[u8]) -> usize {
        let take = usize::try_from(self.skip_remaining())
            .unwrap_or(usize::MAX)
            .min(bytes.len());
        if take == 0 {
            return 0;
        }

        if self.config.retain_bytes && self.start_offset.is_some() {
            self.buffer.extend_from_slice(&bytes[..take]);
        }
        self.advance_skip(take as u64);
        take
    }

    /// Skips `len` segment body bytes without seeing them, for sources that
    /// can seek past the segment. Not available when bytes are retained.
    pub fn skip_len(&mut self, len: u64) -> Result<u64> {
        if self.config.retain_bytes {
            return Err(CoreError::UnsupportedSkip);
        }
        let take = self.skip_remaining().min(len);
        self.advance_skip(take);
        Ok(take)
    }

    /// Ends the stream. A candidate still open is dropped without error;
    /// returns whether there was one.
    pub fn finish(&mut self) -> bool {
        let truncated = self.start_offset.is_some();
        self.reset();
        truncated
    }

    pub fn reset(&mut self) {
        self.phase = Phase::Idle;
        self.start_offset = None;
        self.buffer.clear();
    }

    fn advance_skip(&mut self, len: u64) {
        if let Phase::SkippingSegment { resume, remaining } = self.phase {
            self.phase = Self::after_skip(resume, remaining.saturating_sub(len));
        }
    }

    #[inline]
    fn after_skip(resume: Section, remaining: u64) -> Phase {
        if remaining == 0 {
            resume.phase()
        } else {
            Phase::SkippingSegment { resume, remaining }
        }
    }

    fn on_segment_length(
        &mut self,
        resume: Section,
        high: u8,
        low: u8,
        position: u64,
    ) -> Option<CarveEvent> {
        let length = u16::from_be_bytes([high, low]);

        // The length counts its own two bytes.
        let Some(body) = length.checked_sub(2) else {
            return Some(self.abandon(Anomaly::MalformedSegmentLength {
                offset: position.saturating_sub(1),
                length,
            }));
        };

        self.phase = Self::after_skip(resume, u64::from(body));
        None
    }

    fn on_marker(
        &mut self,
        byte: u8,
        position: u64,
        within: Option<Section>,
    ) -> Option<CarveEvent> {
        let marker_offset = position.saturating_sub(1);

        match (within, classify(byte)) {
            (None, Category::StartOfImage) => {
                self.begin_candidate(marker_offset);
                self.phase = Phase::InImage;
                None
            }
            (None, _) => {
                self.phase = Phase::Idle;
                None
            }

            (Some(Section::Image), Category::SegmentHeader) => {
                self.phase = Phase::SegmentHeader {
                    resume: Section::Image,
                    high: None,
                };
                None
            }
            (Some(Section::Image), Category::StartOfScan) => {
                self.phase = Phase::InScan;
                None
            }
            (Some(Section::Image), Category::StartOfImage) => {
                self.begin_candidate(marker_offset);
                self.phase = Phase::InImage;
                None
            }

            (Some(Section::Scan), Category::EndOfImage) => Some(self.complete(position)),
            (
                Some(Section::Scan),
                Category::StuffedZero | Category::RestartMarker | Category::StartOfScan,
            ) => {
                self.phase = Phase::InScan;
                None
            }
            (Some(Section::Scan), Category::SegmentHeader) => {
                self.phase = Phase::SegmentHeader {
                    resume: Section::Scan,
                    high: None,
                };
                None
            }
            (Some(Section::Scan), Category::StartOfImage) => {
                self.begin_candidate(marker_offset);
                self.phase = match self.config.duplicate_soi {
                    DuplicateSoiPolicy::RestartOffset => Phase::InScan,
                    DuplicateSoiPolicy::StrictReset => Phase::InImage,
                };
                None
            }

            (Some(_), _) => Some(self.abandon(Anomaly::UnexpectedMarker {
                offset: marker_offset,
                marker: byte,
            })),
        }
    }

    /// Starts (or restarts) the candidate at the SOI whose 0xFF sits at
    /// `offset`. Bytes retained for an earlier SOI are dropped.
    fn begin_candidate(&mut self, offset: u64) {
        self.start_offset = Some(offset);
        if self.config.retain_bytes {
            self.buffer.clear();
            self.buffer.extend_from_slice(&SOI_MARKER);
        }
    }

    fn complete(&mut self, eoi_position: u64) -> CarveEvent {
        let Some(start) = self.start_offset else {
            self.reset();
            return CarveEvent::Anomaly(Anomaly::NonPositiveLength {
                start: eoi_position,
                end: eoi_position,
            });
        };
        let end = eoi_position.saturating_add(1);

        if end <= start {
            return self.abandon(Anomaly::NonPositiveLength { start, end });
        }

        let extraction = if self.config.retain_bytes {
            Extraction::Buffered {
                start,
                end,
                data: std::mem::take(&mut self.buffer),
            }
        } else {
            Extraction::Range { start, end }
        };

        self.reset();
        CarveEvent::Completed(extraction)
    }

    fn abandon(&mut self, anomaly: Anomaly) -> CarveEvent {
        self.reset();
        CarveEvent::Anomaly(anomaly)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn run(carver: &mut Carver, bytes: &[u8]) -> Vec<CarveEvent> {
        bytes
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| carver.feed(b, i as u64))
            .collect()
    }

    fn completed(events: &[CarveEvent]) -> Vec<Extraction> {
        events
            .iter()
            .filter_map(|e| match e {
                CarveEvent::Completed(x) => Some(x.clone()),
                CarveEvent::Anomaly(_) => None,
            })
            .collect()
    }

    const TINY: [u8; 12] = [
        0xFF, 0xD8, 0xFF, 0xDA, 0x12, 0xFF, 0x00, 0x34, 0xFF, 0xD0, 0xFF, 0xD9,
    ];

    #[test]
    fn test_idle_ignores_plain_bytes() {
        let mut carver = Carver::default();
        assert!(run(&mut carver, &[0x00, 0x12, 0xD8, 0xD9, 0xDA]).is_empty());
        assert_eq!(carver.phase(), Phase::Idle);
        assert!(!carver.has_candidate());
    }

    #[test]
    fn test_soi_starts_candidate_at_prefix() {
        let mut carver = Carver::default();
        run(&mut carver, &[0x11, 0x22, 0xFF, 0xD8]);
        assert_eq!(carver.phase(), Phase::InImage);
        assert_eq!(carver.start_offset(), Some(2));
    }

    #[test]
    fn test_false_marker_returns_to_idle() {
        let mut carver = Carver::default();
        let events = run(&mut carver, &[0xFF, 0xC0]);
        assert!(events.is_empty());
        assert_eq!(carver.phase(), Phase::Idle);
    }

    #[test]
    fn test_prefix_pair_swallows_following_soi() {
        // The second 0xFF is the byte after the marker, so D8 arrives idle.
        let mut carver = Carver::default();
        let events = run(
            &mut carver,
            &[0x00, 0xFF, 0xFF, 0xD8, 0xFF, 0xDA, 0x01, 0xFF, 0xD9],
        );
        assert!(events.is_empty());
        assert!(!carver.has_candidate());
        assert_eq!(carver.phase(), Phase::Idle);
    }

    #[test]
    fn test_odd_prefix_run_still_finds_soi() {
        let mut carver = Carver::default();
        run(&mut carver, &[0xFF, 0xFF, 0xFF, 0xD8]);
        assert_eq!(carver.start_offset(), Some(2));
    }

    #[test]
    fn test_minimal_image_completes() {
        let mut carver = Carver::default();
        let events = run(&mut carver, &TINY);
        assert_eq!(
            events,
            vec![CarveEvent::Completed(Extraction::Range { start: 0, end: 12 })]
        );
        assert_eq!(carver.phase(), Phase::Idle);
    }

    #[test]
    fn test_segment_is_skipped() {
        // APP0 with a 6 byte length: 2 length bytes and 4 body bytes, the
        // body containing bytes that would otherwise be markers.
        let bytes = [
            0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x06, 0xFF, 0xD9, 0xFF, 0x00, 0xFF, 0xDA, 0x01, 0xFF,
            0xD9,
        ];
        let mut carver = Carver::default();
        let events = run(&mut carver, &bytes);
        assert_eq!(
            completed(&events),
            vec![Extraction::Range { start: 0, end: 15 }]
        );
    }

    #[test]
    fn test_segment_header_phases() {
        let mut carver = Carver::default();
        run(&mut carver, &[0xFF, 0xD8, 0xFF, 0xDB]);
        assert_eq!(
            carver.phase(),
            Phase::SegmentHeader {
                resume: Section::Image,
                high: None
            }
        );
        carver.feed(0x00, 4);
        assert_eq!(
            carver.phase(),
            Phase::SegmentHeader {
                resume: Section::Image,
                high: Some(0x00)
            }
        );
        carver.feed(0x05, 5);
        assert_eq!(
            carver.phase(),
            Phase::SkippingSegment {
                resume: Section::Image,
                remaining: 3
            }
        );
        assert_eq!(carver.skip_remaining(), 3);
        carver.feed(0xAA, 6);
        carver.feed(0xBB, 7);
        carver.feed(0xCC, 8);
        assert_eq!(carver.phase(), Phase::InImage);
    }

    #[test]
    fn test_empty_segment_body_resumes_immediately() {
        let mut carver = Carver::default();
        run(&mut carver, &[0xFF, 0xD8, 0xFF, 0xFE, 0x00, 0x02]);
        assert_eq!(carver.phase(), Phase::InImage);
    }

    #[test]
    fn test_malformed_segment_length_resets() {
        for length in [[0x00, 0x00], [0x00, 0x01]] {
            let mut carver = Carver::default();
            let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xC4];
            bytes.extend_from_slice(&length);
            let events = run(&mut carver, &bytes);
            assert_eq!(
                events,
                vec![CarveEvent::Anomaly(Anomaly::MalformedSegmentLength {
                    offset: 4,
                    length: u16::from(length[1]),
                })]
            );
            assert_eq!(carver.phase(), Phase::Idle);
            assert!(!carver.has_candidate());
        }
    }

    #[test]
    fn test_plain_byte_between_segments_is_anomaly() {
        let mut carver = Carver::default();
        let events = run(&mut carver, &[0xFF, 0xD8, 0x42]);
        assert_eq!(
            events,
            vec![CarveEvent::Anomaly(Anomaly::UnexpectedByte {
                offset: 2,
                byte: 0x42
            })]
        );
        assert_eq!(carver.phase(), Phase::Idle);
    }

    #[test]
    fn test_unexpected_marker_in_header_resets() {
        let mut carver = Carver::default();
        let events = run(&mut carver, &[0xFF, 0xD8, 0xFF, 0x01]);
        assert_eq!(
            events,
            vec![CarveEvent::Anomaly(Anomaly::UnexpectedMarker {
                offset: 2,
                marker: 0x01
            })]
        );
        assert!(!carver.has_candidate());
    }

    #[test]
    fn test_unexpected_marker_in_scan_resets() {
        let mut carver = Carver::default();
        let events = run(&mut carver, &[0xFF, 0xD8, 0xFF, 0xDA, 0x10, 0xFF, 0x7F]);
        assert_eq!(
            events,
            vec![CarveEvent::Anomaly(Anomaly::UnexpectedMarker {
                offset: 5,
                marker: 0x7F
            })]
        );
        assert_eq!(carver.phase(), Phase::Idle);
    }

    #[test]
    fn test_eoi_before_scan_is_anomaly() {
        let mut carver = Carver::default();
        let events = run(&mut carver, &[0xFF, 0xD8, 0xFF, 0xD9]);
        assert!(matches!(
            events.as_slice(),
            [CarveEvent::Anomaly(Anomaly::UnexpectedMarker { marker: 0xD9, .. })]
        ));
    }

    #[test]
    fn test_scan_escapes_stay_in_scan() {
        let mut carver = Carver::default();
        run(&mut carver, &[0xFF, 0xD8, 0xFF, 0xDA]);
        for (i, pair) in [[0xFF, 0x00], [0xFF, 0xD3], [0xFF, 0xD7], [0xFF, 0xDA]]
            .iter()
            .enumerate()
        {
            let base = 4 + (i as u64) * 2;
            assert_eq!(carver.feed(pair[0], base), None);
            assert_eq!(carver.feed(pair[1], base + 1), None);
            assert_eq!(carver.phase(), Phase::InScan);
        }
    }

    #[test]
    fn test_table_segment_between_scans() {
        let bytes = [
            0xFF, 0xD8, 0xFF, 0xDA, 0x55, 0xFF, 0xC4, 0x00, 0x04, 0xFF, 0xD9, 0x66, 0xFF, 0xD9,
        ];
        let mut carver = Carver::default();
        let events = run(&mut carver, &bytes);
        assert_eq!(
            completed(&events),
            vec![Extraction::Range { start: 0, end: 14 }]
        );
    }

    #[test]
    fn test_duplicate_soi_in_header_moves_start() {
        let mut carver = Carver::default();
        let mut bytes = vec![0xFF, 0xD8];
        bytes.extend_from_slice(&TINY);
        let events = run(&mut carver, &bytes);
        assert_eq!(
            completed(&events),
            vec![Extraction::Range { start: 2, end: 14 }]
        );
    }

    #[test]
    fn test_duplicate_soi_in_scan_restart_offset() {
        let bytes = [
            0xFF, 0xD8, 0xFF, 0xDA, 0x01, 0xFF, 0xD8, 0x02, 0x03, 0xFF, 0xD9,
        ];
        let mut carver = Carver::default();
        run(&mut carver, &bytes[..7]);
        assert_eq!(carver.phase(), Phase::InScan);
        assert_eq!(carver.start_offset(), Some(5));

        let events: Vec<_> = bytes[7..]
            .iter()
            .enumerate()
            .filter_map(|(i, &b)| carver.feed(b, 7 + i as u64))
            .collect();
        assert_eq!(
            completed(&events),
            vec![Extraction::Range { start: 5, end: 11 }]
        );
    }

    #[test]
    fn test_duplicate_soi_in_scan_strict_reset() {
        let config = CarverConfig::default().with_duplicate_soi(DuplicateSoiPolicy::StrictReset);
        let mut carver = Carver::new(config);
        run(&mut carver, &[0xFF, 0xD8, 0xFF, 0xDA, 0x01, 0xFF, 0xD8]);
        assert_eq!(carver.phase(), Phase::InImage);
        assert_eq!(carver.start_offset(), Some(5));

        // Scan data right after the new SOI is now corruption.
        let event = carver.feed(0x02, 7);
        assert!(matches!(
            event,
            Some(CarveEvent::Anomaly(Anomaly::UnexpectedByte { offset: 7, .. }))
        ));
    }

    #[test]
    fn test_buffered_collects_image_bytes() {
        let mut carver = Carver::new(CarverConfig::buffered());
        let mut bytes = vec![0x00, 0xFF, 0x10];
        bytes.extend_from_slice(&TINY);
        bytes.push(0x99);

        let events = run(&mut carver, &bytes);
        assert_eq!(
            events,
            vec![CarveEvent::Completed(Extraction::Buffered {
                start: 3,
                end: 15,
                data: TINY.to_vec(),
            })]
        );
        assert_eq!(carver.buffered_len(), 0);
    }

    #[test]
    fn test_buffered_duplicate_soi_keeps_latest_marker() {
        let mut carver = Carver::new(CarverConfig::buffered());
        run(&mut carver, &[0xFF, 0xD8, 0xFF, 0xDA, 0x01, 0x02, 0xFF, 0xD8]);
        assert_eq!(carver.buffered_len(), 2);
        assert_eq!(carver.start_offset(), Some(6));
    }

    #[test]
    fn test_buffered_reset_clears() {
        let mut carver = Carver::new(CarverConfig::buffered());
        run(&mut carver, &[0xFF, 0xD8, 0xFF, 0xDA, 0x01, 0x02]);
        assert_eq!(carver.buffered_len(), 6);
        run(&mut carver, &[0xFF, 0x42]);
        assert_eq!(carver.buffered_len(), 0);
    }

    #[test]
    fn test_skip_slice_matches_byte_path() {
        let mut bytes = vec![0xFF, 0xD8, 0xFF, 0xE1, 0x00, 0x0A];
        bytes.extend_from_slice(&[0xFF, 0xD9, 0xFF, 0x00, 0x01, 0x02, 0x03, 0x04]);
        bytes.extend_from_slice(&[0xFF, 0xDA, 0x42, 0xFF, 0xD9]);

        let mut stepped = Carver::new(CarverConfig::buffered());
        let expected = run(&mut stepped, &bytes);

        let mut fast = Carver::new(CarverConfig::buffered());
        let mut events = Vec::new();
        let mut pos = 0usize;
        while pos < bytes.len() {
            let used = fast.skip(&bytes[pos..]);
            if used > 0 {
                pos += used;
                continue;
            }
            events.extend(fast.feed(bytes[pos], pos as u64));
            pos += 1;
        }

        assert_eq!(events, expected);
        assert_eq!(completed(&events).len(), 1);
    }

    #[test]
    fn test_skip_len_rejected_when_buffering() {
        let mut carver = Carver::new(CarverConfig::buffered());
        assert!(matches!(carver.skip_len(4), Err(CoreError::UnsupportedSkip)));
    }

    #[test]
    fn test_skip_len_clamps_to_segment() {
        let mut carver = Carver::default();
        run(&mut carver, &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10]);
        assert_eq!(carver.skip_remaining(), 14);
        assert_eq!(carver.skip_len(100).unwrap(), 14);
        assert_eq!(carver.phase(), Phase::InImage);
        assert_eq!(carver.skip_len(5).unwrap(), 0);
    }

    #[test]
    fn test_finish_drops_truncated_candidate() {
        let mut carver = Carver::default();
        run(&mut carver, &[0xFF, 0xD8, 0xFF, 0xDA, 0x01, 0x02]);
        assert!(carver.finish());
        assert!(!carver.has_candidate());
        assert!(!carver.finish());
    }
}
