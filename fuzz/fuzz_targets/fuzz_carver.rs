#![no_main]

use jcarve_core::{CarveEvent, Carver, CarverConfig, DuplicateSoiPolicy, Extraction};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Some((&flags, bytes)) = data.split_first() else {
        return;
    };

    let mut config = if flags & 1 == 1 {
        CarverConfig::buffered()
    } else {
        CarverConfig::default()
    };
    if flags & 2 == 2 {
        config = config.with_duplicate_soi(DuplicateSoiPolicy::StrictReset);
    }

    let mut carver = Carver::new(config);
    for (i, &byte) in bytes.iter().enumerate() {
        if let Some(CarveEvent::Completed(extraction)) = carver.feed(byte, i as u64) {
            assert!(extraction.end() > extraction.start());
            assert!(extraction.end() <= bytes.len() as u64);
            assert_eq!(&bytes[i - 1..=i], &[0xFF, 0xD9]);
            if let Extraction::Buffered { start, end, data } = extraction {
                assert_eq!(&bytes[start as usize..end as usize], data.as_slice());
            }
        }
    }
    carver.finish();
});
