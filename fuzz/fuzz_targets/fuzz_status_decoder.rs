//! Fuzz target: serial status `FrameDecoder::feed`
//!
//! Drives arbitrary byte sequences into the streaming status decoder and
//! asserts that it never panics, only yields frames that survive an
//! encode/parse cycle, and behaves the same after a reset.
//!
//! cargo fuzz run fuzz_status_decoder

#![no_main]

use libfuzzer_sys::fuzz_target;
use roastcore::adapters::serial::codec::{self, FrameDecoder, MAX_FAN_LEVEL};

fuzz_target!(|data: &[u8]| {
    let mut decoder = FrameDecoder::status();
    let mut first = Vec::new();
    decoder.feed(data, |f| first.push(f));

    for frame in &first {
        assert!(frame.actuators.heat_pct <= 100, "heat out of range");
        assert!(frame.actuators.fan_level <= MAX_FAN_LEVEL, "fan level out of range");
        let raw = codec::encode_status(frame);
        assert_eq!(codec::parse_frame(&raw, codec::KIND_STATUS), Some(*frame));
    }

    // A fresh start over the same bytes must find the same frames.
    decoder.reset();
    let mut second = Vec::new();
    decoder.feed(data, |f| second.push(f));
    assert_eq!(first, second);
});
