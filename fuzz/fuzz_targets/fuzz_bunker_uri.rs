#![no_main]

use libfuzzer_sys::fuzz_target;
use strand_nip46::BunkerLocator;

fuzz_target!(|data: &[u8]| {
    if let Ok(input) = std::str::from_utf8(data) {
        let _ = BunkerLocator::parse(input);
    }
});
