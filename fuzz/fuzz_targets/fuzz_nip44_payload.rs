#![no_main]

use libfuzzer_sys::fuzz_target;
use strand_core::nip44::{decrypt, ConversationKey};

fuzz_target!(|data: &[u8]| {
    let key = ConversationKey::from_bytes([0x42; 32]);
    if let Ok(payload) = std::str::from_utf8(data) {
        let _ = decrypt(payload, &key);
    }
});
