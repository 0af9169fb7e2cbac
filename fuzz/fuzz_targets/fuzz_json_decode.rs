#![no_main]

use libfuzzer_sys::fuzz_target;
use omnisci_fixture::protocol::json;

fuzz_target!(|data: &[u8]| {
    // Exercise the encoder on whatever the decoder accepts
    if let Ok(msg) = json::decode_message(data) {
        let _ = json::encode_message(&msg);
    }
});
