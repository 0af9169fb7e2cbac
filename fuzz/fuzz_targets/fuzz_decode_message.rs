#![no_main]

use bytes::{Buf, BytesMut};
use omnisci_fixture::protocol::decode::decode_message;
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let mut buf = BytesMut::from(data);

    // Several replies may arrive in one TCP segment
    while !buf.is_empty() {
        match decode_message(&buf) {
            Ok((_, consumed)) => {
                if consumed == 0 {
                    break;
                }
                buf.advance(consumed);
            }
            Err(_) => break,
        }
    }
});
