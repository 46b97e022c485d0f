#![no_main]

use coplay_codec::frame::{decode_event, decode_frame, encode_event};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &[u8]| {
    let Ok(text) = std::str::from_utf8(data) else {
        return;
    };
    let _ = decode_frame(text);
    if let Ok(event) = decode_event(text) {
        let reencoded = encode_event(&event);
        assert_eq!(decode_event(&reencoded).ok(), Some(event));
    }
});
