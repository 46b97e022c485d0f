use std::panic;

use coplay_codec::event::{EventBody, RemotePlayEvent};
use coplay_codec::frame::{decode_frame, encode_event};
use coplay_core::{ClientId, InstanceId};

fn xorshift64(state: &mut u64) -> u64 {
    *state ^= *state << 13;
    *state ^= *state >> 7;
    *state ^= *state << 17;
    *state
}

fn random_text(seed: u64, len: usize) -> String {
    const ALPHABET: &[u8] = br#"{}[]":,0123456789abcdefnulltrueACTIONSTATUS \"#;
    let mut s = seed.max(1);
    (0..len)
        .map(|_| ALPHABET[(xorshift64(&mut s) % ALPHABET.len() as u64) as usize] as char)
        .collect()
}

fn sample_frame() -> String {
    encode_event(&RemotePlayEvent {
        id: Some(41),
        client: ClientId::new("c1").expect("valid client"),
        instance: InstanceId::new("i1").expect("valid instance"),
        event: EventBody::action("adjust", r#"{"delta":3}"#),
    })
}

#[test]
fn random_frames_never_panic() {
    for seed in 1..2_000_u64 {
        let text = random_text(seed, (seed % 96) as usize);
        let result = panic::catch_unwind(|| decode_frame(&text));
        assert!(result.is_ok(), "decode panicked for seed {seed}");
    }
}

#[test]
fn truncated_frames_never_panic() {
    let frame = sample_frame();
    for cut in 0..frame.len() {
        let prefix = &frame[..cut];
        let result = panic::catch_unwind(|| decode_frame(prefix));
        assert!(result.is_ok(), "decode panicked at cut {cut}");
        assert!(
            result.expect("no panic").is_err(),
            "truncated frame at {cut} should not decode"
        );
    }
}
