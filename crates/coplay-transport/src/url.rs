use coplay_core::{ClientId, InstanceId, SessionDescriptor};

fn is_unreserved(byte: u8) -> bool {
    byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~')
}

/// Percent-encodes one URL component (RFC 3986 unreserved set kept as-is).
pub fn encode_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for byte in raw.bytes() {
        if is_unreserved(byte) {
            out.push(byte as char);
        } else {
            out.push_str(&format!("%{byte:02X}"));
        }
    }
    out
}

/// Builds `<base>/<session>?client=<id>&instance=<instance>&secret=<secret>`.
pub fn session_url(
    base_url: &str,
    descriptor: &SessionDescriptor,
    client: &ClientId,
    instance: &InstanceId,
) -> String {
    format!(
        "{}/{}?client={}&instance={}&secret={}",
        base_url.trim_end_matches('/'),
        encode_component(&descriptor.session_id),
        encode_component(client.as_str()),
        encode_component(instance.as_str()),
        encode_component(&descriptor.secret),
    )
}

#[cfg(test)]
mod tests {
    use super::{encode_component, session_url};
    use coplay_core::{ClientId, InstanceId, SessionDescriptor};

    #[test]
    fn session_url_matches_wire_layout() {
        let descriptor = SessionDescriptor::new("room-7", "s3cret").expect("valid descriptor");
        let url = session_url(
            "wss://relay.example/ws/",
            &descriptor,
            &ClientId::new("tablet").expect("valid client"),
            &InstanceId::new("ab12").expect("valid instance"),
        );
        assert_eq!(
            url,
            "wss://relay.example/ws/room-7?client=tablet&instance=ab12&secret=s3cret"
        );
    }

    #[test]
    fn reserved_characters_are_escaped() {
        assert_eq!(encode_component("a b&c=d/é"), "a%20b%26c%3Dd%2F%C3%A9");
        assert_eq!(encode_component("safe-._~"), "safe-._~");
    }
}
