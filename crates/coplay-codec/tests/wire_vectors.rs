use coplay_codec::event::{EventBody, RemotePlayEvent};
use coplay_codec::frame::{decode_event, encode_event};
use coplay_core::{ClientId, InstanceId};

const ACTION_FRAME: &str = r#"{"event":{"args":"{\"delta\":-2}","name":"adjust","type":"ACTION"},"id":17,"instance":"5f3a","client":"tablet"}"#;
const STATUS_FRAME: &str = r#"{"id":null,"client":"phone","instance":"77aa","event":{"type":"STATUS","connected":true,"numPlayers":4}}"#;

#[test]
fn action_vector_decodes() {
    let event = decode_event(ACTION_FRAME).expect("action vector must decode");
    assert_eq!(event.id, Some(17));
    assert_eq!(event.client.as_str(), "tablet");
    assert_eq!(event.instance.as_str(), "5f3a");
    assert_eq!(event.event, EventBody::action("adjust", r#"{"delta":-2}"#));
}

#[test]
fn status_vector_decodes() {
    let event = decode_event(STATUS_FRAME).expect("status vector must decode");
    assert_eq!(event.id, None);
    assert_eq!(event.client_key().as_str(), "phone|77aa");
    assert_eq!(event.event, EventBody::status(true, Some(4)));
}

#[test]
fn encoded_frames_decode_to_the_same_event() {
    let event = RemotePlayEvent {
        id: Some(2),
        client: ClientId::new("tablet").expect("valid client"),
        instance: InstanceId::new("5f3a").expect("valid instance"),
        event: EventBody::action("note", r#""dragon slain""#),
    };
    let frame = encode_event(&event);
    assert_eq!(decode_event(&frame).expect("own encoding decodes"), event);
}

#[test]
fn status_frame_with_sequence_id_is_rejected() {
    let frame = r#"{"id":9,"client":"phone","instance":"77aa","event":{"type":"STATUS","connected":false}}"#;
    assert!(decode_event(frame).is_err());
}

#[test]
fn invalid_client_id_is_rejected() {
    let frame = r#"{"id":null,"client":"","instance":"77aa","event":{"type":"STATUS","connected":false}}"#;
    assert!(decode_event(frame).is_err());
}
