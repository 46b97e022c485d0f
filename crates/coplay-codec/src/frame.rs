use serde_json::{json, Value};

use crate::error::CodecError;
use crate::event::{EventBody, RemotePlayEvent};

/// Fixed keepalive frame sent while connected.
pub const HEARTBEAT_FRAME: &str = "PING";
/// Keepalive reply some servers send back.
pub const HEARTBEAT_REPLY_FRAME: &str = "PONG";

/// One decoded inbound text frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundFrame {
    /// Keepalive traffic; carries no event and no sequence id.
    Heartbeat,
    Event(RemotePlayEvent),
}

fn body_value(body: &EventBody) -> Value {
    match body {
        EventBody::Action(action) => json!({
            "type": "ACTION",
            "name": action.name,
            "args": action.args,
        }),
        EventBody::Status(status) => {
            let mut value = json!({
                "type": "STATUS",
                "connected": status.connected,
            });
            if let Some(num_players) = status.num_players {
                value["numPlayers"] = json!(num_players);
            }
            value
        }
    }
}

/// Encodes one event as a JSON text frame.
///
/// Encoding never fails: every field maps onto a plain JSON value.
pub fn encode_event(event: &RemotePlayEvent) -> String {
    json!({
        "id": event.id,
        "client": event.client.as_str(),
        "instance": event.instance.as_str(),
        "event": body_value(&event.event),
    })
    .to_string()
}

/// Decodes a JSON text frame into a validated event.
pub fn decode_event(frame: &str) -> Result<RemotePlayEvent, CodecError> {
    let event: RemotePlayEvent = serde_json::from_str(frame)?;
    event.validate()?;
    Ok(event)
}

/// Classifies an inbound frame as heartbeat traffic or an event.
pub fn decode_frame(frame: &str) -> Result<InboundFrame, CodecError> {
    let trimmed = frame.trim();
    if trimmed == HEARTBEAT_FRAME || trimmed == HEARTBEAT_REPLY_FRAME {
        return Ok(InboundFrame::Heartbeat);
    }
    decode_event(trimmed).map(InboundFrame::Event)
}
