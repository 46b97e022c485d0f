use coplay_core::{ClientId, ClientKey, InstanceId};
use serde::{Deserialize, Serialize};

use crate::error::CodecError;

/// Relayed action: a registry name plus its JSON-serialized arguments.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionEvent {
    /// Registry name of the relayable action.
    pub name: String,
    /// Serialized JSON arguments (opaque to the codec).
    pub args: String,
}

/// Connectivity report for one client instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusEvent {
    pub connected: bool,
    #[serde(
        rename = "numPlayers",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    pub num_players: Option<u32>,
}

/// Tagged event payload; `type` selects the variant on the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "SCREAMING_SNAKE_CASE")]
pub enum EventBody {
    Action(ActionEvent),
    Status(StatusEvent),
}

impl EventBody {
    pub fn action(name: impl Into<String>, args: impl Into<String>) -> Self {
        Self::Action(ActionEvent {
            name: name.into(),
            args: args.into(),
        })
    }

    pub fn status(connected: bool, num_players: Option<u32>) -> Self {
        Self::Status(StatusEvent {
            connected,
            num_players,
        })
    }

    /// Whether this body consumes a sequence id when sent.
    pub fn is_sequenced(&self) -> bool {
        matches!(self, Self::Action(_))
    }
}

/// One event exchanged with the session server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemotePlayEvent {
    /// Total-order sequence number; only present on ACTION events.
    #[serde(default)]
    pub id: Option<u64>,
    pub client: ClientId,
    pub instance: InstanceId,
    pub event: EventBody,
}

impl RemotePlayEvent {
    /// Builds an unsequenced event (the id is stamped at send time).
    pub fn new(client: ClientId, instance: InstanceId, event: EventBody) -> Self {
        Self {
            id: None,
            client,
            instance,
            event,
        }
    }

    /// Peer-status map key of the sender.
    pub fn client_key(&self) -> ClientKey {
        ClientKey::new(&self.client, &self.instance)
    }

    /// Checks event-level rules that the JSON schema cannot express.
    pub fn validate(&self) -> Result<(), CodecError> {
        match &self.event {
            EventBody::Action(action) => {
                if action.name.is_empty() {
                    return Err(CodecError::InvalidEvent("action name must not be empty"));
                }
            }
            EventBody::Status(_) => {
                if self.id.is_some() {
                    return Err(CodecError::InvalidEvent(
                        "status events must not carry a sequence id",
                    ));
                }
            }
        }
        Ok(())
    }
}
