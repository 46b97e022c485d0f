use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;

/// Separator between client and instance in a [`ClientKey`].
pub const CLIENT_KEY_SEPARATOR: char = '|';

fn validate_id(raw: &str, what: &'static str) -> Result<(), CoreError> {
    if raw.is_empty() {
        return Err(CoreError::InvalidInput(what));
    }
    if raw.contains(CLIENT_KEY_SEPARATOR) {
        return Err(CoreError::InvalidInput("id must not contain '|'"));
    }
    Ok(())
}

/// Stable device identity; survives reconnects.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ClientId(String);

impl ClientId {
    pub fn new(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        validate_id(&raw, "client id must not be empty")?;
        Ok(Self(raw))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for ClientId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<ClientId> for String {
    fn from(value: ClientId) -> Self {
        value.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Per-connection identity; minted again on every connect.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct InstanceId(String);

impl InstanceId {
    pub fn new(raw: impl Into<String>) -> Result<Self, CoreError> {
        let raw = raw.into();
        validate_id(&raw, "instance id must not be empty")?;
        Ok(Self(raw))
    }

    /// Builds an instance id from random bytes (lowercase hex).
    pub fn from_entropy(bytes: [u8; 8]) -> Self {
        Self(hex::encode(bytes))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl TryFrom<String> for InstanceId {
    type Error = CoreError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<InstanceId> for String {
    fn from(value: InstanceId) -> Self {
        value.0
    }
}

impl fmt::Display for InstanceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// `client|instance` key used by peer-status maps.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ClientKey(String);

impl ClientKey {
    pub fn new(client: &ClientId, instance: &InstanceId) -> Self {
        Self(format!(
            "{}{CLIENT_KEY_SEPARATOR}{}",
            client.as_str(),
            instance.as_str()
        ))
    }

    /// Client half of the key.
    pub fn client(&self) -> &str {
        self.0
            .split_once(CLIENT_KEY_SEPARATOR)
            .map_or(self.0.as_str(), |(client, _)| client)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Correlation id of a speculative action awaiting server confirmation.
///
/// Values mirror the sequence number the action's event was offered with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InflightId(pub u64);

impl fmt::Display for InflightId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "inflight#{}", self.0)
    }
}

/// Credentials needed to (re)join a named session.
#[derive(Clone, PartialEq, Eq)]
pub struct SessionDescriptor {
    pub session_id: String,
    pub secret: String,
}

impl SessionDescriptor {
    pub fn new(session_id: impl Into<String>, secret: impl Into<String>) -> Result<Self, CoreError> {
        let session_id = session_id.into();
        if session_id.trim().is_empty() {
            return Err(CoreError::InvalidInput("session id must not be empty"));
        }
        Ok(Self {
            session_id,
            secret: secret.into(),
        })
    }
}

impl fmt::Debug for SessionDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionDescriptor")
            .field("session_id", &self.session_id)
            .field("secret", &"<redacted>")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::{ClientId, ClientKey, InflightId, InstanceId, SessionDescriptor};
    use crate::error::CoreError;

    #[test]
    fn ids_reject_empty_and_separator() {
        assert!(ClientId::new("").is_err());
        assert_eq!(
            ClientId::new("a|b").expect_err("separator must be rejected"),
            CoreError::InvalidInput("id must not contain '|'")
        );
        assert!(InstanceId::new("").is_err());
    }

    #[test]
    fn client_key_joins_client_and_instance() {
        let client = ClientId::new("tablet").expect("valid client");
        let instance = InstanceId::new("0a0b").expect("valid instance");
        let key = ClientKey::new(&client, &instance);
        assert_eq!(key.as_str(), "tablet|0a0b");
        assert_eq!(key.client(), "tablet");
    }

    #[test]
    fn instance_from_entropy_is_hex() {
        let instance = InstanceId::from_entropy([0xde, 0xad, 0xbe, 0xef, 0, 1, 2, 3]);
        assert_eq!(instance.as_str(), "deadbeef00010203");
    }

    #[test]
    fn ids_deserialize_with_validation() {
        let ok: ClientId = serde_json::from_str("\"phone\"").expect("valid id parses");
        assert_eq!(ok.as_str(), "phone");
        assert!(serde_json::from_str::<ClientId>("\"\"").is_err());
        assert_eq!(serde_json::to_string(&ok).expect("serializes"), "\"phone\"");
    }

    #[test]
    fn inflight_ids_order_by_sequence() {
        assert!(InflightId(1) < InflightId(2));
        assert_eq!(InflightId(7).to_string(), "inflight#7");
    }

    #[test]
    fn descriptor_debug_redacts_secret() {
        let descriptor = SessionDescriptor::new("room-1", "hunter2").expect("valid descriptor");
        let rendered = format!("{descriptor:?}");
        assert!(rendered.contains("room-1"));
        assert!(!rendered.contains("hunter2"));
        assert!(SessionDescriptor::new("  ", "x").is_err());
    }
}
