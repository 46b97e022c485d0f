use coplay_codec::event::EventBody;
use coplay_core::{ClientId, InstanceId};
use tracing::debug;

/// Outbound half of a session as seen by the action relay.
pub trait EventSink {
    /// Stable identity of the local client.
    fn client_id(&self) -> &ClientId;
    /// Whether `instance` was minted by this process for one of its links.
    fn is_own_instance(&self, instance: &InstanceId) -> bool;
    /// Whether events sent now would reach the server.
    fn is_connected(&self) -> bool;
    /// Current local mirror of the server's committed sequence counter.
    fn event_counter(&self) -> u64;
    /// Sends one event, fire-and-forget.
    ///
    /// Returns the sequence id stamped onto an ACTION event, or `None` if the
    /// event carried no id or was dropped. A refused send leaves the counter
    /// untouched.
    fn send_event(&mut self, body: EventBody) -> Option<u64>;
}

/// Sink for play without a session: never connected, drops every event.
#[derive(Debug, Clone)]
pub struct OfflineSink {
    client_id: ClientId,
}

impl OfflineSink {
    pub fn new(client_id: ClientId) -> Self {
        Self { client_id }
    }
}

impl EventSink for OfflineSink {
    fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    fn is_own_instance(&self, _instance: &InstanceId) -> bool {
        false
    }

    fn is_connected(&self) -> bool {
        false
    }

    fn event_counter(&self) -> u64 {
        0
    }

    fn send_event(&mut self, body: EventBody) -> Option<u64> {
        debug!("offline: dropping outbound {body:?}");
        None
    }
}
