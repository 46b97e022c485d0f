use std::time::Duration;

use coplay_core::ClientId;

use crate::backoff::ReconnectPolicy;

/// Default keepalive period; well below common ~55s idle timeouts.
pub const DEFAULT_HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);

#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Session endpoint base, e.g. `wss://host/ws`.
    pub base_url: String,
    /// Stable identity of this device.
    pub client_id: ClientId,
    /// Period between keepalive frames while connected.
    pub heartbeat_interval: Duration,
    /// Backoff used after abnormal closures.
    pub reconnect: ReconnectPolicy,
    /// Player count advertised in `STATUS{connected: true}`.
    pub num_players: u32,
    /// Fixed RNG seed for reproducible backoff and instance ids.
    pub rng_seed: Option<u64>,
}

impl SessionConfig {
    pub fn new(base_url: impl Into<String>, client_id: ClientId) -> Self {
        Self {
            base_url: base_url.into(),
            client_id,
            heartbeat_interval: DEFAULT_HEARTBEAT_INTERVAL,
            reconnect: ReconnectPolicy::default(),
            num_players: 1,
            rng_seed: None,
        }
    }
}
