use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct CliConfig {
    pub base_url: String,
    /// Stable device identity; generated per run when unset.
    pub client_id: Option<String>,
    #[serde(with = "humantime_serde")]
    pub heartbeat_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub tick_interval: Duration,
    #[serde(with = "humantime_serde")]
    pub connect_timeout: Duration,
    pub num_players: u32,
    pub reconnect_max_slot_idx: u32,
    pub rng_seed: Option<u64>,
}

impl CliConfig {
    pub fn new(config_path: Option<PathBuf>) -> Result<Self, ConfigError> {
        let mut builder = Config::builder()
            .set_default("base_url", "ws://127.0.0.1:8080/ws")?
            .set_default("client_id", None::<String>)?
            .set_default("heartbeat_interval", "20s")?
            .set_default("tick_interval", "50ms")?
            .set_default("connect_timeout", "10s")?
            .set_default("num_players", 1)?
            .set_default("reconnect_max_slot_idx", 10)?
            .set_default("rng_seed", None::<u64>)?;

        if let Some(path) = config_path {
            builder = builder.add_source(File::from(path));
        }

        builder = builder.add_source(Environment::with_prefix("COPLAY").try_parsing(true));

        let config: Self = builder.build()?.try_deserialize()?;
        if config.tick_interval.is_zero() {
            return Err(ConfigError::Message(
                "tick_interval must be greater than zero".to_string(),
            ));
        }
        Ok(config)
    }
}
