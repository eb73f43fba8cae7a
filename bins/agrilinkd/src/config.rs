use std::time::Duration;

use dotenvy::dotenv;
use std::env;
use thiserror::Error;

use agrilink_server::MqttSettings;

/// Daemon configuration, read from the environment (and an optional .env).
#[derive(Debug, Clone)]
pub struct Config {
    pub mqtt_host: String,
    pub mqtt_port: u16,
    pub mqtt_username: String,
    pub mqtt_password: String,
    pub mqtt_client_id: String,
    pub mqtt_reconnect_delay_ms: u64,

    pub snapshot_path: String,
    pub snapshot_interval_secs: u64,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Environment variable {0} is missing or invalid.")]
    MissingOrInvalid(String),
    #[error("Parsing error: {0}")]
    ParsingError(String),
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenv().ok(); // Load environment variables from .env file

        let config = Self {
            mqtt_host: env::var("MQTT_HOST")
                .map_err(|_| ConfigError::MissingOrInvalid("MQTT_HOST".to_string()))?,
            mqtt_port: env::var("MQTT_PORT")
                .unwrap_or_else(|_| "1883".to_string())
                .parse::<u16>()
                .map_err(|_| {
                    ConfigError::ParsingError("MQTT_PORT must be a valid port number".to_string())
                })?,
            mqtt_username: env::var("MQTT_USERNAME").unwrap_or_default(),
            mqtt_password: env::var("MQTT_PASSWORD").unwrap_or_default(),
            mqtt_client_id: env::var("MQTT_CLIENT_ID")
                .unwrap_or_else(|_| "agrilink-station".to_string()),
            mqtt_reconnect_delay_ms: env::var("MQTT_RECONNECT_DELAY_MS")
                .unwrap_or_else(|_| "5000".to_string())
                .parse::<u64>()
                .map_err(|_| {
                    ConfigError::ParsingError(
                        "MQTT_RECONNECT_DELAY_MS must be a valid number".to_string(),
                    )
                })?,

            snapshot_path: env::var("SNAPSHOT_PATH")
                .unwrap_or_else(|_| "agrilink-snapshot.json".to_string()),
            snapshot_interval_secs: env::var("SNAPSHOT_INTERVAL_SECS")
                .unwrap_or_else(|_| "60".to_string())
                .parse::<u64>()
                .map_err(|_| {
                    ConfigError::ParsingError(
                        "SNAPSHOT_INTERVAL_SECS must be a valid number".to_string(),
                    )
                })?,
        };

        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        const MIN_DELAY_MS: u64 = 100;
        const MAX_DELAY_MS: u64 = 1_000_000;

        if !(MIN_DELAY_MS..=MAX_DELAY_MS).contains(&self.mqtt_reconnect_delay_ms) {
            return Err(ConfigError::ParsingError(format!(
                "MQTT_RECONNECT_DELAY_MS must be between {} and {} ms",
                MIN_DELAY_MS, MAX_DELAY_MS
            )));
        }
        if self.snapshot_interval_secs == 0 {
            return Err(ConfigError::ParsingError(
                "SNAPSHOT_INTERVAL_SECS must be greater than zero".to_string(),
            ));
        }

        Ok(())
    }

    pub fn mqtt_settings(&self) -> MqttSettings {
        MqttSettings {
            host: self.mqtt_host.clone(),
            port: self.mqtt_port,
            client_id: self.mqtt_client_id.clone(),
            username: self.mqtt_username.clone(),
            password: self.mqtt_password.clone(),
            reconnect_delay: Duration::from_millis(self.mqtt_reconnect_delay_ms),
        }
    }

    pub fn snapshot_interval(&self) -> Duration {
        Duration::from_secs(self.snapshot_interval_secs)
    }
}
