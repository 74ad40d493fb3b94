use rust_decimal::Decimal;
use serde::Deserialize;
use std::env;
use std::time::Duration;

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub storage: StorageConfig,
    pub auth: AuthConfig,
    pub settlement: SettlementConfig,
    pub notifications: NotificationConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct ServerConfig {
    pub port: u16,
}

#[derive(Debug, Deserialize, Clone)]
pub struct DatabaseConfig {
    pub url: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

fn default_max_connections() -> u32 { 5 }

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Memory,
    Postgres,
}

#[derive(Debug, Deserialize, Clone)]
pub struct StorageConfig {
    pub backend: StorageBackend,
}

#[derive(Debug, Deserialize, Clone)]
pub struct AuthConfig {
    pub jwt_secret: String,
    pub jwt_expiration_seconds: u64,
}

#[derive(Debug, Deserialize, Clone)]
pub struct SettlementConfig {
    #[serde(default = "default_commission_percentage")]
    pub default_commission_percentage: Decimal,
}

fn default_commission_percentage() -> Decimal { Decimal::from(15) }

#[derive(Debug, Deserialize, Clone)]
pub struct NotificationConfig {
    pub operator_email: Option<String>,
    pub sender: String,
    pub brand_name: String,
    pub send_timeout_ms: u64,
    pub queue_capacity: usize,
    pub workers: usize,
    pub retry_interval_seconds: u64,
    pub stale_pending_seconds: u64,
}

impl NotificationConfig {
    pub fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_seconds)
    }

    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_pending_seconds)
    }

    /// A row may only turn stale after any send for it has timed out.
    pub fn validate(&self) -> Result<(), config::ConfigError> {
        if self.retry_interval_seconds == 0 {
            return Err(config::ConfigError::Message(
                "notifications.retry_interval_seconds must be greater than zero".to_string(),
            ));
        }
        if self.send_timeout_ms == 0 {
            return Err(config::ConfigError::Message(
                "notifications.send_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.stale_after() <= self.send_timeout() {
            return Err(config::ConfigError::Message(format!(
                "notifications.stale_pending_seconds ({}s) must exceed send_timeout_ms ({}ms)",
                self.stale_pending_seconds, self.send_timeout_ms
            )));
        }
        Ok(())
    }
}

impl Config {
    pub fn load() -> Result<Self, config::ConfigError> {
        let run_mode = env::var("RUN_MODE").unwrap_or_else(|_| "development".into());

        let s = config::Config::builder()
            .add_source(config::File::with_name("config/default"))
            // Per-environment overrides, optional
            .add_source(config::File::with_name(&format!("config/{}", run_mode)).required(false))
            // Local overrides, not checked in
            .add_source(config::File::with_name("config/local").required(false))
            // Eg. `DROPSHIP__SERVER__PORT=8080` sets `server.port`
            .add_source(config::Environment::with_prefix("DROPSHIP").separator("__"))
            .build()?;

        let cfg: Self = s.try_deserialize()?;
        cfg.notifications.validate()?;
        Ok(cfg)
    }
}
