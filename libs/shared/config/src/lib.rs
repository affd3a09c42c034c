use std::env;
use std::ops::RangeInclusive;
use std::str::FromStr;
use std::time::Duration;
use tracing::{info, warn};

pub const DEFAULT_SIGNALING_HOST: &str = "0.0.0.0";
pub const DEFAULT_SIGNALING_PORT: u16 = 3002;
pub const DEFAULT_SIGNALING_MAX_PORT: u16 = 3010;
pub const DEFAULT_PORT_RETRY_DELAY_MS: u64 = 1000;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub signaling_host: String,
    pub signaling_port: u16,
    pub signaling_max_port: u16,
    pub port_retry_delay_ms: u64,
    /// Ping interval for connection liveness checks. Zero disables them.
    pub heartbeat_interval_secs: u64,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            signaling_host: DEFAULT_SIGNALING_HOST.to_string(),
            signaling_port: DEFAULT_SIGNALING_PORT,
            signaling_max_port: DEFAULT_SIGNALING_MAX_PORT,
            port_retry_delay_ms: DEFAULT_PORT_RETRY_DELAY_MS,
            heartbeat_interval_secs: 0,
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let config = Self {
            signaling_host: env::var("SIGNALING_HOST")
                .unwrap_or_else(|_| {
                    info!("SIGNALING_HOST not set, using {}", defaults.signaling_host);
                    defaults.signaling_host.clone()
                }),
            signaling_port: parse_env("SIGNALING_PORT", defaults.signaling_port),
            signaling_max_port: parse_env("SIGNALING_MAX_PORT", defaults.signaling_max_port),
            port_retry_delay_ms: parse_env(
                "SIGNALING_PORT_RETRY_DELAY_MS",
                defaults.port_retry_delay_ms,
            ),
            heartbeat_interval_secs: parse_env(
                "SIGNALING_HEARTBEAT_SECS",
                defaults.heartbeat_interval_secs,
            ),
        };

        if config.signaling_max_port < config.signaling_port {
            warn!(
                "SIGNALING_MAX_PORT ({}) is below SIGNALING_PORT ({}), port fallback disabled",
                config.signaling_max_port, config.signaling_port
            );
        }

        config
    }

    /// Ports tried in order when binding the relay listener.
    pub fn port_range(&self) -> RangeInclusive<u16> {
        self.signaling_port..=self.signaling_max_port.max(self.signaling_port)
    }

    pub fn port_retry_delay(&self) -> Duration {
        Duration::from_millis(self.port_retry_delay_ms)
    }

    pub fn heartbeat_interval(&self) -> Option<Duration> {
        if self.heartbeat_interval_secs == 0 {
            None
        } else {
            Some(Duration::from_secs(self.heartbeat_interval_secs))
        }
    }

    pub fn is_heartbeat_enabled(&self) -> bool {
        self.heartbeat_interval().is_some()
    }
}

fn parse_env<T>(key: &str, default: T) -> T
where
    T: FromStr + std::fmt::Display,
{
    match env::var(key) {
        Ok(raw) => raw.trim().parse().unwrap_or_else(|_| {
            warn!("{} has invalid value '{}', using default {}", key, raw, default);
            default
        }),
        Err(_) => default,
    }
}
