use core::fmt::{Debug, Display};
use std::net::{Ipv4Addr, SocketAddr, SocketAddrV4};
use std::time::Duration;

use figment::providers::{Env, Format, Toml};
use figment::Figment;
use serde::Deserialize;

pub const DEFAULT_INSTRUCTOR_PASSWORD: &str = "instructor";

#[derive(Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub listen_address: SocketAddr,
    pub instructor_password: String,
    /// Teams that exist right after startup or a reset.
    pub default_team_count: u32,
    /// Minimum rating (1-5) that counts a joke as passed.
    pub pass_threshold: u8,
    pub default_batch_size: u32,
    pub default_customer_budget: u32,
    pub poll_interval_ms: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_address: SocketAddr::V4(SocketAddrV4::new(Ipv4Addr::LOCALHOST, 3000)),
            instructor_password: DEFAULT_INSTRUCTOR_PASSWORD.to_owned(),
            default_team_count: 4,
            pass_threshold: 3,
            default_batch_size: 5,
            default_customer_budget: 10,
            poll_interval_ms: 1500,
        }
    }
}

#[derive(thiserror::Error)]
pub enum ConfigError {
    #[error("config error: {0}")]
    Figment(#[from] Box<figment::Error>),
    #[error("invalid config value for {field}: {reason}")]
    Invalid {
        field: &'static str,
        reason: &'static str,
    },
}

impl Debug for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        Display::fmt(self, f)
    }
}

impl Config {
    /// How often player clients ask for a fresh session snapshot.
    #[must_use]
    pub const fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    fn validate(self) -> Result<Self, ConfigError> {
        if !(1..=5).contains(&self.pass_threshold) {
            return Err(ConfigError::Invalid {
                field: "pass_threshold",
                reason: "must be between 1 and 5",
            });
        }
        if self.default_team_count == 0 {
            return Err(ConfigError::Invalid {
                field: "default_team_count",
                reason: "must be positive",
            });
        }
        if self.poll_interval_ms == 0 {
            return Err(ConfigError::Invalid {
                field: "poll_interval_ms",
                reason: "must be positive",
            });
        }
        Ok(self)
    }
}

pub fn figment() -> Figment {
    Figment::new()
        .merge(Toml::file("joke-market.toml"))
        .merge(Env::prefixed("JOKE_MARKET_"))
}

pub fn get_config() -> Result<Config, ConfigError> {
    let config: Config = figment().extract().map_err(Box::new)?;
    config.validate()
}
