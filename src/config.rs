//! Runtime configuration read from the environment at startup.

use std::env;
use std::str::FromStr;

use crate::error::ConfigError;

pub const DEFAULT_CURRENCY: &str = "₹";

#[derive(Clone, Debug, PartialEq)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub max_upload_bytes: usize,
    pub currency: String,
}

impl Default for AppConfig {
    fn default() -> Self {
        AppConfig {
            host: "127.0.0.1".to_string(),
            port: 8080,
            max_upload_bytes: 10 * 1024 * 1024,
            currency: DEFAULT_CURRENCY.to_string(),
        }
    }
}

impl AppConfig {
    /// Reads `DASHBOARD_HOST`, `DASHBOARD_PORT`, `DASHBOARD_MAX_UPLOAD_BYTES`
    /// and `DASHBOARD_CURRENCY`, keeping defaults for unset variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = AppConfig::default();

        Ok(AppConfig {
            host: lookup("DASHBOARD_HOST").unwrap_or(defaults.host),
            port: parse_or("DASHBOARD_PORT", "port number", lookup("DASHBOARD_PORT"), defaults.port)?,
            max_upload_bytes: parse_or(
                "DASHBOARD_MAX_UPLOAD_BYTES",
                "byte count",
                lookup("DASHBOARD_MAX_UPLOAD_BYTES"),
                defaults.max_upload_bytes,
            )?,
            currency: lookup("DASHBOARD_CURRENCY").unwrap_or(defaults.currency),
        })
    }
}

fn parse_or<T: FromStr>(
    key: &'static str,
    expected: &'static str,
    raw: Option<String>,
    default: T,
) -> Result<T, ConfigError> {
    match raw {
        None => Ok(default),
        Some(value) => value.trim().parse().map_err(|_| ConfigError::Invalid {
            key,
            expected,
            value,
        }),
    }
}
