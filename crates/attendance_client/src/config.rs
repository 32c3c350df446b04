//! crates/attendance_client/src/config.rs
//!
//! Client configuration, loaded from environment variables. A `.env` file is
//! honoured for local development.

use attendance_core::AdminSeed;
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::local::DEFAULT_LATENCY;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Which store the client talks to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreMode {
    /// Only the REST API.
    Remote,
    /// Only the local key-value store.
    Local,
    /// The REST API, re-running an operation locally when the API is unreachable.
    Fallback,
}

impl FromStr for StoreMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "remote" => Ok(StoreMode::Remote),
            "local" => Ok(StoreMode::Local),
            "fallback" => Ok(StoreMode::Fallback),
            other => Err(format!(
                "'{other}' is not one of remote, local, fallback"
            )),
        }
    }
}

#[derive(Clone, Debug)]
pub struct ClientConfig {
    pub api_url: String,
    pub store_mode: StoreMode,
    pub local_store_dir: PathBuf,
    pub fallback_latency: Duration,
    pub request_timeout: Duration,
    pub admin: AdminSeed,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            api_url: "http://localhost:5000/api".to_string(),
            store_mode: StoreMode::Fallback,
            local_store_dir: PathBuf::from("./.attendance"),
            fallback_latency: DEFAULT_LATENCY,
            request_timeout: Duration::from_secs(15),
            admin: AdminSeed::default(),
        }
    }
}

impl ClientConfig {
    /// Loads configuration from environment variables.
    ///
    /// A `.env` file in the current directory is read first, except in tests.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Builds the configuration from any key lookup, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let api_url = lookup("API_URL").unwrap_or(defaults.api_url);

        let store_mode = match lookup("STORE_MODE") {
            Some(raw) => raw
                .parse::<StoreMode>()
                .map_err(|e| ConfigError::InvalidValue("STORE_MODE".to_string(), e))?,
            None => defaults.store_mode,
        };

        let local_store_dir = lookup("LOCAL_STORE_DIR")
            .map(PathBuf::from)
            .unwrap_or(defaults.local_store_dir);

        let fallback_latency = match lookup("FALLBACK_LATENCY_MS") {
            Some(raw) => Duration::from_millis(parse_number("FALLBACK_LATENCY_MS", &raw)?),
            None => defaults.fallback_latency,
        };

        let request_timeout = match lookup("REQUEST_TIMEOUT_SECS") {
            Some(raw) => Duration::from_secs(parse_number("REQUEST_TIMEOUT_SECS", &raw)?),
            None => defaults.request_timeout,
        };

        let mut admin = defaults.admin;
        if let Some(email) = lookup("ADMIN_EMAIL") {
            admin.email = email;
        }
        if let Some(password) = lookup("ADMIN_PASSWORD") {
            admin.password = password;
        }

        Ok(Self {
            api_url,
            store_mode,
            local_store_dir,
            fallback_latency,
            request_timeout,
            admin,
        })
    }
}

fn parse_number(key: &str, raw: &str) -> Result<u64, ConfigError> {
    raw.trim().parse::<u64>().map_err(|e| {
        ConfigError::InvalidValue(key.to_string(), format!("'{raw}' is not a number: {e}"))
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_apply_when_nothing_is_set() {
        let config = ClientConfig::from_lookup(lookup_from(&[])).unwrap();
        assert_eq!(config.store_mode, StoreMode::Fallback);
        assert_eq!(config.fallback_latency, Duration::from_millis(600));
        assert_eq!(config.api_url, "http://localhost:5000/api");
    }

    #[test]
    fn values_are_parsed_from_the_environment() {
        let config = ClientConfig::from_lookup(lookup_from(&[
            ("STORE_MODE", "Local"),
            ("FALLBACK_LATENCY_MS", "0"),
            ("LOCAL_STORE_DIR", "/tmp/attendance"),
            ("ADMIN_EMAIL", "office@school.edu"),
        ]))
        .unwrap();
        assert_eq!(config.store_mode, StoreMode::Local);
        assert!(config.fallback_latency.is_zero());
        assert_eq!(config.local_store_dir, PathBuf::from("/tmp/attendance"));
        assert_eq!(config.admin.email, "office@school.edu");
    }

    #[test]
    fn invalid_values_name_the_variable() {
        let err = ClientConfig::from_lookup(lookup_from(&[("STORE_MODE", "cloud")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(var, _) if var == "STORE_MODE"));

        let err =
            ClientConfig::from_lookup(lookup_from(&[("REQUEST_TIMEOUT_SECS", "soon")])).unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue(var, _) if var == "REQUEST_TIMEOUT_SECS"));
    }
}
