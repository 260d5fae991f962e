//! Service settings.
//!
//! Read from an optional `invguard.json` (or any format the `config` crate
//! recognises by extension) and then from `INVGUARD_*` environment variables,
//! which win. Everything has a default, so an empty environment is a valid
//! configuration that talks to a local InvGuard API.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use config::{Config, Environment, File};
use serde::Deserialize;

use crate::error::Result;

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub bind: String,
    pub port: u16,
    /// Base URL of the InvGuard REST API.
    pub api_url: String,
    /// Read collections from JSON exports in this directory instead of the API.
    pub data_dir: Option<PathBuf>,
    pub session_file: PathBuf,
    /// Page size requested from the transactions endpoint.
    pub transaction_fetch_limit: u32,
    pub refresh_interval_secs: u64,
    pub low_stock_alert_ratio: f64,
    pub top_items: usize,
    pub trend_days: i64,
    /// Fallback log filter when `RUST_LOG` is unset.
    pub log_level: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1".into(),
            port: 8088,
            api_url: "http://localhost:5000/api".into(),
            data_dir: None,
            session_file: PathBuf::from("session.json"),
            transaction_fetch_limit: 50,
            refresh_interval_secs: 30,
            low_stock_alert_ratio: 0.1,
            top_items: 10,
            trend_days: 30,
            log_level: "info".into(),
        }
    }
}

impl Settings {
    /// `invguard.*` in the working directory, then the process environment.
    pub fn load() -> Result<Self> {
        Self::load_from(Path::new("invguard"), None)
    }

    /// Loads `file` (optional) and the `INVGUARD_` variables of `env`, or of
    /// the process environment when `env` is `None`.
    pub fn load_from(file: &Path, env: Option<HashMap<String, String>>) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::from(file).required(false))
            .add_source(Environment::with_prefix("INVGUARD").try_parsing(true).source(env))
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    pub fn address(&self) -> String {
        format!("{}:{}", self.bind, self.port)
    }

    /// Zero disables periodic refresh.
    pub fn refresh_interval(&self) -> Option<Duration> {
        (self.refresh_interval_secs > 0).then(|| Duration::from_secs(self.refresh_interval_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_without_any_source() {
        let dir = tempfile::tempdir().unwrap();
        let settings = Settings::load_from(&dir.path().join("invguard"), Some(HashMap::new())).unwrap();
        assert_eq!(settings, Settings::default());
        assert_eq!(settings.address(), "127.0.0.1:8088");
    }

    #[test]
    fn environment_overrides_file() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("invguard.json");
        std::fs::write(&file, r#"{"port": 9000, "api_url": "http://inventory:5000/api", "top_items": 5}"#).unwrap();
        let env = HashMap::from([
            ("INVGUARD_PORT".to_string(), "9100".to_string()),
            ("INVGUARD_REFRESH_INTERVAL_SECS".to_string(), "0".to_string()),
        ]);
        let settings = Settings::load_from(&file, Some(env)).unwrap();
        assert_eq!(settings.port, 9100);
        assert_eq!(settings.api_url, "http://inventory:5000/api");
        assert_eq!(settings.top_items, 5);
        assert_eq!(settings.refresh_interval(), None);
        assert_eq!(settings.transaction_fetch_limit, 50);
    }
}
