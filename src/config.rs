use std::env;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;

use crate::error::SyncError;
use crate::transport::TransportKind;

/// Default per-call transport timeout.
pub const DEFAULT_TIMEOUT_MS: u64 = 8_000;
const MIN_TIMEOUT_MS: u64 = 1_000;
const MAX_TIMEOUT_MS: u64 = 60_000;

pub const DEFAULT_CONFIG_FILE: &str = "livesync.toml";
pub const DEFAULT_CACHE_DIR: &str = ".livesync";

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Remote store URL. Sync stays off unless this is http(s).
    pub endpoint: Option<String>,
    pub transport: TransportKind,
    pub timeout_ms: u64,
    /// Directory holding the cache mirror.
    pub cache_dir: PathBuf,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            endpoint: None,
            transport: TransportKind::default(),
            timeout_ms: DEFAULT_TIMEOUT_MS,
            cache_dir: PathBuf::from(DEFAULT_CACHE_DIR),
        }
    }
}

impl Config {
    /// TOML file (`LIVESYNC_CONFIG`, else `./livesync.toml`) overlaid with
    /// `LIVESYNC_*` environment variables. Never fails: a broken file is
    /// logged and ignored.
    pub fn load() -> Self {
        let path = env::var("LIVESYNC_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from(DEFAULT_CONFIG_FILE));
        let mut config = match Self::from_file(&path) {
            Ok(Some(config)) => config,
            Ok(None) => Self::default(),
            Err(e) => {
                tracing::warn!("ignoring {}: {e}", path.display());
                Self::default()
            }
        };
        config.apply_overrides(|key| env::var(key).ok());
        config
    }

    /// `Ok(None)` when the file does not exist.
    pub fn from_file(path: &Path) -> Result<Option<Self>, SyncError> {
        match std::fs::read_to_string(path) {
            Ok(raw) => Self::from_toml_str(&raw).map(Some),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(SyncError::Other(format!("failed to read config: {e}"))),
        }
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, SyncError> {
        toml::from_str(raw).map_err(|e| SyncError::Other(format!("invalid config: {e}")))
    }

    /// Apply `LIVESYNC_ENDPOINT`, `LIVESYNC_TRANSPORT`, `LIVESYNC_TIMEOUT_MS`
    /// and `LIVESYNC_CACHE_DIR`. Unparsable values are logged and skipped.
    pub fn apply_overrides(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(endpoint) = lookup("LIVESYNC_ENDPOINT") {
            let endpoint = endpoint.trim().to_string();
            self.endpoint = (!endpoint.is_empty()).then_some(endpoint);
        }
        if let Some(raw) = lookup("LIVESYNC_TRANSPORT") {
            match raw.parse::<TransportKind>() {
                Ok(kind) => self.transport = kind,
                Err(e) => tracing::warn!("LIVESYNC_TRANSPORT: {e}"),
            }
        }
        if let Some(raw) = lookup("LIVESYNC_TIMEOUT_MS") {
            match raw.trim().parse::<u64>() {
                Ok(ms) => self.timeout_ms = ms,
                Err(e) => tracing::warn!("LIVESYNC_TIMEOUT_MS: {e}"),
            }
        }
        if let Some(dir) = lookup("LIVESYNC_CACHE_DIR")
            && !dir.trim().is_empty()
        {
            self.cache_dir = PathBuf::from(dir);
        }
    }

    /// Per-call timeout, clamped to 1s..=60s.
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms.clamp(MIN_TIMEOUT_MS, MAX_TIMEOUT_MS))
    }

    /// The endpoint, if remote sync can run against it.
    pub fn sync_endpoint(&self) -> Option<&str> {
        self.endpoint
            .as_deref()
            .map(str::trim)
            .filter(|e| e.starts_with("http://") || e.starts_with("https://"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key: &str| map.get(key).cloned()
    }

    #[test]
    fn defaults_are_offline() {
        let config = Config::default();
        assert_eq!(config.sync_endpoint(), None);
        assert_eq!(config.transport, TransportKind::Direct);
        assert_eq!(config.timeout(), Duration::from_secs(8));
    }

    #[test]
    fn toml_file_and_partial_keys() {
        let config = Config::from_toml_str(
            r#"
            endpoint = "https://script.example/exec"
            transport = "callback_bridge"
            "#,
        )
        .unwrap();
        assert_eq!(config.sync_endpoint(), Some("https://script.example/exec"));
        assert_eq!(config.transport, TransportKind::CallbackBridge);
        assert_eq!(config.timeout_ms, DEFAULT_TIMEOUT_MS);
        assert!(Config::from_toml_str("transport = \"smoke-signal\"").is_err());
    }

    #[test]
    fn env_overrides_win() {
        let mut config = Config::from_toml_str("endpoint = \"https://a.example\"").unwrap();
        config.apply_overrides(lookup(&[
            ("LIVESYNC_ENDPOINT", "http://127.0.0.1:9/exec"),
            ("LIVESYNC_TRANSPORT", "post"),
            ("LIVESYNC_TIMEOUT_MS", "12000"),
            ("LIVESYNC_CACHE_DIR", "/tmp/cache"),
        ]));
        assert_eq!(config.sync_endpoint(), Some("http://127.0.0.1:9/exec"));
        assert_eq!(config.transport, TransportKind::Post);
        assert_eq!(config.timeout(), Duration::from_secs(12));
        assert_eq!(config.cache_dir, PathBuf::from("/tmp/cache"));
    }

    #[test]
    fn bad_overrides_are_skipped() {
        let mut config = Config::default();
        config.apply_overrides(lookup(&[
            ("LIVESYNC_TRANSPORT", "telegraph"),
            ("LIVESYNC_TIMEOUT_MS", "soon"),
        ]));
        assert_eq!(config, Config::default());
    }

    #[test]
    fn non_http_endpoints_disable_sync() {
        for endpoint in ["file:///index.html", "", "ftp://x"] {
            let config = Config {
                endpoint: Some(endpoint.to_string()),
                ..Config::default()
            };
            assert_eq!(config.sync_endpoint(), None, "{endpoint}");
        }
    }

    #[test]
    fn timeout_is_clamped() {
        let mut config = Config {
            timeout_ms: 5,
            ..Config::default()
        };
        assert_eq!(config.timeout(), Duration::from_secs(1));
        config.timeout_ms = 10_000_000;
        assert_eq!(config.timeout(), Duration::from_secs(60));
    }
}
