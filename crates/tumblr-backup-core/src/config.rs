//! Application configuration and credentials.
//!
//! Two separate files live under the XDG base dirs: a TOML tuning file for
//! engine knobs (thread count, connection timeouts, retry budget) and a small
//! JSON credentials file holding the OAuth consumer key used to authenticate
//! API requests. They are split because the credentials file has a format
//! mandated by interop with the original tool and is edited by hand far more
//! often than the tuning file.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::PathBuf;

/// Tuning knobs for the backup engine.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackupConfig {
    /// Number of worker threads fetching/rendering posts concurrently.
    pub threads: usize,
    /// Connect timeout, in seconds, for HTTP requests.
    pub connect_timeout_secs: u64,
    /// Low-speed timeout: abort a transfer stalled below 1 byte/s for this long.
    pub low_speed_time_secs: u64,
    /// Retry budget for a single retrieval (see `http_retriever::retrieve`).
    pub max_retries: u32,
}

impl Default for BackupConfig {
    fn default() -> Self {
        Self {
            threads: 20,
            connect_timeout_secs: 60,
            low_speed_time_secs: 30,
            max_retries: 20,
        }
    }
}

pub fn config_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("tumblr-backup")?;
    Ok(xdg_dirs.place_config_file("config.toml")?)
}

/// Load the tuning config from disk, creating a default file if none exists.
pub fn load_or_init() -> Result<BackupConfig> {
    let path = config_path()?;
    if !path.exists() {
        let default_cfg = BackupConfig::default();
        let toml = toml::to_string_pretty(&default_cfg)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&path, toml)?;
        tracing::info!("created default config at {}", path.display());
        return Ok(default_cfg);
    }

    let data = fs::read_to_string(&path)?;
    let cfg: BackupConfig = toml::from_str(&data)
        .with_context(|| format!("failed to parse config at {}", path.display()))?;
    Ok(cfg)
}

/// OAuth consumer key credentials, stored as a small JSON object:
/// `{"oauth_consumer_key": "..."}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Credentials {
    pub oauth_consumer_key: String,
}

pub fn credentials_path() -> Result<PathBuf> {
    let xdg_dirs = xdg::BaseDirectories::with_prefix("tumblr-backup")?;
    Ok(xdg_dirs.place_config_file("credentials.json")?)
}

/// Load the consumer key, failing with a clear message if no credentials file
/// exists yet (there is no sane default to generate one from).
pub fn load_credentials() -> Result<Credentials> {
    let path = credentials_path()?;
    let data = fs::read_to_string(&path).with_context(|| {
        format!(
            "no credentials file at {}; create one with {{\"oauth_consumer_key\": \"...\"}}",
            path.display()
        )
    })?;
    let creds: Credentials = serde_json::from_str(&data)
        .with_context(|| format!("failed to parse credentials at {}", path.display()))?;
    Ok(creds)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = BackupConfig::default();
        assert_eq!(cfg.threads, 20);
        assert_eq!(cfg.max_retries, 20);
    }

    #[test]
    fn config_toml_roundtrip() {
        let cfg = BackupConfig::default();
        let toml = toml::to_string_pretty(&cfg).unwrap();
        let parsed: BackupConfig = toml::from_str(&toml).unwrap();
        assert_eq!(parsed.threads, cfg.threads);
        assert_eq!(parsed.max_retries, cfg.max_retries);
    }

    #[test]
    fn credentials_json_roundtrip() {
        let creds = Credentials {
            oauth_consumer_key: "abc123".to_string(),
        };
        let json = serde_json::to_string(&creds).unwrap();
        let parsed: Credentials = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.oauth_consumer_key, "abc123");
    }
}
