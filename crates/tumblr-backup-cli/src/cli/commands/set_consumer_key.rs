//! `tumblr-backup set-consumer-key` – write the per-user credentials file.

use anyhow::Result;
use tumblr_backup_core::config::{self, Credentials};

pub fn run_set_consumer_key(key: &str) -> Result<()> {
    let creds = Credentials {
        oauth_consumer_key: key.to_string(),
    };
    let path = config::credentials_path()?;
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, serde_json::to_string_pretty(&creds)?)?;
    println!("consumer key saved to {}", path.display());
    Ok(())
}
