use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::{LedgerError, Result};
use crate::provider::AuthSource;
use crate::remote::Identity;

pub const DB_FILE: &str = "satledger.db";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub data_dir: String,
    /// Folder replicated by a sync client, used as the remote store.
    #[serde(default)]
    pub remote_dir: Option<String>,
    /// Signed-in user; `None` means local-only storage.
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default = "default_remote_enabled")]
    pub remote_enabled: bool,
}

fn default_remote_enabled() -> bool {
    true
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir().to_string_lossy().to_string(),
            remote_dir: None,
            user: None,
            remote_enabled: default_remote_enabled(),
        }
    }
}

impl Settings {
    pub fn db_path(&self) -> PathBuf {
        PathBuf::from(&self.data_dir).join(DB_FILE)
    }

    pub fn remote_path(&self) -> Option<PathBuf> {
        self.remote_dir.as_ref().map(PathBuf::from)
    }
}

fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config")
        .join("satledger")
}

fn settings_path() -> PathBuf {
    config_dir().join("settings.json")
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("Documents")
        .join("satledger")
}

pub fn load_settings() -> Settings {
    let path = settings_path();
    if path.exists() {
        let content = std::fs::read_to_string(&path).unwrap_or_default();
        serde_json::from_str(&content).unwrap_or_default()
    } else {
        Settings::default()
    }
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    let dir = config_dir();
    std::fs::create_dir_all(&dir)?;
    let json = serde_json::to_string_pretty(settings)
        .map_err(|e| LedgerError::Settings(e.to_string()))?;
    std::fs::write(settings_path(), format!("{json}\n"))?;
    Ok(())
}

pub fn shellexpand_path(path: &str) -> String {
    if path.starts_with('~') {
        if let Some(home) = dirs::home_dir() {
            return path.replacen('~', &home.to_string_lossy(), 1);
        }
    }
    std::fs::canonicalize(path)
        .unwrap_or_else(|_| PathBuf::from(path))
        .to_string_lossy()
        .to_string()
}

/// Sign-in state as recorded by `login`/`logout`. Re-read from disk on every
/// call so another process signing out is observed.
pub struct SettingsAuth;

impl AuthSource for SettingsAuth {
    fn current_identity(&self) -> Option<Identity> {
        load_settings()
            .user
            .filter(|u| !u.trim().is_empty())
            .map(|u| Identity::new(&u))
    }
}
