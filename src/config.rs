// Persistent client settings: account, roster view and chat-state timeouts.

use anyhow::{anyhow, Result};
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use log::{info, warn};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use std::fs::{self, File};
use std::io::Read;
use std::path::{Path, PathBuf};
use tokio::time::Duration;

use crate::chat_state::ChatStateTimeouts;
use crate::conversation::ConversationConfig;

const APP_DIR: &str = "parley";
const SETTINGS_FILE: &str = "settings.json";

/// Chat-state timeouts in whole seconds, as stored on disk.
#[derive(Serialize, Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
pub struct TimeoutSettings {
    pub paused_secs: u64,
    pub inactive_secs: u64,
    pub gone_secs: u64,
}

impl Default for TimeoutSettings {
    fn default() -> Self {
        Self {
            paused_secs: 30,
            inactive_secs: 120,
            gone_secs: 600,
        }
    }
}

impl From<TimeoutSettings> for ChatStateTimeouts {
    fn from(t: TimeoutSettings) -> Self {
        ChatStateTimeouts {
            paused: Duration::from_secs(t.paused_secs),
            inactive: Duration::from_secs(t.inactive_secs),
            gone: Duration::from_secs(t.gone_secs),
        }
    }
}

fn default_true() -> bool {
    true
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
pub struct Settings {
    pub server: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
    #[serde(default)]
    pub hide_offline: bool,
    #[serde(default = "default_true")]
    pub enter_sends: bool,
    #[serde(default)]
    pub timeouts: TimeoutSettings,
}

impl Settings {
    pub fn new(server: &str, username: &str, password: &str) -> Self {
        Settings {
            server: server.to_string(),
            username: username.to_string(),
            password: Some(BASE64.encode(password)),
            hide_offline: false,
            enter_sends: true,
            timeouts: TimeoutSettings::default(),
        }
    }

    pub fn get_password(&self) -> Option<String> {
        let encoded = self.password.as_ref()?;
        match BASE64.decode(encoded).map(String::from_utf8) {
            Ok(Ok(password)) => Some(password),
            _ => {
                warn!("Stored password for {} is not valid base64/UTF-8", self.username);
                None
            }
        }
    }

    /// Account address; a username that already has a domain is used as is.
    pub fn jid(&self) -> String {
        if self.username.contains('@') {
            self.username.clone()
        } else {
            format!("{}@{}", self.username, self.server)
        }
    }

    pub fn conversation_config(&self) -> ConversationConfig {
        ConversationConfig {
            enter_sends: self.enter_sends,
            timeouts: self.timeouts.into(),
        }
    }
}

static CONFIG_DIR_OVERRIDE: OnceCell<PathBuf> = OnceCell::new();

/// Use `dir` instead of the platform config directory. Only the first call wins.
pub fn set_config_dir_override(dir: PathBuf) {
    if CONFIG_DIR_OVERRIDE.set(dir).is_err() {
        warn!("Config directory override already set, ignoring");
    }
}

pub fn config_dir() -> Result<PathBuf> {
    let config_dir = match CONFIG_DIR_OVERRIDE.get() {
        Some(dir) => dir.clone(),
        None => dirs::config_dir()
            .ok_or_else(|| anyhow!("Could not determine config directory"))?
            .join(APP_DIR),
    };

    if !config_dir.exists() {
        fs::create_dir_all(&config_dir)?;
    }

    Ok(config_dir)
}

pub fn load_settings() -> Result<Option<Settings>> {
    load_settings_from(&config_dir()?.join(SETTINGS_FILE))
}

pub fn save_settings(settings: &Settings) -> Result<()> {
    save_settings_to(&config_dir()?.join(SETTINGS_FILE), settings)
}

pub fn load_settings_from(path: &Path) -> Result<Option<Settings>> {
    if !path.exists() {
        return Ok(None);
    }

    let mut file = File::open(path)?;
    let mut contents = String::new();
    file.read_to_string(&mut contents)?;

    let settings: Settings = serde_json::from_str(&contents)?;
    info!("Loaded settings for {} from {}", settings.username, path.display());
    Ok(Some(settings))
}

pub fn save_settings_to(path: &Path, settings: &Settings) -> Result<()> {
    let file = File::create(path)?;
    serde_json::to_writer_pretty(file, settings)?;
    info!("Settings saved for {}", settings.username);
    Ok(())
}
