//! Profile configuration loader/writer.
//!
//! Each profile lives in `~/.bbs-term/<profile>/` and holds `config.toml`
//! (connection, toggles, remembered credentials) next to the JSON blobs the
//! key-value store writes (`triggers.json`, `favorites.json`).

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

// Embed default configuration at compile time
const DEFAULT_CONFIG: &str = include_str!("../defaults/config.toml");

/// Environment variable overriding the base directory
pub const DATA_DIR_ENV: &str = "BBS_TERM_DIR";

/// Top-level configuration for one profile
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub connection: ConnectionConfig,
    #[serde(default)]
    pub settings: SettingsConfig,
    #[serde(default)]
    pub credentials: Credentials,
    #[serde(skip)] // Set at runtime, used for saving back to the same profile
    pub profile: Option<String>,
    #[serde(skip)] // File this config was read from; `save` writes here
    pub source: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SettingsConfig {
    #[serde(default)]
    pub keep_alive: bool,
    #[serde(default = "default_keep_alive_secs")]
    pub keep_alive_secs: u64,
    #[serde(default)]
    pub logon_automation: bool,
    #[serde(default)]
    pub auto_login: bool,
    #[serde(default)]
    pub remember_username: bool,
    #[serde(default)]
    pub remember_password: bool,
}

impl Default for SettingsConfig {
    fn default() -> Self {
        Self {
            keep_alive: false,
            keep_alive_secs: default_keep_alive_secs(),
            logon_automation: false,
            auto_login: false,
            remember_username: false,
            remember_password: false,
        }
    }
}

impl SettingsConfig {
    /// Either toggle turns on prompt answering
    pub fn answers_logon_prompts(&self) -> bool {
        self.logon_automation || self.auto_login
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Credentials {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub password: Option<String>,
}

fn default_host() -> String {
    "bbs.example.com".to_string()
}

fn default_port() -> u16 {
    23
}

fn default_keep_alive_secs() -> u64 {
    60
}

impl Default for Config {
    fn default() -> Self {
        toml::from_str(DEFAULT_CONFIG).unwrap_or_else(|e| {
            tracing::error!("Embedded default config is invalid: {}", e);
            Self {
                connection: ConnectionConfig {
                    host: default_host(),
                    port: default_port(),
                },
                settings: SettingsConfig::default(),
                credentials: Credentials::default(),
                profile: None,
                source: None,
            }
        })
    }
}

impl Config {
    /// Load the profile's config.toml, writing the defaults on first run
    pub fn load_with_options(profile: Option<&str>, port_override: Option<u16>) -> Result<Self> {
        Self::extract_defaults(profile)?;
        let config_path = Self::config_path(profile)?;
        Self::load_from_path(&config_path, profile, port_override)
    }

    /// Load config from a specific file; store files still come from the profile dir
    pub fn load_from_path(path: &Path, profile: Option<&str>, port_override: Option<u16>) -> Result<Self> {
        let contents =
            fs::read_to_string(path).context(format!("Failed to read config file: {:?}", path))?;
        let mut config: Config = toml::from_str(&contents)
            .context(format!("Failed to parse config file: {:?}", path))?;

        if let Some(port) = port_override {
            config.connection.port = port;
        }

        // Credentials only survive if the matching remember flag is on
        if !config.settings.remember_username {
            config.credentials.username = None;
        }
        if !config.settings.remember_password {
            config.credentials.password = None;
        }

        config.profile = profile.map(|s| s.to_string());
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Save back to the file this config was loaded from, or else to the
    /// profile's config.toml
    pub fn save(&self) -> Result<()> {
        match &self.source {
            Some(path) => self.save_to(path),
            None => self.save_to(&Self::config_path(self.profile.as_deref())?),
        }
    }

    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut to_write = self.clone();
        if !to_write.settings.remember_username {
            to_write.credentials.username = None;
        }
        if !to_write.settings.remember_password {
            to_write.credentials.password = None;
        }

        let contents = toml::to_string_pretty(&to_write).context("Failed to serialize config")?;
        fs::write(path, contents).context("Failed to write config file")?;
        tracing::info!("Saved config to {:?}", path);
        Ok(())
    }

    /// Record the credentials used for a logon, as far as the remember flags allow
    pub fn remember_credentials(&mut self, username: Option<&str>, password: Option<&str>) {
        if self.settings.remember_username {
            if let Some(username) = username {
                self.credentials.username = Some(username.to_string());
            }
        }
        if self.settings.remember_password {
            if let Some(password) = password {
                self.credentials.password = Some(password.to_string());
            }
        }
    }

    fn extract_defaults(profile: Option<&str>) -> Result<()> {
        let config_path = Self::config_path(profile)?;
        if config_path.exists() {
            return Ok(());
        }

        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)
                .context(format!("Failed to create profile directory {:?}", parent))?;
        }
        fs::write(&config_path, DEFAULT_CONFIG).context("Failed to write default config.toml")?;
        tracing::info!("Extracted default config to {:?}", config_path);
        Ok(())
    }

    /// Base directory (~/.bbs-term), overridable with BBS_TERM_DIR
    pub fn base_dir() -> Result<PathBuf> {
        if let Ok(custom_dir) = std::env::var(DATA_DIR_ENV) {
            return Ok(PathBuf::from(custom_dir));
        }

        let home = dirs::home_dir().context("Could not find home directory")?;
        Ok(home.join(".bbs-term"))
    }

    /// Get the profile directory (or "default" if none)
    /// Returns: ~/.bbs-term/{profile}/
    pub fn profile_dir(profile: Option<&str>) -> Result<PathBuf> {
        let profile_name = profile.unwrap_or("default");
        Ok(Self::base_dir()?.join(profile_name))
    }

    /// Returns: ~/.bbs-term/{profile}/config.toml
    pub fn config_path(profile: Option<&str>) -> Result<PathBuf> {
        Ok(Self::profile_dir(profile)?.join("config.toml"))
    }

    /// Returns: ~/.bbs-term/bbs-term.log
    pub fn log_path() -> Result<PathBuf> {
        Ok(Self::base_dir()?.join("bbs-term.log"))
    }
}
