//! Config module.
//! Manages I/O for profiles.json (capture rectangles, thresholds, last export).
//! Uses serde for JSON serialization.
//! Auto-generates a `Default` profile covering the primary monitor if missing.
//! Supports multiple named profiles; one is selected at a time.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use dirs::config_dir;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::capture::CaptureRect;

const APP_CONFIG_DIR_NAME: &str = "scroll2pdf";
const CONFIG_FILE_NAME: &str = "profiles.json";

pub const DEFAULT_PROFILE: &str = "Default";
pub const DEFAULT_MAX_ERROR: f64 = 200.0;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("No config directory available on this platform")]
    NoConfigDir,
    #[error("Unknown profile '{0}'")]
    UnknownProfile(String),
    #[error("Profile name already taken: '{0}'")]
    ProfileExists(String),
    #[error("Cannot delete last profile")]
    LastProfile,
    #[error("No profiles configured")]
    NoProfiles,
}

fn default_max_error() -> f64 {
    DEFAULT_MAX_ERROR
}

/// One capture setup: where to grab and how strict alignment is.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Profile {
    #[serde(flatten)]
    pub region: CaptureRect,
    #[serde(default = "default_max_error")]
    pub max_error: f64,
}

impl Profile {
    pub fn new(region: CaptureRect) -> Self {
        Self {
            region,
            max_error: DEFAULT_MAX_ERROR,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub selected_profile: Option<String>,
    #[serde(default)]
    pub last_file: Option<PathBuf>,
    #[serde(default)]
    pub profiles: BTreeMap<String, Profile>,
}

impl Config {
    /// Adds a `Default` profile spanning the whole screen when there is none.
    /// Returns whether it did.
    pub fn ensure_default(&mut self, screen: (u32, u32)) -> bool {
        if !self.profiles.is_empty() {
            return false;
        }
        let region = CaptureRect::new(0, 0, screen.0, screen.1);
        self.profiles.insert(DEFAULT_PROFILE.to_string(), Profile::new(region));
        true
    }

    pub fn add_profile(&mut self, name: &str, profile: Profile) -> Result<(), ConfigError> {
        if self.profiles.contains_key(name) {
            return Err(ConfigError::ProfileExists(name.to_string()));
        }
        self.profiles.insert(name.to_string(), profile);
        Ok(())
    }

    pub fn remove_profile(&mut self, name: &str) -> Result<Profile, ConfigError> {
        if !self.profiles.contains_key(name) {
            return Err(ConfigError::UnknownProfile(name.to_string()));
        }
        if self.profiles.len() == 1 {
            return Err(ConfigError::LastProfile);
        }
        let removed = self
            .profiles
            .remove(name)
            .ok_or_else(|| ConfigError::UnknownProfile(name.to_string()))?;
        if self.selected_profile.as_deref() == Some(name) {
            self.selected_profile = None;
        }
        Ok(removed)
    }

    pub fn select(&mut self, name: &str) -> Result<(), ConfigError> {
        if !self.profiles.contains_key(name) {
            return Err(ConfigError::UnknownProfile(name.to_string()));
        }
        self.selected_profile = Some(name.to_string());
        Ok(())
    }

    /// The selected profile, falling back to the first one by name when the
    /// selection is missing or stale.
    pub fn selected(&self) -> Result<(&str, &Profile), ConfigError> {
        let wanted = self.selected_profile.as_deref().unwrap_or(DEFAULT_PROFILE);
        self.profiles
            .get_key_value(wanted)
            .or_else(|| self.profiles.iter().next())
            .map(|(name, profile)| (name.as_str(), profile))
            .ok_or(ConfigError::NoProfiles)
    }

    /// Looks up `name`, or the selected profile when `name` is `None`.
    pub fn resolve(&self, name: Option<&str>) -> Result<(&str, &Profile), ConfigError> {
        match name {
            Some(name) => self
                .profiles
                .get_key_value(name)
                .map(|(name, profile)| (name.as_str(), profile))
                .ok_or_else(|| ConfigError::UnknownProfile(name.to_string())),
            None => self.selected(),
        }
    }
}

/// Location of the profiles file.
#[derive(Debug, Clone)]
pub struct ConfigStore {
    path: PathBuf,
}

impl ConfigStore {
    pub fn at(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// `~/.config/scroll2pdf/profiles.json` or the platform equivalent.
    pub fn default_location() -> Result<Self, ConfigError> {
        let dir = config_dir().ok_or(ConfigError::NoConfigDir)?;
        Ok(Self::at(dir.join(APP_CONFIG_DIR_NAME).join(CONFIG_FILE_NAME)))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Missing file means an empty config.
    pub fn load(&self) -> Result<Config, ConfigError> {
        if !self.path.exists() {
            debug!(path = ?self.path, "Config file does not exist, using defaults");
            return Ok(Config::default());
        }
        let data = fs::read_to_string(&self.path)?;
        let config = serde_json::from_str(&data)?;
        debug!(path = ?self.path, "Config loaded");
        Ok(config)
    }

    pub fn save(&self, config: &Config) -> Result<(), ConfigError> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_string_pretty(config)?;
        fs::write(&self.path, data)?;
        debug!(path = ?self.path, "Config saved");
        Ok(())
    }
}
