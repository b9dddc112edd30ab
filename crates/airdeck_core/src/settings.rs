//! Persistent Settings Management
//!
//! Saves and loads the engine configuration plus each deck's playlist.
//!
//! # Storage Locations
//! - Linux: `~/.config/airdeck/settings.json`
//! - Windows: `%APPDATA%\airdeck\settings.json`
//! - macOS: `~/Library/Application Support/airdeck/settings.json`

use std::fs;
use std::path::{Path, PathBuf};

use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::config::EngineConfig;
use crate::message::Side;

/// Root settings structure
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AirdeckSettings {
    #[serde(default)]
    pub config: EngineConfig,

    /// Tracks for deck A, first entry loaded at startup
    #[serde(default)]
    pub left_playlist: Vec<PathBuf>,

    /// Tracks for deck B; no deck B when empty
    #[serde(default)]
    pub right_playlist: Vec<PathBuf>,
}

impl AirdeckSettings {
    /// Load settings from the platform config directory, or return default
    /// if missing/corrupt
    pub fn load() -> Self {
        match Self::get_config_path() {
            Some(path) if path.exists() => Self::load_from(&path).unwrap_or_else(|e| {
                error!("{}", e);
                info!("Using default settings");
                Self::default()
            }),
            _ => {
                info!("Using default settings");
                Self::default()
            }
        }
    }

    /// Load settings from an explicit file
    pub fn load_from(path: &Path) -> Result<Self, String> {
        let file = fs::File::open(path)
            .map_err(|e| format!("Failed to open settings file {:?}: {}", path, e))?;
        let settings: Self = serde_json::from_reader(file)
            .map_err(|e| format!("Failed to parse settings file {:?}: {}", path, e))?;
        settings.config.validate()?;

        info!("Settings loaded from {:?}", path);
        Ok(settings)
    }

    /// Save settings to the platform config directory
    pub fn save(&self) -> Result<(), String> {
        let path = Self::get_config_path().ok_or("Could not determine config path")?;
        self.save_to(&path)
    }

    /// Save settings to an explicit file, creating parent directories
    pub fn save_to(&self, path: &Path) -> Result<(), String> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|e| e.to_string())?;
        }

        let file = fs::File::create(path).map_err(|e| e.to_string())?;
        serde_json::to_writer_pretty(file, self).map_err(|e| e.to_string())?;

        info!("Settings saved to {:?}", path);
        Ok(())
    }

    pub fn playlist(&self, side: Side) -> &[PathBuf] {
        match side {
            Side::Left => &self.left_playlist,
            Side::Right => &self.right_playlist,
        }
    }

    /// Get the platform-specific configuration file path
    pub fn get_config_path() -> Option<PathBuf> {
        ProjectDirs::from("com", "airdeck", "airdeck")
            .map(|proj| proj.config_dir().join("settings.json"))
    }
}
