//! Demo settings with persistence
//!
//! Settings are saved to `~/.config/lagom/settings.toml`

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use lagom_game::GameConfig;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Everything the demo binary reads at startup
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub game: GameConfig,
    pub demo: DemoSettings,
}

/// Bouncing-boxes scene
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DemoSettings {
    /// Boxes present at start
    pub initial_boxes: u32,
    /// Seconds between spawns
    pub spawn_interval: f32,
    /// Spawning stops at this many boxes
    pub max_boxes: u32,
    /// Seconds until the demo ends
    pub duration: f32,
    /// Largest starting speed, pixels per second
    pub max_speed: f32,
    /// Camera shake on each bounce, radians
    pub shake_intensity: f32,
    /// Fixed seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for DemoSettings {
    fn default() -> Self {
        Self {
            initial_boxes: 8,
            spawn_interval: 0.5,
            max_boxes: 64,
            duration: 5.0,
            max_speed: 240.0,
            shake_intensity: 0.02,
            seed: None,
        }
    }
}

impl Settings {
    /// Get the config directory path
    fn config_dir() -> Option<PathBuf> {
        dirs::config_dir().map(|p| p.join("lagom"))
    }

    /// Get the settings file path
    pub fn settings_path() -> Option<PathBuf> {
        Self::config_dir().map(|p| p.join("settings.toml"))
    }

    /// Load settings from disk, or return defaults if missing or invalid
    pub fn load() -> Self {
        let Some(path) = Self::settings_path() else {
            warn!("Could not determine config directory");
            return Self::default();
        };
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Self {
        if !path.exists() {
            info!("No settings file found, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path) {
            Ok(content) => match Self::parse(&content) {
                Ok(settings) => {
                    info!("Loaded settings from {:?}", path);
                    settings
                }
                Err(e) => {
                    warn!("Invalid settings: {:#}, using defaults", e);
                    Self::default()
                }
            },
            Err(e) => {
                warn!("Failed to read settings file: {}, using defaults", e);
                Self::default()
            }
        }
    }

    fn parse(content: &str) -> anyhow::Result<Self> {
        let settings: Self = toml::from_str(content).context("Failed to parse settings")?;
        settings.game.validate().context("Invalid game settings")?;
        Ok(settings)
    }

    /// Save settings to disk
    pub fn save(&self) -> anyhow::Result<()> {
        let Some(path) = Self::settings_path() else {
            anyhow::bail!("Could not determine config directory");
        };
        self.save_to(&path)
    }

    pub fn save_to(&self, path: &Path) -> anyhow::Result<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create {}", dir.display()))?;
        }

        let content = toml::to_string_pretty(self)?;
        fs::write(path, content).with_context(|| format!("Failed to write {}", path.display()))?;
        info!("Saved settings to {:?}", path);
        Ok(())
    }
}
