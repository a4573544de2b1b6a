//! Game configuration, loadable from TOML

use std::time::Duration;

use lagom_core::{Color, TimeConfig};
use lagom_ecs::SceneConfig;
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Output surface options handed to the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WindowConfig {
    pub width: u32,
    pub height: u32,
    /// Device pixel ratio
    pub resolution: f32,
    /// 0xRRGGBB
    pub background_color: u32,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            width: 800,
            height: 600,
            resolution: 1.0,
            background_color: 0x000000,
        }
    }
}

impl WindowConfig {
    pub fn background(&self) -> Color {
        Color::from_hex(self.background_color)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GameConfig {
    pub time: TimeConfig,
    pub scene: SceneConfig,
    pub window: WindowConfig,
    /// Target frames per second for [`crate::Game::run`]
    pub frame_rate: u32,
}

impl Default for GameConfig {
    fn default() -> Self {
        Self {
            time: TimeConfig::default(),
            scene: SceneConfig::default(),
            window: WindowConfig::default(),
            frame_rate: 60,
        }
    }
}

impl GameConfig {
    pub fn from_toml_str(source: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(self)?)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.time.validate()?;
        self.scene.validate()?;
        if self.frame_rate == 0 {
            return Err(ConfigError::InvalidFrameRate);
        }
        Ok(())
    }

    /// Time between frames at the target frame rate
    pub fn frame_interval(&self) -> Duration {
        Duration::from_secs_f64(1.0 / self.frame_rate.max(1) as f64)
    }
}
