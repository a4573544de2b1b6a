use std::path::PathBuf;

use lagom_core::TimeConfigError;
use lagom_ecs::SceneConfigError;

/// Errors from driving the game loop.
#[derive(Debug, thiserror::Error)]
pub enum GameError {
    #[error("no scene set; call set_scene before starting the game")]
    NoActiveScene,

    #[error("invalid time configuration: {0}")]
    Time(#[from] TimeConfigError),

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Resource(#[from] ResourceError),
}

/// Errors from registering, looking up or loading resources.
#[derive(Debug, thiserror::Error)]
pub enum ResourceError {
    #[error("resource {0} not defined")]
    NotFound(String),

    #[error("resource {name} is not a {expected}")]
    TypeMismatch {
        name: String,
        expected: &'static str,
    },

    #[error("I/O error loading '{0}': {1}")]
    Io(PathBuf, #[source] std::io::Error),

    #[error("failed to decode image '{0}': {1}")]
    Decode(PathBuf, String),

    #[error("image '{path}' is {width}x{height}, which is not a grid of {frame_width}x{frame_height} frames")]
    FrameSize {
        path: PathBuf,
        width: u32,
        height: u32,
        frame_width: u32,
        frame_height: u32,
    },

    #[error("resource load task failed: {0}")]
    Task(String),
}

/// Errors from reading game configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error(transparent)]
    Time(#[from] TimeConfigError),

    #[error(transparent)]
    Scene(#[from] SceneConfigError),

    #[error("frame rate must be positive")]
    InvalidFrameRate,
}
