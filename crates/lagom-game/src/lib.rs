//! Lagom Game - frame loop, input and common systems
//!
//! [`Game`] owns the active [`lagom_ecs::Scene`] and drives it: fixed steps,
//! one variable update, input edge advance and one render per frame.

mod action;
mod clock;
mod config;
mod error;
mod follow;
mod game;
mod input;
mod loader;
mod render;
mod screenshake;
mod timer;

pub use action::ActionOnPress;
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{GameConfig, WindowConfig};
pub use error::{ConfigError, GameError, ResourceError};
pub use follow::{FollowCamera, FollowMe};
pub use game::{FrameDiagnostics, Game, RollingTime};
pub use input::{ButtonState, Keyboard, Mouse};
pub use loader::{LoadFuture, Resource, ResourceLoader, SpriteSheet, Texture};
pub use render::{NullRenderer, Renderer};
pub use screenshake::{ScreenShake, ScreenShaker};
pub use timer::{Timer, TimerSystem};

pub use winit::event::{ElementState, MouseButton, MouseScrollDelta};
pub use winit::keyboard::{KeyCode, PhysicalKey};
