//! Lagom Core - Core types and utilities for the Lagom engine
//!
//! This crate provides the foundational types used throughout the engine:
//! - Object identity and lifecycle state
//! - 2D transform and color types (math re-exported from glam)
//! - Observable publish-subscribe channels
//! - Game time with a fixed-timestep accumulator

pub mod events;
pub mod lifecycle;
pub mod time;
pub mod types;

pub use events::{Observable, SubscriptionId};
pub use glam::{Mat3, Vec2};
pub use lifecycle::{LifecycleState, ObjectId};
pub use time::{GameTime, TimeConfig, TimeConfigError, MIN_FIXED_TIMESTEP};
pub use types::{Color, Transform};
