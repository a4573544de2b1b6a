//! Time system for the Lagom engine
//!
//! Converts variable wall-clock frame deltas into a clamped frame delta plus a
//! whole number of fixed-size simulation steps.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Smallest fixed step a config may ask for.
pub const MIN_FIXED_TIMESTEP: Duration = Duration::from_micros(100);

const NANOS_PER_SEC: u128 = 1_000_000_000;

/// Configuration for game time
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TimeConfig {
    /// How many in-game seconds pass per real second
    pub time_scale: f64,
    /// Whether to pause when the host reports focus loss
    pub pause_on_unfocus: bool,
    /// Fixed timestep for fixed updates (in seconds)
    pub fixed_timestep: f64,
    /// Maximum frame delta (in seconds). Anything above is discarded, not replayed.
    pub max_delta_time: f64,
}

impl Default for TimeConfig {
    fn default() -> Self {
        Self {
            time_scale: 1.0,
            pause_on_unfocus: true,
            fixed_timestep: 1.0 / 60.0,
            max_delta_time: 0.1,
        }
    }
}

impl TimeConfig {
    /// Check that every value can be turned into a usable duration.
    pub fn validate(&self) -> Result<(), TimeConfigError> {
        if !(self.fixed_timestep.is_finite()
            && self.fixed_timestep >= MIN_FIXED_TIMESTEP.as_secs_f64())
        {
            return Err(TimeConfigError::InvalidFixedTimestep(self.fixed_timestep));
        }
        if !(self.max_delta_time.is_finite() && self.max_delta_time > 0.0)
            || self.max_delta().is_zero()
        {
            return Err(TimeConfigError::InvalidMaxDelta(self.max_delta_time));
        }
        if !(self.time_scale.is_finite() && self.time_scale >= 0.0) {
            return Err(TimeConfigError::InvalidTimeScale(self.time_scale));
        }
        Ok(())
    }

    /// The fixed step as a duration.
    pub fn fixed_step(&self) -> Duration {
        Duration::from_secs_f64(self.fixed_timestep)
    }

    /// The frame delta cap as a duration.
    pub fn max_delta(&self) -> Duration {
        Duration::from_secs_f64(self.max_delta_time)
    }
}

/// Errors raised when a [`TimeConfig`] cannot drive a clock
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum TimeConfigError {
    #[error("fixed timestep must be at least 0.0001 seconds, got {0}")]
    InvalidFixedTimestep(f64),

    #[error("maximum delta time must be a positive number of seconds, got {0}")]
    InvalidMaxDelta(f64),

    #[error("time scale must be zero or positive, got {0}")]
    InvalidTimeScale(f64),
}

/// Game time tracking
///
/// Durations are kept as integer nanoseconds so the fixed-step drain is exact:
/// a frame of `d` with a step of `s` yields `floor((leftover + d) / s)` steps.
#[derive(Debug, Clone)]
pub struct GameTime {
    config: TimeConfig,
    fixed_step: Duration,
    max_delta: Duration,
    /// Scaled time since game start
    pub total_time: Duration,
    /// Delta time for this frame (clamped and scaled)
    pub delta_time: Duration,
    /// Clamped delta before scaling and pausing
    pub unscaled_delta_time: Duration,
    /// Frame counter
    pub frame_count: u64,
    /// Whether the last frame's raw delta exceeded the cap
    pub delta_clamped: bool,
    paused: bool,
    fixed_accumulator: Duration,
}

impl Default for GameTime {
    fn default() -> Self {
        let config = TimeConfig::default();
        Self {
            fixed_step: config.fixed_step(),
            max_delta: config.max_delta(),
            config,
            total_time: Duration::ZERO,
            delta_time: Duration::ZERO,
            unscaled_delta_time: Duration::ZERO,
            frame_count: 0,
            delta_clamped: false,
            paused: false,
            fixed_accumulator: Duration::ZERO,
        }
    }
}

impl GameTime {
    /// Create a new game time with custom config
    pub fn new(config: TimeConfig) -> Result<Self, TimeConfigError> {
        config.validate()?;
        Ok(Self {
            fixed_step: config.fixed_step(),
            max_delta: config.max_delta(),
            config,
            ..Default::default()
        })
    }

    pub fn config(&self) -> &TimeConfig {
        &self.config
    }

    /// The size of one fixed step.
    pub fn fixed_timestep(&self) -> Duration {
        self.fixed_step
    }

    /// Update the game time with the raw delta from the previous frame.
    ///
    /// Returns the delta handed to the variable-rate update.
    pub fn update(&mut self, raw_delta: Duration) -> Duration {
        self.delta_clamped = raw_delta > self.max_delta;
        self.unscaled_delta_time = raw_delta.min(self.max_delta);
        self.frame_count += 1;

        if self.paused {
            self.delta_time = Duration::ZERO;
            return self.delta_time;
        }

        self.delta_time = if self.config.time_scale == 1.0 {
            self.unscaled_delta_time
        } else {
            self.unscaled_delta_time.mul_f64(self.config.time_scale)
        };
        self.total_time += self.delta_time;
        self.fixed_accumulator += self.delta_time;
        self.delta_time
    }

    /// Get the number of fixed timesteps to process this frame
    pub fn fixed_steps(&mut self) -> u32 {
        let step = self.fixed_step.as_nanos();
        if step == 0 {
            return 0;
        }
        let steps = self.fixed_accumulator.as_nanos() / step;
        let leftover = self.fixed_accumulator.as_nanos() % step;
        self.fixed_accumulator = Duration::new(
            (leftover / NANOS_PER_SEC) as u64,
            (leftover % NANOS_PER_SEC) as u32,
        );
        u32::try_from(steps).unwrap_or(u32::MAX)
    }

    /// Time carried over to the next frame.
    pub fn leftover(&self) -> Duration {
        self.fixed_accumulator
    }

    /// Get the interpolation factor for rendering between fixed steps
    pub fn fixed_interpolation(&self) -> f32 {
        (self.fixed_accumulator.as_secs_f64() / self.fixed_step.as_secs_f64()) as f32
    }

    /// Pause the game
    pub fn pause(&mut self) {
        self.paused = true;
    }

    /// Resume the game
    pub fn resume(&mut self) {
        self.paused = false;
    }

    /// Toggle pause state
    pub fn toggle_pause(&mut self) {
        self.paused = !self.paused;
    }

    pub fn is_paused(&self) -> bool {
        self.paused
    }

    /// Set the time scale (0.0 = frozen, 1.0 = normal, 2.0 = double speed)
    pub fn set_time_scale(&mut self, scale: f64) {
        self.config.time_scale = if scale.is_finite() { scale.max(0.0) } else { 1.0 };
    }
}
