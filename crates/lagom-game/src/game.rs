//! Frame loop: fixed-step simulation, variable update, input edges, render

use std::time::{Duration, Instant};

use glam::Vec2;
use lagom_core::GameTime;
use lagom_ecs::Scene;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};
use winit::event::{ElementState, MouseButton, MouseScrollDelta};
use winit::keyboard::{KeyCode, PhysicalKey};

use crate::clock::{Clock, SystemClock};
use crate::config::GameConfig;
use crate::error::GameError;
use crate::input::{Keyboard, Mouse};
use crate::loader::ResourceLoader;
use crate::render::{NullRenderer, Renderer};

/// Samples a rolling average roughly spans.
const ROLLING_WINDOW: f64 = 100.0;

/// Exponential moving average of a phase's wall time.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct RollingTime {
    mean: f64,
    samples: u64,
}

impl RollingTime {
    fn push(&mut self, sample: Duration) {
        let sample = sample.as_secs_f64();
        self.samples += 1;
        // Plain mean until the window fills, then decay
        let weight = 1.0 / (self.samples as f64).min(ROLLING_WINDOW);
        self.mean += (sample - self.mean) * weight;
    }

    pub fn average(&self) -> Duration {
        Duration::try_from_secs_f64(self.mean.max(0.0)).unwrap_or(Duration::MAX)
    }
}

/// Wall time spent in each phase of the frame loop.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FrameDiagnostics {
    pub frames: u64,
    pub fixed_steps: u64,
    /// Frames whose raw delta exceeded the cap
    pub clamped_frames: u64,
    pub last_fixed_time: Duration,
    pub last_update_time: Duration,
    pub last_render_time: Duration,
    pub last_frame_time: Duration,
    pub fixed_time: RollingTime,
    pub update_time: RollingTime,
    pub render_time: RollingTime,
    pub frame_time: RollingTime,
    total_frame_time: Duration,
}

impl FrameDiagnostics {
    /// Mean wall time per frame over the whole run.
    pub fn average_frame_time(&self) -> Duration {
        if self.frames == 0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(self.total_frame_time.as_secs_f64() / self.frames as f64)
    }

    fn record(&mut self, steps: u32, fixed: Duration, update: Duration, render: Duration, total: Duration) {
        self.frames += 1;
        self.fixed_steps += u64::from(steps);
        self.last_fixed_time = fixed;
        self.last_update_time = update;
        self.last_render_time = render;
        self.last_frame_time = total;
        self.fixed_time.push(fixed);
        self.update_time.push(update);
        self.render_time.push(render);
        self.frame_time.push(total);
        self.total_frame_time = self.total_frame_time.saturating_add(total);
    }
}

/// Owns the active scene and drives it one frame at a time.
pub struct Game {
    config: GameConfig,
    scene: Option<Scene>,
    clock: Box<dyn Clock>,
    last_frame: Duration,
    time: GameTime,
    keyboard: Keyboard,
    mouse: Mouse,
    resources: ResourceLoader,
    renderer: Box<dyn Renderer>,
    diagnostics: FrameDiagnostics,
    game_over: bool,
    paused_by_focus: bool,
}

impl Game {
    pub fn new(config: GameConfig) -> Result<Self, GameError> {
        config.validate()?;
        let time = GameTime::new(config.time.clone())?;
        info!(
            width = config.window.width,
            height = config.window.height,
            frame_rate = config.frame_rate,
            "game created"
        );
        Ok(Self {
            config,
            scene: None,
            clock: Box::new(SystemClock::new()),
            last_frame: Duration::ZERO,
            time,
            keyboard: Keyboard::new(),
            mouse: Mouse::new(),
            resources: ResourceLoader::default(),
            renderer: Box::new(NullRenderer::new()),
            diagnostics: FrameDiagnostics::default(),
            game_over: false,
            paused_by_focus: false,
        })
    }

    pub fn with_clock(mut self, clock: impl Clock + 'static) -> Self {
        self.clock = Box::new(clock);
        self
    }

    pub fn with_renderer(mut self, renderer: impl Renderer + 'static) -> Self {
        self.renderer = Box::new(renderer);
        self
    }

    pub fn with_resource_loader(mut self, resources: ResourceLoader) -> Self {
        self.resources = resources;
        self
    }

    pub fn config(&self) -> &GameConfig {
        &self.config
    }

    /// An empty scene using this game's scene settings.
    pub fn new_scene(&self) -> Scene {
        Scene::with_config(self.config.scene.clone())
    }

    /// Make `scene` active. The previous scene is handed back for the caller
    /// to tear down.
    pub fn set_scene(&mut self, scene: Scene) -> Option<Scene> {
        debug!("active scene replaced");
        self.scene.replace(scene)
    }

    pub fn scene(&self) -> Option<&Scene> {
        self.scene.as_ref()
    }

    pub fn scene_mut(&mut self) -> Option<&mut Scene> {
        self.scene.as_mut()
    }

    /// Reset the frame clock. Fails without an active scene.
    pub fn start(&mut self) -> Result<(), GameError> {
        if self.scene.is_none() {
            warn!("game started without a scene");
            return Err(GameError::NoActiveScene);
        }
        self.last_frame = self.clock.now();
        info!("game started");
        Ok(())
    }

    /// Advance one frame using the time elapsed on the clock since the last.
    pub fn frame(&mut self) -> Result<(), GameError> {
        let frame_start = Instant::now();
        let scene = self.scene.as_mut().ok_or(GameError::NoActiveScene)?;

        let now = self.clock.now();
        let raw = now.saturating_sub(self.last_frame);
        self.last_frame = now;
        let delta = self.time.update(raw);
        if self.time.delta_clamped {
            warn!(
                raw_ms = raw.as_secs_f64() * 1000.0,
                max_ms = self.time.config().max_delta_time * 1000.0,
                "frame delta capped"
            );
            self.diagnostics.clamped_frames += 1;
        }

        scene.insert_resource(self.keyboard.clone());
        scene.insert_resource(self.mouse.clone());

        let fixed_start = Instant::now();
        let steps = self.time.fixed_steps();
        let step = self.time.fixed_timestep().as_secs_f32();
        for _ in 0..steps {
            scene.fixed_update(step);
        }
        let fixed_time = fixed_start.elapsed();

        let update_start = Instant::now();
        scene.update(delta.as_secs_f32());
        let update_time = update_start.elapsed();

        self.keyboard.update();
        self.mouse.update();

        let render_start = Instant::now();
        self.renderer
            .render(scene.visuals(), scene.stage(), self.config.window.background());
        let render_time = render_start.elapsed();

        if scene.take_game_over_request() {
            info!("scene requested game over");
            self.game_over = true;
        }

        self.diagnostics
            .record(steps, fixed_time, update_time, render_time, frame_start.elapsed());
        Ok(())
    }

    /// Run frames at the configured rate until game over.
    pub async fn run(&mut self) -> Result<(), GameError> {
        self.start()?;
        let mut interval = tokio::time::interval(self.config.frame_interval());
        interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

        while !self.game_over {
            interval.tick().await;
            self.frame()?;
        }

        info!(
            frames = self.diagnostics.frames,
            avg_frame_ms = self.diagnostics.average_frame_time().as_secs_f64() * 1000.0,
            "game loop finished"
        );
        Ok(())
    }

    /// Resolve every registered resource.
    pub async fn load(&self) -> Result<(), GameError> {
        self.resources.load_all().await?;
        Ok(())
    }

    pub fn resources(&self) -> &ResourceLoader {
        &self.resources
    }

    pub fn resources_mut(&mut self) -> &mut ResourceLoader {
        &mut self.resources
    }

    pub fn set_game_over(&mut self) {
        self.game_over = true;
    }

    pub fn is_game_over(&self) -> bool {
        self.game_over
    }

    pub fn pause(&mut self) {
        self.time.pause();
    }

    pub fn resume(&mut self) {
        self.paused_by_focus = false;
        self.time.resume();
    }

    pub fn is_paused(&self) -> bool {
        self.time.is_paused()
    }

    pub fn set_time_scale(&mut self, scale: f64) {
        self.time.set_time_scale(scale);
    }

    pub fn time(&self) -> &GameTime {
        &self.time
    }

    pub fn diagnostics(&self) -> FrameDiagnostics {
        self.diagnostics
    }

    pub fn keyboard(&self) -> &Keyboard {
        &self.keyboard
    }

    pub fn mouse(&self) -> &Mouse {
        &self.mouse
    }

    // ---- host input ----

    pub fn key_event(&mut self, key: PhysicalKey, state: ElementState) {
        self.keyboard.handle_keyboard(key, state);
    }

    pub fn key_down(&mut self, key: KeyCode) {
        self.keyboard.key_down(key);
    }

    pub fn key_up(&mut self, key: KeyCode) {
        self.keyboard.key_up(key);
    }

    /// A right click clears held keys; context menus swallow their key-ups.
    pub fn mouse_button(&mut self, button: MouseButton, state: ElementState) {
        if button == MouseButton::Right && state == ElementState::Pressed {
            self.keyboard.clear();
        }
        self.mouse.handle_mouse_button(button, state);
    }

    pub fn cursor_moved(&mut self, position: Vec2) {
        self.mouse.handle_cursor_moved(position);
    }

    pub fn mouse_wheel(&mut self, delta: MouseScrollDelta) {
        self.mouse.handle_scroll(delta);
    }

    pub fn focus_lost(&mut self) {
        self.keyboard.clear();
        if self.time.config().pause_on_unfocus && !self.time.is_paused() {
            debug!("pausing on focus loss");
            self.time.pause();
            self.paused_by_focus = true;
        }
    }

    pub fn focus_gained(&mut self) {
        if self.paused_by_focus {
            self.paused_by_focus = false;
            self.time.resume();
        }
    }
}
