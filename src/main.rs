//! Lagom - a small ECS game runtime
//!
//! Runs the headless bouncing-boxes demo until its timer ends the game.

mod demo;
mod settings;

use anyhow::{Context, Result};
use lagom_game::Game;
use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::settings::Settings;

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(false)
        .init();

    info!("Starting Lagom demo...");

    let settings = Settings::load();
    if std::env::args().any(|arg| arg == "--save-settings") {
        settings.save().context("Failed to save settings")?;
    }

    let mut game = Game::new(settings.game.clone()).context("Failed to create game")?;
    let scene = demo::build_scene(&game, &settings.demo);
    game.set_scene(scene);

    game.run().await.context("Game loop failed")?;
    demo::report(&game);

    if let Some(scene) = game.scene_mut() {
        scene.teardown();
    }
    info!("Lagom demo finished");
    Ok(())
}
