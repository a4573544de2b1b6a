//! Headless bouncing-boxes scene

use std::f32::consts::TAU;

use glam::Vec2;
use lagom_ecs::{Component, Entity, EntityId, Matched, Renderable, Scene, System, SystemId};
use lagom_game::{ActionOnPress, Game, KeyCode, ScreenShake, ScreenShaker, Timer, TimerSystem};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::{debug, info};

use crate::settings::DemoSettings;

const MARGIN: f32 = 16.0;
const SHAKE_SECONDS: f32 = 0.15;

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Velocity(pub Vec2);

impl Component for Velocity {}

/// Area a box bounces inside
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bounds {
    pub min: Vec2,
    pub max: Vec2,
}

impl Component for Bounds {}

/// GUI readout of the bounce total
#[derive(Debug, Default)]
pub struct BounceCounter {
    shown: Option<u32>,
}

impl Component for BounceCounter {}

/// Bounces so far, scene-wide
#[derive(Debug, Default, Clone, Copy)]
pub struct Bounces(pub u32);

struct DemoRng(StdRng);

#[derive(Debug, Clone, Copy, PartialEq)]
enum DemoEvent {
    Spawn,
    End,
}

#[derive(Debug, Clone, Copy)]
struct Spawner {
    movement: SystemId,
    bounds: Bounds,
    max_speed: f32,
    max_boxes: usize,
}

impl Spawner {
    fn spawn(&self, scene: &mut Scene) -> Option<EntityId> {
        if scene.system_entities(self.movement).len() >= self.max_boxes {
            return None;
        }
        let rng = &mut scene.resource_mut::<DemoRng>()?.0;
        let position = Vec2::new(
            rng.gen_range(self.bounds.min.x..=self.bounds.max.x),
            rng.gen_range(self.bounds.min.y..=self.bounds.max.y),
        );
        let speed = rng.gen_range(self.max_speed * 0.25..=self.max_speed);
        let velocity = Vec2::from_angle(rng.gen_range(0.0..TAU)) * speed;

        let entity = scene.add_entity(
            Entity::new("box")
                .at(position.x, position.y)
                .with(Velocity(velocity))
                .with(self.bounds)
                .with(Renderable::new("box")),
        );
        debug!(%entity, "box spawned");
        Some(entity)
    }
}

/// Moves boxes on the fixed pass and reflects them off their bounds.
pub struct Movement {
    shake_intensity: f32,
}

impl System for Movement {
    type Components = (Velocity, Bounds);

    fn run_on_entities(
        &mut self,
        _scene: &mut Scene,
        _delta: f32,
        _entity: EntityId,
        _matched: Matched<'_, Self::Components>,
    ) {
    }

    fn run_on_entities_fixed(
        &mut self,
        scene: &mut Scene,
        delta: f32,
        entity: EntityId,
        matched: Matched<'_, Self::Components>,
    ) {
        let Some(position) = scene.transform(entity).map(|t| t.position) else {
            return;
        };
        let Some((velocity, bounds)) = matched.get_mut(scene) else {
            return;
        };

        let mut next = position + velocity.0 * delta;
        let mut bounced = false;
        if next.x < bounds.min.x || next.x > bounds.max.x {
            velocity.0.x = -velocity.0.x;
            next.x = next.x.clamp(bounds.min.x, bounds.max.x);
            bounced = true;
        }
        if next.y < bounds.min.y || next.y > bounds.max.y {
            velocity.0.y = -velocity.0.y;
            next.y = next.y.clamp(bounds.min.y, bounds.max.y);
            bounced = true;
        }
        scene.set_position(entity, next);

        if bounced {
            if let Some(bounces) = scene.resource_mut::<Bounces>() {
                bounces.0 += 1;
            }
            if self.shake_intensity > 0.0 {
                // Entity is live here, so this only fails on a bug
                let _ = scene.add_component(
                    entity,
                    ScreenShake::new(self.shake_intensity, SHAKE_SECONDS),
                );
            }
        }
    }

    fn name(&self) -> &'static str {
        "Movement"
    }
}

fn update_counter(
    scene: &mut Scene,
    _delta: f32,
    _entity: EntityId,
    matched: Matched<'_, (BounceCounter, Renderable)>,
) {
    let total = scene.resource::<Bounces>().map_or(0, |b| b.0);
    let Some((counter, renderable)) = matched.get_mut(scene) else {
        return;
    };
    if counter.shown == Some(total) {
        return;
    }
    counter.shown = Some(total);
    renderable.label = format!("bounces: {total}");
    let label = renderable.label.clone();
    if let Some(node) = renderable.node() {
        if let Some(node) = scene.visuals_mut().get_mut(node) {
            node.label = label;
        }
    }
}

/// Build the demo scene for `game`'s window size.
pub fn build_scene(game: &Game, settings: &DemoSettings) -> Scene {
    let window = &game.config().window;
    let size = Vec2::new(window.width as f32, window.height as f32);
    let min = Vec2::splat(MARGIN);
    let bounds = Bounds {
        min,
        max: (size - MARGIN).max(min + 1.0),
    };

    let mut scene = game.new_scene();
    let rng = match settings.seed {
        Some(seed) => StdRng::seed_from_u64(seed),
        None => StdRng::from_entropy(),
    };
    scene.insert_resource(DemoRng(rng));
    scene.insert_resource(Bounces::default());

    scene.add_global_system(TimerSystem::<DemoEvent>::new());
    scene.add_global_system(ScreenShaker::new(size / 2.0));
    let movement = scene.add_system(Movement {
        shake_intensity: settings.shake_intensity,
    });
    scene.add_fn_system::<(BounceCounter, Renderable), _>(update_counter);

    let spawner = Spawner {
        movement,
        bounds,
        max_speed: settings.max_speed.max(1.0),
        max_boxes: settings.max_boxes as usize,
    };
    scene.add_system(ActionOnPress::with_keys(
        move |scene: &mut Scene| {
            spawner.spawn(scene);
        },
        [KeyCode::Space],
    ));

    for _ in 0..settings.initial_boxes {
        spawner.spawn(&mut scene);
    }

    scene.add_entity(
        Entity::new("spawner").with(
            Timer::repeating(settings.spawn_interval.max(0.01), DemoEvent::Spawn).on_fire(
                move |scene, _, _| {
                    spawner.spawn(scene);
                },
            ),
        ),
    );
    scene.add_entity(Entity::new("director").with(
        Timer::new(settings.duration, DemoEvent::End).on_fire(|scene, _, event| {
            info!(?event, "demo time is up");
            scene.request_game_over();
        }),
    ));
    scene.add_gui_entity(
        Entity::new("counter")
            .at(MARGIN, MARGIN)
            .with(BounceCounter::default())
            .with(Renderable::new("bounces: 0")),
    );

    info!(boxes = settings.initial_boxes, "demo scene built");
    scene
}

/// Log what happened during the run.
pub fn report(game: &Game) {
    let frames = game.diagnostics();
    info!(
        frames = frames.frames,
        fixed_steps = frames.fixed_steps,
        clamped_frames = frames.clamped_frames,
        avg_frame_ms = frames.average_frame_time().as_secs_f64() * 1000.0,
        "frame diagnostics"
    );
    if let Some(scene) = game.scene() {
        let systems = scene.diagnostics();
        info!(
            entities = scene.entity_count(),
            bounces = scene.resource::<Bounces>().map_or(0, |b| b.0),
            system_calls = systems.system_calls,
            slow_system_calls = systems.slow_system_calls,
            "scene diagnostics"
        );
    }
}
