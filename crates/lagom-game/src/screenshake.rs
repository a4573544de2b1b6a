//! Camera shake requested through components

use glam::Vec2;
use lagom_ecs::{Component, ComponentRef, GlobalMatches, GlobalSystem, Scene};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tracing::trace;

/// Request a shake. Consumed by [`ScreenShaker`] on its next update.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ScreenShake {
    /// Largest rotation offset, in radians
    pub intensity: f32,
    /// Seconds
    pub duration: f32,
}

impl ScreenShake {
    pub fn new(intensity: f32, duration: f32) -> Self {
        Self {
            intensity,
            duration,
        }
    }
}

impl Component for ScreenShake {}

/// Jitters the camera rotation while a shake is active.
///
/// Overlapping requests do not stack: the strongest intensity and the longest
/// duration among pending requests win.
pub struct ScreenShaker {
    pivot: Vec2,
    intensity: f32,
    remaining: f32,
    rng: StdRng,
}

impl ScreenShaker {
    /// Shake about `pivot`, in view space.
    pub fn new(pivot: Vec2) -> Self {
        Self::with_rng(pivot, StdRng::from_entropy())
    }

    pub fn with_seed(pivot: Vec2, seed: u64) -> Self {
        Self::with_rng(pivot, StdRng::seed_from_u64(seed))
    }

    fn with_rng(pivot: Vec2, rng: StdRng) -> Self {
        Self {
            pivot,
            intensity: 0.0,
            remaining: 0.0,
            rng,
        }
    }

    pub fn is_shaking(&self) -> bool {
        self.remaining > 0.0
    }

    pub fn intensity(&self) -> f32 {
        self.intensity
    }

    pub fn remaining(&self) -> f32 {
        self.remaining
    }
}

/// Remove a request and hand back its values. `None` if it is already gone.
fn take_request(scene: &mut Scene, request: ComponentRef) -> Option<ScreenShake> {
    let shake = scene.component::<ScreenShake>(request).copied()?;
    scene
        .remove_component(request.entity, request.component)
        .ok()
        .map(|_| shake)
}

impl GlobalSystem for ScreenShaker {
    type Components = (ScreenShake,);

    fn update(&mut self, scene: &mut Scene, delta: f32, components: &GlobalMatches) {
        for request in components.of::<ScreenShake>() {
            if let Some(shake) = take_request(scene, *request) {
                self.intensity = self.intensity.max(shake.intensity);
                self.remaining = self.remaining.max(shake.duration);
                trace!(intensity = shake.intensity, duration = shake.duration, "shake requested");
            }
        }

        if self.remaining > 0.0 {
            let angle = if self.intensity > 0.0 {
                self.rng.gen_range(-self.intensity..=self.intensity)
            } else {
                0.0
            };
            scene.camera_mut().rotate_around(angle, self.pivot);
            self.remaining -= delta;
        } else {
            scene.camera_mut().rotate(0.0);
            self.intensity = 0.0;
        }
    }

    fn name(&self) -> &'static str {
        "ScreenShaker"
    }
}
