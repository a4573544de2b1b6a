//! Camera that eases toward a tagged entity

use glam::Vec2;
use lagom_ecs::{Component, EntityId, Matched, Scene, System};

/// Tag for the entity [`FollowCamera`] tracks.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FollowMe;

impl Component for FollowMe {}

/// Soft-follows every [`FollowMe`] entity on the fixed pass.
///
/// With several tagged entities the camera chases each in turn, so the last
/// one indexed wins.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowCamera {
    view_size: Vec2,
    centre: bool,
    offset: Vec2,
    lerp_speed: f32,
}

impl FollowCamera {
    /// Keeps the target at the middle of a `view_size` view.
    pub fn new(view_size: Vec2) -> Self {
        Self {
            view_size,
            centre: true,
            offset: Vec2::ZERO,
            lerp_speed: 0.1,
        }
    }

    /// `false` puts the target at the view origin instead.
    pub fn centred(mut self, centre: bool) -> Self {
        self.centre = centre;
        self
    }

    /// World-space nudge added to the target position.
    pub fn with_offset(mut self, offset: Vec2) -> Self {
        self.offset = offset;
        self
    }

    /// Fraction of the remaining distance closed per second.
    pub fn with_lerp_speed(mut self, lerp_speed: f32) -> Self {
        self.lerp_speed = lerp_speed.max(0.0);
        self
    }

    pub fn lerp_speed(&self) -> f32 {
        self.lerp_speed
    }

    pub fn offset(&self) -> Vec2 {
        self.offset
    }
}

impl System for FollowCamera {
    type Components = (FollowMe,);

    fn on_added(&mut self, scene: &mut Scene) {
        if self.centre {
            scene.camera_mut().set_offset(self.view_size / 2.0);
        }
    }

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
        _matched: Matched<'_, Self::Components>,
    ) {
        let Some(position) = scene.transform(entity).map(|t| t.position) else {
            return;
        };
        let target = position + self.offset;
        scene.camera_mut().follow(target, self.lerp_speed * delta);
    }

    fn name(&self) -> &'static str {
        "FollowCamera"
    }
}
