use glam::Vec2;
use lagom_core::Transform;

const MIN_ZOOM: f32 = 0.01;

/// 2D view over the world root. The GUI root is never affected.
#[derive(Debug, Clone, PartialEq)]
pub struct Camera {
    position: Vec2,
    zoom: f32,
    rotation: f32,
    pivot: Vec2,
    offset: Vec2,
}

impl Default for Camera {
    fn default() -> Self {
        Self {
            position: Vec2::ZERO,
            zoom: 1.0,
            rotation: 0.0,
            pivot: Vec2::ZERO,
            offset: Vec2::ZERO,
        }
    }
}

impl Camera {
    pub fn new() -> Self {
        Self::default()
    }

    /// World point shown at the view offset.
    pub fn position(&self) -> Vec2 {
        self.position
    }

    pub fn move_to(&mut self, position: Vec2) {
        self.position = position;
    }

    pub fn translate(&mut self, delta: Vec2) {
        self.position += delta;
    }

    /// Ease toward `target`. `t` of 1.0 snaps.
    pub fn follow(&mut self, target: Vec2, t: f32) {
        self.position = self.position.lerp(target, t.clamp(0.0, 1.0));
    }

    pub fn zoom(&self) -> f32 {
        self.zoom
    }

    pub fn set_zoom(&mut self, zoom: f32) {
        self.zoom = zoom.max(MIN_ZOOM);
    }

    pub fn rotation(&self) -> f32 {
        self.rotation
    }

    /// Rotate the view about the current pivot. Absolute, in radians.
    pub fn rotate(&mut self, angle: f32) {
        self.rotation = angle;
    }

    /// Rotate the view about a screen-space pivot.
    pub fn rotate_around(&mut self, angle: f32, pivot: Vec2) {
        self.rotation = angle;
        self.pivot = pivot;
    }

    pub fn pivot(&self) -> Vec2 {
        self.pivot
    }

    /// Screen-space point the camera position maps to, e.g. the view center.
    pub fn offset(&self) -> Vec2 {
        self.offset
    }

    pub fn set_offset(&mut self, offset: Vec2) {
        self.offset = offset;
    }

    /// Transform applied to the world root node.
    pub fn view_transform(&self) -> Transform {
        let translation = Vec2::from_angle(self.rotation)
            .rotate(self.offset - self.position * self.zoom - self.pivot)
            + self.pivot;
        Transform {
            position: translation,
            rotation: self.rotation,
            scale: Vec2::splat(self.zoom),
            depth: 0,
        }
    }

    pub fn world_to_view(&self, point: Vec2) -> Vec2 {
        self.view_transform().apply(point)
    }

    pub fn view_to_world(&self, point: Vec2) -> Vec2 {
        self.view_transform()
            .matrix()
            .inverse()
            .transform_point2(point)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::f32::consts::FRAC_PI_2;

    fn close(a: Vec2, b: Vec2) -> bool {
        (a - b).length() < 1e-4
    }

    #[test]
    fn default_is_identity() {
        let camera = Camera::new();
        assert_eq!(camera.view_transform(), Transform::default());
        assert_eq!(camera.world_to_view(Vec2::new(3.0, 4.0)), Vec2::new(3.0, 4.0));
    }

    #[test]
    fn position_maps_to_offset() {
        let mut camera = Camera::new();
        camera.move_to(Vec2::new(10.0, 5.0));
        camera.set_offset(Vec2::new(400.0, 300.0));
        assert!(close(camera.world_to_view(Vec2::new(10.0, 5.0)), Vec2::new(400.0, 300.0)));
        camera.translate(Vec2::new(1.0, 0.0));
        assert!(close(camera.world_to_view(Vec2::new(11.0, 5.0)), Vec2::new(400.0, 300.0)));
    }

    #[test]
    fn zoom_scales_around_position() {
        let mut camera = Camera::new();
        camera.move_to(Vec2::new(10.0, 0.0));
        camera.set_zoom(2.0);
        assert!(close(camera.world_to_view(Vec2::new(11.0, 0.0)), Vec2::new(2.0, 0.0)));
        camera.set_zoom(-1.0);
        assert_eq!(camera.zoom(), MIN_ZOOM);
    }

    #[test]
    fn rotation_about_pivot() {
        let mut camera = Camera::new();
        camera.rotate_around(FRAC_PI_2, Vec2::new(1.0, 0.0));
        assert!(close(camera.world_to_view(Vec2::new(1.0, 0.0)), Vec2::new(1.0, 0.0)));
        assert!(close(camera.world_to_view(Vec2::new(2.0, 0.0)), Vec2::new(1.0, 1.0)));
    }

    #[test]
    fn view_to_world_inverts() {
        let mut camera = Camera::new();
        camera.move_to(Vec2::new(-3.0, 7.0));
        camera.set_zoom(1.5);
        camera.rotate(0.3);
        camera.set_offset(Vec2::new(100.0, 50.0));
        let p = Vec2::new(12.0, -4.0);
        assert!(close(camera.view_to_world(camera.world_to_view(p)), p));
    }

    #[test]
    fn follow_eases_toward_target() {
        let mut camera = Camera::new();
        camera.follow(Vec2::new(10.0, 0.0), 0.5);
        assert!(close(camera.position(), Vec2::new(5.0, 0.0)));
        camera.follow(Vec2::new(10.0, 0.0), 2.0);
        assert!(close(camera.position(), Vec2::new(10.0, 0.0)));
    }
}
