use lagom_ecs::{EntityId, Matched, Scene, System};
use winit::keyboard::KeyCode;

use crate::input::Keyboard;

const DEFAULT_KEYS: [KeyCode; 7] = [
    KeyCode::Space,
    KeyCode::KeyA,
    KeyCode::KeyD,
    KeyCode::KeyW,
    KeyCode::KeyS,
    KeyCode::KeyZ,
    KeyCode::KeyX,
];

/// Runs an action on the frame any of its keys goes down.
///
/// Reads the [`Keyboard`] snapshot the game loop publishes into the scene
/// resources; without one it never fires.
pub struct ActionOnPress {
    keys: Vec<KeyCode>,
    action: Box<dyn FnMut(&mut Scene)>,
}

impl ActionOnPress {
    /// Fires on Space, WASD, Z or X.
    pub fn new(action: impl FnMut(&mut Scene) + 'static) -> Self {
        Self::with_keys(action, DEFAULT_KEYS)
    }

    pub fn with_keys(
        action: impl FnMut(&mut Scene) + 'static,
        keys: impl IntoIterator<Item = KeyCode>,
    ) -> Self {
        Self {
            keys: keys.into_iter().collect(),
            action: Box::new(action),
        }
    }

    pub fn keys(&self) -> &[KeyCode] {
        &self.keys
    }
}

impl System for ActionOnPress {
    type Components = ();

    fn before_update(&mut self, scene: &mut Scene, _delta: f32) {
        let pressed = scene
            .resource::<Keyboard>()
            .is_some_and(|keyboard| keyboard.is_key_pressed(&self.keys));
        if pressed {
            (self.action)(scene);
        }
    }

    fn run_on_entities(
        &mut self,
        _scene: &mut Scene,
        _delta: f32,
        _entity: EntityId,
        _matched: Matched<'_, ()>,
    ) {
    }

    fn name(&self) -> &'static str {
        "ActionOnPress"
    }
}
