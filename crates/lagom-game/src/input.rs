//! Keyboard and mouse snapshots with edge-triggered button states
//!
//! The host feeds raw winit events in; the game loop publishes a clone of each
//! snapshot into the scene before the update pass and advances the edge
//! states after it.

use std::collections::HashMap;
use std::hash::Hash;

use glam::Vec2;
use winit::event::{ElementState, MouseButton, MouseScrollDelta};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Per-frame state of a key or button
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ButtonState {
    /// Not held
    #[default]
    Up,
    /// Held since an earlier frame
    Down,
    /// Went down this frame
    Pressed,
    /// Went up this frame
    Released,
}

impl ButtonState {
    /// Held, whether or not it went down this frame
    pub fn is_down(&self) -> bool {
        matches!(self, ButtonState::Down | ButtonState::Pressed)
    }
}

/// Edge tracking shared by keys and mouse buttons.
#[derive(Debug, Clone)]
struct ButtonMap<B: Eq + Hash> {
    states: HashMap<B, ButtonState>,
}

impl<B: Eq + Hash + Copy> ButtonMap<B> {
    fn new() -> Self {
        Self {
            states: HashMap::new(),
        }
    }

    fn state(&self, button: B) -> ButtonState {
        self.states.get(&button).copied().unwrap_or_default()
    }

    fn press(&mut self, button: B) {
        let next = match self.state(button) {
            ButtonState::Up | ButtonState::Released => ButtonState::Pressed,
            // Key repeat while held
            ButtonState::Down | ButtonState::Pressed => ButtonState::Down,
        };
        self.states.insert(button, next);
    }

    fn release(&mut self, button: B) {
        if self.state(button).is_down() {
            self.states.insert(button, ButtonState::Released);
        } else {
            self.states.remove(&button);
        }
    }

    /// Pressed becomes Down, Released becomes Up.
    fn advance(&mut self) {
        self.states.retain(|_, state| *state != ButtonState::Released);
        for state in self.states.values_mut() {
            if *state == ButtonState::Pressed {
                *state = ButtonState::Down;
            }
        }
    }

    fn clear(&mut self) {
        self.states.clear();
    }
}

/// Keyboard snapshot keyed by physical key code
#[derive(Debug, Clone)]
pub struct Keyboard {
    keys: ButtonMap<KeyCode>,
}

impl Default for Keyboard {
    fn default() -> Self {
        Self::new()
    }
}

impl Keyboard {
    pub fn new() -> Self {
        Self {
            keys: ButtonMap::new(),
        }
    }

    /// Handle a keyboard event
    pub fn handle_keyboard(&mut self, physical_key: PhysicalKey, element_state: ElementState) {
        if let PhysicalKey::Code(key_code) = physical_key {
            match element_state {
                ElementState::Pressed => self.key_down(key_code),
                ElementState::Released => self.key_up(key_code),
            }
        }
    }

    pub fn key_down(&mut self, key: KeyCode) {
        self.keys.press(key);
    }

    pub fn key_up(&mut self, key: KeyCode) {
        self.keys.release(key);
    }

    /// Forget every key, e.g. when the window loses focus
    pub fn clear(&mut self) {
        self.keys.clear();
    }

    /// Advance edge states (call after the frame's logic)
    pub fn update(&mut self) {
        self.keys.advance();
    }

    pub fn state(&self, key: KeyCode) -> ButtonState {
        self.keys.state(key)
    }

    /// Any of `keys` went down this frame
    pub fn is_key_pressed(&self, keys: &[KeyCode]) -> bool {
        keys.iter().any(|k| self.state(*k) == ButtonState::Pressed)
    }

    /// Any of `keys` went up this frame
    pub fn is_key_released(&self, keys: &[KeyCode]) -> bool {
        keys.iter().any(|k| self.state(*k) == ButtonState::Released)
    }

    /// Any of `keys` is held
    pub fn is_key_down(&self, keys: &[KeyCode]) -> bool {
        keys.iter().any(|k| self.state(*k).is_down())
    }
}

/// Mouse snapshot: cursor position, wheel and buttons
#[derive(Debug, Clone)]
pub struct Mouse {
    position: Vec2,
    scroll_delta: f32,
    buttons: ButtonMap<MouseButton>,
}

impl Default for Mouse {
    fn default() -> Self {
        Self::new()
    }
}

impl Mouse {
    pub fn new() -> Self {
        Self {
            position: Vec2::ZERO,
            scroll_delta: 0.0,
            buttons: ButtonMap::new(),
        }
    }

    /// Handle a mouse button event
    pub fn handle_mouse_button(&mut self, button: MouseButton, state: ElementState) {
        match state {
            ElementState::Pressed => self.button_down(button),
            ElementState::Released => self.button_up(button),
        }
    }

    pub fn button_down(&mut self, button: MouseButton) {
        self.buttons.press(button);
    }

    pub fn button_up(&mut self, button: MouseButton) {
        self.buttons.release(button);
    }

    /// Cursor position in window pixels
    pub fn handle_cursor_moved(&mut self, position: Vec2) {
        self.position = position;
    }

    /// Handle scroll wheel
    pub fn handle_scroll(&mut self, delta: MouseScrollDelta) {
        self.scroll_delta += match delta {
            MouseScrollDelta::LineDelta(_, y) => y,
            MouseScrollDelta::PixelDelta(pos) => pos.y as f32 / 120.0,
        };
    }

    /// Advance edge states and reset the wheel (call after the frame's logic)
    pub fn update(&mut self) {
        self.buttons.advance();
        self.scroll_delta = 0.0;
    }

    pub fn position(&self) -> Vec2 {
        self.position
    }

    /// Wheel movement this frame, in lines
    pub fn scroll_delta(&self) -> f32 {
        self.scroll_delta
    }

    pub fn state(&self, button: MouseButton) -> ButtonState {
        self.buttons.state(button)
    }

    pub fn is_button_pressed(&self, button: MouseButton) -> bool {
        self.state(button) == ButtonState::Pressed
    }

    pub fn is_button_down(&self, button: MouseButton) -> bool {
        self.state(button).is_down()
    }

    pub fn is_button_released(&self, button: MouseButton) -> bool {
        self.state(button) == ButtonState::Released
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use winit::dpi::PhysicalPosition;

    #[test]
    fn key_edges_advance_each_frame() {
        let mut keyboard = Keyboard::new();
        keyboard.handle_keyboard(PhysicalKey::Code(KeyCode::Space), ElementState::Pressed);
        assert!(keyboard.is_key_pressed(&[KeyCode::KeyA, KeyCode::Space]));
        assert!(keyboard.is_key_down(&[KeyCode::Space]));

        keyboard.update();
        assert_eq!(keyboard.state(KeyCode::Space), ButtonState::Down);
        assert!(!keyboard.is_key_pressed(&[KeyCode::Space]));

        keyboard.key_up(KeyCode::Space);
        assert!(keyboard.is_key_released(&[KeyCode::Space]));
        keyboard.update();
        assert_eq!(keyboard.state(KeyCode::Space), ButtonState::Up);
    }

    #[test]
    fn repeat_while_pressed_becomes_down() {
        let mut keyboard = Keyboard::new();
        keyboard.key_down(KeyCode::KeyW);
        keyboard.key_down(KeyCode::KeyW);
        assert_eq!(keyboard.state(KeyCode::KeyW), ButtonState::Down);
    }

    #[test]
    fn press_after_release_in_same_frame() {
        let mut keyboard = Keyboard::new();
        keyboard.key_down(KeyCode::KeyX);
        keyboard.key_up(KeyCode::KeyX);
        keyboard.key_down(KeyCode::KeyX);
        assert!(keyboard.is_key_pressed(&[KeyCode::KeyX]));
    }

    #[test]
    fn release_of_unknown_key_stays_up() {
        let mut keyboard = Keyboard::new();
        keyboard.key_up(KeyCode::KeyQ);
        assert_eq!(keyboard.state(KeyCode::KeyQ), ButtonState::Up);
        keyboard.handle_keyboard(
            PhysicalKey::Unidentified(winit::keyboard::NativeKeyCode::Unidentified),
            ElementState::Pressed,
        );
        assert!(!keyboard.is_key_down(&[KeyCode::KeyQ]));
    }

    #[test]
    fn mouse_buttons_and_wheel() {
        let mut mouse = Mouse::new();
        mouse.handle_mouse_button(MouseButton::Left, ElementState::Pressed);
        mouse.handle_cursor_moved(Vec2::new(12.0, 34.0));
        mouse.handle_scroll(MouseScrollDelta::LineDelta(0.0, 1.0));
        mouse.handle_scroll(MouseScrollDelta::PixelDelta(PhysicalPosition::new(0.0, 240.0)));

        assert!(mouse.is_button_pressed(MouseButton::Left));
        assert_eq!(mouse.position(), Vec2::new(12.0, 34.0));
        assert_eq!(mouse.scroll_delta(), 3.0);

        mouse.update();
        assert!(mouse.is_button_down(MouseButton::Left));
        assert!(!mouse.is_button_pressed(MouseButton::Left));
        assert_eq!(mouse.scroll_delta(), 0.0);

        mouse.handle_mouse_button(MouseButton::Left, ElementState::Released);
        assert!(mouse.is_button_released(MouseButton::Left));
    }
}
