//! Per-frame input snapshots. Each frame's state is derived from the previous snapshot
//! and the raw input gathered since, with no global state.

use std::collections::HashSet;

use bitflags::bitflags;
use glam::Vec2;
use winit::event::{ElementState, MouseButton, MouseScrollDelta, WindowEvent};
use winit::keyboard::{KeyCode, PhysicalKey};

/// Lines to pixels for wheels that report line deltas.
const PIXELS_PER_LINE: f32 = 20.0;

bitflags! {
    #[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Default)]
    pub struct MouseButtons: u8 {
        const LEFT   = 1 << 0;
        const RIGHT  = 1 << 1;
        const MIDDLE = 1 << 2;
    }
}

impl MouseButtons {
    fn from_winit(button: MouseButton) -> Self {
        match button {
            MouseButton::Left => MouseButtons::LEFT,
            MouseButton::Right => MouseButtons::RIGHT,
            MouseButton::Middle => MouseButtons::MIDDLE,
            _ => MouseButtons::empty(),
        }
    }
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RawKeyboard {
    pub down: HashSet<KeyCode>,
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct RawMouse {
    /// `None` until the cursor has entered the window.
    pub position: Option<Vec2>,
    pub buttons: MouseButtons,
    /// Scroll accumulated since the last snapshot.
    pub scroll: f32,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct KeyboardState {
    down: HashSet<KeyCode>,
    pressed: HashSet<KeyCode>,
    released: HashSet<KeyCode>,
}

impl KeyboardState {
    pub fn next(prev: &KeyboardState, raw: &RawKeyboard) -> Self {
        Self {
            down: raw.down.clone(),
            pressed: raw.down.difference(&prev.down).copied().collect(),
            released: prev.down.difference(&raw.down).copied().collect(),
        }
    }

    pub fn is_down(&self, key: KeyCode) -> bool {
        self.down.contains(&key)
    }

    pub fn just_pressed(&self, key: KeyCode) -> bool {
        self.pressed.contains(&key)
    }

    pub fn just_released(&self, key: KeyCode) -> bool {
        self.released.contains(&key)
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct MouseState {
    pub position: Option<Vec2>,
    /// Cursor movement since the previous snapshot, in pixels.
    pub delta: Vec2,
    pub scroll: f32,
    pub buttons: MouseButtons,
    pub pressed: MouseButtons,
    pub released: MouseButtons,
}

impl MouseState {
    pub fn next(prev: &MouseState, raw: &RawMouse) -> Self {
        let delta = match (prev.position, raw.position) {
            (Some(before), Some(now)) => now - before,
            _ => Vec2::ZERO,
        };
        Self {
            position: raw.position,
            delta,
            scroll: raw.scroll,
            buttons: raw.buttons,
            pressed: raw.buttons - prev.buttons,
            released: prev.buttons - raw.buttons,
        }
    }

    pub fn is_down(&self, buttons: MouseButtons) -> bool {
        self.buttons.contains(buttons)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct InputState {
    pub keyboard: KeyboardState,
    pub mouse: MouseState,
}

impl InputState {
    pub fn next(prev: &InputState, keyboard: &RawKeyboard, mouse: &RawMouse) -> Self {
        Self {
            keyboard: KeyboardState::next(&prev.keyboard, keyboard),
            mouse: MouseState::next(&prev.mouse, mouse),
        }
    }
}

/// Gathers raw input from window events between frames.
#[derive(Debug, Default)]
pub struct InputCollector {
    keyboard: RawKeyboard,
    mouse: RawMouse,
    state: InputState,
}

impl InputCollector {
    pub fn handle_window_event(&mut self, event: &WindowEvent) {
        match event {
            WindowEvent::KeyboardInput { event, .. } => {
                if let PhysicalKey::Code(code) = event.physical_key {
                    match event.state {
                        ElementState::Pressed => self.keyboard.down.insert(code),
                        ElementState::Released => self.keyboard.down.remove(&code),
                    };
                }
            }
            WindowEvent::CursorMoved { position, .. } => {
                self.mouse.position = Some(Vec2::new(position.x as f32, position.y as f32));
            }
            WindowEvent::CursorLeft { .. } => {
                self.mouse.position = None;
            }
            WindowEvent::MouseInput { state, button, .. } => {
                let button = MouseButtons::from_winit(*button);
                self.mouse.buttons.set(button, *state == ElementState::Pressed);
            }
            WindowEvent::MouseWheel { delta, .. } => {
                self.mouse.scroll += match delta {
                    MouseScrollDelta::LineDelta(_, y) => *y * PIXELS_PER_LINE,
                    MouseScrollDelta::PixelDelta(p) => p.y as f32,
                };
            }
            WindowEvent::Focused(false) => {
                self.keyboard.down.clear();
                self.mouse.buttons = MouseButtons::empty();
            }
            _ => {}
        }
    }

    /// Produces this frame's snapshot and resets per-frame accumulators.
    pub fn snapshot(&mut self) -> &InputState {
        self.state = InputState::next(&self.state, &self.keyboard, &self.mouse);
        self.mouse.scroll = 0.0;
        &self.state
    }

    pub fn state(&self) -> &InputState {
        &self.state
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn key_press_is_reported_once() {
        let mut raw = RawKeyboard::default();
        raw.down.insert(KeyCode::KeyW);
        let first = KeyboardState::next(&KeyboardState::default(), &raw);
        assert!(first.just_pressed(KeyCode::KeyW));
        let second = KeyboardState::next(&first, &raw);
        assert!(second.is_down(KeyCode::KeyW));
        assert!(!second.just_pressed(KeyCode::KeyW));
    }

    #[test]
    fn mouse_delta_needs_two_positions() {
        let raw = RawMouse {
            position: Some(Vec2::new(10.0, 10.0)),
            ..RawMouse::default()
        };
        let first = MouseState::next(&MouseState::default(), &raw);
        assert_eq!(first.delta, Vec2::ZERO);
    }
}
