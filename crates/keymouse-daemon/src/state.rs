//! Mouse and keyboard state shared by the engine

use std::collections::{BTreeSet, HashMap};

use keymouse_config::{Button, Command, Direction, Key};

use crate::combo_watcher::PressKeyEventProcessing;

/// What the virtual mouse is currently doing, as driven by commands.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct MouseState {
    moving: BTreeSet<Direction>,
    wheeling: BTreeSet<Direction>,
    pressed_buttons: BTreeSet<Button>,
}

impl MouseState {
    pub fn moving(&self) -> bool {
        !self.moving.is_empty()
    }

    pub fn wheeling(&self) -> bool {
        !self.wheeling.is_empty()
    }

    pub fn pressing(&self) -> bool {
        !self.pressed_buttons.is_empty()
    }

    pub fn is_idle(&self) -> bool {
        !self.moving() && !self.wheeling() && !self.pressing()
    }

    /// Apply the effect of a command. Returns whether the state changed.
    pub fn apply(&mut self, command: &Command) -> bool {
        match command {
            Command::StartMove(direction) => self.moving.insert(*direction),
            Command::StopMove(direction) => self.moving.remove(direction),
            Command::StartWheel(direction) => self.wheeling.insert(*direction),
            Command::StopWheel(direction) => self.wheeling.remove(direction),
            Command::PressButton(button) => self.pressed_buttons.insert(*button),
            Command::ReleaseButton(button) => self.pressed_buttons.remove(button),
            Command::ChangeMode(_) | Command::AttachMove(_) => false,
        }
    }
}

/// Keys currently held on the physical keyboards, with the verdict of their press.
#[derive(Debug, Clone, Default)]
pub struct KeyboardState {
    pressed_keys: HashMap<Key, PressKeyEventProcessing>,
}

impl KeyboardState {
    pub fn press(&mut self, key: Key, processing: PressKeyEventProcessing) {
        self.pressed_keys.insert(key, processing);
    }

    /// Forget a key, returning the verdict of its press if it was held.
    pub fn release(&mut self, key: Key) -> Option<PressKeyEventProcessing> {
        self.pressed_keys.remove(&key)
    }

    pub fn clear(&mut self) {
        self.pressed_keys.clear();
    }

    pub fn processing(&self, key: Key) -> Option<PressKeyEventProcessing> {
        self.pressed_keys.get(&key).copied()
    }

    /// True when at least one key is held and none of them is part of a combo.
    pub fn pressing_unhandled_keys_only(&self) -> bool {
        !self.pressed_keys.is_empty()
            && self
                .pressed_keys
                .values()
                .all(|processing| !processing.part_of_combo)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HANDLED: PressKeyEventProcessing = PressKeyEventProcessing {
        part_of_combo: true,
        must_be_eaten: true,
    };
    const UNHANDLED: PressKeyEventProcessing = PressKeyEventProcessing {
        part_of_combo: false,
        must_be_eaten: false,
    };

    #[test]
    fn test_mouse_state_tracks_commands() {
        let mut mouse = MouseState::default();
        assert!(mouse.is_idle());

        assert!(mouse.apply(&Command::StartMove(Direction::Up)));
        assert!(!mouse.apply(&Command::StartMove(Direction::Up)));
        assert!(mouse.moving());

        mouse.apply(&Command::PressButton(Button::Left));
        mouse.apply(&Command::StopMove(Direction::Up));
        assert!(!mouse.moving());
        assert!(mouse.pressing());

        mouse.apply(&Command::ReleaseButton(Button::Left));
        mouse.apply(&Command::StartWheel(Direction::Down));
        assert!(mouse.wheeling());
        mouse.apply(&Command::StopWheel(Direction::Down));
        assert!(mouse.is_idle());

        assert!(!mouse.apply(&Command::ChangeMode("idle-mode".to_string())));
        assert!(!mouse.apply(&Command::AttachMove(Direction::Left)));
    }

    #[test]
    fn test_pressing_unhandled_keys_only() {
        let mut keyboard = KeyboardState::default();
        assert!(!keyboard.pressing_unhandled_keys_only());

        keyboard.press(Key::KEY_A, UNHANDLED);
        assert!(keyboard.pressing_unhandled_keys_only());

        keyboard.press(Key::KEY_B, HANDLED);
        assert!(!keyboard.pressing_unhandled_keys_only());

        assert_eq!(keyboard.release(Key::KEY_B), Some(HANDLED));
        assert!(keyboard.pressing_unhandled_keys_only());
        assert_eq!(keyboard.release(Key::KEY_B), None);

        keyboard.release(Key::KEY_A);
        assert_eq!(keyboard.processing(Key::KEY_A), None);
        assert!(!keyboard.pressing_unhandled_keys_only());
    }
}
