//! Virtual device injection via uinput
//!
//! Key events that are not eaten are re-emitted through this device, together
//! with the mouse buttons pressed by commands.

use anyhow::Result;
use evdev::{uinput::VirtualDeviceBuilder, AttributeSet, EventType, InputEvent, Key, RelativeAxisType};
use keymouse_config::Button;

/// A virtual keyboard and mouse for injecting events
pub struct VirtualDevice {
    device: evdev::uinput::VirtualDevice,
}

impl VirtualDevice {
    pub fn new(name: &str) -> Result<Self> {
        let mut keys = AttributeSet::<Key>::new();

        // Add all standard keys
        for code in 0..256u16 {
            keys.insert(Key::new(code));
        }
        for button in Button::ALL {
            keys.insert(button_key(button));
        }

        // Relative axes make the device a pointer for the compositor.
        let mut axes = AttributeSet::<RelativeAxisType>::new();
        axes.insert(RelativeAxisType::REL_X);
        axes.insert(RelativeAxisType::REL_Y);
        axes.insert(RelativeAxisType::REL_WHEEL);

        let device = VirtualDeviceBuilder::new()?
            .name(name)
            .with_keys(&keys)?
            .with_relative_axes(&axes)?
            .build()?;

        Ok(Self { device })
    }

    /// Emit events, followed by a synchronization report
    pub fn emit(&mut self, events: &[InputEvent]) -> Result<()> {
        self.device.emit(events)?;
        Ok(())
    }

    pub fn press_button(&mut self, button: Button) -> Result<()> {
        self.emit(&[key_event(button_key(button), 1)])
    }

    pub fn release_button(&mut self, button: Button) -> Result<()> {
        self.emit(&[key_event(button_key(button), 0)])
    }
}

pub fn button_key(button: Button) -> Key {
    match button {
        Button::Left => Key::BTN_LEFT,
        Button::Middle => Key::BTN_MIDDLE,
        Button::Right => Key::BTN_RIGHT,
    }
}

fn key_event(key: Key, value: i32) -> InputEvent {
    InputEvent::new(EventType::KEY, key.code(), value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_button_keys() {
        assert_eq!(button_key(Button::Left), Key::BTN_LEFT);
        assert_eq!(button_key(Button::Middle), Key::BTN_MIDDLE);
        assert_eq!(button_key(Button::Right), Key::BTN_RIGHT);
    }

    #[test]
    fn test_key_event() {
        let event = key_event(Key::BTN_RIGHT, 1);
        assert_eq!(event.event_type(), EventType::KEY);
        assert_eq!(event.code(), Key::BTN_RIGHT.code());
        assert_eq!(event.value(), 1);
    }
}
