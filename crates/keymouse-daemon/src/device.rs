//! Keyboard discovery and grabbing

use std::path::PathBuf;

use anyhow::{Context, Result};
use evdev::{Device, EventType, Key};

/// A physical keyboard opened for reading
pub struct Keyboard {
    pub path: PathBuf,
    pub name: String,
    pub device: Device,
}

/// Open every keyboard under /dev/input
pub fn open_keyboards() -> Result<Vec<Keyboard>> {
    let mut keyboards = Vec::new();

    for entry in std::fs::read_dir("/dev/input").context("Failed to read /dev/input")? {
        let path = entry?.path();

        // Only look at event* devices
        if !path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with("event"))
        {
            continue;
        }

        match Device::open(&path) {
            Ok(device) if is_keyboard(&device) => {
                let name = device.name().unwrap_or("Unknown").to_string();
                keyboards.push(Keyboard { path, name, device });
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!("Could not open {}: {}", path.display(), e);
            }
        }
    }

    keyboards.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(keyboards)
}

/// Check if a device is a keyboard
pub fn is_keyboard(device: &Device) -> bool {
    device.supported_events().contains(EventType::KEY)
        && device
            .supported_keys()
            .is_some_and(|keys| keys.contains(Key::KEY_A))
}

/// Grab a keyboard for exclusive access
pub fn grab(keyboard: &mut Keyboard) -> Result<()> {
    keyboard
        .device
        .grab()
        .with_context(|| format!("Failed to grab {} ({})", keyboard.name, keyboard.path.display()))
}
