//! Key names used by the combo grammar
//!
//! Any evdev key name is accepted with or without its `KEY_` prefix
//! (`a`, `leftctrl`, `KEY_KP1`), case-insensitively. A handful of common
//! aliases and the three mouse buttons are recognized on top of that.

use std::str::FromStr;

pub use evdev::Key;

/// Names that do not map to an evdev name by simply adding `KEY_`.
const ALIASES: &[(&str, Key)] = &[
    ("ESCAPE", Key::KEY_ESC),
    ("RETURN", Key::KEY_ENTER),
    ("CAPS", Key::KEY_CAPSLOCK),
    ("CAPS_LOCK", Key::KEY_CAPSLOCK),
    ("CTRL", Key::KEY_LEFTCTRL),
    ("LCTRL", Key::KEY_LEFTCTRL),
    ("RCTRL", Key::KEY_RIGHTCTRL),
    ("SHIFT", Key::KEY_LEFTSHIFT),
    ("LSHIFT", Key::KEY_LEFTSHIFT),
    ("RSHIFT", Key::KEY_RIGHTSHIFT),
    ("ALT", Key::KEY_LEFTALT),
    ("LALT", Key::KEY_LEFTALT),
    ("RALT", Key::KEY_RIGHTALT),
    ("SUPER", Key::KEY_LEFTMETA),
    ("META", Key::KEY_LEFTMETA),
    ("WIN", Key::KEY_LEFTMETA),
    ("LMETA", Key::KEY_LEFTMETA),
    ("RMETA", Key::KEY_RIGHTMETA),
    ("EQUALS", Key::KEY_EQUAL),
    ("PERIOD", Key::KEY_DOT),
    ("LBRACE", Key::KEY_LEFTBRACE),
    ("RBRACE", Key::KEY_RIGHTBRACE),
    ("PGUP", Key::KEY_PAGEUP),
    ("PGDN", Key::KEY_PAGEDOWN),
    ("PGDOWN", Key::KEY_PAGEDOWN),
    ("INS", Key::KEY_INSERT),
    ("DEL", Key::KEY_DELETE),
    ("UPARROW", Key::KEY_UP),
    ("DOWNARROW", Key::KEY_DOWN),
    ("LEFTARROW", Key::KEY_LEFT),
    ("RIGHTARROW", Key::KEY_RIGHT),
    ("LEFTBUTTON", Key::BTN_LEFT),
    ("MIDDLEBUTTON", Key::BTN_MIDDLE),
    ("RIGHTBUTTON", Key::BTN_RIGHT),
];

/// Resolve a key name to an evdev key.
pub fn parse_key(name: &str) -> Option<Key> {
    let upper = name.trim().to_uppercase();
    if upper.is_empty() {
        return None;
    }

    if let Some((_, key)) = ALIASES.iter().find(|(alias, _)| *alias == upper) {
        return Some(*key);
    }

    if let Some(numpad) = upper.strip_prefix("NUMPAD") {
        return Key::from_str(&format!("KEY_KP{}", numpad)).ok();
    }

    if upper.starts_with("KEY_") || upper.starts_with("BTN_") {
        return Key::from_str(&upper).ok();
    }

    Key::from_str(&format!("KEY_{}", upper)).ok()
}

/// Canonical, lowercase name of a key, accepted back by [`parse_key`].
pub fn key_name(key: Key) -> String {
    match key {
        Key::BTN_LEFT => return "leftbutton".to_string(),
        Key::BTN_MIDDLE => return "middlebutton".to_string(),
        Key::BTN_RIGHT => return "rightbutton".to_string(),
        _ => {}
    }
    let debug = format!("{:?}", key);
    match debug.strip_prefix("KEY_") {
        Some(stripped) => stripped.to_lowercase(),
        None => debug.to_lowercase(),
    }
}
