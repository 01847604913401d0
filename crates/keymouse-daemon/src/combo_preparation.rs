//! Buffer of recent key events that may still grow into a complete combo

use std::fmt;
use std::time::Instant;

use keymouse_config::keys::key_name;
use keymouse_config::{ComboMove, Key};

/// A timestamped key press or release.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct KeyEvent {
    pub key: Key,
    pub is_press: bool,
    pub time: Instant,
}

impl KeyEvent {
    pub fn press(key: Key, time: Instant) -> Self {
        Self {
            key,
            is_press: true,
            time,
        }
    }

    pub fn release(key: Key, time: Instant) -> Self {
        Self {
            key,
            is_press: false,
            time,
        }
    }

    pub fn is_release(&self) -> bool {
        !self.is_press
    }

    fn matches(&self, combo_move: &ComboMove) -> bool {
        self.key == combo_move.key() && self.is_press == combo_move.is_press()
    }
}

impl fmt::Display for KeyEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = if self.is_press { '+' } else { '-' };
        write!(f, "{}{}", prefix, key_name(self.key))
    }
}

#[derive(Debug, Clone, Default)]
pub struct ComboPreparation {
    events: Vec<KeyEvent>,
}

impl ComboPreparation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn last_event(&self) -> Option<&KeyEvent> {
        self.events.last()
    }

    pub fn push(&mut self, event: KeyEvent) {
        self.events.push(event);
    }

    pub fn clear(&mut self) {
        self.events.clear();
    }

    /// Number of leading moves of `moves` matched by the most recent events.
    ///
    /// This is the largest `k` such that the last `k` events match the first
    /// `k` moves, comparing key and press/release only.
    pub fn matching_move_count(&self, moves: &[ComboMove]) -> usize {
        let longest = self.events.len().min(moves.len());
        (1..=longest)
            .rev()
            .find(|&count| {
                let recent = &self.events[self.events.len() - count..];
                recent
                    .iter()
                    .zip(&moves[..count])
                    .all(|(event, combo_move)| event.matches(combo_move))
            })
            .unwrap_or(0)
    }
}

impl fmt::Display for ComboPreparation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let events: Vec<String> = self.events.iter().map(ToString::to_string).collect();
        write!(f, "[{}]", events.join(" "))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use keymouse_config::combo::parse_combo;
    use keymouse_config::ComboMoveDuration;

    fn moves(combo: &str) -> Vec<ComboMove> {
        parse_combo(combo, ComboMoveDuration::default())
            .unwrap()
            .sequence()
            .to_vec()
    }

    fn preparation(events: &[(Key, bool)]) -> ComboPreparation {
        let now = Instant::now();
        let mut preparation = ComboPreparation::new();
        for &(key, is_press) in events {
            preparation.push(KeyEvent { key, is_press, time: now });
        }
        preparation
    }

    #[test]
    fn test_empty_preparation_matches_nothing() {
        assert_eq!(ComboPreparation::new().matching_move_count(&moves("+a")), 0);
    }

    #[test]
    fn test_partial_and_full_match() {
        let sequence = moves("+a -a +a");
        let mut prep = preparation(&[(Key::KEY_A, true)]);
        assert_eq!(prep.matching_move_count(&sequence), 1);

        prep.push(KeyEvent::release(Key::KEY_A, Instant::now()));
        assert_eq!(prep.matching_move_count(&sequence), 2);

        prep.push(KeyEvent::press(Key::KEY_A, Instant::now()));
        assert_eq!(prep.matching_move_count(&sequence), 3);
    }

    #[test]
    fn test_match_uses_most_recent_events() {
        // Earlier unrelated events do not prevent a match on the tail.
        let prep = preparation(&[(Key::KEY_B, true), (Key::KEY_B, false), (Key::KEY_A, true)]);
        assert_eq!(prep.matching_move_count(&moves("+a -a")), 1);
        assert_eq!(prep.matching_move_count(&moves("-b +a")), 2);
        assert_eq!(prep.matching_move_count(&moves("+b")), 0);
    }

    #[test]
    fn test_press_and_release_are_distinct() {
        let prep = preparation(&[(Key::KEY_A, false)]);
        assert_eq!(prep.matching_move_count(&moves("+a")), 0);
        assert_eq!(prep.matching_move_count(&moves("-a")), 1);
        assert_eq!(prep.matching_move_count(&moves("#a")), 0);
    }

    #[test]
    fn test_display() {
        let prep = preparation(&[(Key::KEY_A, true), (Key::KEY_LEFTCTRL, false)]);
        assert_eq!(prep.to_string(), "[+a -leftctrl]");
    }
}
