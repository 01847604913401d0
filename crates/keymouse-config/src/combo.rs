//! Combo model and grammar
//!
//! A combo is a sequence of press/release moves guarded by a precondition on
//! the keys currently held. Combos are compared structurally so that two
//! identical combo strings collapse onto the same [`ComboMap`](crate::ComboMap)
//! entry.
//!
//! # Grammar
//!
//! ```text
//! multi-combo  := combo ( "|" combo )*
//! combo        := precondition* move*
//! precondition := "^{" key-sets "}"        // fails if any set is fully held
//!               | "_{" key-sets "}"        // requires one set fully held
//! key-sets     := keys ( "|" keys )*
//! move         := ( "+" | "#" | "-" ) key ( "-" min-millis ( "-" max-millis )? )?
//! ```
//!
//! `+key` is a press whose event is eaten, `#key` a press that still reaches
//! the rest of the system, `-key` a release. A lone `-min` suffix leaves the
//! window unbounded above.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::time::{Duration, Instant};

use crate::error::ConfigError;
use crate::keys::{key_name, parse_key, Key};

/// Window of elapsed time allowed between a move and the next one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComboMoveDuration {
    pub min: Duration,
    pub max: Duration,
}

impl ComboMoveDuration {
    pub const fn new(min: Duration, max: Duration) -> Self {
        Self { min, max }
    }

    /// Intersection of two windows. The result may be empty (`min > max`),
    /// in which case no elapsed time respects it.
    pub fn narrow(self, other: ComboMoveDuration) -> Self {
        Self {
            min: self.min.max(other.min),
            max: self.max.min(other.max),
        }
    }

    pub fn is_respected(&self, previous: Instant, current: Instant) -> bool {
        let elapsed = current.saturating_duration_since(previous);
        elapsed >= self.min && elapsed <= self.max
    }
}

impl Default for ComboMoveDuration {
    fn default() -> Self {
        Self::new(Duration::ZERO, Duration::from_millis(150))
    }
}

/// A single step of a combo sequence.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ComboMove {
    Press {
        key: Key,
        duration: ComboMoveDuration,
        event_must_be_eaten: bool,
    },
    Release {
        key: Key,
        duration: ComboMoveDuration,
    },
}

impl ComboMove {
    pub fn key(&self) -> Key {
        match self {
            ComboMove::Press { key, .. } | ComboMove::Release { key, .. } => *key,
        }
    }

    pub fn duration(&self) -> ComboMoveDuration {
        match self {
            ComboMove::Press { duration, .. } | ComboMove::Release { duration, .. } => *duration,
        }
    }

    pub fn is_press(&self) -> bool {
        matches!(self, ComboMove::Press { .. })
    }

    pub fn event_must_be_eaten(&self) -> bool {
        matches!(
            self,
            ComboMove::Press {
                event_must_be_eaten: true,
                ..
            }
        )
    }
}

impl fmt::Display for ComboMove {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let prefix = match self {
            ComboMove::Press {
                event_must_be_eaten: true,
                ..
            } => '+',
            ComboMove::Press { .. } => '#',
            ComboMove::Release { .. } => '-',
        };
        let duration = self.duration();
        write!(f, "{}{}-{}", prefix, key_name(self.key()), duration.min.as_millis())?;
        if duration.max != Duration::MAX {
            write!(f, "-{}", duration.max.as_millis())?;
        }
        Ok(())
    }
}

/// Requirements on the set of currently pressed keys.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ComboPrecondition {
    pub must_not_be_pressed_key_sets: BTreeSet<BTreeSet<Key>>,
    pub must_be_pressed_key_sets: BTreeSet<BTreeSet<Key>>,
}

impl ComboPrecondition {
    pub fn is_empty(&self) -> bool {
        self.must_not_be_pressed_key_sets.is_empty() && self.must_be_pressed_key_sets.is_empty()
    }

    pub fn satisfied(&self, currently_pressed_keys: &HashSet<Key>) -> bool {
        let fully_pressed =
            |key_set: &BTreeSet<Key>| key_set.iter().all(|key| currently_pressed_keys.contains(key));

        if self.must_not_be_pressed_key_sets.iter().any(fully_pressed) {
            return false;
        }
        self.must_be_pressed_key_sets.is_empty()
            || self.must_be_pressed_key_sets.iter().any(fully_pressed)
    }
}

fn write_key_sets(f: &mut fmt::Formatter<'_>, key_sets: &BTreeSet<BTreeSet<Key>>) -> fmt::Result {
    let rendered: Vec<String> = key_sets
        .iter()
        .map(|set| set.iter().map(|key| key_name(*key)).collect::<Vec<_>>().join(" "))
        .collect();
    write!(f, "{}", rendered.join("|"))
}

impl fmt::Display for ComboPrecondition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        if !self.must_not_be_pressed_key_sets.is_empty() {
            write!(f, "^{{")?;
            write_key_sets(f, &self.must_not_be_pressed_key_sets)?;
            write!(f, "}}")?;
            first = false;
        }
        if !self.must_be_pressed_key_sets.is_empty() {
            if !first {
                write!(f, " ")?;
            }
            write!(f, "_{{")?;
            write_key_sets(f, &self.must_be_pressed_key_sets)?;
            write!(f, "}}")?;
        }
        Ok(())
    }
}

/// A combo: ordered moves plus a precondition.
///
/// Equality, hashing and ordering are structural, so a `Combo` can be used as
/// a map key across mode switches.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Combo {
    sequence: Vec<ComboMove>,
    precondition: ComboPrecondition,
}

impl Combo {
    /// Build a combo, rejecting ones that cannot be evaluated meaningfully.
    pub fn new(
        sequence: Vec<ComboMove>,
        precondition: ComboPrecondition,
    ) -> Result<Self, ConfigError> {
        let combo = Self {
            sequence,
            precondition,
        };
        let text = combo.to_string();

        if combo.sequence.is_empty() && combo.precondition.is_empty() {
            return Err(ConfigError::invalid_combo(
                &text,
                "a combo needs at least one move or a precondition",
            ));
        }
        let has_empty_key_set = combo
            .precondition
            .must_not_be_pressed_key_sets
            .iter()
            .chain(combo.precondition.must_be_pressed_key_sets.iter())
            .any(|set| set.is_empty());
        if has_empty_key_set {
            return Err(ConfigError::invalid_combo(&text, "empty key set in precondition"));
        }
        if let Some(combo_move) = combo.sequence.iter().find(|m| m.duration().min > m.duration().max) {
            return Err(ConfigError::invalid_combo(
                &text,
                format!("minimum duration exceeds maximum in move {}", combo_move),
            ));
        }

        Ok(combo)
    }

    pub fn sequence(&self) -> &[ComboMove] {
        &self.sequence
    }

    pub fn precondition(&self) -> &ComboPrecondition {
        &self.precondition
    }

    pub fn last_move(&self) -> Option<&ComboMove> {
        self.sequence.last()
    }
}

impl fmt::Display for Combo {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut parts = Vec::new();
        if !self.precondition.is_empty() {
            parts.push(self.precondition.to_string());
        }
        parts.extend(self.sequence.iter().map(ToString::to_string));
        write!(f, "{}", parts.join(" "))
    }
}

/// Parse a string holding `|`-separated alternative combos.
pub fn parse_multi_combo(
    input: &str,
    default_duration: ComboMoveDuration,
) -> Result<Vec<Combo>, ConfigError> {
    split_alternatives(input)?
        .into_iter()
        .map(|alternative| parse_combo(alternative, default_duration))
        .collect()
}

/// Parse a single combo.
pub fn parse_combo(input: &str, default_duration: ComboMoveDuration) -> Result<Combo, ConfigError> {
    let input = input.trim();
    let mut sequence = Vec::new();
    let mut precondition = ComboPrecondition::default();
    let mut rest = input;

    loop {
        rest = rest.trim_start();
        if rest.is_empty() {
            break;
        }

        let must_not = rest.starts_with("^{");
        if must_not || rest.starts_with("_{") {
            if !sequence.is_empty() {
                return Err(ConfigError::invalid_combo(
                    input,
                    "preconditions must come before the moves",
                ));
            }
            let close = rest
                .find('}')
                .ok_or_else(|| ConfigError::invalid_combo(input, "unclosed precondition"))?;
            let key_sets = parse_key_sets(input, &rest[2..close])?;
            if must_not {
                precondition.must_not_be_pressed_key_sets.extend(key_sets);
            } else {
                precondition.must_be_pressed_key_sets.extend(key_sets);
            }
            rest = &rest[close + 1..];
            continue;
        }

        let end = rest.find(char::is_whitespace).unwrap_or(rest.len());
        sequence.push(parse_move(input, &rest[..end], default_duration)?);
        rest = &rest[end..];
    }

    Combo::new(sequence, precondition)
}

fn split_alternatives(input: &str) -> Result<Vec<&str>, ConfigError> {
    let mut alternatives = Vec::new();
    let mut depth = 0usize;
    let mut start = 0;

    for (index, ch) in input.char_indices() {
        match ch {
            '{' => depth += 1,
            '}' => {
                depth = depth
                    .checked_sub(1)
                    .ok_or_else(|| ConfigError::invalid_combo(input, "unbalanced '}'"))?;
            }
            '|' if depth == 0 => {
                alternatives.push(&input[start..index]);
                start = index + 1;
            }
            _ => {}
        }
    }
    if depth != 0 {
        return Err(ConfigError::invalid_combo(input, "unbalanced '{'"));
    }
    alternatives.push(&input[start..]);

    if alternatives.iter().any(|alternative| alternative.trim().is_empty()) {
        return Err(ConfigError::invalid_combo(input, "empty alternative"));
    }
    Ok(alternatives)
}

fn parse_key_sets(combo: &str, content: &str) -> Result<Vec<BTreeSet<Key>>, ConfigError> {
    content
        .split('|')
        .map(|set| {
            let keys = set
                .split_whitespace()
                .map(|name| {
                    parse_key(name).ok_or_else(|| ConfigError::UnknownKey {
                        key: name.to_string(),
                    })
                })
                .collect::<Result<BTreeSet<Key>, ConfigError>>()?;
            if keys.is_empty() {
                return Err(ConfigError::invalid_combo(combo, "empty key set in precondition"));
            }
            Ok(keys)
        })
        .collect()
}

fn parse_move(
    combo: &str,
    token: &str,
    default_duration: ComboMoveDuration,
) -> Result<ComboMove, ConfigError> {
    let mut chars = token.chars();
    let kind = chars.next();
    let body = chars.as_str();

    let mut parts = body.split('-');
    let key_part = parts.next().unwrap_or_default();
    if key_part.is_empty() {
        return Err(ConfigError::invalid_combo(combo, format!("missing key in move '{}'", token)));
    }
    let key = parse_key(key_part).ok_or_else(|| ConfigError::UnknownKey {
        key: key_part.to_string(),
    })?;

    let millis: Vec<&str> = parts.collect();
    let duration = match millis.as_slice() {
        [] => default_duration,
        [min] => ComboMoveDuration::new(parse_millis(combo, min)?, Duration::MAX),
        [min, max] => ComboMoveDuration::new(parse_millis(combo, min)?, parse_millis(combo, max)?),
        _ => {
            return Err(ConfigError::invalid_combo(
                combo,
                format!("too many duration bounds in move '{}'", token),
            ))
        }
    };

    match kind {
        Some('+') => Ok(ComboMove::Press {
            key,
            duration,
            event_must_be_eaten: true,
        }),
        Some('#') => Ok(ComboMove::Press {
            key,
            duration,
            event_must_be_eaten: false,
        }),
        Some('-') => Ok(ComboMove::Release { key, duration }),
        _ => Err(ConfigError::invalid_combo(
            combo,
            format!("move '{}' must start with '+', '#' or '-'", token),
        )),
    }
}

fn parse_millis(combo: &str, value: &str) -> Result<Duration, ConfigError> {
    value
        .parse::<u64>()
        .map(Duration::from_millis)
        .map_err(|_| ConfigError::invalid_combo(combo, format!("invalid duration '{}'", value)))
}
