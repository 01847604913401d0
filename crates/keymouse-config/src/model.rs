//! Configuration data model

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use crate::combo::{Combo, ComboMoveDuration};

/// Mode name that resolves to the most recent mode of the history stack.
pub const PREVIOUS_MODE_FROM_HISTORY_STACK: &str = "previous-mode-from-history-stack";

/// Root configuration structure
#[derive(Debug, Clone)]
pub struct Config {
    pub global: GlobalConfig,
    pub modes: ModeMap,
}

/// Global settings
#[derive(Debug, Clone)]
pub struct GlobalConfig {
    pub log_level: LogLevel,
    pub initial_mode: String,
    pub tick_interval: Duration,
    pub default_combo_move_duration: ComboMoveDuration,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            log_level: LogLevel::Info,
            initial_mode: "idle-mode".to_string(),
            tick_interval: Duration::from_millis(10),
            default_combo_move_duration: ComboMoveDuration::default(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    /// Directive understood by `tracing_subscriber::EnvFilter`.
    pub fn as_filter(self) -> &'static str {
        match self {
            LogLevel::Trace => "trace",
            LogLevel::Debug => "debug",
            LogLevel::Info => "info",
            LogLevel::Warn => "warn",
            LogLevel::Error => "error",
        }
    }
}

impl std::str::FromStr for LogLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "trace" => Ok(Self::Trace),
            "debug" => Ok(Self::Debug),
            "info" => Ok(Self::Info),
            "warn" | "warning" => Ok(Self::Warn),
            "error" => Ok(Self::Error),
            _ => Err(format!("Unknown log level: {}", s)),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Direction {
    Up,
    Down,
    Left,
    Right,
}

impl Direction {
    pub const ALL: [Direction; 4] = [
        Direction::Up,
        Direction::Down,
        Direction::Left,
        Direction::Right,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Direction::Up => "up",
            Direction::Down => "down",
            Direction::Left => "left",
            Direction::Right => "right",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Button {
    Left,
    Middle,
    Right,
}

impl Button {
    pub const ALL: [Button; 3] = [Button::Left, Button::Middle, Button::Right];

    pub fn name(self) -> &'static str {
        match self {
            Button::Left => "left",
            Button::Middle => "middle",
            Button::Right => "right",
        }
    }
}

/// Action produced by a completed combo.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Command {
    ChangeMode(String),
    StartMove(Direction),
    StopMove(Direction),
    StartWheel(Direction),
    StopWheel(Direction),
    PressButton(Button),
    ReleaseButton(Button),
    AttachMove(Direction),
}

impl Command {
    /// Resolve a configuration node name such as `start-move-up`.
    ///
    /// `to` is not handled here since it carries the target mode name.
    pub fn from_node_name(name: &str) -> Option<Command> {
        let directional: [(&str, fn(Direction) -> Command); 5] = [
            ("start-move-", Command::StartMove),
            ("stop-move-", Command::StopMove),
            ("start-wheel-", Command::StartWheel),
            ("stop-wheel-", Command::StopWheel),
            ("attach-", Command::AttachMove),
        ];
        for (prefix, build) in directional {
            if let Some(rest) = name.strip_prefix(prefix) {
                return Direction::ALL
                    .into_iter()
                    .find(|direction| direction.name() == rest)
                    .map(build);
            }
        }

        let button: [(&str, fn(Button) -> Command); 2] = [
            ("press-", Command::PressButton),
            ("release-", Command::ReleaseButton),
        ];
        for (prefix, build) in button {
            if let Some(rest) = name.strip_prefix(prefix) {
                return Button::ALL
                    .into_iter()
                    .find(|button| button.name() == rest)
                    .map(build);
            }
        }

        None
    }
}

impl fmt::Display for Command {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Command::ChangeMode(mode) => write!(f, "to {}", mode),
            Command::StartMove(direction) => write!(f, "start-move-{}", direction.name()),
            Command::StopMove(direction) => write!(f, "stop-move-{}", direction.name()),
            Command::StartWheel(direction) => write!(f, "start-wheel-{}", direction.name()),
            Command::StopWheel(direction) => write!(f, "stop-wheel-{}", direction.name()),
            Command::PressButton(button) => write!(f, "press-{}", button.name()),
            Command::ReleaseButton(button) => write!(f, "release-{}", button.name()),
            Command::AttachMove(direction) => write!(f, "attach-{}", direction.name()),
        }
    }
}

/// Commands triggered by each combo of a mode.
///
/// Several combo strings may compile to the same [`Combo`]; their commands
/// accumulate on a single entry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ComboMap {
    commands_by_combo: BTreeMap<Combo, Vec<Command>>,
}

impl ComboMap {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add(&mut self, combo: Combo, command: Command) {
        self.commands_by_combo.entry(combo).or_default().push(command);
    }

    pub fn commands(&self, combo: &Combo) -> Option<&[Command]> {
        self.commands_by_combo.get(combo).map(Vec::as_slice)
    }

    pub fn contains(&self, combo: &Combo) -> bool {
        self.commands_by_combo.contains_key(combo)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&Combo, &[Command])> {
        self.commands_by_combo
            .iter()
            .map(|(combo, commands)| (combo, commands.as_slice()))
    }

    pub fn len(&self) -> usize {
        self.commands_by_combo.len()
    }

    pub fn is_empty(&self) -> bool {
        self.commands_by_combo.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModeTimeout {
    pub duration: Duration,
    pub next_mode: String,
    /// Only count down while the mouse is idle.
    pub only_if_idle: bool,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HideCursor {
    pub enabled: bool,
    /// Zero hides the cursor as soon as the mode is entered.
    pub idle_duration: Duration,
}

/// A named bundle of combos and policies.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mode {
    pub name: String,
    pub combo_map: ComboMap,
    pub timeout: Option<ModeTimeout>,
    pub hide_cursor: HideCursor,
    pub push_to_history: bool,
    pub mode_after_unhandled_keys_pressed: Option<String>,
}

impl Mode {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            combo_map: ComboMap::new(),
            timeout: None,
            hide_cursor: HideCursor::default(),
            push_to_history: false,
            mode_after_unhandled_keys_pressed: None,
        }
    }
}

/// All configured modes, by name.
#[derive(Debug, Clone, Default)]
pub struct ModeMap {
    modes: HashMap<String, Arc<Mode>>,
}

impl ModeMap {
    pub fn new(modes: impl IntoIterator<Item = Mode>) -> Self {
        Self {
            modes: modes
                .into_iter()
                .map(|mode| (mode.name.clone(), Arc::new(mode)))
                .collect(),
        }
    }

    pub fn get(&self, name: &str) -> Option<&Arc<Mode>> {
        self.modes.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.modes.contains_key(name)
    }

    /// Modes sorted by name.
    pub fn iter(&self) -> impl Iterator<Item = &Arc<Mode>> {
        let mut modes: Vec<&Arc<Mode>> = self.modes.values().collect();
        modes.sort_by(|a, b| a.name.cmp(&b.name));
        modes.into_iter()
    }

    pub fn len(&self) -> usize {
        self.modes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.modes.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::combo::parse_combo;

    #[test]
    fn test_command_from_node_name() {
        assert_eq!(
            Command::from_node_name("start-move-up"),
            Some(Command::StartMove(Direction::Up))
        );
        assert_eq!(
            Command::from_node_name("stop-wheel-left"),
            Some(Command::StopWheel(Direction::Left))
        );
        assert_eq!(
            Command::from_node_name("attach-right"),
            Some(Command::AttachMove(Direction::Right))
        );
        assert_eq!(
            Command::from_node_name("release-middle"),
            Some(Command::ReleaseButton(Button::Middle))
        );
        assert_eq!(Command::from_node_name("start-move-sideways"), None);
        assert_eq!(Command::from_node_name("to"), None);
        assert_eq!(Command::from_node_name("jump"), None);
    }

    #[test]
    fn test_command_display_matches_node_name() {
        for command in [
            Command::StartMove(Direction::Down),
            Command::StopMove(Direction::Up),
            Command::StartWheel(Direction::Right),
            Command::PressButton(Button::Left),
            Command::AttachMove(Direction::Left),
        ] {
            assert_eq!(Command::from_node_name(&command.to_string()), Some(command));
        }
    }

    #[test]
    fn test_combo_map_accumulates_aliases() {
        let default = ComboMoveDuration::default();
        let mut combo_map = ComboMap::new();
        combo_map.add(parse_combo("+up", default).unwrap(), Command::StartMove(Direction::Up));
        combo_map.add(parse_combo("+up", default).unwrap(), Command::StartWheel(Direction::Up));
        combo_map.add(parse_combo("-up", default).unwrap(), Command::StopMove(Direction::Up));

        assert_eq!(combo_map.len(), 2);
        let press = parse_combo("+up", default).unwrap();
        assert_eq!(
            combo_map.commands(&press),
            Some(&[Command::StartMove(Direction::Up), Command::StartWheel(Direction::Up)][..])
        );
    }

    #[test]
    fn test_mode_map_lookup() {
        let modes = ModeMap::new([Mode::new("normal-mode"), Mode::new("idle-mode")]);
        assert_eq!(modes.len(), 2);
        assert!(modes.contains("idle-mode"));
        assert!(modes.get("missing-mode").is_none());
        let names: Vec<&str> = modes.iter().map(|mode| mode.name.as_str()).collect();
        assert_eq!(names, vec!["idle-mode", "normal-mode"]);
    }

    #[test]
    fn test_log_level_from_str() {
        assert_eq!("DEBUG".parse::<LogLevel>(), Ok(LogLevel::Debug));
        assert_eq!("warning".parse::<LogLevel>(), Ok(LogLevel::Warn));
        assert!("loud".parse::<LogLevel>().is_err());
        assert_eq!(LogLevel::Trace.as_filter(), "trace");
    }
}
