//! KDL configuration parser

use std::path::Path;
use std::time::Duration;

use crate::combo::{parse_multi_combo, ComboMoveDuration};
use crate::error::ConfigError;
use crate::model::*;

/// Parse a configuration file from the given path
pub fn parse_config(path: &Path) -> Result<Config, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    parse_config_str(&content)
}

/// Parse configuration from a string
pub fn parse_config_str(content: &str) -> Result<Config, ConfigError> {
    let doc: kdl::KdlDocument = content.parse().map_err(|e: kdl::KdlError| {
        // kdl reports spans with its own miette version
        let span = miette::SourceSpan::from((e.span.offset(), e.span.len()));
        ConfigError::ParseError {
            src: content.to_string(),
            span,
            source: e,
        }
    })?;

    // Modes depend on the default move duration, so globals are read first.
    let mut global = GlobalConfig::default();
    for node in doc.nodes() {
        if node.name().value() == "global" {
            parse_global(node, &mut global)?;
        }
    }

    let mut modes: Vec<Mode> = Vec::new();
    for node in doc.nodes() {
        match node.name().value() {
            "global" => {}
            "mode" => {
                let mode = parse_mode(node, global.default_combo_move_duration)?;
                if modes.iter().any(|existing| existing.name == mode.name) {
                    return Err(ConfigError::Invalid {
                        message: format!("Mode '{}' is defined more than once", mode.name),
                    });
                }
                modes.push(mode);
            }
            name => {
                tracing::warn!("Unknown top-level node: {}", name);
            }
        }
    }

    if modes.is_empty() {
        return Err(ConfigError::Invalid {
            message: "No modes defined. Add at least one `mode \"name\" { ... }` node."
                .to_string(),
        });
    }

    let config = Config {
        global,
        modes: ModeMap::new(modes),
    };
    validate_mode_references(&config)?;
    Ok(config)
}

fn parse_global(node: &kdl::KdlNode, global: &mut GlobalConfig) -> Result<(), ConfigError> {
    let Some(children) = node.children() else {
        return Ok(());
    };

    for child in children.nodes() {
        match child.name().value() {
            "log-level" => {
                if let Some(val) = first_string(child) {
                    global.log_level = val
                        .parse()
                        .map_err(|message| ConfigError::Invalid { message })?;
                }
            }
            "initial-mode" => {
                if let Some(val) = first_string(child) {
                    global.initial_mode = val.to_string();
                }
            }
            "tick-interval-millis" => {
                let millis = positional_millis(child, 0)?;
                if millis.is_zero() {
                    return Err(ConfigError::Invalid {
                        message: "tick-interval-millis must be greater than 0".to_string(),
                    });
                }
                global.tick_interval = millis;
            }
            "default-combo-move-duration-millis" => {
                let min = positional_millis(child, 0)?;
                let max = positional_millis(child, 1)?;
                if min > max {
                    return Err(ConfigError::Invalid {
                        message: format!(
                            "default-combo-move-duration-millis: min ({}) exceeds max ({})",
                            min.as_millis(),
                            max.as_millis()
                        ),
                    });
                }
                global.default_combo_move_duration = ComboMoveDuration::new(min, max);
            }
            name => {
                tracing::warn!("Unknown global config option: {}", name);
            }
        }
    }

    Ok(())
}

fn parse_mode(
    node: &kdl::KdlNode,
    default_duration: ComboMoveDuration,
) -> Result<Mode, ConfigError> {
    let name = first_string(node).ok_or_else(|| ConfigError::MissingField {
        field: "mode name (e.g., `mode \"normal-mode\" { ... }`)".to_string(),
    })?;
    let mut mode = Mode::new(name);

    let Some(children) = node.children() else {
        return Ok(mode);
    };

    for child in children.nodes() {
        match child.name().value() {
            "push-to-history" => {
                mode.push_to_history = match positional(child).next() {
                    Some(value) => value.as_bool().ok_or_else(|| ConfigError::Invalid {
                        message: format!("push-to-history in mode '{}' expects true or false", name),
                    })?,
                    None => true,
                };
            }
            "timeout" => {
                mode.timeout = Some(parse_timeout(child, name)?);
            }
            "hide-cursor" => {
                let idle_duration = match property(child, "idle-duration-millis") {
                    Some(value) => millis(value, "idle-duration-millis")?,
                    None => Duration::ZERO,
                };
                mode.hide_cursor = HideCursor {
                    enabled: true,
                    idle_duration,
                };
            }
            "mode-after-unhandled-keys-pressed" => {
                let next = first_string(child).ok_or_else(|| ConfigError::MissingField {
                    field: format!("mode-after-unhandled-keys-pressed target in mode '{}'", name),
                })?;
                mode.mode_after_unhandled_keys_pressed = Some(next.to_string());
            }
            "to" => {
                let mut args = positional(child);
                let target = args
                    .next()
                    .and_then(|value| value.as_string())
                    .ok_or_else(|| ConfigError::MissingField {
                        field: format!("`to` target mode in mode '{}'", name),
                    })?;
                let command = Command::ChangeMode(target.to_string());
                add_combos(&mut mode.combo_map, args, &command, default_duration)?;
            }
            other => {
                let command =
                    Command::from_node_name(other).ok_or_else(|| ConfigError::UnknownCommand {
                        mode: name.to_string(),
                        name: other.to_string(),
                    })?;
                add_combos(&mut mode.combo_map, positional(child), &command, default_duration)?;
            }
        }
    }

    Ok(mode)
}

fn parse_timeout(node: &kdl::KdlNode, mode_name: &str) -> Result<ModeTimeout, ConfigError> {
    let incomplete = || ConfigError::IncompleteTimeout {
        mode: mode_name.to_string(),
    };

    let duration = millis(
        property(node, "duration-millis").ok_or_else(incomplete)?,
        "duration-millis",
    )?;
    let next_mode = property(node, "next-mode")
        .and_then(|value| value.as_string())
        .ok_or_else(incomplete)?;
    let only_if_idle = match property(node, "only-if-idle") {
        Some(value) => value.as_bool().ok_or_else(|| ConfigError::Invalid {
            message: format!("only-if-idle in mode '{}' expects true or false", mode_name),
        })?,
        None => false,
    };

    Ok(ModeTimeout {
        duration,
        next_mode: next_mode.to_string(),
        only_if_idle,
    })
}

fn add_combos<'a>(
    combo_map: &mut ComboMap,
    args: impl Iterator<Item = &'a kdl::KdlValue>,
    command: &Command,
    default_duration: ComboMoveDuration,
) -> Result<(), ConfigError> {
    for value in args {
        let input = value.as_string().ok_or_else(|| ConfigError::Invalid {
            message: format!("Combo for `{}` must be a string, got {}", command, value),
        })?;
        for combo in parse_multi_combo(input, default_duration)? {
            combo_map.add(combo, command.clone());
        }
    }
    Ok(())
}

fn validate_mode_references(config: &Config) -> Result<(), ConfigError> {
    if !config.modes.contains(&config.global.initial_mode) {
        return Err(ConfigError::UnknownModeReference {
            mode: config.global.initial_mode.clone(),
            referenced_by: "initial-mode".to_string(),
        });
    }

    for mode in config.modes.iter() {
        let mut references: Vec<(&str, String)> = Vec::new();
        for (_, commands) in mode.combo_map.iter() {
            for command in commands {
                if let Command::ChangeMode(target) = command {
                    references.push((target.as_str(), format!("`to` in mode '{}'", mode.name)));
                }
            }
        }
        if let Some(timeout) = &mode.timeout {
            references.push((
                timeout.next_mode.as_str(),
                format!("timeout of mode '{}'", mode.name),
            ));
        }
        if let Some(next) = &mode.mode_after_unhandled_keys_pressed {
            references.push((
                next.as_str(),
                format!("mode-after-unhandled-keys-pressed of mode '{}'", mode.name),
            ));
        }

        for (target, referenced_by) in references {
            if target != PREVIOUS_MODE_FROM_HISTORY_STACK && !config.modes.contains(target) {
                return Err(ConfigError::UnknownModeReference {
                    mode: target.to_string(),
                    referenced_by,
                });
            }
        }
    }

    Ok(())
}

/// Positional (unnamed) arguments of a node.
fn positional(node: &kdl::KdlNode) -> impl Iterator<Item = &kdl::KdlValue> {
    node.entries()
        .iter()
        .filter(|entry| entry.name().is_none())
        .map(|entry| entry.value())
}

fn first_string(node: &kdl::KdlNode) -> Option<&str> {
    positional(node).next().and_then(|value| value.as_string())
}

fn property<'a>(node: &'a kdl::KdlNode, key: &str) -> Option<&'a kdl::KdlValue> {
    node.entries()
        .iter()
        .find(|entry| entry.name().map(|name| name.value()) == Some(key))
        .map(|entry| entry.value())
}

fn positional_millis(node: &kdl::KdlNode, index: usize) -> Result<Duration, ConfigError> {
    let field = node.name().value();
    let value = positional(node)
        .nth(index)
        .ok_or_else(|| ConfigError::MissingField {
            field: format!("{} (argument {})", field, index + 1),
        })?;
    millis(value, field)
}

fn millis(value: &kdl::KdlValue, field: &str) -> Result<Duration, ConfigError> {
    value
        .as_i64()
        .and_then(|millis| u64::try_from(millis).ok())
        .map(Duration::from_millis)
        .ok_or_else(|| ConfigError::Invalid {
            message: format!("{} expects a non-negative number of milliseconds, got {}", field, value),
        })
}
