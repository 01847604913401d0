//! Combo recognition
//!
//! Every key event is matched against all combos of the current mode at once.
//! A combo progresses when the most recent events of the [`ComboPreparation`]
//! match the beginning of its sequence, and completes when the whole sequence
//! is matched.
//!
//! ## Timing
//!
//! Each move carries a window of elapsed time allowed since the previous move.
//! When several combos progress on the same event, their windows are
//! intersected and the result is checked against the next event. Leaving the
//! window restarts the preparation from the new event.
//!
//! A completed combo whose last move has a non-zero minimum duration is not run
//! right away: it waits for that long without any other key event, and is
//! dropped as soon as one arrives.
//!
//! ## Focus
//!
//! A non-eaten press that progresses a combo puts that combo in focus under the
//! pressed key. While anything is in focus, only focused combos may progress.
//! Focus ends when the combo completes, when [`ComboWatcher::interrupt`] is
//! called, or when the key is released without the combo progressing.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Duration;

use keymouse_config::{Combo, ComboMoveDuration, Command, Key, Mode};

use crate::combo_preparation::{ComboPreparation, KeyEvent};

/// What the recognizer needs from its surroundings.
pub trait ComboContext {
    fn current_mode(&self) -> Arc<Mode>;

    /// One-shot flag raised when the current mode timed out.
    fn poll_current_mode_timed_out(&mut self) -> bool;

    fn run(&mut self, command: &Command);
}

/// Verdict for a press event.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PressKeyEventProcessing {
    pub part_of_combo: bool,
    pub must_be_eaten: bool,
}

#[derive(Debug, Clone)]
struct ComboAndCommands {
    combo: Combo,
    commands: Vec<Command>,
}

#[derive(Debug)]
struct ComboWaitingForLastMoveToComplete {
    combo_and_commands: ComboAndCommands,
    remaining_wait: Duration,
}

#[derive(Debug, Default)]
pub struct ComboWatcher {
    preparation: ComboPreparation,
    previous_move_duration: Option<ComboMoveDuration>,
    combos_waiting_for_last_move_to_complete: Vec<ComboWaitingForLastMoveToComplete>,
    focused_combos: HashMap<Key, HashSet<Combo>>,
    currently_pressed_combo_keys: HashSet<Key>,
}

impl ComboWatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Advance combos waiting on their last move by `delta` and run the ones
    /// whose wait is over.
    pub fn on_tick(&mut self, delta: Duration, ctx: &mut impl ComboContext) -> Vec<Command> {
        if ctx.poll_current_mode_timed_out() {
            self.interrupt();
        }

        let mut complete = Vec::new();
        self.combos_waiting_for_last_move_to_complete.retain_mut(|waiting| {
            if delta > waiting.remaining_wait {
                complete.push(waiting.combo_and_commands.clone());
                false
            } else {
                waiting.remaining_wait -= delta;
                true
            }
        });
        if complete.is_empty() {
            return Vec::new();
        }

        let commands = longest_combo_commands_last_and_deduplicate(complete);
        tracing::debug!(?commands, "Combos waiting for their last move completed");
        for command in &commands {
            ctx.run(command);
        }
        commands
    }

    /// Process a key event.
    ///
    /// Releases must only be passed in when their press was part of a combo.
    /// Returns `None` for releases.
    pub fn on_key_event(
        &mut self,
        event: KeyEvent,
        ctx: &mut impl ComboContext,
    ) -> Option<PressKeyEventProcessing> {
        self.combos_waiting_for_last_move_to_complete.clear();

        let window_violated = match (self.preparation.last_event(), self.previous_move_duration) {
            (Some(previous), Some(window)) => !window.is_respected(previous.time, event.time),
            _ => false,
        };
        if window_violated {
            self.preparation.clear();
        }
        if event.is_release() {
            self.currently_pressed_combo_keys.remove(&event.key);
        }
        self.preparation.push(event);

        let mut part_of_combo = false;
        let mut must_be_eaten = false;
        let mut new_move_duration: Option<ComboMoveDuration> = None;
        let mut registered: HashSet<Combo> = HashSet::new();
        let mut to_run = Vec::new();

        let mode = ctx.current_mode();
        let all_focused: HashSet<Combo> = self.focused_combos.values().flatten().cloned().collect();

        for (combo, commands) in mode.combo_map.iter() {
            let matching_move_count = self.preparation.matching_move_count(combo.sequence());
            if matching_move_count == 0 {
                if !combo.sequence().is_empty() {
                    continue;
                }
                if !combo.precondition().satisfied(&self.currently_pressed_combo_keys) {
                    continue;
                }
            } else {
                if !all_focused.is_empty() && !all_focused.contains(combo) {
                    continue;
                }
                if !combo.precondition().is_empty()
                    && !combo.precondition().satisfied(&self.currently_pressed_combo_keys)
                {
                    continue;
                }
                let current_move = &combo.sequence()[matching_move_count - 1];
                if current_move.event_must_be_eaten() {
                    must_be_eaten = true;
                } else if current_move.is_press() {
                    self.focused_combos
                        .entry(current_move.key())
                        .or_default()
                        .insert(combo.clone());
                    registered.insert(combo.clone());
                }
                part_of_combo = true;
                let duration = current_move.duration();
                new_move_duration = Some(match new_move_duration {
                    Some(narrowed) => narrowed.narrow(duration),
                    None => duration,
                });
            }

            if matching_move_count != combo.sequence().len() {
                continue;
            }
            for focused in self.focused_combos.values_mut() {
                focused.remove(combo);
            }
            let combo_and_commands = ComboAndCommands {
                combo: combo.clone(),
                commands: commands.to_vec(),
            };
            match combo.last_move() {
                Some(last_move) if !last_move.duration().min.is_zero() => {
                    self.combos_waiting_for_last_move_to_complete
                        .push(ComboWaitingForLastMoveToComplete {
                            combo_and_commands,
                            remaining_wait: last_move.duration().min,
                        });
                }
                _ => to_run.push(combo_and_commands),
            }
        }

        if new_move_duration.is_some() {
            self.previous_move_duration = new_move_duration;
        }

        let commands = longest_combo_commands_last_and_deduplicate(to_run);
        tracing::debug!(
            mode = %mode.name,
            preparation = %self.preparation,
            part_of_combo,
            must_be_eaten,
            ?commands,
            focused_combos = ?self.focused_combos,
            "Processed key event {}",
            event
        );
        for command in &commands {
            ctx.run(command);
        }

        if !part_of_combo {
            self.preparation.clear();
            if event.is_release() {
                self.focused_combos.remove(&event.key);
            }
        } else if event.is_press {
            self.currently_pressed_combo_keys.insert(event.key);
        }

        // Only combos registered by this very event keep the key in focus, so
        // a held non-eaten press still restricts matching to its combos.
        if let Some(focused) = self.focused_combos.get_mut(&event.key) {
            focused.retain(|combo| registered.contains(combo));
        }

        // The mode may have changed while running the commands.
        let mode = ctx.current_mode();
        for focused in self.focused_combos.values_mut() {
            focused.retain(|combo| mode.combo_map.contains(combo));
        }
        self.focused_combos.retain(|_, focused| !focused.is_empty());

        if event.is_release() {
            None
        } else {
            Some(PressKeyEventProcessing {
                part_of_combo,
                must_be_eaten,
            })
        }
    }

    /// Drop all in-flight combo state.
    pub fn interrupt(&mut self) {
        tracing::debug!(
            preparation = %self.preparation,
            waiting = self.combos_waiting_for_last_move_to_complete.len(),
            focused_combos = ?self.focused_combos,
            "Interrupting combos"
        );
        self.preparation.clear();
        self.combos_waiting_for_last_move_to_complete.clear();
        self.focused_combos.clear();
        self.currently_pressed_combo_keys.clear();
    }
}

/// Order commands of completed combos, shortest sequence first, and drop
/// repeated commands keeping their first occurrence.
///
/// With `+up` starting a move and `+up -up +up` stopping it, pressing up
/// twice completes both: the stop must run last to win.
fn longest_combo_commands_last_and_deduplicate(mut completed: Vec<ComboAndCommands>) -> Vec<Command> {
    completed.sort_by_key(|combo_and_commands| combo_and_commands.combo.sequence().len());
    let mut commands: Vec<Command> = Vec::new();
    for command in completed.into_iter().flat_map(|c| c.commands) {
        if !commands.contains(&command) {
            commands.push(command);
        }
    }
    commands
}
