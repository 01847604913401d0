//! Mode state machine
//!
//! The controller owns the current mode and advances its timers on every tick:
//!
//! - **unhandled keys**: if the mode names a mode to switch to when only keys
//!   outside of any combo are held, that switch happens first and nothing else
//!   runs for the tick.
//! - **cursor hiding**: while the mouse idles, the hide-cursor timer counts
//!   down and hides the cursor once it runs out. Activity restores the cursor,
//!   unless the mode hides it immediately (zero idle duration).
//! - **timeout**: counts down (only while idle if so configured) and switches
//!   to the configured next mode once it runs out.
//!
//! Modes configured with `push-to-history` are remembered when left, and
//! [`PREVIOUS_MODE_FROM_HISTORY_STACK`] switches back to the latest of them.

use std::sync::Arc;
use std::time::Duration;

use keymouse_config::{Mode, ModeMap, PREVIOUS_MODE_FROM_HISTORY_STACK};

use crate::error::ModeError;
use crate::state::{KeyboardState, MouseState};

/// Observer of mode changes.
pub trait ModeListener {
    fn mode_changed(&mut self, mode: &Mode);

    fn mode_timed_out(&mut self);
}

/// Shows and hides the pointer.
pub trait CursorVisibility {
    fn hide_cursor(&mut self);

    fn show_cursor(&mut self);
}

pub struct ModeController {
    mode_map: ModeMap,
    current_mode: Arc<Mode>,
    mode_history_stack: Vec<Arc<Mode>>,
    cursor: Box<dyn CursorVisibility>,
    listeners: Vec<Box<dyn ModeListener>>,
    current_mode_cursor_hidden: bool,
    current_mode_timed_out: bool,
    mode_timeout_timer: Duration,
    hide_cursor_idle_timer: Duration,
    just_snapped_to_grid: bool,
}

impl ModeController {
    /// Create a controller in `initial_mode` and notify the listeners.
    pub fn new(
        mode_map: ModeMap,
        initial_mode: &str,
        cursor: Box<dyn CursorVisibility>,
        listeners: Vec<Box<dyn ModeListener>>,
    ) -> Result<Self, ModeError> {
        let current_mode = mode_map
            .get(initial_mode)
            .cloned()
            .ok_or_else(|| ModeError::UnknownMode {
                name: initial_mode.to_string(),
            })?;
        let mut controller = Self {
            mode_map,
            current_mode,
            mode_history_stack: Vec::new(),
            cursor,
            listeners,
            current_mode_cursor_hidden: false,
            current_mode_timed_out: false,
            mode_timeout_timer: Duration::ZERO,
            hide_cursor_idle_timer: Duration::ZERO,
            just_snapped_to_grid: false,
        };
        controller.enter_current_mode();
        Ok(controller)
    }

    pub fn current_mode(&self) -> &Arc<Mode> {
        &self.current_mode
    }

    #[cfg(test)]
    pub fn mode_history(&self) -> impl Iterator<Item = &str> {
        self.mode_history_stack.iter().rev().map(|mode| mode.name.as_str())
    }

    #[cfg(test)]
    pub fn cursor_hidden(&self) -> bool {
        self.current_mode_cursor_hidden
    }

    /// Returns whether the current mode timed out since the last call.
    pub fn poll_current_mode_timed_out(&mut self) -> bool {
        std::mem::replace(&mut self.current_mode_timed_out, false)
    }

    /// Record a grid snap, which counts as activity for the next tick.
    pub fn snapped_to_grid(&mut self) {
        self.just_snapped_to_grid = true;
    }

    pub fn on_tick(
        &mut self,
        delta: Duration,
        mouse: &MouseState,
        keyboard: &KeyboardState,
    ) -> Result<(), ModeError> {
        if keyboard.pressing_unhandled_keys_only() {
            if let Some(next) = self.current_mode.mode_after_unhandled_keys_pressed.clone() {
                tracing::debug!("All currently pressed keys are unhandled, switching to {}", next);
                return self.switch_mode(&next);
            }
        }

        let mouse_idling = mouse.is_idle() && !self.just_snapped_to_grid;
        self.just_snapped_to_grid = false;
        let only_if_idle = self
            .current_mode
            .timeout
            .as_ref()
            .is_some_and(|timeout| timeout.only_if_idle);

        if !mouse_idling {
            self.reset_hide_cursor_timer();
            self.reset_current_mode_cursor_hidden();
        } else if self.current_mode.hide_cursor.enabled && !self.current_mode_cursor_hidden {
            self.hide_cursor_idle_timer = self.hide_cursor_idle_timer.saturating_sub(delta);
            if self.hide_cursor_idle_timer.is_zero() {
                tracing::debug!("Hide cursor timer for {} has elapsed", self.current_mode.name);
                self.current_mode_cursor_hidden = true;
                self.cursor.hide_cursor();
            }
        }

        if only_if_idle && !mouse_idling {
            self.reset_mode_timeout_timer();
        } else if let Some(timeout) = self.current_mode.timeout.clone() {
            self.mode_timeout_timer = self.mode_timeout_timer.saturating_sub(delta);
            if self.mode_timeout_timer.is_zero() {
                let next_mode = match self.resolve_mode(&timeout.next_mode) {
                    Ok(next_mode) => next_mode,
                    Err(e) => {
                        // Wait a full timeout before trying again.
                        self.reset_mode_timeout_timer();
                        return Err(e);
                    }
                };
                tracing::debug!(
                    "Current {} has timed out, switching to {}",
                    self.current_mode.name,
                    next_mode.name
                );
                for listener in &mut self.listeners {
                    listener.mode_timed_out();
                }
                self.current_mode_timed_out = true;
                self.enter_mode(next_mode);
            }
        }

        Ok(())
    }

    /// Switch to the named mode, or back in history for the
    /// `previous-mode-from-history-stack` name.
    ///
    /// Nothing changes when an error is returned.
    pub fn switch_mode(&mut self, name: &str) -> Result<(), ModeError> {
        let new_mode = self.resolve_mode(name)?;
        self.enter_mode(new_mode);
        Ok(())
    }

    fn resolve_mode(&self, name: &str) -> Result<Arc<Mode>, ModeError> {
        if name == PREVIOUS_MODE_FROM_HISTORY_STACK {
            self.mode_history_stack
                .last()
                .cloned()
                .ok_or(ModeError::EmptyHistoryStack)
        } else {
            self.mode_map
                .get(name)
                .cloned()
                .ok_or_else(|| ModeError::UnknownMode {
                    name: name.to_string(),
                })
        }
    }

    fn enter_mode(&mut self, new_mode: Arc<Mode>) {
        if let Some(index) = self.history_position(&new_mode.name) {
            self.mode_history_stack.truncate(index);
        } else if self.current_mode.push_to_history
            && self.history_position(&self.current_mode.name).is_none()
        {
            self.mode_history_stack.push(self.current_mode.clone());
        }

        tracing::debug!("Switching from {} to {}", self.current_mode.name, new_mode.name);
        self.current_mode = new_mode;
        self.enter_current_mode();
    }

    fn history_position(&self, name: &str) -> Option<usize> {
        self.mode_history_stack.iter().position(|mode| mode.name == name)
    }

    fn enter_current_mode(&mut self) {
        self.reset_current_mode_cursor_hidden();
        self.reset_hide_cursor_timer();
        self.reset_mode_timeout_timer();
        let mode = self.current_mode.clone();
        for listener in &mut self.listeners {
            listener.mode_changed(&mode);
        }
    }

    /// Show the cursor again unless the mode hides it immediately, in which
    /// case it is hidden right away.
    fn reset_current_mode_cursor_hidden(&mut self) {
        let hide_cursor = self.current_mode.hide_cursor;
        let hides_immediately = hide_cursor.enabled && hide_cursor.idle_duration.is_zero();
        if self.current_mode_cursor_hidden {
            if !hides_immediately {
                tracing::debug!("Showing cursor");
                self.cursor.show_cursor();
                self.current_mode_cursor_hidden = false;
            }
        } else if hides_immediately {
            tracing::debug!("Hiding cursor on entering {}", self.current_mode.name);
            self.cursor.hide_cursor();
            self.current_mode_cursor_hidden = true;
        }
    }

    fn reset_mode_timeout_timer(&mut self) {
        if let Some(timeout) = &self.current_mode.timeout {
            self.mode_timeout_timer = timeout.duration;
        }
    }

    fn reset_hide_cursor_timer(&mut self) {
        if self.current_mode.hide_cursor.enabled {
            self.hide_cursor_idle_timer = self.current_mode.hide_cursor.idle_duration;
        }
    }
}
