//! Glue between key events, the combo watcher and the mode controller

use std::sync::Arc;
use std::time::Duration;

use keymouse_config::{Command, Mode};

use crate::combo_preparation::KeyEvent;
use crate::combo_watcher::{ComboContext, ComboWatcher, PressKeyEventProcessing};
use crate::error::ModeError;
use crate::mode_controller::ModeController;
use crate::state::{KeyboardState, MouseState};

/// Runs the commands produced by the combo watcher against the engine state.
struct CommandRunner<'a> {
    controller: &'a mut ModeController,
    mouse: &'a mut MouseState,
    executed: Vec<Command>,
    errors: Vec<ModeError>,
}

impl<'a> CommandRunner<'a> {
    fn new(controller: &'a mut ModeController, mouse: &'a mut MouseState) -> Self {
        Self {
            controller,
            mouse,
            executed: Vec::new(),
            errors: Vec::new(),
        }
    }

    fn finish(self) -> (Vec<Command>, Vec<ModeError>) {
        (self.executed, self.errors)
    }
}

impl ComboContext for CommandRunner<'_> {
    fn current_mode(&self) -> Arc<Mode> {
        self.controller.current_mode().clone()
    }

    fn poll_current_mode_timed_out(&mut self) -> bool {
        self.controller.poll_current_mode_timed_out()
    }

    fn run(&mut self, command: &Command) {
        tracing::debug!("Running {}", command);
        match command {
            Command::ChangeMode(name) => {
                if let Err(e) = self.controller.switch_mode(name) {
                    tracing::warn!("Failed to run `{}`: {}", command, e);
                    self.errors.push(e);
                    return;
                }
            }
            Command::AttachMove(_) => self.controller.snapped_to_grid(),
            _ => {
                self.mouse.apply(command);
            }
        }
        self.executed.push(command.clone());
    }
}

/// Whether a key event reaches the rest of the system.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    Forward,
    Eat,
}

/// What a key event did. `commands` holds every command that ran, even
/// when some `ChangeMode` in `errors` failed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyEventOutcome {
    pub disposition: Disposition,
    pub commands: Vec<Command>,
    pub errors: Vec<ModeError>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TickOutcome {
    pub commands: Vec<Command>,
    pub errors: Vec<ModeError>,
}

/// The combo watcher and mode controller driven by one serialized stream of
/// key events and ticks.
pub struct Engine {
    watcher: ComboWatcher,
    controller: ModeController,
    mouse: MouseState,
    keyboard: KeyboardState,
}

impl Engine {
    pub fn new(controller: ModeController) -> Self {
        Self {
            watcher: ComboWatcher::new(),
            controller,
            mouse: MouseState::default(),
            keyboard: KeyboardState::default(),
        }
    }

    pub fn current_mode(&self) -> &Arc<Mode> {
        self.controller.current_mode()
    }

    #[cfg(test)]
    pub fn mouse(&self) -> &MouseState {
        &self.mouse
    }

    #[cfg(test)]
    pub fn keyboard(&self) -> &KeyboardState {
        &self.keyboard
    }

    /// Process a key press (`is_press`) or release.
    ///
    /// A repeated press of a held key reuses the verdict of the first press.
    /// A release only reaches the combo watcher when its press was part of a
    /// combo, and is eaten exactly when its press was.
    pub fn on_key_event(&mut self, event: KeyEvent) -> KeyEventOutcome {
        if event.is_press {
            if let Some(processing) = self.keyboard.processing(event.key) {
                return outcome(processing, Vec::new(), Vec::new());
            }
            let mut runner = CommandRunner::new(&mut self.controller, &mut self.mouse);
            let processing = self
                .watcher
                .on_key_event(event, &mut runner)
                .unwrap_or_default();
            self.keyboard.press(event.key, processing);
            let (commands, errors) = runner.finish();
            return outcome(processing, commands, errors);
        }

        let Some(processing) = self.keyboard.release(event.key) else {
            // Pressed before the engine started.
            return KeyEventOutcome {
                disposition: Disposition::Forward,
                commands: Vec::new(),
                errors: Vec::new(),
            };
        };
        if !processing.part_of_combo {
            return outcome(processing, Vec::new(), Vec::new());
        }
        let mut runner = CommandRunner::new(&mut self.controller, &mut self.mouse);
        self.watcher.on_key_event(event, &mut runner);
        let (commands, errors) = runner.finish();
        outcome(processing, commands, errors)
    }

    /// Advance the mode controller, then the combo watcher, by `delta`.
    ///
    /// The combo watcher advances even when the mode controller fails.
    pub fn tick(&mut self, delta: Duration) -> TickOutcome {
        let controller_error = self
            .controller
            .on_tick(delta, &self.mouse, &self.keyboard)
            .err();
        let mut runner = CommandRunner::new(&mut self.controller, &mut self.mouse);
        self.watcher.on_tick(delta, &mut runner);
        let (commands, watcher_errors) = runner.finish();
        TickOutcome {
            commands,
            errors: controller_error.into_iter().chain(watcher_errors).collect(),
        }
    }

    /// Drop all in-flight combos and forget held keys.
    pub fn interrupt(&mut self) {
        self.watcher.interrupt();
        self.keyboard.clear();
    }
}

fn outcome(
    processing: PressKeyEventProcessing,
    commands: Vec<Command>,
    errors: Vec<ModeError>,
) -> KeyEventOutcome {
    KeyEventOutcome {
        disposition: disposition(processing),
        commands,
        errors,
    }
}

fn disposition(processing: PressKeyEventProcessing) -> Disposition {
    if processing.must_be_eaten {
        Disposition::Eat
    } else {
        Disposition::Forward
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Instant;

    use keymouse_config::{parse_config_str, Button, Direction, Key};

    use crate::mode_controller::{CursorVisibility, ModeListener};

    struct Quiet;

    impl CursorVisibility for Quiet {
        fn hide_cursor(&mut self) {}
        fn show_cursor(&mut self) {}
    }

    impl ModeListener for Quiet {
        fn mode_changed(&mut self, _mode: &Mode) {}
        fn mode_timed_out(&mut self) {}
    }

    const CONFIG: &str = r##"
        mode "idle-mode" {
            to "normal-mode" "_{leftalt} +e"
        }

        mode "normal-mode" {
            push-to-history true
            timeout duration-millis=1000 next-mode="idle-mode" only-if-idle=true
            mode-after-unhandled-keys-pressed "idle-mode"
            to "previous-mode-from-history-stack" "+q"
            to "wheel-mode" "+w"
            start-move-up "+i"
            stop-move-up "-i"
            press-left "#space"
            release-left "-space"
            attach-up "+g"
        }

        mode "wheel-mode" {
            start-wheel-down "+j"
            stop-wheel-down "-j"
        }
    "##;

    fn engine() -> Engine {
        let config = parse_config_str(CONFIG).unwrap();
        let controller = ModeController::new(
            config.modes,
            &config.global.initial_mode,
            Box::new(Quiet),
            vec![Box::new(Quiet) as Box<dyn ModeListener>],
        )
        .unwrap();
        Engine::new(controller)
    }

    fn normal_engine() -> Engine {
        let mut engine = engine();
        engine.controller.switch_mode("normal-mode").unwrap();
        engine
    }

    fn at(start: Instant, millis: u64) -> Instant {
        start + Duration::from_millis(millis)
    }

    #[test]
    fn test_eaten_press_and_release() {
        let mut engine = normal_engine();
        let start = Instant::now();

        let outcome = engine.on_key_event(KeyEvent::press(Key::KEY_I, start));
        assert_eq!(outcome.disposition, Disposition::Eat);
        assert_eq!(outcome.commands, vec![Command::StartMove(Direction::Up)]);
        assert!(engine.mouse().moving());

        let outcome = engine.on_key_event(KeyEvent::release(Key::KEY_I, at(start, 50)));
        assert_eq!(outcome.disposition, Disposition::Eat);
        assert_eq!(outcome.commands, vec![Command::StopMove(Direction::Up)]);
        assert!(!engine.mouse().moving());
    }

    #[test]
    fn test_non_eaten_press_is_forwarded() {
        let mut engine = normal_engine();
        let start = Instant::now();

        let outcome = engine.on_key_event(KeyEvent::press(Key::KEY_SPACE, start));
        assert_eq!(outcome.disposition, Disposition::Forward);
        assert_eq!(outcome.commands, vec![Command::PressButton(Button::Left)]);
        assert!(engine.mouse().pressing());

        let outcome = engine.on_key_event(KeyEvent::release(Key::KEY_SPACE, at(start, 50)));
        assert_eq!(outcome.disposition, Disposition::Forward);
        assert_eq!(outcome.commands, vec![Command::ReleaseButton(Button::Left)]);
    }

    #[test]
    fn test_repeated_press_reuses_verdict() {
        let mut engine = normal_engine();
        let start = Instant::now();

        engine.on_key_event(KeyEvent::press(Key::KEY_I, start));
        let outcome = engine.on_key_event(KeyEvent::press(Key::KEY_I, at(start, 30)));
        assert_eq!(outcome.disposition, Disposition::Eat);
        assert!(outcome.commands.is_empty());
    }

    #[test]
    fn test_release_of_unhandled_key_skips_watcher() {
        let mut engine = normal_engine();
        let start = Instant::now();

        let outcome = engine.on_key_event(KeyEvent::press(Key::KEY_Z, start));
        assert_eq!(outcome.disposition, Disposition::Forward);
        let outcome = engine.on_key_event(KeyEvent::release(Key::KEY_Z, at(start, 10)));
        assert_eq!(outcome.disposition, Disposition::Forward);
        assert!(outcome.commands.is_empty());

        // Unknown releases are forwarded untouched.
        let outcome = engine.on_key_event(KeyEvent::release(Key::KEY_X, at(start, 20)));
        assert_eq!(outcome.disposition, Disposition::Forward);
    }

    #[test]
    fn test_change_mode_and_return_from_history() {
        let mut engine = normal_engine();
        let start = Instant::now();

        engine.on_key_event(KeyEvent::press(Key::KEY_W, start));
        assert_eq!(engine.current_mode().name, "wheel-mode");
        engine.on_key_event(KeyEvent::release(Key::KEY_W, at(start, 20)));

        // wheel-mode has no `to` combo; go back through the controller.
        engine
            .controller
            .switch_mode("previous-mode-from-history-stack")
            .unwrap();
        assert_eq!(engine.current_mode().name, "normal-mode");
    }

    #[test]
    fn test_empty_history_error_is_reported() {
        // idle-mode does not push itself, so the history is empty.
        let mut engine = normal_engine();
        let start = Instant::now();

        let outcome = engine.on_key_event(KeyEvent::press(Key::KEY_Q, start));
        assert_eq!(outcome.errors, vec![ModeError::EmptyHistoryStack]);
        assert_eq!(outcome.disposition, Disposition::Eat);
        assert!(outcome.commands.is_empty());
        assert_eq!(engine.current_mode().name, "normal-mode");
    }

    #[test]
    fn test_failed_mode_change_keeps_other_commands() {
        let config = parse_config_str(
            r##"
            mode "idle-mode" {
                press-left "#a"
                to "previous-mode-from-history-stack" "#a"
            }
        "##,
        )
        .unwrap();
        let controller = ModeController::new(
            config.modes,
            &config.global.initial_mode,
            Box::new(Quiet),
            Vec::new(),
        )
        .unwrap();
        let mut engine = Engine::new(controller);

        let outcome = engine.on_key_event(KeyEvent::press(Key::KEY_A, Instant::now()));
        assert_eq!(outcome.disposition, Disposition::Forward);
        assert_eq!(outcome.commands, vec![Command::PressButton(Button::Left)]);
        assert_eq!(outcome.errors, vec![ModeError::EmptyHistoryStack]);
        assert!(engine.mouse().pressing());
        assert_eq!(engine.current_mode().name, "idle-mode");
    }

    #[test]
    fn test_failed_timeout_switch_still_completes_held_combos() {
        let config = parse_config_str(
            r##"
            global {
                initial-mode "hold-mode"
            }

            mode "hold-mode" {
                timeout duration-millis=100 next-mode="previous-mode-from-history-stack"
                press-left "+a-50-1000"
            }
        "##,
        )
        .unwrap();
        let controller = ModeController::new(
            config.modes,
            &config.global.initial_mode,
            Box::new(Quiet),
            Vec::new(),
        )
        .unwrap();
        let mut engine = Engine::new(controller);

        engine.on_key_event(KeyEvent::press(Key::KEY_A, Instant::now()));
        let outcome = engine.tick(Duration::from_millis(100));
        assert_eq!(outcome.errors, vec![ModeError::EmptyHistoryStack]);
        assert_eq!(outcome.commands, vec![Command::PressButton(Button::Left)]);

        // The failed timeout waits a full period before failing again.
        let outcome = engine.tick(Duration::from_millis(10));
        assert!(outcome.errors.is_empty());
    }

    #[test]
    fn test_idle_timeout_through_tick() {
        let mut engine = normal_engine();
        let start = Instant::now();

        // Moving keeps the mode alive.
        engine.on_key_event(KeyEvent::press(Key::KEY_I, start));
        engine.tick(Duration::from_millis(1500));
        assert_eq!(engine.current_mode().name, "normal-mode");

        engine.on_key_event(KeyEvent::release(Key::KEY_I, at(start, 1500)));
        engine.tick(Duration::from_millis(999));
        assert_eq!(engine.current_mode().name, "normal-mode");
        engine.tick(Duration::from_millis(1));
        assert_eq!(engine.current_mode().name, "idle-mode");
    }

    #[test]
    fn test_unhandled_keys_switch_mode_on_tick() {
        let mut engine = normal_engine();
        let start = Instant::now();

        engine.on_key_event(KeyEvent::press(Key::KEY_Z, start));
        assert!(engine.keyboard().pressing_unhandled_keys_only());
        engine.tick(Duration::from_millis(10));
        assert_eq!(engine.current_mode().name, "idle-mode");
    }

    #[test]
    fn test_interrupt_forgets_held_keys() {
        let mut engine = normal_engine();

        engine.on_key_event(KeyEvent::press(Key::KEY_Z, Instant::now()));
        assert!(engine.keyboard().pressing_unhandled_keys_only());
        engine.interrupt();
        assert!(!engine.keyboard().pressing_unhandled_keys_only());

        engine.tick(Duration::from_millis(10));
        assert_eq!(engine.current_mode().name, "normal-mode");
    }

    #[test]
    fn test_attach_counts_as_activity() {
        let mut engine = normal_engine();
        let start = Instant::now();

        engine.tick(Duration::from_millis(900));
        let outcome = engine.on_key_event(KeyEvent::press(Key::KEY_G, start));
        assert_eq!(outcome.commands, vec![Command::AttachMove(Direction::Up)]);
        engine.on_key_event(KeyEvent::release(Key::KEY_G, at(start, 10)));
        engine.tick(Duration::from_millis(200));
        engine.tick(Duration::from_millis(900));
        assert_eq!(engine.current_mode().name, "normal-mode");
    }
}
