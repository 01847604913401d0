//! Mode listeners and cursor visibility reporting through `tracing`

use keymouse_config::Mode;

use crate::mode_controller::{CursorVisibility, ModeListener};

/// Logs mode changes and timeouts.
#[derive(Debug, Default)]
pub struct LoggingModeListener;

impl ModeListener for LoggingModeListener {
    fn mode_changed(&mut self, mode: &Mode) {
        tracing::info!(
            combos = mode.combo_map.len(),
            push_to_history = mode.push_to_history,
            "Entered {}",
            mode.name
        );
    }

    fn mode_timed_out(&mut self) {
        tracing::info!("Mode timed out");
    }
}

/// Tracks the requested cursor visibility.
///
/// Pointer rendering belongs to the compositor, so this only records and logs
/// the requests.
#[derive(Debug, Default)]
pub struct LoggingCursor {
    hidden: bool,
}

impl CursorVisibility for LoggingCursor {
    fn hide_cursor(&mut self) {
        if !self.hidden {
            tracing::debug!("Hiding cursor");
        }
        self.hidden = true;
    }

    fn show_cursor(&mut self) {
        if self.hidden {
            tracing::debug!("Showing cursor");
        }
        self.hidden = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_logging_cursor_tracks_visibility() {
        let mut cursor = LoggingCursor::default();
        assert!(!cursor.hidden);
        cursor.hide_cursor();
        cursor.hide_cursor();
        assert!(cursor.hidden);
        cursor.show_cursor();
        assert!(!cursor.hidden);
    }
}
