use thiserror::Error;

/// Failure of a mode switch. The controller is left untouched when one is returned.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModeError {
    #[error("Unknown mode: {name}")]
    UnknownMode { name: String },

    #[error("Unable to switch to previous mode as the mode history stack is empty")]
    EmptyHistoryStack,
}
