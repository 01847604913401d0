use miette::Diagnostic;
use thiserror::Error;

#[derive(Error, Diagnostic, Debug)]
pub enum ConfigError {
    #[error("Failed to parse KDL")]
    #[diagnostic(code(keymouse::config::parse_error))]
    ParseError {
        #[source_code]
        src: String,
        #[label("here")]
        span: miette::SourceSpan,
        #[source]
        source: kdl::KdlError,
    },

    #[error("Invalid configuration: {message}")]
    #[diagnostic(code(keymouse::config::invalid))]
    Invalid { message: String },

    #[error("Missing required field: {field}")]
    #[diagnostic(code(keymouse::config::missing_field))]
    MissingField { field: String },

    #[error("Unknown key: {key}")]
    #[diagnostic(code(keymouse::config::unknown_key))]
    UnknownKey { key: String },

    #[error("Unknown command '{name}' in mode '{mode}'")]
    #[diagnostic(
        code(keymouse::config::unknown_command),
        help("commands look like `start-move-up`, `stop-wheel-left`, `press-right` or `to`")
    )]
    UnknownCommand { mode: String, name: String },

    #[error("Invalid combo '{combo}': {reason}")]
    #[diagnostic(code(keymouse::config::invalid_combo))]
    InvalidCombo { combo: String, reason: String },

    #[error("Definition of mode '{mode}' is missing (referenced by {referenced_by})")]
    #[diagnostic(code(keymouse::config::unknown_mode_reference))]
    UnknownModeReference { mode: String, referenced_by: String },

    #[error("Definition of mode timeout for '{mode}' is incomplete")]
    #[diagnostic(
        code(keymouse::config::incomplete_timeout),
        help("a timeout needs both `duration-millis` and `next-mode`")
    )]
    IncompleteTimeout { mode: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl ConfigError {
    pub(crate) fn invalid_combo(combo: &str, reason: impl Into<String>) -> Self {
        ConfigError::InvalidCombo {
            combo: combo.to_string(),
            reason: reason.into(),
        }
    }
}
