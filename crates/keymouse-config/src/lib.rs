//! Configuration model for keymouse
//!
//! This crate holds the combo grammar, key names and the KDL loader that
//! turns a configuration file into a [`ModeMap`].

pub mod combo;
mod error;
pub mod keys;
mod model;
mod parser;

pub use combo::{Combo, ComboMove, ComboMoveDuration, ComboPrecondition};
pub use error::ConfigError;
pub use keys::Key;
pub use model::*;
pub use parser::{parse_config, parse_config_str};
