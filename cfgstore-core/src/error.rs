//! Errors raised while encoding or parsing scope identifiers.
//!
//! Uses `thiserror` so storage backends can wrap it with `#[from]`.

use thiserror::Error;

/// Error type for scope encoding
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ScopeError {
    /// The high byte of a packed id does not name a known scope
    #[error("Unknown scope kind {kind}")]
    UnknownKind { kind: u8 },

    /// Scope name did not match any known scope
    #[error("Unknown scope name '{name}'")]
    UnknownName { name: String },

    /// Instance id does not fit into the packed representation
    #[error("Scope instance id {id} exceeds maximum {max}")]
    InstanceOutOfRange { id: u32, max: u32 },

    /// Textual scope id could not be parsed
    #[error("Malformed scope id '{value}': {reason}")]
    Malformed { value: String, reason: String },
}

impl ScopeError {
    /// Create a malformed scope id error
    pub fn malformed(value: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::Malformed {
            value: value.into(),
            reason: reason.into(),
        }
    }
}
