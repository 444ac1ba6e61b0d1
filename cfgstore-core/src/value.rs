use std::fmt;

use serde::{Deserialize, Serialize};

/// A stored configuration value.
///
/// `NULL` in the backing store maps to [`ConfigValue::null`], which is not the
/// same thing as an empty byte sequence.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ConfigValue(Option<Vec<u8>>);

impl ConfigValue {
    /// A value holding bytes
    pub fn new(bytes: impl Into<Vec<u8>>) -> Self {
        Self(Some(bytes.into()))
    }

    /// The `NULL` value
    pub fn null() -> Self {
        Self(None)
    }

    pub fn is_null(&self) -> bool {
        self.0.is_none()
    }

    /// Borrow the bytes, `None` for `NULL`
    pub fn as_bytes(&self) -> Option<&[u8]> {
        self.0.as_deref()
    }

    /// Interpret the bytes as UTF-8, `None` for `NULL` or invalid text
    pub fn as_str(&self) -> Option<&str> {
        self.as_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    pub fn into_inner(self) -> Option<Vec<u8>> {
        self.0
    }
}

impl From<Vec<u8>> for ConfigValue {
    fn from(bytes: Vec<u8>) -> Self {
        Self(Some(bytes))
    }
}

impl From<&[u8]> for ConfigValue {
    fn from(bytes: &[u8]) -> Self {
        Self(Some(bytes.to_vec()))
    }
}

impl From<&str> for ConfigValue {
    fn from(text: &str) -> Self {
        Self(Some(text.as_bytes().to_vec()))
    }
}

impl From<String> for ConfigValue {
    fn from(text: String) -> Self {
        Self(Some(text.into_bytes()))
    }
}

impl From<Option<Vec<u8>>> for ConfigValue {
    fn from(value: Option<Vec<u8>>) -> Self {
        Self(value)
    }
}

impl fmt::Display for ConfigValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.0 {
            Some(bytes) => f.write_str(&String::from_utf8_lossy(bytes)),
            None => f.write_str("NULL"),
        }
    }
}
