//! Scope kinds and the packed [`ScopeId`] used as part of every configuration key.
//!
//! A `ScopeId` stores the scope kind in the top 8 bits and the scope instance
//! id in the low 24 bits, so ids of the same kind sort together.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::error::ScopeError;

/// Largest instance id that fits into a packed [`ScopeId`].
pub const MAX_INSTANCE_ID: u32 = 0x00FF_FFFF;

const KIND_SHIFT: u32 = 24;

/// Hierarchical scope under which a configuration value is stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum Scope {
    Absent = 0,
    Default = 1,
    Website = 2,
    Group = 3,
    Store = 4,
}

impl Scope {
    /// All scopes in hierarchy order
    pub const ALL: [Scope; 5] = [
        Scope::Absent,
        Scope::Default,
        Scope::Website,
        Scope::Group,
        Scope::Store,
    ];

    /// Decode the numeric kind stored in the high byte of a packed id
    pub fn from_u8(kind: u8) -> Result<Self, ScopeError> {
        match kind {
            0 => Ok(Scope::Absent),
            1 => Ok(Scope::Default),
            2 => Ok(Scope::Website),
            3 => Ok(Scope::Group),
            4 => Ok(Scope::Store),
            kind => Err(ScopeError::UnknownKind { kind }),
        }
    }

    /// Name persisted in the `scope` column of the backing table
    pub fn as_str(self) -> &'static str {
        match self {
            Scope::Absent => "absent",
            Scope::Default => "default",
            Scope::Website => "websites",
            Scope::Group => "groups",
            Scope::Store => "stores",
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Scope {
    type Err = ScopeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        // Accept singular forms as well, they read naturally on the command line
        match s {
            "absent" => Ok(Scope::Absent),
            "default" => Ok(Scope::Default),
            "websites" | "website" => Ok(Scope::Website),
            "groups" | "group" => Ok(Scope::Group),
            "stores" | "store" => Ok(Scope::Store),
            other => Err(ScopeError::UnknownName {
                name: other.to_string(),
            }),
        }
    }
}

/// Packed scope kind plus scope instance id.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ScopeId(u32);

impl ScopeId {
    /// The default (global) scope, instance 0
    pub const DEFAULT: ScopeId = ScopeId((Scope::Default as u32) << KIND_SHIFT);

    /// Pack a scope kind and instance id.
    ///
    /// # Errors
    ///
    /// Returns [`ScopeError::InstanceOutOfRange`] if `id` exceeds [`MAX_INSTANCE_ID`].
    pub fn pack(scope: Scope, id: u32) -> Result<Self, ScopeError> {
        if id > MAX_INSTANCE_ID {
            return Err(ScopeError::InstanceOutOfRange {
                id,
                max: MAX_INSTANCE_ID,
            });
        }
        Ok(Self(((scope as u32) << KIND_SHIFT) | id))
    }

    /// Shorthand for a website scope id
    pub fn website(id: u32) -> Result<Self, ScopeError> {
        Self::pack(Scope::Website, id)
    }

    /// Shorthand for a group scope id
    pub fn group(id: u32) -> Result<Self, ScopeError> {
        Self::pack(Scope::Group, id)
    }

    /// Shorthand for a store scope id
    pub fn store(id: u32) -> Result<Self, ScopeError> {
        Self::pack(Scope::Store, id)
    }

    /// Rebuild a scope id from its raw packed form, rejecting unknown kinds.
    pub fn from_raw(raw: u32) -> Result<Self, ScopeError> {
        Scope::from_u8((raw >> KIND_SHIFT) as u8)?;
        Ok(Self(raw))
    }

    /// Raw packed value
    pub fn raw(self) -> u32 {
        self.0
    }

    /// Split into scope kind and instance id
    pub fn unpack(self) -> (Scope, u32) {
        (self.scope(), self.id())
    }

    /// Scope kind
    pub fn scope(self) -> Scope {
        // Constructors only ever pack known kinds
        Scope::from_u8((self.0 >> KIND_SHIFT) as u8).unwrap_or(Scope::Absent)
    }

    /// Scope instance id
    pub fn id(self) -> u32 {
        self.0 & MAX_INSTANCE_ID
    }
}

impl Default for ScopeId {
    fn default() -> Self {
        Self::DEFAULT
    }
}

impl fmt::Debug for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ScopeId")
            .field(&self.scope())
            .field(&self.id())
            .finish()
    }
}

impl fmt::Display for ScopeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.scope(), self.id())
    }
}

impl FromStr for ScopeId {
    type Err = ScopeError;

    /// Parses `"stores/2"`; a bare `"default"` means instance 0.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scope, id) = match s.split_once('/') {
            Some((scope, id)) => {
                let id = id
                    .parse::<u32>()
                    .map_err(|e| ScopeError::malformed(s, e.to_string()))?;
                (scope, id)
            }
            None => (s, 0),
        };
        Self::pack(scope.parse()?, id)
    }
}

impl Serialize for ScopeId {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

impl<'de> Deserialize<'de> for ScopeId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let value = String::deserialize(deserializer)?;
        value.parse().map_err(serde::de::Error::custom)
    }
}
