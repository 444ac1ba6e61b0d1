//! Shared building blocks for cfgstore: scope ids, configuration values and
//! the [`Storage`] contract that backends implement.

pub mod error;
pub mod scope;
pub mod storage;
pub mod value;

pub use error::ScopeError;
pub use scope::{Scope, ScopeId, MAX_INSTANCE_ID};
pub use storage::Storage;
pub use value::ConfigValue;
