//! The key/value contract implemented by configuration backends.

use async_trait::async_trait;

use crate::scope::ScopeId;
use crate::value::ConfigValue;

/// Storage backend for scoped configuration values.
///
/// Every call goes to the backend; implementations do not cache values.
#[async_trait]
pub trait Storage: Send + Sync {
    type Error: std::error::Error + Send + Sync + 'static;

    /// Look up the value stored for `path` in `scope`.
    ///
    /// Returns `Ok(None)` when no record exists. A record holding `NULL`
    /// returns `Ok(Some(ConfigValue::null()))`.
    async fn get(&self, scope: ScopeId, path: &str) -> Result<Option<ConfigValue>, Self::Error>;

    /// Insert or overwrite the value for `path` in `scope`.
    async fn set(&self, scope: ScopeId, path: &str, value: ConfigValue) -> Result<(), Self::Error>;

    /// Release backend resources. Calling it twice is allowed.
    async fn close(&self) -> Result<(), Self::Error>;
}
