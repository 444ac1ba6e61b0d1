//! Error types for cfgstore-db

use std::time::Duration;

use cfgstore_core::{ScopeError, ScopeId};
use thiserror::Error;

use crate::resource::StatementKind;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug)]
pub enum Error {
    /// Configured table is missing from the database
    #[error("Table '{table}' not found")]
    TableNotFound { table: String },

    /// Table names are interpolated into SQL and must be plain identifiers
    #[error("Invalid table name '{table}'")]
    InvalidTableName { table: String },

    #[error("Configuration path must not be empty")]
    EmptyPath,

    #[error(transparent)]
    Scope(#[from] ScopeError),

    /// The per-kind deadline elapsed; the backing query was dropped
    #[error("{kind} operation cancelled after exceeding its {timeout:?} deadline")]
    DeadlineExceeded {
        kind: StatementKind,
        timeout: Duration,
    },

    #[error("Failed to prepare {kind} statement: {source}")]
    Prepare {
        kind: StatementKind,
        #[source]
        source: sqlx::Error,
    },

    #[error("{kind} of '{path}' in scope {scope} failed: {source}")]
    Query {
        kind: StatementKind,
        scope: ScopeId,
        path: String,
        #[source]
        source: sqlx::Error,
    },

    /// Any operation after `close()`
    #[error("Resource is closed")]
    Closed,

    /// An idle timer or statement finalizer panicked
    #[error("Background task failed: {0}")]
    TimerTask(#[from] tokio::task::JoinError),

    /// Schema creation, introspection or pool setup failed
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

impl Error {
    pub fn table_not_found(table: impl Into<String>) -> Self {
        Self::TableNotFound {
            table: table.into(),
        }
    }

    pub(crate) fn query(
        kind: StatementKind,
        scope: ScopeId,
        path: &str,
        source: sqlx::Error,
    ) -> Self {
        Self::Query {
            kind,
            scope,
            path: path.to_string(),
            source,
        }
    }

    pub fn is_deadline_exceeded(&self) -> bool {
        matches!(self, Self::DeadlineExceeded { .. })
    }

    pub fn is_closed(&self) -> bool {
        matches!(self, Self::Closed)
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::TableNotFound { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::table_not_found("core_config_data");
        assert_eq!(err.to_string(), "Table 'core_config_data' not found");
        assert!(err.is_not_found());

        let err = Error::DeadlineExceeded {
            kind: StatementKind::Read,
            timeout: Duration::from_millis(50),
        };
        assert!(err.is_deadline_exceeded());
        assert!(err.to_string().starts_with("read operation cancelled"));
    }

    #[test]
    fn test_query_error_carries_key() {
        let err = Error::query(
            StatementKind::Write,
            ScopeId::store(3).unwrap(),
            "web/unsecure/base_url",
            sqlx::Error::RowNotFound,
        );
        let text = err.to_string();
        assert!(text.contains("stores/3"));
        assert!(text.contains("web/unsecure/base_url"));
        assert!(std::error::Error::source(&err).is_some());
    }
}
