//! Table metadata
//!
//! [`Tables`] is a snapshot of the tables present in the database, taken once
//! via `sqlite_master`. Storage construction resolves its table through it so
//! a missing table is reported up front instead of on the first query.

use std::collections::BTreeSet;

use sqlx::sqlite::SqlitePool;
use tracing::debug;

use crate::error::{Error, Result};

/// A resolved table together with the pool it lives in.
#[derive(Debug, Clone)]
pub struct Table {
    name: String,
    pool: SqlitePool,
}

impl Table {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }
}

/// Known tables of one database.
#[derive(Debug, Clone)]
pub struct Tables {
    pool: SqlitePool,
    names: BTreeSet<String>,
}

impl Tables {
    /// Introspect the database behind `pool`.
    pub async fn load(pool: SqlitePool) -> Result<Self> {
        let names: Vec<String> = sqlx::query_scalar(
            "SELECT name FROM sqlite_master WHERE type = 'table' AND name NOT LIKE 'sqlite_%'",
        )
        .fetch_all(&pool)
        .await?;

        debug!(count = names.len(), "loaded table metadata");
        Ok(Self {
            pool,
            names: names.into_iter().collect(),
        })
    }

    /// A collection that knows no tables; use with schema validation skipped.
    pub fn unchecked(pool: SqlitePool) -> Self {
        Self {
            pool,
            names: BTreeSet::new(),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.names.iter().map(String::as_str)
    }

    /// Resolve a table, failing with [`Error::TableNotFound`] if it is unknown.
    pub fn table(&self, name: &str) -> Result<Table> {
        validate_identifier(name)?;
        if !self.contains(name) {
            return Err(Error::table_not_found(name));
        }
        Ok(self.table_unchecked(name))
    }

    pub(crate) fn table_unchecked(&self, name: &str) -> Table {
        Table {
            name: name.to_string(),
            pool: self.pool.clone(),
        }
    }
}

/// Table names end up inside SQL text, so only `[A-Za-z_][A-Za-z0-9_]*` is allowed.
pub(crate) fn validate_identifier(name: &str) -> Result<()> {
    let mut chars = name.chars();
    let valid = matches!(chars.next(), Some(c) if c.is_ascii_alphabetic() || c == '_')
        && chars.all(|c| c.is_ascii_alphanumeric() || c == '_');

    if valid {
        Ok(())
    } else {
        Err(Error::InvalidTableName {
            table: name.to_string(),
        })
    }
}

/// Create the configuration table and its unique key if missing.
pub async fn create_config_table(pool: &SqlitePool, name: &str) -> Result<()> {
    validate_identifier(name)?;
    let schema = format!(
        r#"
        CREATE TABLE IF NOT EXISTS "{name}" (
            config_id INTEGER PRIMARY KEY AUTOINCREMENT,
            scope TEXT NOT NULL DEFAULT 'default',
            scope_id INTEGER NOT NULL DEFAULT 0,
            path TEXT NOT NULL,
            value BLOB,
            UNIQUE (scope, scope_id, path)
        );
        "#
    );
    sqlx::raw_sql(&schema).execute(pool).await?;
    debug!(table = name, "ensured configuration table");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::connect;

    async fn temp_pool() -> (SqlitePool, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}", dir.path().join("tables.db").display());
        (connect(&url, 2).await.unwrap(), dir)
    }

    #[test]
    fn identifier_validation() {
        assert!(validate_identifier("core_config_data").is_ok());
        assert!(validate_identifier("_t1").is_ok());
        assert!(validate_identifier("").is_err());
        assert!(validate_identifier("1table").is_err());
        assert!(validate_identifier("t; DROP TABLE x").is_err());
    }

    #[tokio::test]
    async fn load_sees_created_table() {
        let (pool, _dir) = temp_pool().await;
        create_config_table(&pool, "core_config_data").await.unwrap();

        let tables = Tables::load(pool).await.unwrap();
        assert!(tables.contains("core_config_data"));
        assert_eq!(tables.table("core_config_data").unwrap().name(), "core_config_data");
    }

    #[tokio::test]
    async fn missing_table_is_not_found() {
        let (pool, _dir) = temp_pool().await;
        let tables = Tables::load(pool).await.unwrap();

        let err = tables.table("core_config_data").unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn create_is_idempotent() {
        let (pool, _dir) = temp_pool().await;
        create_config_table(&pool, "cfg").await.unwrap();
        create_config_table(&pool, "cfg").await.unwrap();

        let tables = Tables::load(pool).await.unwrap();
        assert_eq!(tables.names().filter(|n| *n == "cfg").count(), 1);
    }
}
