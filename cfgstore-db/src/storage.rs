//! SQL-backed configuration storage
//!
//! [`DbStorage`] keeps one [`StatementResource`] for reads and one for writes.
//! Each call is bounded by the configured per-kind deadline and goes straight
//! to the database; nothing is cached.

use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use cfgstore_core::{ConfigValue, ScopeId, Storage};
use sqlx::{Row, Statement};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::options::DbStorageOptions;
use crate::resource::{StatementKind, StatementResource};
use crate::stats::Stats;
use crate::tables::{validate_identifier, Table, Tables};

fn select_value_sql(table: &str) -> String {
    format!(r#"SELECT value FROM "{table}" WHERE scope = ? AND scope_id = ? AND path = ?"#)
}

fn upsert_value_sql(table: &str) -> String {
    format!(
        r#"INSERT INTO "{table}" (scope, scope_id, path, value) VALUES (?, ?, ?, ?)
        ON CONFLICT (scope, scope_id, path) DO UPDATE SET value = excluded.value"#
    )
}

/// Key/value configuration storage over a single table.
///
/// Each open statement holds one pool connection, so a storage with both
/// sides open uses two.
pub struct DbStorage {
    read: StatementResource,
    write: StatementResource,
    timeout_read: Duration,
    timeout_write: Duration,
    /// `None` once closed
    table: Mutex<Option<Table>>,
}

impl DbStorage {
    /// Build a storage over the configured table.
    ///
    /// No statement is prepared and no timer is started until first use.
    ///
    /// # Errors
    ///
    /// [`Error::TableNotFound`] if the table is not in `tables` and schema
    /// validation is not skipped; [`Error::InvalidTableName`] for names that
    /// are not plain identifiers.
    pub fn new(tables: &Tables, options: DbStorageOptions) -> Result<Self> {
        let name = options.table_name();
        let table = if options.skip_schema_validation {
            validate_identifier(name)?;
            tables.table_unchecked(name)
        } else {
            tables.table(name)?
        };

        let pool = table.pool().clone();
        let read = StatementResource::new(
            StatementKind::Read,
            pool.clone(),
            select_value_sql(table.name()),
            options.idle_read,
        );
        let write = StatementResource::new(
            StatementKind::Write,
            pool,
            upsert_value_sql(table.name()),
            options.idle_write,
        );

        debug!(
            table = table.name(),
            idle_read = ?options.idle_read,
            idle_write = ?options.idle_write,
            "database storage ready"
        );

        Ok(Self {
            read,
            write,
            timeout_read: options.context_timeout_read,
            timeout_write: options.context_timeout_write,
            table: Mutex::new(Some(table)),
        })
    }

    /// Like [`new`](Self::new) but panics with the construction error.
    ///
    /// For process wiring that cannot continue with a broken configuration.
    /// The panic payload is the [`Error`] itself.
    pub fn must_new(tables: &Tables, options: DbStorageOptions) -> Self {
        match Self::new(tables, options) {
            Ok(storage) => storage,
            Err(err) => {
                error!(error = %err, "failed to build database storage");
                std::panic::panic_any(err)
            }
        }
    }

    /// Name of the backing table, `None` once closed.
    pub fn table_name(&self) -> Option<String> {
        self.table().as_ref().map(|t| t.name().to_string())
    }

    /// Fetch the value stored for `path` in `scope`.
    ///
    /// `Ok(None)` if no record exists, `Ok(Some(ConfigValue::null()))` for a
    /// record holding `NULL`.
    pub async fn get(&self, scope: ScopeId, path: &str) -> Result<Option<ConfigValue>> {
        self.ensure_open()?;
        validate_path(path)?;
        let (kind, id) = scope.unpack();

        let value = bounded(StatementKind::Read, self.timeout_read, async {
            let lease = self.read.acquire().await?;
            let mut conn = lease.connection().await?;
            let row = lease
                .statement()
                .query()
                .bind(kind.as_str())
                .bind(i64::from(id))
                .bind(path.to_string())
                .fetch_optional(&mut **conn)
                .await
                .map_err(|source| Error::query(StatementKind::Read, scope, path, source))?;
            drop(conn);
            lease.release();

            row.map(|row| row.try_get::<Option<Vec<u8>>, _>(0))
                .transpose()
                .map_err(|source| Error::query(StatementKind::Read, scope, path, source))
        })
        .await?;

        Ok(value.map(ConfigValue::from))
    }

    /// Insert or overwrite the value for `path` in `scope`.
    pub async fn set(&self, scope: ScopeId, path: &str, value: impl Into<ConfigValue>) -> Result<()> {
        self.ensure_open()?;
        validate_path(path)?;
        let (kind, id) = scope.unpack();
        let value = value.into().into_inner();

        bounded(StatementKind::Write, self.timeout_write, async {
            let lease = self.write.acquire().await?;
            let mut conn = lease.connection().await?;
            lease
                .statement()
                .query()
                .bind(kind.as_str())
                .bind(i64::from(id))
                .bind(path.to_string())
                .bind(value)
                .execute(&mut **conn)
                .await
                .map_err(|source| Error::query(StatementKind::Write, scope, path, source))?;
            drop(conn);
            lease.release();
            Ok(())
        })
        .await
    }

    /// Close both statements and drop the table handle. Idempotent.
    ///
    /// Both resources are always closed and every timer is stopped before
    /// this returns; the first error is reported.
    pub async fn close(&self) -> Result<()> {
        if self.table().take().is_some() {
            debug!("closing database storage");
        }

        let (read, write) = tokio::join!(self.read.close(), self.write.close());
        read.and(write)
    }

    /// Snapshots of the read and write counters.
    pub fn statistics(&self) -> (Stats, Stats) {
        (self.read.statistics(), self.write.statistics())
    }

    pub fn is_closed(&self) -> bool {
        self.table().is_none()
    }

    /// Whether any idle timer task is still scheduled.
    pub fn has_pending_timers(&self) -> bool {
        self.read.has_pending_timer() || self.write.has_pending_timer()
    }

    fn table(&self) -> MutexGuard<'_, Option<Table>> {
        self.table.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn ensure_open(&self) -> Result<()> {
        if self.is_closed() {
            return Err(Error::Closed);
        }
        Ok(())
    }
}

impl std::fmt::Debug for DbStorage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbStorage")
            .field("table", &self.table_name())
            .field("read", &self.read)
            .field("write", &self.write)
            .field("timeout_read", &self.timeout_read)
            .field("timeout_write", &self.timeout_write)
            .finish()
    }
}

#[async_trait]
impl Storage for DbStorage {
    type Error = Error;

    async fn get(&self, scope: ScopeId, path: &str) -> Result<Option<ConfigValue>> {
        DbStorage::get(self, scope, path).await
    }

    async fn set(&self, scope: ScopeId, path: &str, value: ConfigValue) -> Result<()> {
        DbStorage::set(self, scope, path, value).await
    }

    async fn close(&self) -> Result<()> {
        DbStorage::close(self).await
    }
}

fn validate_path(path: &str) -> Result<()> {
    if path.is_empty() {
        return Err(Error::EmptyPath);
    }
    Ok(())
}

/// Run `operation` under `timeout`; zero means no deadline of our own.
///
/// On expiry the future is dropped, which cancels the in-flight query.
async fn bounded<T>(
    kind: StatementKind,
    timeout: Duration,
    operation: impl Future<Output = Result<T>>,
) -> Result<T> {
    if timeout.is_zero() {
        return operation.await;
    }

    match tokio::time::timeout(timeout, operation).await {
        Ok(result) => result,
        Err(_) => {
            warn!(%kind, ?timeout, "operation exceeded deadline");
            Err(Error::DeadlineExceeded { kind, timeout })
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn statements_quote_table_name() {
        assert_eq!(
            select_value_sql("cfg"),
            r#"SELECT value FROM "cfg" WHERE scope = ? AND scope_id = ? AND path = ?"#
        );
        assert!(upsert_value_sql("cfg").contains("ON CONFLICT (scope, scope_id, path)"));
    }

    #[test]
    fn empty_path_rejected() {
        assert!(matches!(validate_path(""), Err(Error::EmptyPath)));
        assert!(validate_path("general/locale/code").is_ok());
    }

    #[tokio::test]
    async fn bounded_without_timeout_waits() {
        let result = bounded(StatementKind::Read, Duration::ZERO, async {
            tokio::time::sleep(Duration::from_millis(20)).await;
            Ok(7)
        })
        .await;
        assert_eq!(result.unwrap(), 7);
    }

    #[tokio::test]
    async fn bounded_reports_deadline() {
        let result: Result<()> = bounded(StatementKind::Write, Duration::from_millis(10), async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok(())
        })
        .await;
        assert!(result.unwrap_err().is_deadline_exceeded());
    }
}
