//! Database connection pool management
//!
//! Uses sqlx SqlitePool with WAL journaling and explicit connection limits.

use std::str::FromStr;
use std::time::Duration;

use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

/// Default maximum connections for the pool.
pub const DEFAULT_MAX_CONNECTIONS: u32 = 5;

/// Create a SQLite connection pool.
///
/// # Arguments
///
/// * `database_url` - SQLite connection string, e.g. `sqlite://data/config.db`
/// * `max_connections` - Maximum number of connections in the pool
///
/// # Errors
///
/// Returns an error if the URL is invalid or the database cannot be opened.
pub async fn connect(database_url: &str, max_connections: u32) -> Result<SqlitePool, sqlx::Error> {
    let options = SqliteConnectOptions::from_str(database_url)?
        .create_if_missing(true)
        .journal_mode(SqliteJournalMode::Wal)
        .busy_timeout(Duration::from_secs(5)) // Writers queue instead of failing with SQLITE_BUSY
        .synchronous(SqliteSynchronous::Normal);

    SqlitePoolOptions::new()
        .max_connections(max_connections.max(1))
        .connect_with(options)
        .await
}
