//! SQL-backed storage for scoped configuration values.
//!
//! # Design
//!
//! - One lazily prepared statement per operation kind ([`StatementResource`]),
//!   pinned to a pool connection while open and finalized after an idle period
//! - Single-flight prepare under concurrent access
//! - Per-kind deadlines on every query
//! - `close()` stops every background timer before it returns
//!
//! # Example
//!
//! ```ignore
//! let pool = cfgstore_db::connect("sqlite://config.db", 5).await?;
//! cfgstore_db::create_config_table(&pool, cfgstore_db::DEFAULT_TABLE_NAME).await?;
//! let tables = Tables::load(pool).await?;
//! let storage = DbStorage::new(&tables, DbStorageOptions::new().with_idle_read(Duration::from_secs(30)))?;
//! storage.set(ScopeId::store(1)?, "general/locale/code", "de_DE").await?;
//! ```

pub mod error;
pub mod options;
pub mod pool;
pub mod resource;
pub mod stats;
pub mod storage;
pub mod tables;

pub use error::{Error, Result};
pub use options::{DbStorageOptions, DEFAULT_TABLE_NAME};
pub use pool::{connect, DEFAULT_MAX_CONNECTIONS};
pub use resource::{PreparedStatement, StatementKind, StatementLease, StatementResource};
pub use stats::Stats;
pub use storage::DbStorage;
pub use tables::{create_config_table, Table, Tables};

pub use sqlx::sqlite::SqlitePool;
