//! Lazily prepared statements with idle expiry
//!
//! A [`StatementResource`] owns at most one prepared statement for one
//! operation kind. The statement is prepared on first [`acquire`] on a pool
//! connection that stays pinned to it while open, and is finalized again once
//! no caller has acquired it for the configured idle period.
//!
//! # Locking
//!
//! - `state` (std mutex): slot, stats, lease count and task handles. Never
//!   held across an `.await`.
//! - `opening` (tokio mutex): single-flight gate held while a prepare is in
//!   flight, so late callers wait for the first prepare instead of starting
//!   their own.
//! - the pinned connection (tokio mutex): held by a caller for the duration
//!   of one query. Callers of the same resource run their queries one at a
//!   time.
//!
//! # Finalizing
//!
//! Closing a statement clears the statement cache of its pinned connection
//! before the connection goes back to the pool. A connection whose cache could
//! not be cleared is closed instead of recycled.
//!
//! [`acquire`]: StatementResource::acquire

use std::fmt;
use std::mem;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use std::time::Duration;

use sqlx::pool::PoolConnection;
use sqlx::sqlite::{Sqlite, SqlitePool, SqliteStatement};
use sqlx::{Connection, Executor, Statement};
use tokio::sync::{MappedMutexGuard, Mutex as AsyncMutex, MutexGuard as AsyncMutexGuard};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::error::{Error, Result};
use crate::stats::Stats;

/// A prepared statement detached from the SQL text it was prepared from.
pub type PreparedStatement = SqliteStatement<'static>;

/// Which side of the storage a resource serves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatementKind {
    Read,
    Write,
}

impl StatementKind {
    pub fn as_str(self) -> &'static str {
        match self {
            StatementKind::Read => "read",
            StatementKind::Write => "write",
        }
    }
}

impl fmt::Display for StatementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Pool connection a statement was prepared on.
///
/// Dropped without [`recycle`](Self::recycle) the connection is closed rather
/// than returned, so statements cached on it never reach other pool users.
struct Lent {
    conn: PoolConnection<Sqlite>,
    recycled: bool,
}

impl Lent {
    fn new(conn: PoolConnection<Sqlite>) -> Self {
        Self { conn, recycled: false }
    }

    /// Finalize every statement cached on the connection and return it to
    /// the pool.
    async fn recycle(mut self, kind: StatementKind) {
        match self.conn.clear_cached_statements().await {
            Ok(()) => self.recycled = true,
            Err(err) => warn!(%kind, error = %err, "failed to finalize statement, closing its connection"),
        }
    }
}

impl Drop for Lent {
    fn drop(&mut self) {
        if !self.recycled {
            self.conn.close_on_drop();
        }
    }
}

/// An open statement and the connection it lives on.
struct Pinned {
    statement: PreparedStatement,
    /// `None` once finalized
    conn: AsyncMutex<Option<Lent>>,
}

impl Pinned {
    /// Waits for an in-flight query on the connection to finish first.
    async fn finalize(&self, kind: StatementKind) {
        let lent = self.conn.lock().await.take();
        if let Some(lent) = lent {
            lent.recycle(kind).await;
        }
    }
}

enum Slot {
    Closed,
    Open(Arc<Pinned>),
    /// Owner closed the resource; final
    Terminated,
}

struct State {
    slot: Slot,
    stats: Stats,
    leases: usize,
    /// Idle timer fired while leases were outstanding; the last release closes
    expired: bool,
    timer: Option<JoinHandle<()>>,
    /// Bumped on every re-arm so a stale timer cannot close a fresh statement
    generation: u64,
    /// Background finalizers of statements closed by the timer or a release
    finalizing: Vec<JoinHandle<()>>,
}

struct Shared {
    kind: StatementKind,
    idle: Duration,
    state: Mutex<State>,
}

impl Shared {
    fn lock(&self) -> MutexGuard<'_, State> {
        // State stays consistent across a panic elsewhere, so keep going
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Lease the open statement, `None` if it still has to be prepared.
    fn try_lease(self: &Arc<Self>) -> Result<Option<StatementLease>> {
        let mut state = self.lock();
        let pinned = match &state.slot {
            Slot::Open(pinned) => Arc::clone(pinned),
            Slot::Closed => return Ok(None),
            Slot::Terminated => return Err(Error::Closed),
        };
        Ok(Some(self.lease(&mut state, pinned)))
    }

    /// Store a freshly prepared statement and lease it.
    ///
    /// Hands the statement back if the resource was closed meanwhile.
    fn install(self: &Arc<Self>, pinned: Pinned) -> std::result::Result<StatementLease, Pinned> {
        let mut state = self.lock();
        if matches!(state.slot, Slot::Terminated) {
            return Err(pinned);
        }

        let pinned = Arc::new(pinned);
        state.slot = Slot::Open(Arc::clone(&pinned));
        state.stats.record_open();
        debug!(kind = %self.kind, stats = %state.stats, "statement opened");
        Ok(self.lease(&mut state, pinned))
    }

    fn lease(self: &Arc<Self>, state: &mut State, pinned: Arc<Pinned>) -> StatementLease {
        state.leases += 1;
        state.expired = false;
        self.arm_timer(state);
        StatementLease {
            shared: Arc::clone(self),
            pinned,
        }
    }

    /// Cancel the pending timer and schedule a new one `idle` from now.
    fn arm_timer(self: &Arc<Self>, state: &mut State) {
        if self.idle.is_zero() {
            return;
        }
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }

        state.generation += 1;
        let generation = state.generation;
        let idle = self.idle;
        let shared: Weak<Self> = Arc::downgrade(self);

        state.timer = Some(tokio::spawn(async move {
            tokio::time::sleep(idle).await;
            if let Some(shared) = shared.upgrade() {
                shared.expire(generation);
            }
        }));
    }

    fn expire(&self, generation: u64) {
        let mut state = self.lock();
        if state.generation != generation {
            return;
        }
        state.timer = None;

        if !matches!(state.slot, Slot::Open(_)) {
            return;
        }
        if state.leases > 0 {
            debug!(kind = %self.kind, leases = state.leases, "idle close deferred until release");
            state.expired = true;
            return;
        }
        self.close_statement(&mut state, "idle");
    }

    fn release(&self) {
        let mut state = self.lock();
        state.leases = state.leases.saturating_sub(1);
        if state.leases == 0 && state.expired {
            state.expired = false;
            self.close_statement(&mut state, "idle");
        }
    }

    /// Mark the statement closed and finalize it on a background task.
    fn close_statement(&self, state: &mut State, reason: &str) {
        let Slot::Open(pinned) = mem::replace(&mut state.slot, Slot::Closed) else {
            return;
        };
        state.stats.record_close();
        debug!(kind = %self.kind, reason, stats = %state.stats, "statement closed");

        let kind = self.kind;
        state.finalizing.retain(|task| !task.is_finished());
        state
            .finalizing
            .push(tokio::spawn(async move { pinned.finalize(kind).await }));
    }
}

/// Owner of one lazily prepared statement.
pub struct StatementResource {
    shared: Arc<Shared>,
    opening: AsyncMutex<()>,
    pool: SqlitePool,
    sql: String,
}

impl StatementResource {
    /// Create a closed resource. Nothing is prepared or spawned until the
    /// first [`acquire`](Self::acquire). A zero `idle` disables expiry.
    pub fn new(kind: StatementKind, pool: SqlitePool, sql: impl Into<String>, idle: Duration) -> Self {
        Self {
            shared: Arc::new(Shared {
                kind,
                idle,
                state: Mutex::new(State {
                    slot: Slot::Closed,
                    stats: Stats::default(),
                    leases: 0,
                    expired: false,
                    timer: None,
                    generation: 0,
                    finalizing: Vec::new(),
                }),
            }),
            opening: AsyncMutex::new(()),
            pool,
            sql: sql.into(),
        }
    }

    pub fn kind(&self) -> StatementKind {
        self.shared.kind
    }

    /// Return a ready statement, preparing it if currently closed.
    ///
    /// Every acquire restarts the idle clock. Concurrent callers that find the
    /// statement closed share a single prepare.
    ///
    /// # Errors
    ///
    /// [`Error::Prepare`] with the backing error if no connection could be
    /// checked out or preparing fails (the resource stays closed),
    /// [`Error::Closed`] after [`close`](Self::close).
    pub async fn acquire(&self) -> Result<StatementLease> {
        if let Some(lease) = self.shared.try_lease()? {
            return Ok(lease);
        }

        let _gate = self.opening.lock().await;
        // Someone else may have finished preparing while we waited
        if let Some(lease) = self.shared.try_lease()? {
            return Ok(lease);
        }

        let kind = self.shared.kind;
        debug!(%kind, "preparing statement");
        let conn = self
            .pool
            .acquire()
            .await
            .map_err(|source| Error::Prepare { kind, source })?;
        let mut lent = Lent::new(conn);

        let prepared = Executor::prepare(&mut *lent.conn, self.sql.as_str()).await;
        let statement = match prepared {
            Ok(statement) => Statement::to_owned(&statement),
            Err(source) => {
                lent.recycle(kind).await;
                return Err(Error::Prepare { kind, source });
            }
        };

        let pinned = Pinned {
            statement,
            conn: AsyncMutex::new(Some(lent)),
        };
        match self.shared.install(pinned) {
            Ok(lease) => Ok(lease),
            Err(pinned) => {
                debug!(%kind, "discarding statement prepared after close");
                pinned.finalize(kind).await;
                Err(Error::Closed)
            }
        }
    }

    /// Point-in-time copy of the open/close counters.
    pub fn statistics(&self) -> Stats {
        self.shared.lock().stats
    }

    pub fn is_open(&self) -> bool {
        matches!(self.shared.lock().slot, Slot::Open(_))
    }

    pub fn is_closed(&self) -> bool {
        matches!(self.shared.lock().slot, Slot::Terminated)
    }

    /// Whether an idle timer task is scheduled or still running.
    pub fn has_pending_timer(&self) -> bool {
        self.shared
            .lock()
            .timer
            .as_ref()
            .is_some_and(|timer| !timer.is_finished())
    }

    /// Stop the idle timer and finalize the statement. Idempotent.
    ///
    /// Returns only after the timer and every finalizer have terminated, so
    /// nothing touches the resource or its connection in the background
    /// afterwards.
    pub async fn close(&self) -> Result<()> {
        let kind = self.shared.kind;
        let (timer, pinned, finalizing) = {
            let mut state = self.shared.lock();
            let pinned = match mem::replace(&mut state.slot, Slot::Terminated) {
                Slot::Open(pinned) => {
                    state.stats.record_close();
                    debug!(%kind, reason = "shutdown", stats = %state.stats, "statement closed");
                    Some(pinned)
                }
                Slot::Closed | Slot::Terminated => None,
            };
            state.expired = false;
            state.generation += 1;
            (state.timer.take(), pinned, mem::take(&mut state.finalizing))
        };

        let mut result = Ok(());
        if let Some(timer) = timer {
            timer.abort();
            match timer.await {
                Ok(()) => {}
                Err(err) if err.is_cancelled() => {}
                Err(err) => {
                    warn!(%kind, error = %err, "idle timer task failed");
                    result = Err(Error::TimerTask(err));
                }
            }
        }

        if let Some(pinned) = pinned {
            pinned.finalize(kind).await;
        }
        for task in finalizing {
            if let Err(err) = task.await {
                warn!(%kind, error = %err, "statement finalizer failed");
                if result.is_ok() {
                    result = Err(Error::TimerTask(err));
                }
            }
        }

        result
    }
}

impl Drop for StatementResource {
    fn drop(&mut self) {
        let mut state = self.shared.lock();
        if let Some(timer) = state.timer.take() {
            timer.abort();
        }
        if tokio::runtime::Handle::try_current().is_ok() {
            self.shared.close_statement(&mut state, "dropped");
        }
    }
}

impl fmt::Debug for StatementResource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementResource")
            .field("kind", &self.shared.kind)
            .field("sql", &self.sql)
            .field("idle", &self.shared.idle)
            .field("stats", &self.statistics())
            .finish_non_exhaustive()
    }
}

/// A statement handed out by [`StatementResource::acquire`].
///
/// Holding a lease keeps the idle timer from closing the statement; dropping
/// it (or calling [`release`](Self::release)) lets the timer close it again.
pub struct StatementLease {
    shared: Arc<Shared>,
    pinned: Arc<Pinned>,
}

impl StatementLease {
    pub fn statement(&self) -> &PreparedStatement {
        &self.pinned.statement
    }

    /// Connection the statement is prepared on, exclusively for one query.
    ///
    /// # Errors
    ///
    /// [`Error::Closed`] if the owner closed the resource meanwhile.
    pub async fn connection(&self) -> Result<MappedMutexGuard<'_, PoolConnection<Sqlite>>> {
        let slot = self.pinned.conn.lock().await;
        AsyncMutexGuard::try_map(slot, |slot| slot.as_mut().map(|lent| &mut lent.conn))
            .map_err(|_| Error::Closed)
    }

    pub fn release(self) {
        drop(self);
    }
}

impl Drop for StatementLease {
    fn drop(&mut self) {
        self.shared.release();
    }
}

impl fmt::Debug for StatementLease {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StatementLease")
            .field("kind", &self.shared.kind)
            .field("sql", &self.pinned.statement.sql())
            .finish()
    }
}
