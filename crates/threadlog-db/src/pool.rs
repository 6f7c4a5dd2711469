//! Pooled SQLite connections for the activity log.
//!
//! Feed readers and activity writers share one database file. Every pooled
//! connection is switched to WAL so page reads never wait on a log append,
//! and carries a busy timeout so concurrent appends queue instead of failing.

use std::time::Duration;

use r2d2::{CustomizeConnection, Pool};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, OpenFlags};
use thiserror::Error;

/// Runtime tunables for SQLite connection behavior.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DbRuntimeSettings {
    /// How long a connection waits on a locked database, in milliseconds.
    pub busy_timeout_ms: u64,

    /// Maximum number of pooled connections, i.e. concurrent feed requests.
    pub pool_max_size: u32,
}

impl Default for DbRuntimeSettings {
    fn default() -> Self {
        Self {
            busy_timeout_ms: 5_000,
            pool_max_size: 8,
        }
    }
}

/// A type alias for the SQLite connection pool.
pub type DbPool = Pool<SqliteConnectionManager>;

/// Errors that can occur when creating the database pool.
#[derive(Debug, Error)]
pub enum PoolError {
    /// `pool_max_size` was zero.
    #[error("database pool must allow at least one connection")]
    EmptyPool,

    /// Every connection to `:memory:` opens its own private database, so a
    /// larger pool would hand out connections that cannot see each other's
    /// activities.
    #[error(
        "in-memory database cannot be shared by {pool_max_size} pooled connections; \
         use a file path or a pool size of 1"
    )]
    SharedMemory { pool_max_size: u32 },

    /// Failed to build the connection pool.
    #[error("failed to create database connection pool: {0}")]
    PoolInit(#[from] r2d2::Error),
}

/// Setup applied to each connection as the pool opens it.
#[derive(Debug, Clone, Copy)]
struct ConnectionSetup {
    busy_timeout: Duration,
}

impl CustomizeConnection<Connection, rusqlite::Error> for ConnectionSetup {
    fn on_acquire(&self, conn: &mut Connection) -> Result<(), rusqlite::Error> {
        let journal_mode: String =
            conn.pragma_update_and_check(None, "journal_mode", "WAL", |row| row.get(0))?;
        // `:memory:` cannot use WAL and reports "memory".
        if journal_mode != "wal" && journal_mode != "memory" {
            return Err(rusqlite::Error::SqliteFailure(
                rusqlite::ffi::Error::new(rusqlite::ffi::SQLITE_ERROR),
                Some(format!("journal_mode stayed {journal_mode}, expected wal")),
            ));
        }
        conn.busy_timeout(self.busy_timeout)
    }
}

fn is_private_memory(db_path: &str) -> bool {
    db_path == ":memory:" || db_path.is_empty()
}

/// Creates the connection pool for `db_path`.
///
/// # Errors
///
/// - `PoolError::EmptyPool` if `settings.pool_max_size` is zero.
/// - `PoolError::SharedMemory` if `db_path` is a private in-memory database
///   and the pool could hold more than one connection.
/// - `PoolError::PoolInit` if the first connection cannot be opened or set up.
pub fn create_pool(db_path: &str, settings: DbRuntimeSettings) -> Result<DbPool, PoolError> {
    if settings.pool_max_size == 0 {
        return Err(PoolError::EmptyPool);
    }
    if is_private_memory(db_path) && settings.pool_max_size > 1 {
        return Err(PoolError::SharedMemory {
            pool_max_size: settings.pool_max_size,
        });
    }

    let flags = OpenFlags::SQLITE_OPEN_READ_WRITE
        | OpenFlags::SQLITE_OPEN_CREATE
        | OpenFlags::SQLITE_OPEN_FULL_MUTEX;
    let manager = SqliteConnectionManager::file(db_path).with_flags(flags);
    let setup = ConnectionSetup {
        busy_timeout: Duration::from_millis(settings.busy_timeout_ms),
    };

    let pool = Pool::builder()
        .max_size(settings.pool_max_size)
        .connection_customizer(Box::new(setup))
        .build(manager)?;

    tracing::debug!(
        path = db_path,
        max_size = settings.pool_max_size,
        busy_timeout_ms = settings.busy_timeout_ms,
        "opened activity database"
    );

    Ok(pool)
}
