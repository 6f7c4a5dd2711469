//! Database layer for threadlog.
//!
//! Provides SQLite connection pooling (via `r2d2`), WAL-mode initialization,
//! and embedded SQL migrations for the activity log and the entity store
//! table that backs it.
//!
//! # Design decisions
//!
//! - **SQLite with WAL mode**: readers page through the feed while domain
//!   actions append activities; WAL lets those readers proceed alongside the
//!   single writer.
//! - **Embedded migrations**: SQL files are compiled into the binary via
//!   `include_str!` so the schema ships with the code that queries it.

mod migrations;
mod pool;

pub use migrations::{run_migrations, MigrationError};
pub use pool::{create_pool, DbPool, DbRuntimeSettings, PoolError};
