//! Ledger Storage
//!
//! SQLite behind an r2d2 pool. Every connection runs in WAL mode with a busy
//! timeout, so concurrent reconciliations on several instances queue on the
//! write lock instead of failing.

mod from_row;
mod schema;
pub mod queries;

pub use schema::init_db;

use std::time::Duration;

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;

use crate::error::Result;

pub type DbPool = Pool<SqliteConnectionManager>;

/// How long a writer waits for the database lock before giving up
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open (or create) the ledger at `database_path` and make sure the schema exists.
pub fn create_pool(database_path: &str) -> Result<DbPool> {
    let manager = SqliteConnectionManager::file(database_path).with_init(|conn| {
        conn.busy_timeout(BUSY_TIMEOUT)?;
        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;
             PRAGMA foreign_keys = ON;",
        )
    });
    let pool = Pool::builder().max_size(10).build(manager)?;

    let conn = pool.get()?;
    init_db(&conn)?;

    Ok(pool)
}
