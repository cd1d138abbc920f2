//! SQLite implementations of storage interfaces.

use std::time::Duration;

use sqlx::sqlite::{SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions};
use sqlx::SqlitePool;

mod event_log;
mod read_model;

pub use event_log::SqliteEventLog;
pub use read_model::SqliteReadModel;


/// Open a pool on `path`, or on a private in-memory database when `None`.
///
/// An in-memory database exists per connection, so that pool is capped at
/// one connection.
pub async fn connect(path: Option<&str>) -> Result<SqlitePool, sqlx::Error> {
    match path {
        Some(path) => {
            let opts = SqliteConnectOptions::new()
                .filename(path.trim_start_matches("sqlite:"))
                .journal_mode(SqliteJournalMode::Wal)
                .busy_timeout(Duration::from_secs(30))
                .create_if_missing(true);
            SqlitePoolOptions::new()
                .max_connections(5)
                .connect_with(opts)
                .await
        }
        None => {
            SqlitePoolOptions::new()
                .max_connections(1)
                .idle_timeout(None)
                .max_lifetime(None)
                .connect("sqlite::memory:")
                .await
        }
    }
}
