//! SQLite-backed implementations of the store ports.

pub mod aggregate_repository;
pub mod counter_repository;
pub mod manager;
pub mod raw_event_repository;

pub use aggregate_repository::{SqliteDailyAggregateRepository, SqliteHourlyAggregateRepository};
pub use counter_repository::SqliteCounterRepository;
pub use manager::DbManager;
pub use raw_event_repository::SqliteRawEventRepository;

use tidemark_domain::TidemarkError;
use tokio::task;

pub(crate) fn map_sql_error(err: rusqlite::Error) -> TidemarkError {
    TidemarkError::Database(err.to_string())
}

pub(crate) fn map_join_error(err: task::JoinError) -> TidemarkError {
    if err.is_cancelled() {
        TidemarkError::Internal("blocking store task cancelled".into())
    } else {
        TidemarkError::Internal(format!("blocking store task failed: {err}"))
    }
}
