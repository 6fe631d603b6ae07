//! Message history abstraction.
//!
//! The core never drives history storage directly: the recorder subscribes
//! to the event bus and hands relayed lines to a [`HistoryProvider`] through
//! a bounded queue. Replay queries (`fetch_since`/`fetch_before`) are the
//! provider's read side.

mod noop;
mod recorder;
mod sqlite;

pub use noop::NoOpProvider;
pub use recorder::wire_recorder;
pub use sqlite::SqliteHistory;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum HistoryError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("database error: {0}")]
    Database(String),
}

/// One relayed line as recorded.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedLine {
    /// Owning user's id.
    pub user: String,
    /// Network the line crossed.
    pub network: String,
    /// Buffer the line belongs to (channel name or query nick).
    pub buffer: String,
    /// Whether the line came from a downstream client.
    pub from_client: bool,
    /// The serialized line, without terminator.
    pub line: String,
    pub at: DateTime<Utc>,
}

#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// Store one relayed line.
    async fn record(&self, line: &RecordedLine) -> Result<(), HistoryError>;

    /// Lines in `buffer` strictly after `since`, oldest first, at most
    /// `limit`.
    async fn fetch_since(
        &self,
        user: &str,
        network: &str,
        buffer: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RecordedLine>, HistoryError>;

    /// The `limit` lines in `buffer` closest before `before`, oldest first.
    async fn fetch_before(
        &self,
        user: &str,
        network: &str,
        buffer: &str,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RecordedLine>, HistoryError>;
}
