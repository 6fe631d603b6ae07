//! No-op history provider, used when recording is disabled.

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use super::{HistoryError, HistoryProvider, RecordedLine};

/// Discards every record and answers every query with nothing.
pub struct NoOpProvider;

#[async_trait]
impl HistoryProvider for NoOpProvider {
    async fn record(&self, _line: &RecordedLine) -> Result<(), HistoryError> {
        Ok(())
    }

    async fn fetch_since(
        &self,
        _user: &str,
        _network: &str,
        _buffer: &str,
        _since: DateTime<Utc>,
        _limit: usize,
    ) -> Result<Vec<RecordedLine>, HistoryError> {
        Ok(Vec::new())
    }

    async fn fetch_before(
        &self,
        _user: &str,
        _network: &str,
        _buffer: &str,
        _before: DateTime<Utc>,
        _limit: usize,
    ) -> Result<Vec<RecordedLine>, HistoryError> {
        Ok(Vec::new())
    }
}
