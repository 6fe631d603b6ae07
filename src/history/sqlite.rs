//! SQLite-backed history provider.
//!
//! Keeps its own pool and schema, separate from the user store, so the
//! history file can live on different storage and be pruned or deleted
//! independently.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use super::{HistoryError, HistoryProvider, RecordedLine};

/// History store handle.
#[derive(Clone)]
pub struct SqliteHistory {
    pool: SqlitePool,
}

impl SqliteHistory {
    /// Open (and create if needed) the history database.
    pub async fn new(path: &str) -> Result<Self, HistoryError> {
        let options = SqliteConnectOptions::new()
            .filename(path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(2)
            .connect_with(options)
            .await
            .map_err(|e| HistoryError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS history (
                user_id TEXT NOT NULL,
                network TEXT NOT NULL,
                buffer TEXT NOT NULL,
                from_client INTEGER NOT NULL,
                line TEXT NOT NULL,
                at_millis INTEGER NOT NULL
            )
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| HistoryError::Database(e.to_string()))?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS history_lookup
            ON history (user_id, network, buffer, at_millis)
            "#,
        )
        .execute(&pool)
        .await
        .map_err(|e| HistoryError::Database(e.to_string()))?;

        info!(path = %path, "History store connected");

        Ok(Self { pool })
    }

    fn row_to_line(
        (user, network, buffer, from_client, line, at_millis): (
            String,
            String,
            String,
            bool,
            String,
            i64,
        ),
    ) -> RecordedLine {
        RecordedLine {
            user,
            network,
            buffer,
            from_client,
            line,
            at: DateTime::<Utc>::from_timestamp_millis(at_millis).unwrap_or_default(),
        }
    }
}

#[async_trait]
impl HistoryProvider for SqliteHistory {
    async fn record(&self, line: &RecordedLine) -> Result<(), HistoryError> {
        sqlx::query(
            r#"
            INSERT INTO history (user_id, network, buffer, from_client, line, at_millis)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&line.user)
        .bind(&line.network)
        .bind(&line.buffer)
        .bind(line.from_client)
        .bind(&line.line)
        .bind(line.at.timestamp_millis())
        .execute(&self.pool)
        .await
        .map_err(|e| HistoryError::Database(e.to_string()))?;
        Ok(())
    }

    async fn fetch_since(
        &self,
        user: &str,
        network: &str,
        buffer: &str,
        since: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RecordedLine>, HistoryError> {
        let rows = sqlx::query_as::<_, (String, String, String, bool, String, i64)>(
            r#"
            SELECT user_id, network, buffer, from_client, line, at_millis
            FROM history
            WHERE user_id = ? AND network = ? AND buffer = ? AND at_millis > ?
            ORDER BY at_millis ASC
            LIMIT ?
            "#,
        )
        .bind(user)
        .bind(network)
        .bind(buffer)
        .bind(since.timestamp_millis())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HistoryError::Database(e.to_string()))?;

        Ok(rows.into_iter().map(Self::row_to_line).collect())
    }

    async fn fetch_before(
        &self,
        user: &str,
        network: &str,
        buffer: &str,
        before: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<RecordedLine>, HistoryError> {
        let mut rows = sqlx::query_as::<_, (String, String, String, bool, String, i64)>(
            r#"
            SELECT user_id, network, buffer, from_client, line, at_millis
            FROM history
            WHERE user_id = ? AND network = ? AND buffer = ? AND at_millis < ?
            ORDER BY at_millis DESC
            LIMIT ?
            "#,
        )
        .bind(user)
        .bind(network)
        .bind(buffer)
        .bind(before.timestamp_millis())
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| HistoryError::Database(e.to_string()))?;

        // Oldest first, like fetch_since.
        rows.reverse();
        Ok(rows.into_iter().map(Self::row_to_line).collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn line_at(buffer: &str, text: &str, secs: i64) -> RecordedLine {
        RecordedLine {
            user: "daniel".to_string(),
            network: "exampleNet".to_string(),
            buffer: buffer.to_string(),
            from_client: false,
            line: text.to_string(),
            at: Utc.timestamp_opt(secs, 0).unwrap(),
        }
    }

    async fn temp_history() -> (SqliteHistory, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("history.db");
        let history = SqliteHistory::new(path.to_str().unwrap()).await.unwrap();
        (history, dir)
    }

    #[tokio::test]
    async fn record_and_fetch_since() {
        let (history, _dir) = temp_history().await;
        for (i, text) in ["one", "two", "three"].iter().enumerate() {
            history
                .record(&line_at("#chan", text, 100 + i as i64))
                .await
                .unwrap();
        }

        let lines = history
            .fetch_since(
                "daniel",
                "exampleNet",
                "#chan",
                Utc.timestamp_opt(100, 0).unwrap(),
                10,
            )
            .await
            .unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line, "two");
        assert_eq!(lines[1].line, "three");
    }

    #[tokio::test]
    async fn fetch_before_is_oldest_first() {
        let (history, _dir) = temp_history().await;
        for (i, text) in ["one", "two", "three", "four"].iter().enumerate() {
            history
                .record(&line_at("#chan", text, 100 + i as i64))
                .await
                .unwrap();
        }

        let lines = history
            .fetch_before(
                "daniel",
                "exampleNet",
                "#chan",
                Utc.timestamp_opt(103, 0).unwrap(),
                2,
            )
            .await
            .unwrap();
        assert_eq!(lines.len(), 2);
        assert_eq!(lines[0].line, "two");
        assert_eq!(lines[1].line, "three");
    }

    #[tokio::test]
    async fn buffers_are_isolated() {
        let (history, _dir) = temp_history().await;
        history.record(&line_at("#a", "in-a", 100)).await.unwrap();
        history.record(&line_at("#b", "in-b", 101)).await.unwrap();

        let lines = history
            .fetch_since(
                "daniel",
                "exampleNet",
                "#a",
                Utc.timestamp_opt(0, 0).unwrap(),
                10,
            )
            .await
            .unwrap();
        assert_eq!(lines.len(), 1);
        assert_eq!(lines[0].line, "in-a");
    }
}
