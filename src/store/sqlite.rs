//! SQLite-backed [`DataStore`] implementation using SQLx.

use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use sqlx::SqlitePool;
use tracing::info;

use super::{AddressRecord, DataStore, NetworkRecord, StoreError, UserRecord};

static MEMDB_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Store handle with connection pool.
#[derive(Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
}

impl SqliteStore {
    /// Connection acquire timeout - prevents connection storms from blocking
    /// indefinitely.
    const ACQUIRE_TIMEOUT: Duration = Duration::from_secs(5);

    /// Maximum time a connection can remain idle before being closed.
    const IDLE_TIMEOUT: Duration = Duration::from_secs(60);

    /// Open the store, running migrations if needed.
    pub async fn new(path: &str) -> Result<Self, StoreError> {
        let pool = if path == ":memory:" {
            // Use a uniquely named shared-cache memory database per call.
            // `file::memory:` is global-ish and will collide across parallel
            // tests.
            let id = MEMDB_COUNTER.fetch_add(1, Ordering::Relaxed);
            let memdb_uri = format!(
                "file:slircb-memdb-{}-{}?mode=memory&cache=shared",
                std::process::id(),
                id
            );

            let options = SqliteConnectOptions::new()
                .filename(&memdb_uri)
                .shared_cache(true)
                .create_if_missing(true)
                .foreign_keys(true);

            SqlitePoolOptions::new()
                .max_connections(1)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        } else {
            if let Some(parent) = Path::new(path).parent()
                && !parent.as_os_str().is_empty()
                && let Err(e) = std::fs::create_dir_all(parent)
            {
                tracing::warn!(path = %parent.display(), error = %e, "Failed to create database directory");
            }

            let options = SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(true)
                .foreign_keys(true);

            SqlitePoolOptions::new()
                .max_connections(5)
                .acquire_timeout(Self::ACQUIRE_TIMEOUT)
                .idle_timeout(Some(Self::IDLE_TIMEOUT))
                .test_before_acquire(true)
                .connect_with(options)
                .await?
        };

        info!(path = %path, "Store connected");

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(StoreError::Migration)?;

        // WAL mode allows reads to happen while writes are in progress
        sqlx::query("PRAGMA journal_mode=WAL").execute(&pool).await?;

        Ok(Self { pool })
    }
}

#[async_trait]
impl DataStore for SqliteStore {
    async fn list_all_users(&self) -> Result<Vec<UserRecord>, StoreError> {
        let user_rows = sqlx::query_as::<_, (String, String, String, String, String)>(
            r#"
            SELECT id, password_hash, default_nick, default_username, default_realname
            FROM users
            ORDER BY id
            "#,
        )
        .fetch_all(&self.pool)
        .await?;

        let mut users = Vec::with_capacity(user_rows.len());
        for (id, password_hash, default_nick, default_username, default_realname) in user_rows {
            let network_rows = sqlx::query_as::<
                _,
                (String, Option<String>, Option<String>, Option<String>, Option<String>),
            >(
                r#"
                SELECT name, nick, username, realname, password
                FROM networks
                WHERE user_id = ?
                ORDER BY name
                "#,
            )
            .bind(&id)
            .fetch_all(&self.pool)
            .await?;

            let mut networks = Vec::with_capacity(network_rows.len());
            for (name, nick, username, realname, password) in network_rows {
                let addresses = sqlx::query_as::<_, (String, i64, bool)>(
                    r#"
                    SELECT host, port, tls
                    FROM network_addresses
                    WHERE user_id = ? AND network = ?
                    ORDER BY position
                    "#,
                )
                .bind(&id)
                .bind(&name)
                .fetch_all(&self.pool)
                .await?
                .into_iter()
                .map(|(host, port, tls)| AddressRecord {
                    host,
                    port: port as u16,
                    tls,
                })
                .collect();

                networks.push(NetworkRecord {
                    name,
                    nick,
                    username,
                    realname,
                    password,
                    addresses,
                });
            }

            users.push(UserRecord {
                id,
                password_hash,
                default_nick,
                default_username,
                default_realname,
                networks,
            });
        }

        Ok(users)
    }

    async fn save_network(&self, user: &str, network: &NetworkRecord) -> Result<(), StoreError> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO networks (user_id, name, nick, username, realname, password)
            VALUES (?, ?, ?, ?, ?, ?)
            ON CONFLICT (user_id, name) DO UPDATE SET
                nick = excluded.nick,
                username = excluded.username,
                realname = excluded.realname,
                password = excluded.password
            "#,
        )
        .bind(user)
        .bind(&network.name)
        .bind(&network.nick)
        .bind(&network.username)
        .bind(&network.realname)
        .bind(&network.password)
        .execute(&mut *tx)
        .await?;

        sqlx::query("DELETE FROM network_addresses WHERE user_id = ? AND network = ?")
            .bind(user)
            .bind(&network.name)
            .execute(&mut *tx)
            .await?;

        for (position, addr) in network.addresses.iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO network_addresses (user_id, network, position, host, port, tls)
                VALUES (?, ?, ?, ?, ?, ?)
                "#,
            )
            .bind(user)
            .bind(&network.name)
            .bind(position as i64)
            .bind(&addr.host)
            .bind(addr.port as i64)
            .bind(addr.tls)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        Ok(())
    }

    async fn create_user(&self, record: &UserRecord) -> Result<(), StoreError> {
        let now = chrono::Utc::now().timestamp();

        sqlx::query(
            r#"
            INSERT INTO users (id, password_hash, default_nick, default_username,
                               default_realname, created_at)
            VALUES (?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&record.id)
        .bind(&record.password_hash)
        .bind(&record.default_nick)
        .bind(&record.default_username)
        .bind(&record.default_realname)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(|e| {
            if let sqlx::Error::Database(ref db_err) = e
                && db_err.is_unique_violation()
            {
                return StoreError::UserExists(record.id.clone());
            }
            StoreError::from(e)
        })?;

        for network in &record.networks {
            self.save_network(&record.id, network).await?;
        }

        Ok(())
    }
}
