//! Persistent storage for users and their networks.
//!
//! The core only ever talks to the [`DataStore`] trait: list everything at
//! startup, save a network on administrative mutation. The SQLite
//! implementation lives in [`sqlite`].

mod sqlite;

pub use sqlite::SqliteStore;

use argon2::password_hash::{rand_core::OsRng, PasswordHasher, SaltString};
use argon2::Argon2;
use async_trait::async_trait;
use thiserror::Error;

/// Storage errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("user already exists: {0}")]
    UserExists(String),
    #[error("password hashing failed: {0}")]
    Hash(String),
}

/// A persisted user, with its networks.
#[derive(Debug, Clone)]
pub struct UserRecord {
    pub id: String,
    /// Argon2 PHC string.
    pub password_hash: String,
    pub default_nick: String,
    pub default_username: String,
    pub default_realname: String,
    pub networks: Vec<NetworkRecord>,
}

/// A persisted network belonging to one user.
///
/// Optional identity fields fall back to the owning user's defaults.
#[derive(Debug, Clone)]
pub struct NetworkRecord {
    pub name: String,
    pub nick: Option<String>,
    pub username: Option<String>,
    pub realname: Option<String>,
    /// Connect password sent as PASS during the upstream handshake.
    pub password: Option<String>,
    /// Candidate addresses, tried in order.
    pub addresses: Vec<AddressRecord>,
}

/// One candidate upstream address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddressRecord {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

/// The persistence collaborator.
#[async_trait]
pub trait DataStore: Send + Sync {
    /// Load every persisted user with their networks.
    async fn list_all_users(&self) -> Result<Vec<UserRecord>, StoreError>;

    /// Create or update one of a user's networks.
    async fn save_network(&self, user: &str, network: &NetworkRecord) -> Result<(), StoreError>;

    /// Create a new user record.
    async fn create_user(&self, record: &UserRecord) -> Result<(), StoreError>;
}

/// Hash a password for storage using Argon2.
pub fn hash_password(password: &str) -> Result<String, StoreError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| StoreError::Hash(e.to_string()))
}
