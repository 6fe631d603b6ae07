//! Configuration loading and management.
//!
//! - [`types`]: top-level config struct and loading
//! - [`listen`]: listener configuration (plain and TLS)

mod listen;
mod types;

pub use listen::{ListenerConfig, TlsConfig};
pub use types::{BouncerConfig, Config, ConfigError, HistoryConfig, StorageConfig};
