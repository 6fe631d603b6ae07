//! Bouncer user accounts.

use dashmap::DashMap;

use crate::network::upstream::{NetworkConfig, NetworkHandle, UpstreamAddr};
use crate::store::{NetworkRecord, UserRecord};

/// One bouncer account: the unit of credential ownership and the owner of
/// its networks.
///
/// Users are materialized from the store at startup and live for the
/// process lifetime. The network map is mutated only by administrative
/// actions after that.
pub struct User {
    pub id: String,
    /// Argon2 PHC string. Recorded for the deferred PASS verification step;
    /// not checked during client registration yet.
    pub password_hash: String,
    pub default_nick: String,
    pub default_username: String,
    pub default_realname: String,
    networks: DashMap<String, NetworkHandle>,
}

impl User {
    pub fn from_record(record: &UserRecord) -> Self {
        Self {
            id: record.id.clone(),
            password_hash: record.password_hash.clone(),
            default_nick: record.default_nick.clone(),
            default_username: record.default_username.clone(),
            default_realname: record.default_realname.clone(),
            networks: DashMap::new(),
        }
    }

    /// Register a network under this user. Returns `false` if the name is
    /// already taken (names are unique per user).
    pub fn add_network(&self, handle: NetworkHandle) -> bool {
        match self.networks.entry(handle.name().to_string()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(handle);
                true
            }
        }
    }

    /// Look up a network by name.
    pub fn network(&self, name: &str) -> Option<NetworkHandle> {
        self.networks.get(name).map(|entry| entry.value().clone())
    }

    /// The network a session binds to when it names none: first by name,
    /// so the choice is deterministic.
    pub fn default_network(&self) -> Option<NetworkHandle> {
        self.networks_sorted().into_iter().next()
    }

    /// Effective session settings for one of this user's networks:
    /// per-network identity fields fall back to the user's defaults.
    pub fn network_config(&self, record: &NetworkRecord) -> NetworkConfig {
        NetworkConfig {
            user: self.id.clone(),
            name: record.name.clone(),
            nick: record
                .nick
                .clone()
                .unwrap_or_else(|| self.default_nick.clone()),
            username: record
                .username
                .clone()
                .unwrap_or_else(|| self.default_username.clone()),
            realname: record
                .realname
                .clone()
                .unwrap_or_else(|| self.default_realname.clone()),
            password: record.password.clone(),
            addresses: record.addresses.iter().map(UpstreamAddr::from).collect(),
        }
    }

    /// All networks, sorted by name.
    pub fn networks_sorted(&self) -> Vec<NetworkHandle> {
        let mut handles: Vec<NetworkHandle> = self
            .networks
            .iter()
            .map(|entry| entry.value().clone())
            .collect();
        handles.sort_by(|a, b| a.name().cmp(b.name()));
        handles
    }
}
