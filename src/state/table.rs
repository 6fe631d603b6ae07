//! The user registry.

use std::sync::Arc;

use dashmap::DashMap;

use super::user::User;

/// Process-wide registry of bouncer users.
///
/// The raw map is never exposed: loading at startup and administrative
/// mutation go through the accessor operations here.
#[derive(Default)]
pub struct UserTable {
    users: DashMap<String, Arc<User>>,
}

impl UserTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a user at load time. Returns `false` if the id is taken.
    pub fn insert(&self, user: Arc<User>) -> bool {
        match self.users.entry(user.id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => false,
            dashmap::mapref::entry::Entry::Vacant(entry) => {
                entry.insert(user);
                true
            }
        }
    }

    /// Look up a user by id.
    pub fn get(&self, id: &str) -> Option<Arc<User>> {
        self.users.get(id).map(|entry| Arc::clone(entry.value()))
    }

    /// Snapshot of every user, for startup connection kicks and shutdown.
    pub fn all(&self) -> Vec<Arc<User>> {
        self.users
            .iter()
            .map(|entry| Arc::clone(entry.value()))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
