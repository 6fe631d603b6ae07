//! Shared process-wide state handed to every connection task.

use std::sync::Arc;

use slircb_proto::Prefix;

use super::ids::ClientIdGen;
use super::table::UserTable;
use crate::bus::EventBus;

/// Nick of the bouncer's reserved status/control identity.
pub const STATUS_NICK: &str = "*status";

/// Build the `*status!bnc@<source>` prefix used on synthetic messages.
pub fn status_prefix(source: &str) -> Prefix {
    Prefix::new(STATUS_NICK, "bnc", source)
}

/// Everything a client session needs a handle on.
pub struct Bouncer {
    /// Source name used on messages the bouncer originates itself.
    pub source: String,
    pub users: Arc<UserTable>,
    pub bus: Arc<EventBus>,
    pub ids: ClientIdGen,
}

impl Bouncer {
    pub fn new(source: String, users: Arc<UserTable>, bus: Arc<EventBus>) -> Self {
        Self {
            source,
            users,
            bus,
            ids: ClientIdGen::new(),
        }
    }

    /// The `*status` prefix for this bouncer's source name.
    pub fn status_prefix(&self) -> Prefix {
        status_prefix(&self.source)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_prefix_format() {
        assert_eq!(
            status_prefix("irc.slircb").to_string(),
            "*status!bnc@irc.slircb"
        );
    }
}
