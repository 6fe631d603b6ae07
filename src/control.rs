//! The `*status` control surface.
//!
//! A bus subscriber intercepts PRIVMSGs addressed to the reserved status
//! identity before they can reach any network, parses them into
//! administrative actions, and replies over the originating session.
//! Read-only actions and connect/disconnect run inline in the subscriber;
//! `addnetwork` mutates the registry and the store, so it is funneled
//! through a single-owner admin task.

use std::sync::Arc;

use slircb_proto::{clean_name, Command, Message, Prefix};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::bus::{ClientOrigin, Direction, Event, EventBus, EventName, Origin};
use crate::network::upstream::{LinkState, NetworkSession};
use crate::state::{status_prefix, UserTable, User, STATUS_NICK};
use crate::store::{AddressRecord, DataStore, NetworkRecord};

const ADMIN_QUEUE: usize = 16;

/// Registry-mutating actions, serialized through the admin task.
pub enum AdminRequest {
    AddNetwork {
        user: Arc<User>,
        record: NetworkRecord,
        origin: ClientOrigin,
    },
}

/// Reply to the originating session as `*status`.
fn send(origin: &ClientOrigin, prefix: &Prefix, text: &str) {
    let msg = Message::privmsg(origin.nick.clone(), text).with_prefix(prefix.clone());
    let _ = origin.reply.try_send(msg);
}

/// Register the control subscriber. Must run during startup wiring, before
/// the bus is frozen.
pub fn register(
    bus: &mut EventBus,
    users: Arc<UserTable>,
    admin_tx: mpsc::Sender<AdminRequest>,
    source: &str,
) {
    let prefix = status_prefix(source);
    bus.register(EventName::IrcRaw, move |event| {
        let Event::IrcRaw(ev) = event else { return };
        if ev.direction != Direction::FromClient {
            return;
        }
        let (target, text) = match &ev.message.command {
            Command::PRIVMSG(target, text) => (target.clone(), text.clone()),
            _ => return,
        };
        if !target.eq_ignore_ascii_case(STATUS_NICK) {
            return;
        }
        let origin = match &ev.origin {
            Origin::Client(origin) => origin.clone(),
            Origin::Network(_) => return,
        };

        // Stop the message from being sent upstream.
        ev.halt();

        dispatch(&users, &admin_tx, &prefix, &origin, &text);
    });
}

fn dispatch(
    users: &UserTable,
    admin_tx: &mpsc::Sender<AdminRequest>,
    prefix: &Prefix,
    origin: &ClientOrigin,
    text: &str,
) {
    let mut parts = text.split_whitespace();
    let command = parts.next().unwrap_or("").to_ascii_lowercase();
    let params: Vec<&str> = parts.collect();

    match command.as_str() {
        "listnetworks" => list_networks(users, origin, prefix),
        "addnetwork" => add_network(users, admin_tx, origin, prefix, &params),
        "connect" => connect_network(users, origin, prefix, &params),
        "disconnect" => disconnect_network(users, origin, prefix, &params),
        _ => send(
            origin,
            prefix,
            "Unknown command. Commands: listnetworks, addnetwork, connect, disconnect",
        ),
    }
}

fn list_networks(users: &UserTable, origin: &ClientOrigin, prefix: &Prefix) {
    let Some(user) = users.get(&origin.user) else {
        return;
    };

    send(origin, prefix, "Name / Nick / Connected / Address");
    for network in user.networks_sorted() {
        let marker = if network.name() == origin.network {
            "*"
        } else {
            ""
        };
        let connected = if network.state() == LinkState::NetworkRegistered {
            "Yes"
        } else {
            "No"
        };
        let address = network
            .first_address()
            .map(|a| a.to_string())
            .unwrap_or_else(|| "-".to_string());
        send(
            origin,
            prefix,
            &format!(
                "{}{} / {} / {} / {}",
                marker,
                network.name(),
                network.nick(),
                connected,
                address
            ),
        );
    }
}

fn connect_network(users: &UserTable, origin: &ClientOrigin, prefix: &Prefix, params: &[&str]) {
    let name = params.first().copied().unwrap_or(origin.network.as_str());
    let Some(user) = users.get(&origin.user) else {
        return;
    };
    let Some(network) = user.network(name) else {
        send(origin, prefix, &format!("Network {} not found", name));
        return;
    };

    if network.request_connect() {
        send(origin, prefix, &format!("Connecting to {}", name));
    } else {
        send(origin, prefix, &format!("Network {} is busy, try again", name));
    }
}

fn disconnect_network(users: &UserTable, origin: &ClientOrigin, prefix: &Prefix, params: &[&str]) {
    let name = params.first().copied().unwrap_or(origin.network.as_str());
    let Some(user) = users.get(&origin.user) else {
        return;
    };
    let Some(network) = user.network(name) else {
        send(origin, prefix, &format!("Network {} not found", name));
        return;
    };

    if network.request_disconnect() {
        send(origin, prefix, &format!("Disconnecting from {}", name));
    } else {
        send(origin, prefix, &format!("Network {} is busy, try again", name));
    }
}

fn add_network(
    users: &UserTable,
    admin_tx: &mpsc::Sender<AdminRequest>,
    origin: &ClientOrigin,
    prefix: &Prefix,
    params: &[&str],
) {
    let usage = || {
        send(origin, prefix, "Usage: addnetwork name address [port] [password]");
        send(origin, prefix, "To use TLS, add + in front of the port number.");
    };

    if params.len() < 2 {
        usage();
        return;
    }

    let name = match clean_name(params[0]) {
        Ok(name) => name,
        Err(e) => {
            send(origin, prefix, &format!("Bad network name: {}", e));
            return;
        }
    };
    let host = params[1].to_string();

    let mut port: u16 = 6667;
    let mut tls = false;
    if let Some(port_param) = params.get(2) {
        let raw = match port_param.strip_prefix('+') {
            Some(stripped) => {
                tls = true;
                stripped
            }
            None => port_param,
        };
        match raw.parse::<u16>() {
            Ok(parsed) if parsed != 0 => port = parsed,
            _ => {
                usage();
                return;
            }
        }
    }
    let password = params.get(3).map(|s| s.to_string());

    let Some(user) = users.get(&origin.user) else {
        return;
    };
    if user.network(&name).is_some() {
        send(origin, prefix, &format!("Network {} already exists", name));
        return;
    }

    let record = NetworkRecord {
        name,
        nick: None,
        username: None,
        realname: None,
        password,
        addresses: vec![AddressRecord { host, port, tls }],
    };
    let request = AdminRequest::AddNetwork {
        user,
        record,
        origin: origin.clone(),
    };
    if admin_tx.try_send(request).is_err() {
        send(origin, prefix, "Could not queue the request, try again");
    }
}

/// Create the admin channel.
pub fn admin_channel() -> (mpsc::Sender<AdminRequest>, mpsc::Receiver<AdminRequest>) {
    mpsc::channel(ADMIN_QUEUE)
}

/// Spawn the task owning registry mutation. Runs after the bus is frozen,
/// since new network sessions publish to it.
pub fn spawn_admin_task(
    mut rx: mpsc::Receiver<AdminRequest>,
    store: Arc<dyn DataStore>,
    bus: Arc<EventBus>,
    source: String,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let prefix = status_prefix(&source);
        while let Some(request) = rx.recv().await {
            match request {
                AdminRequest::AddNetwork {
                    user,
                    record,
                    origin,
                } => {
                    let cfg = user.network_config(&record);
                    let handle = NetworkSession::spawn(cfg, Arc::clone(&bus), prefix.clone());
                    if !user.add_network(handle.clone()) {
                        handle.shutdown().await;
                        send(
                            &origin,
                            &prefix,
                            &format!("Network {} already exists", record.name),
                        );
                        continue;
                    }
                    info!(user = %user.id, network = %record.name, "Network added");

                    // The session stays usable in the live registry even if
                    // persisting it fails; the client just hears about it.
                    match store.save_network(&user.id, &record).await {
                        Ok(()) => send(&origin, &prefix, "New network saved"),
                        Err(e) => {
                            warn!(user = %user.id, network = %record.name, error = %e,
                                  "Failed to persist network");
                            send(&origin, &prefix, "Could not save the new network");
                        }
                    }
                }
            }
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bus::RawLine;
    use crate::state::ClientIdGen;
    use crate::store::{StoreError, UserRecord};
    use async_trait::async_trait;
    use tokio::time::{sleep, Duration};

    struct StubStore {
        fail_saves: bool,
    }

    #[async_trait]
    impl DataStore for StubStore {
        async fn list_all_users(&self) -> Result<Vec<UserRecord>, StoreError> {
            Ok(Vec::new())
        }

        async fn save_network(
            &self,
            _user: &str,
            _network: &NetworkRecord,
        ) -> Result<(), StoreError> {
            if self.fail_saves {
                return Err(StoreError::Sqlx(sqlx::Error::PoolClosed));
            }
            Ok(())
        }

        async fn create_user(&self, _record: &UserRecord) -> Result<(), StoreError> {
            Ok(())
        }
    }

    fn test_user(id: &str) -> Arc<User> {
        Arc::new(User::from_record(&UserRecord {
            id: id.to_string(),
            password_hash: "$argon2id$test".to_string(),
            default_nick: id.to_string(),
            default_username: id.to_string(),
            default_realname: id.to_string(),
            networks: Vec::new(),
        }))
    }

    struct Harness {
        bus: Arc<EventBus>,
        users: Arc<UserTable>,
        reply_rx: mpsc::Receiver<Message>,
        origin: ClientOrigin,
    }

    /// Wire a bus with the control subscriber plus a stub store behind the
    /// admin task, mirroring the startup order in main.
    fn wire(fail_saves: bool) -> Harness {
        let users = Arc::new(UserTable::new());
        users.insert(test_user("daniel"));

        let (admin_tx, admin_rx) = admin_channel();
        let mut bus = EventBus::new();
        register(&mut bus, Arc::clone(&users), admin_tx, "irc.slircb");
        let bus = Arc::new(bus);

        let store = Arc::new(StubStore { fail_saves });
        spawn_admin_task(
            admin_rx,
            store as Arc<dyn DataStore>,
            Arc::clone(&bus),
            "irc.slircb".to_string(),
        );

        let (reply_tx, reply_rx) = mpsc::channel(32);
        let ids = ClientIdGen::new();
        let origin = ClientOrigin {
            id: ids.next(),
            user: "daniel".to_string(),
            network: "exampleNet".to_string(),
            nick: "daniel".to_string(),
            reply: reply_tx,
        };

        Harness {
            bus,
            users,
            reply_rx,
            origin,
        }
    }

    fn control_event(origin: &ClientOrigin, text: &str) -> Event {
        Event::IrcRaw(RawLine::new(
            Direction::FromClient,
            Origin::Client(origin.clone()),
            Message::privmsg(STATUS_NICK, text),
        ))
    }

    fn assert_halted(event: &Event) -> bool {
        match event {
            Event::IrcRaw(ev) => ev.halted,
            _ => false,
        }
    }

    #[tokio::test]
    async fn status_messages_are_always_halted() {
        let mut harness = wire(false);

        let mut event = control_event(&harness.origin, "listnetworks");
        harness.bus.publish(EventName::IrcRaw, &mut event);
        assert!(assert_halted(&event));

        // The header line came back over the originating session.
        let reply = harness.reply_rx.recv().await.unwrap();
        match reply.command {
            Command::PRIVMSG(target, text) => {
                assert_eq!(target, "daniel");
                assert!(text.contains("Name"));
            }
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn halt_holds_for_subscribers_registered_after_control() {
        let users = Arc::new(UserTable::new());
        users.insert(test_user("daniel"));
        let (admin_tx, _admin_rx) = admin_channel();

        let mut bus = EventBus::new();
        register(&mut bus, Arc::clone(&users), admin_tx, "irc.slircb");

        // A later subscriber in registration order still observes the halt.
        let seen = Arc::new(std::sync::Mutex::new(None));
        {
            let seen = Arc::clone(&seen);
            bus.register(EventName::IrcRaw, move |event| {
                if let Event::IrcRaw(ev) = event {
                    *seen.lock().unwrap() = Some(ev.halted);
                }
            });
        }

        let (reply_tx, _reply_rx) = mpsc::channel(32);
        let ids = ClientIdGen::new();
        let origin = ClientOrigin {
            id: ids.next(),
            user: "daniel".to_string(),
            network: "exampleNet".to_string(),
            nick: "daniel".to_string(),
            reply: reply_tx,
        };

        let mut event = control_event(&origin, "anything at all");
        bus.publish(EventName::IrcRaw, &mut event);
        assert!(assert_halted(&event));
        assert_eq!(*seen.lock().unwrap(), Some(true));
    }

    #[tokio::test]
    async fn ordinary_traffic_is_not_halted() {
        let mut harness = wire(false);

        let mut event = Event::IrcRaw(RawLine::new(
            Direction::FromClient,
            Origin::Client(harness.origin.clone()),
            Message::privmsg("#chan", "hello"),
        ));
        harness.bus.publish(EventName::IrcRaw, &mut event);
        assert!(!assert_halted(&event));
        assert!(harness.reply_rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn addnetwork_creates_live_network_and_saves() {
        let mut harness = wire(false);

        let mut event = control_event(
            &harness.origin,
            "addnetwork test irc.example.org +6697 hunter2",
        );
        harness.bus.publish(EventName::IrcRaw, &mut event);
        assert!(assert_halted(&event));

        let reply = harness.reply_rx.recv().await.unwrap();
        match reply.command {
            Command::PRIVMSG(_, text) => assert_eq!(text, "New network saved"),
            other => panic!("unexpected reply: {:?}", other),
        }

        let user = harness.users.get("daniel").unwrap();
        let network = user.network("test").unwrap();
        let address = network.first_address().unwrap();
        assert_eq!(address.host, "irc.example.org");
        assert_eq!(address.port, 6697);
        assert!(address.tls);
    }

    #[tokio::test]
    async fn addnetwork_save_failure_replies_but_keeps_network_live() {
        let mut harness = wire(true);

        let mut event = control_event(&harness.origin, "addnetwork test irc.example.org 6697");
        harness.bus.publish(EventName::IrcRaw, &mut event);

        let reply = harness.reply_rx.recv().await.unwrap();
        match reply.command {
            Command::PRIVMSG(_, text) => assert_eq!(text, "Could not save the new network"),
            other => panic!("unexpected reply: {:?}", other),
        }

        // The network stays usable in the live registry for this process
        // lifetime.
        let user = harness.users.get("daniel").unwrap();
        assert!(user.network("test").is_some());
    }

    #[tokio::test]
    async fn addnetwork_usage_on_missing_params() {
        let mut harness = wire(false);

        let mut event = control_event(&harness.origin, "addnetwork onlyname");
        harness.bus.publish(EventName::IrcRaw, &mut event);

        let reply = harness.reply_rx.recv().await.unwrap();
        match reply.command {
            Command::PRIVMSG(_, text) => assert!(text.starts_with("Usage:")),
            other => panic!("unexpected reply: {:?}", other),
        }
    }

    #[tokio::test]
    async fn connect_reports_unknown_network() {
        let mut harness = wire(false);

        let mut event = control_event(&harness.origin, "connect nowhere");
        harness.bus.publish(EventName::IrcRaw, &mut event);

        let reply = harness.reply_rx.recv().await.unwrap();
        match reply.command {
            Command::PRIVMSG(_, text) => assert_eq!(text, "Network nowhere not found"),
            other => panic!("unexpected reply: {:?}", other),
        }
        // Give the admin task no chance to have added anything.
        sleep(Duration::from_millis(10)).await;
        let user = harness.users.get("daniel").unwrap();
        assert!(user.network("nowhere").is_none());
    }
}
