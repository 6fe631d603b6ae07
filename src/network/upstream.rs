//! NetworkSession - one upstream IRC connection per (user, network) pair.
//!
//! Each session runs as its own task owning the upstream socket and the set
//! of attached client sessions. Everything else talks to it through
//! [`LinkCommand`] messages on a bounded channel: attach/detach, relaying
//! client lines upstream, and explicit connect/disconnect. There is no
//! automatic reconnect; a dropped link stays down until a control command
//! asks for a fresh attempt.
//!
//! Fan-out never blocks: delivery to attached clients uses `try_send` on
//! each client's bounded outbound queue, and a session whose queue is full
//! (or gone) is dropped from the roster, which closes it.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use parking_lot::Mutex;
use slircb_proto::{Command, IrcCodec, Message, Prefix, Response};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_rustls::rustls::pki_types::ServerName;
use tokio_rustls::rustls::{ClientConfig, RootCertStore};
use tokio_rustls::TlsConnector;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::bus::{Direction, Event, EventBus, EventName, NetworkOrigin, Origin, RawLine};
use crate::error::UpstreamError;
use crate::state::ClientId;
use crate::store::AddressRecord;

/// Commands queued into a network session's task.
const COMMAND_BUFFER: usize = 128;

/// Connection state of an upstream link.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkState {
    Disconnected,
    Connecting,
    /// Upstream registration completed (welcome numeric seen); relay is live.
    NetworkRegistered,
}

impl fmt::Display for LinkState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LinkState::Disconnected => write!(f, "disconnected"),
            LinkState::Connecting => write!(f, "connecting"),
            LinkState::NetworkRegistered => write!(f, "connected"),
        }
    }
}

/// One candidate upstream address.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamAddr {
    pub host: String,
    pub port: u16,
    pub tls: bool,
}

impl fmt::Display for UpstreamAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.tls {
            write!(f, "{}:+{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

impl From<&AddressRecord> for UpstreamAddr {
    fn from(record: &AddressRecord) -> Self {
        Self {
            host: record.host.clone(),
            port: record.port,
            tls: record.tls,
        }
    }
}

/// Effective settings for one network session.
#[derive(Debug, Clone)]
pub struct NetworkConfig {
    /// Owning user's id.
    pub user: String,
    /// Network name, unique within the owning user.
    pub name: String,
    pub nick: String,
    pub username: String,
    pub realname: String,
    /// Connect password sent as PASS before NICK/USER.
    pub password: Option<String>,
    /// Candidate addresses, tried in order.
    pub addresses: Vec<UpstreamAddr>,
}

/// Messages into a network session's task.
pub enum LinkCommand {
    Attach {
        id: ClientId,
        nick: String,
        tx: mpsc::Sender<Message>,
        /// Cancelled when the fan-out drops this session, so the client
        /// task notices even while its queue sits full.
        cancel: CancellationToken,
    },
    Detach {
        id: ClientId,
    },
    /// A registered client's line, to be forwarded upstream.
    Relay(Message),
    Connect,
    Disconnect {
        reason: Option<String>,
    },
    Shutdown,
}

/// Cheap cloneable handle to a running network session.
#[derive(Clone)]
pub struct NetworkHandle {
    user: String,
    name: String,
    cmd: mpsc::Sender<LinkCommand>,
    state: Arc<Mutex<LinkState>>,
    current_nick: Arc<Mutex<String>>,
    addresses: Arc<Vec<UpstreamAddr>>,
}

impl NetworkHandle {
    pub fn user(&self) -> &str {
        &self.user
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Snapshot of the connection state.
    pub fn state(&self) -> LinkState {
        *self.state.lock()
    }

    /// The nick currently in use upstream.
    pub fn nick(&self) -> String {
        self.current_nick.lock().clone()
    }

    pub fn first_address(&self) -> Option<&UpstreamAddr> {
        self.addresses.first()
    }

    /// Attach a client session. Idempotent with respect to the connection
    /// state: attaching never triggers an upstream handshake.
    pub async fn attach(
        &self,
        id: ClientId,
        nick: String,
        tx: mpsc::Sender<Message>,
        cancel: CancellationToken,
    ) {
        let _ = self
            .cmd
            .send(LinkCommand::Attach {
                id,
                nick,
                tx,
                cancel,
            })
            .await;
    }

    /// Detach a client session. Never affects the connection state or any
    /// other attached session.
    pub async fn detach(&self, id: ClientId) {
        let _ = self.cmd.send(LinkCommand::Detach { id }).await;
    }

    /// Forward a registered client's line upstream.
    pub async fn relay(&self, message: Message) {
        let _ = self.cmd.send(LinkCommand::Relay(message)).await;
    }

    /// Ask the session to start a connection attempt.
    pub fn request_connect(&self) -> bool {
        self.cmd.try_send(LinkCommand::Connect).is_ok()
    }

    /// Ask the session to drop its upstream link.
    pub fn request_disconnect(&self) -> bool {
        self.cmd
            .try_send(LinkCommand::Disconnect { reason: None })
            .is_ok()
    }

    /// Quit upstream and stop the session task. Used on process shutdown.
    pub async fn shutdown(&self) {
        let _ = self.cmd.send(LinkCommand::Shutdown).await;
    }
}

/// Socket types an upstream link can run over.
pub trait Conn: AsyncRead + AsyncWrite + Unpin + Send {}
impl<T: AsyncRead + AsyncWrite + Unpin + Send> Conn for T {}

type Link = Framed<Box<dyn Conn>, IrcCodec>;

/// The attached-session set, owned by the session task.
struct Roster {
    clients: HashMap<ClientId, AttachedClient>,
}

struct AttachedClient {
    nick: String,
    tx: mpsc::Sender<Message>,
    cancel: CancellationToken,
}

impl Roster {
    fn new() -> Self {
        Self {
            clients: HashMap::new(),
        }
    }

    fn attach(&mut self, id: ClientId, nick: String, tx: mpsc::Sender<Message>, cancel: CancellationToken) {
        self.clients.insert(id, AttachedClient { nick, tx, cancel });
    }

    fn detach(&mut self, id: ClientId) -> bool {
        self.clients.remove(&id).is_some()
    }

    fn len(&self) -> usize {
        self.clients.len()
    }

    fn drop_client(&mut self, id: ClientId) {
        if let Some(client) = self.clients.remove(&id) {
            client.cancel.cancel();
        }
    }

    /// Deliver one server line to every attached session. Sessions whose
    /// outbound queue is full or closed are dropped from the roster, which
    /// ends them. Returns the number of copies delivered.
    fn broadcast(&mut self, msg: &Message) -> usize {
        let mut dead = Vec::new();
        let mut delivered = 0;
        for (id, client) in &self.clients {
            if client.tx.try_send(msg.clone()).is_ok() {
                delivered += 1;
            } else {
                dead.push(*id);
            }
        }
        for id in dead {
            warn!(client = %id, "Dropping slow or closed client from fan-out");
            self.drop_client(id);
        }
        delivered
    }

    /// Send a synthetic status notice to every attached session.
    fn notify(&mut self, prefix: &Prefix, text: &str) -> usize {
        let mut dead = Vec::new();
        let mut delivered = 0;
        for (id, client) in &self.clients {
            let notice = Message::notice(client.nick.clone(), text).with_prefix(prefix.clone());
            if client.tx.try_send(notice).is_ok() {
                delivered += 1;
            } else {
                dead.push(*id);
            }
        }
        for id in dead {
            self.drop_client(id);
        }
        delivered
    }
}

/// One upstream IRC connection and its attached clients.
pub struct NetworkSession {
    cfg: NetworkConfig,
    bus: Arc<EventBus>,
    status_prefix: Prefix,
    state: Arc<Mutex<LinkState>>,
    current_nick: Arc<Mutex<String>>,
    roster: Roster,
    cmd_rx: mpsc::Receiver<LinkCommand>,
    link: Option<Link>,
    /// Whether the upstream welcome numeric has been seen on this link.
    welcomed: bool,
}

impl NetworkSession {
    /// Spawn the session task and return a handle to it.
    pub fn spawn(cfg: NetworkConfig, bus: Arc<EventBus>, status_prefix: Prefix) -> NetworkHandle {
        let (cmd_tx, cmd_rx) = mpsc::channel(COMMAND_BUFFER);
        let state = Arc::new(Mutex::new(LinkState::Disconnected));
        let current_nick = Arc::new(Mutex::new(cfg.nick.clone()));

        let handle = NetworkHandle {
            user: cfg.user.clone(),
            name: cfg.name.clone(),
            cmd: cmd_tx,
            state: Arc::clone(&state),
            current_nick: Arc::clone(&current_nick),
            addresses: Arc::new(cfg.addresses.clone()),
        };

        let session = NetworkSession {
            cfg,
            bus,
            status_prefix,
            state,
            current_nick,
            roster: Roster::new(),
            cmd_rx,
            link: None,
            welcomed: false,
        };
        tokio::spawn(session.run());

        handle
    }

    async fn run(mut self) {
        loop {
            tokio::select! {
                cmd = self.cmd_rx.recv() => match cmd {
                    Some(cmd) => {
                        if self.handle_command(cmd).await {
                            break;
                        }
                    }
                    None => break,
                },
                line = Self::next_line(&mut self.link) => match line {
                    Some(Ok(msg)) => self.handle_upstream_message(msg).await,
                    Some(Err(e)) => {
                        warn!(network = %self.cfg.name, error = %e, "Upstream read error");
                        self.disconnected(&format!("read error: {}", e));
                    }
                    None => {
                        info!(network = %self.cfg.name, "Upstream closed the connection");
                        self.disconnected("connection closed");
                    }
                },
            }
        }
        debug!(user = %self.cfg.user, network = %self.cfg.name, "Network session stopped");
    }

    /// Resolves to the next upstream line, or stays pending while there is
    /// no link (commands still drive the loop).
    async fn next_line(
        link: &mut Option<Link>,
    ) -> Option<Result<Message, slircb_proto::ProtocolError>> {
        match link.as_mut() {
            Some(framed) => framed.next().await,
            None => std::future::pending().await,
        }
    }

    /// Returns `true` when the session task should stop.
    async fn handle_command(&mut self, cmd: LinkCommand) -> bool {
        match cmd {
            LinkCommand::Attach { id, nick, tx, cancel } => {
                self.roster.attach(id, nick, tx, cancel);
                debug!(client = %id, network = %self.cfg.name,
                       attached = self.roster.len(), "Client attached");
            }
            LinkCommand::Detach { id } => {
                if self.roster.detach(id) {
                    debug!(client = %id, network = %self.cfg.name,
                           attached = self.roster.len(), "Client detached");
                }
            }
            LinkCommand::Relay(msg) => {
                if self.link.is_some() {
                    self.send_upstream(msg).await;
                } else {
                    debug!(network = %self.cfg.name, "Dropping client line, network disconnected");
                }
            }
            LinkCommand::Connect => self.connect().await,
            LinkCommand::Disconnect { reason } => self.disconnect(reason).await,
            LinkCommand::Shutdown => {
                self.disconnect(Some("Shutting down".to_string())).await;
                return true;
            }
        }
        false
    }

    /// Try each candidate address in order. Idempotent while a link exists.
    async fn connect(&mut self) {
        if self.link.is_some() {
            return;
        }

        self.set_state(LinkState::Connecting);
        let addresses = self.cfg.addresses.clone();
        for addr in &addresses {
            info!(user = %self.cfg.user, network = %self.cfg.name, address = %addr,
                  "Connecting to network");
            match dial(addr).await {
                Ok(framed) => {
                    self.link = Some(framed);
                    self.welcomed = false;
                    *self.current_nick.lock() = self.cfg.nick.clone();
                    self.register_upstream().await;
                    return;
                }
                Err(e) => {
                    warn!(network = %self.cfg.name, address = %addr, error = %e,
                          "Upstream connect failed");
                }
            }
        }

        self.set_state(LinkState::Disconnected);
        self.roster.notify(
            &self.status_prefix,
            &format!("Could not connect to {}", self.cfg.name),
        );
    }

    /// PASS/NICK/USER toward the network. The welcome numeric finishes the
    /// handshake in [`Self::handle_upstream_message`].
    async fn register_upstream(&mut self) {
        if let Some(pass) = self.cfg.password.clone() {
            self.send_upstream(Message::pass(pass)).await;
        }
        self.send_upstream(Message::nick(self.cfg.nick.clone()))
            .await;
        self.send_upstream(Message::user(
            self.cfg.username.clone(),
            self.cfg.realname.clone(),
        ))
        .await;
    }

    async fn handle_upstream_message(&mut self, msg: Message) {
        // Keepalive is answered here and never fanned out.
        if let Command::PING(token, _) = &msg.command {
            let pong = Message::pong(token.clone());
            self.send_upstream(pong).await;
            return;
        }

        if !self.welcomed {
            match &msg.command {
                Command::Response(Response::RPL_WELCOME, args) => {
                    if let Some(nick) = args.first() {
                        *self.current_nick.lock() = nick.clone();
                    }
                    self.welcomed = true;
                    self.set_state(LinkState::NetworkRegistered);
                    info!(user = %self.cfg.user, network = %self.cfg.name,
                          nick = %self.current_nick.lock(), "Network registration complete");
                    self.roster.notify(
                        &self.status_prefix,
                        &format!("Connected to {}", self.cfg.name),
                    );
                }
                Command::Response(Response::ERR_NICKNAMEINUSE, _) => {
                    // Fall back rather than stalling the handshake.
                    let fallback = format!("{}_", self.current_nick.lock());
                    *self.current_nick.lock() = fallback.clone();
                    self.send_upstream(Message::nick(fallback)).await;
                    return;
                }
                _ => {}
            }
        } else if let Command::NICK(new_nick) = &msg.command {
            // Track our own nick if the server renames us.
            let ours = msg.source_nickname() == Some(self.current_nick.lock().as_str());
            if ours {
                *self.current_nick.lock() = new_nick.clone();
            }
        }

        let mut event = Event::IrcRaw(RawLine::new(
            Direction::FromServer,
            Origin::Network(NetworkOrigin {
                user: self.cfg.user.clone(),
                network: self.cfg.name.clone(),
            }),
            msg.clone(),
        ));
        self.bus.publish(EventName::IrcRaw, &mut event);
        let halted = matches!(&event, Event::IrcRaw(ev) if ev.halted);
        if !halted {
            self.roster.broadcast(&msg);
        }
    }

    async fn send_upstream(&mut self, msg: Message) {
        let result = match self.link.as_mut() {
            Some(framed) => framed.send(msg).await,
            None => return,
        };
        if let Err(e) = result {
            warn!(network = %self.cfg.name, error = %e, "Upstream write error");
            self.disconnected(&format!("write error: {}", e));
        }
    }

    /// Explicit disconnect: QUIT upstream, then drop the link.
    async fn disconnect(&mut self, reason: Option<String>) {
        if self.link.is_none() {
            return;
        }
        let reason = reason.unwrap_or_else(|| "Disconnect requested".to_string());
        self.send_upstream(Message::quit(Some(reason.clone()))).await;
        self.link = None;
        self.welcomed = false;
        self.set_state(LinkState::Disconnected);
        self.roster.notify(
            &self.status_prefix,
            &format!("Disconnected from {} ({})", self.cfg.name, reason),
        );
    }

    /// The link dropped underneath us. Attached sessions are notified but
    /// stay attached; reconnecting is an explicit administrative action.
    fn disconnected(&mut self, reason: &str) {
        self.link = None;
        self.welcomed = false;
        self.set_state(LinkState::Disconnected);
        self.roster.notify(
            &self.status_prefix,
            &format!("Disconnected from {} ({})", self.cfg.name, reason),
        );
    }

    fn set_state(&self, state: LinkState) {
        *self.state.lock() = state;
        let mut event = Event::NetworkState {
            user: self.cfg.user.clone(),
            network: self.cfg.name.clone(),
            state,
        };
        self.bus.publish(EventName::NetworkState, &mut event);
    }
}

async fn dial(addr: &UpstreamAddr) -> Result<Link, UpstreamError> {
    let stream = TcpStream::connect((addr.host.as_str(), addr.port)).await?;

    if !addr.tls {
        return Ok(Framed::new(Box::new(stream) as Box<dyn Conn>, IrcCodec::new()));
    }

    let connector = tls_connector()?;
    let server_name = ServerName::try_from(addr.host.clone())
        .map_err(|_| UpstreamError::BadAddress(addr.host.clone()))?;
    let tls_stream = connector.connect(server_name, stream).await?;
    Ok(Framed::new(
        Box::new(tls_stream) as Box<dyn Conn>,
        IrcCodec::new(),
    ))
}

fn tls_connector() -> Result<TlsConnector, UpstreamError> {
    let mut root_store = RootCertStore::empty();
    let native = rustls_native_certs::load_native_certs();
    for cert in native.certs {
        let _ = root_store.add(cert);
    }
    if root_store.is_empty() {
        return Err(UpstreamError::Tls(
            "no trusted root certificates found".to_string(),
        ));
    }

    let config = ClientConfig::builder()
        .with_root_certificates(root_store)
        .with_no_client_auth();
    Ok(TlsConnector::from(Arc::new(config)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ClientIdGen;

    fn attach_probe(
        roster: &mut Roster,
        ids: &ClientIdGen,
        nick: &str,
        capacity: usize,
    ) -> (ClientId, mpsc::Receiver<Message>, CancellationToken) {
        let id = ids.next();
        let (tx, rx) = mpsc::channel(capacity);
        let cancel = CancellationToken::new();
        roster.attach(id, nick.to_string(), tx, cancel.clone());
        (id, rx, cancel)
    }

    #[test]
    fn broadcast_reaches_every_attached_session() {
        let ids = ClientIdGen::new();
        let mut roster = Roster::new();
        let (_a, mut rx_a, _) = attach_probe(&mut roster, &ids, "alice", 8);
        let (_b, mut rx_b, _) = attach_probe(&mut roster, &ids, "bob", 8);

        let line = Message::privmsg("#chan", "hello");
        assert_eq!(roster.broadcast(&line), 2);
        assert_eq!(rx_a.try_recv().unwrap(), line);
        assert_eq!(rx_b.try_recv().unwrap(), line);
    }

    #[test]
    fn detach_leaves_other_sessions_receiving() {
        let ids = ClientIdGen::new();
        let mut roster = Roster::new();
        let (a, mut rx_a, cancel_a) = attach_probe(&mut roster, &ids, "alice", 8);
        let (_b, mut rx_b, _) = attach_probe(&mut roster, &ids, "bob", 8);

        assert!(roster.detach(a));
        // A plain detach is not a drop: the departing session is not
        // cancelled, the rest keep receiving.
        assert!(!cancel_a.is_cancelled());
        let line = Message::privmsg("#chan", "still here");
        assert_eq!(roster.broadcast(&line), 1);
        assert!(rx_a.try_recv().is_err());
        assert_eq!(rx_b.try_recv().unwrap(), line);
    }

    #[test]
    fn slow_session_is_dropped_not_waited_on() {
        let ids = ClientIdGen::new();
        let mut roster = Roster::new();
        // Capacity 1: the second line overflows the queue.
        let (_slow, _rx_slow, cancel_slow) = attach_probe(&mut roster, &ids, "slow", 1);
        let (_ok, mut rx_ok, _) = attach_probe(&mut roster, &ids, "ok", 8);

        let first = Message::privmsg("#chan", "first");
        let second = Message::privmsg("#chan", "second");
        assert_eq!(roster.broadcast(&first), 2);
        // The slow client never drained its queue; it is dropped and
        // cancelled, the other session still gets the line.
        assert_eq!(roster.broadcast(&second), 1);
        assert_eq!(roster.len(), 1);
        assert!(cancel_slow.is_cancelled());
        assert_eq!(rx_ok.try_recv().unwrap(), first);
        assert_eq!(rx_ok.try_recv().unwrap(), second);
    }

    #[test]
    fn notify_targets_each_nick() {
        let ids = ClientIdGen::new();
        let mut roster = Roster::new();
        let (_a, mut rx_a, _) = attach_probe(&mut roster, &ids, "alice", 8);

        let prefix = crate::state::status_prefix("irc.slircb");
        assert_eq!(roster.notify(&prefix, "Disconnected from exampleNet"), 1);
        let notice = rx_a.try_recv().unwrap();
        match notice.command {
            Command::NOTICE(target, text) => {
                assert_eq!(target, "alice");
                assert!(text.contains("exampleNet"));
            }
            other => panic!("unexpected message: {:?}", other),
        }
        assert_eq!(notice.prefix.unwrap().to_string(), "*status!bnc@irc.slircb");
    }

    #[test]
    fn upstream_addr_display_marks_tls() {
        let plain = UpstreamAddr {
            host: "irc.example.org".to_string(),
            port: 6667,
            tls: false,
        };
        let tls = UpstreamAddr {
            host: "irc.example.org".to_string(),
            port: 6697,
            tls: true,
        };
        assert_eq!(plain.to_string(), "irc.example.org:6667");
        assert_eq!(tls.to_string(), "irc.example.org:+6697");
    }

    #[test]
    fn link_state_display() {
        assert_eq!(LinkState::Disconnected.to_string(), "disconnected");
        assert_eq!(LinkState::Connecting.to_string(), "connecting");
        assert_eq!(LinkState::NetworkRegistered.to_string(), "connected");
    }
}
