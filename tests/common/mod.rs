//! Integration test common infrastructure.
//!
//! Provides a fake upstream IRC server, bouncer wiring helpers, and a
//! duplex-backed test client for asserting on message flows.

#![allow(dead_code)]

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use slircb::bus::EventBus;
use slircb::network::upstream::{LinkState, NetworkConfig, NetworkHandle, UpstreamAddr};
use slircb::network::ClientSession;
use slircb::state::{Bouncer, User, UserTable};
use slircb::store::UserRecord;
use slircb_proto::{Command, IrcCodec, Message, Prefix, Response};
use tokio::io::DuplexStream;
use tokio::net::{TcpListener, TcpStream};
use tokio::time::{sleep, timeout, Duration};
use tokio_util::codec::Framed;

/// A fake upstream IRC server on an ephemeral local port.
pub struct FakeUpstream {
    listener: TcpListener,
    addr: SocketAddr,
}

impl FakeUpstream {
    pub async fn bind() -> Self {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("bind fake upstream");
        let addr = listener.local_addr().expect("local addr");
        Self { listener, addr }
    }

    pub fn upstream_addr(&self) -> UpstreamAddr {
        UpstreamAddr {
            host: self.addr.ip().to_string(),
            port: self.addr.port(),
            tls: false,
        }
    }

    /// Accept one connection, consume the registration handshake, and
    /// answer with the welcome numeric.
    pub async fn accept_and_register(&self) -> Framed<TcpStream, IrcCodec> {
        let (stream, _) = self.listener.accept().await.expect("accept");
        let mut framed = Framed::new(stream, IrcCodec::new());

        let mut nick = "*".to_string();
        while let Some(result) = framed.next().await {
            let msg = result.expect("parse handshake line");
            match msg.command {
                Command::NICK(n) => nick = n,
                Command::USER(..) => break,
                _ => {}
            }
        }

        let welcome = Message {
            tags: None,
            prefix: Some(Prefix::ServerName("irc.example.org".to_string())),
            command: Command::Response(
                Response::RPL_WELCOME,
                vec![nick, "Welcome to ExampleNet".to_string()],
            ),
        };
        framed.send(welcome).await.expect("send welcome");
        framed
    }
}

/// Session settings pointing at the given upstream address.
pub fn network_config(addr: UpstreamAddr) -> NetworkConfig {
    NetworkConfig {
        user: "daniel".to_string(),
        name: "exampleNet".to_string(),
        nick: "daniel".to_string(),
        username: "daniel".to_string(),
        realname: "Daniel".to_string(),
        password: None,
        addresses: vec![addr],
    }
}

/// Session settings with no candidate addresses: stays disconnected, which
/// is all registration-only tests need.
pub fn offline_network_config() -> NetworkConfig {
    NetworkConfig {
        user: "daniel".to_string(),
        name: "exampleNet".to_string(),
        nick: "daniel".to_string(),
        username: "daniel".to_string(),
        realname: "Daniel".to_string(),
        password: None,
        addresses: Vec::new(),
    }
}

/// Build a bouncer whose registry holds the user `daniel` owning the given
/// networks.
pub fn build_bouncer(bus: Arc<EventBus>, handles: Vec<NetworkHandle>) -> Arc<Bouncer> {
    let users = Arc::new(UserTable::new());
    let user = Arc::new(User::from_record(&UserRecord {
        id: "daniel".to_string(),
        password_hash: "$argon2id$test".to_string(),
        default_nick: "daniel".to_string(),
        default_username: "daniel".to_string(),
        default_realname: "Daniel".to_string(),
        networks: Vec::new(),
    }));
    for handle in handles {
        user.add_network(handle);
    }
    users.insert(user);
    Arc::new(Bouncer::new("irc.slircb".to_string(), users, bus))
}

/// Spawn a client session over an in-process duplex socket and return the
/// client side.
pub fn connect_client(bouncer: &Arc<Bouncer>) -> Framed<DuplexStream, IrcCodec> {
    let (client_io, server_io) = tokio::io::duplex(8192);
    let id = bouncer.ids.next();
    let session = ClientSession::new(id, "127.0.0.1:1".parse().unwrap(), Arc::clone(bouncer));
    tokio::spawn(async move {
        let _ = session.run(server_io).await;
    });
    Framed::new(client_io, IrcCodec::new())
}

/// Receive one message with a timeout.
pub async fn recv(framed: &mut Framed<DuplexStream, IrcCodec>) -> Message {
    timeout(Duration::from_secs(5), framed.next())
        .await
        .expect("receive timed out")
        .expect("connection closed")
        .expect("parse error")
}

/// Receive messages until the predicate matches, returning everything read.
pub async fn recv_until<F>(
    framed: &mut Framed<DuplexStream, IrcCodec>,
    mut predicate: F,
) -> Vec<Message>
where
    F: FnMut(&Message) -> bool,
{
    let mut messages = Vec::new();
    loop {
        let msg = recv(framed).await;
        let done = predicate(&msg);
        messages.push(msg);
        if done {
            return messages;
        }
    }
}

/// Register with the bouncer: PASS names the user, USER content is ignored.
pub async fn register_client(framed: &mut Framed<DuplexStream, IrcCodec>, nick: &str) {
    framed
        .send(Message::pass("daniel:password"))
        .await
        .expect("send pass");
    framed.send(Message::nick(nick)).await.expect("send nick");
    framed
        .send(Message::user("ignored", "Real Name"))
        .await
        .expect("send user");

    // Drain the full welcome burst (001..003) so later asserts see a clean
    // queue.
    recv_until(framed, |msg| {
        matches!(&msg.command, Command::Response(Response::RPL_CREATED, _))
    })
    .await;
    // The attach is queued right after the welcome burst; give the network
    // session task a beat to process it.
    sleep(Duration::from_millis(100)).await;
}

/// Poll a network handle until it reaches the wanted state.
pub async fn wait_for_state(handle: &NetworkHandle, want: LinkState) {
    timeout(Duration::from_secs(5), async {
        loop {
            if handle.state() == want {
                return;
            }
            sleep(Duration::from_millis(10)).await;
        }
    })
    .await
    .expect("state change timed out");
}
