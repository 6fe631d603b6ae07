//! ClientSession - one accepted downstream connection.
//!
//! Runs in two phases: the registration handshake (NICK/USER locks, PASS
//! recorded), then a relay loop multiplexed between the client socket and
//! the session's bounded outbound queue. Generic over the stream so the
//! same code drives plaintext, TLS, and in-process test sockets.

use std::net::SocketAddr;
use std::sync::Arc;

use futures_util::{SinkExt, StreamExt};
use slircb_proto::{Command, IrcCodec, Message, Prefix, Response};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::Framed;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::bus::{ClientOrigin, Direction, Event, EventName, Origin, RawLine};
use crate::error::ClientError;
use crate::network::registration::Registration;
use crate::network::upstream::NetworkHandle;
use crate::state::{Bouncer, ClientId, User};

/// Bound on each session's outbound queue. A session that falls this many
/// messages behind the fan-out is disconnected rather than waited on.
pub const OUTBOUND_BUFFER: usize = 64;

/// Build a numeric reply originating from the bouncer itself.
fn server_reply(source: &str, response: Response, params: Vec<String>) -> Message {
    Message {
        tags: None,
        prefix: Some(Prefix::ServerName(source.to_string())),
        command: Command::Response(response, params),
    }
}

/// A downstream client connection handler.
pub struct ClientSession {
    id: ClientId,
    addr: SocketAddr,
    bouncer: Arc<Bouncer>,
}

impl ClientSession {
    pub fn new(id: ClientId, addr: SocketAddr, bouncer: Arc<Bouncer>) -> Self {
        Self { id, addr, bouncer }
    }

    /// Drive the connection to completion.
    #[instrument(skip(self, stream), fields(id = %self.id, addr = %self.addr), name = "client")]
    pub async fn run<S>(self, stream: S) -> anyhow::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let mut framed = Framed::new(stream, IrcCodec::new());

        // Phase 1: registration handshake.
        let mut reg = Registration::default();
        let (user, network) = loop {
            let msg = match framed.next().await {
                None => {
                    info!("Client disconnected during registration");
                    return Ok(());
                }
                Some(Err(e)) => {
                    warn!(error = %e, "Read error during registration");
                    return Ok(());
                }
                Some(Ok(msg)) => msg,
            };

            match &msg.command {
                Command::PING(token, _) => {
                    framed.send(Message::pong(token.clone())).await?;
                }
                Command::QUIT(_) => {
                    info!("Client quit during registration");
                    return Ok(());
                }
                Command::NICK(candidate) => {
                    if let Err(e) = reg.handle_nick(candidate) {
                        let nick = reg.nick.clone().unwrap_or_else(|| "*".to_string());
                        if let Some(reply) = e.to_irc_reply(&self.bouncer.source, &nick, "NICK") {
                            framed.send(reply).await?;
                        }
                    }
                }
                Command::USER(username, _, realname) => reg.handle_user(username, realname),
                Command::PASS(value) => reg.handle_pass(value),
                _ => {
                    debug!(command = %msg.command.name(), "Ignoring pre-registration command");
                }
            }

            if reg.ready() {
                match self.resolve(&reg) {
                    Ok(bound) => break bound,
                    Err(e) => {
                        let nick = reg.nick.clone().unwrap_or_else(|| "*".to_string());
                        warn!(error = %e, "Identity resolution failed");
                        if let Some(reply) = e.to_irc_reply(&self.bouncer.source, &nick, "USER") {
                            let _ = framed.send(reply).await;
                        }
                        return Ok(());
                    }
                }
            }
        };

        // Phase 2: bind, welcome, relay.
        let nick = reg.nick.clone().unwrap_or_else(|| "*".to_string());
        self.send_welcome(&mut framed, &nick, network.name()).await?;

        let (tx, mut rx) = mpsc::channel::<Message>(OUTBOUND_BUFFER);
        let dropped = CancellationToken::new();
        network
            .attach(self.id, nick.clone(), tx.clone(), dropped.clone())
            .await;
        info!(user = %user.id, network = %network.name(), nick = %nick, "Client session bound");

        let origin = ClientOrigin {
            id: self.id,
            user: user.id.clone(),
            network: network.name().to_string(),
            nick,
            reply: tx,
        };

        let result = self
            .relay(&mut framed, &mut rx, &dropped, &origin, &network)
            .await;

        // Detaching never affects the network session or its other clients.
        network.detach(self.id).await;
        result
    }

    /// Resolve the requesting identity against the user registry and pick
    /// the network to bind to.
    fn resolve(&self, reg: &Registration) -> Result<(Arc<User>, NetworkHandle), ClientError> {
        let identity = reg.identity().ok_or(ClientError::NeedMoreParams)?;
        let user = self
            .bouncer
            .users
            .get(&identity.user)
            .ok_or_else(|| ClientError::UnknownUser(identity.user.clone()))?;

        let network = match &identity.network {
            Some(name) => user.network(name).ok_or_else(|| ClientError::NoSuchNetwork {
                user: identity.user.clone(),
                network: name.clone(),
            })?,
            None => user
                .default_network()
                .ok_or_else(|| ClientError::NoNetworks(identity.user.clone()))?,
        };

        Ok((user, network))
    }

    async fn send_welcome<S>(
        &self,
        framed: &mut Framed<S, IrcCodec>,
        nick: &str,
        network: &str,
    ) -> anyhow::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        let source = &self.bouncer.source;
        framed
            .send(server_reply(
                source,
                Response::RPL_WELCOME,
                vec![
                    nick.to_string(),
                    format!("Welcome to the bouncer, {}. Relaying network {}", nick, network),
                ],
            ))
            .await?;
        framed
            .send(server_reply(
                source,
                Response::RPL_YOURHOST,
                vec![
                    nick.to_string(),
                    format!(
                        "Your host is {}, running slircb-{}",
                        source,
                        env!("CARGO_PKG_VERSION")
                    ),
                ],
            ))
            .await?;
        framed
            .send(server_reply(
                source,
                Response::RPL_CREATED,
                vec![
                    nick.to_string(),
                    format!("Message {} to manage your networks", crate::state::STATUS_NICK),
                ],
            ))
            .await?;
        Ok(())
    }

    /// The steady-state relay loop for a registered session.
    async fn relay<S>(
        &self,
        framed: &mut Framed<S, IrcCodec>,
        rx: &mut mpsc::Receiver<Message>,
        dropped: &CancellationToken,
        origin: &ClientOrigin,
        network: &NetworkHandle,
    ) -> anyhow::Result<()>
    where
        S: AsyncRead + AsyncWrite + Unpin + Send,
    {
        loop {
            tokio::select! {
                _ = dropped.cancelled() => {
                    // The fan-out dropped this session (queue overflow).
                    warn!("Session dropped from fan-out, closing");
                    let _ = framed
                        .send(Message::from(Command::ERROR(
                            "Closing link (output queue overflow)".to_string(),
                        )))
                        .await;
                    return Ok(());
                }
                line = framed.next() => match line {
                    None => {
                        info!("Client disconnected");
                        return Ok(());
                    }
                    Some(Err(e)) => {
                        warn!(error = %e, "Client read error");
                        return Ok(());
                    }
                    Some(Ok(msg)) => match &msg.command {
                        Command::PING(token, _) => {
                            framed.send(Message::pong(token.clone())).await?;
                        }
                        Command::QUIT(_) => {
                            info!("Client quit");
                            return Ok(());
                        }
                        Command::NICK(_) => {
                            // Deferred feature: reported, neither forwarded
                            // nor silently dropped.
                            let err = ClientError::NickChangeUnsupported;
                            if let Some(reply) =
                                err.to_irc_reply(&self.bouncer.source, &origin.nick, "NICK")
                            {
                                framed.send(reply).await?;
                            }
                        }
                        _ => {
                            let mut event = Event::IrcRaw(RawLine::new(
                                Direction::FromClient,
                                Origin::Client(origin.clone()),
                                msg.clone(),
                            ));
                            self.bouncer.bus.publish(EventName::IrcRaw, &mut event);
                            if let Event::IrcRaw(ev) = event
                                && !ev.halted
                            {
                                network.relay(ev.message).await;
                            }
                        }
                    }
                },
                out = rx.recv() => match out {
                    Some(msg) => framed.send(msg).await?,
                    // All senders live in this task and the roster; recv only
                    // fails after a drop, which the cancelled branch handles.
                    None => return Ok(()),
                },
            }
        }
    }
}
