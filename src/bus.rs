//! Synchronous named-event bus.
//!
//! Every component that wants to observe or intercept protocol traffic
//! subscribes here. Dispatch is synchronous on the publisher's task, in
//! registration order, and an earlier handler setting `halted` is visible
//! both to later handlers and to the publisher's post-dispatch check of
//! whether the default relay action should run.
//!
//! Registration happens only during startup wiring: [`EventBus::register`]
//! takes `&mut self`, and the bus is frozen behind an `Arc` before any task
//! publishes to it. Handlers that need async side effects (history writes,
//! client replies) hand off through a bounded channel instead of awaiting.

use std::collections::HashMap;

use slircb_proto::Message;
use tokio::sync::mpsc;

use crate::network::upstream::LinkState;
use crate::state::ClientId;

/// Names an interception point on the bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventName {
    /// A protocol line crossing the bouncer in either direction.
    IrcRaw,
    /// A network connection changed state.
    NetworkState,
}

/// Which way a relayed line is travelling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// From a downstream client, toward the network.
    FromClient,
    /// From the upstream network, toward attached clients.
    FromServer,
}

/// The client session a line originated from (or is to be replied to).
#[derive(Clone)]
pub struct ClientOrigin {
    pub id: ClientId,
    /// Owning user's id.
    pub user: String,
    /// Name of the network the session is attached to.
    pub network: String,
    /// The session's negotiated nickname.
    pub nick: String,
    /// Outbound queue of the originating session. Subscribers reply with
    /// `try_send`; a full queue drops the reply rather than blocking
    /// dispatch.
    pub reply: mpsc::Sender<Message>,
}

/// The upstream connection a line originated from.
#[derive(Debug, Clone)]
pub struct NetworkOrigin {
    pub user: String,
    pub network: String,
}

/// Where a relayed line came from.
#[derive(Clone)]
pub enum Origin {
    Client(ClientOrigin),
    Network(NetworkOrigin),
}

impl Origin {
    /// Owning user's id, whichever side the line came from.
    pub fn user(&self) -> &str {
        match self {
            Origin::Client(c) => &c.user,
            Origin::Network(n) => &n.user,
        }
    }

    /// Network name, whichever side the line came from.
    pub fn network(&self) -> &str {
        match self {
            Origin::Client(c) => &c.network,
            Origin::Network(n) => &n.network,
        }
    }
}

/// A protocol line crossing the bouncer.
pub struct RawLine {
    pub direction: Direction,
    pub origin: Origin,
    pub message: Message,
    /// Set by a subscriber to suppress the default relay step.
    pub halted: bool,
}

impl RawLine {
    pub fn new(direction: Direction, origin: Origin, message: Message) -> Self {
        Self {
            direction,
            origin,
            message,
            halted: false,
        }
    }

    /// Stop the message from being relayed.
    pub fn halt(&mut self) {
        self.halted = true;
    }
}

/// Event payloads, one variant per event name.
pub enum Event {
    IrcRaw(RawLine),
    NetworkState {
        user: String,
        network: String,
        state: LinkState,
    },
}

type Handler = Box<dyn Fn(&mut Event) + Send + Sync>;

/// Process-wide publish/subscribe dispatcher.
#[derive(Default)]
pub struct EventBus {
    subscribers: HashMap<EventName, Vec<Handler>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler to the named event's ordered subscriber list.
    pub fn register<F>(&mut self, name: EventName, handler: F)
    where
        F: Fn(&mut Event) + Send + Sync + 'static,
    {
        self.subscribers
            .entry(name)
            .or_default()
            .push(Box::new(handler));
    }

    /// Invoke every handler registered for `name`, in registration order,
    /// synchronously on the caller's task. No handler is skipped because an
    /// earlier one ran; the caller inspects the event afterwards to decide
    /// whether the default action still applies.
    pub fn publish(&self, name: EventName, event: &mut Event) {
        if let Some(handlers) = self.subscribers.get(&name) {
            for handler in handlers {
                handler(event);
            }
        }
    }
}
