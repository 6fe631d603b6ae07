//! Unified error handling for slircb.
//!
//! Per-connection failures are contained to the session or network they
//! occur on; only bind-time and shutdown-path failures are process-fatal
//! (those surface as `anyhow::Error` from `main`).

use slircb_proto::{Command, Message, Prefix, Response};
use thiserror::Error;
use tokio::sync::mpsc;

/// Errors while handling a single downstream client command.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Nickname failed validation; reported via 432, no state change.
    #[error("erroneous nickname: {0}")]
    ErroneousNickname(String),

    #[error("not enough parameters")]
    NeedMoreParams,

    /// Identity resolution failed at handshake completion.
    #[error("unknown user: {0}")]
    UnknownUser(String),

    /// The resolved user has no network by the requested name.
    #[error("user {user} has no network named {network}")]
    NoSuchNetwork { user: String, network: String },

    /// The resolved user has no networks at all.
    #[error("user {0} has no networks configured")]
    NoNetworks(String),

    /// Post-registration NICK is an explicit deferred feature, not a silent
    /// drop.
    #[error("nick changes are not relayed")]
    NickChangeUnsupported,

    #[error("send error: {0}")]
    Send(#[from] mpsc::error::SendError<Message>),

    #[error(transparent)]
    Proto(#[from] slircb_proto::ProtocolError),
}

impl ClientError {
    /// Whether this error ends the session.
    pub fn is_fatal(&self) -> bool {
        match self {
            Self::ErroneousNickname(_)
            | Self::NeedMoreParams
            | Self::NickChangeUnsupported => false,
            Self::UnknownUser(_)
            | Self::NoSuchNetwork { .. }
            | Self::NoNetworks(_)
            | Self::Send(_)
            | Self::Proto(_) => true,
        }
    }

    /// Convert to a client-visible reply, where one exists.
    ///
    /// Returns `None` for errors that don't warrant a reply (transport
    /// failures).
    pub fn to_irc_reply(&self, source: &str, nick: &str, cmd_name: &str) -> Option<Message> {
        let mut msg = match self {
            Self::ErroneousNickname(bad_nick) => Response::err_erroneusnickname(nick, bad_nick),
            Self::NeedMoreParams => Response::err_needmoreparams(nick, cmd_name),
            Self::UnknownUser(user) => {
                Message::from(Command::ERROR(format!("Unknown user: {}", user)))
            }
            Self::NoSuchNetwork { network, .. } => {
                Message::from(Command::ERROR(format!("No network named {}", network)))
            }
            Self::NoNetworks(_) => Message::from(Command::ERROR(
                "No networks configured for this user".to_string(),
            )),
            Self::NickChangeUnsupported => Message::from(Command::ERROR(
                "NICK changes are not relayed to the network yet".to_string(),
            )),

            // These errors don't get client-visible replies
            Self::Send(_) => return None,
            Self::Proto(_) => return None,
        };

        msg.prefix = Some(Prefix::ServerName(source.to_string()));
        Some(msg)
    }
}

/// Result type for client command handling.
pub type ClientResult = Result<(), ClientError>;

/// Errors while establishing or driving an upstream connection.
///
/// These never cross the owning network session: the session transitions
/// back to disconnected and its attached clients are notified.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid upstream address: {0}")]
    BadAddress(String),

    #[error("tls setup failed: {0}")]
    Tls(String),

    #[error(transparent)]
    Proto(#[from] slircb_proto::ProtocolError),
}
