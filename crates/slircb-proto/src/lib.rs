//! IRC protocol support for the Straylight bouncer.
//!
//! This crate covers the slice of the IRC client protocol a bouncer speaks on
//! both of its faces: parsing and encoding of line-delimited messages
//! (optional tags, prefix, command, parameters), the numeric replies the
//! bouncer issues toward downstream clients, and the name validation applied
//! to nicknames and account names.
//!
//! With the `tokio` feature (default), [`IrcCodec`] plugs the message model
//! into `tokio_util::codec` framing.
//!
//! # Example
//!
//! ```
//! use slircb_proto::{Command, Message};
//!
//! let msg: Message = ":nick!user@host PRIVMSG #channel :Hello!".parse().unwrap();
//! assert!(matches!(msg.command, Command::PRIVMSG(_, _)));
//! ```

pub mod command;
pub mod error;
#[cfg(feature = "tokio")]
pub mod irc;
#[cfg(feature = "tokio")]
pub mod line;
pub mod message;
pub mod name;
pub mod prefix;
pub mod response;

pub use command::Command;
pub use error::{MessageParseError, ProtocolError};
#[cfg(feature = "tokio")]
pub use irc::IrcCodec;
#[cfg(feature = "tokio")]
pub use line::LineCodec;
pub use message::{Message, Tag};
pub use name::{clean_name, NameError, DISALLOWED_NAME_CHARS};
pub use prefix::Prefix;
pub use response::Response;
