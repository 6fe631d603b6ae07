//! Protocol error types.

use thiserror::Error;

/// Result type used throughout the protocol crate.
pub type Result<T> = std::result::Result<T, ProtocolError>;

/// Errors from reading, writing, or framing IRC lines.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("an io error occurred")]
    Io(#[from] std::io::Error),

    /// A line could not be parsed into a [`crate::Message`].
    #[error("invalid message: {string}")]
    InvalidMessage {
        /// The offending line.
        string: String,
        #[source]
        cause: MessageParseError,
    },

    /// A line exceeded the framing limit before a terminator was seen.
    #[error("message exceeds the line limit: {actual} > {limit}")]
    MessageTooLong { actual: usize, limit: usize },

    /// A line contained bytes that are not valid UTF-8.
    #[error("line is not valid UTF-8 at byte {byte_pos}")]
    InvalidUtf8 { byte_pos: usize },

    /// Outgoing data contained a control character that may not appear
    /// inside an IRC line.
    #[error("illegal control character in message: {0:?}")]
    IllegalControlChar(char),
}

/// Errors from decomposing a line into tags, prefix, command, and params.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum MessageParseError {
    #[error("empty message")]
    EmptyMessage,

    #[error("missing command")]
    MissingCommand,

    #[error("invalid prefix: {0}")]
    InvalidPrefix(String),
}
