//! Connection handling: the acceptor, downstream client sessions, and
//! upstream network sessions.

pub mod acceptor;
pub mod client;
pub mod registration;
pub mod upstream;

pub use acceptor::Acceptor;
pub use client::ClientSession;
