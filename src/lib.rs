//! slircb - Straylight IRC Bouncer
//!
//! A persistent intermediary between short-lived IRC client connections and
//! long-lived upstream network connections, one upstream per (user, network)
//! pair, fanned out to every attached client. Components observe and
//! intercept traffic through a synchronous event bus.

pub mod bus;
pub mod config;
pub mod control;
pub mod error;
pub mod history;
pub mod network;
pub mod state;
pub mod store;
