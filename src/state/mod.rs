//! Shared state: the user registry and per-process identity generators.

mod bouncer;
mod ids;
mod table;
mod user;

pub use bouncer::{status_prefix, Bouncer, STATUS_NICK};
pub use ids::{ClientId, ClientIdGen};
pub use table::UserTable;
pub use user::User;
