//! Conversation memory with trimming and inactivity expiry.

mod store;
mod turn;

pub use store::{PreparedTurn, SessionPolicy, SessionStore, INACTIVITY_TIMEOUT, MAX_TURNS};
pub use turn::{Role, Turn};
