//! Live thread notifications over WebSocket.
//!
//! Clients subscribe to one thread per connection and receive every create,
//! update, delete and like change in that thread as it is committed.

mod manager;
mod protocol;

pub use manager::ConnectionManager;
pub use protocol::*;
