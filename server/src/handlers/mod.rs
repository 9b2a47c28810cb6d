//! Request handlers for comment operations and live subscriptions.

mod comments;
mod websocket;

pub use comments::*;
pub use websocket::*;
