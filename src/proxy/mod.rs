//! The forwarding core: accept loop, session handling, and byte copying.

mod forwarder;
mod listener;

pub use forwarder::{COPY_BUFFER_SIZE, ForwardError, ForwardSummary, forward};
pub use listener::{ConnectError, ProxyListener, connect_to_backend};
