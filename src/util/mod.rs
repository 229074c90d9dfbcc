//! Shared utilities: logging, session ids, shutdown signalling.

mod logging;
mod session_id;
mod shutdown;

pub use logging::init_logging;
pub use session_id::{SessionId, generate_session_id, generate_short_session_id};
pub use shutdown::ShutdownSignal;
