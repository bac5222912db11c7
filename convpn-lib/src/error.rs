//! Crate-wide error re-exports.
//!
//! Each module defines its own narrow `Error` enum; this file only collects
//! the ones callers outside the crate are expected to match on directly.

pub use crate::command::Error as CommandError;
pub use crate::config::Error as ConfigError;
pub use crate::journal::Error as JournalError;
pub use crate::socket::Error as SocketError;
