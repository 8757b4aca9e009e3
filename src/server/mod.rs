//! # Server Core Module
//!
//! Everything between the TCP socket and the user directory:
//!
//! - [`listener`] - Connection acceptor, checkpoint worker and shutdown wiring
//! - [`session`] - Per-connection state machine: handshake, login, command loop
//! - [`commands`] - Line -> response dispatch, kept pure for testability
//! - [`telnet`] - Byte-stream scrubber for telnet option sequences
//! - [`ticks`] - Activity-driven tick counter and periodic tasks
//!
//! ## Connection Lifecycle
//!
//! ```text
//! accept ──→ HANDSHAKE (banner + IAC WILL ECHO)
//!               │
//!          AWAITING_LOGIN (read/scrub/echo one line)
//!           │          │
//!      AUTHENTICATED  REJECTED (ERROR + close)
//!           │
//!      command loop until QUIT / transport failure / shutdown
//! ```

pub mod commands;
pub mod listener;
pub mod session;
pub mod telnet;
pub mod ticks;

use thiserror::Error;

pub use listener::LineServer;

/// Minimum accepted username length for `LOGIN`.
pub const MIN_USERNAME_LEN: usize = 4;

/// Handshake rejection reasons. Each is reported to the client as
/// `ERROR: <reason> Bye.` and the connection is closed.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum LoginError {
    #[error("You must first login to the server.")]
    NotLogin,
    #[error("Username must be at least 4 characters long.")]
    UsernameTooShort,
    #[error("Username is already online.")]
    AlreadyOnline,
}
