//! Core terminal emulation and session components.
//!
//! - **term**: VT terminal state and escape sequence parser
//! - **emulator**: the `Emulator` interface with full and plain-text implementations
//! - **transport**: SSH session state machine and backend
//! - **session**: bridge joining a transport to an emulator
//!
//! # Architecture
//!
//! ```text
//! SessionBridge
//! ├── SessionTransport (connect, auth, poll, send)
//! │   └── ShellLink (russh channel)
//! └── Emulator
//!     ├── TerminalState (cell grid, cursor, modes)
//!     └── VtParser (escape sequences)
//! ```

pub mod emulator;
pub mod session;
pub mod term;
pub mod transport;
