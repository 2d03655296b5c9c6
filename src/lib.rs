//! sshterm - an interactive SSH terminal client
//!
//! The library holds everything except the console front end: the terminal
//! emulator, the SSH session transport, the bridge between them, key
//! encoding, selection, and configuration.

pub mod config;
pub mod core;
pub mod profile;
pub mod selection;
pub mod ui;
