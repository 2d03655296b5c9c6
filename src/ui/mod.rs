//! User interface rendering and input handling.
//!
//! - **renderer**: draws an emulator's damaged rows with crossterm
//! - **keymapper**: key presses to the bytes a remote shell expects
//! - **clipboard**: copy/paste through the system clipboard
//! - **prompt**: hidden password and passphrase input

pub mod clipboard;
pub mod keymapper;
pub mod prompt;
pub mod renderer;

pub use keymapper::{Encoded, Key, KeyMapper, Modifiers};
pub use renderer::Renderer;
