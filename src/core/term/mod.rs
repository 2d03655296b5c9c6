//! Terminal emulation: screen grid, VT parser, damage tracking and colors

pub mod damage;
pub mod palette;
pub mod parser;
pub mod state;

pub use damage::DamageSet;
pub use palette::Rgb;
pub use parser::{Response, VtParser};
pub use state::{AttrFlags, Cell, CellAttrs, Color, CursorState, GridSize, TerminalState};
