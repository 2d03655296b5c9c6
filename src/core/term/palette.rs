//! Color resolution
//!
//! Maps cell colors to concrete RGB using the xterm 256-color palette and
//! the theme's default foreground/background.

use serde::{Deserialize, Serialize};

/// Concrete 24-bit color
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Rgb {
    pub r: u8,
    pub g: u8,
    pub b: u8,
}

impl Rgb {
    pub const fn new(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b }
    }

    /// Convert to crossterm Color
    pub fn to_crossterm(self) -> crossterm::style::Color {
        crossterm::style::Color::Rgb {
            r: self.r,
            g: self.g,
            b: self.b,
        }
    }
}

/// The 16 ANSI colors (xterm defaults)
const ANSI_16: [Rgb; 16] = [
    Rgb::new(0, 0, 0),
    Rgb::new(205, 0, 0),
    Rgb::new(0, 205, 0),
    Rgb::new(205, 205, 0),
    Rgb::new(0, 0, 238),
    Rgb::new(205, 0, 205),
    Rgb::new(0, 205, 205),
    Rgb::new(229, 229, 229),
    Rgb::new(127, 127, 127),
    Rgb::new(255, 0, 0),
    Rgb::new(0, 255, 0),
    Rgb::new(255, 255, 0),
    Rgb::new(92, 92, 255),
    Rgb::new(255, 0, 255),
    Rgb::new(0, 255, 255),
    Rgb::new(255, 255, 255),
];

/// Resolve a 256-color palette index to RGB
pub fn indexed(n: u8) -> Rgb {
    match n {
        0..=15 => ANSI_16[n as usize],
        16..=231 => {
            // 6x6x6 color cube
            let i = n - 16;
            let level = |v: u8| if v == 0 { 0 } else { 55 + v * 40 };
            Rgb::new(level(i / 36), level((i / 6) % 6), level(i % 6))
        }
        232..=255 => {
            // Grayscale ramp
            let v = 8 + (n - 232) * 10;
            Rgb::new(v, v, v)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_palette_ranges() {
        assert_eq!(indexed(1), Rgb::new(205, 0, 0));
        assert_eq!(indexed(16), Rgb::new(0, 0, 0));
        assert_eq!(indexed(231), Rgb::new(255, 255, 255));
        assert_eq!(indexed(232), Rgb::new(8, 8, 8));
        assert_eq!(indexed(255), Rgb::new(238, 238, 238));
    }
}
