//! Emulator capability interface
//!
//! Two implementations sit behind [`Emulator`]: [`VtEmulator`] interprets the
//! full VT sequence set, [`PlainEmulator`] strips escape sequences and keeps
//! only text. Which one a session gets is decided by [`EmulationMode`] in the
//! configuration.

use serde::{Deserialize, Serialize};

use super::term::parser::Utf8Decoder;
use super::term::{Cell, CursorState, DamageSet, GridSize, Response, Rgb, TerminalState, VtParser};

/// Which emulator a session is built with
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmulationMode {
    #[default]
    Full,
    Plain,
}

/// Font description handed to the renderer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FontSpec {
    pub family: String,
    pub size: f32,
}

impl Default for FontSpec {
    fn default() -> Self {
        Self {
            family: "monospace".to_string(),
            size: 11.0,
        }
    }
}

/// Default colors and font. Immutable once handed to an emulator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Theme {
    pub foreground: Rgb,
    pub background: Rgb,
    pub font: FontSpec,
}

impl Default for Theme {
    fn default() -> Self {
        Self {
            foreground: Rgb::new(220, 220, 220),
            background: Rgb::new(0, 0, 0),
            font: FontSpec::default(),
        }
    }
}

/// Read-only access to a character grid
pub trait GridView {
    fn size(&self) -> GridSize;

    /// Cell at `(row, col)`; out-of-range reads return a blank cell
    fn cell(&self, row: u16, col: u16) -> Cell;
}

/// A terminal emulator fed with raw bytes from the remote shell
pub trait Emulator: GridView + Send {
    /// Interpret bytes and return what changed
    fn feed(&mut self, bytes: &[u8]) -> DamageSet;

    /// Clamp and apply a new size. `None` means the effective size did not change.
    fn resize(&mut self, rows: u16, cols: u16) -> Option<GridSize>;

    /// Cursor to origin, every cell blank, attributes cleared
    fn reset(&mut self) -> DamageSet;

    /// Wipe visible content before a new session starts. Both implementations
    /// reset here; the full emulator does not leave clearing to the remote.
    fn clear_screen(&mut self) -> DamageSet;

    fn cursor(&self) -> CursorState;

    /// Damage recorded outside of `feed` (e.g. by `resize`)
    fn take_damage(&mut self) -> DamageSet;

    /// Bytes the emulator wants sent back to the remote (status reports)
    fn take_replies(&mut self) -> Vec<u8>;

    fn title(&self) -> &str;

    fn theme(&self) -> &Theme;

    fn set_theme(&mut self, theme: Theme) -> DamageSet;
}

/// Build the emulator selected by `mode`
pub fn new_emulator(mode: EmulationMode, size: GridSize, theme: Theme) -> Box<dyn Emulator> {
    match mode {
        EmulationMode::Full => Box::new(VtEmulator::new(size, theme)),
        EmulationMode::Plain => Box::new(PlainEmulator::new(size, theme)),
    }
}

/// Full VT emulator
pub struct VtEmulator {
    state: TerminalState,
    parser: VtParser,
    theme: Theme,
    replies: Vec<Response>,
}

impl VtEmulator {
    pub fn new(size: GridSize, theme: Theme) -> Self {
        Self {
            state: TerminalState::new(size.rows, size.cols),
            parser: VtParser::new(),
            theme,
            replies: Vec::new(),
        }
    }

    pub fn state(&self) -> &TerminalState {
        &self.state
    }
}

impl GridView for VtEmulator {
    fn size(&self) -> GridSize {
        self.state.size()
    }

    fn cell(&self, row: u16, col: u16) -> Cell {
        self.state.cell(row, col)
    }
}

impl Emulator for VtEmulator {
    fn feed(&mut self, bytes: &[u8]) -> DamageSet {
        self.parser.advance(bytes, &mut self.state, &mut self.replies);
        self.state.take_damage()
    }

    fn resize(&mut self, rows: u16, cols: u16) -> Option<GridSize> {
        self.state.resize(rows, cols).then(|| self.state.size())
    }

    fn reset(&mut self) -> DamageSet {
        self.parser = VtParser::new();
        self.state.reset();
        self.replies.clear();
        self.state.take_damage()
    }

    fn clear_screen(&mut self) -> DamageSet {
        self.reset()
    }

    fn cursor(&self) -> CursorState {
        self.state.cursor()
    }

    fn take_damage(&mut self) -> DamageSet {
        self.state.take_damage()
    }

    fn take_replies(&mut self) -> Vec<u8> {
        self.replies
            .drain(..)
            .flat_map(|r| r.to_bytes())
            .collect()
    }

    fn title(&self) -> &str {
        self.state.title()
    }

    fn theme(&self) -> &Theme {
        &self.theme
    }

    fn set_theme(&mut self, theme: Theme) -> DamageSet {
        self.theme = theme;
        DamageSet::full()
    }
}

/// Escape-stripping states of the plain emulator
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
enum Strip {
    #[default]
    Normal,
    Esc,
    Csi,
    Osc,
    OscEsc,
}

/// Plain-text fallback: escape sequences are dropped, text lands in the grid
/// with default colors.
pub struct PlainEmulator {
    state: TerminalState,
    strip: Strip,
    utf8: Utf8Decoder,
    theme: Theme,
}

impl PlainEmulator {
    pub fn new(size: GridSize, theme: Theme) -> Self {
        Self {
            state: TerminalState::new(size.rows, size.cols),
            strip: Strip::Normal,
            utf8: Utf8Decoder::default(),
            theme,
        }
    }

    fn text(&mut self, byte: u8) {
        if self.utf8.is_pending() && !(0x80..=0xBF).contains(&byte) {
            self.utf8.reset();
            self.state.put_char(char::REPLACEMENT_CHARACTER);
        }
        match byte {
            b'\r' => self.state.carriage_return(),
            b'\n' => {
                self.state.carriage_return();
                self.state.linefeed();
            }
            0x08 => self.state.backspace(),
            b'\t' => self.state.horizontal_tab(),
            0x20..=0x7E => self.state.put_char(byte as char),
            0x00..=0x1F | 0x7F => {}
            _ => {
                if let Some(ch) = self.utf8.push(byte) {
                    self.state.put_char(ch);
                }
            }
        }
    }
}

impl GridView for PlainEmulator {
    fn size(&self) -> GridSize {
        self.state.size()
    }

    fn cell(&self, row: u16, col: u16) -> Cell {
        self.state.cell(row, col)
    }
}

impl Emulator for PlainEmulator {
    fn feed(&mut self, bytes: &[u8]) -> DamageSet {
        for &byte in bytes {
            self.strip = match self.strip {
                Strip::Normal if byte == 0x1B => Strip::Esc,
                Strip::Normal => {
                    self.text(byte);
                    Strip::Normal
                }
                Strip::Esc => match byte {
                    b'[' => Strip::Csi,
                    b']' => Strip::Osc,
                    _ => Strip::Normal,
                },
                // CSI ends with @ through ~
                Strip::Csi if (0x40..=0x7E).contains(&byte) => Strip::Normal,
                Strip::Csi => Strip::Csi,
                Strip::Osc => match byte {
                    0x07 => Strip::Normal,
                    0x1B => Strip::OscEsc,
                    _ => Strip::Osc,
                },
                Strip::OscEsc => match byte {
                    b'\\' => Strip::Normal,
                    0x1B => Strip::OscEsc,
                    _ => Strip::Osc,
                },
            };
        }
        self.state.take_damage()
    }

    fn resize(&mut self, rows: u16, cols: u16) -> Option<GridSize> {
        self.state.resize(rows, cols).then(|| self.state.size())
    }

    fn reset(&mut self) -> DamageSet {
        self.strip = Strip::Normal;
        self.utf8.reset();
        self.state.reset();
        self.state.take_damage()
    }

    fn clear_screen(&mut self) -> DamageSet {
        self.reset()
    }

    fn cursor(&self) -> CursorState {
        self.state.cursor()
    }

    fn take_damage(&mut self) -> DamageSet {
        self.state.take_damage()
    }

    fn take_replies(&mut self) -> Vec<u8> {
        Vec::new()
    }

    fn title(&self) -> &str {
        ""
    }

    fn theme(&self) -> &Theme {
        &self.theme
    }

    fn set_theme(&mut self, theme: Theme) -> DamageSet {
        self.theme = theme;
        DamageSet::full()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::term::state::{MAX_COLS, MAX_ROWS, MIN_COLS, MIN_ROWS};
    use crate::core::term::{AttrFlags, Color};
    use proptest::prelude::*;

    fn vt() -> VtEmulator {
        VtEmulator::new(GridSize::default(), Theme::default())
    }

    fn row_text(emu: &dyn Emulator, row: u16) -> String {
        let cols = emu.size().cols;
        let text: String = (0..cols).map(|c| emu.cell(row, c).display_char()).collect();
        text.trim_end().to_string()
    }

    #[test]
    fn test_clear_screen_sequence_blanks_cells() {
        let mut emu = vt();
        emu.feed(b"hello\r\nworld");
        let damage = emu.feed(b"\x1b[2J");
        assert!(damage.is_full());
        for row in 0..2 {
            for col in 0..5 {
                assert!(emu.cell(row, col).is_blank());
            }
        }
    }

    #[test]
    fn test_reverse_video_second_cell() {
        let mut emu = vt();
        emu.feed(b"A\x1b[7mB");
        let theme = emu.theme().clone();
        let a = emu.cell(0, 0);
        let b = emu.cell(0, 1);
        assert_eq!(a.glyph, 'A');
        assert!(!a.flags.contains(AttrFlags::INVERSE));
        assert_eq!(
            a.resolve_colors(theme.foreground, theme.background),
            (theme.foreground, theme.background)
        );
        assert_eq!(b.glyph, 'B');
        assert_eq!(
            b.resolve_colors(theme.foreground, theme.background),
            (theme.background, theme.foreground)
        );
    }

    #[test]
    fn test_reset_blanks_grid_and_homes_cursor() {
        let mut emu = vt();
        emu.feed(b"\x1b[41mxyz\x1b[10;20H");
        emu.reset();
        assert_eq!(emu.cursor().row, 0);
        assert_eq!(emu.cursor().col, 0);
        for col in 0..5 {
            let cell = emu.cell(0, col);
            assert!(cell.is_blank());
            assert_eq!(cell.bg, Color::Default);
        }
        // Pen is cleared too
        emu.feed(b"q");
        assert_eq!(emu.cell(0, 0).bg, Color::Default);
    }

    #[test]
    fn test_resize_reports_only_real_changes() {
        let mut emu = vt();
        emu.take_damage();
        assert_eq!(emu.resize(24, 100), None);
        assert_eq!(emu.resize(3, 3), None);
        assert!(emu.take_damage().is_empty());

        assert_eq!(emu.resize(40, 120), Some(GridSize { rows: 40, cols: 120 }));
        assert!(emu.take_damage().is_full());
    }

    #[test]
    fn test_replies_are_queued() {
        let mut emu = vt();
        emu.feed(b"\x1b[6n");
        assert_eq!(emu.take_replies(), b"\x1b[1;1R");
        assert!(emu.take_replies().is_empty());
    }

    #[test]
    fn test_feed_reports_row_damage() {
        let mut emu = vt();
        emu.take_damage();
        emu.feed(b"\x1b[5;1Hx");
        let damage = emu.feed(b"y");
        assert!(damage.contains_row(4));
        assert!(!damage.is_full());
        assert!(damage.cursor_moved());
    }

    #[test]
    fn test_plain_strips_sequences() {
        let mut emu = PlainEmulator::new(GridSize::default(), Theme::default());
        emu.feed(b"\x1b]0;title\x07\x1b[1;31mred\x1b[0m text\r\nnext");
        assert_eq!(row_text(&emu, 0), "red text");
        assert_eq!(row_text(&emu, 1), "next");
        assert_eq!(emu.cell(0, 0).fg, Color::Default);
    }

    #[test]
    fn test_plain_sequence_split_across_feeds() {
        let mut emu = PlainEmulator::new(GridSize::default(), Theme::default());
        emu.feed(b"a\x1b[3");
        emu.feed(b"8;5;1mb\x1b]2;x\x1b");
        emu.feed(b"\\c");
        assert_eq!(row_text(&emu, 0), "abc");
    }

    #[test]
    fn test_mode_selects_implementation() {
        let mut plain = new_emulator(EmulationMode::Plain, GridSize::default(), Theme::default());
        plain.feed(b"\x1b[6n");
        assert!(plain.take_replies().is_empty());

        let mut full = new_emulator(EmulationMode::Full, GridSize::default(), Theme::default());
        full.feed(b"\x1b[6n");
        assert!(!full.take_replies().is_empty());
    }

    #[test]
    fn test_clear_screen_wipes_both_modes() {
        for mode in [EmulationMode::Full, EmulationMode::Plain] {
            let mut emu = new_emulator(mode, GridSize::default(), Theme::default());
            emu.feed(b"stale prompt$ ");
            let damage = emu.clear_screen();
            assert!(!damage.is_empty());
            assert_eq!(row_text(emu.as_ref(), 0), "");
            assert_eq!((emu.cursor().row, emu.cursor().col), (0, 0));
        }
    }

    proptest! {
        #[test]
        fn feed_never_panics_and_cursor_stays_in_bounds(
            chunks in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 0..16)
        ) {
            let mut emu = vt();
            for chunk in &chunks {
                emu.feed(chunk);
                let size = emu.size();
                let cursor = emu.cursor();
                prop_assert!(cursor.row < size.rows);
                prop_assert!(cursor.col < size.cols);
            }
        }

        #[test]
        fn escape_heavy_input_never_panics(
            data in prop::collection::vec(
                prop_oneof![
                    Just(0x1bu8), Just(b'['), Just(b']'), Just(b';'), Just(b'?'),
                    Just(0x07u8), Just(b'\\'), Just(b'P'), Just(b'X'), Just(b'^'), Just(b'_'),
                    Just(0x18u8), b'0'..=b'9', 0x40u8..=0x7e, 0x80u8..=0xff
                ],
                0..512
            )
        ) {
            let mut emu = vt();
            let (head, tail) = data.split_at(data.len() / 2);
            emu.feed(head);
            emu.feed(tail);
            let cursor = emu.cursor();
            prop_assert!(cursor.row < emu.size().rows);
            prop_assert!(cursor.col < emu.size().cols);
        }

        #[test]
        fn resize_always_within_bounds(rows in any::<u16>(), cols in any::<u16>()) {
            let mut emu = vt();
            emu.resize(rows, cols);
            let size = emu.size();
            prop_assert!((MIN_ROWS..=MAX_ROWS).contains(&size.rows));
            prop_assert!((MIN_COLS..=MAX_COLS).contains(&size.cols));
            prop_assert!(emu.cursor().row < size.rows);
        }

        #[test]
        fn plain_feed_never_panics(data in prop::collection::vec(any::<u8>(), 0..512)) {
            let mut emu = PlainEmulator::new(GridSize::default(), Theme::default());
            emu.feed(&data);
            prop_assert!(emu.cursor().col < emu.size().cols);
        }
    }
}
