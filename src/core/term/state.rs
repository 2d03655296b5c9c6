//! Terminal state management
//!
//! This module defines the terminal's screen grid, cursor state, and attributes.
//! All mutations record damage; nothing here triggers a redraw.

use bitflags::bitflags;
use unicode_width::UnicodeWidthChar;

use super::damage::DamageSet;
use super::palette::{self, Rgb};

/// Smallest grid the engine will run with
pub const MIN_ROWS: u16 = 24;
pub const MIN_COLS: u16 = 100;
/// Upper bound on either dimension, to bound memory
pub const MAX_ROWS: u16 = 1000;
pub const MAX_COLS: u16 = 1000;

/// Tab stops every 8 columns
const TAB_WIDTH: u16 = 8;

/// Grid dimensions in cells
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct GridSize {
    pub rows: u16,
    pub cols: u16,
}

impl GridSize {
    /// Clamp a requested size into `[MIN, MAX]` on both axes
    pub fn clamped(rows: u16, cols: u16) -> Self {
        Self {
            rows: rows.clamp(MIN_ROWS, MAX_ROWS),
            cols: cols.clamp(MIN_COLS, MAX_COLS),
        }
    }
}

impl Default for GridSize {
    fn default() -> Self {
        Self {
            rows: MIN_ROWS,
            cols: MIN_COLS,
        }
    }
}

/// Terminal state holding all screen data
pub struct TerminalState {
    rows: u16,
    cols: u16,
    primary_screen: ScreenBuffer,
    alternate_screen: ScreenBuffer,
    using_alternate: bool,
    primary_cursor: CursorState,
    alternate_cursor: CursorState,
    pub current_attrs: CellAttrs,
    pub modes: TerminalModes,
    title: String,
    /// Scroll region (top, bottom) - 0-indexed, inclusive
    scroll_region: (u16, u16),
    damage: DamageSet,
}

impl TerminalState {
    pub fn new(rows: u16, cols: u16) -> Self {
        let size = GridSize::clamped(rows, cols);
        Self {
            rows: size.rows,
            cols: size.cols,
            primary_screen: ScreenBuffer::new(size.rows, size.cols),
            alternate_screen: ScreenBuffer::new(size.rows, size.cols),
            using_alternate: false,
            primary_cursor: CursorState::default(),
            alternate_cursor: CursorState::default(),
            current_attrs: CellAttrs::default(),
            modes: TerminalModes::default(),
            title: String::new(),
            scroll_region: (0, size.rows - 1),
            damage: DamageSet::full(),
        }
    }

    pub fn size(&self) -> GridSize {
        GridSize {
            rows: self.rows,
            cols: self.cols,
        }
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn set_title(&mut self, title: String) {
        self.title = title;
    }

    pub fn using_alternate(&self) -> bool {
        self.using_alternate
    }

    /// Cell at `(row, col)`; out-of-range coordinates read as blank
    pub fn cell(&self, row: u16, col: u16) -> Cell {
        self.active_screen()
            .rows
            .get(row as usize)
            .and_then(|r| r.cells.get(col as usize))
            .copied()
            .unwrap_or_default()
    }

    pub fn row_cells(&self, row: u16) -> &[Cell] {
        self.active_screen()
            .rows
            .get(row as usize)
            .map(|r| r.cells.as_slice())
            .unwrap_or(&[])
    }

    /// Cursor position, always inside the grid
    pub fn cursor(&self) -> CursorState {
        *self.active_cursor()
    }

    /// Drain accumulated damage
    pub fn take_damage(&mut self) -> DamageSet {
        std::mem::take(&mut self.damage)
    }

    fn active_screen(&self) -> &ScreenBuffer {
        if self.using_alternate {
            &self.alternate_screen
        } else {
            &self.primary_screen
        }
    }

    fn active_screen_mut(&mut self) -> &mut ScreenBuffer {
        if self.using_alternate {
            &mut self.alternate_screen
        } else {
            &mut self.primary_screen
        }
    }

    fn active_cursor(&self) -> &CursorState {
        if self.using_alternate {
            &self.alternate_cursor
        } else {
            &self.primary_cursor
        }
    }

    fn active_cursor_mut(&mut self) -> &mut CursorState {
        if self.using_alternate {
            &mut self.alternate_cursor
        } else {
            &mut self.primary_cursor
        }
    }

    /// Move the cursor, clamped to the grid
    fn move_cursor(&mut self, row: u16, col: u16) {
        let row = row.min(self.rows - 1);
        let col = col.min(self.cols - 1);
        let cursor = self.active_cursor_mut();
        let moved = cursor.row != row || cursor.col != col;
        cursor.row = row;
        cursor.col = col;
        cursor.wrap_pending = false;
        if moved {
            self.damage.mark_cursor();
        }
    }

    /// Resize the terminal, clamping into bounds.
    ///
    /// Returns false (and records no damage) when the clamped size equals the
    /// current size.
    pub fn resize(&mut self, rows: u16, cols: u16) -> bool {
        let size = GridSize::clamped(rows, cols);
        if size == self.size() {
            return false;
        }

        self.rows = size.rows;
        self.cols = size.cols;
        self.primary_screen.resize(size.rows, size.cols);
        self.alternate_screen.resize(size.rows, size.cols);
        self.scroll_region = (0, size.rows - 1);

        let max_row = size.rows - 1;
        let max_col = size.cols - 1;
        for cursor in [&mut self.primary_cursor, &mut self.alternate_cursor] {
            cursor.row = cursor.row.min(max_row);
            cursor.col = cursor.col.min(max_col);
            cursor.wrap_pending = false;
        }

        self.damage.mark_all();
        self.damage.mark_cursor();
        true
    }

    /// Return to power-on state at the current size
    pub fn reset(&mut self) {
        let (rows, cols) = (self.rows, self.cols);
        *self = Self::new(rows, cols);
    }

    /// Put a character at the current cursor position
    pub fn put_char(&mut self, ch: char) {
        let width = match ch.width() {
            Some(w) if w > 0 => w as u16,
            // One scalar per cell: zero-width and non-printing scalars are dropped
            _ => return,
        };

        if self.active_cursor().wrap_pending {
            if self.modes.auto_wrap {
                self.active_cursor_mut().col = 0;
                self.linefeed();
            }
            self.active_cursor_mut().wrap_pending = false;
        }

        let cols = self.cols;
        let (row, mut col) = {
            let cursor = self.active_cursor();
            (cursor.row, cursor.col)
        };

        // A wide char that does not fit in the last column wraps early
        if width == 2 && col + 1 >= cols {
            if self.modes.auto_wrap {
                self.clear_cell(row, col);
                self.active_cursor_mut().col = 0;
                self.linefeed();
                col = 0;
            } else {
                return;
            }
        }
        let row = self.active_cursor().row;

        self.handle_wide_char_overwrite(row, col);
        if width == 2 {
            self.handle_wide_char_overwrite(row, col + 1);
        }

        let attrs = self.current_attrs;
        let screen = self.active_screen_mut();
        let line = &mut screen.rows[row as usize];
        if width == 2 {
            line.cells[col as usize] = Cell::with_attrs(ch, &attrs, AttrFlags::WIDE);
            line.cells[col as usize + 1] = Cell::with_attrs('\0', &attrs, AttrFlags::WIDE_SPACER);
        } else {
            line.cells[col as usize] = Cell::with_attrs(ch, &attrs, AttrFlags::empty());
        }
        self.damage.mark_row(row);

        let next = col + width;
        let cursor = self.active_cursor_mut();
        if next >= cols {
            cursor.col = cols - 1;
            cursor.wrap_pending = true;
        } else {
            cursor.col = next;
        }
        self.damage.mark_cursor();
    }

    fn clear_cell(&mut self, row: u16, col: u16) {
        let attrs = self.current_attrs;
        let screen = self.active_screen_mut();
        if let Some(cell) = screen
            .rows
            .get_mut(row as usize)
            .and_then(|r| r.cells.get_mut(col as usize))
        {
            *cell = Cell::erased(&attrs);
        }
    }

    /// Blank the other half of a wide character about to be split
    fn handle_wide_char_overwrite(&mut self, row: u16, col: u16) {
        let cols = self.cols as usize;
        let (row, col) = (row as usize, col as usize);
        let screen = self.active_screen_mut();
        let line = &mut screen.rows[row];
        if col >= line.cells.len() {
            return;
        }

        if line.cells[col].flags.contains(AttrFlags::WIDE_SPACER) && col > 0 {
            line.cells[col - 1] = Cell::default();
        }
        if line.cells[col].flags.contains(AttrFlags::WIDE) && col + 1 < cols {
            line.cells[col + 1] = Cell::default();
        }
    }

    /// Carriage return - move cursor to column 0
    pub fn carriage_return(&mut self) {
        let row = self.active_cursor().row;
        self.move_cursor(row, 0);
    }

    /// Line feed - move cursor down, scroll if needed
    pub fn linefeed(&mut self) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row, cursor.col)
        };
        let scroll_bottom = self.scroll_region.1;

        if row == scroll_bottom {
            self.scroll_up(1);
            self.active_cursor_mut().wrap_pending = false;
        } else if row < self.rows - 1 {
            self.move_cursor(row + 1, col);
        }
    }

    /// Backspace - move cursor left
    pub fn backspace(&mut self) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row, cursor.col)
        };
        self.move_cursor(row, col.saturating_sub(1));
    }

    /// Horizontal tab
    pub fn horizontal_tab(&mut self) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row, cursor.col)
        };
        self.move_cursor(row, (col / TAB_WIDTH + 1) * TAB_WIDTH);
    }

    /// Scroll the scroll region up by n lines
    pub fn scroll_up(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region;
        let n = n.min(bottom - top + 1);
        let cols = self.cols;
        let attrs = self.current_attrs;

        let screen = self.active_screen_mut();
        for _ in 0..n {
            screen.rows.remove(top as usize);
            screen.rows.insert(bottom as usize, Row::erased(cols, &attrs));
        }
        self.damage.mark_all();
    }

    /// Scroll the scroll region down by n lines
    pub fn scroll_down(&mut self, n: u16) {
        let (top, bottom) = self.scroll_region;
        let n = n.min(bottom - top + 1);
        let cols = self.cols;
        let attrs = self.current_attrs;

        let screen = self.active_screen_mut();
        for _ in 0..n {
            screen.rows.remove(bottom as usize);
            screen.rows.insert(top as usize, Row::erased(cols, &attrs));
        }
        self.damage.mark_all();
    }

    /// Cursor up
    pub fn cursor_up(&mut self, n: u16) {
        let cursor = *self.active_cursor();
        self.move_cursor(cursor.row.saturating_sub(n), cursor.col);
    }

    /// Cursor down
    pub fn cursor_down(&mut self, n: u16) {
        let cursor = *self.active_cursor();
        self.move_cursor(cursor.row.saturating_add(n), cursor.col);
    }

    /// Cursor forward (right)
    pub fn cursor_forward(&mut self, n: u16) {
        let cursor = *self.active_cursor();
        self.move_cursor(cursor.row, cursor.col.saturating_add(n));
    }

    /// Cursor backward (left)
    pub fn cursor_backward(&mut self, n: u16) {
        let cursor = *self.active_cursor();
        self.move_cursor(cursor.row, cursor.col.saturating_sub(n));
    }

    /// Set cursor position (1-indexed parameters)
    pub fn cursor_position(&mut self, row: u16, col: u16) {
        self.move_cursor(row.saturating_sub(1), col.saturating_sub(1));
    }

    /// Set cursor column (1-indexed)
    pub fn cursor_column(&mut self, col: u16) {
        let row = self.active_cursor().row;
        self.move_cursor(row, col.saturating_sub(1));
    }

    /// Set cursor row (1-indexed)
    pub fn cursor_row(&mut self, row: u16) {
        let col = self.active_cursor().col;
        self.move_cursor(row.saturating_sub(1), col);
    }

    /// Erase in display
    pub fn erase_in_display(&mut self, mode: u16) {
        let cursor_row = self.active_cursor().row as usize;
        let attrs = self.current_attrs;

        match mode {
            0 => {
                // From cursor to end
                self.erase_in_line(0);
                let screen = self.active_screen_mut();
                for row in screen.rows.iter_mut().skip(cursor_row + 1) {
                    row.clear(&attrs);
                }
                for r in cursor_row + 1..self.rows as usize {
                    self.damage.mark_row(r as u16);
                }
            }
            1 => {
                // From start to cursor
                let screen = self.active_screen_mut();
                for row in screen.rows.iter_mut().take(cursor_row) {
                    row.clear(&attrs);
                }
                for r in 0..cursor_row {
                    self.damage.mark_row(r as u16);
                }
                self.erase_in_line(1);
            }
            2 | 3 => {
                // Entire screen
                let screen = self.active_screen_mut();
                for row in &mut screen.rows {
                    row.clear(&attrs);
                }
                self.damage.mark_all();
            }
            _ => {}
        }
    }

    /// Erase in line
    pub fn erase_in_line(&mut self, mode: u16) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row, cursor.col as usize)
        };
        let attrs = self.current_attrs;

        let screen = self.active_screen_mut();
        let line = &mut screen.rows[row as usize];
        let cells = match mode {
            0 => &mut line.cells[col..],
            1 => &mut line.cells[..=col],
            2 => &mut line.cells[..],
            _ => return,
        };
        for cell in cells {
            *cell = Cell::erased(&attrs);
        }
        self.damage.mark_row(row);
    }

    /// Insert blank lines at the cursor, within the scroll region
    pub fn insert_lines(&mut self, n: u16) {
        let row = self.active_cursor().row;
        let (top, bottom) = self.scroll_region;
        if row < top || row > bottom {
            return;
        }
        let n = n.min(bottom - row + 1);
        let cols = self.cols;
        let attrs = self.current_attrs;

        let screen = self.active_screen_mut();
        for _ in 0..n {
            screen.rows.remove(bottom as usize);
            screen.rows.insert(row as usize, Row::erased(cols, &attrs));
        }
        self.damage.mark_all();
        self.carriage_return();
    }

    /// Delete lines at the cursor, within the scroll region
    pub fn delete_lines(&mut self, n: u16) {
        let row = self.active_cursor().row;
        let (top, bottom) = self.scroll_region;
        if row < top || row > bottom {
            return;
        }
        let n = n.min(bottom - row + 1);
        let cols = self.cols;
        let attrs = self.current_attrs;

        let screen = self.active_screen_mut();
        for _ in 0..n {
            screen.rows.remove(row as usize);
            screen.rows.insert(bottom as usize, Row::erased(cols, &attrs));
        }
        self.damage.mark_all();
        self.carriage_return();
    }

    /// ICH - shift cells right from the cursor
    pub fn insert_chars(&mut self, n: u16) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row, cursor.col as usize)
        };
        let attrs = self.current_attrs;
        let screen = self.active_screen_mut();
        let cells = &mut screen.rows[row as usize].cells;
        let n = (n as usize).min(cells.len() - col);

        cells[col..].rotate_right(n);
        for cell in &mut cells[col..col + n] {
            *cell = Cell::erased(&attrs);
        }
        self.damage.mark_row(row);
    }

    /// DCH - shift cells left into the cursor
    pub fn delete_chars(&mut self, n: u16) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row, cursor.col as usize)
        };
        let attrs = self.current_attrs;
        let screen = self.active_screen_mut();
        let cells = &mut screen.rows[row as usize].cells;
        let len = cells.len();
        let n = (n as usize).min(len - col);

        cells[col..].rotate_left(n);
        for cell in &mut cells[len - n..] {
            *cell = Cell::erased(&attrs);
        }
        self.damage.mark_row(row);
    }

    /// ECH - blank cells from the cursor without shifting
    pub fn erase_chars(&mut self, n: u16) {
        let (row, col) = {
            let cursor = self.active_cursor();
            (cursor.row, cursor.col as usize)
        };
        let attrs = self.current_attrs;
        let screen = self.active_screen_mut();
        let cells = &mut screen.rows[row as usize].cells;
        let end = (col + n as usize).min(cells.len());

        for cell in &mut cells[col..end] {
            *cell = Cell::erased(&attrs);
        }
        self.damage.mark_row(row);
    }

    /// Set scroll region (1-indexed, inclusive); invalid regions are ignored
    pub fn set_scroll_region(&mut self, top: u16, bottom: u16) {
        let max_row = self.rows - 1;
        let top = top.saturating_sub(1).min(max_row);
        let bottom = if bottom == 0 {
            max_row
        } else {
            (bottom - 1).min(max_row)
        };
        if top < bottom {
            self.scroll_region = (top, bottom);
            self.move_cursor(0, 0);
        }
    }

    /// Save cursor position and pen
    pub fn save_cursor(&mut self) {
        let attrs = self.current_attrs;
        let cursor = self.active_cursor_mut();
        cursor.saved = Some(SavedCursor {
            row: cursor.row,
            col: cursor.col,
            attrs,
        });
    }

    /// Restore cursor position and pen
    pub fn restore_cursor(&mut self) {
        if let Some(saved) = self.active_cursor().saved {
            self.current_attrs = saved.attrs;
            self.move_cursor(saved.row, saved.col);
        }
    }

    /// Set private (DEC) mode
    pub fn set_private_mode(&mut self, mode: u16, enable: bool) {
        match mode {
            7 => self.modes.auto_wrap = enable,
            25 => {
                let cursor = self.active_cursor_mut();
                if cursor.visible != enable {
                    cursor.visible = enable;
                    self.damage.mark_cursor();
                }
            }
            47 | 1047 => self.switch_screen(enable),
            1048 => {
                if enable {
                    self.save_cursor();
                } else {
                    self.restore_cursor();
                }
            }
            1049 => {
                if enable {
                    self.save_cursor();
                    self.switch_screen(true);
                    self.alternate_cursor = CursorState::default();
                } else {
                    self.switch_screen(false);
                    self.restore_cursor();
                }
            }
            _ => {
                tracing::trace!(mode, enable, "ignoring private mode");
            }
        }
    }

    fn switch_screen(&mut self, alternate: bool) {
        if alternate == self.using_alternate {
            return;
        }
        if alternate {
            self.alternate_screen = ScreenBuffer::new(self.rows, self.cols);
        }
        self.using_alternate = alternate;
        self.damage.mark_all();
        self.damage.mark_cursor();
    }

    /// Reverse index - cursor up, scroll if at top
    pub fn reverse_index(&mut self) {
        let row = self.active_cursor().row;
        if row == self.scroll_region.0 {
            self.scroll_down(1);
        } else {
            self.cursor_up(1);
        }
    }

    /// Index - cursor down, scroll if at bottom
    pub fn index(&mut self) {
        self.linefeed();
    }
}

/// One screen's worth of rows. No scrollback is kept.
struct ScreenBuffer {
    rows: Vec<Row>,
}

impl ScreenBuffer {
    fn new(rows: u16, cols: u16) -> Self {
        Self {
            rows: (0..rows).map(|_| Row::new(cols)).collect(),
        }
    }

    /// Keep the top-left overlap, blank-fill the rest
    fn resize(&mut self, rows: u16, cols: u16) {
        self.rows.truncate(rows as usize);
        while self.rows.len() < rows as usize {
            self.rows.push(Row::new(cols));
        }
        for row in &mut self.rows {
            row.resize(cols);
        }
    }
}

/// A single row; always exactly `cols` cells long
#[derive(Clone)]
struct Row {
    cells: Vec<Cell>,
}

impl Row {
    fn new(cols: u16) -> Self {
        Self {
            cells: vec![Cell::default(); cols as usize],
        }
    }

    fn erased(cols: u16, attrs: &CellAttrs) -> Self {
        Self {
            cells: vec![Cell::erased(attrs); cols as usize],
        }
    }

    fn resize(&mut self, cols: u16) {
        self.cells.resize(cols as usize, Cell::default());
        // A wide char cut in half at the new edge becomes blank
        if let Some(last) = self.cells.last_mut() {
            if last.flags.contains(AttrFlags::WIDE) {
                *last = Cell::default();
            }
        }
    }

    fn clear(&mut self, attrs: &CellAttrs) {
        for cell in &mut self.cells {
            *cell = Cell::erased(attrs);
        }
    }
}

/// A single cell. `glyph == '\0'` means blank.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Cell {
    pub glyph: char,
    pub fg: Color,
    pub bg: Color,
    pub flags: AttrFlags,
}

impl Default for Cell {
    fn default() -> Self {
        Self {
            glyph: '\0',
            fg: Color::Default,
            bg: Color::Default,
            flags: AttrFlags::empty(),
        }
    }
}

impl Cell {
    fn with_attrs(glyph: char, attrs: &CellAttrs, layout: AttrFlags) -> Self {
        Self {
            glyph,
            fg: attrs.fg,
            bg: attrs.bg,
            flags: attrs.flags | layout,
        }
    }

    /// Blank cell carrying only the pen's background
    fn erased(attrs: &CellAttrs) -> Self {
        Self {
            bg: attrs.bg,
            ..Self::default()
        }
    }

    pub fn is_blank(&self) -> bool {
        self.glyph == '\0'
    }

    /// Right half of a wide character
    pub fn is_spacer(&self) -> bool {
        self.flags.contains(AttrFlags::WIDE_SPACER)
    }

    /// Get the display character (space if blank)
    pub fn display_char(&self) -> char {
        if self.is_blank() {
            ' '
        } else {
            self.glyph
        }
    }

    /// Concrete (foreground, background), with reverse video applied
    pub fn resolve_colors(&self, default_fg: Rgb, default_bg: Rgb) -> (Rgb, Rgb) {
        let fg = self.fg.resolve(default_fg);
        let bg = self.bg.resolve(default_bg);
        if self.flags.contains(AttrFlags::INVERSE) {
            (bg, fg)
        } else {
            (fg, bg)
        }
    }
}

/// Pen attributes applied to newly written cells
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CellAttrs {
    pub fg: Color,
    pub bg: Color,
    pub flags: AttrFlags,
}

impl CellAttrs {
    pub fn reset(&mut self) {
        *self = Self::default();
    }
}

/// Color definition
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum Color {
    #[default]
    Default,
    Indexed(u8),
    Rgb(u8, u8, u8),
}

impl Color {
    pub fn resolve(self, default: Rgb) -> Rgb {
        match self {
            Color::Default => default,
            Color::Indexed(n) => palette::indexed(n),
            Color::Rgb(r, g, b) => Rgb::new(r, g, b),
        }
    }
}

bitflags! {
    #[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
    pub struct AttrFlags: u16 {
        const BOLD          = 0b0000_0000_0001;
        const DIM           = 0b0000_0000_0010;
        const ITALIC        = 0b0000_0000_0100;
        const UNDERLINE     = 0b0000_0000_1000;
        const BLINK         = 0b0000_0001_0000;
        const INVERSE       = 0b0000_0010_0000;
        const HIDDEN        = 0b0000_0100_0000;
        const STRIKETHROUGH = 0b0000_1000_0000;
        /// Left half of a double-width character
        const WIDE          = 0b0001_0000_0000;
        /// Right half of a double-width character
        const WIDE_SPACER   = 0b0010_0000_0000;
    }
}

/// Cursor state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct CursorState {
    pub row: u16,
    pub col: u16,
    pub visible: bool,
    /// Last column was written; the next printable wraps first
    wrap_pending: bool,
    saved: Option<SavedCursor>,
}

impl Default for CursorState {
    fn default() -> Self {
        Self {
            row: 0,
            col: 0,
            visible: true,
            wrap_pending: false,
            saved: None,
        }
    }
}

/// Saved cursor state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
struct SavedCursor {
    row: u16,
    col: u16,
    attrs: CellAttrs,
}

/// Terminal modes
#[derive(Clone, Debug)]
pub struct TerminalModes {
    pub auto_wrap: bool,
}

impl Default for TerminalModes {
    fn default() -> Self {
        Self { auto_wrap: true }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_str(state: &mut TerminalState, s: &str) {
        for ch in s.chars() {
            state.put_char(ch);
        }
    }

    #[test]
    fn test_new_clamps_to_minimum() {
        let state = TerminalState::new(10, 10);
        assert_eq!(state.size(), GridSize { rows: 24, cols: 100 });
        assert_eq!(state.row_cells(0).len(), 100);
    }

    #[test]
    fn test_wrap_at_column_boundary() {
        let mut state = TerminalState::new(24, 100);
        write_str(&mut state, &"x".repeat(100));
        // Deferred wrap: cursor parks on the last column
        assert_eq!(state.cursor().row, 0);
        assert_eq!(state.cursor().col, 99);

        state.put_char('y');
        assert_eq!(state.cell(1, 0).glyph, 'y');
        assert_eq!(state.cursor().row, 1);
        assert_eq!(state.cursor().col, 1);
    }

    #[test]
    fn test_no_wrap_when_autowrap_off() {
        let mut state = TerminalState::new(24, 100);
        state.set_private_mode(7, false);
        write_str(&mut state, &"x".repeat(100));
        state.put_char('z');
        assert_eq!(state.cell(0, 99).glyph, 'z');
        assert_eq!(state.cursor().row, 0);
    }

    #[test]
    fn test_wide_char_takes_two_cells() {
        let mut state = TerminalState::new(24, 100);
        state.put_char('日');
        assert_eq!(state.cell(0, 0).glyph, '日');
        assert!(state.cell(0, 1).is_spacer());
        assert_eq!(state.cursor().col, 2);

        // Overwriting the spacer blanks the left half
        state.cursor_position(1, 2);
        state.put_char('a');
        assert!(state.cell(0, 0).is_blank());
        assert_eq!(state.cell(0, 1).glyph, 'a');
    }

    #[test]
    fn test_linefeed_scrolls_at_bottom() {
        let mut state = TerminalState::new(24, 100);
        state.put_char('a');
        state.cursor_position(24, 1);
        state.put_char('b');
        state.linefeed();
        assert_eq!(state.cursor().row, 23);
        assert_eq!(state.cell(22, 0).glyph, 'b');
        assert!(state.cell(23, 0).is_blank());
        // Row 0 scrolled off with no history
        assert!(state.cell(0, 0).is_blank());
    }

    #[test]
    fn test_resize_preserves_top_left() {
        let mut state = TerminalState::new(30, 120);
        state.cursor_position(2, 5);
        state.put_char('q');
        state.cursor_position(30, 120);
        state.put_char('z');

        assert!(state.resize(24, 100));
        assert_eq!(state.size(), GridSize { rows: 24, cols: 100 });
        assert_eq!(state.cell(1, 4).glyph, 'q');
        assert_eq!(state.cursor().row, 23);
        assert_eq!(state.cursor().col, 99);
        for r in 0..24 {
            assert_eq!(state.row_cells(r).len(), 100);
        }

        assert!(state.resize(40, 130));
        assert_eq!(state.cell(1, 4).glyph, 'q');
        assert!(state.cell(39, 129).is_blank());
    }

    #[test]
    fn test_resize_same_size_is_noop() {
        let mut state = TerminalState::new(24, 100);
        state.take_damage();
        assert!(!state.resize(24, 100));
        // Clamps to the same effective size
        assert!(!state.resize(1, 1));
        assert!(state.take_damage().is_empty());
    }

    #[test]
    fn test_resize_clamps_upper_bound() {
        let mut state = TerminalState::new(24, 100);
        state.resize(5000, 5000);
        assert_eq!(state.size(), GridSize { rows: MAX_ROWS, cols: MAX_COLS });
    }

    #[test]
    fn test_erase_display_clears_all() {
        let mut state = TerminalState::new(24, 100);
        write_str(&mut state, "hello");
        state.erase_in_display(2);
        for c in 0..5 {
            assert_eq!(state.cell(0, c), Cell::default());
        }
        assert!(state.take_damage().is_full());
    }

    #[test]
    fn test_erase_uses_pen_background() {
        let mut state = TerminalState::new(24, 100);
        state.current_attrs.bg = Color::Indexed(4);
        state.current_attrs.flags = AttrFlags::INVERSE;
        state.erase_in_line(2);
        let cell = state.cell(0, 50);
        assert_eq!(cell.bg, Color::Indexed(4));
        assert!(cell.flags.is_empty());
    }

    #[test]
    fn test_insert_and_delete_chars() {
        let mut state = TerminalState::new(24, 100);
        write_str(&mut state, "abcd");
        state.cursor_position(1, 2);
        state.insert_chars(2);
        assert_eq!(state.cell(0, 0).glyph, 'a');
        assert!(state.cell(0, 1).is_blank());
        assert_eq!(state.cell(0, 3).glyph, 'b');

        state.delete_chars(2);
        assert_eq!(state.cell(0, 1).glyph, 'b');
        assert_eq!(state.cell(0, 3).glyph, 'd');
        assert_eq!(state.row_cells(0).len(), 100);
    }

    #[test]
    fn test_scroll_region_limits_scrolling() {
        let mut state = TerminalState::new(24, 100);
        state.cursor_position(1, 1);
        state.put_char('h');
        state.set_scroll_region(5, 10);
        state.cursor_position(10, 1);
        state.put_char('x');
        state.linefeed();
        // Row outside the region is untouched
        assert_eq!(state.cell(0, 0).glyph, 'h');
        assert_eq!(state.cell(8, 0).glyph, 'x');
        assert_eq!(state.cursor().row, 9);
    }

    #[test]
    fn test_alternate_screen_restores_primary() {
        let mut state = TerminalState::new(24, 100);
        write_str(&mut state, "main");
        state.set_private_mode(1049, true);
        assert!(state.using_alternate());
        assert!(state.cell(0, 0).is_blank());
        write_str(&mut state, "alt");
        state.set_private_mode(1049, false);
        assert_eq!(state.cell(0, 0).glyph, 'm');
        assert_eq!(state.cursor().col, 4);
    }

    #[test]
    fn test_reverse_video_swaps_resolved_colors() {
        let fg = Rgb::new(220, 220, 220);
        let bg = Rgb::new(0, 0, 0);
        let mut cell = Cell {
            glyph: 'B',
            ..Cell::default()
        };
        assert_eq!(cell.resolve_colors(fg, bg), (fg, bg));
        cell.flags |= AttrFlags::INVERSE;
        assert_eq!(cell.resolve_colors(fg, bg), (bg, fg));
    }
}
