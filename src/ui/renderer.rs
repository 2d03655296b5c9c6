//! Terminal renderer using crossterm
//!
//! Paints an emulator's grid onto the host console. Only rows named in the
//! damage set are redrawn; colors are resolved against the session theme so
//! the host's own palette never leaks in.

use std::io::{self, Write};

use crossterm::{
    cursor::{Hide, MoveTo, Show},
    event::{DisableBracketedPaste, DisableMouseCapture, EnableBracketedPaste, EnableMouseCapture},
    execute, queue,
    style::{Attribute, Print, ResetColor, SetAttribute, SetBackgroundColor, SetForegroundColor},
    terminal::{
        self, Clear, ClearType, DisableLineWrap, EnableLineWrap, EnterAlternateScreen,
        LeaveAlternateScreen, SetTitle,
    },
};

use crate::core::emulator::Emulator;
use crate::core::term::{AttrFlags, DamageSet, Rgb};
use crate::selection::SelectionRange;

/// Style flags the renderer actually draws
const DRAWN_FLAGS: AttrFlags = AttrFlags::BOLD
    .union(AttrFlags::DIM)
    .union(AttrFlags::ITALIC)
    .union(AttrFlags::UNDERLINE)
    .union(AttrFlags::BLINK)
    .union(AttrFlags::HIDDEN)
    .union(AttrFlags::STRIKETHROUGH);

/// A run of adjacent cells sharing one style
#[derive(Debug, Clone, PartialEq)]
struct Run {
    col: u16,
    text: String,
    fg: Rgb,
    bg: Rgb,
    flags: AttrFlags,
}

/// Split one grid row into styled runs.
///
/// Selection swaps the resolved colors; reverse video is already folded in
/// by [`Cell::resolve_colors`](crate::core::term::Cell::resolve_colors).
fn row_runs(emu: &dyn Emulator, row: u16, selection: Option<&SelectionRange>) -> Vec<Run> {
    let theme = emu.theme();
    let cols = emu.size().cols;
    let mut runs: Vec<Run> = Vec::new();

    for col in 0..cols {
        let cell = emu.cell(row, col);
        if cell.is_spacer() {
            continue;
        }
        let (mut fg, mut bg) = cell.resolve_colors(theme.foreground, theme.background);
        if selection.is_some_and(|s| s.contains(row, col)) {
            std::mem::swap(&mut fg, &mut bg);
        }
        let flags = cell.flags & DRAWN_FLAGS;

        match runs.last_mut() {
            Some(run) if run.fg == fg && run.bg == bg && run.flags == flags => {
                run.text.push(cell.display_char());
            }
            _ => runs.push(Run {
                col,
                text: cell.display_char().to_string(),
                fg,
                bg,
                flags,
            }),
        }
    }
    runs
}

/// Host pastes arrive as one bracketed event and go to the remote unmodified
fn enter_screen<W: Write>(out: &mut W) -> io::Result<()> {
    execute!(
        out,
        EnterAlternateScreen,
        EnableMouseCapture,
        EnableBracketedPaste,
        DisableLineWrap,
        Clear(ClearType::All),
        MoveTo(0, 0)
    )
}

fn leave_screen<W: Write>(out: &mut W) -> io::Result<()> {
    execute!(
        out,
        ResetColor,
        SetAttribute(Attribute::Reset),
        Show,
        EnableLineWrap,
        DisableBracketedPaste,
        DisableMouseCapture,
        LeaveAlternateScreen
    )
}

/// Terminal renderer
pub struct Renderer {
    initialized: bool,
    /// Blink phase; the cursor is drawn only while this is on
    cursor_on: bool,
    title: String,
}

impl Default for Renderer {
    fn default() -> Self {
        Self::new()
    }
}

impl Renderer {
    pub fn new() -> Self {
        Self {
            initialized: false,
            cursor_on: true,
            title: String::new(),
        }
    }

    /// Enter raw mode on the alternate screen with mouse capture
    pub fn init(&mut self) -> io::Result<()> {
        terminal::enable_raw_mode()?;
        enter_screen(&mut io::stdout())?;
        self.initialized = true;
        tracing::debug!("Renderer initialized");
        Ok(())
    }

    /// Restore the host console
    pub fn cleanup(&mut self) -> io::Result<()> {
        if !self.initialized {
            return Ok(());
        }
        self.initialized = false;

        let mut stdout = io::stdout();
        let _ = leave_screen(&mut stdout);
        let _ = stdout.flush();

        // Raw mode last; everything above is best effort
        terminal::disable_raw_mode()
    }

    /// Flip the blink phase. Returns the new phase.
    pub fn toggle_cursor_blink(&mut self) -> bool {
        self.cursor_on = !self.cursor_on;
        self.cursor_on
    }

    /// Force the cursor visible again, e.g. after a key press
    pub fn reset_cursor_blink(&mut self) {
        self.cursor_on = true;
    }

    /// Mirror the emulator's title into the host window, if it changed
    pub fn sync_title(&mut self, title: &str) -> io::Result<()> {
        if self.title == title {
            return Ok(());
        }
        self.title = title.to_string();
        execute!(io::stdout(), SetTitle(title))
    }

    /// Redraw every row
    pub fn render_full(
        &mut self,
        emu: &dyn Emulator,
        selection: Option<&SelectionRange>,
    ) -> io::Result<()> {
        self.render(emu, &DamageSet::full(), selection)
    }

    /// Redraw the damaged rows and place the cursor
    pub fn render(
        &mut self,
        emu: &dyn Emulator,
        damage: &DamageSet,
        selection: Option<&SelectionRange>,
    ) -> io::Result<()> {
        let size = emu.size();
        let (host_cols, host_rows) = terminal::size().unwrap_or((size.cols, size.rows));
        let last_row = size.rows.min(host_rows).saturating_sub(1);

        let stdout = io::stdout();
        let mut out = io::BufWriter::with_capacity(65536, stdout.lock());

        // Begin synchronized update (reduces flicker)
        write!(out, "\x1b[?2026h")?;
        queue!(out, Hide)?;

        for span in damage.row_spans(last_row) {
            for row in span {
                self.draw_row(&mut out, emu, row, host_cols, selection)?;
            }
        }

        queue!(out, ResetColor, SetAttribute(Attribute::Reset))?;

        let cursor = emu.cursor();
        if cursor.visible && self.cursor_on && cursor.row <= last_row && cursor.col < host_cols {
            queue!(out, MoveTo(cursor.col, cursor.row), Show)?;
        }

        write!(out, "\x1b[?2026l")?;
        out.flush()
    }

    fn draw_row<W: Write>(
        &self,
        out: &mut W,
        emu: &dyn Emulator,
        row: u16,
        host_cols: u16,
        selection: Option<&SelectionRange>,
    ) -> io::Result<()> {
        queue!(out, MoveTo(0, row))?;

        for run in row_runs(emu, row, selection) {
            if run.col >= host_cols {
                break;
            }
            // Host narrower than the grid: cut the run at the edge
            let room = usize::from(host_cols - run.col);
            let text: String = run.text.chars().take(room).collect();

            self.apply_style(out, &run)?;
            queue!(out, Print(text))?;
        }
        Ok(())
    }

    fn apply_style<W: Write>(&self, out: &mut W, run: &Run) -> io::Result<()> {
        queue!(out, SetAttribute(Attribute::Reset))?;

        let flags = run.flags;
        if flags.contains(AttrFlags::BOLD) {
            queue!(out, SetAttribute(Attribute::Bold))?;
        }
        if flags.contains(AttrFlags::DIM) {
            queue!(out, SetAttribute(Attribute::Dim))?;
        }
        if flags.contains(AttrFlags::ITALIC) {
            queue!(out, SetAttribute(Attribute::Italic))?;
        }
        if flags.contains(AttrFlags::UNDERLINE) {
            queue!(out, SetAttribute(Attribute::Underlined))?;
        }
        if flags.contains(AttrFlags::BLINK) {
            queue!(out, SetAttribute(Attribute::SlowBlink))?;
        }
        if flags.contains(AttrFlags::HIDDEN) {
            queue!(out, SetAttribute(Attribute::Hidden))?;
        }
        if flags.contains(AttrFlags::STRIKETHROUGH) {
            queue!(out, SetAttribute(Attribute::CrossedOut))?;
        }

        queue!(
            out,
            SetForegroundColor(run.fg.to_crossterm()),
            SetBackgroundColor(run.bg.to_crossterm())
        )
    }

    /// Host console size as (cols, rows)
    pub fn size() -> io::Result<(u16, u16)> {
        terminal::size()
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        let _ = self.cleanup();
    }
}
