//! Mouse text selection and copyable text extraction

use crate::core::emulator::GridView;

/// A cell coordinate. Orders row-major, so `min`/`max` normalize a range.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Default)]
pub struct GridPos {
    pub row: u16,
    pub col: u16,
}

impl GridPos {
    pub const fn new(row: u16, col: u16) -> Self {
        Self { row, col }
    }
}

/// Two corners as captured from the mouse; either may come first
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SelectionRange {
    pub start: GridPos,
    pub end: GridPos,
}

impl SelectionRange {
    pub fn new(start: GridPos, end: GridPos) -> Self {
        Self { start, end }
    }

    /// (earlier, later) in row-major order
    pub fn normalized(&self) -> (GridPos, GridPos) {
        (self.start.min(self.end), self.start.max(self.end))
    }

    /// A click without drag selects nothing
    pub fn is_empty(&self) -> bool {
        self.start == self.end
    }

    /// Check if a cell is within the selection
    pub fn contains(&self, row: u16, col: u16) -> bool {
        if self.is_empty() {
            return false;
        }
        let (start, end) = self.normalized();
        if row < start.row || row > end.row {
            return false;
        }

        if start.row == end.row {
            col >= start.col && col <= end.col
        } else if row == start.row {
            col >= start.col
        } else if row == end.row {
            col <= end.col
        } else {
            true
        }
    }
}

/// Text under `range`: one line per row, trailing spaces trimmed, joined by `\n`.
///
/// The first and last rows are clipped to the range's columns (inclusive);
/// rows in between are taken whole. Coordinates past the grid are clipped.
pub fn extract<G: GridView + ?Sized>(grid: &G, range: &SelectionRange) -> String {
    if range.is_empty() {
        return String::new();
    }

    let size = grid.size();
    let (start, end) = range.normalized();
    let last_col = size.cols - 1;

    let mut lines = Vec::new();
    for row in start.row..=end.row.min(size.rows - 1) {
        let mut c0 = if row == start.row { start.col } else { 0 };
        let mut c1 = if row == end.row { end.col } else { last_col };
        if c0 > c1 {
            std::mem::swap(&mut c0, &mut c1);
        }

        let mut line = String::new();
        for col in c0..=c1.min(last_col) {
            let cell = grid.cell(row, col);
            // Right half of a wide char; the glyph was already taken
            if cell.is_spacer() {
                continue;
            }
            line.push(cell.display_char());
        }
        lines.push(line.trim_end_matches(' ').to_string());
    }
    lines.join("\n")
}

/// Tracks a left-button press/drag/release gesture
#[derive(Debug, Default)]
pub struct SelectionTracker {
    range: Option<SelectionRange>,
    dragging: bool,
}

impl SelectionTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn press(&mut self, pos: GridPos) {
        self.range = Some(SelectionRange::new(pos, pos));
        self.dragging = true;
    }

    pub fn drag(&mut self, pos: GridPos) {
        if !self.dragging {
            return;
        }
        if let Some(range) = self.range.as_mut() {
            range.end = pos;
        }
    }

    /// Finish the gesture; returns the range only if something was selected
    pub fn release(&mut self, pos: GridPos) -> Option<SelectionRange> {
        self.drag(pos);
        self.dragging = false;
        self.range.filter(|r| !r.is_empty())
    }

    pub fn clear(&mut self) {
        self.range = None;
        self.dragging = false;
    }

    /// Current selection, for highlighting
    pub fn range(&self) -> Option<&SelectionRange> {
        self.range.as_ref().filter(|r| !r.is_empty())
    }

    pub fn is_dragging(&self) -> bool {
        self.dragging
    }
}
