//! Damage tracking
//!
//! Records which parts of the grid changed since the last `feed`. The engine
//! never redraws anything itself; callers drain a `DamageSet` and decide.

use std::collections::BTreeSet;
use std::ops::RangeInclusive;

/// Regions of the screen that changed and must be redrawn
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DamageSet {
    /// Rows whose cells changed
    rows: BTreeSet<u16>,
    /// Whole screen must be repainted (clear, scroll, resize, reset)
    full: bool,
    /// Cursor moved or changed visibility
    cursor: bool,
}

impl DamageSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// A damage set covering the whole screen and the cursor
    pub fn full() -> Self {
        Self {
            rows: BTreeSet::new(),
            full: true,
            cursor: true,
        }
    }

    pub fn mark_row(&mut self, row: u16) {
        if !self.full {
            self.rows.insert(row);
        }
    }

    pub fn mark_all(&mut self) {
        self.full = true;
        self.rows.clear();
    }

    pub fn mark_cursor(&mut self) {
        self.cursor = true;
    }

    pub fn is_empty(&self) -> bool {
        !self.full && !self.cursor && self.rows.is_empty()
    }

    pub fn is_full(&self) -> bool {
        self.full
    }

    pub fn cursor_moved(&self) -> bool {
        self.cursor
    }

    /// Dirty rows in ascending order (empty when `is_full`)
    pub fn rows(&self) -> impl Iterator<Item = u16> + '_ {
        self.rows.iter().copied()
    }

    pub fn contains_row(&self, row: u16) -> bool {
        self.full || self.rows.contains(&row)
    }

    /// Fold another damage set into this one
    pub fn merge(&mut self, other: DamageSet) {
        if other.full {
            self.mark_all();
        } else {
            for row in other.rows {
                self.mark_row(row);
            }
        }
        self.cursor |= other.cursor;
    }

    /// Contiguous runs of dirty rows, for renderers that repaint by region.
    ///
    /// A full damage set yields a single span over `0..=last_row`.
    pub fn row_spans(&self, last_row: u16) -> Vec<RangeInclusive<u16>> {
        if self.full {
            return vec![0..=last_row];
        }

        let mut spans: Vec<RangeInclusive<u16>> = Vec::new();
        for row in self.rows.iter().copied().filter(|&r| r <= last_row) {
            match spans.last_mut() {
                Some(span) if *span.end() + 1 == row => {
                    *span = *span.start()..=row;
                }
                _ => spans.push(row..=row),
            }
        }
        spans
    }
}
