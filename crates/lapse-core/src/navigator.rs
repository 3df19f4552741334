//! Stepping between changed regions of a diff
//!
//! The cursor sits half a line away from itself when compared with change
//! positions, so a cursor resting on a change moves past it instead of
//! finding it again.

/// Smallest position strictly after `cursor`
pub fn next_change(cursor: usize, positions: &[usize]) -> Option<usize> {
    if positions.is_empty() {
        return None;
    }
    let threshold = cursor as f64 + 0.5;
    positions.iter().copied().find(|&p| p as f64 > threshold)
}

/// Largest position strictly before `cursor`, scanning from the end
pub fn previous_change(cursor: usize, positions: &[usize]) -> Option<usize> {
    if positions.is_empty() {
        return None;
    }
    let threshold = cursor as f64 - 0.5;
    positions.iter().rev().copied().find(|&p| (p as f64) < threshold)
}

/// Cursor over one diff's changed-line positions
#[derive(Debug, Clone, Default)]
pub struct ChangeNavigator {
    positions: Vec<usize>,
    cursor: usize,
}

impl ChangeNavigator {
    pub fn new(positions: impl Into<Vec<usize>>) -> Self {
        Self {
            positions: positions.into(),
            cursor: 0,
        }
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn goto(&mut self, line: usize) {
        self.cursor = line;
    }

    /// Move to the next change; false when there is none
    pub fn forward(&mut self) -> bool {
        match next_change(self.cursor, &self.positions) {
            Some(position) => {
                self.cursor = position;
                true
            }
            None => false,
        }
    }

    pub fn back(&mut self) -> bool {
        match previous_change(self.cursor, &self.positions) {
            Some(position) => {
                self.cursor = position;
                true
            }
            None => false,
        }
    }

    /// Index of the change the cursor rests on
    pub fn current_index(&self) -> Option<usize> {
        self.positions.binary_search(&self.cursor).ok()
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }
}
