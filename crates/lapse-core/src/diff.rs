//! Line diff between two revisions
//!
//! The result is a list of aligned rows: each row shows a left line, a right
//! line, or both. Changed-line positions are row indices, so the navigator
//! and the search collaborator agree on what "line 12" means in either
//! display mode.

use imara_diff::{Algorithm, Diff as LineDiff, InternedInput};
use serde::{Deserialize, Serialize};

/// How unchanged lines are shown
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DisplayMode {
    #[default]
    Full,
    /// Unchanged runs collapse into a single fold row
    DifferencesOnly,
}

impl DisplayMode {
    pub fn from_flag(differences_only: bool) -> Self {
        if differences_only {
            DisplayMode::DifferencesOnly
        } else {
            DisplayMode::Full
        }
    }

    pub fn differences_only(self) -> bool {
        self == DisplayMode::DifferencesOnly
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RowKind {
    Unchanged,
    /// Both sides present but different
    Modified,
    Deleted,
    Inserted,
    /// Number of unchanged lines hidden here
    Folded(usize),
}

impl RowKind {
    pub fn is_change(self) -> bool {
        matches!(self, RowKind::Modified | RowKind::Deleted | RowKind::Inserted)
    }
}

/// One side of a row; `number` is 1-based within that revision
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffLine {
    pub number: usize,
    pub text: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRow {
    pub kind: RowKind,
    pub left: Option<DiffLine>,
    pub right: Option<DiffLine>,
}

/// Aligned diff of two texts
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diff {
    rows: Vec<DiffRow>,
    changed_positions: Vec<usize>,
    mode: DisplayMode,
}

impl Diff {
    pub fn rows(&self) -> &[DiffRow] {
        &self.rows
    }

    pub fn mode(&self) -> DisplayMode {
        self.mode
    }

    /// First row of every changed run, ascending
    pub fn changed_positions(&self) -> &[usize] {
        &self.changed_positions
    }

    /// Left text per row, empty where the row has no left line
    pub fn left_lines(&self) -> Vec<&str> {
        self.rows
            .iter()
            .map(|row| row.left.as_ref().map_or("", |line| line.text.as_str()))
            .collect()
    }

    pub fn right_lines(&self) -> Vec<&str> {
        self.rows
            .iter()
            .map(|row| row.right.as_ref().map_or("", |line| line.text.as_str()))
            .collect()
    }

    pub fn line_count(&self) -> usize {
        self.rows.len()
    }

    pub fn change_count(&self) -> usize {
        self.changed_positions.len()
    }

    pub fn has_changes(&self) -> bool {
        !self.changed_positions.is_empty()
    }

    pub fn difference_label(&self) -> String {
        match self.change_count() {
            1 => "1 difference".to_string(),
            n => format!("{n} differences"),
        }
    }
}

/// Line-diff collaborator used by the session
pub trait LineDiffer: Send + Sync {
    fn diff(&self, left: &str, right: &str, mode: DisplayMode) -> Diff;
}

/// [`LineDiffer`] backed by imara-diff
pub struct DiffEngine {
    algorithm: Algorithm,
}

impl Default for DiffEngine {
    fn default() -> Self {
        Self::new(Algorithm::Histogram)
    }
}

impl DiffEngine {
    pub fn new(algorithm: Algorithm) -> Self {
        Self { algorithm }
    }
}

struct RowBuilder<'a> {
    left: Vec<&'a str>,
    right: Vec<&'a str>,
    mode: DisplayMode,
    rows: Vec<DiffRow>,
    changed_positions: Vec<usize>,
}

impl<'a> RowBuilder<'a> {
    fn line(lines: &[&str], index: usize) -> DiffLine {
        DiffLine {
            number: index + 1,
            text: lines.get(index).copied().unwrap_or_default().to_string(),
        }
    }

    fn unchanged(&mut self, left_start: usize, right_start: usize, len: usize) {
        if len == 0 {
            return;
        }
        if self.mode.differences_only() {
            self.rows.push(DiffRow {
                kind: RowKind::Folded(len),
                left: None,
                right: None,
            });
            return;
        }
        for offset in 0..len {
            self.rows.push(DiffRow {
                kind: RowKind::Unchanged,
                left: Some(Self::line(&self.left, left_start + offset)),
                right: Some(Self::line(&self.right, right_start + offset)),
            });
        }
    }

    fn changed(&mut self, before: std::ops::Range<usize>, after: std::ops::Range<usize>) {
        self.changed_positions.push(self.rows.len());
        let paired = before.len().min(after.len());
        for offset in 0..before.len().max(after.len()) {
            let left = (offset < before.len()).then(|| Self::line(&self.left, before.start + offset));
            let right = (offset < after.len()).then(|| Self::line(&self.right, after.start + offset));
            let kind = if offset < paired {
                RowKind::Modified
            } else if left.is_some() {
                RowKind::Deleted
            } else {
                RowKind::Inserted
            };
            self.rows.push(DiffRow { kind, left, right });
        }
    }
}

impl LineDiffer for DiffEngine {
    fn diff(&self, left: &str, right: &str, mode: DisplayMode) -> Diff {
        let input = InternedInput::new(left, right);
        let mut diff = LineDiff::compute(self.algorithm, &input);
        diff.postprocess_lines(&input);

        let mut builder = RowBuilder {
            left: left.lines().collect(),
            right: right.lines().collect(),
            mode,
            rows: Vec::new(),
            changed_positions: Vec::new(),
        };

        let (mut left_pos, mut right_pos) = (0usize, 0usize);
        for hunk in diff.hunks() {
            let before = hunk.before.start as usize..hunk.before.end as usize;
            let after = hunk.after.start as usize..hunk.after.end as usize;
            builder.unchanged(left_pos, right_pos, before.start - left_pos);
            left_pos = before.end;
            right_pos = after.end;
            builder.changed(before, after);
        }
        let tail = builder.left.len().saturating_sub(left_pos);
        builder.unchanged(left_pos, right_pos, tail);

        Diff {
            rows: builder.rows,
            changed_positions: builder.changed_positions,
            mode,
        }
    }
}

/// Share of lines two texts have in common, from 0.0 to 1.0
pub fn line_similarity(left: &str, right: &str) -> f32 {
    let input = InternedInput::new(left, right);
    let total = input.before.len() + input.after.len();
    if total == 0 {
        return 1.0;
    }
    let diff = LineDiff::compute(Algorithm::Histogram, &input);
    let removed: usize = diff
        .hunks()
        .map(|hunk| (hunk.before.end - hunk.before.start) as usize)
        .sum();
    let common = input.before.len() - removed;
    (2 * common) as f32 / total as f32
}
