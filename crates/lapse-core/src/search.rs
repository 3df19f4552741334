//! Free-text search across both sides of a diff

use crate::diff::Diff;
use regex::{Regex, RegexBuilder};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

/// Location of one match; `line` is a diff row, `column` a byte offset
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SearchHit {
    pub side: Side,
    pub line: usize,
    pub column: usize,
    pub len: usize,
}

/// Repeated search over fixed left and right texts
///
/// Each call to [`Searcher::search`] with the same query moves to the
/// following match, left side before right side, wrapping at the end.
#[derive(Debug, Clone, Default)]
pub struct Searcher {
    left: Vec<String>,
    right: Vec<String>,
    query: String,
    index: Option<usize>,
    hit: Option<SearchHit>,
}

fn build_regex(query: &str) -> Option<Regex> {
    RegexBuilder::new(query)
        .case_insensitive(true)
        .build()
        .or_else(|_| {
            RegexBuilder::new(&regex::escape(query))
                .case_insensitive(true)
                .build()
        })
        .ok()
}

impl Searcher {
    pub fn new<L, R>(left: L, right: R) -> Self
    where
        L: IntoIterator,
        L::Item: Into<String>,
        R: IntoIterator,
        R::Item: Into<String>,
    {
        Self {
            left: left.into_iter().map(Into::into).collect(),
            right: right.into_iter().map(Into::into).collect(),
            ..Self::default()
        }
    }

    pub fn from_diff(diff: &Diff) -> Self {
        Self::new(diff.left_lines(), diff.right_lines())
    }

    fn hits(&self, regex: &Regex) -> Vec<SearchHit> {
        let sides = [(Side::Left, &self.left), (Side::Right, &self.right)];
        let mut hits = Vec::new();
        for (side, lines) in sides {
            for (line, text) in lines.iter().enumerate() {
                for m in regex.find_iter(text) {
                    if m.is_empty() {
                        continue;
                    }
                    hits.push(SearchHit {
                        side,
                        line,
                        column: m.start(),
                        len: m.len(),
                    });
                }
            }
        }
        hits
    }

    /// Advance to the next match of `query`; false when nothing matches
    pub fn search(&mut self, query: &str) -> bool {
        let query = query.trim();
        if query != self.query {
            self.query = query.to_string();
            self.index = None;
        }
        self.hit = None;
        if query.is_empty() {
            return false;
        }
        let Some(regex) = build_regex(query) else {
            return false;
        };

        let hits = self.hits(&regex);
        if hits.is_empty() {
            self.index = None;
            return false;
        }
        let index = self.index.map_or(0, |last| (last + 1) % hits.len());
        self.index = Some(index);
        self.hit = hits.get(index).copied();
        self.hit.is_some()
    }

    pub fn hit(&self) -> Option<SearchHit> {
        self.hit
    }

    /// Side of the current match
    pub fn side(&self) -> Option<Side> {
        self.hit.map(|hit| hit.side)
    }

    /// Row of the current match
    pub fn position(&self) -> Option<usize> {
        self.hit.map(|hit| hit.line)
    }
}
