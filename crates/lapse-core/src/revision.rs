//! Revisions of a single tracked file

use serde::Serialize;
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ContentError {
    #[error("Content unavailable: {0}")]
    Unavailable(String),
}

/// Backend-defined revision identifier
///
/// Graph identifiers carry no ordering; only the position in a
/// [`RevisionList`] says which revision is older.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(untagged)]
pub enum RevisionId {
    /// Increasing revision counter of a linear history
    Number(u64),
    /// Content-addressed commit id
    Commit(String),
}

impl RevisionId {
    /// Abbreviated form for status lines
    pub fn short(&self) -> String {
        match self {
            RevisionId::Number(number) => format!("r{number}"),
            RevisionId::Commit(id) if id.len() > 8 => id[..8].to_string(),
            RevisionId::Commit(id) => id.clone(),
        }
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RevisionId::Number(number) => write!(f, "{number}"),
            RevisionId::Commit(id) => f.write_str(id),
        }
    }
}

/// Fetches the contents of a revision on first access
pub trait ContentSource: Send + Sync {
    fn load(&self) -> Result<String, ContentError>;
}

/// One immutable snapshot of the tracked file
pub struct Revision {
    id: RevisionId,
    author: String,
    date: String,
    message: String,
    contents: OnceLock<Option<String>>,
    source: Option<Box<dyn ContentSource>>,
}

impl Revision {
    /// Revision whose contents were materialized at load time
    pub fn new(
        id: RevisionId,
        author: impl Into<String>,
        date: impl Into<String>,
        message: impl Into<String>,
        contents: impl Into<String>,
    ) -> Self {
        Self {
            id,
            author: author.into(),
            date: date.into(),
            message: message.into(),
            contents: OnceLock::from(Some(contents.into())),
            source: None,
        }
    }

    /// Revision whose contents are fetched from `source` on first access
    pub fn lazy(
        id: RevisionId,
        author: impl Into<String>,
        date: impl Into<String>,
        message: impl Into<String>,
        source: impl ContentSource + 'static,
    ) -> Self {
        Self {
            id,
            author: author.into(),
            date: date.into(),
            message: message.into(),
            contents: OnceLock::new(),
            source: Some(Box::new(source)),
        }
    }

    pub fn id(&self) -> &RevisionId {
        &self.id
    }

    pub fn author(&self) -> &str {
        &self.author
    }

    pub fn date(&self) -> &str {
        &self.date
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// File contents at this revision
    ///
    /// `None` when the content could not be fetched. The fetch happens at
    /// most once; later calls return the same answer.
    pub fn contents(&self) -> Option<&str> {
        self.contents
            .get_or_init(|| {
                let source = self.source.as_ref()?;
                match source.load() {
                    Ok(text) => Some(text),
                    Err(err) => {
                        tracing::warn!(revision = %self.id, "{err}");
                        None
                    }
                }
            })
            .as_deref()
    }

    pub fn summary(&self) -> RevisionSummary {
        RevisionSummary {
            id: self.id.clone(),
            author: self.author.clone(),
            date: self.date.clone(),
            message: self.message.clone(),
        }
    }
}

impl fmt::Debug for Revision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Revision")
            .field("id", &self.id)
            .field("author", &self.author)
            .field("date", &self.date)
            .field("loaded", &self.contents.get().is_some())
            .finish()
    }
}

/// Metadata of a revision, without its contents
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RevisionSummary {
    pub id: RevisionId,
    pub author: String,
    pub date: String,
    pub message: String,
}

/// Revisions of one file, oldest first
#[derive(Debug, Default)]
pub struct RevisionList {
    revisions: Vec<Revision>,
}

impl RevisionList {
    pub fn new(revisions: Vec<Revision>) -> Self {
        Self { revisions }
    }

    pub fn len(&self) -> usize {
        self.revisions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.revisions.is_empty()
    }

    pub fn get(&self, index: usize) -> Option<&Revision> {
        self.revisions.get(index)
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Revision> {
        self.revisions.iter()
    }

    /// Whether `revision` is one of this list's own entries (not merely an
    /// equal id from another list)
    pub fn contains(&self, revision: &Revision) -> bool {
        self.revisions.iter().any(|own| std::ptr::eq(own, revision))
    }

    /// Map a possibly negative index to a position; `-1` is the newest
    pub fn resolve_index(&self, index: i64) -> Option<usize> {
        let len = self.revisions.len() as i64;
        let resolved = if index < 0 { len + index } else { index };
        (0..len).contains(&resolved).then_some(resolved as usize)
    }

    /// Positions of the pair shown when nothing else was chosen: the two
    /// newest revisions
    pub fn default_pair(&self) -> Option<(usize, usize)> {
        let len = self.revisions.len();
        (len >= 2).then(|| (len - 2, len - 1))
    }

    pub fn summaries(&self) -> Vec<RevisionSummary> {
        self.revisions.iter().map(Revision::summary).collect()
    }
}

impl FromIterator<Revision> for RevisionList {
    fn from_iter<I: IntoIterator<Item = Revision>>(iter: I) -> Self {
        Self::new(iter.into_iter().collect())
    }
}

impl<'a> IntoIterator for &'a RevisionList {
    type Item = &'a Revision;
    type IntoIter = std::slice::Iter<'a, Revision>;

    fn into_iter(self) -> Self::IntoIter {
        self.revisions.iter()
    }
}
