//! Graph-based backend for git repositories
//!
//! History comes from a path-following walk over the commit graph (see
//! [`history`]). File contents are not read during the walk; each revision
//! remembers its blob id and reads it on first access.

pub mod history;
pub mod object;
pub mod store;

use crate::encoding::decode_text;
use crate::loader::{Backend, JobContext, LoadError, LoadRequest};
use crate::revision::{ContentError, ContentSource, Revision, RevisionId};
use object::{ObjectError, ObjectId};
use std::collections::VecDeque;
use std::path::{Component, Path, PathBuf};
use std::sync::Arc;
use store::{BatchStore, ObjectReader};

impl From<ObjectError> for LoadError {
    fn from(err: ObjectError) -> Self {
        match err {
            ObjectError::Io(err) => LoadError::Io(err),
            other => LoadError::BackendIo(other.to_string()),
        }
    }
}

/// Blob read on demand from a shared object store
struct BlobContent {
    store: Arc<dyn ObjectReader>,
    blob: ObjectId,
}

impl ContentSource for BlobContent {
    fn load(&self) -> Result<String, ContentError> {
        self.store
            .read_blob(&self.blob)
            .map(|bytes| decode_text(&bytes))
            .map_err(|err| ContentError::Unavailable(err.to_string()))
    }
}

/// Working-tree file resolved against its repository
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoPath {
    pub root: PathBuf,
    /// Slash-separated path relative to `root`; empty for the root itself
    pub relative: String,
}

#[derive(Debug, Default, Clone, Copy)]
pub struct GitBackend;

impl GitBackend {
    pub const KEY: &'static str = "git";

    pub fn new() -> Self {
        Self
    }

    /// Find the repository containing `target`
    pub fn resolve(target: &str) -> Result<RepoPath, LoadError> {
        let path = absolute(&expand_home(target))?;
        let root = path
            .ancestors()
            .find(|dir| dir.join(".git").exists())
            .ok_or_else(|| LoadError::TargetResolution(format!("{target} is not inside a git repository")))?;

        let relative = path
            .strip_prefix(root)
            .map_err(|_| LoadError::TargetResolution(target.to_string()))?
            .components()
            .filter_map(|component| match component {
                Component::Normal(name) => Some(name.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect::<Vec<_>>()
            .join("/");

        Ok(RepoPath {
            root: root.to_path_buf(),
            relative,
        })
    }

    /// Build revisions for a walk over `store`, oldest first
    pub fn load_from(
        store: Arc<dyn ObjectReader>,
        head: &ObjectId,
        path: &str,
        limit: usize,
        job: &JobContext,
    ) -> Result<Vec<Revision>, LoadError> {
        if history::is_directory(store.as_ref(), head, path)? {
            return Err(LoadError::UnsupportedDirectoryTarget(path.to_string()));
        }
        job.set_total(1);
        let found = history::file_history(store.as_ref(), head, path, limit, job)?;
        job.set_total(found.len());

        let mut revisions = VecDeque::with_capacity(found.len());
        for entry in found {
            let signature = entry.commit.committer.as_ref().or(entry.commit.author.as_ref());
            let author = signature.map(|s| s.identity()).unwrap_or_default();
            let date = signature.map(|s| s.display_date()).unwrap_or_default();
            revisions.push_front(Revision::lazy(
                RevisionId::Commit(entry.commit_id.as_str().to_string()),
                author,
                date,
                entry.commit.message,
                BlobContent {
                    store: Arc::clone(&store),
                    blob: entry.blob,
                },
            ));
            job.record_loaded();
        }

        Ok(revisions.into())
    }
}

impl Backend for GitBackend {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn load(&self, request: &LoadRequest, job: &JobContext) -> Result<Vec<Revision>, LoadError> {
        let target = Self::resolve(&request.target)?;
        if target.relative.is_empty() {
            return Err(LoadError::UnsupportedDirectoryTarget(
                target.root.display().to_string(),
            ));
        }

        let head = store::resolve_head(&target.root)?;
        let store = BatchStore::open(&target.root, head.raw_len())?;
        tracing::debug!(root = %target.root.display(), path = %target.relative, head = %head, "walking history");

        Self::load_from(Arc::new(store), &head, &target.relative, request.limit, job)
    }
}

fn expand_home(target: &str) -> PathBuf {
    let rest = target
        .strip_prefix("~/")
        .or_else(|| target.strip_prefix("~\\"))
        .or_else(|| (target == "~").then_some(""));
    match rest {
        Some(rest) => std::env::var_os("HOME")
            .or_else(|| std::env::var_os("USERPROFILE"))
            .map(|home| PathBuf::from(home).join(rest))
            .unwrap_or_else(|| PathBuf::from(target)),
        None => PathBuf::from(target),
    }
}

fn absolute(path: &Path) -> Result<PathBuf, LoadError> {
    if path.exists() {
        return Ok(path.canonicalize()?);
    }
    if path.is_absolute() {
        Ok(normalize(path))
    } else {
        Ok(normalize(&std::env::current_dir()?.join(path)))
    }
}

/// Drop `.` and fold `..` without touching the filesystem
fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                out.pop();
            }
            other => out.push(other),
        }
    }
    out
}
