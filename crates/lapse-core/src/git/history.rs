//! Path-following commit graph walk
//!
//! Commits are visited newest first by committer time. A commit is part of a
//! file's history when the blob at the followed path differs from every
//! parent. Merges that kept one parent's version are skipped and only that
//! parent is followed. When the path disappears in a parent the walk looks
//! for the file it was renamed from, by identical blob first and by line
//! similarity second.

use super::object::{Commit, ObjectError, ObjectId, Tree};
use super::store::ObjectReader;
use crate::diff::line_similarity;
use crate::encoding::decode_text;
use crate::loader::JobContext;
use rustc_hash::FxHashSet;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Lowest line similarity that still counts as a rename
pub const RENAME_THRESHOLD: f32 = 0.5;

/// One commit that changed the followed file
#[derive(Debug, Clone)]
pub struct FileHistory {
    pub commit_id: ObjectId,
    pub commit: Commit,
    /// Path of the file as of this commit
    pub path: String,
    pub blob: ObjectId,
}

struct Pending {
    time: i64,
    seq: u64,
    id: ObjectId,
    commit: Commit,
    path: String,
}

impl PartialEq for Pending {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Pending {}

impl PartialOrd for Pending {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Pending {
    // newest first; ties go to whichever was queued earlier
    fn cmp(&self, other: &Self) -> Ordering {
        self.time
            .cmp(&other.time)
            .then_with(|| other.seq.cmp(&self.seq))
    }
}

struct Walk<'a> {
    store: &'a dyn ObjectReader,
    queue: BinaryHeap<Pending>,
    seen: FxHashSet<ObjectId>,
    seq: u64,
}

impl<'a> Walk<'a> {
    fn push(&mut self, id: ObjectId, commit: Commit, path: String) {
        if !self.seen.insert(id.clone()) {
            return;
        }
        self.seq += 1;
        self.queue.push(Pending {
            time: commit.time(),
            seq: self.seq,
            id,
            commit,
            path,
        });
    }

    fn blob_at(&self, tree: &ObjectId, path: &str) -> Result<Option<ObjectId>, ObjectError> {
        let mut tree = self.store.read_tree(tree)?;
        let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
        while let Some(name) = components.next() {
            let Some(entry) = tree.entry(name) else {
                return Ok(None);
            };
            if components.peek().is_none() {
                return Ok(entry.is_file().then(|| entry.id.clone()));
            }
            if !entry.is_tree() {
                return Ok(None);
            }
            tree = self.store.read_tree(&entry.id)?;
        }
        Ok(None)
    }

    fn list_files(&self, tree: &Tree, prefix: &str, out: &mut Vec<(String, ObjectId)>) -> Result<(), ObjectError> {
        for entry in &tree.entries {
            let path = if prefix.is_empty() {
                entry.name.clone()
            } else {
                format!("{prefix}/{}", entry.name)
            };
            if entry.is_tree() {
                let child = self.store.read_tree(&entry.id)?;
                self.list_files(&child, &path, out)?;
            } else if entry.is_file() {
                out.push((path, entry.id.clone()));
            }
        }
        Ok(())
    }

    fn files(&self, tree: &ObjectId) -> Result<Vec<(String, ObjectId)>, ObjectError> {
        let mut files = Vec::new();
        self.list_files(&self.store.read_tree(tree)?, "", &mut files)?;
        Ok(files)
    }

    /// Path in `parent` that became `blob` in `child`, if any
    fn rename_source(&self, child: &Commit, parent: &Commit, blob: &ObjectId) -> Result<Option<String>, ObjectError> {
        let child_paths: FxHashSet<String> = self
            .files(&child.tree)?
            .into_iter()
            .map(|(path, _)| path)
            .collect();
        let candidates: Vec<(String, ObjectId)> = self
            .files(&parent.tree)?
            .into_iter()
            .filter(|(path, _)| !child_paths.contains(path))
            .collect();

        if let Some((path, _)) = candidates.iter().find(|(_, id)| id == blob) {
            return Ok(Some(path.clone()));
        }

        let target = decode_text(&self.store.read_blob(blob)?);
        let mut best: Option<(f32, String)> = None;
        for (path, id) in candidates {
            let text = decode_text(&self.store.read_blob(&id)?);
            let score = line_similarity(&text, &target);
            if score >= RENAME_THRESHOLD && best.as_ref().map_or(true, |(top, _)| score > *top) {
                best = Some((score, path));
            }
        }
        Ok(best.map(|(_, path)| path))
    }
}

/// Whether `path` names a directory in the tree of `head`
pub fn is_directory(store: &dyn ObjectReader, head: &ObjectId, path: &str) -> Result<bool, ObjectError> {
    let mut tree = store.read_tree(&store.read_commit(head)?.tree)?;
    let mut components = path.split('/').filter(|c| !c.is_empty()).peekable();
    while let Some(name) = components.next() {
        let Some(entry) = tree.entry(name) else {
            return Ok(false);
        };
        if !entry.is_tree() {
            return Ok(false);
        }
        if components.peek().is_none() {
            return Ok(true);
        }
        tree = store.read_tree(&entry.id)?;
    }
    Ok(false)
}

/// Commits that changed `path`, newest first, starting from `head`
///
/// Stops after `limit` entries or when `job` is cancelled; a cancelled walk
/// returns what it found so far.
pub fn file_history(
    store: &dyn ObjectReader,
    head: &ObjectId,
    path: &str,
    limit: usize,
    job: &JobContext,
) -> Result<Vec<FileHistory>, ObjectError> {
    let mut walk = Walk {
        store,
        queue: BinaryHeap::new(),
        seen: FxHashSet::default(),
        seq: 0,
    };
    let mut found = Vec::new();
    if limit == 0 {
        return Ok(found);
    }

    let head_commit = store.read_commit(head)?;
    walk.push(head.clone(), head_commit, path.to_string());

    while let Some(Pending { id, commit, path, .. }) = walk.queue.pop() {
        if job.is_cancelled() {
            tracing::debug!(found = found.len(), "history walk cancelled");
            break;
        }

        let mut parents = Vec::with_capacity(commit.parents.len());
        for parent_id in &commit.parents {
            let parent = store.read_commit(parent_id)?;
            let blob = walk.blob_at(&parent.tree, &path)?;
            parents.push((parent_id.clone(), parent, blob));
        }

        let Some(blob) = walk.blob_at(&commit.tree, &path)? else {
            for (parent_id, parent, _) in parents {
                walk.push(parent_id, parent, path.clone());
            }
            continue;
        };

        if let Some(index) = parents
            .iter()
            .position(|(_, _, parent_blob)| parent_blob.as_ref() == Some(&blob))
        {
            let (parent_id, parent, _) = parents.swap_remove(index);
            walk.push(parent_id, parent, path);
            continue;
        }

        for (parent_id, parent, parent_blob) in parents {
            if parent_blob.is_some() {
                walk.push(parent_id, parent, path.clone());
            } else if let Some(source) = walk.rename_source(&commit, &parent, &blob)? {
                tracing::debug!(from = %source, to = %path, commit = %id, "followed rename");
                walk.push(parent_id, parent, source);
            }
        }

        found.push(FileHistory {
            commit_id: id,
            commit,
            path,
            blob,
        });
        if found.len() >= limit {
            break;
        }
    }

    Ok(found)
}
