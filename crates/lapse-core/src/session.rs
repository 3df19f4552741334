//! Revision list ownership, reloads and the diff cache
//!
//! A [`Session`] holds the installed revision list and every diff computed
//! against it. Loads run on the loader's thread; their completion installs a
//! new list and empties the cache in one step under the state lock, so a
//! reader sees either the old list with its diffs or the new list with none.
//!
//! Diffs are computed outside the lock. The lock only hands out a per-key
//! slot, and the first caller to reach a slot fills it.
//!
//! Each `load` is numbered. Only the most recently started load may install
//! its result; an older one that finishes late is reported as
//! [`SessionError::Superseded`] and changes nothing.

use crate::diff::{Diff, DisplayMode, LineDiffer};
use crate::loader::{LoadError, LoadJob, LoadOutcome, RevisionLoader};
use crate::revision::{Revision, RevisionId, RevisionList};
use rustc_hash::FxHashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum SessionError {
    #[error("No revisions found")]
    EmptyHistory,
    #[error("Only one revision found, nothing to compare")]
    SingleRevision,
    #[error(transparent)]
    Load(#[from] LoadError),
    #[error("Load was superseded by a newer one")]
    Superseded,
}

/// Cache key: the two revisions compared and how the result is shown
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DiffKey {
    pub left: RevisionId,
    pub right: RevisionId,
    pub mode: DisplayMode,
}

impl DiffKey {
    pub fn new(left: &Revision, right: &Revision, mode: DisplayMode) -> Self {
        Self {
            left: left.id().clone(),
            right: right.id().clone(),
            mode,
        }
    }
}

/// Delivered once per `load`, after the session has applied the result
#[derive(Debug)]
pub struct LoadReport {
    pub generation: u64,
    pub result: Result<Arc<RevisionList>, SessionError>,
}

type DiffSlot = Arc<OnceLock<Arc<Diff>>>;

#[derive(Default)]
struct SessionState {
    revisions: Arc<RevisionList>,
    cache: FxHashMap<DiffKey, DiffSlot>,
}

impl SessionState {
    fn owns(&self, left: &Revision, right: &Revision) -> bool {
        self.revisions.contains(left) && self.revisions.contains(right)
    }
}

struct SessionInner {
    differ: Box<dyn LineDiffer>,
    state: RwLock<SessionState>,
    generation: AtomicU64,
    loader: Mutex<Option<Arc<RevisionLoader>>>,
}

impl SessionInner {
    fn complete(&self, generation: u64, outcome: LoadOutcome) -> Result<Arc<RevisionList>, SessionError> {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        if self.generation.load(Ordering::Acquire) != generation {
            tracing::debug!(generation, "stale load ignored");
            return Err(SessionError::Superseded);
        }

        let list = outcome?;
        match list.len() {
            0 => return Err(SessionError::EmptyHistory),
            1 => return Err(SessionError::SingleRevision),
            _ => {}
        }

        state.revisions = Arc::clone(&list);
        state.cache.clear();
        tracing::info!(generation, count = list.len(), "revision list installed");
        Ok(list)
    }
}

/// Installed revisions plus cached diffs; cheap to clone and share
#[derive(Clone)]
pub struct Session {
    inner: Arc<SessionInner>,
}

impl Session {
    pub fn new(differ: impl LineDiffer + 'static) -> Self {
        Self {
            inner: Arc::new(SessionInner {
                differ: Box::new(differ),
                state: RwLock::new(SessionState::default()),
                generation: AtomicU64::new(0),
                loader: Mutex::new(None),
            }),
        }
    }

    /// Diff two revisions, computing it at most once per installed list
    ///
    /// Revisions that are not part of the installed list are diffed but not
    /// cached.
    pub fn diff(&self, left: &Revision, right: &Revision, mode: DisplayMode) -> Arc<Diff> {
        let compute = || {
            Arc::new(self.inner.differ.diff(
                left.contents().unwrap_or_default(),
                right.contents().unwrap_or_default(),
                mode,
            ))
        };
        match self.slot(DiffKey::new(left, right, mode), left, right) {
            Some(slot) => Arc::clone(slot.get_or_init(compute)),
            None => compute(),
        }
    }

    /// Cache slot for `key`, or `None` when the revisions are not installed
    fn slot(&self, key: DiffKey, left: &Revision, right: &Revision) -> Option<DiffSlot> {
        {
            let state = self.inner.state.read().unwrap_or_else(PoisonError::into_inner);
            if !state.owns(left, right) {
                return None;
            }
            if let Some(slot) = state.cache.get(&key) {
                return Some(Arc::clone(slot));
            }
        }

        let mut state = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
        // a new list may have been installed in between
        if !state.owns(left, right) {
            return None;
        }
        Some(Arc::clone(state.cache.entry(key).or_default()))
    }

    /// Diff the installed revisions at `left` and `right`
    pub fn diff_at(&self, left: usize, right: usize, mode: DisplayMode) -> Option<Arc<Diff>> {
        let revisions = self.revisions();
        let (left, right) = (revisions.get(left)?, revisions.get(right)?);
        Some(self.diff(left, right, mode))
    }

    /// Start loading with `loader`; returns once the job is scheduled
    ///
    /// `on_done` runs on the job thread after the result has been installed
    /// or rejected. The installed list and cache are untouched unless the
    /// load succeeds with at least two revisions and no newer load was
    /// started meanwhile.
    pub fn load<F>(
        &self,
        loader: Arc<RevisionLoader>,
        target: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
        limit: usize,
        on_done: F,
    ) -> Result<LoadJob, LoadError>
    where
        F: FnOnce(LoadReport) + Send + 'static,
    {
        loader.set_credentials(username, password);
        let target = target.into();
        let inner = Arc::clone(&self.inner);
        self.begin(loader, move |generation, loader| {
            loader.load_revisions(target, limit, move |outcome| {
                let result = inner.complete(generation, outcome);
                if let Err(err) = &result {
                    tracing::warn!(generation, "{err}");
                }
                on_done(LoadReport { generation, result });
            })
        })
    }

    /// Number and track a load, but only once `start` has scheduled it
    ///
    /// The state lock is held throughout, so no completion can compare
    /// against a generation whose job failed to start.
    fn begin<S>(&self, loader: Arc<RevisionLoader>, start: S) -> Result<LoadJob, LoadError>
    where
        S: FnOnce(u64, &RevisionLoader) -> Result<LoadJob, LoadError>,
    {
        let _state = self.inner.state.write().unwrap_or_else(PoisonError::into_inner);
        let generation = self.inner.generation.load(Ordering::Acquire) + 1;
        let job = start(generation, &loader)?;

        self.inner.generation.store(generation, Ordering::Release);
        *self
            .inner
            .loader
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(loader);
        Ok(job)
    }

    /// Ask the current load to stop
    pub fn cancel(&self) {
        if let Some(loader) = self.loader() {
            loader.cancel();
        }
    }

    pub fn is_loading(&self) -> bool {
        self.loader().is_some_and(|loader| loader.is_loading())
    }

    pub fn loaded_count(&self) -> usize {
        self.loader().map_or(0, |loader| loader.loaded_count())
    }

    pub fn total_count(&self) -> usize {
        self.loader().map_or(0, |loader| loader.total_count())
    }

    /// Number of the most recently started load
    pub fn generation(&self) -> u64 {
        self.inner.generation.load(Ordering::Acquire)
    }

    pub fn revisions(&self) -> Arc<RevisionList> {
        Arc::clone(
            &self
                .inner
                .state
                .read()
                .unwrap_or_else(PoisonError::into_inner)
                .revisions,
        )
    }

    pub fn cache_len(&self) -> usize {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cache
            .values()
            .filter(|slot| slot.get().is_some())
            .count()
    }

    pub fn is_cached(&self, key: &DiffKey) -> bool {
        self.inner
            .state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .cache
            .get(key)
            .is_some_and(|slot| slot.get().is_some())
    }

    fn loader(&self) -> Option<Arc<RevisionLoader>> {
        self.inner
            .loader
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
