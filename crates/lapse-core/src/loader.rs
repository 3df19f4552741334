//! Asynchronous, cancellable revision loading
//!
//! A [`Backend`] knows how to pull the history of one file out of one kind of
//! version-control system. It runs blocking I/O and is driven by a
//! [`RevisionLoader`], which moves each job onto its own thread, exposes
//! polled progress counters, and keeps the last completed revision list
//! readable while a newer job is still running.

use crate::revision::{Revision, RevisionList};
use std::io;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::thread::{self, JoinHandle};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum LoadError {
    #[error("Cannot resolve target: {0}")]
    TargetResolution(String),
    #[error("Cannot time-lapse view a directory: {0}")]
    UnsupportedDirectoryTarget(String),
    #[error("Backend failed: {0}")]
    BackendIo(String),
    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

/// Completion value of one load job
pub type LoadOutcome = Result<Arc<RevisionList>, LoadError>;

/// Username/password pair; both empty means anonymous access
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn is_anonymous(&self) -> bool {
        self.username.is_empty() && self.password.is_empty()
    }
}

/// Parameters of one load job
#[derive(Debug, Clone)]
pub struct LoadRequest {
    /// Working-copy path or backend URL
    pub target: String,
    /// Maximum number of revisions to return
    pub limit: usize,
    pub credentials: Credentials,
}

/// History retrieval for one kind of version-control system
///
/// Implementations block; they run on the job thread and must poll
/// [`JobContext::is_cancelled`] between units of work. A cancelled job
/// returns what it completed so far.
pub trait Backend: Send + Sync + 'static {
    /// Registry key of this backend
    fn key(&self) -> &'static str;

    /// Fetch revisions of `request.target`, oldest first
    fn load(&self, request: &LoadRequest, job: &JobContext) -> Result<Vec<Revision>, LoadError>;
}

/// Best-effort progress counters of one job
#[derive(Debug, Default)]
pub struct Progress {
    loaded: AtomicUsize,
    total: AtomicUsize,
}

impl Progress {
    pub fn loaded(&self) -> usize {
        self.loaded.load(Ordering::Acquire)
    }

    pub fn total(&self) -> usize {
        self.total.load(Ordering::Acquire)
    }
}

/// Cooperative cancellation flag shared between a job and its owner
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn cancel(&self) {
        self.0.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Acquire)
    }
}

/// What a running backend sees of its job
#[derive(Debug, Clone, Default)]
pub struct JobContext {
    progress: Arc<Progress>,
    cancel: CancelToken,
}

impl JobContext {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    pub fn progress(&self) -> &Progress {
        &self.progress
    }

    /// Raise the expected total; totals never go down while a job runs
    pub fn set_total(&self, total: usize) {
        self.progress.total.fetch_max(total, Ordering::AcqRel);
    }

    pub fn record_loaded(&self) {
        self.progress.loaded.fetch_add(1, Ordering::AcqRel);
    }
}

#[derive(Debug)]
struct LoaderShared {
    running: AtomicUsize,
    current: Mutex<JobContext>,
    revisions: RwLock<Arc<RevisionList>>,
}

impl LoaderShared {
    fn finish(&self, outcome: &LoadOutcome) {
        let list = match outcome {
            Ok(list) => Arc::clone(list),
            Err(_) => Arc::new(RevisionList::default()),
        };
        *self
            .revisions
            .write()
            .unwrap_or_else(PoisonError::into_inner) = list;
    }
}

/// Decrements the running count even if the backend panics
struct RunningGuard(Arc<LoaderShared>);

impl Drop for RunningGuard {
    fn drop(&mut self) {
        self.0.running.fetch_sub(1, Ordering::AcqRel);
    }
}

/// Runs a [`Backend`] in the background and tracks its jobs
pub struct RevisionLoader {
    backend: Arc<dyn Backend>,
    credentials: Mutex<Credentials>,
    shared: Arc<LoaderShared>,
}

impl RevisionLoader {
    pub fn new(backend: impl Backend) -> Self {
        Self::from_boxed(Box::new(backend))
    }

    pub fn from_boxed(backend: Box<dyn Backend>) -> Self {
        Self {
            backend: Arc::from(backend),
            credentials: Mutex::new(Credentials::default()),
            shared: Arc::new(LoaderShared {
                running: AtomicUsize::new(0),
                current: Mutex::new(JobContext::new()),
                revisions: RwLock::new(Arc::new(RevisionList::default())),
            }),
        }
    }

    pub fn key(&self) -> &'static str {
        self.backend.key()
    }

    /// Credentials for the next job; empty strings mean anonymous
    pub fn set_credentials(&self, username: impl Into<String>, password: impl Into<String>) {
        *self
            .credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Credentials::new(username, password);
    }

    pub fn credentials(&self) -> Credentials {
        self.credentials
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Start loading the history of `target` on a background thread
    ///
    /// Returns as soon as the job is scheduled. `on_complete` runs exactly
    /// once on the job thread, after the loader's own state is updated. A job
    /// already in flight is not cancelled.
    pub fn load_revisions<F>(
        &self,
        target: impl Into<String>,
        limit: usize,
        on_complete: F,
    ) -> Result<LoadJob, LoadError>
    where
        F: FnOnce(LoadOutcome) + Send + 'static,
    {
        let request = LoadRequest {
            target: target.into(),
            limit,
            credentials: self.credentials(),
        };
        let context = JobContext::new();
        self.shared.running.fetch_add(1, Ordering::AcqRel);
        let guard = RunningGuard(Arc::clone(&self.shared));
        let backend = Arc::clone(&self.backend);
        let shared = Arc::clone(&self.shared);
        let job = context.clone();

        let handle = thread::Builder::new()
            .name(format!("lapse-{}-load", backend.key()))
            .spawn(move || {
                let outcome = run_job(backend.as_ref(), &request, &job);
                shared.finish(&outcome);
                drop(guard);
                on_complete(outcome);
            })?;

        *self
            .shared
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = context.clone();
        Ok(LoadJob { handle, context })
    }

    /// Ask the newest job to stop; safe to call repeatedly
    pub fn cancel(&self) {
        self.current_job().cancel_token().cancel();
    }

    pub fn is_loading(&self) -> bool {
        self.shared.running.load(Ordering::Acquire) > 0
    }

    pub fn loaded_count(&self) -> usize {
        self.current_job().progress().loaded()
    }

    pub fn total_count(&self) -> usize {
        self.current_job().progress().total()
    }

    /// Result of the last completed job
    ///
    /// While a job runs this still returns the previous result.
    pub fn revisions(&self) -> Arc<RevisionList> {
        Arc::clone(
            &self
                .shared
                .revisions
                .read()
                .unwrap_or_else(PoisonError::into_inner),
        )
    }

    fn current_job(&self) -> JobContext {
        self.shared
            .current
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

fn run_job(backend: &dyn Backend, request: &LoadRequest, job: &JobContext) -> LoadOutcome {
    tracing::debug!(backend = backend.key(), target = %request.target, limit = request.limit, "load started");
    match backend.load(request, job) {
        Ok(revisions) => {
            tracing::info!(
                backend = backend.key(),
                count = revisions.len(),
                cancelled = job.is_cancelled(),
                "load finished"
            );
            Ok(Arc::new(RevisionList::new(revisions)))
        }
        Err(err @ LoadError::UnsupportedDirectoryTarget(_)) => {
            tracing::warn!(backend = backend.key(), "{err}");
            Err(err)
        }
        Err(err) => {
            tracing::error!(backend = backend.key(), "{err}");
            Err(err)
        }
    }
}

/// Handle to one scheduled job
#[derive(Debug)]
pub struct LoadJob {
    handle: JoinHandle<()>,
    context: JobContext,
}

impl LoadJob {
    pub fn cancel(&self) {
        self.context.cancel_token().cancel();
    }

    pub fn progress(&self) -> &Progress {
        self.context.progress()
    }

    pub fn is_finished(&self) -> bool {
        self.handle.is_finished()
    }

    /// Block until the job thread (including its completion callback) ends
    pub fn join(self) -> thread::Result<()> {
        self.handle.join()
    }
}
