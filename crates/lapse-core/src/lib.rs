//! lapse-core: revision loading, diff caching and change navigation for lapse
//!
//! This crate pulls the history of one file out of a version-control
//! backend, lets callers diff any two of its revisions through a cached
//! [`Session`], and steps between changed regions of a diff.

pub mod diff;
pub mod encoding;
pub mod git;
pub mod loader;
pub mod navigator;
pub mod registry;
pub mod revision;
pub mod search;
pub mod session;
pub mod svn;

#[cfg(test)]
mod testing;

pub use diff::{Diff, DiffEngine, DiffLine, DiffRow, DisplayMode, LineDiffer, RowKind};
pub use encoding::{decode_text, sniff_encoding, TextEncoding};
pub use git::GitBackend;
pub use loader::{
    Backend, CancelToken, Credentials, JobContext, LoadError, LoadJob, LoadOutcome, LoadRequest,
    Progress, RevisionLoader,
};
pub use navigator::{next_change, previous_change, ChangeNavigator};
pub use registry::{LoaderRegistry, RegistryError, DEFAULT_BACKEND};
pub use revision::{ContentError, ContentSource, Revision, RevisionId, RevisionList, RevisionSummary};
pub use search::{SearchHit, Searcher, Side};
pub use session::{DiffKey, LoadReport, Session, SessionError};
pub use svn::SvnBackend;
