//! Backend lookup by key

use crate::git::GitBackend;
use crate::loader::{Backend, RevisionLoader};
use crate::svn::SvnBackend;
use rustc_hash::FxHashMap;
use std::sync::Arc;
use thiserror::Error;

/// Backend used when the caller names none
pub const DEFAULT_BACKEND: &str = GitBackend::KEY;

#[derive(Error, Debug, PartialEq, Eq)]
pub enum RegistryError {
    #[error("Unknown backend: {0}")]
    UnknownBackend(String),
}

type Factory = Arc<dyn Fn() -> Box<dyn Backend> + Send + Sync>;

/// Maps backend keys to constructors
#[derive(Default, Clone)]
pub struct LoaderRegistry {
    factories: FxHashMap<String, Factory>,
}

impl LoaderRegistry {
    /// Empty registry
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry holding the git and svn backends
    pub fn with_defaults() -> Self {
        let mut registry = Self::new();
        registry.register(GitBackend::KEY, || Box::new(GitBackend::new()));
        registry.register(SvnBackend::KEY, || Box::new(SvnBackend::new()));
        registry
    }

    /// Add a backend; an existing key is replaced
    pub fn register<F>(&mut self, key: impl Into<String>, factory: F)
    where
        F: Fn() -> Box<dyn Backend> + Send + Sync + 'static,
    {
        self.factories.insert(key.into(), Arc::new(factory));
    }

    /// Build a fresh loader for `key`
    pub fn create(&self, key: &str) -> Result<RevisionLoader, RegistryError> {
        let factory = self
            .factories
            .get(key)
            .ok_or_else(|| RegistryError::UnknownBackend(key.to_string()))?;
        Ok(RevisionLoader::from_boxed(factory()))
    }

    pub fn contains(&self, key: &str) -> bool {
        self.factories.contains_key(key)
    }

    /// Registered keys, sorted
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = self.factories.keys().map(String::as_str).collect();
        keys.sort_unstable();
        keys
    }
}
