//! Scripted backend shared by the loader and session tests

use crate::loader::{Backend, JobContext, LoadError, LoadRequest};
use crate::revision::{Revision, RevisionId};
use std::collections::VecDeque;
use std::sync::mpsc;
use std::sync::Mutex;

/// Behaviour of one scripted load call
#[derive(Default)]
pub(crate) struct Script {
    pub numbers: Vec<u64>,
    pub gate: Option<mpsc::Receiver<()>>,
    pub failure: Option<String>,
}

impl Script {
    pub fn numbers(numbers: impl IntoIterator<Item = u64>) -> Self {
        Self {
            numbers: numbers.into_iter().collect(),
            ..Self::default()
        }
    }

    /// Hold the job until the returned sender fires (or is dropped)
    pub fn gated(mut self) -> (Self, mpsc::Sender<()>) {
        let (tx, rx) = mpsc::channel();
        self.gate = Some(rx);
        (self, tx)
    }

    pub fn failing(message: &str) -> Self {
        Self {
            failure: Some(message.to_string()),
            ..Self::default()
        }
    }
}

pub(crate) struct ScriptedBackend {
    scripts: Mutex<VecDeque<Script>>,
}

impl ScriptedBackend {
    pub fn new(scripts: impl IntoIterator<Item = Script>) -> Self {
        Self {
            scripts: Mutex::new(scripts.into_iter().collect()),
        }
    }
}

pub(crate) fn contents_for(number: u64) -> String {
    format!("line one\nrevision {number}\nline three\n")
}

pub(crate) fn numbered_revision(number: u64) -> Revision {
    Revision::new(
        RevisionId::Number(number),
        "tester",
        "2024-01-01 00:00",
        format!("commit {number}"),
        contents_for(number),
    )
}

impl Backend for ScriptedBackend {
    fn key(&self) -> &'static str {
        "scripted"
    }

    fn load(&self, _request: &LoadRequest, job: &JobContext) -> Result<Vec<Revision>, LoadError> {
        let script = self
            .scripts
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_default();
        if let Some(gate) = script.gate {
            let _ = gate.recv();
        }
        if let Some(message) = script.failure {
            return Err(LoadError::BackendIo(message));
        }
        job.set_total(script.numbers.len());
        let mut revisions = Vec::new();
        for number in script.numbers {
            if job.is_cancelled() {
                break;
            }
            revisions.push(numbered_revision(number));
            job.record_loaded();
        }
        Ok(revisions)
    }
}
