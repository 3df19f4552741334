//! Object access for the history walk
//!
//! The walk reads objects through [`ObjectReader`]. The production reader
//! keeps one `git cat-file --batch` process alive per repository, so loose
//! and packed objects are both served without one process per object.

use super::object::{Commit, ObjectError, ObjectId, ObjectKind, RawObject, Tree};
use std::io::{BufRead, BufReader, Read, Write};
use std::path::Path;
use std::process::{Child, ChildStdin, ChildStdout, Command, Stdio};
use std::sync::{Mutex, PoisonError};

/// Read-only access to a repository's objects
pub trait ObjectReader: Send + Sync {
    fn read(&self, id: &ObjectId) -> Result<RawObject, ObjectError>;

    /// Raw id width used inside trees
    fn raw_id_len(&self) -> usize;

    fn read_kind(&self, id: &ObjectId, expected: ObjectKind) -> Result<Vec<u8>, ObjectError> {
        let object = self.read(id)?;
        if object.kind != expected {
            return Err(ObjectError::UnexpectedKind {
                id: id.clone(),
                expected,
                found: object.kind,
            });
        }
        Ok(object.data)
    }

    fn read_commit(&self, id: &ObjectId) -> Result<Commit, ObjectError> {
        let data = self.read_kind(id, ObjectKind::Commit)?;
        Commit::parse(id, &data)
    }

    fn read_tree(&self, id: &ObjectId) -> Result<Tree, ObjectError> {
        let data = self.read_kind(id, ObjectKind::Tree)?;
        Tree::parse(id, &data, self.raw_id_len())
    }

    fn read_blob(&self, id: &ObjectId) -> Result<Vec<u8>, ObjectError> {
        self.read_kind(id, ObjectKind::Blob)
    }
}

struct BatchProcess {
    child: Child,
    stdin: Option<ChildStdin>,
    stdout: BufReader<ChildStdout>,
}

impl Drop for BatchProcess {
    fn drop(&mut self) {
        // closing stdin ends cat-file
        self.stdin.take();
        let _ = self.child.wait();
    }
}

/// Objects served by a long-lived `git cat-file --batch`
pub struct BatchStore {
    raw_id_len: usize,
    process: Mutex<BatchProcess>,
}

impl BatchStore {
    pub fn open(repo_root: &Path, raw_id_len: usize) -> Result<Self, ObjectError> {
        let mut child = Command::new("git")
            .arg("-C")
            .arg(repo_root)
            .arg("cat-file")
            .arg("--batch")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .spawn()?;
        let stdin = child.stdin.take();
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| ObjectError::Store("cat-file has no stdout".into()))?;

        Ok(Self {
            raw_id_len,
            process: Mutex::new(BatchProcess {
                child,
                stdin,
                stdout: BufReader::new(stdout),
            }),
        })
    }
}

impl ObjectReader for BatchStore {
    fn read(&self, id: &ObjectId) -> Result<RawObject, ObjectError> {
        let mut process = self.process.lock().unwrap_or_else(PoisonError::into_inner);
        let stdin = process
            .stdin
            .as_mut()
            .ok_or_else(|| ObjectError::Store("cat-file stdin closed".into()))?;
        writeln!(stdin, "{id}")?;
        stdin.flush()?;

        let mut header = String::new();
        if process.stdout.read_line(&mut header)? == 0 {
            return Err(ObjectError::Store("cat-file exited".into()));
        }
        let mut fields = header.split_whitespace();
        let _echo = fields.next();
        let kind = fields.next().unwrap_or_default();
        if kind == "missing" {
            return Err(ObjectError::Missing(id.clone()));
        }
        let kind = ObjectKind::parse(kind)
            .ok_or_else(|| ObjectError::Store(format!("unexpected header: {}", header.trim_end())))?;
        let size = fields
            .next()
            .and_then(|size| size.parse::<usize>().ok())
            .ok_or_else(|| ObjectError::Store(format!("unexpected header: {}", header.trim_end())))?;

        let mut data = vec![0; size];
        process.stdout.read_exact(&mut data)?;
        let mut newline = [0u8; 1];
        process.stdout.read_exact(&mut newline)?;

        Ok(RawObject { kind, data })
    }

    fn raw_id_len(&self) -> usize {
        self.raw_id_len
    }
}

/// Resolve `HEAD` of the repository at `repo_root`
pub fn resolve_head(repo_root: &Path) -> Result<ObjectId, ObjectError> {
    let output = Command::new("git")
        .arg("-C")
        .arg(repo_root)
        .arg("rev-parse")
        .arg("--verify")
        .arg("HEAD^{commit}")
        .output()?;

    if !output.status.success() {
        return Err(ObjectError::Store(
            String::from_utf8_lossy(&output.stderr).trim().to_string(),
        ));
    }

    ObjectId::parse(&String::from_utf8_lossy(&output.stdout))
}

#[cfg(test)]
pub(crate) mod memory {
    use super::*;
    use rustc_hash::FxHashMap;

    /// In-memory object database for walk tests
    #[derive(Default)]
    pub(crate) struct MemoryStore {
        objects: FxHashMap<ObjectId, RawObject>,
        next: u64,
    }

    impl MemoryStore {
        fn allocate(&mut self, kind: ObjectKind, data: Vec<u8>) -> ObjectId {
            self.next += 1;
            let id = ObjectId::parse(&format!("{:040x}", self.next)).unwrap();
            self.objects.insert(id.clone(), RawObject { kind, data });
            id
        }

        pub fn blob(&mut self, text: &str) -> ObjectId {
            // identical content shares an id, as in git
            if let Some((id, _)) = self
                .objects
                .iter()
                .find(|(_, object)| object.kind == ObjectKind::Blob && object.data == text.as_bytes())
            {
                return id.clone();
            }
            self.allocate(ObjectKind::Blob, text.as_bytes().to_vec())
        }

        /// Build nested trees from `(path, blob)` pairs
        pub fn tree(&mut self, files: &[(&str, &ObjectId)]) -> ObjectId {
            use super::super::object::{Tree, TreeEntry};
            let mut direct: Vec<TreeEntry> = Vec::new();
            let mut nested: std::collections::BTreeMap<String, Vec<(String, ObjectId)>> =
                Default::default();
            for (path, id) in files {
                match path.split_once('/') {
                    Some((dir, rest)) => nested
                        .entry(dir.to_string())
                        .or_default()
                        .push((rest.to_string(), (*id).clone())),
                    None => direct.push(TreeEntry {
                        mode: "100644".into(),
                        name: path.to_string(),
                        id: (*id).clone(),
                    }),
                }
            }
            for (dir, children) in nested {
                let refs: Vec<(&str, &ObjectId)> =
                    children.iter().map(|(p, id)| (p.as_str(), id)).collect();
                let id = self.tree(&refs);
                direct.push(TreeEntry {
                    mode: "40000".into(),
                    name: dir,
                    id,
                });
            }
            let tree = Tree { entries: direct };
            self.allocate(ObjectKind::Tree, tree.encode())
        }

        pub fn commit(&mut self, tree: &ObjectId, parents: &[&ObjectId], time: i64, message: &str) -> ObjectId {
            let mut data = format!("tree {tree}\n");
            for parent in parents {
                data.push_str(&format!("parent {parent}\n"));
            }
            data.push_str(&format!("author Ann <ann@example.com> {time} +0000\n"));
            data.push_str(&format!("committer Ann <ann@example.com> {time} +0000\n\n{message}\n"));
            self.allocate(ObjectKind::Commit, data.into_bytes())
        }

        pub fn remove(&mut self, id: &ObjectId) {
            self.objects.remove(id);
        }
    }

    impl ObjectReader for MemoryStore {
        fn read(&self, id: &ObjectId) -> Result<RawObject, ObjectError> {
            self.objects
                .get(id)
                .cloned()
                .ok_or_else(|| ObjectError::Missing(id.clone()))
        }

        fn raw_id_len(&self) -> usize {
            20
        }
    }
}
