//! Git object parsing
//!
//! Only what the history walk needs: commit headers and tree entries.
//!
//! ## Formats
//!
//! Commit:
//! ```text
//! tree <tree-id>
//! parent <parent-id>
//! author <name> <email> <timestamp> <timezone>
//! committer <name> <email> <timestamp> <timezone>
//!
//! <commit message>
//! ```
//!
//! Tree entry: `<mode> <name>\0<raw-id>`, where the raw id is 20 bytes for
//! SHA-1 repositories and 32 bytes for SHA-256 ones.

use std::fmt;
use thiserror::Error;
use time::format_description::{parse_owned, OwnedFormatItem};
use time::{OffsetDateTime, UtcOffset};

const DATE_FORMAT: &str = "[year]-[month]-[day] [hour]:[minute]";
const TREE_MODE: &str = "40000";

#[derive(Error, Debug)]
pub enum ObjectError {
    #[error("Object not found: {0}")]
    Missing(ObjectId),
    #[error("Expected {expected} object {id}, found {found}")]
    UnexpectedKind {
        id: ObjectId,
        expected: ObjectKind,
        found: ObjectKind,
    },
    #[error("Malformed object {0}: {1}")]
    Malformed(ObjectId, String),
    #[error("Invalid object id: {0}")]
    InvalidId(String),
    #[error("Object store failed: {0}")]
    Store(String),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

/// Hex object id (SHA-1 or SHA-256)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(String);

impl ObjectId {
    pub fn parse(id: &str) -> Result<Self, ObjectError> {
        let id = id.trim();
        let valid_len = id.len() == 40 || id.len() == 64;
        if !valid_len || !id.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(ObjectError::InvalidId(id.to_string()));
        }
        Ok(Self(id.to_ascii_lowercase()))
    }

    /// Hex-encode a raw id taken from a tree entry
    pub fn from_raw(raw: &[u8]) -> Self {
        let mut hex = String::with_capacity(raw.len() * 2);
        for byte in raw {
            hex.push_str(&format!("{byte:02x}"));
        }
        Self(hex)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Width of the raw form, as stored in trees
    pub fn raw_len(&self) -> usize {
        self.0.len() / 2
    }
}

impl AsRef<str> for ObjectId {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObjectKind {
    Blob,
    Tree,
    Commit,
    Tag,
}

impl ObjectKind {
    pub fn parse(kind: &str) -> Option<Self> {
        match kind {
            "blob" => Some(ObjectKind::Blob),
            "tree" => Some(ObjectKind::Tree),
            "commit" => Some(ObjectKind::Commit),
            "tag" => Some(ObjectKind::Tag),
            _ => None,
        }
    }
}

impl fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ObjectKind::Blob => "blob",
            ObjectKind::Tree => "tree",
            ObjectKind::Commit => "commit",
            ObjectKind::Tag => "tag",
        })
    }
}

/// Object bytes as returned by the store, header stripped
#[derive(Debug, Clone)]
pub struct RawObject {
    pub kind: ObjectKind,
    pub data: Vec<u8>,
}

/// Author or committer line
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signature {
    pub name: String,
    pub email: String,
    /// Seconds since the epoch
    pub time: i64,
    /// Offset from UTC in minutes
    pub offset_minutes: i32,
}

impl Signature {
    /// Parse `Name <email> 1700000000 +0200`
    pub fn parse(line: &str) -> Option<Self> {
        let open = line.find('<')?;
        let close = open + line[open..].find('>')?;
        let name = line[..open].trim().to_string();
        let email = line[open + 1..close].to_string();
        let mut rest = line[close + 1..].split_whitespace();
        let time = rest.next()?.parse::<i64>().ok()?;
        let offset_minutes = rest.next().and_then(parse_offset).unwrap_or(0);
        Some(Self {
            name,
            email,
            time,
            offset_minutes,
        })
    }

    /// `Name <email>`
    pub fn identity(&self) -> String {
        format!("{} <{}>", self.name, self.email)
    }

    /// Commit time in the signer's own offset, `YYYY-MM-DD HH:MM`
    pub fn display_date(&self) -> String {
        let format: OwnedFormatItem = match parse_owned::<2>(DATE_FORMAT) {
            Ok(format) => format,
            Err(_) => return self.time.to_string(),
        };
        let offset = UtcOffset::from_whole_seconds(self.offset_minutes * 60).unwrap_or(UtcOffset::UTC);
        OffsetDateTime::from_unix_timestamp(self.time)
            .ok()
            .and_then(|date_time| date_time.to_offset(offset).format(&format).ok())
            .unwrap_or_else(|| self.time.to_string())
    }
}

fn parse_offset(offset: &str) -> Option<i32> {
    let (sign, digits) = match offset.as_bytes().first()? {
        b'+' => (1, &offset[1..]),
        b'-' => (-1, &offset[1..]),
        _ => (1, offset),
    };
    if digits.len() != 4 || !digits.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    let hours = digits[..2].parse::<i32>().ok()?;
    let minutes = digits[2..].parse::<i32>().ok()?;
    Some(sign * (hours * 60 + minutes))
}

#[derive(Debug, Clone)]
pub struct Commit {
    pub tree: ObjectId,
    pub parents: Vec<ObjectId>,
    pub author: Option<Signature>,
    pub committer: Option<Signature>,
    pub message: String,
}

impl Commit {
    pub fn parse(id: &ObjectId, data: &[u8]) -> Result<Self, ObjectError> {
        let text = String::from_utf8_lossy(data);
        let (headers, message) = match text.find("\n\n") {
            Some(split) => (&text[..split], &text[split + 2..]),
            None => (text.as_ref(), ""),
        };

        let mut tree = None;
        let mut parents = Vec::new();
        let mut author = None;
        let mut committer = None;

        for line in headers.lines() {
            // continuation lines of multi-line headers (gpgsig, mergetag)
            if line.starts_with(' ') {
                continue;
            }
            let Some((key, value)) = line.split_once(' ') else {
                continue;
            };
            match key {
                "tree" => tree = Some(ObjectId::parse(value)?),
                "parent" => parents.push(ObjectId::parse(value)?),
                "author" => author = Signature::parse(value),
                "committer" => committer = Signature::parse(value),
                _ => {}
            }
        }

        let tree = tree.ok_or_else(|| ObjectError::Malformed(id.clone(), "missing tree header".into()))?;
        Ok(Self {
            tree,
            parents,
            author,
            committer,
            message: message.to_string(),
        })
    }

    /// Committer time, used to order the walk
    pub fn time(&self) -> i64 {
        self.committer
            .as_ref()
            .or(self.author.as_ref())
            .map(|signature| signature.time)
            .unwrap_or(0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TreeEntry {
    pub mode: String,
    pub name: String,
    pub id: ObjectId,
}

impl TreeEntry {
    pub fn is_tree(&self) -> bool {
        self.mode == TREE_MODE
    }

    /// Regular or executable file; symlinks and submodules excluded
    pub fn is_file(&self) -> bool {
        self.mode.starts_with("100")
    }
}

#[derive(Debug, Clone, Default)]
pub struct Tree {
    pub entries: Vec<TreeEntry>,
}

impl Tree {
    pub fn parse(id: &ObjectId, data: &[u8], raw_len: usize) -> Result<Self, ObjectError> {
        let malformed = |reason: &str| ObjectError::Malformed(id.clone(), reason.to_string());
        let mut entries = Vec::new();
        let mut rest = data;

        while !rest.is_empty() {
            let space = rest
                .iter()
                .position(|&b| b == b' ')
                .ok_or_else(|| malformed("entry without mode"))?;
            let nul = rest
                .iter()
                .position(|&b| b == 0)
                .ok_or_else(|| malformed("entry without name terminator"))?;
            if nul < space || rest.len() < nul + 1 + raw_len {
                return Err(malformed("truncated entry"));
            }
            let mode = String::from_utf8_lossy(&rest[..space]).into_owned();
            let name = String::from_utf8_lossy(&rest[space + 1..nul]).into_owned();
            let raw = &rest[nul + 1..nul + 1 + raw_len];
            entries.push(TreeEntry {
                mode,
                name,
                id: ObjectId::from_raw(raw),
            });
            rest = &rest[nul + 1 + raw_len..];
        }

        Ok(Self { entries })
    }

    pub fn entry(&self, name: &str) -> Option<&TreeEntry> {
        self.entries.iter().find(|entry| entry.name == name)
    }

    /// Serialize back to the on-disk entry format
    #[cfg(test)]
    pub(crate) fn encode(&self) -> Vec<u8> {
        let mut data = Vec::new();
        for entry in &self.entries {
            data.extend_from_slice(entry.mode.as_bytes());
            data.push(b' ');
            data.extend_from_slice(entry.name.as_bytes());
            data.push(0);
            let hex = entry.id.as_str();
            for i in (0..hex.len()).step_by(2) {
                data.push(u8::from_str_radix(&hex[i..i + 2], 16).unwrap_or(0));
            }
        }
        data
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oid(fill: char) -> ObjectId {
        ObjectId::parse(&fill.to_string().repeat(40)).unwrap()
    }

    fn tree_bytes(entries: &[(&str, &str, &ObjectId)]) -> Vec<u8> {
        let tree = Tree {
            entries: entries
                .iter()
                .map(|(mode, name, id)| TreeEntry {
                    mode: mode.to_string(),
                    name: name.to_string(),
                    id: (*id).clone(),
                })
                .collect(),
        };
        tree.encode()
    }

    #[test]
    fn test_parse_object_id() {
        assert!(ObjectId::parse(&"a".repeat(40)).is_ok());
        assert!(ObjectId::parse(&"b".repeat(64)).is_ok());
        assert!(ObjectId::parse("abc").is_err());
        assert!(ObjectId::parse(&"g".repeat(40)).is_err());
        assert_eq!(
            ObjectId::parse(&"AB".repeat(20)).unwrap().as_str(),
            "ab".repeat(20)
        );
    }

    #[test]
    fn test_parse_commit() {
        let id = oid('c');
        let data = format!(
            "tree {}\nparent {}\nparent {}\nauthor Ann <ann@example.com> 1700000000 +0100\n\
             committer Bob <bob@example.com> 1700000600 -0230\ngpgsig -----BEGIN-----\n sig\n -----END-----\n\n\
             Subject line\n\nBody\n",
            oid('a'),
            oid('b'),
            oid('d')
        );
        let commit = Commit::parse(&id, data.as_bytes()).unwrap();

        assert_eq!(commit.tree, oid('a'));
        assert_eq!(commit.parents, vec![oid('b'), oid('d')]);
        assert_eq!(commit.time(), 1_700_000_600);
        assert_eq!(commit.message, "Subject line\n\nBody\n");

        let committer = commit.committer.unwrap();
        assert_eq!(committer.identity(), "Bob <bob@example.com>");
        assert_eq!(committer.offset_minutes, -150);
    }

    #[test]
    fn test_commit_without_tree_is_malformed() {
        let err = Commit::parse(&oid('c'), b"author A <a@b> 1 +0000\n\nmsg").unwrap_err();
        assert!(matches!(err, ObjectError::Malformed(..)));
    }

    #[test]
    fn test_display_date_uses_own_offset() {
        let signature = Signature::parse("Ann <ann@example.com> 0 +0130").unwrap();
        assert_eq!(signature.display_date(), "1970-01-01 01:30");

        let signature = Signature::parse("Ann <ann@example.com> 3600 -0100").unwrap();
        assert_eq!(signature.display_date(), "1970-01-01 00:00");
    }

    #[test]
    fn test_parse_tree_entries() {
        let file = oid('1');
        let dir = oid('2');
        let data = tree_bytes(&[("100644", "README.md", &file), ("40000", "src", &dir)]);
        let tree = Tree::parse(&oid('e'), &data, 20).unwrap();

        assert_eq!(tree.entries.len(), 2);
        let readme = tree.entry("README.md").unwrap();
        assert!(readme.is_file());
        assert_eq!(readme.id, file);
        let src = tree.entry("src").unwrap();
        assert!(src.is_tree());
        assert_eq!(src.id, dir);
    }

    #[test]
    fn test_truncated_tree_is_malformed() {
        let data = tree_bytes(&[("100644", "a", &oid('1'))]);
        let err = Tree::parse(&oid('e'), &data[..data.len() - 3], 20).unwrap_err();
        assert!(matches!(err, ObjectError::Malformed(..)));
    }
}
