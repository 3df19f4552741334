//! Linear-revision backend for Subversion
//!
//! The repository is reached through [`LinearRepository`]; the production
//! implementation drives the `svn` command line client. History is listed
//! oldest first, trimmed to the most recent `limit` entries and then fetched
//! newest first so a cancelled job keeps the revisions nearest `HEAD`.

use crate::encoding::decode_text;
use crate::loader::{Backend, Credentials, JobContext, LoadError, LoadRequest};
use crate::revision::{Revision, RevisionId};
use std::io::Write;
use std::path::Path;
use std::process::{Command, Stdio};

const NO_AUTHOR: &str = "(no author)";
const LOG_SEPARATOR: &str =
    "------------------------------------------------------------------------";

/// One entry of a file's log
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogEntry {
    pub revision: u64,
    pub author: String,
    /// Raw date as reported by the server
    pub date: String,
    pub message: String,
}

/// Access to one file in a centralized repository
pub trait LinearRepository {
    /// Revisions that touched the file, oldest first
    fn file_revisions(&self) -> Result<Vec<LogEntry>, LoadError>;

    /// File bytes as of `revision`
    fn fetch(&self, revision: u64) -> Result<Vec<u8>, LoadError>;
}

type Connector =
    Box<dyn Fn(&str, &Credentials) -> Result<Box<dyn LinearRepository>, LoadError> + Send + Sync>;

pub struct SvnBackend {
    connect: Connector,
}

impl SvnBackend {
    pub const KEY: &'static str = "svn";

    pub fn new() -> Self {
        Self::with_connector(|target, credentials| {
            let repository = SvnCli::connect(target, credentials)?;
            Ok(Box::new(repository) as Box<dyn LinearRepository>)
        })
    }

    /// Backend that reaches repositories through `connect`
    pub fn with_connector<F>(connect: F) -> Self
    where
        F: Fn(&str, &Credentials) -> Result<Box<dyn LinearRepository>, LoadError> + Send + Sync + 'static,
    {
        Self {
            connect: Box::new(connect),
        }
    }
}

impl Default for SvnBackend {
    fn default() -> Self {
        Self::new()
    }
}

impl Backend for SvnBackend {
    fn key(&self) -> &'static str {
        Self::KEY
    }

    fn load(&self, request: &LoadRequest, job: &JobContext) -> Result<Vec<Revision>, LoadError> {
        let repository = (self.connect)(&request.target, &request.credentials)?;
        load_linear(repository.as_ref(), request.limit, job)
    }
}

/// The `limit` most recent entries, newest first
pub fn select_most_recent(mut entries: Vec<LogEntry>, limit: usize) -> Vec<LogEntry> {
    entries.reverse();
    entries.truncate(limit);
    entries
}

/// Fetch the selected history of `repository`, oldest first
pub fn load_linear(
    repository: &dyn LinearRepository,
    limit: usize,
    job: &JobContext,
) -> Result<Vec<Revision>, LoadError> {
    let selected = select_most_recent(repository.file_revisions()?, limit);
    job.set_total(selected.len());

    let mut revisions = Vec::with_capacity(selected.len());
    for entry in selected {
        if job.is_cancelled() {
            tracing::debug!(fetched = revisions.len(), "svn fetch cancelled");
            break;
        }
        let bytes = repository.fetch(entry.revision)?;
        let author = if entry.author.is_empty() {
            NO_AUTHOR.to_string()
        } else {
            entry.author
        };
        revisions.push(Revision::new(
            RevisionId::Number(entry.revision),
            author,
            format_date(&entry.date),
            entry.message,
            decode_text(&bytes),
        ));
        job.record_loaded();
    }

    revisions.reverse();
    Ok(revisions)
}

/// Collapse a server date to `date HH:MM`
///
/// Accepts both `2024-03-05T14:07:09.123456Z` and
/// `2024-03-05 14:07:09 +0200 (Tue, 05 Mar 2024)`. Anything else is returned
/// unchanged.
pub fn format_date(date: &str) -> String {
    let Some((day, time)) = date.split_once(['T', ' ']) else {
        return date.to_string();
    };
    let mut parts = time.splitn(3, ':');
    match (parts.next(), parts.next(), parts.next()) {
        (Some(hour), Some(minute), Some(_)) => format!("{day} {hour}:{minute}"),
        _ => date.to_string(),
    }
}

/// Parse the plain-text output of `svn log`
pub fn parse_log(output: &str) -> Vec<LogEntry> {
    let mut entries = Vec::new();
    let mut lines = output.lines().peekable();

    while let Some(line) = lines.next() {
        if line != LOG_SEPARATOR {
            continue;
        }
        let Some(header) = lines.peek().copied().and_then(parse_header) else {
            continue;
        };
        lines.next();
        let (revision, author, date, count) = header;

        // blank line between header and message
        if lines.peek().is_some_and(|line| line.is_empty()) {
            lines.next();
        }
        let message: Vec<&str> = (0..count).map_while(|_| lines.next()).collect();

        entries.push(LogEntry {
            revision,
            author,
            date,
            message: message.join("\n"),
        });
    }

    entries
}

fn parse_header(line: &str) -> Option<(u64, String, String, usize)> {
    let fields: Vec<&str> = line.split(" | ").collect();
    if fields.len() < 4 {
        return None;
    }
    let revision = fields[0].strip_prefix('r')?.parse().ok()?;
    let count = fields[fields.len() - 1].split_whitespace().next()?.parse().ok()?;
    let date = fields[fields.len() - 2].to_string();
    let author = fields[1..fields.len() - 2].join(" | ");
    Some((revision, author, date, count))
}

fn looks_like_url(target: &str) -> bool {
    match target.split_once("://") {
        Some((scheme, rest)) => {
            !rest.is_empty()
                && scheme.starts_with(|c: char| c.is_ascii_alphabetic())
                && scheme
                    .chars()
                    .all(|c| c.is_ascii_alphanumeric() || matches!(c, '+' | '.' | '-'))
        }
        None => false,
    }
}

/// One file reached through the `svn` client
#[derive(Debug, Clone)]
pub struct SvnCli {
    url: String,
    credentials: Credentials,
}

impl SvnCli {
    /// Resolve `target` to a URL; a path that exists is looked up as a working copy
    pub fn connect(target: &str, credentials: &Credentials) -> Result<Self, LoadError> {
        let mut cli = Self {
            url: String::new(),
            credentials: credentials.clone(),
        };

        cli.url = if Path::new(target).exists() {
            let output = cli
                .run(&["info", "--show-item", "url", target])
                .map_err(|err| LoadError::TargetResolution(format!("{target}: {err}")))?;
            String::from_utf8_lossy(&output).trim().to_string()
        } else if looks_like_url(target) {
            target.to_string()
        } else {
            return Err(LoadError::TargetResolution(format!(
                "{target} is neither a working copy path nor a URL"
            )));
        };

        tracing::debug!(url = %cli.url, "svn target resolved");
        Ok(cli)
    }

    /// `svn` invocation for `args`; the password never appears on the command line
    fn command(&self, args: &[&str]) -> Command {
        let mut cmd = Command::new("svn");
        cmd.arg("--non-interactive");
        if !self.credentials.is_anonymous() {
            cmd.arg("--username")
                .arg(&self.credentials.username)
                .arg("--password-from-stdin")
                .arg("--no-auth-cache");
        }
        cmd.args(args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());
        cmd
    }

    fn run(&self, args: &[&str]) -> Result<Vec<u8>, LoadError> {
        let mut child = self.command(args).spawn()?;
        if let Some(mut stdin) = child.stdin.take() {
            if !self.credentials.is_anonymous() {
                writeln!(stdin, "{}", self.credentials.password)?;
            }
        }

        let output = child.wait_with_output()?;
        if !output.status.success() {
            return Err(LoadError::BackendIo(
                String::from_utf8_lossy(&output.stderr).trim().to_string(),
            ));
        }
        Ok(output.stdout)
    }
}

impl LinearRepository for SvnCli {
    fn file_revisions(&self) -> Result<Vec<LogEntry>, LoadError> {
        let output = self.run(&["log", "-r", "1:HEAD", &self.url])?;
        Ok(parse_log(&String::from_utf8_lossy(&output)))
    }

    fn fetch(&self, revision: u64) -> Result<Vec<u8>, LoadError> {
        // peg at HEAD so the file is traced back through renames
        let pegged = format!("{}@HEAD", self.url);
        self.run(&["cat", "-r", &revision.to_string(), &pegged])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::RevisionLoader;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{mpsc, Mutex};

    fn entry(revision: u64) -> LogEntry {
        LogEntry {
            revision,
            author: if revision == 1 { String::new() } else { "ann".into() },
            date: format!("2024-01-{revision:02}T09:30:15.000000Z"),
            message: format!("change {revision}"),
        }
    }

    struct FakeRepository {
        entries: Vec<LogEntry>,
        fetched: AtomicUsize,
        on_fetch: Option<Box<dyn Fn(usize) + Send>>,
    }

    impl FakeRepository {
        fn new(numbers: impl IntoIterator<Item = u64>) -> Self {
            Self {
                entries: numbers.into_iter().map(entry).collect(),
                fetched: AtomicUsize::new(0),
                on_fetch: None,
            }
        }
    }

    impl LinearRepository for FakeRepository {
        fn file_revisions(&self) -> Result<Vec<LogEntry>, LoadError> {
            Ok(self.entries.clone())
        }

        fn fetch(&self, revision: u64) -> Result<Vec<u8>, LoadError> {
            let count = self.fetched.fetch_add(1, Ordering::SeqCst) + 1;
            if let Some(hook) = &self.on_fetch {
                hook(count);
            }
            Ok(format!("contents of r{revision}\n").into_bytes())
        }
    }

    fn numbers(revisions: &[Revision]) -> Vec<RevisionId> {
        revisions.iter().map(|r| r.id().clone()).collect()
    }

    #[test]
    fn test_limit_selects_most_recent_oldest_first() {
        let repository = FakeRepository::new(1..=10);
        let revisions = load_linear(&repository, 3, &JobContext::new()).unwrap();
        let all = load_linear(&repository, 100, &JobContext::new()).unwrap();
        assert_eq!(all[0].author(), "(no author)");
        assert_eq!(all[1].author(), "ann");

        assert_eq!(
            numbers(&revisions),
            vec![
                RevisionId::Number(8),
                RevisionId::Number(9),
                RevisionId::Number(10)
            ]
        );
        assert_eq!(revisions[0].contents(), Some("contents of r8\n"));
        assert_eq!(revisions[0].date(), "2024-01-08 09:30");
        assert_eq!(repository.fetched.load(Ordering::SeqCst), 13);
    }

    #[test]
    fn test_cancel_keeps_fetched_revisions() {
        let job = JobContext::new();
        let token = job.cancel_token().clone();
        let mut repository = FakeRepository::new(1..=5);
        repository.on_fetch = Some(Box::new(move |count| {
            if count == 2 {
                token.cancel();
            }
        }));

        let revisions = load_linear(&repository, 100, &job).unwrap();
        assert_eq!(
            numbers(&revisions),
            vec![RevisionId::Number(4), RevisionId::Number(5)]
        );
        assert_eq!(job.progress().loaded(), 2);
        assert_eq!(job.progress().total(), 5);
    }

    #[test]
    fn test_loader_cancel_mid_job() {
        let (fetched_tx, fetched_rx) = mpsc::channel();
        let (release_tx, release_rx) = mpsc::channel::<()>();
        let release_rx = Mutex::new(release_rx);

        let mut repository = FakeRepository::new(1..=5);
        repository.on_fetch = Some(Box::new(move |count| {
            if count == 2 {
                fetched_tx.send(()).unwrap();
                let _ = release_rx.lock().unwrap().recv();
            }
        }));
        let repository = Mutex::new(Some(repository));
        let backend = SvnBackend::with_connector(move |_, _| {
            let repository = repository.lock().unwrap().take().unwrap();
            Ok(Box::new(repository) as Box<dyn LinearRepository>)
        });

        let loader = RevisionLoader::new(backend);
        let job = loader.load_revisions("svn://example/f.txt", 10, |_| {}).unwrap();
        fetched_rx.recv().unwrap();
        loader.cancel();
        release_tx.send(()).unwrap();
        job.join().unwrap();

        assert!(!loader.is_loading());
        assert_eq!(loader.loaded_count(), 2);
        let ids: Vec<RevisionId> = loader.revisions().iter().map(|r| r.id().clone()).collect();
        assert_eq!(ids, vec![RevisionId::Number(4), RevisionId::Number(5)]);
    }

    #[test]
    fn test_connector_failure_ends_job() {
        let backend = SvnBackend::with_connector(|target, _| {
            Err(LoadError::TargetResolution(target.to_string()))
        });
        let loader = RevisionLoader::new(backend);
        let (tx, rx) = mpsc::channel();
        loader
            .load_revisions("nowhere", 10, move |outcome| tx.send(outcome.is_err()).unwrap())
            .unwrap()
            .join()
            .unwrap();

        assert!(rx.recv().unwrap());
        assert!(loader.revisions().is_empty());
    }

    #[test]
    fn test_credentials_reach_connector() {
        let (tx, rx) = mpsc::channel();
        let tx = Mutex::new(tx);
        let backend = SvnBackend::with_connector(move |_, credentials| {
            tx.lock().unwrap().send(credentials.clone()).unwrap();
            Ok(Box::new(FakeRepository::new([1, 2])) as Box<dyn LinearRepository>)
        });
        let loader = RevisionLoader::new(backend);
        loader.set_credentials("ann", "secret");
        loader.load_revisions("f", 10, |_| {}).unwrap().join().unwrap();

        assert_eq!(rx.recv().unwrap(), Credentials::new("ann", "secret"));
        assert_eq!(loader.revisions().len(), 2);
    }

    #[test]
    fn test_format_date() {
        assert_eq!(format_date("2024-03-05T14:07:09.123456Z"), "2024-03-05 14:07");
        assert_eq!(
            format_date("2024-03-05 14:07:09 +0200 (Tue, 05 Mar 2024)"),
            "2024-03-05 14:07"
        );
        assert_eq!(format_date("yesterday"), "yesterday");
    }

    #[test]
    fn test_parse_log() {
        let output = format!(
            "{sep}\nr3 | ann | 2024-03-05 14:07:09 +0200 (Tue, 05 Mar 2024) | 2 lines\n\n\
             Fix the parser\n{sep}\n\n{sep}\n\
             r7 | (no author) | 2024-03-06 08:00:00 +0000 (Wed, 06 Mar 2024) | 1 line\n\nimport\n{sep}\n",
            sep = LOG_SEPARATOR
        );
        let entries = parse_log(&output);

        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].revision, 3);
        assert_eq!(entries[0].author, "ann");
        assert_eq!(entries[0].message, format!("Fix the parser\n{LOG_SEPARATOR}"));
        assert_eq!(entries[1].revision, 7);
        assert_eq!(entries[1].author, "(no author)");
        assert_eq!(entries[1].message, "import");
        assert_eq!(format_date(&entries[1].date), "2024-03-06 08:00");
    }

    #[test]
    fn test_url_detection() {
        assert!(looks_like_url("svn://host/repo/f.txt"));
        assert!(looks_like_url("svn+ssh://host/repo/f.txt"));
        assert!(looks_like_url("https://host/repo/f.txt"));
        assert!(!looks_like_url("relative/path.txt"));
        assert!(!looks_like_url("://nothing"));
    }

    fn arguments(cli: &SvnCli) -> Vec<String> {
        cli.command(&["log", "svn://host/f.txt"])
            .get_args()
            .map(|arg| arg.to_string_lossy().into_owned())
            .collect()
    }

    #[test]
    fn test_password_is_not_an_argument() {
        let cli = SvnCli {
            url: "svn://host/f.txt".into(),
            credentials: Credentials::new("ann", "hunter2"),
        };
        let args = arguments(&cli);
        assert_eq!(
            args,
            [
                "--non-interactive",
                "--username",
                "ann",
                "--password-from-stdin",
                "--no-auth-cache",
                "log",
                "svn://host/f.txt"
            ]
        );
        assert!(!args.iter().any(|arg| arg.contains("hunter2")));

        let anonymous = SvnCli {
            url: "svn://host/f.txt".into(),
            credentials: Credentials::default(),
        };
        assert_eq!(arguments(&anonymous), ["--non-interactive", "log", "svn://host/f.txt"]);
    }

    #[test]
    fn test_unresolvable_target() {
        let err = SvnCli::connect("no/such/file.txt", &Credentials::default()).unwrap_err();
        assert!(matches!(err, LoadError::TargetResolution(_)));
    }
}
