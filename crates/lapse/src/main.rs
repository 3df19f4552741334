//! Lapse CLI - step through the history of one file

mod config;
mod progress;
mod render;

use anyhow::{anyhow, bail, Context, Result};
use clap::Parser;
use config::{Config, SHOW_DIFFERENCES_ONLY};
use lapse_core::{
    next_change, previous_change, DiffEngine, DisplayMode, LoaderRegistry, RevisionList, Searcher, Session,
    DEFAULT_BACKEND,
};
use std::io::{self, IsTerminal, Write};
use std::path::PathBuf;
use std::sync::{mpsc, Arc};
use tracing::level_filters::LevelFilter;

const DEFAULT_LIMIT: usize = 100;

#[derive(Parser, Debug)]
#[command(name = "lapse")]
#[command(author, version, about = "A time-lapse view of one file's history")]
struct Args {
    /// Working-copy path or repository URL of the file
    target: String,

    /// Version-control backend [default: `scm` setting, else git]
    #[arg(long)]
    scm: Option<String>,

    /// Username for the repository, remembered in the config (anonymous when empty)
    #[arg(long)]
    username: Option<String>,

    /// Password for the repository
    #[arg(long, default_value = "")]
    password: String,

    /// Maximum number of revisions to load [default: `limit` setting, else 100]
    #[arg(short, long)]
    limit: Option<usize>,

    /// Config file to use instead of the default location
    #[arg(long)]
    config: Option<PathBuf>,

    /// Print the loaded revisions and exit
    #[arg(long)]
    list: bool,

    /// With --list, print JSON
    #[arg(long, requires = "list")]
    json: bool,

    /// Left revision index (0 is the oldest, -1 the newest)
    #[arg(long, allow_hyphen_values = true)]
    from: Option<i64>,

    /// Right revision index (0 is the oldest, -1 the newest)
    #[arg(long, allow_hyphen_values = true)]
    to: Option<i64>,

    /// Hide unchanged lines (saved to the config)
    #[arg(long, conflicts_with = "full")]
    differences_only: bool,

    /// Show unchanged lines (saved to the config)
    #[arg(long)]
    full: bool,

    /// Report the first match of a query in the diff
    #[arg(long)]
    search: Option<String>,

    /// Report the changes before and after a diff row
    #[arg(long)]
    goto: Option<usize>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,
}

fn init_tracing(verbose: u8) -> Result<()> {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

    let level = match verbose {
        0 => LevelFilter::WARN,
        1 => LevelFilter::INFO,
        2 => LevelFilter::DEBUG,
        _ => LevelFilter::TRACE,
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .with(level)
        .try_init()
        .map_err(|error| anyhow!(error))?;

    Ok(())
}

/// Resolve `--from`/`--to`, defaulting to the two newest revisions
fn choose_pair(revisions: &RevisionList, from: Option<i64>, to: Option<i64>) -> Result<(usize, usize)> {
    let len = revisions.len() as i64;
    let resolve = |index: i64, flag: &str| {
        revisions
            .resolve_index(index)
            .with_context(|| format!("{flag} {index} is out of range ({len} revisions)"))
    };
    let (newer_left, newest) = revisions
        .default_pair()
        .with_context(|| format!("Need two revisions to compare, found {len}"))?;
    let left = from.map_or(Ok(newer_left), |index| resolve(index, "--from"))?;
    let right = to.map_or(Ok(newest), |index| resolve(index, "--to"))?;
    Ok((left, right))
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose)?;

    let mut config = match &args.config {
        Some(path) => Config::load_from(path),
        None => Config::load(),
    };

    // CLI overrides config and is remembered
    let mut changed = false;
    if args.differences_only || args.full {
        config.set_bool(SHOW_DIFFERENCES_ONLY, args.differences_only);
        changed = true;
    }
    if let Some(username) = &args.username {
        config.set_string("username", username.as_str());
        changed = true;
    }
    if changed {
        if let Err(err) = config.save() {
            tracing::warn!("{err:#}");
        }
    }
    let mode = DisplayMode::from_flag(config.get_bool(SHOW_DIFFERENCES_ONLY, true));

    let scm = args
        .scm
        .clone()
        .unwrap_or_else(|| config.get_string("scm", DEFAULT_BACKEND));
    let username = args
        .username
        .clone()
        .unwrap_or_else(|| config.get_string("username", ""));
    let limit = match args.limit {
        Some(limit) => limit,
        None => config
            .get_string("limit", &DEFAULT_LIMIT.to_string())
            .parse()
            .with_context(|| "Invalid `limit` setting in config")?,
    };
    tracing::debug!(config = ?config.path(), %scm, limit, "settings resolved");

    let registry = LoaderRegistry::with_defaults();
    let loader = Arc::new(
        registry
            .create(&scm)
            .map_err(|err| anyhow!("{err} (available: {})", registry.keys().join(", ")))?,
    );

    let session = Session::new(DiffEngine::default());
    let (tx, rx) = mpsc::channel();
    let job = session
        .load(
            loader,
            args.target.clone(),
            username,
            args.password.clone(),
            limit,
            move |report| {
                let _ = tx.send(report);
            },
        )
        .context("Failed to start loading")?;

    let report = progress::wait_for_report(&session, &rx)?;
    job.join().map_err(|_| anyhow!("Loader thread panicked"))?;
    let revisions = report
        .result
        .with_context(|| format!("Failed to load history of {}", args.target))?;

    let stdout = io::stdout();
    let color = stdout.is_terminal();
    let mut out = stdout.lock();

    if args.list {
        if args.json {
            render::write_json(&mut out, &revisions)?;
        } else {
            render::write_list(&mut out, &revisions, color)?;
        }
        return Ok(());
    }

    let (left, right) = choose_pair(&revisions, args.from, args.to)?;
    let diff = session
        .diff_at(left, right, mode)
        .context("Revision list changed while diffing")?;
    let (Some(left_revision), Some(right_revision)) = (revisions.get(left), revisions.get(right)) else {
        bail!("Revision list changed while diffing");
    };
    render::write_diff(&mut out, left_revision, right_revision, &diff, color)?;

    if let Some(query) = &args.search {
        let mut searcher = Searcher::from_diff(&diff);
        if searcher.search(query) {
            if let Some(hit) = searcher.hit() {
                writeln!(out, "{}", render::describe_hit(&hit))?;
            }
        } else {
            writeln!(out, "No match for \"{}\"", query.trim())?;
        }
    }

    if let Some(row) = args.goto {
        let positions = diff.changed_positions();
        writeln!(
            out,
            "{}",
            render::describe_neighbours(row, previous_change(row, positions), next_change(row, positions))
        )?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapse_core::{Revision, RevisionId};

    fn list(count: u64) -> RevisionList {
        (1..=count)
            .map(|n| Revision::new(RevisionId::Number(n), "ann", "", "", ""))
            .collect()
    }

    #[test]
    fn test_default_pair_is_two_newest() {
        assert_eq!(choose_pair(&list(5), None, None).unwrap(), (3, 4));
    }

    #[test]
    fn test_explicit_and_negative_indices() {
        assert_eq!(choose_pair(&list(5), Some(0), Some(-3)).unwrap(), (0, 2));
        assert!(choose_pair(&list(5), Some(5), None).is_err());
        assert!(choose_pair(&list(2), None, Some(-3)).is_err());
        assert_eq!(choose_pair(&list(2), None, Some(0)).unwrap(), (0, 0));
        assert!(choose_pair(&list(1), Some(0), Some(0)).is_err());
    }

    #[test]
    fn test_args_parse() {
        let args = Args::parse_from(["lapse", "src/lib.rs", "--from", "-3", "--scm", "svn", "-vv"]);
        assert_eq!(args.from, Some(-3));
        assert_eq!(args.scm.as_deref(), Some("svn"));
        assert_eq!(args.limit, None);
        assert_eq!(args.verbose, 2);
        assert!(!args.differences_only && !args.full);

        assert!(Args::try_parse_from(["lapse", "f", "--full", "--differences-only"]).is_err());
        assert!(Args::try_parse_from(["lapse", "f", "--json"]).is_err());
    }
}
