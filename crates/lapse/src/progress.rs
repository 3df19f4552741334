//! Load progress on stderr while the background job runs

use anyhow::{bail, Result};
use crossterm::{
    cursor::MoveToColumn,
    execute,
    style::Print,
    terminal::{Clear, ClearType},
};
use lapse_core::{LoadReport, Session};
use std::io::{self, IsTerminal};
use std::sync::mpsc::{Receiver, RecvTimeoutError};
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub fn status_line(loaded: usize, total: usize) -> String {
    if total == 0 {
        "Loading revisions...".to_string()
    } else {
        format!("Loading revisions {loaded}/{total}")
    }
}

/// Block until the load reports back, redrawing the counters meanwhile
pub fn wait_for_report(session: &Session, reports: &Receiver<LoadReport>) -> Result<LoadReport> {
    let mut stderr = io::stderr();
    let interactive = stderr.is_terminal();

    let report = loop {
        match reports.recv_timeout(POLL_INTERVAL) {
            Ok(report) => break report,
            Err(RecvTimeoutError::Timeout) => {
                if interactive {
                    let line = status_line(session.loaded_count(), session.total_count());
                    execute!(stderr, MoveToColumn(0), Clear(ClearType::CurrentLine), Print(line))?;
                }
            }
            Err(RecvTimeoutError::Disconnected) => bail!("Loader stopped without reporting"),
        }
    };

    if interactive {
        execute!(stderr, MoveToColumn(0), Clear(ClearType::CurrentLine))?;
    }
    Ok(report)
}
