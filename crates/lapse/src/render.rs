//! Plain-terminal output: revision lists and diffs

use crossterm::style::{Color, Stylize};
use lapse_core::{Diff, DiffRow, Revision, RevisionList, RowKind, SearchHit, Side};
use std::io::{self, Write};

fn paint(text: &str, color: Color, enabled: bool) -> String {
    if enabled {
        text.with(color).to_string()
    } else {
        text.to_string()
    }
}

fn first_line(message: &str) -> &str {
    message.lines().next().unwrap_or_default().trim()
}

/// One line per revision, oldest first
pub fn write_list(out: &mut impl Write, revisions: &RevisionList, color: bool) -> io::Result<()> {
    for (index, revision) in revisions.iter().enumerate() {
        let id = format!("{:<9}", revision.id().short());
        writeln!(
            out,
            "{index:>4}  {}  {}  {}  {}",
            paint(&id, Color::Yellow, color),
            revision.date(),
            revision.author(),
            first_line(revision.message())
        )?;
    }
    Ok(())
}

pub fn write_json(out: &mut impl Write, revisions: &RevisionList) -> io::Result<()> {
    let json = serde_json::to_string_pretty(&revisions.summaries()).map_err(io::Error::other)?;
    writeln!(out, "{json}")
}

fn header(revision: &Revision) -> String {
    format!(
        "{} {} {}  {}",
        revision.id().short(),
        revision.date(),
        revision.author(),
        first_line(revision.message())
    )
}

fn write_row(out: &mut impl Write, index: usize, row: &DiffRow, color: bool) -> io::Result<()> {
    let left = row.left.as_ref().map_or("", |line| line.text.as_str());
    let right = row.right.as_ref().map_or("", |line| line.text.as_str());
    match row.kind {
        RowKind::Unchanged => writeln!(out, "{index:>5}   {left}"),
        RowKind::Deleted => writeln!(out, "{index:>5} {}", paint(&format!("- {left}"), Color::Red, color)),
        RowKind::Inserted => writeln!(out, "{index:>5} {}", paint(&format!("+ {right}"), Color::Green, color)),
        RowKind::Modified => {
            writeln!(out, "{index:>5} {}", paint(&format!("- {left}"), Color::Red, color))?;
            writeln!(out, "{:>5} {}", "", paint(&format!("+ {right}"), Color::Green, color))
        }
        RowKind::Folded(hidden) => {
            let label = match hidden {
                1 => "@@ 1 unchanged line @@".to_string(),
                n => format!("@@ {n} unchanged lines @@"),
            };
            writeln!(out, "{index:>5} {}", paint(&label, Color::Cyan, color))
        }
    }
}

/// Header for both revisions, then every row of `diff`
pub fn write_diff(
    out: &mut impl Write,
    left: &Revision,
    right: &Revision,
    diff: &Diff,
    color: bool,
) -> io::Result<()> {
    writeln!(out, "{}", paint(&format!("--- {}", header(left)), Color::Red, color))?;
    writeln!(out, "{}", paint(&format!("+++ {}", header(right)), Color::Green, color))?;
    writeln!(out, "{}", diff.difference_label())?;
    for (index, row) in diff.rows().iter().enumerate() {
        write_row(out, index, row, color)?;
    }
    Ok(())
}

pub fn describe_hit(hit: &SearchHit) -> String {
    let side = match hit.side {
        Side::Left => "left",
        Side::Right => "right",
    };
    format!("Match on {side} side, row {}, column {}", hit.line, hit.column + 1)
}

pub fn describe_neighbours(row: usize, previous: Option<usize>, next: Option<usize>) -> String {
    let show = |position: Option<usize>| position.map_or_else(|| "none".to_string(), |p| p.to_string());
    format!(
        "Around row {row}: previous change {}, next change {}",
        show(previous),
        show(next)
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use lapse_core::{DiffEngine, DisplayMode, LineDiffer, RevisionId};

    fn revision(number: u64, text: &str) -> Revision {
        Revision::new(
            RevisionId::Number(number),
            "ann",
            "2024-01-01 10:00",
            format!("change {number}\n\ndetails"),
            text,
        )
    }

    fn render(diff_mode: DisplayMode) -> String {
        let left = revision(1, "a\nb\nc\nd\n");
        let right = revision(2, "a\nB\nc\nd\ne\n");
        let diff = DiffEngine::default().diff(
            left.contents().unwrap(),
            right.contents().unwrap(),
            diff_mode,
        );
        let mut out = Vec::new();
        write_diff(&mut out, &left, &right, &diff, false).unwrap();
        String::from_utf8(out).unwrap()
    }

    #[test]
    fn test_full_diff_output() {
        let text = render(DisplayMode::Full);
        let lines: Vec<&str> = text.lines().collect();

        assert_eq!(lines[0], "--- r1 2024-01-01 10:00 ann  change 1");
        assert_eq!(lines[1], "+++ r2 2024-01-01 10:00 ann  change 2");
        assert_eq!(lines[2], "2 differences");
        assert_eq!(lines[3], "    0   a");
        assert_eq!(lines[4], "    1 - b");
        assert_eq!(lines[5], "      + B");
        assert_eq!(lines[8], "    4 + e");
    }

    #[test]
    fn test_folded_output() {
        let text = render(DisplayMode::DifferencesOnly);
        assert!(text.contains("    0 @@ 1 unchanged line @@"));
        assert!(text.contains("@@ 2 unchanged lines @@"));
    }

    #[test]
    fn test_list_and_json() {
        let list: RevisionList = [revision(3, "x"), revision(4, "y")].into_iter().collect();

        let mut out = Vec::new();
        write_list(&mut out, &list, false).unwrap();
        let text = String::from_utf8(out).unwrap();
        assert_eq!(text.lines().count(), 2);
        assert!(text.lines().next().unwrap().starts_with("   0  r3 "));

        let mut out = Vec::new();
        write_json(&mut out, &list).unwrap();
        let value: serde_json::Value = serde_json::from_slice(&out).unwrap();
        assert_eq!(value[1]["id"], 4);
        assert_eq!(value[0]["author"], "ann");
    }

    #[test]
    fn test_descriptions() {
        let hit = SearchHit {
            side: Side::Right,
            line: 4,
            column: 2,
            len: 3,
        };
        assert_eq!(describe_hit(&hit), "Match on right side, row 4, column 3");
        assert_eq!(
            describe_neighbours(5, Some(2), None),
            "Around row 5: previous change 2, next change none"
        );
    }
}
