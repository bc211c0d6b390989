#![forbid(unsafe_code)]

use std::io;

use crate::catalog::Command;

const DESCRIPTION_WIDTH: usize = 40;
const COMMAND_WIDTH: usize = 60;
const SHORT_HASH: usize = 8;

/// Plain text table with left-aligned columns separated by two spaces.
#[derive(Debug, Default)]
pub struct Table {
    headers: Vec<String>,
    rows: Vec<Vec<String>>,
}

impl Table {
    pub fn new(headers: impl IntoIterator<Item = impl Into<String>>) -> Self {
        Self {
            headers: headers.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    pub fn row(&mut self, cols: impl IntoIterator<Item = impl Into<String>>) {
        self.rows.push(cols.into_iter().map(Into::into).collect());
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn print(&self) -> io::Result<()> {
        self.write_to(io::stdout().lock())
    }

    fn write_to(&self, mut out: impl io::Write) -> io::Result<()> {
        let widths = self.column_widths();
        writeln!(out, "{}", render_row(&self.headers, &widths))?;
        for row in &self.rows {
            writeln!(out, "{}", render_row(row, &widths))?;
        }
        Ok(())
    }

    fn column_widths(&self) -> Vec<usize> {
        let mut widths = Vec::new();
        for row in std::iter::once(&self.headers).chain(&self.rows) {
            if row.len() > widths.len() {
                widths.resize(row.len(), 0);
            }
            for (w, cell) in widths.iter_mut().zip(row) {
                *w = (*w).max(cell.chars().count());
            }
        }
        widths
    }
}

fn render_row(row: &[String], widths: &[usize]) -> String {
    let last = row.len().saturating_sub(1);
    row.iter()
        .enumerate()
        .map(|(i, cell)| {
            let w = widths.get(i).copied().unwrap_or(0);
            if i == last {
                cell.clone()
            } else {
                format!("{cell:<w$}")
            }
        })
        .collect::<Vec<_>>()
        .join("  ")
}

/// The catalog listing shown by `list` and `search`.
#[must_use]
pub fn command_table(cmds: &[Command]) -> Table {
    let mut table = Table::new(["HASH", "DESCRIPTION", "LAST RUN", "DIRECTORY", "COMMAND"]);
    for c in cmds {
        table.row([
            c.hash.chars().take(SHORT_HASH).collect::<String>(),
            truncate(&c.description, DESCRIPTION_WIDTH),
            format_duration_ms(c.duration),
            c.working_directory.clone(),
            truncate(&c.command_text, COMMAND_WIDTH),
        ]);
    }
    table
}

#[must_use]
pub fn format_duration_ms(ms: i64) -> String {
    if ms < 0 {
        return "-".to_owned();
    }
    if ms < 1000 {
        return format!("{ms}ms");
    }
    let secs = ms / 1000;
    if secs < 60 {
        return format!("{secs}s");
    }
    format!("{}m{}s", secs / 60, secs % 60)
}

fn truncate(s: &str, max: usize) -> String {
    let mut out: String = s.chars().take(max).collect();
    if s.chars().count() > max {
        out.push_str("...");
    }
    out
}
