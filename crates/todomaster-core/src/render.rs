use std::io::{self, IsTerminal, Write};

use anyhow::anyhow;
use unicode_width::UnicodeWidthStr;

use crate::config::Config;
use crate::datetime::format_local;
use crate::task::{Counts, Task, TaskFilter};

/// A task paired with its 1-based position in the full stored list.
pub type NumberedTask<'a> = (usize, &'a Task);

#[derive(Debug, Clone)]
pub struct Renderer {
    color: bool,
}

impl Renderer {
    pub fn new(cfg: &Config) -> anyhow::Result<Self> {
        let color = match cfg.get("color") {
            None => true,
            Some(raw) => cfg
                .get_bool("color")
                .ok_or_else(|| anyhow!("invalid color setting: {raw}"))?,
        };

        Ok(Self {
            color: color && io::stdout().is_terminal(),
        })
    }

    pub fn plain() -> Self {
        Self { color: false }
    }

    #[tracing::instrument(skip(self, out, tasks))]
    pub fn write_task_list<W: Write>(
        &self,
        out: &mut W,
        tasks: &[NumberedTask<'_>],
        filter: TaskFilter,
        counts: Counts,
    ) -> anyhow::Result<()> {
        if tasks.is_empty() {
            writeln!(out, "{}", empty_message(filter))?;
        } else {
            let rows: Vec<[Cell; 4]> = tasks
                .iter()
                .map(|(position, task)| {
                    let (mark, text_style) = if task.completed {
                        (Cell::styled("[x]", "32"), Some("9;90"))
                    } else {
                        (Cell::plain("[ ]"), None)
                    };
                    [
                        Cell::styled(&position.to_string(), "33"),
                        mark,
                        Cell {
                            text: task.text.clone(),
                            style: text_style,
                        },
                        Cell::plain(&format_local(task.created_at)),
                    ]
                })
                .collect();

            self.write_table(out, &rows)?;
        }

        writeln!(out)?;
        self.write_counts(out, counts)?;
        if let Some(summary) = progress_summary(counts) {
            writeln!(out, "{summary}")?;
        }
        Ok(())
    }

    pub fn write_counts<W: Write>(&self, out: &mut W, counts: Counts) -> anyhow::Result<()> {
        writeln!(
            out,
            "{} active, {} completed",
            counts.active, counts.completed
        )?;
        Ok(())
    }

    /// Columns are sized on the unstyled text; escapes wrap only the text,
    /// never the padding after it.
    fn write_table<W: Write>(&self, out: &mut W, rows: &[[Cell; 4]]) -> anyhow::Result<()> {
        let mut widths = HEADERS.map(|header| header.width());
        for row in rows {
            for (width, cell) in widths.iter_mut().zip(row) {
                *width = (*width).max(cell.text.width());
            }
        }

        let header: Vec<Cell> = HEADERS.iter().map(|h| Cell::plain(h)).collect();
        self.write_row(out, &header, &widths)?;
        let rule: Vec<Cell> = widths.iter().map(|w| Cell::plain(&"-".repeat(*w))).collect();
        self.write_row(out, &rule, &widths)?;
        for row in rows {
            self.write_row(out, row, &widths)?;
        }
        Ok(())
    }

    fn write_row<W: Write>(
        &self,
        out: &mut W,
        cells: &[Cell],
        widths: &[usize],
    ) -> anyhow::Result<()> {
        let last = cells.len().saturating_sub(1);
        let mut line = String::new();
        for (idx, (cell, width)) in cells.iter().zip(widths).enumerate() {
            if idx > 0 {
                line.push(' ');
            }
            line.push_str(&self.paint(&cell.text, cell.style));
            if idx < last {
                line.push_str(&" ".repeat(width.saturating_sub(cell.text.width())));
            }
        }
        writeln!(out, "{line}")?;
        Ok(())
    }

    fn paint(&self, text: &str, style: Option<&str>) -> String {
        match style {
            Some(code) if self.color => format!("\x1b[{code}m{text}\x1b[0m"),
            _ => text.to_string(),
        }
    }
}

const HEADERS: [&str; 4] = ["#", "Done", "Task", "Created"];

#[derive(Debug, Clone)]
struct Cell {
    text: String,
    style: Option<&'static str>,
}

impl Cell {
    fn plain(text: &str) -> Self {
        Self {
            text: text.to_string(),
            style: None,
        }
    }

    fn styled(text: &str, code: &'static str) -> Self {
        Self {
            text: text.to_string(),
            style: Some(code),
        }
    }
}

pub fn empty_message(filter: TaskFilter) -> &'static str {
    match filter {
        TaskFilter::All => "No tasks yet. Add one!",
        TaskFilter::Active => "No active tasks!",
        TaskFilter::Completed => "No completed tasks!",
    }
}

/// Encouragement shown under a non-empty list.
pub fn progress_summary(counts: Counts) -> Option<String> {
    let total = counts.total();
    if total == 0 || counts.completed == 0 {
        return None;
    }

    let mut summary = format!(
        "Great job! You've completed {} out of {} tasks.",
        counts.completed, total
    );
    if counts.completed == total {
        summary.push_str(" All tasks completed! You're amazing!");
    }
    Some(summary)
}
