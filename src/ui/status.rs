// Worker status panes shared between workers and the renderer

use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Lines per worker pane
pub const PANE_LINES: usize = 5;

/// Panes shown at once; extra workers run undisplayed
pub const MAX_PANES: usize = 3;

/// Characters kept per pane line
pub const MAX_LINE_WIDTH: usize = 180;

/// Separator drawn between panes in plain output
pub const SEPARATOR_WIDTH: usize = 90;

pub type PaneLines = [String; PANE_LINES];

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaneSnapshot {
    pub name: String,
    pub lines: PaneLines,
}

/// Fixed table of named panes behind one lock.
///
/// Writers replace a whole pane; the renderer copies the whole table and
/// draws outside the lock.
#[derive(Debug)]
pub struct StatusBoard {
    panes: Mutex<Vec<PaneSnapshot>>,
}

fn normalize<I, S>(lines: I) -> PaneLines
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    let mut out: PaneLines = Default::default();
    for (slot, line) in out.iter_mut().zip(lines) {
        let line: String = line.into();
        *slot = line.chars().take(MAX_LINE_WIDTH).collect();
    }
    out
}

impl StatusBoard {
    /// Register panes for the first `MAX_PANES` names, each with a placeholder.
    pub fn new<I, S>(names: I) -> Arc<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let panes = names
            .into_iter()
            .take(MAX_PANES)
            .map(|name| {
                let name = name.into();
                let lines = normalize([format!("[{}] waiting...", name)]);
                PaneSnapshot { name, lines }
            })
            .collect();
        Arc::new(Self {
            panes: Mutex::new(panes),
        })
    }

    fn table(&self) -> MutexGuard<'_, Vec<PaneSnapshot>> {
        self.panes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Overwrite a pane; missing lines are blanked, extra lines dropped.
    /// Unknown workers are ignored.
    pub fn set_lines<I, S>(&self, worker: &str, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let lines = normalize(lines);
        let mut table = self.table();
        if let Some(pane) = table.iter_mut().find(|p| p.name == worker) {
            pane.lines = lines;
        }
    }

    pub fn snapshot(&self) -> Vec<PaneSnapshot> {
        self.table().clone()
    }

    /// Write handle for one worker
    pub fn pane(self: &Arc<Self>, worker: impl Into<String>) -> PaneHandle {
        PaneHandle {
            board: Arc::clone(self),
            name: worker.into(),
        }
    }
}

/// A worker's write access to its own pane.
#[derive(Debug, Clone)]
pub struct PaneHandle {
    board: Arc<StatusBoard>,
    name: String,
}

impl PaneHandle {
    pub fn set<I, S>(&self, lines: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.board.set_lines(&self.name, lines);
    }
}

/// Plain-text frame: every pane's lines with a separator between panes.
pub fn render_text(panes: &[PaneSnapshot]) -> String {
    let separator = "─".repeat(SEPARATOR_WIDTH);
    let mut out: Vec<&str> = Vec::new();
    for (i, pane) in panes.iter().enumerate() {
        out.extend(pane.lines.iter().map(String::as_str));
        if i + 1 < panes.len() {
            out.push(&separator);
        }
    }
    out.join("\n")
}
