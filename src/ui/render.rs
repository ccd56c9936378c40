// Periodic renderer for the worker status panes

use crossterm::{
    cursor::{MoveTo, Show},
    execute, queue,
    terminal::{Clear, ClearType, EnterAlternateScreen, LeaveAlternateScreen},
};
use ratatui::{
    Frame, Terminal,
    backend::CrosstermBackend,
    layout::{Constraint, Direction, Layout},
    style::{Color, Modifier, Style},
    text::Line,
    widgets::Paragraph,
};
use std::io::{self, Write};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;

use super::status::{PANE_LINES, PaneSnapshot, StatusBoard, render_text};
use crate::engine::CancelToken;

/// Refresh bounds shared by the renderer and progress throttling
pub const MIN_REFRESH_SECS: f64 = 0.2;
pub const MAX_REFRESH_SECS: f64 = 2.0;

/// Clamp a refresh interval into [0.2s, 2s]
pub fn clamp_interval(secs: f64) -> Duration {
    let secs = if secs.is_finite() {
        secs.clamp(MIN_REFRESH_SECS, MAX_REFRESH_SECS)
    } else {
        MAX_REFRESH_SECS
    };
    Duration::from_secs_f64(secs)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RenderMode {
    /// ratatui on the alternate screen
    Tui,
    /// Clear-and-print frames on the main screen
    Plain,
}

/// Draw all panes stacked, one separator row between panes.
pub fn draw_panes(frame: &mut Frame, panes: &[PaneSnapshot]) {
    let mut constraints = Vec::with_capacity(panes.len() * 2 + 1);
    for i in 0..panes.len() {
        constraints.push(Constraint::Length(PANE_LINES as u16));
        if i + 1 < panes.len() {
            constraints.push(Constraint::Length(1));
        }
    }
    constraints.push(Constraint::Min(0));

    let chunks = Layout::default()
        .direction(Direction::Vertical)
        .constraints(constraints)
        .split(frame.area());

    for (i, pane) in panes.iter().enumerate() {
        let lines: Vec<Line> = pane
            .lines
            .iter()
            .enumerate()
            .map(|(row, text)| {
                if row == 0 {
                    Line::styled(
                        text.clone(),
                        Style::default()
                            .fg(Color::Cyan)
                            .add_modifier(Modifier::BOLD),
                    )
                } else {
                    Line::raw(text.clone())
                }
            })
            .collect();
        frame.render_widget(Paragraph::new(lines), chunks[i * 2]);

        if i + 1 < panes.len() {
            let sep_area = chunks[i * 2 + 1];
            let rule = "─".repeat(sep_area.width as usize);
            frame.render_widget(
                Paragraph::new(rule).style(Style::default().fg(Color::DarkGray)),
                sep_area,
            );
        }
    }
}

/// Leave the alternate screen and show the cursor.
pub fn restore_terminal<W: Write>(out: &mut W) -> io::Result<()> {
    execute!(out, LeaveAlternateScreen, Show)
}

fn run_tui(
    board: &StatusBoard,
    interval: Duration,
    stop: &CancelToken,
    cancel: &CancelToken,
) -> io::Result<()> {
    let mut stdout = io::stdout();
    execute!(stdout, EnterAlternateScreen)?;
    let mut terminal = Terminal::new(CrosstermBackend::new(stdout))?;
    terminal.clear()?;

    let result = (|| -> io::Result<()> {
        while !stop.is_cancelled() && !cancel.is_cancelled() {
            let panes = board.snapshot();
            terminal.draw(|frame| draw_panes(frame, &panes))?;
            stop.sleep(interval);
        }
        Ok(())
    })();

    terminal.show_cursor()?;
    restore_terminal(&mut io::stdout())?;
    result
}

fn run_plain(
    board: &StatusBoard,
    interval: Duration,
    stop: &CancelToken,
    cancel: &CancelToken,
) -> io::Result<()> {
    let mut out = io::stdout();
    while !stop.is_cancelled() && !cancel.is_cancelled() {
        let frame = render_text(&board.snapshot());
        queue!(out, Clear(ClearType::All), MoveTo(0, 0))?;
        out.write_all(frame.as_bytes())?;
        out.write_all(b"\n")?;
        out.flush()?;
        stop.sleep(interval);
    }
    Ok(())
}

/// Background thread redrawing the board at a fixed interval,
/// independent of worker progress.
pub struct Renderer {
    stop: CancelToken,
    handle: Option<JoinHandle<()>>,
}

impl Renderer {
    pub fn spawn(
        board: Arc<StatusBoard>,
        interval: Duration,
        mode: RenderMode,
        cancel: CancelToken,
    ) -> io::Result<Self> {
        let stop = CancelToken::new();
        let thread_stop = stop.clone();

        let handle = thread::Builder::new()
            .name("plexopt-render".to_string())
            .spawn(move || {
                let result = match mode {
                    RenderMode::Tui => run_tui(&board, interval, &thread_stop, &cancel),
                    RenderMode::Plain => run_plain(&board, interval, &thread_stop, &cancel),
                };
                if let Err(e) = result {
                    tracing::warn!(error = %e, "status renderer stopped");
                }
            })?;

        Ok(Self {
            stop,
            handle: Some(handle),
        })
    }

    /// Stop redrawing and give the terminal back
    pub fn stop(mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.stop.cancel();
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

impl Drop for Renderer {
    fn drop(&mut self) {
        self.shutdown();
    }
}
