//! Capture loop.
//! Ties a frame source to a session: one capture per tick, plus line commands
//! (undo, save, restart, stop) read from stdin and handled between ticks, so the session
//! only ever has one writer.

use std::future::Future;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use tokio::sync::mpsc;
use tokio::time::{MissedTickBehavior, interval};
use tracing::{debug, error, info, warn};

use crate::capture::{CaptureRect, FrameSource, save_debug};
use crate::export::{self, ExportFormat, ExportSummary};
use crate::ocr;
use crate::paper::PaperSize;
use crate::preview;
use crate::session::{Session, SessionConfig, TickOutcome, UndoOutcome};

/// Commands typed while a capture runs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Control {
    Undo,
    Save(Option<PathBuf>),
    Restart,
    Stop,
    Status,
    Follow(bool),
}

impl Control {
    pub fn parse(line: &str) -> Option<Self> {
        let mut words = line.split_whitespace();
        let command = words.next()?.to_ascii_lowercase();
        let arg = words.next();
        match command.as_str() {
            "u" | "undo" => Some(Control::Undo),
            "s" | "save" => Some(Control::Save(arg.map(PathBuf::from))),
            "r" | "restart" => Some(Control::Restart),
            "q" | "stop" | "quit" => Some(Control::Stop),
            "status" => Some(Control::Status),
            "follow" => Some(Control::Follow(!matches!(arg, Some("off")))),
            _ => None,
        }
    }
}

pub const HELP: &str = "commands: u|undo, s|save [path], r|restart, status, follow [on|off], q|stop";

/// Settings of a `run` invocation.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub rect: CaptureRect,
    pub max_error: f64,
    pub paper: PaperSize,
    pub tick: Duration,
    /// Saved to automatically on stop.
    pub output: Option<PathBuf>,
    /// Fallback for a `save` without a path.
    pub last_file: Option<PathBuf>,
    pub ocr: bool,
}

/// A running capture: frame source, capture rectangle and session.
pub struct Recorder<S> {
    source: S,
    rect: CaptureRect,
    session: Session,
    paper: PaperSize,
    debug_preview: bool,
}

impl<S: FrameSource> Recorder<S> {
    /// Grabs the first frame and starts the session. The page height follows the
    /// paper aspect at the capture width.
    pub fn start(mut source: S, rect: CaptureRect, max_error: f64, paper: PaperSize) -> Result<Self> {
        let first = source.capture(rect).context("Failed to capture first frame")?;
        let config = SessionConfig::new(max_error, paper.page_height_px(first.width()));
        let session = Session::start(config, first).context("Failed to start session")?;
        Ok(Self {
            source,
            rect,
            session,
            paper,
            debug_preview: std::env::var_os("DEBUG_CAPTURE").is_some(),
        })
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    /// One capture step. Errors are per frame; the session stays usable.
    pub fn tick(&mut self, now: Instant) -> Result<TickOutcome> {
        let started = Instant::now();
        let frame = self.source.capture(self.rect).context("Failed to capture frame")?;
        let outcome = self
            .session
            .accept_frame(&frame, now)
            .context("Frame refused")?;
        debug!(elapsed = ?started.elapsed(), ?outcome, "tick");

        if self.debug_preview && matches!(outcome, TickOutcome::Appended { .. }) {
            save_debug(&preview::render(self.session.state()), "debug_preview.png");
        }
        Ok(outcome)
    }

    /// Captures a fresh first frame and starts the session over.
    pub fn restart(&mut self) -> Result<()> {
        let first = self.source.capture(self.rect).context("Failed to capture first frame")?;
        self.session.reset(first).context("Failed to restart session")?;
        Ok(())
    }

    pub fn undo(&mut self, now: Instant) -> UndoOutcome {
        if !self.session.can_undo() {
            info!("nothing to undo");
        }
        self.session.undo(now)
    }

    pub fn set_follow(&mut self, follow: bool) {
        self.session.set_auto_follow(follow);
    }

    /// Exports everything captured so far.
    pub fn save(&self, path: &Path) -> Result<ExportSummary, export::ExportError> {
        export::export(path, self.session.pages(), &self.session.pending_tail(), self.paper)
    }

    pub fn status(&self) -> String {
        let state = self.session.state();
        format!(
            "pages: {} (+1 pending, {}/{} rows), {} rows captured, composite {}x{}, stack {} px, undo depth {}, follow {}",
            state.pages.len(),
            state.composite.pending_height(),
            self.session.config().page_height,
            state.total_rows(),
            state.composite.width(),
            state.composite.height(),
            preview::visual_length(state),
            self.session.undo_depth(),
            if state.auto_follow { "on" } else { "off" },
        )
    }
}

/// Saves to `path` and runs OCR on PDFs when asked. Errors are reported, never
/// fatal to the capture.
pub async fn save_and_report<S: FrameSource>(recorder: &Recorder<S>, path: &Path, run_ocr: bool) -> bool {
    match recorder.save(path) {
        Ok(summary) => {
            println!(
                "Saved {} page(s) in {} file(s) to {}",
                summary.pages,
                summary.files.len(),
                path.display()
            );
            if run_ocr && summary.format == ExportFormat::Pdf {
                if let Err(err) = ocr::run_ocrmypdf(path).await {
                    error!(error = %err, "OCR post-processing failed");
                    eprintln!("OCR failed: {err}");
                }
            }
            true
        }
        Err(err) => {
            error!(error = %err, path = %path.display(), "export failed");
            eprintln!("Export failed: {err}");
            false
        }
    }
}

/// Forwards stdin lines as commands until stdin closes.
pub fn spawn_stdin_commands() -> mpsc::Receiver<Control> {
    spawn_line_commands(BufReader::new(io::stdin()))
}

/// Reads on a plain thread: a read blocked in the kernel must not hold up
/// runtime shutdown.
fn spawn_line_commands<R: BufRead + Send + 'static>(reader: R) -> mpsc::Receiver<Control> {
    let (tx, rx) = mpsc::channel(16);
    thread::spawn(move || {
        for line in reader.lines() {
            let Ok(line) = line else { break };
            match Control::parse(&line) {
                Some(control) => {
                    if tx.blocking_send(control).is_err() {
                        break;
                    }
                }
                None if line.trim().is_empty() => {}
                None => eprintln!("{HELP}"),
            }
        }
    });
    rx
}

/// Ticks until a stop command or `shutdown` (Ctrl+C in the binary) resolves.
/// Returns the paths saved to.
pub async fn run<S, F>(
    recorder: &mut Recorder<S>,
    options: &RunOptions,
    mut commands: mpsc::Receiver<Control>,
    shutdown: F,
) -> Result<Vec<PathBuf>>
where
    S: FrameSource,
    F: Future<Output = io::Result<()>>,
{
    tokio::pin!(shutdown);
    let mut listening = true;
    let mut ticker = interval(options.tick);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut saved = Vec::new();
    let mut commands_open = true;

    loop {
        tokio::select! {
            _ = ticker.tick() => {
                match recorder.tick(Instant::now()) {
                    Ok(TickOutcome::Appended { new_pages, .. }) if new_pages > 0 => {
                        println!("{}", recorder.status());
                    }
                    Ok(_) => {}
                    Err(err) => warn!(error = %format!("{err:#}"), "tick skipped"),
                }
            }
            command = commands.recv(), if commands_open => {
                let Some(command) = command else {
                    commands_open = false;
                    continue;
                };
                match command {
                    Control::Undo => match recorder.undo(Instant::now()) {
                        UndoOutcome::Restored { remaining } => println!("Undone ({remaining} more available)"),
                        UndoOutcome::NothingToUndo => println!("Nothing to undo"),
                    },
                    Control::Save(path) => {
                        let Some(path) = path
                            .or_else(|| options.output.clone())
                            .or_else(|| options.last_file.clone())
                        else {
                            eprintln!("save needs a path (or run with --output)");
                            continue;
                        };
                        if save_and_report(recorder, &path, options.ocr).await {
                            saved.push(path);
                        }
                    }
                    Control::Restart => match recorder.restart() {
                        Ok(()) => println!("Restarted: {}", recorder.status()),
                        Err(err) => eprintln!("Restart failed: {err:#}"),
                    },
                    Control::Status => println!("{}", recorder.status()),
                    Control::Follow(follow) => recorder.set_follow(follow),
                    Control::Stop => break,
                }
            }
            result = &mut shutdown, if listening => match result {
                Ok(()) => {
                    info!("interrupted");
                    break;
                }
                Err(err) => {
                    warn!(error = %err, "cannot listen for interrupts");
                    listening = false;
                }
            },
        }
    }

    if let Some(path) = &options.output {
        if save_and_report(recorder, path, options.ocr).await {
            saved.push(path.clone());
        }
    }
    Ok(saved)
}
