//! Capture session.
//! Owns the session state (composite, pages, auto-follow) and runs one capture
//! step: debounce check, alignment, snapshot, append, pagination, size cap.
//! This is the only writer of session state; readers borrow it between ticks.

use std::time::Instant;

use image::{RgbImage, imageops};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::align::{AlignError, Aligner, DEFAULT_SEARCH_MARGIN};
use crate::composite::{Composite, CompositeError, DEFAULT_HEIGHT_CAP};
use crate::history::{Debounce, UNDO_CAPACITY, UndoHistory};
use crate::pager::{DEFAULT_CUT_SEARCH, Page, Paginator};

#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Align(#[from] AlignError),

    #[error(transparent)]
    Composite(#[from] CompositeError),

    #[error("page height must be at least one row")]
    ZeroPageHeight,

    #[error("first frame is empty")]
    EmptyFrame,
}

/// Tunables of a capture session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SessionConfig {
    /// Alignments with an error at or above this are discarded.
    pub max_error: f64,
    pub page_height: u32,
    pub height_cap: u32,
    pub search_margin: u32,
    pub cut_search: u32,
    pub undo_capacity: usize,
}

impl SessionConfig {
    pub fn new(max_error: f64, page_height: u32) -> Self {
        Self {
            max_error,
            page_height,
            height_cap: DEFAULT_HEIGHT_CAP,
            search_margin: DEFAULT_SEARCH_MARGIN,
            cut_search: DEFAULT_CUT_SEARCH,
            undo_capacity: UNDO_CAPACITY,
        }
    }

    /// Cap actually applied. Never below one page, otherwise the crop could reach
    /// rows that are still pending.
    pub fn effective_height_cap(&self) -> u32 {
        self.height_cap.max(self.page_height)
    }
}

/// Everything one undo step restores.
#[derive(Debug, Clone)]
pub struct SessionState {
    pub composite: Composite,
    pub pages: Vec<Page>,
    /// Whether a viewer should stay scrolled to the newest content.
    pub auto_follow: bool,
}

impl SessionState {
    fn new(first: RgbImage) -> Self {
        Self {
            composite: Composite::new(first),
            pages: Vec::new(),
            auto_follow: true,
        }
    }

    /// Rows committed to pages plus pending rows.
    pub fn total_rows(&self) -> u64 {
        self.pages.iter().map(|p| u64::from(p.height())).sum::<u64>()
            + u64::from(self.composite.pending_height())
    }
}

/// Result of offering one frame to the session.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// Inside the debounce window after an undo. Not evaluated.
    Suppressed,
    /// Best match is the current bottom; nothing scrolled.
    Unchanged { error: f64 },
    /// Best match was not good enough; frame dropped.
    Rejected { shift: u32, error: f64 },
    Appended {
        shift: u32,
        error: f64,
        new_pages: usize,
        cropped: u32,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UndoOutcome {
    Restored { remaining: usize },
    NothingToUndo,
}

pub struct Session {
    config: SessionConfig,
    aligner: Aligner,
    paginator: Paginator,
    state: SessionState,
    history: UndoHistory<SessionState>,
    debounce: Debounce,
}

impl Session {
    /// Starts a session from its first frame. The first frame is paginated
    /// immediately.
    pub fn start(config: SessionConfig, first: RgbImage) -> Result<Self, SessionError> {
        if config.page_height == 0 {
            return Err(SessionError::ZeroPageHeight);
        }
        if config.effective_height_cap() != config.height_cap {
            warn!(
                page_height = config.page_height,
                cap = config.height_cap,
                "page taller than composite cap, raising cap to one page"
            );
        }

        let mut session = Self {
            config,
            aligner: Aligner::new(config.search_margin),
            paginator: Paginator::with_cut_search(config.page_height, config.cut_search),
            state: SessionState::new(RgbImage::new(0, 0)),
            history: UndoHistory::with_capacity(config.undo_capacity),
            debounce: Debounce::default(),
        };
        session.reset(first)?;
        Ok(session)
    }

    /// Throws away pages and history and starts over from `first`.
    pub fn reset(&mut self, first: RgbImage) -> Result<(), SessionError> {
        if first.width() == 0 || first.height() == 0 {
            return Err(SessionError::EmptyFrame);
        }

        self.state = SessionState::new(first);
        self.history.clear();
        self.debounce.reset();
        let (new_pages, _) = self.paginate()?;
        info!(
            width = self.state.composite.width(),
            height = self.state.composite.height(),
            page_height = self.config.page_height,
            new_pages,
            "session started"
        );
        Ok(())
    }

    /// Offers one captured frame. Accepted frames push an undo snapshot before
    /// the state changes.
    pub fn accept_frame(&mut self, frame: &RgbImage, now: Instant) -> Result<TickOutcome, SessionError> {
        if self.debounce.is_blocked(now) {
            return Ok(TickOutcome::Suppressed);
        }
        self.state.composite.check_width(frame.width())?;

        let alignment = self.aligner.find_shift(self.state.composite.image(), frame)?;
        let (shift, error) = (alignment.shift, alignment.error);
        debug!(shift, error, evaluated = alignment.evaluated, "alignment");

        if shift == 0 {
            return Ok(TickOutcome::Unchanged { error });
        }
        if error >= self.config.max_error {
            debug!(shift, error, max_error = self.config.max_error, "frame rejected");
            return Ok(TickOutcome::Rejected { shift, error });
        }

        self.history.push(self.state.clone());

        let strip = imageops::crop_imm(frame, 0, frame.height() - shift, frame.width(), shift).to_image();
        if let Err(err) = self.state.composite.append(&strip) {
            self.history.pop();
            return Err(err.into());
        }
        let (new_pages, cropped) = self.paginate()?;

        info!(
            shift,
            error,
            new_pages,
            pages = self.state.pages.len(),
            pending = self.state.composite.pending_height(),
            "frame appended"
        );
        Ok(TickOutcome::Appended {
            shift,
            error,
            new_pages,
            cropped,
        })
    }

    /// Restores the previous state and opens the debounce window.
    pub fn undo(&mut self, now: Instant) -> UndoOutcome {
        let Some(previous) = self.history.pop() else {
            return UndoOutcome::NothingToUndo;
        };
        self.state = previous;
        self.debounce.trigger(now);
        info!(
            pages = self.state.pages.len(),
            remaining = self.history.len(),
            "undo"
        );
        UndoOutcome::Restored {
            remaining: self.history.len(),
        }
    }

    pub fn can_undo(&self) -> bool {
        !self.history.is_empty()
    }

    pub fn undo_depth(&self) -> usize {
        self.history.len()
    }

    pub fn state(&self) -> &SessionState {
        &self.state
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    pub fn pages(&self) -> &[Page] {
        &self.state.pages
    }

    pub fn pending_tail(&self) -> RgbImage {
        self.state.composite.pending_tail()
    }

    pub fn set_auto_follow(&mut self, follow: bool) {
        self.state.auto_follow = follow;
    }

    /// Drains full pages, then enforces the height cap.
    fn paginate(&mut self) -> Result<(usize, u32), SessionError> {
        let pages = self.paginator.drain(&mut self.state.composite);
        let new_pages = pages.len();
        self.state.pages.extend(pages);

        let cropped = self
            .state
            .composite
            .enforce_cap(self.config.effective_height_cap())?;
        if cropped > 0 {
            debug!(cropped, processed = self.state.composite.processed(), "composite cropped");
        }
        Ok((new_pages, cropped))
    }
}
