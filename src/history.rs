//! Undo history.
//! Fixed-capacity stack of full session snapshots plus the debounce that blocks
//! captures right after an undo, so repeated undos don't re-capture the frame
//! that was just thrown away.

use std::collections::VecDeque;
use std::time::{Duration, Instant};

pub const UNDO_CAPACITY: usize = 30;
pub const UNDO_DEBOUNCE: Duration = Duration::from_millis(500);

#[derive(Debug, Clone)]
pub struct UndoHistory<S> {
    entries: VecDeque<S>,
    capacity: usize,
}

impl<S> Default for UndoHistory<S> {
    fn default() -> Self {
        Self::with_capacity(UNDO_CAPACITY)
    }
}

impl<S> UndoHistory<S> {
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: VecDeque::with_capacity(capacity + 1),
            capacity,
        }
    }

    /// Stores a snapshot. Drops the oldest one once over capacity.
    pub fn push(&mut self, state: S) {
        self.entries.push_back(state);
        while self.entries.len() > self.capacity {
            self.entries.pop_front();
        }
    }

    /// Most recent snapshot, or `None` when there is nothing to undo.
    pub fn pop(&mut self) -> Option<S> {
        self.entries.pop_back()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

/// Remembers the last undo and blocks captures for a short window after it.
#[derive(Debug, Clone, Copy)]
pub struct Debounce {
    window: Duration,
    last: Option<Instant>,
}

impl Default for Debounce {
    fn default() -> Self {
        Self::new(UNDO_DEBOUNCE)
    }
}

impl Debounce {
    pub fn new(window: Duration) -> Self {
        Self { window, last: None }
    }

    pub fn trigger(&mut self, now: Instant) {
        self.last = Some(now);
    }

    pub fn is_blocked(&self, now: Instant) -> bool {
        self.last
            .is_some_and(|last| now.saturating_duration_since(last) < self.window)
    }

    pub fn reset(&mut self) {
        self.last = None;
    }
}
