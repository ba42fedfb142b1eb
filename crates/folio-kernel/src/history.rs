//! Undo/redo history for one chapter session.
//!
//! Both stacks hold whole-chapter [`Snapshot`]s and are bounded; the oldest
//! entry is evicted on overflow. Structural operations push unconditionally.
//! Text edits go through [`History::record_edit`], which folds a rapid run of
//! edits to the same block into the snapshot taken before the first of them.
//!
//! The coalescing cursor (last edited key, last push time) is per instance,
//! so independent sessions never see each other's edits.

use std::collections::VecDeque;
use std::time::Duration;

use tokio::time::Instant;

use folio_types::{ClientKey, TextBlock};

/// A full ordered copy of one chapter's blocks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Snapshot {
    blocks: Vec<TextBlock>,
}

impl Snapshot {
    /// Capture the given sequence.
    pub fn capture(blocks: &[TextBlock]) -> Self {
        Self {
            blocks: blocks.to_vec(),
        }
    }

    pub fn blocks(&self) -> &[TextBlock] {
        &self.blocks
    }

    pub fn into_blocks(self) -> Vec<TextBlock> {
        self.blocks
    }

    /// Block contents in order.
    pub fn contents(&self) -> Vec<&str> {
        self.blocks.iter().map(|b| b.content.as_str()).collect()
    }
}

/// Bounded undo/redo stacks with edit coalescing.
#[derive(Debug)]
pub struct History {
    undo: VecDeque<Snapshot>,
    redo: VecDeque<Snapshot>,
    depth: usize,
    coalesce_window: Duration,
    last_key: Option<ClientKey>,
    last_push: Option<Instant>,
}

impl History {
    pub fn new(depth: usize, coalesce_window: Duration) -> Self {
        Self {
            undo: VecDeque::new(),
            redo: VecDeque::new(),
            depth: depth.max(1),
            coalesce_window,
            last_key: None,
            last_push: None,
        }
    }

    /// Push unconditionally (structural operations).
    ///
    /// Clears redo and resets the edit cursor, so the next text edit always
    /// starts a new undo step.
    pub fn push(&mut self, snapshot: Snapshot, now: Instant) {
        self.push_undo(snapshot);
        self.redo.clear();
        self.last_key = None;
        self.last_push = Some(now);
    }

    /// Record a text edit to `key`, pushing `snapshot()` only when the edit
    /// does not continue the previous one.
    ///
    /// A push happens when the previous edit targeted another block or when
    /// more than the coalescing window has passed since the last push.
    /// A suppressed push still clears redo. Returns whether a push happened.
    pub fn record_edit(
        &mut self,
        key: ClientKey,
        now: Instant,
        snapshot: impl FnOnce() -> Snapshot,
    ) -> bool {
        let same_key = self.last_key == Some(key);
        let within_window = self
            .last_push
            .is_some_and(|at| now.saturating_duration_since(at) <= self.coalesce_window);

        if same_key && within_window {
            self.redo.clear();
            return false;
        }

        self.push_undo(snapshot());
        self.redo.clear();
        self.last_key = Some(key);
        self.last_push = Some(now);
        true
    }

    /// Pop the newest undo entry, parking `current` on the redo stack.
    pub fn undo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let previous = self.undo.pop_back()?;
        Self::push_bounded(&mut self.redo, current, self.depth);
        self.reset_cursor();
        Some(previous)
    }

    /// Pop the newest redo entry, parking `current` on the undo stack.
    pub fn redo(&mut self, current: Snapshot) -> Option<Snapshot> {
        let next = self.redo.pop_back()?;
        Self::push_bounded(&mut self.undo, current, self.depth);
        self.reset_cursor();
        Some(next)
    }

    /// Drop both stacks and the edit cursor (chapter switch).
    pub fn clear(&mut self) {
        self.undo.clear();
        self.redo.clear();
        self.reset_cursor();
    }

    pub fn can_undo(&self) -> bool {
        !self.undo.is_empty()
    }

    pub fn can_redo(&self) -> bool {
        !self.redo.is_empty()
    }

    /// `(undo, redo)` stack depths.
    pub fn len(&self) -> (usize, usize) {
        (self.undo.len(), self.redo.len())
    }

    fn push_undo(&mut self, snapshot: Snapshot) {
        Self::push_bounded(&mut self.undo, snapshot, self.depth);
    }

    fn push_bounded(stack: &mut VecDeque<Snapshot>, snapshot: Snapshot, depth: usize) {
        stack.push_back(snapshot);
        while stack.len() > depth {
            stack.pop_front();
        }
    }

    fn reset_cursor(&mut self) {
        self.last_key = None;
        self.last_push = None;
    }
}
