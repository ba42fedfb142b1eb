//! Block store: the ordered text blocks of the selected episode.
//!
//! Mutations are optimistic. Each public operation updates the in-memory
//! sequence under the session lock and returns; the durable write is queued
//! as a [`Job`] for the chapter's reconciler task, which merges generated ids
//! back by [`ClientKey`].
//!
//! ```text
//!  caller ──► BlockStore (lock, mutate, enqueue) ──► mpsc ──► Reconciler ──► Persistence
//!                 ▲                                              │
//!                 └──────────── ids merged by ClientKey ◄────────┘
//! ```
//!
//! Jobs are queued while the session lock is held, so the reconciler can
//! tell from the mutation counter whether anything changed while it was
//! reading from storage.

mod reconciler;

use std::collections::HashSet;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, error};

use folio_store::Persistence;
use folio_types::{ChapterId, ClientKey, ProjectId, TextBlock};

use crate::config::EngineConfig;
use crate::history::{History, Snapshot};
use crate::transform::{self, DialogueMarkers, Slot, SpacingMode};

use reconciler::{Job, Reconciler};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub(crate) struct ActiveChapter {
    pub id: ChapterId,
    pub project: ProjectId,
}

/// In-memory state of the selected chapter.
pub(crate) struct Session {
    pub chapter: Option<ActiveChapter>,
    pub blocks: Vec<TextBlock>,
    pub history: History,
    /// Keys whose `Insert` job has not completed yet.
    pub pending_inserts: HashSet<ClientKey>,
    /// Keys whose last durable write failed.
    pub unsynced: HashSet<ClientKey>,
    /// Bumped on every in-memory mutation.
    pub mutation_seq: u64,
}

impl Session {
    fn new(history: History) -> Self {
        Self {
            chapter: None,
            blocks: Vec::new(),
            history,
            pending_inserts: HashSet::new(),
            unsynced: HashSet::new(),
            mutation_seq: 0,
        }
    }

    pub fn position(&self, key: ClientKey) -> Option<usize> {
        self.blocks.iter().position(|b| b.client_key == key)
    }

    pub fn find(&self, key: ClientKey) -> Option<&TextBlock> {
        self.blocks.iter().find(|b| b.client_key == key)
    }

    pub fn find_mut(&mut self, key: ClientKey) -> Option<&mut TextBlock> {
        self.blocks.iter_mut().find(|b| b.client_key == key)
    }

    fn push_history(&mut self) {
        self.history.push(Snapshot::capture(&self.blocks), Instant::now());
    }

    /// Bump `order` of every block at or past `from`, except `skip`.
    fn shift_from(&mut self, from: i64, skip: ClientKey) -> Vec<ClientKey> {
        self.blocks
            .iter_mut()
            .filter(|b| b.client_key != skip && b.order >= from)
            .map(|b| {
                b.order += 1;
                b.client_key
            })
            .collect()
    }
}

/// Block sequence of one selected episode, with undo/redo.
///
/// Must be created inside a Tokio runtime: construction spawns the
/// reconciler task, which stops when the store is dropped.
pub struct BlockStore {
    session: Arc<Mutex<Session>>,
    jobs: mpsc::UnboundedSender<Job>,
    markers: DialogueMarkers,
}

impl BlockStore {
    pub fn new(store: Arc<dyn Persistence>, config: &EngineConfig) -> Self {
        let history = History::new(config.history_depth, config.coalesce_window());
        let session = Arc::new(Mutex::new(Session::new(history)));
        let (jobs, rx) = mpsc::unbounded_channel();

        tokio::spawn(Reconciler::new(store, Arc::clone(&session), rx).run());

        Self {
            session,
            jobs,
            markers: DialogueMarkers::new(&config.dialogue_open, &config.dialogue_close),
        }
    }

    // ========================================================================
    // Selection
    // ========================================================================

    /// Switch to `chapter`: history is cleared and its blocks are loaded.
    ///
    /// Anything other than an existing Episode leaves nothing selected.
    pub async fn select_chapter(&self, chapter: ChapterId) {
        self.load(Some(chapter)).await;
    }

    /// Drop the current selection.
    pub async fn deselect(&self) {
        self.load(None).await;
    }

    async fn load(&self, chapter: Option<ChapterId>) {
        let reply = {
            let mut session = self.session.lock();
            session.history.clear();
            let (tx, rx) = oneshot::channel();
            self.send(Job::Load { chapter, reply: tx });
            rx
        };
        let _ = reply.await;
    }

    /// Resolves once every queued write has run and any due reload has
    /// been applied.
    pub async fn flush(&self) {
        let reply = {
            let _session = self.session.lock();
            let (tx, rx) = oneshot::channel();
            self.send(Job::Flush { reply: tx });
            rx
        };
        let _ = reply.await;
    }

    // ========================================================================
    // Reads
    // ========================================================================

    pub fn active_chapter(&self) -> Option<ChapterId> {
        self.session.lock().chapter.map(|c| c.id)
    }

    pub fn blocks(&self) -> Vec<TextBlock> {
        self.session.lock().blocks.clone()
    }

    pub fn contents(&self) -> Vec<String> {
        self.session.lock().blocks.iter().map(|b| b.content.clone()).collect()
    }

    pub fn block(&self, key: ClientKey) -> Option<TextBlock> {
        self.session.lock().find(key).cloned()
    }

    /// The chapter text, blocks joined by newlines.
    pub fn manuscript(&self) -> String {
        let session = self.session.lock();
        let parts: Vec<&str> = session.blocks.iter().map(|b| b.content.as_str()).collect();
        parts.join("\n")
    }

    pub fn can_undo(&self) -> bool {
        self.session.lock().history.can_undo()
    }

    pub fn can_redo(&self) -> bool {
        self.session.lock().history.can_redo()
    }

    /// `(undo, redo)` stack depths.
    pub fn history_len(&self) -> (usize, usize) {
        self.session.lock().history.len()
    }

    /// Blocks whose last durable write failed. In-memory state is kept;
    /// a key leaves the set on its next successful write.
    pub fn unsynced(&self) -> HashSet<ClientKey> {
        self.session.lock().unsynced.clone()
    }

    // ========================================================================
    // Optimistic mutations
    // ========================================================================

    /// Insert a block and return its key before anything is written.
    ///
    /// Placed after `after_key` if it is present; otherwise before the first
    /// block whose order exceeds `after_order`; otherwise at the end.
    pub fn insert_block(
        &self,
        content: impl Into<String>,
        after_key: Option<ClientKey>,
        after_order: Option<i64>,
    ) -> Option<ClientKey> {
        let mut session = self.session.lock();
        let active = session.chapter?;
        session.push_history();

        let index = after_key
            .and_then(|k| session.position(k).map(|i| i + 1))
            .or_else(|| after_order.and_then(|o| session.blocks.iter().position(|b| b.order > o)))
            .unwrap_or(session.blocks.len());
        let order = match index {
            0 => 0,
            i => session.blocks[i - 1].order + 1,
        };

        let block = TextBlock::pending(active.id, active.project, content, order);
        let key = block.client_key;
        let shifted = session.shift_from(order, key);
        session.blocks.insert(index, block);
        session.pending_inserts.insert(key);
        session.mutation_seq += 1;

        debug!(%key, index, order, "block inserted");
        self.send(Job::Insert {
            key,
            shifted,
            reload_after: false,
        });
        Some(key)
    }

    /// Replace a block's content. Rapid edits to one block share an undo step.
    pub fn update_block(&self, key: ClientKey, content: impl Into<String>) {
        let content = content.into();
        let mut guard = self.session.lock();
        let session = &mut *guard;
        let Some(index) = session.position(key) else {
            return;
        };
        if session.blocks[index].content == content {
            return;
        }

        let blocks = &session.blocks;
        session
            .history
            .record_edit(key, Instant::now(), || Snapshot::capture(blocks));

        let block = &mut session.blocks[index];
        block.content = content;
        let persisted = block.is_persisted();
        session.mutation_seq += 1;

        // Without an id, the pending insert (or replace) writes the latest content.
        if persisted {
            self.send(Job::WriteContent { key });
        }
    }

    /// Clone a block directly below itself. Returns the clone's key.
    pub fn duplicate_block(&self, key: ClientKey) -> Option<ClientKey> {
        let mut session = self.session.lock();
        let index = session.position(key)?;
        session.push_history();

        let source = &session.blocks[index];
        let order = source.order + 1;
        let block = TextBlock::pending(source.chapter_id, source.project_id, source.content.clone(), order);
        let copy = block.client_key;
        let shifted = session.shift_from(order, copy);
        session.blocks.insert(index + 1, block);
        session.pending_inserts.insert(copy);
        session.mutation_seq += 1;

        debug!(source = %key, %copy, "block duplicated");
        self.send(Job::Insert {
            key: copy,
            shifted,
            reload_after: true,
        });
        Some(copy)
    }

    pub fn delete_block(&self, key: ClientKey) {
        let mut session = self.session.lock();
        let Some(index) = session.position(key) else {
            return;
        };
        session.push_history();
        let removed = session.blocks.remove(index);
        session.mutation_seq += 1;

        debug!(%key, "block deleted");
        if let Some(id) = removed.id {
            self.send(Job::Delete { key, id });
        }
    }

    /// Append `lower`'s content to `upper` (newline-separated) and drop `lower`.
    pub fn merge_blocks(&self, upper: ClientKey, lower: ClientKey) {
        let mut session = self.session.lock();
        if upper == lower {
            return;
        }
        let (Some(upper_at), Some(lower_at)) = (session.position(upper), session.position(lower)) else {
            return;
        };
        session.push_history();

        let lower_block = session.blocks.remove(lower_at);
        let upper_at = if lower_at < upper_at { upper_at - 1 } else { upper_at };
        let merged = &mut session.blocks[upper_at];
        merged.content = format!("{}\n{}", merged.content, lower_block.content);
        session.mutation_seq += 1;

        debug!(%upper, %lower, "blocks merged");
        self.send(Job::Merge {
            upper,
            lower: lower_block.id,
        });
    }

    // ========================================================================
    // Bulk transforms
    // ========================================================================

    /// Put an empty block between every two adjacent non-empty blocks.
    pub async fn insert_blank_lines_between(&self) -> bool {
        self.apply_plan("insert_blank_lines_between", |c| transform::blank_lines_between(c))
            .await
    }

    pub async fn delete_empty_blocks(&self) -> bool {
        self.apply_plan("delete_empty_blocks", |c| transform::without_empty(c))
            .await
    }

    pub async fn delete_dialogue_blocks(&self) -> bool {
        let markers = self.markers.clone();
        self.apply_plan("delete_dialogue_blocks", move |c| transform::without_dialogue(c, &markers))
            .await
    }

    /// Deletes everything that is not dialogue, empty blocks included.
    pub async fn delete_narrative_blocks(&self) -> bool {
        let markers = self.markers.clone();
        self.apply_plan("delete_narrative_blocks", move |c| transform::without_narrative(c, &markers))
            .await
    }

    pub async fn format_dialogue_spacing(&self, mode: SpacingMode) -> bool {
        let markers = self.markers.clone();
        self.apply_plan("format_dialogue_spacing", move |c| transform::dialogue_spacing(c, &markers, mode))
            .await
    }

    /// Apply a transform plan in memory, then rewrite the chapter in storage.
    /// Returns false when there was nothing to change.
    async fn apply_plan(&self, name: &str, plan: impl FnOnce(&[&str]) -> Vec<Slot>) -> bool {
        let reply = {
            let mut guard = self.session.lock();
            let session = &mut *guard;
            let Some(active) = session.chapter else {
                return false;
            };

            let slots = {
                let contents: Vec<&str> = session.blocks.iter().map(|b| b.content.as_str()).collect();
                plan(&contents)
            };
            let unchanged = slots.len() == session.blocks.len()
                && slots.iter().enumerate().all(|(i, slot)| *slot == Slot::Keep(i));
            if unchanged {
                return false;
            }

            session.push_history();
            let next: Vec<TextBlock> = slots
                .iter()
                .enumerate()
                .map(|(order, slot)| {
                    let mut block = match slot {
                        Slot::Keep(i) => session.blocks[*i].clone(),
                        Slot::Blank => TextBlock::pending(active.id, active.project, "", 0),
                    };
                    // The replace job assigns fresh ids.
                    block.id = None;
                    block.order = order as i64;
                    block
                })
                .collect();
            debug!(transform = name, before = session.blocks.len(), after = next.len(), "bulk transform");
            session.blocks = next;
            session.mutation_seq += 1;

            let (tx, rx) = oneshot::channel();
            self.send(Job::Replace {
                chapter: active.id,
                reply: tx,
            });
            rx
        };
        let _ = reply.await;
        true
    }

    // ========================================================================
    // History
    // ========================================================================

    /// Restore the previous snapshot. Returns false if there is none.
    pub async fn undo(&self) -> bool {
        self.restore(true).await
    }

    /// Re-apply the snapshot undone last. Returns false if there is none.
    pub async fn redo(&self) -> bool {
        self.restore(false).await
    }

    async fn restore(&self, undo: bool) -> bool {
        let reply = {
            let mut guard = self.session.lock();
            let session = &mut *guard;
            let Some(active) = session.chapter else {
                return false;
            };

            let current = Snapshot::capture(&session.blocks);
            let popped = if undo {
                session.history.undo(current)
            } else {
                session.history.redo(current)
            };
            let Some(snapshot) = popped else {
                return false;
            };

            session.blocks = snapshot
                .into_blocks()
                .into_iter()
                .map(|mut b| {
                    b.id = None;
                    b
                })
                .collect();
            session.mutation_seq += 1;
            debug!(undo, blocks = session.blocks.len(), "history snapshot restored");

            let (tx, rx) = oneshot::channel();
            self.send(Job::Replace {
                chapter: active.id,
                reply: tx,
            });
            rx
        };
        let _ = reply.await;
        true
    }

    /// Queue a job. Callers hold the session lock.
    fn send(&self, job: Job) {
        if self.jobs.send(job).is_err() {
            error!("block reconciler has stopped, write dropped");
        }
    }
}
