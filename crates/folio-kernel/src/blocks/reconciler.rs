//! Background persistence for the block store.
//!
//! One task per [`BlockStore`](super::BlockStore). Jobs run strictly in the
//! order they were queued. Each job looks its block up by key when it runs
//! and writes whatever the freshest in-memory state holds.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use folio_store::{BlockPatch, GeneratedId, NewBlock, Persistence, StoreError, StoreResult, WriteOp};
use folio_types::{BlockId, ChapterId, ClientKey, TextBlock};

use super::{ActiveChapter, Session};

pub(crate) enum Job {
    /// Switch the session to a chapter (or to nothing).
    Load {
        chapter: Option<ChapterId>,
        reply: oneshot::Sender<()>,
    },
    /// Persist a new block, bumping the stored order of `shifted` blocks.
    Insert {
        key: ClientKey,
        shifted: Vec<ClientKey>,
        reload_after: bool,
    },
    WriteContent {
        key: ClientKey,
    },
    Delete {
        key: ClientKey,
        id: BlockId,
    },
    Merge {
        upper: ClientKey,
        lower: Option<BlockId>,
    },
    /// Rewrite the chapter's stored blocks from memory, then reload.
    Replace {
        chapter: ChapterId,
        reply: oneshot::Sender<()>,
    },
    Flush {
        reply: oneshot::Sender<()>,
    },
}

pub(crate) struct Reconciler {
    store: Arc<dyn Persistence>,
    session: Arc<Mutex<Session>>,
    jobs: mpsc::UnboundedReceiver<Job>,
    backlog: VecDeque<Job>,
    reload_due: bool,
}

impl Reconciler {
    pub fn new(
        store: Arc<dyn Persistence>,
        session: Arc<Mutex<Session>>,
        jobs: mpsc::UnboundedReceiver<Job>,
    ) -> Self {
        Self {
            store,
            session,
            jobs,
            backlog: VecDeque::new(),
            reload_due: false,
        }
    }

    pub async fn run(mut self) {
        loop {
            let job = match self.backlog.pop_front() {
                Some(job) => job,
                None => {
                    self.reload_if_quiet().await;
                    match self.jobs.recv().await {
                        Some(job) => job,
                        None => break,
                    }
                }
            };
            self.handle(job).await;
            while let Ok(job) = self.jobs.try_recv() {
                self.backlog.push_back(job);
            }
        }
        debug!("block reconciler stopped");
    }

    async fn handle(&mut self, job: Job) {
        match job {
            Job::Load { chapter, reply } => {
                self.load(chapter).await;
                let _ = reply.send(());
            }
            Job::Insert {
                key,
                shifted,
                reload_after,
            } => self.insert(key, shifted, reload_after).await,
            Job::WriteContent { key } => self.write_content(key).await,
            Job::Delete { key, id } => {
                let result = self.store.delete_block(id).await;
                self.settle(&[key], result, "delete block");
            }
            Job::Merge { upper, lower } => self.merge(upper, lower).await,
            Job::Replace { chapter, reply } => {
                self.replace(chapter).await;
                let _ = reply.send(());
            }
            Job::Flush { reply } => {
                self.reload_if_quiet().await;
                let _ = reply.send(());
            }
        }
    }

    /// Record the outcome of a write for `keys`.
    fn settle<T>(&self, keys: &[ClientKey], result: StoreResult<T>, what: &str) {
        let mut session = self.session.lock();
        match result {
            Ok(_) => {
                for key in keys {
                    session.unsynced.remove(key);
                }
            }
            Err(err) => {
                warn!(error = %err, blocks = keys.len(), "{what} failed, memory and storage diverge");
                session.unsynced.extend(keys.iter().copied());
            }
        }
    }

    // ------------------------------------------------------------------------

    async fn load(&mut self, chapter: Option<ChapterId>) {
        let loaded = match chapter {
            Some(id) => self.fetch_episode(id).await,
            None => Ok(None),
        };

        let mut session = self.session.lock();
        session.history.clear();
        session.pending_inserts.clear();
        session.unsynced.clear();
        session.mutation_seq += 1;
        self.reload_due = false;

        match loaded {
            Ok(Some((active, blocks))) => {
                info!(chapter = %active.id, blocks = blocks.len(), "chapter selected");
                session.chapter = Some(active);
                session.blocks = blocks;
            }
            Ok(None) => {
                session.chapter = None;
                session.blocks.clear();
            }
            Err(err) => {
                warn!(chapter = ?chapter, error = %err, "failed to load chapter blocks");
                session.chapter = None;
                session.blocks.clear();
            }
        }
    }

    async fn fetch_episode(&self, id: ChapterId) -> StoreResult<Option<(ActiveChapter, Vec<TextBlock>)>> {
        let Some(node) = self.store.chapter(id).await? else {
            debug!(chapter = %id, "no such chapter");
            return Ok(None);
        };
        if !node.is_episode() {
            debug!(chapter = %id, kind = %node.kind, "only episodes carry blocks");
            return Ok(None);
        }

        let blocks = self
            .store
            .blocks_for_chapter(id)
            .await?
            .into_iter()
            .map(|r| TextBlock {
                id: Some(r.id),
                client_key: ClientKey::new(),
                chapter_id: r.chapter_id,
                project_id: r.project_id,
                content: r.content,
                order: r.order,
            })
            .collect();
        let active = ActiveChapter {
            id,
            project: node.project_id,
        };
        Ok(Some((active, blocks)))
    }

    async fn insert(&mut self, key: ClientKey, shifted: Vec<ClientKey>, reload_after: bool) {
        let (submitted, mut ops) = {
            let mut session = self.session.lock();
            let Some(block) = session.find(key).cloned() else {
                // Removed before it was ever written.
                session.pending_inserts.remove(&key);
                debug!(%key, "insert skipped, block already gone");
                return;
            };
            let shifts: Vec<WriteOp> = shifted
                .iter()
                .filter_map(|k| session.find(*k))
                .filter_map(|b| Some(WriteOp::UpdateBlock(b.id?, BlockPatch::order(b.order))))
                .collect();
            (block, shifts)
        };

        ops.push(WriteOp::AddBlock(NewBlock {
            chapter_id: submitted.chapter_id,
            project_id: submitted.project_id,
            content: submitted.content.clone(),
            order: submitted.order,
        }));
        let result = self
            .store
            .transaction(ops)
            .await
            .and_then(|generated| last_block_id(&generated));

        let id = match result {
            Ok(id) => id,
            Err(err) => {
                self.session.lock().pending_inserts.remove(&key);
                self.settle(&[key], Err::<(), _>(err), "insert block");
                return;
            }
        };

        // The caller may have edited, moved, or deleted the block meanwhile.
        let fixup = {
            let mut session = self.session.lock();
            session.pending_inserts.remove(&key);
            session.unsynced.remove(&key);
            match session.find_mut(key) {
                Some(block) => {
                    block.id = Some(id);
                    (block.content != submitted.content || block.order != submitted.order).then(|| {
                        WriteOp::UpdateBlock(
                            id,
                            BlockPatch {
                                content: Some(block.content.clone()),
                                order: Some(block.order),
                            },
                        )
                    })
                }
                None => Some(WriteOp::DeleteBlock(id)),
            }
        };
        debug!(%key, %id, "block id reconciled");

        if let Some(op) = fixup {
            let result = self.store.transaction(vec![op]).await;
            self.settle(&[key], result, "flush block after insert");
        }
        if reload_after {
            self.reload_due = true;
        }
    }

    async fn write_content(&mut self, key: ClientKey) {
        let target = {
            let session = self.session.lock();
            session
                .find(key)
                .and_then(|b| Some((b.id?, b.content.clone())))
        };
        // Gone, or not persisted yet: a later job writes it.
        let Some((id, content)) = target else {
            return;
        };
        let result = self.store.update_block(id, BlockPatch::content(content)).await;
        self.settle(&[key], result, "write block content");
    }

    async fn merge(&mut self, upper: ClientKey, lower: Option<BlockId>) {
        let mut ops = Vec::with_capacity(2);
        {
            let session = self.session.lock();
            if let Some((id, content)) = session
                .find(upper)
                .and_then(|b| Some((b.id?, b.content.clone())))
            {
                ops.push(WriteOp::UpdateBlock(id, BlockPatch::content(content)));
            }
        }
        if let Some(id) = lower {
            ops.push(WriteOp::DeleteBlock(id));
        }
        if ops.is_empty() {
            return;
        }
        let result = self.store.transaction(ops).await;
        self.settle(&[upper], result, "merge blocks");
    }

    async fn replace(&mut self, chapter: ChapterId) {
        let submitted: Vec<(ClientKey, NewBlock)> = {
            let session = self.session.lock();
            if session.chapter.map(|c| c.id) != Some(chapter) {
                return;
            }
            session
                .blocks
                .iter()
                // A pending insert writes its own row later.
                .filter(|b| !session.pending_inserts.contains(&b.client_key))
                .map(|b| {
                    (
                        b.client_key,
                        NewBlock {
                            chapter_id: b.chapter_id,
                            project_id: b.project_id,
                            content: b.content.clone(),
                            order: b.order,
                        },
                    )
                })
                .collect()
        };
        let keys: Vec<ClientKey> = submitted.iter().map(|(k, _)| *k).collect();

        let mut ops = Vec::with_capacity(submitted.len() + 1);
        ops.push(WriteOp::DeleteChapterBlocks(chapter));
        ops.extend(submitted.iter().map(|(_, b)| WriteOp::AddBlock(b.clone())));

        let generated = match self.store.transaction(ops).await {
            Ok(generated) => generated,
            Err(err) => {
                self.settle(&keys, Err::<(), _>(err), "replace chapter blocks");
                return;
            }
        };

        let fixups: Vec<WriteOp> = {
            let mut session = self.session.lock();
            let ids = generated.into_iter().filter_map(GeneratedId::block);
            submitted
                .iter()
                .zip(ids)
                .filter_map(|((key, sent), id)| {
                    session.unsynced.remove(key);
                    let Some(block) = session.find_mut(*key) else {
                        return Some(WriteOp::DeleteBlock(id));
                    };
                    block.id = Some(id);
                    (block.content != sent.content || block.order != sent.order).then(|| {
                        WriteOp::UpdateBlock(
                            id,
                            BlockPatch {
                                content: Some(block.content.clone()),
                                order: Some(block.order),
                            },
                        )
                    })
                })
                .collect()
        };
        info!(%chapter, blocks = keys.len(), "chapter blocks rewritten");

        if !fixups.is_empty() {
            let result = self.store.transaction(fixups).await;
            self.settle(&keys, result, "flush blocks after replace");
        }
        self.reload_due = true;
        self.reload_if_quiet().await;
    }

    /// Reload the chapter from storage if one is due and nothing is in flight.
    ///
    /// Skipped while jobs are queued or a block still lacks its id. Applied
    /// only if no mutation happened during the read. Rows keep the key of
    /// the in-memory block with the same id.
    async fn reload_if_quiet(&mut self) {
        if !self.reload_due {
            return;
        }

        let (active, seq) = {
            let session = self.session.lock();
            while let Ok(job) = self.jobs.try_recv() {
                self.backlog.push_back(job);
            }
            if !self.backlog.is_empty() {
                return;
            }
            let Some(active) = session.chapter else {
                self.reload_due = false;
                return;
            };
            if !session.pending_inserts.is_empty() {
                return;
            }
            if session.blocks.iter().any(|b| b.id.is_none()) {
                debug!(chapter = %active.id, "reload skipped, unsynced blocks in memory");
                self.reload_due = false;
                return;
            }
            (active, session.mutation_seq)
        };

        let records = match self.store.blocks_for_chapter(active.id).await {
            Ok(records) => records,
            Err(err) => {
                warn!(chapter = %active.id, error = %err, "reload failed");
                self.reload_due = false;
                return;
            }
        };

        let mut session = self.session.lock();
        if session.mutation_seq != seq || session.chapter != Some(active) {
            debug!(chapter = %active.id, "reload raced a mutation, retrying later");
            return;
        }
        let keys: HashMap<BlockId, ClientKey> = session
            .blocks
            .iter()
            .filter_map(|b| Some((b.id?, b.client_key)))
            .collect();
        session.blocks = records
            .into_iter()
            .map(|r| TextBlock {
                id: Some(r.id),
                client_key: keys.get(&r.id).copied().unwrap_or_default(),
                chapter_id: r.chapter_id,
                project_id: r.project_id,
                content: r.content,
                order: r.order,
            })
            .collect();
        self.reload_due = false;
        debug!(chapter = %active.id, blocks = session.blocks.len(), "chapter reloaded");
    }
}

fn last_block_id(generated: &[GeneratedId]) -> StoreResult<BlockId> {
    generated
        .iter()
        .rev()
        .find_map(|g| g.block())
        .ok_or_else(|| StoreError::Unavailable("no block id generated".into()))
}
