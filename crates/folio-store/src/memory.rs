//! In-memory persistence backend.
//!
//! Used for tests and throwaway sessions. All data is lost when dropped.
//! Batches are applied to a scratch copy of the tables and swapped in on
//! success, which makes them atomic.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use folio_types::{BlockId, ChapterId, ChapterNode, ProjectId};

use crate::ops::Persistence;
use crate::records::{BlockPatch, BlockRecord, ChapterPatch, GeneratedId, NewBlock, NewChapter, WriteOp};
use crate::{StoreError, StoreResult};

#[derive(Debug, Clone, Default)]
struct Tables {
    chapters: BTreeMap<ChapterId, ChapterNode>,
    blocks: BTreeMap<BlockId, BlockRecord>,
    next_chapter: i64,
    next_block: i64,
}

impl Tables {
    fn apply(&mut self, op: &WriteOp) -> Option<GeneratedId> {
        match op {
            WriteOp::AddChapter(chapter) => Some(GeneratedId::Chapter(self.add_chapter(chapter))),
            WriteOp::UpdateChapter(id, patch) => {
                self.update_chapter(*id, patch);
                None
            }
            WriteOp::DeleteChapter(id) => {
                self.chapters.remove(id);
                None
            }
            WriteOp::AddBlock(block) => Some(GeneratedId::Block(self.add_block(block))),
            WriteOp::UpdateBlock(id, patch) => {
                self.update_block(*id, patch);
                None
            }
            WriteOp::DeleteBlock(id) => {
                self.blocks.remove(id);
                None
            }
            WriteOp::DeleteChapterBlocks(chapter) => {
                self.blocks.retain(|_, b| b.chapter_id != *chapter);
                None
            }
        }
    }

    fn add_chapter(&mut self, chapter: &NewChapter) -> ChapterId {
        self.next_chapter += 1;
        let id = ChapterId::new(self.next_chapter);
        self.chapters.insert(
            id,
            ChapterNode {
                id,
                project_id: chapter.project_id,
                parent_id: chapter.parent_id,
                title: chapter.title.clone(),
                kind: chapter.kind,
                order: chapter.order,
                created_at: chapter.created_at,
            },
        );
        id
    }

    fn update_chapter(&mut self, id: ChapterId, patch: &ChapterPatch) {
        let Some(node) = self.chapters.get_mut(&id) else {
            return;
        };
        if let Some(title) = &patch.title {
            node.title = title.clone();
        }
        if let Some(parent_id) = patch.parent_id {
            node.parent_id = parent_id;
        }
        if let Some(order) = patch.order {
            node.order = order;
        }
    }

    fn add_block(&mut self, block: &NewBlock) -> BlockId {
        self.next_block += 1;
        let id = BlockId::new(self.next_block);
        self.blocks.insert(
            id,
            BlockRecord {
                id,
                chapter_id: block.chapter_id,
                project_id: block.project_id,
                content: block.content.clone(),
                order: block.order,
            },
        );
        id
    }

    fn update_block(&mut self, id: BlockId, patch: &BlockPatch) {
        let Some(block) = self.blocks.get_mut(&id) else {
            return;
        };
        if let Some(content) = &patch.content {
            block.content = content.clone();
        }
        if let Some(order) = patch.order {
            block.order = order;
        }
    }

    fn chapters_where(&self, pred: impl Fn(&ChapterNode) -> bool) -> Vec<ChapterNode> {
        let mut nodes: Vec<_> = self.chapters.values().filter(|c| pred(c)).cloned().collect();
        nodes.sort_by_key(|c| (c.order, c.id));
        nodes
    }
}

/// In-memory persistence backend.
///
/// Thread-safe via an internal mutex. `set_fail_writes(true)` makes every
/// write return [`StoreError::Unavailable`], for exercising fault handling.
#[derive(Debug, Default)]
pub struct MemoryStore {
    tables: Mutex<Tables>,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    /// Create a new empty store.
    pub fn new() -> Self {
        Self::default()
    }

    /// Toggle write fault injection.
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Total number of stored blocks across all chapters.
    pub fn block_count(&self) -> usize {
        self.tables.lock().blocks.len()
    }

    /// Total number of stored outline nodes across all projects.
    pub fn chapter_count(&self) -> usize {
        self.tables.lock().chapters.len()
    }

    /// Chapter ids referenced by stored blocks.
    pub fn block_owners(&self) -> Vec<ChapterId> {
        let tables = self.tables.lock();
        let mut owners: Vec<_> = tables.blocks.values().map(|b| b.chapter_id).collect();
        owners.sort();
        owners.dedup();
        owners
    }

    fn check_writable(&self) -> StoreResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable("write fault injected".into()));
        }
        Ok(())
    }

    fn write(&self, op: WriteOp) -> StoreResult<Option<GeneratedId>> {
        self.check_writable()?;
        Ok(self.tables.lock().apply(&op))
    }
}

#[async_trait]
impl Persistence for MemoryStore {
    async fn chapters_for_project(&self, project: ProjectId) -> StoreResult<Vec<ChapterNode>> {
        Ok(self.tables.lock().chapters_where(|c| c.project_id == project))
    }

    async fn chapters_for_parent(
        &self,
        project: ProjectId,
        parent: Option<ChapterId>,
    ) -> StoreResult<Vec<ChapterNode>> {
        Ok(self
            .tables
            .lock()
            .chapters_where(|c| c.project_id == project && c.parent_id == parent))
    }

    async fn chapter(&self, id: ChapterId) -> StoreResult<Option<ChapterNode>> {
        Ok(self.tables.lock().chapters.get(&id).cloned())
    }

    async fn add_chapter(&self, chapter: NewChapter) -> StoreResult<ChapterId> {
        let generated = self.write(WriteOp::AddChapter(chapter))?;
        generated
            .and_then(GeneratedId::chapter)
            .ok_or_else(|| StoreError::Unavailable("no id generated".into()))
    }

    async fn update_chapter(&self, id: ChapterId, patch: ChapterPatch) -> StoreResult<()> {
        self.write(WriteOp::UpdateChapter(id, patch)).map(|_| ())
    }

    async fn delete_chapter(&self, id: ChapterId) -> StoreResult<()> {
        self.write(WriteOp::DeleteChapter(id)).map(|_| ())
    }

    async fn blocks_for_chapter(&self, chapter: ChapterId) -> StoreResult<Vec<BlockRecord>> {
        let tables = self.tables.lock();
        let mut blocks: Vec<_> = tables
            .blocks
            .values()
            .filter(|b| b.chapter_id == chapter)
            .cloned()
            .collect();
        blocks.sort_by_key(|b| (b.order, b.id));
        Ok(blocks)
    }

    async fn add_block(&self, block: NewBlock) -> StoreResult<BlockId> {
        let generated = self.write(WriteOp::AddBlock(block))?;
        generated
            .and_then(GeneratedId::block)
            .ok_or_else(|| StoreError::Unavailable("no id generated".into()))
    }

    async fn update_block(&self, id: BlockId, patch: BlockPatch) -> StoreResult<()> {
        self.write(WriteOp::UpdateBlock(id, patch)).map(|_| ())
    }

    async fn delete_block(&self, id: BlockId) -> StoreResult<()> {
        self.write(WriteOp::DeleteBlock(id)).map(|_| ())
    }

    async fn bulk_delete_blocks(&self, ids: &[BlockId]) -> StoreResult<()> {
        self.check_writable()?;
        let mut tables = self.tables.lock();
        for id in ids {
            tables.blocks.remove(id);
        }
        Ok(())
    }

    async fn transaction(&self, ops: Vec<WriteOp>) -> StoreResult<Vec<GeneratedId>> {
        self.check_writable()?;
        let mut tables = self.tables.lock();
        let mut scratch = tables.clone();
        let generated = ops.iter().filter_map(|op| scratch.apply(op)).collect();
        *tables = scratch;
        Ok(generated)
    }
}
