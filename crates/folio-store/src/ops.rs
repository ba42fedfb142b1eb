//! The persistence adapter trait.
//!
//! A transactional, key-indexed store: equality queries on indexed fields,
//! results ordered by `order`, single-row writes, and atomic batches.

use async_trait::async_trait;

use folio_types::{BlockId, ChapterId, ChapterNode, ProjectId};

use crate::StoreResult;
use crate::records::{BlockPatch, BlockRecord, ChapterPatch, GeneratedId, NewBlock, NewChapter, WriteOp};

/// Durable storage consumed by the outline and block stores.
///
/// Updates and deletes addressed to a missing id succeed without effect, so
/// background writes racing a delete are harmless.
#[async_trait]
pub trait Persistence: Send + Sync {
    // ========================================================================
    // Outline nodes
    // ========================================================================

    /// All nodes of a project, ordered by `order` (ties by id).
    async fn chapters_for_project(&self, project: ProjectId) -> StoreResult<Vec<ChapterNode>>;

    /// Direct children of `parent` (`None` = roots), ordered by `order`.
    async fn chapters_for_parent(
        &self,
        project: ProjectId,
        parent: Option<ChapterId>,
    ) -> StoreResult<Vec<ChapterNode>>;

    /// Look up one node.
    async fn chapter(&self, id: ChapterId) -> StoreResult<Option<ChapterNode>>;

    /// Insert a node, returning its generated id.
    async fn add_chapter(&self, chapter: NewChapter) -> StoreResult<ChapterId>;

    /// Apply a partial update to a node.
    async fn update_chapter(&self, id: ChapterId, patch: ChapterPatch) -> StoreResult<()>;

    /// Delete a single node (no cascade).
    async fn delete_chapter(&self, id: ChapterId) -> StoreResult<()>;

    // ========================================================================
    // Blocks
    // ========================================================================

    /// All blocks of a chapter, ordered by `order` (ties by id).
    async fn blocks_for_chapter(&self, chapter: ChapterId) -> StoreResult<Vec<BlockRecord>>;

    /// Insert a block, returning its generated id.
    async fn add_block(&self, block: NewBlock) -> StoreResult<BlockId>;

    /// Apply a partial update to a block.
    async fn update_block(&self, id: BlockId, patch: BlockPatch) -> StoreResult<()>;

    /// Delete a single block.
    async fn delete_block(&self, id: BlockId) -> StoreResult<()>;

    /// Delete many blocks at once.
    async fn bulk_delete_blocks(&self, ids: &[BlockId]) -> StoreResult<()>;

    // ========================================================================
    // Batches
    // ========================================================================

    /// Run `ops` atomically: all commit or none do.
    ///
    /// Returns one [`GeneratedId`] per `Add*` op, in batch order.
    async fn transaction(&self, ops: Vec<WriteOp>) -> StoreResult<Vec<GeneratedId>>;
}
