//! Row shapes, partial updates, and batched write operations.

use folio_types::{BlockId, ChapterId, NodeKind, ProjectId};

/// A stored block row.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BlockRecord {
    pub id: BlockId,
    pub chapter_id: ChapterId,
    pub project_id: ProjectId,
    pub content: String,
    pub order: i64,
}

/// Fields for inserting an outline node. The id is generated by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewChapter {
    pub project_id: ProjectId,
    pub parent_id: Option<ChapterId>,
    pub title: String,
    pub kind: NodeKind,
    pub order: i64,
    pub created_at: u64,
}

/// Fields for inserting a block. The id is generated by the store.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NewBlock {
    pub chapter_id: ChapterId,
    pub project_id: ProjectId,
    pub content: String,
    pub order: i64,
}

/// Partial update of an outline node. `None` leaves a field untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ChapterPatch {
    pub title: Option<String>,
    /// `Some(None)` detaches the node to the root level.
    pub parent_id: Option<Option<ChapterId>>,
    pub order: Option<i64>,
}

impl ChapterPatch {
    pub fn order(order: i64) -> Self {
        Self {
            order: Some(order),
            ..Self::default()
        }
    }

    pub fn parent(parent_id: Option<ChapterId>) -> Self {
        Self {
            parent_id: Some(parent_id),
            ..Self::default()
        }
    }

    pub fn title(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Self::default()
        }
    }

    pub fn with_parent(mut self, parent_id: Option<ChapterId>) -> Self {
        self.parent_id = Some(parent_id);
        self
    }
}

/// Partial update of a block. `None` leaves a field untouched.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct BlockPatch {
    pub content: Option<String>,
    pub order: Option<i64>,
}

impl BlockPatch {
    pub fn content(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            order: None,
        }
    }

    pub fn order(order: i64) -> Self {
        Self {
            content: None,
            order: Some(order),
        }
    }
}

/// One write inside an atomic [`transaction`](crate::Persistence::transaction).
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WriteOp {
    AddChapter(NewChapter),
    UpdateChapter(ChapterId, ChapterPatch),
    DeleteChapter(ChapterId),
    AddBlock(NewBlock),
    UpdateBlock(BlockId, BlockPatch),
    DeleteBlock(BlockId),
    /// Remove every block belonging to a chapter.
    DeleteChapterBlocks(ChapterId),
}

/// Id generated by an `Add*` op, reported in batch order.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GeneratedId {
    Chapter(ChapterId),
    Block(BlockId),
}

impl GeneratedId {
    pub fn block(self) -> Option<BlockId> {
        match self {
            GeneratedId::Block(id) => Some(id),
            GeneratedId::Chapter(_) => None,
        }
    }

    pub fn chapter(self) -> Option<ChapterId> {
        match self {
            GeneratedId::Chapter(id) => Some(id),
            GeneratedId::Block(_) => None,
        }
    }
}
