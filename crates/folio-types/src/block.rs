//! Manuscript text blocks.

use serde::{Deserialize, Serialize};

use crate::ids::{BlockId, ChapterId, ClientKey, ProjectId};

/// One manuscript fragment as held in memory.
///
/// `id` is `None` until the background insert assigns a durable row id;
/// `client_key` is the identity used for every in-memory lookup.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TextBlock {
    pub id: Option<BlockId>,
    pub client_key: ClientKey,
    pub chapter_id: ChapterId,
    pub project_id: ProjectId,
    pub content: String,
    /// Manuscript position within the chapter. Transiently non-contiguous
    /// between an optimistic mutation and its reconciliation.
    pub order: i64,
}

impl TextBlock {
    /// A new, not yet persisted block with a freshly minted key.
    pub fn pending(
        chapter_id: ChapterId,
        project_id: ProjectId,
        content: impl Into<String>,
        order: i64,
    ) -> Self {
        Self {
            id: None,
            client_key: ClientKey::new(),
            chapter_id,
            project_id,
            content: content.into(),
            order,
        }
    }

    /// Whether the block has received its durable id.
    pub fn is_persisted(&self) -> bool {
        self.id.is_some()
    }

    /// Whether the block holds only whitespace.
    pub fn is_blank(&self) -> bool {
        self.content.trim().is_empty()
    }
}
