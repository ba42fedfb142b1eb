//! One open project: storage, outline, and the block editor session.

use std::path::Path;
use std::sync::Arc;

use tracing::info;

use folio_store::{Persistence, SqliteStore};
use folio_types::{ChapterId, ChapterNode};

use crate::blocks::BlockStore;
use crate::config::EngineConfig;
use crate::error::WorkspaceError;
use crate::outline::OutlineStore;

/// Ties the outline and block stores to one persistence backend.
///
/// Outline operations that touch blocks go through here so the editor
/// session is flushed or deselected around them.
pub struct Workspace {
    config: EngineConfig,
    store: Arc<dyn Persistence>,
    outline: OutlineStore,
    blocks: BlockStore,
}

impl Workspace {
    /// Open SQLite storage as configured (in-memory when `database` is unset).
    pub fn open(config: EngineConfig) -> Result<Self, WorkspaceError> {
        let store: Arc<dyn Persistence> = match &config.database {
            Some(path) => {
                info!(path = %path.display(), "opening workspace");
                Arc::new(SqliteStore::open(path)?)
            }
            None => Arc::new(SqliteStore::in_memory()?),
        };
        Ok(Self::with_store(store, config))
    }

    /// Read a RON config file and open the workspace it describes.
    pub fn open_config_file(path: impl AsRef<Path>) -> Result<Self, WorkspaceError> {
        Self::open(EngineConfig::load(path)?)
    }

    pub fn with_store(store: Arc<dyn Persistence>, config: EngineConfig) -> Self {
        let outline = OutlineStore::new(Arc::clone(&store), config.duplicate_suffix.clone());
        let blocks = BlockStore::new(Arc::clone(&store), &config);
        Self {
            config,
            store,
            outline,
            blocks,
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn Persistence> {
        &self.store
    }

    pub fn outline(&self) -> &OutlineStore {
        &self.outline
    }

    pub fn blocks(&self) -> &BlockStore {
        &self.blocks
    }

    /// Duplicate a subtree, including the open episode's unflushed edits.
    pub async fn duplicate_node(&self, id: ChapterId) -> Vec<ChapterNode> {
        self.blocks.flush().await;
        self.outline.duplicate_node(id).await
    }

    /// Cascade-delete a subtree. The editor is deselected if its chapter
    /// was part of it.
    pub async fn delete_node(&self, id: ChapterId) -> Vec<ChapterId> {
        self.blocks.flush().await;
        let removed = self.outline.delete_node(id).await;
        if let Some(active) = self.blocks.active_chapter() {
            if removed.contains(&active) {
                self.blocks.deselect().await;
            }
        }
        removed
    }
}
