//! Folio's document-state engine.
//!
//! Two stores over one [`Persistence`](folio_store::Persistence) backend:
//!
//! - [`OutlineStore`] - the volume / chapter / episode forest of a project,
//!   with cycle self-repair and recursive duplicate and delete
//! - [`BlockStore`] - the text blocks of the selected episode, mutated
//!   optimistically and reconciled in the background, with coalesced
//!   undo/redo
//!
//! [`Workspace`] wires both to a SQLite file configured by [`EngineConfig`].
//!
//! ```ignore
//! let ws = Workspace::open(EngineConfig::default())?;
//! ws.outline().load_tree(project).await;
//! let ep = ws.outline().add_node(None, "Prologue", NodeKind::Episode).await.unwrap();
//! ws.blocks().select_chapter(ep.id).await;
//! let key = ws.blocks().insert_block("「Hello」", None, None).unwrap();
//! ws.blocks().update_block(key, "「Hello there」");
//! ```

pub mod blocks;
pub mod config;
pub mod error;
pub mod forest;
pub mod history;
pub mod outline;
pub mod transform;
pub mod workspace;

pub use blocks::BlockStore;
pub use config::{ConfigError, EngineConfig};
pub use error::WorkspaceError;
pub use forest::{FlatNode, Forest};
pub use history::{History, Snapshot};
pub use outline::{DropSide, OutlineStore};
pub use transform::{BlockClass, DialogueMarkers, SpacingMode};
pub use workspace::Workspace;
