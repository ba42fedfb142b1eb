//! Shared identity, outline, and block types for Folio.
//!
//! This crate is the leaf of the workspace: typed ids, outline nodes, and
//! manuscript blocks. It has **no internal folio dependencies**.
//!
//! ```text
//! Project (ProjectId)
//!     └── ChapterNode (ChapterId) ← Volume / Chapter / Episode forest
//!             └── TextBlock (BlockId once persisted, ClientKey always)
//!                     only under Episode nodes
//! ```

pub mod block;
pub mod ids;
pub mod outline;

// Re-export primary types at crate root for convenience.
pub use block::TextBlock;
pub use ids::{BlockId, ChapterId, ClientKey, ParseIdError, ProjectId};
pub use outline::{ChapterNode, NodeKind};

/// Current time as Unix milliseconds.
pub fn now_millis() -> u64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}
