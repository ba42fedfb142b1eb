//! Persistence adapter for Folio.
//!
//! The outline and block stores depend only on the [`Persistence`] trait:
//! equality queries on indexed fields, results ordered by `order`,
//! add/update/delete, and atomic multi-operation batches.
//!
//! - [`SqliteStore`] - durable local storage (rusqlite)
//! - [`MemoryStore`] - ephemeral storage with write-fault injection, for tests

mod error;
mod memory;
mod ops;
mod records;
mod sqlite;

pub use error::{StoreError, StoreResult};
pub use memory::MemoryStore;
pub use ops::Persistence;
pub use records::{BlockPatch, BlockRecord, ChapterPatch, GeneratedId, NewBlock, NewChapter, WriteOp};
pub use sqlite::SqliteStore;
