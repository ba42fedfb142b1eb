//! Kernel error types.
//!
//! Store operations themselves never fail outward: persistence faults are
//! logged and degrade to no-ops. Only workspace construction can fail.

use thiserror::Error;

use folio_store::StoreError;

use crate::config::ConfigError;

/// Errors opening a [`Workspace`](crate::Workspace).
#[derive(Error, Debug)]
pub enum WorkspaceError {
    #[error("config: {0}")]
    Config(#[from] ConfigError),

    #[error("storage: {0}")]
    Store(#[from] StoreError),
}
