//! Typed identifiers for projects, outline nodes, blocks, and client keys.
//!
//! Two families live here:
//!
//! - **Durable ids** (`ProjectId`, `ChapterId`, `BlockId`) wrap the `i64` row id
//!   generated by the persistence layer. A block has no durable id until its
//!   background insert completes.
//! - **Client keys** (`ClientKey`) wrap a UUIDv7 minted in-process when a block
//!   is created or loaded. They never change for the lifetime of the block and
//!   are the only address used for in-memory lookups.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A project identifier (storage row id).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProjectId(i64);

/// An outline node identifier (storage row id).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ChapterId(i64);

/// A durable block identifier (storage row id).
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockId(i64);

/// Error parsing a durable id from text.
#[derive(Debug, thiserror::Error)]
#[error("invalid {kind} id: '{input}'")]
pub struct ParseIdError {
    kind: &'static str,
    input: String,
}

// ── Durable ids ─────────────────────────────────────────────────────────────

macro_rules! impl_row_id {
    ($T:ident, $name:literal) => {
        impl $T {
            /// Wrap a raw storage row id.
            pub const fn new(raw: i64) -> Self {
                Self(raw)
            }

            /// The raw storage row id.
            pub const fn get(self) -> i64 {
                self.0
            }
        }

        impl From<i64> for $T {
            fn from(raw: i64) -> Self {
                Self(raw)
            }
        }

        impl From<$T> for i64 {
            fn from(id: $T) -> i64 {
                id.0
            }
        }

        impl FromStr for $T {
            type Err = ParseIdError;

            fn from_str(s: &str) -> Result<Self, Self::Err> {
                s.trim().parse::<i64>().map(Self).map_err(|_| ParseIdError {
                    kind: $name,
                    input: s.to_string(),
                })
            }
        }

        impl fmt::Display for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}", self.0)
            }
        }

        impl fmt::Debug for $T {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                write!(f, "{}({})", stringify!($T), self.0)
            }
        }
    };
}

impl_row_id!(ProjectId, "project");
impl_row_id!(ChapterId, "chapter");
impl_row_id!(BlockId, "block");

// ── Client keys ─────────────────────────────────────────────────────────────

/// Process-local stable identity of a block (UUIDv7).
///
/// Minted once, never reused. Survives the async gap between an optimistic
/// insert and the assignment of the block's durable [`BlockId`].
#[derive(Clone, Copy, Hash, Eq, PartialEq, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ClientKey(uuid::Uuid);

impl ClientKey {
    /// Mint a new key.
    pub fn new() -> Self {
        Self(uuid::Uuid::now_v7())
    }

    /// First 8 hex characters, for human display only (not lookup).
    pub fn short(&self) -> String {
        self.0.as_simple().to_string()[..8].to_string()
    }

    /// Parse from hex (32 chars) or hyphenated UUID text.
    pub fn parse(s: &str) -> Result<Self, uuid::Error> {
        uuid::Uuid::parse_str(s).map(Self)
    }
}

impl Default for ClientKey {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl fmt::Debug for ClientKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ClientKey({})", self.short())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn test_row_id_roundtrip_through_text() {
        let id = ChapterId::new(42);
        let parsed: ChapterId = id.to_string().parse().unwrap();
        assert_eq!(parsed, id);
        assert_eq!(i64::from(parsed), 42);
    }

    #[test]
    fn test_row_id_parse_error_names_kind() {
        let err = "abc".parse::<BlockId>().unwrap_err();
        assert_eq!(err.to_string(), "invalid block id: 'abc'");
    }

    #[test]
    fn test_row_id_debug_is_typed() {
        assert_eq!(format!("{:?}", ProjectId::new(7)), "ProjectId(7)");
    }

    #[test]
    fn test_client_keys_are_never_reused() {
        let keys: HashSet<ClientKey> = (0..1000).map(|_| ClientKey::new()).collect();
        assert_eq!(keys.len(), 1000);
    }

    #[test]
    fn test_client_key_parse_roundtrip() {
        let key = ClientKey::new();
        assert_eq!(ClientKey::parse(&key.to_string()).unwrap(), key);
        assert_eq!(key.short().len(), 8);
    }
}
