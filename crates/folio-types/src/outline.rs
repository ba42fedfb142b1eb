//! Outline node types.
//!
//! The outline is a forest of typed nodes scoped by project:
//! `Volume` and `Chapter` nodes may have children, `Episode` nodes are leaves
//! and own the manuscript's text blocks.

use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::EnumString;

use crate::ids::{ChapterId, ProjectId};

/// What an outline node *is*.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize, Default, EnumString)]
#[serde(rename_all = "lowercase")]
#[strum(ascii_case_insensitive)]
pub enum NodeKind {
    /// Top-level grouping.
    Volume,
    /// Mid-level grouping.
    #[default]
    Chapter,
    /// Leaf node carrying the block sequence.
    Episode,
}

impl NodeKind {
    /// Parse from string (case-insensitive).
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        <Self as FromStr>::from_str(s).ok()
    }

    /// Convert to string representation.
    pub fn as_str(&self) -> &'static str {
        match self {
            NodeKind::Volume => "volume",
            NodeKind::Chapter => "chapter",
            NodeKind::Episode => "episode",
        }
    }

    /// Whether nodes of this kind may have children.
    pub fn is_container(&self) -> bool {
        !matches!(self, NodeKind::Episode)
    }

    /// Rank used to interleave per-kind sibling orders for display.
    pub fn rank(&self) -> u8 {
        match self {
            NodeKind::Volume => 0,
            NodeKind::Chapter => 1,
            NodeKind::Episode => 2,
        }
    }
}

impl std::fmt::Display for NodeKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One node of the outline forest.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChapterNode {
    pub id: ChapterId,
    pub project_id: ProjectId,
    /// `None` for a root.
    pub parent_id: Option<ChapterId>,
    pub title: String,
    pub kind: NodeKind,
    /// Position among siblings sharing both `parent_id` and `kind`.
    pub order: i64,
    /// Unix milliseconds.
    pub created_at: u64,
}

impl ChapterNode {
    /// Whether this node may carry a block sequence.
    pub fn is_episode(&self) -> bool {
        self.kind == NodeKind::Episode
    }
}
