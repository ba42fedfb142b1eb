//! Outline forest arena.
//!
//! Nodes live in a flat table keyed by [`ChapterId`]; children are resolved
//! through a secondary `parent -> [child]` index. Traversals use explicit
//! work-lists so deep outlines never grow the call stack.

use std::collections::{HashMap, HashSet};

use folio_types::{ChapterId, ChapterNode, NodeKind};

/// A project's outline, detached from storage.
#[derive(Clone, Debug, Default)]
pub struct Forest {
    nodes: HashMap<ChapterId, ChapterNode>,
    children: HashMap<Option<ChapterId>, Vec<ChapterId>>,
}

/// One row of [`Forest::flatten`].
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FlatNode {
    pub depth: usize,
    pub node: ChapterNode,
}

impl Forest {
    /// Build from a node list. Nodes whose parent is not in the list are
    /// treated as roots.
    pub fn from_nodes(nodes: impl IntoIterator<Item = ChapterNode>) -> Self {
        let nodes: HashMap<ChapterId, ChapterNode> = nodes.into_iter().map(|n| (n.id, n)).collect();

        let mut children: HashMap<Option<ChapterId>, Vec<ChapterId>> = HashMap::new();
        for node in nodes.values() {
            let parent = node.parent_id.filter(|p| nodes.contains_key(p));
            children.entry(parent).or_default().push(node.id);
        }
        for list in children.values_mut() {
            list.sort_by_key(|id| display_key(&nodes[id]));
        }

        Self { nodes, children }
    }

    pub fn get(&self, id: ChapterId) -> Option<&ChapterNode> {
        self.nodes.get(&id)
    }

    pub fn contains(&self, id: ChapterId) -> bool {
        self.nodes.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    /// Every node, in no particular order.
    pub fn nodes(&self) -> impl Iterator<Item = &ChapterNode> {
        self.nodes.values()
    }

    /// Root nodes in display order.
    pub fn roots(&self) -> Vec<&ChapterNode> {
        self.children(None)
    }

    /// Direct children of `parent` (`None` = roots) in display order:
    /// `order`, then Volume < Chapter < Episode, then id.
    pub fn children(&self, parent: Option<ChapterId>) -> Vec<&ChapterNode> {
        self.child_ids(parent)
            .iter()
            .filter_map(|id| self.nodes.get(id))
            .collect()
    }

    /// Direct children of one kind, by `order`.
    pub fn children_of_kind(&self, parent: Option<ChapterId>, kind: NodeKind) -> Vec<&ChapterNode> {
        let mut nodes: Vec<_> = self
            .children(parent)
            .into_iter()
            .filter(|n| n.kind == kind)
            .collect();
        nodes.sort_by_key(|n| (n.order, n.id));
        nodes
    }

    pub(crate) fn child_ids(&self, parent: Option<ChapterId>) -> &[ChapterId] {
        self.children.get(&parent).map(Vec::as_slice).unwrap_or(&[])
    }

    /// `root` and all its descendants, pre-order.
    pub fn subtree(&self, root: ChapterId) -> Vec<&ChapterNode> {
        let mut out = Vec::new();
        let mut seen = HashSet::new();
        let mut stack = vec![root];

        while let Some(id) = stack.pop() {
            if !seen.insert(id) {
                continue;
            }
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            out.push(node);
            // Reverse so the first child is visited first.
            stack.extend(self.child_ids(Some(id)).iter().rev());
        }
        out
    }

    /// Parent chain of `id`, nearest first. Stops at a root or on a repeat.
    pub fn ancestors(&self, id: ChapterId) -> Vec<&ChapterNode> {
        let mut out = Vec::new();
        let mut seen = HashSet::from([id]);
        let mut current = self.nodes.get(&id).and_then(|n| n.parent_id);

        while let Some(parent) = current {
            if !seen.insert(parent) {
                break;
            }
            let Some(node) = self.nodes.get(&parent) else {
                break;
            };
            out.push(node);
            current = node.parent_id;
        }
        out
    }

    /// Whether `ancestor` appears on `id`'s parent chain (or is `id` itself).
    pub fn is_within(&self, id: ChapterId, ancestor: ChapterId) -> bool {
        id == ancestor || self.ancestors(id).iter().any(|n| n.id == ancestor)
    }

    /// Whole forest as a depth-annotated display list.
    pub fn flatten(&self) -> Vec<FlatNode> {
        let mut out = Vec::with_capacity(self.nodes.len());
        let mut stack: Vec<(ChapterId, usize)> =
            self.child_ids(None).iter().rev().map(|id| (*id, 0)).collect();

        while let Some((id, depth)) = stack.pop() {
            let Some(node) = self.nodes.get(&id) else {
                continue;
            };
            out.push(FlatNode {
                depth,
                node: node.clone(),
            });
            stack.extend(self.child_ids(Some(id)).iter().rev().map(|c| (*c, depth + 1)));
        }
        out
    }
}

fn display_key(node: &ChapterNode) -> (i64, u8, ChapterId) {
    (node.order, node.kind.rank(), node.id)
}

/// Nodes whose parent link must be cut to make `nodes` a forest.
///
/// Walks each node's ancestor chain with a visited set; a node whose chain
/// revisits an id is detached, and later walks see the detachment.
pub fn find_cycle_breaks(nodes: &[ChapterNode]) -> Vec<ChapterId> {
    let mut parents: HashMap<ChapterId, Option<ChapterId>> =
        nodes.iter().map(|n| (n.id, n.parent_id)).collect();
    let mut breaks = Vec::new();

    for node in nodes {
        let mut visited = HashSet::from([node.id]);
        let mut current = parents.get(&node.id).copied().flatten();

        while let Some(parent) = current {
            if !visited.insert(parent) {
                breaks.push(node.id);
                parents.insert(node.id, None);
                break;
            }
            current = parents.get(&parent).copied().flatten();
        }
    }
    breaks
}
