//! Outline store: the chapter forest of one project.
//!
//! Every structural operation writes through the [`Persistence`] adapter and
//! then reloads the forest, so the in-memory view is always a cycle-checked
//! copy of storage. Operations never fail outward: storage faults are logged
//! and the operation degrades to a no-op.

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use parking_lot::RwLock;
use strum::EnumString;
use tracing::{debug, info, warn};

use folio_store::{ChapterPatch, GeneratedId, NewBlock, NewChapter, Persistence, StoreError, StoreResult, WriteOp};
use folio_types::{ChapterId, ChapterNode, NodeKind, ProjectId, now_millis};

use crate::forest::{Forest, find_cycle_breaks};

/// Where a dragged node lands relative to the drop reference.
#[derive(Clone, Copy, Debug, PartialEq, Eq, EnumString)]
#[strum(ascii_case_insensitive)]
pub enum DropSide {
    Before,
    After,
    /// Dropped onto a container: append as its last child.
    Inside,
}

#[derive(Default)]
struct OutlineState {
    project: Option<ProjectId>,
    forest: Forest,
}

/// Owns the loaded project's outline.
pub struct OutlineStore {
    store: Arc<dyn Persistence>,
    duplicate_suffix: String,
    state: RwLock<OutlineState>,
}

impl OutlineStore {
    pub fn new(store: Arc<dyn Persistence>, duplicate_suffix: impl Into<String>) -> Self {
        Self {
            store,
            duplicate_suffix: duplicate_suffix.into(),
            state: RwLock::new(OutlineState::default()),
        }
    }

    /// The loaded project, if any.
    pub fn project(&self) -> Option<ProjectId> {
        self.state.read().project
    }

    /// A copy of the current forest.
    pub fn forest(&self) -> Forest {
        self.state.read().forest.clone()
    }

    /// Load (or reload) a project's forest, repairing any parent-link cycle.
    pub async fn load_tree(&self, project: ProjectId) -> Forest {
        match self.try_load_tree(project).await {
            Ok(forest) => forest,
            Err(err) => {
                warn!(%project, error = %err, "failed to load outline");
                Forest::default()
            }
        }
    }

    /// Add a node as the last of its kind under `parent` (`None` = root).
    ///
    /// No-op when no project is loaded or when `parent` is missing or an
    /// Episode.
    pub async fn add_node(
        &self,
        parent: Option<ChapterId>,
        title: impl Into<String>,
        kind: NodeKind,
    ) -> Option<ChapterNode> {
        match self.try_add_node(parent, title.into(), kind).await {
            Ok(node) => node,
            Err(err) => {
                warn!(error = %err, "add_node failed");
                None
            }
        }
    }

    /// Change a node's title.
    pub async fn rename_node(&self, id: ChapterId, title: impl Into<String>) -> Option<ChapterNode> {
        match self.try_rename_node(id, title.into()).await {
            Ok(node) => node,
            Err(err) => {
                warn!(chapter = %id, error = %err, "rename_node failed");
                None
            }
        }
    }

    /// Reorder and/or reparent `dragged` among `target_parent`'s children.
    ///
    /// A container is never moved beneath itself; such a drop leaves the
    /// forest untouched. Returns the resulting forest.
    pub async fn move_node(
        &self,
        dragged: ChapterId,
        target_parent: Option<ChapterId>,
        reference: Option<ChapterId>,
        side: DropSide,
    ) -> Forest {
        if let Err(err) = self.try_move_node(dragged, target_parent, reference, side).await {
            warn!(chapter = %dragged, error = %err, "move_node failed");
        }
        self.forest()
    }

    /// Deep-clone a subtree next to its source. Returns the new subtree,
    /// root first; empty when nothing was duplicated.
    pub async fn duplicate_node(&self, id: ChapterId) -> Vec<ChapterNode> {
        match self.try_duplicate_node(id).await {
            Ok(Some(root)) => self.forest().subtree(root).into_iter().cloned().collect(),
            Ok(None) => Vec::new(),
            Err(err) => {
                warn!(chapter = %id, error = %err, "duplicate_node failed");
                Vec::new()
            }
        }
    }

    /// Delete a node, its descendants, and every block they own.
    /// Returns the removed ids.
    pub async fn delete_node(&self, id: ChapterId) -> Vec<ChapterId> {
        match self.try_delete_node(id).await {
            Ok(removed) => removed,
            Err(err) => {
                warn!(chapter = %id, error = %err, "delete_node failed");
                Vec::new()
            }
        }
    }

    // ------------------------------------------------------------------------

    async fn try_load_tree(&self, project: ProjectId) -> StoreResult<Forest> {
        let mut nodes = self.store.chapters_for_project(project).await?;

        let breaks = find_cycle_breaks(&nodes);
        if !breaks.is_empty() {
            for id in &breaks {
                warn!(%project, chapter = %id, "outline cycle detected, detaching node to root");
            }
            let repairs = breaks
                .iter()
                .map(|id| WriteOp::UpdateChapter(*id, ChapterPatch::parent(None)))
                .collect();
            match self.store.transaction(repairs).await {
                Ok(_) => nodes = self.store.chapters_for_project(project).await?,
                Err(err) => warn!(%project, error = %err, "cycle repair not persisted"),
            }
            // Whatever storage returned, the view handed out is a forest.
            let remaining = find_cycle_breaks(&nodes);
            detach(&mut nodes, &remaining);
        }

        let forest = Forest::from_nodes(nodes);
        info!(%project, nodes = forest.len(), "outline loaded");
        *self.state.write() = OutlineState {
            project: Some(project),
            forest: forest.clone(),
        };
        Ok(forest)
    }

    async fn reload(&self, project: ProjectId) -> StoreResult<()> {
        self.try_load_tree(project).await.map(|_| ())
    }

    async fn try_add_node(
        &self,
        parent: Option<ChapterId>,
        title: String,
        kind: NodeKind,
    ) -> StoreResult<Option<ChapterNode>> {
        let project = {
            let state = self.state.read();
            let Some(project) = state.project else {
                return Ok(None);
            };
            if let Some(parent) = parent {
                match state.forest.get(parent) {
                    Some(node) if node.kind.is_container() => {}
                    Some(_) => {
                        debug!(chapter = %parent, "refusing to add a child under an episode");
                        return Ok(None);
                    }
                    None => return Ok(None),
                }
            }
            project
        };

        let order = self
            .store
            .chapters_for_parent(project, parent)
            .await?
            .iter()
            .filter(|n| n.kind == kind)
            .count() as i64;

        let id = self
            .store
            .add_chapter(NewChapter {
                project_id: project,
                parent_id: parent,
                title,
                kind,
                order,
                created_at: now_millis(),
            })
            .await?;
        info!(chapter = %id, %kind, order, "outline node added");

        self.reload(project).await?;
        Ok(self.state.read().forest.get(id).cloned())
    }

    async fn try_rename_node(&self, id: ChapterId, title: String) -> StoreResult<Option<ChapterNode>> {
        let project = {
            let state = self.state.read();
            match state.project {
                Some(project) if state.forest.contains(id) => project,
                _ => return Ok(None),
            }
        };

        self.store.update_chapter(id, ChapterPatch::title(title)).await?;
        self.reload(project).await?;
        Ok(self.state.read().forest.get(id).cloned())
    }

    async fn try_move_node(
        &self,
        dragged: ChapterId,
        target_parent: Option<ChapterId>,
        reference: Option<ChapterId>,
        side: DropSide,
    ) -> StoreResult<()> {
        let (project, ops) = {
            let state = self.state.read();
            let Some(project) = state.project else {
                return Ok(());
            };
            match plan_move(&state.forest, dragged, target_parent, reference, side) {
                Some(ops) => (project, ops),
                None => return Ok(()),
            }
        };

        if !ops.is_empty() {
            self.store.transaction(ops).await?;
        }
        info!(chapter = %dragged, parent = ?target_parent, "outline node moved");
        self.reload(project).await
    }

    async fn try_duplicate_node(&self, id: ChapterId) -> StoreResult<Option<ChapterId>> {
        let (project, forest) = {
            let state = self.state.read();
            match state.project {
                Some(project) if state.forest.contains(id) => (project, state.forest.clone()),
                _ => return Ok(None),
            }
        };
        let Some(source) = forest.get(id) else {
            return Ok(None);
        };
        let created_at = now_millis();

        // Root: placed right after the source among its kind, later siblings shifted.
        let mut ops: Vec<WriteOp> = forest
            .children_of_kind(source.parent_id, source.kind)
            .into_iter()
            .filter(|n| n.id != source.id && n.order > source.order)
            .map(|n| WriteOp::UpdateChapter(n.id, ChapterPatch::order(n.order + 1)))
            .collect();
        ops.push(WriteOp::AddChapter(NewChapter {
            project_id: project,
            parent_id: source.parent_id,
            title: format!("{}{}", source.title, self.duplicate_suffix),
            kind: source.kind,
            order: source.order + 1,
            created_at,
        }));
        let new_root = self
            .store
            .transaction(ops)
            .await?
            .into_iter()
            .find_map(GeneratedId::chapter)
            .ok_or_else(|| StoreError::Unavailable("no id generated for duplicate".into()))?;

        // Descendants: depth-first, each appended after its new parent's clones so far.
        let mut child_counts: HashMap<ChapterId, i64> = HashMap::new();
        let mut seen = HashSet::new();
        let mut stack = vec![(source.id, new_root)];
        while let Some((src, dst)) = stack.pop() {
            if !seen.insert(src) {
                continue;
            }
            if forest.get(src).is_some_and(ChapterNode::is_episode) {
                self.clone_blocks(src, dst).await?;
            }

            let mut pairs = Vec::new();
            for child in forest.children(Some(src)) {
                let count = child_counts.entry(dst).or_insert(0);
                let order = *count;
                *count += 1;
                let clone = self
                    .store
                    .add_chapter(NewChapter {
                        project_id: project,
                        parent_id: Some(dst),
                        title: child.title.clone(),
                        kind: child.kind,
                        order,
                        created_at,
                    })
                    .await?;
                pairs.push((child.id, clone));
            }
            stack.extend(pairs.into_iter().rev());
        }
        info!(chapter = %id, copy = %new_root, "outline subtree duplicated");

        self.reload(project).await?;
        Ok(Some(new_root))
    }

    async fn clone_blocks(&self, from: ChapterId, to: ChapterId) -> StoreResult<()> {
        let blocks = self.store.blocks_for_chapter(from).await?;
        if blocks.is_empty() {
            return Ok(());
        }
        debug!(from = %from, to = %to, count = blocks.len(), "cloning episode blocks");
        let ops = blocks
            .into_iter()
            .map(|b| {
                WriteOp::AddBlock(NewBlock {
                    chapter_id: to,
                    project_id: b.project_id,
                    content: b.content,
                    order: b.order,
                })
            })
            .collect();
        self.store.transaction(ops).await?;
        Ok(())
    }

    async fn try_delete_node(&self, id: ChapterId) -> StoreResult<Vec<ChapterId>> {
        let (project, doomed) = {
            let state = self.state.read();
            let Some(project) = state.project else {
                return Ok(Vec::new());
            };
            let doomed: Vec<ChapterId> = state.forest.subtree(id).iter().map(|n| n.id).collect();
            (project, doomed)
        };
        if doomed.is_empty() {
            return Ok(Vec::new());
        }

        // Reverse pre-order: every node goes after its descendants.
        let ops = doomed
            .iter()
            .rev()
            .flat_map(|id| [WriteOp::DeleteChapterBlocks(*id), WriteOp::DeleteChapter(*id)])
            .collect();
        self.store.transaction(ops).await?;
        info!(chapter = %id, removed = doomed.len(), "outline subtree deleted");

        self.reload(project).await?;
        Ok(doomed)
    }
}

/// Compute the writes for a drag-and-drop, or `None` if the drop is rejected.
fn plan_move(
    forest: &Forest,
    dragged: ChapterId,
    target_parent: Option<ChapterId>,
    reference: Option<ChapterId>,
    side: DropSide,
) -> Option<Vec<WriteOp>> {
    let node = forest.get(dragged)?;
    if reference == Some(dragged) {
        return None;
    }
    if let Some(parent) = target_parent {
        let target = forest.get(parent)?;
        if !target.kind.is_container() {
            debug!(chapter = %dragged, target = %parent, "refusing to drop into an episode");
            return None;
        }
        if node.kind.is_container() && forest.is_within(parent, dragged) {
            warn!(chapter = %dragged, target = %parent, "rejected move beneath own descendant");
            return None;
        }
    }

    let original = forest.child_ids(target_parent).to_vec();
    let same_parent = node.parent_id.filter(|p| forest.contains(*p)) == target_parent;
    let mut siblings: Vec<ChapterId> = original.iter().copied().filter(|id| *id != dragged).collect();

    let anchor = match side {
        DropSide::Inside => None,
        DropSide::Before | DropSide::After => {
            reference.and_then(|r| siblings.iter().position(|id| *id == r).map(|at| (r, at)))
        }
    };
    match anchor {
        Some((reference, at)) => {
            let index_of = |id: ChapterId| original.iter().position(|o| *o == id);
            let moving_down = same_parent
                && matches!((index_of(dragged), index_of(reference)), (Some(d), Some(r)) if d < r);
            siblings.insert(if moving_down { at + 1 } else { at }, dragged);
        }
        None => siblings.push(dragged),
    }

    let ops = siblings
        .iter()
        .enumerate()
        .filter_map(|(i, id)| {
            let order = i as i64;
            if *id == dragged {
                return Some(WriteOp::UpdateChapter(
                    *id,
                    ChapterPatch::order(order).with_parent(target_parent),
                ));
            }
            let current = forest.get(*id)?;
            (current.order != order).then(|| WriteOp::UpdateChapter(*id, ChapterPatch::order(order)))
        })
        .collect();
    Some(ops)
}

fn detach(nodes: &mut [ChapterNode], ids: &[ChapterId]) {
    for node in nodes.iter_mut().filter(|n| ids.contains(&n.id)) {
        node.parent_id = None;
    }
}
