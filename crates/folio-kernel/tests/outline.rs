//! Outline store behaviour against the in-memory and SQLite backends.

use std::collections::HashSet;
use std::sync::Arc;

use folio_kernel::{DropSide, EngineConfig, Forest, OutlineStore, Workspace};
use folio_store::{ChapterPatch, MemoryStore, NewBlock, NewChapter, Persistence, SqliteStore};
use folio_types::{ChapterId, ChapterNode, NodeKind, ProjectId};

const PROJECT: ProjectId = ProjectId::new(1);

async fn loaded(store: Arc<dyn Persistence>) -> OutlineStore {
    folio_telemetry::init_for_tests();
    let outline = OutlineStore::new(store, " (copy)");
    outline.load_tree(PROJECT).await;
    outline
}

async fn add(outline: &OutlineStore, parent: Option<ChapterId>, title: &str, kind: NodeKind) -> ChapterNode {
    outline.add_node(parent, title, kind).await.unwrap()
}

async fn seed_blocks(store: &dyn Persistence, chapter: ChapterId, contents: &[&str]) {
    for (i, content) in contents.iter().enumerate() {
        store
            .add_block(NewBlock {
                chapter_id: chapter,
                project_id: PROJECT,
                content: content.to_string(),
                order: i as i64,
            })
            .await
            .unwrap();
    }
}

async fn stored_contents(store: &dyn Persistence, chapter: ChapterId) -> Vec<String> {
    store
        .blocks_for_chapter(chapter)
        .await
        .unwrap()
        .into_iter()
        .map(|b| b.content)
        .collect()
}

fn titles(nodes: &[&ChapterNode]) -> Vec<String> {
    nodes.iter().map(|n| n.title.clone()).collect()
}

fn assert_acyclic(forest: &Forest) {
    for node in forest.nodes() {
        let mut seen = HashSet::from([node.id]);
        let mut current = node.parent_id;
        while let Some(parent) = current {
            assert!(seen.insert(parent), "cycle through {}", node.id);
            current = forest.get(parent).and_then(|p| p.parent_id);
        }
    }
}

#[tokio::test]
async fn test_add_node_orders_per_parent_and_kind() {
    let outline = loaded(Arc::new(MemoryStore::new())).await;
    let volume = add(&outline, None, "Book One", NodeKind::Volume).await;

    let orders: Vec<i64> = [
        add(&outline, Some(volume.id), "Ch 1", NodeKind::Chapter).await,
        add(&outline, Some(volume.id), "Ch 2", NodeKind::Chapter).await,
        add(&outline, Some(volume.id), "Ch 3", NodeKind::Chapter).await,
    ]
    .iter()
    .map(|n| n.order)
    .collect();
    assert_eq!(orders, [0, 1, 2]);

    // Episodes under the same parent are numbered on their own.
    let episode = add(&outline, Some(volume.id), "Interlude", NodeKind::Episode).await;
    assert_eq!(episode.order, 0);
    assert_eq!(outline.forest().children(Some(volume.id)).len(), 4);
}

#[tokio::test]
async fn test_add_node_rejects_episode_parent_and_unknown_parent() {
    let outline = loaded(Arc::new(MemoryStore::new())).await;
    let episode = add(&outline, None, "Leaf", NodeKind::Episode).await;

    assert!(outline.add_node(Some(episode.id), "child", NodeKind::Episode).await.is_none());
    assert!(outline.add_node(Some(ChapterId::new(999)), "orphan", NodeKind::Chapter).await.is_none());
    assert_eq!(outline.forest().len(), 1);
}

#[tokio::test]
async fn test_add_node_without_project_is_noop() {
    let outline = OutlineStore::new(Arc::new(MemoryStore::new()), " (copy)");
    assert!(outline.add_node(None, "nothing", NodeKind::Volume).await.is_none());
}

#[tokio::test]
async fn test_load_tree_repairs_cycle_and_persists() {
    let store = Arc::new(MemoryStore::new());
    let node = |title: &str, parent: Option<ChapterId>| NewChapter {
        project_id: PROJECT,
        parent_id: parent,
        title: title.into(),
        kind: NodeKind::Chapter,
        order: 0,
        created_at: 0,
    };
    let a = store.add_chapter(node("a", None)).await.unwrap();
    let b = store.add_chapter(node("b", Some(a))).await.unwrap();
    let c = store.add_chapter(node("c", Some(b))).await.unwrap();
    store.update_chapter(a, ChapterPatch::parent(Some(c))).await.unwrap();

    let outline = OutlineStore::new(store.clone(), " (copy)");
    let forest = outline.load_tree(PROJECT).await;

    assert_eq!(forest.len(), 3);
    assert_acyclic(&forest);
    assert_eq!(forest.flatten().len(), 3, "every node reachable from a root");

    // The repair was written back.
    let repaired = store.chapters_for_project(PROJECT).await.unwrap();
    let detached: Vec<_> = repaired.iter().filter(|n| n.parent_id.is_none()).collect();
    assert_eq!(detached.len(), 1);

    // A second load finds nothing to fix.
    let again = outline.load_tree(PROJECT).await;
    assert_eq!(again.roots().len(), 1);
}

#[tokio::test]
async fn test_move_beneath_own_descendant_is_rejected() {
    let outline = loaded(Arc::new(MemoryStore::new())).await;
    let volume = add(&outline, None, "V", NodeKind::Volume).await;
    let x = add(&outline, Some(volume.id), "X", NodeKind::Chapter).await;
    let inner = add(&outline, Some(x.id), "inner", NodeKind::Chapter).await;
    let before = outline.forest().flatten();

    let after = outline.move_node(x.id, Some(inner.id), None, DropSide::Inside).await;
    assert_eq!(after.flatten(), before);

    let after = outline.move_node(volume.id, Some(inner.id), None, DropSide::Inside).await;
    assert_eq!(after.flatten(), before);
}

#[tokio::test]
async fn test_move_down_lands_after_reference() {
    let outline = loaded(Arc::new(MemoryStore::new())).await;
    let a = add(&outline, None, "A", NodeKind::Chapter).await;
    let _b = add(&outline, None, "B", NodeKind::Chapter).await;
    let c = add(&outline, None, "C", NodeKind::Chapter).await;
    let _d = add(&outline, None, "D", NodeKind::Chapter).await;

    let forest = outline.move_node(a.id, None, Some(c.id), DropSide::After).await;
    assert_eq!(titles(&forest.roots()), ["B", "C", "A", "D"]);
    let orders: Vec<i64> = forest.roots().iter().map(|n| n.order).collect();
    assert_eq!(orders, [0, 1, 2, 3]);
}

#[tokio::test]
async fn test_move_up_lands_before_reference() {
    let outline = loaded(Arc::new(MemoryStore::new())).await;
    let _a = add(&outline, None, "A", NodeKind::Chapter).await;
    let b = add(&outline, None, "B", NodeKind::Chapter).await;
    let _c = add(&outline, None, "C", NodeKind::Chapter).await;
    let d = add(&outline, None, "D", NodeKind::Chapter).await;

    let forest = outline.move_node(d.id, None, Some(b.id), DropSide::Before).await;
    assert_eq!(titles(&forest.roots()), ["A", "D", "B", "C"]);
}

#[tokio::test]
async fn test_reparent_across_parents() {
    let store: Arc<dyn Persistence> = Arc::new(MemoryStore::new());
    let outline = loaded(store.clone()).await;
    let left = add(&outline, None, "Left", NodeKind::Chapter).await;
    let right = add(&outline, None, "Right", NodeKind::Chapter).await;
    let e1 = add(&outline, Some(left.id), "e1", NodeKind::Episode).await;
    let r1 = add(&outline, Some(right.id), "r1", NodeKind::Episode).await;
    let _r2 = add(&outline, Some(right.id), "r2", NodeKind::Episode).await;

    // Cross-parent drops always insert before the reference.
    let forest = outline.move_node(e1.id, Some(right.id), Some(r1.id), DropSide::After).await;
    assert_eq!(titles(&forest.children(Some(right.id))), ["e1", "r1", "r2"]);
    assert!(forest.children(Some(left.id)).is_empty());

    let stored = store.chapter(e1.id).await.unwrap().unwrap();
    assert_eq!(stored.parent_id, Some(right.id));
    assert_eq!(stored.order, 0);

    // No reference: append.
    let forest = outline.move_node(r1.id, Some(left.id), None, DropSide::Before).await;
    assert_eq!(titles(&forest.children(Some(left.id))), ["r1"]);
}

#[tokio::test]
async fn test_move_into_episode_is_rejected() {
    let outline = loaded(Arc::new(MemoryStore::new())).await;
    let ep = add(&outline, None, "ep", NodeKind::Episode).await;
    let other = add(&outline, None, "other", NodeKind::Episode).await;

    let forest = outline.move_node(other.id, Some(ep.id), None, DropSide::Inside).await;
    assert!(forest.children(Some(ep.id)).is_empty());
    assert_eq!(forest.get(other.id).unwrap().parent_id, None);
}

#[tokio::test]
async fn test_duplicate_subtree_with_blocks() {
    let store: Arc<dyn Persistence> = Arc::new(MemoryStore::new());
    let outline = loaded(store.clone()).await;
    let volume = add(&outline, None, "V", NodeKind::Volume).await;
    let c0 = add(&outline, Some(volume.id), "C0", NodeKind::Chapter).await;
    let c1 = add(&outline, Some(volume.id), "C1", NodeKind::Chapter).await;
    let c2 = add(&outline, Some(volume.id), "C2", NodeKind::Chapter).await;
    let e1 = add(&outline, Some(c0.id), "E1", NodeKind::Episode).await;
    let e2 = add(&outline, Some(c0.id), "E2", NodeKind::Episode).await;
    seed_blocks(store.as_ref(), e1.id, &["one", "two"]).await;
    seed_blocks(store.as_ref(), e2.id, &["three"]).await;
    outline.load_tree(PROJECT).await;

    let copy = outline.duplicate_node(c0.id).await;
    let source = outline.forest().subtree(c0.id).len();
    assert_eq!(copy.len(), source);

    let root = &copy[0];
    assert_eq!(root.title, "C0 (copy)");
    assert_eq!(root.order, c0.order + 1);
    assert_eq!(root.parent_id, Some(volume.id));

    let forest = outline.forest();
    assert_eq!(forest.get(c1.id).unwrap().order, 2);
    assert_eq!(forest.get(c2.id).unwrap().order, 3);

    // Descendants keep titles and structure; episodes carry their blocks.
    let kids = forest.children(Some(root.id));
    assert_eq!(titles(&kids), ["E1", "E2"]);
    assert!(kids.iter().all(|k| k.parent_id == Some(root.id)));
    assert_eq!(stored_contents(store.as_ref(), kids[0].id).await, ["one", "two"]);
    assert_eq!(stored_contents(store.as_ref(), kids[1].id).await, ["three"]);
    // The source is untouched.
    assert_eq!(stored_contents(store.as_ref(), e1.id).await, ["one", "two"]);
}

#[tokio::test]
async fn test_duplicate_nested_depth() {
    let outline = loaded(Arc::new(MemoryStore::new())).await;
    let v = add(&outline, None, "V", NodeKind::Volume).await;
    let c = add(&outline, Some(v.id), "C", NodeKind::Chapter).await;
    let cc = add(&outline, Some(c.id), "CC", NodeKind::Chapter).await;
    add(&outline, Some(cc.id), "leaf", NodeKind::Episode).await;
    add(&outline, Some(c.id), "side", NodeKind::Episode).await;

    let copy = outline.duplicate_node(v.id).await;
    assert_eq!(copy.len(), 5);

    let forest = outline.forest();
    let shape = |root: ChapterId| -> Vec<(usize, String)> {
        let base = forest.ancestors(root).len();
        forest
            .subtree(root)
            .iter()
            .map(|n| (forest.ancestors(n.id).len() - base, n.title.clone()))
            .collect()
    };
    let mut copied = shape(copy[0].id);
    copied[0].1 = "V".into();
    assert_eq!(copied, shape(v.id));
}

#[tokio::test]
async fn test_duplicate_missing_node_is_noop() {
    let outline = loaded(Arc::new(MemoryStore::new())).await;
    assert!(outline.duplicate_node(ChapterId::new(5)).await.is_empty());
}

#[tokio::test]
async fn test_delete_cascades_to_descendants_and_blocks() {
    let store = Arc::new(MemoryStore::new());
    let outline = loaded(store.clone()).await;
    let v = add(&outline, None, "V", NodeKind::Volume).await;
    let keep = add(&outline, None, "Keep", NodeKind::Episode).await;
    let c = add(&outline, Some(v.id), "C", NodeKind::Chapter).await;
    let e1 = add(&outline, Some(c.id), "E1", NodeKind::Episode).await;
    let e2 = add(&outline, Some(v.id), "E2", NodeKind::Episode).await;
    seed_blocks(store.as_ref(), e1.id, &["a", "b"]).await;
    seed_blocks(store.as_ref(), e2.id, &["c"]).await;
    seed_blocks(store.as_ref(), keep.id, &["kept"]).await;

    let removed = outline.delete_node(v.id).await;
    let removed: HashSet<_> = removed.into_iter().collect();
    assert_eq!(removed, HashSet::from([v.id, c.id, e1.id, e2.id]));

    assert_eq!(store.chapter_count(), 1);
    assert_eq!(store.block_owners(), [keep.id]);
    assert_eq!(outline.forest().len(), 1);
}

#[tokio::test]
async fn test_rename_node() {
    let outline = loaded(Arc::new(MemoryStore::new())).await;
    let node = add(&outline, None, "Draft", NodeKind::Chapter).await;

    let renamed = outline.rename_node(node.id, "Final").await.unwrap();
    assert_eq!(renamed.title, "Final");
    assert!(outline.rename_node(ChapterId::new(77), "nope").await.is_none());
}

#[tokio::test]
async fn test_store_faults_degrade_to_noops() {
    let store = Arc::new(MemoryStore::new());
    let outline = loaded(store.clone()).await;
    let node = add(&outline, None, "A", NodeKind::Chapter).await;

    store.set_fail_writes(true);
    assert!(outline.add_node(None, "B", NodeKind::Chapter).await.is_none());
    assert!(outline.delete_node(node.id).await.is_empty());
    assert_eq!(outline.forest().len(), 1);
}

#[tokio::test]
async fn test_sqlite_outline_roundtrip() {
    let store: Arc<dyn Persistence> = Arc::new(SqliteStore::in_memory().unwrap());
    let outline = loaded(store.clone()).await;
    let v = add(&outline, None, "V", NodeKind::Volume).await;
    let e = add(&outline, Some(v.id), "E", NodeKind::Episode).await;
    seed_blocks(store.as_ref(), e.id, &["x", "y"]).await;

    let copy = outline.duplicate_node(v.id).await;
    assert_eq!(copy.len(), 2);
    assert_eq!(stored_contents(store.as_ref(), copy[1].id).await, ["x", "y"]);

    outline.delete_node(v.id).await;
    assert!(stored_contents(store.as_ref(), e.id).await.is_empty());
    assert_eq!(outline.forest().len(), 2);
}

#[tokio::test]
async fn test_workspace_delete_deselects_open_episode() {
    folio_telemetry::init_for_tests();
    let store = Arc::new(MemoryStore::new());
    let ws = Workspace::with_store(store.clone(), EngineConfig::default());
    ws.outline().load_tree(PROJECT).await;
    let chapter = ws.outline().add_node(None, "C", NodeKind::Chapter).await.unwrap();
    let ep = ws.outline().add_node(Some(chapter.id), "E", NodeKind::Episode).await.unwrap();

    ws.blocks().select_chapter(ep.id).await;
    assert_eq!(ws.blocks().active_chapter(), Some(ep.id));
    ws.blocks().insert_block("unsaved", None, None).unwrap();

    let removed = ws.delete_node(chapter.id).await;
    assert_eq!(removed.len(), 2);
    assert_eq!(ws.blocks().active_chapter(), None);
    assert!(ws.blocks().blocks().is_empty());
    assert_eq!(store.block_count(), 0);
}

#[tokio::test]
async fn test_workspace_duplicate_includes_unflushed_edits() {
    let store = Arc::new(MemoryStore::new());
    let ws = Workspace::with_store(store.clone(), EngineConfig::default());
    ws.outline().load_tree(PROJECT).await;
    let ep = ws.outline().add_node(None, "E", NodeKind::Episode).await.unwrap();

    ws.blocks().select_chapter(ep.id).await;
    let key = ws.blocks().insert_block("first", None, None).unwrap();
    ws.blocks().update_block(key, "first, revised");

    let copy = ws.duplicate_node(ep.id).await;
    assert_eq!(copy.len(), 1);
    assert_eq!(stored_contents(store.as_ref(), copy[0].id).await, ["first, revised"]);
}
