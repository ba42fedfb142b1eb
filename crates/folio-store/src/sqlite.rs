//! SQLite persistence for the outline and manuscript blocks.
//!
//! Two tables, no foreign keys: cascades and cycle repair are the outline
//! store's job, and the store must be able to hold a momentarily broken forest.

use std::path::Path;

use async_trait::async_trait;
use parking_lot::Mutex;
use rusqlite::{Connection, params};

use folio_types::{BlockId, ChapterId, ChapterNode, NodeKind, ProjectId};

use crate::ops::Persistence;
use crate::records::{BlockPatch, BlockRecord, ChapterPatch, GeneratedId, NewBlock, NewChapter, WriteOp};
use crate::{StoreError, StoreResult};

const SCHEMA: &str = r#"
-- Outline nodes (volumes, chapters, episodes)
CREATE TABLE IF NOT EXISTS chapters (
    id INTEGER PRIMARY KEY,
    project_id INTEGER NOT NULL,
    parent_id INTEGER,
    title TEXT NOT NULL,
    kind TEXT NOT NULL,
    order_idx INTEGER NOT NULL,
    created_at INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chapters_project ON chapters(project_id, order_idx);
CREATE INDEX IF NOT EXISTS idx_chapters_parent ON chapters(parent_id);

-- Manuscript blocks (episode content)
CREATE TABLE IF NOT EXISTS blocks (
    id INTEGER PRIMARY KEY,
    chapter_id INTEGER NOT NULL,
    project_id INTEGER NOT NULL,
    content TEXT NOT NULL,
    order_idx INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_blocks_chapter ON blocks(chapter_id, order_idx);
"#;

const CHAPTER_COLUMNS: &str = "id, project_id, parent_id, title, kind, order_idx, created_at";

/// Maps a row from the chapters table before the kind string is parsed.
#[derive(Debug)]
struct ChapterRow {
    id: i64,
    project_id: i64,
    parent_id: Option<i64>,
    title: String,
    kind: String,
    order_idx: i64,
    created_at: i64,
}

impl ChapterRow {
    fn from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Self> {
        Ok(Self {
            id: row.get(0)?,
            project_id: row.get(1)?,
            parent_id: row.get(2)?,
            title: row.get(3)?,
            kind: row.get(4)?,
            order_idx: row.get(5)?,
            created_at: row.get(6)?,
        })
    }

    fn into_node(self) -> StoreResult<ChapterNode> {
        let kind = NodeKind::from_str(&self.kind).ok_or(StoreError::UnknownKind(self.kind))?;
        Ok(ChapterNode {
            id: ChapterId::new(self.id),
            project_id: ProjectId::new(self.project_id),
            parent_id: self.parent_id.map(ChapterId::new),
            title: self.title,
            kind,
            order: self.order_idx,
            created_at: self.created_at as u64,
        })
    }
}

fn block_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<BlockRecord> {
    Ok(BlockRecord {
        id: BlockId::new(row.get(0)?),
        chapter_id: ChapterId::new(row.get(1)?),
        project_id: ProjectId::new(row.get(2)?),
        content: row.get(3)?,
        order: row.get(4)?,
    })
}

/// Database handle for outline and block persistence.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> StoreResult<Self> {
        let conn = Connection::open(path.as_ref())?;
        conn.execute_batch(SCHEMA)?;
        tracing::debug!(path = %path.as_ref().display(), "opened sqlite store");
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Create an in-memory database (for testing and scratch sessions).
    pub fn in_memory() -> StoreResult<Self> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }
}

// =============================================================================
// Statement helpers (shared by single writes and transactions)
// =============================================================================

fn query_chapters(
    conn: &Connection,
    sql: &str,
    params: impl rusqlite::Params,
) -> StoreResult<Vec<ChapterNode>> {
    let mut stmt = conn.prepare(sql)?;
    let rows = stmt.query_map(params, ChapterRow::from_row)?;
    let mut nodes = Vec::new();
    for row in rows {
        nodes.push(row?.into_node()?);
    }
    Ok(nodes)
}

fn insert_chapter(conn: &Connection, chapter: &NewChapter) -> StoreResult<ChapterId> {
    conn.execute(
        "INSERT INTO chapters (project_id, parent_id, title, kind, order_idx, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
        params![
            chapter.project_id.get(),
            chapter.parent_id.map(ChapterId::get),
            chapter.title,
            chapter.kind.as_str(),
            chapter.order,
            chapter.created_at as i64,
        ],
    )?;
    Ok(ChapterId::new(conn.last_insert_rowid()))
}

fn patch_chapter(conn: &Connection, id: ChapterId, patch: &ChapterPatch) -> StoreResult<()> {
    if let Some(title) = &patch.title {
        conn.execute(
            "UPDATE chapters SET title = ?1 WHERE id = ?2",
            params![title, id.get()],
        )?;
    }
    if let Some(parent_id) = patch.parent_id {
        conn.execute(
            "UPDATE chapters SET parent_id = ?1 WHERE id = ?2",
            params![parent_id.map(ChapterId::get), id.get()],
        )?;
    }
    if let Some(order) = patch.order {
        conn.execute(
            "UPDATE chapters SET order_idx = ?1 WHERE id = ?2",
            params![order, id.get()],
        )?;
    }
    Ok(())
}

fn remove_chapter(conn: &Connection, id: ChapterId) -> StoreResult<()> {
    conn.execute("DELETE FROM chapters WHERE id = ?1", params![id.get()])?;
    Ok(())
}

fn insert_block(conn: &Connection, block: &NewBlock) -> StoreResult<BlockId> {
    conn.execute(
        "INSERT INTO blocks (chapter_id, project_id, content, order_idx)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            block.chapter_id.get(),
            block.project_id.get(),
            block.content,
            block.order,
        ],
    )?;
    Ok(BlockId::new(conn.last_insert_rowid()))
}

fn patch_block(conn: &Connection, id: BlockId, patch: &BlockPatch) -> StoreResult<()> {
    if let Some(content) = &patch.content {
        conn.execute(
            "UPDATE blocks SET content = ?1 WHERE id = ?2",
            params![content, id.get()],
        )?;
    }
    if let Some(order) = patch.order {
        conn.execute(
            "UPDATE blocks SET order_idx = ?1 WHERE id = ?2",
            params![order, id.get()],
        )?;
    }
    Ok(())
}

fn remove_block(conn: &Connection, id: BlockId) -> StoreResult<()> {
    conn.execute("DELETE FROM blocks WHERE id = ?1", params![id.get()])?;
    Ok(())
}

fn apply_op(conn: &Connection, op: &WriteOp) -> StoreResult<Option<GeneratedId>> {
    match op {
        WriteOp::AddChapter(chapter) => insert_chapter(conn, chapter).map(|id| Some(GeneratedId::Chapter(id))),
        WriteOp::UpdateChapter(id, patch) => patch_chapter(conn, *id, patch).map(|_| None),
        WriteOp::DeleteChapter(id) => remove_chapter(conn, *id).map(|_| None),
        WriteOp::AddBlock(block) => insert_block(conn, block).map(|id| Some(GeneratedId::Block(id))),
        WriteOp::UpdateBlock(id, patch) => patch_block(conn, *id, patch).map(|_| None),
        WriteOp::DeleteBlock(id) => remove_block(conn, *id).map(|_| None),
        WriteOp::DeleteChapterBlocks(chapter) => {
            conn.execute(
                "DELETE FROM blocks WHERE chapter_id = ?1",
                params![chapter.get()],
            )?;
            Ok(None)
        }
    }
}

#[async_trait]
impl Persistence for SqliteStore {
    async fn chapters_for_project(&self, project: ProjectId) -> StoreResult<Vec<ChapterNode>> {
        let conn = self.conn.lock();
        query_chapters(
            &conn,
            &format!("SELECT {CHAPTER_COLUMNS} FROM chapters WHERE project_id = ?1 ORDER BY order_idx, id"),
            params![project.get()],
        )
    }

    async fn chapters_for_parent(
        &self,
        project: ProjectId,
        parent: Option<ChapterId>,
    ) -> StoreResult<Vec<ChapterNode>> {
        let conn = self.conn.lock();
        match parent {
            Some(parent) => query_chapters(
                &conn,
                &format!(
                    "SELECT {CHAPTER_COLUMNS} FROM chapters
                     WHERE project_id = ?1 AND parent_id = ?2 ORDER BY order_idx, id"
                ),
                params![project.get(), parent.get()],
            ),
            None => query_chapters(
                &conn,
                &format!(
                    "SELECT {CHAPTER_COLUMNS} FROM chapters
                     WHERE project_id = ?1 AND parent_id IS NULL ORDER BY order_idx, id"
                ),
                params![project.get()],
            ),
        }
    }

    async fn chapter(&self, id: ChapterId) -> StoreResult<Option<ChapterNode>> {
        let conn = self.conn.lock();
        let mut nodes = query_chapters(
            &conn,
            &format!("SELECT {CHAPTER_COLUMNS} FROM chapters WHERE id = ?1"),
            params![id.get()],
        )?;
        Ok(nodes.pop())
    }

    async fn add_chapter(&self, chapter: NewChapter) -> StoreResult<ChapterId> {
        let conn = self.conn.lock();
        insert_chapter(&conn, &chapter)
    }

    async fn update_chapter(&self, id: ChapterId, patch: ChapterPatch) -> StoreResult<()> {
        let conn = self.conn.lock();
        patch_chapter(&conn, id, &patch)
    }

    async fn delete_chapter(&self, id: ChapterId) -> StoreResult<()> {
        let conn = self.conn.lock();
        remove_chapter(&conn, id)
    }

    async fn blocks_for_chapter(&self, chapter: ChapterId) -> StoreResult<Vec<BlockRecord>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare(
            "SELECT id, chapter_id, project_id, content, order_idx
             FROM blocks WHERE chapter_id = ?1 ORDER BY order_idx, id",
        )?;
        let rows = stmt.query_map(params![chapter.get()], block_from_row)?;
        let blocks = rows.collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(blocks)
    }

    async fn add_block(&self, block: NewBlock) -> StoreResult<BlockId> {
        let conn = self.conn.lock();
        insert_block(&conn, &block)
    }

    async fn update_block(&self, id: BlockId, patch: BlockPatch) -> StoreResult<()> {
        let conn = self.conn.lock();
        patch_block(&conn, id, &patch)
    }

    async fn delete_block(&self, id: BlockId) -> StoreResult<()> {
        let conn = self.conn.lock();
        remove_block(&conn, id)
    }

    async fn bulk_delete_blocks(&self, ids: &[BlockId]) -> StoreResult<()> {
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;
        for id in ids {
            remove_block(&tx, *id)?;
        }
        tx.commit()?;
        Ok(())
    }

    async fn transaction(&self, ops: Vec<WriteOp>) -> StoreResult<Vec<GeneratedId>> {
        let mut conn = self.conn.lock();
        // Dropping `tx` without commit rolls back on the first failing op
        let tx = conn.transaction()?;
        let mut generated = Vec::new();
        for op in &ops {
            if let Some(id) = apply_op(&tx, op)? {
                generated.push(id);
            }
        }
        tx.commit()?;
        Ok(generated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chapter(project: i64, parent: Option<ChapterId>, title: &str, kind: NodeKind, order: i64) -> NewChapter {
        NewChapter {
            project_id: ProjectId::new(project),
            parent_id: parent,
            title: title.into(),
            kind,
            order,
            created_at: 0,
        }
    }

    fn block(chapter: ChapterId, content: &str, order: i64) -> NewBlock {
        NewBlock {
            chapter_id: chapter,
            project_id: ProjectId::new(1),
            content: content.into(),
            order,
        }
    }

    #[tokio::test]
    async fn test_chapter_crud() {
        let db = SqliteStore::in_memory().unwrap();

        let vol = db.add_chapter(chapter(1, None, "Book One", NodeKind::Volume, 0)).await.unwrap();
        let ep = db
            .add_chapter(chapter(1, Some(vol), "Opening", NodeKind::Episode, 0))
            .await
            .unwrap();

        let loaded = db.chapter(ep).await.unwrap().unwrap();
        assert_eq!(loaded.parent_id, Some(vol));
        assert_eq!(loaded.kind, NodeKind::Episode);

        db.update_chapter(ep, ChapterPatch::title("Prologue").with_parent(None))
            .await
            .unwrap();
        let loaded = db.chapter(ep).await.unwrap().unwrap();
        assert_eq!(loaded.title, "Prologue");
        assert_eq!(loaded.parent_id, None);

        db.delete_chapter(ep).await.unwrap();
        assert!(db.chapter(ep).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_children_query_respects_parent_and_order() {
        let db = SqliteStore::in_memory().unwrap();

        let vol = db.add_chapter(chapter(1, None, "V", NodeKind::Volume, 0)).await.unwrap();
        db.add_chapter(chapter(1, Some(vol), "second", NodeKind::Chapter, 1)).await.unwrap();
        db.add_chapter(chapter(1, Some(vol), "first", NodeKind::Chapter, 0)).await.unwrap();
        db.add_chapter(chapter(2, None, "other project", NodeKind::Volume, 0)).await.unwrap();

        let children = db.chapters_for_parent(ProjectId::new(1), Some(vol)).await.unwrap();
        let titles: Vec<_> = children.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, ["first", "second"]);

        let roots = db.chapters_for_parent(ProjectId::new(1), None).await.unwrap();
        assert_eq!(roots.len(), 1);

        assert_eq!(db.chapters_for_project(ProjectId::new(1)).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn test_blocks_ordered_and_patched() {
        let db = SqliteStore::in_memory().unwrap();
        let ch = ChapterId::new(9);

        let b = db.add_block(block(ch, "B", 1)).await.unwrap();
        let a = db.add_block(block(ch, "A", 0)).await.unwrap();

        let contents: Vec<_> = db
            .blocks_for_chapter(ch)
            .await
            .unwrap()
            .into_iter()
            .map(|b| b.content)
            .collect();
        assert_eq!(contents, ["A", "B"]);

        db.update_block(a, BlockPatch::order(5)).await.unwrap();
        db.update_block(b, BlockPatch::content("B2")).await.unwrap();
        let rows = db.blocks_for_chapter(ch).await.unwrap();
        assert_eq!(rows[0].content, "B2");
        assert_eq!(rows[1].id, a);

        db.bulk_delete_blocks(&[a, b]).await.unwrap();
        assert!(db.blocks_for_chapter(ch).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_transaction_reports_generated_ids_in_order() {
        let db = SqliteStore::in_memory().unwrap();
        let ch = ChapterId::new(3);
        let existing = db.add_block(block(ch, "old", 0)).await.unwrap();

        let ids = db
            .transaction(vec![
                WriteOp::DeleteChapterBlocks(ch),
                WriteOp::AddBlock(block(ch, "x", 0)),
                WriteOp::AddBlock(block(ch, "y", 1)),
            ])
            .await
            .unwrap();

        assert_eq!(ids.len(), 2);
        let rows = db.blocks_for_chapter(ch).await.unwrap();
        assert_eq!(rows.iter().map(|r| r.id).collect::<Vec<_>>(), ids.iter().filter_map(|g| g.block()).collect::<Vec<_>>());
        assert!(rows.iter().all(|r| r.id != existing));
    }

    #[tokio::test]
    async fn test_writes_to_missing_ids_are_noops() {
        let db = SqliteStore::in_memory().unwrap();
        db.update_block(BlockId::new(404), BlockPatch::content("x")).await.unwrap();
        db.delete_block(BlockId::new(404)).await.unwrap();
        db.update_chapter(ChapterId::new(404), ChapterPatch::order(1)).await.unwrap();
    }

    #[tokio::test]
    async fn test_open_file_persists_across_handles() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("folio.db");

        let ch = {
            let db = SqliteStore::open(&path).unwrap();
            db.add_chapter(chapter(1, None, "Kept", NodeKind::Episode, 0)).await.unwrap()
        };

        let db = SqliteStore::open(&path).unwrap();
        assert_eq!(db.chapter(ch).await.unwrap().unwrap().title, "Kept");
    }
}
