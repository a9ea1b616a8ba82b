//! Catalog query functions. Each takes `&Connection` so the same function
//! serves both auto-commit pooled connections and an open
//! `rusqlite::Transaction` (which derefs to `Connection`).

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension};

use crate::error::{LayerFsError, Result};
use crate::range::Range;

use super::types::{Chunk, FileId, LayerHeader, LayerId, LayerWithChunks, VersionId, VersionInfo};

fn cat_err(op: &'static str, ctx: impl Into<String>) -> impl FnOnce(rusqlite::Error) -> LayerFsError {
    let ctx = ctx.into();
    move |e| LayerFsError::catalog(op, ctx, e)
}

pub fn get_file_id_by_name(conn: &Connection, name: &str) -> Result<FileId> {
    conn.query_row("SELECT id FROM files WHERE name = ?1", params![name], |row| row.get(0))
        .optional()
        .map_err(cat_err("get_file_id_by_name", name))?
        .ok_or_else(|| LayerFsError::NotFound(name.to_string()))
}

pub fn insert_file(conn: &Connection, name: &str) -> Result<FileId> {
    conn.execute("INSERT INTO files (name) VALUES (?1)", params![name])
        .map_err(cat_err("insert_file", name))?;
    Ok(conn.last_insert_rowid())
}

pub fn list_files(conn: &Connection) -> Result<Vec<(FileId, String)>> {
    let mut stmt = conn
        .prepare("SELECT id, name FROM files ORDER BY id ASC")
        .map_err(cat_err("list_files", "<all>"))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(cat_err("list_files", "<all>"))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(cat_err("list_files", "<all>"))
}

pub fn insert_version(conn: &Connection, tag: &str) -> Result<VersionId> {
    conn.execute(
        "INSERT INTO versions (tag, created_at) VALUES (?1, ?2)",
        params![tag, Utc::now().to_rfc3339()],
    )
    .map_err(cat_err("insert_version", tag))?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_layer(
    conn: &Connection,
    file_id: FileId,
    version_id: VersionId,
    object_key: &str,
) -> Result<LayerId> {
    conn.execute(
        "INSERT INTO snapshot_layers (file_id, version_id, object_key, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![file_id, version_id, object_key, Utc::now().to_rfc3339()],
    )
    .map_err(cat_err("insert_layer", object_key))?;
    Ok(conn.last_insert_rowid())
}

pub fn insert_chunk(conn: &Connection, layer_id: LayerId, layer_range: Range, file_range: Range) -> Result<()> {
    conn.execute(
        "INSERT INTO chunks (snapshot_layer_id, layer_range, file_range, created_at) VALUES (?1, ?2, ?3, ?4)",
        params![
            layer_id,
            layer_range.to_string(),
            file_range.to_string(),
            Utc::now().to_rfc3339()
        ],
    )
    .map_err(cat_err("insert_chunk", layer_id.to_string()))?;
    Ok(())
}

/// Returns the empty string if the layer has no recorded object key
/// (notably, if the layer doesn't exist at all).
pub fn get_object_key(conn: &Connection, layer_id: LayerId) -> Result<String> {
    conn.query_row(
        "SELECT object_key FROM snapshot_layers WHERE id = ?1",
        params![layer_id],
        |row| row.get(0),
    )
    .optional()
    .map_err(cat_err("get_object_key", layer_id.to_string()))
    .map(|opt: Option<String>| opt.unwrap_or_default())
}

fn layer_header_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<LayerHeader> {
    let created_at: String = row.get(4)?;
    Ok(LayerHeader {
        id: row.get(0)?,
        file_id: row.get(1)?,
        version_id: row.get(2)?,
        object_key: row.get(3)?,
        created_at: created_at
            .parse()
            .unwrap_or_else(|_| Utc::now()),
    })
}

pub fn list_layers(conn: &Connection, file_id: FileId) -> Result<Vec<LayerHeader>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, file_id, version_id, object_key, created_at \
             FROM snapshot_layers WHERE file_id = ?1 ORDER BY id ASC",
        )
        .map_err(cat_err("list_layers", file_id.to_string()))?;
    let rows = stmt
        .query_map(params![file_id], layer_header_from_row)
        .map_err(cat_err("list_layers", file_id.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(cat_err("list_layers", file_id.to_string()))
}

fn chunk_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<Chunk> {
    let layer_range: String = row.get(2)?;
    let file_range: String = row.get(3)?;
    Ok(Chunk {
        id: row.get(0)?,
        layer_id: row.get(1)?,
        layer_range: layer_range
            .parse()
            .map_err(|_| rusqlite::Error::InvalidColumnType(2, "layer_range".into(), rusqlite::types::Type::Text))?,
        file_range: file_range
            .parse()
            .map_err(|_| rusqlite::Error::InvalidColumnType(3, "file_range".into(), rusqlite::types::Type::Text))?,
    })
}

pub fn get_layer_chunks(conn: &Connection, layer_id: LayerId) -> Result<Vec<Chunk>> {
    let mut stmt = conn
        .prepare(
            "SELECT id, snapshot_layer_id, layer_range, file_range \
             FROM chunks WHERE snapshot_layer_id = ?1 ORDER BY id ASC",
        )
        .map_err(cat_err("get_layer_chunks", layer_id.to_string()))?;
    let rows = stmt
        .query_map(params![layer_id], chunk_from_row)
        .map_err(cat_err("get_layer_chunks", layer_id.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(cat_err("get_layer_chunks", layer_id.to_string()))
}

/// `MAX(file_range.hi)` across all persisted chunks of `file_id`, 0 if none.
///
/// The range text is parsed in Rust rather than inside SQL: extracting the
/// second integer out of `"[lo,hi)"` with `substr`/`instr` is fragile to get
/// right, and this table is small enough that a full scan is cheap.
pub fn calc_persisted_size(conn: &Connection, file_id: FileId) -> Result<u64> {
    let mut stmt = conn
        .prepare(
            "SELECT c.file_range FROM chunks c \
             JOIN snapshot_layers l ON c.snapshot_layer_id = l.id \
             WHERE l.file_id = ?1",
        )
        .map_err(cat_err("calc_persisted_size", file_id.to_string()))?;

    let rows = stmt
        .query_map(params![file_id], |row| row.get::<_, String>(0))
        .map_err(cat_err("calc_persisted_size", file_id.to_string()))?;

    let mut max_hi = 0u64;
    for row in rows {
        let text = row.map_err(cat_err("calc_persisted_size", file_id.to_string()))?;
        let range: Range = text
            .parse()
            .map_err(|_: LayerFsError| LayerFsError::InvalidRange(text.clone()))?;
        max_hi = max_hi.max(range.hi);
    }

    Ok(max_hi)
}

pub fn get_layer_by_version(conn: &Connection, file_id: FileId, tag: &str) -> Result<LayerWithChunks> {
    let layer: Option<LayerHeader> = conn
        .query_row(
            "SELECT l.id, l.file_id, l.version_id, l.object_key, l.created_at \
             FROM snapshot_layers l JOIN versions v ON l.version_id = v.id \
             WHERE l.file_id = ?1 AND v.tag = ?2 \
             ORDER BY l.id DESC LIMIT 1",
            params![file_id, tag],
            layer_header_from_row,
        )
        .optional()
        .map_err(cat_err("get_layer_by_version", tag))?;

    let layer = layer.ok_or_else(|| LayerFsError::VersionNotFound {
        file: file_id.to_string(),
        tag: tag.to_string(),
    })?;

    let chunks = get_layer_chunks(conn, layer.id)?;
    Ok(LayerWithChunks { layer, chunks })
}

/// Chunks whose owning layer belongs to `file_id` (and, if `max_layer_id` is
/// given, has `layer_id <= max_layer_id`) and whose `file_range` overlaps
/// `query_range`. Ordered by layer id ascending, then chunk id ascending;
/// this ordering is the shadow-replay order.
pub fn overlapping_chunks(
    conn: &Connection,
    file_id: FileId,
    query_range: Range,
    max_layer_id: Option<LayerId>,
) -> Result<Vec<Chunk>> {
    let mut stmt = conn
        .prepare(
            "SELECT c.id, c.snapshot_layer_id, c.layer_range, c.file_range \
             FROM chunks c JOIN snapshot_layers l ON c.snapshot_layer_id = l.id \
             WHERE l.file_id = ?1 AND (?2 IS NULL OR l.id <= ?2) \
             ORDER BY l.id ASC, c.id ASC",
        )
        .map_err(cat_err("overlapping_chunks", file_id.to_string()))?;

    let rows = stmt
        .query_map(params![file_id, max_layer_id], chunk_from_row)
        .map_err(cat_err("overlapping_chunks", file_id.to_string()))?;

    let all = rows
        .collect::<rusqlite::Result<Vec<Chunk>>>()
        .map_err(cat_err("overlapping_chunks", file_id.to_string()))?;

    Ok(all
        .into_iter()
        .filter(|c| c.file_range.overlaps(&query_range))
        .collect())
}

pub fn set_head(conn: &Connection, file_id: FileId, version_id: VersionId) -> Result<()> {
    conn.execute(
        "INSERT INTO heads (file_id, version_id, created_at) VALUES (?1, ?2, ?3) \
         ON CONFLICT(file_id) DO UPDATE SET version_id = excluded.version_id, created_at = excluded.created_at",
        params![file_id, version_id, Utc::now().to_rfc3339()],
    )
    .map_err(cat_err("set_head", file_id.to_string()))?;
    Ok(())
}

pub fn get_head_version(conn: &Connection, file_id: FileId) -> Result<(VersionId, String)> {
    conn.query_row(
        "SELECT v.id, v.tag FROM heads h JOIN versions v ON h.version_id = v.id WHERE h.file_id = ?1",
        params![file_id],
        |row| Ok((row.get(0)?, row.get(1)?)),
    )
    .optional()
    .map_err(cat_err("get_head_version", file_id.to_string()))?
    .ok_or_else(|| LayerFsError::NotFound(format!("head for file id {file_id}")))
}

pub fn delete_head(conn: &Connection, file_id: FileId) -> Result<()> {
    conn.execute("DELETE FROM heads WHERE file_id = ?1", params![file_id])
        .map_err(cat_err("delete_head", file_id.to_string()))?;
    Ok(())
}

pub fn list_heads(conn: &Connection) -> Result<Vec<(String, String)>> {
    let mut stmt = conn
        .prepare(
            "SELECT f.name, v.tag FROM heads h \
             JOIN files f ON h.file_id = f.id \
             JOIN versions v ON h.version_id = v.id \
             ORDER BY f.name ASC",
        )
        .map_err(cat_err("list_heads", "<all>"))?;
    let rows = stmt
        .query_map([], |row| Ok((row.get(0)?, row.get(1)?)))
        .map_err(cat_err("list_heads", "<all>"))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(cat_err("list_heads", "<all>"))
}

pub fn list_file_versions(conn: &Connection, file_id: FileId) -> Result<Vec<VersionInfo>> {
    let mut stmt = conn
        .prepare(
            "SELECT DISTINCT v.id, v.tag, v.created_at \
             FROM versions v JOIN snapshot_layers l ON l.version_id = v.id \
             WHERE l.file_id = ?1 ORDER BY v.id ASC",
        )
        .map_err(cat_err("list_file_versions", file_id.to_string()))?;
    let rows = stmt
        .query_map(params![file_id], |row| {
            let created_at: String = row.get(2)?;
            Ok(VersionInfo {
                id: row.get(0)?,
                tag: row.get(1)?,
                created_at: created_at.parse().unwrap_or_else(|_| Utc::now()),
            })
        })
        .map_err(cat_err("list_file_versions", file_id.to_string()))?;
    rows.collect::<rusqlite::Result<Vec<_>>>()
        .map_err(cat_err("list_file_versions", file_id.to_string()))
}
