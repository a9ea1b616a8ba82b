//! DDL for the catalog database. Ranges are stored as `TEXT` using the
//! `"[lo,hi)"` grammar from `range.rs`; `created_at` columns are RFC3339
//! text produced by `chrono`.

use rusqlite::Connection;

use crate::error::{LayerFsError, Result};

const DDL: &str = r#"
CREATE TABLE IF NOT EXISTS files (
    id   INTEGER PRIMARY KEY,
    name TEXT NOT NULL UNIQUE
);

CREATE TABLE IF NOT EXISTS versions (
    id         INTEGER PRIMARY KEY,
    tag        TEXT NOT NULL,
    created_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS snapshot_layers (
    id         INTEGER PRIMARY KEY,
    file_id    INTEGER NOT NULL REFERENCES files(id),
    version_id INTEGER REFERENCES versions(id),
    object_key TEXT NOT NULL,
    created_at TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_snapshot_layers_file ON snapshot_layers(file_id);

CREATE TABLE IF NOT EXISTS chunks (
    id                INTEGER PRIMARY KEY,
    snapshot_layer_id INTEGER NOT NULL REFERENCES snapshot_layers(id),
    layer_range       TEXT NOT NULL,
    file_range        TEXT NOT NULL,
    created_at        TEXT NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_chunks_layer ON chunks(snapshot_layer_id);

CREATE TABLE IF NOT EXISTS heads (
    id         INTEGER PRIMARY KEY,
    file_id    INTEGER NOT NULL UNIQUE REFERENCES files(id),
    version_id INTEGER NOT NULL REFERENCES versions(id),
    created_at TEXT NOT NULL
);

-- Not a uniqueness constraint: the source of this engine never enforced
-- tag uniqueness per file, only indexed lookup. See DESIGN.md.
CREATE INDEX IF NOT EXISTS idx_snapshot_layers_version ON snapshot_layers(version_id);
CREATE INDEX IF NOT EXISTS idx_versions_tag ON versions(tag);
"#;

pub fn init(conn: &Connection) -> Result<()> {
    conn.execute_batch(DDL)
        .map_err(|e| LayerFsError::catalog("init_schema", "<catalog>", e))
}
