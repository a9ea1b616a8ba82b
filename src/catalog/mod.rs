//! Transactional mapping of files → layers → chunks, versions, and head
//! pointers, backed by SQLite.

mod queries;
mod schema;
mod types;

pub use types::{Chunk, FileId, LayerHeader, LayerId, LayerWithChunks, VersionId, VersionInfo};

use r2d2::Pool;
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{Connection, TransactionBehavior};

use crate::error::Result;
use crate::range::Range;

/// Owns the connection pool behind the catalog. Methods that need
/// cross-call consistency accept a `&Connection` borrowed from a
/// transaction the caller opened with [`SqliteCatalog::begin_read`] or
/// [`SqliteCatalog::begin_write`]; the rest open and release a pooled
/// connection per call (auto-commit).
pub struct SqliteCatalog {
    pool: Pool<SqliteConnectionManager>,
}

impl SqliteCatalog {
    pub fn open(path: &str) -> Result<Self> {
        let manager = SqliteConnectionManager::file(path);
        let pool = Pool::new(manager).map_err(crate::error::LayerFsError::CatalogPoolError)?;
        let conn = pool.get().map_err(crate::error::LayerFsError::CatalogPoolError)?;
        schema::init(&conn)?;
        Ok(Self { pool })
    }

    /// In-memory catalog for tests: a fresh, empty database per instance.
    pub fn open_in_memory() -> Result<Self> {
        let manager = SqliteConnectionManager::memory();
        let pool = Pool::builder()
            .max_size(1) // `:memory:` databases are connection-local; one connection keeps them alive and consistent.
            .build(manager)
            .map_err(crate::error::LayerFsError::CatalogPoolError)?;
        let conn = pool.get().map_err(crate::error::LayerFsError::CatalogPoolError)?;
        schema::init(&conn)?;
        Ok(Self { pool })
    }

    fn conn(&self) -> Result<r2d2::PooledConnection<SqliteConnectionManager>> {
        self.pool.get().map_err(crate::error::LayerFsError::CatalogPoolError)
    }

    /// Opens a deferred, read-only transaction: the serializability
    /// boundary for `read`.
    pub fn begin_read(&self) -> Result<CatalogTx> {
        let conn = self.conn()?;
        CatalogTx::new(conn, TransactionBehavior::Deferred, true)
    }

    /// Opens an immediate transaction: the serializability boundary for
    /// `checkpoint`, `set_head`, and `delete_head`.
    pub fn begin_write(&self) -> Result<CatalogTx> {
        let conn = self.conn()?;
        CatalogTx::new(conn, TransactionBehavior::Immediate, false)
    }

    pub fn get_file_id_by_name(&self, name: &str) -> Result<FileId> {
        queries::get_file_id_by_name(&self.conn()?, name)
    }

    pub fn insert_file(&self, name: &str) -> Result<FileId> {
        queries::insert_file(&self.conn()?, name)
    }

    pub fn list_files(&self) -> Result<Vec<(FileId, String)>> {
        queries::list_files(&self.conn()?)
    }

    pub fn get_object_key(&self, layer_id: LayerId) -> Result<String> {
        queries::get_object_key(&self.conn()?, layer_id)
    }

    pub fn list_layers(&self, file_id: FileId) -> Result<Vec<LayerHeader>> {
        queries::list_layers(&self.conn()?, file_id)
    }

    pub fn calc_persisted_size(&self, file_id: FileId) -> Result<u64> {
        queries::calc_persisted_size(&self.conn()?, file_id)
    }

    pub fn get_layer_chunks(&self, layer_id: LayerId) -> Result<Vec<Chunk>> {
        queries::get_layer_chunks(&self.conn()?, layer_id)
    }

    pub fn list_heads(&self) -> Result<Vec<(String, String)>> {
        queries::list_heads(&self.conn()?)
    }

    pub fn list_file_versions(&self, file_id: FileId) -> Result<Vec<VersionInfo>> {
        queries::list_file_versions(&self.conn()?, file_id)
    }
}

/// A scope-bound catalog transaction. `rusqlite::Transaction` rolls back on
/// drop unless [`CatalogTx::commit`] is called, which is exactly the
/// "guaranteed rollback on every non-commit exit" the manager relies on.
pub struct CatalogTx {
    conn: r2d2::PooledConnection<SqliteConnectionManager>,
    read_only: bool,
    committed: bool,
}

impl CatalogTx {
    fn new(
        mut conn: r2d2::PooledConnection<SqliteConnectionManager>,
        behavior: TransactionBehavior,
        read_only: bool,
    ) -> Result<Self> {
        if read_only {
            conn.pragma_update(None, "query_only", true)
                .map_err(|e| crate::error::LayerFsError::catalog("begin_read", "<catalog>", e))?;
        }
        // The rusqlite::Transaction type borrows `conn` for its lifetime, which
        // doesn't compose with storing both in the same struct; instead we
        // start the underlying SQL transaction directly and commit/rollback
        // it ourselves, mirroring what `Transaction::new` does internally.
        let sql = match behavior {
            TransactionBehavior::Deferred => "BEGIN DEFERRED",
            TransactionBehavior::Immediate => "BEGIN IMMEDIATE",
            TransactionBehavior::Exclusive => "BEGIN EXCLUSIVE",
            _ => "BEGIN DEFERRED",
        };
        conn.execute_batch(sql)
            .map_err(|e| crate::error::LayerFsError::catalog("begin", "<catalog>", e))?;
        Ok(Self {
            conn,
            read_only,
            committed: false,
        })
    }

    pub fn connection(&self) -> &Connection {
        &self.conn
    }

    pub fn commit(mut self) -> Result<()> {
        self.conn
            .execute_batch("COMMIT")
            .map_err(|e| crate::error::LayerFsError::catalog("commit", "<catalog>", e))?;
        self.committed = true;
        Ok(())
    }

    pub fn get_file_id_by_name(&self, name: &str) -> Result<FileId> {
        queries::get_file_id_by_name(self.connection(), name)
    }

    pub fn get_object_key(&self, layer_id: LayerId) -> Result<String> {
        queries::get_object_key(self.connection(), layer_id)
    }

    pub fn get_head_version(&self, file_id: FileId) -> Result<(VersionId, String)> {
        queries::get_head_version(self.connection(), file_id)
    }

    pub fn insert_version(&self, tag: &str) -> Result<VersionId> {
        queries::insert_version(self.connection(), tag)
    }

    pub fn insert_layer(&self, file_id: FileId, version_id: VersionId, object_key: &str) -> Result<LayerId> {
        queries::insert_layer(self.connection(), file_id, version_id, object_key)
    }

    pub fn insert_chunk(&self, layer_id: LayerId, layer_range: Range, file_range: Range) -> Result<()> {
        queries::insert_chunk(self.connection(), layer_id, layer_range, file_range)
    }

    pub fn get_layer_by_version(&self, file_id: FileId, tag: &str) -> Result<LayerWithChunks> {
        queries::get_layer_by_version(self.connection(), file_id, tag)
    }

    pub fn overlapping_chunks(
        &self,
        file_id: FileId,
        query_range: Range,
        max_layer_id: Option<LayerId>,
    ) -> Result<Vec<Chunk>> {
        queries::overlapping_chunks(self.connection(), file_id, query_range, max_layer_id)
    }

    pub fn set_head(&self, file_id: FileId, version_id: VersionId) -> Result<()> {
        queries::set_head(self.connection(), file_id, version_id)
    }

    pub fn delete_head(&self, file_id: FileId) -> Result<()> {
        queries::delete_head(self.connection(), file_id)
    }
}

impl Drop for CatalogTx {
    fn drop(&mut self) {
        if !self.committed {
            let _ = self.conn.execute_batch("ROLLBACK");
        }
        if self.read_only {
            let _ = self.conn.pragma_update(None, "query_only", false);
        }
    }
}
