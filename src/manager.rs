//! The storage manager: the public API that ties the catalog, the
//! object-store client, and the active-layer memtable together.

use std::sync::Arc;

use bytes::Bytes;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::catalog::{FileId, SqliteCatalog, VersionInfo};
use crate::error::{LayerFsError, Result};
use crate::memtable::Memtable;
use crate::object_store::ObjectStore;
use crate::range::Range;

fn check_cancelled(token: &CancellationToken, op: &'static str) -> Result<()> {
    if token.is_cancelled() {
        Err(LayerFsError::Cancelled(op))
    } else {
        Ok(())
    }
}

/// Races `fut` against `token.cancelled()`, per §5: every `.await` the
/// manager performs is raced this way, not just checked before/after. If the
/// token fires first, `fut` is dropped without completing and whatever it
/// was doing (a catalog transaction borrowed from an outer scope, an
/// in-flight object-store call) is abandoned. A borrowed `CatalogTx` then
/// rolls back on its own drop once the caller returns the `Cancelled` error.
async fn race<F: std::future::Future>(token: &CancellationToken, op: &'static str, fut: F) -> Result<F::Output> {
    tokio::select! {
        out = fut => Ok(out),
        _ = token.cancelled() => Err(LayerFsError::Cancelled(op)),
    }
}

/// A chunk resolved during a read, tagged with where its bytes live.
enum SourceChunk {
    Persisted {
        layer_id: i64,
        layer_range: Range,
        file_range: Range,
    },
    Active {
        layer_range: Range,
        file_range: Range,
    },
}

impl SourceChunk {
    fn file_range(&self) -> Range {
        match self {
            SourceChunk::Persisted { file_range, .. } => *file_range,
            SourceChunk::Active { file_range, .. } => *file_range,
        }
    }
}

/// Ties together a [`SqliteCatalog`] and an [`ObjectStore`] behind the
/// single process-wide lock §5 of the spec calls for. Cloning the manager
/// is cheap (it's a thin `Arc` wrapper) and clones share the same lock and
/// backends.
#[derive(Clone)]
pub struct StorageManager {
    catalog: Arc<SqliteCatalog>,
    object_store: Arc<dyn ObjectStore>,
    memtable: Arc<RwLock<Memtable>>,
}

impl StorageManager {
    pub fn new(catalog: Arc<SqliteCatalog>, object_store: Arc<dyn ObjectStore>) -> Self {
        Self {
            catalog,
            object_store,
            memtable: Arc::new(RwLock::new(Memtable::default())),
        }
    }

    pub fn insert_file(&self, name: &str) -> Result<FileId> {
        let id = self.catalog.insert_file(name)?;
        info!(file = name, file_id = id, "inserted file");
        Ok(id)
    }

    pub async fn write(&self, token: &CancellationToken, name: &str, data: &[u8], offset: u64) -> Result<()> {
        check_cancelled(token, "write")?;

        let mut memtable = race(token, "write", self.memtable.write()).await?;
        check_cancelled(token, "write")?;

        let file_id = self.catalog.get_file_id_by_name(name)?;

        if self.catalog_head(file_id)?.is_some() {
            return Err(LayerFsError::ReadOnly(name.to_string()));
        }

        let persisted_size = self.catalog.calc_persisted_size(file_id)?;
        let active = memtable.get_or_create(file_id);
        let current_size = persisted_size.max(active.file_end());

        if offset > current_size {
            active.append_zero_pad(current_size, offset);
        }
        active.append_data(offset, data);

        info!(file = name, offset, len = data.len(), "wrote data chunk");
        Ok(())
    }

    pub async fn read(&self, token: &CancellationToken, name: &str, offset: u64, size: u64) -> Result<Bytes> {
        check_cancelled(token, "read")?;

        // Held for the whole call, including the object-store awaits below:
        // a read and an in-progress checkpoint must be mutually exclusive
        // (§5), and this is the lock that provides that boundary.
        let memtable = race(token, "read", self.memtable.read()).await?;

        let tx = self.catalog.begin_read()?;
        let file_id = tx.get_file_id_by_name(name)?;

        let max_layer_id = match tx.get_head_version(file_id) {
            Ok((_version_id, tag)) => Some(tx.get_layer_by_version(file_id, &tag)?.layer.id),
            Err(LayerFsError::NotFound(_)) => None,
            Err(e) => return Err(e),
        };

        let query_range = Range::new(offset, offset + size);

        let mut sources: Vec<SourceChunk> = tx
            .overlapping_chunks(file_id, query_range, max_layer_id)?
            .into_iter()
            .map(|c| SourceChunk::Persisted {
                layer_id: c.layer_id,
                layer_range: c.layer_range,
                file_range: c.file_range,
            })
            .collect();

        if max_layer_id.is_none() {
            if let Some(active) = memtable.get(file_id) {
                sources.extend(
                    active
                        .chunks
                        .iter()
                        .filter(|c| c.file_range.overlaps(&query_range))
                        .map(|c| SourceChunk::Active {
                            layer_range: c.layer_range,
                            file_range: c.file_range,
                        }),
                );
            }
        }

        check_cancelled(token, "read")?;

        let max_end = sources.iter().map(|s| s.file_range().hi).max().unwrap_or(offset);
        let mut result = vec![0u8; (max_end.saturating_sub(offset)) as usize];

        for source in &sources {
            check_cancelled(token, "read")?;

            let data: Bytes = match source {
                SourceChunk::Persisted {
                    layer_id,
                    layer_range,
                    ..
                } => {
                    let object_key = tx.get_object_key(*layer_id)?;
                    let bytes = race(
                        token,
                        "read",
                        self.object_store.range_get(&object_key, layer_range.lo, layer_range.hi - 1),
                    )
                    .await??;
                    if bytes.len() as u64 != layer_range.width() {
                        return Err(LayerFsError::CorruptChunk {
                            expected: layer_range.width(),
                            got: bytes.len() as u64,
                        });
                    }
                    bytes
                }
                SourceChunk::Active { layer_range, .. } => {
                    let active = memtable
                        .get(file_id)
                        .expect("active chunk resolved from a memtable that must still hold it");
                    active.slice(*layer_range)
                }
            };

            let file_range = source.file_range();
            if let Some(intersection) = file_range.intersect(&query_range) {
                let data_start = (intersection.lo - file_range.lo) as usize;
                let data_end = data_start + intersection.width() as usize;
                let dest_start = (intersection.lo - offset) as usize;
                let dest_end = dest_start + intersection.width() as usize;
                result[dest_start..dest_end].copy_from_slice(&data[data_start..data_end]);
            }
        }

        result.truncate(size.min(result.len() as u64) as usize);
        tx.commit()?;
        Ok(Bytes::from(result))
    }

    pub async fn size_of(&self, token: &CancellationToken, name: &str) -> Result<u64> {
        check_cancelled(token, "size_of")?;

        let memtable = race(token, "size_of", self.memtable.read()).await?;
        let file_id = self.catalog.get_file_id_by_name(name)?;
        let persisted_end = self.catalog.calc_persisted_size(file_id)?;
        let active_end = memtable.get(file_id).map(|l| l.file_end()).unwrap_or(0);

        Ok(persisted_end.max(active_end))
    }

    pub async fn checkpoint(&self, token: &CancellationToken, name: &str, version_tag: &str) -> Result<()> {
        check_cancelled(token, "checkpoint")?;

        let mut memtable = race(token, "checkpoint", self.memtable.write()).await?;
        check_cancelled(token, "checkpoint")?;

        let tx = self.catalog.begin_write()?;

        let file_id = match tx.get_file_id_by_name(name) {
            Ok(id) => id,
            Err(LayerFsError::NotFound(_)) => return Ok(()),
            Err(e) => return Err(e),
        };

        if tx.get_head_version(file_id).is_ok() {
            return Err(LayerFsError::ReadOnly(name.to_string()));
        }

        let active = match memtable.get(file_id) {
            Some(active) if !active.is_empty() => active,
            _ => return Ok(()),
        };

        let version_id = tx.insert_version(version_tag)?;
        let object_key = format!("layers/{name}/{file_id}-{version_id}");

        check_cancelled(token, "checkpoint")?;
        race(
            token,
            "checkpoint",
            self.object_store.put(&object_key, Bytes::copy_from_slice(&active.buffer)),
        )
        .await??;
        // `tx` is still un-committed here: if the token fired while `put` was
        // in flight, the function already returned `Cancelled` above and this
        // line never runs, so `tx` drops and rolls back without persisting
        // the chunks or the object key this upload produced.

        let layer_id = tx.insert_layer(file_id, version_id, &object_key)?;
        for chunk in &active.chunks {
            tx.insert_chunk(layer_id, chunk.layer_range, chunk.file_range)?;
        }

        tx.commit()?;
        memtable.remove(file_id);

        info!(file = name, tag = version_tag, layer_id, "checkpoint committed");
        Ok(())
    }

    pub async fn set_head(&self, token: &CancellationToken, name: &str, version_tag: &str) -> Result<()> {
        check_cancelled(token, "set_head")?;

        let _memtable = race(token, "set_head", self.memtable.write()).await?;
        check_cancelled(token, "set_head")?;

        let tx = self.catalog.begin_write()?;
        let file_id = tx.get_file_id_by_name(name)?;
        let layer = tx.get_layer_by_version(file_id, version_tag)?;
        let version_id = layer.layer.version_id.ok_or_else(|| LayerFsError::VersionNotFound {
            file: name.to_string(),
            tag: version_tag.to_string(),
        })?;
        tx.set_head(file_id, version_id)?;
        tx.commit()?;

        info!(file = name, tag = version_tag, "head set");
        Ok(())
    }

    pub async fn get_head(&self, token: &CancellationToken, name: &str) -> Result<String> {
        check_cancelled(token, "get_head")?;

        let _memtable = race(token, "get_head", self.memtable.read()).await?;
        let file_id = self.catalog.get_file_id_by_name(name)?;

        match self.catalog_head(file_id)? {
            Some((_version_id, tag)) => Ok(tag),
            None => Ok(String::new()),
        }
    }

    pub async fn delete_head(&self, token: &CancellationToken, name: &str) -> Result<()> {
        check_cancelled(token, "delete_head")?;

        let _memtable = race(token, "delete_head", self.memtable.write()).await?;
        check_cancelled(token, "delete_head")?;

        let tx = self.catalog.begin_write()?;
        let file_id = tx.get_file_id_by_name(name)?;
        tx.delete_head(file_id)?;
        tx.commit()?;

        warn!(file = name, "head deleted; file is writable again");
        Ok(())
    }

    pub async fn list_versions(&self, token: &CancellationToken, name: &str) -> Result<Vec<VersionInfo>> {
        check_cancelled(token, "list_versions")?;

        let _memtable = race(token, "list_versions", self.memtable.read()).await?;
        let file_id = self.catalog.get_file_id_by_name(name)?;
        self.catalog.list_file_versions(file_id)
    }

    pub async fn list_files(&self, token: &CancellationToken) -> Result<Vec<(FileId, String)>> {
        check_cancelled(token, "list_files")?;
        let _memtable = race(token, "list_files", self.memtable.read()).await?;
        self.catalog.list_files()
    }

    pub async fn list_heads(&self, token: &CancellationToken) -> Result<Vec<(String, String)>> {
        check_cancelled(token, "list_heads")?;
        let _memtable = race(token, "list_heads", self.memtable.read()).await?;
        self.catalog.list_heads()
    }

    /// Number of files currently holding an active layer, for the
    /// `layerfs_active_layers` gauge.
    pub async fn active_layer_count(&self, token: &CancellationToken) -> Result<usize> {
        check_cancelled(token, "active_layer_count")?;
        let memtable = race(token, "active_layer_count", self.memtable.read()).await?;
        Ok(memtable.len())
    }

    /// `Some((version_id, tag))` if `file_id` has a head set, `None`
    /// otherwise. Only catalog errors other than "no head" propagate.
    fn catalog_head(&self, file_id: FileId) -> Result<Option<(i64, String)>> {
        let tx = self.catalog.begin_read()?;
        match tx.get_head_version(file_id) {
            Ok(v) => {
                tx.commit()?;
                Ok(Some(v))
            }
            Err(LayerFsError::NotFound(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }
}
