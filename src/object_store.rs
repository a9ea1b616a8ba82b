//! The object-store client: `put`/`range_get` against a blob backend.
//!
//! The manager converts its internal half-open `[lo, hi)` ranges to the
//! store's inclusive `[lo, hi]` convention by subtracting one from `hi`
//! before calling [`ObjectStore::range_get`] (see `manager.rs`).

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::RwLock;
use s3::bucket::Bucket;
use s3::creds::Credentials;
use s3::region::Region;

use crate::error::{LayerFsError, Result};

#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Uploads `bytes` under `key`, fully replacing any prior object there.
    async fn put(&self, key: &str, bytes: Bytes) -> Result<()>;

    /// Returns the byte slice in the **inclusive** range `[lo, hi]`.
    async fn range_get(&self, key: &str, lo: u64, hi: u64) -> Result<Bytes>;
}

/// S3-compatible object store, backing checkpoint blobs.
pub struct S3ObjectStore {
    bucket: Box<Bucket>,
}

impl S3ObjectStore {
    pub fn new(bucket_name: &str, endpoint: &str, region: &str, access_key: &str, secret_key: &str) -> Result<Self> {
        let region = Region::Custom {
            region: region.to_string(),
            endpoint: endpoint.to_string(),
        };
        let credentials = Credentials::new(Some(access_key), Some(secret_key), None, None, None)
            .map_err(|e| LayerFsError::object_store("configure", bucket_name, e))?;

        let bucket = Bucket::new(bucket_name, region, credentials)
            .map_err(|e| LayerFsError::object_store("configure", bucket_name, e))?
            .with_path_style();

        Ok(Self { bucket })
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<()> {
        self.bucket
            .put_object(key, &bytes)
            .await
            .map_err(|e| LayerFsError::object_store("put", key, e))?;
        Ok(())
    }

    async fn range_get(&self, key: &str, lo: u64, hi: u64) -> Result<Bytes> {
        let response = self
            .bucket
            .get_object_range(key, lo, Some(hi))
            .await
            .map_err(|e| LayerFsError::object_store("range_get", key, e))?;
        Ok(Bytes::from(response.bytes().to_vec()))
    }
}

/// In-memory object store used by tests and as a local development backend.
#[derive(Default)]
pub struct MemoryObjectStore {
    objects: RwLock<HashMap<String, Bytes>>,
}

impl MemoryObjectStore {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, bytes: Bytes) -> Result<()> {
        self.objects.write().insert(key.to_string(), bytes);
        Ok(())
    }

    async fn range_get(&self, key: &str, lo: u64, hi: u64) -> Result<Bytes> {
        let objects = self.objects.read();
        let bytes = objects
            .get(key)
            .ok_or_else(|| LayerFsError::object_store("range_get", key, "no such object"))?;

        let lo = lo as usize;
        let hi_inclusive_end = hi as usize + 1;
        if hi_inclusive_end > bytes.len() || lo > hi as usize {
            return Err(LayerFsError::object_store(
                "range_get",
                key,
                format!("range [{lo},{hi}] out of bounds for object of length {}", bytes.len()),
            ));
        }

        Ok(bytes.slice(lo..hi_inclusive_end))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn memory_store_round_trips_inclusive_range() {
        let store = MemoryObjectStore::new();
        store.put("k", Bytes::from_static(b"hello world")).await.unwrap();

        let got = store.range_get("k", 0, 4).await.unwrap();
        assert_eq!(&got[..], b"hello");

        let got = store.range_get("k", 6, 10).await.unwrap();
        assert_eq!(&got[..], b"world");
    }

    #[tokio::test]
    async fn memory_store_errors_on_missing_key() {
        let store = MemoryObjectStore::new();
        assert!(store.range_get("nope", 0, 1).await.is_err());
    }

    #[tokio::test]
    async fn memory_store_errors_on_out_of_bounds_range() {
        let store = MemoryObjectStore::new();
        store.put("k", Bytes::from_static(b"abc")).await.unwrap();
        assert!(store.range_get("k", 0, 10).await.is_err());
    }
}
