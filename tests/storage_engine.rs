use std::sync::Arc;

use layerfs::{MemoryObjectStore, SqliteCatalog, StorageManager};
use tokio_util::sync::CancellationToken;

fn new_manager() -> StorageManager {
    let catalog = Arc::new(SqliteCatalog::open_in_memory().unwrap());
    let object_store = MemoryObjectStore::new();
    StorageManager::new(catalog, object_store)
}

fn token() -> CancellationToken {
    CancellationToken::new()
}

#[tokio::test]
async fn single_write_reads_back_exactly() {
    let manager = new_manager();
    manager.insert_file("table.parquet").unwrap();

    manager
        .write(&token(), "table.parquet", b"hello world", 0)
        .await
        .unwrap();

    let data = manager.read(&token(), "table.parquet", 0, 11).await.unwrap();
    assert_eq!(&data[..], b"hello world");
    assert_eq!(manager.size_of(&token(), "table.parquet").await.unwrap(), 11);
}

#[tokio::test]
async fn sparse_write_materializes_zeros_in_the_gap() {
    let manager = new_manager();
    manager.insert_file("sparse").unwrap();

    manager.write(&token(), "sparse", b"AB", 0).await.unwrap();
    manager.write(&token(), "sparse", b"XY", 10).await.unwrap();

    let data = manager.read(&token(), "sparse", 0, 12).await.unwrap();
    assert_eq!(&data[..2], b"AB");
    assert_eq!(&data[2..10], &[0u8; 8]);
    assert_eq!(&data[10..12], b"XY");
    assert_eq!(manager.size_of(&token(), "sparse").await.unwrap(), 12);
}

#[tokio::test]
async fn later_writes_shadow_earlier_ones_at_overlapping_offsets() {
    let manager = new_manager();
    manager.insert_file("overlap").unwrap();

    manager.write(&token(), "overlap", b"aaaaaaaaaa", 0).await.unwrap();
    manager.checkpoint(&token(), "overlap", "v1").await.unwrap();

    manager.write(&token(), "overlap", b"bbbb", 3).await.unwrap();

    let data = manager.read(&token(), "overlap", 0, 10).await.unwrap();
    assert_eq!(&data[..], b"aaabbbbaaa");
}

#[tokio::test]
async fn shadowing_survives_a_checkpoint_in_between() {
    let manager = new_manager();
    manager.insert_file("layered").unwrap();

    manager.write(&token(), "layered", b"aaaaaaaaaa", 0).await.unwrap();
    manager.checkpoint(&token(), "layered", "v1").await.unwrap();

    manager.write(&token(), "layered", b"bbbb", 3).await.unwrap();
    manager.checkpoint(&token(), "layered", "v2").await.unwrap();

    manager.write(&token(), "layered", b"cc", 5).await.unwrap();

    let data = manager.read(&token(), "layered", 0, 10).await.unwrap();
    assert_eq!(&data[..], b"aaabbccbaa");
}

#[tokio::test]
async fn pinning_a_head_makes_the_file_read_only_until_deleted() {
    let manager = new_manager();
    manager.insert_file("pinned").unwrap();

    manager.write(&token(), "pinned", b"v1 bytes", 0).await.unwrap();
    manager.checkpoint(&token(), "pinned", "v1").await.unwrap();

    manager.write(&token(), "pinned", b"v2 bytes", 0).await.unwrap();
    manager.checkpoint(&token(), "pinned", "v2").await.unwrap();

    manager.set_head(&token(), "pinned", "v1").await.unwrap();
    assert_eq!(manager.get_head(&token(), "pinned").await.unwrap(), "v1");

    let data = manager.read(&token(), "pinned", 0, 8).await.unwrap();
    assert_eq!(&data[..], b"v1 bytes");

    let err = manager.write(&token(), "pinned", b"nope", 0).await.unwrap_err();
    assert!(matches!(err, layerfs::LayerFsError::ReadOnly(_)));

    manager.delete_head(&token(), "pinned").await.unwrap();
    assert_eq!(manager.get_head(&token(), "pinned").await.unwrap(), "");
    manager.write(&token(), "pinned", b"writable again", 0).await.unwrap();
}

#[tokio::test]
async fn checkpoint_empties_the_active_layer() {
    let manager = new_manager();
    manager.insert_file("drained").unwrap();

    manager.write(&token(), "drained", b"some bytes", 0).await.unwrap();
    manager.checkpoint(&token(), "drained", "v1").await.unwrap();

    // A second checkpoint with no intervening writes is a no-op: there's
    // nothing in the active layer to persist.
    manager.checkpoint(&token(), "drained", "v2").await.unwrap();

    let versions = manager.list_versions(&token(), "drained").await.unwrap();
    assert_eq!(versions.iter().map(|v| v.tag.as_str()).collect::<Vec<_>>(), vec!["v1"]);
}

#[tokio::test]
async fn read_past_eof_returns_a_short_result() {
    let manager = new_manager();
    manager.insert_file("short").unwrap();
    manager.write(&token(), "short", b"abc", 0).await.unwrap();

    let data = manager.read(&token(), "short", 0, 100).await.unwrap();
    assert_eq!(&data[..], b"abc");

    let data = manager.read(&token(), "short", 10, 5).await.unwrap();
    assert_eq!(data.len(), 0);
}

#[tokio::test]
async fn list_files_and_list_heads_reflect_manager_state() {
    let manager = new_manager();
    manager.insert_file("a").unwrap();
    manager.insert_file("b").unwrap();

    manager.write(&token(), "a", b"x", 0).await.unwrap();
    manager.checkpoint(&token(), "a", "v1").await.unwrap();
    manager.set_head(&token(), "a", "v1").await.unwrap();

    let files: Vec<String> = manager
        .list_files(&token())
        .await
        .unwrap()
        .into_iter()
        .map(|(_, name)| name)
        .collect();
    assert_eq!(files, vec!["a".to_string(), "b".to_string()]);

    let heads = manager.list_heads(&token()).await.unwrap();
    assert_eq!(heads, vec![("a".to_string(), "v1".to_string())]);
}

#[tokio::test]
async fn checkpointed_data_survives_a_catalog_reconnect() {
    let db_file = tempfile::NamedTempFile::new().unwrap();
    let db_path = db_file.path().to_str().unwrap().to_string();
    let object_store = MemoryObjectStore::new();

    {
        let catalog = Arc::new(SqliteCatalog::open(&db_path).unwrap());
        let manager = StorageManager::new(catalog, object_store.clone());

        manager.insert_file("durable").unwrap();
        manager.write(&token(), "durable", b"persisted bytes", 0).await.unwrap();
        manager.checkpoint(&token(), "durable", "v1").await.unwrap();
    }

    // A fresh manager over a fresh pooled connection to the same sqlite file
    // and the same object store must see the checkpoint the first manager
    // committed: the active layer is gone (it never lived in the catalog),
    // but the persisted layer and its chunks are on disk.
    let catalog = Arc::new(SqliteCatalog::open(&db_path).unwrap());
    let manager = StorageManager::new(catalog, object_store);

    let data = manager.read(&token(), "durable", 0, 15).await.unwrap();
    assert_eq!(&data[..], b"persisted bytes");
    assert_eq!(manager.size_of(&token(), "durable").await.unwrap(), 15);
}

#[tokio::test]
async fn write_and_read_reject_a_cancelled_token() {
    let manager = new_manager();
    manager.insert_file("cancelled").unwrap();

    let tok = token();
    tok.cancel();

    let err = manager.write(&tok, "cancelled", b"x", 0).await.unwrap_err();
    assert!(matches!(err, layerfs::LayerFsError::Cancelled(_)));

    let err = manager.read(&tok, "cancelled", 0, 1).await.unwrap_err();
    assert!(matches!(err, layerfs::LayerFsError::Cancelled(_)));
}
