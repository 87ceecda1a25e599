//! Data survives closing and reopening through the dispatcher

use chrono::{DateTime, Utc};
use storaged::storage::{MetaStorage, StorageBackend};

use crate::helpers::{collect_range, values};

async fn reopen_keeps_data(descriptor: &str) {
    let store = MetaStorage::open(descriptor).await.unwrap();
    store.put("persist/me", b"still here".to_vec()).await.unwrap();
    store.add_value("persist/series", 4.2).await.unwrap();
    store.add_value("persist/series", 4.3).await.unwrap();
    store.close().await.unwrap();
    drop(store);

    let store = MetaStorage::open(descriptor).await.unwrap();
    assert_eq!(store.get("persist/me").await.unwrap(), b"still here");
    let samples = collect_range(&store, "persist/series", DateTime::UNIX_EPOCH, Utc::now()).await;
    assert_eq!(values(&samples), vec![4.2, 4.3]);
    store.close().await.unwrap();
}

#[tokio::test]
async fn test_bolt_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    let descriptor = format!("bolt://{}", temp_dir.path().join("persist.boltdb").display());
    reopen_keeps_data(&descriptor).await;
}

#[cfg(feature = "storage-rocksdb")]
#[tokio::test]
async fn test_leveldb_reopen() {
    let temp_dir = tempfile::tempdir().unwrap();
    let descriptor = format!("leveldb://{}", temp_dir.path().join("persist.db").display());
    reopen_keeps_data(&descriptor).await;
}

#[cfg(feature = "storage-rocksdb")]
#[tokio::test]
async fn test_rocksdb_alias() {
    let temp_dir = tempfile::tempdir().unwrap();
    let descriptor = format!("rocksdb://{}", temp_dir.path().join("alias.db").display());
    let store = MetaStorage::open(&descriptor).await.unwrap();
    assert_eq!(store.name(), "rocksdb");
    store.close().await.unwrap();
}
