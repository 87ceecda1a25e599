//! Behaviour every backend has to share
//!
//! Each check is written once against `&dyn StorageBackend` and instantiated
//! per backend by `backend_suite!`.

#![allow(dead_code)]

use std::time::Duration;

use assert_matches::assert_matches;
use chrono::{DateTime, Utc};
use pretty_assertions::assert_eq;
use storaged::storage::{StorageBackend, StorageError, reduce_stream};

use crate::helpers::{assert_ascending, collect_range, values};

pub async fn kv_put_get_delete(backend: &dyn StorageBackend) {
    backend.put("foo", b"hello world".to_vec()).await.unwrap();
    assert_eq!(backend.get("foo").await.unwrap(), b"hello world");

    backend.delete("foo").await.unwrap();
    assert_matches!(backend.get("foo").await, Err(StorageError::NotFound(_)));
    assert_matches!(backend.delete("foo").await, Err(StorageError::NotFound(_)));
}

pub async fn kv_overwrite_and_empty_value(backend: &dyn StorageBackend) {
    backend.put("foo", b"first".to_vec()).await.unwrap();
    backend.put("foo", b"second".to_vec()).await.unwrap();
    assert_eq!(backend.get("foo").await.unwrap(), b"second");

    backend.put("empty", Vec::new()).await.unwrap();
    assert_eq!(backend.get("empty").await.unwrap(), Vec::<u8>::new());
}

pub async fn kv_nested_keys(backend: &dyn StorageBackend) {
    backend.put("config/app/name", b"storaged".to_vec()).await.unwrap();
    backend.put("config/app/port", b"80".to_vec()).await.unwrap();

    assert_eq!(backend.get("config/app/name").await.unwrap(), b"storaged");
    assert_eq!(backend.get("config/app/port").await.unwrap(), b"80");
    assert_matches!(
        backend.get("config/app/missing").await,
        Err(StorageError::NotFound(_))
    );
    assert_matches!(
        backend.get("never/written").await,
        Err(StorageError::NotFound(_))
    );

    backend.put("leaf", b"entry".to_vec()).await.unwrap();
    assert_matches!(
        backend.get("leaf/child").await,
        Err(StorageError::NotFound(_))
    );
    assert_matches!(
        backend.delete("leaf/child").await,
        Err(StorageError::NotFound(_))
    );
    assert_eq!(backend.get("leaf").await.unwrap(), b"entry");
}

pub async fn rejects_malformed_keys(backend: &dyn StorageBackend) {
    for key in ["", "a//b", "/a", "a/"] {
        assert_matches!(
            backend.put(key, b"x".to_vec()).await,
            Err(StorageError::InvalidArgument(_)),
            "put {key:?}"
        );
        assert_matches!(
            backend.add_value(key, 1.0).await,
            Err(StorageError::InvalidArgument(_)),
            "add_value {key:?}"
        );
    }
}

pub async fn ts_values_come_back_in_order(backend: &dyn StorageBackend) {
    for value in [0.0, 1.0, 2.0, 3.0] {
        backend.add_value("ts1", value).await.unwrap();
    }

    let samples = collect_range(backend, "ts1", DateTime::UNIX_EPOCH, Utc::now()).await;
    assert_eq!(values(&samples), vec![0.0, 1.0, 2.0, 3.0]);
    assert_ascending(&samples);
}

pub async fn ts_delete_range_keeps_the_rest(backend: &dyn StorageBackend) {
    backend.add_value("ts2", 0.0).await.unwrap();
    backend.add_value("ts2", 1.0).await.unwrap();
    tokio::time::sleep(Duration::from_millis(2)).await;
    let cut = Utc::now();
    tokio::time::sleep(Duration::from_millis(2)).await;
    backend.add_value("ts2", 2.0).await.unwrap();
    backend.add_value("ts2", 3.0).await.unwrap();

    let deleted = backend
        .delete_range("ts2", DateTime::UNIX_EPOCH, cut)
        .await
        .unwrap();
    assert_eq!(deleted, 2);

    let samples = collect_range(backend, "ts2", DateTime::UNIX_EPOCH, Utc::now()).await;
    assert_eq!(values(&samples), vec![2.0, 3.0]);
}

pub async fn ts_many_fast_appends_are_all_kept(backend: &dyn StorageBackend) {
    for i in 0..100 {
        backend.add_value("burst", i as f64).await.unwrap();
    }

    let samples = collect_range(backend, "burst", DateTime::UNIX_EPOCH, Utc::now()).await;
    assert_eq!(values(&samples), (0..100).map(|i| i as f64).collect::<Vec<_>>());
    assert_ascending(&samples);
}

pub async fn ts_bounds_are_inclusive(backend: &dyn StorageBackend) {
    for value in [10.0, 20.0, 30.0] {
        backend.add_value("bounds", value).await.unwrap();
    }
    let all = collect_range(backend, "bounds", DateTime::UNIX_EPOCH, Utc::now()).await;
    assert_eq!(all.len(), 3);

    let whole = collect_range(backend, "bounds", all[0].timestamp, all[2].timestamp).await;
    assert_eq!(values(&whole), vec![10.0, 20.0, 30.0]);

    let single = collect_range(backend, "bounds", all[1].timestamp, all[1].timestamp).await;
    assert_eq!(single, vec![all[1]]);

    let inverted = collect_range(backend, "bounds", all[2].timestamp, all[0].timestamp).await;
    assert!(inverted.is_empty());
    assert_eq!(
        backend
            .delete_range("bounds", all[2].timestamp, all[0].timestamp)
            .await
            .unwrap(),
        0
    );
}

pub async fn ts_missing_series_is_empty(backend: &dyn StorageBackend) {
    let samples = collect_range(backend, "nothing/here", DateTime::UNIX_EPOCH, Utc::now()).await;
    assert!(samples.is_empty());
    assert_eq!(
        backend
            .delete_range("nothing/here", DateTime::UNIX_EPOCH, Utc::now())
            .await
            .unwrap(),
        0
    );
}

pub async fn ts_dropping_a_stream_releases_the_backend(backend: &dyn StorageBackend) {
    for i in 0..300 {
        backend.add_value("large", i as f64).await.unwrap();
    }

    let mut stream = backend
        .get_range("large", DateTime::UNIX_EPOCH, Utc::now())
        .await
        .unwrap();
    assert_eq!(stream.next().await.map(|s| s.value), Some(0.0));
    drop(stream);

    tokio::time::timeout(Duration::from_secs(5), async {
        backend.put("after-drop", b"ok".to_vec()).await.unwrap();
        backend.add_value("large", 300.0).await.unwrap();
    })
    .await
    .expect("backend stalled after a dropped range stream");
}

pub async fn ts_held_stream_does_not_block_writes(backend: &dyn StorageBackend) {
    for i in 0..300 {
        backend.add_value("held", i as f64).await.unwrap();
    }

    let mut stream = backend
        .get_range("held", DateTime::UNIX_EPOCH, Utc::now())
        .await
        .unwrap();
    assert_eq!(stream.next().await.map(|s| s.value), Some(0.0));

    // enough data to force the embedded engines to grow their files
    let blob = vec![0x5au8; 1 << 20];
    tokio::time::timeout(Duration::from_secs(20), async {
        for i in 0..32 {
            backend.put(&format!("blob/{i}"), blob.clone()).await.unwrap();
        }
        backend.add_value("held", 300.0).await.unwrap();
    })
    .await
    .expect("writes stalled behind a half-read range stream");

    let rest = stream.collect_all().await;
    assert_eq!(values(&rest), (1..300).map(|i| i as f64).collect::<Vec<_>>());
}

pub async fn ts_dropping_a_reduced_stream_releases_the_backend(backend: &dyn StorageBackend) {
    for i in 0..300 {
        backend.add_value("coarse", i as f64).await.unwrap();
    }
    let all = collect_range(backend, "coarse", DateTime::UNIX_EPOCH, Utc::now()).await;
    let (from, to) = (all[0].timestamp, Utc::now());

    // a single point over the whole range: only the first sample is kept
    let stream = backend.get_range("coarse", from, to).await.unwrap();
    let mut reduced = reduce_stream(stream, from, to, 1);
    assert_eq!(reduced.next().await.map(|s| s.value), Some(0.0));
    drop(reduced);

    let blob = vec![0xa5u8; 1 << 20];
    tokio::time::timeout(Duration::from_secs(20), async {
        for i in 0..16 {
            backend.put(&format!("after/{i}"), blob.clone()).await.unwrap();
        }
    })
    .await
    .expect("backend stalled after a dropped reducer stage");
}

pub async fn ts_reduced_range(backend: &dyn StorageBackend) {
    for i in 0..100 {
        backend.add_value("reduced", i as f64).await.unwrap();
        tokio::time::sleep(Duration::from_micros(200)).await;
    }
    let all = collect_range(backend, "reduced", DateTime::UNIX_EPOCH, Utc::now()).await;
    let (from, to) = (all[0].timestamp, all[99].timestamp);

    let stream = backend.get_range("reduced", from, to).await.unwrap();
    let reduced = reduce_stream(stream, from, to, 10).collect_all().await;

    assert!(!reduced.is_empty());
    assert!(reduced.len() <= 11, "kept {} samples", reduced.len());
    assert_eq!(reduced[0], all[0]);
    assert_ascending(&reduced);

    let stream = backend.get_range("reduced", from, to).await.unwrap();
    assert_eq!(reduce_stream(stream, from, to, 0).collect_all().await, all);
}

pub async fn closed_backend_refuses_work(backend: &dyn StorageBackend) {
    backend.put("foo", b"bar".to_vec()).await.unwrap();
    backend.close().await.unwrap();
    backend.close().await.unwrap();

    assert_matches!(backend.get("foo").await, Err(StorageError::BackendIo(_)));
    assert_matches!(
        backend.add_value("ts", 1.0).await,
        Err(StorageError::BackendIo(_))
    );
}

macro_rules! backend_suite {
    ($suite:ident, $open:expr, [$($check:ident),* $(,)?]) => {
        mod $suite {
            #[allow(unused_imports)]
            use super::*;

            $(
                #[tokio::test]
                async fn $check() {
                    #[allow(clippy::redundant_closure_call)]
                    let Some((_dir, backend)) = ($open)().await else {
                        eprintln!("skipping: backend not configured");
                        return;
                    };
                    super::$check(backend.as_ref()).await;
                }
            )*
        }
    };
}

macro_rules! all_checks {
    ($suite:ident, $open:expr) => {
        backend_suite!(
            $suite,
            $open,
            [
                kv_put_get_delete,
                kv_overwrite_and_empty_value,
                kv_nested_keys,
                rejects_malformed_keys,
                ts_values_come_back_in_order,
                ts_delete_range_keeps_the_rest,
                ts_many_fast_appends_are_all_kept,
                ts_bounds_are_inclusive,
                ts_missing_series_is_empty,
                ts_dropping_a_stream_releases_the_backend,
                ts_held_stream_does_not_block_writes,
                ts_dropping_a_reduced_stream_releases_the_backend,
                ts_reduced_range,
                closed_backend_refuses_work,
            ]
        );
    };
}

#[cfg(feature = "storage-bolt")]
all_checks!(bolt, || async { Some(crate::helpers::open_bolt()) });

#[cfg(feature = "storage-rocksdb")]
all_checks!(rocks, || async { Some(crate::helpers::open_rocks()) });

#[cfg(feature = "storage-mongodb")]
all_checks!(mongo, crate::helpers::open_mongo);
