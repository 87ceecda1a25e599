//! Bolt-style storage backend implementation
//!
//! Backed by `jammdb`, an embedded single-file B+tree with nested buckets.
//!
//! ## Layout
//!
//! Keys are slash-separated paths: every segment but the last names a
//! nested bucket, the last one is the entry inside it.
//!
//! - key-value entries live below the top-level `kv` bucket, so
//!   `put("a/b/c", v)` stores `v` as `c` in `kv -> a -> b`
//! - samples of series `s` live in `ts -> s`, one entry per sample, named by
//!   the 8-byte order-preserving timestamp encoding
//!
//! Because sample names sort like their timestamps, a range query is a
//! single forward scan over the series bucket.
//!
//! ## Limitations
//!
//! - **Single writer**: write transactions are serialized by the engine
//! - **Names are shared**: a key cannot be both an entry and a bucket, so
//!   `put("a", ..)` and `put("a/b", ..)` conflict

use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use jammdb::{Bucket, DB, Data, Tx};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, trace, warn};

use super::backend::{
    RANGE_BUFFER_CAPACITY, Sample, SampleStream, StorageBackend, closed_error, key_segments,
};
use super::clock::MonotonicStamp;
use super::codec::{
    decode_f64, decode_timestamp, encode_f64, encode_timestamp, from_nanos, timestamp_nanos,
};
use super::error::{StorageError, StorageResult};

const KV_BUCKET: &str = "kv";
const TS_BUCKET: &str = "ts";

/// Bolt-style storage backend
pub struct BoltBackend {
    db: RwLock<Option<Arc<DB>>>,
    stamp: MonotonicStamp,
    db_path: String,
}

impl BoltBackend {
    /// Open (or create) the database file at `path`
    #[instrument(skip_all)]
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_stamp(path, MonotonicStamp::system())
    }

    pub fn open_with_stamp(path: impl AsRef<Path>, stamp: MonotonicStamp) -> StorageResult<Self> {
        let db_path = path.as_ref().to_string_lossy().to_string();
        info!("opening bolt backend at: {}", db_path);

        let db = DB::open(path.as_ref()).map_err(|e| {
            StorageError::BackendIo(format!("failed to open {}: {}", db_path, e))
        })?;

        Ok(Self {
            db: RwLock::new(Some(Arc::new(db))),
            stamp,
            db_path,
        })
    }

    fn handle(&self) -> StorageResult<Arc<DB>> {
        self.db
            .read()
            .map_err(|_| StorageError::BackendIo("bolt handle lock poisoned".to_string()))?
            .clone()
            .ok_or_else(closed_error)
    }

    /// Run a blocking engine operation off the async runtime
    async fn blocking<T, F>(&self, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&DB) -> StorageResult<T> + Send + 'static,
    {
        let db = self.handle()?;
        tokio::task::spawn_blocking(move || op(&db)).await?
    }
}

/// Bucket path and entry name of a key-value key
fn kv_location(key: &str) -> StorageResult<(Vec<String>, String)> {
    let mut segments: Vec<String> = key_segments(key)?.into_iter().map(String::from).collect();
    let leaf = segments.pop().unwrap_or_default();
    Ok((segments, leaf))
}

fn series_location(series: &str) -> StorageResult<Vec<String>> {
    Ok(key_segments(series)?.into_iter().map(String::from).collect())
}

fn walk<'b, 'tx>(
    tx: &'b Tx<'tx>,
    namespace: &str,
    path: &[String],
) -> Result<Bucket<'b, 'tx>, jammdb::Error> {
    let mut bucket = tx.get_bucket(namespace.as_bytes().to_vec())?;
    for segment in path {
        bucket = bucket.get_bucket(segment.as_bytes().to_vec())?;
    }
    Ok(bucket)
}

fn walk_or_create<'b, 'tx>(
    tx: &'b Tx<'tx>,
    namespace: &str,
    path: &[String],
) -> Result<Bucket<'b, 'tx>, jammdb::Error> {
    let mut bucket = tx.get_or_create_bucket(namespace.as_bytes().to_vec())?;
    for segment in path {
        bucket = bucket.get_or_create_bucket(segment.as_bytes().to_vec())?;
    }
    Ok(bucket)
}

/// Read errors of a lookup path: a missing bucket, or an entry where a
/// bucket was expected, both mean the key does not exist
fn lookup_error(e: jammdb::Error, key: &str) -> StorageError {
    match e {
        jammdb::Error::BucketMissing | jammdb::Error::IncompatibleValue => {
            StorageError::not_found(key)
        }
        e => e.into(),
    }
}

/// One read transaction's worth of a range scan
struct ScanBatch {
    samples: Vec<Sample>,
    /// First key not yet visited, if the range continues
    resume: Option<Vec<u8>>,
}

fn read_batch(db: &DB, path: &[String], start: &[u8], end: &[u8]) -> StorageResult<ScanBatch> {
    let tx = db.tx(false)?;
    let bucket = match walk(&tx, TS_BUCKET, path) {
        Ok(bucket) => bucket,
        Err(jammdb::Error::BucketMissing | jammdb::Error::IncompatibleValue) => {
            return Ok(ScanBatch {
                samples: Vec::new(),
                resume: None,
            });
        }
        Err(e) => return Err(e.into()),
    };

    let mut samples = Vec::with_capacity(RANGE_BUFFER_CAPACITY);
    for data in bucket.range(start..=end) {
        // nested series share the bucket
        let Data::KeyValue(kv) = data else {
            continue;
        };
        if samples.len() == RANGE_BUFFER_CAPACITY {
            return Ok(ScanBatch {
                samples,
                resume: Some(kv.key().to_vec()),
            });
        }
        let (Some(nanos), Some(value)) = (decode_timestamp(kv.key()), decode_f64(kv.value()))
        else {
            trace!("skipping malformed sample entry {:?}", kv.key());
            continue;
        };
        samples.push(Sample::new(value, from_nanos(nanos)));
    }

    Ok(ScanBatch {
        samples,
        resume: None,
    })
}

/// Forward scan of one series bucket, feeding `out` until the range ends or
/// the consumer goes away
///
/// No read transaction is held while waiting on the consumer: a held
/// transaction pins the memory map and stalls every commit that grows the
/// file. Each batch is read in its own transaction and the next one picks
/// up at the first unvisited key.
fn scan_series(
    db: &DB,
    path: &[String],
    from: i64,
    to: i64,
    out: &mpsc::Sender<Sample>,
) -> StorageResult<()> {
    let mut start = encode_timestamp(from).to_vec();
    let end = encode_timestamp(to);

    loop {
        let batch = read_batch(db, path, &start, &end)?;
        for sample in batch.samples {
            if out.blocking_send(sample).is_err() {
                trace!("range consumer dropped, stopping scan");
                return Ok(());
            }
        }
        match batch.resume {
            Some(next) => start = next,
            None => return Ok(()),
        }
    }
}

#[async_trait]
impl StorageBackend for BoltBackend {
    fn name(&self) -> &'static str {
        "bolt"
    }

    #[instrument(skip(self, value), fields(len = value.len()))]
    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let (path, leaf) = kv_location(key)?;
        debug!("putting {} bytes", value.len());

        self.blocking(move |db| {
            let tx = db.tx(true)?;
            {
                let bucket = walk_or_create(&tx, KV_BUCKET, &path)?;
                bucket.put(leaf.into_bytes(), value)?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let (path, leaf) = kv_location(key)?;
        let key = key.to_string();

        self.blocking(move |db| {
            let tx = db.tx(false)?;
            let bucket = walk(&tx, KV_BUCKET, &path).map_err(|e| lookup_error(e, &key))?;
            let value = match bucket.get(leaf.into_bytes()) {
                Some(Data::KeyValue(kv)) => Some(kv.value().to_vec()),
                _ => None,
            };
            value.ok_or_else(|| StorageError::not_found(key))
        })
        .await
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let (path, leaf) = kv_location(key)?;
        let key = key.to_string();

        self.blocking(move |db| {
            let tx = db.tx(true)?;
            {
                let bucket = walk(&tx, KV_BUCKET, &path).map_err(|e| lookup_error(e, &key))?;
                match bucket.delete(leaf.into_bytes()) {
                    Ok(_) => {}
                    Err(jammdb::Error::KeyValueMissing | jammdb::Error::IncompatibleValue) => {
                        return Err(StorageError::not_found(key));
                    }
                    Err(e) => return Err(e.into()),
                }
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn add_value(&self, series: &str, value: f64) -> StorageResult<()> {
        let path = series_location(series)?;
        let stamp = self.stamp.next();

        self.blocking(move |db| {
            let tx = db.tx(true)?;
            {
                let bucket = walk_or_create(&tx, TS_BUCKET, &path)?;
                bucket.put(encode_timestamp(stamp).to_vec(), encode_f64(value).to_vec())?;
            }
            tx.commit()?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn get_range(
        &self,
        series: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<SampleStream> {
        let path = series_location(series)?;
        let (from, to) = (timestamp_nanos(&from), timestamp_nanos(&to));
        if from > to {
            return Ok(SampleStream::empty());
        }

        let db = self.handle()?;
        let (out, stream) = SampleStream::channel();
        let series = series.to_string();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = scan_series(&db, &path, from, to, &out) {
                warn!("range scan of {} aborted: {}", series, e);
            }
        });

        Ok(stream)
    }

    #[instrument(skip(self))]
    async fn delete_range(
        &self,
        series: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<u64> {
        let path = series_location(series)?;
        let (from, to) = (timestamp_nanos(&from), timestamp_nanos(&to));
        if from > to {
            return Ok(0);
        }

        self.blocking(move |db| {
            let tx = db.tx(true)?;
            let deleted = {
                let bucket = match walk(&tx, TS_BUCKET, &path) {
                    Ok(bucket) => bucket,
                    Err(jammdb::Error::BucketMissing) => return Ok(0),
                    Err(e) => return Err(e.into()),
                };

                let start = encode_timestamp(from);
                let end = encode_timestamp(to);
                let keys: Vec<Vec<u8>> = bucket
                    .range(&start[..]..=&end[..])
                    .filter_map(|data| match data {
                        Data::KeyValue(kv) if decode_timestamp(kv.key()).is_some() => {
                            Some(kv.key().to_vec())
                        }
                        _ => None,
                    })
                    .collect();

                let count = keys.len() as u64;
                for key in keys {
                    bucket.delete(key)?;
                }
                count
            };
            tx.commit()?;
            debug!("deleted {} samples", deleted);
            Ok(deleted)
        })
        .await
    }

    async fn close(&self) -> StorageResult<()> {
        let db = self
            .db
            .write()
            .map_err(|_| StorageError::BackendIo("bolt handle lock poisoned".to_string()))?
            .take();
        if db.is_some() {
            info!("closing bolt backend at {}", self.db_path);
        }
        Ok(())
    }
}
