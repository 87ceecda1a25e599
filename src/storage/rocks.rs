//! RocksDB storage backend implementation
//!
//! One flat, ordered keyspace (LevelDB lineage, served under both the
//! `leveldb://` and `rocksdb://` schemes).
//!
//! ## Layout
//!
//! - key-value entries: `kv/<key>`
//! - samples: `ts/<series>/<timestamp>` where `<timestamp>` is the 8-byte
//!   order-preserving encoding, so a series is one contiguous key range
//!
//! Keys of a nested series (`ts/a/b/...`) can fall inside the range of its
//! parent (`ts/a/...`); they are told apart by the exact suffix length.

use std::path::Path;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rocksdb::{BlockBasedOptions, DB, Direction, IteratorMode, Options, ReadOptions, WriteBatch};
use tokio::sync::mpsc;
use tracing::{debug, info, instrument, trace, warn};

use super::backend::{Sample, SampleStream, StorageBackend, closed_error, key_segments};
use super::clock::MonotonicStamp;
use super::codec::{
    ENCODED_LEN, decode_f64, decode_timestamp, encode_f64, encode_timestamp, from_nanos,
    timestamp_nanos,
};
use super::error::{StorageError, StorageResult};

/// Bits per key of the bloom filter on point lookups
const BLOOM_BITS_PER_KEY: f64 = 10.0;

/// RocksDB storage backend
pub struct RocksBackend {
    db: RwLock<Option<Arc<DB>>>,
    stamp: MonotonicStamp,
    db_path: String,
}

impl RocksBackend {
    /// Open (or create) the database directory at `path`
    #[instrument(skip_all)]
    pub fn open(path: impl AsRef<Path>) -> StorageResult<Self> {
        Self::open_with_stamp(path, MonotonicStamp::system())
    }

    pub fn open_with_stamp(path: impl AsRef<Path>, stamp: MonotonicStamp) -> StorageResult<Self> {
        let db_path = path.as_ref().to_string_lossy().to_string();
        info!("opening rocksdb backend at: {}", db_path);

        let mut block_opts = BlockBasedOptions::default();
        block_opts.set_bloom_filter(BLOOM_BITS_PER_KEY, false);

        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.set_block_based_table_factory(&block_opts);

        let db = DB::open(&opts, path.as_ref()).map_err(|e| {
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
            .map_err(|_| StorageError::BackendIo("rocksdb handle lock poisoned".to_string()))?
            .clone()
            .ok_or_else(closed_error)
    }

    async fn blocking<T, F>(&self, op: F) -> StorageResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&DB) -> StorageResult<T> + Send + 'static,
    {
        let db = self.handle()?;
        tokio::task::spawn_blocking(move || op(&db)).await?
    }
}

fn kv_key(key: &str) -> StorageResult<Vec<u8>> {
    key_segments(key)?;
    Ok([b"kv/".as_slice(), key.as_bytes()].concat())
}

fn series_prefix(series: &str) -> StorageResult<Vec<u8>> {
    key_segments(series)?;
    Ok([b"ts/".as_slice(), series.as_bytes(), b"/"].concat())
}

/// Iteration bounds `[start, limit)` covering `from..=to` inclusively.
///
/// The limit is the encoded `to` key plus one zero byte: the smallest key
/// sorting after it, so a sample stamped exactly `to` is still visited.
fn range_bounds(prefix: &[u8], from: i64, to: i64) -> (Vec<u8>, Vec<u8>) {
    let start = [prefix, &encode_timestamp(from)].concat();
    let limit = [prefix, &encode_timestamp(to), &[0u8]].concat();
    (start, limit)
}

/// Timestamp of a sample key, if it belongs to exactly this series
fn sample_nanos(prefix: &[u8], key: &[u8]) -> Option<i64> {
    let suffix = key.strip_prefix(prefix)?;
    if suffix.len() != ENCODED_LEN {
        return None;
    }
    decode_timestamp(suffix)
}

fn bounded_iter<'a>(
    db: &'a DB,
    start: &[u8],
    limit: Vec<u8>,
) -> impl Iterator<Item = Result<(Box<[u8]>, Box<[u8]>), rocksdb::Error>> + 'a {
    let mut read_opts = ReadOptions::default();
    read_opts.set_iterate_upper_bound(limit);
    db.iterator_opt(IteratorMode::From(start, Direction::Forward), read_opts)
}

fn scan_series(
    db: &DB,
    prefix: &[u8],
    from: i64,
    to: i64,
    out: &mpsc::Sender<Sample>,
) -> StorageResult<()> {
    let (start, limit) = range_bounds(prefix, from, to);
    for entry in bounded_iter(db, &start, limit) {
        let (key, value) = entry?;
        let (Some(nanos), Some(value)) = (sample_nanos(prefix, &key), decode_f64(&value)) else {
            trace!("skipping foreign or malformed entry {:?}", key);
            continue;
        };
        if out.blocking_send(Sample::new(value, from_nanos(nanos))).is_err() {
            trace!("range consumer dropped, stopping scan");
            break;
        }
    }
    Ok(())
}

#[async_trait]
impl StorageBackend for RocksBackend {
    fn name(&self) -> &'static str {
        "rocksdb"
    }

    #[instrument(skip(self, value), fields(len = value.len()))]
    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let key = kv_key(key)?;
        self.blocking(move |db| Ok(db.put(key, value)?)).await
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let physical = kv_key(key)?;
        let key = key.to_string();
        self.blocking(move |db| db.get(physical)?.ok_or_else(|| StorageError::not_found(key)))
            .await
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let physical = kv_key(key)?;
        let key = key.to_string();
        self.blocking(move |db| {
            // rocksdb deletes blindly, absence has to be checked up front
            if db.get_pinned(&physical)?.is_none() {
                return Err(StorageError::not_found(key));
            }
            db.delete(&physical)?;
            Ok(())
        })
        .await
    }

    #[instrument(skip(self))]
    async fn add_value(&self, series: &str, value: f64) -> StorageResult<()> {
        let mut key = series_prefix(series)?;
        key.extend_from_slice(&encode_timestamp(self.stamp.next()));
        self.blocking(move |db| Ok(db.put(key, encode_f64(value))?))
            .await
    }

    #[instrument(skip(self))]
    async fn get_range(
        &self,
        series: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<SampleStream> {
        let prefix = series_prefix(series)?;
        let (from, to) = (timestamp_nanos(&from), timestamp_nanos(&to));
        if from > to {
            return Ok(SampleStream::empty());
        }

        let db = self.handle()?;
        let (out, stream) = SampleStream::channel();
        let series = series.to_string();
        tokio::task::spawn_blocking(move || {
            if let Err(e) = scan_series(&db, &prefix, from, to, &out) {
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
        let prefix = series_prefix(series)?;
        let (from, to) = (timestamp_nanos(&from), timestamp_nanos(&to));
        if from > to {
            return Ok(0);
        }

        self.blocking(move |db| {
            let (start, limit) = range_bounds(&prefix, from, to);
            let mut batch = WriteBatch::default();
            let mut deleted = 0u64;
            for entry in bounded_iter(db, &start, limit) {
                let (key, _) = entry?;
                if sample_nanos(&prefix, &key).is_some() {
                    batch.delete(&key);
                    deleted += 1;
                }
            }
            db.write(batch)?;
            debug!("deleted {} samples", deleted);
            Ok(deleted)
        })
        .await
    }

    async fn close(&self) -> StorageResult<()> {
        let db = self
            .db
            .write()
            .map_err(|_| StorageError::BackendIo("rocksdb handle lock poisoned".to_string()))?
            .take();
        if db.is_some() {
            info!("closing rocksdb backend at {}", self.db_path);
        }
        Ok(())
    }
}
