//! MongoDB storage backend implementation
//!
//! ## Layout
//!
//! - key-value entries become `{k: <name>, v: <binary>}` documents. The
//!   collection is everything before the last slash of `kv/<key>`, so
//!   `put("foo/bar", ..)` writes `k: "bar"` into collection `kv/foo`
//! - samples of series `s` become `{k: <nanos>, v: <f64>}` documents in
//!   collection `ts/s`
//!
//! Every collection gets a unique ascending index on `k`. Range queries are
//! server-side filtered and sorted on that index and streamed from the
//! driver cursor.
//!
//! ## Divergence from the embedded backends
//!
//! The unique index means two samples with the same timestamp cannot
//! coexist. Samples written through this process never collide (stamps are
//! strictly monotonic), but a foreign writer reusing a timestamp is rejected.

use std::collections::HashSet;
use std::sync::{Mutex, RwLock};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::TryStreamExt;
use mongodb::bson::spec::BinarySubtype;
use mongodb::bson::{Binary, Document, doc};
use mongodb::options::IndexOptions;
use mongodb::{Client, Collection, Database, IndexModel};
use tracing::{debug, info, instrument, trace, warn};

use super::backend::{Sample, SampleStream, StorageBackend, closed_error, key_segments};
use super::clock::MonotonicStamp;
use super::codec::{from_nanos, timestamp_nanos};
use super::error::{StorageError, StorageResult};

/// Database used when the connection string does not name one
const DEFAULT_DATABASE: &str = "storaged";

#[derive(Clone)]
struct Connection {
    client: Client,
    database: Database,
}

/// MongoDB storage backend
pub struct MongoBackend {
    connection: RwLock<Option<Connection>>,
    indexed: Mutex<HashSet<String>>,
    stamp: MonotonicStamp,
}

impl MongoBackend {
    /// Connect to the server named by a `mongodb://host[:port]/database` URI
    ///
    /// The server is pinged once, so an unreachable host fails here rather
    /// than on the first operation.
    #[instrument(skip_all)]
    pub async fn connect(uri: &str) -> StorageResult<Self> {
        Self::connect_with_stamp(uri, MonotonicStamp::system()).await
    }

    pub async fn connect_with_stamp(uri: &str, stamp: MonotonicStamp) -> StorageResult<Self> {
        let client = Client::with_uri_str(uri).await.map_err(|e| {
            StorageError::BackendIo(format!("invalid mongodb connection string: {}", e))
        })?;
        let database = client
            .default_database()
            .unwrap_or_else(|| client.database(DEFAULT_DATABASE));

        database
            .run_command(doc! { "ping": 1 })
            .await
            .map_err(|e| StorageError::BackendIo(format!("failed to reach mongodb: {}", e)))?;
        info!("connected to mongodb database {}", database.name());

        Ok(Self {
            connection: RwLock::new(Some(Connection { client, database })),
            indexed: Mutex::new(HashSet::new()),
            stamp,
        })
    }

    fn connection(&self) -> StorageResult<Connection> {
        self.connection
            .read()
            .map_err(|_| StorageError::BackendIo("mongodb handle lock poisoned".to_string()))?
            .clone()
            .ok_or_else(closed_error)
    }

    /// Collection handle with the unique `k` index in place
    async fn collection(&self, name: &str) -> StorageResult<Collection<Document>> {
        let collection = self.connection()?.database.collection::<Document>(name);

        let known = self
            .indexed
            .lock()
            .map(|indexed| indexed.contains(name))
            .unwrap_or(false);
        if !known {
            let index = IndexModel::builder()
                .keys(doc! { "k": 1 })
                .options(IndexOptions::builder().unique(true).build())
                .build();
            collection.create_index(index).await?;
            if let Ok(mut indexed) = self.indexed.lock() {
                indexed.insert(name.to_string());
            }
            debug!("ensured index on {}", name);
        }

        Ok(collection)
    }
}

/// Collection name and document key of a key-value key
fn kv_location(key: &str) -> StorageResult<(String, String)> {
    key_segments(key)?;
    let full = format!("kv/{key}");
    let (collection, name) = full.rsplit_once('/').unwrap_or(("kv", key));
    Ok((collection.to_string(), name.to_string()))
}

fn series_collection(series: &str) -> StorageResult<String> {
    key_segments(series)?;
    Ok(format!("ts/{series}"))
}

fn range_filter(from: i64, to: i64) -> Document {
    doc! { "k": { "$gte": from, "$lte": to } }
}

fn decode_sample(document: &Document) -> Option<Sample> {
    let nanos = document.get_i64("k").ok()?;
    let value = document.get_f64("v").ok()?;
    Some(Sample::new(value, from_nanos(nanos)))
}

#[async_trait]
impl StorageBackend for MongoBackend {
    fn name(&self) -> &'static str {
        "mongodb"
    }

    #[instrument(skip(self, value), fields(len = value.len()))]
    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        let (collection, name) = kv_location(key)?;
        let collection = self.collection(&collection).await?;

        let document = doc! {
            "k": name.as_str(),
            "v": Binary { subtype: BinarySubtype::Generic, bytes: value },
        };
        collection
            .replace_one(doc! { "k": name.as_str() }, document)
            .upsert(true)
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        let (collection, name) = kv_location(key)?;
        let collection = self.collection(&collection).await?;

        let document = collection
            .find_one(doc! { "k": name.as_str() })
            .await?
            .ok_or_else(|| StorageError::not_found(key))?;

        document
            .get_binary_generic("v")
            .cloned()
            .map_err(|e| StorageError::BackendIo(format!("malformed document for {key}: {e}")))
    }

    #[instrument(skip(self))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let (collection, name) = kv_location(key)?;
        let collection = self.collection(&collection).await?;

        let result = collection.delete_one(doc! { "k": name.as_str() }).await?;
        if result.deleted_count == 0 {
            return Err(StorageError::not_found(key));
        }
        Ok(())
    }

    #[instrument(skip(self))]
    async fn add_value(&self, series: &str, value: f64) -> StorageResult<()> {
        let collection = self.collection(&series_collection(series)?).await?;
        let stamp = self.stamp.next();

        collection
            .insert_one(doc! { "k": stamp, "v": value })
            .await?;
        Ok(())
    }

    #[instrument(skip(self))]
    async fn get_range(
        &self,
        series: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<SampleStream> {
        let collection = self.collection(&series_collection(series)?).await?;
        let (from, to) = (timestamp_nanos(&from), timestamp_nanos(&to));
        if from > to {
            return Ok(SampleStream::empty());
        }

        let mut cursor = collection
            .find(range_filter(from, to))
            .sort(doc! { "k": 1 })
            .await?;

        let (out, stream) = SampleStream::channel();
        let series = series.to_string();
        tokio::spawn(async move {
            loop {
                let document = match cursor.try_next().await {
                    Ok(Some(document)) => document,
                    Ok(None) => break,
                    Err(e) => {
                        warn!("range scan of {} aborted: {}", series, e);
                        break;
                    }
                };
                let Some(sample) = decode_sample(&document) else {
                    trace!("skipping malformed sample document in {}", series);
                    continue;
                };
                if out.send(sample).await.is_err() {
                    trace!("range consumer dropped, stopping scan");
                    break;
                }
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
        let collection = self.collection(&series_collection(series)?).await?;
        let (from, to) = (timestamp_nanos(&from), timestamp_nanos(&to));
        if from > to {
            return Ok(0);
        }

        let result = collection.delete_many(range_filter(from, to)).await?;
        debug!("deleted {} samples", result.deleted_count);
        Ok(result.deleted_count)
    }

    async fn close(&self) -> StorageResult<()> {
        let connection = self
            .connection
            .write()
            .map_err(|_| StorageError::BackendIo("mongodb handle lock poisoned".to_string()))?
            .take();
        if let Some(connection) = connection {
            info!("closing mongodb backend");
            connection.client.shutdown().await;
        }
        Ok(())
    }
}
