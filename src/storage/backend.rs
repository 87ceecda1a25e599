//! Storage backend trait definition
//!
//! This module defines the core `StorageBackend` trait that every
//! engine adapter implements, together with the sample type and the
//! lazy stream that range queries hand back.

use std::pin::Pin;
use std::task::{Context, Poll};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::Stream;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;

use super::error::{StorageError, StorageResult};

/// Number of samples buffered between a range producer and its consumer.
///
/// The producer blocks once this many samples are waiting, which bounds the
/// memory a single range query can hold regardless of how large it is.
pub const RANGE_BUFFER_CAPACITY: usize = 64;

/// A single entry of a timeseries
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Sample {
    pub value: f64,
    pub timestamp: DateTime<Utc>,
}

impl Sample {
    pub fn new(value: f64, timestamp: DateTime<Utc>) -> Self {
        Self { value, timestamp }
    }
}

/// Lazy, single-pass sequence of samples in ascending timestamp order.
///
/// Backed by a bounded channel filled by a producer task. Dropping the
/// stream closes the channel; the producer notices on its next hand-off,
/// releases its cursor and exits.
#[derive(Debug)]
pub struct SampleStream {
    rx: mpsc::Receiver<Sample>,
}

impl SampleStream {
    /// Create a connected producer/stream pair.
    pub fn channel() -> (mpsc::Sender<Sample>, SampleStream) {
        let (tx, rx) = mpsc::channel(RANGE_BUFFER_CAPACITY);
        (tx, SampleStream { rx })
    }

    /// A stream that yields nothing.
    pub fn empty() -> Self {
        let (_, stream) = Self::channel();
        stream
    }

    pub async fn next(&mut self) -> Option<Sample> {
        self.rx.recv().await
    }

    /// Drain the whole stream. Only meant for small ranges and tests.
    pub async fn collect_all(mut self) -> Vec<Sample> {
        let mut samples = Vec::new();
        while let Some(sample) = self.rx.recv().await {
            samples.push(sample);
        }
        samples
    }
}

impl Stream for SampleStream {
    type Item = Sample;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Sample>> {
        self.rx.poll_recv(cx)
    }
}

/// Trait for persistent storage backends
///
/// Every engine adapter (bolt, rocksdb, mongodb) implements this trait and
/// must behave identically for the key-value operations, modulo error wording.
///
/// ## Thread Safety
///
/// Implementations must be `Send + Sync` as a single instance is shared by
/// all request handlers for the lifetime of the process.
///
/// ## Error Handling
///
/// Methods return `StorageResult<T>`. Absent keys are always
/// `StorageError::NotFound`, engine failures `StorageError::BackendIo` and
/// malformed keys `StorageError::InvalidArgument`.
#[async_trait]
pub trait StorageBackend: Send + Sync {
    /// Short label of the engine, used for logs and health reporting
    fn name(&self) -> &'static str;

    /// Create or overwrite a key-value entry
    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()>;

    /// Fetch a key-value entry
    ///
    /// Fails with `NotFound` if the key was never written or was deleted.
    async fn get(&self, key: &str) -> StorageResult<Vec<u8>>;

    /// Remove a key-value entry
    ///
    /// Fails with `NotFound` if the key does not currently exist.
    async fn delete(&self, key: &str) -> StorageResult<()>;

    /// Append a sample to a timeseries, stamped at call time
    ///
    /// Successive calls never overwrite each other, no matter how fast
    /// they are issued.
    async fn add_value(&self, series: &str, value: f64) -> StorageResult<()>;

    /// Stream all samples with `from <= timestamp <= to`, oldest first
    ///
    /// Nothing is materialized up front: samples are read from the engine's
    /// cursor as the stream is consumed. A series that does not exist yields
    /// an empty stream.
    async fn get_range(
        &self,
        series: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<SampleStream>;

    /// Delete all samples with `from <= timestamp <= to`
    ///
    /// Returns the number of samples removed.
    async fn delete_range(
        &self,
        series: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<u64>;

    /// Close the backend and release the engine handle
    ///
    /// Safe to call more than once; every other operation fails afterwards.
    async fn close(&self) -> StorageResult<()>;
}

/// Split a key into its slash-separated segments.
///
/// Empty keys and empty segments (`a//b`, `/a`, `a/`) are rejected so that
/// every backend maps the same set of keys.
pub fn key_segments(key: &str) -> StorageResult<Vec<&str>> {
    if key.is_empty() {
        return Err(StorageError::InvalidArgument("key must not be empty".to_string()));
    }
    let segments: Vec<&str> = key.split('/').collect();
    if segments.iter().any(|segment| segment.is_empty()) {
        return Err(StorageError::InvalidArgument(format!(
            "key '{key}' contains an empty path segment"
        )));
    }
    Ok(segments)
}

pub(crate) fn closed_error() -> StorageError {
    StorageError::BackendIo("backend closed".to_string())
}
