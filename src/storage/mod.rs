//! Storage backends for key-value entries and timeseries
//!
//! This module provides a trait-based abstraction over several embedded and
//! remote engines, all of which behave identically from the outside.
//!
//! ## Design
//!
//! - **Trait-based**: `StorageBackend` allows swapping implementations
//! - **Async**: All operations are async; blocking engines run on the
//!   blocking pool
//! - **Streaming**: Range queries hand out a lazy `SampleStream` fed through
//!   a bounded buffer, so memory stays flat for arbitrarily large ranges
//!
//! ## Backends
//!
//! - **Bolt** (`bolt://path`): single-file B+tree with nested buckets
//! - **RocksDB** (`leveldb://path`): flat ordered LSM keyspace
//! - **MongoDB** (`mongodb://host/db`): remote document store
//!
//! ## Usage
//!
//! ```no_run
//! use storaged::storage::{MetaStorage, StorageBackend};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let store = MetaStorage::open("bolt://./storaged.boltdb").await?;
//!     store.put("greeting", b"hello".to_vec()).await?;
//!     store.close().await?;
//!     Ok(())
//! }
//! ```

pub mod backend;
pub mod clock;
pub mod codec;
pub mod dispatcher;
pub mod error;
pub mod reducer;

#[cfg(feature = "storage-bolt")]
pub mod bolt;
#[cfg(feature = "storage-mongodb")]
pub mod mongo;
#[cfg(feature = "storage-rocksdb")]
pub mod rocks;

pub use backend::{RANGE_BUFFER_CAPACITY, Sample, SampleStream, StorageBackend};
pub use dispatcher::{ConnectionDescriptor, MetaStorage, Scheme};
pub use error::{StorageError, StorageResult};
pub use reducer::{Reducer, reduce_stream};
