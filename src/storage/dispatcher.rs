//! Backend selection from a connection descriptor
//!
//! A descriptor has the form `scheme://location`:
//!
//! | scheme                | backend        | location                  |
//! |-----------------------|----------------|---------------------------|
//! | `bolt`                | `BoltBackend`  | database file path        |
//! | `leveldb`, `rocksdb`  | `RocksBackend` | database directory path   |
//! | `mongodb`             | `MongoBackend` | `host[:port]/database`    |
//!
//! `MetaStorage` is built once at startup and afterwards forwards every call
//! to the backend it holds.

use std::fmt;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::info;

use super::backend::{SampleStream, StorageBackend};
use super::error::{StorageError, StorageResult};

/// The closed set of supported backends
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Scheme {
    Bolt,
    Rocks,
    Mongo,
}

impl FromStr for Scheme {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bolt" => Ok(Scheme::Bolt),
            "leveldb" | "rocksdb" => Ok(Scheme::Rocks),
            "mongodb" => Ok(Scheme::Mongo),
            other => Err(StorageError::InvalidArgument(format!(
                "unknown uri scheme '{other}', try bolt://, leveldb:// or mongodb://"
            ))),
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scheme::Bolt => write!(f, "bolt"),
            Scheme::Rocks => write!(f, "leveldb"),
            Scheme::Mongo => write!(f, "mongodb"),
        }
    }
}

/// Parsed `scheme://location`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionDescriptor {
    pub scheme: Scheme,
    pub location: String,
    raw: String,
}

impl ConnectionDescriptor {
    /// The descriptor exactly as given, e.g. for drivers that parse it
    /// themselves
    pub fn as_uri(&self) -> &str {
        &self.raw
    }
}

impl FromStr for ConnectionDescriptor {
    type Err = StorageError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (scheme, location) = s.split_once("://").ok_or_else(|| {
            StorageError::InvalidArgument(format!("'{s}' is not of the form scheme://location"))
        })?;
        if scheme.is_empty() {
            return Err(StorageError::InvalidArgument(format!(
                "'{s}' is missing a scheme"
            )));
        }
        let scheme = scheme.parse()?;
        if location.is_empty() {
            return Err(StorageError::InvalidArgument(format!(
                "'{s}' is missing a location"
            )));
        }

        Ok(Self {
            scheme,
            location: location.to_string(),
            raw: s.to_string(),
        })
    }
}

/// Storage that dispatches to the backend named by a descriptor
pub struct MetaStorage {
    base: Box<dyn StorageBackend>,
}

impl MetaStorage {
    /// Parse `descriptor` and open the matching backend
    ///
    /// Fails with `InvalidArgument` for malformed descriptors or backends
    /// compiled out of this build, and with `BackendIo` if the backend
    /// cannot be opened.
    pub async fn open(descriptor: &str) -> StorageResult<Self> {
        let descriptor: ConnectionDescriptor = descriptor.parse()?;
        info!(
            "selecting {} backend at {}",
            descriptor.scheme, descriptor.location
        );

        let base: Box<dyn StorageBackend> = match descriptor.scheme {
            #[cfg(feature = "storage-bolt")]
            Scheme::Bolt => Box::new(super::bolt::BoltBackend::open(&descriptor.location)?),
            #[cfg(feature = "storage-rocksdb")]
            Scheme::Rocks => Box::new(super::rocks::RocksBackend::open(&descriptor.location)?),
            #[cfg(feature = "storage-mongodb")]
            Scheme::Mongo => Box::new(super::mongo::MongoBackend::connect(descriptor.as_uri()).await?),
            #[allow(unreachable_patterns)]
            scheme => {
                return Err(StorageError::InvalidArgument(format!(
                    "{scheme} support is not compiled into this build"
                )));
            }
        };

        Ok(Self { base })
    }

    /// Wrap an already constructed backend
    pub fn with_backend(base: Box<dyn StorageBackend>) -> Self {
        Self { base }
    }
}

impl fmt::Debug for MetaStorage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MetaStorage")
            .field("backend", &self.base.name())
            .finish()
    }
}

#[async_trait]
impl StorageBackend for MetaStorage {
    fn name(&self) -> &'static str {
        self.base.name()
    }

    async fn put(&self, key: &str, value: Vec<u8>) -> StorageResult<()> {
        self.base.put(key, value).await
    }

    async fn get(&self, key: &str) -> StorageResult<Vec<u8>> {
        self.base.get(key).await
    }

    async fn delete(&self, key: &str) -> StorageResult<()> {
        self.base.delete(key).await
    }

    async fn add_value(&self, series: &str, value: f64) -> StorageResult<()> {
        self.base.add_value(series, value).await
    }

    async fn get_range(
        &self,
        series: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<SampleStream> {
        self.base.get_range(series, from, to).await
    }

    async fn delete_range(
        &self,
        series: &str,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<u64> {
        self.base.delete_range(series, from, to).await
    }

    async fn close(&self) -> StorageResult<()> {
        self.base.close().await
    }
}
