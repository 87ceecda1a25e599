//! Storage proxy for key-value entries and timeseries
//!
//! One `StorageBackend` contract, several interchangeable engines, picked at
//! startup from a `scheme://location` descriptor (see [`storage::MetaStorage`]).

pub mod config;
pub mod storage;

#[cfg(feature = "api")]
pub mod api;
