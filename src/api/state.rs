//! API shared state

use std::sync::Arc;

use crate::storage::StorageBackend;

/// Shared state passed to all API handlers
#[derive(Clone)]
pub struct ApiState {
    /// The backend every request is forwarded to
    pub storage: Arc<dyn StorageBackend>,
}

impl ApiState {
    pub fn new(storage: Arc<dyn StorageBackend>) -> Self {
        Self { storage }
    }
}
