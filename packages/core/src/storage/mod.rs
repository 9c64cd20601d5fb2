//! Client Storage Implementations
//!
//! - [`MemoryStorage`] - process-local map, for tests
//! - [`FileStorage`] - JSON map on disk with atomic writes

mod file_storage;

pub use file_storage::FileStorage;

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;

use crate::collaborators::{ClientStorage, CollabResult};
use crate::error::CollaboratorError;
use crate::models::NodeId;

#[derive(Debug, Default)]
pub struct MemoryStorage {
    entries: Mutex<HashMap<String, Vec<NodeId>>>,
    failing: Mutex<bool>,
    writes: Mutex<usize>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every subsequent read and write fail
    pub fn set_failing(&self, failing: bool) {
        *self.failing.lock().unwrap_or_else(PoisonError::into_inner) = failing;
    }

    /// Number of successful writes so far
    pub fn write_count(&self) -> usize {
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Stored value without going through the async trait
    pub fn peek(&self, key: &str) -> Option<Vec<NodeId>> {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .cloned()
    }

    fn check(&self) -> CollabResult<()> {
        if *self.failing.lock().unwrap_or_else(PoisonError::into_inner) {
            return Err(CollaboratorError::unavailable("storage offline"));
        }
        Ok(())
    }
}

#[async_trait]
impl ClientStorage for MemoryStorage {
    async fn get_ids(&self, key: &str) -> CollabResult<Option<Vec<NodeId>>> {
        self.check()?;
        Ok(self.peek(key))
    }

    async fn set_ids(&self, key: &str, ids: &[NodeId]) -> CollabResult<()> {
        self.check()?;
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key.to_string(), ids.to_vec());
        *self.writes.lock().unwrap_or_else(PoisonError::into_inner) += 1;
        Ok(())
    }
}
