use std::sync::{PoisonError, RwLock};

use super::AppContext;
use crate::models::NodeId;

/// App context with a settable current container
#[derive(Debug, Default)]
pub struct StaticAppContext {
    current: RwLock<Option<NodeId>>,
}

impl StaticAppContext {
    pub fn new(current: Option<NodeId>) -> Self {
        Self {
            current: RwLock::new(current),
        }
    }

    pub fn set_current_container(&self, id: Option<NodeId>) {
        *self.current.write().unwrap_or_else(PoisonError::into_inner) = id;
    }
}

impl AppContext for StaticAppContext {
    fn current_container_id(&self) -> Option<NodeId> {
        *self.current.read().unwrap_or_else(PoisonError::into_inner)
    }
}
