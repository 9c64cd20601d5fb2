//! Collaborator Traits - External Data Seams
//!
//! The tree subsystem owns no persistence. It reads flat records from a
//! [`TreeDataSource`], issues writes through a [`LeafWriter`], keeps the
//! expanded-node set in a [`ClientStorage`] and asks an [`AppContext`] for the
//! ambient current container.
//!
//! # Design Decisions
//!
//! 1. **Async-First**: every call may cross a network boundary, so every method
//!    is async and the implementations are `Send + Sync` so they can be held as
//!    `Arc<dyn Trait>` and shared across tasks.
//! 2. **Authorization**: implementations return only records the caller is
//!    allowed to see. The tree never filters for access.
//! 3. **Errors**: every failure is a [`CollaboratorError`]; the tree decides
//!    whether it is fatal (builds) or logged and swallowed (storage).
//!
//! # Examples
//!
//! ```rust
//! use navtree_core::collaborators::{MemoryDataSource, TreeDataSource};
//! use navtree_core::models::ContainerRecord;
//! use uuid::Uuid;
//!
//! #[tokio::main]
//! async fn main() {
//!     let source = MemoryDataSource::new();
//!     source.add_container(ContainerRecord {
//!         id: Uuid::new_v4(),
//!         name: "Homebrew".to_string(),
//!         slug: None,
//!     });
//!
//!     let containers = source.containers().await.unwrap();
//!     assert_eq!(containers.len(), 1);
//! }
//! ```

mod context;
mod memory_source;
mod memory_writer;

pub use context::StaticAppContext;
pub use memory_source::{FetchOp, MemoryDataSource, TreeFixture};
pub use memory_writer::{MemoryLeafWriter, WriteCall, WriteOp};

use async_trait::async_trait;

use crate::error::{CollaboratorError, TreeError};
use crate::models::{
    ArcRecord, ContainerDetail, ContainerRecord, CreateLeafRequest, DocumentRecord,
    ExternalLinkRecord, LeafPatch, LeafRecord, NodeId, SessionRecord,
};

pub type CollabResult<T> = Result<T, CollaboratorError>;

/// Read-only source of the flat records the tree is assembled from
#[async_trait]
pub trait TreeDataSource: Send + Sync {
    /// All containers visible to the caller
    async fn containers(&self) -> CollabResult<Vec<ContainerRecord>>;

    /// Detail (nested groups) of one container
    ///
    /// # Returns
    ///
    /// `Ok(None)` when the container no longer resolves; the builder skips it.
    async fn container_detail(&self, id: NodeId) -> CollabResult<Option<ContainerDetail>>;

    /// Every leaf across all containers, including orphans
    async fn leaves(&self) -> CollabResult<Vec<LeafRecord>>;

    async fn arcs_by_group(&self, group_id: NodeId) -> CollabResult<Vec<ArcRecord>>;

    async fn external_links_by_container(
        &self,
        container_id: NodeId,
    ) -> CollabResult<Vec<ExternalLinkRecord>>;

    async fn documents_by_container(
        &self,
        container_id: NodeId,
    ) -> CollabResult<Vec<DocumentRecord>>;

    /// Session entities of an arc
    ///
    /// Sources without first-class sessions keep the default.
    async fn sessions_by_arc(&self, _arc_id: NodeId) -> CollabResult<Vec<SessionRecord>> {
        Ok(Vec::new())
    }
}

/// Write side for leaf records
#[async_trait]
pub trait LeafWriter: Send + Sync {
    /// Create a leaf and return the stored record
    async fn create_leaf(&self, request: CreateLeafRequest) -> CollabResult<LeafRecord>;

    /// Delete a leaf; the writer cascades to its descendants
    async fn delete_leaf(&self, id: NodeId) -> CollabResult<()>;

    /// Re-parent a leaf, or attach it to a session when `attach_session` is set
    ///
    /// # Returns
    ///
    /// `Ok(false)` when the writer declined the move without an error.
    async fn move_leaf(
        &self,
        id: NodeId,
        new_parent: Option<NodeId>,
        attach_session: Option<NodeId>,
    ) -> CollabResult<bool>;

    /// Apply a sparse update; `Ok(None)` when the record is gone
    async fn update_leaf(&self, id: NodeId, patch: LeafPatch) -> CollabResult<Option<LeafRecord>>;
}

/// Durable key/value storage for id lists, best-effort from the tree's side
#[async_trait]
pub trait ClientStorage: Send + Sync {
    async fn get_ids(&self, key: &str) -> CollabResult<Option<Vec<NodeId>>>;

    async fn set_ids(&self, key: &str, ids: &[NodeId]) -> CollabResult<()>;
}

/// Ambient application context
pub trait AppContext: Send + Sync {
    /// Container new root leaves are created in
    fn current_container_id(&self) -> Option<NodeId>;
}

/// Callback invoked after every successful write
#[async_trait]
pub trait RefreshHook: Send + Sync {
    async fn refresh(&self) -> Result<(), TreeError>;
}
