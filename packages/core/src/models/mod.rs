//! Data Models
//!
//! - [`TreeNode`] - the node of the assembled navigation tree
//! - Flat records returned by the data-fetch collaborators and the payloads
//!   sent to the write collaborator

mod records;
mod tree_node;

pub use records::{
    ArcRecord, ContainerDetail, ContainerRecord, CreateLeafRequest, DocumentRecord,
    ExternalLinkRecord, GroupRecord, LeafKind, LeafPatch, LeafRecord, SessionRecord, Visibility,
};
pub use tree_node::{icons, DocumentInfo, TreeNode, TreeNodeType, VirtualGroupKind};

/// Identifier of every record and node
pub type NodeId = uuid::Uuid;
