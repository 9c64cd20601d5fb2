//! Flat Collaborator Records
//!
//! Records as returned by the data-fetch collaborators. They carry relational
//! links (`container_id`, `parent_id`, ...) but no hierarchy; the tree builder
//! turns them into [`TreeNode`](super::TreeNode)s.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::NodeId;

/// Content kind of a leaf record
///
/// Drives default placement: characters go to the Characters group, content to
/// the Content group, sessions under their arc, session notes under their
/// session entity and everything else to Uncategorized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum LeafKind {
    #[default]
    Content,
    Character,
    CharacterNote,
    Session,
    SessionNote,
    Legacy,
}

impl LeafKind {
    /// Kinds placed by a dedicated rule, never by the Uncategorized catch-all
    pub const CLAIMED: [LeafKind; 5] = [
        LeafKind::Content,
        LeafKind::Character,
        LeafKind::CharacterNote,
        LeafKind::Session,
        LeafKind::SessionNote,
    ];

    pub fn is_claimed(self) -> bool {
        Self::CLAIMED.contains(&self)
    }
}

/// Audience of a leaf record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Visibility {
    #[default]
    Public,
    MembersOnly,
    Private,
}

/// Top-level isolation boundary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerRecord {
    pub id: NodeId,
    pub name: String,
    #[serde(default)]
    pub slug: Option<String>,
}

/// Per-container detail, carries the nested groups
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDetail {
    pub id: NodeId,
    #[serde(default)]
    pub groups: Vec<GroupRecord>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GroupRecord {
    pub id: NodeId,
    pub container_id: NodeId,
    pub name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ArcRecord {
    pub id: NodeId,
    pub group_id: NodeId,
    pub name: String,
    #[serde(default)]
    pub sort_order: i32,
}

/// First-class session event inside an arc
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionRecord {
    pub id: NodeId,
    pub arc_id: NodeId,
    pub name: String,
    #[serde(default)]
    pub session_date: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExternalLinkRecord {
    pub id: NodeId,
    pub container_id: NodeId,
    pub title: String,
    pub url: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentRecord {
    pub id: NodeId,
    pub container_id: NodeId,
    pub title: String,
    pub file_name: String,
    pub content_type: String,
    #[serde(default)]
    pub file_size_bytes: u64,
}

/// Content item, optionally nested under another leaf via `parent_id`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafRecord {
    pub id: NodeId,
    pub title: String,
    #[serde(default)]
    pub slug: Option<String>,
    #[serde(default)]
    pub icon: Option<String>,
    #[serde(default)]
    pub parent_id: Option<NodeId>,
    #[serde(default)]
    pub container_id: Option<NodeId>,
    #[serde(default)]
    pub group_id: Option<NodeId>,
    #[serde(default)]
    pub arc_id: Option<NodeId>,
    #[serde(default)]
    pub session_id: Option<NodeId>,
    #[serde(default)]
    pub kind: LeafKind,
    #[serde(default)]
    pub visibility: Visibility,
    #[serde(default)]
    pub child_count: usize,
    #[serde(default)]
    pub has_summary: bool,
}

impl LeafRecord {
    /// Minimal record with a fresh id; remaining fields default
    pub fn new(title: impl Into<String>, kind: LeafKind) -> Self {
        Self {
            id: NodeId::new_v4(),
            title: title.into(),
            slug: None,
            icon: None,
            parent_id: None,
            container_id: None,
            group_id: None,
            arc_id: None,
            session_id: None,
            kind,
            visibility: Visibility::Public,
            child_count: 0,
            has_summary: false,
        }
    }
}

/// Payload for the create-leaf write call
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateLeafRequest {
    pub title: String,
    pub parent_id: Option<NodeId>,
    pub container_id: Option<NodeId>,
    pub group_id: Option<NodeId>,
    pub arc_id: Option<NodeId>,
    pub session_id: Option<NodeId>,
    pub kind: LeafKind,
    pub effective_date: DateTime<Utc>,
}

/// Sparse update for the update-leaf write call (only provided fields change)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LeafPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub icon: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub kind: Option<LeafKind>,
}
