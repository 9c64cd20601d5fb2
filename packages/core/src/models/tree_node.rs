//! Tree Node
//!
//! The unit of the navigation tree. Nodes live in a
//! [`NodeIndex`](crate::services::NodeIndex) keyed by id; `children` holds the
//! ordered ids of owned child nodes.
//!
//! # Ancestry
//!
//! `parent_id` is kept for real record relationships only (leaf nested under
//! leaf). Children of a virtual group, and every structural-only edge
//! (container to group, group to arc, ...), have no `parent_id`; those edges
//! are resolved with `NodeIndex::find_structural_parent`.

use serde::{Deserialize, Serialize};

use super::{LeafKind, LeafRecord, NodeId, Visibility};

/// Kind of node in the tree
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum TreeNodeType {
    Container,
    Group,
    Arc,
    Leaf,
    Session,
    ExternalResource,
    VirtualGroup,
}

impl TreeNodeType {
    /// Types that can hold the single selection
    pub fn is_selectable(self) -> bool {
        matches!(
            self,
            TreeNodeType::Container | TreeNodeType::Group | TreeNodeType::Arc | TreeNodeType::Leaf
        )
    }
}

/// Synthetic grouping synthesized per container
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum VirtualGroupKind {
    Groups,
    Characters,
    Content,
    ExternalResources,
    Uncategorized,
}

impl VirtualGroupKind {
    /// Leaf kind a leaf takes on when dropped into this group.
    ///
    /// `None` for the groups that hold non-leaf records.
    pub fn implied_leaf_kind(self) -> Option<LeafKind> {
        match self {
            VirtualGroupKind::Characters => Some(LeafKind::Character),
            VirtualGroupKind::Content => Some(LeafKind::Content),
            VirtualGroupKind::Uncategorized => Some(LeafKind::Legacy),
            VirtualGroupKind::Groups | VirtualGroupKind::ExternalResources => None,
        }
    }

    pub fn holds_leaves(self) -> bool {
        self.implied_leaf_kind().is_some()
    }

    /// Stable name used to derive deterministic group ids
    pub fn as_str(self) -> &'static str {
        match self {
            VirtualGroupKind::Groups => "groups",
            VirtualGroupKind::Characters => "characters",
            VirtualGroupKind::Content => "content",
            VirtualGroupKind::ExternalResources => "external-resources",
            VirtualGroupKind::Uncategorized => "uncategorized",
        }
    }
}

/// File metadata carried by document resources
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentInfo {
    pub file_name: String,
    pub content_type: String,
    pub file_size_bytes: u64,
}

/// Fixed icon names
pub mod icons {
    pub const CONTAINER: &str = "fa-solid fa-globe";
    pub const GROUP: &str = "fa-solid fa-dungeon";
    pub const ARC: &str = "fa-solid fa-book-open";
    pub const SESSION: &str = "fa-solid fa-calendar-day";
    pub const LINK: &str = "fa-solid fa-external-link-alt";

    /// Icon for a document, derived from its MIME type
    pub fn document_icon(content_type: &str) -> &'static str {
        let content_type = content_type.to_ascii_lowercase();
        match content_type.as_str() {
            "application/pdf" => "fa-solid fa-file-pdf",
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document" => {
                "fa-solid fa-file-word"
            }
            "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet" => {
                "fa-solid fa-file-excel"
            }
            "application/vnd.openxmlformats-officedocument.presentationml.presentation" => {
                "fa-solid fa-file-powerpoint"
            }
            "text/plain" | "text/markdown" => "fa-solid fa-file-lines",
            ct if ct.starts_with("image/") => "fa-solid fa-file-image",
            _ => "fa-solid fa-file",
        }
    }
}

/// Node of the navigation tree
///
/// UI flags (`is_expanded`, `is_selected`, `is_visible`) are written only by
/// [`TreeUiState`](crate::services::TreeUiState); display fields only by the
/// builder and the local display updates in
/// [`TreeMutations`](crate::services::TreeMutations).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TreeNode {
    pub id: NodeId,
    pub node_type: TreeNodeType,
    /// Present only for `Leaf` nodes
    pub leaf_kind: Option<LeafKind>,
    /// Present only for `VirtualGroup` nodes
    pub virtual_group_kind: Option<VirtualGroupKind>,
    pub title: String,
    pub icon: Option<String>,
    pub slug: Option<String>,
    pub parent_id: Option<NodeId>,
    pub children: Vec<NodeId>,
    pub child_count: usize,

    pub is_expanded: bool,
    pub is_selected: bool,
    pub is_visible: bool,

    pub container_id: Option<NodeId>,
    pub group_id: Option<NodeId>,
    pub arc_id: Option<NodeId>,
    pub session_id: Option<NodeId>,

    pub visibility: Option<Visibility>,
    pub has_summary: bool,
    pub url: Option<String>,
    pub document: Option<DocumentInfo>,
}

impl TreeNode {
    /// Bare node of the given type with default UI flags
    pub fn new(id: NodeId, node_type: TreeNodeType, title: impl Into<String>) -> Self {
        Self {
            id,
            node_type,
            leaf_kind: None,
            virtual_group_kind: None,
            title: title.into(),
            icon: None,
            slug: None,
            parent_id: None,
            children: Vec::new(),
            child_count: 0,
            is_expanded: false,
            is_selected: false,
            is_visible: true,
            container_id: None,
            group_id: None,
            arc_id: None,
            session_id: None,
            visibility: None,
            has_summary: false,
            url: None,
            document: None,
        }
    }

    pub fn virtual_group(
        id: NodeId,
        kind: VirtualGroupKind,
        title: impl Into<String>,
        container_id: Option<NodeId>,
    ) -> Self {
        let mut node = Self::new(id, TreeNodeType::VirtualGroup, title);
        node.virtual_group_kind = Some(kind);
        node.container_id = container_id;
        node
    }

    /// Leaf node mirroring a flat record; children are attached by the builder
    pub fn from_leaf(record: &LeafRecord) -> Self {
        let mut node = Self::new(record.id, TreeNodeType::Leaf, record.title.clone());
        node.leaf_kind = Some(record.kind);
        node.icon = record.icon.clone();
        node.slug = record.slug.clone();
        node.parent_id = record.parent_id;
        node.container_id = record.container_id;
        node.group_id = record.group_id;
        node.arc_id = record.arc_id;
        node.session_id = record.session_id;
        node.child_count = record.child_count;
        node.visibility = Some(record.visibility);
        node.has_summary = record.has_summary;
        node
    }

    pub fn has_children(&self) -> bool {
        !self.children.is_empty()
    }

    pub fn is_leaf(&self) -> bool {
        self.node_type == TreeNodeType::Leaf
    }

    /// Whether a new leaf may be created underneath this node
    pub fn can_add_children(&self) -> bool {
        match self.node_type {
            TreeNodeType::Leaf | TreeNodeType::Arc => true,
            TreeNodeType::VirtualGroup => self.virtual_group_kind.is_some_and(|k| k.holds_leaves()),
            _ => false,
        }
    }

    /// Whether a leaf may be dropped onto this node
    pub fn is_drop_target(&self) -> bool {
        match self.node_type {
            TreeNodeType::Leaf | TreeNodeType::Session => true,
            TreeNodeType::VirtualGroup => self.virtual_group_kind.is_some_and(|k| k.holds_leaves()),
            _ => false,
        }
    }

    /// Replace the children list and keep the cached count in step
    pub fn set_children(&mut self, children: Vec<NodeId>) {
        self.child_count = children.len();
        self.children = children;
    }

    pub fn push_child(&mut self, child: NodeId) {
        self.children.push(child);
        self.child_count = self.children.len();
    }
}
