//! Tree Mutations
//!
//! Create, move and delete leaves through the [`LeafWriter`], validating the
//! tree shape against the shared index before any write is issued. Every
//! successful write runs the registered [`RefreshHook`]; failed writes do not.
//!
//! Public operations report plain outcomes (`bool`, `Option<NodeId>`) and log
//! the reason for a failure: validation failures at `warn`, writer failures at
//! `error`. [`TreeMutations::validate_move`] and
//! [`TreeMutations::child_request`] expose the reason as a [`TreeError`].

use std::sync::{Arc, PoisonError, RwLock};

use chrono::Utc;
use tracing::{debug, error, warn};

use crate::collaborators::{AppContext, LeafWriter, RefreshHook};
use crate::error::{TreeError, TreeResult};
use crate::models::{
    CreateLeafRequest, LeafKind, LeafPatch, NodeId, TreeNodeType, VirtualGroupKind, Visibility,
};
use crate::services::node_index::{read_index, write_index, SharedIndex};

/// Validated move, ready to execute
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MovePlan {
    /// Move to the top of a virtual group, changing kind when the group
    /// implies a different one
    ToVirtualGroup {
        group: VirtualGroupKind,
        new_kind: Option<LeafKind>,
    },
    /// Attach a session note to a session entity
    AttachToSession { session_id: NodeId },
    /// Plain structural move; `None` moves to the top level
    Reparent { new_parent: Option<NodeId> },
}

pub struct TreeMutations {
    index: SharedIndex,
    writer: Arc<dyn LeafWriter>,
    context: Arc<dyn AppContext>,
    refresh_hook: RwLock<Option<Arc<dyn RefreshHook>>>,
    max_depth: usize,
}

impl TreeMutations {
    pub fn new(
        index: SharedIndex,
        writer: Arc<dyn LeafWriter>,
        context: Arc<dyn AppContext>,
        max_depth: usize,
    ) -> Self {
        Self {
            index,
            writer,
            context,
            refresh_hook: RwLock::new(None),
            max_depth,
        }
    }

    pub fn set_refresh_hook(&self, hook: Arc<dyn RefreshHook>) {
        *self
            .refresh_hook
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Some(hook);
    }

    async fn run_refresh(&self) {
        let hook = self
            .refresh_hook
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        let Some(hook) = hook else {
            return;
        };
        if let Err(e) = hook.refresh().await {
            warn!(error = %e, "Refresh after write failed, tree is stale until next rebuild");
        }
    }

    // ==== Create ====

    /// Create an empty content leaf at the top of the current container
    pub async fn create_root(&self) -> Option<NodeId> {
        let result = async { self.try_create(self.root_request()?).await }.await;
        settle(result, "Create root leaf", None)
    }

    pub async fn create_child(&self, parent_id: NodeId) -> Option<NodeId> {
        let result = async { self.try_create(self.child_request(parent_id)?).await }.await;
        settle(result, "Create child", Some(parent_id))
    }

    fn root_request(&self) -> TreeResult<CreateLeafRequest> {
        let container_id = self
            .context
            .current_container_id()
            .ok_or(TreeError::NoCurrentContainer)?;

        Ok(CreateLeafRequest {
            title: String::new(),
            parent_id: None,
            container_id: Some(container_id),
            group_id: None,
            arc_id: None,
            session_id: None,
            kind: LeafKind::Content,
            effective_date: Utc::now(),
        })
    }

    /// Request that `create_child(parent_id)` would send
    pub fn child_request(&self, parent_id: NodeId) -> TreeResult<CreateLeafRequest> {
        let index = read_index(&self.index);
        let parent = index
            .get(parent_id)
            .ok_or_else(|| TreeError::node_not_found(parent_id))?;

        let mut request = CreateLeafRequest {
            title: String::new(),
            parent_id: None,
            container_id: parent.container_id.or_else(|| self.context.current_container_id()),
            group_id: parent.group_id,
            arc_id: parent.arc_id,
            session_id: None,
            kind: LeafKind::Content,
            effective_date: Utc::now(),
        };

        match parent.node_type {
            TreeNodeType::VirtualGroup => {
                let group = parent
                    .virtual_group_kind
                    .ok_or_else(|| TreeError::invalid_target("virtual group without a kind"))?;
                if group == VirtualGroupKind::Groups {
                    return Err(TreeError::invalid_target("groups are not created as leaves"));
                }
                request.kind = group.implied_leaf_kind().unwrap_or(LeafKind::Content);
            }
            TreeNodeType::Arc => {
                request.kind = LeafKind::Session;
                request.arc_id = Some(parent.id);
            }
            TreeNodeType::Leaf => {
                request.parent_id = Some(parent.id);
                request.kind = parent.leaf_kind.unwrap_or(LeafKind::Content);
                request.session_id = parent.session_id;
            }
            TreeNodeType::Session => {
                request.kind = LeafKind::SessionNote;
                request.session_id = Some(parent.id);
            }
            other => {
                return Err(TreeError::invalid_target(format!(
                    "cannot create a leaf under a {other:?} node"
                )));
            }
        }

        Ok(request)
    }

    async fn try_create(&self, request: CreateLeafRequest) -> TreeResult<NodeId> {
        let created = self.writer.create_leaf(request).await?;
        debug!(node_id = %created.id, "Leaf created");
        self.run_refresh().await;
        Ok(created.id)
    }

    // ==== Delete ====

    /// Delete a leaf; the writer removes its descendants
    pub async fn delete_leaf(&self, id: NodeId) -> bool {
        settle(self.try_delete(id).await, "Delete leaf", Some(id)).is_some()
    }

    async fn try_delete(&self, id: NodeId) -> TreeResult<()> {
        if !self.is_valid_leaf(id) {
            return Err(TreeError::invalid_target("not a leaf in the tree"));
        }
        self.writer.delete_leaf(id).await?;
        self.run_refresh().await;
        Ok(())
    }

    // ==== Move ====

    /// Check a move against the current tree without writing anything
    pub fn validate_move(&self, id: NodeId, new_parent: Option<NodeId>) -> TreeResult<MovePlan> {
        let index = read_index(&self.index);
        let source = index.get(id).ok_or_else(|| TreeError::node_not_found(id))?;
        if !source.is_leaf() {
            return Err(TreeError::invalid_target("only leaves can be moved"));
        }

        let Some(target_id) = new_parent else {
            return Ok(MovePlan::Reparent { new_parent: None });
        };

        if target_id == id {
            return Err(TreeError::invalid_move("cannot move a leaf into itself"));
        }
        if index.ancestors(target_id, self.max_depth).contains(&id) {
            return Err(TreeError::invalid_move(
                "cannot move a leaf into its own descendant",
            ));
        }

        let Some(target) = index.get(target_id) else {
            return Ok(MovePlan::Reparent {
                new_parent: Some(target_id),
            });
        };

        match target.node_type {
            TreeNodeType::VirtualGroup => {
                let group = target
                    .virtual_group_kind
                    .ok_or_else(|| TreeError::invalid_target("virtual group without a kind"))?;
                let implied = group.implied_leaf_kind().ok_or_else(|| {
                    TreeError::invalid_target(format!("{group:?} group does not hold leaves"))
                })?;
                let new_kind = (source.leaf_kind != Some(implied)).then_some(implied);
                Ok(MovePlan::ToVirtualGroup { group, new_kind })
            }
            TreeNodeType::Session => {
                if source.leaf_kind == Some(LeafKind::SessionNote) {
                    Ok(MovePlan::AttachToSession {
                        session_id: target_id,
                    })
                } else {
                    Err(TreeError::invalid_target(
                        "only session notes can be attached to a session",
                    ))
                }
            }
            TreeNodeType::Leaf => Ok(MovePlan::Reparent {
                new_parent: Some(target_id),
            }),
            other => Err(TreeError::invalid_target(format!(
                "cannot move a leaf under a {other:?} node"
            ))),
        }
    }

    pub async fn move_leaf(&self, id: NodeId, new_parent: Option<NodeId>) -> bool {
        settle(self.try_move(id, new_parent).await, "Move leaf", Some(id)).unwrap_or(false)
    }

    /// `Ok(false)` when the writer declined the move
    async fn try_move(&self, id: NodeId, new_parent: Option<NodeId>) -> TreeResult<bool> {
        let moved = match self.validate_move(id, new_parent)? {
            MovePlan::ToVirtualGroup { new_kind, .. } => self.move_to_group(id, new_kind).await?,
            MovePlan::AttachToSession { session_id } => {
                self.call_move(id, None, Some(session_id)).await?
            }
            MovePlan::Reparent { new_parent } => self.call_move(id, new_parent, None).await?,
        };

        if moved {
            self.run_refresh().await;
        }
        Ok(moved)
    }

    async fn call_move(
        &self,
        id: NodeId,
        new_parent: Option<NodeId>,
        attach_session: Option<NodeId>,
    ) -> TreeResult<bool> {
        let moved = self.writer.move_leaf(id, new_parent, attach_session).await?;
        if !moved {
            warn!(node_id = %id, "Writer declined the move");
        }
        Ok(moved)
    }

    /// Structural move first; a failed kind update still counts as success
    async fn move_to_group(&self, id: NodeId, new_kind: Option<LeafKind>) -> TreeResult<bool> {
        if !self.call_move(id, None, None).await? {
            return Ok(false);
        }

        let Some(kind) = new_kind else {
            return Ok(true);
        };
        let patch = LeafPatch {
            kind: Some(kind),
            ..LeafPatch::default()
        };
        match self.writer.update_leaf(id, patch).await {
            Ok(Some(_)) => {}
            Ok(None) => warn!(node_id = %id, "Leaf vanished before its kind was updated"),
            Err(e) => warn!(node_id = %id, error = %e, "Moved, but failed to update kind"),
        }
        Ok(true)
    }

    // ==== Local display updates ====

    /// Mirror a remote title/icon change onto the node without a rebuild
    pub fn update_node_display(&self, id: NodeId, title: impl Into<String>, icon: Option<String>) -> bool {
        let mut index = write_index(&self.index);
        let Some(node) = index.get_mut(id) else {
            return false;
        };
        node.title = title.into();
        node.icon = icon;
        true
    }

    pub fn update_node_visibility(&self, id: NodeId, level: Visibility) -> bool {
        let mut index = write_index(&self.index);
        match index.get_mut(id) {
            Some(node) if node.is_leaf() => {
                node.visibility = Some(level);
                true
            }
            _ => false,
        }
    }

    // ==== Queries ====

    /// Whether `ancestor` sits above `node` through either edge kind
    pub fn is_descendant_of(&self, node: NodeId, ancestor: NodeId) -> bool {
        read_index(&self.index)
            .ancestors(node, self.max_depth)
            .contains(&ancestor)
    }

    pub fn is_valid_leaf(&self, id: NodeId) -> bool {
        read_index(&self.index).get(id).is_some_and(|node| node.is_leaf())
    }

    pub fn can_accept_children(&self, id: NodeId) -> bool {
        read_index(&self.index)
            .get(id)
            .is_some_and(|node| node.can_add_children() || node.node_type == TreeNodeType::Session)
    }

    pub fn is_valid_drop_target(&self, id: NodeId) -> bool {
        read_index(&self.index)
            .get(id)
            .is_some_and(|node| node.is_drop_target())
    }
}

/// Log a failed operation and flatten it to an `Option`
fn settle<T>(result: TreeResult<T>, action: &str, node_id: Option<NodeId>) -> Option<T> {
    match result {
        Ok(value) => Some(value),
        Err(e) if e.is_validation() => {
            warn!(node_id = ?node_id, error = %e, "{action} rejected");
            None
        }
        Err(e) => {
            error!(node_id = ?node_id, error = %e, "{action} failed");
            None
        }
    }
}
