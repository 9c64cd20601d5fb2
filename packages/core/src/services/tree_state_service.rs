//! Tree State Service
//!
//! Facade over the builder, UI state and mutations. Owns the shared index,
//! wires the mutations' refresh hook to its own rebuild and publishes a
//! revision counter so a presentation layer can re-render on change.
//!
//! # Examples
//!
//! ```rust
//! use std::sync::Arc;
//! use navtree_core::collaborators::{MemoryDataSource, MemoryLeafWriter, StaticAppContext};
//! use navtree_core::config::TreeConfig;
//! use navtree_core::services::{Collaborators, TreeStateService};
//! use navtree_core::storage::MemoryStorage;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), navtree_core::TreeError> {
//!     let source = Arc::new(MemoryDataSource::new());
//!     let service = TreeStateService::new(
//!         Collaborators {
//!             source: source.clone(),
//!             writer: Arc::new(MemoryLeafWriter::new(source)),
//!             storage: Arc::new(MemoryStorage::new()),
//!             context: Arc::new(StaticAppContext::default()),
//!         },
//!         TreeConfig::default(),
//!     );
//!
//!     service.initialize().await?;
//!     assert!(service.is_initialized());
//!     assert!(service.roots().is_empty());
//!     Ok(())
//! }
//! ```

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use tokio::sync::watch;
use tracing::{error, info};

use crate::collaborators::{AppContext, ClientStorage, LeafWriter, RefreshHook, TreeDataSource};
use crate::config::TreeConfig;
use crate::error::TreeError;
use crate::models::{LeafRecord, NodeId, TreeNode, Visibility};
use crate::services::node_index::{read_index, shared, write_index, NodeIndex, SharedIndex};
use crate::services::{PathSelection, TreeBuilder, TreeMutations, TreeUiState};

/// External collaborators the service is wired to
#[derive(Clone)]
pub struct Collaborators {
    pub source: Arc<dyn TreeDataSource>,
    pub writer: Arc<dyn LeafWriter>,
    pub storage: Arc<dyn ClientStorage>,
    pub context: Arc<dyn AppContext>,
}

struct TreeStatus {
    loading: AtomicBool,
    initialized: AtomicBool,
    leaves: Mutex<Vec<LeafRecord>>,
    revision: watch::Sender<u64>,
}

impl TreeStatus {
    fn notify(&self) {
        self.revision.send_modify(|revision| *revision += 1);
    }

    fn set_loading(&self, loading: bool) {
        self.loading.store(loading, Ordering::SeqCst);
        self.notify();
    }

    fn is_initialized(&self) -> bool {
        self.initialized.load(Ordering::SeqCst)
    }

    fn set_leaves(&self, leaves: Vec<LeafRecord>) {
        *self.leaves.lock().unwrap_or_else(PoisonError::into_inner) = leaves;
    }
}

/// Rebuild path shared by the facade and the mutations' refresh hook
struct TreeRefresher {
    index: SharedIndex,
    builder: TreeBuilder,
    ui: Arc<TreeUiState>,
    status: Arc<TreeStatus>,
}

impl TreeRefresher {
    /// Rebuild, swap the new index in and carry expansion, selection and
    /// search over to it. The previous index stays in place on failure.
    async fn rebuild(&self) -> Result<(), TreeError> {
        let previously_expanded = self.ui.expanded_ids();
        let previous_selection = self.ui.selected_id();

        self.status.set_loading(true);
        let outcome = self.builder.build_tree().await;

        let result = match outcome {
            Ok(built) => {
                let nodes = built.index.len();
                *write_index(&self.index) = built.index;
                self.status.set_leaves(built.leaves);

                self.ui.restore_expanded_preserving(previously_expanded);

                if let Some(selected) = previous_selection {
                    if read_index(&self.index).has(selected) {
                        self.ui
                            .expand_path_and_select(selected, self.status.is_initialized());
                    } else {
                        self.ui.clear_selection();
                    }
                }

                if self.ui.is_search_active() {
                    self.ui.apply_search_filter();
                }

                info!(nodes, "Tree refreshed");
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to refresh tree");
                Err(e)
            }
        };

        self.status.set_loading(false);
        result
    }
}

#[async_trait]
impl RefreshHook for TreeRefresher {
    async fn refresh(&self) -> Result<(), TreeError> {
        self.rebuild().await
    }
}

pub struct TreeStateService {
    index: SharedIndex,
    ui: Arc<TreeUiState>,
    mutations: TreeMutations,
    refresher: Arc<TreeRefresher>,
    status: Arc<TreeStatus>,
    init_gate: tokio::sync::Mutex<()>,
    should_focus_title: AtomicBool,
}

impl TreeStateService {
    pub fn new(collaborators: Collaborators, config: TreeConfig) -> Self {
        let index = shared(NodeIndex::new());
        let (revision, _) = watch::channel(0);
        let status = Arc::new(TreeStatus {
            loading: AtomicBool::new(false),
            initialized: AtomicBool::new(false),
            leaves: Mutex::new(Vec::new()),
            revision,
        });

        let ui = Arc::new(TreeUiState::new(
            index.clone(),
            collaborators.storage,
            config.clone(),
        ));
        let refresher = Arc::new(TreeRefresher {
            index: index.clone(),
            builder: TreeBuilder::new(collaborators.source, &config),
            ui: ui.clone(),
            status: status.clone(),
        });
        let mutations = TreeMutations::new(
            index.clone(),
            collaborators.writer,
            collaborators.context,
            config.max_ancestor_depth,
        );
        mutations.set_refresh_hook(refresher.clone());

        Self {
            index,
            ui,
            mutations,
            refresher,
            status,
            init_gate: tokio::sync::Mutex::new(()),
            should_focus_title: AtomicBool::new(false),
        }
    }

    // ==== Lifecycle ====

    /// First build; later calls return immediately
    ///
    /// On failure the index is emptied and the error returned.
    pub async fn initialize(&self) -> Result<(), TreeError> {
        let _gate = self.init_gate.lock().await;
        if self.status.is_initialized() {
            return Ok(());
        }

        self.status.set_loading(true);
        let result = match self.refresher.builder.build_tree().await {
            Ok(built) => {
                *write_index(&self.index) = built.index;
                self.status.set_leaves(built.leaves);

                self.ui.restore_expanded_from_storage().await;
                self.status.initialized.store(true, Ordering::SeqCst);

                if let Some(pending) = self.ui.consume_pending_selection() {
                    self.ui.expand_path_and_select(pending, true);
                }
                Ok(())
            }
            Err(e) => {
                error!(error = %e, "Failed to initialize tree");
                write_index(&self.index).clear();
                self.status.set_leaves(Vec::new());
                Err(e)
            }
        };
        self.status.set_loading(false);
        result
    }

    /// Full rebuild preserving expansion, selection and search
    pub async fn refresh(&self) -> Result<(), TreeError> {
        self.refresher.rebuild().await
    }

    // ==== Status ====

    pub fn is_loading(&self) -> bool {
        self.status.loading.load(Ordering::SeqCst)
    }

    pub fn is_initialized(&self) -> bool {
        self.status.is_initialized()
    }

    pub fn has_cached_data(&self) -> bool {
        self.is_initialized() && !self.cached_leaves().is_empty()
    }

    /// Flat leaf records from the last successful build
    pub fn cached_leaves(&self) -> Vec<LeafRecord> {
        self.status
            .leaves
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Set after a successful create so the view can focus the new title
    pub fn should_focus_title(&self) -> bool {
        self.should_focus_title.load(Ordering::SeqCst)
    }

    pub fn set_should_focus_title(&self, focus: bool) {
        self.should_focus_title.store(focus, Ordering::SeqCst);
    }

    /// Receiver whose value increments on every state change
    pub fn subscribe(&self) -> watch::Receiver<u64> {
        self.status.revision.subscribe()
    }

    pub fn revision(&self) -> u64 {
        *self.status.revision.borrow()
    }

    // ==== Read access ====

    pub fn index(&self) -> SharedIndex {
        self.index.clone()
    }

    pub fn with_index<R>(&self, f: impl FnOnce(&NodeIndex) -> R) -> R {
        f(&read_index(&self.index))
    }

    /// Snapshot of the root nodes in order
    pub fn roots(&self) -> Vec<TreeNode> {
        read_index(&self.index).root_nodes().cloned().collect()
    }

    pub fn node(&self, id: NodeId) -> Option<TreeNode> {
        read_index(&self.index).get(id).cloned()
    }

    pub fn ui(&self) -> &TreeUiState {
        &self.ui
    }

    pub fn mutations(&self) -> &TreeMutations {
        &self.mutations
    }

    // ==== UI state ====

    pub fn expand(&self, id: NodeId) {
        if self.ui.expand(id) {
            self.status.notify();
        }
    }

    pub fn collapse(&self, id: NodeId) {
        if self.ui.collapse(id) {
            self.status.notify();
        }
    }

    pub fn toggle(&self, id: NodeId) {
        if self.ui.toggle(id) {
            self.status.notify();
        }
    }

    pub fn select(&self, id: NodeId) -> bool {
        let selected = self.ui.select(id);
        self.status.notify();
        selected
    }

    pub fn clear_selection(&self) {
        self.ui.clear_selection();
        self.status.notify();
    }

    pub fn selected_id(&self) -> Option<NodeId> {
        self.ui.selected_id()
    }

    /// Deferred until the first build when called before `initialize`
    pub fn expand_path_and_select(&self, id: NodeId) -> PathSelection {
        let outcome = self.ui.expand_path_and_select(id, self.is_initialized());
        self.status.notify();
        outcome
    }

    pub fn set_search_query(&self, query: &str) {
        self.ui.set_search_query(query);
        self.status.notify();
    }

    pub fn clear_search(&self) {
        self.ui.clear_search();
        self.status.notify();
    }

    pub fn search_query(&self) -> String {
        self.ui.search_query()
    }

    pub fn expanded_ids(&self) -> HashSet<NodeId> {
        self.ui.expanded_ids()
    }

    pub fn restore_expanded(&self, ids: impl IntoIterator<Item = NodeId>) {
        self.ui.restore_expanded(ids);
        self.status.notify();
    }

    pub async fn save_expanded_state(&self) {
        self.ui.save_expanded_state().await;
    }

    // ==== Mutations ====

    pub async fn create_root(&self) -> Option<NodeId> {
        let id = self.mutations.create_root().await?;
        self.ui.select(id);
        self.set_should_focus_title(true);
        self.status.notify();
        Some(id)
    }

    /// Create under `parent_id`, then expand the parent and select the new leaf
    pub async fn create_child(&self, parent_id: NodeId) -> Option<NodeId> {
        let id = self.mutations.create_child(parent_id).await?;
        self.ui.expand(parent_id);
        self.ui.select(id);
        self.set_should_focus_title(true);
        self.status.notify();
        Some(id)
    }

    pub async fn delete_leaf(&self, id: NodeId) -> bool {
        let was_selected = self.ui.selected_id() == Some(id);
        let deleted = self.mutations.delete_leaf(id).await;
        if deleted && was_selected {
            self.ui.clear_selection();
        }
        self.status.notify();
        deleted
    }

    /// Refresh and notification happen through the refresh hook
    pub async fn move_leaf(&self, id: NodeId, new_parent: Option<NodeId>) -> bool {
        self.mutations.move_leaf(id, new_parent).await
    }

    pub fn update_node_display(&self, id: NodeId, title: impl Into<String>, icon: Option<String>) {
        if self.mutations.update_node_display(id, title, icon) {
            self.status.notify();
        }
    }

    pub fn update_node_visibility(&self, id: NodeId, level: Visibility) {
        if self.mutations.update_node_visibility(id, level) {
            self.status.notify();
        }
    }

    pub fn can_accept_children(&self, id: NodeId) -> bool {
        self.mutations.can_accept_children(id)
    }

    pub fn is_valid_drop_target(&self, id: NodeId) -> bool {
        self.mutations.is_valid_drop_target(id)
    }
}
