//! Tree UI State
//!
//! Selection, expansion and search-filter state over the shared
//! [`NodeIndex`]. No data-fetch calls happen here; the only I/O is persisting
//! the expanded-node set to [`ClientStorage`].
//!
//! # Locking
//!
//! Every public operation takes the index write lock first, then the
//! selection mutex, applies its change and releases both before returning.
//! Nothing is held across an await. Persisting the expanded set is scheduled
//! on the current tokio runtime and never awaited by the caller.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::runtime::Handle;
use tracing::{debug, warn};

use crate::collaborators::ClientStorage;
use crate::config::TreeConfig;
use crate::models::NodeId;
use crate::services::node_index::{write_index, NodeIndex, SharedIndex};

/// Outcome of [`TreeUiState::expand_path_and_select`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PathSelection {
    /// Path expanded and target selected
    Selected,
    /// Tree not built yet; the id is kept as the pending selection
    Deferred,
    NotFound,
}

#[derive(Debug, Default)]
pub(crate) struct UiSelection {
    pub(crate) expanded: HashSet<NodeId>,
    pub(crate) selected: Option<NodeId>,
    pub(crate) pending: Option<NodeId>,
    pub(crate) search_query: String,
    /// Expanded only to reveal search matches; never persisted
    pub(crate) search_expanded: HashSet<NodeId>,
    /// Expanded set changed since the last persist was scheduled
    dirty: bool,
}

/// Writes the newest expanded-set snapshot; stale snapshots are skipped
struct ExpandedPersister {
    storage: Arc<dyn ClientStorage>,
    key: String,
    latest: Mutex<Option<Vec<NodeId>>>,
    gate: tokio::sync::Mutex<()>,
}

impl ExpandedPersister {
    fn stage(&self, ids: Vec<NodeId>) {
        *self.latest.lock().unwrap_or_else(PoisonError::into_inner) = Some(ids);
    }

    fn schedule(self: &Arc<Self>, ids: Vec<NodeId>) {
        self.stage(ids);
        match Handle::try_current() {
            Ok(handle) => {
                let persister = Arc::clone(self);
                handle.spawn(async move { persister.flush().await });
            }
            Err(_) => debug!("No async runtime, expanded state held until the next flush"),
        }
    }

    async fn flush(&self) {
        let _gate = self.gate.lock().await;
        let next = {
            self.latest
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .take()
        };
        let Some(ids) = next else {
            return;
        };

        if let Err(e) = self.storage.set_ids(&self.key, &ids).await {
            warn!(key = %self.key, error = %e, "Failed to save expanded state");
        }
    }
}

pub struct TreeUiState {
    index: SharedIndex,
    state: Mutex<UiSelection>,
    storage: Arc<dyn ClientStorage>,
    persister: Arc<ExpandedPersister>,
    config: TreeConfig,
}

impl TreeUiState {
    pub fn new(index: SharedIndex, storage: Arc<dyn ClientStorage>, config: TreeConfig) -> Self {
        let persister = Arc::new(ExpandedPersister {
            storage: Arc::clone(&storage),
            key: config.expanded_nodes_key.clone(),
            latest: Mutex::new(None),
            gate: tokio::sync::Mutex::new(()),
        });
        Self {
            index,
            state: Mutex::new(UiSelection::default()),
            storage,
            persister,
            config,
        }
    }

    pub fn storage_key(&self) -> &str {
        &self.config.expanded_nodes_key
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, UiSelection> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Run `f` against the index and selection with both locks held, then
    /// schedule a persist if the expanded set changed
    pub(crate) fn with_locked<R>(&self, f: impl FnOnce(&mut NodeIndex, &mut UiSelection) -> R) -> R {
        let mut index = write_index(&self.index);
        let mut ui = self.lock_state();
        let result = f(&mut index, &mut ui);
        if ui.dirty {
            ui.dirty = false;
            self.persister.schedule(ui.expanded.iter().copied().collect());
        }
        result
    }

    // ==== State accessors ====

    /// The node flagged as selected. A selection requested before the first
    /// build is reported by [`Self::pending_selection`] instead.
    pub fn selected_id(&self) -> Option<NodeId> {
        self.lock_state().selected
    }

    pub fn pending_selection(&self) -> Option<NodeId> {
        self.lock_state().pending
    }

    pub fn search_query(&self) -> String {
        self.lock_state().search_query.clone()
    }

    pub fn is_search_active(&self) -> bool {
        !self.lock_state().search_query.trim().is_empty()
    }

    pub fn expanded_ids(&self) -> HashSet<NodeId> {
        self.lock_state().expanded.clone()
    }

    /// Forget expansion, selection and search; the pending selection survives
    pub fn reset(&self) {
        self.with_locked(|index, ui| {
            clear_selection_in(index, ui);
            collapse_search_expanded(index, ui);
            for id in ui.expanded.drain() {
                if let Some(node) = index.get_mut(id) {
                    node.is_expanded = false;
                }
            }
            ui.search_query.clear();
            show_all(index);
            ui.dirty = true;
        });
    }

    pub fn clear_pending_selection(&self) {
        self.lock_state().pending = None;
    }

    /// Take the pending selection; returns it at most once
    pub fn consume_pending_selection(&self) -> Option<NodeId> {
        self.lock_state().pending.take()
    }

    // ==== Expansion ====

    pub fn expand(&self, id: NodeId) -> bool {
        self.with_locked(|index, ui| expand_in(index, ui, id))
    }

    pub fn collapse(&self, id: NodeId) -> bool {
        self.with_locked(|index, ui| collapse_in(index, ui, id))
    }

    pub fn toggle(&self, id: NodeId) -> bool {
        self.with_locked(|index, ui| toggle_in(index, ui, id))
    }

    // ==== Selection ====

    /// Select a node; virtual groups and other non-selectable nodes toggle
    /// instead and leave nothing selected
    pub fn select(&self, id: NodeId) -> bool {
        self.with_locked(|index, ui| select_in(index, ui, id))
    }

    pub fn clear_selection(&self) {
        self.with_locked(|index, ui| clear_selection_in(index, ui));
    }

    /// Expand the path to `id`, collapse everything off it and select `id`
    pub fn expand_path_and_select(&self, id: NodeId, is_tree_ready: bool) -> PathSelection {
        let max_depth = self.config.max_ancestor_depth;
        self.with_locked(|index, ui| expand_path_and_select_in(index, ui, id, is_tree_ready, max_depth))
    }

    // ==== Search ====

    pub fn set_search_query(&self, query: &str) {
        let max_depth = self.config.max_ancestor_depth;
        self.with_locked(|index, ui| {
            ui.search_query = query.trim().to_string();
            apply_search_in(index, ui, max_depth);
        });
    }

    pub fn clear_search(&self) {
        self.with_locked(|index, ui| {
            ui.search_query.clear();
            collapse_search_expanded(index, ui);
            show_all(index);
        });
    }

    /// Re-apply the current query, e.g. after a rebuild
    pub fn apply_search_filter(&self) {
        let max_depth = self.config.max_ancestor_depth;
        self.with_locked(|index, ui| apply_search_in(index, ui, max_depth));
    }

    // ==== Persistence ====

    /// Replace the expanded set with the given ids that exist
    pub fn restore_expanded(&self, ids: impl IntoIterator<Item = NodeId>) {
        self.with_locked(|index, ui| restore_expanded_in(index, ui, ids, false));
    }

    /// Add the given ids that exist to the expanded set
    pub fn restore_expanded_preserving(&self, ids: impl IntoIterator<Item = NodeId>) {
        self.with_locked(|index, ui| restore_expanded_in(index, ui, ids, true));
    }

    /// Persist the current expanded set and wait for the write
    pub async fn save_expanded_state(&self) {
        let ids: Vec<NodeId> = self.lock_state().expanded.iter().copied().collect();
        self.persister.stage(ids);
        self.persister.flush().await;
    }

    /// Load the expanded set from storage; failures are logged only
    pub async fn restore_expanded_from_storage(&self) {
        match self.storage.get_ids(&self.config.expanded_nodes_key).await {
            Ok(Some(ids)) => self.restore_expanded(ids),
            Ok(None) => debug!("No saved expanded state"),
            Err(e) => warn!(error = %e, "Failed to restore expanded state"),
        }
    }
}

pub(crate) fn expand_in(index: &mut NodeIndex, ui: &mut UiSelection, id: NodeId) -> bool {
    let Some(node) = index.get_mut(id) else {
        return false;
    };
    node.is_expanded = true;
    ui.search_expanded.remove(&id);
    ui.expanded.insert(id);
    ui.dirty = true;
    true
}

pub(crate) fn collapse_in(index: &mut NodeIndex, ui: &mut UiSelection, id: NodeId) -> bool {
    let Some(node) = index.get_mut(id) else {
        return false;
    };
    node.is_expanded = false;
    ui.search_expanded.remove(&id);
    ui.expanded.remove(&id);
    ui.dirty = true;
    true
}

pub(crate) fn toggle_in(index: &mut NodeIndex, ui: &mut UiSelection, id: NodeId) -> bool {
    match index.get(id).map(|node| node.is_expanded) {
        Some(true) => collapse_in(index, ui, id),
        Some(false) => expand_in(index, ui, id),
        None => false,
    }
}

pub(crate) fn clear_selection_in(index: &mut NodeIndex, ui: &mut UiSelection) {
    if let Some(previous) = ui.selected.take() {
        if let Some(node) = index.get_mut(previous) {
            node.is_selected = false;
        }
    }
}

pub(crate) fn select_in(index: &mut NodeIndex, ui: &mut UiSelection, id: NodeId) -> bool {
    clear_selection_in(index, ui);

    let Some(node) = index.get_mut(id) else {
        return false;
    };

    if !node.node_type.is_selectable() {
        toggle_in(index, ui, id);
        return true;
    }

    node.is_selected = true;
    ui.selected = Some(id);

    if node.has_children() && !ui.expanded.contains(&id) {
        node.is_expanded = true;
        ui.search_expanded.remove(&id);
        ui.expanded.insert(id);
        ui.dirty = true;
    }
    true
}

pub(crate) fn expand_path_and_select_in(
    index: &mut NodeIndex,
    ui: &mut UiSelection,
    id: NodeId,
    is_tree_ready: bool,
    max_depth: usize,
) -> PathSelection {
    if !is_tree_ready {
        ui.pending = Some(id);
        return PathSelection::Deferred;
    }

    if !index.has(id) {
        warn!(node_id = %id, "Cannot select missing node");
        clear_selection_in(index, ui);
        return PathSelection::NotFound;
    }

    let path = index.path_to(id, max_depth);
    let on_path: HashSet<NodeId> = path.iter().copied().collect();

    for node in index.all_mut() {
        if node.is_expanded && !on_path.contains(&node.id) {
            node.is_expanded = false;
            ui.expanded.remove(&node.id);
        }
    }
    ui.search_expanded.clear();

    for ancestor in &path[..path.len().saturating_sub(1)] {
        if let Some(node) = index.get_mut(*ancestor) {
            node.is_expanded = true;
            ui.expanded.insert(*ancestor);
        }
    }
    ui.dirty = true;

    select_in(index, ui, id);
    PathSelection::Selected
}

/// Collapse nodes opened only by the search filter
fn collapse_search_expanded(index: &mut NodeIndex, ui: &mut UiSelection) {
    for id in ui.search_expanded.drain() {
        if ui.expanded.contains(&id) {
            continue;
        }
        if let Some(node) = index.get_mut(id) {
            node.is_expanded = false;
        }
    }
}

fn show_all(index: &mut NodeIndex) {
    for node in index.all_mut() {
        node.is_visible = true;
    }
}

/// Mark matches and all their ancestors visible, hide the rest and expand
/// every visible node that has a visible child
///
/// Search expansion is transient. It is tracked apart from the user's
/// expanded set and undone when the query changes or is cleared.
pub(crate) fn apply_search_in(index: &mut NodeIndex, ui: &mut UiSelection, max_depth: usize) {
    collapse_search_expanded(index, ui);

    let query = ui.search_query.trim().to_lowercase();
    if query.is_empty() {
        show_all(index);
        return;
    }

    let structural: HashMap<NodeId, NodeId> = index
        .all()
        .flat_map(|parent| parent.children.iter().map(move |child| (*child, parent.id)))
        .collect();

    let matches: Vec<NodeId> = index
        .all()
        .filter(|node| node.is_leaf() && node.title.to_lowercase().contains(&query))
        .map(|node| node.id)
        .collect();

    let mut visible: HashSet<NodeId> = HashSet::new();
    for id in matches {
        let mut stack = vec![id];
        let mut hops = 0;
        while let Some(current) = stack.pop() {
            if !visible.insert(current) || hops > max_depth {
                continue;
            }
            hops += 1;
            let by_record = index
                .get(current)
                .and_then(|node| node.parent_id)
                .filter(|parent| index.has(*parent));
            let by_structure = structural.get(&current).copied();
            stack.extend(by_record.into_iter().chain(by_structure));
        }
    }

    for node in index.all_mut() {
        node.is_visible = visible.contains(&node.id);
    }

    let to_expand: Vec<NodeId> = visible
        .iter()
        .copied()
        .filter(|id| {
            index
                .children_of(*id)
                .iter()
                .any(|child| child.is_visible)
        })
        .collect();

    for id in to_expand {
        if ui.expanded.contains(&id) {
            continue;
        }
        if let Some(node) = index.get_mut(id) {
            node.is_expanded = true;
            ui.search_expanded.insert(id);
        }
    }
}

fn restore_expanded_in(
    index: &mut NodeIndex,
    ui: &mut UiSelection,
    ids: impl IntoIterator<Item = NodeId>,
    preserve: bool,
) {
    if !preserve {
        collapse_search_expanded(index, ui);
        for id in ui.expanded.drain() {
            if let Some(node) = index.get_mut(id) {
                node.is_expanded = false;
            }
        }
    }

    for id in ids {
        if let Some(node) = index.get_mut(id) {
            node.is_expanded = true;
            ui.expanded.insert(id);
        }
    }

    ui.expanded.retain(|id| index.has(*id));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{TreeNode, TreeNodeType, VirtualGroupKind};
    use crate::services::node_index::shared;
    use crate::storage::MemoryStorage;
    use uuid::Uuid;

    struct Fixture {
        ui: TreeUiState,
        storage: Arc<MemoryStorage>,
        container: NodeId,
        group: NodeId,
        dragon: NodeId,
        hatchling: NodeId,
        castle: NodeId,
    }

    /// World > Content > { Dragons > Hatchling, Castle }
    fn fixture() -> Fixture {
        let mut index = NodeIndex::new();
        let mut container = TreeNode::new(Uuid::new_v4(), TreeNodeType::Container, "World");
        let mut group =
            TreeNode::virtual_group(Uuid::new_v4(), VirtualGroupKind::Content, "Content", Some(container.id));
        let mut dragon = TreeNode::new(Uuid::new_v4(), TreeNodeType::Leaf, "Dragons");
        let mut hatchling = TreeNode::new(Uuid::new_v4(), TreeNodeType::Leaf, "Hatchling");
        hatchling.parent_id = Some(dragon.id);
        let castle = TreeNode::new(Uuid::new_v4(), TreeNodeType::Leaf, "Castle");

        let ids = (container.id, group.id, dragon.id, hatchling.id, castle.id);
        dragon.push_child(hatchling.id);
        group.set_children(vec![castle.id, dragon.id]);
        container.push_child(group.id);
        index.add(hatchling);
        index.add(dragon);
        index.add(castle);
        index.add(group);
        index.add_root(container);

        let storage = Arc::new(MemoryStorage::new());
        let ui = TreeUiState::new(shared(index), storage.clone(), TreeConfig::default());
        Fixture {
            ui,
            storage,
            container: ids.0,
            group: ids.1,
            dragon: ids.2,
            hatchling: ids.3,
            castle: ids.4,
        }
    }

    fn flag(ui: &TreeUiState, id: NodeId, f: impl Fn(&TreeNode) -> bool) -> bool {
        ui.with_locked(|index, _| index.get(id).map(f).unwrap_or(false))
    }

    #[test]
    fn test_select_virtual_group_toggles_instead() {
        let fx = fixture();
        assert!(fx.ui.select(fx.dragon));
        assert!(fx.ui.select(fx.group));

        assert_eq!(fx.ui.selected_id(), None);
        assert!(!flag(&fx.ui, fx.dragon, |n| n.is_selected));
        assert!(flag(&fx.ui, fx.group, |n| n.is_expanded));
    }

    #[test]
    fn test_select_missing_clears_selection() {
        let fx = fixture();
        fx.ui.select(fx.castle);
        assert!(!fx.ui.select(Uuid::new_v4()));
        assert_eq!(fx.ui.selected_id(), None);
        assert!(!flag(&fx.ui, fx.castle, |n| n.is_selected));
    }

    #[test]
    fn test_select_auto_expands_parent_leaf() {
        let fx = fixture();
        fx.ui.select(fx.dragon);
        assert!(flag(&fx.ui, fx.dragon, |n| n.is_expanded));
        assert!(fx.ui.expanded_ids().contains(&fx.dragon));
    }

    #[test]
    fn test_path_selection_collapses_off_path() {
        let fx = fixture();
        fx.ui.expand(fx.castle);

        let outcome = fx.ui.expand_path_and_select(fx.hatchling, true);
        assert_eq!(outcome, PathSelection::Selected);

        let expanded = fx.ui.expanded_ids();
        assert_eq!(expanded, HashSet::from([fx.container, fx.group, fx.dragon]));
        assert!(!flag(&fx.ui, fx.castle, |n| n.is_expanded));
        assert!(!flag(&fx.ui, fx.hatchling, |n| n.is_expanded));
        assert_eq!(fx.ui.selected_id(), Some(fx.hatchling));
    }

    #[test]
    fn test_path_selection_of_missing_node() {
        let fx = fixture();
        fx.ui.select(fx.castle);
        assert_eq!(
            fx.ui.expand_path_and_select(Uuid::new_v4(), true),
            PathSelection::NotFound
        );
        assert_eq!(fx.ui.selected_id(), None);
        assert!(!flag(&fx.ui, fx.castle, |n| n.is_selected));
    }

    #[test]
    fn test_search_shows_ancestors_through_group() {
        let fx = fixture();
        fx.ui.set_search_query("  hatch ");

        for id in [fx.container, fx.group, fx.dragon, fx.hatchling] {
            assert!(flag(&fx.ui, id, |n| n.is_visible));
        }
        assert!(!flag(&fx.ui, fx.castle, |n| n.is_visible));
        assert!(flag(&fx.ui, fx.dragon, |n| n.is_expanded));
        assert!(!flag(&fx.ui, fx.hatchling, |n| n.is_expanded));
        assert_eq!(fx.ui.search_query(), "hatch");

        fx.ui.clear_search();
        assert!(flag(&fx.ui, fx.castle, |n| n.is_visible));
        assert!(!fx.ui.is_search_active());
    }

    #[tokio::test]
    async fn test_search_expansion_dropped_on_clear() {
        let fx = fixture();
        fx.ui.set_search_query("hatch");
        assert!(fx.ui.expanded_ids().is_empty());

        fx.ui.clear_search();
        assert!(!flag(&fx.ui, fx.dragon, |n| n.is_expanded));
        assert!(!flag(&fx.ui, fx.group, |n| n.is_expanded));

        fx.ui.expand(fx.castle);
        fx.ui.save_expanded_state().await;
        let saved = fx.storage.peek(fx.ui.storage_key()).unwrap_or_default();
        assert_eq!(saved, vec![fx.castle]);
    }

    #[test]
    fn test_search_keeps_user_expansion() {
        let fx = fixture();
        fx.ui.expand(fx.group);
        fx.ui.set_search_query("hatch");
        fx.ui.set_search_query("castle");

        assert!(flag(&fx.ui, fx.group, |n| n.is_expanded));
        assert!(!flag(&fx.ui, fx.dragon, |n| n.is_expanded));

        fx.ui.clear_search();
        assert!(flag(&fx.ui, fx.group, |n| n.is_expanded));
        assert_eq!(fx.ui.expanded_ids(), HashSet::from([fx.group]));
    }

    #[test]
    fn test_search_ignores_non_leaf_titles() {
        let fx = fixture();
        fx.ui.set_search_query("world");
        assert!(!flag(&fx.ui, fx.container, |n| n.is_visible));
    }

    #[test]
    fn test_restore_replace_and_preserve() {
        let fx = fixture();
        fx.ui.restore_expanded([fx.dragon, Uuid::new_v4()]);
        assert_eq!(fx.ui.expanded_ids(), HashSet::from([fx.dragon]));

        fx.ui.restore_expanded([fx.castle]);
        assert_eq!(fx.ui.expanded_ids(), HashSet::from([fx.castle]));
        assert!(!flag(&fx.ui, fx.dragon, |n| n.is_expanded));

        fx.ui.restore_expanded_preserving([fx.dragon]);
        assert_eq!(fx.ui.expanded_ids(), HashSet::from([fx.castle, fx.dragon]));
    }

    #[tokio::test]
    async fn test_save_writes_expanded_set() {
        let fx = fixture();
        fx.ui.expand(fx.dragon);
        fx.ui.save_expanded_state().await;

        let saved = fx.storage.peek(fx.ui.storage_key()).unwrap_or_default();
        assert_eq!(saved, vec![fx.dragon]);
    }

    #[tokio::test]
    async fn test_storage_failure_is_swallowed() {
        let fx = fixture();
        fx.storage.set_failing(true);
        fx.ui.expand(fx.dragon);
        fx.ui.save_expanded_state().await;
        fx.ui.restore_expanded_from_storage().await;

        assert!(fx.ui.expanded_ids().contains(&fx.dragon));
    }

    #[test]
    fn test_reset_then_select_keeps_one_selection() {
        let fx = fixture();
        fx.ui.expand_path_and_select(fx.castle, false);
        fx.ui.select(fx.dragon);
        fx.ui.reset();

        assert_eq!(fx.ui.selected_id(), None);
        assert!(fx.ui.expanded_ids().is_empty());
        assert!(!flag(&fx.ui, fx.dragon, |n| n.is_selected));
        assert!(!flag(&fx.ui, fx.dragon, |n| n.is_expanded));
        assert_eq!(fx.ui.pending_selection(), Some(fx.castle));

        fx.ui.select(fx.castle);
        let selected = fx
            .ui
            .with_locked(|index, _| index.all().filter(|n| n.is_selected).count());
        assert_eq!(selected, 1);
    }

    #[test]
    fn test_pending_selection_without_runtime() {
        let fx = fixture();
        assert_eq!(fx.ui.expand_path_and_select(fx.castle, false), PathSelection::Deferred);
        assert_eq!(fx.ui.selected_id(), None);
        assert_eq!(fx.ui.pending_selection(), Some(fx.castle));
        assert_eq!(fx.ui.consume_pending_selection(), Some(fx.castle));
        assert_eq!(fx.ui.consume_pending_selection(), None);
    }
}
