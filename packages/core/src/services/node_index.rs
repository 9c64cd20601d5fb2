//! Node Index
//!
//! Flat id lookup over every node of one built tree plus the ordered root
//! list. The hierarchy itself lives in each node's `children` ids.
//!
//! No validation happens on insert: the builder guarantees unique ids and an
//! acyclic shape, mutations re-check cycles before moving. [`check_integrity`]
//! reports violations after the fact.
//!
//! [`check_integrity`]: NodeIndex::check_integrity

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::{Arc, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::models::{NodeId, TreeNode};

/// Index shared between UI state, mutations and the facade
pub type SharedIndex = Arc<RwLock<NodeIndex>>;

pub fn shared(index: NodeIndex) -> SharedIndex {
    Arc::new(RwLock::new(index))
}

pub(crate) fn read_index(index: &SharedIndex) -> RwLockReadGuard<'_, NodeIndex> {
    index.read().unwrap_or_else(PoisonError::into_inner)
}

pub(crate) fn write_index(index: &SharedIndex) -> RwLockWriteGuard<'_, NodeIndex> {
    index.write().unwrap_or_else(PoisonError::into_inner)
}

/// Violation of the reachability invariant
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IntegrityViolation {
    /// In the map but not reachable from any root
    Unreachable(NodeId),
    /// Listed as a child but missing from the map
    DanglingChild { parent: NodeId, child: NodeId },
    /// Listed as a root but missing from the map
    DanglingRoot(NodeId),
    /// `parent_id` does not resolve
    DanglingParentRef { node: NodeId, parent_id: NodeId },
    /// Reached through more than one edge
    SharedChild(NodeId),
    ChildCountMismatch {
        node: NodeId,
        cached: usize,
        actual: usize,
    },
}

#[derive(Debug, Clone, Default)]
pub struct NodeIndex {
    nodes: HashMap<NodeId, TreeNode>,
    roots: Vec<NodeId>,
}

impl NodeIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.get(&id)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut TreeNode> {
        self.nodes.get_mut(&id)
    }

    pub fn has(&self, id: NodeId) -> bool {
        self.nodes.contains_key(&id)
    }

    /// Insert or replace a node
    pub fn add(&mut self, node: TreeNode) {
        self.nodes.insert(node.id, node);
    }

    /// Insert a node and append it to the root list
    pub fn add_root(&mut self, node: TreeNode) {
        let id = node.id;
        self.add(node);
        if !self.roots.contains(&id) {
            self.roots.push(id);
        }
    }

    pub fn all(&self) -> impl Iterator<Item = &TreeNode> {
        self.nodes.values()
    }

    pub fn all_mut(&mut self) -> impl Iterator<Item = &mut TreeNode> {
        self.nodes.values_mut()
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn roots(&self) -> &[NodeId] {
        &self.roots
    }

    pub fn root_nodes(&self) -> impl Iterator<Item = &TreeNode> {
        self.roots.iter().filter_map(|id| self.nodes.get(id))
    }

    pub fn set_roots(&mut self, roots: Vec<NodeId>) {
        self.roots = roots;
    }

    pub fn clear(&mut self) {
        self.nodes.clear();
        self.roots.clear();
    }

    /// Child nodes of `id` in order; ids missing from the map are skipped
    pub fn children_of(&self, id: NodeId) -> Vec<&TreeNode> {
        self.get(id)
            .map(|node| {
                node.children
                    .iter()
                    .filter_map(|child| self.nodes.get(child))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Node whose `children` list contains `id`
    ///
    /// Linear scan. Resolves ancestry for nodes without `parent_id`, such as
    /// members of a virtual group; keep it off hot paths.
    pub fn find_structural_parent(&self, id: NodeId) -> Option<&TreeNode> {
        self.nodes.values().find(|node| node.children.contains(&id))
    }

    /// Next hop towards a root: `parent_id` when it resolves, otherwise the
    /// structural parent
    pub fn parent_of(&self, id: NodeId) -> Option<NodeId> {
        let node = self.get(id)?;
        if let Some(parent_id) = node.parent_id {
            if self.has(parent_id) {
                return Some(parent_id);
            }
        }
        self.find_structural_parent(id).map(|parent| parent.id)
    }

    /// Path from a root down to `id`, target last
    ///
    /// Stops at the first repeated node or after `max_depth` hops, so malformed
    /// cyclic data yields a truncated path instead of a hang. Empty when `id`
    /// is unknown.
    pub fn path_to(&self, id: NodeId, max_depth: usize) -> Vec<NodeId> {
        if !self.has(id) {
            return Vec::new();
        }

        let mut path = vec![id];
        let mut seen: HashSet<NodeId> = HashSet::from([id]);
        let mut current = id;

        while path.len() <= max_depth {
            match self.parent_of(current) {
                Some(parent) if seen.insert(parent) => {
                    path.push(parent);
                    current = parent;
                }
                _ => break,
            }
        }

        path.reverse();
        path
    }

    /// Every ancestor of `id` over both edge kinds, `id` excluded
    ///
    /// Walks `parent_id` and structural-parent edges breadth first and unions
    /// the results. Bounded by `max_depth` visited ancestors.
    pub fn ancestors(&self, id: NodeId, max_depth: usize) -> HashSet<NodeId> {
        let mut found = HashSet::new();
        let mut queue = VecDeque::from([id]);

        while let Some(current) = queue.pop_front() {
            if found.len() >= max_depth {
                break;
            }
            let Some(node) = self.get(current) else {
                continue;
            };

            let by_record = node.parent_id.filter(|p| self.has(*p));
            let structural = self.find_structural_parent(current).map(|p| p.id);

            for parent in [by_record, structural].into_iter().flatten() {
                if parent != id && found.insert(parent) {
                    queue.push_back(parent);
                }
            }
        }

        found
    }

    /// Every violation of the reachability invariant, empty for a sound tree
    pub fn check_integrity(&self) -> Vec<IntegrityViolation> {
        let mut violations = Vec::new();
        let mut reached: HashSet<NodeId> = HashSet::new();
        let mut stack: Vec<NodeId> = Vec::new();

        for root in &self.roots {
            if self.has(*root) {
                if reached.insert(*root) {
                    stack.push(*root);
                } else {
                    violations.push(IntegrityViolation::SharedChild(*root));
                }
            } else {
                violations.push(IntegrityViolation::DanglingRoot(*root));
            }
        }

        while let Some(current) = stack.pop() {
            let Some(node) = self.get(current) else {
                continue;
            };

            if node.child_count != node.children.len() {
                violations.push(IntegrityViolation::ChildCountMismatch {
                    node: current,
                    cached: node.child_count,
                    actual: node.children.len(),
                });
            }

            for child in &node.children {
                if !self.has(*child) {
                    violations.push(IntegrityViolation::DanglingChild {
                        parent: current,
                        child: *child,
                    });
                } else if reached.insert(*child) {
                    stack.push(*child);
                } else {
                    violations.push(IntegrityViolation::SharedChild(*child));
                }
            }
        }

        for node in self.nodes.values() {
            if !reached.contains(&node.id) {
                violations.push(IntegrityViolation::Unreachable(node.id));
            }
            if let Some(parent_id) = node.parent_id {
                if node.is_leaf() && !self.has(parent_id) {
                    violations.push(IntegrityViolation::DanglingParentRef {
                        node: node.id,
                        parent_id,
                    });
                }
            }
        }

        violations
    }
}
