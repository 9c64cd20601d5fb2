//! In-memory data source
//!
//! Holds flat records behind `RwLock`s. Used by tests and the dev tools; the
//! [`MemoryLeafWriter`](super::MemoryLeafWriter) applies writes to it so a
//! rebuild after a mutation observes the change.

use std::collections::{HashMap, HashSet};
use std::sync::{Mutex, PoisonError, RwLock};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use super::{CollabResult, TreeDataSource};
use crate::error::CollaboratorError;
use crate::models::{
    ArcRecord, ContainerDetail, ContainerRecord, DocumentRecord, ExternalLinkRecord, GroupRecord,
    LeafRecord, NodeId, SessionRecord,
};

/// Fetch operations, for failure injection and call counting
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FetchOp {
    Containers,
    ContainerDetail,
    Leaves,
    ArcsByGroup,
    ExternalLinks,
    Documents,
    SessionsByArc,
}

/// Serializable snapshot of every record set
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
pub struct TreeFixture {
    pub containers: Vec<ContainerRecord>,
    pub groups: Vec<GroupRecord>,
    pub arcs: Vec<ArcRecord>,
    pub sessions: Vec<SessionRecord>,
    pub links: Vec<ExternalLinkRecord>,
    pub documents: Vec<DocumentRecord>,
    pub leaves: Vec<LeafRecord>,
}

#[derive(Default)]
pub struct MemoryDataSource {
    records: RwLock<TreeFixture>,
    failing: Mutex<HashSet<FetchOp>>,
    calls: Mutex<HashMap<FetchOp, usize>>,
}

impl MemoryDataSource {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_fixture(fixture: TreeFixture) -> Self {
        Self {
            records: RwLock::new(fixture),
            ..Self::default()
        }
    }

    pub fn snapshot(&self) -> TreeFixture {
        self.read().clone()
    }

    pub fn add_container(&self, record: ContainerRecord) {
        self.write().containers.push(record);
    }

    pub fn add_group(&self, record: GroupRecord) {
        self.write().groups.push(record);
    }

    pub fn add_arc(&self, record: ArcRecord) {
        self.write().arcs.push(record);
    }

    pub fn add_session(&self, record: SessionRecord) {
        self.write().sessions.push(record);
    }

    pub fn add_link(&self, record: ExternalLinkRecord) {
        self.write().links.push(record);
    }

    pub fn add_document(&self, record: DocumentRecord) {
        self.write().documents.push(record);
    }

    /// Insert a leaf, replacing any record with the same id
    pub fn upsert_leaf(&self, record: LeafRecord) {
        let mut records = self.write();
        match records.leaves.iter_mut().find(|l| l.id == record.id) {
            Some(existing) => *existing = record,
            None => records.leaves.push(record),
        }
        recount_children(&mut records.leaves);
    }

    pub fn leaf(&self, id: NodeId) -> Option<LeafRecord> {
        self.read().leaves.iter().find(|l| l.id == id).cloned()
    }

    /// Apply `f` to the leaf with `id`, returning the updated record
    pub fn modify_leaf(&self, id: NodeId, f: impl FnOnce(&mut LeafRecord)) -> Option<LeafRecord> {
        let mut records = self.write();
        let updated = records.leaves.iter_mut().find(|l| l.id == id).map(|leaf| {
            f(leaf);
            leaf.clone()
        })?;
        recount_children(&mut records.leaves);
        Some(updated)
    }

    /// Remove a leaf and every leaf nested under it; returns how many went
    pub fn remove_leaf_cascade(&self, id: NodeId) -> usize {
        let mut records = self.write();
        let mut doomed: HashSet<NodeId> = HashSet::from([id]);
        loop {
            let before = doomed.len();
            for leaf in &records.leaves {
                if leaf.parent_id.is_some_and(|p| doomed.contains(&p)) {
                    doomed.insert(leaf.id);
                }
            }
            if doomed.len() == before {
                break;
            }
        }

        let count = records.leaves.len();
        records.leaves.retain(|l| !doomed.contains(&l.id));
        let removed = count - records.leaves.len();
        recount_children(&mut records.leaves);
        removed
    }

    /// Make every subsequent call of `op` fail
    pub fn fail_on(&self, op: FetchOp) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(op);
    }

    pub fn clear_failures(&self) {
        self.failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn call_count(&self, op: FetchOp) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&op)
            .copied()
            .unwrap_or(0)
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, TreeFixture> {
        self.records.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, TreeFixture> {
        self.records.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn enter(&self, op: FetchOp) -> CollabResult<()> {
        *self
            .calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(op)
            .or_insert(0) += 1;

        let failing = self
            .failing
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(&op);
        if failing {
            return Err(CollaboratorError::unavailable(format!(
                "injected failure for {op:?}"
            )));
        }
        Ok(())
    }
}

fn recount_children(leaves: &mut [LeafRecord]) {
    let mut counts: HashMap<NodeId, usize> = HashMap::new();
    for parent in leaves.iter().filter_map(|l| l.parent_id) {
        *counts.entry(parent).or_insert(0) += 1;
    }
    for leaf in leaves.iter_mut() {
        leaf.child_count = counts.get(&leaf.id).copied().unwrap_or(0);
    }
}

#[async_trait]
impl TreeDataSource for MemoryDataSource {
    async fn containers(&self) -> CollabResult<Vec<ContainerRecord>> {
        self.enter(FetchOp::Containers)?;
        Ok(self.read().containers.clone())
    }

    async fn container_detail(&self, id: NodeId) -> CollabResult<Option<ContainerDetail>> {
        self.enter(FetchOp::ContainerDetail)?;
        let records = self.read();
        if !records.containers.iter().any(|c| c.id == id) {
            return Ok(None);
        }
        let groups = records
            .groups
            .iter()
            .filter(|g| g.container_id == id)
            .cloned()
            .collect();
        Ok(Some(ContainerDetail { id, groups }))
    }

    async fn leaves(&self) -> CollabResult<Vec<LeafRecord>> {
        self.enter(FetchOp::Leaves)?;
        Ok(self.read().leaves.clone())
    }

    async fn arcs_by_group(&self, group_id: NodeId) -> CollabResult<Vec<ArcRecord>> {
        self.enter(FetchOp::ArcsByGroup)?;
        Ok(self
            .read()
            .arcs
            .iter()
            .filter(|a| a.group_id == group_id)
            .cloned()
            .collect())
    }

    async fn external_links_by_container(
        &self,
        container_id: NodeId,
    ) -> CollabResult<Vec<ExternalLinkRecord>> {
        self.enter(FetchOp::ExternalLinks)?;
        Ok(self
            .read()
            .links
            .iter()
            .filter(|l| l.container_id == container_id)
            .cloned()
            .collect())
    }

    async fn documents_by_container(
        &self,
        container_id: NodeId,
    ) -> CollabResult<Vec<DocumentRecord>> {
        self.enter(FetchOp::Documents)?;
        Ok(self
            .read()
            .documents
            .iter()
            .filter(|d| d.container_id == container_id)
            .cloned()
            .collect())
    }

    async fn sessions_by_arc(&self, arc_id: NodeId) -> CollabResult<Vec<SessionRecord>> {
        self.enter(FetchOp::SessionsByArc)?;
        Ok(self
            .read()
            .sessions
            .iter()
            .filter(|s| s.arc_id == arc_id)
            .cloned()
            .collect())
    }
}
