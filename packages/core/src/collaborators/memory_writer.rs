//! In-memory leaf writer
//!
//! Applies every write to a shared [`MemoryDataSource`] and records the call,
//! so tests can assert both on the rebuilt tree and on what was (or was not)
//! sent to the writer.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;

use super::{CollabResult, LeafWriter, MemoryDataSource};
use crate::error::CollaboratorError;
use crate::models::{CreateLeafRequest, LeafPatch, LeafRecord, NodeId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WriteOp {
    Create,
    Delete,
    Move,
    Update,
}

/// A write call as received
#[derive(Debug, Clone, PartialEq)]
pub enum WriteCall {
    Create(CreateLeafRequest),
    Delete(NodeId),
    Move {
        id: NodeId,
        new_parent: Option<NodeId>,
        attach_session: Option<NodeId>,
    },
    Update {
        id: NodeId,
        patch: LeafPatch,
    },
}

impl WriteCall {
    pub fn op(&self) -> WriteOp {
        match self {
            WriteCall::Create(_) => WriteOp::Create,
            WriteCall::Delete(_) => WriteOp::Delete,
            WriteCall::Move { .. } => WriteOp::Move,
            WriteCall::Update { .. } => WriteOp::Update,
        }
    }
}

pub struct MemoryLeafWriter {
    source: Arc<MemoryDataSource>,
    calls: Mutex<Vec<WriteCall>>,
    failing: Mutex<HashSet<WriteOp>>,
}

impl MemoryLeafWriter {
    pub fn new(source: Arc<MemoryDataSource>) -> Self {
        Self {
            source,
            calls: Mutex::new(Vec::new()),
            failing: Mutex::new(HashSet::new()),
        }
    }

    pub fn calls(&self) -> Vec<WriteCall> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn calls_of(&self, op: WriteOp) -> Vec<WriteCall> {
        self.calls()
            .into_iter()
            .filter(|call| call.op() == op)
            .collect()
    }

    /// Make every subsequent call of `op` fail
    pub fn fail_on(&self, op: WriteOp) {
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

    fn record(&self, call: WriteCall) -> CollabResult<()> {
        let op = call.op();
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(call);

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

#[async_trait]
impl LeafWriter for MemoryLeafWriter {
    async fn create_leaf(&self, request: CreateLeafRequest) -> CollabResult<LeafRecord> {
        self.record(WriteCall::Create(request.clone()))?;

        if let Some(parent) = request.parent_id {
            if self.source.leaf(parent).is_none() {
                return Err(CollaboratorError::rejected(format!("unknown parent leaf {parent}")));
            }
        }

        let mut record = LeafRecord::new(request.title, request.kind);
        record.parent_id = request.parent_id;
        record.container_id = request.container_id;
        record.group_id = request.group_id;
        record.arc_id = request.arc_id;
        record.session_id = request.session_id;

        self.source.upsert_leaf(record.clone());
        Ok(record)
    }

    async fn delete_leaf(&self, id: NodeId) -> CollabResult<()> {
        self.record(WriteCall::Delete(id))?;

        if self.source.remove_leaf_cascade(id) == 0 {
            return Err(CollaboratorError::not_found(id.to_string()));
        }
        Ok(())
    }

    async fn move_leaf(
        &self,
        id: NodeId,
        new_parent: Option<NodeId>,
        attach_session: Option<NodeId>,
    ) -> CollabResult<bool> {
        self.record(WriteCall::Move {
            id,
            new_parent,
            attach_session,
        })?;

        let moved = self.source.modify_leaf(id, |leaf| match attach_session {
            Some(session) => {
                leaf.parent_id = None;
                leaf.session_id = Some(session);
            }
            None => leaf.parent_id = new_parent,
        });
        Ok(moved.is_some())
    }

    async fn update_leaf(&self, id: NodeId, patch: LeafPatch) -> CollabResult<Option<LeafRecord>> {
        self.record(WriteCall::Update {
            id,
            patch: patch.clone(),
        })?;

        Ok(self.source.modify_leaf(id, |leaf| {
            if let Some(title) = patch.title {
                leaf.title = title;
            }
            if let Some(icon) = patch.icon {
                leaf.icon = Some(icon);
            }
            if let Some(kind) = patch.kind {
                leaf.kind = kind;
            }
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::LeafKind;
    use chrono::Utc;

    fn request(title: &str) -> CreateLeafRequest {
        CreateLeafRequest {
            title: title.to_string(),
            parent_id: None,
            container_id: None,
            group_id: None,
            arc_id: None,
            session_id: None,
            kind: LeafKind::Content,
            effective_date: Utc::now(),
        }
    }

    #[tokio::test]
    async fn test_writes_land_in_source() {
        let source = Arc::new(MemoryDataSource::new());
        let writer = MemoryLeafWriter::new(source.clone());

        let created = writer.create_leaf(request("Note")).await.unwrap();
        assert!(source.leaf(created.id).is_some());

        let patch = LeafPatch {
            kind: Some(LeafKind::Character),
            ..LeafPatch::default()
        };
        let updated = writer.update_leaf(created.id, patch).await.unwrap();
        assert_eq!(updated.map(|l| l.kind), Some(LeafKind::Character));

        writer.delete_leaf(created.id).await.unwrap();
        assert!(source.leaf(created.id).is_none());
        assert_eq!(writer.calls().len(), 3);
    }

    #[tokio::test]
    async fn test_injected_failure_is_recorded() {
        let source = Arc::new(MemoryDataSource::new());
        let writer = MemoryLeafWriter::new(source.clone());
        writer.fail_on(WriteOp::Create);

        assert!(writer.create_leaf(request("Note")).await.is_err());
        assert_eq!(writer.calls_of(WriteOp::Create).len(), 1);
        assert!(source.snapshot().leaves.is_empty());
    }

    #[tokio::test]
    async fn test_create_under_unknown_parent_is_rejected() {
        let source = Arc::new(MemoryDataSource::new());
        let writer = MemoryLeafWriter::new(source.clone());

        let mut orphan = request("Orphan");
        orphan.parent_id = Some(NodeId::new_v4());
        let err = writer.create_leaf(orphan).await.unwrap_err();

        assert!(matches!(err, CollaboratorError::Rejected(_)));
        assert!(source.snapshot().leaves.is_empty());
    }

    #[tokio::test]
    async fn test_move_of_missing_leaf_is_declined() {
        let writer = MemoryLeafWriter::new(Arc::new(MemoryDataSource::new()));
        let moved = writer.move_leaf(NodeId::new_v4(), None, None).await.unwrap();
        assert!(!moved);
    }
}
