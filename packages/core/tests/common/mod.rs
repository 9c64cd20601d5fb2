//! Shared fixtures for the integration tests

#![allow(dead_code)]

use std::sync::Arc;

use chrono::{TimeZone, Utc};
use navtree_core::collaborators::{MemoryDataSource, MemoryLeafWriter, StaticAppContext};
use navtree_core::config::TreeConfig;
use navtree_core::models::{
    ArcRecord, ContainerRecord, DocumentRecord, ExternalLinkRecord, GroupRecord, LeafKind,
    LeafRecord, NodeId, SessionRecord, VirtualGroupKind,
};
use navtree_core::services::{virtual_group_id, Collaborators, NodeIndex, TreeStateService};
use navtree_core::storage::MemoryStorage;
use uuid::Uuid;

/// In-memory collaborators wired to one data source
pub struct TestEnv {
    pub source: Arc<MemoryDataSource>,
    pub writer: Arc<MemoryLeafWriter>,
    pub storage: Arc<MemoryStorage>,
    pub context: Arc<StaticAppContext>,
}

impl TestEnv {
    pub fn new() -> Self {
        let source = Arc::new(MemoryDataSource::new());
        Self {
            writer: Arc::new(MemoryLeafWriter::new(source.clone())),
            source,
            storage: Arc::new(MemoryStorage::new()),
            context: Arc::new(StaticAppContext::default()),
        }
    }

    pub fn collaborators(&self) -> Collaborators {
        Collaborators {
            source: self.source.clone(),
            writer: self.writer.clone(),
            storage: self.storage.clone(),
            context: self.context.clone(),
        }
    }

    pub fn service(&self) -> TreeStateService {
        TreeStateService::new(self.collaborators(), TreeConfig::default())
    }

    pub fn container(&self, name: &str) -> NodeId {
        let id = Uuid::new_v4();
        self.source.add_container(ContainerRecord {
            id,
            name: name.to_string(),
            slug: Some(name.to_lowercase()),
        });
        id
    }

    pub fn group(&self, container_id: NodeId, name: &str) -> NodeId {
        let id = Uuid::new_v4();
        self.source.add_group(GroupRecord {
            id,
            container_id,
            name: name.to_string(),
        });
        id
    }

    pub fn arc(&self, group_id: NodeId, name: &str, sort_order: i32) -> NodeId {
        let id = Uuid::new_v4();
        self.source.add_arc(ArcRecord {
            id,
            group_id,
            name: name.to_string(),
            sort_order,
        });
        id
    }

    /// Session entity dated `day` days into 2024
    pub fn session(&self, arc_id: NodeId, name: &str, day: u32) -> NodeId {
        let id = Uuid::new_v4();
        self.source.add_session(SessionRecord {
            id,
            arc_id,
            name: name.to_string(),
            session_date: Utc.with_ymd_and_hms(2024, 1, day, 18, 0, 0).single(),
        });
        id
    }

    pub fn link(&self, container_id: NodeId, title: &str) -> NodeId {
        let id = Uuid::new_v4();
        self.source.add_link(ExternalLinkRecord {
            id,
            container_id,
            title: title.to_string(),
            url: format!("https://example.org/{}", title.to_lowercase()),
        });
        id
    }

    pub fn document(&self, container_id: NodeId, title: &str, content_type: &str) -> NodeId {
        let id = Uuid::new_v4();
        self.source.add_document(DocumentRecord {
            id,
            container_id,
            title: title.to_string(),
            file_name: format!("{}.bin", title.to_lowercase()),
            content_type: content_type.to_string(),
            file_size_bytes: 1024,
        });
        id
    }

    /// Top-level leaf of a container
    pub fn leaf(&self, container_id: Option<NodeId>, title: &str, kind: LeafKind) -> LeafRecord {
        let mut record = LeafRecord::new(title, kind);
        record.container_id = container_id;
        self.source.upsert_leaf(record.clone());
        record
    }

    /// Leaf nested under `parent`, same container and kind
    pub fn child_leaf(&self, parent: &LeafRecord, title: &str) -> LeafRecord {
        let mut record = LeafRecord::new(title, parent.kind);
        record.container_id = parent.container_id;
        record.parent_id = Some(parent.id);
        self.source.upsert_leaf(record.clone());
        record
    }
}

pub fn vg(container_id: NodeId, kind: VirtualGroupKind) -> NodeId {
    virtual_group_id(Some(container_id), kind)
}

/// Titles of the children of `id`, in order
pub fn child_titles(index: &NodeIndex, id: NodeId) -> Vec<String> {
    index
        .children_of(id)
        .into_iter()
        .map(|node| node.title.clone())
        .collect()
}
