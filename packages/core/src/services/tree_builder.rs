//! Tree Builder
//!
//! One-shot assembly of the navigation tree from flat records.
//!
//! # Phases
//!
//! 1. containers and leaves, fetched together
//! 2. per-container detail (nested groups)
//! 3. per-group arcs, per-container links and per-container documents, three
//!    fan-outs joined together
//! 4. per-arc session entities
//! 5. synchronous assembly into a fresh [`NodeIndex`]
//!
//! Any failed fetch fails the whole build. Nothing is written into an index
//! that anyone else can see until the build has succeeded, so the caller keeps
//! its previous tree on error.

use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use std::time::Instant;

use futures::future::try_join_all;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::collaborators::TreeDataSource;
use crate::config::{GroupLabels, TreeConfig};
use crate::error::TreeError;
use crate::models::{
    icons, ArcRecord, ContainerDetail, ContainerRecord, DocumentInfo, DocumentRecord,
    ExternalLinkRecord, GroupRecord, LeafKind, LeafRecord, NodeId, SessionRecord, TreeNode,
    TreeNodeType, VirtualGroupKind,
};
use crate::services::NodeIndex;

/// Output of a successful build
#[derive(Debug, Clone)]
pub struct BuildResult {
    pub index: NodeIndex,
    /// Flat leaf records as fetched, for caller caching
    pub leaves: Vec<LeafRecord>,
}

pub struct TreeBuilder {
    source: Arc<dyn TreeDataSource>,
    labels: GroupLabels,
}

impl TreeBuilder {
    pub fn new(source: Arc<dyn TreeDataSource>, config: &TreeConfig) -> Self {
        Self {
            source,
            labels: config.labels.clone(),
        }
    }

    /// Fetch every record set and assemble a fresh index
    pub async fn build_tree(&self) -> Result<BuildResult, TreeError> {
        let started = Instant::now();
        let source = &self.source;

        let (containers, leaves) = tokio::try_join!(
            async {
                source
                    .containers()
                    .await
                    .map_err(|e| TreeError::build("containers", e))
            },
            async {
                source
                    .leaves()
                    .await
                    .map_err(|e| TreeError::build("leaves", e))
            },
        )?;

        if containers.is_empty() {
            debug!(leaves = leaves.len(), "No containers, returning empty tree");
            return Ok(BuildResult {
                index: NodeIndex::new(),
                leaves,
            });
        }

        let details: Vec<Option<ContainerDetail>> =
            try_join_all(containers.iter().map(|c| source.container_detail(c.id)))
                .await
                .map_err(|e| TreeError::build("container detail", e))?;

        let details: HashMap<NodeId, ContainerDetail> = details
            .into_iter()
            .flatten()
            .map(|detail| (detail.id, detail))
            .collect();

        debug!(
            containers = details.len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Container details fetched"
        );

        let groups: Vec<&GroupRecord> = details.values().flat_map(|d| d.groups.iter()).collect();

        let (arc_lists, link_lists, document_lists) = tokio::try_join!(
            async {
                try_join_all(groups.iter().map(|g| source.arcs_by_group(g.id)))
                    .await
                    .map_err(|e| TreeError::build("arcs", e))
            },
            async {
                try_join_all(
                    containers
                        .iter()
                        .map(|c| source.external_links_by_container(c.id)),
                )
                .await
                .map_err(|e| TreeError::build("external links", e))
            },
            async {
                try_join_all(containers.iter().map(|c| source.documents_by_container(c.id)))
                    .await
                    .map_err(|e| TreeError::build("documents", e))
            },
        )?;

        let arcs_by_group: HashMap<NodeId, Vec<ArcRecord>> =
            groups.iter().map(|g| g.id).zip(arc_lists).collect();
        let links_by_container: HashMap<NodeId, Vec<ExternalLinkRecord>> =
            containers.iter().map(|c| c.id).zip(link_lists).collect();
        let documents_by_container: HashMap<NodeId, Vec<DocumentRecord>> =
            containers.iter().map(|c| c.id).zip(document_lists).collect();

        debug!(
            groups = groups.len(),
            arcs = arcs_by_group.values().map(Vec::len).sum::<usize>(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Arcs, links and documents fetched"
        );

        let arc_ids: Vec<NodeId> = arcs_by_group.values().flatten().map(|a| a.id).collect();
        let session_lists = try_join_all(arc_ids.iter().map(|id| source.sessions_by_arc(*id)))
            .await
            .map_err(|e| TreeError::build("sessions", e))?;
        let sessions_by_arc: HashMap<NodeId, Vec<SessionRecord>> =
            arc_ids.into_iter().zip(session_lists).collect();

        let fetched = Fetched {
            details,
            arcs_by_group,
            sessions_by_arc,
            links_by_container,
            documents_by_container,
        };

        let mut assembly = Assembly::new(&leaves, &self.labels);
        let mut ordered: Vec<&ContainerRecord> = containers.iter().collect();
        ordered.sort_by(|a, b| by_title(&a.name, a.id, &b.name, b.id));

        for container in ordered {
            let Some(detail) = fetched.details.get(&container.id) else {
                warn!(container_id = %container.id, "Container detail not found, skipping");
                continue;
            };
            let node = assembly.container(container, detail, &fetched);
            assembly.index.add_root(node);
        }

        assembly.orphans();

        debug!(
            nodes = assembly.index.len(),
            roots = assembly.index.roots().len(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Tree build complete"
        );

        let index = assembly.index;
        Ok(BuildResult { index, leaves })
    }
}

/// Deterministic id of a virtual group, stable across rebuilds
pub fn virtual_group_id(container_id: Option<NodeId>, kind: VirtualGroupKind) -> NodeId {
    match container_id {
        Some(container) => Uuid::new_v5(&container, kind.as_str().as_bytes()),
        None => Uuid::new_v5(&Uuid::NAMESPACE_OID, b"navtree:unassigned"),
    }
}

struct Fetched {
    details: HashMap<NodeId, ContainerDetail>,
    arcs_by_group: HashMap<NodeId, Vec<ArcRecord>>,
    sessions_by_arc: HashMap<NodeId, Vec<SessionRecord>>,
    links_by_container: HashMap<NodeId, Vec<ExternalLinkRecord>>,
    documents_by_container: HashMap<NodeId, Vec<DocumentRecord>>,
}

struct Assembly<'a> {
    index: NodeIndex,
    leaves: &'a [LeafRecord],
    children_by_parent: HashMap<NodeId, Vec<&'a LeafRecord>>,
    placed: HashSet<NodeId>,
    labels: &'a GroupLabels,
}

impl<'a> Assembly<'a> {
    fn new(leaves: &'a [LeafRecord], labels: &'a GroupLabels) -> Self {
        let mut children_by_parent: HashMap<NodeId, Vec<&LeafRecord>> = HashMap::new();
        for leaf in leaves {
            if let Some(parent) = leaf.parent_id {
                children_by_parent.entry(parent).or_default().push(leaf);
            }
        }
        for children in children_by_parent.values_mut() {
            sort_leaves(children);
        }

        Self {
            index: NodeIndex::new(),
            leaves,
            children_by_parent,
            placed: HashSet::new(),
            labels,
        }
    }

    /// Top-level leaves of a container matching `filter`, ordered by title
    fn top_level(&self, container_id: NodeId, filter: impl Fn(&LeafRecord) -> bool) -> Vec<&'a LeafRecord> {
        let mut matches: Vec<&LeafRecord> = self
            .leaves
            .iter()
            .filter(|l| l.container_id == Some(container_id) && l.parent_id.is_none())
            .filter(|l| filter(*l))
            .collect();
        sort_leaves(&mut matches);
        matches
    }

    fn container(
        &mut self,
        record: &ContainerRecord,
        detail: &ContainerDetail,
        fetched: &Fetched,
    ) -> TreeNode {
        let mut node = TreeNode::new(record.id, TreeNodeType::Container, record.name.clone());
        node.icon = Some(icons::CONTAINER.to_string());
        node.slug = record.slug.clone();
        node.container_id = Some(record.id);

        let mut groups: Vec<&GroupRecord> = detail.groups.iter().collect();
        groups.sort_by(|a, b| by_title(&a.name, a.id, &b.name, b.id));
        let group_ids: Vec<NodeId> = groups
            .into_iter()
            .map(|group| self.group(group, fetched))
            .collect();
        let groups_vg = self.virtual_group(record.id, VirtualGroupKind::Groups, group_ids);

        let characters = self.top_level(record.id, |l| l.kind == LeafKind::Character);
        let character_ids = self.place_all(characters);
        let characters_vg = self.virtual_group(record.id, VirtualGroupKind::Characters, character_ids);

        let content = self.top_level(record.id, |l| l.kind == LeafKind::Content);
        let content_ids = self.place_all(content);
        let content_vg = self.virtual_group(record.id, VirtualGroupKind::Content, content_ids);

        let resource_ids = self.resources(
            record.id,
            fetched.links_by_container.get(&record.id),
            fetched.documents_by_container.get(&record.id),
        );

        // Residual class, evaluated after every dedicated rule
        let residual = self.top_level(record.id, |l| !l.kind.is_claimed());
        let residual_ids = self.place_all(residual);

        let mut children = vec![groups_vg, characters_vg, content_vg];
        if !resource_ids.is_empty() {
            children.push(self.virtual_group(
                record.id,
                VirtualGroupKind::ExternalResources,
                resource_ids,
            ));
        }
        if !residual_ids.is_empty() {
            children.push(self.virtual_group(
                record.id,
                VirtualGroupKind::Uncategorized,
                residual_ids,
            ));
        }

        node.set_children(children);
        node
    }

    fn group(&mut self, record: &GroupRecord, fetched: &Fetched) -> NodeId {
        let mut node = TreeNode::new(record.id, TreeNodeType::Group, record.name.clone());
        node.icon = Some(icons::GROUP.to_string());
        node.container_id = Some(record.container_id);
        node.group_id = Some(record.id);

        let mut arcs: Vec<&ArcRecord> = fetched
            .arcs_by_group
            .get(&record.id)
            .map(|arcs| arcs.iter().collect())
            .unwrap_or_default();
        arcs.sort_by(|a, b| {
            a.sort_order
                .cmp(&b.sort_order)
                .then_with(|| by_title(&a.name, a.id, &b.name, b.id))
        });

        let children = arcs
            .into_iter()
            .map(|arc| self.arc(arc, record.container_id, fetched))
            .collect();
        node.set_children(children);

        let id = node.id;
        self.index.add(node);
        id
    }

    fn arc(&mut self, record: &ArcRecord, container_id: NodeId, fetched: &Fetched) -> NodeId {
        let mut node = TreeNode::new(record.id, TreeNodeType::Arc, record.name.clone());
        node.icon = Some(icons::ARC.to_string());
        node.container_id = Some(container_id);
        node.group_id = Some(record.group_id);
        node.arc_id = Some(record.id);

        let mut sessions: Vec<&SessionRecord> = fetched
            .sessions_by_arc
            .get(&record.id)
            .map(|sessions| sessions.iter().collect())
            .unwrap_or_default();
        sessions.sort_by(|a, b| {
            a.session_date
                .is_none()
                .cmp(&b.session_date.is_none())
                .then_with(|| a.session_date.cmp(&b.session_date))
                .then_with(|| by_title(&a.name, a.id, &b.name, b.id))
        });

        let mut children: Vec<NodeId> = sessions
            .into_iter()
            .map(|session| self.session(session, container_id, record))
            .collect();

        let session_leaves = self.top_level(container_id, |l| {
            l.kind == LeafKind::Session && l.arc_id == Some(record.id)
        });
        children.extend(self.place_all(session_leaves));

        node.set_children(children);
        let id = node.id;
        self.index.add(node);
        id
    }

    fn session(&mut self, record: &SessionRecord, container_id: NodeId, arc: &ArcRecord) -> NodeId {
        let mut node = TreeNode::new(record.id, TreeNodeType::Session, record.name.clone());
        node.icon = Some(icons::SESSION.to_string());
        node.container_id = Some(container_id);
        node.group_id = Some(arc.group_id);
        node.arc_id = Some(arc.id);
        node.session_id = Some(record.id);

        let notes = self.top_level(container_id, |l| {
            l.kind == LeafKind::SessionNote && l.session_id == Some(record.id)
        });
        let children = self.place_all(notes);
        node.set_children(children);

        let id = node.id;
        self.index.add(node);
        id
    }

    fn resources(
        &mut self,
        container_id: NodeId,
        links: Option<&Vec<ExternalLinkRecord>>,
        documents: Option<&Vec<DocumentRecord>>,
    ) -> Vec<NodeId> {
        let mut links: Vec<&ExternalLinkRecord> = links.map(|l| l.iter().collect()).unwrap_or_default();
        links.sort_by(|a, b| by_title(&a.title, a.id, &b.title, b.id));
        let mut documents: Vec<&DocumentRecord> =
            documents.map(|d| d.iter().collect()).unwrap_or_default();
        documents.sort_by(|a, b| by_title(&a.title, a.id, &b.title, b.id));

        let mut ids = Vec::with_capacity(links.len() + documents.len());

        for link in links {
            let mut node = TreeNode::new(link.id, TreeNodeType::ExternalResource, link.title.clone());
            node.icon = Some(icons::LINK.to_string());
            node.url = Some(link.url.clone());
            node.container_id = Some(container_id);
            ids.push(node.id);
            self.index.add(node);
        }

        for document in documents {
            let mut node =
                TreeNode::new(document.id, TreeNodeType::ExternalResource, document.title.clone());
            node.icon = Some(icons::document_icon(&document.content_type).to_string());
            node.container_id = Some(container_id);
            node.document = Some(DocumentInfo {
                file_name: document.file_name.clone(),
                content_type: document.content_type.clone(),
                file_size_bytes: document.file_size_bytes,
            });
            ids.push(node.id);
            self.index.add(node);
        }

        ids
    }

    fn virtual_group(
        &mut self,
        container_id: NodeId,
        kind: VirtualGroupKind,
        children: Vec<NodeId>,
    ) -> NodeId {
        let title = match kind {
            VirtualGroupKind::Groups => &self.labels.groups,
            VirtualGroupKind::Characters => &self.labels.characters,
            VirtualGroupKind::Content => &self.labels.content,
            VirtualGroupKind::ExternalResources => &self.labels.external_resources,
            VirtualGroupKind::Uncategorized => &self.labels.uncategorized,
        };
        let mut node = TreeNode::virtual_group(
            virtual_group_id(Some(container_id), kind),
            kind,
            title.clone(),
            Some(container_id),
        );
        node.set_children(children);

        let id = node.id;
        self.index.add(node);
        id
    }

    fn place_all(&mut self, records: Vec<&'a LeafRecord>) -> Vec<NodeId> {
        records
            .into_iter()
            .filter_map(|record| self.leaf(record))
            .collect()
    }

    /// Leaf node plus every leaf nested under it
    fn leaf(&mut self, record: &'a LeafRecord) -> Option<NodeId> {
        if !self.placed.insert(record.id) {
            warn!(node_id = %record.id, "Leaf already placed elsewhere, skipping");
            return None;
        }

        let mut node = TreeNode::from_leaf(record);
        let nested = self
            .children_by_parent
            .get(&record.id)
            .cloned()
            .unwrap_or_default();
        let children = self.place_all(nested);
        node.set_children(children);

        let id = node.id;
        self.index.add(node);
        Some(id)
    }

    /// Leaves with neither container nor parent go to one root-level group
    fn orphans(&mut self) {
        let mut orphans: Vec<&'a LeafRecord> = self
            .leaves
            .iter()
            .filter(|l| l.container_id.is_none() && l.parent_id.is_none())
            .collect();
        if orphans.is_empty() {
            return;
        }
        sort_leaves(&mut orphans);
        warn!(count = orphans.len(), "Leaves without a container");

        let children = self.place_all(orphans);
        if children.is_empty() {
            return;
        }

        let mut node = TreeNode::virtual_group(
            virtual_group_id(None, VirtualGroupKind::Uncategorized),
            VirtualGroupKind::Uncategorized,
            self.labels.unassigned.clone(),
            None,
        );
        node.set_children(children);
        self.index.add_root(node);
    }
}

fn by_title(a: &str, a_id: NodeId, b: &str, b_id: NodeId) -> Ordering {
    a.cmp(b).then_with(|| a_id.cmp(&b_id))
}

fn sort_leaves(leaves: &mut [&LeafRecord]) {
    leaves.sort_by(|a, b| by_title(&a.title, a.id, &b.title, b.id));
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_virtual_group_ids_are_stable() {
        let container = Uuid::new_v4();
        assert_eq!(
            virtual_group_id(Some(container), VirtualGroupKind::Content),
            virtual_group_id(Some(container), VirtualGroupKind::Content)
        );
        assert_ne!(
            virtual_group_id(Some(container), VirtualGroupKind::Content),
            virtual_group_id(Some(container), VirtualGroupKind::Characters)
        );
        assert_ne!(
            virtual_group_id(Some(container), VirtualGroupKind::Uncategorized),
            virtual_group_id(None, VirtualGroupKind::Uncategorized)
        );
    }

    #[test]
    fn test_title_order_is_ordinal_with_id_tiebreak() {
        let low = Uuid::from_u128(1);
        let high = Uuid::from_u128(2);
        assert_eq!(by_title("B", low, "a", high), Ordering::Less);
        assert_eq!(by_title("Same", low, "Same", high), Ordering::Less);
    }
}
