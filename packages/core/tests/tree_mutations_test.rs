//! Integration tests for tree mutations through the service facade
//!
//! Tests cover:
//! - Create under each parent type and the follow-up selection
//! - Move validation and the write calls each move issues
//! - Delete and failure handling

mod common;

use anyhow::Result;
use common::{child_titles, vg, TestEnv};
use navtree_core::collaborators::{FetchOp, WriteCall, WriteOp};
use navtree_core::models::{
    CreateLeafRequest, LeafKind, LeafPatch, LeafRecord, NodeId, VirtualGroupKind, Visibility,
};
use navtree_core::services::{MovePlan, TreeStateService};
use navtree_core::TreeError;

struct Campaign {
    env: TestEnv,
    world: NodeId,
    arc: NodeId,
    session: NodeId,
    hero: LeafRecord,
    diary: LeafRecord,
    lore: LeafRecord,
}

async fn campaign() -> Result<(Campaign, TreeStateService)> {
    let env = TestEnv::new();
    let world = env.container("World");
    let group = env.group(world, "Main");
    let arc = env.arc(group, "Opening", 0);
    let session = env.session(arc, "Session One", 5);
    let hero = env.leaf(Some(world), "Hero", LeafKind::Character);
    let diary = env.child_leaf(&hero, "Diary");
    let lore = env.leaf(Some(world), "Lore", LeafKind::Content);
    env.context.set_current_container(Some(world));

    let service = env.service();
    service.initialize().await?;
    Ok((
        Campaign {
            env,
            world,
            arc,
            session,
            hero,
            diary,
            lore,
        },
        service,
    ))
}

fn created(c: &Campaign) -> Vec<CreateLeafRequest> {
    c.env
        .writer
        .calls_of(WriteOp::Create)
        .into_iter()
        .filter_map(|call| match call {
            WriteCall::Create(request) => Some(request),
            _ => None,
        })
        .collect()
}

// =========================================================================
// Create
// =========================================================================

#[tokio::test]
async fn test_create_under_characters_group() -> Result<()> {
    let (c, service) = campaign().await?;
    let characters = vg(c.world, VirtualGroupKind::Characters);

    let id = service.create_child(characters).await.expect("leaf created");

    let requests = created(&c);
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].parent_id, None);
    assert_eq!(requests[0].kind, LeafKind::Character);
    assert_eq!(requests[0].container_id, Some(c.world));

    let group = service.node(characters).expect("characters group");
    assert!(group.children.contains(&id));
    assert!(group.is_expanded);
    assert_eq!(service.selected_id(), Some(id));
    assert!(service.should_focus_title());
    Ok(())
}

#[tokio::test]
async fn test_create_under_leaf_inherits_kind() -> Result<()> {
    let (c, service) = campaign().await?;

    let id = service.create_child(c.hero.id).await.expect("leaf created");

    let request = &created(&c)[0];
    assert_eq!(request.parent_id, Some(c.hero.id));
    assert_eq!(request.kind, LeafKind::Character);
    assert_eq!(service.node(id).and_then(|n| n.parent_id), Some(c.hero.id));
    assert_eq!(service.node(c.hero.id).map(|n| n.child_count), Some(2));
    Ok(())
}

#[tokio::test]
async fn test_create_under_arc_and_session() -> Result<()> {
    let (c, service) = campaign().await?;

    let recap = service.create_child(c.arc).await.expect("session leaf");
    let note = service.create_child(c.session).await.expect("session note");

    let requests = created(&c);
    assert_eq!(requests[0].kind, LeafKind::Session);
    assert_eq!(requests[0].arc_id, Some(c.arc));
    assert_eq!(requests[1].kind, LeafKind::SessionNote);
    assert_eq!(requests[1].session_id, Some(c.session));

    assert!(service.node(c.arc).is_some_and(|n| n.children.contains(&recap)));
    assert!(service.node(c.session).is_some_and(|n| n.children.contains(&note)));
    Ok(())
}

#[tokio::test]
async fn test_create_root_uses_current_container() -> Result<()> {
    let (c, service) = campaign().await?;

    let id = service.create_root().await.expect("root leaf");

    let request = &created(&c)[0];
    assert_eq!(request.container_id, Some(c.world));
    assert_eq!(request.kind, LeafKind::Content);
    assert_eq!(service.selected_id(), Some(id));

    c.env.context.set_current_container(None);
    assert!(service.create_root().await.is_none());
    assert_eq!(created(&c).len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_create_rejected_under_groups() -> Result<()> {
    let (c, service) = campaign().await?;

    assert!(service.create_child(vg(c.world, VirtualGroupKind::Groups)).await.is_none());
    assert!(service.create_child(c.world).await.is_none());
    assert!(c.env.writer.calls().is_empty());
    assert!(!service.should_focus_title());
    Ok(())
}

#[tokio::test]
async fn test_failed_create_skips_refresh() -> Result<()> {
    let (c, service) = campaign().await?;
    c.env.writer.fail_on(WriteOp::Create);
    let builds = c.env.source.call_count(FetchOp::Containers);

    assert!(service.create_child(c.hero.id).await.is_none());

    assert_eq!(created(&c).len(), 1, "the call was attempted");
    assert_eq!(
        c.env.source.call_count(FetchOp::Containers),
        builds
    );
    assert_eq!(service.selected_id(), None);
    Ok(())
}

// =========================================================================
// Move
// =========================================================================

#[tokio::test]
async fn test_move_into_groups_rejected_without_writes() -> Result<()> {
    let (c, service) = campaign().await?;

    let moved = service
        .move_leaf(c.lore.id, Some(vg(c.world, VirtualGroupKind::Groups)))
        .await;

    assert!(!moved);
    assert!(c.env.writer.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_cycle_moves_rejected() -> Result<()> {
    let (c, service) = campaign().await?;

    assert!(matches!(
        service.mutations().validate_move(c.hero.id, Some(c.hero.id)),
        Err(TreeError::InvalidMove(_))
    ));
    assert!(matches!(
        service.mutations().validate_move(c.hero.id, Some(c.diary.id)),
        Err(TreeError::InvalidMove(_))
    ));
    assert!(!service.move_leaf(c.hero.id, Some(c.diary.id)).await);
    assert!(c.env.writer.calls().is_empty());
    assert!(service.mutations().is_descendant_of(c.diary.id, c.hero.id));
    Ok(())
}

#[tokio::test]
async fn test_move_into_content_group_changes_kind() -> Result<()> {
    let (c, service) = campaign().await?;
    let content = vg(c.world, VirtualGroupKind::Content);

    assert_eq!(
        service.mutations().validate_move(c.diary.id, Some(content))?,
        MovePlan::ToVirtualGroup {
            group: VirtualGroupKind::Content,
            new_kind: Some(LeafKind::Content),
        }
    );
    assert!(service.move_leaf(c.diary.id, Some(content)).await);

    assert_eq!(
        c.env.writer.calls(),
        vec![
            WriteCall::Move {
                id: c.diary.id,
                new_parent: None,
                attach_session: None,
            },
            WriteCall::Update {
                id: c.diary.id,
                patch: LeafPatch {
                    kind: Some(LeafKind::Content),
                    ..LeafPatch::default()
                },
            },
        ]
    );
    assert_eq!(
        service.with_index(|index| child_titles(index, content)),
        vec!["Diary", "Lore"]
    );
    assert_eq!(service.node(c.diary.id).and_then(|n| n.parent_id), None);
    Ok(())
}

#[tokio::test]
async fn test_move_succeeds_when_kind_update_fails() -> Result<()> {
    let (c, service) = campaign().await?;
    c.env.writer.fail_on(WriteOp::Update);

    let moved = service
        .move_leaf(c.lore.id, Some(vg(c.world, VirtualGroupKind::Characters)))
        .await;

    assert!(moved);
    assert_eq!(c.env.writer.calls_of(WriteOp::Update).len(), 1);
    Ok(())
}

#[tokio::test]
async fn test_move_within_same_kind_skips_update() -> Result<()> {
    let (c, service) = campaign().await?;

    let moved = service
        .move_leaf(c.diary.id, Some(vg(c.world, VirtualGroupKind::Characters)))
        .await;

    assert!(moved);
    assert!(c.env.writer.calls_of(WriteOp::Update).is_empty());
    assert!(service
        .node(vg(c.world, VirtualGroupKind::Characters))
        .is_some_and(|n| n.children.contains(&c.diary.id)));
    Ok(())
}

#[tokio::test]
async fn test_session_note_attaches_to_session() -> Result<()> {
    let (c, service) = campaign().await?;
    let later = c.env.session(c.arc, "Session Two", 12);
    let mut note = LeafRecord::new("Loot", LeafKind::SessionNote);
    note.container_id = Some(c.world);
    note.session_id = Some(later);
    c.env.source.upsert_leaf(note.clone());
    service.refresh().await?;
    assert!(service.node(later).is_some_and(|n| n.children.contains(&note.id)));

    assert!(!service.move_leaf(c.lore.id, Some(c.session)).await);
    assert!(service.move_leaf(note.id, Some(c.session)).await);

    assert_eq!(
        c.env.writer.calls(),
        vec![WriteCall::Move {
            id: note.id,
            new_parent: None,
            attach_session: Some(c.session),
        }]
    );
    assert!(service.node(c.session).is_some_and(|n| n.children.contains(&note.id)));
    Ok(())
}

#[tokio::test]
async fn test_reparent_under_leaf() -> Result<()> {
    let (c, service) = campaign().await?;

    assert!(service.move_leaf(c.lore.id, Some(c.hero.id)).await);

    assert_eq!(service.node(c.lore.id).and_then(|n| n.parent_id), Some(c.hero.id));
    assert!(!service
        .node(vg(c.world, VirtualGroupKind::Content))
        .is_some_and(|n| n.children.contains(&c.lore.id)));
    Ok(())
}

// =========================================================================
// Delete and local updates
// =========================================================================

#[tokio::test]
async fn test_delete_selected_leaf_clears_selection() -> Result<()> {
    let (c, service) = campaign().await?;
    service.select(c.hero.id);

    assert!(service.delete_leaf(c.hero.id).await);

    assert_eq!(service.selected_id(), None);
    assert!(service.node(c.hero.id).is_none());
    assert!(service.node(c.diary.id).is_none(), "descendants go with it");
    assert_eq!(c.env.writer.calls(), vec![WriteCall::Delete(c.hero.id)]);
    Ok(())
}

#[tokio::test]
async fn test_delete_rejects_non_leaves() -> Result<()> {
    let (c, service) = campaign().await?;

    assert!(!service.delete_leaf(c.arc).await);
    assert!(!service.delete_leaf(NodeId::new_v4()).await);
    assert!(c.env.writer.calls().is_empty());

    c.env.writer.fail_on(WriteOp::Delete);
    assert!(!service.delete_leaf(c.lore.id).await);
    assert!(service.node(c.lore.id).is_some());
    Ok(())
}

#[tokio::test]
async fn test_local_display_updates() -> Result<()> {
    let (c, service) = campaign().await?;

    service.update_node_display(c.lore.id, "Ancient Lore", Some("fa-solid fa-scroll".into()));
    service.update_node_visibility(c.lore.id, Visibility::Private);
    service.update_node_visibility(c.arc, Visibility::Private);

    let lore = service.node(c.lore.id).expect("lore");
    assert_eq!(lore.title, "Ancient Lore");
    assert_eq!(lore.icon.as_deref(), Some("fa-solid fa-scroll"));
    assert_eq!(lore.visibility, Some(Visibility::Private));
    assert_eq!(service.node(c.arc).and_then(|n| n.visibility), None);
    assert!(c.env.writer.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_drop_target_queries() -> Result<()> {
    let (c, service) = campaign().await?;

    assert!(service.can_accept_children(c.hero.id));
    assert!(service.can_accept_children(c.arc));
    assert!(service.can_accept_children(c.session));
    assert!(!service.can_accept_children(vg(c.world, VirtualGroupKind::Groups)));
    assert!(!service.can_accept_children(c.world));

    assert!(service.is_valid_drop_target(c.hero.id));
    assert!(service.is_valid_drop_target(c.session));
    assert!(service.is_valid_drop_target(vg(c.world, VirtualGroupKind::Content)));
    assert!(!service.is_valid_drop_target(c.arc));
    Ok(())
}
