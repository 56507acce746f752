// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use uuid::Uuid;

use common::{data_item, host, joined_project, site, Broker};
use fedlcm_broker_core::application::ProjectService;
use fedlcm_broker_core::domain::project::{DataStatus, ParticipantStatus, ProjectError, ProjectStatus};
use fedlcm_broker_core::domain::site::Site;

async fn three_site_broker() -> (Broker, Site, Site, Site) {
    let a = site("site-a", 10);
    let b = site("site-b", 20);
    let c = site("site-c", 30);
    let broker = Broker::with_sites(&[&a, &b, &c]).await;
    (broker, a, b, c)
}

#[tokio::test]
async fn test_closed_project_overrides_participant_status() {
    let (broker, a, b, c) = three_site_broker().await;
    let project_uuid = joined_project(&broker, &a, &[&b, &c], vec![]).await;
    broker.app.process_participant_leaving(project_uuid, c.uuid).await.unwrap();

    let for_b = broker.app.list_projects_by_participant(b.uuid).await.unwrap();
    assert_eq!(for_b.len(), 1);
    assert_eq!(for_b[0].status, ProjectStatus::Joined);
    let for_c = broker.app.list_projects_by_participant(c.uuid).await.unwrap();
    assert_eq!(for_c[0].status, ProjectStatus::Left);
    let for_a = broker.app.list_projects_by_participant(a.uuid).await.unwrap();
    assert_eq!(for_a[0].status, ProjectStatus::Managed);

    broker.app.process_project_closing(project_uuid).await.unwrap();

    for member in [&a, &b, &c] {
        let projects = broker.app.list_projects_by_participant(member.uuid).await.unwrap();
        assert_eq!(projects[0].status, ProjectStatus::Closed, "seen by {}", member.name);
    }
}

#[tokio::test]
async fn test_participant_info_update_rewrites_denormalized_copies() {
    let (broker, a, b, c) = three_site_broker().await;
    let d1 = Uuid::new_v4();
    let project_uuid = joined_project(&broker, &a, &[&b], vec![data_item(d1, &a, "D1")]).await;

    let mut renamed = a.clone();
    renamed.name = "site-a-renamed".to_string();
    renamed.party_id = 11;
    renamed.description = "moved".to_string();

    broker
        .project_service
        .handle_participant_info_update(renamed.clone(), vec![renamed.clone(), b.clone(), c.clone()])
        .await
        .unwrap();

    let project = broker.repos.projects.get_by_uuid(project_uuid).await.unwrap();
    assert_eq!(project.creator.managing_site_name, "site-a-renamed");
    assert_eq!(project.creator.managing_site_party_id, 11);

    let owner = broker.repos.participants.get_by_project_and_site(project_uuid, a.uuid).await.unwrap();
    assert_eq!(owner.site_name, "site-a-renamed");
    assert_eq!(owner.site_description, "moved");

    let data = broker.repos.data.get_by_project_and_data(project_uuid, d1).await.unwrap();
    assert_eq!(data.site_name, "site-a-renamed");
    assert_eq!(data.site_party_id, 11);

    broker.dispatcher.run_pending().await;
    let updates = broker.portal.sent("participant_info_update");
    let mut hosts: Vec<&str> = updates.iter().map(|d| d.host.as_str()).collect();
    hosts.sort();
    assert_eq!(hosts, vec![host("site-b"), host("site-c")]);
    assert!(updates.iter().all(|d| d.detail == "site-a-renamed"));
}

#[tokio::test]
async fn test_leaving_notifies_remaining_members() {
    let (broker, a, b, c) = three_site_broker().await;
    let project_uuid = joined_project(&broker, &a, &[&b, &c], vec![]).await;

    broker.app.process_participant_leaving(project_uuid, b.uuid).await.unwrap();

    let left = broker.repos.participants.get_by_project_and_site(project_uuid, b.uuid).await.unwrap();
    assert_eq!(left.status, ParticipantStatus::Left);

    broker.dispatcher.run_pending().await;
    let sent = broker.portal.sent("participant_leaving");
    let mut hosts: Vec<&str> = sent.iter().map(|d| d.host.as_str()).collect();
    hosts.sort();
    assert_eq!(hosts, vec![host("site-a"), host("site-c")]);
    assert!(sent.iter().all(|d| d.detail == b.uuid.to_string()));
}

#[tokio::test]
async fn test_dismissal_dismisses_target_data_and_notifies_others() {
    let (broker, a, b, c) = three_site_broker().await;
    let project_uuid = joined_project(&broker, &a, &[&b, &c], vec![]).await;

    let d2 = Uuid::new_v4();
    broker
        .app
        .process_data_association(project_uuid, data_item(d2, &b, "D2"))
        .await
        .unwrap();
    broker.dispatcher.run_pending().await;
    broker.portal.clear();

    broker.app.process_participant_dismissal(project_uuid, b.uuid).await.unwrap();

    assert_eq!(broker.portal.sent_to("participant_dismissal", &host("site-b")).len(), 1);
    let dismissed = broker.repos.participants.get_by_project_and_site(project_uuid, b.uuid).await.unwrap();
    assert_eq!(dismissed.status, ParticipantStatus::Dismissed);
    let data = broker.repos.data.get_by_project_and_data(project_uuid, d2).await.unwrap();
    assert_eq!(data.status, DataStatus::Dismissed);

    broker.dispatcher.run_pending().await;
    let sent = broker.portal.sent("participant_dismissal");
    let hosts: Vec<&str> = sent.iter().map(|d| d.host.as_str()).collect();
    assert_eq!(hosts, vec![host("site-b"), host("site-c")]);
}

#[tokio::test]
async fn test_dismissal_of_unreachable_site_changes_nothing() {
    let (broker, a, b, _c) = three_site_broker().await;
    let project_uuid = joined_project(&broker, &a, &[&b], vec![]).await;
    let d2 = Uuid::new_v4();
    broker
        .app
        .process_data_association(project_uuid, data_item(d2, &b, "D2"))
        .await
        .unwrap();
    broker.dispatcher.run_pending().await;

    broker.portal.fail_host(&host("site-b"));
    assert!(broker.app.process_participant_dismissal(project_uuid, b.uuid).await.is_err());

    let participant = broker.repos.participants.get_by_project_and_site(project_uuid, b.uuid).await.unwrap();
    assert_eq!(participant.status, ParticipantStatus::Joined);
    let data = broker.repos.data.get_by_project_and_data(project_uuid, d2).await.unwrap();
    assert_eq!(data.status, DataStatus::Associated);
    assert_eq!(broker.dispatcher.pending(), 0);
}

#[tokio::test]
async fn test_reassociation_updates_existing_row() {
    let (broker, a, b, _c) = three_site_broker().await;
    let project_uuid = joined_project(&broker, &a, &[&b], vec![]).await;
    let d2 = Uuid::new_v4();

    let first = broker
        .app
        .process_data_association(project_uuid, data_item(d2, &b, "D2"))
        .await
        .unwrap();
    broker.app.process_data_dismissal(project_uuid, d2).await.unwrap();
    assert_eq!(
        broker.repos.data.get_by_project_and_data(project_uuid, d2).await.unwrap().status,
        DataStatus::Dismissed
    );

    let mut renamed = data_item(d2, &b, "D2v2");
    renamed.description = "second version".to_string();
    let second = broker.app.process_data_association(project_uuid, renamed).await.unwrap();

    assert_eq!(second.uuid, first.uuid);
    assert_eq!(second.status, DataStatus::Associated);
    let rows = broker.app.list_project_data(project_uuid).await.unwrap();
    assert_eq!(rows.len(), 1);
    assert_eq!(rows[0].name, "D2v2");
    assert_eq!(rows[0].description, "second version");
    assert_eq!(rows[0].status, DataStatus::Associated);
}

#[tokio::test]
async fn test_data_fan_out_skips_providing_site() {
    let (broker, a, b, c) = three_site_broker().await;
    let project_uuid = joined_project(&broker, &a, &[&b, &c], vec![]).await;
    let d2 = Uuid::new_v4();

    broker
        .app
        .process_data_association(project_uuid, data_item(d2, &b, "D2"))
        .await
        .unwrap();
    broker.dispatcher.run_pending().await;
    let mut hosts: Vec<String> = broker
        .portal
        .sent("data_association")
        .into_iter()
        .map(|d| d.host)
        .collect();
    hosts.sort();
    assert_eq!(hosts, vec![host("site-a"), host("site-c")]);

    broker.portal.clear();
    broker.app.process_data_dismissal(project_uuid, d2).await.unwrap();
    broker.dispatcher.run_pending().await;
    let sent = broker.portal.sent("data_dismissal");
    let mut hosts: Vec<&str> = sent.iter().map(|d| d.host.as_str()).collect();
    hosts.sort();
    assert_eq!(hosts, vec![host("site-a"), host("site-c")]);
    assert!(sent.iter().all(|d| d.detail == d2.to_string()));

    // Dismissing twice succeeds and leaves the row dismissed.
    broker.app.process_data_dismissal(project_uuid, d2).await.unwrap();
    assert_eq!(
        broker.repos.data.get_by_project_and_data(project_uuid, d2).await.unwrap().status,
        DataStatus::Dismissed
    );
}

#[tokio::test]
async fn test_closing_notifies_members_except_manager() {
    let (broker, a, b, c) = three_site_broker().await;
    let project_uuid = joined_project(&broker, &a, &[&b, &c], vec![]).await;
    broker.app.process_participant_leaving(project_uuid, c.uuid).await.unwrap();
    broker.dispatcher.run_pending().await;
    broker.portal.clear();

    broker.app.process_project_closing(project_uuid).await.unwrap();
    assert_eq!(
        broker.repos.projects.get_by_uuid(project_uuid).await.unwrap().status,
        ProjectStatus::Closed
    );

    broker.dispatcher.run_pending().await;
    let sent = broker.portal.sent("project_closing");
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].host, host("site-b"));
}

#[tokio::test]
async fn test_closed_project_rejects_data_and_invitations() {
    let (broker, a, b, c) = three_site_broker().await;
    let project_uuid = joined_project(&broker, &a, &[&b], vec![]).await;
    broker.app.process_project_closing(project_uuid).await.unwrap();

    let err = broker
        .app
        .process_data_association(project_uuid, data_item(Uuid::new_v4(), &b, "D3"))
        .await
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<ProjectError>(), Some(ProjectError::Closed(uuid)) if *uuid == project_uuid));

    let err = broker
        .app
        .process_invitation(common::invitation_request(project_uuid, &a, &c, vec![]))
        .await
        .unwrap_err();
    assert!(matches!(err.downcast_ref::<ProjectError>(), Some(ProjectError::Closed(_))));
    assert!(broker.portal.sent("invitation").is_empty());
}

#[tokio::test]
async fn test_managing_site_membership_cannot_change() {
    let (broker, a, b, _c) = three_site_broker().await;
    let project_uuid = joined_project(&broker, &a, &[&b], vec![]).await;

    let err = broker.app.process_participant_leaving(project_uuid, a.uuid).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ProjectError>(),
        Some(ProjectError::OwnerMembership { site_uuid, .. }) if *site_uuid == a.uuid
    ));
    let err = broker.app.process_participant_dismissal(project_uuid, a.uuid).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ProjectError>(),
        Some(ProjectError::OwnerMembership { .. })
    ));

    let owner = broker.repos.participants.get_by_project_and_site(project_uuid, a.uuid).await.unwrap();
    assert_eq!(owner.status, ParticipantStatus::Owner);
    assert!(broker.portal.deliveries().is_empty());
    assert_eq!(broker.dispatcher.pending(), 0);
}
