// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

mod common;

use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use uuid::Uuid;

use common::{data_item, host, invitation_request, joined_project, site, Broker};
use fedlcm_broker_core::application::project_service::{InvitationRequest, ProjectService, StandardProjectService};
use fedlcm_broker_core::application::QueuedDispatcher;
use fedlcm_broker_core::domain::project::{
    DataStatus, InvitationStatus, ParticipantStatus, Project, ProjectCreatorInfo, ProjectError, ProjectStatus,
};
use fedlcm_broker_core::domain::repository::{ProjectRepository, RepositoryError};
use fedlcm_broker_core::domain::site::SiteInfo;
use fedlcm_broker_core::infrastructure::repositories::InMemoryProjectRepository;

#[tokio::test]
async fn test_invitation_creates_managed_project_with_owner_and_data() {
    let a = site("site-a", 10);
    let b = site("site-b", 20);
    let broker = Broker::with_sites(&[&a, &b]).await;

    let project_uuid = Uuid::new_v4();
    let d1 = Uuid::new_v4();
    let request = invitation_request(project_uuid, &a, &b, vec![data_item(d1, &a, "D1")]);
    let invitation_uuid = request.uuid;
    broker.app.process_invitation(request).await.unwrap();

    let project = broker.repos.projects.get_by_uuid(project_uuid).await.unwrap();
    assert_eq!(project.status, ProjectStatus::Managed);
    assert_eq!(project.creator.managing_site_uuid, a.uuid);
    assert_eq!(project.creator.managing_site_party_id, 10);

    let owner = broker.repos.participants.get_by_project_and_site(project_uuid, a.uuid).await.unwrap();
    assert_eq!(owner.status, ParticipantStatus::Owner);
    let invited = broker.repos.participants.get_by_project_and_site(project_uuid, b.uuid).await.unwrap();
    assert_eq!(invited.status, ParticipantStatus::Pending);
    assert_eq!(invited.site_party_id, 20);

    let invitation = broker.repos.invitations.get_by_uuid(invitation_uuid).await.unwrap();
    assert_eq!(invitation.status, InvitationStatus::Sent);

    let data = broker.repos.data.get_by_project_and_data(project_uuid, d1).await.unwrap();
    assert_eq!(data.status, DataStatus::Associated);
    assert_eq!(data.site_uuid, a.uuid);

    let sent = broker.portal.sent_to("invitation", &host("site-b"));
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].detail, invitation_uuid.to_string());
    assert_eq!(broker.dispatcher.pending(), 0);
}

#[tokio::test]
async fn test_failed_invitation_delivery_keeps_invitation_created() {
    let a = site("site-a", 10);
    let b = site("site-b", 20);
    let broker = Broker::with_sites(&[&a, &b]).await;
    broker.portal.fail_host(&host("site-b"));

    let project_uuid = Uuid::new_v4();
    let request = invitation_request(project_uuid, &a, &b, vec![]);
    let invitation_uuid = request.uuid;

    let err = broker.app.process_invitation(request).await.unwrap_err();
    assert!(format!("{:#}", err).contains("connection refused"));

    let invitation = broker.repos.invitations.get_by_uuid(invitation_uuid).await.unwrap();
    assert_eq!(invitation.status, InvitationStatus::Created);
}

#[tokio::test]
async fn test_second_invitation_reuses_existing_project() {
    let a = site("site-a", 10);
    let b = site("site-b", 20);
    let c = site("site-c", 30);
    let broker = Broker::with_sites(&[&a, &b, &c]).await;

    let project_uuid = Uuid::new_v4();
    broker
        .app
        .process_invitation(invitation_request(project_uuid, &a, &b, vec![]))
        .await
        .unwrap();
    broker
        .app
        .process_invitation(invitation_request(project_uuid, &a, &c, vec![]))
        .await
        .unwrap();

    let participants = broker.repos.participants.list_by_project(project_uuid).await.unwrap();
    let owners = participants.iter().filter(|p| p.status == ParticipantStatus::Owner).count();
    assert_eq!(owners, 1);
    assert_eq!(participants.len(), 3);
    assert_eq!(broker.repos.projects.list().await.unwrap().len(), 1);
}

/// Reports the project as absent once, as a concurrent creator would see it.
struct RacingProjectRepository {
    inner: InMemoryProjectRepository,
    raced: AtomicBool,
}

#[async_trait]
impl ProjectRepository for RacingProjectRepository {
    async fn create(&self, project: &Project) -> Result<(), RepositoryError> {
        self.inner.create(project).await
    }

    async fn get_by_uuid(&self, uuid: Uuid) -> Result<Project, RepositoryError> {
        if !self.raced.swap(true, Ordering::SeqCst) {
            return Err(RepositoryError::NotFound(format!("project {}", uuid)));
        }
        self.inner.get_by_uuid(uuid).await
    }

    async fn list(&self) -> Result<Vec<Project>, RepositoryError> {
        self.inner.list().await
    }

    async fn update_status_by_uuid(&self, uuid: Uuid, status: ProjectStatus) -> Result<(), RepositoryError> {
        self.inner.update_status_by_uuid(uuid, status).await
    }

    async fn update_managing_site_info_by_site_uuid(
        &self,
        site_uuid: Uuid,
        info: &SiteInfo,
    ) -> Result<(), RepositoryError> {
        self.inner.update_managing_site_info_by_site_uuid(site_uuid, info).await
    }
}

#[tokio::test]
async fn test_concurrent_project_creation_is_not_an_error() {
    let a = site("site-a", 10);
    let b = site("site-b", 20);
    let broker = Broker::with_sites(&[&a, &b]).await;

    let project = Project {
        uuid: Uuid::new_v4(),
        name: "P1".to_string(),
        description: String::new(),
        auto_approval_enabled: false,
        status: ProjectStatus::Managed,
        creator: ProjectCreatorInfo {
            manager: "admin".to_string(),
            managing_site_name: a.name.clone(),
            managing_site_party_id: a.party_id,
            managing_site_uuid: a.uuid,
        },
        created_at: chrono::Utc::now(),
    };
    let inner = InMemoryProjectRepository::new();
    inner.create(&project).await.unwrap();
    let projects = Arc::new(RacingProjectRepository {
        inner,
        raced: AtomicBool::new(false),
    });

    let service = StandardProjectService::new(
        projects,
        broker.repos.participants.clone(),
        broker.repos.invitations.clone(),
        broker.repos.data.clone(),
        broker.portal.clone(),
        Arc::new(QueuedDispatcher::new()),
    );

    let invitation_uuid = Uuid::new_v4();
    service
        .handle_invitation_request(InvitationRequest {
            invitation_uuid,
            project: project.clone(),
            managing_site: a.clone(),
            target_site: b.clone(),
            associated_data: vec![],
        })
        .await
        .unwrap();

    let invitation = broker.repos.invitations.get_by_uuid(invitation_uuid).await.unwrap();
    assert_eq!(invitation.status, InvitationStatus::Sent);
}

#[tokio::test]
async fn test_acceptance_requires_sent_invitation() {
    let a = site("site-a", 10);
    let b = site("site-b", 20);
    let broker = Broker::with_sites(&[&a, &b]).await;
    broker.portal.fail_host(&host("site-b"));

    let project_uuid = Uuid::new_v4();
    let request = invitation_request(project_uuid, &a, &b, vec![]);
    let invitation_uuid = request.uuid;
    assert!(broker.app.process_invitation(request).await.is_err());

    for result in [
        broker.app.process_invitation_acceptance(invitation_uuid).await,
        broker.app.process_invitation_rejection(invitation_uuid).await,
    ] {
        let err = result.unwrap_err();
        assert!(matches!(
            err.downcast_ref::<ProjectError>(),
            Some(ProjectError::InvalidInvitationTransition {
                from: InvitationStatus::Created,
                ..
            })
        ));
    }

    let invitation = broker.repos.invitations.get_by_uuid(invitation_uuid).await.unwrap();
    assert_eq!(invitation.status, InvitationStatus::Created);
    let invited = broker.repos.participants.get_by_project_and_site(project_uuid, b.uuid).await.unwrap();
    assert_eq!(invited.status, ParticipantStatus::Pending);
    assert_eq!(broker.dispatcher.pending(), 0);
}

#[tokio::test]
async fn test_acceptance_fans_out_to_manager_members_and_new_participant() {
    let a = site("site-a", 10);
    let b = site("site-b", 20);
    let c = site("site-c", 30);
    let broker = Broker::with_sites(&[&a, &b, &c]).await;

    let d1 = Uuid::new_v4();
    let project_uuid = joined_project(&broker, &a, &[&c], vec![data_item(d1, &a, "D1")]).await;

    let request = invitation_request(project_uuid, &a, &b, vec![]);
    let invitation_uuid = request.uuid;
    broker.app.process_invitation(request).await.unwrap();
    broker.app.process_invitation_acceptance(invitation_uuid).await.unwrap();

    let joined = broker.repos.participants.get_by_project_and_site(project_uuid, b.uuid).await.unwrap();
    assert_eq!(joined.status, ParticipantStatus::Joined);
    assert_eq!(
        broker.repos.invitations.get_by_uuid(invitation_uuid).await.unwrap().status,
        InvitationStatus::Accepted
    );
    assert_eq!(broker.dispatcher.pending(), 4);

    let outcomes = broker.dispatcher.run_pending().await;
    assert!(outcomes.iter().all(|o| o.is_success()));

    let acceptance = broker.portal.sent_to("invitation_acceptance", &host("site-a"));
    assert_eq!(acceptance.len(), 1);
    assert_eq!(acceptance[0].detail, invitation_uuid.to_string());

    let to_member = broker.portal.sent_to("participants", &host("site-c"));
    assert_eq!(to_member.len(), 1);
    assert_eq!(to_member[0].detail, "site-b");

    let to_joined = broker.portal.sent_to("participants", &host("site-b"));
    assert_eq!(to_joined.len(), 1);
    assert_eq!(to_joined[0].detail, "site-a,site-b,site-c");

    let data = broker.portal.sent_to("data_association", &host("site-b"));
    assert_eq!(data.len(), 1);
    assert_eq!(data[0].detail, "D1");
}

#[tokio::test]
async fn test_acceptance_succeeds_when_fan_out_fails() {
    let a = site("site-a", 10);
    let b = site("site-b", 20);
    let broker = Broker::with_sites(&[&a, &b]).await;

    let request = invitation_request(Uuid::new_v4(), &a, &b, vec![]);
    let invitation_uuid = request.uuid;
    broker.app.process_invitation(request).await.unwrap();

    broker.portal.fail_host(&host("site-a"));
    broker.app.process_invitation_acceptance(invitation_uuid).await.unwrap();

    let outcomes = broker.dispatcher.run_pending().await;
    let failed: Vec<_> = outcomes.iter().filter(|o| !o.is_success()).collect();
    assert_eq!(failed.len(), 1);
    assert!(failed[0].description.starts_with("invitation acceptance to site site-a"));
}

#[tokio::test]
async fn test_rejection_notifies_managing_site() {
    let a = site("site-a", 10);
    let b = site("site-b", 20);
    let broker = Broker::with_sites(&[&a, &b]).await;

    let project_uuid = Uuid::new_v4();
    let request = invitation_request(project_uuid, &a, &b, vec![]);
    let invitation_uuid = request.uuid;
    broker.app.process_invitation(request).await.unwrap();
    broker.app.process_invitation_rejection(invitation_uuid).await.unwrap();

    assert_eq!(
        broker.repos.invitations.get_by_uuid(invitation_uuid).await.unwrap().status,
        InvitationStatus::Rejected
    );
    let rejected = broker.repos.participants.get_by_project_and_site(project_uuid, b.uuid).await.unwrap();
    assert_eq!(rejected.status, ParticipantStatus::Rejected);

    assert!(broker.portal.sent("invitation_rejection").is_empty());
    broker.dispatcher.run_pending().await;
    assert_eq!(broker.portal.sent_to("invitation_rejection", &host("site-a")).len(), 1);
}

#[tokio::test]
async fn test_revocation_is_recorded_only_after_delivery() {
    let a = site("site-a", 10);
    let b = site("site-b", 20);
    let broker = Broker::with_sites(&[&a, &b]).await;

    let project_uuid = Uuid::new_v4();
    let request = invitation_request(project_uuid, &a, &b, vec![]);
    let invitation_uuid = request.uuid;
    broker.app.process_invitation(request).await.unwrap();

    broker.portal.fail_host(&host("site-b"));
    assert!(broker.app.process_invitation_revocation(invitation_uuid).await.is_err());
    assert_eq!(
        broker.repos.invitations.get_by_uuid(invitation_uuid).await.unwrap().status,
        InvitationStatus::Sent
    );
    let pending = broker.repos.participants.get_by_project_and_site(project_uuid, b.uuid).await.unwrap();
    assert_eq!(pending.status, ParticipantStatus::Pending);

    broker.portal.restore_host(&host("site-b"));
    broker.app.process_invitation_revocation(invitation_uuid).await.unwrap();
    assert_eq!(
        broker.repos.invitations.get_by_uuid(invitation_uuid).await.unwrap().status,
        InvitationStatus::Revoked
    );
    let revoked = broker.repos.participants.get_by_project_and_site(project_uuid, b.uuid).await.unwrap();
    assert_eq!(revoked.status, ParticipantStatus::Revoked);
    assert_eq!(broker.portal.sent_to("invitation_revocation", &host("site-b")).len(), 1);
    assert_eq!(broker.dispatcher.pending(), 0);
}

#[tokio::test]
async fn test_resolved_invitation_cannot_be_revoked_or_accepted_again() {
    let a = site("site-a", 10);
    let b = site("site-b", 20);
    let broker = Broker::with_sites(&[&a, &b]).await;

    let request = invitation_request(Uuid::new_v4(), &a, &b, vec![]);
    let invitation_uuid = request.uuid;
    broker.app.process_invitation(request).await.unwrap();
    broker.app.process_invitation_acceptance(invitation_uuid).await.unwrap();
    broker.dispatcher.run_pending().await;

    assert!(broker.app.process_invitation_acceptance(invitation_uuid).await.is_err());
    assert!(broker.app.process_invitation_revocation(invitation_uuid).await.is_err());
    assert!(broker.portal.sent("invitation_revocation").is_empty());
    assert_eq!(
        broker.repos.invitations.get_by_uuid(invitation_uuid).await.unwrap().status,
        InvitationStatus::Accepted
    );
}

#[tokio::test]
async fn test_two_site_invitation_handshake() {
    let a = site("site-a", 10);
    let b = site("site-b", 20);
    let broker_a = Broker::with_sites(&[&a, &b]).await;
    let broker_b = Broker::with_sites(&[&a, &b]).await;

    let project_uuid = Uuid::new_v4();
    let d1 = Uuid::new_v4();
    let request = invitation_request(project_uuid, &a, &b, vec![data_item(d1, &a, "D1")]);
    let invitation_uuid = request.uuid;

    // Site A invites B.
    broker_a.app.process_invitation(request.clone()).await.unwrap();
    assert_eq!(
        broker_a.repos.invitations.get_by_uuid(invitation_uuid).await.unwrap().status,
        InvitationStatus::Sent
    );
    assert_eq!(
        broker_a.repos.data.get_by_project_and_data(project_uuid, d1).await.unwrap().status,
        DataStatus::Associated
    );

    // Site B mirrors the invitation and accepts it.
    broker_b.app.process_invitation(request).await.unwrap();
    broker_b.app.process_invitation_acceptance(invitation_uuid).await.unwrap();
    let local_b = broker_b.repos.participants.get_by_project_and_site(project_uuid, b.uuid).await.unwrap();
    assert_eq!(local_b.status, ParticipantStatus::Joined);

    broker_b.dispatcher.run_pending().await;
    let acceptance = broker_b.portal.sent_to("invitation_acceptance", &host("site-a"));
    assert_eq!(acceptance.len(), 1);

    // Site A applies the acceptance it received.
    let received: Uuid = acceptance[0].detail.parse().unwrap();
    broker_a.app.process_invitation_acceptance(received).await.unwrap();
    let mirror_b = broker_a.repos.participants.get_by_project_and_site(project_uuid, b.uuid).await.unwrap();
    assert_eq!(mirror_b.status, ParticipantStatus::Joined);
    let owner = broker_a.repos.participants.get_by_project_and_site(project_uuid, a.uuid).await.unwrap();
    assert_eq!(owner.status, ParticipantStatus::Owner);
}

#[tokio::test]
async fn test_managing_site_cannot_invite_itself() {
    let a = site("site-a", 10);
    let b = site("site-b", 20);
    let broker = Broker::with_sites(&[&a, &b]).await;
    let project_uuid = joined_project(&broker, &a, &[&b], vec![]).await;

    let err = broker
        .app
        .process_invitation(invitation_request(project_uuid, &a, &a, vec![]))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ProjectError>(),
        Some(ProjectError::OwnerMembership { site_uuid, .. }) if *site_uuid == a.uuid
    ));

    let owner = broker.repos.participants.get_by_project_and_site(project_uuid, a.uuid).await.unwrap();
    assert_eq!(owner.status, ParticipantStatus::Owner);
    assert!(broker.portal.sent("invitation").is_empty());
}

#[tokio::test]
async fn test_open_invitation_blocks_a_second_one() {
    let a = site("site-a", 10);
    let b = site("site-b", 20);
    let broker = Broker::with_sites(&[&a, &b]).await;

    let project_uuid = Uuid::new_v4();
    let first = invitation_request(project_uuid, &a, &b, vec![]);
    let first_uuid = first.uuid;
    broker.app.process_invitation(first).await.unwrap();

    let second = invitation_request(project_uuid, &a, &b, vec![]);
    let second_uuid = second.uuid;
    let err = broker.app.process_invitation(second).await.unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ProjectError>(),
        Some(ProjectError::InvitationOutstanding { invitation_uuid, .. }) if *invitation_uuid == first_uuid
    ));
    assert!(broker.repos.invitations.get_by_uuid(second_uuid).await.is_err());
    assert_eq!(broker.portal.sent("invitation").len(), 1);

    // Once answered, the site can be invited again.
    broker.app.process_invitation_rejection(first_uuid).await.unwrap();
    let third = invitation_request(project_uuid, &a, &b, vec![]);
    let third_uuid = third.uuid;
    broker.app.process_invitation(third).await.unwrap();
    assert_eq!(
        broker.repos.invitations.get_by_uuid(third_uuid).await.unwrap().status,
        InvitationStatus::Sent
    );
    let invited = broker.repos.participants.get_by_project_and_site(project_uuid, b.uuid).await.unwrap();
    assert_eq!(invited.status, ParticipantStatus::Pending);
}

#[tokio::test]
async fn test_undelivered_invitation_can_be_reissued() {
    let a = site("site-a", 10);
    let b = site("site-b", 20);
    let broker = Broker::with_sites(&[&a, &b]).await;
    broker.portal.fail_host(&host("site-b"));

    let project_uuid = Uuid::new_v4();
    assert!(broker
        .app
        .process_invitation(invitation_request(project_uuid, &a, &b, vec![]))
        .await
        .is_err());

    broker.portal.restore_host(&host("site-b"));
    let retry = invitation_request(project_uuid, &a, &b, vec![]);
    let retry_uuid = retry.uuid;
    broker.app.process_invitation(retry).await.unwrap();
    assert_eq!(
        broker.repos.invitations.get_by_uuid(retry_uuid).await.unwrap().status,
        InvitationStatus::Sent
    );
}

#[tokio::test]
async fn test_joined_site_cannot_be_invited_again() {
    let a = site("site-a", 10);
    let b = site("site-b", 20);
    let broker = Broker::with_sites(&[&a, &b]).await;
    let project_uuid = joined_project(&broker, &a, &[&b], vec![]).await;

    let err = broker
        .app
        .process_invitation(invitation_request(project_uuid, &a, &b, vec![]))
        .await
        .unwrap_err();
    assert!(matches!(
        err.downcast_ref::<ProjectError>(),
        Some(ProjectError::AlreadyJoined { site_uuid, .. }) if *site_uuid == b.uuid
    ));

    let member = broker.repos.participants.get_by_project_and_site(project_uuid, b.uuid).await.unwrap();
    assert_eq!(member.status, ParticipantStatus::Joined);
    assert!(broker.portal.sent("invitation").is_empty());
}
