// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Shared fixtures: a recording portal client and an in-memory broker.

#![allow(dead_code)]

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::Arc;
use uuid::Uuid;

use fedlcm_broker_core::application::federation_app::{DataAssociationItem, FederationApp, ProjectInvitationRequest};
use fedlcm_broker_core::application::{
    QueuedDispatcher, Repositories, StandardJobService, StandardProjectService, StandardSiteService,
};
use fedlcm_broker_core::domain::federation::{
    DataAssociationMessage, DataDismissalMessage, JobApprovalMessage, ParticipantInfoUpdateMessage,
    ParticipantMembershipMessage, PortalClientError, ProjectClosingMessage, ProjectInvitationMessage,
    ProjectParticipantsMessage, SitePortalClient,
};
use fedlcm_broker_core::domain::site::{Site, SiteEndpoint};
use fedlcm_broker_core::infrastructure::event_bus::EventBus;

/// One message the broker tried to deliver.
#[derive(Debug, Clone, PartialEq)]
pub struct Delivery {
    pub message: &'static str,
    pub host: String,
    /// Message-specific detail: a UUID, a count, or the raw body.
    pub detail: String,
}

/// Portal client that records every send and fails for selected hosts.
#[derive(Default)]
pub struct RecordingPortal {
    deliveries: Mutex<Vec<Delivery>>,
    unreachable: Mutex<HashSet<String>>,
}

impl RecordingPortal {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn fail_host(&self, host: &str) {
        self.unreachable.lock().insert(host.to_string());
    }

    pub fn restore_host(&self, host: &str) {
        self.unreachable.lock().remove(host);
    }

    pub fn deliveries(&self) -> Vec<Delivery> {
        self.deliveries.lock().clone()
    }

    pub fn sent(&self, message: &str) -> Vec<Delivery> {
        self.deliveries().into_iter().filter(|d| d.message == message).collect()
    }

    pub fn sent_to(&self, message: &str, host: &str) -> Vec<Delivery> {
        self.sent(message).into_iter().filter(|d| d.host == host).collect()
    }

    pub fn clear(&self) {
        self.deliveries.lock().clear();
    }

    fn record(&self, endpoint: &SiteEndpoint, message: &'static str, detail: String) -> Result<(), PortalClientError> {
        if self.unreachable.lock().contains(&endpoint.host) {
            return Err(PortalClientError::Transport {
                endpoint: endpoint.to_string(),
                reason: "connection refused".to_string(),
            });
        }
        self.deliveries.lock().push(Delivery {
            message,
            host: endpoint.host.clone(),
            detail,
        });
        Ok(())
    }
}

#[async_trait]
impl SitePortalClient for RecordingPortal {
    async fn check_liveness(&self, endpoint: &SiteEndpoint) -> Result<(), PortalClientError> {
        self.record(endpoint, "liveness", String::new())
    }

    async fn send_invitation(
        &self,
        endpoint: &SiteEndpoint,
        invitation: &ProjectInvitationMessage,
    ) -> Result<(), PortalClientError> {
        self.record(endpoint, "invitation", invitation.uuid.to_string())
    }

    async fn send_invitation_acceptance(&self, endpoint: &SiteEndpoint, invitation_uuid: Uuid) -> Result<(), PortalClientError> {
        self.record(endpoint, "invitation_acceptance", invitation_uuid.to_string())
    }

    async fn send_invitation_rejection(&self, endpoint: &SiteEndpoint, invitation_uuid: Uuid) -> Result<(), PortalClientError> {
        self.record(endpoint, "invitation_rejection", invitation_uuid.to_string())
    }

    async fn send_invitation_revocation(&self, endpoint: &SiteEndpoint, invitation_uuid: Uuid) -> Result<(), PortalClientError> {
        self.record(endpoint, "invitation_revocation", invitation_uuid.to_string())
    }

    async fn send_participants(
        &self,
        endpoint: &SiteEndpoint,
        message: &ProjectParticipantsMessage,
    ) -> Result<(), PortalClientError> {
        let names: Vec<&str> = message.participants.iter().map(|p| p.site_name.as_str()).collect();
        self.record(endpoint, "participants", names.join(","))
    }

    async fn send_participant_info_update(
        &self,
        endpoint: &SiteEndpoint,
        message: &ParticipantInfoUpdateMessage,
    ) -> Result<(), PortalClientError> {
        self.record(endpoint, "participant_info_update", message.name.clone())
    }

    async fn send_participant_leaving(
        &self,
        endpoint: &SiteEndpoint,
        message: &ParticipantMembershipMessage,
    ) -> Result<(), PortalClientError> {
        self.record(endpoint, "participant_leaving", message.site_uuid.to_string())
    }

    async fn send_participant_dismissal(
        &self,
        endpoint: &SiteEndpoint,
        message: &ParticipantMembershipMessage,
    ) -> Result<(), PortalClientError> {
        self.record(endpoint, "participant_dismissal", message.site_uuid.to_string())
    }

    async fn send_data_association(
        &self,
        endpoint: &SiteEndpoint,
        message: &DataAssociationMessage,
    ) -> Result<(), PortalClientError> {
        let names: Vec<&str> = message.data.iter().map(|d| d.name.as_str()).collect();
        self.record(endpoint, "data_association", names.join(","))
    }

    async fn send_data_dismissal(
        &self,
        endpoint: &SiteEndpoint,
        message: &DataDismissalMessage,
    ) -> Result<(), PortalClientError> {
        let uuids: Vec<String> = message.data_uuids.iter().map(|u| u.to_string()).collect();
        self.record(endpoint, "data_dismissal", uuids.join(","))
    }

    async fn send_project_closing(
        &self,
        endpoint: &SiteEndpoint,
        message: &ProjectClosingMessage,
    ) -> Result<(), PortalClientError> {
        self.record(endpoint, "project_closing", message.project_uuid.to_string())
    }

    async fn send_job_creation(&self, endpoint: &SiteEndpoint, request_json: &str) -> Result<(), PortalClientError> {
        self.record(endpoint, "job_creation", request_json.to_string())
    }

    async fn send_job_approval_response(
        &self,
        endpoint: &SiteEndpoint,
        message: &JobApprovalMessage,
    ) -> Result<(), PortalClientError> {
        self.record(endpoint, "job_approval_response", message.approved.to_string())
    }

    async fn send_job_status_update(
        &self,
        endpoint: &SiteEndpoint,
        _job_uuid: Uuid,
        status_json: &str,
    ) -> Result<(), PortalClientError> {
        self.record(endpoint, "job_status_update", status_json.to_string())
    }
}

/// A site whose portal host is `<name>.test`.
pub fn site(name: &str, party_id: u32) -> Site {
    Site {
        uuid: Uuid::new_v4(),
        name: name.to_string(),
        description: format!("{} portal", name),
        party_id,
        external_host: host(name),
        external_port: 8443,
        https: true,
        server_name: format!("{}.fedlcm.io", name),
        last_registered_at: Utc::now(),
    }
}

pub fn host(name: &str) -> String {
    format!("{}.test", name)
}

/// One site's broker wired over in-memory repositories.
pub struct Broker {
    pub repos: Repositories,
    pub portal: Arc<RecordingPortal>,
    pub dispatcher: QueuedDispatcher,
    pub event_bus: EventBus,
    pub site_service: Arc<StandardSiteService>,
    pub project_service: Arc<StandardProjectService>,
    pub job_service: Arc<StandardJobService>,
    pub app: Arc<FederationApp>,
}

impl Broker {
    pub fn new() -> Self {
        let repos = Repositories::in_memory();
        let portal = RecordingPortal::new();
        let dispatcher = QueuedDispatcher::new();
        let event_bus = EventBus::with_default_capacity();

        let site_service = Arc::new(StandardSiteService::new(
            repos.sites.clone(),
            portal.clone(),
            event_bus.clone(),
        ));
        let project_service = Arc::new(StandardProjectService::new(
            repos.projects.clone(),
            repos.participants.clone(),
            repos.invitations.clone(),
            repos.data.clone(),
            portal.clone(),
            Arc::new(dispatcher.clone()),
        ));
        let job_service = Arc::new(StandardJobService::new(
            repos.jobs.clone(),
            repos.job_participants.clone(),
            portal.clone(),
            Arc::new(dispatcher.clone()),
        ));
        let app = Arc::new(FederationApp::new(
            repos.clone(),
            site_service.clone(),
            project_service.clone(),
            job_service.clone(),
        ));

        Self {
            repos,
            portal,
            dispatcher,
            event_bus,
            site_service,
            project_service,
            job_service,
            app,
        }
    }

    /// Stores sites directly, bypassing the liveness probe.
    pub async fn with_sites(sites: &[&Site]) -> Self {
        let broker = Self::new();
        for site in sites {
            broker.repos.sites.create(site).await.unwrap();
        }
        broker
    }
}

pub fn data_item(data_uuid: Uuid, provider: &Site, name: &str) -> DataAssociationItem {
    DataAssociationItem {
        data_uuid,
        site_uuid: provider.uuid,
        name: name.to_string(),
        description: String::new(),
        table_name: format!("{}_table", name.to_lowercase()),
        table_namespace: "fedlcm".to_string(),
    }
}

pub fn invitation_request(
    project_uuid: Uuid,
    managing: &Site,
    target: &Site,
    associated_data: Vec<DataAssociationItem>,
) -> ProjectInvitationRequest {
    ProjectInvitationRequest {
        uuid: Uuid::new_v4(),
        project_uuid,
        project_name: "P1".to_string(),
        project_description: "joint model".to_string(),
        project_auto_approval_enabled: false,
        project_manager: "admin".to_string(),
        project_creation_time: None,
        managing_site_uuid: managing.uuid,
        site_uuid: target.uuid,
        associated_data,
    }
}

/// Creates a project managed by `managing` with every site in `members`
/// joined, drains the queued notifications and forgets the deliveries.
pub async fn joined_project(
    broker: &Broker,
    managing: &Site,
    members: &[&Site],
    associated_data: Vec<DataAssociationItem>,
) -> Uuid {
    let project_uuid = Uuid::new_v4();
    let mut data = Some(associated_data);
    for member in members {
        let request = invitation_request(project_uuid, managing, member, data.take().unwrap_or_default());
        let invitation_uuid = request.uuid;
        broker.app.process_invitation(request).await.unwrap();
        broker.app.process_invitation_acceptance(invitation_uuid).await.unwrap();
        broker.dispatcher.run_pending().await;
    }
    broker.portal.clear();
    project_uuid
}
