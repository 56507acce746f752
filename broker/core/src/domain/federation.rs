// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Peer Messages and the Site Portal Client Port
//!
//! The fixed set of federation messages exchanged with site portals, and the
//! [`SitePortalClient`] trait the coordination services use to deliver them.
//! The same message shapes arrive on the broker's own HTTP API, so they double
//! as inbound request bodies.
//!
//! A client reports only success or failure: response bodies are never
//! interpreted beyond the HTTP status.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::job::{FateJobInfo, JobParticipantStatus, JobStatus};
use crate::domain::project::{ProjectData, ProjectParticipant};
use crate::domain::site::SiteEndpoint;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInvitationMessage {
    pub uuid: Uuid,
    pub site_uuid: Uuid,
    pub site_party_id: u32,
    pub project_uuid: Uuid,
    pub project_name: String,
    pub project_description: String,
    pub auto_approval_enabled: bool,
    pub manager: String,
    pub managing_site_name: String,
    pub managing_site_party_id: u32,
    pub managing_site_uuid: Uuid,
    pub creation_time: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectParticipantsMessage {
    pub project_uuid: Uuid,
    pub participants: Vec<ProjectParticipant>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantInfoUpdateMessage {
    pub uuid: Uuid,
    pub party_id: u32,
    pub name: String,
    pub description: String,
}

/// Body of participant-leave and participant-dismiss notifications.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParticipantMembershipMessage {
    pub project_uuid: Uuid,
    pub site_uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataAssociationMessage {
    pub project_uuid: Uuid,
    pub data: Vec<ProjectData>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DataDismissalMessage {
    pub project_uuid: Uuid,
    pub data_uuids: Vec<Uuid>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectClosingMessage {
    pub project_uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobApprovalMessage {
    pub job_uuid: Uuid,
    pub site_uuid: Uuid,
    pub approved: bool,
}

/// Status report from the initiating site. The raw JSON is what gets echoed
/// to participants, this is the parsed view of it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatusUpdateMessage {
    pub job_uuid: Uuid,
    pub status: JobStatus,
    #[serde(default)]
    pub status_message: String,
    #[serde(default)]
    pub fate: FateJobInfo,
    #[serde(default)]
    pub participant_status_map: std::collections::HashMap<Uuid, JobParticipantStatus>,
}

#[derive(Debug, Error)]
pub enum PortalClientError {
    #[error("failed to configure portal client: {0}")]
    Configuration(String),

    #[error("request to {endpoint} failed: {reason}")]
    Transport { endpoint: String, reason: String },

    #[error("portal at {endpoint} answered HTTP {status}: {body}")]
    Status {
        endpoint: String,
        status: u16,
        body: String,
    },

    #[error("failed to encode message: {0}")]
    Serialization(String),
}

/// Outbound port to a remote site portal. One method per peer message.
#[async_trait]
pub trait SitePortalClient: Send + Sync {
    /// Cheap reachability probe used before accepting a registration.
    async fn check_liveness(&self, endpoint: &SiteEndpoint) -> Result<(), PortalClientError>;

    async fn send_invitation(
        &self,
        endpoint: &SiteEndpoint,
        invitation: &ProjectInvitationMessage,
    ) -> Result<(), PortalClientError>;

    async fn send_invitation_acceptance(&self, endpoint: &SiteEndpoint, invitation_uuid: Uuid) -> Result<(), PortalClientError>;

    async fn send_invitation_rejection(&self, endpoint: &SiteEndpoint, invitation_uuid: Uuid) -> Result<(), PortalClientError>;

    async fn send_invitation_revocation(&self, endpoint: &SiteEndpoint, invitation_uuid: Uuid) -> Result<(), PortalClientError>;

    async fn send_participants(
        &self,
        endpoint: &SiteEndpoint,
        message: &ProjectParticipantsMessage,
    ) -> Result<(), PortalClientError>;

    async fn send_participant_info_update(
        &self,
        endpoint: &SiteEndpoint,
        message: &ParticipantInfoUpdateMessage,
    ) -> Result<(), PortalClientError>;

    async fn send_participant_leaving(
        &self,
        endpoint: &SiteEndpoint,
        message: &ParticipantMembershipMessage,
    ) -> Result<(), PortalClientError>;

    async fn send_participant_dismissal(
        &self,
        endpoint: &SiteEndpoint,
        message: &ParticipantMembershipMessage,
    ) -> Result<(), PortalClientError>;

    async fn send_data_association(
        &self,
        endpoint: &SiteEndpoint,
        message: &DataAssociationMessage,
    ) -> Result<(), PortalClientError>;

    async fn send_data_dismissal(
        &self,
        endpoint: &SiteEndpoint,
        message: &DataDismissalMessage,
    ) -> Result<(), PortalClientError>;

    async fn send_project_closing(
        &self,
        endpoint: &SiteEndpoint,
        message: &ProjectClosingMessage,
    ) -> Result<(), PortalClientError>;

    /// Forwards the initiator's creation request verbatim.
    async fn send_job_creation(&self, endpoint: &SiteEndpoint, request_json: &str) -> Result<(), PortalClientError>;

    async fn send_job_approval_response(
        &self,
        endpoint: &SiteEndpoint,
        message: &JobApprovalMessage,
    ) -> Result<(), PortalClientError>;

    async fn send_job_status_update(
        &self,
        endpoint: &SiteEndpoint,
        job_uuid: Uuid,
        status_json: &str,
    ) -> Result<(), PortalClientError>;
}
