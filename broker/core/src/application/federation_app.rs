// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Federation Application Façade
//!
//! Entry point for everything the HTTP layer receives, whether from a peer
//! site's portal or from the local UI. The façade is stateless: it resolves
//! site UUIDs to registry records, computes who has to hear about a change,
//! builds the domain request and hands it to the owning service.
//!
//! Peer sets:
//!
//! | Operation | Notified sites |
//! |-----------|----------------|
//! | invitation acceptance | managing site; active members except the joined and managing sites |
//! | participant leaving | active members except the leaving site |
//! | participant dismissal | target (inline); active members except target and managing site |
//! | data association / dismissal | active members except the providing site |
//! | project closing | active members except the managing site |
//! | job approval response | initiator (inline); participants except initiator and responder |
//!
//! Active members are sites whose participant row is `Owner` or `Joined`.

use anyhow::{Context, Result};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use crate::application::job_service::{JobParticipantTarget, JobService, JobStatusUpdate};
use crate::application::project_service::{active_member_uuids, new_project_data, InvitationRequest, ProjectService};
use crate::application::repository_factory::Repositories;
use crate::application::site_service::SiteService;
use crate::domain::federation::{JobApprovalMessage, JobStatusUpdateMessage};
use crate::domain::job::{FateJobInfo, Job, JobAlgorithmType, JobParticipant, JobParticipantStatus, JobStatus, JobType};
use crate::domain::project::{Project, ProjectCreatorInfo, ProjectData, ProjectParticipant, ProjectStatus};
use crate::domain::site::Site;

/// Inbound payload that could not be turned into a domain request.
#[derive(Debug, Error)]
pub enum RequestError {
    #[error("malformed request: {0}")]
    Malformed(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteRegistrationRequest {
    pub uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub party_id: u32,
    pub external_host: String,
    pub external_port: u16,
    #[serde(default)]
    pub https: bool,
    #[serde(default)]
    pub server_name: String,
}

impl From<SiteRegistrationRequest> for Site {
    fn from(req: SiteRegistrationRequest) -> Self {
        Site {
            uuid: req.uuid,
            name: req.name,
            description: req.description,
            party_id: req.party_id,
            external_host: req.external_host,
            external_port: req.external_port,
            https: req.https,
            server_name: req.server_name,
            last_registered_at: Utc::now(),
        }
    }
}

/// A dataset offered into a project by `site_uuid`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataAssociationItem {
    pub data_uuid: Uuid,
    pub site_uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    pub table_name: String,
    pub table_namespace: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectInvitationRequest {
    /// Invitation UUID, chosen by the managing site.
    pub uuid: Uuid,
    pub project_uuid: Uuid,
    pub project_name: String,
    #[serde(default)]
    pub project_description: String,
    #[serde(default)]
    pub project_auto_approval_enabled: bool,
    pub project_manager: String,
    pub project_creation_time: Option<chrono::DateTime<Utc>>,
    pub managing_site_uuid: Uuid,
    pub site_uuid: Uuid,
    #[serde(default)]
    pub associated_data: Vec<DataAssociationItem>,
}

/// One site's dataset in a job.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDataRequest {
    pub data_uuid: Uuid,
    #[serde(default)]
    pub label_name: String,
}

/// Creation request as sent by the initiating site. Kept raw for forwarding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobCreationRequest {
    pub uuid: Uuid,
    pub project_uuid: Uuid,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(rename = "type")]
    pub job_type: JobType,
    pub algorithm_type: JobAlgorithmType,
    #[serde(default)]
    pub algorithm_config: String,
    #[serde(default)]
    pub model_name: String,
    pub predicting_model_uuid: Option<Uuid>,
    #[serde(default)]
    pub initiating_user: String,
    #[serde(default)]
    pub conf: String,
    #[serde(default)]
    pub dsl: String,
    pub initiator_data: JobDataRequest,
    #[serde(default)]
    pub other_site_data: Vec<JobDataRequest>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobDetail {
    pub job: Job,
    pub participants: Vec<JobParticipant>,
}

pub struct FederationApp {
    repositories: Repositories,
    site_service: Arc<dyn SiteService>,
    project_service: Arc<dyn ProjectService>,
    job_service: Arc<dyn JobService>,
}

impl FederationApp {
    pub fn new(
        repositories: Repositories,
        site_service: Arc<dyn SiteService>,
        project_service: Arc<dyn ProjectService>,
        job_service: Arc<dyn JobService>,
    ) -> Self {
        Self {
            repositories,
            site_service,
            project_service,
            job_service,
        }
    }

    async fn site(&self, uuid: Uuid) -> Result<Site> {
        self.repositories
            .sites
            .get_by_uuid(uuid)
            .await
            .with_context(|| format!("failed to resolve site {}", uuid))
    }

    /// Resolves `uuids`, skipping sites no longer in the registry.
    async fn sites(&self, uuids: Vec<Uuid>) -> Result<Vec<Site>> {
        let mut sites = Vec::new();
        for uuid in uuids {
            match self.repositories.sites.get_by_uuid(uuid).await {
                Ok(site) => sites.push(site),
                Err(e) if e.is_not_found() => warn!("Site {} is not registered, skipping it", uuid),
                Err(e) => return Err(e).context("failed to resolve site"),
            }
        }
        Ok(sites)
    }

    async fn active_member_sites(&self, project_uuid: Uuid, exclude: &[Uuid]) -> Result<Vec<Site>> {
        let participants = self
            .repositories
            .participants
            .list_by_project(project_uuid)
            .await
            .with_context(|| format!("failed to list participants of project {}", project_uuid))?;
        let members = active_member_uuids(&participants)
            .into_iter()
            .filter(|uuid| !exclude.contains(uuid))
            .collect();
        self.sites(members).await
    }

    async fn project(&self, uuid: Uuid) -> Result<Project> {
        self.repositories
            .projects
            .get_by_uuid(uuid)
            .await
            .with_context(|| format!("failed to load project {}", uuid))
    }

    // ------------------------------------------------------------------
    // Sites
    // ------------------------------------------------------------------

    pub async fn register_site(&self, request: SiteRegistrationRequest) -> Result<Site> {
        self.site_service.register(request.into()).await
    }

    pub async fn list_sites(&self) -> Result<Vec<Site>> {
        self.site_service.list().await
    }

    pub async fn get_site(&self, uuid: Uuid) -> Result<Site> {
        self.site_service.get(uuid).await
    }

    pub async fn unregister_site(&self, uuid: Uuid) -> Result<()> {
        self.site_service.unregister(uuid).await
    }

    // ------------------------------------------------------------------
    // Projects
    // ------------------------------------------------------------------

    pub async fn process_invitation(&self, request: ProjectInvitationRequest) -> Result<()> {
        let managing_site = self.site(request.managing_site_uuid).await?;
        let target_site = self.site(request.site_uuid).await?;

        let mut associated_data = Vec::with_capacity(request.associated_data.len());
        for item in request.associated_data {
            let provider = if item.site_uuid == managing_site.uuid {
                managing_site.clone()
            } else {
                self.site(item.site_uuid).await?
            };
            associated_data.push(new_project_data(
                request.project_uuid,
                item.data_uuid,
                &provider,
                item.name,
                item.description,
                item.table_name,
                item.table_namespace,
            ));
        }

        let project = Project {
            uuid: request.project_uuid,
            name: request.project_name,
            description: request.project_description,
            auto_approval_enabled: request.project_auto_approval_enabled,
            status: ProjectStatus::Managed,
            creator: ProjectCreatorInfo {
                manager: request.project_manager,
                managing_site_name: managing_site.name.clone(),
                managing_site_party_id: managing_site.party_id,
                managing_site_uuid: managing_site.uuid,
            },
            created_at: request.project_creation_time.unwrap_or_else(Utc::now),
        };

        self.project_service
            .handle_invitation_request(InvitationRequest {
                invitation_uuid: request.uuid,
                project,
                managing_site,
                target_site,
                associated_data,
            })
            .await
    }

    pub async fn process_invitation_acceptance(&self, invitation_uuid: Uuid) -> Result<()> {
        let invitation = self
            .repositories
            .invitations
            .get_by_uuid(invitation_uuid)
            .await
            .with_context(|| format!("failed to load invitation {}", invitation_uuid))?;
        let project = self.project(invitation.project_uuid).await?;
        let managing_uuid = project.creator.managing_site_uuid;

        let managing_site = self.site(managing_uuid).await?;
        let joined_site = self.site(invitation.site_uuid).await?;
        let other_sites = self
            .active_member_sites(project.uuid, &[invitation.site_uuid, managing_uuid])
            .await?;

        self.project_service
            .handle_invitation_acceptance(invitation_uuid, managing_site, joined_site, other_sites)
            .await
    }

    pub async fn process_invitation_rejection(&self, invitation_uuid: Uuid) -> Result<()> {
        let invitation = self
            .repositories
            .invitations
            .get_by_uuid(invitation_uuid)
            .await
            .with_context(|| format!("failed to load invitation {}", invitation_uuid))?;
        let project = self.project(invitation.project_uuid).await?;
        let managing_site = self.site(project.creator.managing_site_uuid).await?;

        self.project_service
            .handle_invitation_rejection(invitation_uuid, managing_site)
            .await
    }

    pub async fn process_invitation_revocation(&self, invitation_uuid: Uuid) -> Result<()> {
        let invitation = self
            .repositories
            .invitations
            .get_by_uuid(invitation_uuid)
            .await
            .with_context(|| format!("failed to load invitation {}", invitation_uuid))?;
        let target_site = self.site(invitation.site_uuid).await?;

        self.project_service
            .handle_invitation_revocation(invitation_uuid, target_site)
            .await
    }

    pub async fn list_projects(&self) -> Result<Vec<Project>> {
        self.repositories.projects.list().await.context("failed to list projects")
    }

    pub async fn list_projects_by_participant(&self, site_uuid: Uuid) -> Result<Vec<Project>> {
        self.project_service.list_project_by_participant(site_uuid).await
    }

    pub async fn list_project_participants(&self, project_uuid: Uuid) -> Result<Vec<ProjectParticipant>> {
        self.repositories
            .participants
            .list_by_project(project_uuid)
            .await
            .with_context(|| format!("failed to list participants of project {}", project_uuid))
    }

    pub async fn process_participant_leaving(&self, project_uuid: Uuid, site_uuid: Uuid) -> Result<()> {
        let other_sites = self.active_member_sites(project_uuid, &[site_uuid]).await?;
        self.project_service
            .handle_participant_leaving(project_uuid, site_uuid, other_sites)
            .await
    }

    pub async fn process_participant_dismissal(&self, project_uuid: Uuid, site_uuid: Uuid) -> Result<()> {
        let project = self.project(project_uuid).await?;
        let target_site = self.site(site_uuid).await?;
        let other_sites = self
            .active_member_sites(project_uuid, &[site_uuid, project.creator.managing_site_uuid])
            .await?;

        self.project_service
            .handle_participant_dismissal(project_uuid, target_site, other_sites)
            .await
    }

    pub async fn list_project_data(&self, project_uuid: Uuid) -> Result<Vec<ProjectData>> {
        self.repositories
            .data
            .list_by_project(project_uuid)
            .await
            .with_context(|| format!("failed to list data of project {}", project_uuid))
    }

    pub async fn process_data_association(&self, project_uuid: Uuid, item: DataAssociationItem) -> Result<ProjectData> {
        let provider = self.site(item.site_uuid).await?;
        let data = new_project_data(
            project_uuid,
            item.data_uuid,
            &provider,
            item.name,
            item.description,
            item.table_name,
            item.table_namespace,
        );
        let other_sites = self.active_member_sites(project_uuid, &[provider.uuid]).await?;

        self.project_service.handle_data_association(data, other_sites).await
    }

    pub async fn process_data_dismissal(&self, project_uuid: Uuid, data_uuid: Uuid) -> Result<()> {
        let data = self
            .repositories
            .data
            .get_by_project_and_data(project_uuid, data_uuid)
            .await
            .with_context(|| format!("failed to load project data {}", data_uuid))?;
        let other_sites = self.active_member_sites(project_uuid, &[data.site_uuid]).await?;

        self.project_service
            .handle_data_dismissal(project_uuid, data_uuid, other_sites)
            .await
    }

    pub async fn process_project_closing(&self, project_uuid: Uuid) -> Result<()> {
        let project = self.project(project_uuid).await?;
        let other_sites = self
            .active_member_sites(project_uuid, &[project.creator.managing_site_uuid])
            .await?;

        self.project_service.handle_project_closing(project_uuid, other_sites).await
    }

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    async fn job_target(&self, job_uuid: Uuid, project_uuid: Uuid, request: &JobDataRequest) -> Result<JobParticipantTarget> {
        let data = self
            .repositories
            .data
            .get_by_project_and_data(project_uuid, request.data_uuid)
            .await
            .with_context(|| format!("failed to resolve job data {}", request.data_uuid))?;
        let site = self.site(data.site_uuid).await?;

        Ok(JobParticipantTarget {
            participant: JobParticipant {
                uuid: Uuid::new_v4(),
                job_uuid,
                site_uuid: site.uuid,
                site_name: site.name.clone(),
                site_party_id: site.party_id,
                data_uuid: data.data_uuid,
                data_name: data.name,
                data_table_name: data.table_name,
                data_table_namespace: data.table_namespace,
                data_label_name: request.label_name.clone(),
                status: JobParticipantStatus::Pending,
            },
            site,
        })
    }

    /// `raw_json` is the initiator's request body; it is stored and forwarded unchanged.
    pub async fn process_job_creation(&self, raw_json: String) -> Result<Job> {
        let request: JobCreationRequest =
            serde_json::from_str(&raw_json).map_err(|e| RequestError::Malformed(e.to_string()))?;
        self.project(request.project_uuid).await?;

        let initiator = self
            .job_target(request.uuid, request.project_uuid, &request.initiator_data)
            .await?;
        let mut targets = vec![initiator.clone()];
        for other in &request.other_site_data {
            let target = self.job_target(request.uuid, request.project_uuid, other).await?;
            if targets.iter().any(|t| t.site.uuid == target.site.uuid) {
                return Err(RequestError::Malformed(format!(
                    "site {} appears more than once in job {}",
                    target.site.name, request.uuid
                ))
                .into());
            }
            targets.push(target);
        }

        let now = Utc::now();
        let job = Job {
            uuid: request.uuid,
            project_uuid: request.project_uuid,
            name: request.name,
            description: request.description,
            job_type: request.job_type,
            status: JobStatus::Pending,
            status_message: String::new(),
            algorithm_type: request.algorithm_type,
            algorithm_config: request.algorithm_config,
            model_name: request.model_name,
            predicting_model_uuid: request.predicting_model_uuid,
            initiating_site_uuid: initiator.site.uuid,
            initiating_site_name: initiator.site.name.clone(),
            initiating_site_party_id: initiator.site.party_id,
            initiating_user: request.initiating_user,
            fate: FateJobInfo::default(),
            conf: request.conf,
            dsl: request.dsl,
            request_json: raw_json,
            created_at: now,
            updated_at: now,
            finished_at: None,
        };

        self.job_service.handle_new_job_creation(job.clone(), targets).await?;
        Ok(job)
    }

    pub async fn process_job_approval_response(&self, response: JobApprovalMessage) -> Result<()> {
        let job = self
            .repositories
            .jobs
            .get_by_uuid(response.job_uuid)
            .await
            .with_context(|| format!("failed to load job {}", response.job_uuid))?;
        let initiating_site = self.site(job.initiating_site_uuid).await?;

        let participants = self
            .repositories
            .job_participants
            .list_by_job(job.uuid)
            .await
            .context("failed to list job participants")?;
        let observer_uuids: Vec<Uuid> = participants
            .iter()
            .map(|p| p.site_uuid)
            .filter(|uuid| *uuid != job.initiating_site_uuid && *uuid != response.site_uuid)
            .collect();
        let observers = self.sites(observer_uuids).await?;

        self.job_service
            .handle_job_approval_response(response, initiating_site, observers)
            .await
    }

    /// `raw_json` is echoed to participant sites as received.
    pub async fn process_job_status_update(&self, raw_json: String) -> Result<()> {
        let update: JobStatusUpdateMessage =
            serde_json::from_str(&raw_json).map_err(|e| RequestError::Malformed(e.to_string()))?;

        let mut sites = HashMap::new();
        for site in self.sites(update.participant_status_map.keys().copied().collect()).await? {
            sites.insert(site.uuid, site);
        }
        info!(
            "Status report for job {}: {:?} ({} participants)",
            update.job_uuid,
            update.status,
            update.participant_status_map.len()
        );

        self.job_service
            .handle_job_status_update(JobStatusUpdate { update, raw_json }, sites)
            .await
    }

    pub async fn list_project_jobs(&self, project_uuid: Uuid) -> Result<Vec<Job>> {
        self.repositories
            .jobs
            .list_by_project(project_uuid)
            .await
            .with_context(|| format!("failed to list jobs of project {}", project_uuid))
    }

    pub async fn get_job(&self, job_uuid: Uuid) -> Result<JobDetail> {
        let job = self
            .repositories
            .jobs
            .get_by_uuid(job_uuid)
            .await
            .with_context(|| format!("failed to load job {}", job_uuid))?;
        let participants = self
            .repositories
            .job_participants
            .list_by_job(job_uuid)
            .await
            .context("failed to list job participants")?;
        Ok(JobDetail { job, participants })
    }
}
