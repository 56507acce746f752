// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Repository Implementations
//!
//! Infrastructure implementations of the repository traits defined in
//! `crate::domain::repository`.
//!
//! ## PostgreSQL Repositories
//!
//! - **PostgresSiteRepository** - Site registry
//! - **PostgresProjectRepository**, **PostgresProjectParticipantRepository**,
//!   **PostgresProjectInvitationRepository**, **PostgresProjectDataRepository**
//! - **PostgresJobRepository**, **PostgresJobParticipantRepository**
//!
//! ## In-Memory Repositories
//!
//! HashMap-backed storage for development and tests. They enforce the same
//! uniqueness rules as the PostgreSQL schema so duplicate-create races
//! surface as [`RepositoryError::Conflict`] in both backends.

pub mod postgres_job;
pub mod postgres_project;
pub mod postgres_site;

pub use postgres_job::{PostgresJobParticipantRepository, PostgresJobRepository};
pub use postgres_project::{
    PostgresProjectDataRepository, PostgresProjectInvitationRepository, PostgresProjectParticipantRepository,
    PostgresProjectRepository,
};
pub use postgres_site::PostgresSiteRepository;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::Arc;
use uuid::Uuid;

use crate::domain::job::{FateJobInfo, Job, JobParticipant, JobParticipantStatus, JobStatus};
use crate::domain::project::{
    DataStatus, InvitationStatus, ParticipantStatus, Project, ProjectData, ProjectInvitation, ProjectParticipant,
    ProjectStatus,
};
use crate::domain::repository::{
    JobParticipantRepository, JobRepository, ProjectDataRepository, ProjectInvitationRepository,
    ProjectParticipantRepository, ProjectRepository, RepositoryError, SiteRepository,
};
use crate::domain::site::{Site, SiteInfo};

fn not_found(kind: &str, key: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::NotFound(format!("{} {}", kind, key))
}

// ============================================================================
// Sites
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemorySiteRepository {
    sites: Arc<RwLock<HashMap<Uuid, Site>>>,
}

impl InMemorySiteRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl SiteRepository for InMemorySiteRepository {
    async fn create(&self, site: &Site) -> Result<(), RepositoryError> {
        let mut sites = self.sites.write();
        if sites.contains_key(&site.uuid) {
            return Err(RepositoryError::Conflict(format!("site {} already exists", site.uuid)));
        }
        if sites.values().any(|s| s.name == site.name) {
            return Err(RepositoryError::Conflict(format!("site name '{}' already exists", site.name)));
        }
        sites.insert(site.uuid, site.clone());
        Ok(())
    }

    async fn get_by_uuid(&self, uuid: Uuid) -> Result<Site, RepositoryError> {
        self.sites.read().get(&uuid).cloned().ok_or_else(|| not_found("site", uuid))
    }

    async fn list(&self) -> Result<Vec<Site>, RepositoryError> {
        let mut sites: Vec<Site> = self.sites.read().values().cloned().collect();
        sites.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(sites)
    }

    async fn delete_by_uuid(&self, uuid: Uuid) -> Result<(), RepositoryError> {
        self.sites.write().remove(&uuid).map(|_| ()).ok_or_else(|| not_found("site", uuid))
    }
}

// ============================================================================
// Projects
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemoryProjectRepository {
    projects: Arc<RwLock<HashMap<Uuid, Project>>>,
}

impl InMemoryProjectRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectRepository for InMemoryProjectRepository {
    async fn create(&self, project: &Project) -> Result<(), RepositoryError> {
        let mut projects = self.projects.write();
        if projects.contains_key(&project.uuid) {
            return Err(RepositoryError::Conflict(format!("project {} already exists", project.uuid)));
        }
        projects.insert(project.uuid, project.clone());
        Ok(())
    }

    async fn get_by_uuid(&self, uuid: Uuid) -> Result<Project, RepositoryError> {
        self.projects.read().get(&uuid).cloned().ok_or_else(|| not_found("project", uuid))
    }

    async fn list(&self) -> Result<Vec<Project>, RepositoryError> {
        let mut projects: Vec<Project> = self.projects.read().values().cloned().collect();
        projects.sort_by_key(|p| p.created_at);
        Ok(projects)
    }

    async fn update_status_by_uuid(&self, uuid: Uuid, status: ProjectStatus) -> Result<(), RepositoryError> {
        let mut projects = self.projects.write();
        let project = projects.get_mut(&uuid).ok_or_else(|| not_found("project", uuid))?;
        project.status = status;
        Ok(())
    }

    async fn update_managing_site_info_by_site_uuid(
        &self,
        site_uuid: Uuid,
        info: &SiteInfo,
    ) -> Result<(), RepositoryError> {
        for project in self
            .projects
            .write()
            .values_mut()
            .filter(|p| p.creator.managing_site_uuid == site_uuid)
        {
            project.creator.managing_site_name = info.name.clone();
            project.creator.managing_site_party_id = info.party_id;
        }
        Ok(())
    }
}

// ============================================================================
// Project participants
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemoryProjectParticipantRepository {
    participants: Arc<RwLock<HashMap<Uuid, ProjectParticipant>>>,
}

impl InMemoryProjectParticipantRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectParticipantRepository for InMemoryProjectParticipantRepository {
    async fn create(&self, participant: &ProjectParticipant) -> Result<(), RepositoryError> {
        let mut participants = self.participants.write();
        let duplicate = participants.values().any(|p| {
            p.uuid == participant.uuid
                || (p.project_uuid == participant.project_uuid && p.site_uuid == participant.site_uuid)
        });
        if duplicate {
            return Err(RepositoryError::Conflict(format!(
                "participant {} of project {} already exists",
                participant.site_uuid, participant.project_uuid
            )));
        }
        participants.insert(participant.uuid, participant.clone());
        Ok(())
    }

    async fn get_by_project_and_site(
        &self,
        project_uuid: Uuid,
        site_uuid: Uuid,
    ) -> Result<ProjectParticipant, RepositoryError> {
        self.participants
            .read()
            .values()
            .find(|p| p.project_uuid == project_uuid && p.site_uuid == site_uuid)
            .cloned()
            .ok_or_else(|| not_found("participant", format!("{}/{}", project_uuid, site_uuid)))
    }

    async fn update_status_by_uuid(&self, uuid: Uuid, status: ParticipantStatus) -> Result<(), RepositoryError> {
        let mut participants = self.participants.write();
        let participant = participants.get_mut(&uuid).ok_or_else(|| not_found("participant", uuid))?;
        participant.status = status;
        Ok(())
    }

    async fn list_by_project(&self, project_uuid: Uuid) -> Result<Vec<ProjectParticipant>, RepositoryError> {
        let mut participants: Vec<ProjectParticipant> = self
            .participants
            .read()
            .values()
            .filter(|p| p.project_uuid == project_uuid)
            .cloned()
            .collect();
        participants.sort_by_key(|p| p.site_party_id);
        Ok(participants)
    }

    async fn list_by_site(&self, site_uuid: Uuid) -> Result<Vec<ProjectParticipant>, RepositoryError> {
        Ok(self
            .participants
            .read()
            .values()
            .filter(|p| p.site_uuid == site_uuid)
            .cloned()
            .collect())
    }

    async fn update_site_info_by_site_uuid(&self, site_uuid: Uuid, info: &SiteInfo) -> Result<(), RepositoryError> {
        for participant in self
            .participants
            .write()
            .values_mut()
            .filter(|p| p.site_uuid == site_uuid)
        {
            participant.apply_site_info(info);
        }
        Ok(())
    }
}

// ============================================================================
// Project invitations
// ============================================================================

/// Invitations are kept in insertion order so "latest" is the last match.
#[derive(Clone, Default)]
pub struct InMemoryProjectInvitationRepository {
    invitations: Arc<RwLock<Vec<ProjectInvitation>>>,
}

impl InMemoryProjectInvitationRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectInvitationRepository for InMemoryProjectInvitationRepository {
    async fn create(&self, invitation: &ProjectInvitation) -> Result<(), RepositoryError> {
        let mut invitations = self.invitations.write();
        if invitations.iter().any(|i| i.uuid == invitation.uuid) {
            return Err(RepositoryError::Conflict(format!(
                "invitation {} already exists",
                invitation.uuid
            )));
        }
        invitations.push(invitation.clone());
        Ok(())
    }

    async fn get_by_uuid(&self, uuid: Uuid) -> Result<ProjectInvitation, RepositoryError> {
        self.invitations
            .read()
            .iter()
            .find(|i| i.uuid == uuid)
            .cloned()
            .ok_or_else(|| not_found("invitation", uuid))
    }

    async fn get_latest_by_project_and_site(
        &self,
        project_uuid: Uuid,
        site_uuid: Uuid,
    ) -> Result<ProjectInvitation, RepositoryError> {
        self.invitations
            .read()
            .iter()
            .rev()
            .find(|i| i.project_uuid == project_uuid && i.site_uuid == site_uuid)
            .cloned()
            .ok_or_else(|| not_found("invitation", format!("{}/{}", project_uuid, site_uuid)))
    }

    async fn update_status_by_uuid(&self, uuid: Uuid, status: InvitationStatus) -> Result<(), RepositoryError> {
        let mut invitations = self.invitations.write();
        let invitation = invitations
            .iter_mut()
            .find(|i| i.uuid == uuid)
            .ok_or_else(|| not_found("invitation", uuid))?;
        invitation.status = status;
        Ok(())
    }
}

// ============================================================================
// Project data
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemoryProjectDataRepository {
    data: Arc<RwLock<HashMap<Uuid, ProjectData>>>,
}

impl InMemoryProjectDataRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ProjectDataRepository for InMemoryProjectDataRepository {
    async fn create(&self, data: &ProjectData) -> Result<(), RepositoryError> {
        let mut rows = self.data.write();
        let duplicate = rows
            .values()
            .any(|d| d.uuid == data.uuid || (d.project_uuid == data.project_uuid && d.data_uuid == data.data_uuid));
        if duplicate {
            return Err(RepositoryError::Conflict(format!(
                "data {} of project {} already exists",
                data.data_uuid, data.project_uuid
            )));
        }
        rows.insert(data.uuid, data.clone());
        Ok(())
    }

    async fn get_by_project_and_data(&self, project_uuid: Uuid, data_uuid: Uuid) -> Result<ProjectData, RepositoryError> {
        self.data
            .read()
            .values()
            .find(|d| d.project_uuid == project_uuid && d.data_uuid == data_uuid)
            .cloned()
            .ok_or_else(|| not_found("project data", format!("{}/{}", project_uuid, data_uuid)))
    }

    async fn update_by_uuid(&self, data: &ProjectData) -> Result<(), RepositoryError> {
        let mut rows = self.data.write();
        let row = rows.get_mut(&data.uuid).ok_or_else(|| not_found("project data", data.uuid))?;
        row.refresh_from(data);
        row.status = data.status;
        row.update_time = data.update_time;
        Ok(())
    }

    async fn update_status_by_uuid(&self, uuid: Uuid, status: DataStatus) -> Result<(), RepositoryError> {
        let mut rows = self.data.write();
        let row = rows.get_mut(&uuid).ok_or_else(|| not_found("project data", uuid))?;
        row.status = status;
        row.update_time = Utc::now();
        Ok(())
    }

    async fn list_by_project(&self, project_uuid: Uuid) -> Result<Vec<ProjectData>, RepositoryError> {
        let mut rows: Vec<ProjectData> = self
            .data
            .read()
            .values()
            .filter(|d| d.project_uuid == project_uuid)
            .cloned()
            .collect();
        rows.sort_by_key(|d| d.creation_time);
        Ok(rows)
    }

    async fn update_site_info_by_site_uuid(&self, site_uuid: Uuid, info: &SiteInfo) -> Result<(), RepositoryError> {
        for row in self.data.write().values_mut().filter(|d| d.site_uuid == site_uuid) {
            row.site_name = info.name.clone();
            row.site_party_id = info.party_id;
        }
        Ok(())
    }
}

// ============================================================================
// Jobs
// ============================================================================

#[derive(Clone, Default)]
pub struct InMemoryJobRepository {
    jobs: Arc<RwLock<HashMap<Uuid, Job>>>,
}

impl InMemoryJobRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobRepository for InMemoryJobRepository {
    async fn create(&self, job: &Job) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write();
        if jobs.contains_key(&job.uuid) {
            return Err(RepositoryError::Conflict(format!("job {} already exists", job.uuid)));
        }
        jobs.insert(job.uuid, job.clone());
        Ok(())
    }

    async fn get_by_uuid(&self, uuid: Uuid) -> Result<Job, RepositoryError> {
        self.jobs.read().get(&uuid).cloned().ok_or_else(|| not_found("job", uuid))
    }

    async fn list_by_project(&self, project_uuid: Uuid) -> Result<Vec<Job>, RepositoryError> {
        let mut jobs: Vec<Job> = self
            .jobs
            .read()
            .values()
            .filter(|j| j.project_uuid == project_uuid)
            .cloned()
            .collect();
        jobs.sort_by_key(|j| j.created_at);
        Ok(jobs)
    }

    async fn update_status_by_uuid(
        &self,
        uuid: Uuid,
        status: JobStatus,
        status_message: &str,
    ) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write();
        let job = jobs.get_mut(&uuid).ok_or_else(|| not_found("job", uuid))?;
        let now = Utc::now();
        job.status = status;
        job.status_message = status_message.to_string();
        job.updated_at = now;
        if status.is_finished() {
            job.finished_at = Some(now);
        }
        Ok(())
    }

    async fn update_fate_info_by_uuid(&self, uuid: Uuid, fate: &FateJobInfo) -> Result<(), RepositoryError> {
        let mut jobs = self.jobs.write();
        let job = jobs.get_mut(&uuid).ok_or_else(|| not_found("job", uuid))?;
        job.fate = fate.clone();
        job.updated_at = Utc::now();
        Ok(())
    }
}

#[derive(Clone, Default)]
pub struct InMemoryJobParticipantRepository {
    participants: Arc<RwLock<HashMap<Uuid, JobParticipant>>>,
}

impl InMemoryJobParticipantRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl JobParticipantRepository for InMemoryJobParticipantRepository {
    async fn create(&self, participant: &JobParticipant) -> Result<(), RepositoryError> {
        let mut participants = self.participants.write();
        let duplicate = participants.values().any(|p| {
            p.uuid == participant.uuid || (p.job_uuid == participant.job_uuid && p.site_uuid == participant.site_uuid)
        });
        if duplicate {
            return Err(RepositoryError::Conflict(format!(
                "participant {} of job {} already exists",
                participant.site_uuid, participant.job_uuid
            )));
        }
        participants.insert(participant.uuid, participant.clone());
        Ok(())
    }

    async fn get_by_job_and_site(&self, job_uuid: Uuid, site_uuid: Uuid) -> Result<JobParticipant, RepositoryError> {
        self.participants
            .read()
            .values()
            .find(|p| p.job_uuid == job_uuid && p.site_uuid == site_uuid)
            .cloned()
            .ok_or_else(|| not_found("job participant", format!("{}/{}", job_uuid, site_uuid)))
    }

    async fn update_status_by_uuid(&self, uuid: Uuid, status: JobParticipantStatus) -> Result<(), RepositoryError> {
        let mut participants = self.participants.write();
        let participant = participants.get_mut(&uuid).ok_or_else(|| not_found("job participant", uuid))?;
        participant.status = status;
        Ok(())
    }

    async fn list_by_job(&self, job_uuid: Uuid) -> Result<Vec<JobParticipant>, RepositoryError> {
        let mut participants: Vec<JobParticipant> = self
            .participants
            .read()
            .values()
            .filter(|p| p.job_uuid == job_uuid)
            .cloned()
            .collect();
        participants.sort_by_key(|p| p.site_party_id);
        Ok(participants)
    }
}
