// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Domain Repository Interfaces
//!
//! Persistence contracts for every federation record, one trait per record
//! type, implemented in `crate::infrastructure::repositories`.
//!
//! | Trait | Record | Implementations |
//! |-------|--------|----------------|
//! | `SiteRepository` | `Site` | `InMemorySiteRepository`, `PostgresSiteRepository` |
//! | `ProjectRepository` | `Project` | `InMemoryProjectRepository`, `PostgresProjectRepository` |
//! | `ProjectParticipantRepository` | `ProjectParticipant` | `InMemoryProjectParticipantRepository`, `PostgresProjectParticipantRepository` |
//! | `ProjectInvitationRepository` | `ProjectInvitation` | `InMemoryProjectInvitationRepository`, `PostgresProjectInvitationRepository` |
//! | `ProjectDataRepository` | `ProjectData` | `InMemoryProjectDataRepository`, `PostgresProjectDataRepository` |
//! | `JobRepository` | `Job` | `InMemoryJobRepository`, `PostgresJobRepository` |
//! | `JobParticipantRepository` | `JobParticipant` | `InMemoryJobParticipantRepository`, `PostgresJobParticipantRepository` |
//!
//! Lookups never return `Option`: an absent record is the
//! [`RepositoryError::NotFound`] sentinel, so callers can tell "absent" from a
//! storage failure and branch on it. Duplicate creates surface as
//! [`RepositoryError::Conflict`].

use async_trait::async_trait;
use uuid::Uuid;

use crate::domain::job::{FateJobInfo, Job, JobParticipant, JobParticipantStatus, JobStatus};
use crate::domain::project::{
    DataStatus, InvitationStatus, ParticipantStatus, Project, ProjectData, ProjectInvitation,
    ProjectParticipant, ProjectStatus,
};
use crate::domain::site::{Site, SiteInfo};

/// Storage backend enum for pluggable persistence
#[derive(Debug, Clone)]
pub enum StorageBackend {
    InMemory,
    PostgreSQL(PostgresConfig),
}

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub connection_string: String,
    pub max_connections: u32,
}

#[async_trait]
pub trait SiteRepository: Send + Sync {
    /// Insert a new site; a name held by a different UUID is a conflict.
    async fn create(&self, site: &Site) -> Result<(), RepositoryError>;

    async fn get_by_uuid(&self, uuid: Uuid) -> Result<Site, RepositoryError>;

    async fn list(&self) -> Result<Vec<Site>, RepositoryError>;

    async fn delete_by_uuid(&self, uuid: Uuid) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ProjectRepository: Send + Sync {
    async fn create(&self, project: &Project) -> Result<(), RepositoryError>;

    async fn get_by_uuid(&self, uuid: Uuid) -> Result<Project, RepositoryError>;

    async fn list(&self) -> Result<Vec<Project>, RepositoryError>;

    async fn update_status_by_uuid(&self, uuid: Uuid, status: ProjectStatus) -> Result<(), RepositoryError>;

    /// Bulk update of the creator info of every project managed by `site_uuid`.
    async fn update_managing_site_info_by_site_uuid(
        &self,
        site_uuid: Uuid,
        info: &SiteInfo,
    ) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ProjectParticipantRepository: Send + Sync {
    async fn create(&self, participant: &ProjectParticipant) -> Result<(), RepositoryError>;

    async fn get_by_project_and_site(
        &self,
        project_uuid: Uuid,
        site_uuid: Uuid,
    ) -> Result<ProjectParticipant, RepositoryError>;

    async fn update_status_by_uuid(&self, uuid: Uuid, status: ParticipantStatus) -> Result<(), RepositoryError>;

    async fn list_by_project(&self, project_uuid: Uuid) -> Result<Vec<ProjectParticipant>, RepositoryError>;

    async fn list_by_site(&self, site_uuid: Uuid) -> Result<Vec<ProjectParticipant>, RepositoryError>;

    async fn update_site_info_by_site_uuid(&self, site_uuid: Uuid, info: &SiteInfo) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ProjectInvitationRepository: Send + Sync {
    async fn create(&self, invitation: &ProjectInvitation) -> Result<(), RepositoryError>;

    async fn get_by_uuid(&self, uuid: Uuid) -> Result<ProjectInvitation, RepositoryError>;

    /// Most recently created invitation for the `(project, site)` pair.
    async fn get_latest_by_project_and_site(
        &self,
        project_uuid: Uuid,
        site_uuid: Uuid,
    ) -> Result<ProjectInvitation, RepositoryError>;

    async fn update_status_by_uuid(&self, uuid: Uuid, status: InvitationStatus) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait ProjectDataRepository: Send + Sync {
    /// A second row for the same `(project_uuid, data_uuid)` is a conflict.
    async fn create(&self, data: &ProjectData) -> Result<(), RepositoryError>;

    async fn get_by_project_and_data(&self, project_uuid: Uuid, data_uuid: Uuid) -> Result<ProjectData, RepositoryError>;

    /// Replace descriptive fields and status of an existing row.
    async fn update_by_uuid(&self, data: &ProjectData) -> Result<(), RepositoryError>;

    async fn update_status_by_uuid(&self, uuid: Uuid, status: DataStatus) -> Result<(), RepositoryError>;

    async fn list_by_project(&self, project_uuid: Uuid) -> Result<Vec<ProjectData>, RepositoryError>;

    async fn update_site_info_by_site_uuid(&self, site_uuid: Uuid, info: &SiteInfo) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait JobRepository: Send + Sync {
    async fn create(&self, job: &Job) -> Result<(), RepositoryError>;

    async fn get_by_uuid(&self, uuid: Uuid) -> Result<Job, RepositoryError>;

    async fn list_by_project(&self, project_uuid: Uuid) -> Result<Vec<Job>, RepositoryError>;

    /// Sets `finished_at` when `status` is a finished state.
    async fn update_status_by_uuid(
        &self,
        uuid: Uuid,
        status: JobStatus,
        status_message: &str,
    ) -> Result<(), RepositoryError>;

    async fn update_fate_info_by_uuid(&self, uuid: Uuid, fate: &FateJobInfo) -> Result<(), RepositoryError>;
}

#[async_trait]
pub trait JobParticipantRepository: Send + Sync {
    async fn create(&self, participant: &JobParticipant) -> Result<(), RepositoryError>;

    async fn get_by_job_and_site(&self, job_uuid: Uuid, site_uuid: Uuid) -> Result<JobParticipant, RepositoryError>;

    async fn update_status_by_uuid(&self, uuid: Uuid, status: JobParticipantStatus) -> Result<(), RepositoryError>;

    async fn list_by_job(&self, job_uuid: Uuid) -> Result<Vec<JobParticipant>, RepositoryError>;
}

/// Repository errors
#[derive(Debug, thiserror::Error)]
pub enum RepositoryError {
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Conflicting record already exists: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl RepositoryError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn is_conflict(&self) -> bool {
        matches!(self, Self::Conflict(_))
    }
}

impl From<sqlx::Error> for RepositoryError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => RepositoryError::NotFound("Row not found".to_string()),
            sqlx::Error::Database(ref db) if db.is_unique_violation() => {
                RepositoryError::Conflict(db.message().to_string())
            }
            _ => RepositoryError::Database(err.to_string()),
        }
    }
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

/// Unknown status codes read back from storage.
impl From<crate::domain::project::ProjectError> for RepositoryError {
    fn from(err: crate::domain::project::ProjectError) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

impl From<crate::domain::job::JobError> for RepositoryError {
    fn from(err: crate::domain::job::JobError) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}
