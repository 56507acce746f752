// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Repository Factory
//!
//! Builds the concrete repository set for the configured [`StorageBackend`].

use anyhow::Result;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::info;

use crate::domain::repository::{
    JobParticipantRepository, JobRepository, ProjectDataRepository, ProjectInvitationRepository,
    ProjectParticipantRepository, ProjectRepository, SiteRepository, StorageBackend,
};
use crate::infrastructure::db::Database;
use crate::infrastructure::repositories::{
    InMemoryJobParticipantRepository, InMemoryJobRepository, InMemoryProjectDataRepository,
    InMemoryProjectInvitationRepository, InMemoryProjectParticipantRepository, InMemoryProjectRepository,
    InMemorySiteRepository, PostgresJobParticipantRepository, PostgresJobRepository, PostgresProjectDataRepository,
    PostgresProjectInvitationRepository, PostgresProjectParticipantRepository, PostgresProjectRepository,
    PostgresSiteRepository,
};

/// Every repository the coordination services need.
#[derive(Clone)]
pub struct Repositories {
    pub sites: Arc<dyn SiteRepository>,
    pub projects: Arc<dyn ProjectRepository>,
    pub participants: Arc<dyn ProjectParticipantRepository>,
    pub invitations: Arc<dyn ProjectInvitationRepository>,
    pub data: Arc<dyn ProjectDataRepository>,
    pub jobs: Arc<dyn JobRepository>,
    pub job_participants: Arc<dyn JobParticipantRepository>,
}

impl Repositories {
    pub fn in_memory() -> Self {
        Self {
            sites: Arc::new(InMemorySiteRepository::new()),
            projects: Arc::new(InMemoryProjectRepository::new()),
            participants: Arc::new(InMemoryProjectParticipantRepository::new()),
            invitations: Arc::new(InMemoryProjectInvitationRepository::new()),
            data: Arc::new(InMemoryProjectDataRepository::new()),
            jobs: Arc::new(InMemoryJobRepository::new()),
            job_participants: Arc::new(InMemoryJobParticipantRepository::new()),
        }
    }

    pub fn postgres(pool: PgPool) -> Self {
        Self {
            sites: Arc::new(PostgresSiteRepository::new(pool.clone())),
            projects: Arc::new(PostgresProjectRepository::new(pool.clone())),
            participants: Arc::new(PostgresProjectParticipantRepository::new(pool.clone())),
            invitations: Arc::new(PostgresProjectInvitationRepository::new(pool.clone())),
            data: Arc::new(PostgresProjectDataRepository::new(pool.clone())),
            jobs: Arc::new(PostgresJobRepository::new(pool.clone())),
            job_participants: Arc::new(PostgresJobParticipantRepository::new(pool)),
        }
    }
}

/// Creates the repository set for `backend`, connecting and migrating the
/// database when PostgreSQL is selected.
pub async fn create_repositories(backend: &StorageBackend) -> Result<Repositories> {
    match backend {
        StorageBackend::InMemory => {
            info!("Using in-memory repositories");
            Ok(Repositories::in_memory())
        }
        StorageBackend::PostgreSQL(config) => {
            let database = Database::new(config).await?;
            database.migrate().await?;
            info!("Using PostgreSQL repositories");
            Ok(Repositories::postgres(database.get_pool().clone()))
        }
    }
}
