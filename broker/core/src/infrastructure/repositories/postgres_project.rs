// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Project
//!
//! PostgreSQL repositories for projects and their participants,
//! invitations and associated data. Status enums are stored as SMALLINT
//! codes; duplicate inserts surface as `RepositoryError::Conflict` through
//! the unique constraints in the federation migration.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer
//! - **Purpose:** Implements the project-side repository traits

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use super::postgres_site::party_id_from_row;
use crate::domain::project::{
    DataStatus, InvitationStatus, ParticipantStatus, Project, ProjectCreatorInfo, ProjectData,
    ProjectInvitation, ProjectParticipant, ProjectStatus,
};
use crate::domain::repository::{
    ProjectDataRepository, ProjectInvitationRepository, ProjectParticipantRepository, ProjectRepository,
    RepositoryError,
};
use crate::domain::site::SiteInfo;

// ============================================================================
// Projects
// ============================================================================

pub struct PostgresProjectRepository {
    pool: PgPool,
}

impl PostgresProjectRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const PROJECT_COLUMNS: &str = "uuid, name, description, auto_approval_enabled, status, manager, \
     managing_site_name, managing_site_party_id, managing_site_uuid, created_at";

fn parse_project_row(row: PgRow) -> Result<Project, RepositoryError> {
    let status: i16 = row.try_get("status")?;
    Ok(Project {
        uuid: row.try_get("uuid")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        auto_approval_enabled: row.try_get("auto_approval_enabled")?,
        status: ProjectStatus::try_from(status)?,
        creator: ProjectCreatorInfo {
            manager: row.try_get("manager")?,
            managing_site_name: row.try_get("managing_site_name")?,
            managing_site_party_id: party_id_from_row(&row, "managing_site_party_id")?,
            managing_site_uuid: row.try_get("managing_site_uuid")?,
        },
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ProjectRepository for PostgresProjectRepository {
    async fn create(&self, project: &Project) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO projects (
                uuid, name, description, auto_approval_enabled, status, manager,
                managing_site_name, managing_site_party_id, managing_site_uuid, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            "#,
        )
        .bind(project.uuid)
        .bind(&project.name)
        .bind(&project.description)
        .bind(project.auto_approval_enabled)
        .bind(project.status.as_i16())
        .bind(&project.creator.manager)
        .bind(&project.creator.managing_site_name)
        .bind(project.creator.managing_site_party_id as i64)
        .bind(project.creator.managing_site_uuid)
        .bind(project.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_uuid(&self, uuid: Uuid) -> Result<Project, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM projects WHERE uuid = $1", PROJECT_COLUMNS))
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => parse_project_row(row),
            None => Err(RepositoryError::NotFound(format!("project {}", uuid))),
        }
    }

    async fn list(&self) -> Result<Vec<Project>, RepositoryError> {
        let rows = sqlx::query(&format!("SELECT {} FROM projects ORDER BY created_at ASC", PROJECT_COLUMNS))
            .fetch_all(&self.pool)
            .await?;

        rows.into_iter().map(parse_project_row).collect()
    }

    async fn update_status_by_uuid(&self, uuid: Uuid, status: ProjectStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE projects SET status = $2 WHERE uuid = $1")
            .bind(uuid)
            .bind(status.as_i16())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("project {}", uuid)));
        }
        Ok(())
    }

    async fn update_managing_site_info_by_site_uuid(
        &self,
        site_uuid: Uuid,
        info: &SiteInfo,
    ) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE projects
            SET managing_site_name = $2, managing_site_party_id = $3
            WHERE managing_site_uuid = $1
            "#,
        )
        .bind(site_uuid)
        .bind(&info.name)
        .bind(info.party_id as i64)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============================================================================
// Project participants
// ============================================================================

pub struct PostgresProjectParticipantRepository {
    pool: PgPool,
}

impl PostgresProjectParticipantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const PARTICIPANT_COLUMNS: &str =
    "uuid, project_uuid, site_uuid, site_name, site_party_id, site_description, status";

fn parse_participant_row(row: PgRow) -> Result<ProjectParticipant, RepositoryError> {
    let status: i16 = row.try_get("status")?;
    Ok(ProjectParticipant {
        uuid: row.try_get("uuid")?,
        project_uuid: row.try_get("project_uuid")?,
        site_uuid: row.try_get("site_uuid")?,
        site_name: row.try_get("site_name")?,
        site_party_id: party_id_from_row(&row, "site_party_id")?,
        site_description: row.try_get("site_description")?,
        status: ParticipantStatus::try_from(status)?,
    })
}

#[async_trait]
impl ProjectParticipantRepository for PostgresProjectParticipantRepository {
    async fn create(&self, participant: &ProjectParticipant) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO project_participants (
                uuid, project_uuid, site_uuid, site_name, site_party_id, site_description, status
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(participant.uuid)
        .bind(participant.project_uuid)
        .bind(participant.site_uuid)
        .bind(&participant.site_name)
        .bind(participant.site_party_id as i64)
        .bind(&participant.site_description)
        .bind(participant.status.as_i16())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_project_and_site(
        &self,
        project_uuid: Uuid,
        site_uuid: Uuid,
    ) -> Result<ProjectParticipant, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM project_participants WHERE project_uuid = $1 AND site_uuid = $2",
            PARTICIPANT_COLUMNS
        ))
        .bind(project_uuid)
        .bind(site_uuid)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => parse_participant_row(row),
            None => Err(RepositoryError::NotFound(format!(
                "participant {}/{}",
                project_uuid, site_uuid
            ))),
        }
    }

    async fn update_status_by_uuid(&self, uuid: Uuid, status: ParticipantStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE project_participants SET status = $2 WHERE uuid = $1")
            .bind(uuid)
            .bind(status.as_i16())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("participant {}", uuid)));
        }
        Ok(())
    }

    async fn list_by_project(&self, project_uuid: Uuid) -> Result<Vec<ProjectParticipant>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM project_participants WHERE project_uuid = $1 ORDER BY site_party_id ASC",
            PARTICIPANT_COLUMNS
        ))
        .bind(project_uuid)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_participant_row).collect()
    }

    async fn list_by_site(&self, site_uuid: Uuid) -> Result<Vec<ProjectParticipant>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM project_participants WHERE site_uuid = $1 ORDER BY id ASC",
            PARTICIPANT_COLUMNS
        ))
        .bind(site_uuid)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_participant_row).collect()
    }

    async fn update_site_info_by_site_uuid(&self, site_uuid: Uuid, info: &SiteInfo) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            UPDATE project_participants
            SET site_name = $2, site_party_id = $3, site_description = $4
            WHERE site_uuid = $1
            "#,
        )
        .bind(site_uuid)
        .bind(&info.name)
        .bind(info.party_id as i64)
        .bind(&info.description)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}

// ============================================================================
// Project invitations
// ============================================================================

pub struct PostgresProjectInvitationRepository {
    pool: PgPool,
}

impl PostgresProjectInvitationRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn parse_invitation_row(row: PgRow) -> Result<ProjectInvitation, RepositoryError> {
    let status: i16 = row.try_get("status")?;
    Ok(ProjectInvitation {
        uuid: row.try_get("uuid")?,
        project_uuid: row.try_get("project_uuid")?,
        site_uuid: row.try_get("site_uuid")?,
        status: InvitationStatus::try_from(status)?,
        created_at: row.try_get("created_at")?,
    })
}

#[async_trait]
impl ProjectInvitationRepository for PostgresProjectInvitationRepository {
    async fn create(&self, invitation: &ProjectInvitation) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO project_invitations (uuid, project_uuid, site_uuid, status, created_at)
            VALUES ($1, $2, $3, $4, $5)
            "#,
        )
        .bind(invitation.uuid)
        .bind(invitation.project_uuid)
        .bind(invitation.site_uuid)
        .bind(invitation.status.as_i16())
        .bind(invitation.created_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_uuid(&self, uuid: Uuid) -> Result<ProjectInvitation, RepositoryError> {
        let row = sqlx::query(
            "SELECT uuid, project_uuid, site_uuid, status, created_at FROM project_invitations WHERE uuid = $1",
        )
        .bind(uuid)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => parse_invitation_row(row),
            None => Err(RepositoryError::NotFound(format!("invitation {}", uuid))),
        }
    }

    async fn get_latest_by_project_and_site(
        &self,
        project_uuid: Uuid,
        site_uuid: Uuid,
    ) -> Result<ProjectInvitation, RepositoryError> {
        let row = sqlx::query(
            r#"
            SELECT uuid, project_uuid, site_uuid, status, created_at
            FROM project_invitations
            WHERE project_uuid = $1 AND site_uuid = $2
            ORDER BY created_at DESC, id DESC
            LIMIT 1
            "#,
        )
        .bind(project_uuid)
        .bind(site_uuid)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => parse_invitation_row(row),
            None => Err(RepositoryError::NotFound(format!(
                "invitation {}/{}",
                project_uuid, site_uuid
            ))),
        }
    }

    async fn update_status_by_uuid(&self, uuid: Uuid, status: InvitationStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE project_invitations SET status = $2 WHERE uuid = $1")
            .bind(uuid)
            .bind(status.as_i16())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("invitation {}", uuid)));
        }
        Ok(())
    }
}

// ============================================================================
// Project data
// ============================================================================

pub struct PostgresProjectDataRepository {
    pool: PgPool,
}

impl PostgresProjectDataRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const DATA_COLUMNS: &str = "uuid, project_uuid, data_uuid, site_uuid, site_name, site_party_id, name, \
     description, table_name, table_namespace, status, creation_time, update_time";

fn parse_data_row(row: PgRow) -> Result<ProjectData, RepositoryError> {
    let status: i16 = row.try_get("status")?;
    Ok(ProjectData {
        uuid: row.try_get("uuid")?,
        project_uuid: row.try_get("project_uuid")?,
        data_uuid: row.try_get("data_uuid")?,
        site_uuid: row.try_get("site_uuid")?,
        site_name: row.try_get("site_name")?,
        site_party_id: party_id_from_row(&row, "site_party_id")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        table_name: row.try_get("table_name")?,
        table_namespace: row.try_get("table_namespace")?,
        status: DataStatus::try_from(status)?,
        creation_time: row.try_get("creation_time")?,
        update_time: row.try_get("update_time")?,
    })
}

#[async_trait]
impl ProjectDataRepository for PostgresProjectDataRepository {
    async fn create(&self, data: &ProjectData) -> Result<(), RepositoryError> {
        sqlx::query(
            r#"
            INSERT INTO project_data (
                uuid, project_uuid, data_uuid, site_uuid, site_name, site_party_id, name,
                description, table_name, table_namespace, status, creation_time, update_time
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13)
            "#,
        )
        .bind(data.uuid)
        .bind(data.project_uuid)
        .bind(data.data_uuid)
        .bind(data.site_uuid)
        .bind(&data.site_name)
        .bind(data.site_party_id as i64)
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.table_name)
        .bind(&data.table_namespace)
        .bind(data.status.as_i16())
        .bind(data.creation_time)
        .bind(data.update_time)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_project_and_data(&self, project_uuid: Uuid, data_uuid: Uuid) -> Result<ProjectData, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM project_data WHERE project_uuid = $1 AND data_uuid = $2",
            DATA_COLUMNS
        ))
        .bind(project_uuid)
        .bind(data_uuid)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => parse_data_row(row),
            None => Err(RepositoryError::NotFound(format!(
                "project data {}/{}",
                project_uuid, data_uuid
            ))),
        }
    }

    async fn update_by_uuid(&self, data: &ProjectData) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE project_data
            SET site_uuid = $2, site_name = $3, site_party_id = $4, name = $5, description = $6,
                table_name = $7, table_namespace = $8, status = $9, update_time = $10
            WHERE uuid = $1
            "#,
        )
        .bind(data.uuid)
        .bind(data.site_uuid)
        .bind(&data.site_name)
        .bind(data.site_party_id as i64)
        .bind(&data.name)
        .bind(&data.description)
        .bind(&data.table_name)
        .bind(&data.table_namespace)
        .bind(data.status.as_i16())
        .bind(data.update_time)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("project data {}", data.uuid)));
        }
        Ok(())
    }

    async fn update_status_by_uuid(&self, uuid: Uuid, status: DataStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE project_data SET status = $2, update_time = $3 WHERE uuid = $1")
            .bind(uuid)
            .bind(status.as_i16())
            .bind(Utc::now())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("project data {}", uuid)));
        }
        Ok(())
    }

    async fn list_by_project(&self, project_uuid: Uuid) -> Result<Vec<ProjectData>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM project_data WHERE project_uuid = $1 ORDER BY creation_time ASC",
            DATA_COLUMNS
        ))
        .bind(project_uuid)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_data_row).collect()
    }

    async fn update_site_info_by_site_uuid(&self, site_uuid: Uuid, info: &SiteInfo) -> Result<(), RepositoryError> {
        sqlx::query("UPDATE project_data SET site_name = $2, site_party_id = $3 WHERE site_uuid = $1")
            .bind(site_uuid)
            .bind(&info.name)
            .bind(info.party_id as i64)
            .execute(&self.pool)
            .await?;

        Ok(())
    }
}
