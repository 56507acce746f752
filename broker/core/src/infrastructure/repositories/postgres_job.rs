// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Postgres Job
//!
//! PostgreSQL repositories for jobs and job participants. Job and algorithm
//! types are stored as their lowercase names, statuses as SMALLINT codes.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::postgres::{PgPool, PgRow};
use sqlx::Row;
use uuid::Uuid;

use super::postgres_site::party_id_from_row;
use crate::domain::job::{
    FateJobInfo, Job, JobAlgorithmType, JobParticipant, JobParticipantStatus, JobStatus, JobType,
};
use crate::domain::repository::{JobParticipantRepository, JobRepository, RepositoryError};

pub struct PostgresJobRepository {
    pool: PgPool,
}

impl PostgresJobRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const JOB_COLUMNS: &str = "uuid, project_uuid, name, description, job_type, status, status_message, \
     algorithm_type, algorithm_config, model_name, predicting_model_uuid, initiating_site_uuid, \
     initiating_site_name, initiating_site_party_id, initiating_user, fate_job_id, fate_job_status, \
     fate_model_id, fate_model_version, conf, dsl, request_json, created_at, updated_at, finished_at";

fn parse_job_row(row: PgRow) -> Result<Job, RepositoryError> {
    let status: i16 = row.try_get("status")?;
    let job_type: String = row.try_get("job_type")?;
    let algorithm_type: String = row.try_get("algorithm_type")?;

    Ok(Job {
        uuid: row.try_get("uuid")?,
        project_uuid: row.try_get("project_uuid")?,
        name: row.try_get("name")?,
        description: row.try_get("description")?,
        job_type: job_type.parse::<JobType>()?,
        status: JobStatus::try_from(status)?,
        status_message: row.try_get("status_message")?,
        algorithm_type: algorithm_type.parse::<JobAlgorithmType>()?,
        algorithm_config: row.try_get("algorithm_config")?,
        model_name: row.try_get("model_name")?,
        predicting_model_uuid: row.try_get("predicting_model_uuid")?,
        initiating_site_uuid: row.try_get("initiating_site_uuid")?,
        initiating_site_name: row.try_get("initiating_site_name")?,
        initiating_site_party_id: party_id_from_row(&row, "initiating_site_party_id")?,
        initiating_user: row.try_get("initiating_user")?,
        fate: FateJobInfo {
            job_id: row.try_get("fate_job_id")?,
            job_status: row.try_get("fate_job_status")?,
            model_id: row.try_get("fate_model_id")?,
            model_version: row.try_get("fate_model_version")?,
        },
        conf: row.try_get("conf")?,
        dsl: row.try_get("dsl")?,
        request_json: row.try_get("request_json")?,
        created_at: row.try_get("created_at")?,
        updated_at: row.try_get("updated_at")?,
        finished_at: row.try_get("finished_at")?,
    })
}

#[async_trait]
impl JobRepository for PostgresJobRepository {
    async fn create(&self, job: &Job) -> Result<(), RepositoryError> {
        sqlx::query(&format!(
            "INSERT INTO jobs ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, \
             $14, $15, $16, $17, $18, $19, $20, $21, $22, $23, $24, $25)",
            JOB_COLUMNS
        ))
        .bind(job.uuid)
        .bind(job.project_uuid)
        .bind(&job.name)
        .bind(&job.description)
        .bind(job.job_type.as_str())
        .bind(job.status.as_i16())
        .bind(&job.status_message)
        .bind(job.algorithm_type.as_str())
        .bind(&job.algorithm_config)
        .bind(&job.model_name)
        .bind(job.predicting_model_uuid)
        .bind(job.initiating_site_uuid)
        .bind(&job.initiating_site_name)
        .bind(job.initiating_site_party_id as i64)
        .bind(&job.initiating_user)
        .bind(&job.fate.job_id)
        .bind(&job.fate.job_status)
        .bind(&job.fate.model_id)
        .bind(&job.fate.model_version)
        .bind(&job.conf)
        .bind(&job.dsl)
        .bind(&job.request_json)
        .bind(job.created_at)
        .bind(job.updated_at)
        .bind(job.finished_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_uuid(&self, uuid: Uuid) -> Result<Job, RepositoryError> {
        let row = sqlx::query(&format!("SELECT {} FROM jobs WHERE uuid = $1", JOB_COLUMNS))
            .bind(uuid)
            .fetch_optional(&self.pool)
            .await?;

        match row {
            Some(row) => parse_job_row(row),
            None => Err(RepositoryError::NotFound(format!("job {}", uuid))),
        }
    }

    async fn list_by_project(&self, project_uuid: Uuid) -> Result<Vec<Job>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM jobs WHERE project_uuid = $1 ORDER BY created_at ASC",
            JOB_COLUMNS
        ))
        .bind(project_uuid)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_job_row).collect()
    }

    async fn update_status_by_uuid(
        &self,
        uuid: Uuid,
        status: JobStatus,
        status_message: &str,
    ) -> Result<(), RepositoryError> {
        let now = Utc::now();
        let finished_at = status.is_finished().then_some(now);

        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET status = $2, status_message = $3, updated_at = $4,
                finished_at = COALESCE($5, finished_at)
            WHERE uuid = $1
            "#,
        )
        .bind(uuid)
        .bind(status.as_i16())
        .bind(status_message)
        .bind(now)
        .bind(finished_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("job {}", uuid)));
        }
        Ok(())
    }

    async fn update_fate_info_by_uuid(&self, uuid: Uuid, fate: &FateJobInfo) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            r#"
            UPDATE jobs
            SET fate_job_id = $2, fate_job_status = $3, fate_model_id = $4,
                fate_model_version = $5, updated_at = $6
            WHERE uuid = $1
            "#,
        )
        .bind(uuid)
        .bind(&fate.job_id)
        .bind(&fate.job_status)
        .bind(&fate.model_id)
        .bind(&fate.model_version)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("job {}", uuid)));
        }
        Ok(())
    }
}

pub struct PostgresJobParticipantRepository {
    pool: PgPool,
}

impl PostgresJobParticipantRepository {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

const JOB_PARTICIPANT_COLUMNS: &str = "uuid, job_uuid, site_uuid, site_name, site_party_id, data_uuid, \
     data_name, data_table_name, data_table_namespace, data_label_name, status";

fn parse_job_participant_row(row: PgRow) -> Result<JobParticipant, RepositoryError> {
    let status: i16 = row.try_get("status")?;
    Ok(JobParticipant {
        uuid: row.try_get("uuid")?,
        job_uuid: row.try_get("job_uuid")?,
        site_uuid: row.try_get("site_uuid")?,
        site_name: row.try_get("site_name")?,
        site_party_id: party_id_from_row(&row, "site_party_id")?,
        data_uuid: row.try_get("data_uuid")?,
        data_name: row.try_get("data_name")?,
        data_table_name: row.try_get("data_table_name")?,
        data_table_namespace: row.try_get("data_table_namespace")?,
        data_label_name: row.try_get("data_label_name")?,
        status: JobParticipantStatus::try_from(status)?,
    })
}

#[async_trait]
impl JobParticipantRepository for PostgresJobParticipantRepository {
    async fn create(&self, participant: &JobParticipant) -> Result<(), RepositoryError> {
        sqlx::query(&format!(
            "INSERT INTO job_participants ({}) VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)",
            JOB_PARTICIPANT_COLUMNS
        ))
        .bind(participant.uuid)
        .bind(participant.job_uuid)
        .bind(participant.site_uuid)
        .bind(&participant.site_name)
        .bind(participant.site_party_id as i64)
        .bind(participant.data_uuid)
        .bind(&participant.data_name)
        .bind(&participant.data_table_name)
        .bind(&participant.data_table_namespace)
        .bind(&participant.data_label_name)
        .bind(participant.status.as_i16())
        .execute(&self.pool)
        .await?;

        Ok(())
    }

    async fn get_by_job_and_site(&self, job_uuid: Uuid, site_uuid: Uuid) -> Result<JobParticipant, RepositoryError> {
        let row = sqlx::query(&format!(
            "SELECT {} FROM job_participants WHERE job_uuid = $1 AND site_uuid = $2",
            JOB_PARTICIPANT_COLUMNS
        ))
        .bind(job_uuid)
        .bind(site_uuid)
        .fetch_optional(&self.pool)
        .await?;

        match row {
            Some(row) => parse_job_participant_row(row),
            None => Err(RepositoryError::NotFound(format!(
                "job participant {}/{}",
                job_uuid, site_uuid
            ))),
        }
    }

    async fn update_status_by_uuid(&self, uuid: Uuid, status: JobParticipantStatus) -> Result<(), RepositoryError> {
        let result = sqlx::query("UPDATE job_participants SET status = $2 WHERE uuid = $1")
            .bind(uuid)
            .bind(status.as_i16())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound(format!("job participant {}", uuid)));
        }
        Ok(())
    }

    async fn list_by_job(&self, job_uuid: Uuid) -> Result<Vec<JobParticipant>, RepositoryError> {
        let rows = sqlx::query(&format!(
            "SELECT {} FROM job_participants WHERE job_uuid = $1 ORDER BY site_party_id ASC",
            JOB_PARTICIPANT_COLUMNS
        ))
        .bind(job_uuid)
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(parse_job_participant_row).collect()
    }
}
