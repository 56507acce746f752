// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Job Aggregates
//!
//! A [`Job`] is one cross-site computation run inside a project. It is created
//! by the initiating site and mirrored by every participant; one
//! [`JobParticipant`] row per participating site records that site's approval.
//! The participant set is fixed at creation time.
//!
//! Job status is driven entirely by execution reports from the initiating
//! site (`Pending → {Rejected | Running} → {Failed | Succeeded}`); the only
//! local rule is "apply if different".

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobStatus {
    Unknown,
    Pending,
    Rejected,
    Running,
    Failed,
    Succeeded,
}

impl JobStatus {
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Rejected | Self::Failed | Self::Succeeded)
    }

    pub fn as_i16(&self) -> i16 {
        match self {
            Self::Unknown => 0,
            Self::Pending => 1,
            Self::Rejected => 2,
            Self::Running => 3,
            Self::Failed => 4,
            Self::Succeeded => 5,
        }
    }
}

impl TryFrom<i16> for JobStatus {
    type Error = JobError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::Unknown,
            1 => Self::Pending,
            2 => Self::Rejected,
            3 => Self::Running,
            4 => Self::Failed,
            5 => Self::Succeeded,
            other => return Err(JobError::UnknownStatusCode("job", other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum JobParticipantStatus {
    Unknown,
    Pending,
    Approved,
    Rejected,
}

impl JobParticipantStatus {
    pub fn as_i16(&self) -> i16 {
        match self {
            Self::Unknown => 0,
            Self::Pending => 1,
            Self::Approved => 2,
            Self::Rejected => 3,
        }
    }
}

impl TryFrom<i16> for JobParticipantStatus {
    type Error = JobError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::Unknown,
            1 => Self::Pending,
            2 => Self::Approved,
            3 => Self::Rejected,
            other => return Err(JobError::UnknownStatusCode("job participant", other)),
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobType {
    Unknown,
    Modeling,
    Predicting,
    Psi,
}

impl JobType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::Modeling => "modeling",
            Self::Predicting => "predicting",
            Self::Psi => "psi",
        }
    }
}

impl FromStr for JobType {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "modeling" => Ok(Self::Modeling),
            "predicting" => Ok(Self::Predicting),
            "psi" => Ok(Self::Psi),
            other => Err(JobError::UnknownVariant("job type", other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobAlgorithmType {
    Unknown,
    HomoLr,
    HomoSbt,
}

impl JobAlgorithmType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unknown => "unknown",
            Self::HomoLr => "homo_lr",
            Self::HomoSbt => "homo_sbt",
        }
    }
}

impl FromStr for JobAlgorithmType {
    type Err = JobError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "unknown" => Ok(Self::Unknown),
            "homo_lr" => Ok(Self::HomoLr),
            "homo_sbt" => Ok(Self::HomoSbt),
            other => Err(JobError::UnknownVariant("algorithm type", other.to_string())),
        }
    }
}

/// Execution details reported by the FATE cluster running the job.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FateJobInfo {
    #[serde(default)]
    pub job_id: String,
    #[serde(default)]
    pub job_status: String,
    #[serde(default)]
    pub model_id: String,
    #[serde(default)]
    pub model_version: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Job {
    pub uuid: Uuid,
    pub project_uuid: Uuid,
    pub name: String,
    pub description: String,
    pub job_type: JobType,
    pub status: JobStatus,
    pub status_message: String,
    pub algorithm_type: JobAlgorithmType,
    pub algorithm_config: String,
    pub model_name: String,
    pub predicting_model_uuid: Option<Uuid>,
    pub initiating_site_uuid: Uuid,
    pub initiating_site_name: String,
    pub initiating_site_party_id: u32,
    pub initiating_user: String,
    pub fate: FateJobInfo,
    pub conf: String,
    pub dsl: String,
    /// The creation request exactly as the initiator sent it; forwarded verbatim.
    pub request_json: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl Job {
    pub fn status_differs(&self, status: JobStatus, message: &str) -> bool {
        self.status != status || self.status_message != message
    }

    /// Minimal-write rule for FATE execution fields under repeated polling.
    pub fn fate_info_needs_write(&self, reported: &FateJobInfo) -> bool {
        self.fate.job_id.is_empty() || self.fate.job_status != reported.job_status
    }
}

/// One participating site's view of a job.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobParticipant {
    pub uuid: Uuid,
    pub job_uuid: Uuid,
    pub site_uuid: Uuid,
    pub site_name: String,
    pub site_party_id: u32,
    pub data_uuid: Uuid,
    pub data_name: String,
    pub data_table_name: String,
    pub data_table_namespace: String,
    pub data_label_name: String,
    pub status: JobParticipantStatus,
}

#[derive(Debug, Error)]
pub enum JobError {
    #[error("job {job_uuid} was persisted but the creation request could not be delivered to: {}", sites.join(", "))]
    CreationDeliveryFailed { job_uuid: Uuid, sites: Vec<String> },

    #[error("site {site_uuid} does not participate in job {job_uuid}")]
    NotAParticipant { job_uuid: Uuid, site_uuid: Uuid },

    #[error("unknown {0} status code {1}")]
    UnknownStatusCode(&'static str, i16),

    #[error("unknown {0} '{1}'")]
    UnknownVariant(&'static str, String),
}
