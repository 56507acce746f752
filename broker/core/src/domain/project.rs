// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Project Aggregates
//!
//! A project is a named collaboration among sites with exactly one managing
//! (owner) site. Four record types make up its state:
//!
//! | Type | Keyed by | Lifecycle |
//! |------|----------|-----------|
//! | [`Project`] | `uuid` | `Closed` is the only project-wide terminal state |
//! | [`ProjectParticipant`] | `(project_uuid, site_uuid)` | invitation / membership lifecycle |
//! | [`ProjectInvitation`] | `uuid`, latest per `(project_uuid, site_uuid)` | `Created → Sent → {Accepted, Rejected, Revoked}` |
//! | [`ProjectData`] | `(project_uuid, data_uuid)` | `{Unknown, Dismissed} → Associated → Dismissed` |
//!
//! Every status enum carries a stable small-integer code used by the
//! PostgreSQL repositories.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::domain::site::{Site, SiteInfo};

// ============================================================================
// Project
// ============================================================================

/// Project status as seen by one site.
///
/// Apart from `Closed` this is a view computed from the local participant
/// status, see [`ParticipantStatus::project_status`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProjectStatus {
    Unknown,
    Managed,
    Pending,
    Joined,
    Rejected,
    Left,
    Closed,
    Dismissed,
}

impl ProjectStatus {
    pub fn as_i16(&self) -> i16 {
        match self {
            Self::Unknown => 0,
            Self::Managed => 1,
            Self::Pending => 2,
            Self::Joined => 3,
            Self::Rejected => 4,
            Self::Left => 5,
            Self::Closed => 6,
            Self::Dismissed => 7,
        }
    }
}

impl TryFrom<i16> for ProjectStatus {
    type Error = ProjectError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::Unknown,
            1 => Self::Managed,
            2 => Self::Pending,
            3 => Self::Joined,
            4 => Self::Rejected,
            5 => Self::Left,
            6 => Self::Closed,
            7 => Self::Dismissed,
            other => return Err(ProjectError::UnknownStatusCode("project", other)),
        })
    }
}

/// Who created the project and which site manages it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCreatorInfo {
    pub manager: String,
    pub managing_site_name: String,
    pub managing_site_party_id: u32,
    pub managing_site_uuid: Uuid,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Project {
    pub uuid: Uuid,
    pub name: String,
    pub description: String,
    pub auto_approval_enabled: bool,
    pub status: ProjectStatus,
    pub creator: ProjectCreatorInfo,
    pub created_at: DateTime<Utc>,
}

impl Project {
    pub fn is_closed(&self) -> bool {
        self.status == ProjectStatus::Closed
    }

    /// Status reported to a participant: `Closed` wins over any membership state.
    pub fn display_status_for(&self, participant: ParticipantStatus) -> ProjectStatus {
        if self.is_closed() {
            ProjectStatus::Closed
        } else {
            participant.project_status()
        }
    }
}

// ============================================================================
// ProjectParticipant
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ParticipantStatus {
    Unknown,
    Owner,
    Pending,
    Joined,
    Rejected,
    Left,
    Dismissed,
    Revoked,
}

impl ParticipantStatus {
    /// Read-side projection of the membership state machine.
    pub fn project_status(&self) -> ProjectStatus {
        match self {
            Self::Pending => ProjectStatus::Pending,
            Self::Joined => ProjectStatus::Joined,
            Self::Dismissed | Self::Revoked => ProjectStatus::Dismissed,
            Self::Left => ProjectStatus::Left,
            Self::Rejected => ProjectStatus::Rejected,
            Self::Owner => ProjectStatus::Managed,
            Self::Unknown => ProjectStatus::Closed,
        }
    }

    /// Whether the site currently takes part in the project and receives fan-outs.
    pub fn is_active_member(&self) -> bool {
        matches!(self, Self::Owner | Self::Joined)
    }

    pub fn as_i16(&self) -> i16 {
        match self {
            Self::Unknown => 0,
            Self::Owner => 1,
            Self::Pending => 2,
            Self::Joined => 3,
            Self::Rejected => 4,
            Self::Left => 5,
            Self::Dismissed => 6,
            Self::Revoked => 7,
        }
    }
}

impl TryFrom<i16> for ParticipantStatus {
    type Error = ProjectError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::Unknown,
            1 => Self::Owner,
            2 => Self::Pending,
            3 => Self::Joined,
            4 => Self::Rejected,
            5 => Self::Left,
            6 => Self::Dismissed,
            7 => Self::Revoked,
            other => return Err(ProjectError::UnknownStatusCode("participant", other)),
        })
    }
}

/// A site's membership record within one project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectParticipant {
    pub uuid: Uuid,
    pub project_uuid: Uuid,
    pub site_uuid: Uuid,
    pub site_name: String,
    pub site_party_id: u32,
    pub site_description: String,
    pub status: ParticipantStatus,
}

impl ProjectParticipant {
    pub fn new(project_uuid: Uuid, site: &Site, status: ParticipantStatus) -> Self {
        Self {
            uuid: Uuid::new_v4(),
            project_uuid,
            site_uuid: site.uuid,
            site_name: site.name.clone(),
            site_party_id: site.party_id,
            site_description: site.description.clone(),
            status,
        }
    }

    pub fn apply_site_info(&mut self, info: &SiteInfo) {
        self.site_name = info.name.clone();
        self.site_party_id = info.party_id;
        self.site_description = info.description.clone();
    }
}

// ============================================================================
// ProjectInvitation
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum InvitationStatus {
    Created,
    Sent,
    Revoked,
    Accepted,
    Rejected,
}

impl InvitationStatus {
    pub fn can_transition_to(&self, next: InvitationStatus) -> bool {
        matches!(
            (self, next),
            (Self::Created, Self::Sent)
                | (Self::Sent, Self::Accepted)
                | (Self::Sent, Self::Rejected)
                | (Self::Sent, Self::Revoked)
        )
    }

    pub fn as_i16(&self) -> i16 {
        match self {
            Self::Created => 0,
            Self::Sent => 1,
            Self::Revoked => 2,
            Self::Accepted => 3,
            Self::Rejected => 4,
        }
    }
}

impl TryFrom<i16> for InvitationStatus {
    type Error = ProjectError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::Created,
            1 => Self::Sent,
            2 => Self::Revoked,
            3 => Self::Accepted,
            4 => Self::Rejected,
            other => return Err(ProjectError::UnknownStatusCode("invitation", other)),
        })
    }
}

/// One handshake attempt offering a site membership in a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectInvitation {
    pub uuid: Uuid,
    pub project_uuid: Uuid,
    pub site_uuid: Uuid,
    pub status: InvitationStatus,
    pub created_at: DateTime<Utc>,
}

impl ProjectInvitation {
    pub fn new(uuid: Uuid, project_uuid: Uuid, site_uuid: Uuid) -> Self {
        Self {
            uuid,
            project_uuid,
            site_uuid,
            status: InvitationStatus::Created,
            created_at: Utc::now(),
        }
    }

    /// Fails without touching `self` when `next` is not reachable from the current status.
    pub fn ensure_transition(&self, next: InvitationStatus) -> Result<(), ProjectError> {
        if self.status.can_transition_to(next) {
            Ok(())
        } else {
            Err(ProjectError::InvalidInvitationTransition {
                invitation_uuid: self.uuid,
                from: self.status,
                to: next,
            })
        }
    }

    fn transition(&mut self, next: InvitationStatus) -> Result<(), ProjectError> {
        self.ensure_transition(next)?;
        self.status = next;
        Ok(())
    }

    pub fn mark_sent(&mut self) -> Result<(), ProjectError> {
        self.transition(InvitationStatus::Sent)
    }

    pub fn accept(&mut self) -> Result<(), ProjectError> {
        self.transition(InvitationStatus::Accepted)
    }

    pub fn reject(&mut self) -> Result<(), ProjectError> {
        self.transition(InvitationStatus::Rejected)
    }

    pub fn revoke(&mut self) -> Result<(), ProjectError> {
        self.transition(InvitationStatus::Revoked)
    }
}

// ============================================================================
// ProjectData
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DataStatus {
    Unknown,
    Dismissed,
    Associated,
}

impl DataStatus {
    pub fn as_i16(&self) -> i16 {
        match self {
            Self::Unknown => 0,
            Self::Dismissed => 1,
            Self::Associated => 2,
        }
    }
}

impl TryFrom<i16> for DataStatus {
    type Error = ProjectError;

    fn try_from(code: i16) -> Result<Self, Self::Error> {
        Ok(match code {
            0 => Self::Unknown,
            1 => Self::Dismissed,
            2 => Self::Associated,
            other => return Err(ProjectError::UnknownStatusCode("data", other)),
        })
    }
}

/// A dataset a site has offered into a project.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectData {
    pub uuid: Uuid,
    pub project_uuid: Uuid,
    pub data_uuid: Uuid,
    pub site_uuid: Uuid,
    pub site_name: String,
    pub site_party_id: u32,
    pub name: String,
    pub description: String,
    pub table_name: String,
    pub table_namespace: String,
    pub status: DataStatus,
    pub creation_time: DateTime<Utc>,
    pub update_time: DateTime<Utc>,
}

impl ProjectData {
    /// Re-association of a dismissed row is allowed; associating an
    /// associated row refreshes it in place.
    pub fn associate(&mut self) {
        self.status = DataStatus::Associated;
        self.update_time = Utc::now();
    }

    /// Dismissing twice is a no-op.
    pub fn dismiss(&mut self) -> Result<(), ProjectError> {
        match self.status {
            DataStatus::Associated => {
                self.status = DataStatus::Dismissed;
                self.update_time = Utc::now();
                Ok(())
            }
            DataStatus::Dismissed => Ok(()),
            DataStatus::Unknown => Err(ProjectError::InvalidDataTransition {
                data_uuid: self.data_uuid,
                from: self.status,
                to: DataStatus::Dismissed,
            }),
        }
    }

    /// Copies the descriptive fields of `other`, keeping identity and creation time.
    pub fn refresh_from(&mut self, other: &ProjectData) {
        self.site_uuid = other.site_uuid;
        self.site_name = other.site_name.clone();
        self.site_party_id = other.site_party_id;
        self.name = other.name.clone();
        self.description = other.description.clone();
        self.table_name = other.table_name.clone();
        self.table_namespace = other.table_namespace.clone();
    }
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, Error)]
pub enum ProjectError {
    #[error("invitation {invitation_uuid} cannot move from {from:?} to {to:?}")]
    InvalidInvitationTransition {
        invitation_uuid: Uuid,
        from: InvitationStatus,
        to: InvitationStatus,
    },

    #[error("project data {data_uuid} cannot move from {from:?} to {to:?}")]
    InvalidDataTransition {
        data_uuid: Uuid,
        from: DataStatus,
        to: DataStatus,
    },

    #[error("project {0} is closed")]
    Closed(Uuid),

    #[error("site {site_uuid} manages project {project_uuid}; its owner membership cannot change")]
    OwnerMembership { project_uuid: Uuid, site_uuid: Uuid },

    #[error("site {site_uuid} already joined project {project_uuid}")]
    AlreadyJoined { project_uuid: Uuid, site_uuid: Uuid },

    #[error("invitation {invitation_uuid} to site {site_uuid} is still awaiting an answer")]
    InvitationOutstanding { invitation_uuid: Uuid, site_uuid: Uuid },

    #[error("unknown {0} status code {1}")]
    UnknownStatusCode(&'static str, i16),
}
