// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Project Coordination Service
//!
//! Owns the project, participant, invitation and data state machines and
//! drives the invitation handshake:
//!
//! ```text
//! (no invitation) --invite--> Created --persist & send--> Sent
//! Sent --accept--> Accepted      (participant -> Joined)
//! Sent --reject--> Rejected      (participant -> Rejected)
//! Sent --revoke--> Revoked       (participant -> Revoked)
//! ```
//!
//! Steps that must reach a peer before local state changes (invitation,
//! revocation, dismissal of the target) call the [`SitePortalClient`]
//! inline. Everything else is handed to the [`NotificationDispatcher`]
//! after the local writes.
//!
//! Callers pass every `Site` a step talks to; this service never resolves
//! site records itself.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::fanout::{dispatch_to_sites, NotificationDispatcher};
use crate::domain::federation::{
    DataAssociationMessage, DataDismissalMessage, ParticipantInfoUpdateMessage, ParticipantMembershipMessage,
    ProjectClosingMessage, ProjectInvitationMessage, ProjectParticipantsMessage, SitePortalClient,
};
use crate::domain::project::{
    DataStatus, InvitationStatus, ParticipantStatus, Project, ProjectData, ProjectError, ProjectInvitation,
    ProjectParticipant, ProjectStatus,
};
use crate::domain::repository::{
    ProjectDataRepository, ProjectInvitationRepository, ProjectParticipantRepository, ProjectRepository,
};
use crate::domain::site::Site;

/// A managing site inviting `target_site` into `project`.
#[derive(Debug, Clone)]
pub struct InvitationRequest {
    pub invitation_uuid: Uuid,
    pub project: Project,
    pub managing_site: Site,
    pub target_site: Site,
    /// Datasets the managing site bundles with the project.
    pub associated_data: Vec<ProjectData>,
}

#[async_trait]
pub trait ProjectService: Send + Sync {
    async fn handle_invitation_request(&self, request: InvitationRequest) -> Result<()>;

    /// `other_sites` are the active members to tell about the new participant.
    async fn handle_invitation_acceptance(
        &self,
        invitation_uuid: Uuid,
        managing_site: Site,
        joined_site: Site,
        other_sites: Vec<Site>,
    ) -> Result<()>;

    async fn handle_invitation_rejection(&self, invitation_uuid: Uuid, managing_site: Site) -> Result<()>;

    async fn handle_invitation_revocation(&self, invitation_uuid: Uuid, target_site: Site) -> Result<()>;

    async fn handle_participant_info_update(&self, updated_site: Site, all_sites: Vec<Site>) -> Result<()>;

    async fn handle_participant_leaving(&self, project_uuid: Uuid, site_uuid: Uuid, other_sites: Vec<Site>)
        -> Result<()>;

    async fn handle_participant_dismissal(
        &self,
        project_uuid: Uuid,
        target_site: Site,
        other_sites: Vec<Site>,
    ) -> Result<()>;

    async fn handle_data_association(&self, data: ProjectData, other_sites: Vec<Site>) -> Result<ProjectData>;

    async fn handle_data_dismissal(&self, project_uuid: Uuid, data_uuid: Uuid, other_sites: Vec<Site>) -> Result<()>;

    async fn handle_project_closing(&self, project_uuid: Uuid, other_sites: Vec<Site>) -> Result<()>;

    /// Projects `site_uuid` takes part in, each with its display status for that site.
    async fn list_project_by_participant(&self, site_uuid: Uuid) -> Result<Vec<Project>>;
}

pub struct StandardProjectService {
    projects: Arc<dyn ProjectRepository>,
    participants: Arc<dyn ProjectParticipantRepository>,
    invitations: Arc<dyn ProjectInvitationRepository>,
    data: Arc<dyn ProjectDataRepository>,
    portal: Arc<dyn SitePortalClient>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl StandardProjectService {
    pub fn new(
        projects: Arc<dyn ProjectRepository>,
        participants: Arc<dyn ProjectParticipantRepository>,
        invitations: Arc<dyn ProjectInvitationRepository>,
        data: Arc<dyn ProjectDataRepository>,
        portal: Arc<dyn SitePortalClient>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            projects,
            participants,
            invitations,
            data,
            portal,
            dispatcher,
        }
    }

    /// Create-or-update keyed by `(project_uuid, data_uuid)`; the stored row ends up `Associated`.
    async fn upsert_associated_data(&self, data: &ProjectData) -> Result<ProjectData> {
        match self.data.get_by_project_and_data(data.project_uuid, data.data_uuid).await {
            Ok(mut existing) => {
                existing.refresh_from(data);
                existing.associate();
                self.data
                    .update_by_uuid(&existing)
                    .await
                    .with_context(|| format!("failed to update project data {}", data.data_uuid))?;
                Ok(existing)
            }
            Err(e) if e.is_not_found() => {
                let mut row = data.clone();
                row.associate();
                self.data
                    .create(&row)
                    .await
                    .with_context(|| format!("failed to create project data {}", data.data_uuid))?;
                Ok(row)
            }
            Err(e) => Err(e).context("failed to query project data"),
        }
    }

    async fn open_project(&self, project_uuid: Uuid) -> Result<Project> {
        let project = self
            .projects
            .get_by_uuid(project_uuid)
            .await
            .with_context(|| format!("failed to load project {}", project_uuid))?;
        if project.is_closed() {
            return Err(ProjectError::Closed(project_uuid).into());
        }
        Ok(project)
    }

    async fn load_invitation(&self, invitation_uuid: Uuid) -> Result<ProjectInvitation> {
        self.invitations
            .get_by_uuid(invitation_uuid)
            .await
            .with_context(|| format!("failed to load invitation {}", invitation_uuid))
    }

    /// Loads a participant whose membership may change; the managing site's row never does.
    async fn load_member(&self, project_uuid: Uuid, site_uuid: Uuid) -> Result<ProjectParticipant> {
        let participant = self
            .participants
            .get_by_project_and_site(project_uuid, site_uuid)
            .await
            .with_context(|| format!("failed to load participant {} of project {}", site_uuid, project_uuid))?;
        let project = self
            .projects
            .get_by_uuid(project_uuid)
            .await
            .with_context(|| format!("failed to load project {}", project_uuid))?;
        if participant.status == ParticipantStatus::Owner || project.creator.managing_site_uuid == site_uuid {
            return Err(ProjectError::OwnerMembership {
                project_uuid,
                site_uuid,
            }
            .into());
        }
        Ok(participant)
    }

    /// Moves the invited site's participant row to `status`.
    async fn set_participant_status(
        &self,
        project_uuid: Uuid,
        site_uuid: Uuid,
        status: ParticipantStatus,
    ) -> Result<ProjectParticipant> {
        let mut participant = self
            .participants
            .get_by_project_and_site(project_uuid, site_uuid)
            .await
            .with_context(|| format!("failed to load participant {} of project {}", site_uuid, project_uuid))?;
        self.participants
            .update_status_by_uuid(participant.uuid, status)
            .await
            .context("failed to update participant status")?;
        participant.status = status;
        Ok(participant)
    }
}

#[async_trait]
impl ProjectService for StandardProjectService {
    async fn handle_invitation_request(&self, request: InvitationRequest) -> Result<()> {
        let InvitationRequest {
            invitation_uuid,
            mut project,
            managing_site,
            target_site,
            associated_data,
        } = request;

        if target_site.uuid == managing_site.uuid {
            return Err(ProjectError::OwnerMembership {
                project_uuid: project.uuid,
                site_uuid: target_site.uuid,
            }
            .into());
        }

        match self.projects.get_by_uuid(project.uuid).await {
            Ok(existing) if existing.is_closed() => return Err(ProjectError::Closed(project.uuid).into()),
            Ok(existing) => project = existing,
            Err(e) if e.is_not_found() => {
                project.status = ProjectStatus::Managed;
                match self.projects.create(&project).await {
                    Ok(()) => {
                        info!("Created project {} ({}) managed by {}", project.name, project.uuid, managing_site.name);
                        let owner = ProjectParticipant::new(project.uuid, &managing_site, ParticipantStatus::Owner);
                        self.participants
                            .create(&owner)
                            .await
                            .context("failed to create owner participant")?;
                        for data in &associated_data {
                            self.upsert_associated_data(data).await?;
                        }
                    }
                    Err(e) if e.is_conflict() => {
                        info!("Project {} was created concurrently, continuing: {}", project.uuid, e);
                    }
                    Err(e) => return Err(e).context("failed to create project"),
                }
            }
            Err(e) => return Err(e).context("failed to query project"),
        }

        if target_site.uuid == project.creator.managing_site_uuid {
            return Err(ProjectError::OwnerMembership {
                project_uuid: project.uuid,
                site_uuid: target_site.uuid,
            }
            .into());
        }

        let existing = match self.participants.get_by_project_and_site(project.uuid, target_site.uuid).await {
            Ok(existing) => Some(existing),
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e).context("failed to query invited participant"),
        };
        match existing.as_ref().map(|p| p.status) {
            Some(ParticipantStatus::Owner) => {
                return Err(ProjectError::OwnerMembership {
                    project_uuid: project.uuid,
                    site_uuid: target_site.uuid,
                }
                .into())
            }
            Some(ParticipantStatus::Joined) => {
                return Err(ProjectError::AlreadyJoined {
                    project_uuid: project.uuid,
                    site_uuid: target_site.uuid,
                }
                .into())
            }
            _ => {}
        }

        // A `Created` invitation never reached the target and may be reissued.
        match self
            .invitations
            .get_latest_by_project_and_site(project.uuid, target_site.uuid)
            .await
        {
            Ok(latest) if latest.status == InvitationStatus::Sent => {
                return Err(ProjectError::InvitationOutstanding {
                    invitation_uuid: latest.uuid,
                    site_uuid: target_site.uuid,
                }
                .into())
            }
            Ok(_) => {}
            Err(e) if e.is_not_found() => {}
            Err(e) => return Err(e).context("failed to query previous invitation"),
        }

        let mut invitation = ProjectInvitation::new(invitation_uuid, project.uuid, target_site.uuid);
        self.invitations
            .create(&invitation)
            .await
            .context("failed to create invitation")?;

        match existing {
            Some(existing) => self
                .participants
                .update_status_by_uuid(existing.uuid, ParticipantStatus::Pending)
                .await
                .context("failed to update invited participant")?,
            None => self
                .participants
                .create(&ProjectParticipant::new(project.uuid, &target_site, ParticipantStatus::Pending))
                .await
                .context("failed to create invited participant")?,
        }

        let message = ProjectInvitationMessage {
            uuid: invitation.uuid,
            site_uuid: target_site.uuid,
            site_party_id: target_site.party_id,
            project_uuid: project.uuid,
            project_name: project.name.clone(),
            project_description: project.description.clone(),
            auto_approval_enabled: project.auto_approval_enabled,
            manager: project.creator.manager.clone(),
            managing_site_name: project.creator.managing_site_name.clone(),
            managing_site_party_id: project.creator.managing_site_party_id,
            managing_site_uuid: project.creator.managing_site_uuid,
            creation_time: project.created_at,
        };
        self.portal
            .send_invitation(&target_site.endpoint(), &message)
            .await
            .with_context(|| format!("failed to deliver invitation {} to site {}", invitation.uuid, target_site.name))?;

        invitation.mark_sent()?;
        self.invitations
            .update_status_by_uuid(invitation.uuid, InvitationStatus::Sent)
            .await
            .context("failed to mark invitation as sent")?;

        info!(
            "Invitation {} for project {} sent to site {}",
            invitation.uuid, project.uuid, target_site.name
        );
        Ok(())
    }

    async fn handle_invitation_acceptance(
        &self,
        invitation_uuid: Uuid,
        managing_site: Site,
        joined_site: Site,
        other_sites: Vec<Site>,
    ) -> Result<()> {
        let mut invitation = self.load_invitation(invitation_uuid).await?;
        invitation.accept()?;
        self.invitations
            .update_status_by_uuid(invitation.uuid, InvitationStatus::Accepted)
            .await
            .context("failed to mark invitation as accepted")?;

        let project_uuid = invitation.project_uuid;
        let joined = self
            .set_participant_status(project_uuid, joined_site.uuid, ParticipantStatus::Joined)
            .await?;
        info!("Site {} joined project {}", joined_site.name, project_uuid);

        dispatch_to_sites(
            self.dispatcher.as_ref(),
            &self.portal,
            "invitation acceptance",
            std::slice::from_ref(&managing_site),
            invitation_uuid,
            |client, endpoint, invitation_uuid| client.send_invitation_acceptance(endpoint, *invitation_uuid),
        );

        dispatch_to_sites(
            self.dispatcher.as_ref(),
            &self.portal,
            "new participant",
            &other_sites,
            ProjectParticipantsMessage {
                project_uuid,
                participants: vec![joined],
            },
            |client, endpoint, message| client.send_participants(endpoint, message),
        );

        // Lists are read when the task runs, not when it is queued.
        let endpoint = joined_site.endpoint();
        let participants = self.participants.clone();
        let portal = self.portal.clone();
        let target = endpoint.clone();
        self.dispatcher.dispatch(
            format!("participant list to site {} ({})", joined_site.name, endpoint),
            Box::pin(async move {
                let participants = participants
                    .list_by_project(project_uuid)
                    .await
                    .context("failed to list participants")?;
                portal
                    .send_participants(&target, &ProjectParticipantsMessage { project_uuid, participants })
                    .await?;
                Ok(())
            }),
        );

        let data = self.data.clone();
        let portal = self.portal.clone();
        let target = endpoint.clone();
        self.dispatcher.dispatch(
            format!("associated data list to site {} ({})", joined_site.name, endpoint),
            Box::pin(async move {
                let associated: Vec<ProjectData> = data
                    .list_by_project(project_uuid)
                    .await
                    .context("failed to list project data")?
                    .into_iter()
                    .filter(|d| d.status == DataStatus::Associated)
                    .collect();
                if associated.is_empty() {
                    return Ok(());
                }
                portal
                    .send_data_association(
                        &target,
                        &DataAssociationMessage {
                            project_uuid,
                            data: associated,
                        },
                    )
                    .await?;
                Ok(())
            }),
        );

        Ok(())
    }

    async fn handle_invitation_rejection(&self, invitation_uuid: Uuid, managing_site: Site) -> Result<()> {
        let mut invitation = self.load_invitation(invitation_uuid).await?;
        invitation.reject()?;
        self.invitations
            .update_status_by_uuid(invitation.uuid, InvitationStatus::Rejected)
            .await
            .context("failed to mark invitation as rejected")?;
        self.set_participant_status(invitation.project_uuid, invitation.site_uuid, ParticipantStatus::Rejected)
            .await?;
        info!("Invitation {} rejected", invitation_uuid);

        dispatch_to_sites(
            self.dispatcher.as_ref(),
            &self.portal,
            "invitation rejection",
            std::slice::from_ref(&managing_site),
            invitation_uuid,
            |client, endpoint, invitation_uuid| client.send_invitation_rejection(endpoint, *invitation_uuid),
        );
        Ok(())
    }

    async fn handle_invitation_revocation(&self, invitation_uuid: Uuid, target_site: Site) -> Result<()> {
        let mut invitation = self.load_invitation(invitation_uuid).await?;
        invitation.ensure_transition(InvitationStatus::Revoked)?;

        self.portal
            .send_invitation_revocation(&target_site.endpoint(), invitation_uuid)
            .await
            .with_context(|| format!("failed to deliver revocation to site {}", target_site.name))?;

        invitation.revoke()?;
        self.invitations
            .update_status_by_uuid(invitation.uuid, InvitationStatus::Revoked)
            .await
            .context("failed to mark invitation as revoked")?;
        self.set_participant_status(invitation.project_uuid, invitation.site_uuid, ParticipantStatus::Revoked)
            .await?;
        info!("Invitation {} revoked", invitation_uuid);
        Ok(())
    }

    async fn handle_participant_info_update(&self, updated_site: Site, all_sites: Vec<Site>) -> Result<()> {
        let info = updated_site.info();
        self.projects
            .update_managing_site_info_by_site_uuid(updated_site.uuid, &info)
            .await
            .context("failed to update managing site info")?;
        self.participants
            .update_site_info_by_site_uuid(updated_site.uuid, &info)
            .await
            .context("failed to update participant site info")?;
        self.data
            .update_site_info_by_site_uuid(updated_site.uuid, &info)
            .await
            .context("failed to update project data site info")?;

        let others: Vec<Site> = all_sites.into_iter().filter(|s| s.uuid != updated_site.uuid).collect();
        debug!(
            "Propagating info of site {} to {} other sites",
            updated_site.name,
            others.len()
        );
        dispatch_to_sites(
            self.dispatcher.as_ref(),
            &self.portal,
            "participant info update",
            &others,
            ParticipantInfoUpdateMessage {
                uuid: updated_site.uuid,
                party_id: info.party_id,
                name: info.name,
                description: info.description,
            },
            |client, endpoint, message| client.send_participant_info_update(endpoint, message),
        );
        Ok(())
    }

    async fn handle_participant_leaving(
        &self,
        project_uuid: Uuid,
        site_uuid: Uuid,
        other_sites: Vec<Site>,
    ) -> Result<()> {
        let participant = self.load_member(project_uuid, site_uuid).await?;
        self.participants
            .update_status_by_uuid(participant.uuid, ParticipantStatus::Left)
            .await
            .context("failed to mark participant as left")?;
        info!("Site {} left project {}", site_uuid, project_uuid);

        dispatch_to_sites(
            self.dispatcher.as_ref(),
            &self.portal,
            "participant leaving",
            &other_sites,
            ParticipantMembershipMessage {
                project_uuid,
                site_uuid,
            },
            |client, endpoint, message| client.send_participant_leaving(endpoint, message),
        );
        Ok(())
    }

    async fn handle_participant_dismissal(
        &self,
        project_uuid: Uuid,
        target_site: Site,
        other_sites: Vec<Site>,
    ) -> Result<()> {
        let participant = self.load_member(project_uuid, target_site.uuid).await?;

        let message = ParticipantMembershipMessage {
            project_uuid,
            site_uuid: target_site.uuid,
        };
        self.portal
            .send_participant_dismissal(&target_site.endpoint(), &message)
            .await
            .with_context(|| format!("failed to deliver dismissal to site {}", target_site.name))?;

        let rows = self
            .data
            .list_by_project(project_uuid)
            .await
            .context("failed to list project data")?;
        for mut row in rows
            .into_iter()
            .filter(|d| d.site_uuid == target_site.uuid && d.status == DataStatus::Associated)
        {
            row.dismiss()?;
            self.data
                .update_status_by_uuid(row.uuid, DataStatus::Dismissed)
                .await
                .with_context(|| format!("failed to dismiss project data {}", row.data_uuid))?;
        }

        self.participants
            .update_status_by_uuid(participant.uuid, ParticipantStatus::Dismissed)
            .await
            .context("failed to mark participant as dismissed")?;
        info!("Site {} dismissed from project {}", target_site.name, project_uuid);

        dispatch_to_sites(
            self.dispatcher.as_ref(),
            &self.portal,
            "participant dismissal",
            &other_sites,
            message,
            |client, endpoint, message| client.send_participant_dismissal(endpoint, message),
        );
        Ok(())
    }

    async fn handle_data_association(&self, data: ProjectData, other_sites: Vec<Site>) -> Result<ProjectData> {
        self.open_project(data.project_uuid).await?;
        let stored = self.upsert_associated_data(&data).await?;
        info!(
            "Data {} of site {} associated with project {}",
            stored.data_uuid, stored.site_name, stored.project_uuid
        );

        let recipients: Vec<Site> = other_sites.into_iter().filter(|s| s.uuid != stored.site_uuid).collect();
        dispatch_to_sites(
            self.dispatcher.as_ref(),
            &self.portal,
            "data association",
            &recipients,
            DataAssociationMessage {
                project_uuid: stored.project_uuid,
                data: vec![stored.clone()],
            },
            |client, endpoint, message| client.send_data_association(endpoint, message),
        );
        Ok(stored)
    }

    async fn handle_data_dismissal(&self, project_uuid: Uuid, data_uuid: Uuid, other_sites: Vec<Site>) -> Result<()> {
        let mut row = self
            .data
            .get_by_project_and_data(project_uuid, data_uuid)
            .await
            .with_context(|| format!("failed to load project data {}", data_uuid))?;
        let already_dismissed = row.status == DataStatus::Dismissed;
        row.dismiss()?;
        if already_dismissed {
            debug!("Data {} of project {} already dismissed", data_uuid, project_uuid);
        } else {
            self.data
                .update_status_by_uuid(row.uuid, DataStatus::Dismissed)
                .await
                .context("failed to dismiss project data")?;
            info!("Data {} dismissed from project {}", data_uuid, project_uuid);
        }

        let recipients: Vec<Site> = other_sites.into_iter().filter(|s| s.uuid != row.site_uuid).collect();
        dispatch_to_sites(
            self.dispatcher.as_ref(),
            &self.portal,
            "data dismissal",
            &recipients,
            DataDismissalMessage {
                project_uuid,
                data_uuids: vec![data_uuid],
            },
            |client, endpoint, message| client.send_data_dismissal(endpoint, message),
        );
        Ok(())
    }

    async fn handle_project_closing(&self, project_uuid: Uuid, other_sites: Vec<Site>) -> Result<()> {
        let project = self
            .projects
            .get_by_uuid(project_uuid)
            .await
            .with_context(|| format!("failed to load project {}", project_uuid))?;
        if project.is_closed() {
            debug!("Project {} already closed", project_uuid);
        } else {
            self.projects
                .update_status_by_uuid(project_uuid, ProjectStatus::Closed)
                .await
                .context("failed to close project")?;
            info!("Project {} ({}) closed", project.name, project_uuid);
        }

        dispatch_to_sites(
            self.dispatcher.as_ref(),
            &self.portal,
            "project closing",
            &other_sites,
            ProjectClosingMessage { project_uuid },
            |client, endpoint, message| client.send_project_closing(endpoint, message),
        );
        Ok(())
    }

    async fn list_project_by_participant(&self, site_uuid: Uuid) -> Result<Vec<Project>> {
        let memberships = self
            .participants
            .list_by_site(site_uuid)
            .await
            .context("failed to list participant records")?;

        let mut projects = Vec::with_capacity(memberships.len());
        for membership in memberships {
            let mut project = match self.projects.get_by_uuid(membership.project_uuid).await {
                Ok(project) => project,
                Err(e) if e.is_not_found() => {
                    warn!(
                        "Participant {} refers to missing project {}",
                        membership.uuid, membership.project_uuid
                    );
                    continue;
                }
                Err(e) => return Err(e).context("failed to load project"),
            };
            project.status = project.display_status_for(membership.status);
            projects.push(project);
        }
        Ok(projects)
    }
}

/// Sites currently taking part in a project, i.e. with an `Owner` or `Joined` row.
pub fn active_member_uuids(participants: &[ProjectParticipant]) -> Vec<Uuid> {
    participants
        .iter()
        .filter(|p| p.status.is_active_member())
        .map(|p| p.site_uuid)
        .collect()
}

/// Builds an `Associated` data row attributed to `site`.
pub fn new_project_data(
    project_uuid: Uuid,
    data_uuid: Uuid,
    site: &Site,
    name: String,
    description: String,
    table_name: String,
    table_namespace: String,
) -> ProjectData {
    let now = Utc::now();
    ProjectData {
        uuid: Uuid::new_v4(),
        project_uuid,
        data_uuid,
        site_uuid: site.uuid,
        site_name: site.name.clone(),
        site_party_id: site.party_id,
        name,
        description,
        table_name,
        table_namespace,
        status: DataStatus::Associated,
        creation_time: now,
        update_time: now,
    }
}
