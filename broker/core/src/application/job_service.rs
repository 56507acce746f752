// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Job Coordination Service
//!
//! Job creation, per-participant approval, and status propagation. The
//! initiating site drives job status; this service applies whatever it
//! reports when it differs from what is stored.

use anyhow::{Context, Result};
use async_trait::async_trait;
use futures::future::join_all;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::application::fanout::{dispatch_to_sites, NotificationDispatcher};
use crate::domain::federation::{JobApprovalMessage, JobStatusUpdateMessage, SitePortalClient};
use crate::domain::job::{Job, JobError, JobParticipant, JobParticipantStatus};
use crate::domain::repository::{JobParticipantRepository, JobRepository};
use crate::domain::site::Site;

/// One participating site of a new job together with its registry record.
#[derive(Debug, Clone)]
pub struct JobParticipantTarget {
    pub participant: JobParticipant,
    pub site: Site,
}

/// A status report from the initiating site.
#[derive(Debug, Clone)]
pub struct JobStatusUpdate {
    pub update: JobStatusUpdateMessage,
    /// The report exactly as received; echoed to participant sites.
    pub raw_json: String,
}

#[async_trait]
pub trait JobService: Send + Sync {
    /// Persists the job and its participants, then forwards `job.request_json`
    /// to every participant other than the initiator and waits for all sends.
    async fn handle_new_job_creation(&self, job: Job, participants: Vec<JobParticipantTarget>) -> Result<()>;

    async fn handle_job_approval_response(
        &self,
        response: JobApprovalMessage,
        initiating_site: Site,
        observers: Vec<Site>,
    ) -> Result<()>;

    /// `sites` maps participant site UUIDs to their registry records.
    async fn handle_job_status_update(&self, status: JobStatusUpdate, sites: HashMap<Uuid, Site>) -> Result<()>;
}

pub struct StandardJobService {
    jobs: Arc<dyn JobRepository>,
    participants: Arc<dyn JobParticipantRepository>,
    portal: Arc<dyn SitePortalClient>,
    dispatcher: Arc<dyn NotificationDispatcher>,
}

impl StandardJobService {
    pub fn new(
        jobs: Arc<dyn JobRepository>,
        participants: Arc<dyn JobParticipantRepository>,
        portal: Arc<dyn SitePortalClient>,
        dispatcher: Arc<dyn NotificationDispatcher>,
    ) -> Self {
        Self {
            jobs,
            participants,
            portal,
            dispatcher,
        }
    }
}

#[async_trait]
impl JobService for StandardJobService {
    async fn handle_new_job_creation(&self, job: Job, participants: Vec<JobParticipantTarget>) -> Result<()> {
        self.jobs
            .create(&job)
            .await
            .with_context(|| format!("failed to create job {}", job.uuid))?;

        for target in &participants {
            let mut participant = target.participant.clone();
            participant.job_uuid = job.uuid;
            participant.status = if participant.site_uuid == job.initiating_site_uuid {
                JobParticipantStatus::Approved
            } else {
                JobParticipantStatus::Pending
            };
            self.participants
                .create(&participant)
                .await
                .with_context(|| format!("failed to create participant {} of job {}", participant.site_uuid, job.uuid))?;
        }
        info!(
            "Created job {} ({}) in project {} with {} participants",
            job.name,
            job.uuid,
            job.project_uuid,
            participants.len()
        );

        let recipients: Vec<&Site> = participants
            .iter()
            .map(|t| &t.site)
            .filter(|s| s.uuid != job.initiating_site_uuid)
            .collect();

        let sends = recipients.iter().map(|site| {
            let portal = self.portal.clone();
            let endpoint = site.endpoint();
            let request_json = job.request_json.as_str();
            async move { portal.send_job_creation(&endpoint, request_json).await }
        });
        let results = join_all(sends).await;

        let failed: Vec<String> = recipients
            .iter()
            .zip(results)
            .filter_map(|(site, result)| match result {
                Ok(()) => None,
                Err(e) => {
                    warn!("Failed to send job {} to site {}: {}", job.uuid, site.name, e);
                    Some(site.name.clone())
                }
            })
            .collect();

        if !failed.is_empty() {
            return Err(JobError::CreationDeliveryFailed {
                job_uuid: job.uuid,
                sites: failed,
            }
            .into());
        }
        Ok(())
    }

    async fn handle_job_approval_response(
        &self,
        response: JobApprovalMessage,
        initiating_site: Site,
        observers: Vec<Site>,
    ) -> Result<()> {
        let participant = match self
            .participants
            .get_by_job_and_site(response.job_uuid, response.site_uuid)
            .await
        {
            Ok(participant) => participant,
            Err(e) if e.is_not_found() => {
                return Err(JobError::NotAParticipant {
                    job_uuid: response.job_uuid,
                    site_uuid: response.site_uuid,
                }
                .into())
            }
            Err(e) => return Err(e).context("failed to load job participant"),
        };

        if participant.status == JobParticipantStatus::Approved {
            debug!(
                "Site {} already approved job {}, ignoring response",
                participant.site_name, response.job_uuid
            );
            return Ok(());
        }

        let status = if response.approved {
            JobParticipantStatus::Approved
        } else {
            JobParticipantStatus::Rejected
        };
        self.participants
            .update_status_by_uuid(participant.uuid, status)
            .await
            .context("failed to update job participant status")?;
        info!(
            "Site {} responded {:?} to job {}",
            participant.site_name, status, response.job_uuid
        );

        self.portal
            .send_job_approval_response(&initiating_site.endpoint(), &response)
            .await
            .with_context(|| format!("failed to forward approval response to initiator {}", initiating_site.name))?;

        dispatch_to_sites(
            self.dispatcher.as_ref(),
            &self.portal,
            "job approval response",
            &observers,
            response,
            |client, endpoint, message| client.send_job_approval_response(endpoint, message),
        );
        Ok(())
    }

    async fn handle_job_status_update(&self, status: JobStatusUpdate, sites: HashMap<Uuid, Site>) -> Result<()> {
        let JobStatusUpdate { update, raw_json } = status;
        let job = self
            .jobs
            .get_by_uuid(update.job_uuid)
            .await
            .with_context(|| format!("failed to load job {}", update.job_uuid))?;

        let mut echo_targets = Vec::new();
        for (site_uuid, reported) in &update.participant_status_map {
            let participant = match self.participants.get_by_job_and_site(job.uuid, *site_uuid).await {
                Ok(participant) => participant,
                Err(e) => {
                    warn!(
                        "Skipping status of site {} for job {}: {}",
                        site_uuid, job.uuid, e
                    );
                    continue;
                }
            };

            if participant.status != *reported {
                if let Err(e) = self
                    .participants
                    .update_status_by_uuid(participant.uuid, *reported)
                    .await
                {
                    warn!(
                        "Failed to update status of site {} for job {}: {}",
                        participant.site_name, job.uuid, e
                    );
                    continue;
                }
            }

            match sites.get(site_uuid) {
                Some(site) => echo_targets.push(site.clone()),
                None => warn!("No registered site {} to echo job {} status to", site_uuid, job.uuid),
            }
        }

        let job_uuid = job.uuid;
        dispatch_to_sites(
            self.dispatcher.as_ref(),
            &self.portal,
            "job status update",
            &echo_targets,
            raw_json,
            move |client, endpoint, raw_json| client.send_job_status_update(endpoint, job_uuid, raw_json),
        );

        if job.status_differs(update.status, &update.status_message) {
            self.jobs
                .update_status_by_uuid(job.uuid, update.status, &update.status_message)
                .await
                .context("failed to update job status")?;
            info!("Job {} is now {:?}", job.uuid, update.status);
        }

        if job.fate_info_needs_write(&update.fate) {
            self.jobs
                .update_fate_info_by_uuid(job.uuid, &update.fate)
                .await
                .context("failed to update FATE job info")?;
        }
        Ok(())
    }
}
