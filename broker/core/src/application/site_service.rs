// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::events::FederationEvent;
use crate::domain::federation::SitePortalClient;
use crate::domain::repository::SiteRepository;
use crate::domain::site::{Site, SiteError};
use crate::infrastructure::event_bus::EventBus;

#[async_trait]
pub trait SiteService: Send + Sync {
    /// Full replace per UUID. The site must answer a liveness probe first.
    async fn register(&self, site: Site) -> Result<Site>;
    async fn unregister(&self, uuid: Uuid) -> Result<()>;
    async fn get(&self, uuid: Uuid) -> Result<Site>;
    async fn list(&self) -> Result<Vec<Site>>;
}

pub struct StandardSiteService {
    repository: Arc<dyn SiteRepository>,
    portal: Arc<dyn SitePortalClient>,
    event_bus: EventBus,
}

impl StandardSiteService {
    pub fn new(repository: Arc<dyn SiteRepository>, portal: Arc<dyn SitePortalClient>, event_bus: EventBus) -> Self {
        Self {
            repository,
            portal,
            event_bus,
        }
    }
}

#[async_trait]
impl SiteService for StandardSiteService {
    async fn register(&self, mut site: Site) -> Result<Site> {
        site.validate()?;

        let endpoint = site.endpoint();
        if let Err(e) = self.portal.check_liveness(&endpoint).await {
            return Err(SiteError::Unreachable {
                uuid: site.uuid,
                endpoint,
                reason: e.to_string(),
            }
            .into());
        }

        let sites = self.repository.list().await.context("failed to list sites")?;
        if sites.iter().any(|s| s.name == site.name && s.uuid != site.uuid) {
            return Err(SiteError::NameConflict(site.name.clone()).into());
        }

        let previous = match self.repository.get_by_uuid(site.uuid).await {
            Ok(existing) => {
                self.repository
                    .delete_by_uuid(existing.uuid)
                    .await
                    .context("failed to remove previous site record")?;
                Some(existing)
            }
            Err(e) if e.is_not_found() => None,
            Err(e) => return Err(e).context("failed to query site"),
        };

        site.last_registered_at = Utc::now();
        if let Err(e) = self.repository.create(&site).await {
            if let Some(previous) = previous {
                if let Err(restore) = self.repository.create(&previous).await {
                    warn!("Failed to restore previous record of site {}: {}", previous.uuid, restore);
                }
            }
            if e.is_conflict() {
                return Err(SiteError::NameConflict(site.name.clone()).into());
            }
            return Err(e).context("failed to create site");
        }
        info!("Registered site {} ({}) at {}", site.name, site.uuid, site.endpoint());

        self.event_bus.publish(FederationEvent::SiteRegistered {
            site: site.clone(),
            registered_at: site.last_registered_at,
        });
        Ok(site)
    }

    async fn unregister(&self, uuid: Uuid) -> Result<()> {
        self.repository
            .delete_by_uuid(uuid)
            .await
            .with_context(|| format!("failed to delete site {}", uuid))?;
        info!("Unregistered site {}", uuid);

        self.event_bus.publish(FederationEvent::SiteUnregistered {
            site_uuid: uuid,
            unregistered_at: Utc::now(),
        });
        Ok(())
    }

    async fn get(&self, uuid: Uuid) -> Result<Site> {
        self.repository
            .get_by_uuid(uuid)
            .await
            .with_context(|| format!("failed to load site {}", uuid))
    }

    async fn list(&self) -> Result<Vec<Site>> {
        self.repository.list().await.context("failed to list sites")
    }
}
