// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Participant info sync listener.
//!
//! Turns `SiteRegistered` events into participant-info updates so a site's
//! new name, party id and description reach every project record and peer.

use std::sync::Arc;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::application::project_service::ProjectService;
use crate::domain::events::FederationEvent;
use crate::domain::repository::SiteRepository;
use crate::domain::site::Site;
use crate::infrastructure::event_bus::{EventBus, EventBusError};

pub fn spawn_participant_info_sync(
    event_bus: &EventBus,
    project_service: Arc<dyn ProjectService>,
    sites: Arc<dyn SiteRepository>,
) -> JoinHandle<()> {
    let mut receiver = event_bus.subscribe();
    tokio::spawn(async move {
        info!("Participant info sync listener started");
        loop {
            match receiver.recv().await {
                Ok(FederationEvent::SiteRegistered { site, .. }) => {
                    sync_site(project_service.as_ref(), sites.as_ref(), site).await;
                }
                Ok(FederationEvent::SiteUnregistered { site_uuid, .. }) => {
                    debug!("Site {} unregistered, nothing to propagate", site_uuid);
                }
                Err(EventBusError::Lagged(_)) | Err(EventBusError::Empty) => continue,
                Err(EventBusError::Closed) => break,
            }
        }
        info!("Participant info sync listener stopped");
    })
}

async fn sync_site(project_service: &dyn ProjectService, sites: &dyn SiteRepository, site: Site) {
    let all_sites = match sites.list().await {
        Ok(all_sites) => all_sites,
        Err(e) => {
            error!("Failed to list sites for info update of {}: {}", site.name, e);
            return;
        }
    };

    let name = site.name.clone();
    if let Err(e) = project_service.handle_participant_info_update(site, all_sites).await {
        error!("Failed to propagate info of site {}: {:#}", name, e);
    }
}
