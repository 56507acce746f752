// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::site::Site;

/// Site registry events, consumed by the participant-info sync listener.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum FederationEvent {
    SiteRegistered {
        site: Site,
        registered_at: DateTime<Utc>,
    },
    SiteUnregistered {
        site_uuid: Uuid,
        unregistered_at: DateTime<Utc>,
    },
}

impl FederationEvent {
    pub fn site_uuid(&self) -> Uuid {
        match self {
            Self::SiteRegistered { site, .. } => site.uuid,
            Self::SiteUnregistered { site_uuid, .. } => *site_uuid,
        }
    }
}
