// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Site Aggregate
//!
//! A [`Site`] is one federation member: an independently administered portal
//! with its own party id and an externally reachable endpoint. Sites are
//! owned by the local registry and only ever replaced wholesale (re-registration)
//! or deleted.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// Registered federation member.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Site {
    pub uuid: Uuid,
    /// Unique across the registry.
    pub name: String,
    pub description: String,
    pub party_id: u32,
    pub external_host: String,
    pub external_port: u16,
    pub https: bool,
    /// TLS server name presented by the portal, used for SNI.
    pub server_name: String,
    pub last_registered_at: DateTime<Utc>,
}

/// Connection details needed to reach a site's portal.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SiteEndpoint {
    pub host: String,
    pub port: u16,
    pub https: bool,
    pub server_name: String,
}

impl std::fmt::Display for SiteEndpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let scheme = if self.https { "https" } else { "http" };
        write!(f, "{}://{}:{}", scheme, self.host, self.port)
    }
}

/// The identity fields other records copy from a site.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SiteInfo {
    pub name: String,
    pub party_id: u32,
    pub description: String,
}

impl Site {
    pub fn endpoint(&self) -> SiteEndpoint {
        SiteEndpoint {
            host: self.external_host.clone(),
            port: self.external_port,
            https: self.https,
            server_name: self.server_name.clone(),
        }
    }

    pub fn info(&self) -> SiteInfo {
        SiteInfo {
            name: self.name.clone(),
            party_id: self.party_id,
            description: self.description.clone(),
        }
    }

    /// Checks the fields a registration must carry.
    pub fn validate(&self) -> Result<(), SiteError> {
        if self.uuid.is_nil() {
            return Err(SiteError::MissingField("uuid"));
        }
        if self.name.trim().is_empty() {
            return Err(SiteError::MissingField("name"));
        }
        if self.external_host.trim().is_empty() {
            return Err(SiteError::MissingField("external_host"));
        }
        if self.external_port == 0 {
            return Err(SiteError::MissingField("external_port"));
        }
        Ok(())
    }
}

#[derive(Debug, Error)]
pub enum SiteError {
    #[error("site registration is missing required field '{0}'")]
    MissingField(&'static str),

    #[error("site {uuid} is unreachable at {endpoint}: {reason}")]
    Unreachable {
        uuid: Uuid,
        endpoint: SiteEndpoint,
        reason: String,
    },

    #[error("site name '{0}' is already registered by another site")]
    NameConflict(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    fn site() -> Site {
        Site {
            uuid: Uuid::new_v4(),
            name: "site-a".to_string(),
            description: "first site".to_string(),
            party_id: 10,
            external_host: "10.0.0.1".to_string(),
            external_port: 8443,
            https: true,
            server_name: "site-a.fedlcm.io".to_string(),
            last_registered_at: Utc::now(),
        }
    }

    #[test]
    fn test_valid_site_passes_validation() {
        assert!(site().validate().is_ok());
    }

    #[test]
    fn test_missing_fields_are_reported() {
        let mut s = site();
        s.uuid = Uuid::nil();
        assert!(matches!(s.validate(), Err(SiteError::MissingField("uuid"))));

        let mut s = site();
        s.name = "  ".to_string();
        assert!(matches!(s.validate(), Err(SiteError::MissingField("name"))));

        let mut s = site();
        s.external_host.clear();
        assert!(matches!(s.validate(), Err(SiteError::MissingField("external_host"))));

        let mut s = site();
        s.external_port = 0;
        assert!(matches!(s.validate(), Err(SiteError::MissingField("external_port"))));
    }

    #[test]
    fn test_endpoint_display() {
        let endpoint = site().endpoint();
        assert_eq!(endpoint.to_string(), "https://10.0.0.1:8443");
        assert_eq!(endpoint.server_name, "site-a.fedlcm.io");
    }
}
