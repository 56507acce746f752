// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
// Site Portal HTTP Client
//
// Anti-Corruption Layer for the internal API every site portal exposes to
// its federation peers. Messages are JSON POSTs; a response only counts as
// success or failure by its status code.
//
// Transport policy:
// - optional CA bundle and client identity (mutual TLS)
// - when the portal is addressed by IP over HTTPS, the request targets its
//   `server_name` and pins DNS resolution to the IP so SNI and certificate
//   verification use the server name
// - fixed-delay retry for `max_attempts`

use async_trait::async_trait;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashMap;
use std::net::{IpAddr, SocketAddr};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::domain::broker_config::PeerClientConfig;
use crate::domain::federation::{
    DataAssociationMessage, DataDismissalMessage, JobApprovalMessage, ParticipantInfoUpdateMessage,
    ParticipantMembershipMessage, PortalClientError, ProjectClosingMessage, ProjectInvitationMessage,
    ProjectParticipantsMessage, SitePortalClient,
};
use crate::domain::site::SiteEndpoint;

/// PEM material read once at construction.
#[derive(Clone, Default)]
struct TlsMaterial {
    ca_pem: Option<Vec<u8>>,
    identity_pem: Option<Vec<u8>>,
}

pub struct HttpSitePortalClient {
    config: PeerClientConfig,
    tls: TlsMaterial,
    default_client: reqwest::Client,
    /// Clients with a pinned `server_name -> ip:port` resolution, one per server name.
    /// A site seen at a new address replaces its previous entry.
    pinned_clients: Mutex<HashMap<String, (SocketAddr, reqwest::Client)>>,
}

impl HttpSitePortalClient {
    pub fn new(config: PeerClientConfig) -> Result<Self, PortalClientError> {
        let tls = Self::load_tls_material(&config)?;
        let default_client = Self::builder(&config, &tls)?
            .build()
            .map_err(|e| PortalClientError::Configuration(e.to_string()))?;

        Ok(Self {
            config,
            tls,
            default_client,
            pinned_clients: Mutex::new(HashMap::new()),
        })
    }

    fn load_tls_material(config: &PeerClientConfig) -> Result<TlsMaterial, PortalClientError> {
        let Some(tls) = &config.tls else {
            return Ok(TlsMaterial::default());
        };

        let read = |path: &std::path::Path| {
            std::fs::read(path).map_err(|e| PortalClientError::Configuration(format!("{}: {}", path.display(), e)))
        };

        let ca_pem = tls.ca_cert_path.as_deref().map(read).transpose()?;
        let identity_pem = match (&tls.client_cert_path, &tls.client_key_path) {
            (Some(cert), Some(key)) => {
                let mut pem = read(cert)?;
                pem.push(b'\n');
                pem.extend(read(key)?);
                Some(pem)
            }
            (None, None) => None,
            _ => {
                return Err(PortalClientError::Configuration(
                    "client certificate and key must be configured together".to_string(),
                ))
            }
        };

        Ok(TlsMaterial { ca_pem, identity_pem })
    }

    fn builder(config: &PeerClientConfig, tls: &TlsMaterial) -> Result<reqwest::ClientBuilder, PortalClientError> {
        let mut builder = reqwest::Client::builder().timeout(config.timeout());

        if let Some(ca) = &tls.ca_pem {
            let certificate =
                reqwest::Certificate::from_pem(ca).map_err(|e| PortalClientError::Configuration(e.to_string()))?;
            builder = builder.add_root_certificate(certificate);
        }
        if let Some(identity) = &tls.identity_pem {
            let identity =
                reqwest::Identity::from_pem(identity).map_err(|e| PortalClientError::Configuration(e.to_string()))?;
            builder = builder.identity(identity);
        }

        Ok(builder)
    }

    /// Picks the client and base URL for `endpoint`.
    fn target(&self, endpoint: &SiteEndpoint) -> Result<(reqwest::Client, String), PortalClientError> {
        let pin = endpoint.https && !endpoint.server_name.is_empty();
        let ip = endpoint.host.parse::<IpAddr>().ok().filter(|_| pin);

        let Some(ip) = ip else {
            return Ok((self.default_client.clone(), endpoint.to_string()));
        };

        let addr = SocketAddr::new(ip, endpoint.port);
        let base_url = format!("https://{}:{}", endpoint.server_name, endpoint.port);

        let mut pinned = self.pinned_clients.lock();
        if let Some((pinned_addr, client)) = pinned.get(&endpoint.server_name) {
            if *pinned_addr == addr {
                return Ok((client.clone(), base_url));
            }
            debug!("Site {} moved from {} to {}, re-pinning", endpoint.server_name, pinned_addr, addr);
        }

        let client = Self::builder(&self.config, &self.tls)?
            .resolve(&endpoint.server_name, addr)
            .build()
            .map_err(|e| PortalClientError::Configuration(e.to_string()))?;
        pinned.insert(endpoint.server_name.clone(), (addr, client.clone()));
        Ok((client, base_url))
    }

    async fn post_json<T: Serialize + Sync>(
        &self,
        endpoint: &SiteEndpoint,
        message: &'static str,
        path: &str,
        body: &T,
    ) -> Result<(), PortalClientError> {
        let body = serde_json::to_string(body).map_err(|e| PortalClientError::Serialization(e.to_string()))?;
        self.send(endpoint, message, reqwest::Method::POST, path, Some(body)).await
    }

    async fn send(
        &self,
        endpoint: &SiteEndpoint,
        message: &'static str,
        method: reqwest::Method,
        path: &str,
        body: Option<String>,
    ) -> Result<(), PortalClientError> {
        let (client, base_url) = self.target(endpoint)?;
        let url = format!("{}{}", base_url, path);
        let max_attempts = self.config.max_attempts.max(1);

        let mut last_error = None;
        for attempt in 1..=max_attempts {
            let mut request = client.request(method.clone(), &url);
            if let Some(body) = &body {
                request = request
                    .header(reqwest::header::CONTENT_TYPE, "application/json")
                    .body(body.clone());
            }

            let outcome = match request.send().await {
                Ok(response) if response.status().is_success() => Ok(()),
                Ok(response) => {
                    let status = response.status().as_u16();
                    let body = response.text().await.unwrap_or_default();
                    Err(PortalClientError::Status {
                        endpoint: endpoint.to_string(),
                        status,
                        body,
                    })
                }
                Err(e) => Err(PortalClientError::Transport {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                }),
            };

            match outcome {
                Ok(()) => {
                    debug!("Delivered {} to {} (attempt {})", message, url, attempt);
                    metrics::counter!("fedlcm_peer_messages_total", "message" => message, "outcome" => "success")
                        .increment(1);
                    return Ok(());
                }
                Err(e) => {
                    warn!(
                        "Delivering {} to {} failed (attempt {}/{}): {}",
                        message, url, attempt, max_attempts, e
                    );
                    last_error = Some(e);
                    if attempt < max_attempts {
                        tokio::time::sleep(self.config.retry_delay()).await;
                    }
                }
            }
        }

        metrics::counter!("fedlcm_peer_messages_total", "message" => message, "outcome" => "failure").increment(1);
        Err(last_error.unwrap_or_else(|| PortalClientError::Transport {
            endpoint: endpoint.to_string(),
            reason: "no attempt was made".to_string(),
        }))
    }
}

#[async_trait]
impl SitePortalClient for HttpSitePortalClient {
    async fn check_liveness(&self, endpoint: &SiteEndpoint) -> Result<(), PortalClientError> {
        self.send(endpoint, "liveness", reqwest::Method::GET, "/api/v1/status", None)
            .await
    }

    async fn send_invitation(
        &self,
        endpoint: &SiteEndpoint,
        invitation: &ProjectInvitationMessage,
    ) -> Result<(), PortalClientError> {
        self.post_json(endpoint, "invitation", "/api/v1/project/internal/invitation", invitation)
            .await
    }

    async fn send_invitation_acceptance(&self, endpoint: &SiteEndpoint, invitation_uuid: Uuid) -> Result<(), PortalClientError> {
        let path = format!("/api/v1/project/internal/invitation/{}/accept", invitation_uuid);
        self.send(endpoint, "invitation_acceptance", reqwest::Method::POST, &path, None)
            .await
    }

    async fn send_invitation_rejection(&self, endpoint: &SiteEndpoint, invitation_uuid: Uuid) -> Result<(), PortalClientError> {
        let path = format!("/api/v1/project/internal/invitation/{}/reject", invitation_uuid);
        self.send(endpoint, "invitation_rejection", reqwest::Method::POST, &path, None)
            .await
    }

    async fn send_invitation_revocation(&self, endpoint: &SiteEndpoint, invitation_uuid: Uuid) -> Result<(), PortalClientError> {
        let path = format!("/api/v1/project/internal/invitation/{}/revoke", invitation_uuid);
        self.send(endpoint, "invitation_revocation", reqwest::Method::POST, &path, None)
            .await
    }

    async fn send_participants(
        &self,
        endpoint: &SiteEndpoint,
        message: &ProjectParticipantsMessage,
    ) -> Result<(), PortalClientError> {
        let path = format!("/api/v1/project/internal/{}/participants", message.project_uuid);
        self.post_json(endpoint, "participants", &path, &message.participants)
            .await
    }

    async fn send_participant_info_update(
        &self,
        endpoint: &SiteEndpoint,
        message: &ParticipantInfoUpdateMessage,
    ) -> Result<(), PortalClientError> {
        let path = format!("/api/v1/project/internal/participant/{}/info", message.uuid);
        self.post_json(endpoint, "participant_info_update", &path, message)
            .await
    }

    async fn send_participant_leaving(
        &self,
        endpoint: &SiteEndpoint,
        message: &ParticipantMembershipMessage,
    ) -> Result<(), PortalClientError> {
        let path = format!(
            "/api/v1/project/internal/{}/participant/{}/leave",
            message.project_uuid, message.site_uuid
        );
        self.send(endpoint, "participant_leaving", reqwest::Method::POST, &path, None)
            .await
    }

    async fn send_participant_dismissal(
        &self,
        endpoint: &SiteEndpoint,
        message: &ParticipantMembershipMessage,
    ) -> Result<(), PortalClientError> {
        let path = format!(
            "/api/v1/project/internal/{}/participant/{}/dismiss",
            message.project_uuid, message.site_uuid
        );
        self.send(endpoint, "participant_dismissal", reqwest::Method::POST, &path, None)
            .await
    }

    async fn send_data_association(
        &self,
        endpoint: &SiteEndpoint,
        message: &DataAssociationMessage,
    ) -> Result<(), PortalClientError> {
        let path = format!("/api/v1/project/internal/{}/data/associate", message.project_uuid);
        self.post_json(endpoint, "data_association", &path, &message.data)
            .await
    }

    async fn send_data_dismissal(
        &self,
        endpoint: &SiteEndpoint,
        message: &DataDismissalMessage,
    ) -> Result<(), PortalClientError> {
        let path = format!("/api/v1/project/internal/{}/data/dismiss", message.project_uuid);
        self.post_json(endpoint, "data_dismissal", &path, &message.data_uuids)
            .await
    }

    async fn send_project_closing(
        &self,
        endpoint: &SiteEndpoint,
        message: &ProjectClosingMessage,
    ) -> Result<(), PortalClientError> {
        let path = format!("/api/v1/project/internal/{}/close", message.project_uuid);
        self.send(endpoint, "project_closing", reqwest::Method::POST, &path, None)
            .await
    }

    async fn send_job_creation(&self, endpoint: &SiteEndpoint, request_json: &str) -> Result<(), PortalClientError> {
        self.send(
            endpoint,
            "job_creation",
            reqwest::Method::POST,
            "/api/v1/job/internal/create",
            Some(request_json.to_string()),
        )
        .await
    }

    async fn send_job_approval_response(
        &self,
        endpoint: &SiteEndpoint,
        message: &JobApprovalMessage,
    ) -> Result<(), PortalClientError> {
        let path = format!("/api/v1/job/internal/{}/response", message.job_uuid);
        self.post_json(endpoint, "job_approval_response", &path, message)
            .await
    }

    async fn send_job_status_update(
        &self,
        endpoint: &SiteEndpoint,
        job_uuid: Uuid,
        status_json: &str,
    ) -> Result<(), PortalClientError> {
        let path = format!("/api/v1/job/internal/{}/status", job_uuid);
        self.send(
            endpoint,
            "job_status_update",
            reqwest::Method::POST,
            &path,
            Some(status_json.to_string()),
        )
        .await
    }
}
