// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::Utc;
use mockito::{Matcher, Server};
use serde_json::json;
use uuid::Uuid;

use fedlcm_broker_core::domain::broker_config::PeerClientConfig;
use fedlcm_broker_core::domain::federation::{
    PortalClientError, ProjectClosingMessage, ProjectInvitationMessage, ProjectParticipantsMessage, SitePortalClient,
};
use fedlcm_broker_core::domain::project::{ParticipantStatus, ProjectParticipant};
use fedlcm_broker_core::domain::site::SiteEndpoint;
use fedlcm_broker_core::infrastructure::HttpSitePortalClient;

fn client(max_attempts: u32) -> HttpSitePortalClient {
    let config = PeerClientConfig {
        max_attempts,
        retry_delay_ms: 5,
        timeout_secs: 5,
        tls: None,
    };
    HttpSitePortalClient::new(config).unwrap()
}

fn endpoint(server: &Server) -> SiteEndpoint {
    let address = server.host_with_port();
    let (host, port) = address.rsplit_once(':').unwrap();
    SiteEndpoint {
        host: host.to_string(),
        port: port.parse().unwrap(),
        https: false,
        server_name: String::new(),
    }
}

#[tokio::test]
async fn test_liveness_probe() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("GET", "/api/v1/status")
        .with_status(200)
        .create_async()
        .await;

    client(1).check_liveness(&endpoint(&server)).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_invitation_is_posted_as_json() {
    let mut server = Server::new_async().await;
    let invitation = ProjectInvitationMessage {
        uuid: Uuid::new_v4(),
        site_uuid: Uuid::new_v4(),
        site_party_id: 20,
        project_uuid: Uuid::new_v4(),
        project_name: "P1".to_string(),
        project_description: "joint model".to_string(),
        auto_approval_enabled: false,
        manager: "admin".to_string(),
        managing_site_name: "site-a".to_string(),
        managing_site_party_id: 10,
        managing_site_uuid: Uuid::new_v4(),
        creation_time: Utc::now(),
    };
    let mock = server
        .mock("POST", "/api/v1/project/internal/invitation")
        .match_header("content-type", "application/json")
        .match_body(Matcher::PartialJson(json!({
            "uuid": invitation.uuid,
            "project_name": "P1",
            "site_party_id": 20,
        })))
        .with_status(200)
        .create_async()
        .await;

    client(1)
        .send_invitation(&endpoint(&server), &invitation)
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_participants_are_posted_under_project_path() {
    let mut server = Server::new_async().await;
    let project_uuid = Uuid::new_v4();
    let participant = ProjectParticipant {
        uuid: Uuid::new_v4(),
        project_uuid,
        site_uuid: Uuid::new_v4(),
        site_name: "site-b".to_string(),
        site_party_id: 20,
        site_description: String::new(),
        status: ParticipantStatus::Joined,
    };
    let path = format!("/api/v1/project/internal/{}/participants", project_uuid);
    let mock = server
        .mock("POST", path.as_str())
        .match_body(Matcher::PartialJson(json!([{ "site_name": "site-b", "status": "Joined" }])))
        .with_status(200)
        .create_async()
        .await;

    client(1)
        .send_participants(
            &endpoint(&server),
            &ProjectParticipantsMessage {
                project_uuid,
                participants: vec![participant],
            },
        )
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_job_creation_body_is_forwarded_verbatim() {
    let mut server = Server::new_async().await;
    let raw = "{\"uuid\":\"7c1f\",  \"extra\": [1, 2, 3]}";
    let mock = server
        .mock("POST", "/api/v1/job/internal/create")
        .match_body(Matcher::Exact(raw.to_string()))
        .with_status(200)
        .create_async()
        .await;

    client(1).send_job_creation(&endpoint(&server), raw).await.unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_failed_delivery_is_retried_then_reported() {
    let mut server = Server::new_async().await;
    let invitation_uuid = Uuid::new_v4();
    let path = format!("/api/v1/project/internal/invitation/{}/revoke", invitation_uuid);
    let mock = server
        .mock("POST", path.as_str())
        .with_status(503)
        .with_body("portal restarting")
        .expect(3)
        .create_async()
        .await;

    let err = client(3)
        .send_invitation_revocation(&endpoint(&server), invitation_uuid)
        .await
        .unwrap_err();
    match err {
        PortalClientError::Status { status, body, .. } => {
            assert_eq!(status, 503);
            assert_eq!(body, "portal restarting");
        }
        other => panic!("unexpected error: {:?}", other),
    }
    mock.assert_async().await;
}

#[tokio::test]
async fn test_retry_stops_at_first_success() {
    let mut server = Server::new_async().await;
    let project_uuid = Uuid::new_v4();
    let path = format!("/api/v1/project/internal/{}/close", project_uuid);
    let mock = server
        .mock("POST", path.as_str())
        .with_status(200)
        .expect(1)
        .create_async()
        .await;

    client(3)
        .send_project_closing(
            &endpoint(&server),
            &ProjectClosingMessage { project_uuid },
        )
        .await
        .unwrap();
    mock.assert_async().await;
}

#[tokio::test]
async fn test_unreachable_portal_is_a_transport_error() {
    let endpoint = SiteEndpoint {
        host: "127.0.0.1".to_string(),
        port: 1,
        https: false,
        server_name: String::new(),
    };
    let err = client(1).check_liveness(&endpoint).await.unwrap_err();
    assert!(matches!(err, PortalClientError::Transport { .. }));
}
