// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Broker server: service wiring and the HTTP listener

use anyhow::{Context, Result};
use metrics_exporter_prometheus::PrometheusBuilder;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};

use fedlcm_broker_core::{
    application::{
        create_repositories, participant_sync::spawn_participant_info_sync, FederationApp, NotificationDispatcher,
        ProjectService, StandardJobService, StandardProjectService, StandardSiteService, TokioDispatcher,
    },
    domain::{broker_config::BrokerConfigManifest, federation::SitePortalClient},
    infrastructure::{event_bus::EventBus, HttpSitePortalClient},
    presentation::api,
};

pub async fn run(config: BrokerConfigManifest) -> Result<()> {
    config.validate().context("Configuration validation failed")?;
    let spec = &config.spec;
    info!("Starting broker '{}'", config.metadata.name);

    if let Some(port) = spec.observability.metrics_port {
        let addr = SocketAddr::from(([0, 0, 0, 0], port));
        PrometheusBuilder::new()
            .with_http_listener(addr)
            .install()
            .context("Failed to install Prometheus exporter")?;
        info!("Prometheus metrics exposed on {}", addr);
    }

    let backend = spec.database.storage_backend()?;
    let repositories = create_repositories(&backend)
        .await
        .context("Failed to initialize repositories")?;

    let portal: Arc<dyn SitePortalClient> = Arc::new(
        HttpSitePortalClient::new(spec.peer_client.clone()).context("Failed to initialize site portal client")?,
    );
    let dispatcher: Arc<dyn NotificationDispatcher> = Arc::new(TokioDispatcher::new(spec.fanout.max_in_flight));
    let event_bus = EventBus::with_default_capacity();

    let site_service = Arc::new(StandardSiteService::new(
        repositories.sites.clone(),
        portal.clone(),
        event_bus.clone(),
    ));
    let project_service: Arc<dyn ProjectService> = Arc::new(StandardProjectService::new(
        repositories.projects.clone(),
        repositories.participants.clone(),
        repositories.invitations.clone(),
        repositories.data.clone(),
        portal.clone(),
        dispatcher.clone(),
    ));
    let job_service = Arc::new(StandardJobService::new(
        repositories.jobs.clone(),
        repositories.job_participants.clone(),
        portal,
        dispatcher,
    ));

    let sync = spawn_participant_info_sync(&event_bus, project_service.clone(), repositories.sites.clone());

    let federation = Arc::new(FederationApp::new(repositories, site_service, project_service, job_service));
    let app = api::app(federation);

    let addr = format!("{}:{}", spec.server.bind_address, spec.server.port);
    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    info!("Broker listening on {}", addr);

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    sync.abort();
    info!("Broker shutting down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to install Ctrl+C handler: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C signal");
        },
        _ = terminate => {
            info!("Received SIGTERM signal");
        },
    }
}
