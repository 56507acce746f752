// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod site_service;
pub mod project_service;
pub mod job_service;

pub mod fanout;
pub mod participant_sync;
pub mod federation_app;
pub mod repository_factory;

// Re-export services for convenience
pub use site_service::{SiteService, StandardSiteService};
pub use project_service::{InvitationRequest, ProjectService, StandardProjectService};
pub use job_service::{JobParticipantTarget, JobService, JobStatusUpdate, StandardJobService};
pub use fanout::{NotificationDispatcher, QueuedDispatcher, TokioDispatcher};
pub use federation_app::FederationApp;
pub use repository_factory::{create_repositories, Repositories};
