// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

pub mod repositories;
pub mod db;
pub mod event_bus;
pub mod portal_client;

pub use portal_client::HttpSitePortalClient;
