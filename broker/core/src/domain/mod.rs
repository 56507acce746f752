// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain layer: federation records, their state machines, and the ports
//! (repositories, site portal client) the coordination services depend on.

pub mod broker_config;
pub mod events;
pub mod federation;
pub mod job;
pub mod project;
pub mod repository;
pub mod site;
