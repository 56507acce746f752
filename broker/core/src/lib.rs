// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # fedlcm-broker-core
//!
//! Federation coordination broker: the site registry, the project
//! invitation/membership/data state machines, and the job
//! creation/approval/status protocol that every site runs identically.
//!
//! # Architecture
//!
//! - **domain:** records, state machines, repository and peer-client ports
//! - **application:** coordination services, fan-out dispatcher, façade
//! - **infrastructure:** in-memory and PostgreSQL repositories, event bus, HTTP portal client
//! - **presentation:** Axum router over the façade

pub mod domain;
pub mod application;
pub mod infrastructure;
pub mod presentation;

pub use domain::*;
