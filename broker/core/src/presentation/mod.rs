// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Presentation Layer
//!
//! HTTP surface that translates requests from peer portals and the local UI
//! into [`crate::application::FederationApp`] calls. No coordination logic
//! lives here.

pub mod api;
