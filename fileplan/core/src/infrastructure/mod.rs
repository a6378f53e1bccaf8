// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Infrastructure
//!
//! In-memory collaborators (node store, transactions, permissions), the event
//! bus and logging setup.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure Layer

pub mod event_bus;
pub mod permission;
pub mod repositories;
pub mod telemetry;
pub mod transaction;
