// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Application Services
//!
//! Disposition lifecycle, file plan navigation, the capability voting engine
//! and the wiring that connects them.
//!
//! # Architecture
//!
//! - **Layer:** Application Layer

pub mod after_invocation;
pub mod capability_service;
pub mod disposition_service;
pub mod entry_voter;
pub mod extended_security;
pub mod file_plan;
pub mod method_security;
pub mod record_service;
pub mod runtime;
pub mod selection_strategy;
pub mod transaction_helper;
