// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Domain
//!
//! Node graph value objects, collaborator contracts (node store, transactions),
//! the disposition model and the security model.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer

pub mod config;
pub mod disposition;
pub mod events;
pub mod node;
pub mod repository;
pub mod security;
pub mod transaction;
