// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Records management core.
//!
//! Retention and disposition lifecycles for records filed in a file plan, and
//! the capability voting engine that guards every read and write of the same
//! node graph.
//!
//! # Architecture
//!
//! - **Layer:** Core System

pub mod application;
pub mod domain;
pub mod infrastructure;

pub use domain::*;
