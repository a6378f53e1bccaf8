// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Security Domain
//!
//! Principals, three-valued access decisions, base permissions, reference
//! counted extended authorities and the directive language parsed from method
//! security configuration.

pub mod capability;
pub mod directive;
pub mod extended;
pub mod permission;
pub mod principal;

pub use capability::{AccessDecision, DecisionKey, Permission};
pub use directive::{AfterDirective, PolicyKind, SecurityDirective};
pub use extended::ExtendedAuthorities;
pub use permission::PermissionService;
pub use principal::{Principal, SecurityContext};

use thiserror::Error;

use crate::domain::disposition::DispositionError;
use crate::domain::repository::RepositoryError;
use crate::domain::transaction::RetryableError;

#[derive(Debug, Error)]
pub enum SecurityError {
    #[error("Access denied: {reason}")]
    AccessDenied {
        reason: String,
        /// Capability report attached when debug reporting is active
        report: Option<String>,
    },

    #[error("Invalid security directive '{0}'")]
    InvalidDirective(String),

    #[error("Unknown capability: {0}")]
    UnknownCapability(String),

    #[error(transparent)]
    Disposition(#[from] DispositionError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl SecurityError {
    pub fn access_denied(reason: impl Into<String>) -> Self {
        SecurityError::AccessDenied {
            reason: reason.into(),
            report: None,
        }
    }
}

impl RetryableError for SecurityError {
    fn is_retryable(&self) -> bool {
        match self {
            SecurityError::Repository(e) => e.is_retryable(),
            SecurityError::Disposition(e) => e.is_retryable(),
            _ => false,
        }
    }
}
