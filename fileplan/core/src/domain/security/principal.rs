// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};

/// Identity on whose behalf work runs
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(tag = "kind", content = "name", rename_all = "snake_case")]
pub enum Principal {
    /// Elevated identity that bypasses capability checks
    System,
    User(String),
}

impl Principal {
    pub fn user(name: impl Into<String>) -> Self {
        Principal::User(name.into())
    }

    pub fn is_system(&self) -> bool {
        matches!(self, Principal::System)
    }

    pub fn name(&self) -> &str {
        match self {
            Principal::System => "System",
            Principal::User(name) => name.as_str(),
        }
    }
}

impl std::fmt::Display for Principal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

/// The fully authenticated user plus the identity work currently runs as.
///
/// Elevating keeps the authenticated user so audit fields (completed-by,
/// started-by) can still name the person who triggered the work.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SecurityContext {
    authenticated: Principal,
    run_as: Principal,
}

impl SecurityContext {
    pub fn authenticated(user: impl Into<String>) -> Self {
        let principal = Principal::user(user);
        Self {
            authenticated: principal.clone(),
            run_as: principal,
        }
    }

    pub fn system() -> Self {
        Self {
            authenticated: Principal::System,
            run_as: Principal::System,
        }
    }

    /// Same authenticated user, running as system
    pub fn elevated(&self) -> Self {
        Self {
            authenticated: self.authenticated.clone(),
            run_as: Principal::System,
        }
    }

    pub fn run_as(&self, user: impl Into<String>) -> Self {
        Self {
            authenticated: self.authenticated.clone(),
            run_as: Principal::user(user),
        }
    }

    pub fn fully_authenticated_user(&self) -> &Principal {
        &self.authenticated
    }

    pub fn running_as(&self) -> &Principal {
        &self.run_as
    }

    pub fn is_system(&self) -> bool {
        self.run_as.is_system()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_elevation_keeps_authenticated_user() {
        let ctx = SecurityContext::authenticated("alice");
        let elevated = ctx.elevated();

        assert!(elevated.is_system());
        assert!(!ctx.is_system());
        assert_eq!(elevated.fully_authenticated_user(), &Principal::user("alice"));
    }

    #[test]
    fn test_run_as_switches_identity_only() {
        let ctx = SecurityContext::authenticated("alice").run_as("bob");

        assert_eq!(ctx.running_as().name(), "bob");
        assert_eq!(ctx.fully_authenticated_user().name(), "alice");
    }
}
