// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};

use crate::domain::node::NodeId;

/// Three-valued outcome of a capability or voter evaluation
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AccessDecision {
    Granted,
    Denied,
    Abstain,
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted)
    }
}

impl std::fmt::Display for AccessDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessDecision::Granted => write!(f, "GRANTED"),
            AccessDecision::Denied => write!(f, "DENIED"),
            AccessDecision::Abstain => write!(f, "ABSTAIN"),
        }
    }
}

/// Cache key for a capability decision inside one transaction
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DecisionKey {
    pub capability: String,
    pub node: NodeId,
    pub user: String,
}

impl DecisionKey {
    pub fn new(capability: impl Into<String>, node: NodeId, user: impl Into<String>) -> Self {
        Self {
            capability: capability.into(),
            node,
            user: user.into(),
        }
    }
}

/// Base repository permissions checked underneath capabilities
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Permission {
    ReadRecords,
    FileRecords,
    UpdateProperties,
    DeleteRecords,
    Disposition,
    ManageSecurity,
}

impl Permission {
    /// Whether holding `self` implies holding `other`
    pub fn implies(&self, other: Permission) -> bool {
        if *self == other {
            return true;
        }
        match self {
            Permission::FileRecords => matches!(other, Permission::ReadRecords),
            Permission::ManageSecurity => true,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_permission_implication() {
        assert!(Permission::FileRecords.implies(Permission::ReadRecords));
        assert!(!Permission::ReadRecords.implies(Permission::FileRecords));
        assert!(Permission::ManageSecurity.implies(Permission::DeleteRecords));
    }
}
