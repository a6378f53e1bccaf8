// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Typed security directives parsed from method security configuration.
//!
//! Grammar:
//!
//! ```text
//! RM_ALLOW | RM_DENY | RM_ABSTAIN | RM_QUERY
//! RM_CAP.<arg>.<capability>[.parent]
//! RM.<Policy>.<arg>[.<arg>]...
//! AFTER_RM.FilterNode[.parent]
//! ```
//!
//! `<arg>` is the zero-based position of the invocation argument to test. A
//! negative position selects the file plan root.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use super::SecurityError;

const RM_ALLOW: &str = "RM_ALLOW";
const RM_DENY: &str = "RM_DENY";
const RM_ABSTAIN: &str = "RM_ABSTAIN";
const RM_QUERY: &str = "RM_QUERY";
const RM_CAP_PREFIX: &str = "RM_CAP.";
const RM_POLICY_PREFIX: &str = "RM.";
const AFTER_FILTER: &str = "AFTER_RM.FilterNode";
const PARENT_SUFFIX: &str = "parent";

/// Named policies evaluated by the entry voter
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PolicyKind {
    Read,
    Create,
    Move,
    Update,
    UpdateProperties,
    Delete,
    Assoc,
    Declare,
}

impl FromStr for PolicyKind {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Read" => Ok(PolicyKind::Read),
            "Create" => Ok(PolicyKind::Create),
            "Move" => Ok(PolicyKind::Move),
            "Update" => Ok(PolicyKind::Update),
            "UpdateProperties" => Ok(PolicyKind::UpdateProperties),
            "Delete" => Ok(PolicyKind::Delete),
            "Assoc" => Ok(PolicyKind::Assoc),
            "Declare" => Ok(PolicyKind::Declare),
            other => Err(SecurityError::InvalidDirective(format!("RM.{}", other))),
        }
    }
}

/// Before-invocation directive
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SecurityDirective {
    Allow,
    Deny,
    Abstain,
    /// Allow the call and rely on after-invocation filtering
    Query,
    Capability {
        argument: i32,
        capability: String,
        parent: bool,
    },
    Policy {
        policy: PolicyKind,
        arguments: Vec<i32>,
    },
}

impl SecurityDirective {
    /// Non-negative argument positions this directive reads
    pub fn argument_positions(&self) -> Vec<usize> {
        let positions: &[i32] = match self {
            SecurityDirective::Capability { argument, .. } => std::slice::from_ref(argument),
            SecurityDirective::Policy { arguments, .. } => arguments.as_slice(),
            _ => &[],
        };
        positions
            .iter()
            .filter(|p| **p >= 0)
            .map(|p| *p as usize)
            .collect()
    }

    pub fn parse_all<S: AsRef<str>>(attributes: &[S]) -> Result<Vec<Self>, SecurityError> {
        attributes.iter().map(|a| a.as_ref().parse()).collect()
    }
}

fn parse_position(raw: &str, attribute: &str) -> Result<i32, SecurityError> {
    raw.parse::<i32>()
        .map_err(|_| SecurityError::InvalidDirective(attribute.to_string()))
}

impl FromStr for SecurityDirective {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let attribute = s.trim();
        match attribute {
            RM_ALLOW => return Ok(SecurityDirective::Allow),
            RM_DENY => return Ok(SecurityDirective::Deny),
            RM_ABSTAIN => return Ok(SecurityDirective::Abstain),
            RM_QUERY => return Ok(SecurityDirective::Query),
            _ => {}
        }

        if let Some(rest) = attribute.strip_prefix(RM_CAP_PREFIX) {
            let parts: Vec<&str> = rest.split('.').collect();
            let (argument, capability, parent) = match parts.as_slice() {
                [position, capability] => (*position, *capability, false),
                [position, capability, PARENT_SUFFIX] => (*position, *capability, true),
                _ => return Err(SecurityError::InvalidDirective(attribute.to_string())),
            };
            if capability.is_empty() {
                return Err(SecurityError::InvalidDirective(attribute.to_string()));
            }
            return Ok(SecurityDirective::Capability {
                argument: parse_position(argument, attribute)?,
                capability: capability.to_string(),
                parent,
            });
        }

        if let Some(rest) = attribute.strip_prefix(RM_POLICY_PREFIX) {
            let mut parts = rest.split('.');
            let policy = parts
                .next()
                .ok_or_else(|| SecurityError::InvalidDirective(attribute.to_string()))?
                .parse::<PolicyKind>()?;
            let arguments = parts
                .map(|p| parse_position(p, attribute))
                .collect::<Result<Vec<_>, _>>()?;
            if arguments.is_empty() {
                return Err(SecurityError::InvalidDirective(attribute.to_string()));
            }
            return Ok(SecurityDirective::Policy { policy, arguments });
        }

        Err(SecurityError::InvalidDirective(attribute.to_string()))
    }
}

/// After-invocation filtering directive
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AfterDirective {
    /// Check the parent of each returned element instead of the element
    pub parent: bool,
}

impl AfterDirective {
    /// Splits mixed attribute lists into before and after directives
    pub fn partition<S: AsRef<str>>(
        attributes: &[S],
    ) -> Result<(Vec<SecurityDirective>, Vec<AfterDirective>), SecurityError> {
        let mut before = Vec::new();
        let mut after = Vec::new();
        for attribute in attributes {
            let attribute = attribute.as_ref().trim();
            if attribute.starts_with(AFTER_FILTER) {
                after.push(attribute.parse()?);
            } else {
                before.push(attribute.parse()?);
            }
        }
        Ok((before, after))
    }
}

impl FromStr for AfterDirective {
    type Err = SecurityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let attribute = s.trim();
        match attribute.strip_prefix(AFTER_FILTER) {
            Some("") => Ok(AfterDirective { parent: false }),
            Some(".parent") => Ok(AfterDirective { parent: true }),
            _ => Err(SecurityError::InvalidDirective(attribute.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_unconditional_directives() {
        assert_eq!("RM_ALLOW".parse::<SecurityDirective>().unwrap(), SecurityDirective::Allow);
        assert_eq!("RM_DENY".parse::<SecurityDirective>().unwrap(), SecurityDirective::Deny);
        assert_eq!("RM_QUERY".parse::<SecurityDirective>().unwrap(), SecurityDirective::Query);
    }

    #[test]
    fn test_parse_capability_directive() {
        let directive: SecurityDirective = "RM_CAP.0.ViewRecords.parent".parse().unwrap();
        assert_eq!(
            directive,
            SecurityDirective::Capability {
                argument: 0,
                capability: "ViewRecords".to_string(),
                parent: true,
            }
        );

        let root: SecurityDirective = "RM_CAP.-1.FileRecords".parse().unwrap();
        assert!(root.argument_positions().is_empty());
    }

    #[test]
    fn test_parse_policy_directive() {
        let directive: SecurityDirective = "RM.Move.0.1".parse().unwrap();
        assert_eq!(
            directive,
            SecurityDirective::Policy {
                policy: PolicyKind::Move,
                arguments: vec![0, 1],
            }
        );
        assert_eq!(directive.argument_positions(), vec![0, 1]);
    }

    #[test]
    fn test_unknown_directives_are_rejected() {
        assert!("RM_MAYBE".parse::<SecurityDirective>().is_err());
        assert!("RM.Teleport.0".parse::<SecurityDirective>().is_err());
        assert!("RM_CAP.x.ViewRecords".parse::<SecurityDirective>().is_err());
        assert!("RM.Read".parse::<SecurityDirective>().is_err());
    }

    #[test]
    fn test_partition_mixed_attributes() {
        let (before, after) =
            AfterDirective::partition(&["RM.Read.0", "AFTER_RM.FilterNode.parent"]).unwrap();
        assert_eq!(before.len(), 1);
        assert_eq!(after, vec![AfterDirective { parent: true }]);
    }
}
