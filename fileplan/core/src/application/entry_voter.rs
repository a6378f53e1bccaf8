// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Before-invocation voter.
//!
//! Evaluates the directives configured for a method against the invocation's
//! arguments. Directives run in order. The unconditional ones decide
//! immediately; capability and policy checks must all grant, and any abstain
//! among them counts as a denial.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::application::capability_service::{
    CapabilityService, DELETE_RECORDS, FILE_RECORDS, MOVE_RECORDS, UPDATE_PROPERTIES, VIEW_RECORDS,
};
use crate::application::file_plan::FilePlanService;
use crate::domain::node::{ChildAssoc, NodeId};
use crate::domain::repository::NodeService;
use crate::domain::security::{AccessDecision, PolicyKind, SecurityDirective, SecurityError};
use crate::domain::transaction::TransactionContext;

/// Argument passed to an intercepted method
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum InvocationArgument {
    Node(NodeId),
    ChildAssoc(ChildAssoc),
    /// Any argument that does not identify a node
    Value(String),
    None,
}

impl InvocationArgument {
    fn node(&self, parent: bool) -> Option<NodeTarget> {
        match self {
            InvocationArgument::Node(node) if parent => Some(NodeTarget::PrimaryParentOf(*node)),
            InvocationArgument::Node(node) => Some(NodeTarget::Node(*node)),
            InvocationArgument::ChildAssoc(assoc) if parent => Some(NodeTarget::Node(assoc.parent)),
            InvocationArgument::ChildAssoc(assoc) => Some(NodeTarget::Node(assoc.child)),
            InvocationArgument::Value(_) | InvocationArgument::None => None,
        }
    }
}

impl From<NodeId> for InvocationArgument {
    fn from(node: NodeId) -> Self {
        InvocationArgument::Node(node)
    }
}

impl From<ChildAssoc> for InvocationArgument {
    fn from(assoc: ChildAssoc) -> Self {
        InvocationArgument::ChildAssoc(assoc)
    }
}

#[derive(Debug, Clone, Copy)]
enum NodeTarget {
    Node(NodeId),
    PrimaryParentOf(NodeId),
}

/// A call about to be made on a secured service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MethodInvocation {
    pub method: String,
    pub arguments: Vec<InvocationArgument>,
}

impl MethodInvocation {
    pub fn new(method: impl Into<String>, arguments: Vec<InvocationArgument>) -> Self {
        Self {
            method: method.into(),
            arguments,
        }
    }

    /// Node arguments, in order
    pub fn nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        self.arguments.iter().filter_map(|a| match a {
            InvocationArgument::Node(node) => Some(*node),
            InvocationArgument::ChildAssoc(assoc) => Some(assoc.child),
            _ => None,
        })
    }
}

/// Capability tested for each argument of a policy; the last entry repeats
fn policy_capabilities(policy: PolicyKind) -> &'static [&'static str] {
    match policy {
        PolicyKind::Read => &[VIEW_RECORDS],
        PolicyKind::Create | PolicyKind::Declare => &[FILE_RECORDS],
        PolicyKind::Move => &[MOVE_RECORDS, FILE_RECORDS],
        PolicyKind::Update | PolicyKind::UpdateProperties => &[UPDATE_PROPERTIES],
        PolicyKind::Delete => &[DELETE_RECORDS],
        PolicyKind::Assoc => &[VIEW_RECORDS, FILE_RECORDS],
    }
}

pub struct RmEntryVoter {
    capabilities: Arc<CapabilityService>,
    file_plan: Arc<FilePlanService>,
    nodes: Arc<dyn NodeService>,
}

impl RmEntryVoter {
    pub fn new(
        capabilities: Arc<CapabilityService>,
        file_plan: Arc<FilePlanService>,
        nodes: Arc<dyn NodeService>,
    ) -> Self {
        Self {
            capabilities,
            file_plan,
            nodes,
        }
    }

    pub async fn vote(
        &self,
        ctx: &TransactionContext,
        invocation: &MethodInvocation,
        directives: &[SecurityDirective],
    ) -> Result<AccessDecision, SecurityError> {
        if ctx.security().is_system() {
            return Ok(AccessDecision::Granted);
        }
        if directives.is_empty() {
            return Ok(AccessDecision::Abstain);
        }

        for directive in directives {
            if directive
                .argument_positions()
                .iter()
                .any(|p| *p >= invocation.arguments.len())
            {
                debug!(
                    "Skipping {:?} on {}: argument out of range",
                    directive, invocation.method
                );
                continue;
            }

            let decision = match directive {
                SecurityDirective::Deny => return Ok(AccessDecision::Denied),
                SecurityDirective::Abstain => return Ok(AccessDecision::Abstain),
                SecurityDirective::Allow | SecurityDirective::Query => {
                    return Ok(AccessDecision::Granted)
                }
                SecurityDirective::Capability {
                    argument,
                    capability,
                    parent,
                } => {
                    self.check_argument(ctx, invocation, *argument, capability, *parent)
                        .await?
                }
                SecurityDirective::Policy { policy, arguments } => {
                    self.check_policy(ctx, invocation, *policy, arguments).await?
                }
            };

            if decision != AccessDecision::Granted {
                debug!(
                    "{:?} on {} voted {}, denying",
                    directive, invocation.method, decision
                );
                return Ok(AccessDecision::Denied);
            }
        }
        Ok(AccessDecision::Granted)
    }

    async fn check_policy(
        &self,
        ctx: &TransactionContext,
        invocation: &MethodInvocation,
        policy: PolicyKind,
        arguments: &[i32],
    ) -> Result<AccessDecision, SecurityError> {
        let capabilities = policy_capabilities(policy);
        for (i, argument) in arguments.iter().enumerate() {
            let capability = capabilities[i.min(capabilities.len() - 1)];
            let decision = self
                .check_argument(ctx, invocation, *argument, capability, false)
                .await?;
            if decision != AccessDecision::Granted {
                return Ok(decision);
            }
        }
        Ok(AccessDecision::Granted)
    }

    async fn check_argument(
        &self,
        ctx: &TransactionContext,
        invocation: &MethodInvocation,
        argument: i32,
        capability: &str,
        parent: bool,
    ) -> Result<AccessDecision, SecurityError> {
        let target = if argument < 0 {
            self.file_plan.default_file_plan().map(NodeTarget::Node)
        } else {
            invocation
                .arguments
                .get(argument as usize)
                .and_then(|a| a.node(parent))
        };

        let node = match target {
            Some(NodeTarget::Node(node)) => Some(node),
            Some(NodeTarget::PrimaryParentOf(node)) => {
                self.nodes.get_primary_parent(node).await?.map(|a| a.parent)
            }
            None => None,
        };

        // Nothing to protect: no node, or a node outside the file plan
        let Some(node) = node else {
            return Ok(AccessDecision::Granted);
        };
        if !self.file_plan.is_file_plan_component(node).await? {
            return Ok(AccessDecision::Granted);
        }

        self.capabilities.evaluate(ctx, capability, node).await
    }
}
