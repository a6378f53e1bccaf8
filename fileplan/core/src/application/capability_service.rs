// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Capabilities
//!
//! Named authorization units layered over the base permission model. A
//! declarative capability grants when the node is a file plan component of an
//! accepted kind, the running principal holds the underlying permission and,
//! when actions are bound, at least one of them is executable on the node.
//!
//! Decisions are memoized in the transaction context under
//! `(capability, node, running-as user)` and never outlive the transaction.

use std::collections::BTreeMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::try_join_all;
use parking_lot::RwLock;
use tracing::debug;

use crate::application::disposition_service::DispositionQueryService;
use crate::application::file_plan::{FilePlanComponentKind, FilePlanService};
use crate::domain::node::NodeId;
use crate::domain::security::{
    AccessDecision, DecisionKey, Permission, PermissionService, SecurityError,
};
use crate::domain::transaction::TransactionContext;

pub const VIEW_RECORDS: &str = "ViewRecords";
pub const FILE_RECORDS: &str = "FileRecords";
pub const UPDATE_PROPERTIES: &str = "UpdateProperties";
pub const DELETE_RECORDS: &str = "DeleteRecords";
pub const MOVE_RECORDS: &str = "MoveRecords";
pub const CUTOFF_RECORDS: &str = "CutoffRecords";
pub const DESTROY_RECORDS: &str = "DestroyRecords";
pub const TRANSFER_RECORDS: &str = "TransferRecords";
pub const ACCESSION_RECORDS: &str = "AccessionRecords";
pub const MANAGE_EXTENDED_SECURITY: &str = "ManageExtendedSecurity";
pub const DISPOSITION: &str = "Disposition";

/// Executable condition bound to a capability
#[async_trait]
pub trait RmAction: Send + Sync {
    fn name(&self) -> &str;

    async fn is_executable(&self, ctx: &TransactionContext, node: NodeId) -> Result<bool, SecurityError>;
}

/// Disposition step that can run once it is the node's eligible next action
pub struct DispositionStepAction {
    name: String,
    disposition: Arc<dyn DispositionQueryService>,
}

impl DispositionStepAction {
    pub fn new(name: impl Into<String>, disposition: Arc<dyn DispositionQueryService>) -> Self {
        Self {
            name: name.into(),
            disposition,
        }
    }
}

#[async_trait]
impl RmAction for DispositionStepAction {
    fn name(&self) -> &str {
        &self.name
    }

    async fn is_executable(&self, ctx: &TransactionContext, node: NodeId) -> Result<bool, SecurityError> {
        let system = ctx.as_system();
        let Some(next) = self.disposition.get_next_disposition_action(&system, node).await? else {
            return Ok(false);
        };
        if next.name != self.name {
            return Ok(false);
        }
        Ok(self
            .disposition
            .is_next_disposition_action_eligible(&system, node)
            .await?)
    }
}

#[async_trait]
pub trait Capability: Send + Sync {
    fn name(&self) -> &str;

    async fn evaluate(&self, ctx: &TransactionContext, node: NodeId) -> Result<AccessDecision, SecurityError>;
}

pub struct DeclarativeCapability {
    name: String,
    permission: Permission,
    /// Empty accepts every file plan component kind
    kinds: Vec<FilePlanComponentKind>,
    actions: Vec<Arc<dyn RmAction>>,
    permissions: Arc<dyn PermissionService>,
    file_plan: Arc<FilePlanService>,
}

impl DeclarativeCapability {
    pub fn new(
        name: impl Into<String>,
        permission: Permission,
        permissions: Arc<dyn PermissionService>,
        file_plan: Arc<FilePlanService>,
    ) -> Self {
        Self {
            name: name.into(),
            permission,
            kinds: Vec::new(),
            actions: Vec::new(),
            permissions,
            file_plan,
        }
    }

    pub fn with_kinds(mut self, kinds: &[FilePlanComponentKind]) -> Self {
        self.kinds = kinds.to_vec();
        self
    }

    pub fn with_action(mut self, action: Arc<dyn RmAction>) -> Self {
        self.actions.push(action);
        self
    }
}

#[async_trait]
impl Capability for DeclarativeCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, ctx: &TransactionContext, node: NodeId) -> Result<AccessDecision, SecurityError> {
        let Some(kind) = self.file_plan.component_kind(node).await? else {
            return Ok(AccessDecision::Abstain);
        };
        if !self.kinds.is_empty() && !self.kinds.contains(&kind) {
            return Ok(AccessDecision::Denied);
        }
        if !self
            .permissions
            .has_permission(ctx.security().running_as(), node, self.permission)
            .await?
        {
            return Ok(AccessDecision::Denied);
        }
        if self.actions.is_empty() {
            return Ok(AccessDecision::Granted);
        }
        for action in &self.actions {
            if action.is_executable(ctx, node).await? {
                return Ok(AccessDecision::Granted);
            }
        }
        Ok(AccessDecision::Denied)
    }
}

/// Grants when any child grants, denies when none grants and one denies
pub struct CompositeCapability {
    name: String,
    children: Vec<Arc<dyn Capability>>,
}

impl CompositeCapability {
    pub fn new(name: impl Into<String>, children: Vec<Arc<dyn Capability>>) -> Self {
        Self {
            name: name.into(),
            children,
        }
    }
}

#[async_trait]
impl Capability for CompositeCapability {
    fn name(&self) -> &str {
        &self.name
    }

    async fn evaluate(&self, ctx: &TransactionContext, node: NodeId) -> Result<AccessDecision, SecurityError> {
        let mut denied = false;
        for child in &self.children {
            match child.evaluate(ctx, node).await? {
                AccessDecision::Granted => return Ok(AccessDecision::Granted),
                AccessDecision::Denied => denied = true,
                AccessDecision::Abstain => {}
            }
        }
        Ok(if denied {
            AccessDecision::Denied
        } else {
            AccessDecision::Abstain
        })
    }
}

/// Registry of capabilities with per-transaction decision caching
#[derive(Default)]
pub struct CapabilityService {
    capabilities: RwLock<BTreeMap<String, Arc<dyn Capability>>>,
}

impl CapabilityService {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&self, capability: Arc<dyn Capability>) {
        let name = capability.name().to_string();
        debug!("Registered capability {}", name);
        self.capabilities.write().insert(name, capability);
    }

    pub fn get(&self, name: &str) -> Option<Arc<dyn Capability>> {
        self.capabilities.read().get(name).cloned()
    }

    pub fn names(&self) -> Vec<String> {
        self.capabilities.read().keys().cloned().collect()
    }

    pub async fn evaluate(
        &self,
        ctx: &TransactionContext,
        capability: &str,
        node: NodeId,
    ) -> Result<AccessDecision, SecurityError> {
        let implementation = self
            .get(capability)
            .ok_or_else(|| SecurityError::UnknownCapability(capability.to_string()))?;

        let key = DecisionKey::new(capability, node, ctx.security().running_as().name());
        if let Some(decision) = ctx.cached_decision(&key) {
            metrics::counter!("fileplan_capability_cache_hits_total").increment(1);
            return Ok(decision);
        }
        metrics::counter!("fileplan_capability_cache_misses_total").increment(1);

        let decision = implementation.evaluate(ctx, node).await?;
        debug!("Capability {} on {} evaluated to {}", capability, node, decision);
        ctx.cache_decision(key, decision);
        Ok(decision)
    }

    /// Decision of every registered capability on `node`
    pub async fn capabilities_report(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<BTreeMap<String, AccessDecision>, SecurityError> {
        let names = self.names();
        let decisions = try_join_all(names.iter().map(|name| async move {
            let decision = self.evaluate(ctx, name, node).await?;
            Ok::<_, SecurityError>((name.clone(), decision))
        }))
        .await?;
        Ok(decisions.into_iter().collect())
    }
}

/// Render a capability report as `name=DECISION` pairs
pub fn format_report(node: NodeId, report: &BTreeMap<String, AccessDecision>) -> String {
    let entries: Vec<String> = report
        .iter()
        .map(|(name, decision)| format!("{}={}", name, decision))
        .collect();
    format!("capabilities on {}: {}", node, entries.join(", "))
}

/// Register the standard records management capabilities
pub fn register_default_capabilities(
    registry: &CapabilityService,
    permissions: Arc<dyn PermissionService>,
    file_plan: Arc<FilePlanService>,
    disposition: Arc<dyn DispositionQueryService>,
) {
    let declarative = |name: &str, permission: Permission| {
        DeclarativeCapability::new(name, permission, permissions.clone(), file_plan.clone())
    };
    let disposable = [FilePlanComponentKind::RecordFolder, FilePlanComponentKind::Record];

    registry.register(Arc::new(declarative(VIEW_RECORDS, Permission::ReadRecords)));
    registry.register(Arc::new(declarative(FILE_RECORDS, Permission::FileRecords)));
    registry.register(Arc::new(declarative(UPDATE_PROPERTIES, Permission::UpdateProperties)));
    registry.register(Arc::new(declarative(DELETE_RECORDS, Permission::DeleteRecords)));
    registry.register(Arc::new(
        declarative(MOVE_RECORDS, Permission::FileRecords).with_kinds(&disposable),
    ));
    registry.register(Arc::new(declarative(
        MANAGE_EXTENDED_SECURITY,
        Permission::ManageSecurity,
    )));

    let mut steps: Vec<Arc<dyn Capability>> = Vec::new();
    for (capability, step) in [
        (CUTOFF_RECORDS, "cutoff"),
        (DESTROY_RECORDS, "destroy"),
        (TRANSFER_RECORDS, "transfer"),
        (ACCESSION_RECORDS, "accession"),
    ] {
        let action: Arc<dyn RmAction> = Arc::new(DispositionStepAction::new(step, disposition.clone()));
        let capability: Arc<dyn Capability> = Arc::new(
            declarative(capability, Permission::Disposition)
                .with_kinds(&disposable)
                .with_action(action),
        );
        registry.register(capability.clone());
        steps.push(capability);
    }
    registry.register(Arc::new(CompositeCapability::new(DISPOSITION, steps)));
}
