// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Service wiring over the in-memory collaborators.

use std::sync::Arc;

use anyhow::Context;
use tracing::info;

use crate::application::after_invocation::{AfterInvocationProvider, FilterLimits};
use crate::application::capability_service::{register_default_capabilities, CapabilityService};
use crate::application::disposition_service::{DispositionQueryService, StandardDispositionService};
use crate::application::entry_voter::RmEntryVoter;
use crate::application::extended_security::ExtendedSecurityService;
use crate::application::file_plan::FilePlanService;
use crate::application::method_security::MethodSecurityInterceptor;
use crate::application::record_service::RecordService;
use crate::application::selection_strategy::DispositionSelectionStrategy;
use crate::application::transaction_helper::RetryingTransactionHelper;
use crate::domain::config::RecordsConfigManifest;
use crate::domain::repository::NodeService;
use crate::domain::security::{PermissionService, SecurityContext};
use crate::domain::transaction::{TransactionContext, TxnReadState};
use crate::infrastructure::event_bus::EventBus;
use crate::infrastructure::permission::InMemoryPermissionService;
use crate::infrastructure::repositories::InMemoryNodeService;
use crate::infrastructure::transaction::InMemoryTransactionService;

/// Every records management service, built over one in-memory node store
pub struct RecordsManagementRuntime {
    pub config: RecordsConfigManifest,
    pub nodes: Arc<InMemoryNodeService>,
    pub transactions: Arc<InMemoryTransactionService>,
    pub permissions: Arc<InMemoryPermissionService>,
    pub event_bus: Arc<EventBus>,
    pub transaction_helper: Arc<RetryingTransactionHelper>,
    pub file_plan: Arc<FilePlanService>,
    pub disposition: Arc<StandardDispositionService>,
    pub selection: Arc<DispositionSelectionStrategy>,
    pub capabilities: Arc<CapabilityService>,
    pub extended_security: Arc<ExtendedSecurityService>,
    pub records: Arc<RecordService>,
    pub method_security: Arc<MethodSecurityInterceptor>,
}

impl RecordsManagementRuntime {
    pub fn in_memory(config: RecordsConfigManifest) -> anyhow::Result<Self> {
        config.validate()?;

        let nodes = Arc::new(InMemoryNodeService::new());
        let node_service: Arc<dyn NodeService> = nodes.clone();
        let transactions = Arc::new(InMemoryTransactionService::with_store((*nodes).clone()));
        let permissions = Arc::new(InMemoryPermissionService::new(node_service.clone()));
        let event_bus = Arc::new(EventBus::with_default_capacity());

        let transaction_helper = Arc::new(RetryingTransactionHelper::new(
            transactions.clone(),
            &config.spec.transactions,
        ));
        let file_plan = Arc::new(FilePlanService::new(node_service.clone()));
        let event_catalog = Arc::new(config.event_catalog());
        let disposition = Arc::new(StandardDispositionService::new(
            node_service.clone(),
            file_plan.clone(),
            transaction_helper.clone(),
            event_catalog.clone(),
            event_bus.clone(),
        ));
        let disposition_query: Arc<dyn DispositionQueryService> = disposition.clone();
        let selection = Arc::new(DispositionSelectionStrategy::new(disposition_query.clone()));

        let capabilities = Arc::new(CapabilityService::new());
        let permission_service: Arc<dyn PermissionService> = permissions.clone();
        register_default_capabilities(
            &capabilities,
            permission_service,
            file_plan.clone(),
            disposition_query,
        );

        let extended_security = Arc::new(ExtendedSecurityService::new(
            node_service.clone(),
            file_plan.clone(),
            transaction_helper.clone(),
            event_bus.clone(),
        ));
        let records = Arc::new(RecordService::new(
            node_service.clone(),
            file_plan.clone(),
            disposition.clone(),
            extended_security.clone(),
            transaction_helper.clone(),
        ));

        let voter = Arc::new(RmEntryVoter::new(
            capabilities.clone(),
            file_plan.clone(),
            node_service.clone(),
        ));
        let after = Arc::new(AfterInvocationProvider::new(
            capabilities.clone(),
            node_service,
            file_plan.clone(),
            FilterLimits::from_config(&config.spec.security),
            event_bus.clone(),
        ));
        let method_security = Arc::new(
            MethodSecurityInterceptor::new(
                voter,
                after,
                capabilities.clone(),
                event_bus.clone(),
                &config.spec.security,
            )
            .context("Failed to configure method security")?,
        );

        info!(
            "Records management runtime '{}' ready: {} capabilities, {} events, {} secured methods",
            config.metadata.name,
            capabilities.names().len(),
            event_catalog.len(),
            config.spec.security.method_security.len()
        );

        Ok(Self {
            config,
            nodes,
            transactions,
            permissions,
            event_bus,
            transaction_helper,
            file_plan,
            disposition,
            selection,
            capabilities,
            extended_security,
            records,
            method_security,
        })
    }

    /// Caller-owned contexts. The engine never commits them, so they hold
    /// no savepoint; units of work it escalates begin their own.
    pub fn read_only(&self, user: &str) -> TransactionContext {
        TransactionContext::new(TxnReadState::ReadOnly, SecurityContext::authenticated(user))
    }

    pub fn read_write(&self, user: &str) -> TransactionContext {
        TransactionContext::new(TxnReadState::ReadWrite, SecurityContext::authenticated(user))
    }

    pub fn system(&self) -> TransactionContext {
        TransactionContext::new(TxnReadState::ReadWrite, SecurityContext::system())
    }
}
