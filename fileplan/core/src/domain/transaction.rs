// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Transaction Context
//!
//! Explicit per-transaction state passed through every engine call: the read
//! state, the security context the work runs under, and the typed capability
//! decision cache. A context never outlives its transaction, so cached
//! decisions cannot leak into another transaction.
//!
//! Elevating a context ([`TransactionContext::as_system`]) keeps the same
//! transaction and cache but switches the running identity to system.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::repository::RepositoryError;
use crate::domain::security::{AccessDecision, DecisionKey, SecurityContext};

/// Marks errors the retrying transaction helper may replay
pub trait RetryableError {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TransactionId(pub Uuid);

impl TransactionId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for TransactionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TransactionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TxnReadState {
    ReadOnly,
    ReadWrite,
}

#[derive(Debug)]
struct TransactionState {
    id: TransactionId,
    read_state: TxnReadState,
    decisions: DashMap<DecisionKey, AccessDecision>,
}

/// Handle to a live transaction
#[derive(Debug, Clone)]
pub struct TransactionContext {
    state: Arc<TransactionState>,
    security: SecurityContext,
}

impl TransactionContext {
    pub fn new(read_state: TxnReadState, security: SecurityContext) -> Self {
        Self {
            state: Arc::new(TransactionState {
                id: TransactionId::new(),
                read_state,
                decisions: DashMap::new(),
            }),
            security,
        }
    }

    pub fn id(&self) -> TransactionId {
        self.state.id
    }

    pub fn read_state(&self) -> TxnReadState {
        self.state.read_state
    }

    pub fn is_read_only(&self) -> bool {
        self.state.read_state == TxnReadState::ReadOnly
    }

    pub fn security(&self) -> &SecurityContext {
        &self.security
    }

    /// Same transaction, running as system
    pub fn as_system(&self) -> Self {
        Self {
            state: Arc::clone(&self.state),
            security: self.security.elevated(),
        }
    }

    /// Same transaction, running under another security context
    pub fn with_security(&self, security: SecurityContext) -> Self {
        Self {
            state: Arc::clone(&self.state),
            security,
        }
    }

    pub fn cached_decision(&self, key: &DecisionKey) -> Option<AccessDecision> {
        self.state.decisions.get(key).map(|entry| *entry.value())
    }

    pub fn cache_decision(&self, key: DecisionKey, decision: AccessDecision) {
        self.state.decisions.insert(key, decision);
    }

    pub fn cached_decision_count(&self) -> usize {
        self.state.decisions.len()
    }
}

/// Transaction collaborator
#[async_trait]
pub trait TransactionService: Send + Sync {
    fn begin(&self, read_state: TxnReadState, security: SecurityContext) -> TransactionContext;

    async fn commit(&self, tx: &TransactionContext) -> Result<(), RepositoryError>;

    async fn rollback(&self, tx: &TransactionContext);
}
