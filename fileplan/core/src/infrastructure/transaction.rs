// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use dashmap::DashMap;
use tracing::debug;

use crate::domain::repository::RepositoryError;
use crate::domain::security::SecurityContext;
use crate::domain::transaction::{
    TransactionContext, TransactionId, TransactionService, TxnReadState,
};
use crate::infrastructure::repositories::{GraphSnapshot, InMemoryNodeService};

/// Transaction manager for the in-memory node store.
///
/// Writes are applied immediately. When bound to a store, every read-write
/// transaction takes a snapshot at begin and rollback restores it, so a
/// retried unit of work never sees its own partial writes. The store has no
/// isolation: a rollback also discards writes made concurrently by other
/// transactions. Counters let callers observe escalations and retries.
#[derive(Default)]
pub struct InMemoryTransactionService {
    store: Option<InMemoryNodeService>,
    savepoints: DashMap<TransactionId, GraphSnapshot>,
    read_only_begun: AtomicUsize,
    read_write_begun: AtomicUsize,
    commits: AtomicUsize,
    rollbacks: AtomicUsize,
}

impl InMemoryTransactionService {
    /// Counting only, rollback leaves writes in place
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_store(store: InMemoryNodeService) -> Self {
        Self {
            store: Some(store),
            ..Self::default()
        }
    }

    pub fn read_write_begun(&self) -> usize {
        self.read_write_begun.load(Ordering::SeqCst)
    }

    pub fn read_only_begun(&self) -> usize {
        self.read_only_begun.load(Ordering::SeqCst)
    }

    pub fn commits(&self) -> usize {
        self.commits.load(Ordering::SeqCst)
    }

    pub fn rollbacks(&self) -> usize {
        self.rollbacks.load(Ordering::SeqCst)
    }

    pub fn open_savepoints(&self) -> usize {
        self.savepoints.len()
    }
}

#[async_trait]
impl TransactionService for InMemoryTransactionService {
    fn begin(&self, read_state: TxnReadState, security: SecurityContext) -> TransactionContext {
        match read_state {
            TxnReadState::ReadOnly => self.read_only_begun.fetch_add(1, Ordering::SeqCst),
            TxnReadState::ReadWrite => self.read_write_begun.fetch_add(1, Ordering::SeqCst),
        };
        let tx = TransactionContext::new(read_state, security);
        if let (TxnReadState::ReadWrite, Some(store)) = (read_state, &self.store) {
            self.savepoints.insert(tx.id(), store.snapshot());
        }
        debug!("Began {:?} transaction {}", read_state, tx.id());
        tx
    }

    async fn commit(&self, tx: &TransactionContext) -> Result<(), RepositoryError> {
        self.savepoints.remove(&tx.id());
        self.commits.fetch_add(1, Ordering::SeqCst);
        debug!("Committed transaction {}", tx.id());
        Ok(())
    }

    async fn rollback(&self, tx: &TransactionContext) {
        self.rollbacks.fetch_add(1, Ordering::SeqCst);
        match (self.savepoints.remove(&tx.id()), &self.store) {
            (Some((_, snapshot)), Some(store)) => {
                store.restore(snapshot);
                debug!("Rolled back transaction {}, writes discarded", tx.id());
            }
            _ => debug!("Rolled back transaction {}", tx.id()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::{NodeType, PropertyKey, PropertyMap};
    use crate::domain::repository::NodeService;

    #[tokio::test]
    async fn test_rollback_restores_store() {
        let store = InMemoryNodeService::new();
        let plan = store.create_root_node(NodeType::FilePlan, PropertyMap::new()).await.unwrap();
        let transactions = InMemoryTransactionService::with_store(store.clone());

        let tx = transactions.begin(TxnReadState::ReadWrite, SecurityContext::system());
        store.set_property(plan, PropertyKey::Title, "draft".into()).await.unwrap();
        transactions.rollback(&tx).await;
        assert_eq!(store.get_property(plan, &PropertyKey::Title).await.unwrap(), None);

        let tx = transactions.begin(TxnReadState::ReadWrite, SecurityContext::system());
        store.set_property(plan, PropertyKey::Title, "final".into()).await.unwrap();
        transactions.commit(&tx).await.unwrap();
        transactions.rollback(&tx).await;
        assert!(store.get_property(plan, &PropertyKey::Title).await.unwrap().is_some());
        assert_eq!(transactions.open_savepoints(), 0);
    }

    #[test]
    fn test_read_only_transactions_take_no_snapshot() {
        let transactions = InMemoryTransactionService::with_store(InMemoryNodeService::new());
        transactions.begin(TxnReadState::ReadOnly, SecurityContext::system());
        assert_eq!(transactions.open_savepoints(), 0);
        assert_eq!(transactions.read_only_begun(), 1);
    }
}
