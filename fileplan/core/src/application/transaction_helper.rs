// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Retrying transaction helper
//!
//! Runs units of work inside transactions opened through the
//! [`TransactionService`] collaborator and replays them when they fail with a
//! retryable conflict. Mutations that reach the engine inside a read-only
//! transaction are escalated to a nested read-write transaction via
//! [`RetryingTransactionHelper::ensure_writable`].

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, warn};

use crate::domain::config::TransactionConfig;
use crate::domain::repository::RepositoryError;
use crate::domain::security::SecurityContext;
use crate::domain::transaction::{
    RetryableError, TransactionContext, TransactionService, TxnReadState,
};

pub struct RetryingTransactionHelper {
    transactions: Arc<dyn TransactionService>,
    max_retries: u32,
    retry_delay: Duration,
}

impl RetryingTransactionHelper {
    pub fn new(transactions: Arc<dyn TransactionService>, config: &TransactionConfig) -> Self {
        Self {
            transactions,
            max_retries: config.max_retries,
            retry_delay: config.retry_delay,
        }
    }

    /// Run `work` in a new transaction, retrying on conflicts
    pub async fn do_in_transaction<T, E, F, Fut>(
        &self,
        security: &SecurityContext,
        read_only: bool,
        work: F,
    ) -> Result<T, E>
    where
        F: Fn(TransactionContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: RetryableError + From<RepositoryError> + std::fmt::Display + Send,
    {
        let read_state = if read_only {
            TxnReadState::ReadOnly
        } else {
            TxnReadState::ReadWrite
        };

        let mut attempt: u32 = 0;
        loop {
            let tx = self.transactions.begin(read_state, security.clone());
            match work(tx.clone()).await {
                Ok(value) => {
                    self.transactions.commit(&tx).await?;
                    return Ok(value);
                }
                Err(e) if e.is_retryable() && attempt < self.max_retries => {
                    self.transactions.rollback(&tx).await;
                    attempt += 1;
                    warn!(
                        "Transaction {} failed with a retryable error (attempt {}/{}): {}",
                        tx.id(),
                        attempt,
                        self.max_retries,
                        e
                    );
                    tokio::time::sleep(self.retry_delay * attempt).await;
                }
                Err(e) => {
                    self.transactions.rollback(&tx).await;
                    return Err(e);
                }
            }
        }
    }

    /// Run `work` in the caller's transaction when it is writable, otherwise in
    /// a nested read-write transaction under the same security context
    pub async fn ensure_writable<T, E, F, Fut>(
        &self,
        ctx: &TransactionContext,
        work: F,
    ) -> Result<T, E>
    where
        F: Fn(TransactionContext) -> Fut + Send + Sync,
        Fut: Future<Output = Result<T, E>> + Send,
        T: Send,
        E: RetryableError + From<RepositoryError> + std::fmt::Display + Send,
    {
        if !ctx.is_read_only() {
            return work(ctx.clone()).await;
        }
        debug!(
            "Escalating read-only transaction {} to a nested read-write transaction",
            ctx.id()
        );
        self.do_in_transaction(ctx.security(), false, work).await
    }
}
