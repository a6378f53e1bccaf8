// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Filing operations.
//!
//! Every change to where a record lives is followed by the disposition and
//! extended security bookkeeping that depends on it: filing initialises the
//! first disposition action, linking and moving reconcile the next action
//! across the record's folders, and moving shifts extended security between
//! container chains.

use std::sync::Arc;

use chrono::Utc;
use thiserror::Error;
use tracing::info;

use crate::application::disposition_service::DispositionLifecycleService;
use crate::application::extended_security::ExtendedSecurityService;
use crate::application::file_plan::FilePlanService;
use crate::application::transaction_helper::RetryingTransactionHelper;
use crate::domain::disposition::DispositionError;
use crate::domain::node::{AssocType, NodeId, NodeType, PropertyKey, PropertyMap, PropertyValue};
use crate::domain::repository::{NodeService, RepositoryError};
use crate::domain::security::SecurityError;
use crate::domain::transaction::{RetryableError, TransactionContext};

#[derive(Debug, Error)]
pub enum RecordError {
    #[error("{0} is not a record folder")]
    NotRecordFolder(NodeId),

    #[error("Record folder {0} is closed")]
    FolderClosed(NodeId),

    #[error("{0} is not a record")]
    NotRecord(NodeId),

    #[error(transparent)]
    Disposition(#[from] DispositionError),

    #[error(transparent)]
    Security(#[from] SecurityError),

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl RetryableError for RecordError {
    fn is_retryable(&self) -> bool {
        match self {
            RecordError::Disposition(e) => e.is_retryable(),
            RecordError::Security(e) => e.is_retryable(),
            RecordError::Repository(e) => e.is_retryable(),
            _ => false,
        }
    }
}

impl From<RecordError> for SecurityError {
    fn from(e: RecordError) -> Self {
        match e {
            RecordError::Security(e) => e,
            RecordError::Disposition(e) => SecurityError::Disposition(e),
            RecordError::Repository(e) => SecurityError::Repository(e),
            other => SecurityError::Repository(RepositoryError::Integrity(other.to_string())),
        }
    }
}

pub struct RecordService {
    nodes: Arc<dyn NodeService>,
    file_plan: Arc<FilePlanService>,
    disposition: Arc<dyn DispositionLifecycleService>,
    extended_security: Arc<ExtendedSecurityService>,
    transactions: Arc<RetryingTransactionHelper>,
}

impl RecordService {
    pub fn new(
        nodes: Arc<dyn NodeService>,
        file_plan: Arc<FilePlanService>,
        disposition: Arc<dyn DispositionLifecycleService>,
        extended_security: Arc<ExtendedSecurityService>,
        transactions: Arc<RetryingTransactionHelper>,
    ) -> Self {
        Self {
            nodes,
            file_plan,
            disposition,
            extended_security,
            transactions,
        }
    }

    async fn require_open_folder(&self, folder: NodeId) -> Result<(), RecordError> {
        if !self.file_plan.is_record_folder(folder).await? {
            return Err(RecordError::NotRecordFolder(folder));
        }
        let closed = self
            .nodes
            .get_property(folder, &PropertyKey::IsClosed)
            .await?
            .and_then(|v| v.as_bool())
            .unwrap_or(false);
        if closed {
            return Err(RecordError::FolderClosed(folder));
        }
        Ok(())
    }

    async fn require_record(&self, record: NodeId) -> Result<(), RecordError> {
        if !self.file_plan.is_record(record).await? {
            return Err(RecordError::NotRecord(record));
        }
        Ok(())
    }

    /// Create a record folder and give it its first action when the
    /// category's schedule applies at folder level
    pub async fn create_record_folder(
        &self,
        ctx: &TransactionContext,
        category: NodeId,
        name: &str,
        props: PropertyMap,
    ) -> Result<NodeId, RecordError> {
        let folder = self
            .transactions
            .ensure_writable(ctx, move |_tx| {
                let props = props.clone();
                async move {
                    Ok::<_, RecordError>(
                        self.file_plan
                            .create_record_folder(category, name, props)
                            .await?,
                    )
                }
            })
            .await?;
        self.disposition.refresh_disposition_action(ctx, folder).await?;
        info!("Created record folder '{}' ({}) in {}", name, folder, category);
        Ok(folder)
    }

    /// Create a record in an open folder
    pub async fn file_record(
        &self,
        ctx: &TransactionContext,
        folder: NodeId,
        name: &str,
        mut props: PropertyMap,
    ) -> Result<NodeId, RecordError> {
        self.require_open_folder(folder).await?;

        props.insert(PropertyKey::Name, PropertyValue::text(name));
        props
            .entry(PropertyKey::DateFiled)
            .or_insert_with(|| PropertyValue::Date(Utc::now()));

        let record = self
            .transactions
            .ensure_writable(ctx, move |_tx| {
                let props = props.clone();
                async move {
                    let assoc = self
                        .nodes
                        .create_node(folder, AssocType::Contains, name, NodeType::Record, props)
                        .await?;
                    Ok::<_, RecordError>(assoc.child)
                }
            })
            .await?;

        self.disposition.on_file_record(ctx, record).await?;
        info!("Filed record '{}' ({}) in {}", name, record, folder);
        Ok(record)
    }

    /// File an existing record into a further folder
    pub async fn link_record(
        &self,
        ctx: &TransactionContext,
        record: NodeId,
        folder: NodeId,
    ) -> Result<(), RecordError> {
        self.require_record(record).await?;
        self.require_open_folder(folder).await?;

        let name = self
            .nodes
            .get_property(record, &PropertyKey::Name)
            .await?
            .and_then(|v| v.as_text().map(str::to_string))
            .unwrap_or_else(|| record.to_string());

        self.transactions
            .ensure_writable(ctx, move |_tx| {
                let name = name.clone();
                async move {
                    self.nodes
                        .add_child(folder, record, AssocType::Contains, &name)
                        .await?;
                    Ok::<_, RecordError>(())
                }
            })
            .await?;

        self.disposition.refresh_disposition_action(ctx, record).await?;
        self.disposition.recalculate_next_disposition_step(ctx, record).await?;
        info!("Linked record {} into {}", record, folder);
        Ok(())
    }

    /// Move a record's primary filing to another folder
    pub async fn move_record(
        &self,
        ctx: &TransactionContext,
        record: NodeId,
        folder: NodeId,
    ) -> Result<(), RecordError> {
        self.require_record(record).await?;
        self.require_open_folder(folder).await?;

        let Some(old_parent) = self.nodes.get_primary_parent(record).await?.map(|a| a.parent) else {
            return Err(RecordError::Repository(RepositoryError::NotFound(format!(
                "primary parent of {}",
                record
            ))));
        };

        self.transactions
            .ensure_writable(ctx, move |_tx| async move {
                self.nodes
                    .move_node(record, folder, AssocType::Contains)
                    .await?;
                Ok::<_, RecordError>(())
            })
            .await?;

        self.extended_security
            .on_move_node(ctx, record, old_parent, folder)
            .await?;
        self.disposition.refresh_disposition_action(ctx, record).await?;
        self.disposition.recalculate_next_disposition_step(ctx, record).await?;
        info!("Moved record {} from {} to {}", record, old_parent, folder);
        Ok(())
    }

    /// Attach a rendition carrying the record's extended security
    pub async fn add_rendition(
        &self,
        ctx: &TransactionContext,
        record: NodeId,
        name: &str,
        props: PropertyMap,
    ) -> Result<NodeId, RecordError> {
        self.require_record(record).await?;

        let rendition = self
            .transactions
            .ensure_writable(ctx, move |_tx| {
                let props = props.clone();
                async move {
                    let assoc = self
                        .nodes
                        .create_node(record, AssocType::Renditions, name, NodeType::Rendition, props)
                        .await?;
                    Ok::<_, RecordError>(assoc.child)
                }
            })
            .await?;

        self.extended_security
            .copy_extended_security(ctx, record, rendition)
            .await?;
        Ok(rendition)
    }
}
