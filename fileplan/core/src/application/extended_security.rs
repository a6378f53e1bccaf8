// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Extended Security
//!
//! Reference counted extended readers and writers. A change to a node is
//! mirrored onto its renditions and, unless suppressed, onto every file plan
//! container above it, where readers and writers alike are added as readers.
//! Moving a node shifts its contribution from the old containers to the new
//! ones.

use std::collections::HashSet;
use std::sync::Arc;

use tracing::{debug, info};

use crate::application::file_plan::FilePlanService;
use crate::application::transaction_helper::RetryingTransactionHelper;
use crate::domain::events::SecurityEvent;
use crate::domain::node::{Aspect, AssocType, NodeId, PropertyKey, PropertyMap};
use crate::domain::repository::NodeService;
use crate::domain::security::{ExtendedAuthorities, SecurityError};
use crate::domain::transaction::TransactionContext;
use crate::infrastructure::event_bus::EventBus;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Change {
    Add,
    Remove,
}

pub struct ExtendedSecurityService {
    nodes: Arc<dyn NodeService>,
    file_plan: Arc<FilePlanService>,
    transactions: Arc<RetryingTransactionHelper>,
    event_bus: Arc<EventBus>,
}

impl ExtendedSecurityService {
    pub fn new(
        nodes: Arc<dyn NodeService>,
        file_plan: Arc<FilePlanService>,
        transactions: Arc<RetryingTransactionHelper>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            nodes,
            file_plan,
            transactions,
            event_bus,
        }
    }

    pub async fn has_extended_security(&self, node: NodeId) -> Result<bool, SecurityError> {
        Ok(self.nodes.has_aspect(node, Aspect::ExtendedSecurity).await?)
    }

    /// Extended readers with their reference counts
    pub async fn extended_readers(&self, node: NodeId) -> Result<ExtendedAuthorities, SecurityError> {
        self.authorities(node, PropertyKey::ExtendedReaders).await
    }

    pub async fn extended_writers(&self, node: NodeId) -> Result<ExtendedAuthorities, SecurityError> {
        self.authorities(node, PropertyKey::ExtendedWriters).await
    }

    pub async fn get_extended_readers(&self, node: NodeId) -> Result<Vec<String>, SecurityError> {
        Ok(self
            .extended_readers(node)
            .await?
            .authorities()
            .map(str::to_string)
            .collect())
    }

    pub async fn get_extended_writers(&self, node: NodeId) -> Result<Vec<String>, SecurityError> {
        Ok(self
            .extended_writers(node)
            .await?
            .authorities()
            .map(str::to_string)
            .collect())
    }

    pub async fn add_extended_security(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
        readers: &[String],
        writers: &[String],
        apply_to_parents: bool,
    ) -> Result<(), SecurityError> {
        self.change_extended_security(ctx, node, readers, writers, apply_to_parents, Change::Add)
            .await
    }

    pub async fn remove_extended_security(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
        readers: &[String],
        writers: &[String],
        apply_to_parents: bool,
    ) -> Result<(), SecurityError> {
        self.change_extended_security(ctx, node, readers, writers, apply_to_parents, Change::Remove)
            .await
    }

    /// Drop every reference held on the node, and the matching references on
    /// its renditions and containers
    pub async fn remove_all_extended_security(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
        apply_to_parents: bool,
    ) -> Result<(), SecurityError> {
        let readers = expand(&self.extended_readers(node).await?);
        let writers = expand(&self.extended_writers(node).await?);
        self.remove_extended_security(ctx, node, &readers, &writers, apply_to_parents)
            .await
    }

    /// Give `target` every reference `source` holds. Containers are left alone.
    pub async fn copy_extended_security(
        &self,
        ctx: &TransactionContext,
        source: NodeId,
        target: NodeId,
    ) -> Result<(), SecurityError> {
        let readers = expand(&self.extended_readers(source).await?);
        let writers = expand(&self.extended_writers(source).await?);
        self.add_extended_security(ctx, target, &readers, &writers, false)
            .await
    }

    /// Shift the node's contribution from the old container chain to the new
    pub async fn on_move_node(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
        old_parent: NodeId,
        new_parent: NodeId,
    ) -> Result<(), SecurityError> {
        let mut combined = expand(&self.extended_readers(node).await?);
        combined.extend(expand(&self.extended_writers(node).await?));
        if combined.is_empty() || old_parent == new_parent {
            return Ok(());
        }
        debug!(
            "Moving extended security of {} from {} to {}",
            node, old_parent, new_parent
        );
        self.propagate_to_containers(ctx, vec![old_parent], &combined, Change::Remove)
            .await?;
        self.propagate_to_containers(ctx, vec![new_parent], &combined, Change::Add)
            .await
    }

    async fn change_extended_security(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
        readers: &[String],
        writers: &[String],
        apply_to_parents: bool,
        change: Change,
    ) -> Result<(), SecurityError> {
        if readers.is_empty() && writers.is_empty() {
            return Ok(());
        }

        self.apply(ctx, node, readers, writers, change).await?;

        let renditions = self
            .nodes
            .get_child_assocs(node, Some(AssocType::Renditions), None)
            .await?;
        for rendition in renditions {
            self.apply(ctx, rendition.child, readers, writers, change).await?;
        }

        if apply_to_parents {
            let combined: Vec<String> = readers.iter().chain(writers).cloned().collect();
            let parents = self.container_parents(node).await?;
            self.propagate_to_containers(ctx, parents, &combined, change).await?;
        }

        info!(
            "{} extended security on {} (readers {:?}, writers {:?})",
            if change == Change::Add { "Added" } else { "Removed" },
            node,
            readers,
            writers
        );
        self.event_bus
            .publish_security_event(SecurityEvent::ExtendedSecurityChanged {
                node_id: node,
                readers: readers.to_vec(),
                writers: writers.to_vec(),
                added: change == Change::Add,
            });
        Ok(())
    }

    /// Walk up from `start`, applying `authorities` as readers on every file
    /// plan container reached
    async fn propagate_to_containers(
        &self,
        ctx: &TransactionContext,
        start: Vec<NodeId>,
        authorities: &[String],
        change: Change,
    ) -> Result<(), SecurityError> {
        let mut pending = start;
        let mut visited = HashSet::new();
        while let Some(container) = pending.pop() {
            if !visited.insert(container) {
                continue;
            }
            if !self.file_plan.is_file_plan_component(container).await? {
                continue;
            }
            self.apply(ctx, container, authorities, &[], change).await?;
            pending.extend(self.container_parents(container).await?);
        }
        Ok(())
    }

    async fn container_parents(&self, node: NodeId) -> Result<Vec<NodeId>, SecurityError> {
        Ok(self
            .nodes
            .get_parent_assocs(node, Some(AssocType::Contains))
            .await?
            .into_iter()
            .map(|a| a.parent)
            .collect())
    }

    async fn authorities(
        &self,
        node: NodeId,
        key: PropertyKey,
    ) -> Result<ExtendedAuthorities, SecurityError> {
        let value = self.nodes.get_property(node, &key).await?;
        Ok(ExtendedAuthorities::from_property(value.as_ref()))
    }

    /// Adjust the counts on one node, dropping the aspect once both sets empty
    async fn apply(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
        readers: &[String],
        writers: &[String],
        change: Change,
    ) -> Result<(), SecurityError> {
        self.transactions
            .ensure_writable(&ctx.as_system(), move |_tx| async move {
                let mut current_readers = self.authorities(node, PropertyKey::ExtendedReaders).await?;
                let mut current_writers = self.authorities(node, PropertyKey::ExtendedWriters).await?;
                for (set, authorities) in [
                    (&mut current_readers, readers),
                    (&mut current_writers, writers),
                ] {
                    for authority in authorities {
                        match change {
                            Change::Add => set.add(authority),
                            Change::Remove => {
                                set.remove(authority);
                            }
                        }
                    }
                }

                if current_readers.is_empty() && current_writers.is_empty() {
                    self.nodes.remove_property(node, &PropertyKey::ExtendedReaders).await?;
                    self.nodes.remove_property(node, &PropertyKey::ExtendedWriters).await?;
                    self.nodes.remove_aspect(node, Aspect::ExtendedSecurity).await?;
                } else {
                    let mut props = PropertyMap::new();
                    props.insert(PropertyKey::ExtendedReaders, current_readers.to_property());
                    props.insert(PropertyKey::ExtendedWriters, current_writers.to_property());
                    self.nodes
                        .add_aspect(node, Aspect::ExtendedSecurity, props)
                        .await?;
                }
                Ok::<_, SecurityError>(())
            })
            .await
    }
}

/// One entry per reference held
fn expand(authorities: &ExtendedAuthorities) -> Vec<String> {
    authorities
        .authorities()
        .flat_map(|a| std::iter::repeat(a.to_string()).take(authorities.count(a) as usize))
        .collect()
}
