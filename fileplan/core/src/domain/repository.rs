// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Node Graph Repository Interface
//!
//! Contract for the hierarchical content store the records management engine
//! is layered over. The store keeps nodes with a type, a set of aspects and a
//! property bag, connected by typed parent/child associations. Implemented in
//! `crate::infrastructure::repositories`.
//!
//! The store performs no authorization of its own. Callers that need
//! capability checks go through [`crate::application::method_security`].

use async_trait::async_trait;
use thiserror::Error;

use crate::domain::node::{
    Aspect, AssocType, ChildAssoc, NodeId, NodeType, PropertyKey, PropertyMap, PropertyValue,
};
use crate::domain::transaction::RetryableError;

/// Node graph accessor
#[async_trait]
pub trait NodeService: Send + Sync {
    async fn exists(&self, node: NodeId) -> Result<bool, RepositoryError>;

    async fn get_type(&self, node: NodeId) -> Result<NodeType, RepositoryError>;

    async fn get_property(
        &self,
        node: NodeId,
        key: &PropertyKey,
    ) -> Result<Option<PropertyValue>, RepositoryError>;

    async fn get_properties(&self, node: NodeId) -> Result<PropertyMap, RepositoryError>;

    async fn set_property(
        &self,
        node: NodeId,
        key: PropertyKey,
        value: PropertyValue,
    ) -> Result<(), RepositoryError>;

    async fn remove_property(&self, node: NodeId, key: &PropertyKey) -> Result<(), RepositoryError>;

    /// Replace the whole property bag
    async fn set_properties(&self, node: NodeId, props: PropertyMap) -> Result<(), RepositoryError>;

    /// Merge into the existing property bag
    async fn add_properties(&self, node: NodeId, props: PropertyMap) -> Result<(), RepositoryError>;

    /// Create a node without a parent (store or file plan root)
    async fn create_root_node(
        &self,
        node_type: NodeType,
        props: PropertyMap,
    ) -> Result<NodeId, RepositoryError>;

    /// Create a node under `parent` through a new primary association
    async fn create_node(
        &self,
        parent: NodeId,
        assoc_type: AssocType,
        name: &str,
        node_type: NodeType,
        props: PropertyMap,
    ) -> Result<ChildAssoc, RepositoryError>;

    /// Child associations in creation order, optionally filtered by type and capped
    async fn get_child_assocs(
        &self,
        parent: NodeId,
        assoc_type: Option<AssocType>,
        max_items: Option<usize>,
    ) -> Result<Vec<ChildAssoc>, RepositoryError>;

    async fn get_child_assocs_by_property_value(
        &self,
        parent: NodeId,
        assoc_type: AssocType,
        key: &PropertyKey,
        value: &PropertyValue,
    ) -> Result<Vec<ChildAssoc>, RepositoryError>;

    async fn get_parent_assocs(
        &self,
        node: NodeId,
        assoc_type: Option<AssocType>,
    ) -> Result<Vec<ChildAssoc>, RepositoryError>;

    async fn get_primary_parent(&self, node: NodeId) -> Result<Option<ChildAssoc>, RepositoryError>;

    /// Add a secondary association from `parent` to an existing node
    async fn add_child(
        &self,
        parent: NodeId,
        child: NodeId,
        assoc_type: AssocType,
        name: &str,
    ) -> Result<ChildAssoc, RepositoryError>;

    /// Re-parent the primary association of `node`
    async fn move_node(
        &self,
        node: NodeId,
        new_parent: NodeId,
        assoc_type: AssocType,
    ) -> Result<ChildAssoc, RepositoryError>;

    /// Remove the association between `parent` and `child`. Removing the primary
    /// association deletes the child.
    async fn remove_child(&self, parent: NodeId, child: NodeId) -> Result<(), RepositoryError>;

    /// Delete a node and everything beneath it through primary associations
    async fn delete_node(&self, node: NodeId) -> Result<(), RepositoryError>;

    async fn has_aspect(&self, node: NodeId, aspect: Aspect) -> Result<bool, RepositoryError>;

    /// Apply an aspect, merging `props` into the node's properties
    async fn add_aspect(
        &self,
        node: NodeId,
        aspect: Aspect,
        props: PropertyMap,
    ) -> Result<(), RepositoryError>;

    async fn remove_aspect(&self, node: NodeId, aspect: Aspect) -> Result<(), RepositoryError>;
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RepositoryError {
    #[error("Node not found: {0}")]
    NotFound(String),

    /// Optimistic concurrency failure, safe to retry in a new transaction
    #[error("Concurrent modification: {0}")]
    Conflict(String),

    #[error("Write attempted in a read-only transaction")]
    ReadOnlyTransaction,

    #[error("Integrity violation: {0}")]
    Integrity(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl From<serde_json::Error> for RepositoryError {
    fn from(err: serde_json::Error) -> Self {
        RepositoryError::Serialization(err.to_string())
    }
}

impl RetryableError for RepositoryError {
    fn is_retryable(&self) -> bool {
        matches!(self, RepositoryError::Conflict(_))
    }
}
