// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! File plan navigation
//!
//! Classifies nodes into file plan component kinds and walks the
//! plan/category/folder/record hierarchy. Reads go straight to the node
//! service and are not capability checked.

use std::sync::Arc;

use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::domain::node::{AssocType, NodeId, NodeType, PropertyKey, PropertyMap};
use crate::domain::repository::{NodeService, RepositoryError};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilePlanComponentKind {
    FilePlan,
    RecordCategory,
    RecordFolder,
    Record,
}

impl FilePlanComponentKind {
    fn of(node_type: NodeType) -> Option<Self> {
        match node_type {
            NodeType::FilePlan => Some(Self::FilePlan),
            NodeType::RecordCategory => Some(Self::RecordCategory),
            NodeType::RecordFolder => Some(Self::RecordFolder),
            NodeType::Record => Some(Self::Record),
            _ => None,
        }
    }
}

pub struct FilePlanService {
    nodes: Arc<dyn NodeService>,
    default_file_plan: RwLock<Option<NodeId>>,
}

impl FilePlanService {
    pub fn new(nodes: Arc<dyn NodeService>) -> Self {
        Self {
            nodes,
            default_file_plan: RwLock::new(None),
        }
    }

    pub async fn component_kind(
        &self,
        node: NodeId,
    ) -> Result<Option<FilePlanComponentKind>, RepositoryError> {
        if !self.nodes.exists(node).await? {
            return Ok(None);
        }
        Ok(FilePlanComponentKind::of(self.nodes.get_type(node).await?))
    }

    pub async fn is_file_plan_component(&self, node: NodeId) -> Result<bool, RepositoryError> {
        Ok(self.component_kind(node).await?.is_some())
    }

    pub async fn is_record_category(&self, node: NodeId) -> Result<bool, RepositoryError> {
        Ok(self.component_kind(node).await? == Some(FilePlanComponentKind::RecordCategory))
    }

    pub async fn is_record_folder(&self, node: NodeId) -> Result<bool, RepositoryError> {
        Ok(self.component_kind(node).await? == Some(FilePlanComponentKind::RecordFolder))
    }

    pub async fn is_record(&self, node: NodeId) -> Result<bool, RepositoryError> {
        Ok(self.component_kind(node).await? == Some(FilePlanComponentKind::Record))
    }

    /// The first file plan created, used when a directive names no node
    pub fn default_file_plan(&self) -> Option<NodeId> {
        *self.default_file_plan.read()
    }

    /// File plan root above `node` on the primary parent chain
    pub async fn file_plan_of(&self, node: NodeId) -> Result<Option<NodeId>, RepositoryError> {
        let mut current = Some(node);
        while let Some(id) = current {
            if self.component_kind(id).await? == Some(FilePlanComponentKind::FilePlan) {
                return Ok(Some(id));
            }
            current = self.nodes.get_primary_parent(id).await?.map(|a| a.parent);
        }
        Ok(None)
    }

    /// Direct children of a container through containment associations
    pub async fn contained(&self, container: NodeId) -> Result<Vec<NodeId>, RepositoryError> {
        Ok(self
            .nodes
            .get_child_assocs(container, Some(AssocType::Contains), None)
            .await?
            .into_iter()
            .map(|a| a.child)
            .collect())
    }

    /// Records filed in a folder, primary or secondary
    pub async fn records_of(&self, folder: NodeId) -> Result<Vec<NodeId>, RepositoryError> {
        let mut records = Vec::new();
        for child in self.contained(folder).await? {
            if self.is_record(child).await? {
                records.push(child);
            }
        }
        Ok(records)
    }

    /// Folders a record is filed in, primary folder first
    pub async fn record_folders_of(&self, record: NodeId) -> Result<Vec<NodeId>, RepositoryError> {
        let mut parents = self
            .nodes
            .get_parent_assocs(record, Some(AssocType::Contains))
            .await?;
        parents.sort_by_key(|a| !a.is_primary);

        let mut folders = Vec::with_capacity(parents.len());
        for assoc in parents {
            if self.is_record_folder(assoc.parent).await? {
                folders.push(assoc.parent);
            }
        }
        Ok(folders)
    }

    pub async fn create_file_plan(&self, name: &str) -> Result<NodeId, RepositoryError> {
        let mut props = PropertyMap::new();
        props.insert(PropertyKey::Name, name.into());
        let plan = self.nodes.create_root_node(NodeType::FilePlan, props).await?;
        self.default_file_plan.write().get_or_insert(plan);
        info!("Created file plan '{}' ({})", name, plan);
        Ok(plan)
    }

    pub async fn create_record_category(
        &self,
        parent: NodeId,
        name: &str,
        props: PropertyMap,
    ) -> Result<NodeId, RepositoryError> {
        match self.component_kind(parent).await? {
            Some(FilePlanComponentKind::FilePlan | FilePlanComponentKind::RecordCategory) => {}
            _ => {
                return Err(RepositoryError::Integrity(format!(
                    "record category '{}' must be created in a file plan or record category, not {}",
                    name, parent
                )))
            }
        }
        let assoc = self
            .nodes
            .create_node(parent, AssocType::Contains, name, NodeType::RecordCategory, props)
            .await?;
        Ok(assoc.child)
    }

    pub async fn create_record_folder(
        &self,
        category: NodeId,
        name: &str,
        props: PropertyMap,
    ) -> Result<NodeId, RepositoryError> {
        if !self.is_record_category(category).await? {
            return Err(RepositoryError::Integrity(format!(
                "record folder '{}' must be created in a record category, not {}",
                name, category
            )));
        }
        let assoc = self
            .nodes
            .create_node(category, AssocType::Contains, name, NodeType::RecordFolder, props)
            .await?;
        Ok(assoc.child)
    }
}
