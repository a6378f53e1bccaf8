// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Node Store Implementations
//!
//! In-memory implementation of the [`NodeService`] collaborator, used for
//! development, tests and embedding.
//!
//! # Architecture
//!
//! - **Layer:** Infrastructure
//! - **Purpose:** Store nodes, aspects, properties and associations
//! - **Pattern:** Repository (DDD), Adapter (Hexagonal Architecture)

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use parking_lot::RwLock;
use tracing::debug;

use crate::domain::node::{
    Aspect, AssocType, ChildAssoc, NodeId, NodeType, PropertyKey, PropertyMap, PropertyValue,
};
use crate::domain::repository::{NodeService, RepositoryError};

#[derive(Debug, Clone)]
struct StoredNode {
    node_type: NodeType,
    aspects: HashSet<Aspect>,
    properties: PropertyMap,
}

#[derive(Debug, Clone, Default)]
struct Graph {
    nodes: HashMap<NodeId, StoredNode>,
    /// Creation order is preserved
    assocs: Vec<ChildAssoc>,
}

impl Graph {
    fn node(&self, id: NodeId) -> Result<&StoredNode, RepositoryError> {
        self.nodes
            .get(&id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut StoredNode, RepositoryError> {
        self.nodes
            .get_mut(&id)
            .ok_or_else(|| RepositoryError::NotFound(id.to_string()))
    }

    fn primary_parent(&self, id: NodeId) -> Option<&ChildAssoc> {
        self.assocs.iter().find(|a| a.child == id && a.is_primary)
    }

    /// `ancestor` reachable from `node` through primary parents
    fn is_ancestor(&self, ancestor: NodeId, node: NodeId) -> bool {
        let mut current = Some(node);
        while let Some(id) = current {
            if id == ancestor {
                return true;
            }
            current = self.primary_parent(id).map(|a| a.parent);
        }
        false
    }

    fn delete_subtree(&mut self, root: NodeId) {
        let mut pending = vec![root];
        let mut doomed = HashSet::new();
        while let Some(id) = pending.pop() {
            if doomed.insert(id) {
                pending.extend(
                    self.assocs
                        .iter()
                        .filter(|a| a.parent == id && a.is_primary)
                        .map(|a| a.child),
                );
            }
        }
        self.assocs
            .retain(|a| !doomed.contains(&a.parent) && !doomed.contains(&a.child));
        self.nodes.retain(|id, _| !doomed.contains(id));
    }
}

/// Copy of the graph that a rolled back transaction returns to
#[derive(Debug, Clone)]
pub struct GraphSnapshot(Graph);

/// Thread-safe in-memory node graph
#[derive(Clone, Default)]
pub struct InMemoryNodeService {
    graph: Arc<RwLock<Graph>>,
    injected_conflicts: Arc<AtomicUsize>,
    /// Writes allowed through before injected conflicts start
    conflict_delay: Arc<AtomicUsize>,
}

impl InMemoryNodeService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` writes fail with a retryable conflict
    pub fn inject_conflicts(&self, n: usize) {
        self.inject_conflicts_after(0, n);
    }

    /// Let `writes` writes succeed, then fail the following `n`
    pub fn inject_conflicts_after(&self, writes: usize, n: usize) {
        self.conflict_delay.store(writes, Ordering::SeqCst);
        self.injected_conflicts.store(n, Ordering::SeqCst);
    }

    pub fn snapshot(&self) -> GraphSnapshot {
        GraphSnapshot(self.graph.read().clone())
    }

    /// Replace the whole graph, discarding every write made since `snapshot`
    pub fn restore(&self, snapshot: GraphSnapshot) {
        *self.graph.write() = snapshot.0;
    }

    pub fn node_count(&self) -> usize {
        self.graph.read().nodes.len()
    }

    fn check_conflict(&self) -> Result<(), RepositoryError> {
        if self.injected_conflicts.load(Ordering::SeqCst) == 0 {
            return Ok(());
        }
        if self
            .conflict_delay
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
        {
            return Ok(());
        }
        let injected = self
            .injected_conflicts
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1));
        match injected {
            Ok(_) => Err(RepositoryError::Conflict(
                "node modified by a concurrent transaction".to_string(),
            )),
            Err(_) => Ok(()),
        }
    }

    fn new_node(node_type: NodeType, mut props: PropertyMap) -> StoredNode {
        props
            .entry(PropertyKey::Created)
            .or_insert_with(|| PropertyValue::Date(Utc::now()));
        let mut aspects = HashSet::new();
        if node_type.is_file_plan_type() {
            aspects.insert(Aspect::FilePlanComponent);
        }
        StoredNode {
            node_type,
            aspects,
            properties: props,
        }
    }
}

#[async_trait]
impl NodeService for InMemoryNodeService {
    async fn exists(&self, node: NodeId) -> Result<bool, RepositoryError> {
        Ok(self.graph.read().nodes.contains_key(&node))
    }

    async fn get_type(&self, node: NodeId) -> Result<NodeType, RepositoryError> {
        Ok(self.graph.read().node(node)?.node_type)
    }

    async fn get_property(
        &self,
        node: NodeId,
        key: &PropertyKey,
    ) -> Result<Option<PropertyValue>, RepositoryError> {
        Ok(self.graph.read().node(node)?.properties.get(key).cloned())
    }

    async fn get_properties(&self, node: NodeId) -> Result<PropertyMap, RepositoryError> {
        Ok(self.graph.read().node(node)?.properties.clone())
    }

    async fn set_property(
        &self,
        node: NodeId,
        key: PropertyKey,
        value: PropertyValue,
    ) -> Result<(), RepositoryError> {
        self.check_conflict()?;
        self.graph.write().node_mut(node)?.properties.insert(key, value);
        Ok(())
    }

    async fn remove_property(&self, node: NodeId, key: &PropertyKey) -> Result<(), RepositoryError> {
        self.check_conflict()?;
        self.graph.write().node_mut(node)?.properties.remove(key);
        Ok(())
    }

    async fn set_properties(&self, node: NodeId, props: PropertyMap) -> Result<(), RepositoryError> {
        self.check_conflict()?;
        self.graph.write().node_mut(node)?.properties = props;
        Ok(())
    }

    async fn add_properties(&self, node: NodeId, props: PropertyMap) -> Result<(), RepositoryError> {
        self.check_conflict()?;
        self.graph.write().node_mut(node)?.properties.extend(props);
        Ok(())
    }

    async fn create_root_node(
        &self,
        node_type: NodeType,
        props: PropertyMap,
    ) -> Result<NodeId, RepositoryError> {
        self.check_conflict()?;
        let id = NodeId::new();
        self.graph.write().nodes.insert(id, Self::new_node(node_type, props));
        debug!("Created root node {} of type {:?}", id, node_type);
        Ok(id)
    }

    async fn create_node(
        &self,
        parent: NodeId,
        assoc_type: AssocType,
        name: &str,
        node_type: NodeType,
        mut props: PropertyMap,
    ) -> Result<ChildAssoc, RepositoryError> {
        self.check_conflict()?;
        let mut graph = self.graph.write();
        graph.node(parent)?;

        props
            .entry(PropertyKey::Name)
            .or_insert_with(|| PropertyValue::text(name));
        let id = NodeId::new();
        graph.nodes.insert(id, Self::new_node(node_type, props));

        let assoc = ChildAssoc {
            parent,
            child: id,
            assoc_type,
            name: name.to_string(),
            is_primary: true,
        };
        graph.assocs.push(assoc.clone());
        Ok(assoc)
    }

    async fn get_child_assocs(
        &self,
        parent: NodeId,
        assoc_type: Option<AssocType>,
        max_items: Option<usize>,
    ) -> Result<Vec<ChildAssoc>, RepositoryError> {
        let graph = self.graph.read();
        graph.node(parent)?;
        Ok(graph
            .assocs
            .iter()
            .filter(|a| a.parent == parent)
            .filter(|a| assoc_type.map_or(true, |t| a.assoc_type == t))
            .take(max_items.unwrap_or(usize::MAX))
            .cloned()
            .collect())
    }

    async fn get_child_assocs_by_property_value(
        &self,
        parent: NodeId,
        assoc_type: AssocType,
        key: &PropertyKey,
        value: &PropertyValue,
    ) -> Result<Vec<ChildAssoc>, RepositoryError> {
        let graph = self.graph.read();
        graph.node(parent)?;
        Ok(graph
            .assocs
            .iter()
            .filter(|a| a.parent == parent && a.assoc_type == assoc_type)
            .filter(|a| {
                graph
                    .nodes
                    .get(&a.child)
                    .and_then(|n| n.properties.get(key))
                    .map_or(false, |v| v == value)
            })
            .cloned()
            .collect())
    }

    async fn get_parent_assocs(
        &self,
        node: NodeId,
        assoc_type: Option<AssocType>,
    ) -> Result<Vec<ChildAssoc>, RepositoryError> {
        let graph = self.graph.read();
        graph.node(node)?;
        Ok(graph
            .assocs
            .iter()
            .filter(|a| a.child == node)
            .filter(|a| assoc_type.map_or(true, |t| a.assoc_type == t))
            .cloned()
            .collect())
    }

    async fn get_primary_parent(&self, node: NodeId) -> Result<Option<ChildAssoc>, RepositoryError> {
        let graph = self.graph.read();
        graph.node(node)?;
        Ok(graph.primary_parent(node).cloned())
    }

    async fn add_child(
        &self,
        parent: NodeId,
        child: NodeId,
        assoc_type: AssocType,
        name: &str,
    ) -> Result<ChildAssoc, RepositoryError> {
        self.check_conflict()?;
        let mut graph = self.graph.write();
        graph.node(parent)?;
        graph.node(child)?;
        if graph
            .assocs
            .iter()
            .any(|a| a.parent == parent && a.child == child && a.assoc_type == assoc_type)
        {
            return Err(RepositoryError::Integrity(format!(
                "{} is already a child of {}",
                child, parent
            )));
        }
        let assoc = ChildAssoc {
            parent,
            child,
            assoc_type,
            name: name.to_string(),
            is_primary: false,
        };
        graph.assocs.push(assoc.clone());
        Ok(assoc)
    }

    async fn move_node(
        &self,
        node: NodeId,
        new_parent: NodeId,
        assoc_type: AssocType,
    ) -> Result<ChildAssoc, RepositoryError> {
        self.check_conflict()?;
        let mut graph = self.graph.write();
        graph.node(new_parent)?;
        if graph.is_ancestor(node, new_parent) {
            return Err(RepositoryError::Integrity(format!(
                "cannot move {} beneath itself",
                node
            )));
        }
        let assoc = graph
            .assocs
            .iter_mut()
            .find(|a| a.child == node && a.is_primary)
            .ok_or_else(|| RepositoryError::NotFound(format!("primary parent of {}", node)))?;
        assoc.parent = new_parent;
        assoc.assoc_type = assoc_type;
        Ok(assoc.clone())
    }

    async fn remove_child(&self, parent: NodeId, child: NodeId) -> Result<(), RepositoryError> {
        self.check_conflict()?;
        let mut graph = self.graph.write();
        let position = graph
            .assocs
            .iter()
            .position(|a| a.parent == parent && a.child == child)
            .ok_or_else(|| RepositoryError::NotFound(format!("{} -> {}", parent, child)))?;
        if graph.assocs[position].is_primary {
            graph.delete_subtree(child);
        } else {
            graph.assocs.remove(position);
        }
        Ok(())
    }

    async fn delete_node(&self, node: NodeId) -> Result<(), RepositoryError> {
        self.check_conflict()?;
        let mut graph = self.graph.write();
        graph.node(node)?;
        graph.delete_subtree(node);
        Ok(())
    }

    async fn has_aspect(&self, node: NodeId, aspect: Aspect) -> Result<bool, RepositoryError> {
        Ok(self.graph.read().node(node)?.aspects.contains(&aspect))
    }

    async fn add_aspect(
        &self,
        node: NodeId,
        aspect: Aspect,
        props: PropertyMap,
    ) -> Result<(), RepositoryError> {
        self.check_conflict()?;
        let mut graph = self.graph.write();
        let stored = graph.node_mut(node)?;
        stored.aspects.insert(aspect);
        stored.properties.extend(props);
        Ok(())
    }

    async fn remove_aspect(&self, node: NodeId, aspect: Aspect) -> Result<(), RepositoryError> {
        self.check_conflict()?;
        self.graph.write().node_mut(node)?.aspects.remove(&aspect);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn named(name: &str) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert(PropertyKey::Title, PropertyValue::text(name));
        props
    }

    #[tokio::test]
    async fn test_create_and_traverse() {
        let store = InMemoryNodeService::new();
        let plan = store.create_root_node(NodeType::FilePlan, PropertyMap::new()).await.unwrap();
        let category = store
            .create_node(plan, AssocType::Contains, "Finance", NodeType::RecordCategory, named("Finance"))
            .await
            .unwrap();

        let children = store.get_child_assocs(plan, Some(AssocType::Contains), None).await.unwrap();
        assert_eq!(children, vec![category.clone()]);
        assert!(store.has_aspect(category.child, Aspect::FilePlanComponent).await.unwrap());
        assert_eq!(
            store.get_property(category.child, &PropertyKey::Name).await.unwrap(),
            Some(PropertyValue::text("Finance"))
        );
        assert!(store.get_property(category.child, &PropertyKey::Created).await.unwrap().is_some());
        assert_eq!(
            store.get_primary_parent(category.child).await.unwrap().map(|a| a.parent),
            Some(plan)
        );
    }

    #[tokio::test]
    async fn test_secondary_association_survives_primary_listing() {
        let store = InMemoryNodeService::new();
        let plan = store.create_root_node(NodeType::FilePlan, PropertyMap::new()).await.unwrap();
        let a = store
            .create_node(plan, AssocType::Contains, "a", NodeType::RecordFolder, PropertyMap::new())
            .await
            .unwrap()
            .child;
        let b = store
            .create_node(plan, AssocType::Contains, "b", NodeType::RecordFolder, PropertyMap::new())
            .await
            .unwrap()
            .child;
        let record = store
            .create_node(a, AssocType::Contains, "r", NodeType::Record, PropertyMap::new())
            .await
            .unwrap()
            .child;
        store.add_child(b, record, AssocType::Contains, "r").await.unwrap();

        let parents = store.get_parent_assocs(record, Some(AssocType::Contains)).await.unwrap();
        assert_eq!(parents.len(), 2);
        assert!(store.add_child(b, record, AssocType::Contains, "r").await.is_err());

        // removing the secondary link keeps the record
        store.remove_child(b, record).await.unwrap();
        assert!(store.exists(record).await.unwrap());

        // removing the primary link deletes it
        store.remove_child(a, record).await.unwrap();
        assert!(!store.exists(record).await.unwrap());
    }

    #[tokio::test]
    async fn test_move_node_rejects_cycles() {
        let store = InMemoryNodeService::new();
        let plan = store.create_root_node(NodeType::FilePlan, PropertyMap::new()).await.unwrap();
        let parent = store
            .create_node(plan, AssocType::Contains, "p", NodeType::RecordCategory, PropertyMap::new())
            .await
            .unwrap()
            .child;
        let child = store
            .create_node(parent, AssocType::Contains, "c", NodeType::RecordCategory, PropertyMap::new())
            .await
            .unwrap()
            .child;

        assert!(store.move_node(parent, child, AssocType::Contains).await.is_err());
        let moved = store.move_node(child, plan, AssocType::Contains).await.unwrap();
        assert_eq!(moved.parent, plan);
    }

    #[tokio::test]
    async fn test_delete_removes_subtree() {
        let store = InMemoryNodeService::new();
        let plan = store.create_root_node(NodeType::FilePlan, PropertyMap::new()).await.unwrap();
        let folder = store
            .create_node(plan, AssocType::Contains, "f", NodeType::RecordFolder, PropertyMap::new())
            .await
            .unwrap()
            .child;
        store
            .create_node(folder, AssocType::Contains, "r", NodeType::Record, PropertyMap::new())
            .await
            .unwrap();

        store.delete_node(folder).await.unwrap();
        assert_eq!(store.node_count(), 1);
    }

    #[tokio::test]
    async fn test_injected_conflicts_fail_writes_only() {
        let store = InMemoryNodeService::new();
        let plan = store.create_root_node(NodeType::FilePlan, PropertyMap::new()).await.unwrap();
        store.inject_conflicts(1);

        assert!(store.exists(plan).await.unwrap());
        let first = store.set_property(plan, PropertyKey::Title, "x".into()).await;
        assert!(matches!(first, Err(RepositoryError::Conflict(_))));
        store.set_property(plan, PropertyKey::Title, "x".into()).await.unwrap();
    }

    #[tokio::test]
    async fn test_delayed_conflict_and_restore() {
        let store = InMemoryNodeService::new();
        let plan = store.create_root_node(NodeType::FilePlan, PropertyMap::new()).await.unwrap();
        let snapshot = store.snapshot();
        store.inject_conflicts_after(1, 1);

        store.set_property(plan, PropertyKey::Title, "first".into()).await.unwrap();
        let second = store
            .create_node(plan, AssocType::Contains, "f", NodeType::RecordFolder, PropertyMap::new())
            .await;
        assert!(matches!(second, Err(RepositoryError::Conflict(_))));

        store.restore(snapshot);
        assert_eq!(store.get_property(plan, &PropertyKey::Title).await.unwrap(), None);
        assert_eq!(store.node_count(), 1);
    }
}
