// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::RwLock;

use crate::domain::node::{NodeId, PropertyKey};
use crate::domain::repository::{NodeService, RepositoryError};
use crate::domain::security::{ExtendedAuthorities, Permission, PermissionService, Principal};

/// Authority every user belongs to
pub const EVERYONE: &str = "GROUP_EVERYONE";

/// Access control list kept in memory.
///
/// Entries are inherited down the primary parent chain. Extended readers of a
/// node may read it and extended writers may read and file into it; extended
/// authorities are not inherited, they are propagated explicitly.
pub struct InMemoryPermissionService {
    nodes: Arc<dyn NodeService>,
    entries: RwLock<HashMap<NodeId, Vec<(String, Permission)>>>,
    groups: RwLock<HashMap<String, HashSet<String>>>,
}

impl InMemoryPermissionService {
    pub fn new(nodes: Arc<dyn NodeService>) -> Self {
        Self {
            nodes,
            entries: RwLock::new(HashMap::new()),
            groups: RwLock::new(HashMap::new()),
        }
    }

    pub fn set_permission(&self, node: NodeId, authority: impl Into<String>, permission: Permission) {
        self.entries
            .write()
            .entry(node)
            .or_default()
            .push((authority.into(), permission));
    }

    pub fn clear_permissions(&self, node: NodeId) {
        self.entries.write().remove(&node);
    }

    pub fn add_to_group(&self, group: impl Into<String>, user: impl Into<String>) {
        self.groups
            .write()
            .entry(group.into())
            .or_default()
            .insert(user.into());
    }

    fn authorities_of(&self, user: &str) -> HashSet<String> {
        let mut authorities: HashSet<String> = self
            .groups
            .read()
            .iter()
            .filter(|(_, members)| members.contains(user))
            .map(|(group, _)| group.clone())
            .collect();
        authorities.insert(user.to_string());
        authorities.insert(EVERYONE.to_string());
        authorities
    }

    fn acl_grants(&self, node: NodeId, authorities: &HashSet<String>, permission: Permission) -> bool {
        self.entries.read().get(&node).map_or(false, |entries| {
            entries
                .iter()
                .any(|(authority, held)| authorities.contains(authority) && held.implies(permission))
        })
    }

    async fn extended_grants(
        &self,
        node: NodeId,
        authorities: &HashSet<String>,
        permission: Permission,
    ) -> Result<bool, RepositoryError> {
        let holds = |key: PropertyKey| async move {
            let value = self.nodes.get_property(node, &key).await?;
            let extended = ExtendedAuthorities::from_property(value.as_ref());
            Ok::<_, RepositoryError>(authorities.iter().any(|a| extended.contains(a)))
        };
        match permission {
            Permission::ReadRecords => {
                Ok(holds(PropertyKey::ExtendedReaders).await? || holds(PropertyKey::ExtendedWriters).await?)
            }
            Permission::FileRecords => holds(PropertyKey::ExtendedWriters).await,
            _ => Ok(false),
        }
    }
}

#[async_trait]
impl PermissionService for InMemoryPermissionService {
    async fn has_permission(
        &self,
        principal: &Principal,
        node: NodeId,
        permission: Permission,
    ) -> Result<bool, RepositoryError> {
        let user = match principal {
            Principal::System => return Ok(true),
            Principal::User(name) => name,
        };
        let authorities = self.authorities_of(user);

        if self.extended_grants(node, &authorities, permission).await? {
            return Ok(true);
        }

        let mut current = Some(node);
        while let Some(id) = current {
            if self.acl_grants(id, &authorities, permission) {
                return Ok(true);
            }
            current = self.nodes.get_primary_parent(id).await?.map(|a| a.parent);
        }
        Ok(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::node::{AssocType, NodeType, PropertyMap};
    use crate::infrastructure::repositories::InMemoryNodeService;

    async fn plan_with_folder(store: &InMemoryNodeService) -> (NodeId, NodeId) {
        let plan = store.create_root_node(NodeType::FilePlan, PropertyMap::new()).await.unwrap();
        let folder = store
            .create_node(plan, AssocType::Contains, "f", NodeType::RecordFolder, PropertyMap::new())
            .await
            .unwrap()
            .child;
        (plan, folder)
    }

    #[tokio::test]
    async fn test_acl_is_inherited_down_primary_chain() {
        let store = InMemoryNodeService::new();
        let (plan, folder) = plan_with_folder(&store).await;
        let permissions = InMemoryPermissionService::new(Arc::new(store));
        permissions.set_permission(plan, "GROUP_records", Permission::FileRecords);
        permissions.add_to_group("GROUP_records", "alice");

        let alice = Principal::user("alice");
        assert!(permissions.has_permission(&alice, folder, Permission::ReadRecords).await.unwrap());
        assert!(permissions.has_permission(&alice, folder, Permission::FileRecords).await.unwrap());
        assert!(!permissions.has_permission(&alice, folder, Permission::DeleteRecords).await.unwrap());
        assert!(!permissions
            .has_permission(&Principal::user("bob"), folder, Permission::ReadRecords)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_system_always_allowed() {
        let store = InMemoryNodeService::new();
        let (_, folder) = plan_with_folder(&store).await;
        let permissions = InMemoryPermissionService::new(Arc::new(store));
        assert!(permissions
            .has_permission(&Principal::System, folder, Permission::ManageSecurity)
            .await
            .unwrap());
    }

    #[tokio::test]
    async fn test_extended_readers_grant_read_only() {
        let store = InMemoryNodeService::new();
        let (_, folder) = plan_with_folder(&store).await;
        let mut readers = ExtendedAuthorities::new();
        readers.add("carol");
        store
            .set_property(folder, PropertyKey::ExtendedReaders, readers.to_property())
            .await
            .unwrap();
        let permissions = InMemoryPermissionService::new(Arc::new(store));

        let carol = Principal::user("carol");
        assert!(permissions.has_permission(&carol, folder, Permission::ReadRecords).await.unwrap());
        assert!(!permissions.has_permission(&carol, folder, Permission::FileRecords).await.unwrap());
    }
}
