// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use async_trait::async_trait;

use super::{Permission, Principal};
use crate::domain::node::NodeId;
use crate::domain::repository::RepositoryError;

/// Base repository permission model capabilities are layered over
#[async_trait]
pub trait PermissionService: Send + Sync {
    async fn has_permission(
        &self,
        principal: &Principal,
        node: NodeId,
        permission: Permission,
    ) -> Result<bool, RepositoryError>;
}
