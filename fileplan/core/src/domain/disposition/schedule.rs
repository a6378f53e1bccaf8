// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Read-only projection of a disposition schedule node.
//!
//! The ordered action definitions are loaded once, on first access, and indexed
//! by node id, by legacy import name and by disposition action name. The load
//! reads straight from the node service, which applies no capability checks,
//! so schedule introspection is never blocked by the caller's permissions.

use std::collections::HashMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::OnceCell;
use tracing::debug;

use super::action_definition::DispositionActionDefinition;
use super::DispositionError;
use crate::domain::node::{AssocType, NodeId, PropertyKey, PropertyMap, PropertyMapExt, PropertyValue};
use crate::domain::repository::NodeService;

/// Properties supplied when a schedule is created
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleParams {
    pub authority: Option<String>,
    pub instructions: Option<String>,
    /// Steps apply to each record rather than to the folder as a whole
    pub record_level: bool,
}

impl ScheduleParams {
    pub fn record_level() -> Self {
        Self {
            record_level: true,
            ..Self::default()
        }
    }

    pub fn folder_level() -> Self {
        Self::default()
    }

    pub fn authority(mut self, authority: impl Into<String>) -> Self {
        self.authority = Some(authority.into());
        self
    }

    pub fn instructions(mut self, instructions: impl Into<String>) -> Self {
        self.instructions = Some(instructions.into());
        self
    }

    pub fn to_properties(&self) -> PropertyMap {
        let mut props = PropertyMap::new();
        if let Some(authority) = &self.authority {
            props.insert(PropertyKey::DispositionAuthority, PropertyValue::text(authority));
        }
        if let Some(instructions) = &self.instructions {
            props.insert(PropertyKey::DispositionInstructions, PropertyValue::text(instructions));
        }
        props.insert(PropertyKey::RecordLevelDisposition, self.record_level.into());
        props
    }
}

#[derive(Debug, Default)]
struct DefinitionIndex {
    definitions: Vec<DispositionActionDefinition>,
    by_id: HashMap<NodeId, usize>,
    by_legacy_name: HashMap<String, usize>,
    by_name: HashMap<String, usize>,
}

pub struct DispositionSchedule {
    node_id: NodeId,
    authority: Option<String>,
    instructions: Option<String>,
    record_level: bool,
    node_service: Arc<dyn NodeService>,
    index: OnceCell<DefinitionIndex>,
}

impl std::fmt::Debug for DispositionSchedule {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DispositionSchedule")
            .field("node_id", &self.node_id)
            .field("authority", &self.authority)
            .field("record_level", &self.record_level)
            .field("loaded", &self.index.initialized())
            .finish()
    }
}

impl DispositionSchedule {
    pub async fn load(
        node_service: Arc<dyn NodeService>,
        node_id: NodeId,
    ) -> Result<Self, DispositionError> {
        let props = node_service.get_properties(node_id).await?;
        Ok(Self {
            node_id,
            authority: props.text(&PropertyKey::DispositionAuthority).map(str::to_string),
            instructions: props
                .text(&PropertyKey::DispositionInstructions)
                .map(str::to_string),
            record_level: props
                .boolean(&PropertyKey::RecordLevelDisposition)
                .unwrap_or(false),
            node_service,
            index: OnceCell::new(),
        })
    }

    pub fn node_id(&self) -> NodeId {
        self.node_id
    }

    pub fn authority(&self) -> Option<&str> {
        self.authority.as_deref()
    }

    pub fn instructions(&self) -> Option<&str> {
        self.instructions.as_deref()
    }

    pub fn is_record_level(&self) -> bool {
        self.record_level
    }

    async fn index(&self) -> Result<&DefinitionIndex, DispositionError> {
        self.index
            .get_or_try_init(|| async {
                let assocs = self
                    .node_service
                    .get_child_assocs(self.node_id, Some(AssocType::DispositionActionDefinitions), None)
                    .await?;

                let mut index = DefinitionIndex::default();
                for (position, assoc) in assocs.iter().enumerate() {
                    let props = self.node_service.get_properties(assoc.child).await?;
                    let definition = DispositionActionDefinition::from_properties(
                        assoc.child,
                        &assoc.name,
                        position,
                        &props,
                    )?;
                    index.by_id.insert(definition.id, position);
                    index.by_legacy_name.insert(definition.legacy_name.clone(), position);
                    index.by_name.entry(definition.name.clone()).or_insert(position);
                    index.definitions.push(definition);
                }
                debug!(
                    "Loaded {} action definitions for schedule {}",
                    index.definitions.len(),
                    self.node_id
                );
                Ok::<_, DispositionError>(index)
            })
            .await
    }

    /// Action definitions in lifecycle order
    pub async fn action_definitions(&self) -> Result<&[DispositionActionDefinition], DispositionError> {
        Ok(self.index().await?.definitions.as_slice())
    }

    /// Look up by node id, falling back to the legacy import name
    pub async fn action_definition(
        &self,
        id: &str,
    ) -> Result<Option<&DispositionActionDefinition>, DispositionError> {
        let index = self.index().await?;
        let position = NodeId::from_string(id)
            .ok()
            .and_then(|node| index.by_id.get(&node))
            .or_else(|| index.by_legacy_name.get(id));
        Ok(position.map(|p| &index.definitions[*p]))
    }

    pub async fn action_definition_by_name(
        &self,
        name: &str,
    ) -> Result<Option<&DispositionActionDefinition>, DispositionError> {
        let index = self.index().await?;
        Ok(index.by_name.get(name).map(|p| &index.definitions[*p]))
    }

    /// Definition following `current` in lifecycle order
    pub async fn next_action_definition(
        &self,
        current: &DispositionActionDefinition,
    ) -> Result<Option<&DispositionActionDefinition>, DispositionError> {
        let index = self.index().await?;
        Ok(index.definitions.get(current.index + 1))
    }
}
