// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::action_definition::DispositionActionDefinition;
use super::DispositionError;
use crate::domain::node::{NodeId, PropertyKey, PropertyMap, PropertyMapExt, PropertyValue};

/// Live disposition step attached to a disposable node.
///
/// Decoded from the action node's properties. The event completion records
/// live on child nodes and are read separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispositionAction {
    pub node_id: NodeId,
    /// Id of the definition this step was created from
    pub action_definition_id: String,
    pub name: String,
    pub label: String,
    /// `None` means the step is never due on a date
    pub as_of: Option<DateTime<Utc>>,
    pub manually_set_as_of: bool,
    pub events_eligible: bool,
    pub started_at: Option<DateTime<Utc>>,
    pub started_by: Option<String>,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
}

impl DispositionAction {
    pub fn initial_properties(
        definition: &DispositionActionDefinition,
        as_of: Option<DateTime<Utc>>,
    ) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert(
            PropertyKey::DispositionActionId,
            PropertyValue::text(definition.id.to_string()),
        );
        props.insert(PropertyKey::DispositionActionName, PropertyValue::text(&definition.name));
        props.insert(PropertyKey::DispositionActionLabel, PropertyValue::text(&definition.label));
        props.insert(PropertyKey::DispositionEventsEligible, false.into());
        if let Some(as_of) = as_of {
            props.insert(PropertyKey::DispositionAsOf, as_of.into());
        }
        props
    }

    pub fn from_properties(node_id: NodeId, props: &PropertyMap) -> Result<Self, DispositionError> {
        let name = props
            .text(&PropertyKey::DispositionActionName)
            .ok_or(DispositionError::MissingProperty {
                node: node_id,
                key: PropertyKey::DispositionActionName,
            })?
            .to_string();
        Ok(Self {
            node_id,
            action_definition_id: props
                .text(&PropertyKey::DispositionActionId)
                .unwrap_or_default()
                .to_string(),
            label: props
                .text(&PropertyKey::DispositionActionLabel)
                .unwrap_or(&name)
                .to_string(),
            name,
            as_of: props.date(&PropertyKey::DispositionAsOf),
            manually_set_as_of: props.boolean(&PropertyKey::ManuallySetAsOf).unwrap_or(false),
            events_eligible: props
                .boolean(&PropertyKey::DispositionEventsEligible)
                .unwrap_or(false),
            started_at: props.date(&PropertyKey::DispositionActionStartedAt),
            started_by: props
                .text(&PropertyKey::DispositionActionStartedBy)
                .map(str::to_string),
            completed_at: props.date(&PropertyKey::DispositionActionCompletedAt),
            completed_by: props
                .text(&PropertyKey::DispositionActionCompletedBy)
                .map(str::to_string),
        })
    }

    pub fn is_started(&self) -> bool {
        self.started_at.is_some()
    }

    pub fn is_complete(&self) -> bool {
        self.completed_at.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::disposition::action_definition::ActionDefinitionParams;
    use crate::domain::disposition::period::Period;
    use chrono::TimeZone;

    #[test]
    fn test_initial_properties_decode_to_pending_action() {
        let definition = DispositionActionDefinition::from_properties(
            NodeId::new(),
            "retain",
            0,
            &ActionDefinitionParams::new("retain")
                .label("Retain")
                .period(Period::years(5))
                .to_properties(),
        )
        .unwrap();
        let as_of = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();

        let node = NodeId::new();
        let action =
            DispositionAction::from_properties(node, &DispositionAction::initial_properties(&definition, Some(as_of)))
                .unwrap();

        assert_eq!(action.name, "retain");
        assert_eq!(action.label, "Retain");
        assert_eq!(action.action_definition_id, definition.id.to_string());
        assert_eq!(action.as_of, Some(as_of));
        assert!(!action.is_started());
        assert!(!action.is_complete());
        assert!(!action.manually_set_as_of);
    }
}
