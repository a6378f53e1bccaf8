// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::DispositionError;
use crate::domain::node::{NodeId, PropertyKey, PropertyMap, PropertyMapExt, PropertyValue};

/// Event that can gate a disposition step (case closed, superseded, ...)
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordsManagementEvent {
    pub name: String,
    pub label: String,
    /// Completed by the system rather than by a user
    #[serde(default)]
    pub automatic: bool,
}

impl RecordsManagementEvent {
    pub fn new(name: impl Into<String>, label: impl Into<String>, automatic: bool) -> Self {
        Self {
            name: name.into(),
            label: label.into(),
            automatic,
        }
    }
}

/// Catalog of known events, looked up by name
#[derive(Debug, Clone, Default)]
pub struct EventCatalog {
    events: HashMap<String, RecordsManagementEvent>,
}

impl EventCatalog {
    pub fn new() -> Self {
        Self::default()
    }

    /// The standard records management events
    pub fn standard() -> Self {
        let mut catalog = Self::new();
        for (name, label, automatic) in [
            ("abolished", "Abolished", false),
            ("all_allowances_granted_are_terminated", "All Allowances Granted are Terminated", false),
            ("case_closed", "Case Closed", false),
            ("declassification_review", "Declassification Review", false),
            ("no_longer_needed", "No Longer Needed", false),
            ("obsolete", "Obsolete", false),
            ("redesignation", "Redesignation", false),
            ("separation", "Separation", false),
            ("study_complete", "Study Complete", false),
            ("superseded", "Superseded", true),
            ("training_complete", "Training Complete", false),
            ("versioned", "Versioned", true),
        ] {
            catalog.register(RecordsManagementEvent::new(name, label, automatic));
        }
        catalog
    }

    pub fn register(&mut self, event: RecordsManagementEvent) {
        self.events.insert(event.name.clone(), event);
    }

    pub fn get(&self, name: &str) -> Option<&RecordsManagementEvent> {
        self.events.get(name)
    }

    /// Known event, or an ad hoc manual event labelled with its name
    pub fn resolve(&self, name: &str) -> RecordsManagementEvent {
        self.get(name)
            .cloned()
            .unwrap_or_else(|| RecordsManagementEvent::new(name, name, false))
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }
}

/// Completion state of one event on a live disposition action
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventCompletionDetails {
    pub node_id: NodeId,
    pub event_name: String,
    pub event_label: String,
    pub automatic: bool,
    pub complete: bool,
    pub completed_at: Option<DateTime<Utc>>,
    pub completed_by: Option<String>,
}

impl EventCompletionDetails {
    /// Properties of a fresh, incomplete event execution node
    pub fn pending_properties(event: &RecordsManagementEvent) -> PropertyMap {
        let mut props = PropertyMap::new();
        props.insert(PropertyKey::EventExecutionName, PropertyValue::text(&event.name));
        props.insert(PropertyKey::EventExecutionLabel, PropertyValue::text(&event.label));
        props.insert(PropertyKey::EventExecutionAutomatic, event.automatic.into());
        props.insert(PropertyKey::EventExecutionComplete, false.into());
        props
    }

    pub fn from_properties(node_id: NodeId, props: &PropertyMap) -> Result<Self, DispositionError> {
        let event_name = props
            .text(&PropertyKey::EventExecutionName)
            .ok_or(DispositionError::MissingProperty {
                node: node_id,
                key: PropertyKey::EventExecutionName,
            })?
            .to_string();
        Ok(Self {
            node_id,
            event_label: props
                .text(&PropertyKey::EventExecutionLabel)
                .unwrap_or(&event_name)
                .to_string(),
            event_name,
            automatic: props.boolean(&PropertyKey::EventExecutionAutomatic).unwrap_or(false),
            complete: props.boolean(&PropertyKey::EventExecutionComplete).unwrap_or(false),
            completed_at: props.date(&PropertyKey::EventExecutionCompletedAt),
            completed_by: props
                .text(&PropertyKey::EventExecutionCompletedBy)
                .map(str::to_string),
        })
    }
}
