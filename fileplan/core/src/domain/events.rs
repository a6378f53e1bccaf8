// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::domain::node::NodeId;

/// Disposition lifecycle events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum DispositionEvent {
    ScheduleCreated {
        schedule_id: NodeId,
        container_id: NodeId,
        record_level: bool,
        created_at: DateTime<Utc>,
    },
    ActionDefinitionAdded {
        schedule_id: NodeId,
        definition_id: NodeId,
        action_name: String,
    },
    ActionDefinitionUpdated {
        schedule_id: NodeId,
        definition_id: NodeId,
        refreshed_actions: usize,
    },
    ActionDefinitionRemoved {
        schedule_id: NodeId,
        definition_id: NodeId,
    },
    ActionInitialised {
        node_id: NodeId,
        action_id: NodeId,
        action_name: String,
        as_of: Option<DateTime<Utc>>,
    },
    ActionAdvanced {
        node_id: NodeId,
        completed_action: Option<String>,
        next_action: Option<String>,
    },
    AsOfRecalculated {
        node_id: NodeId,
        action_name: String,
        previous: Option<DateTime<Utc>>,
        current: Option<DateTime<Utc>>,
    },
    EventCompleted {
        node_id: NodeId,
        event_name: String,
        completed_by: String,
    },
    EventUndone {
        node_id: NodeId,
        event_name: String,
    },
    CutOff {
        node_id: NodeId,
        cut_off_at: DateTime<Utc>,
    },
}

/// Security engine events
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum SecurityEvent {
    AccessDenied {
        method: String,
        user: String,
        reason: String,
        denied_at: DateTime<Utc>,
    },
    ResultsFiltered {
        original_size: usize,
        removed: usize,
        cut_off: bool,
    },
    ExtendedSecurityChanged {
        node_id: NodeId,
        readers: Vec<String>,
        writers: Vec<String>,
        added: bool,
    },
}
