// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Disposition Domain
//!
//! Retention model of the file plan: schedules, their ordered action
//! definitions, the live action attached to each disposable node, event
//! completion records, periods and the as-of reconciliation rules.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Disposition lifecycle value objects and read models

pub mod action;
pub mod action_definition;
pub mod event;
pub mod period;
pub mod reconciliation;
pub mod schedule;

pub use action::DispositionAction;
pub use action_definition::{
    ActionDefinitionParams, DispositionActionDefinition, EventCombination, ACCESSION,
};
pub use event::{EventCatalog, EventCompletionDetails, RecordsManagementEvent};
pub use period::{Period, PeriodType};
pub use reconciliation::{compare_as_of, WriteMode};
pub use schedule::{DispositionSchedule, ScheduleParams};

use thiserror::Error;

use crate::domain::node::{NodeId, PropertyKey};
use crate::domain::repository::RepositoryError;
use crate::domain::transaction::RetryableError;

#[derive(Debug, Error)]
pub enum DispositionError {
    #[error("Disposition schedules can only be created on record categories, {0} is not one")]
    NotRecordCategory(NodeId),

    #[error("Record category {0} already has a disposition schedule")]
    ScheduleAlreadyExists(NodeId),

    #[error("Disposable items beneath {0} are already governed by another disposition schedule")]
    DisposableItemsGoverned(NodeId),

    #[error("Schedule {0} has disposable items, its action definitions cannot be removed")]
    DisposableItemsExist(NodeId),

    #[error("Unable to perform cutoff on {0}, because node is frozen or has frozen children")]
    AlreadyCutOff(NodeId),

    #[error("Node {0} is not a disposable item")]
    NotDisposable(NodeId),

    #[error("Node {0} is not a file plan component")]
    NotFilePlanComponent(NodeId),

    #[error("More than one event named '{event}' on disposition action {action}")]
    AmbiguousEvent { action: NodeId, event: String },

    #[error("No event named '{event}' on disposition action {action}")]
    UnknownEvent { action: NodeId, event: String },

    #[error("Action definition name is required")]
    MissingActionName,

    #[error("Action definition '{0}' not found in schedule")]
    UnknownActionDefinition(String),

    #[error("Node {0} has no next disposition action")]
    NoNextAction(NodeId),

    #[error("Invalid disposition period '{0}'")]
    InvalidPeriod(String),

    #[error("Node {node} is missing property {key}")]
    MissingProperty { node: NodeId, key: PropertyKey },

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

impl RetryableError for DispositionError {
    fn is_retryable(&self) -> bool {
        match self {
            DispositionError::Repository(e) => e.is_retryable(),
            _ => false,
        }
    }
}
