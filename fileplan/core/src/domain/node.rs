// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Node Model
//!
//! Value objects describing the hierarchical node graph the records management
//! engine runs over: node identifiers, node types, aspects, association types,
//! property keys and typed property values.
//!
//! The graph itself is a generic property store (see
//! [`crate::domain::repository::NodeService`]). Typed records such as
//! [`crate::domain::disposition::DispositionAction`] are decoded from and
//! encoded into the [`PropertyMap`] of their node.
//!
//! # Architecture
//!
//! - **Layer:** Domain Layer
//! - **Purpose:** Node graph value objects

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, HashMap};
use uuid::Uuid;

// ============================================================================
// Value Objects
// ============================================================================

/// Unique identifier for a node in the graph
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct NodeId(pub Uuid);

impl NodeId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }

    pub fn from_string(s: &str) -> Result<Self, uuid::Error> {
        Ok(Self(Uuid::parse_str(s)?))
    }
}

impl Default for NodeId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Type of a node
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NodeType {
    FilePlan,
    RecordCategory,
    RecordFolder,
    Record,
    DispositionSchedule,
    DispositionActionDefinition,
    DispositionAction,
    EventExecution,
    Rendition,
    /// Plain repository folder outside the file plan
    Folder,
}

impl NodeType {
    /// Whether nodes of this type live inside the file plan hierarchy
    pub fn is_file_plan_type(&self) -> bool {
        matches!(
            self,
            NodeType::FilePlan
                | NodeType::RecordCategory
                | NodeType::RecordFolder
                | NodeType::Record
        )
    }
}

/// Marker aspects applied to nodes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Aspect {
    FilePlanComponent,
    /// Record category carrying a disposition schedule
    Scheduled,
    DispositionLifecycle,
    CutOff,
    UncutOff,
    ExtendedSecurity,
    Frozen,
}

/// Child association types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssocType {
    Contains,
    DispositionSchedule,
    DispositionActionDefinitions,
    NextDispositionAction,
    DispositionActionHistory,
    EventExecutions,
    Renditions,
}

/// Parent/child association between two nodes.
///
/// A node has exactly one primary parent association and any number of
/// secondary ones (a record filed into more than one folder).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChildAssoc {
    pub parent: NodeId,
    pub child: NodeId,
    pub assoc_type: AssocType,
    pub name: String,
    pub is_primary: bool,
}

/// Property keys known to the records management model
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PropertyKey {
    Name,
    Title,
    Created,
    Creator,
    Modified,
    DateFiled,
    PublicationDate,

    // schedule
    DispositionAuthority,
    DispositionInstructions,
    RecordLevelDisposition,

    // action definition
    DispositionActionName,
    DispositionActionLabel,
    DispositionDescription,
    DispositionPeriod,
    DispositionPeriodProperty,
    DispositionEvents,
    DispositionEventCombination,
    DispositionLocation,
    GhostOnDestroy,
    CombineDispositionStepConditions,

    // action instance
    DispositionActionId,
    DispositionAsOf,
    ManuallySetAsOf,
    DispositionEventsEligible,
    DispositionActionStartedAt,
    DispositionActionStartedBy,
    DispositionActionCompletedAt,
    DispositionActionCompletedBy,

    // event execution
    EventExecutionName,
    EventExecutionLabel,
    EventExecutionAutomatic,
    EventExecutionComplete,
    EventExecutionCompletedAt,
    EventExecutionCompletedBy,

    CutOffDate,
    IsClosed,
    ExtendedReaders,
    ExtendedWriters,

    /// Site-specific property, typically a date used as a period anchor
    Custom(String),
}

impl std::fmt::Display for PropertyKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            PropertyKey::Custom(name) => write!(f, "custom:{}", name),
            other => write!(f, "{:?}", other),
        }
    }
}

/// Typed property value
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "value", rename_all = "snake_case")]
pub enum PropertyValue {
    Text(String),
    Bool(bool),
    Int(i64),
    Date(DateTime<Utc>),
    TextList(Vec<String>),
    /// Reference-counted authority multiset
    AuthorityCounts(BTreeMap<String, u32>),
    Node(NodeId),
    /// Reference to another property, e.g. a period anchor
    Key(PropertyKey),
}

impl PropertyValue {
    pub fn text(value: impl Into<String>) -> Self {
        PropertyValue::Text(value.into())
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            PropertyValue::Text(s) => Some(s.as_str()),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            PropertyValue::Bool(b) => Some(*b),
            PropertyValue::Text(s) => s.parse().ok(),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            PropertyValue::Int(i) => Some(*i),
            _ => None,
        }
    }

    pub fn as_date(&self) -> Option<DateTime<Utc>> {
        match self {
            PropertyValue::Date(d) => Some(*d),
            _ => None,
        }
    }

    pub fn as_text_list(&self) -> Option<&[String]> {
        match self {
            PropertyValue::TextList(list) => Some(list.as_slice()),
            _ => None,
        }
    }

    pub fn as_key(&self) -> Option<&PropertyKey> {
        match self {
            PropertyValue::Key(key) => Some(key),
            _ => None,
        }
    }

    pub fn as_authority_counts(&self) -> Option<&BTreeMap<String, u32>> {
        match self {
            PropertyValue::AuthorityCounts(map) => Some(map),
            _ => None,
        }
    }
}

impl From<&str> for PropertyValue {
    fn from(value: &str) -> Self {
        PropertyValue::Text(value.to_string())
    }
}

impl From<String> for PropertyValue {
    fn from(value: String) -> Self {
        PropertyValue::Text(value)
    }
}

impl From<bool> for PropertyValue {
    fn from(value: bool) -> Self {
        PropertyValue::Bool(value)
    }
}

impl From<DateTime<Utc>> for PropertyValue {
    fn from(value: DateTime<Utc>) -> Self {
        PropertyValue::Date(value)
    }
}

/// Property bag of a single node
pub type PropertyMap = HashMap<PropertyKey, PropertyValue>;

/// Typed accessors over a [`PropertyMap`]
pub trait PropertyMapExt {
    fn text(&self, key: &PropertyKey) -> Option<&str>;
    fn boolean(&self, key: &PropertyKey) -> Option<bool>;
    fn date(&self, key: &PropertyKey) -> Option<DateTime<Utc>>;
    fn int(&self, key: &PropertyKey) -> Option<i64>;
    fn text_list(&self, key: &PropertyKey) -> Vec<String>;
    fn key(&self, key: &PropertyKey) -> Option<&PropertyKey>;
}

impl PropertyMapExt for PropertyMap {
    fn text(&self, key: &PropertyKey) -> Option<&str> {
        self.get(key).and_then(PropertyValue::as_text)
    }

    fn boolean(&self, key: &PropertyKey) -> Option<bool> {
        self.get(key).and_then(PropertyValue::as_bool)
    }

    fn date(&self, key: &PropertyKey) -> Option<DateTime<Utc>> {
        self.get(key).and_then(PropertyValue::as_date)
    }

    fn int(&self, key: &PropertyKey) -> Option<i64> {
        self.get(key).and_then(PropertyValue::as_int)
    }

    fn text_list(&self, key: &PropertyKey) -> Vec<String> {
        self.get(key)
            .and_then(PropertyValue::as_text_list)
            .map(|list| list.to_vec())
            .unwrap_or_default()
    }

    fn key(&self, key: &PropertyKey) -> Option<&PropertyKey> {
        self.get(key).and_then(PropertyValue::as_key)
    }
}
