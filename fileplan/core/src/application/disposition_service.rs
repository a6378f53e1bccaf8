// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # Disposition Resolution Engine
//!
//! Resolves which disposition schedule governs a node, maintains the live
//! disposition action on each disposable item and decides when that action is
//! eligible.
//!
//! A record filed in several folders may sit under several schedules. The
//! engine reconciles them so the record's next action carries the latest
//! as-of date any governing schedule yields for the same action name, with
//! "never due" beating every date. Stored as-of dates only ever move later.
//!
//! Queries may be called inside read-only transactions. Any write they need
//! (first action creation, as-of reconciliation) runs under the system
//! identity in a nested read-write transaction.

use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::application::file_plan::{FilePlanComponentKind, FilePlanService};
use crate::application::transaction_helper::RetryingTransactionHelper;
use crate::domain::disposition::{
    compare_as_of, ActionDefinitionParams, DispositionAction, DispositionActionDefinition,
    DispositionError, DispositionSchedule, EventCatalog, EventCompletionDetails,
    RecordsManagementEvent, ScheduleParams, WriteMode, ACCESSION,
};
use crate::domain::events::DispositionEvent;
use crate::domain::node::{
    Aspect, AssocType, NodeId, NodeType, PropertyKey, PropertyMap, PropertyValue,
};
use crate::domain::repository::NodeService;
use crate::domain::transaction::TransactionContext;
use crate::infrastructure::event_bus::EventBus;

/// Read side of the engine
#[async_trait]
pub trait DispositionQueryService: Send + Sync {
    /// Schedule attached directly to a file plan container
    async fn get_associated_disposition_schedule(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<Option<Arc<DispositionSchedule>>, DispositionError>;

    async fn get_associated_records_management_container(
        &self,
        ctx: &TransactionContext,
        schedule: NodeId,
    ) -> Result<Option<NodeId>, DispositionError>;

    /// Schedule governing `node`. For records this reconciles the next action
    /// across every folder the record is filed in.
    async fn get_disposition_schedule(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<Option<Arc<DispositionSchedule>>, DispositionError>;

    async fn has_disposable_items(
        &self,
        ctx: &TransactionContext,
        schedule: &DispositionSchedule,
    ) -> Result<bool, DispositionError>;

    async fn get_disposable_items(
        &self,
        ctx: &TransactionContext,
        schedule: &DispositionSchedule,
    ) -> Result<Vec<NodeId>, DispositionError>;

    async fn is_disposable_item(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<bool, DispositionError>;

    async fn get_next_disposition_action(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<Option<DispositionAction>, DispositionError>;

    /// Completed actions, oldest first
    async fn get_completed_disposition_actions(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<Vec<DispositionAction>, DispositionError>;

    async fn get_last_completed_disposition_action(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<Option<DispositionAction>, DispositionError>;

    async fn get_event_completion_details(
        &self,
        ctx: &TransactionContext,
        action: &DispositionAction,
    ) -> Result<Vec<EventCompletionDetails>, DispositionError>;

    async fn get_event_completion_detail(
        &self,
        ctx: &TransactionContext,
        action: &DispositionAction,
        event_name: &str,
    ) -> Result<Option<EventCompletionDetails>, DispositionError>;

    async fn calculate_as_of_date(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
        definition: &DispositionActionDefinition,
    ) -> Result<Option<DateTime<Utc>>, DispositionError>;

    /// As-of date `schedule` would give `record` for the named action
    async fn get_disposition_action_date(
        &self,
        ctx: &TransactionContext,
        record: NodeId,
        schedule: &DispositionSchedule,
        action_name: &str,
    ) -> Result<Option<DateTime<Utc>>, DispositionError>;

    async fn is_next_disposition_action_eligible(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<bool, DispositionError>;

    async fn is_cutoff(&self, ctx: &TransactionContext, node: NodeId) -> Result<bool, DispositionError>;

    async fn is_frozen_or_has_frozen_children(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<bool, DispositionError>;
}

/// Write side of the engine
#[async_trait]
pub trait DispositionLifecycleService: DispositionQueryService {
    async fn create_disposition_schedule(
        &self,
        ctx: &TransactionContext,
        container: NodeId,
        params: ScheduleParams,
    ) -> Result<Arc<DispositionSchedule>, DispositionError>;

    async fn add_disposition_action_definition(
        &self,
        ctx: &TransactionContext,
        schedule: &DispositionSchedule,
        params: ActionDefinitionParams,
    ) -> Result<DispositionActionDefinition, DispositionError>;

    /// Merge `params` into a definition and refresh the live actions created
    /// from it
    async fn update_disposition_action_definition(
        &self,
        ctx: &TransactionContext,
        schedule: &DispositionSchedule,
        definition_id: NodeId,
        params: ActionDefinitionParams,
    ) -> Result<DispositionActionDefinition, DispositionError>;

    async fn remove_disposition_action_definition(
        &self,
        ctx: &TransactionContext,
        schedule: &DispositionSchedule,
        definition_id: NodeId,
    ) -> Result<(), DispositionError>;

    async fn on_file_record(&self, ctx: &TransactionContext, record: NodeId) -> Result<(), DispositionError>;

    /// Create the first action of a node newly placed under a schedule
    async fn refresh_disposition_action(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<(), DispositionError>;

    /// Move the current action to history and create the next one
    async fn update_next_disposition_action(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<(), DispositionError>;

    async fn start_next_disposition_action(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
        started_at: Option<DateTime<Utc>>,
        started_by: Option<String>,
    ) -> Result<DispositionAction, DispositionError>;

    /// Complete the current action and advance. Returns the completed action.
    async fn complete_next_disposition_action(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
        completed_at: Option<DateTime<Utc>>,
        completed_by: Option<String>,
    ) -> Result<DispositionAction, DispositionError>;

    /// Manually override the next action's as-of date. Reconciliation no
    /// longer rewrites it afterwards.
    async fn set_disposition_as_of(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<(), DispositionError>;

    async fn complete_event(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
        event_name: &str,
        completed_at: Option<DateTime<Utc>>,
        completed_by: Option<String>,
    ) -> Result<(), DispositionError>;

    async fn undo_event(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
        event_name: &str,
    ) -> Result<(), DispositionError>;

    /// Align the next action's event executions with its definition
    async fn refresh_events(&self, ctx: &TransactionContext, node: NodeId) -> Result<(), DispositionError>;

    async fn cutoff_disposable_item(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<(), DispositionError>;

    /// Re-run reconciliation for a record after its filing changed
    async fn recalculate_next_disposition_step(
        &self,
        ctx: &TransactionContext,
        record: NodeId,
    ) -> Result<(), DispositionError>;
}

/// Outcome of reconciling a record's next action across its folders
#[derive(Debug, Clone)]
struct ReconciledAction {
    schedule: NodeId,
    action: NodeId,
    definition_id: NodeId,
    action_name: String,
    action_label: String,
    as_of: Option<DateTime<Utc>>,
    write_mode: WriteMode,
}

pub struct StandardDispositionService {
    nodes: Arc<dyn NodeService>,
    file_plan: Arc<FilePlanService>,
    transactions: Arc<RetryingTransactionHelper>,
    events: Arc<EventCatalog>,
    event_bus: Arc<EventBus>,
}

impl StandardDispositionService {
    pub fn new(
        nodes: Arc<dyn NodeService>,
        file_plan: Arc<FilePlanService>,
        transactions: Arc<RetryingTransactionHelper>,
        events: Arc<EventCatalog>,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            nodes,
            file_plan,
            transactions,
            events,
            event_bus,
        }
    }

    async fn load_schedule(&self, schedule: NodeId) -> Result<Arc<DispositionSchedule>, DispositionError> {
        Ok(Arc::new(DispositionSchedule::load(self.nodes.clone(), schedule).await?))
    }

    async fn associated_schedule_node(&self, container: NodeId) -> Result<Option<NodeId>, DispositionError> {
        Ok(self
            .nodes
            .get_child_assocs(container, Some(AssocType::DispositionSchedule), Some(1))
            .await?
            .first()
            .map(|a| a.child))
    }

    /// Schedule on `node` itself or on the nearest enclosing record category
    async fn container_schedule(&self, node: NodeId) -> Result<Option<NodeId>, DispositionError> {
        let mut current = node;
        loop {
            if let Some(schedule) = self.associated_schedule_node(current).await? {
                return Ok(Some(schedule));
            }
            match self.nodes.get_primary_parent(current).await? {
                Some(parent) if self.file_plan.is_record_category(parent.parent).await? => {
                    current = parent.parent;
                }
                _ => return Ok(None),
            }
        }
    }

    /// Schedule a record inherits through its primary filing location
    async fn origin_schedule(&self, record: NodeId) -> Result<Option<NodeId>, DispositionError> {
        let mut current = record;
        while let Some(parent) = self.nodes.get_primary_parent(current).await? {
            if self.file_plan.is_record_category(parent.parent).await? {
                if let Some(schedule) = self.associated_schedule_node(parent.parent).await? {
                    return Ok(Some(schedule));
                }
            }
            current = parent.parent;
        }
        Ok(None)
    }

    async fn next_action_node(&self, node: NodeId) -> Result<Option<NodeId>, DispositionError> {
        Ok(self
            .nodes
            .get_child_assocs(node, Some(AssocType::NextDispositionAction), Some(1))
            .await?
            .first()
            .map(|a| a.child))
    }

    async fn load_action(&self, action: NodeId) -> Result<DispositionAction, DispositionError> {
        let props = self.nodes.get_properties(action).await?;
        DispositionAction::from_properties(action, &props)
    }

    async fn next_action(&self, node: NodeId) -> Result<Option<DispositionAction>, DispositionError> {
        match self.next_action_node(node).await? {
            Some(action) => Ok(Some(self.load_action(action).await?)),
            None => Ok(None),
        }
    }

    async fn require_next_action(&self, node: NodeId) -> Result<DispositionAction, DispositionError> {
        self.next_action(node)
            .await?
            .ok_or(DispositionError::NoNextAction(node))
    }

    async fn completed_actions(&self, node: NodeId) -> Result<Vec<DispositionAction>, DispositionError> {
        let assocs = self
            .nodes
            .get_child_assocs(node, Some(AssocType::DispositionActionHistory), None)
            .await?;
        let mut actions = Vec::with_capacity(assocs.len());
        for assoc in assocs {
            actions.push(self.load_action(assoc.child).await?);
        }
        Ok(actions)
    }

    async fn property_date(
        &self,
        node: NodeId,
        key: &PropertyKey,
    ) -> Result<Option<DateTime<Utc>>, DispositionError> {
        Ok(self
            .nodes
            .get_property(node, key)
            .await?
            .and_then(|v| v.as_date()))
    }

    async fn write_properties(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
        props: PropertyMap,
    ) -> Result<(), DispositionError> {
        self.transactions
            .ensure_writable(&ctx.as_system(), move |_tx| {
                let props = props.clone();
                async move {
                    self.nodes
                        .add_properties(node, props)
                        .await
                        .map_err(DispositionError::from)
                }
            })
            .await
    }

    async fn remove_properties(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
        keys: Vec<PropertyKey>,
    ) -> Result<(), DispositionError> {
        self.transactions
            .ensure_writable(&ctx.as_system(), move |_tx| {
                let keys = keys.clone();
                async move {
                    for key in &keys {
                        self.nodes.remove_property(node, key).await?;
                    }
                    Ok::<_, DispositionError>(())
                }
            })
            .await
    }

    /// Period applied to the anchor date chosen by the definition
    async fn compute_as_of(
        &self,
        node: NodeId,
        definition: &DispositionActionDefinition,
    ) -> Result<Option<DateTime<Utc>>, DispositionError> {
        let Some(period) = definition.period else {
            return Ok(None);
        };

        let context_date = match &definition.period_property {
            Some(PropertyKey::DispositionAsOf) => match self.completed_actions(node).await?.pop() {
                Some(last) => last.completed_at,
                None => self.property_date(node, &PropertyKey::DispositionAsOf).await?,
            },
            Some(key) => self.property_date(node, key).await?,
            None if period.is_immediate() => self.property_date(node, &PropertyKey::Created).await?,
            None => Some(Utc::now()),
        };

        Ok(context_date.and_then(|from| period.next_date(from)))
    }

    /// Definition a live action was created from, without reconciling
    async fn definition_for_action(
        &self,
        item: NodeId,
        action: &DispositionAction,
    ) -> Result<Option<DispositionActionDefinition>, DispositionError> {
        if let Ok(definition_node) = NodeId::from_string(&action.action_definition_id) {
            if self.nodes.exists(definition_node).await? {
                if let Some(parent) = self.nodes.get_primary_parent(definition_node).await? {
                    let schedule = DispositionSchedule::load(self.nodes.clone(), parent.parent).await?;
                    if let Some(definition) = schedule.action_definition(&action.action_definition_id).await? {
                        return Ok(Some(definition.clone()));
                    }
                }
            }
        }

        let schedule = if self.file_plan.is_record(item).await? {
            self.origin_schedule(item).await?
        } else {
            self.container_schedule(item).await?
        };
        let Some(schedule) = schedule else {
            return Ok(None);
        };
        let schedule = DispositionSchedule::load(self.nodes.clone(), schedule).await?;
        match schedule.action_definition(&action.action_definition_id).await? {
            Some(definition) => Ok(Some(definition.clone())),
            None => Ok(schedule.action_definition_by_name(&action.name).await?.cloned()),
        }
    }

    async fn event_details(&self, action: NodeId) -> Result<Vec<EventCompletionDetails>, DispositionError> {
        let assocs = self
            .nodes
            .get_child_assocs(action, Some(AssocType::EventExecutions), None)
            .await?;
        let mut details = Vec::with_capacity(assocs.len());
        for assoc in assocs {
            let props = self.nodes.get_properties(assoc.child).await?;
            details.push(EventCompletionDetails::from_properties(assoc.child, &props)?);
        }
        Ok(details)
    }

    async fn event_detail(
        &self,
        action: NodeId,
        event_name: &str,
    ) -> Result<Option<EventCompletionDetails>, DispositionError> {
        let assocs = self
            .nodes
            .get_child_assocs_by_property_value(
                action,
                AssocType::EventExecutions,
                &PropertyKey::EventExecutionName,
                &PropertyValue::text(event_name),
            )
            .await?;
        match assocs.as_slice() {
            [] => Ok(None),
            [assoc] => {
                let props = self.nodes.get_properties(assoc.child).await?;
                Ok(Some(EventCompletionDetails::from_properties(assoc.child, &props)?))
            }
            _ => Err(DispositionError::AmbiguousEvent {
                action,
                event: event_name.to_string(),
            }),
        }
    }

    /// Recompute and store the events-eligible flag of `action`
    async fn update_events_eligible(
        &self,
        ctx: &TransactionContext,
        item: NodeId,
        action: &DispositionAction,
    ) -> Result<bool, DispositionError> {
        let details = self.event_details(action.node_id).await?;
        let eligible = match self.definition_for_action(item, action).await? {
            Some(definition) => definition.event_combination.is_satisfied(&details),
            None => false,
        };
        if eligible != action.events_eligible {
            let mut props = PropertyMap::new();
            props.insert(PropertyKey::DispositionEventsEligible, eligible.into());
            self.write_properties(ctx, action.node_id, props).await?;
        }
        Ok(eligible)
    }

    /// Create missing event executions and drop those the definition no
    /// longer lists. Returns whether anything changed.
    async fn sync_event_executions(
        &self,
        ctx: &TransactionContext,
        action: &DispositionAction,
        definition: &DispositionActionDefinition,
    ) -> Result<bool, DispositionError> {
        let details = self.event_details(action.node_id).await?;
        let present: HashSet<&str> = details.iter().map(|d| d.event_name.as_str()).collect();

        let missing: Vec<RecordsManagementEvent> = definition
            .events
            .iter()
            .filter(|name| !present.contains(name.as_str()))
            .map(|name| self.events.resolve(name))
            .collect();
        let stale: Vec<NodeId> = details
            .iter()
            .filter(|d| !definition.events.contains(&d.event_name))
            .map(|d| d.node_id)
            .collect();

        if missing.is_empty() && stale.is_empty() {
            return Ok(false);
        }

        let action_node = action.node_id;
        self.transactions
            .ensure_writable(&ctx.as_system(), move |_tx| {
                let missing = missing.clone();
                let stale = stale.clone();
                async move {
                    for event in &missing {
                        self.nodes
                            .create_node(
                                action_node,
                                AssocType::EventExecutions,
                                &event.name,
                                NodeType::EventExecution,
                                EventCompletionDetails::pending_properties(event),
                            )
                            .await?;
                    }
                    for execution in &stale {
                        self.nodes.remove_child(action_node, *execution).await?;
                    }
                    Ok::<_, DispositionError>(())
                }
            })
            .await?;
        Ok(true)
    }

    /// Attach the action for `definition` to `node` unless one is already live
    async fn initialise_disposition_action(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
        definition: &DispositionActionDefinition,
    ) -> Result<DispositionAction, DispositionError> {
        if let Some(existing) = self.next_action_node(node).await? {
            return self.load_action(existing).await;
        }

        let as_of = self.compute_as_of(node, definition).await?;
        let props = DispositionAction::initial_properties(definition, as_of);
        let events: Vec<RecordsManagementEvent> = definition
            .events
            .iter()
            .map(|name| self.events.resolve(name))
            .collect();
        let name = definition.name.clone();

        let action_node = self
            .transactions
            .ensure_writable(&ctx.as_system(), move |_tx| {
                let props = props.clone();
                let events = events.clone();
                let name = name.clone();
                async move {
                    if !self.nodes.has_aspect(node, Aspect::DispositionLifecycle).await? {
                        self.nodes
                            .add_aspect(node, Aspect::DispositionLifecycle, PropertyMap::new())
                            .await?;
                    }
                    let action = self
                        .nodes
                        .create_node(
                            node,
                            AssocType::NextDispositionAction,
                            &name,
                            NodeType::DispositionAction,
                            props,
                        )
                        .await?
                        .child;
                    for event in &events {
                        self.nodes
                            .create_node(
                                action,
                                AssocType::EventExecutions,
                                &event.name,
                                NodeType::EventExecution,
                                EventCompletionDetails::pending_properties(event),
                            )
                            .await?;
                    }
                    Ok::<_, DispositionError>(action)
                }
            })
            .await?;

        info!(
            "Initialised disposition action '{}' on {} (as of {:?})",
            definition.name, node, as_of
        );
        self.event_bus
            .publish_disposition_event(DispositionEvent::ActionInitialised {
                node_id: node,
                action_id: action_node,
                action_name: definition.name.clone(),
                as_of,
            });
        self.load_action(action_node).await
    }

    /// Latest as-of date across the record's folders for its current action.
    /// A folder whose schedule yields no date wins outright.
    async fn next_action_across_folders(
        &self,
        record: NodeId,
        folders: &[NodeId],
        next: &DispositionAction,
    ) -> Result<Option<ReconciledAction>, DispositionError> {
        let mut latest: Option<ReconciledAction> = None;
        for folder in folders {
            let Some(schedule_node) = self.container_schedule(*folder).await? else {
                continue;
            };
            let schedule = DispositionSchedule::load(self.nodes.clone(), schedule_node).await?;
            let Some(definition) = schedule.action_definition_by_name(&next.name).await? else {
                continue;
            };
            let as_of = self.compute_as_of(record, definition).await?;

            let later = latest
                .as_ref()
                .map_or(true, |current| compare_as_of(as_of, current.as_of) == Ordering::Greater);
            if later {
                latest = Some(ReconciledAction {
                    schedule: schedule_node,
                    action: next.node_id,
                    definition_id: definition.id,
                    action_name: next.name.clone(),
                    action_label: definition.label.clone(),
                    as_of,
                    write_mode: WriteMode::for_recalculated_date(next.as_of, as_of),
                });
            }
            if as_of.is_none() {
                break;
            }
        }
        Ok(latest)
    }

    /// Create the record's first action from the first governing schedule,
    /// then let later folders override its name and date
    async fn first_action_across_folders(
        &self,
        ctx: &TransactionContext,
        record: NodeId,
        folders: &[NodeId],
    ) -> Result<Option<ReconciledAction>, DispositionError> {
        let mut chosen: Option<ReconciledAction> = None;
        for folder in folders {
            let Some(schedule_node) = self.container_schedule(*folder).await? else {
                continue;
            };
            let schedule = DispositionSchedule::load(self.nodes.clone(), schedule_node).await?;
            let Some(first) = schedule.action_definitions().await?.first() else {
                continue;
            };

            match chosen.as_mut() {
                None => {
                    let target = if schedule.is_record_level() { record } else { *folder };
                    let action = self.initialise_disposition_action(ctx, target, first).await?;
                    chosen = Some(ReconciledAction {
                        schedule: schedule_node,
                        action: action.node_id,
                        definition_id: first.id,
                        action_name: action.name,
                        action_label: action.label,
                        as_of: action.as_of,
                        write_mode: WriteMode::DateAndName,
                    });
                }
                Some(current) => {
                    if first.period.is_none() {
                        continue;
                    }
                    let as_of = self.compute_as_of(record, first).await?;
                    if compare_as_of(as_of, current.as_of) == Ordering::Greater {
                        current.schedule = schedule_node;
                        current.definition_id = first.id;
                        current.action_name = first.name.clone();
                        current.action_label = first.label.clone();
                        current.as_of = as_of;
                    }
                    if as_of.is_none() {
                        break;
                    }
                }
            }
        }
        Ok(chosen)
    }

    async fn reconcile_record(
        &self,
        ctx: &TransactionContext,
        record: NodeId,
    ) -> Result<Option<ReconciledAction>, DispositionError> {
        let folders = self.file_plan.record_folders_of(record).await?;
        match self.next_action(record).await? {
            Some(next) => self.next_action_across_folders(record, &folders, &next).await,
            None if self.completed_actions(record).await?.is_empty() => {
                self.first_action_across_folders(ctx, record, &folders).await
            }
            None => Ok(None),
        }
    }

    /// Persist a reconciliation result as far as its write mode allows
    async fn apply_reconciliation(
        &self,
        ctx: &TransactionContext,
        record: NodeId,
        reconciled: &ReconciledAction,
    ) -> Result<(), DispositionError> {
        let action = self.load_action(reconciled.action).await?;
        if action.manually_set_as_of || !reconciled.write_mode.writes_date() {
            return Ok(());
        }
        let renames = reconciled.write_mode.writes_name() && action.name != reconciled.action_name;
        if action.as_of == reconciled.as_of && !renames {
            return Ok(());
        }

        match reconciled.as_of {
            Some(as_of) => {
                let mut props = PropertyMap::new();
                props.insert(PropertyKey::DispositionAsOf, as_of.into());
                self.write_properties(ctx, action.node_id, props).await?;
            }
            None => {
                self.remove_properties(ctx, action.node_id, vec![PropertyKey::DispositionAsOf])
                    .await?;
            }
        }
        if renames {
            let mut props = PropertyMap::new();
            props.insert(
                PropertyKey::DispositionActionId,
                PropertyValue::text(reconciled.definition_id.to_string()),
            );
            props.insert(
                PropertyKey::DispositionActionName,
                PropertyValue::text(&reconciled.action_name),
            );
            props.insert(
                PropertyKey::DispositionActionLabel,
                PropertyValue::text(&reconciled.action_label),
            );
            self.write_properties(ctx, action.node_id, props).await?;
        }

        debug!(
            "Reconciled '{}' on record {}: {:?} -> {:?}",
            reconciled.action_name, record, action.as_of, reconciled.as_of
        );
        self.event_bus
            .publish_disposition_event(DispositionEvent::AsOfRecalculated {
                node_id: record,
                action_name: reconciled.action_name.clone(),
                previous: action.as_of,
                current: reconciled.as_of,
            });
        Ok(())
    }

    async fn resolve_schedule(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<Option<Arc<DispositionSchedule>>, DispositionError> {
        if !self.file_plan.is_record(node).await? {
            return match self.container_schedule(node).await? {
                Some(schedule) => Ok(Some(self.load_schedule(schedule).await?)),
                None => Ok(None),
            };
        }

        let Some(origin) = self.origin_schedule(node).await? else {
            return Ok(None);
        };
        if !self.load_schedule(origin).await?.is_record_level() {
            return Ok(None);
        }

        match self.reconcile_record(ctx, node).await? {
            Some(reconciled) => {
                self.apply_reconciliation(ctx, node, &reconciled).await?;
                Ok(Some(self.load_schedule(reconciled.schedule).await?))
            }
            None => Ok(None),
        }
    }

    async fn items_beneath(
        &self,
        container: NodeId,
        record_level: bool,
        limit: Option<usize>,
    ) -> Result<Vec<NodeId>, DispositionError> {
        let mut items = Vec::new();
        let mut seen = HashSet::new();
        let mut pending = vec![container];

        while let Some(current) = pending.pop() {
            for child in self.file_plan.contained(current).await? {
                match self.file_plan.component_kind(child).await? {
                    Some(FilePlanComponentKind::RecordFolder) => {
                        let found = if record_level {
                            self.file_plan.records_of(child).await?
                        } else {
                            vec![child]
                        };
                        for item in found {
                            if seen.insert(item) {
                                items.push(item);
                                if limit.is_some_and(|l| items.len() >= l) {
                                    return Ok(items);
                                }
                            }
                        }
                    }
                    // Sub-categories with their own schedule govern their own items
                    Some(FilePlanComponentKind::RecordCategory)
                        if self.associated_schedule_node(child).await?.is_none() =>
                    {
                        pending.push(child);
                    }
                    _ => {}
                }
            }
        }
        Ok(items)
    }

    async fn collect_disposable_items(
        &self,
        schedule: &DispositionSchedule,
        limit: Option<usize>,
    ) -> Result<Vec<NodeId>, DispositionError> {
        match self.nodes.get_primary_parent(schedule.node_id()).await? {
            Some(container) => {
                self.items_beneath(container.parent, schedule.is_record_level(), limit)
                    .await
            }
            None => Ok(Vec::new()),
        }
    }

    async fn advance(&self, ctx: &TransactionContext, node: NodeId) -> Result<(), DispositionError> {
        let system = ctx.as_system();
        let current = self.next_action(node).await?;

        let Some(schedule) = self.resolve_schedule(&system, node).await? else {
            debug!("No disposition schedule governs {}, nothing to advance", node);
            return Ok(());
        };

        let next_definition = match &current {
            None => schedule.action_definitions().await?.first(),
            Some(current) => {
                let definition = match schedule.action_definition(&current.action_definition_id).await? {
                    Some(definition) => definition,
                    None => schedule
                        .action_definition_by_name(&current.name)
                        .await?
                        .ok_or_else(|| DispositionError::UnknownActionDefinition(current.name.clone()))?,
                };
                schedule.next_action_definition(definition).await?
            }
        };

        if let Some(current) = &current {
            let action = current.node_id;
            self.transactions
                .ensure_writable(&system, move |_tx| async move {
                    self.nodes
                        .move_node(action, node, AssocType::DispositionActionHistory)
                        .await?;
                    Ok::<_, DispositionError>(())
                })
                .await?;
        }

        if let Some(definition) = next_definition {
            self.initialise_disposition_action(&system, node, definition).await?;
        }

        self.event_bus
            .publish_disposition_event(DispositionEvent::ActionAdvanced {
                node_id: node,
                completed_action: current.map(|c| c.name),
                next_action: next_definition.map(|d| d.name.clone()),
            });
        Ok(())
    }
}

#[async_trait]
impl DispositionQueryService for StandardDispositionService {
    async fn get_associated_disposition_schedule(
        &self,
        _ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<Option<Arc<DispositionSchedule>>, DispositionError> {
        if !self.file_plan.is_file_plan_component(node).await? {
            return Err(DispositionError::NotFilePlanComponent(node));
        }
        match self.associated_schedule_node(node).await? {
            Some(schedule) => Ok(Some(self.load_schedule(schedule).await?)),
            None => Ok(None),
        }
    }

    async fn get_associated_records_management_container(
        &self,
        _ctx: &TransactionContext,
        schedule: NodeId,
    ) -> Result<Option<NodeId>, DispositionError> {
        Ok(self.nodes.get_primary_parent(schedule).await?.map(|a| a.parent))
    }

    async fn get_disposition_schedule(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<Option<Arc<DispositionSchedule>>, DispositionError> {
        self.resolve_schedule(ctx, node).await
    }

    async fn has_disposable_items(
        &self,
        _ctx: &TransactionContext,
        schedule: &DispositionSchedule,
    ) -> Result<bool, DispositionError> {
        Ok(!self.collect_disposable_items(schedule, Some(1)).await?.is_empty())
    }

    async fn get_disposable_items(
        &self,
        _ctx: &TransactionContext,
        schedule: &DispositionSchedule,
    ) -> Result<Vec<NodeId>, DispositionError> {
        self.collect_disposable_items(schedule, None).await
    }

    async fn is_disposable_item(
        &self,
        _ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<bool, DispositionError> {
        if !self.nodes.exists(node).await? {
            return Ok(false);
        }
        Ok(self.nodes.has_aspect(node, Aspect::DispositionLifecycle).await?)
    }

    async fn get_next_disposition_action(
        &self,
        _ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<Option<DispositionAction>, DispositionError> {
        self.next_action(node).await
    }

    async fn get_completed_disposition_actions(
        &self,
        _ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<Vec<DispositionAction>, DispositionError> {
        self.completed_actions(node).await
    }

    async fn get_last_completed_disposition_action(
        &self,
        _ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<Option<DispositionAction>, DispositionError> {
        Ok(self.completed_actions(node).await?.pop())
    }

    async fn get_event_completion_details(
        &self,
        _ctx: &TransactionContext,
        action: &DispositionAction,
    ) -> Result<Vec<EventCompletionDetails>, DispositionError> {
        self.event_details(action.node_id).await
    }

    async fn get_event_completion_detail(
        &self,
        _ctx: &TransactionContext,
        action: &DispositionAction,
        event_name: &str,
    ) -> Result<Option<EventCompletionDetails>, DispositionError> {
        self.event_detail(action.node_id, event_name).await
    }

    async fn calculate_as_of_date(
        &self,
        _ctx: &TransactionContext,
        node: NodeId,
        definition: &DispositionActionDefinition,
    ) -> Result<Option<DateTime<Utc>>, DispositionError> {
        self.compute_as_of(node, definition).await
    }

    async fn get_disposition_action_date(
        &self,
        _ctx: &TransactionContext,
        record: NodeId,
        schedule: &DispositionSchedule,
        action_name: &str,
    ) -> Result<Option<DateTime<Utc>>, DispositionError> {
        match schedule.action_definition_by_name(action_name).await? {
            Some(definition) => self.compute_as_of(record, definition).await,
            None => Ok(None),
        }
    }

    async fn is_next_disposition_action_eligible(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<bool, DispositionError> {
        let Some(schedule) = self.resolve_schedule(ctx, node).await? else {
            return Ok(false);
        };
        if !self.nodes.has_aspect(node, Aspect::DispositionLifecycle).await? {
            return Ok(false);
        }
        let Some(next) = self.next_action(node).await? else {
            return Ok(false);
        };

        // Accession may require both the date and the events
        let combine = if next.name == ACCESSION {
            schedule
                .action_definition_by_name(ACCESSION)
                .await?
                .is_some_and(|d| d.combine_disposition_step_conditions)
        } else {
            false
        };

        let as_of_passed = next.as_of.is_some_and(|as_of| as_of < Utc::now());
        if as_of_passed && !combine {
            return Ok(true);
        }
        if !as_of_passed && combine {
            return Ok(false);
        }

        let definition = match schedule.action_definition(&next.action_definition_id).await? {
            Some(definition) => definition,
            None => match schedule.action_definition_by_name(&next.name).await? {
                Some(definition) => definition,
                None => return Ok(false),
            },
        };
        let details = self.event_details(next.node_id).await?;
        Ok(definition.event_combination.is_satisfied(&details))
    }

    async fn is_cutoff(&self, _ctx: &TransactionContext, node: NodeId) -> Result<bool, DispositionError> {
        Ok(self.nodes.has_aspect(node, Aspect::CutOff).await?)
    }

    async fn is_frozen_or_has_frozen_children(
        &self,
        _ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<bool, DispositionError> {
        if self.nodes.has_aspect(node, Aspect::Frozen).await? {
            return Ok(true);
        }
        if self.file_plan.is_record_folder(node).await? {
            for record in self.file_plan.records_of(node).await? {
                if self.nodes.has_aspect(record, Aspect::Frozen).await? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }
}

#[async_trait]
impl DispositionLifecycleService for StandardDispositionService {
    async fn create_disposition_schedule(
        &self,
        ctx: &TransactionContext,
        container: NodeId,
        params: ScheduleParams,
    ) -> Result<Arc<DispositionSchedule>, DispositionError> {
        if !self.file_plan.is_record_category(container).await? {
            return Err(DispositionError::NotRecordCategory(container));
        }
        if self.associated_schedule_node(container).await?.is_some() {
            return Err(DispositionError::ScheduleAlreadyExists(container));
        }

        // Items already under an inherited schedule keep their lifecycle
        if let Some(inherited) = self.container_schedule(container).await? {
            let inherited = self.load_schedule(inherited).await?;
            for item in self
                .items_beneath(container, inherited.is_record_level(), None)
                .await?
            {
                if self.nodes.has_aspect(item, Aspect::DispositionLifecycle).await? {
                    return Err(DispositionError::DisposableItemsGoverned(container));
                }
            }
        }

        let props = params.to_properties();
        let schedule = self
            .transactions
            .ensure_writable(&ctx.as_system(), move |_tx| {
                let props = props.clone();
                async move {
                    let schedule = self
                        .nodes
                        .create_node(
                            container,
                            AssocType::DispositionSchedule,
                            "dispositionSchedule",
                            NodeType::DispositionSchedule,
                            props,
                        )
                        .await?
                        .child;
                    self.nodes
                        .add_aspect(container, Aspect::Scheduled, PropertyMap::new())
                        .await?;
                    Ok::<_, DispositionError>(schedule)
                }
            })
            .await?;

        info!(
            "Created {} disposition schedule {} on {}",
            if params.record_level { "record level" } else { "folder level" },
            schedule,
            container
        );
        self.event_bus
            .publish_disposition_event(DispositionEvent::ScheduleCreated {
                schedule_id: schedule,
                container_id: container,
                record_level: params.record_level,
                created_at: Utc::now(),
            });
        self.load_schedule(schedule).await
    }

    async fn add_disposition_action_definition(
        &self,
        ctx: &TransactionContext,
        schedule: &DispositionSchedule,
        params: ActionDefinitionParams,
    ) -> Result<DispositionActionDefinition, DispositionError> {
        let name = params
            .name
            .clone()
            .filter(|n| !n.trim().is_empty())
            .ok_or(DispositionError::MissingActionName)?;
        let props = params.to_properties();
        let schedule_node = schedule.node_id();

        let definition_node = self
            .transactions
            .ensure_writable(&ctx.as_system(), move |_tx| {
                let props = props.clone();
                let name = name.clone();
                async move {
                    let assoc = self
                        .nodes
                        .create_node(
                            schedule_node,
                            AssocType::DispositionActionDefinitions,
                            &name,
                            NodeType::DispositionActionDefinition,
                            props,
                        )
                        .await?;
                    Ok::<_, DispositionError>(assoc.child)
                }
            })
            .await?;

        let refreshed = self.load_schedule(schedule_node).await?;
        let definition = refreshed
            .action_definition(&definition_node.to_string())
            .await?
            .cloned()
            .ok_or_else(|| DispositionError::UnknownActionDefinition(definition_node.to_string()))?;

        info!(
            "Added action definition '{}' at position {} to schedule {}",
            definition.name, definition.index, schedule_node
        );
        self.event_bus
            .publish_disposition_event(DispositionEvent::ActionDefinitionAdded {
                schedule_id: schedule_node,
                definition_id: definition.id,
                action_name: definition.name.clone(),
            });
        Ok(definition)
    }

    async fn update_disposition_action_definition(
        &self,
        ctx: &TransactionContext,
        schedule: &DispositionSchedule,
        definition_id: NodeId,
        params: ActionDefinitionParams,
    ) -> Result<DispositionActionDefinition, DispositionError> {
        if params.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(DispositionError::MissingActionName);
        }
        let schedule_node = schedule.node_id();
        let current = self.load_schedule(schedule_node).await?;
        if current.action_definition(&definition_id.to_string()).await?.is_none() {
            return Err(DispositionError::UnknownActionDefinition(definition_id.to_string()));
        }

        let system = ctx.as_system();
        self.write_properties(&system, definition_id, params.to_properties())
            .await?;

        let refreshed = self.load_schedule(schedule_node).await?;
        let definition = refreshed
            .action_definition(&definition_id.to_string())
            .await?
            .cloned()
            .ok_or_else(|| DispositionError::UnknownActionDefinition(definition_id.to_string()))?;

        let recalculate = params.period.is_some() || params.period_property.is_some();
        let relabel = params.name.is_some() || params.label.is_some();
        let mut refreshed_actions = 0;

        for item in self.collect_disposable_items(&refreshed, None).await? {
            let Some(action) = self.next_action(item).await? else {
                continue;
            };
            if action.action_definition_id != definition.id.to_string() {
                continue;
            }

            self.sync_event_executions(&system, &action, &definition).await?;

            let mut props = PropertyMap::new();
            if relabel {
                props.insert(
                    PropertyKey::DispositionActionName,
                    PropertyValue::text(&definition.name),
                );
                props.insert(
                    PropertyKey::DispositionActionLabel,
                    PropertyValue::text(&definition.label),
                );
            }
            // An edited period replaces the stored date in either direction, so
            // this write skips the later-only rule that reconciliation applies
            if recalculate && !action.manually_set_as_of {
                let as_of = self.compute_as_of(item, &definition).await?;
                match as_of {
                    Some(as_of) => {
                        props.insert(PropertyKey::DispositionAsOf, as_of.into());
                    }
                    None => {
                        self.remove_properties(&system, action.node_id, vec![PropertyKey::DispositionAsOf])
                            .await?;
                    }
                }
            }
            if !props.is_empty() {
                self.write_properties(&system, action.node_id, props).await?;
            }

            self.update_events_eligible(&system, item, &action).await?;
            refreshed_actions += 1;
        }

        info!(
            "Updated action definition '{}' on schedule {}, refreshed {} live actions",
            definition.name, schedule_node, refreshed_actions
        );
        self.event_bus
            .publish_disposition_event(DispositionEvent::ActionDefinitionUpdated {
                schedule_id: schedule_node,
                definition_id,
                refreshed_actions,
            });
        Ok(definition)
    }

    async fn remove_disposition_action_definition(
        &self,
        ctx: &TransactionContext,
        schedule: &DispositionSchedule,
        definition_id: NodeId,
    ) -> Result<(), DispositionError> {
        let schedule_node = schedule.node_id();
        if !self.collect_disposable_items(schedule, Some(1)).await?.is_empty() {
            return Err(DispositionError::DisposableItemsExist(schedule_node));
        }

        self.transactions
            .ensure_writable(&ctx.as_system(), move |_tx| async move {
                self.nodes.remove_child(schedule_node, definition_id).await?;
                Ok::<_, DispositionError>(())
            })
            .await?;

        info!("Removed action definition {} from schedule {}", definition_id, schedule_node);
        self.event_bus
            .publish_disposition_event(DispositionEvent::ActionDefinitionRemoved {
                schedule_id: schedule_node,
                definition_id,
            });
        Ok(())
    }

    async fn on_file_record(&self, ctx: &TransactionContext, record: NodeId) -> Result<(), DispositionError> {
        if !self.file_plan.is_record(record).await? {
            debug!("{} is not a record, skipping disposition on file", record);
            return Ok(());
        }
        self.refresh_disposition_action(ctx, record).await
    }

    async fn refresh_disposition_action(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<(), DispositionError> {
        let system = ctx.as_system();
        let Some(schedule) = self.resolve_schedule(&system, node).await? else {
            return Ok(());
        };

        match self.file_plan.component_kind(node).await? {
            Some(FilePlanComponentKind::Record) => {}
            Some(FilePlanComponentKind::RecordFolder) if !schedule.is_record_level() => {}
            _ => return Ok(()),
        }

        if self.next_action_node(node).await?.is_some() || !self.completed_actions(node).await?.is_empty() {
            return Ok(());
        }
        if let Some(first) = schedule.action_definitions().await?.first() {
            self.initialise_disposition_action(&system, node, first).await?;
        }
        Ok(())
    }

    async fn update_next_disposition_action(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<(), DispositionError> {
        self.advance(ctx, node).await
    }

    async fn start_next_disposition_action(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
        started_at: Option<DateTime<Utc>>,
        started_by: Option<String>,
    ) -> Result<DispositionAction, DispositionError> {
        let action = self.require_next_action(node).await?;
        if action.is_started() {
            return Ok(action);
        }
        let started_by =
            started_by.unwrap_or_else(|| ctx.security().fully_authenticated_user().name().to_string());

        let mut props = PropertyMap::new();
        props.insert(
            PropertyKey::DispositionActionStartedAt,
            started_at.unwrap_or_else(Utc::now).into(),
        );
        props.insert(PropertyKey::DispositionActionStartedBy, started_by.into());
        self.write_properties(ctx, action.node_id, props).await?;

        self.load_action(action.node_id).await
    }

    async fn complete_next_disposition_action(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
        completed_at: Option<DateTime<Utc>>,
        completed_by: Option<String>,
    ) -> Result<DispositionAction, DispositionError> {
        let action = self.require_next_action(node).await?;
        let completed_at = completed_at.unwrap_or_else(Utc::now);
        let completed_by =
            completed_by.unwrap_or_else(|| ctx.security().fully_authenticated_user().name().to_string());

        let mut props = PropertyMap::new();
        if !action.is_started() {
            props.insert(PropertyKey::DispositionActionStartedAt, completed_at.into());
            props.insert(
                PropertyKey::DispositionActionStartedBy,
                PropertyValue::text(&completed_by),
            );
        }
        props.insert(PropertyKey::DispositionActionCompletedAt, completed_at.into());
        props.insert(
            PropertyKey::DispositionActionCompletedBy,
            PropertyValue::text(&completed_by),
        );
        self.write_properties(ctx, action.node_id, props).await?;

        self.advance(ctx, node).await?;

        metrics::counter!("fileplan_disposition_actions_completed_total").increment(1);
        info!(
            "Completed disposition action '{}' on {} by {}",
            action.name, node, completed_by
        );
        self.load_action(action.node_id).await
    }

    async fn set_disposition_as_of(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
        as_of: Option<DateTime<Utc>>,
    ) -> Result<(), DispositionError> {
        let action = self.require_next_action(node).await?;

        let mut props = PropertyMap::new();
        props.insert(PropertyKey::ManuallySetAsOf, true.into());
        match as_of {
            Some(as_of) => {
                props.insert(PropertyKey::DispositionAsOf, as_of.into());
            }
            None => {
                self.remove_properties(ctx, action.node_id, vec![PropertyKey::DispositionAsOf])
                    .await?;
            }
        }
        self.write_properties(ctx, action.node_id, props).await?;

        info!("As-of date of '{}' on {} manually set to {:?}", action.name, node, as_of);
        self.event_bus
            .publish_disposition_event(DispositionEvent::AsOfRecalculated {
                node_id: node,
                action_name: action.name,
                previous: action.as_of,
                current: as_of,
            });
        Ok(())
    }

    async fn complete_event(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
        event_name: &str,
        completed_at: Option<DateTime<Utc>>,
        completed_by: Option<String>,
    ) -> Result<(), DispositionError> {
        let action = self.require_next_action(node).await?;
        let detail = self
            .event_detail(action.node_id, event_name)
            .await?
            .ok_or_else(|| DispositionError::UnknownEvent {
                action: action.node_id,
                event: event_name.to_string(),
            })?;
        let completed_by =
            completed_by.unwrap_or_else(|| ctx.security().fully_authenticated_user().name().to_string());

        let mut props = PropertyMap::new();
        props.insert(PropertyKey::EventExecutionComplete, true.into());
        props.insert(
            PropertyKey::EventExecutionCompletedAt,
            completed_at.unwrap_or_else(Utc::now).into(),
        );
        props.insert(
            PropertyKey::EventExecutionCompletedBy,
            PropertyValue::text(&completed_by),
        );
        self.write_properties(ctx, detail.node_id, props).await?;
        let eligible = self.update_events_eligible(ctx, node, &action).await?;

        info!(
            "Event '{}' completed on {} by {} (events eligible: {})",
            event_name, node, completed_by, eligible
        );
        self.event_bus
            .publish_disposition_event(DispositionEvent::EventCompleted {
                node_id: node,
                event_name: event_name.to_string(),
                completed_by,
            });
        Ok(())
    }

    async fn undo_event(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
        event_name: &str,
    ) -> Result<(), DispositionError> {
        let action = self.require_next_action(node).await?;
        let detail = self
            .event_detail(action.node_id, event_name)
            .await?
            .ok_or_else(|| DispositionError::UnknownEvent {
                action: action.node_id,
                event: event_name.to_string(),
            })?;

        let mut props = PropertyMap::new();
        props.insert(PropertyKey::EventExecutionComplete, false.into());
        self.write_properties(ctx, detail.node_id, props).await?;
        self.remove_properties(
            ctx,
            detail.node_id,
            vec![
                PropertyKey::EventExecutionCompletedAt,
                PropertyKey::EventExecutionCompletedBy,
            ],
        )
        .await?;
        self.update_events_eligible(ctx, node, &action).await?;

        info!("Event '{}' undone on {}", event_name, node);
        self.event_bus
            .publish_disposition_event(DispositionEvent::EventUndone {
                node_id: node,
                event_name: event_name.to_string(),
            });
        Ok(())
    }

    async fn refresh_events(&self, ctx: &TransactionContext, node: NodeId) -> Result<(), DispositionError> {
        let action = self.require_next_action(node).await?;
        let definition = self
            .definition_for_action(node, &action)
            .await?
            .ok_or_else(|| DispositionError::UnknownActionDefinition(action.action_definition_id.clone()))?;

        if self.sync_event_executions(ctx, &action, &definition).await? {
            debug!("Refreshed events of '{}' on {}", action.name, node);
        }
        self.update_events_eligible(ctx, node, &action).await?;
        Ok(())
    }

    async fn cutoff_disposable_item(
        &self,
        ctx: &TransactionContext,
        node: NodeId,
    ) -> Result<(), DispositionError> {
        let is_folder = match self.file_plan.component_kind(node).await? {
            Some(FilePlanComponentKind::RecordFolder) => true,
            Some(FilePlanComponentKind::Record) => false,
            _ => return Err(DispositionError::NotDisposable(node)),
        };
        if self.is_cutoff(ctx, node).await? || self.is_frozen_or_has_frozen_children(ctx, node).await? {
            return Err(DispositionError::AlreadyCutOff(node));
        }

        let records = if is_folder {
            self.file_plan.records_of(node).await?
        } else {
            Vec::new()
        };
        let cut_off_at = Utc::now();

        self.transactions
            .ensure_writable(&ctx.as_system(), move |_tx| {
                let records = records.clone();
                async move {
                    for target in records.iter().copied().chain(std::iter::once(node)) {
                        if self.nodes.has_aspect(target, Aspect::CutOff).await? {
                            continue;
                        }
                        let mut props = PropertyMap::new();
                        props.insert(PropertyKey::CutOffDate, cut_off_at.into());
                        self.nodes.add_aspect(target, Aspect::CutOff, props).await?;
                        if self.nodes.has_aspect(target, Aspect::UncutOff).await? {
                            self.nodes.remove_aspect(target, Aspect::UncutOff).await?;
                        }
                    }
                    if is_folder {
                        self.nodes
                            .set_property(node, PropertyKey::IsClosed, true.into())
                            .await?;
                    }
                    Ok::<_, DispositionError>(())
                }
            })
            .await?;

        metrics::counter!("fileplan_cutoffs_total").increment(1);
        info!("Cut off {} at {}", node, cut_off_at);
        self.event_bus
            .publish_disposition_event(DispositionEvent::CutOff {
                node_id: node,
                cut_off_at,
            });
        Ok(())
    }

    async fn recalculate_next_disposition_step(
        &self,
        ctx: &TransactionContext,
        record: NodeId,
    ) -> Result<(), DispositionError> {
        let Some(next) = self.next_action(record).await? else {
            return Ok(());
        };
        if next.manually_set_as_of {
            debug!("As-of of '{}' on {} was set manually, not recalculating", next.name, record);
            return Ok(());
        }
        let folders = self.file_plan.record_folders_of(record).await?;
        if let Some(reconciled) = self.next_action_across_folders(record, &folders, &next).await? {
            self.apply_reconciliation(ctx, record, &reconciled).await?;
        }
        Ok(())
    }
}
