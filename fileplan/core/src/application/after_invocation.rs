// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! After-invocation filtering.
//!
//! Results of a secured call are checked element by element against the
//! `ViewRecords` capability. Single values are denied outright; collections,
//! maps and paged results are rebuilt with only the readable elements.
//! Filtering is bounded by a check count and a wall-clock budget. When either
//! runs out the remaining elements are dropped and the result is marked as
//! cut off.

use std::collections::HashMap;
use std::hash::Hash;
use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::application::capability_service::{CapabilityService, VIEW_RECORDS};
use crate::application::file_plan::FilePlanService;
use crate::domain::config::SecurityConfig;
use crate::domain::events::SecurityEvent;
use crate::domain::node::{ChildAssoc, NodeId};
use crate::domain::repository::NodeService;
use crate::domain::security::{AccessDecision, AfterDirective, SecurityError};
use crate::domain::transaction::TransactionContext;
use crate::infrastructure::event_bus::EventBus;

/// Budgets applied to one filtered result
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilterLimits {
    pub max_checks: Option<usize>,
    pub max_time: Option<Duration>,
}

impl FilterLimits {
    pub fn from_config(config: &SecurityConfig) -> Self {
        Self {
            max_checks: config.max_permission_checks,
            max_time: config.max_permission_check_time,
        }
    }
}

/// A filtered value together with what filtering did to it
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Filtered<T> {
    pub value: T,
    /// Elements dropped, whether denied or left unchecked
    pub removed: usize,
    /// A budget ran out before every element was checked
    pub cut_off: bool,
    pub checks_remaining: Option<usize>,
    pub original_size: usize,
}

impl<T> Filtered<T> {
    pub fn unfiltered(value: T, size: usize) -> Self {
        Self {
            value,
            removed: 0,
            cut_off: false,
            checks_remaining: None,
            original_size: size,
        }
    }

    pub fn into_inner(self) -> T {
        self.value
    }

    fn map<U>(self, f: impl FnOnce(T) -> U) -> Filtered<U> {
        Filtered {
            value: f(self.value),
            removed: self.removed,
            cut_off: self.cut_off,
            checks_remaining: self.checks_remaining,
            original_size: self.original_size,
        }
    }
}

/// Node whose readability decides whether an element is returned
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SecuredTarget {
    Node(NodeId),
    PrimaryParentOf(NodeId),
}

pub trait SecuredElement: Send + Sync {
    fn secured_target(&self, parent: bool) -> SecuredTarget;
}

impl SecuredElement for NodeId {
    fn secured_target(&self, parent: bool) -> SecuredTarget {
        if parent {
            SecuredTarget::PrimaryParentOf(*self)
        } else {
            SecuredTarget::Node(*self)
        }
    }
}

impl SecuredElement for ChildAssoc {
    fn secured_target(&self, parent: bool) -> SecuredTarget {
        if parent {
            SecuredTarget::Node(self.parent)
        } else {
            SecuredTarget::Node(self.child)
        }
    }
}

/// One page of a larger result set
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PagedResult<T> {
    pub page: Vec<T>,
    /// Requested page size; filtering stops once this many elements pass
    pub max_items: Option<usize>,
    pub has_more_items: bool,
    pub total_count: Option<usize>,
}

impl<T> PagedResult<T> {
    pub fn new(page: Vec<T>, max_items: Option<usize>) -> Self {
        Self {
            page,
            max_items,
            has_more_items: false,
            total_count: None,
        }
    }
}

pub struct AfterInvocationProvider {
    capabilities: Arc<CapabilityService>,
    nodes: Arc<dyn NodeService>,
    file_plan: Arc<FilePlanService>,
    limits: FilterLimits,
    event_bus: Arc<EventBus>,
}

impl AfterInvocationProvider {
    pub fn new(
        capabilities: Arc<CapabilityService>,
        nodes: Arc<dyn NodeService>,
        file_plan: Arc<FilePlanService>,
        limits: FilterLimits,
        event_bus: Arc<EventBus>,
    ) -> Self {
        Self {
            capabilities,
            nodes,
            file_plan,
            limits,
            event_bus,
        }
    }

    pub fn limits(&self) -> FilterLimits {
        self.limits
    }

    pub async fn is_readable(
        &self,
        ctx: &TransactionContext,
        target: SecuredTarget,
    ) -> Result<bool, SecurityError> {
        if ctx.security().is_system() {
            return Ok(true);
        }
        let node = match target {
            SecuredTarget::Node(node) => node,
            SecuredTarget::PrimaryParentOf(node) => {
                if !self.nodes.exists(node).await? {
                    return Ok(false);
                }
                match self.nodes.get_primary_parent(node).await? {
                    Some(assoc) => assoc.parent,
                    // A root has no parent to protect it
                    None => return Ok(true),
                }
            }
        };
        if !self.nodes.exists(node).await? {
            return Ok(false);
        }
        if !self.file_plan.is_file_plan_component(node).await? {
            return Ok(true);
        }
        let decision = self.capabilities.evaluate(ctx, VIEW_RECORDS, node).await?;
        Ok(decision == AccessDecision::Granted)
    }

    pub async fn decide_single<E: SecuredElement>(
        &self,
        ctx: &TransactionContext,
        element: &E,
        directive: AfterDirective,
    ) -> Result<(), SecurityError> {
        let target = element.secured_target(directive.parent);
        if self.is_readable(ctx, target).await? {
            Ok(())
        } else {
            Err(SecurityError::access_denied(format!(
                "{} may not read {:?}",
                ctx.security().running_as(),
                target
            )))
        }
    }

    /// Keep the readable elements, in order.
    ///
    /// With a `target` count, filtering stops once that many elements pass;
    /// the unchecked remainder is dropped without marking the result cut off.
    pub async fn filter_elements<E: SecuredElement>(
        &self,
        ctx: &TransactionContext,
        elements: Vec<E>,
        directive: AfterDirective,
        target: Option<usize>,
    ) -> Result<Filtered<Vec<E>>, SecurityError> {
        let original_size = elements.len();
        let started = Instant::now();
        let mut kept = Vec::with_capacity(original_size);
        let mut checks = 0usize;
        let mut cut_off = false;

        for element in elements {
            if target.is_some_and(|t| kept.len() >= t) {
                break;
            }
            let out_of_checks = self.limits.max_checks.is_some_and(|max| checks >= max);
            let out_of_time = self.limits.max_time.is_some_and(|max| started.elapsed() >= max);
            if out_of_checks || out_of_time {
                cut_off = true;
                break;
            }
            checks += 1;
            if self
                .is_readable(ctx, element.secured_target(directive.parent))
                .await?
            {
                kept.push(element);
            }
        }

        let removed = original_size - kept.len();
        if cut_off {
            metrics::counter!("fileplan_filter_cutoffs_total").increment(1);
            warn!(
                "Result filtering cut off after {} checks in {:?} ({} of {} elements kept)",
                checks,
                started.elapsed(),
                kept.len(),
                original_size
            );
        } else {
            debug!("Filtered {} of {} elements", removed, original_size);
        }
        if removed > 0 || cut_off {
            self.event_bus
                .publish_security_event(SecurityEvent::ResultsFiltered {
                    original_size,
                    removed,
                    cut_off,
                });
        }

        Ok(Filtered {
            value: kept,
            removed,
            cut_off,
            checks_remaining: self.limits.max_checks.map(|max| max.saturating_sub(checks)),
            original_size,
        })
    }

    /// Keep the entries whose key is readable
    pub async fn filter_map<K, V>(
        &self,
        ctx: &TransactionContext,
        map: HashMap<K, V>,
        directive: AfterDirective,
    ) -> Result<Filtered<HashMap<K, V>>, SecurityError>
    where
        K: SecuredElement + Eq + Hash,
        V: Send + Sync,
    {
        let entries: Vec<MapEntry<K, V>> = map.into_iter().map(|(k, v)| MapEntry(k, v)).collect();
        let filtered = self.filter_elements(ctx, entries, directive, None).await?;
        Ok(filtered.map(|entries| entries.into_iter().map(|MapEntry(k, v)| (k, v)).collect()))
    }
}

struct MapEntry<K, V>(K, V);

impl<K: SecuredElement, V: Send + Sync> SecuredElement for MapEntry<K, V> {
    fn secured_target(&self, parent: bool) -> SecuredTarget {
        self.0.secured_target(parent)
    }
}

/// Return types the interceptor knows how to filter
#[async_trait]
pub trait PostInvocationFilter: Sized + Send {
    type Output: Send;

    /// The value as returned when no after directive applies
    fn unfiltered(self) -> Self::Output;

    async fn apply_filter(
        self,
        provider: &AfterInvocationProvider,
        ctx: &TransactionContext,
        directive: AfterDirective,
    ) -> Result<Self::Output, SecurityError>;
}

#[async_trait]
impl PostInvocationFilter for () {
    type Output = ();

    fn unfiltered(self) {}

    async fn apply_filter(
        self,
        _provider: &AfterInvocationProvider,
        _ctx: &TransactionContext,
        _directive: AfterDirective,
    ) -> Result<(), SecurityError> {
        Ok(())
    }
}

#[async_trait]
impl PostInvocationFilter for NodeId {
    type Output = NodeId;

    fn unfiltered(self) -> NodeId {
        self
    }

    async fn apply_filter(
        self,
        provider: &AfterInvocationProvider,
        ctx: &TransactionContext,
        directive: AfterDirective,
    ) -> Result<NodeId, SecurityError> {
        provider.decide_single(ctx, &self, directive).await?;
        Ok(self)
    }
}

#[async_trait]
impl PostInvocationFilter for ChildAssoc {
    type Output = ChildAssoc;

    fn unfiltered(self) -> ChildAssoc {
        self
    }

    async fn apply_filter(
        self,
        provider: &AfterInvocationProvider,
        ctx: &TransactionContext,
        directive: AfterDirective,
    ) -> Result<ChildAssoc, SecurityError> {
        provider.decide_single(ctx, &self, directive).await?;
        Ok(self)
    }
}

#[async_trait]
impl<E> PostInvocationFilter for Option<E>
where
    E: SecuredElement + 'static,
{
    type Output = Option<E>;

    fn unfiltered(self) -> Option<E> {
        self
    }

    async fn apply_filter(
        self,
        provider: &AfterInvocationProvider,
        ctx: &TransactionContext,
        directive: AfterDirective,
    ) -> Result<Option<E>, SecurityError> {
        if let Some(element) = &self {
            provider.decide_single(ctx, element, directive).await?;
        }
        Ok(self)
    }
}

#[async_trait]
impl<E> PostInvocationFilter for Vec<E>
where
    E: SecuredElement + 'static,
{
    type Output = Filtered<Vec<E>>;

    fn unfiltered(self) -> Filtered<Vec<E>> {
        let size = self.len();
        Filtered::unfiltered(self, size)
    }

    async fn apply_filter(
        self,
        provider: &AfterInvocationProvider,
        ctx: &TransactionContext,
        directive: AfterDirective,
    ) -> Result<Filtered<Vec<E>>, SecurityError> {
        provider.filter_elements(ctx, self, directive, None).await
    }
}

#[async_trait]
impl<K, V> PostInvocationFilter for HashMap<K, V>
where
    K: SecuredElement + Eq + Hash + 'static,
    V: Send + Sync + 'static,
{
    type Output = Filtered<HashMap<K, V>>;

    fn unfiltered(self) -> Filtered<HashMap<K, V>> {
        let size = self.len();
        Filtered::unfiltered(self, size)
    }

    async fn apply_filter(
        self,
        provider: &AfterInvocationProvider,
        ctx: &TransactionContext,
        directive: AfterDirective,
    ) -> Result<Filtered<HashMap<K, V>>, SecurityError> {
        provider.filter_map(ctx, self, directive).await
    }
}

#[async_trait]
impl<E> PostInvocationFilter for PagedResult<E>
where
    E: SecuredElement + 'static,
{
    type Output = Filtered<PagedResult<E>>;

    fn unfiltered(self) -> Filtered<PagedResult<E>> {
        let size = self.page.len();
        Filtered::unfiltered(self, size)
    }

    async fn apply_filter(
        self,
        provider: &AfterInvocationProvider,
        ctx: &TransactionContext,
        directive: AfterDirective,
    ) -> Result<Filtered<PagedResult<E>>, SecurityError> {
        let PagedResult {
            page,
            max_items,
            has_more_items,
            total_count,
        } = self;
        let filtered = provider.filter_elements(ctx, page, directive, max_items).await?;

        // Dropped by the page size rather than by a denial
        let truncated = max_items.is_some_and(|max| filtered.value.len() >= max)
            && filtered.removed > 0
            && !filtered.cut_off;
        let has_more_items = has_more_items || filtered.cut_off || truncated;
        let total_count = total_count.map(|total| total.saturating_sub(filtered.removed));

        Ok(filtered.map(|page| PagedResult {
            page,
            max_items,
            has_more_items,
            total_count,
        }))
    }
}
