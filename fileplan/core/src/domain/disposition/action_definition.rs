// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use serde::{Deserialize, Serialize};

use super::event::EventCompletionDetails;
use super::period::Period;
use super::DispositionError;
use crate::domain::node::{NodeId, PropertyKey, PropertyMap, PropertyMapExt, PropertyValue};

/// Name of the accession step, which may combine its date and event conditions
pub const ACCESSION: &str = "accession";

const COMBINATION_OR: &str = "or";
const COMBINATION_AND: &str = "and";

/// How the events of a step combine into eligibility
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCombination {
    /// Eligible as soon as any one event completes
    FirstEventEligible,
    /// Eligible once every event completes
    AllEventsRequired,
}

impl EventCombination {
    fn from_text(text: Option<&str>) -> Self {
        match text {
            Some(COMBINATION_AND) => EventCombination::AllEventsRequired,
            _ => EventCombination::FirstEventEligible,
        }
    }

    fn as_text(&self) -> &'static str {
        match self {
            EventCombination::FirstEventEligible => COMBINATION_OR,
            EventCombination::AllEventsRequired => COMBINATION_AND,
        }
    }

    /// Whether the completed events satisfy this combination. No events never
    /// satisfies either mode.
    pub fn is_satisfied(&self, details: &[EventCompletionDetails]) -> bool {
        if details.is_empty() {
            return false;
        }
        match self {
            EventCombination::FirstEventEligible => details.iter().any(|d| d.complete),
            EventCombination::AllEventsRequired => details.iter().all(|d| d.complete),
        }
    }
}

/// One step of a disposition schedule
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DispositionActionDefinition {
    pub id: NodeId,
    /// Association name the definition was imported under
    pub legacy_name: String,
    /// Disposition action name: retain, cutoff, transfer, accession, destroy
    pub name: String,
    pub label: String,
    pub description: Option<String>,
    pub period: Option<Period>,
    /// Property the period is anchored to
    pub period_property: Option<PropertyKey>,
    pub events: Vec<String>,
    pub event_combination: EventCombination,
    pub index: usize,
    pub ghost_on_destroy: bool,
    pub location: Option<String>,
    pub combine_disposition_step_conditions: bool,
}

impl DispositionActionDefinition {
    pub fn from_properties(
        id: NodeId,
        legacy_name: &str,
        index: usize,
        props: &PropertyMap,
    ) -> Result<Self, DispositionError> {
        let name = props
            .text(&PropertyKey::DispositionActionName)
            .filter(|n| !n.is_empty())
            .ok_or(DispositionError::MissingProperty {
                node: id,
                key: PropertyKey::DispositionActionName,
            })?
            .to_string();
        let period = props
            .text(&PropertyKey::DispositionPeriod)
            .map(str::parse::<Period>)
            .transpose()?;

        Ok(Self {
            id,
            legacy_name: legacy_name.to_string(),
            label: props
                .text(&PropertyKey::DispositionActionLabel)
                .unwrap_or(&name)
                .to_string(),
            name,
            description: props
                .text(&PropertyKey::DispositionDescription)
                .map(str::to_string),
            period,
            period_property: props.key(&PropertyKey::DispositionPeriodProperty).cloned(),
            events: props.text_list(&PropertyKey::DispositionEvents),
            event_combination: EventCombination::from_text(
                props.text(&PropertyKey::DispositionEventCombination),
            ),
            index,
            ghost_on_destroy: props
                .text(&PropertyKey::GhostOnDestroy)
                .map(|v| v == "ghost")
                .unwrap_or(false),
            location: props.text(&PropertyKey::DispositionLocation).map(str::to_string),
            combine_disposition_step_conditions: props
                .boolean(&PropertyKey::CombineDispositionStepConditions)
                .unwrap_or(false),
        })
    }

    pub fn eligible_on_first_complete_event(&self) -> bool {
        self.event_combination == EventCombination::FirstEventEligible
    }

    /// Whether the period starts from the previous step's completion
    pub fn anchored_to_as_of(&self) -> bool {
        self.period_property.as_ref() == Some(&PropertyKey::DispositionAsOf)
    }
}

/// Parameters for creating or updating an action definition.
///
/// Unset fields are left untouched on update.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ActionDefinitionParams {
    pub name: Option<String>,
    pub label: Option<String>,
    pub description: Option<String>,
    pub period: Option<Period>,
    pub period_property: Option<PropertyKey>,
    pub events: Option<Vec<String>>,
    pub event_combination: Option<EventCombination>,
    pub ghost_on_destroy: Option<bool>,
    pub location: Option<String>,
    pub combine_disposition_step_conditions: Option<bool>,
}

impl ActionDefinitionParams {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: Some(name.into()),
            ..Default::default()
        }
    }

    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = Some(description.into());
        self
    }

    pub fn period(mut self, period: Period) -> Self {
        self.period = Some(period);
        self
    }

    pub fn anchored_to(mut self, key: PropertyKey) -> Self {
        self.period_property = Some(key);
        self
    }

    pub fn events<I, S>(mut self, events: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.events = Some(events.into_iter().map(Into::into).collect());
        self
    }

    pub fn event_combination(mut self, combination: EventCombination) -> Self {
        self.event_combination = Some(combination);
        self
    }

    pub fn ghost_on_destroy(mut self, ghost: bool) -> Self {
        self.ghost_on_destroy = Some(ghost);
        self
    }

    pub fn location(mut self, location: impl Into<String>) -> Self {
        self.location = Some(location.into());
        self
    }

    pub fn combine_disposition_step_conditions(mut self, combine: bool) -> Self {
        self.combine_disposition_step_conditions = Some(combine);
        self
    }

    pub fn to_properties(&self) -> PropertyMap {
        let mut props = PropertyMap::new();
        if let Some(name) = &self.name {
            props.insert(PropertyKey::DispositionActionName, PropertyValue::text(name));
        }
        if let Some(label) = &self.label {
            props.insert(PropertyKey::DispositionActionLabel, PropertyValue::text(label));
        }
        if let Some(description) = &self.description {
            props.insert(PropertyKey::DispositionDescription, PropertyValue::text(description));
        }
        if let Some(period) = &self.period {
            props.insert(PropertyKey::DispositionPeriod, PropertyValue::text(period.to_string()));
        }
        if let Some(key) = &self.period_property {
            props.insert(PropertyKey::DispositionPeriodProperty, PropertyValue::Key(key.clone()));
        }
        if let Some(events) = &self.events {
            props.insert(PropertyKey::DispositionEvents, PropertyValue::TextList(events.clone()));
        }
        if let Some(combination) = &self.event_combination {
            props.insert(
                PropertyKey::DispositionEventCombination,
                PropertyValue::text(combination.as_text()),
            );
        }
        if let Some(ghost) = self.ghost_on_destroy {
            let value = if ghost { "ghost" } else { "destroy" };
            props.insert(PropertyKey::GhostOnDestroy, PropertyValue::text(value));
        }
        if let Some(location) = &self.location {
            props.insert(PropertyKey::DispositionLocation, PropertyValue::text(location));
        }
        if let Some(combine) = self.combine_disposition_step_conditions {
            props.insert(PropertyKey::CombineDispositionStepConditions, combine.into());
        }
        props
    }
}
