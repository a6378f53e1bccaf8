// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Date ordering and write rules for reconciling the as-of date of a record
//! filed under several schedules.

use std::cmp::Ordering;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Compares as-of dates, ordering `None` ("never due") after every date
pub fn compare_as_of(a: Option<DateTime<Utc>>, b: Option<DateTime<Utc>>) -> Ordering {
    match (a, b) {
        (None, None) => Ordering::Equal,
        (None, Some(_)) => Ordering::Greater,
        (Some(_), None) => Ordering::Less,
        (Some(a), Some(b)) => a.cmp(&b),
    }
}

/// What a reconciliation pass may persist on the record's next action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WriteMode {
    ReadOnly,
    DateOnly,
    /// First action for the record, both the name and the date are new
    DateAndName,
}

impl WriteMode {
    /// Allows a write only when `computed` is strictly later than `stored`
    pub fn for_recalculated_date(
        stored: Option<DateTime<Utc>>,
        computed: Option<DateTime<Utc>>,
    ) -> Self {
        if compare_as_of(stored, computed) == Ordering::Less {
            WriteMode::DateOnly
        } else {
            WriteMode::ReadOnly
        }
    }

    pub fn writes_date(&self) -> bool {
        !matches!(self, WriteMode::ReadOnly)
    }

    pub fn writes_name(&self) -> bool {
        matches!(self, WriteMode::DateAndName)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone};
    use proptest::prelude::*;

    fn day(n: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2020, 1, 1, 0, 0, 0).unwrap() + Duration::days(n)
    }

    #[test]
    fn test_later_date_is_written() {
        assert_eq!(WriteMode::for_recalculated_date(Some(day(1)), Some(day(2))), WriteMode::DateOnly);
        assert_eq!(WriteMode::for_recalculated_date(Some(day(2)), Some(day(1))), WriteMode::ReadOnly);
        assert_eq!(WriteMode::for_recalculated_date(Some(day(2)), Some(day(2))), WriteMode::ReadOnly);
    }

    #[test]
    fn test_never_due_dominates() {
        assert_eq!(WriteMode::for_recalculated_date(Some(day(1)), None), WriteMode::DateOnly);
        assert_eq!(WriteMode::for_recalculated_date(None, Some(day(1))), WriteMode::ReadOnly);
        assert_eq!(WriteMode::for_recalculated_date(None, None), WriteMode::ReadOnly);
    }

    fn as_of_strategy() -> impl Strategy<Value = Option<DateTime<Utc>>> {
        prop_oneof![Just(None), (0i64..3650).prop_map(|n| Some(day(n)))]
    }

    proptest! {
        #[test]
        fn prop_recalculation_never_moves_as_of_earlier(
            initial in as_of_strategy(),
            candidates in proptest::collection::vec(as_of_strategy(), 1..20),
        ) {
            let mut stored = initial;
            for computed in candidates {
                let previous = stored;
                if WriteMode::for_recalculated_date(stored, computed).writes_date() {
                    stored = computed;
                }
                prop_assert_ne!(compare_as_of(stored, previous), Ordering::Less);
            }
        }
    }
}
