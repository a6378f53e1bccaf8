// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use super::DispositionError;

/// Unit of a disposition period
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PeriodType {
    None,
    Immediately,
    Day,
    Week,
    Month,
    Quarter,
    Year,
    MonthEnd,
    QuarterEnd,
    YearEnd,
}

impl PeriodType {
    fn as_str(&self) -> &'static str {
        match self {
            PeriodType::None => "none",
            PeriodType::Immediately => "immediately",
            PeriodType::Day => "day",
            PeriodType::Week => "week",
            PeriodType::Month => "month",
            PeriodType::Quarter => "quarter",
            PeriodType::Year => "year",
            PeriodType::MonthEnd => "monthend",
            PeriodType::QuarterEnd => "quarterend",
            PeriodType::YearEnd => "yearend",
        }
    }
}

impl FromStr for PeriodType {
    type Err = DispositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "none" => Ok(PeriodType::None),
            "immediately" | "immediate" => Ok(PeriodType::Immediately),
            "day" => Ok(PeriodType::Day),
            "week" => Ok(PeriodType::Week),
            "month" => Ok(PeriodType::Month),
            "quarter" => Ok(PeriodType::Quarter),
            "year" => Ok(PeriodType::Year),
            "monthend" => Ok(PeriodType::MonthEnd),
            "quarterend" => Ok(PeriodType::QuarterEnd),
            "yearend" => Ok(PeriodType::YearEnd),
            other => Err(DispositionError::InvalidPeriod(other.to_string())),
        }
    }
}

/// Retention period stored on an action definition as `"type|expression"`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Period {
    period_type: PeriodType,
    expression: u32,
}

impl Period {
    pub fn new(period_type: PeriodType, expression: u32) -> Self {
        Self {
            period_type,
            expression,
        }
    }

    pub fn none() -> Self {
        Self::new(PeriodType::None, 0)
    }

    pub fn immediately() -> Self {
        Self::new(PeriodType::Immediately, 0)
    }

    pub fn days(n: u32) -> Self {
        Self::new(PeriodType::Day, n)
    }

    pub fn months(n: u32) -> Self {
        Self::new(PeriodType::Month, n)
    }

    pub fn years(n: u32) -> Self {
        Self::new(PeriodType::Year, n)
    }

    pub fn period_type(&self) -> PeriodType {
        self.period_type
    }

    pub fn expression(&self) -> u32 {
        self.expression
    }

    pub fn is_immediate(&self) -> bool {
        self.period_type == PeriodType::Immediately
    }

    /// Date the period ends when it starts at `from`.
    ///
    /// `None` periods never end. Month-end variants land on the last day of
    /// the month, quarter or year reached after adding the expression.
    pub fn next_date(&self, from: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let n = self.expression;
        match self.period_type {
            PeriodType::None => None,
            PeriodType::Immediately => Some(from),
            PeriodType::Day => from.checked_add_signed(Duration::days(i64::from(n))),
            PeriodType::Week => from.checked_add_signed(Duration::weeks(i64::from(n))),
            PeriodType::Month => from.checked_add_months(Months::new(n)),
            PeriodType::Quarter => from.checked_add_months(Months::new(n.checked_mul(3)?)),
            PeriodType::Year => from.checked_add_months(Months::new(n.checked_mul(12)?)),
            PeriodType::MonthEnd => end_of_month(from.checked_add_months(Months::new(n))?),
            PeriodType::QuarterEnd => {
                let shifted = from.checked_add_months(Months::new(n.checked_mul(3)?))?;
                let quarter_month = ((shifted.month() - 1) / 3 + 1) * 3;
                let first = NaiveDate::from_ymd_opt(shifted.year(), quarter_month, 1)?;
                end_of_month(Utc.from_utc_datetime(&first.and_time(shifted.time())))
            }
            PeriodType::YearEnd => {
                let shifted = from.checked_add_months(Months::new(n.checked_mul(12)?))?;
                let last = NaiveDate::from_ymd_opt(shifted.year(), 12, 31)?;
                Some(Utc.from_utc_datetime(&last.and_time(shifted.time())))
            }
        }
    }
}

fn end_of_month(date: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let (year, month) = if date.month() == 12 {
        (date.year() + 1, 1)
    } else {
        (date.year(), date.month() + 1)
    };
    let last = NaiveDate::from_ymd_opt(year, month, 1)?.pred_opt()?;
    Some(Utc.from_utc_datetime(&last.and_time(date.time())))
}

impl std::fmt::Display for Period {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}|{}", self.period_type.as_str(), self.expression)
    }
}

impl FromStr for Period {
    type Err = DispositionError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, expression) = match s.split_once('|') {
            Some((kind, expression)) => (kind, expression.trim()),
            None => (s, ""),
        };
        let period_type = kind.trim().parse::<PeriodType>()?;
        let expression = if expression.is_empty() {
            0
        } else {
            expression
                .parse::<u32>()
                .map_err(|_| DispositionError::InvalidPeriod(s.to_string()))?
        };
        Ok(Period::new(period_type, expression))
    }
}

impl TryFrom<String> for Period {
    type Error = DispositionError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<Period> for String {
    fn from(period: Period) -> Self {
        period.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn date(y: i32, m: u32, d: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(y, m, d, 0, 0, 0).unwrap()
    }

    #[test]
    fn test_year_period() {
        assert_eq!(Period::years(5).next_date(date(2020, 1, 1)), Some(date(2025, 1, 1)));
    }

    #[test]
    fn test_none_and_immediate_periods() {
        assert_eq!(Period::none().next_date(date(2020, 1, 1)), None);
        assert_eq!(Period::immediately().next_date(date(2020, 1, 1)), Some(date(2020, 1, 1)));
    }

    #[test]
    fn test_month_clamps_to_shorter_month() {
        assert_eq!(Period::months(1).next_date(date(2021, 1, 31)), Some(date(2021, 2, 28)));
    }

    #[test]
    fn test_end_variants() {
        let from = date(2021, 2, 10);
        assert_eq!(Period::new(PeriodType::MonthEnd, 0).next_date(from), Some(date(2021, 2, 28)));
        assert_eq!(Period::new(PeriodType::QuarterEnd, 1).next_date(from), Some(date(2021, 6, 30)));
        assert_eq!(Period::new(PeriodType::YearEnd, 2).next_date(from), Some(date(2023, 12, 31)));
    }

    #[test]
    fn test_parse_and_display() {
        let period: Period = "year|5".parse().unwrap();
        assert_eq!(period, Period::years(5));
        assert_eq!(period.to_string(), "year|5");
        assert_eq!("immediately".parse::<Period>().unwrap(), Period::immediately());
        assert!("fortnight|2".parse::<Period>().is_err());
        assert!("day|x".parse::<Period>().is_err());
    }

    proptest! {
        #[test]
        fn prop_dated_periods_never_end_before_they_start(
            days in 0i64..20_000,
            n in 0u32..50,
            kind in prop_oneof![
                Just(PeriodType::Day),
                Just(PeriodType::Week),
                Just(PeriodType::Month),
                Just(PeriodType::Quarter),
                Just(PeriodType::Year),
                Just(PeriodType::MonthEnd),
                Just(PeriodType::QuarterEnd),
                Just(PeriodType::YearEnd),
            ],
        ) {
            let from = date(1990, 1, 1) + Duration::days(days);
            let end = Period::new(kind, n).next_date(from).unwrap();
            prop_assert!(end >= from);
        }
    }
}
