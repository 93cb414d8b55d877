//! Cron expression parsing and evaluation.
//!
//! Supports the standard five-field format: `minute hour day month weekday`.
//! Every field resolves to a set of allowed values built from `*`, a literal,
//! a comma list, a range `a-b`, or a step (`*/n`, `a-b/n`, `a/n`).

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Datelike, Duration, TimeZone, Timelike};
use thiserror::Error;

/// Upper bound of the forward scan in [`ScheduleExpression::next_occurrence`].
///
/// Eight years of minutes: long enough to reach Feb 29 across a skipped leap
/// year, short enough that impossible dates (Feb 31) terminate quickly.
pub const SEARCH_HORIZON_MINUTES: i64 = 8 * 366 * 24 * 60;

/// A schedule expression that could not be parsed.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MalformedScheduleError {
    /// The expression does not have exactly five fields.
    #[error("Schedule expression must have 5 fields, got {count}: {expr:?}")]
    FieldCount { expr: String, count: usize },

    /// A field does not follow the grammar or is out of range.
    #[error("Invalid {field} field {value:?}: {reason}")]
    InvalidField {
        field: &'static str,
        value: String,
        reason: String,
    },

    /// A step is zero, negative or not a number.
    #[error("Step must be a positive integer in {field} field {value:?}")]
    InvalidStep { field: &'static str, value: String },
}

#[derive(Debug, Clone, Copy)]
struct FieldSpec {
    name: &'static str,
    min: u32,
    max: u32,
}

const MINUTE: FieldSpec = FieldSpec { name: "minute", min: 0, max: 59 };
const HOUR: FieldSpec = FieldSpec { name: "hour", min: 0, max: 23 };
const DAY: FieldSpec = FieldSpec { name: "day", min: 1, max: 31 };
const MONTH: FieldSpec = FieldSpec { name: "month", min: 1, max: 12 };
// 7 is accepted as an alias for Sunday and folded into 0 after parsing.
const WEEKDAY: FieldSpec = FieldSpec { name: "weekday", min: 0, max: 7 };

/// A parsed cron expression.
///
/// Immutable once constructed; every field set is non-empty.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScheduleExpression {
    source: String,
    /// Minute (0-59).
    minute: BTreeSet<u32>,
    /// Hour (0-23).
    hour: BTreeSet<u32>,
    /// Day of month (1-31).
    day: BTreeSet<u32>,
    /// Month (1-12).
    month: BTreeSet<u32>,
    /// Day of week (0-6, Sunday = 0).
    weekday: BTreeSet<u32>,
}

impl ScheduleExpression {
    /// Parse a cron expression string.
    ///
    /// # Examples
    ///
    /// - `0 0 * * *` - Daily at midnight
    /// - `*/5 * * * *` - Every 5 minutes
    /// - `0 9-17 * * 1-5` - Every hour 9am-5pm, Monday-Friday
    /// - `0 8-18/2 1,15 * *` - Every other hour 8am-6pm on the 1st and 15th
    pub fn parse(expr: &str) -> Result<Self, MalformedScheduleError> {
        let parts: Vec<&str> = expr.split_whitespace().collect();
        if parts.len() != 5 {
            return Err(MalformedScheduleError::FieldCount {
                expr: expr.to_string(),
                count: parts.len(),
            });
        }

        let mut weekday = Self::parse_field(parts[4], WEEKDAY)?;
        if weekday.remove(&7) {
            weekday.insert(0);
        }

        Ok(Self {
            source: parts.join(" "),
            minute: Self::parse_field(parts[0], MINUTE)?,
            hour: Self::parse_field(parts[1], HOUR)?,
            day: Self::parse_field(parts[2], DAY)?,
            month: Self::parse_field(parts[3], MONTH)?,
            weekday,
        })
    }

    fn parse_field(field: &str, spec: FieldSpec) -> Result<BTreeSet<u32>, MalformedScheduleError> {
        let mut values = BTreeSet::new();
        for part in field.split(',') {
            Self::parse_part(field, part, spec, &mut values)?;
        }
        Ok(values)
    }

    fn parse_part(
        field: &str,
        part: &str,
        spec: FieldSpec,
        values: &mut BTreeSet<u32>,
    ) -> Result<(), MalformedScheduleError> {
        let invalid = |reason: String| MalformedScheduleError::InvalidField {
            field: spec.name,
            value: field.to_string(),
            reason,
        };

        let (range, step) = match part.split_once('/') {
            Some((range, step)) => {
                let step = step
                    .parse::<u32>()
                    .ok()
                    .filter(|step| *step > 0)
                    .ok_or_else(|| MalformedScheduleError::InvalidStep {
                        field: spec.name,
                        value: field.to_string(),
                    })?;
                (range, Some(step))
            }
            None => (part, None),
        };

        let parse_value = |text: &str| -> Result<u32, MalformedScheduleError> {
            let value: u32 = text
                .parse()
                .ok()
                .ok_or_else(|| invalid(format!("{text:?} is not a number")))?;
            if value < spec.min || value > spec.max {
                return Err(invalid(format!(
                    "value {value} outside {}-{}",
                    spec.min, spec.max
                )));
            }
            Ok(value)
        };

        let (start, end) = if range == "*" {
            (spec.min, spec.max)
        } else if let Some((start, end)) = range.split_once('-') {
            let (start, end) = (parse_value(start)?, parse_value(end)?);
            if start > end {
                return Err(invalid(format!("range {start}-{end} is reversed")));
            }
            (start, end)
        } else {
            let value = parse_value(range)?;
            // `a/n` runs from `a` to the top of the field
            if step.is_some() { (value, spec.max) } else { (value, value) }
        };

        let step = step.unwrap_or(1) as usize;
        values.extend((start..=end).step_by(step));
        Ok(())
    }

    /// Check if the cron expression matches the given time.
    pub fn matches<Tz: TimeZone>(&self, time: &DateTime<Tz>) -> bool {
        self.minute.contains(&time.minute())
            && self.hour.contains(&time.hour())
            && self.day_matches(time)
    }

    fn day_matches<Tz: TimeZone>(&self, time: &DateTime<Tz>) -> bool {
        self.day.contains(&time.day())
            && self.month.contains(&time.month())
            && self.weekday.contains(&time.weekday().num_days_from_sunday())
    }

    /// Calculate the earliest whole minute strictly after `after` that matches.
    ///
    /// `after` itself is never returned, even when it matches. Returns `None`
    /// when nothing matches within [`SEARCH_HORIZON_MINUTES`].
    pub fn next_occurrence<Tz: TimeZone>(&self, after: &DateTime<Tz>) -> Option<DateTime<Tz>> {
        let truncated = after.clone()
            - Duration::seconds(i64::from(after.second()))
            - Duration::nanoseconds(i64::from(after.nanosecond()));
        let mut current = truncated + Duration::minutes(1);
        let deadline = current.clone() + Duration::minutes(SEARCH_HORIZON_MINUTES);

        while current < deadline {
            if !self.hour.contains(&current.hour()) || !self.day_matches(&current) {
                // Nothing left in this hour can match.
                let skip = 60 - i64::from(current.minute());
                current = current + Duration::minutes(skip);
                continue;
            }
            if self.minute.contains(&current.minute()) {
                return Some(current);
            }
            current = current + Duration::minutes(1);
        }
        None
    }

    /// The normalized expression text.
    pub fn as_str(&self) -> &str {
        &self.source
    }
}

impl FromStr for ScheduleExpression {
    type Err = MalformedScheduleError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for ScheduleExpression {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.source)
    }
}
