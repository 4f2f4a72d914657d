//! Schedule parsing and fire-time evaluation.
//!
//! Supports standard cron expressions, extended 6-field cron (with seconds),
//! shortcuts (@daily, @hourly, etc.), and interval expressions (@every).
//! All evaluation is relative to instants the caller supplies; this module
//! never reads the wall clock itself.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use cron::Schedule as CronSchedule;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use thiserror::Error;

/// Upper bound on fire-times enumerated per evaluation window.
///
/// A pathological schedule (e.g. every second, left unreconciled for a long
/// time) would otherwise make a single evaluation unbounded. Exceeding the
/// bound is reported as [`ScheduleError::TooManyMissedRuns`], never silently
/// truncated.
pub const MAX_MISSED_RUNS: usize = 100;

/// Errors that can occur when parsing or evaluating schedules.
#[derive(Debug, Error)]
pub enum ScheduleError {
    /// Invalid cron expression.
    #[error("invalid cron expression: {0}")]
    InvalidCron(String),

    /// Invalid interval expression.
    #[error("invalid interval expression: {0}")]
    InvalidInterval(String),

    /// Invalid timezone.
    #[error("invalid timezone: {0}")]
    InvalidTimezone(String),

    /// More fire-times fell in the evaluation window than the engine is
    /// willing to enumerate.
    #[error("too many missed runs: over {limit} fire-times in window")]
    TooManyMissedRuns {
        /// The enumeration bound that was exceeded.
        limit: usize,
    },

    /// No more occurrences.
    #[error("no more occurrences")]
    NoMoreOccurrences,
}

/// A parsed schedule for job launches.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Schedule {
    /// The original expression string.
    expression: String,
    /// The timezone for this schedule.
    timezone: String,
    /// Parsed schedule type.
    #[serde(skip)]
    schedule_type: ScheduleType,
}

#[derive(Debug, Clone, Default)]
enum ScheduleType {
    /// Standard cron schedule.
    Cron(Box<CronSchedule>),
    /// Interval-based schedule (e.g., @every 5m).
    Interval(std::time::Duration),
    /// Not yet parsed.
    #[default]
    Unparsed,
}

impl Schedule {
    /// Create a new schedule from a cron expression.
    ///
    /// Supports:
    /// - Standard 5-field cron: `minute hour day month weekday`
    /// - Extended 6-field cron: `second minute hour day month weekday`
    /// - Shortcuts: `@yearly`, `@monthly`, `@weekly`, `@daily`, `@hourly`
    /// - Intervals: `@every 5m`, `@every 1h30m`
    pub fn new(expression: impl Into<String>) -> Result<Self, ScheduleError> {
        Self::with_timezone(expression, "UTC")
    }

    /// Create a new schedule with a specific timezone.
    pub fn with_timezone(
        expression: impl Into<String>,
        timezone: impl Into<String>,
    ) -> Result<Self, ScheduleError> {
        let expression = expression.into();
        let timezone = timezone.into();

        // Validate timezone
        timezone
            .parse::<Tz>()
            .map_err(|_| ScheduleError::InvalidTimezone(timezone.clone()))?;

        let schedule_type = Self::parse_expression(&expression)?;

        Ok(Self {
            expression,
            timezone,
            schedule_type,
        })
    }

    /// Parse the expression into a schedule type.
    fn parse_expression(expression: &str) -> Result<ScheduleType, ScheduleError> {
        let trimmed = expression.trim();

        // Handle shortcuts
        if trimmed.starts_with('@') {
            return Self::parse_shortcut(trimmed);
        }

        // Try to parse as cron expression
        Self::parse_cron(trimmed)
    }

    /// Parse a shortcut expression (@daily, @every, etc.).
    fn parse_shortcut(expression: &str) -> Result<ScheduleType, ScheduleError> {
        match expression.to_lowercase().as_str() {
            "@yearly" | "@annually" => Self::parse_cron("0 0 1 1 *"),
            "@monthly" => Self::parse_cron("0 0 1 * *"),
            "@weekly" => Self::parse_cron("0 0 * * SUN"),
            "@daily" | "@midnight" => Self::parse_cron("0 0 * * *"),
            "@hourly" => Self::parse_cron("0 * * * *"),
            s if s.starts_with("@every ") => Self::parse_interval(&s[7..]),
            _ => Err(ScheduleError::InvalidCron(format!(
                "unknown shortcut: {}",
                expression
            ))),
        }
    }

    /// Parse an interval expression (e.g., "5m", "1h30m").
    fn parse_interval(interval: &str) -> Result<ScheduleType, ScheduleError> {
        let trimmed = interval.trim();
        let duration = Self::parse_duration(trimmed)?;
        Ok(ScheduleType::Interval(duration))
    }

    /// Parse a duration string like "5m", "1h", "1h30m", "30s".
    fn parse_duration(s: &str) -> Result<std::time::Duration, ScheduleError> {
        let mut total_secs: u64 = 0;
        let mut current_num = String::new();

        for c in s.chars() {
            if c.is_ascii_digit() {
                current_num.push(c);
            } else {
                let num: u64 = current_num
                    .parse()
                    .map_err(|_| ScheduleError::InvalidInterval(s.to_string()))?;
                current_num.clear();

                match c {
                    's' => total_secs += num,
                    'm' => total_secs += num * 60,
                    'h' => total_secs += num * 3600,
                    'd' => total_secs += num * 86400,
                    _ => return Err(ScheduleError::InvalidInterval(s.to_string())),
                }
            }
        }

        if total_secs == 0 {
            return Err(ScheduleError::InvalidInterval(s.to_string()));
        }

        Ok(std::time::Duration::from_secs(total_secs))
    }

    /// Parse a cron expression.
    fn parse_cron(expression: &str) -> Result<ScheduleType, ScheduleError> {
        // Count fields to determine if it's 5-field or 6-field cron
        let fields: Vec<&str> = expression.split_whitespace().collect();

        let cron_expr = match fields.len() {
            5 => {
                // Standard 5-field cron, add seconds field
                format!("0 {}", expression)
            }
            6 => {
                // Extended 6-field cron with seconds
                expression.to_string()
            }
            _ => {
                return Err(ScheduleError::InvalidCron(format!(
                    "expected 5 or 6 fields, got {}",
                    fields.len()
                )));
            }
        };

        let schedule = CronSchedule::from_str(&cron_expr)
            .map_err(|e| ScheduleError::InvalidCron(e.to_string()))?;

        Ok(ScheduleType::Cron(Box::new(schedule)))
    }

    /// Get the next fire-time strictly after the given time.
    pub fn next_after(&self, after: DateTime<Utc>) -> Result<DateTime<Utc>, ScheduleError> {
        let tz: Tz = self
            .timezone
            .parse()
            .map_err(|_| ScheduleError::InvalidTimezone(self.timezone.clone()))?;

        match &self.schedule_type {
            ScheduleType::Cron(schedule) => {
                // Convert to timezone, find next, convert back to UTC
                let local_time = after.with_timezone(&tz);
                schedule
                    .after(&local_time)
                    .next()
                    .map(|dt| dt.with_timezone(&Utc))
                    .ok_or(ScheduleError::NoMoreOccurrences)
            }
            ScheduleType::Interval(duration) => {
                let step = chrono::Duration::from_std(*duration)
                    .map_err(|_| ScheduleError::InvalidInterval(self.expression.clone()))?;
                Ok(after + step)
            }
            ScheduleType::Unparsed => Err(ScheduleError::InvalidCron("schedule not parsed".into())),
        }
    }

    /// Get the next N fire-times strictly after the given time.
    pub fn next_n_after(
        &self,
        after: DateTime<Utc>,
        n: usize,
    ) -> Result<Vec<DateTime<Utc>>, ScheduleError> {
        let mut results = Vec::with_capacity(n);
        let mut cursor = after;
        for _ in 0..n {
            match self.next_after(cursor) {
                Ok(next) => {
                    results.push(next);
                    cursor = next;
                }
                Err(ScheduleError::NoMoreOccurrences) => break,
                Err(e) => return Err(e),
            }
        }
        Ok(results)
    }

    /// Every fire-time in the half-open interval `(earliest, latest]`,
    /// ascending.
    ///
    /// This is the evaluation primitive for reconciliation: `earliest` is
    /// the last recorded schedule time (exclusive) and `latest` is now
    /// (inclusive). An empty result is the common case on most passes.
    ///
    /// Enumeration is bounded at [`MAX_MISSED_RUNS`] fire-times; exceeding
    /// the bound yields [`ScheduleError::TooManyMissedRuns`] so the caller
    /// can report the backlog instead of silently dropping it.
    pub fn missed_runs(
        &self,
        earliest: DateTime<Utc>,
        latest: DateTime<Utc>,
    ) -> Result<Vec<DateTime<Utc>>, ScheduleError> {
        let mut fire_times = Vec::new();
        let mut cursor = earliest;

        loop {
            let next = match self.next_after(cursor) {
                Ok(next) => next,
                Err(ScheduleError::NoMoreOccurrences) => break,
                Err(e) => return Err(e),
            };

            if next > latest {
                break;
            }

            if fire_times.len() == MAX_MISSED_RUNS {
                return Err(ScheduleError::TooManyMissedRuns {
                    limit: MAX_MISSED_RUNS,
                });
            }

            fire_times.push(next);
            cursor = next;
        }

        Ok(fire_times)
    }

    /// Get the original expression string.
    pub fn expression(&self) -> &str {
        &self.expression
    }

    /// Get the timezone.
    pub fn timezone(&self) -> &str {
        &self.timezone
    }
}

// Custom deserialization to re-parse the schedule after loading
impl<'de> Deserialize<'de> for ScheduleType {
    fn deserialize<D>(_deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        // Always deserialize as Unparsed; the Schedule will re-parse
        Ok(ScheduleType::Unparsed)
    }
}

impl Serialize for ScheduleType {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        // Serialize as unit (nothing)
        serializer.serialize_unit()
    }
}
