//! Cron expression evaluation.
//!
//! Expressions carry six whitespace-separated fields: second, minute, hour,
//! day-of-month, month, day-of-week. The seconds field exists because the
//! poll tick is sub-minute; five-field expressions are rejected outright.

use std::str::FromStr;

use chrono::{DateTime, Utc};
use cron::Schedule;

use super::EngineError;

/// Field count for a valid expression.
const CRON_FIELDS: usize = 6;

fn parse(expression: &str) -> Result<Schedule, EngineError> {
    let fields = expression.split_whitespace().count();
    if fields != CRON_FIELDS {
        return Err(EngineError::InvalidCronExpression {
            expression: expression.to_string(),
            reason: format!(
                "expected {CRON_FIELDS} fields (second minute hour day-of-month month day-of-week), got {fields}"
            ),
        });
    }

    Schedule::from_str(expression).map_err(|err| EngineError::InvalidCronExpression {
        expression: expression.to_string(),
        reason: err.to_string(),
    })
}

/// Check an expression without evaluating it.
pub fn validate(expression: &str) -> Result<(), EngineError> {
    parse(expression).map(|_| ())
}

/// First occurrence strictly after `after`.
///
/// `Ok(None)` means the schedule has no future occurrence (e.g. a
/// day-of-month that never exists); such a job simply never fires again.
pub fn next_fire_time(
    expression: &str,
    after: DateTime<Utc>,
) -> Result<Option<DateTime<Utc>>, EngineError> {
    let schedule = parse(expression)?;
    Ok(schedule.after(&after).next())
}

/// All occurrences strictly after `after` and at or before `until`.
/// Backs the upcoming-runs preview.
pub fn fire_times_within(
    expression: &str,
    after: DateTime<Utc>,
    until: DateTime<Utc>,
) -> Result<Vec<DateTime<Utc>>, EngineError> {
    let schedule = parse(expression)?;
    Ok(schedule.after(&after).take_while(|t| *t <= until).collect())
}
