//! Scheduled consolidations: one-shot or cron-recurring entries, with
//! adaptive deferral under load.

use std::str::FromStr;

use chrono::{DateTime, Duration, Utc};
use cron::Schedule;
use parking_lot::Mutex;
use tracing::debug;

use engram_core::errors::{EngramResult, JobError};

/// How long a deferred entry waits before the next load check.
const DEFER_INTERVAL_SECS: i64 = 60;

/// One scheduled entry. The payload is opaque to the scheduler; the
/// service stores a serialized consolidation request in it.
#[derive(Debug, Clone)]
pub struct ScheduledEntry {
    pub id: String,
    pub run_at: DateTime<Utc>,
    /// Normalised cron expression for recurring entries.
    pub recurrence: Option<String>,
    pub payload: String,
}

/// What `collect_due` decided for the tick.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScheduleDecision {
    /// Entries are due and should launch now.
    Launch,
    /// Load was above the threshold; due entries were pushed back.
    Deferred,
    /// Nothing due.
    Idle,
}

/// In-memory schedule of pending consolidations.
#[derive(Default)]
pub struct Scheduler {
    entries: Mutex<Vec<ScheduledEntry>>,
}

impl Scheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entry. A recurrence expression is validated up front.
    pub fn schedule(
        &self,
        run_at: DateTime<Utc>,
        recurrence: Option<&str>,
        payload: String,
    ) -> EngramResult<ScheduledEntry> {
        let recurrence = match recurrence {
            Some(expr) => Some(normalise_cron(expr)?),
            None => None,
        };
        let entry = ScheduledEntry {
            id: uuid::Uuid::new_v4().to_string(),
            run_at,
            recurrence,
            payload,
        };
        self.entries.lock().push(entry.clone());
        Ok(entry)
    }

    pub fn pending(&self) -> Vec<ScheduledEntry> {
        self.entries.lock().clone()
    }

    pub fn remove(&self, id: &str) -> bool {
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|e| e.id != id);
        entries.len() != before
    }

    /// Pull everything due at `now`. Under adaptive scheduling with load
    /// at or above the threshold, due entries are deferred instead.
    /// Recurring entries re-arm at their next cron occurrence.
    pub fn collect_due(
        &self,
        now: DateTime<Utc>,
        load: usize,
        adaptive: bool,
        load_threshold: usize,
    ) -> (Vec<ScheduledEntry>, ScheduleDecision) {
        let mut entries = self.entries.lock();
        let any_due = entries.iter().any(|e| e.run_at <= now);
        if !any_due {
            return (Vec::new(), ScheduleDecision::Idle);
        }
        if adaptive && load >= load_threshold {
            for entry in entries.iter_mut().filter(|e| e.run_at <= now) {
                entry.run_at = now + Duration::seconds(DEFER_INTERVAL_SECS);
            }
            debug!(load, load_threshold, "deferred scheduled consolidations");
            return (Vec::new(), ScheduleDecision::Deferred);
        }

        let mut due = Vec::new();
        let mut keep = Vec::new();
        for entry in entries.drain(..) {
            if entry.run_at > now {
                keep.push(entry);
                continue;
            }
            if let Some(ref expr) = entry.recurrence {
                if let Some(next) = next_occurrence(expr, now) {
                    keep.push(ScheduledEntry {
                        run_at: next,
                        ..entry.clone()
                    });
                }
            }
            due.push(entry);
        }
        *entries = keep;
        (due, ScheduleDecision::Launch)
    }
}

/// Accept 5-field (minute-resolution) and 6/7-field cron expressions;
/// the cron crate wants seconds, so 5-field forms get a leading "0".
pub fn normalise_cron(expr: &str) -> EngramResult<String> {
    let fields = expr.split_whitespace().count();
    let candidate = if fields == 5 {
        format!("0 {expr}")
    } else {
        expr.to_string()
    };
    Schedule::from_str(&candidate).map_err(|_| JobError::InvalidCron {
        expr: expr.to_string(),
    })?;
    Ok(candidate)
}

/// Next firing strictly after `after`, when the expression has one.
pub fn next_occurrence(expr: &str, after: DateTime<Utc>) -> Option<DateTime<Utc>> {
    let schedule = Schedule::from_str(expr).ok()?;
    schedule.after(&after).next()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn five_field_cron_is_normalised() {
        let normalised = normalise_cron("*/5 * * * *").unwrap();
        assert_eq!(normalised, "0 */5 * * * *");
        assert!(next_occurrence(&normalised, Utc::now()).is_some());
    }

    #[test]
    fn bad_cron_is_invalid_input() {
        let err = normalise_cron("not a cron").unwrap_err();
        assert_eq!(err.kind(), engram_core::errors::ErrorKind::InvalidInput);
    }

    #[test]
    fn one_shot_entries_fire_once() {
        let scheduler = Scheduler::new();
        let now = Utc::now();
        scheduler
            .schedule(now - Duration::seconds(1), None, "req".into())
            .unwrap();
        let (due, decision) = scheduler.collect_due(now, 0, false, 4);
        assert_eq!(due.len(), 1);
        assert_eq!(decision, ScheduleDecision::Launch);
        let (due, decision) = scheduler.collect_due(now, 0, false, 4);
        assert!(due.is_empty());
        assert_eq!(decision, ScheduleDecision::Idle);
    }

    #[test]
    fn recurring_entries_re_arm() {
        let scheduler = Scheduler::new();
        let now = Utc::now();
        scheduler
            .schedule(now - Duration::seconds(1), Some("*/5 * * * *"), "req".into())
            .unwrap();
        let (due, _) = scheduler.collect_due(now, 0, false, 4);
        assert_eq!(due.len(), 1);
        let pending = scheduler.pending();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].run_at > now);
    }

    #[test]
    fn high_load_defers_under_adaptive_scheduling() {
        let scheduler = Scheduler::new();
        let now = Utc::now();
        scheduler
            .schedule(now - Duration::seconds(1), None, "req".into())
            .unwrap();
        let (due, decision) = scheduler.collect_due(now, 8, true, 4);
        assert!(due.is_empty());
        assert_eq!(decision, ScheduleDecision::Deferred);
        // Still pending, pushed into the future.
        let pending = scheduler.pending();
        assert_eq!(pending.len(), 1);
        assert!(pending[0].run_at > now);
    }

    #[test]
    fn removal_by_id() {
        let scheduler = Scheduler::new();
        let entry = scheduler
            .schedule(Utc::now() + Duration::hours(1), None, "req".into())
            .unwrap();
        assert!(scheduler.remove(&entry.id));
        assert!(!scheduler.remove(&entry.id));
        assert!(scheduler.pending().is_empty());
    }
}
