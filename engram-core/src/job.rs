//! Job entities: the observable lifecycle of long-running work.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::errors::{EngramResult, JobError};

/// What kind of work a job performs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobKind {
    Consolidation,
    DmdProcessing,
}

/// Job lifecycle state.
///
/// Transitions are one-way except `Paused` <-> `Running`;
/// `Completed`, `Failed`, and `Cancelled` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum JobState {
    Queued,
    Running,
    Completed,
    Failed,
    Cancelled,
    Paused,
}

impl JobState {
    /// Whether this state admits no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Failed | Self::Cancelled)
    }

    /// Whether `self -> to` is a legal transition.
    pub fn can_transition_to(self, to: JobState) -> bool {
        use JobState::*;
        match (self, to) {
            (Queued, Running) | (Queued, Cancelled) | (Queued, Failed) => true,
            (Running, Completed) | (Running, Failed) | (Running, Cancelled) => true,
            (Running, Paused) | (Paused, Running) | (Paused, Cancelled) => true,
            _ => false,
        }
    }
}

/// Diagnostic counters updated as a job runs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct JobCounters {
    pub items_total: u64,
    pub items_processed: u64,
    pub items_failed: u64,
    pub items_skipped: u64,
}

/// A long-running unit of work with an observable lifecycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Job {
    /// Unique job id (uuid v4).
    pub id: String,
    pub kind: JobKind,
    pub state: JobState,
    /// Progress in [0, 100]; monotonically non-decreasing.
    pub progress: u8,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub ended_at: Option<DateTime<Utc>>,
    pub counters: JobCounters,
    /// Human-readable failure reason, when failed.
    pub error: Option<String>,
    /// Client-supplied description.
    pub description: Option<String>,
    /// Client that submitted the job.
    pub client_id: Option<String>,
}

impl Job {
    /// Create a queued job of the given kind.
    pub fn new(kind: JobKind) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            state: JobState::Queued,
            progress: 0,
            created_at: Utc::now(),
            started_at: None,
            ended_at: None,
            counters: JobCounters::default(),
            error: None,
            description: None,
            client_id: None,
        }
    }

    /// Apply a state transition, enforcing the one-way machine.
    pub fn transition(&mut self, to: JobState) -> EngramResult<()> {
        if !self.state.can_transition_to(to) {
            return Err(JobError::InvalidTransition {
                from: self.state,
                to,
            }
            .into());
        }
        match to {
            JobState::Running if self.started_at.is_none() => {
                self.started_at = Some(Utc::now());
            }
            JobState::Completed | JobState::Failed | JobState::Cancelled => {
                self.ended_at = Some(Utc::now());
                if to == JobState::Completed {
                    self.progress = 100;
                }
            }
            _ => {}
        }
        self.state = to;
        Ok(())
    }

    /// Raise progress; lowering is silently ignored (monotonic counter).
    pub fn set_progress(&mut self, progress: u8) {
        let p = progress.min(100);
        if p > self.progress {
            self.progress = p;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queued_to_running_to_completed() {
        let mut job = Job::new(JobKind::Consolidation);
        job.transition(JobState::Running).unwrap();
        assert!(job.started_at.is_some());
        job.transition(JobState::Completed).unwrap();
        assert_eq!(job.progress, 100);
        assert!(job.ended_at.is_some());
    }

    #[test]
    fn terminal_states_reject_transitions() {
        let mut job = Job::new(JobKind::DmdProcessing);
        job.transition(JobState::Running).unwrap();
        job.transition(JobState::Cancelled).unwrap();
        assert!(job.transition(JobState::Running).is_err());
        assert!(job.state.is_terminal());
    }

    #[test]
    fn pause_resume_is_the_only_cycle() {
        let mut job = Job::new(JobKind::Consolidation);
        job.transition(JobState::Running).unwrap();
        job.transition(JobState::Paused).unwrap();
        job.transition(JobState::Running).unwrap();
        assert_eq!(job.state, JobState::Running);
    }

    #[test]
    fn progress_is_monotonic() {
        let mut job = Job::new(JobKind::Consolidation);
        job.set_progress(40);
        job.set_progress(20);
        assert_eq!(job.progress, 40);
        job.set_progress(200);
        assert_eq!(job.progress, 100);
    }

    #[test]
    fn queued_cannot_pause() {
        let mut job = Job::new(JobKind::Consolidation);
        assert!(job.transition(JobState::Paused).is_err());
    }
}
