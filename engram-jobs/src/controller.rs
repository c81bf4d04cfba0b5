//! JobController: the registry of live and finished jobs, their state
//! files, and the submit/cancel/status/wait surface.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use dashmap::DashMap;
use parking_lot::{Condvar, Mutex};
use tracing::{info, warn};

use engram_core::errors::{EngramError, EngramResult, ErrorKind, JobError};
use engram_core::job::{Job, JobCounters, JobKind, JobState};
use engram_core::traits::ICompletionHook;

use crate::cancel::CancelToken;
use crate::pool::WorkerPool;

/// One registered job: record + cancel flag + completion signal.
struct JobHandle {
    job: Mutex<Job>,
    cancel: CancelToken,
    done: Condvar,
    /// Sequence number naming the on-disk state file.
    seq: u64,
}

/// Worker-side view of a running job.
#[derive(Clone)]
pub struct JobCtx {
    handle: Arc<JobHandle>,
    controller: JobControllerInner,
}

impl JobCtx {
    pub fn job_id(&self) -> String {
        self.handle.job.lock().id.clone()
    }

    pub fn cancel_token(&self) -> CancelToken {
        self.handle.cancel.clone()
    }

    pub fn is_cancelled(&self) -> bool {
        self.handle.cancel.is_cancelled()
    }

    /// Raise the job's monotonic progress counter.
    pub fn set_progress(&self, percent: u8) {
        let mut job = self.handle.job.lock();
        job.set_progress(percent);
    }

    pub fn set_counters(&self, counters: JobCounters) {
        let mut job = self.handle.job.lock();
        job.counters = counters;
    }
}

/// Shared innards so JobCtx can persist state transitions and publish
/// completions.
#[derive(Clone)]
struct JobControllerInner {
    state_dir: Option<PathBuf>,
    hook: Option<Arc<dyn ICompletionHook>>,
}

impl JobControllerInner {
    fn persist(&self, handle: &JobHandle) {
        let Some(ref dir) = self.state_dir else { return };
        let job = handle.job.lock().clone();
        let path = dir.join(format!("{:04}.state", handle.seq));
        match serde_json::to_vec_pretty(&job) {
            Ok(bytes) => {
                if let Err(e) = fs::write(&path, bytes) {
                    warn!(path = %path.display(), error = %e, "job state write failed");
                }
            }
            Err(e) => warn!(error = %e, "job state serialize failed"),
        }
    }
}

/// The controller. Owns the worker pool and the job registry.
pub struct JobController {
    registry: DashMap<String, Arc<JobHandle>>,
    pool: WorkerPool,
    inner: JobControllerInner,
    seq: AtomicU64,
    /// Jobs found unfinished at startup, failed with "unclean shutdown".
    recovered_failures: usize,
}

impl JobController {
    /// Open a controller. With a state dir, unfinished job records from a
    /// previous run transition to FAILED ("unclean shutdown").
    pub fn open(
        workers: usize,
        queue_capacity: usize,
        state_dir: Option<&Path>,
        hook: Option<Arc<dyn ICompletionHook>>,
    ) -> EngramResult<Self> {
        let mut recovered_failures = 0usize;
        let mut seq_start = 0u64;
        if let Some(dir) = state_dir {
            fs::create_dir_all(dir)?;
            for entry in fs::read_dir(dir)? {
                let path = entry?.path();
                if path.extension().map(|e| e != "state").unwrap_or(true) {
                    continue;
                }
                if let Some(n) = path
                    .file_stem()
                    .and_then(|s| s.to_str())
                    .and_then(|s| s.parse::<u64>().ok())
                {
                    seq_start = seq_start.max(n + 1);
                }
                let Ok(bytes) = fs::read(&path) else { continue };
                let Ok(mut job) = serde_json::from_slice::<Job>(&bytes) else {
                    warn!(path = %path.display(), "unreadable job record skipped");
                    continue;
                };
                if !job.state.is_terminal() {
                    job.state = JobState::Failed;
                    job.error = Some("unclean shutdown".to_string());
                    job.ended_at = Some(Utc::now());
                    recovered_failures += 1;
                    if let Ok(bytes) = serde_json::to_vec_pretty(&job) {
                        let _ = fs::write(&path, bytes);
                    }
                }
            }
            if recovered_failures > 0 {
                info!(recovered_failures, "failed unfinished jobs from previous run");
            }
        }
        Ok(Self {
            registry: DashMap::new(),
            pool: WorkerPool::new(workers, queue_capacity)?,
            inner: JobControllerInner {
                state_dir: state_dir.map(|p| p.to_path_buf()),
                hook,
            },
            seq: AtomicU64::new(seq_start),
            recovered_failures,
        })
    }

    pub fn recovered_failures(&self) -> usize {
        self.recovered_failures
    }

    /// Submit a job. The work closure runs on the pool with a JobCtx;
    /// its Result decides the terminal state.
    pub fn submit(
        &self,
        kind: JobKind,
        description: Option<String>,
        client_id: Option<String>,
        work: impl FnOnce(&JobCtx) -> EngramResult<()> + Send + 'static,
    ) -> EngramResult<String> {
        let mut job = Job::new(kind);
        job.description = description;
        job.client_id = client_id;
        let id = job.id.clone();

        let handle = Arc::new(JobHandle {
            job: Mutex::new(job),
            cancel: CancelToken::new(),
            done: Condvar::new(),
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
        });
        self.inner.persist(&handle);
        self.registry.insert(id.clone(), Arc::clone(&handle));

        let ctx = JobCtx {
            handle: Arc::clone(&handle),
            controller: self.inner.clone(),
        };
        let submit_result = self.pool.submit(move || {
            run_job(ctx, work);
        });
        if let Err(e) = submit_result {
            // Queue full: the job never ran.
            let mut record = handle.job.lock();
            let _ = record.transition(JobState::Failed);
            record.error = Some("worker pool saturated".to_string());
            drop(record);
            self.inner.persist(&handle);
            return Err(e);
        }
        Ok(id)
    }

    /// Current record for a job.
    pub fn status(&self, id: &str) -> EngramResult<Job> {
        self.registry
            .get(id)
            .map(|h| h.job.lock().clone())
            .ok_or_else(|| JobError::JobNotFound { id: id.to_string() }.into())
    }

    /// All known job records (newest first by creation).
    pub fn jobs(&self) -> Vec<Job> {
        let mut jobs: Vec<Job> = self
            .registry
            .iter()
            .map(|entry| entry.value().job.lock().clone())
            .collect();
        jobs.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        jobs
    }

    /// Jobs currently Queued or Running (scheduler load signal).
    pub fn active_count(&self) -> usize {
        self.registry
            .iter()
            .filter(|entry| {
                matches!(
                    entry.value().job.lock().state,
                    JobState::Queued | JobState::Running
                )
            })
            .count()
    }

    /// Request cancellation. Idempotent; returns false when the job is
    /// already terminal.
    pub fn cancel(&self, id: &str) -> EngramResult<bool> {
        let handle = self
            .registry
            .get(id)
            .ok_or_else(|| JobError::JobNotFound { id: id.to_string() })?;
        let state = handle.job.lock().state;
        if state.is_terminal() {
            return Ok(false);
        }
        handle.cancel.cancel();
        Ok(true)
    }

    /// Block until the job reaches a terminal state, or time out.
    pub fn wait(&self, id: &str, timeout: Duration) -> EngramResult<Job> {
        let handle = self
            .registry
            .get(id)
            .map(|h| Arc::clone(h.value()))
            .ok_or_else(|| JobError::JobNotFound { id: id.to_string() })?;
        let deadline = std::time::Instant::now() + timeout;
        let mut job = handle.job.lock();
        while !job.state.is_terminal() {
            let now = std::time::Instant::now();
            if now >= deadline {
                return Err(JobError::TimedOut {
                    id: id.to_string(),
                    seconds: timeout.as_secs(),
                }
                .into());
            }
            handle.done.wait_for(&mut job, deadline - now);
        }
        let finished = job.clone();
        drop(job);
        Ok(finished)
    }

    /// Escalate running jobs past the hard timeout to FAILED.
    pub fn fail_overdue(&self, max_runtime: Duration) -> usize {
        let now = Utc::now();
        let mut failed = 0usize;
        for entry in self.registry.iter() {
            let handle = entry.value();
            let mut job = handle.job.lock();
            if job.state != JobState::Running {
                continue;
            }
            let Some(started) = job.started_at else { continue };
            let elapsed = (now - started).num_seconds().max(0) as u64;
            if elapsed >= max_runtime.as_secs() {
                handle.cancel.cancel();
                if job.transition(JobState::Failed).is_ok() {
                    job.error = Some(format!("hard timeout after {elapsed}s"));
                    failed += 1;
                    handle.done.notify_all();
                }
                drop(job);
                self.inner.persist(handle);
            }
        }
        failed
    }
}

/// The worker-side lifecycle: Running -> terminal, with the cancel flag
/// deciding between Completed and Cancelled.
fn run_job(ctx: JobCtx, work: impl FnOnce(&JobCtx) -> EngramResult<()>) {
    {
        let mut job = ctx.handle.job.lock();
        if ctx.handle.cancel.is_cancelled() {
            // Cancelled while still queued.
            let _ = job.transition(JobState::Cancelled);
            let finished = job.clone();
            drop(job);
            ctx.controller.persist(&ctx.handle);
            if let Some(ref hook) = ctx.controller.hook {
                hook.on_job_finished(&finished);
            }
            ctx.handle.done.notify_all();
            return;
        }
        if job.transition(JobState::Running).is_err() {
            return;
        }
    }
    ctx.controller.persist(&ctx.handle);

    let result = work(&ctx);

    let mut job = ctx.handle.job.lock();
    if !job.state.is_terminal() {
        match result {
            Ok(()) if ctx.handle.cancel.is_cancelled() => {
                let _ = job.transition(JobState::Cancelled);
            }
            Ok(()) => {
                let _ = job.transition(JobState::Completed);
            }
            Err(e) if matches!(e.kind(), ErrorKind::Cancelled) => {
                let _ = job.transition(JobState::Cancelled);
            }
            Err(e) => {
                let _ = job.transition(JobState::Failed);
                job.error = Some(error_message(&e));
            }
        }
    }
    let finished = job.clone();
    drop(job);
    ctx.controller.persist(&ctx.handle);
    if let Some(ref hook) = ctx.controller.hook {
        hook.on_job_finished(&finished);
    }
    ctx.handle.done.notify_all();
}

/// Client-visible message: kind + description, never internals.
fn error_message(error: &EngramError) -> String {
    format!("{error}")
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;
    use tempfile::TempDir;

    fn controller(dir: Option<&Path>) -> JobController {
        JobController::open(2, 16, dir, None).unwrap()
    }

    #[test]
    fn submit_runs_to_completed() {
        let jc = controller(None);
        let id = jc
            .submit(JobKind::Consolidation, None, None, |ctx| {
                ctx.set_progress(50);
                Ok(())
            })
            .unwrap();
        let job = jc.wait(&id, Duration::from_secs(5)).unwrap();
        assert_eq!(job.state, JobState::Completed);
        assert_eq!(job.progress, 100);
        assert!(job.started_at.is_some());
        assert!(job.ended_at.is_some());
    }

    #[test]
    fn failing_work_fails_the_job() {
        let jc = controller(None);
        let id = jc
            .submit(JobKind::DmdProcessing, None, None, |_| {
                Err(EngramError::invalid_input("boom"))
            })
            .unwrap();
        let job = jc.wait(&id, Duration::from_secs(5)).unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert!(job.error.unwrap().contains("boom"));
    }

    #[test]
    fn cancel_flag_reaches_the_worker() {
        let jc = controller(None);
        let saw_cancel = Arc::new(AtomicBool::new(false));
        let saw = Arc::clone(&saw_cancel);
        let id = jc
            .submit(JobKind::Consolidation, None, None, move |ctx| {
                // Simulated safe-point loop.
                for _ in 0..200 {
                    if ctx.is_cancelled() {
                        saw.store(true, Ordering::SeqCst);
                        return Ok(());
                    }
                    std::thread::sleep(Duration::from_millis(5));
                }
                Ok(())
            })
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        assert!(jc.cancel(&id).unwrap());
        let job = jc.wait(&id, Duration::from_secs(5)).unwrap();
        assert_eq!(job.state, JobState::Cancelled);
        assert!(saw_cancel.load(Ordering::SeqCst));
        // Idempotent: cancelling a terminal job is a no-op.
        assert!(!jc.cancel(&id).unwrap());
    }

    #[test]
    fn unknown_job_is_not_found() {
        let jc = controller(None);
        let err = jc.status("nope").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn state_files_survive_and_recover() {
        let dir = TempDir::new().unwrap();
        {
            let jc = controller(Some(dir.path()));
            let id = jc
                .submit(JobKind::Consolidation, Some("persisted".into()), None, |_| Ok(()))
                .unwrap();
            jc.wait(&id, Duration::from_secs(5)).unwrap();
        }
        // A fake unfinished record from a crashed run.
        let mut crashed = Job::new(JobKind::Consolidation);
        crashed.state = JobState::Running;
        fs::write(
            dir.path().join("0099.state"),
            serde_json::to_vec_pretty(&crashed).unwrap(),
        )
        .unwrap();

        let jc = controller(Some(dir.path()));
        assert_eq!(jc.recovered_failures(), 1);
        let bytes = fs::read(dir.path().join("0099.state")).unwrap();
        let job: Job = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(job.state, JobState::Failed);
        assert_eq!(job.error.as_deref(), Some("unclean shutdown"));
    }

    #[test]
    fn overdue_jobs_escalate_to_failed() {
        let jc = controller(None);
        let id = jc
            .submit(JobKind::Consolidation, None, None, |ctx| {
                while !ctx.is_cancelled() {
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(EngramError::Cancelled)
            })
            .unwrap();
        // Wait until it is actually running.
        std::thread::sleep(Duration::from_millis(50));
        let failed = jc.fail_overdue(Duration::from_secs(0));
        assert_eq!(failed, 1);
        let job = jc.status(&id).unwrap();
        assert_eq!(job.state, JobState::Failed);
    }
}
