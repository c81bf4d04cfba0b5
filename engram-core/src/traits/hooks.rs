use crate::job::Job;

/// Abstract publish hook for job completion notifications.
///
/// Clients that poll need nothing; embedders that push wire this to their
/// transport. The default implementation is a no-op.
pub trait ICompletionHook: Send + Sync {
    fn on_job_finished(&self, job: &Job);
}

/// No-op hook.
pub struct NullCompletionHook;

impl ICompletionHook for NullCompletionHook {
    fn on_job_finished(&self, _job: &Job) {}
}
