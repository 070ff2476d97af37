//! Per-requester job tracking and cancellation.
//!
//! Each requester runs at most one range job at a time. Starting a job
//! hands out a [`JobGuard`] that owns the job's cancellation token; the
//! registry entry disappears when the guard is dropped.

use crate::settings::RequesterId;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};
use uuid::Uuid;

/// The requester already has a job running.
#[derive(Debug, Error, Clone, Copy, PartialEq, Eq)]
#[error("a relay job is already running (job {running})")]
pub struct JobBusy {
    /// ID of the running job.
    pub running: Uuid,
}

#[derive(Debug, Clone)]
struct JobEntry {
    job_id: Uuid,
    token: CancellationToken,
}

type JobMap = Arc<Mutex<HashMap<RequesterId, JobEntry>>>;

/// Registry of running range jobs keyed by requester.
#[derive(Debug, Clone, Default)]
pub struct JobRegistry {
    jobs: JobMap,
}

impl JobRegistry {
    /// Create a new empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a new job for `requester`.
    ///
    /// # Errors
    ///
    /// Returns [`JobBusy`] if the requester already has a running job.
    pub fn try_start(&self, requester: RequesterId) -> Result<JobGuard, JobBusy> {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = jobs.get(&requester) {
            return Err(JobBusy {
                running: entry.job_id,
            });
        }
        let entry = JobEntry {
            job_id: Uuid::new_v4(),
            token: CancellationToken::new(),
        };
        jobs.insert(requester, entry.clone());
        info!(%requester, job_id = %entry.job_id, "Job registered");
        Ok(JobGuard {
            jobs: Arc::clone(&self.jobs),
            requester,
            job_id: entry.job_id,
            token: entry.token,
        })
    }

    /// Requests cancellation of the requester's running job.
    ///
    /// Returns `true` if cancellation was requested, `false` if nothing runs.
    pub fn cancel(&self, requester: RequesterId) -> bool {
        let jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(entry) = jobs.get(&requester) {
            entry.token.cancel();
            info!(%requester, job_id = %entry.job_id, "Cancellation requested");
            true
        } else {
            warn!(%requester, "No running job to cancel");
            false
        }
    }

    /// Whether the requester has a running job.
    #[must_use]
    pub fn is_running(&self, requester: RequesterId) -> bool {
        self.jobs
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(&requester)
    }
}

/// Ownership of one registered job.
#[derive(Debug)]
pub struct JobGuard {
    jobs: JobMap,
    requester: RequesterId,
    job_id: Uuid,
    token: CancellationToken,
}

impl JobGuard {
    /// Registry ID of the job.
    #[must_use]
    pub const fn job_id(&self) -> Uuid {
        self.job_id
    }

    /// Token cancelled by [`JobRegistry::cancel`].
    #[must_use]
    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }
}

impl Drop for JobGuard {
    fn drop(&mut self) {
        let mut jobs = self.jobs.lock().unwrap_or_else(PoisonError::into_inner);
        if jobs
            .get(&self.requester)
            .is_some_and(|entry| entry.job_id == self.job_id)
        {
            jobs.remove(&self.requester);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn second_job_for_same_requester_is_refused() {
        let registry = JobRegistry::new();
        let guard = registry.try_start(RequesterId(1)).expect("first job");
        let busy = registry.try_start(RequesterId(1)).expect_err("busy");
        assert_eq!(busy.running, guard.job_id());
        assert!(registry.try_start(RequesterId(2)).is_ok());
    }

    #[test]
    fn dropping_guard_frees_the_slot() {
        let registry = JobRegistry::new();
        {
            let _guard = registry.try_start(RequesterId(1)).expect("job");
            assert!(registry.is_running(RequesterId(1)));
        }
        assert!(!registry.is_running(RequesterId(1)));
        assert!(registry.try_start(RequesterId(1)).is_ok());
    }

    #[test]
    fn cancel_trips_the_job_token() {
        let registry = JobRegistry::new();
        let guard = registry.try_start(RequesterId(5)).expect("job");
        let token = guard.token();
        assert!(!token.is_cancelled());
        assert!(registry.cancel(RequesterId(5)));
        assert!(token.is_cancelled());
    }

    #[test]
    fn cancel_without_job_is_false() {
        assert!(!JobRegistry::new().cancel(RequesterId(9)));
    }
}
