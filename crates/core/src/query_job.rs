use std::fmt;
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use std::time::{Duration, Instant};

/// Identity of one dispatched background job. Ids only grow, so a
/// completion can be matched against the job a tab is still waiting for.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(u64);

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "job-{}", self.0)
    }
}

#[derive(Debug, Default)]
pub struct JobIdGenerator {
    last: u64,
}

impl JobIdGenerator {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn next_id(&mut self) -> JobId {
        self.last += 1;
        JobId(self.last)
    }
}

#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    cancelled: Arc<AtomicBool>,
}

impl CancellationToken {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }
}

/// Whether a job replaces the grid contents or extends them.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FetchMode {
    Replace,
    Append,
}

/// The in-flight query of a tab.
#[derive(Debug, Clone)]
pub struct QueryJob {
    pub id: JobId,
    pub sql: String,
    pub mode: FetchMode,
    pub cancellation: CancellationToken,
    pub started_at: Instant,
}

impl QueryJob {
    #[must_use]
    pub fn start(id: JobId, sql: impl Into<String>, mode: FetchMode) -> Self {
        Self {
            id,
            sql: sql.into(),
            mode,
            cancellation: CancellationToken::new(),
            started_at: Instant::now(),
        }
    }

    #[must_use]
    pub fn elapsed(&self) -> Duration {
        self.started_at.elapsed()
    }

    pub fn cancel(&self) {
        self.cancellation.cancel();
    }
}

#[cfg(test)]
mod tests {
    use super::{CancellationToken, FetchMode, JobIdGenerator, QueryJob};

    #[test]
    fn job_ids_are_strictly_increasing() {
        let mut ids = JobIdGenerator::new();
        let first = ids.next_id();
        let second = ids.next_id();
        assert!(second > first);
        assert_ne!(first, second);
        assert_eq!(first.to_string(), "job-1");
    }

    #[test]
    fn cancelling_a_job_is_visible_through_cloned_tokens() {
        let mut ids = JobIdGenerator::new();
        let job = QueryJob::start(ids.next_id(), "select 1", FetchMode::Replace);
        let token: CancellationToken = job.cancellation.clone();
        assert!(!token.is_cancelled());

        job.cancel();
        assert!(token.is_cancelled());
    }
}
