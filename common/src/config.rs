use std::time::Duration;

/// Knobs of the dispatcher, the task runtime and the status poller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Users per batch.
    pub batch_size: usize,

    /// Tasks running at the same time.
    pub concurrency: usize,

    /// Runs of a task before it is given up on. The job it belongs to
    /// then stalls.
    pub max_attempts: u32,

    /// Delay before the first retry of a failed task.
    pub initial_backoff: Duration,

    /// Retry delays double up to this bound.
    pub max_backoff: Duration,

    /// How often a waiting client checks whether its job is ready.
    pub poll_interval: Duration,

    /// How long a waiting client waits before reporting the job stalled.
    pub stall_timeout: Duration,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            batch_size: 4,
            concurrency: 8,
            max_attempts: 10,
            initial_backoff: Duration::from_millis(200),
            max_backoff: Duration::from_secs(5),
            poll_interval: Duration::from_millis(500),
            stall_timeout: Duration::from_secs(60),
        }
    }
}

impl Config {
    /// Delay before running a task again after `attempt` failed runs.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u32.checked_shl(attempt.saturating_sub(1)).unwrap_or(u32::MAX);
        self.initial_backoff
            .checked_mul(factor)
            .map_or(self.max_backoff, |delay| delay.min(self.max_backoff))
    }
}
