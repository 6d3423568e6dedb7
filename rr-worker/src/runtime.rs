//! Executing queued tasks with bounded concurrency and retries.

use std::sync::Arc;

use tokio::select;
use tokio::sync::Semaphore;
use tokio::time::sleep;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, error, info, warn};

use common::config::Config;
use common::scheduler::{Envelope, TaskQueue, TaskReceiver};

use crate::core::RoomRankWorker;

/// Pulls tasks off an in-process queue and runs them on a worker.
///
/// A failed task goes back on the queue after a backoff, until it has
/// failed `max_attempts` times. It is then dropped, and its job stalls.
#[derive(Clone)]
pub struct Runtime {
    worker: RoomRankWorker,
    queue: TaskQueue,
    config: Config,
}

impl Runtime {
    pub fn new(worker: RoomRankWorker, queue: TaskQueue, config: Config) -> Self {
        Self {
            worker,
            queue,
            config,
        }
    }

    /// Run tasks until `shutdown` fires or the queue closes, then wait for
    /// the tasks in flight.
    pub async fn run(self, mut receiver: TaskReceiver, shutdown: CancellationToken) {
        let slots = Arc::new(Semaphore::new(self.config.concurrency.max(1)));
        let tracker = TaskTracker::new();
        info!(concurrency = self.config.concurrency, "task runtime started");

        loop {
            let envelope = select! {
                _ = shutdown.cancelled() => break,
                next = receiver.recv() => match next {
                    Some(envelope) => envelope,
                    None => break,
                },
            };

            let permit = select! {
                _ = shutdown.cancelled() => break,
                permit = slots.clone().acquire_owned() => match permit {
                    Ok(permit) => permit,
                    Err(_) => break,
                },
            };

            let runtime = self.clone();
            let shutdown = shutdown.clone();
            tracker.spawn(async move {
                let failed = runtime.execute(envelope).await;
                drop(permit);
                if let Some(envelope) = failed {
                    runtime.retry_later(envelope, shutdown).await;
                }
            });
        }

        tracker.close();
        tracker.wait().await;
        info!("task runtime stopped");
    }

    /// Run one task. Hands the envelope back if the task should run again.
    async fn execute(&self, envelope: Envelope) -> Option<Envelope> {
        let task = &envelope.task;
        match self.worker.handle(task).await {
            Ok(outcome) => {
                debug!(%task, ?outcome, "task finished");
                None
            }
            Err(e) => {
                let failures = envelope.attempt + 1;
                if failures >= self.config.max_attempts {
                    error!(%task, failures, "giving up on task: {e}");
                    return None;
                }
                warn!(%task, failures, "task failed, will retry: {e}");
                Some(envelope.retry())
            }
        }
    }

    async fn retry_later(&self, envelope: Envelope, shutdown: CancellationToken) {
        let delay = self.config.backoff(envelope.attempt);
        select! {
            _ = shutdown.cancelled() => {
                debug!(task = %envelope.task, "shutting down, retry dropped");
            }
            _ = sleep(delay) => {
                if let Err(e) = self.queue.requeue(envelope) {
                    error!("failed to requeue task: {e}");
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    use async_trait::async_trait;
    use common::graph::{SocialGraphSource, StaticGraph};
    use common::store::MemoryStore;
    use common::{Error, Result};

    use super::*;
    use crate::local_pipeline;

    /// Fails the first `failures` lookups, then defers to the inner source.
    struct Flaky {
        inner: StaticGraph,
        failures: AtomicUsize,
    }

    #[async_trait]
    impl SocialGraphSource for Flaky {
        async fn connections(&self, nickname: &str) -> Result<Vec<String>> {
            let left = self.failures.load(Ordering::SeqCst);
            if left > 0 {
                self.failures.store(left - 1, Ordering::SeqCst);
                return Err(Error::upstream(nickname, "service unavailable"));
            }
            self.inner.connections(nickname).await
        }
    }

    fn config() -> Config {
        Config {
            batch_size: 2,
            concurrency: 2,
            max_attempts: 5,
            initial_backoff: Duration::from_millis(1),
            max_backoff: Duration::from_millis(10),
            poll_interval: Duration::from_millis(5),
            stall_timeout: Duration::from_secs(10),
        }
    }

    fn graph() -> StaticGraph {
        StaticGraph::new()
            .with_user("a", &["b", "x"])
            .with_user("b", &["a", "c", "c"])
            .with_user("c", &[])
    }

    fn users() -> Vec<String> {
        vec!["a".to_string(), "b".to_string(), "c".to_string()]
    }

    #[tokio::test]
    async fn failed_tasks_are_retried_until_they_succeed() {
        let graph = Flaky {
            inner: graph(),
            failures: AtomicUsize::new(3),
        };
        let (coordinator, runtime, receiver) =
            local_pipeline(Arc::new(MemoryStore::new()), Arc::new(graph), config());
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(runtime.run(receiver, shutdown.clone()));

        let job = coordinator.create_job("rust", users()).await.unwrap();
        coordinator.wait_until_ready(&job).await.unwrap();
        assert_eq!(
            coordinator.rankings(&job).await.unwrap(),
            vec![
                ("b".to_string(), 2.0),
                ("a".to_string(), 1.0),
                ("c".to_string(), 0.0)
            ]
        );

        shutdown.cancel();
        handle.await.unwrap();
    }

    #[tokio::test]
    async fn job_stalls_once_a_task_is_given_up() {
        let graph = StaticGraph::new().with_user("a", &["b"]);
        let config = Config {
            max_attempts: 2,
            stall_timeout: Duration::from_millis(200),
            ..config()
        };
        let (coordinator, runtime, receiver) =
            local_pipeline(Arc::new(MemoryStore::new()), Arc::new(graph), config);
        let shutdown = CancellationToken::new();
        let handle = tokio::spawn(runtime.run(receiver, shutdown.clone()));

        let job = coordinator.create_job("rust", users()).await.unwrap();
        let err = coordinator.wait_until_ready(&job).await.unwrap_err();
        assert!(matches!(err, Error::Stalled { .. }));

        let status = coordinator.job_status(&job).await.unwrap();
        assert!(!status.done && !status.ready);

        shutdown.cancel();
        handle.await.unwrap();
    }
}
