//! Detecting when every batch of a job is done.

use tracing::{debug, info};

use common::records::{count_batches, load_job, mark_drained};
use common::scheduler::TaskScheduler;
use common::store::KeyedStore;
use common::{JobKey, Result, Task};

/// Outcome of a barrier check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Barrier {
    /// No batch is pending. A reducer was scheduled.
    Tripped,

    /// Some batches are still pending.
    Waiting { pending: usize, total: usize },

    /// The job has no batches, either never dispatched or already reduced
    /// and cleaned up.
    Empty,

    /// No batch is pending but the scores are already out. A reducer was
    /// scheduled to finish cleanup; the job was not marked drained.
    Published,
}

/// Called after a batch of `job` completes. If no batch of the job is still
/// pending, schedules its reducer, and marks the job drained unless its
/// scores are already out.
///
/// Workers finishing at the same time may each see the job drained and each
/// schedule a reducer; the reducer tolerates this. A listing that still shows
/// a just-completed batch as pending makes every worker wait, and the job
/// stalls until a retried batch checks again.
pub async fn check(
    store: &dyn KeyedStore,
    scheduler: &dyn TaskScheduler,
    job: &JobKey,
) -> Result<Barrier> {
    let count = count_batches(store, job).await?;

    if count.total == 0 {
        debug!(%job, "no batches left, nothing to reduce");
        return Ok(Barrier::Empty);
    }

    if !count.drained() {
        debug!(%job, pending = count.pending, total = count.total, "batches still pending");
        return Ok(Barrier::Waiting {
            pending: count.pending,
            total: count.total,
        });
    }

    if load_job(store, job).await?.is_some_and(|record| record.ready) {
        scheduler.schedule(Task::ReduceJob(job.clone())).await?;
        debug!(%job, "scores already published, reducer scheduled for cleanup");
        return Ok(Barrier::Published);
    }

    mark_drained(store, job).await?;
    scheduler.schedule(Task::ReduceJob(job.clone())).await?;
    info!(%job, batches = count.total, "all batches done, reducer scheduled");

    Ok(Barrier::Tripped)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::records::{get_job, is_drained, list_batches, save_batch, save_job};
    use common::scheduler::ManualScheduler;
    use common::store::MemoryStore;

    use crate::dispatch::create_job;

    fn users(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("user{i:02}")).collect()
    }

    #[tokio::test]
    async fn trips_only_after_the_last_batch() {
        let store = MemoryStore::new();
        let dispatcher = ManualScheduler::new();
        let job = create_job(&store, &dispatcher, "rust", users(12), 4).await.unwrap();

        let scheduler = ManualScheduler::new();
        let mut batches = list_batches(&store, &job).await.unwrap();
        let total = batches.len();

        for (done, batch) in batches.iter_mut().enumerate() {
            let outcome = check(&store, &scheduler, &job).await.unwrap();
            assert_eq!(
                outcome,
                Barrier::Waiting {
                    pending: total - done,
                    total
                }
            );
            assert!(scheduler.tasks().await.is_empty());
            assert!(!is_drained(&store, &job).await.unwrap());

            batch.complete();
            save_batch(&store, batch).await.unwrap();
        }

        assert_eq!(check(&store, &scheduler, &job).await.unwrap(), Barrier::Tripped);
        assert_eq!(scheduler.tasks().await, vec![Task::ReduceJob(job.clone())]);
        assert!(is_drained(&store, &job).await.unwrap());
    }

    #[tokio::test]
    async fn published_job_is_not_marked_drained_again() {
        let store = MemoryStore::new();
        let dispatcher = ManualScheduler::new();
        let job = create_job(&store, &dispatcher, "rust", users(2), 4).await.unwrap();

        for mut batch in list_batches(&store, &job).await.unwrap() {
            batch.complete();
            save_batch(&store, &batch).await.unwrap();
        }
        let mut record = get_job(&store, &job).await.unwrap();
        record.publish(vec![1.0, 0.0]);
        save_job(&store, &record).await.unwrap();

        // A redelivered batch task while the reducer is still cleaning up.
        let scheduler = ManualScheduler::new();
        assert_eq!(check(&store, &scheduler, &job).await.unwrap(), Barrier::Published);
        assert!(!is_drained(&store, &job).await.unwrap());
        assert_eq!(scheduler.tasks().await, vec![Task::ReduceJob(job)]);
    }

    #[tokio::test]
    async fn unknown_job_never_trips() {
        let store = MemoryStore::new();
        let scheduler = ManualScheduler::new();

        let outcome = check(&store, &scheduler, &JobKey::generate()).await.unwrap();
        assert_eq!(outcome, Barrier::Empty);
        assert!(scheduler.tasks().await.is_empty());
    }
}
