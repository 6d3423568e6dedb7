//! Reading back the state of a job.

use std::time::Duration;

use tokio::time::{sleep, Instant};
use tracing::debug;

use common::records::{count_batches, get_job, job_status, BatchCount};
use common::store::KeyedStore;
use common::{Error, JobKey, JobStatus, Result};

/// Whether the job's batches drained and whether its scores are out.
pub async fn status(store: &dyn KeyedStore, job: &JobKey) -> Result<JobStatus> {
    job_status(store, job).await
}

/// Batches of the job still in the store. Empty once the job is reduced.
pub async fn progress(store: &dyn KeyedStore, job: &JobKey) -> Result<BatchCount> {
    count_batches(store, job).await
}

/// Users of a ready job with their scores, most popular first.
pub async fn rankings(store: &dyn KeyedStore, job: &JobKey) -> Result<Vec<(String, f64)>> {
    let record = get_job(store, job).await?;
    if !record.ready {
        return Err(Error::NotReady(job.clone()));
    }
    Ok(record.rankings())
}

/// Poll the job every `poll_interval` until it is ready.
///
/// Gives up with [`Error::Stalled`] after `timeout`. A job that is not in
/// the store fails right away.
pub async fn wait_until_ready(
    store: &dyn KeyedStore,
    job: &JobKey,
    poll_interval: Duration,
    timeout: Duration,
) -> Result<JobStatus> {
    let start = Instant::now();
    loop {
        let status = job_status(store, job).await?;
        if status.ready {
            return Ok(status);
        }

        let waited = start.elapsed();
        if waited >= timeout {
            return Err(Error::Stalled {
                job: job.clone(),
                waited,
            });
        }

        debug!(%job, done = status.done, "job not ready yet");
        sleep(poll_interval.min(timeout - waited)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::records::save_job;
    use common::store::MemoryStore;
    use common::Job;

    #[tokio::test]
    async fn rankings_need_a_ready_job() {
        let store = MemoryStore::new();
        let mut job = Job::new(JobKey::generate(), "rust".into(), vec!["a".into(), "b".into()]);
        save_job(&store, &job).await.unwrap();

        let err = rankings(&store, &job.id).await.unwrap_err();
        assert!(matches!(err, Error::NotReady(_)));

        job.publish(vec![1.0, 2.0]);
        save_job(&store, &job).await.unwrap();
        let ranked = rankings(&store, &job.id).await.unwrap();
        assert_eq!(ranked, vec![("b".to_string(), 2.0), ("a".to_string(), 1.0)]);
    }

    #[tokio::test]
    async fn unknown_job_is_not_found() {
        let store = MemoryStore::new();
        let job = JobKey::generate();

        assert!(matches!(status(&store, &job).await, Err(Error::NotFound(_))));
        let waited = wait_until_ready(&store, &job, Duration::from_millis(1), Duration::from_secs(1)).await;
        assert!(matches!(waited, Err(Error::NotFound(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn waiting_on_a_stuck_job_times_out() {
        let store = MemoryStore::new();
        let job = Job::new(JobKey::generate(), "rust".into(), vec!["a".into()]);
        save_job(&store, &job).await.unwrap();

        let err = wait_until_ready(&store, &job.id, Duration::from_millis(500), Duration::from_secs(3))
            .await
            .unwrap_err();
        assert!(matches!(err, Error::Stalled { .. }));
    }
}
