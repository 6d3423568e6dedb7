//! Fanning a job out into batches.

use std::collections::HashSet;

use tracing::{error, info};

use common::records::{save_batch, save_job};
use common::scheduler::TaskScheduler;
use common::store::KeyedStore;
use common::{Batch, BatchKey, Error, Job, JobKey, Result, Task};

/// Contiguous slices of `users`, each `batch_size` long except maybe the last.
pub fn partition(users: &[String], batch_size: usize) -> Vec<Vec<String>> {
    users
        .chunks(batch_size.max(1))
        .map(|chunk| chunk.to_vec())
        .collect()
}

fn validate(room: &str, users: &[String], batch_size: usize) -> Result<()> {
    if room.is_empty() {
        return Err(Error::InvalidInput("room name is empty".to_string()));
    }
    if users.is_empty() {
        return Err(Error::InvalidInput(format!("room `{room}` has no users")));
    }
    if batch_size == 0 {
        return Err(Error::InvalidInput("batch size must be at least 1".to_string()));
    }

    let mut seen = HashSet::with_capacity(users.len());
    for user in users {
        if user.is_empty() || user.contains('/') {
            return Err(Error::InvalidInput(format!("malformed nickname `{user}`")));
        }
        if !seen.insert(user.as_str()) {
            return Err(Error::InvalidInput(format!("duplicate nickname `{user}`")));
        }
    }

    Ok(())
}

/// Create a job for `room` and schedule one task per batch of its users.
///
/// Returns the key of the new job. Invalid input is rejected before anything
/// is written. Once the job record exists, any failure is reported as
/// [`Error::Dispatch`]: the job then has batches that will never run and will
/// not become ready.
pub async fn create_job(
    store: &dyn KeyedStore,
    scheduler: &dyn TaskScheduler,
    room: &str,
    users: Vec<String>,
    batch_size: usize,
) -> Result<JobKey> {
    validate(room, &users, batch_size)?;

    let job = Job::new(JobKey::generate(), room.to_string(), users);
    save_job(store, &job).await?;

    let batches: Vec<Batch> = partition(&job.users, batch_size)
        .into_iter()
        .enumerate()
        .map(|(index, users)| Batch::new(BatchKey::new(job.id.clone(), index as u32), users))
        .collect();
    let total = batches.len();

    let dispatch_failed = |scheduled: usize, source: Error| {
        error!(job = %job.id, scheduled, total, "dispatch failed: {source}");
        Error::Dispatch {
            job: job.id.clone(),
            scheduled,
            total,
            source: Box::new(source),
        }
    };

    for batch in &batches {
        save_batch(store, batch)
            .await
            .map_err(|e| dispatch_failed(0, e))?;
    }

    for (scheduled, batch) in batches.iter().enumerate() {
        scheduler
            .schedule(Task::ProcessBatch(batch.id.clone()))
            .await
            .map_err(|e| dispatch_failed(scheduled, e))?;
    }

    info!(
        job = %job.id,
        room,
        users = job.users.len(),
        batches = total,
        "dispatched job"
    );

    Ok(job.id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::records::{get_job, list_batches};
    use common::scheduler::ManualScheduler;
    use common::store::MemoryStore;

    fn users(n: usize) -> Vec<String> {
        (0..n).map(|i| format!("user{i:02}")).collect()
    }

    #[test]
    fn partition_keeps_order_and_covers_every_user() {
        let users = users(20);
        let batches = partition(&users, 4);

        assert_eq!(batches.len(), 5);
        assert!(batches.iter().all(|batch| batch.len() == 4));
        assert_eq!(batches.concat(), users);

        let batches = partition(&users, 6);
        assert_eq!(batches.len(), 4);
        assert_eq!(batches[3], vec!["user18", "user19"]);
    }

    #[tokio::test]
    async fn creates_job_batches_and_tasks() {
        let store = MemoryStore::new();
        let scheduler = ManualScheduler::new();

        let job = create_job(&store, &scheduler, "rust", users(20), 4).await.unwrap();

        let record = get_job(&store, &job).await.unwrap();
        assert_eq!(record.users, users(20));
        assert!(record.scores.is_empty());
        assert!(!record.done && !record.ready);

        let batches = list_batches(&store, &job).await.unwrap();
        assert_eq!(batches.len(), 5);
        assert!(batches.iter().all(|batch| batch.is_pending() && batch.parent() == &job));
        let staged: Vec<String> = batches.iter().flat_map(|b| b.users.clone()).collect();
        assert_eq!(staged, users(20));

        let tasks = scheduler.tasks().await;
        let expected: Vec<Task> = batches
            .iter()
            .map(|batch| Task::ProcessBatch(batch.id.clone()))
            .collect();
        assert_eq!(tasks, expected);
    }

    #[tokio::test]
    async fn rejects_bad_input_without_writing() {
        let store = MemoryStore::new();
        let scheduler = ManualScheduler::new();

        let cases = vec![
            ("rust", vec![], 4),
            ("rust", users(3), 0),
            ("", users(3), 4),
            ("rust", vec!["a".to_string(), "a".to_string()], 4),
            ("rust", vec!["a/b".to_string()], 4),
            ("rust", vec![String::new()], 4),
        ];
        for (room, users, batch_size) in cases {
            let err = create_job(&store, &scheduler, room, users, batch_size)
                .await
                .unwrap_err();
            assert!(matches!(err, Error::InvalidInput(_)), "{err}");
        }

        assert!(store.is_empty().await);
        assert!(scheduler.tasks().await.is_empty());
    }

    #[tokio::test]
    async fn partial_scheduling_is_reported_with_the_job() {
        let store = MemoryStore::new();
        let scheduler = ManualScheduler::with_capacity(2);

        let err = create_job(&store, &scheduler, "rust", users(20), 4)
            .await
            .unwrap_err();

        let (job, scheduled, total) = match err {
            Error::Dispatch { job, scheduled, total, .. } => (job, scheduled, total),
            other => panic!("unexpected error: {other}"),
        };
        assert_eq!((scheduled, total), (2, 5));
        assert_eq!(list_batches(&store, &job).await.unwrap().len(), 5);
        assert_eq!(scheduler.tasks().await.len(), 2);
    }
}
