//! Typed access to jobs, batches and staged users.

use bytes::Bytes;
use tracing::debug;

use crate::codec::{decode, encode};
use crate::error::{Error, Result};
use crate::model::{Batch, BatchKey, Job, JobKey, JobStatus, StagedUser};
use crate::store::KeyedStore;

/// Progress of a job's batches, as currently visible in the store.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct BatchCount {
    pub total: usize,
    pub pending: usize,
}

impl BatchCount {
    /// Every batch the store knows of is done, and there is at least one.
    pub fn drained(&self) -> bool {
        self.total > 0 && self.pending == 0
    }
}

pub async fn load_job(store: &dyn KeyedStore, job: &JobKey) -> Result<Option<Job>> {
    match store.get(&job.record_key()).await? {
        Some(data) => Ok(Some(decode(&data)?)),
        None => Ok(None),
    }
}

/// Like [`load_job`], but a missing job is an error.
pub async fn get_job(store: &dyn KeyedStore, job: &JobKey) -> Result<Job> {
    load_job(store, job)
        .await?
        .ok_or_else(|| Error::NotFound(format!("job {job}")))
}

pub async fn save_job(store: &dyn KeyedStore, job: &Job) -> Result<()> {
    store.put(&job.id.record_key(), encode(job)?).await
}

/// Record that every batch of the job is done.
///
/// Kept apart from the job record so the barrier never rewrites the job and
/// cannot clobber scores published concurrently.
pub async fn mark_drained(store: &dyn KeyedStore, job: &JobKey) -> Result<()> {
    store.put(&job.drained_key(), Bytes::from_static(b"true")).await
}

pub async fn is_drained(store: &dyn KeyedStore, job: &JobKey) -> Result<bool> {
    store.exists(&job.drained_key()).await
}

pub async fn clear_drained(store: &dyn KeyedStore, job: &JobKey) -> Result<()> {
    store.delete(&job.drained_key()).await
}

/// Status of a job as a poller sees it.
pub async fn job_status(store: &dyn KeyedStore, job: &JobKey) -> Result<JobStatus> {
    let record = get_job(store, job).await?;
    let mut status = record.status();
    if !status.done {
        status.done = is_drained(store, job).await?;
    }
    Ok(status)
}

pub async fn load_batch(store: &dyn KeyedStore, batch: &BatchKey) -> Result<Option<Batch>> {
    match store.get(&batch.record_key()).await? {
        Some(data) => Ok(Some(decode(&data)?)),
        None => Ok(None),
    }
}

pub async fn save_batch(store: &dyn KeyedStore, batch: &Batch) -> Result<()> {
    store.put(&batch.id.record_key(), encode(batch)?).await
}

pub async fn delete_batch(store: &dyn KeyedStore, batch: &BatchKey) -> Result<()> {
    store.delete(&batch.record_key()).await
}

/// Every batch record of a job.
///
/// A batch listed but gone by the time it is read was deleted concurrently
/// and is skipped.
pub async fn list_batches(store: &dyn KeyedStore, job: &JobKey) -> Result<Vec<Batch>> {
    let mut batches = vec![];
    for key in store.list(&job.batches_prefix()).await? {
        match store.get(&key).await? {
            Some(data) => batches.push(decode::<Batch>(&data)?),
            None => debug!(key = %key, "batch vanished while listing"),
        }
    }
    Ok(batches)
}

pub async fn count_batches(store: &dyn KeyedStore, job: &JobKey) -> Result<BatchCount> {
    let batches = list_batches(store, job).await?;
    Ok(BatchCount {
        total: batches.len(),
        pending: batches.iter().filter(|batch| batch.is_pending()).count(),
    })
}

pub async fn staged_exists(store: &dyn KeyedStore, job: &JobKey, nickname: &str) -> Result<bool> {
    store.exists(&job.staged_key(nickname)).await
}

pub async fn save_staged(store: &dyn KeyedStore, job: &JobKey, user: &StagedUser) -> Result<()> {
    store.put(&job.staged_key(&user.nickname), encode(user)?).await
}

/// Staged records of the given users. Users never staged are left out.
pub async fn load_staged(
    store: &dyn KeyedStore,
    job: &JobKey,
    users: &[String],
) -> Result<Vec<StagedUser>> {
    let mut staged = Vec::with_capacity(users.len());
    for nickname in users {
        if let Some(data) = store.get(&job.staged_key(nickname)).await? {
            staged.push(decode(&data)?);
        }
    }
    Ok(staged)
}

pub async fn delete_staged(store: &dyn KeyedStore, job: &JobKey, nickname: &str) -> Result<()> {
    store.delete(&job.staged_key(nickname)).await
}
