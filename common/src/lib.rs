//! Shared pieces of the room ranking pipeline.
//!
//! A ranking job is fanned out into batches of users, each batch stages the
//! social graph of its users, and once every batch of a job is done a single
//! reducer turns the staged graph into popularity scores. Records are kept
//! in a [`store::KeyedStore`] (in memory, or an S3-compatible bucket) and
//! work is handed around as [`Task`]s through a [`scheduler::TaskScheduler`].

use std::fmt;
use std::hash::Hasher;

use serde::{Deserialize, Serialize};

pub mod codec;
pub mod config;
pub mod error;
pub mod graph;
pub mod minio;
pub mod model;
pub mod records;
pub mod scheduler;
pub mod store;

pub use error::{Error, Result};
pub use model::{Batch, BatchKey, BatchStatus, Job, JobKey, JobStatus, StagedUser};

/////////////////////////////////////////////////////////////////////////////
// Tasks
/////////////////////////////////////////////////////////////////////////////

/// A unit of work handed to the scheduler.
///
/// Tasks carry only keys. Everything else is read back from the store when
/// the task runs, so a task may be delivered any number of times.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum Task {
    /// Stage the social graph for every user of a batch.
    ProcessBatch(BatchKey),

    /// Compute and publish the scores of a drained job.
    ReduceJob(JobKey),
}

impl Task {
    /// The job this task belongs to.
    pub fn job(&self) -> &JobKey {
        match self {
            Task::ProcessBatch(batch) => &batch.job,
            Task::ReduceJob(job) => job,
        }
    }
}

impl fmt::Display for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Task::ProcessBatch(batch) => write!(f, "ProcessBatch({batch})"),
            Task::ReduceJob(job) => write!(f, "ReduceJob({job})"),
        }
    }
}

/// Hashes a nickname. Used to seed per-user pseudo-random data so that
/// repeated fetches of the same user agree.
pub fn ihash(key: &[u8]) -> u32 {
    let mut hasher = fnv::FnvHasher::with_key(0);
    hasher.write(key);
    let value = hasher.finish() & 0x7fffffff;
    value as u32
}
