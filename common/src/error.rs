use std::time::Duration;

use thiserror::Error as ThisError;

use crate::model::JobKey;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Failures of the ranking pipeline.
#[derive(ThisError, Debug)]
pub enum Error {
    /// Rejected at dispatch, nothing was written.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// The social graph source failed. The task fails and is retried.
    #[error("failed to fetch connections of `{nickname}`: {source}")]
    UpstreamFetch {
        nickname: String,
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("{0} not found")]
    NotFound(String),

    #[error("job {0} is not ready")]
    NotReady(JobKey),

    /// The job did not become ready within the polling cutoff.
    #[error("job {job} is not ready after {waited:?}")]
    Stalled { job: JobKey, waited: Duration },

    #[error("failed to schedule {task}: {reason}")]
    Schedule { task: String, reason: String },

    /// Some batches of the job were never scheduled. The job will not
    /// complete on its own.
    #[error("job {job} dispatched partially ({scheduled} of {total} batches scheduled): {source}")]
    Dispatch {
        job: JobKey,
        scheduled: usize,
        total: usize,
        source: Box<Error>,
    },

    #[error("malformed record: {0}")]
    Codec(#[from] serde_json::Error),

    #[error("store operation failed: {0:#}")]
    Store(#[from] anyhow::Error),
}

impl Error {
    pub fn upstream<E>(nickname: &str, source: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Error::UpstreamFetch {
            nickname: nickname.to_string(),
            source: source.into(),
        }
    }
}
