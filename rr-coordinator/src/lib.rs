//! Coordinator side of the room ranking pipeline: turning a room into a job
//! of batches, detecting when the batches are done, and answering pollers.

use std::sync::Arc;

use common::config::Config;
use common::records::BatchCount;
use common::scheduler::TaskScheduler;
use common::store::KeyedStore;
use common::{JobKey, JobStatus, Result};

pub mod barrier;
pub mod dispatch;
pub mod jobs;

/// Entry points used by front-ends.
#[derive(Clone)]
pub struct Coordinator {
    store: Arc<dyn KeyedStore>,
    scheduler: Arc<dyn TaskScheduler>,
    config: Config,
}

impl Coordinator {
    pub fn new(store: Arc<dyn KeyedStore>, scheduler: Arc<dyn TaskScheduler>, config: Config) -> Self {
        Self {
            store,
            scheduler,
            config,
        }
    }

    /// Start ranking `users` of `room`, in batches of the configured size.
    pub async fn create_job(&self, room: &str, users: Vec<String>) -> Result<JobKey> {
        dispatch::create_job(
            self.store.as_ref(),
            self.scheduler.as_ref(),
            room,
            users,
            self.config.batch_size,
        )
        .await
    }

    pub async fn job_status(&self, job: &JobKey) -> Result<JobStatus> {
        jobs::status(self.store.as_ref(), job).await
    }

    pub async fn progress(&self, job: &JobKey) -> Result<BatchCount> {
        jobs::progress(self.store.as_ref(), job).await
    }

    pub async fn rankings(&self, job: &JobKey) -> Result<Vec<(String, f64)>> {
        jobs::rankings(self.store.as_ref(), job).await
    }

    /// Wait for the job to become ready, up to the configured stall timeout.
    pub async fn wait_until_ready(&self, job: &JobKey) -> Result<JobStatus> {
        jobs::wait_until_ready(
            self.store.as_ref(),
            job,
            self.config.poll_interval,
            self.config.stall_timeout,
        )
        .await
    }
}
