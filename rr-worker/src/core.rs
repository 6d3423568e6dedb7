use std::sync::Arc;

use tracing::debug;

use common::graph::SocialGraphSource;
use common::scheduler::TaskScheduler;
use common::store::KeyedStore;
use common::{Result, Task};

use crate::batch::{process_batch, BatchOutcome};
use crate::reduce::{reduce_job, Reduction};

/// Result of handling one task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Handled {
    Batch(BatchOutcome),
    Reduce(Reduction),
}

/// Runs ranking tasks against a store and a social graph source.
#[derive(Clone)]
pub struct RoomRankWorker {
    store: Arc<dyn KeyedStore>,
    graph: Arc<dyn SocialGraphSource>,
    scheduler: Arc<dyn TaskScheduler>,
}

impl RoomRankWorker {
    pub fn new(
        store: Arc<dyn KeyedStore>,
        graph: Arc<dyn SocialGraphSource>,
        scheduler: Arc<dyn TaskScheduler>,
    ) -> Self {
        Self {
            store,
            graph,
            scheduler,
        }
    }

    /// Run `task` once. Safe to call again with the same task, whether or
    /// not an earlier call failed.
    pub async fn handle(&self, task: &Task) -> Result<Handled> {
        debug!(%task, "handling task");
        match task {
            Task::ProcessBatch(batch) => process_batch(
                self.store.as_ref(),
                self.graph.as_ref(),
                self.scheduler.as_ref(),
                batch,
            )
            .await
            .map(Handled::Batch),
            Task::ReduceJob(job) => reduce_job(self.store.as_ref(), job)
                .await
                .map(Handled::Reduce),
        }
    }
}
