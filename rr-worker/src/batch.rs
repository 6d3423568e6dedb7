//! Staging the social graph of one batch of users.

use tracing::{debug, info};

use common::graph::SocialGraphSource;
use common::records::{load_batch, save_batch, save_staged, staged_exists};
use common::scheduler::TaskScheduler;
use common::store::KeyedStore;
use common::{BatchKey, Result, StagedUser};
use rr_coordinator::barrier::{self, Barrier};

/// What running a batch task amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BatchOutcome {
    /// The batch is done; the barrier was consulted.
    Completed { staged: usize, barrier: Barrier },

    /// The batch record is gone, its job was already reduced.
    Gone,
}

/// Stage every user of the batch, mark the batch done, then check whether
/// the whole job is done.
///
/// Users already staged for the job are skipped, so running a batch again
/// after a partial or complete earlier run only fetches what is missing.
/// The batch is marked done only after all of its users are staged. A
/// failed fetch fails the whole task and leaves the batch pending.
pub async fn process_batch(
    store: &dyn KeyedStore,
    graph: &dyn SocialGraphSource,
    scheduler: &dyn TaskScheduler,
    key: &BatchKey,
) -> Result<BatchOutcome> {
    let Some(mut batch) = load_batch(store, key).await? else {
        debug!(batch = %key, "batch no longer exists");
        return Ok(BatchOutcome::Gone);
    };

    let job = batch.parent().clone();
    let mut staged = 0;

    if batch.is_pending() {
        for nickname in &batch.users {
            if staged_exists(store, &job, nickname).await? {
                debug!(%job, nickname, "already staged");
                continue;
            }

            let friends = graph.connections(nickname).await?;
            debug!(%job, nickname, friends = friends.len(), "staging user");
            save_staged(store, &job, &StagedUser::new(nickname.clone(), friends)).await?;
            staged += 1;
        }

        batch.complete();
        save_batch(store, &batch).await?;
        info!(batch = %key, users = batch.users.len(), staged, "batch done");
    } else {
        debug!(batch = %key, "batch already done, checking barrier again");
    }

    let barrier = barrier::check(store, scheduler, &job).await?;
    Ok(BatchOutcome::Completed { staged, barrier })
}
