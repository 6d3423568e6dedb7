//! Turning a drained job's staged graph into scores.

use fnv::{FnvHashMap, FnvHashSet};
use tracing::{debug, info, warn};

use common::records::{
    clear_drained, delete_batch, delete_staged, get_job, list_batches, load_staged, save_job,
};
use common::store::KeyedStore;
use common::{JobKey, Result, StagedUser};

/// What running a reduce task amounted to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reduction {
    /// Scores were computed and published by this run.
    Published { users: usize, missing: usize },

    /// Another run already published the scores. Only leftover staged
    /// records were removed.
    AlreadyReady,
}

/// Popularity of one user: how many distinct users of the room it is
/// connected to.
pub fn score(friends: &[String], members: &FnvHashSet<&str>) -> f64 {
    let friends: FnvHashSet<&str> = friends.iter().map(String::as_str).collect();
    friends.intersection(members).count() as f64
}

/// One score per user of `users`, in the same order. Users with no staged
/// record score zero.
pub fn compute_scores(users: &[String], staged: &[StagedUser]) -> Vec<f64> {
    let members: FnvHashSet<&str> = users.iter().map(String::as_str).collect();
    let friends: FnvHashMap<&str, &[String]> = staged
        .iter()
        .map(|user| (user.nickname.as_str(), user.friends.as_slice()))
        .collect();

    users
        .iter()
        .map(|user| {
            friends
                .get(user.as_str())
                .map_or(0.0, |friends| score(friends, &members))
        })
        .collect()
}

/// Compute and publish the scores of a drained job, then drop everything
/// staged for it.
///
/// The scores of a job that is already ready are never rewritten, so a
/// reducer scheduled more than once publishes once. Cleanup still runs in
/// that case, finishing the work of an earlier run that failed after
/// publishing. Two reducers racing past the first check compute the same
/// scores from the same staged records, and the second check keeps the
/// later one from writing.
pub async fn reduce_job(store: &dyn KeyedStore, job: &JobKey) -> Result<Reduction> {
    let record = get_job(store, job).await?;
    if record.ready {
        debug!(%job, "scores already published");
        cleanup(store, job, &record.users).await?;
        return Ok(Reduction::AlreadyReady);
    }

    let staged = load_staged(store, job, &record.users).await?;
    let missing = record.users.len() - staged.len();
    if missing > 0 {
        warn!(%job, missing, "users without staged connections, scoring them 0");
    }
    let scores = compute_scores(&record.users, &staged);

    let mut record = get_job(store, job).await?;
    if record.ready {
        debug!(%job, "scores published concurrently");
        cleanup(store, job, &record.users).await?;
        return Ok(Reduction::AlreadyReady);
    }
    record.publish(scores);
    save_job(store, &record).await?;
    info!(%job, room = %record.room, users = record.users.len(), "scores published");

    cleanup(store, job, &record.users).await?;

    Ok(Reduction::Published {
        users: record.users.len(),
        missing,
    })
}

/// Delete the staged users, batches and drained marker of a published job.
/// Deleting records that are already gone is fine.
async fn cleanup(store: &dyn KeyedStore, job: &JobKey, users: &[String]) -> Result<()> {
    for nickname in users {
        delete_staged(store, job, nickname).await?;
    }
    for batch in list_batches(store, job).await? {
        delete_batch(store, &batch.id).await?;
    }
    clear_drained(store, job).await?;
    debug!(%job, "intermediate records removed");
    Ok(())
}
