//! Records kept in the store and the keys that address them.
//!
//! Layout:
//!
//! ```text
//! jobs/<job>                      Job
//! jobs/<job>/batches/<index>      Batch, child of the job
//! jobs/<job>/drained              written by the barrier once no batch is pending
//! jobs/<job>/staged/<nickname>    StagedUser, scoped to the job
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};

use crate::error::Error;

const JOBS_PREFIX: &str = "jobs";

/// Milliseconds since the unix epoch.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}

/////////////////////////////////////////////////////////////////////////////
// Keys
/////////////////////////////////////////////////////////////////////////////

/// Opaque identifier of a job.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobKey(String);

impl JobKey {
    /// Allocate a fresh job key.
    pub fn generate() -> Self {
        Self(uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Store key of the job record.
    pub fn record_key(&self) -> String {
        format!("{JOBS_PREFIX}/{}", self.0)
    }

    /// Prefix shared by every batch of the job.
    pub fn batches_prefix(&self) -> String {
        format!("{JOBS_PREFIX}/{}/batches/", self.0)
    }

    /// Store key of the marker written once every batch of the job is done.
    pub fn drained_key(&self) -> String {
        format!("{JOBS_PREFIX}/{}/drained", self.0)
    }

    /// Prefix shared by every staged user of the job.
    pub fn staged_prefix(&self) -> String {
        format!("{JOBS_PREFIX}/{}/staged/", self.0)
    }

    /// Store key of a staged user of the job.
    pub fn staged_key(&self, nickname: &str) -> String {
        format!("{}{nickname}", self.staged_prefix())
    }
}

impl fmt::Display for JobKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for JobKey {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        if s.is_empty() || s.contains('/') {
            return Err(Error::InvalidInput(format!("malformed job key `{s}`")));
        }
        Ok(Self(s.to_string()))
    }
}

/// Identifier of a batch. Embeds the key of the owning job.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct BatchKey {
    pub job: JobKey,
    pub index: u32,
}

impl BatchKey {
    pub fn new(job: JobKey, index: u32) -> Self {
        Self { job, index }
    }

    /// Store key of the batch record.
    pub fn record_key(&self) -> String {
        format!("{}{:05}", self.job.batches_prefix(), self.index)
    }
}

impl fmt::Display for BatchKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{:05}", self.job, self.index)
    }
}

/////////////////////////////////////////////////////////////////////////////
// Job
/////////////////////////////////////////////////////////////////////////////

/// One ranking request for a room.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Job {
    pub id: JobKey,

    /// Name of the room being ranked.
    pub room: String,

    /// Members of the room. Positions index into `scores`.
    pub users: Vec<String>,

    /// Empty until the reducer publishes, then one score per user.
    pub scores: Vec<f64>,

    /// Every batch has drained. Never reverts. Written together with the
    /// scores; before that the job's drained marker answers for it.
    pub done: bool,

    /// Scores are published. Implies `done`.
    pub ready: bool,

    pub created: u64,
}

/// What a poller sees of a job.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct JobStatus {
    pub done: bool,
    pub ready: bool,
}

impl Job {
    pub fn new(id: JobKey, room: String, users: Vec<String>) -> Self {
        Self {
            id,
            room,
            users,
            scores: vec![],
            done: false,
            ready: false,
            created: now_millis(),
        }
    }

    pub fn status(&self) -> JobStatus {
        JobStatus {
            done: self.done,
            ready: self.ready,
        }
    }

    /// Attach the final scores and flag the job as ready.
    pub fn publish(&mut self, scores: Vec<f64>) {
        debug_assert_eq!(scores.len(), self.users.len());
        self.scores = scores;
        self.done = true;
        self.ready = true;
    }

    /// Users paired with their scores, most popular first.
    ///
    /// Equal scores are ordered by nickname, descending. Empty until the job
    /// is ready.
    pub fn rankings(&self) -> Vec<(String, f64)> {
        if !self.ready {
            return vec![];
        }

        let mut rankings: Vec<(String, f64)> = self
            .users
            .iter()
            .cloned()
            .zip(self.scores.iter().copied())
            .collect();

        rankings.sort_by(|(user_a, score_a), (user_b, score_b)| {
            match score_b.total_cmp(score_a) {
                Ordering::Equal => user_b.cmp(user_a),
                ordering => ordering,
            }
        });

        rankings
    }
}

/////////////////////////////////////////////////////////////////////////////
// Batch
/////////////////////////////////////////////////////////////////////////////

/// Progress of a batch.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum BatchStatus {
    /// Some of the batch's users may still need staging.
    Pending,

    /// Every user of the batch is staged.
    Done,
}

/// A contiguous slice of a job's users, processed as one task.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct Batch {
    pub id: BatchKey,
    pub users: Vec<String>,
    pub status: BatchStatus,
    pub created: u64,
}

impl Batch {
    pub fn new(id: BatchKey, users: Vec<String>) -> Self {
        Self {
            id,
            users,
            status: BatchStatus::Pending,
            created: now_millis(),
        }
    }

    /// Key of the owning job.
    pub fn parent(&self) -> &JobKey {
        &self.id.job
    }

    pub fn is_pending(&self) -> bool {
        matches!(self.status, BatchStatus::Pending)
    }

    pub fn complete(&mut self) {
        self.status = BatchStatus::Done;
    }
}

/////////////////////////////////////////////////////////////////////////////
// Staged users
/////////////////////////////////////////////////////////////////////////////

/// Snapshot of a user's connections, held until the job is reduced.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct StagedUser {
    pub nickname: String,
    pub friends: Vec<String>,
    pub created: u64,
}

impl StagedUser {
    pub fn new(nickname: String, friends: Vec<String>) -> Self {
        Self {
            nickname,
            friends,
            created: now_millis(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn job(users: &[&str]) -> Job {
        let users = users.iter().map(|u| u.to_string()).collect();
        Job::new(JobKey::generate(), "room".to_string(), users)
    }

    #[test]
    fn batch_keys_live_under_their_job() {
        let job: JobKey = "abc".parse().unwrap();
        let batch = BatchKey::new(job.clone(), 3);

        assert_eq!(job.record_key(), "jobs/abc");
        assert_eq!(batch.record_key(), "jobs/abc/batches/00003");
        assert!(batch.record_key().starts_with(&job.batches_prefix()));
        assert_eq!(job.staged_key("bob"), "jobs/abc/staged/bob");
        assert!(!job.record_key().starts_with(&job.batches_prefix()));
    }

    #[test]
    fn malformed_job_keys_are_rejected() {
        assert!("".parse::<JobKey>().is_err());
        assert!("a/b".parse::<JobKey>().is_err());
    }

    #[test]
    fn rankings_are_sorted_by_score_then_nickname() {
        let mut job = job(&["a", "b", "c", "d"]);
        assert!(job.rankings().is_empty());

        job.publish(vec![1.0, 3.0, 1.0, 0.0]);
        let rankings = job.rankings();

        assert_eq!(
            rankings,
            vec![
                ("b".to_string(), 3.0),
                ("c".to_string(), 1.0),
                ("a".to_string(), 1.0),
                ("d".to_string(), 0.0),
            ]
        );
        assert!(job.ready && job.done);
    }
}
