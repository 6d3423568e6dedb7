use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};

use common::config::Config;
use common::graph::FRIENDFEED_URL;
use common::JobKey;

//
// For parsing user specified command.
//
#[derive(Parser, Debug)]
#[command(version, about, long_about = None)]
pub struct Args {
    #[command(flatten)]
    pub store: StoreArgs,

    #[clap(subcommand)]
    pub command: Commands,
}

#[derive(clap::Args, Debug)]
pub struct StoreArgs {
    /// Where records are kept: `memory`, or an `s3://bucket/prefix` location.
    #[arg(long, global = true, default_value = "memory")]
    pub store: String,

    /// Minio access key / user ID.
    #[arg(long, global = true, default_value = "robert")]
    pub access_key_id: String,

    /// Minio secret key / password.
    #[arg(long, global = true, default_value = "robertisawesome")]
    pub secret_access_key: String,

    /// Minio region.
    #[arg(long, global = true, default_value = "us-east-1")]
    pub region: String,

    #[arg(long, global = true, default_value = "http://127.0.0.1:9000")]
    pub minio_url: String,
}

/// Where users' connections are read from.
#[derive(ValueEnum, Clone, Copy, Debug, PartialEq, Eq)]
pub enum GraphKind {
    /// Made-up population `user00`, `user01`, ...
    Synthetic,
    /// The FriendFeed API.
    Friendfeed,
}

#[derive(clap::Args, Debug)]
pub struct Tuning {
    /// Users per batch.
    #[arg(short, long, default_value_t = 4)]
    pub batch_size: usize,

    /// Tasks running at the same time.
    #[arg(short, long, default_value_t = 8)]
    pub concurrency: usize,

    /// Runs of a task before giving up on it.
    #[arg(long, default_value_t = 10)]
    pub max_attempts: u32,

    /// Delay before the first retry, in milliseconds. Doubles on every retry.
    #[arg(long, default_value_t = 200)]
    pub backoff_ms: u64,

    /// Upper bound of the retry delay, in milliseconds.
    #[arg(long, default_value_t = 5000)]
    pub max_backoff_ms: u64,

    /// How often to check whether the job is ready, in milliseconds.
    #[arg(long, default_value_t = 500)]
    pub poll_ms: u64,

    /// Give up waiting for the job after this many seconds.
    #[arg(short, long, default_value_t = 60)]
    pub timeout: u64,
}

impl From<&Tuning> for Config {
    fn from(tuning: &Tuning) -> Self {
        Config {
            batch_size: tuning.batch_size,
            concurrency: tuning.concurrency,
            max_attempts: tuning.max_attempts,
            initial_backoff: Duration::from_millis(tuning.backoff_ms),
            max_backoff: Duration::from_millis(tuning.max_backoff_ms),
            poll_interval: Duration::from_millis(tuning.poll_ms),
            stall_timeout: Duration::from_secs(tuning.timeout),
        }
    }
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Rank the users of a room by popularity, and wait for the result.
    Rank {
        /// Name of the room.
        room: String,

        /// Users to rank. Defaults to every member of the room.
        #[arg(short, long, value_delimiter = ',')]
        users: Vec<String>,

        /// Source of the social graph.
        #[arg(short, long, value_enum, default_value_t = GraphKind::Synthetic)]
        graph: GraphKind,

        /// Size of the synthetic population.
        #[arg(short, long, default_value_t = 20)]
        population: usize,

        /// Base url of the FriendFeed API.
        #[arg(long, default_value = FRIENDFEED_URL)]
        api_url: String,

        #[command(flatten)]
        tuning: Tuning,
    },
    /// Show whether a job's batches are done and whether its scores are out.
    Status {
        /// Key of the job, as printed by `rank`.
        job: JobKey,
    },
    /// Print the scores of a ready job, most popular first.
    Rankings {
        /// Key of the job, as printed by `rank`.
        job: JobKey,
    },
}

/// Parse the command line.
pub fn parse_args() -> Args {
    Args::parse()
}
