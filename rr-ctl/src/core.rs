use std::sync::Arc;

use anyhow::{bail, Context, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

use common::config::Config;
use common::graph::{FriendFeedSource, SocialGraphSource, SyntheticSource};
use common::minio::{self, S3Store};
use common::store::{KeyedStore, MemoryStore};
use common::JobKey;
use rr_coordinator::jobs;
use rr_worker::local_pipeline;

use crate::args::{GraphKind, StoreArgs};

const MEMORY_STORE: &str = "memory";

/// Open the record store named on the command line.
pub async fn open_store(args: &StoreArgs) -> Result<Arc<dyn KeyedStore>> {
    if args.store == MEMORY_STORE {
        return Ok(Arc::new(MemoryStore::new()));
    }

    let client = minio::Client::from_conf(minio::ClientConfig {
        access_key_id: args.access_key_id.clone(),
        secret_access_key: args.secret_access_key.clone(),
        region: args.region.clone(),
        url: args.minio_url.clone(),
    });
    let store = S3Store::connect(client, &args.store)
        .await
        .with_context(|| format!("could not open store `{}`", args.store))?;
    Ok(Arc::new(store))
}

fn require_persistent(args: &StoreArgs) -> Result<()> {
    if args.store == MEMORY_STORE {
        bail!("jobs do not outlive `rank` with the memory store, pass --store s3://bucket/prefix");
    }
    Ok(())
}

pub struct RankRequest {
    pub room: String,
    pub users: Vec<String>,
    pub graph: GraphKind,
    pub population: usize,
    pub api_url: String,
    pub config: Config,
}

/// Resolve the users of the room and the graph source to read them from.
async fn resolve(request: &RankRequest) -> Result<(Vec<String>, Arc<dyn SocialGraphSource>)> {
    match request.graph {
        GraphKind::Synthetic => {
            let source = SyntheticSource::new(request.population);
            let users = if request.users.is_empty() {
                source.members()
            } else {
                request.users.clone()
            };
            let source: Arc<dyn SocialGraphSource> = Arc::new(source);
            Ok((users, source))
        }
        GraphKind::Friendfeed => {
            let source = FriendFeedSource::new(&request.api_url)?;
            let users = if request.users.is_empty() {
                source
                    .room_members(&request.room)
                    .await
                    .with_context(|| format!("could not list members of `{}`", request.room))?
            } else {
                request.users.clone()
            };
            let source: Arc<dyn SocialGraphSource> = Arc::new(source);
            Ok((users, source))
        }
    }
}

/// Run a ranking job to completion in this process and print its rankings.
pub async fn rank(store: Arc<dyn KeyedStore>, request: RankRequest) -> Result<()> {
    let (users, graph) = resolve(&request).await?;
    let (coordinator, runtime, receiver) = local_pipeline(store, graph, request.config.clone());

    let shutdown = CancellationToken::new();
    let runtime = tokio::spawn(runtime.run(receiver, shutdown.clone()));

    let outcome = async {
        let job = coordinator.create_job(&request.room, users).await?;
        info!(%job, room = %request.room, "job created");
        println!("[Job] {job}");

        coordinator.wait_until_ready(&job).await?;
        coordinator.rankings(&job).await
    }
    .await;

    shutdown.cancel();
    runtime.await.context("task runtime panicked")?;

    print_rankings(&outcome?);
    Ok(())
}

pub async fn status(store: Arc<dyn KeyedStore>, args: &StoreArgs, job: &JobKey) -> Result<()> {
    require_persistent(args)?;
    let status = jobs::status(store.as_ref(), job).await?;
    let progress = jobs::progress(store.as_ref(), job).await?;

    println!("[Status]");
    println!("job:     {job}");
    println!("done:    {}", status.done);
    println!("ready:   {}", status.ready);
    if !status.ready {
        println!(
            "batches: {} of {} done",
            progress.total - progress.pending,
            progress.total
        );
    }

    Ok(())
}

pub async fn rankings(store: Arc<dyn KeyedStore>, args: &StoreArgs, job: &JobKey) -> Result<()> {
    require_persistent(args)?;
    let rankings = jobs::rankings(store.as_ref(), job).await?;
    print_rankings(&rankings);
    Ok(())
}

fn print_rankings(rankings: &[(String, f64)]) {
    println!("[Rankings]");
    for (place, (nickname, score)) in rankings.iter().enumerate() {
        println!("{:>4}  {score:>6}  {nickname}", place + 1);
    }
}
