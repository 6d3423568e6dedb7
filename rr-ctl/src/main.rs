mod args;
use args::{parse_args, Commands};

mod core;
use crate::core::RankRequest;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    let args = parse_args();
    let store = core::open_store(&args.store).await?;

    match args.command {
        Commands::Rank {
            room,
            users,
            graph,
            population,
            api_url,
            tuning,
        } => {
            let request = RankRequest {
                room,
                users,
                graph,
                population,
                api_url,
                config: (&tuning).into(),
            };
            core::rank(store, request).await?
        }
        Commands::Status { job } => core::status(store, &args.store, &job).await?,
        Commands::Rankings { job } => core::rankings(store, &args.store, &job).await?,
    }

    Ok(())
}
