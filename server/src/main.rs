use anyhow::Context;
use clap::Parser;
use gambit_core::{db::Db, lifecycle::Controller, pairing::Seeding, rating::Glicko2};
use gambit_service::{
    HttpNotifier, HttpPlayerDirectory, HttpTournamentDirectory, Orchestrator, OrchestratorConfig,
};
use hyper::{
    service::{make_service_fn, service_fn},
    Server,
};
use std::{convert::Infallible, net::SocketAddr, path::PathBuf, sync::Arc, time::Duration};
use tokio::sync::Mutex;
use tracing_subscriber::EnvFilter;
use url::Url;

mod api;

/// Tournament match service: pairing, results and Glicko-2 ratings.
#[derive(Parser)]
struct Options {
    /// Address to serve the HTTP API on.
    #[clap(short, long, env = "GAMBIT_LISTEN", default_value = "0.0.0.0:8080")]
    listen: SocketAddr,

    /// Journal database. Tournaments are kept in memory only if not given.
    #[clap(short, long, env = "GAMBIT_DB")]
    db: Option<PathBuf>,

    /// Base URL of the player directory.
    #[clap(long, env = "GAMBIT_PLAYER_URL")]
    player_url: Url,

    /// Base URL of the tournament metadata service.
    #[clap(long, env = "GAMBIT_TOURNAMENT_URL")]
    tournament_url: Url,

    /// Base URL of the notification service.
    #[clap(long, env = "GAMBIT_NOTIFICATION_URL")]
    notification_url: Url,

    /// Timeout for each collaborator request, in milliseconds.
    #[clap(long, env = "GAMBIT_TIMEOUT_MS", default_value = "5000")]
    timeout_ms: u64,

    /// Attempts made to push a new rating to the player directory.
    #[clap(long, env = "GAMBIT_PUSH_ATTEMPTS", default_value = "3")]
    push_attempts: usize,

    /// Delay before retrying a rating push, in milliseconds.
    #[clap(long, env = "GAMBIT_PUSH_BACKOFF_MS", default_value = "200")]
    push_backoff_ms: u64,

    /// Glicko-2 system constant.
    #[clap(long, env = "GAMBIT_TAU", default_value = "0.5")]
    tau: f64,

    /// How players are ordered before pairing (`rating` or `score`).
    #[clap(long, env = "GAMBIT_SEEDING", default_value = "rating")]
    seeding: Seeding,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_ansi(true)
        .init();
    let opt = Options::parse();
    anyhow::ensure!(opt.push_attempts > 0, "at least one rating push attempt is required");
    anyhow::ensure!(opt.tau > 0.0, "the system constant must be positive");

    let db = match &opt.db {
        Some(path) => Db::open(path)
            .await
            .with_context(|| format!("opening journal {}", path.display()))?,
        None => {
            tracing::warn!("no journal configured, tournaments will not survive a restart");
            Db::memory().await?
        }
    };

    let timeout = Duration::from_millis(opt.timeout_ms);
    let orchestrator = Arc::new(Orchestrator::new(
        Controller::new(Glicko2::new(opt.tau), opt.seeding),
        Arc::new(Mutex::new(db)),
        HttpPlayerDirectory::new(opt.player_url, timeout),
        HttpTournamentDirectory::new(opt.tournament_url, timeout),
        HttpNotifier::new(opt.notification_url, timeout),
        OrchestratorConfig {
            push_attempts: opt.push_attempts,
            push_backoff: Duration::from_millis(opt.push_backoff_ms),
        },
    ));
    orchestrator.restore().await?;

    let make_service = make_service_fn(move |_conn| {
        let orchestrator = orchestrator.clone();
        async move {
            Ok::<_, Infallible>(service_fn(move |req| {
                api::handle(orchestrator.clone(), req)
            }))
        }
    });

    tracing::info!(listen = %opt.listen, "serving");
    Server::bind(&opt.listen).serve(make_service).await?;
    Ok(())
}
