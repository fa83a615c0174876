//! Quickplay - find a good community server and join it
//!
//! Runs one feeling-lucky search against the simulated master server and
//! prints the search report as JSON.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use quickplay_client::config::Config;
use quickplay_client::matchmaking::{
    Blacklist, ConnectLog, LogPresentation, QuickplayService, RecentMatchRegistry, SearchContext,
    SearchOptions, StaticMapCatalog,
};
use quickplay_client::transport::{SearchEvent, SimulatedTransport};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let config = Config::from_env()?;

    init_tracing(&config.log_level);

    info!("Starting quickplay");
    info!(tunables = %serde_json::to_string(&config.tunables)?, "Effective tunables");

    let blacklist = match &config.blacklist_path {
        Some(path) => {
            let blacklist = Blacklist::load(path)?;
            info!(path = %path.display(), entries = blacklist.len(), "Loaded server blacklist");
            blacklist
        }
        None => Blacklist::new(),
    };

    let context = SearchContext::from_config(
        &config,
        Arc::new(StaticMapCatalog::new(config.maps.iter().cloned())),
        Arc::new(blacklist),
        RecentMatchRegistry::shared(),
    )?;
    let service = QuickplayService::new(context);

    let (events_tx, events_rx) = mpsc::unbounded_channel();
    let transport = SimulatedTransport::from_config(&config, events_tx.clone());
    info!(servers = transport.servers().len(), seed = config.sim_seed, "Simulated master server ready");

    // Ctrl+C cancels the search
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            info!("Received Ctrl+C, cancelling search");
            let _ = events_tx.send(SearchEvent::UserCancelled);
        }
    });

    let session = service
        .run_search(
            SearchOptions::default(),
            transport,
            LogPresentation,
            ConnectLog::default(),
            events_rx,
        )
        .await;

    for command in &session.connector().commands {
        info!(command = %command, "Connect directive");
    }
    if session.connector().commands.is_empty() {
        warn!(result = ?session.result(), "Quickplay did not find a server to join");
    }

    let stats = session.stats(tokio::time::Instant::now().into_std());
    println!("{}", serde_json::to_string_pretty(&stats)?);
    Ok(())
}

/// Initialize tracing/logging
fn init_tracing(log_level: &str) {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(log_level));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer().with_target(true))
        .init();
}
