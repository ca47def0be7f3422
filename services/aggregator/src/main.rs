// aggregator: boots the reference tables, modules, scheduler and the
// streaming client, then serves the read API until ctrl-c.

use std::path::Path;

use tokio::sync::watch;
use tracing::{error, info};

use aggregator::config::{Config, RunEnvironment};
use aggregator::geodata::GeoData;
use aggregator::http_api;
use aggregator::scheduler::{Scheduler, DEFAULT_WORKERS};
use aggregator::state::Registry;

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    info!(version = env!("CARGO_PKG_VERSION"), "aggregator starting");

    let env = match RunEnvironment::from_env() {
        Ok(env) => env,
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };
    let config = match Config::load(env, Path::new("config")) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("FATAL: failed to load config: {e}");
            std::process::exit(1);
        }
    };

    let geo = match GeoData::load(Path::new(&config.assets_dir())) {
        Ok(geo) => {
            info!(
                stations = geo.observation_stations.len(),
                travel_rows = geo.travel_time.len(),
                "reference data loaded"
            );
            geo
        }
        Err(e) => {
            eprintln!("FATAL: failed to load reference data: {e}");
            std::process::exit(1);
        }
    };

    let bind_addr = config.bind_addr();
    let mut scheduler = Scheduler::new(DEFAULT_WORKERS);
    let shutdown_rx = scheduler.shutdown_receiver();
    let registry = match Registry::build(config, geo, shutdown_rx) {
        Ok(registry) => registry,
        Err(e) => {
            eprintln!("FATAL: {e}");
            std::process::exit(1);
        }
    };
    Registry::register_jobs(&registry, &mut scheduler);

    let listener = match tokio::net::TcpListener::bind(&bind_addr).await {
        Ok(listener) => listener,
        Err(e) => {
            eprintln!("FATAL: failed to bind {bind_addr}: {e}");
            std::process::exit(1);
        }
    };
    info!(%bind_addr, "read API listening");

    let app = http_api::router(std::sync::Arc::clone(&registry));
    let (stop_tx, mut stop_rx) = watch::channel(false);
    let server = tokio::spawn(async move {
        let shutdown = async move {
            let _ = stop_rx.changed().await;
        };
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(shutdown)
            .await
        {
            error!(error = %e, "read API server failed");
        }
    });

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("shutdown requested"),
        Err(e) => error!(error = %e, "failed to listen for ctrl-c"),
    }

    // Drain: stop the scheduler (which flips the shared shutdown flag and
    // halts reconnection), close the streaming session, stop the server.
    scheduler.shutdown().await;
    if let Some(client) = &registry.dmdata {
        client.shutdown_close().await;
    }
    let _ = stop_tx.send(true);
    let _ = server.await;
    info!("aggregator stopped");
}
