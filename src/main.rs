use anyhow::{anyhow, bail, Context, Result};
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use swap_aggr::config::{AppConfig, VenuesFile};
use swap_aggr::router::{create_api_router, SwapEngine};
use swap_aggr::transport::jsonrpc::JsonRpc;
use swap_aggr::transport::{ChainBroadcaster, ChainReader};
use swap_aggr::venues::{build_providers, RouterRegistry};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing().context("initialize tracing subscriber")?;

    if let Err(err) = run().await {
        tracing::error!(error = ?err, "fatal aggregator error");
        std::process::exit(1);
    }
    Ok(())
}

async fn run() -> Result<()> {
    let config = AppConfig::load().context("load configuration")?;
    let venues = VenuesFile::load(&config.venues_file)
        .with_context(|| format!("load venues file {}", config.venues_file.display()))?;

    let rpc = Arc::new(JsonRpc::new(config.jsonrpc_endpoint.to_string(), config.sender));
    let registry = Arc::new(RouterRegistry::from_venues(&venues).context("build router registry")?);
    if registry.is_empty() {
        bail!("venues file {} lists no venues", config.venues_file.display());
    }
    for entry in registry.entries() {
        info!(
            venue = %entry.venue_id,
            router = %entry.router,
            family = %entry.family,
            "router registered"
        );
    }
    let providers = build_providers(&venues, rpc.clone() as Arc<dyn ChainReader>);
    info!(
        endpoint = rpc.endpoint(),
        sender = %rpc.sender(),
        venues = registry.len(),
        wrapped_native = %registry.wrapped_native(),
        "venues registered"
    );

    let engine = Arc::new(SwapEngine::new(
        registry,
        providers,
        rpc as Arc<dyn ChainBroadcaster>,
        config.executor.clone(),
    ));

    let api_router = create_api_router(engine.clone());
    let listener = tokio::net::TcpListener::bind(config.listen_addr)
        .await
        .with_context(|| format!("bind API server address {}", config.listen_addr))?;
    info!(address = %config.listen_addr, "HTTP API server starting");
    let _api_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, api_router).await {
            warn!(error = %e, "API server error");
        }
    });

    let mut ticker = tokio::time::interval(Duration::from_secs(30));
    loop {
        tokio::select! {
            _ = ticker.tick() => {
                let stats = engine.stats();
                info!(
                    total_executions = stats.total_executions,
                    successful = stats.successful_executions,
                    failed = stats.failed_executions,
                    success_rate = stats.success_rate,
                    in_flight = engine.in_flight(),
                    "execution statistics"
                );
            }
            res = tokio::signal::ctrl_c() => {
                if let Err(err) = res {
                    warn!(error = %err, "ctrl_c listener error");
                }
                info!("Shutdown signal received, exiting");
                break;
            }
        }
    }
    Ok(())
}

fn init_tracing() -> Result<()> {
    let env_filter = std::env::var("RUST_LOG").unwrap_or_else(|_| "info,hyper=warn".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(env_filter))
        .with_target(false)
        .try_init()
        .map_err(|err| anyhow!("tracing subscriber init: {err}"))
}
