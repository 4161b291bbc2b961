//! dripgate service binary: wires the orchestrator to a live substrate
//! node and serves the dispenser HTTP surface.

mod admin;
mod config;
mod gateway;
mod handlers;
mod tx;

use std::collections::HashMap;
use std::error::Error;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::routing::{get, post};
use clap::Parser;
use tokio::sync::RwLock;
use tower_http::cors::CorsLayer;
use tracing::info;
use tracing_subscriber::EnvFilter;

use dripgate_dispenser::ledger::MemoryLedger;
use dripgate_dispenser::orchestrator::Orchestrator;
use dripgate_eligibility::StrategyChecker;

use crate::config::ServiceConfig;
use crate::gateway::{RpcChainGateway, SharedRpcClient};
use crate::handlers::{AppState, normalize_token};
use crate::tx::Signer;

#[derive(Debug, Parser)]
#[command(name = "dripgate", about = "Token-gated drip and allowlist dispenser")]
struct Cli {
    /// JSON config file; built-in defaults apply when omitted.
    #[arg(long, short)]
    config: Option<PathBuf>,

    /// Override the configured listen address.
    #[arg(long)]
    listen: Option<SocketAddr>,

    /// Override the configured chain websocket endpoint.
    #[arg(long)]
    chain_endpoint: Option<String>,

    /// Signing key SURI. Set it through the environment in production.
    #[arg(long, env = "DRIPGATE_SIGNER_SURI", hide_env_values = true, default_value = "//Alice")]
    signer: String,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let mut config = match &cli.config {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    };
    if let Some(listen) = cli.listen {
        config.listen = listen;
    }
    if let Some(endpoint) = cli.chain_endpoint {
        config.chain_endpoint = endpoint;
    }
    let admin_hash = config.admin_hash()?;
    if admin_hash.is_none() {
        info!("no admin key digest configured, admin surface disabled");
    }

    let signer = Signer::from_suri(&cli.signer)?;
    info!(signer = %signer.account(), endpoint = %config.chain_endpoint, "dispenser starting");

    let rpc = SharedRpcClient::new(config.chain_endpoint.clone());
    let chain_gateway = Arc::new(RpcChainGateway::new(rpc, signer, config.chain.clone()));
    let ledger = Arc::new(MemoryLedger::new());
    let http = reqwest::Client::builder().timeout(Duration::from_secs(10)).build()?;
    let checker = Arc::new(StrategyChecker::new(http, ledger.clone()));
    let orchestrator =
        Orchestrator::new(chain_gateway, ledger, checker, config.orchestrator());

    let mut registry = HashMap::new();
    for meta in config.mints.iter().cloned() {
        let token_type = normalize_token(Some(&meta.token_type));
        registry.insert(
            token_type.clone(),
            dripgate_dispenser::model::MintMetadata { token_type, ..meta },
        );
    }
    info!(mints = registry.len(), "mint registry loaded");

    let state = Arc::new(AppState { orchestrator, registry: RwLock::new(registry), admin_hash });

    let app = Router::new()
        .route("/shortlist", post(handlers::shortlist))
        .route("/drip/{holder}/{recipient}", get(handlers::drip))
        .route("/health", get(handlers::health))
        .route("/admin/mint", post(admin::upsert_mint))
        .route("/admin/seed", post(admin::seed_whitelist))
        .route("/admin/status", post(admin::status))
        .layer(CorsLayer::permissive())
        .with_state(state);

    let listener = tokio::net::TcpListener::bind(config.listen).await?;
    info!(listen = %config.listen, "dispenser listening");
    axum::serve(listener, app.into_make_service_with_connect_info::<SocketAddr>()).await?;
    Ok(())
}
