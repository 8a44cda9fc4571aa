use anyhow::Result;
use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    routing::get,
    Router,
};
use log::{error, info};
use serde::Serialize;
use solana_client::rpc_client::RpcClient;
use solana_sdk::{
    commitment_config::CommitmentConfig,
    signature::{Keypair, Signer},
};
use std::sync::Arc;

use stablebox_relayer::{
    config::RelayerConfig,
    constants::{QUOTE_URL, SWAP_URL},
    escrow_client::EscrowClient,
    metrics::Metrics,
    processor::SettlementProcessor,
    router::RouterClient,
};

#[derive(Clone)]
struct RelayerState {
    escrow_client: Arc<EscrowClient>,
    processor: Arc<SettlementProcessor>,
    metrics: Arc<Metrics>,
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: String,
    processing: bool,
    events_received: u64,
    settlements_completed: u64,
    settlements_failed: u64,
}

#[derive(Debug, Serialize)]
struct EscrowResponse {
    admin: String,
    is_active: bool,
    total_native_received: u64,
    total_fees_collected: u64,
    total_stable_distributed: u64,
}

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::init();
    info!("Starting Stablebox settlement relayer...");

    // Load configuration
    let config = RelayerConfig::from_env()?;
    let rpc_client = Arc::new(RpcClient::new_with_commitment(
        config.rpc_url.clone(),
        CommitmentConfig::confirmed(),
    ));

    // Load administrator keypair
    let admin_keypair = Arc::new(Keypair::from_bytes(
        &bs58::decode(&config.admin_private_key).into_vec()?,
    )?);
    info!("Admin pubkey: {}", admin_keypair.pubkey());

    // Initialize components
    let escrow_client = Arc::new(EscrowClient::new(rpc_client.clone(), admin_keypair.clone()));
    let router = Arc::new(RouterClient::new(
        rpc_client,
        QUOTE_URL.to_string(),
        SWAP_URL.to_string(),
        config.confirm_timeout_secs,
    ));
    let metrics = Arc::new(Metrics::new());
    let processor = Arc::new(SettlementProcessor::new(
        Arc::new(config.clone()),
        escrow_client.clone(),
        router,
        admin_keypair,
        metrics.clone(),
    ));
    processor.start().await?;

    // Build HTTP server
    let state = RelayerState {
        escrow_client,
        processor: processor.clone(),
        metrics,
    };
    let app = Router::new()
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .route("/escrow", get(escrow_handler))
        .with_state(state);

    let addr = format!("0.0.0.0:{}", config.port);
    info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            tokio::signal::ctrl_c().await.ok();
            info!("Shutdown signal received");
        })
        .await?;

    processor.stop().await;
    Ok(())
}

async fn health_handler(State(state): State<RelayerState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        processing: state.processor.is_running().await,
        events_received: state.metrics.events_received.get(),
        settlements_completed: state.metrics.settlements_completed.get(),
        settlements_failed: state.metrics.settlements_failed.get(),
    })
}

async fn metrics_handler(State(state): State<RelayerState>) -> String {
    state.metrics.export()
}

async fn escrow_handler(
    State(state): State<RelayerState>,
) -> Result<Json<EscrowResponse>, StatusCode> {
    match state.escrow_client.read_escrow_state().await {
        Ok(escrow) => Ok(Json(EscrowResponse {
            admin: escrow.admin.to_string(),
            is_active: escrow.is_active,
            total_native_received: escrow.total_native_received,
            total_fees_collected: escrow.total_fees_collected,
            total_stable_distributed: escrow.total_stable_distributed,
        })),
        Err(e) => {
            error!("Failed to read escrow state: {e}");
            Err(StatusCode::INTERNAL_SERVER_ERROR)
        }
    }
}
