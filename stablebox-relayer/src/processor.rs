use futures::StreamExt;
use log::{error, info, warn};
use solana_client::nonblocking::pubsub_client::PubsubClient;
use solana_client::rpc_config::{RpcTransactionLogsConfig, RpcTransactionLogsFilter};
use solana_sdk::{
    commitment_config::CommitmentConfig,
    pubkey::Pubkey,
    signature::{Keypair, Signature, Signer},
};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{watch, Mutex};
use tokio::task::JoinHandle;

use crate::{
    asset::Asset,
    config::RelayerConfig,
    constants::{usdc_mint, ESCROW_PROGRAM_ID, RECONNECT_DELAY_SECS, STABLE_SYMBOL},
    errors::RelayerError,
    escrow_client::EscrowClient,
    events::{parse_event_log, EscrowEvent, SwapRequested},
    metrics::Metrics,
    router::RouterClient,
};

/// One settled swap request. Transient: logged on completion, never stored.
#[derive(Debug)]
pub struct SettlementRecord {
    pub originator: Pubkey,
    pub input_asset: Asset,
    pub input_amount: u64,
    pub quoted_out: u64,
    pub realized_out: u64,
    pub route: Vec<String>,
    pub settlement_tx: Signature,
}

#[derive(Clone)]
struct ProcessorContext {
    config: Arc<RelayerConfig>,
    escrow_client: Arc<EscrowClient>,
    router: Arc<RouterClient>,
    admin_keypair: Arc<Keypair>,
    metrics: Arc<Metrics>,
}

/// Long-lived worker that reacts to the escrow program's swap-request events:
/// quote, execute the swap, distribute the realized stable amount back to the
/// originating user. Constructed explicitly and owned by the hosting process;
/// `start`/`stop` are its only lifecycle API.
///
/// The processor keeps no dedup store. It relies on the escrow program
/// emitting at most one request event per purchase instruction, and it is not
/// crash-restart safe: events delivered while the processor is down are the
/// administrator's manual responsibility.
pub struct SettlementProcessor {
    ctx: ProcessorContext,
    task: Mutex<Option<(watch::Sender<bool>, JoinHandle<()>)>>,
}

impl SettlementProcessor {
    pub fn new(
        config: Arc<RelayerConfig>,
        escrow_client: Arc<EscrowClient>,
        router: Arc<RouterClient>,
        admin_keypair: Arc<Keypair>,
        metrics: Arc<Metrics>,
    ) -> Self {
        Self {
            ctx: ProcessorContext {
                config,
                escrow_client,
                router,
                admin_keypair,
                metrics,
            },
            task: Mutex::new(None),
        }
    }

    /// Subscribes to the escrow program's event stream. Idempotent: calling
    /// `start` while running keeps the existing subscription.
    pub async fn start(&self) -> Result<(), RelayerError> {
        let mut task = self.task.lock().await;
        if let Some((_, handle)) = task.as_ref() {
            if !handle.is_finished() {
                warn!("Settlement processor already running");
                return Ok(());
            }
        }

        // The distribution wallet needs its own stable account before the
        // first settlement lands; safe to repeat across restarts.
        let admin = self.ctx.admin_keypair.pubkey();
        self.ctx
            .escrow_client
            .ensure_associated_account(&admin, &usdc_mint())
            .await?;

        let ctx = self.ctx.clone();
        let (shutdown, shutdown_rx) = watch::channel(false);
        let handle = tokio::spawn(async move { subscription_loop(ctx, shutdown_rx).await });
        *task = Some((shutdown, handle));
        info!("Settlement processor started");
        Ok(())
    }

    /// Signals the subscription to stop and waits for the task to finish.
    /// A handler that has already started drains to completion or failure
    /// before this returns; shutdown is only observed between events. Safe
    /// to call when already stopped.
    pub async fn stop(&self) {
        let mut task = self.task.lock().await;
        if let Some((shutdown, handle)) = task.take() {
            let _ = shutdown.send(true);
            let _ = handle.await;
            info!("Settlement processor stopped");
        }
    }

    pub async fn is_running(&self) -> bool {
        self.task
            .lock()
            .await
            .as_ref()
            .map(|(_, handle)| !handle.is_finished())
            .unwrap_or(false)
    }
}

async fn subscription_loop(ctx: ProcessorContext, mut shutdown: watch::Receiver<bool>) {
    loop {
        if let Err(e) = run_subscription(&ctx, &mut shutdown).await {
            error!("Log subscription failed: {e}");
        }
        if *shutdown.borrow() {
            return;
        }
        warn!("Log subscription closed, reconnecting");
        tokio::select! {
            _ = shutdown.changed() => return,
            _ = tokio::time::sleep(Duration::from_secs(RECONNECT_DELAY_SECS)) => {}
        }
    }
}

async fn run_subscription(
    ctx: &ProcessorContext,
    shutdown: &mut watch::Receiver<bool>,
) -> Result<(), RelayerError> {
    let client = PubsubClient::new(&ctx.config.ws_url)
        .await
        .map_err(|e| RelayerError::RpcError(e.to_string()))?;
    let (mut stream, _unsubscribe) = client
        .logs_subscribe(
            RpcTransactionLogsFilter::Mentions(vec![ESCROW_PROGRAM_ID.to_string()]),
            RpcTransactionLogsConfig {
                commitment: Some(CommitmentConfig::confirmed()),
            },
        )
        .await
        .map_err(|e| RelayerError::RpcError(e.to_string()))?;
    info!("Subscribed to escrow program logs");

    // Events are handled strictly in delivery order; a slow settlement
    // delays the next one. Distribution mutates the shared escrow holding
    // account, so per-escrow serialization must be preserved. Shutdown is
    // checked only between updates: a handler that has begun always runs
    // to completion or failure.
    loop {
        let update = tokio::select! {
            _ = shutdown.changed() => return Ok(()),
            update = stream.next() => match update {
                Some(update) => update,
                None => return Ok(()),
            },
        };
        if update.value.err.is_some() {
            continue;
        }
        for line in &update.value.logs {
            if let Some(event) = parse_event_log(line) {
                handle_event(ctx, event, &update.value.signature).await;
            }
        }
    }
}

async fn handle_event(ctx: &ProcessorContext, event: EscrowEvent, purchase_tx: &str) {
    match event {
        EscrowEvent::PurchaseAutomatic(event) => {
            info!(
                "Fixed-rate purchase settled on-chain: {} paid {} {} base units, received {} stable ({})",
                event.user, event.amount, event.asset_type, event.stable_received, purchase_tx
            );
        }
        EscrowEvent::SwapRequested(request) => {
            ctx.metrics.events_received.inc();
            let Some(asset) = dispatch(&request) else {
                ctx.metrics.events_skipped.inc();
                warn!(
                    "Skipping unsupported swap request {} -> {} from {} ({})",
                    request.input_asset, request.output_asset, request.user, purchase_tx
                );
                return;
            };
            match settle(ctx, asset, &request).await {
                Ok(record) => {
                    ctx.metrics.settlements_completed.inc();
                    info!(
                        "Settled {} {} base units for {}: quoted {}, realized {}, route {:?} ({})",
                        record.input_amount,
                        record.input_asset.symbol(),
                        record.originator,
                        record.quoted_out,
                        record.realized_out,
                        record.route,
                        record.settlement_tx
                    );
                }
                Err(e) => {
                    // One bad event must not take down the subscription; the
                    // event is dropped and retries are the administrator's
                    // manual responsibility.
                    ctx.metrics.settlements_failed.inc();
                    error!(
                        "Settlement failed for {} ({} {} base units, purchase {}): {}",
                        request.user, request.input_amount, request.input_asset, purchase_tx, e
                    );
                }
            }
        }
    }
}

/// Selects the handler for a request event. Only SOL and JUP inputs paying
/// out the stable asset are supported; everything else is skipped.
fn dispatch(request: &SwapRequested) -> Option<Asset> {
    if request.output_asset != STABLE_SYMBOL {
        return None;
    }
    Asset::from_symbol(&request.input_asset)
}

async fn settle(
    ctx: &ProcessorContext,
    asset: Asset,
    request: &SwapRequested,
) -> Result<SettlementRecord, RelayerError> {
    let quote = ctx
        .router
        .get_quote(
            &asset.routing_mint(),
            &usdc_mint(),
            request.input_amount,
            ctx.config.slippage_bps,
        )
        .await?;
    let quoted_out = quote.out_amount_base()?;

    let outcome = ctx
        .router
        .build_and_execute_swap(&quote, ctx.admin_keypair.as_ref())
        .await?;

    // Distribute the re-derived settled amount, never the quote estimate
    ctx.escrow_client
        .distribute_to(&request.user, outcome.realized_out)
        .await?;

    Ok(SettlementRecord {
        originator: request.user,
        input_asset: asset,
        input_amount: request.input_amount,
        quoted_out,
        realized_out: outcome.realized_out,
        route: quote.route_labels(),
        settlement_tx: outcome.signature,
    })
}
