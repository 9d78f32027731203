use std::sync::Arc;

use rocket::{Ignite, Rocket};
use sqlx::SqlitePool;
use tokio::task::{AbortHandle, JoinError, JoinHandle};
use tracing::{error, info, info_span, warn};

pub mod api;
pub mod auth;
mod bindings;
pub mod cctp;
pub mod chain;
pub mod cli;
pub mod config;
pub mod evm;
pub mod marketplace;
pub mod relayer;
pub mod settlement;
mod telemetry;
pub mod usdc;

pub use telemetry::{TelemetryCtx, TelemetryError, TelemetryGuard};

#[cfg(test)]
pub(crate) mod test_utils;

use crate::config::Ctx;
use crate::evm::{RawPrivateKeyWallet, ReadOnlyEvm, ReceiptPolling};
use crate::relayer::{Destination, EvmDestination, Finalizer, HttpFinalizer, Relayer};
use crate::settlement::{SettlementWorker, Settler, SourceChains};

pub async fn launch(ctx: Ctx) -> anyhow::Result<()> {
    let launch_span = info_span!("launch");
    let _enter = launch_span.enter();

    let pool = ctx.get_sqlite_pool().await?;
    sqlx::migrate!().run(&pool).await?;

    let relayer = build_relayer(&ctx, &pool)?.map(Arc::new);
    let finalizer = build_finalizer(&ctx, relayer.as_ref())?;

    let server_task = spawn_server_task(&ctx, &pool, relayer);
    let worker_task = match finalizer {
        Some(finalizer) => {
            let settler = build_settler(&ctx, &pool, finalizer)?;
            spawn_worker_task(SettlementWorker::new(Arc::new(settler), ctx.worker_interval))
        }
        None => {
            warn!("Neither relayer_url nor relayer_private_key configured, settlement worker disabled");
            tokio::spawn(std::future::pending())
        }
    };

    await_shutdown(server_task, worker_task).await;

    info!("Shutdown complete");
    Ok(())
}

/// In-process relayer signing with the relayer key on every configured
/// chain, or `None` when no key is set.
pub(crate) fn build_relayer(ctx: &Ctx, pool: &SqlitePool) -> anyhow::Result<Option<Relayer>> {
    let Some(signer) = ctx.relayer_signer.as_ref() else {
        return Ok(None);
    };

    let destinations: Vec<Arc<dyn Destination>> = ctx
        .chains
        .iter()
        .map(|(chain, chain_ctx)| {
            let wallet = RawPrivateKeyWallet::connect(
                chain_ctx.rpc_url.clone(),
                signer.clone(),
                ctx.required_confirmations,
            );
            Arc::new(EvmDestination::new(*chain, wallet, chain_ctx.contracts)) as Arc<dyn Destination>
        })
        .collect();

    info!(
        relayer = %signer.address(),
        chains = destinations.len(),
        top_up = ctx.top_up,
        "Relayer configured"
    );

    Ok(Some(Relayer::new(
        pool.clone(),
        destinations,
        ctx.balance_wait(),
        ctx.top_up,
    )))
}

/// A configured `relayer_url` takes precedence over the local relayer.
pub(crate) fn build_finalizer(
    ctx: &Ctx,
    relayer: Option<&Arc<Relayer>>,
) -> anyhow::Result<Option<Arc<dyn Finalizer>>> {
    if let Some(url) = &ctx.relayer_url {
        return Ok(Some(Arc::new(HttpFinalizer::new(url)?)));
    }

    Ok(relayer.map(|relayer| Arc::clone(relayer) as Arc<dyn Finalizer>))
}

/// Settler that confirms buyer payments over read-only connections to every
/// configured chain.
pub(crate) fn build_settler(
    ctx: &Ctx,
    pool: &SqlitePool,
    finalizer: Arc<dyn Finalizer>,
) -> anyhow::Result<Settler> {
    let source_chains = ctx
        .chains
        .iter()
        .map(|(chain, chain_ctx)| (*chain, ReadOnlyEvm::connect(chain_ctx.rpc_url.clone())))
        .collect();
    let receipts = SourceChains::new(
        source_chains,
        ReceiptPolling::with_confirmations(ctx.required_confirmations),
    );

    Ok(Settler::new(
        pool.clone(),
        ctx.circle_client()?,
        finalizer,
        Arc::new(receipts),
        ctx.contracts(),
        ctx.destination_chain,
    ))
}

fn spawn_server_task(
    ctx: &Ctx,
    pool: &SqlitePool,
    relayer: Option<Arc<Relayer>>,
) -> JoinHandle<Result<Rocket<Ignite>, rocket::Error>> {
    let rocket_config = rocket::Config::figment()
        .merge(("port", ctx.server_port))
        .merge(("address", "0.0.0.0"));

    let rocket = api::mount(rocket::custom(rocket_config), pool.clone(), relayer);

    tokio::spawn(rocket.launch())
}

fn spawn_worker_task(worker: SettlementWorker) -> JoinHandle<()> {
    tokio::spawn(async move {
        let worker_span = info_span!("settlement_worker");
        let _enter = worker_span.enter();

        worker.run().await;
    })
}

async fn await_shutdown(
    server_task: JoinHandle<Result<Rocket<Ignite>, rocket::Error>>,
    worker_task: JoinHandle<()>,
) {
    let server_abort = server_task.abort_handle();
    let worker_abort = worker_task.abort_handle();

    tokio::select! {
        _ = tokio::signal::ctrl_c() => {
            info!("Received shutdown signal, shutting down gracefully...");
            abort_task("server", &server_abort);
            abort_task("worker", &worker_abort);
        }
        result = server_task => {
            log_server_result(result);
            abort_task("worker", &worker_abort);
        }
        result = worker_task => {
            log_worker_result(result);
            abort_task("server", &server_abort);
        }
    }
}

fn abort_task(name: &str, handle: &AbortHandle) {
    info!("Aborting {name} task");
    handle.abort();
}

fn log_server_result(result: Result<Result<Rocket<Ignite>, rocket::Error>, JoinError>) {
    match result {
        Ok(Ok(_)) => info!("Server completed successfully"),
        Ok(Err(e)) => error!("Server failed: {e}"),
        Err(e) => error!("Server task panicked: {e}"),
    }
}

fn log_worker_result(result: Result<(), JoinError>) {
    match result {
        Ok(()) => info!("Settlement worker exited"),
        Err(e) => error!("Settlement worker panicked: {e}"),
    }
}
