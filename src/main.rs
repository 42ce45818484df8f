//! Nige Nest Ledger service entry point.
//!
//! Boot order: config, logging, database (schema applied idempotently),
//! system accounts, then the reconciler's two background drivers. The
//! process runs until Ctrl-C.

use std::sync::Arc;

use nige_nest_ledger::account::SystemAccounts;
use nige_nest_ledger::actions::ActionService;
use nige_nest_ledger::chain::{BscVerifier, RpcVerifier, SolanaVerifier};
use nige_nest_ledger::config::AppConfig;
use nige_nest_ledger::db::Database;
use nige_nest_ledger::logging::init_logging;
use nige_nest_ledger::nest::NestService;
use nige_nest_ledger::reconciler::{
    FallbackPoller, Heartbeat, ReconcilerService, ReconcilerWorker,
};

fn get_env() -> String {
    let args: Vec<String> = std::env::args().collect();
    for i in 0..args.len() {
        if (args[i] == "--env" || args[i] == "-e") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }
    "dev".to_string()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let env = get_env();
    let config = AppConfig::load(&env);
    let _guard = init_logging(&config);

    tracing::info!(env = %env, "Starting nige-nest-ledger");

    let db = Arc::new(Database::connect(&config.postgres_url).await?);
    db.ensure_schema().await?;

    let system = SystemAccounts::resolve_or_seed(db.pool()).await?;
    tracing::info!(
        treasury = system.treasury,
        exchange = system.exchange,
        pool = system.pool,
        "System accounts ready"
    );

    let actions = Arc::new(ActionService::new(
        db.clone(),
        system,
        config.actions.clone(),
    ));
    let _nests = NestService::new(db.clone(), system);

    let verifier = Arc::new(RpcVerifier::new(
        BscVerifier::new(config.chains.bsc.clone())?,
        SolanaVerifier::new(config.chains.solana.clone())?,
    ));
    let reconciler = Arc::new(ReconcilerService::new(
        db.clone(),
        actions.clone(),
        verifier,
        config.reconciler.clone(),
    ));

    let heartbeat = Arc::new(Heartbeat::default());
    let (worker, handle) = ReconcilerWorker::new(reconciler.clone(), heartbeat.clone(), 1024);
    reconciler.attach_handle(handle);
    let poller = FallbackPoller::new(reconciler.clone(), heartbeat);

    tokio::spawn(worker.run());
    tokio::spawn(poller.run());

    tracing::info!("Ledger service running, press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;
    tracing::info!("Shutting down");

    Ok(())
}
