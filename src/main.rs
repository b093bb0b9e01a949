// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use std::str::FromStr;
use std::sync::Arc;

use alloy::signers::local::PrivateKeySigner;
use clap::Parser;
use futures::future::try_join_all;
use tokio_util::sync::CancellationToken;

use swap_keeper::app::config::Settings;
use swap_keeper::app::logging::setup_logging;
use swap_keeper::domain::error::AppError;
use swap_keeper::infrastructure::data::db::Database;
use swap_keeper::infrastructure::data::token_registry::TokenRegistry;
use swap_keeper::infrastructure::network::chain::{ChainClient, ReceiptPolicy};
use swap_keeper::infrastructure::network::gas::GasOracle;
use swap_keeper::infrastructure::network::nonce::NonceManager;
use swap_keeper::infrastructure::network::provider::ConnectionFactory;
use swap_keeper::infrastructure::network::quote::QuoteClient;
use swap_keeper::services::expander::RecurringExpander;
use swap_keeper::services::metrics::{SchedulerStats, spawn_stats_server};
use swap_keeper::services::orders::OrderService;
use swap_keeper::services::pipeline::SwapPipeline;
use swap_keeper::services::scheduler::Scheduler;

#[derive(Parser, Debug)]
#[command(author, version, about = "swap keeper")]
struct Cli {
    /// Path to config file (default: config.{toml,yaml,...})
    #[arg(long)]
    config: Option<String>,

    /// Run the pipeline up to the allowance check, never submit
    #[arg(long, default_value_t = false)]
    dry_run: bool,

    /// Run a single tick immediately and exit
    #[arg(long, default_value_t = false)]
    once: bool,

    /// Stats port (overrides config/env; 0 disables)
    #[arg(long)]
    stats_port: Option<u16>,

    /// Log level or directive string (overrides the debug flag)
    #[arg(long)]
    log_level: Option<String>,

    /// Emit logs as JSON lines
    #[arg(long, default_value_t = false)]
    log_json: bool,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let cli = Cli::parse();

    let settings = Settings::load_with_path(cli.config.as_deref())?;
    let base_level = cli
        .log_level
        .clone()
        .unwrap_or_else(|| if settings.debug { "debug" } else { "info" }.to_string());
    setup_logging(&base_level, cli.log_json);

    let db = Database::new(&settings.database_url()).await?;

    let signer = PrivateKeySigner::from_str(&settings.wallet_key)
        .map_err(|e| AppError::Config(format!("Invalid wallet key: {}", e)))?;
    if signer.address() != settings.wallet_address {
        return Err(AppError::Config(format!(
            "wallet_address {} does not match wallet_key address {}",
            settings.wallet_address,
            signer.address()
        )));
    }

    let provider = ConnectionFactory::http(&settings.rpc_url)?;
    let chain_id = ConnectionFactory::verify_chain(&provider, settings.chain_id).await?;
    tracing::info!(
        target: "config",
        chain_id,
        executor = %format!("{:#x}", signer.address()),
        dry_run = cli.dry_run,
        "Keeper starting"
    );

    let gas = GasOracle::new(provider.clone(), settings.max_gas_price_gwei);
    let nonce = NonceManager::new(provider.clone(), signer.address());
    let chain = ChainClient::new(
        provider,
        signer,
        chain_id,
        gas,
        nonce,
        ReceiptPolicy {
            poll: settings.receipt_poll(),
            timeout: settings.receipt_timeout(),
            confirm_blocks: settings.receipt_confirm_blocks,
        },
    );

    let quotes = QuoteClient::new(
        &settings.quote_api_url,
        &settings.quote_api_key,
        settings.http_timeout(),
    )?;

    let registry = Arc::new(TokenRegistry::new(db.clone()));
    let cached = registry.load_cached().await?;
    tracing::info!(target: "registry", tokens = cached, "Token cache loaded from store");
    // First refresh is best effort: the persisted cache (or the permissive
    // policy) carries a cold start through an aggregator outage.
    if let Err(e) = registry.refresh(&quotes).await {
        tracing::warn!(target: "registry", error = %e, "Initial token refresh failed");
    }

    let orders = OrderService::new(
        db.clone(),
        registry.clone(),
        quotes.clone(),
        chain.clone(),
        settings.allow_unknown_tokens,
    );
    let expander = RecurringExpander::new(db.clone());
    let pipeline = SwapPipeline::new(
        db.clone(),
        registry.clone(),
        quotes.clone(),
        chain,
        orders,
        cli.dry_run,
    );
    let stats = Arc::new(SchedulerStats::default());
    let scheduler = Scheduler::new(db, expander, pipeline, stats.clone());

    if cli.once {
        scheduler.tick(chrono::Utc::now().naive_utc()).await;
        tracing::info!(target: "scheduler", stats = %stats.snapshot(), "Single tick done");
        return Ok(());
    }

    let stats_port = cli.stats_port.unwrap_or(settings.stats_port);
    if stats_port != 0 {
        spawn_stats_server(stats_port, stats.clone()).await;
    }

    let shutdown = CancellationToken::new();
    {
        let shutdown = shutdown.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                tracing::info!(target: "scheduler", "Shutdown signal received");
                shutdown.cancel();
            }
        });
    }

    let scheduler_task = {
        let shutdown = shutdown.clone();
        let period = settings.tick_interval();
        tokio::spawn(async move { scheduler.run(period, shutdown).await })
    };
    let refresh_task = {
        let registry = registry.clone();
        let shutdown = shutdown.clone();
        let interval = settings.token_refresh_interval();
        tokio::spawn(async move { registry.run_refresh_loop(quotes, interval, shutdown).await })
    };

    try_join_all([scheduler_task, refresh_task])
        .await
        .map_err(|e| AppError::Initialization(format!("Task join failed: {e}")))?;
    Ok(())
}
