// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use std::fmt;
use std::sync::Arc;

use alloy::primitives::{Address, U256};
use chrono::NaiveDateTime;

use crate::common::units::{display_base_units, to_base_units};
use crate::domain::constants::NATIVE_TOKEN;
use crate::domain::error::AppError;
use crate::infrastructure::data::db::Database;
use crate::infrastructure::data::schema::{Order, OrderPatch};
use crate::infrastructure::data::token_registry::TokenRegistry;
use crate::infrastructure::network::chain::{ChainClient, ReceiptStatus};
use crate::infrastructure::network::quote::QuoteClient;
use crate::services::orders::OrderService;

/// Pipeline stages, in execution order. Each gates the next.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Validate,
    Decimals,
    Scale,
    Quote,
    Allowance,
    Approve,
    Submit,
}

#[derive(Debug, Clone)]
pub struct StageFailure {
    pub stage: Stage,
    pub reason: String,
}

impl StageFailure {
    fn new(stage: Stage, reason: impl Into<String>) -> Self {
        Self {
            stage,
            reason: reason.into(),
        }
    }
}

impl fmt::Display for StageFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}: {}", self.stage, self.reason)
    }
}

/// Terminal result of one execution attempt. `Skipped` is the dry-run stop:
/// nothing was submitted and the order is untouched.
#[derive(Debug, Clone)]
pub enum ExecutionOutcome {
    Completed(String),
    Failed(StageFailure),
    Skipped,
}

enum RunResult {
    Submitted(String),
    DryRun,
}

/// Executes one due order end to end: validate, resolve decimals, scale,
/// quote, ensure allowance, submit, record. Failures are values, never
/// panics or escaping errors; the scheduler decides nothing beyond logging.
#[derive(Clone)]
pub struct SwapPipeline {
    db: Database,
    registry: Arc<TokenRegistry>,
    quotes: QuoteClient,
    chain: ChainClient,
    orders: OrderService,
    dry_run: bool,
}

impl SwapPipeline {
    pub fn new(
        db: Database,
        registry: Arc<TokenRegistry>,
        quotes: QuoteClient,
        chain: ChainClient,
        orders: OrderService,
        dry_run: bool,
    ) -> Self {
        Self {
            db,
            registry,
            quotes,
            chain,
            orders,
            dry_run,
        }
    }

    pub async fn execute(&self, order: &Order, now: NaiveDateTime) -> ExecutionOutcome {
        match self.run_stages(order).await {
            Ok(RunResult::Submitted(hash)) => {
                match self.orders.record_completion(&order.id, &hash, now).await {
                    Ok(_) => {}
                    Err(e) => {
                        // The swap is on chain; losing the write must not
                        // turn a success into a reported failure.
                        tracing::error!(
                            target: "pipeline",
                            order_id = %order.id,
                            hash = %hash,
                            error = %e,
                            "Completion write failed after successful swap"
                        );
                    }
                }
                tracing::info!(
                    target: "pipeline",
                    order_id = %order.id,
                    hash = %hash,
                    "Order executed"
                );
                ExecutionOutcome::Completed(hash)
            }
            Ok(RunResult::DryRun) => ExecutionOutcome::Skipped,
            Err(failure) => {
                tracing::warn!(
                    target: "pipeline",
                    order_id = %order.id,
                    failure = %failure,
                    "Order execution failed"
                );
                // Children are consumed either way: the parent's counters
                // advanced at spawn time and must not be blocked by a child
                // that can never succeed. Direct orders retry next tick.
                if order.is_child()
                    && let Err(e) = self
                        .orders
                        .record_child_failure(&order.id, &failure.reason)
                        .await
                {
                    tracing::error!(
                        target: "pipeline",
                        order_id = %order.id,
                        error = %e,
                        "Failed to record child failure marker"
                    );
                }
                ExecutionOutcome::Failed(failure)
            }
        }
    }

    async fn run_stages(&self, order: &Order) -> Result<RunResult, StageFailure> {
        // Validate
        for (field, token) in [("tokenIn", &order.token_in), ("tokenOut", &order.token_out)] {
            self.orders.ensure_tradeable(field, token).map_err(|e| {
                StageFailure::new(Stage::Validate, format!("invalid token: {e}"))
            })?;
        }

        // Decimals
        let decimals = self.resolve_decimals(order).await?;

        // Scale
        let scaled = to_base_units(&order.amount, decimals)
            .map_err(|e| StageFailure::new(Stage::Scale, format!("invalid amount: {e}")))?;
        if scaled.is_zero() {
            return Err(StageFailure::new(Stage::Scale, "amount scales to zero"));
        }

        // Quote
        let recipient = self.chain.executor_address();
        let quote = self
            .quotes
            .swap_quote(
                &order.token_in,
                &order.token_out,
                scaled,
                recipient,
                order.slippage,
            )
            .await
            .map_err(|e| StageFailure::new(Stage::Quote, format!("quote error: {e}")))?;
        let tx = quote
            .tx
            .clone()
            .ok_or_else(|| StageFailure::new(Stage::Quote, "quote contains no transaction"))?;

        // Quote figures are execution-result columns; write them while the
        // order is still in flight so a later failure stays diagnosable.
        if let Err(e) = self
            .db
            .update_order(
                &order.id,
                &OrderPatch {
                    router_address: quote.router_addr.clone(),
                    gas_price: quote.gas_price.clone(),
                    block_number: quote.block_number,
                    price_impact: quote.price_impact,
                    amount_out: Some(quote.amount_in.clone()),
                    amount_out_min: Some(quote.assumed_amount_out.clone()),
                    path_definition: quote.router_params.path_definition.clone(),
                    referral_code: quote.router_params.referral_code,
                    ..OrderPatch::default()
                },
            )
            .await
        {
            tracing::warn!(
                target: "pipeline",
                order_id = %order.id,
                error = %e,
                "Quote field persistence failed, continuing"
            );
        }

        // Allowance (native sentinel never needs one)
        let token_in = parse_token(&order.token_in)
            .map_err(|e| StageFailure::new(Stage::Validate, e.to_string()))?;
        let needs_approval = if token_in == NATIVE_TOKEN {
            false
        } else {
            let spender = quote
                .spender()
                .ok_or_else(|| StageFailure::new(Stage::Allowance, "quote carries no router"))?;
            let allowance = match self.chain.read_allowance(token_in, spender).await {
                Ok(v) => v,
                Err(e) => {
                    // A failed read must not abort the order; zero forces
                    // the approval path, which is always safe.
                    tracing::warn!(
                        target: "pipeline",
                        order_id = %order.id,
                        error = %e,
                        "Allowance read failed, assuming zero"
                    );
                    U256::ZERO
                }
            };
            allowance < scaled
        };

        if self.dry_run {
            tracing::info!(
                target: "pipeline",
                order_id = %order.id,
                to = %tx.to,
                value = %tx.value,
                amount = %display_base_units(scaled, decimals),
                needs_approval,
                "Dry run, stopping before submission"
            );
            return Ok(RunResult::DryRun);
        }

        // Approve
        if needs_approval {
            let spender = quote
                .spender()
                .ok_or_else(|| StageFailure::new(Stage::Approve, "quote carries no router"))?;
            let receipt = self
                .chain
                .submit_approval(token_in, spender)
                .await
                .map_err(|e| StageFailure::new(Stage::Approve, format!("approval error: {e}")))?;
            match receipt.status {
                ReceiptStatus::Success => {
                    tracing::info!(
                        target: "pipeline",
                        order_id = %order.id,
                        token = %order.token_in,
                        spender = %format!("{spender:#x}"),
                        hash = %receipt.hash_hex(),
                        "Router approved"
                    );
                }
                ReceiptStatus::Reverted => {
                    return Err(StageFailure::new(Stage::Approve, "approval reverted"));
                }
                ReceiptStatus::TimedOut => {
                    return Err(StageFailure::new(Stage::Approve, "approval timeout"));
                }
            }
        }

        // Submit
        let to = tx
            .target()
            .map_err(|e| StageFailure::new(Stage::Submit, e.to_string()))?;
        let data = tx
            .input()
            .map_err(|e| StageFailure::new(Stage::Submit, e.to_string()))?;
        let value = tx
            .amount()
            .map_err(|e| StageFailure::new(Stage::Submit, e.to_string()))?;
        let receipt = self
            .chain
            .submit_transaction(to, data, value)
            .await
            .map_err(|e| StageFailure::new(Stage::Submit, format!("submission error: {e}")))?;
        match receipt.status {
            ReceiptStatus::Success => Ok(RunResult::Submitted(receipt.hash_hex())),
            ReceiptStatus::Reverted => Err(StageFailure::new(Stage::Submit, "swap reverted")),
            ReceiptStatus::TimedOut => Err(StageFailure::new(Stage::Submit, "timeout")),
        }
    }

    /// Cached decimals when present; otherwise resolve via the registry and
    /// persist so later cycles skip the lookup.
    async fn resolve_decimals(&self, order: &Order) -> Result<u8, StageFailure> {
        if let Some(d) = order.token_in_decimals {
            return Ok(d.clamp(0, u8::MAX as i64) as u8);
        }
        let resolved = self
            .registry
            .resolve_decimals(&order.token_in)
            .ok_or_else(|| {
                StageFailure::new(
                    Stage::Decimals,
                    format!("decimals unresolved for {}", order.token_in),
                )
            })?;
        let patch = OrderPatch {
            token_in_decimals: Some(resolved as i64),
            token_out_decimals: self
                .registry
                .resolve_decimals(&order.token_out)
                .map(i64::from),
            ..OrderPatch::default()
        };
        if let Err(e) = self.db.update_order(&order.id, &patch).await {
            tracing::warn!(
                target: "pipeline",
                order_id = %order.id,
                error = %e,
                "Decimals cache write failed, continuing"
            );
        }
        Ok(resolved)
    }
}

fn parse_token(address: &str) -> Result<Address, AppError> {
    address
        .parse()
        .map_err(|_| AppError::InvalidAddress(address.to_string()))
}
