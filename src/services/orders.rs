// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use std::sync::Arc;

use alloy::primitives::Address;
use chrono::{Duration, NaiveDateTime};

use crate::common::units::to_base_units;
use crate::domain::constants::{
    CANCELLED_MARKER, DEFAULT_SLIPPAGE_PERCENT, MIN_RECURRING_INTERVAL_SECS, failure_marker,
};
use crate::domain::error::AppError;
use crate::infrastructure::data::db::Database;
use crate::infrastructure::data::schema::{NewOrder, Order, OrderPatch};
use crate::infrastructure::data::token_registry::{TokenRegistry, TokenValidity, normalize_address};
use crate::infrastructure::network::chain::ChainClient;
use crate::infrastructure::network::quote::QuoteClient;

/// Creation payload accepted from callers. Recurrence fields are required
/// when `is_recurring` is set and rejected otherwise.
#[derive(Debug, Clone)]
pub struct CreateOrder {
    pub token_in: String,
    pub token_out: String,
    pub amount: String,
    pub slippage: Option<f64>,
    pub is_recurring: bool,
    pub interval_seconds: Option<i64>,
    pub number_of_trades: Option<i64>,
    pub is_automatic: bool,
}

/// Everything a caller needs to sign and send the swap themselves: the raw
/// transaction material plus whether their wallet still has to approve the
/// router first.
#[derive(Debug, Clone)]
pub struct TransactionPlan {
    pub order_id: String,
    pub to: String,
    pub data: String,
    pub value: String,
    pub router_address: Option<String>,
    pub price_impact: Option<f64>,
    pub amount_in: String,
    pub assumed_amount_out: String,
    pub requires_approval: bool,
}

/// Caller-facing order operations and the completion state machine. The
/// scheduler pipeline drives the same completion recording; everything else
/// here is synchronous request/response semantics.
#[derive(Clone)]
pub struct OrderService {
    db: Database,
    registry: Arc<TokenRegistry>,
    quotes: QuoteClient,
    chain: ChainClient,
    allow_unknown_tokens: bool,
}

impl OrderService {
    pub fn new(
        db: Database,
        registry: Arc<TokenRegistry>,
        quotes: QuoteClient,
        chain: ChainClient,
        allow_unknown_tokens: bool,
    ) -> Self {
        Self {
            db,
            registry,
            quotes,
            chain,
            allow_unknown_tokens,
        }
    }

    /// A token the system is willing to trade: recognized by the registry,
    /// or unrecognized while the permissive policy is on.
    pub fn ensure_tradeable(&self, field: &str, address: &str) -> Result<(), AppError> {
        match self.registry.check(address) {
            TokenValidity::Valid(_) => Ok(()),
            TokenValidity::Invalid => Err(AppError::validation(
                field,
                format!("token {address} is not supported"),
            )),
            TokenValidity::Unknown if self.allow_unknown_tokens => {
                tracing::debug!(
                    target: "orders",
                    token = %address,
                    "Registry cold, accepting token under permissive policy"
                );
                Ok(())
            }
            TokenValidity::Unknown => Err(AppError::validation(
                field,
                format!("token {address} validity unknown and unknown tokens are disallowed"),
            )),
        }
    }

    pub async fn create_order(
        &self,
        req: CreateOrder,
        now: NaiveDateTime,
    ) -> Result<Order, AppError> {
        let token_in = normalize_address(&req.token_in)?;
        let token_out = normalize_address(&req.token_out)?;
        if token_in == token_out {
            return Err(AppError::validation(
                "token_out",
                "tokenIn and tokenOut must differ",
            ));
        }
        self.ensure_tradeable("token_in", &token_in)?;
        self.ensure_tradeable("token_out", &token_out)?;

        let slippage = req.slippage.unwrap_or(DEFAULT_SLIPPAGE_PERCENT);
        if !slippage.is_finite() || slippage < 0.0 {
            return Err(AppError::validation(
                "slippage",
                format!("slippage {slippage} must be a percentage >= 0"),
            ));
        }

        // Decimals are best-effort at creation; the pipeline resolves and
        // persists them later if the registry is still cold here.
        let token_in_decimals = self.registry.resolve_decimals(&token_in).map(i64::from);
        let token_out_decimals = self.registry.resolve_decimals(&token_out).map(i64::from);

        validate_amount(&req.amount, token_in_decimals)?;

        let (interval_seconds, number_of_trades, next_execution_time) = if req.is_recurring {
            let interval = req.interval_seconds.unwrap_or(0);
            if interval < MIN_RECURRING_INTERVAL_SECS {
                return Err(AppError::validation(
                    "interval_seconds",
                    format!("recurring interval must be at least {MIN_RECURRING_INTERVAL_SECS}s"),
                ));
            }
            let trades = req.number_of_trades.unwrap_or(0);
            if trades < 1 {
                return Err(AppError::validation(
                    "number_of_trades",
                    "recurring orders need at least one trade",
                ));
            }
            // First execution one interval after creation.
            (
                Some(interval),
                Some(trades),
                Some(now + Duration::seconds(interval)),
            )
        } else {
            (None, None, None)
        };

        let order = self
            .db
            .insert_order(&NewOrder {
                token_in,
                token_out,
                amount: req.amount.trim().to_string(),
                slippage,
                token_in_decimals,
                token_out_decimals,
                is_recurring: req.is_recurring,
                interval_seconds,
                number_of_trades,
                next_execution_time,
                is_automatic: req.is_automatic,
                parent_order_id: None,
            })
            .await?;

        tracing::info!(
            target: "orders",
            order_id = %order.id,
            token_in = %order.token_in,
            token_out = %order.token_out,
            recurring = order.is_recurring,
            "Order created"
        );
        Ok(order)
    }

    pub async fn list_orders(&self) -> Result<Vec<Order>, AppError> {
        self.db.all_orders().await
    }

    pub async fn list_due_recurring(&self, now: NaiveDateTime) -> Result<Vec<Order>, AppError> {
        self.db.due_recurring_orders(now).await
    }

    pub async fn get_order(&self, id: &str) -> Result<Order, AppError> {
        self.db.require_order(id).await
    }

    /// Cancel an order. One-shot orders are deleted outright; recurring
    /// orders keep their audit trail and are closed with a sentinel marker.
    /// Already-completed orders cannot be cancelled.
    pub async fn cancel_order(&self, id: &str) -> Result<Order, AppError> {
        let order = self.db.require_order(id).await?;
        if order.is_completed {
            return Err(AppError::validation(
                "id",
                format!("order {id} is already completed"),
            ));
        }

        if order.is_recurring {
            self.db.complete_order(id, CANCELLED_MARKER).await?;
            let cancelled = self.db.require_order(id).await?;
            tracing::info!(target: "orders", order_id = %id, "Recurring order soft-cancelled");
            Ok(cancelled)
        } else {
            self.db.delete_order(id).await?;
            tracing::info!(target: "orders", order_id = %id, "Order cancelled and removed");
            Ok(order)
        }
    }

    /// Quote an order for a caller wallet and hand back the unsigned
    /// transaction material. Persists the quote figures on the order but
    /// never touches completion state.
    pub async fn build_unsigned_transaction(
        &self,
        id: &str,
        user_address: Address,
    ) -> Result<TransactionPlan, AppError> {
        let order = self.db.require_order(id).await?;
        if order.is_completed {
            return Err(AppError::validation(
                "id",
                format!("order {id} is already completed"),
            ));
        }

        let decimals = match order.token_in_decimals {
            Some(d) => d as u8,
            None => self
                .registry
                .resolve_decimals(&order.token_in)
                .ok_or_else(|| {
                    AppError::validation(
                        "token_in",
                        format!("decimals unknown for {}", order.token_in),
                    )
                })?,
        };
        let scaled = to_base_units(&order.amount, decimals)?;

        let quote = self
            .quotes
            .swap_quote(
                &order.token_in,
                &order.token_out,
                scaled,
                user_address,
                order.slippage,
            )
            .await?;
        let tx = quote.tx.as_ref().ok_or_else(|| AppError::ApiCall {
            provider: "swap quote".into(),
            status: 200,
            message: format!("no route for order {id}"),
        })?;

        self.db
            .update_order(
                id,
                &OrderPatch {
                    token_in_decimals: Some(decimals as i64),
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
            .await?;

        let requires_approval = match (parse_token(&order.token_in)?, quote.spender()) {
            (token, Some(spender)) => {
                // A failed read defaults to "needs approval" so the caller
                // is never told to skip a required step.
                match self.chain.allowance_of(token, user_address, spender).await {
                    Ok(allowance) => allowance < scaled,
                    Err(e) => {
                        tracing::warn!(
                            target: "orders",
                            order_id = %id,
                            error = %e,
                            "Allowance read failed while planning, assuming zero"
                        );
                        true
                    }
                }
            }
            (_, None) => false,
        };

        Ok(TransactionPlan {
            order_id: order.id,
            to: tx.to.clone(),
            data: tx.data.clone(),
            value: tx.value.clone(),
            router_address: quote.router_addr.clone(),
            price_impact: quote.price_impact,
            amount_in: quote.amount_in.clone(),
            assumed_amount_out: quote.assumed_amount_out.clone(),
            requires_approval,
        })
    }

    /// Completion state machine. Idempotent on already-completed orders;
    /// recurring orders advance their counters and only flip completed once
    /// the trade goal is reached.
    pub async fn record_completion(
        &self,
        id: &str,
        transaction_hash: &str,
        now: NaiveDateTime,
    ) -> Result<Order, AppError> {
        let order = self.db.require_order(id).await?;
        if order.is_completed {
            tracing::debug!(target: "orders", order_id = %id, "Completion already recorded");
            return Ok(order);
        }

        if !order.is_recurring {
            self.db.complete_order(id, transaction_hash).await?;
            return self.db.require_order(id).await;
        }

        // Corrupt recurrence parameters must fail loudly instead of
        // producing counters that can never terminate.
        if !order.recurrence_valid() {
            return Err(AppError::validation(
                "recurrence",
                format!(
                    "order {id} has unusable interval/trade parameters ({:?}s x {:?})",
                    order.interval_seconds, order.number_of_trades
                ),
            ));
        }

        let trades = order.number_of_trades.unwrap_or(0);
        let executed = (order.executed_trades + 1).min(trades);
        if executed >= trades {
            self.db
                .apply_recurring_transition(id, executed, None, true, Some(transaction_hash))
                .await?;
        } else {
            let next = now + Duration::seconds(order.interval_seconds.unwrap_or(0));
            self.db
                .apply_recurring_transition(id, executed, Some(next), false, None)
                .await?;
        }
        self.db.require_order(id).await
    }

    /// Terminal failure for a spawned child: completed with a truncated
    /// failure marker in the hash column so it is never retried and never
    /// mistaken for a successful execution.
    pub async fn record_child_failure(&self, id: &str, reason: &str) -> Result<(), AppError> {
        self.db.complete_order(id, &failure_marker(reason)).await
    }
}

fn parse_token(address: &str) -> Result<Address, AppError> {
    address
        .parse()
        .map_err(|_| AppError::InvalidAddress(address.to_string()))
}

/// Syntactic amount check at creation time. With known decimals the exact
/// base-unit scaling is enforced; without them only shape and positivity.
fn validate_amount(amount: &str, decimals: Option<i64>) -> Result<(), AppError> {
    match decimals {
        Some(d) => {
            let scaled = to_base_units(amount, d.clamp(0, u8::MAX as i64) as u8)?;
            if scaled.is_zero() {
                return Err(AppError::validation("amount", "amount must be positive"));
            }
        }
        None => {
            let parsed: f64 = amount.trim().parse().map_err(|_| {
                AppError::validation("amount", format!("'{amount}' is not a decimal amount"))
            })?;
            if !parsed.is_finite() || parsed <= 0.0 {
                return Err(AppError::validation("amount", "amount must be positive"));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn amount_validation_with_and_without_decimals() {
        assert!(validate_amount("1.5", Some(18)).is_ok());
        assert!(validate_amount("1.5", None).is_ok());
        assert!(validate_amount("0", Some(18)).is_err());
        assert!(validate_amount("0", None).is_err());
        assert!(validate_amount("-2", None).is_err());
        assert!(validate_amount("abc", None).is_err());
        // Excess precision only fails once decimals are known.
        assert!(validate_amount("0.1234567", Some(6)).is_err());
        assert!(validate_amount("0.1234567", None).is_ok());
    }
}
