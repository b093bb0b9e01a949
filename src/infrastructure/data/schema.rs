// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::domain::constants;
use chrono::NaiveDateTime;
use sqlx::FromRow;

/// A persisted swap intent, one-shot or recurring. Recurring orders act as
/// templates whose due executions are spawned as one-shot children linked via
/// `parent_order_id`.
#[derive(Debug, Clone, FromRow)]
pub struct Order {
    pub id: String,
    pub token_in: String,
    pub token_out: String,
    pub amount: String,
    pub slippage: f64,
    pub token_in_decimals: Option<i64>,
    pub token_out_decimals: Option<i64>,
    pub is_recurring: bool,
    pub interval_seconds: Option<i64>,
    pub number_of_trades: Option<i64>,
    pub executed_trades: i64,
    pub next_execution_time: Option<NaiveDateTime>,
    pub is_automatic: bool,
    pub is_completed: bool,
    pub parent_order_id: Option<String>,
    pub router_address: Option<String>,
    pub gas_price: Option<String>,
    pub block_number: Option<i64>,
    pub price_impact: Option<f64>,
    pub amount_out: Option<String>,
    pub amount_out_min: Option<String>,
    pub path_definition: Option<String>,
    pub referral_code: Option<i64>,
    pub transaction_hash: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl Order {
    pub fn is_child(&self) -> bool {
        self.parent_order_id.is_some()
    }

    /// Recurrence parameters are usable: positive trade goal and interval.
    /// Orders violating this are skipped by the expander and rejected by
    /// completion recording.
    pub fn recurrence_valid(&self) -> bool {
        self.number_of_trades.unwrap_or(0) > 0 && self.interval_seconds.unwrap_or(0) > 0
    }

    pub fn remaining_trades(&self) -> i64 {
        (self.number_of_trades.unwrap_or(0) - self.executed_trades).max(0)
    }

    /// The stored hash column when it holds a lifecycle marker instead of a
    /// real transaction hash.
    pub fn lifecycle_marker(&self) -> Option<&str> {
        self.transaction_hash
            .as_deref()
            .filter(|v| constants::is_lifecycle_marker(v))
    }
}

/// Insert payload; ids and row timestamps are store-generated.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub token_in: String,
    pub token_out: String,
    pub amount: String,
    pub slippage: f64,
    pub token_in_decimals: Option<i64>,
    pub token_out_decimals: Option<i64>,
    pub is_recurring: bool,
    pub interval_seconds: Option<i64>,
    pub number_of_trades: Option<i64>,
    pub next_execution_time: Option<NaiveDateTime>,
    pub is_automatic: bool,
    pub parent_order_id: Option<String>,
}

impl NewOrder {
    /// One-shot execution instance of a recurring parent. Copies the swap
    /// intent and cached decimals; recurrence fields stay empty.
    pub fn child_of(parent: &Order) -> Self {
        NewOrder {
            token_in: parent.token_in.clone(),
            token_out: parent.token_out.clone(),
            amount: parent.amount.clone(),
            slippage: parent.slippage,
            token_in_decimals: parent.token_in_decimals,
            token_out_decimals: parent.token_out_decimals,
            is_recurring: false,
            interval_seconds: None,
            number_of_trades: None,
            next_execution_time: None,
            is_automatic: parent.is_automatic,
            parent_order_id: Some(parent.id.clone()),
        }
    }
}

/// Partial update applied with COALESCE; `None` leaves the column untouched.
/// Covers the fields the pipeline and build-transaction persist outside the
/// dedicated lifecycle mutations.
#[derive(Debug, Clone, Default)]
pub struct OrderPatch {
    pub token_in_decimals: Option<i64>,
    pub token_out_decimals: Option<i64>,
    pub router_address: Option<String>,
    pub gas_price: Option<String>,
    pub block_number: Option<i64>,
    pub price_impact: Option<f64>,
    pub amount_out: Option<String>,
    pub amount_out_min: Option<String>,
    pub path_definition: Option<String>,
    pub referral_code: Option<i64>,
}

/// Cached token metadata row, fed from the aggregator token list.
#[derive(Debug, Clone, FromRow)]
pub struct TokenRow {
    pub address: String,
    pub name: Option<String>,
    pub symbol: String,
    pub decimals: i64,
    pub token_uri: Option<String>,
    pub updated_at: NaiveDateTime,
}
