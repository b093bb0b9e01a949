// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use crate::infrastructure::data::schema::{NewOrder, Order, OrderPatch, TokenRow};
use alloy::primitives::keccak256;
use chrono::NaiveDateTime;
use sqlx::{
    Pool, Sqlite,
    sqlite::{SqliteConnectOptions, SqlitePoolOptions},
};
use std::str::FromStr;
use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Clone)]
pub struct Database {
    pool: Pool<Sqlite>,
}

impl Database {
    pub async fn new(database_url: &str) -> Result<Self, AppError> {
        let options = SqliteConnectOptions::from_str(database_url)
            .map_err(|e| AppError::Initialization(format!("DB Connect failed: {}", e)))?
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(5)
            .connect_with(options)
            .await
            .map_err(|e| AppError::Initialization(format!("DB Connect failed: {}", e)))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| AppError::Initialization(format!("DB Migration failed: {}", e)))?;

        Ok(Self { pool })
    }

    pub async fn insert_order(&self, new_order: &NewOrder) -> Result<Order, AppError> {
        let id = generate_order_id(new_order);
        sqlx::query(
            r#"
            INSERT INTO orders (
                id, token_in, token_out, amount, slippage,
                token_in_decimals, token_out_decimals,
                is_recurring, interval_seconds, number_of_trades,
                next_execution_time, is_automatic, parent_order_id
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(&id)
        .bind(&new_order.token_in)
        .bind(&new_order.token_out)
        .bind(&new_order.amount)
        .bind(new_order.slippage)
        .bind(new_order.token_in_decimals)
        .bind(new_order.token_out_decimals)
        .bind(new_order.is_recurring)
        .bind(new_order.interval_seconds)
        .bind(new_order.number_of_trades)
        .bind(new_order.next_execution_time)
        .bind(new_order.is_automatic)
        .bind(&new_order.parent_order_id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Order insert failed: {}", e)))?;

        self.require_order(&id).await
    }

    pub async fn all_orders(&self) -> Result<Vec<Order>, AppError> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders ORDER BY created_at DESC, id DESC")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Order list failed: {}", e)))
    }

    /// Direct work-list half of a tick: incomplete orders that are not
    /// recurring templates (children included).
    pub async fn incomplete_oneshot_orders(&self) -> Result<Vec<Order>, AppError> {
        sqlx::query_as::<_, Order>(
            "SELECT * FROM orders WHERE is_completed = 0 AND is_recurring = 0 ORDER BY created_at ASC, id ASC",
        )
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Incomplete order scan failed: {}", e)))
    }

    pub async fn order_by_id(&self, id: &str) -> Result<Option<Order>, AppError> {
        sqlx::query_as::<_, Order>("SELECT * FROM orders WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Order load failed: {}", e)))
    }

    pub async fn require_order(&self, id: &str) -> Result<Order, AppError> {
        self.order_by_id(id).await?.ok_or(AppError::NotFound {
            what: "order",
            key: id.to_string(),
        })
    }

    /// Partial update; `None` patch fields leave their columns untouched.
    pub async fn update_order(&self, id: &str, patch: &OrderPatch) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET token_in_decimals = COALESCE(?, token_in_decimals),
                token_out_decimals = COALESCE(?, token_out_decimals),
                router_address = COALESCE(?, router_address),
                gas_price = COALESCE(?, gas_price),
                block_number = COALESCE(?, block_number),
                price_impact = COALESCE(?, price_impact),
                amount_out = COALESCE(?, amount_out),
                amount_out_min = COALESCE(?, amount_out_min),
                path_definition = COALESCE(?, path_definition),
                referral_code = COALESCE(?, referral_code),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(patch.token_in_decimals)
        .bind(patch.token_out_decimals)
        .bind(&patch.router_address)
        .bind(&patch.gas_price)
        .bind(patch.block_number)
        .bind(patch.price_impact)
        .bind(&patch.amount_out)
        .bind(&patch.amount_out_min)
        .bind(&patch.path_definition)
        .bind(patch.referral_code)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Order update failed: {}", e)))?;
        Ok(())
    }

    pub async fn delete_order(&self, id: &str) -> Result<bool, AppError> {
        let result = sqlx::query("DELETE FROM orders WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Order delete failed: {}", e)))?;
        Ok(result.rows_affected() > 0)
    }

    pub async fn due_recurring_orders(&self, now: NaiveDateTime) -> Result<Vec<Order>, AppError> {
        sqlx::query_as::<_, Order>(
            r#"
            SELECT * FROM orders
            WHERE is_recurring = 1
              AND is_completed = 0
              AND next_execution_time IS NOT NULL
              AND next_execution_time <= ?
            ORDER BY next_execution_time ASC
            "#,
        )
        .bind(now)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Due recurring scan failed: {}", e)))
    }

    /// Terminal write for one-shot orders, soft-cancels and child failure
    /// markers. The hash column takes either a real hash or a lifecycle
    /// marker.
    pub async fn complete_order(&self, id: &str, hash_or_marker: &str) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET is_completed = 1,
                transaction_hash = ?,
                next_execution_time = NULL,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(hash_or_marker)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Order completion write failed: {}", e)))?;
        Ok(())
    }

    /// Expander-side parent mutation: counters and schedule only, never the
    /// completed flag.
    pub async fn advance_recurrence(
        &self,
        id: &str,
        executed_trades: i64,
        next_execution_time: Option<NaiveDateTime>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET executed_trades = ?,
                next_execution_time = ?,
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(executed_trades)
        .bind(next_execution_time)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Recurrence advance failed: {}", e)))?;
        Ok(())
    }

    /// Completion-recording write for recurring orders: one atomic statement
    /// covering counters, schedule, flag and (for the final trade) the hash.
    pub async fn apply_recurring_transition(
        &self,
        id: &str,
        executed_trades: i64,
        next_execution_time: Option<NaiveDateTime>,
        is_completed: bool,
        transaction_hash: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            UPDATE orders
            SET executed_trades = ?,
                next_execution_time = ?,
                is_completed = ?,
                transaction_hash = COALESCE(?, transaction_hash),
                updated_at = CURRENT_TIMESTAMP
            WHERE id = ?
            "#,
        )
        .bind(executed_trades)
        .bind(next_execution_time)
        .bind(is_completed)
        .bind(transaction_hash)
        .bind(id)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Recurring transition write failed: {}", e)))?;
        Ok(())
    }

    pub async fn upsert_token(
        &self,
        address: &str,
        name: Option<&str>,
        symbol: &str,
        decimals: i64,
        token_uri: Option<&str>,
    ) -> Result<(), AppError> {
        sqlx::query(
            r#"
            INSERT INTO tokens (address, name, symbol, decimals, token_uri)
            VALUES (?, ?, ?, ?, ?)
            ON CONFLICT(address) DO UPDATE SET
                name = excluded.name,
                symbol = excluded.symbol,
                decimals = excluded.decimals,
                token_uri = excluded.token_uri,
                updated_at = CURRENT_TIMESTAMP
            "#,
        )
        .bind(address)
        .bind(name)
        .bind(symbol)
        .bind(decimals)
        .bind(token_uri)
        .execute(&self.pool)
        .await
        .map_err(|e| AppError::Database(format!("Token upsert failed: {}", e)))?;
        Ok(())
    }

    pub async fn all_tokens(&self) -> Result<Vec<TokenRow>, AppError> {
        sqlx::query_as::<_, TokenRow>("SELECT * FROM tokens")
            .fetch_all(&self.pool)
            .await
            .map_err(|e| AppError::Database(format!("Token list failed: {}", e)))
    }
}

/// Ids are opaque 32-hex-char tokens; hash over the intent plus a process
/// counter keeps them unique without an id-generation dependency.
fn generate_order_id(new_order: &NewOrder) -> String {
    static SALT: AtomicU64 = AtomicU64::new(0);
    let salt = SALT.fetch_add(1, Ordering::Relaxed);
    let now_ns = chrono::Utc::now().timestamp_nanos_opt().unwrap_or_default();
    let digest = keccak256(
        format!(
            "{}|{}|{}|{}|{}",
            new_order.token_in, new_order.token_out, new_order.amount, now_ns, salt
        )
        .as_bytes(),
    );
    format!("{digest:x}")[..32].to_string()
}
