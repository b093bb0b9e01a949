// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use alloy::primitives::Address;
use dashmap::DashMap;
use tokio_util::sync::CancellationToken;

use crate::domain::constants::{NATIVE_DECIMALS, NATIVE_TOKEN};
use crate::domain::error::AppError;
use crate::infrastructure::data::db::Database;
use crate::infrastructure::network::quote::QuoteClient;

/// Minimal token metadata used for decimals resolution and logging.
#[derive(Debug, Clone)]
pub struct TokenMeta {
    pub symbol: String,
    pub name: Option<String>,
    pub decimals: u8,
}

/// Answer of a registry lookup. `Unknown` means the registry cannot say
/// either way (list never loaded); resolving it is the caller's decision,
/// driven by the `allow_unknown_tokens` setting.
#[derive(Debug, Clone)]
pub enum TokenValidity {
    Valid(TokenMeta),
    Invalid,
    Unknown,
}

impl TokenValidity {
    pub fn is_valid(&self) -> bool {
        matches!(self, TokenValidity::Valid(_))
    }
}

/// Lowercase `0x…` form used as the canonical stored representation.
pub fn normalize_address(raw: &str) -> Result<String, AppError> {
    let addr = Address::from_str(raw.trim())
        .map_err(|_| AppError::InvalidAddress(raw.trim().to_string()))?;
    Ok(format!("{addr:#x}"))
}

/// In-memory view over the `tokens` table, fed from the aggregator token
/// list. Absence from a warmed list means unsupported; an unwarmed registry
/// answers `Unknown` instead of guessing.
pub struct TokenRegistry {
    db: Database,
    cache: DashMap<String, TokenMeta>,
    warmed: AtomicBool,
}

impl TokenRegistry {
    pub fn new(db: Database) -> Self {
        Self {
            db,
            cache: DashMap::new(),
            warmed: AtomicBool::new(false),
        }
    }

    pub fn check(&self, raw_address: &str) -> TokenValidity {
        let Ok(address) = normalize_address(raw_address) else {
            return TokenValidity::Invalid;
        };
        if is_native(&address) {
            return TokenValidity::Valid(native_meta());
        }
        if let Some(meta) = self.cache.get(&address) {
            return TokenValidity::Valid(meta.clone());
        }
        if self.warmed.load(Ordering::Acquire) {
            TokenValidity::Invalid
        } else {
            TokenValidity::Unknown
        }
    }

    pub fn resolve_decimals(&self, raw_address: &str) -> Option<u8> {
        match self.check(raw_address) {
            TokenValidity::Valid(meta) => Some(meta.decimals),
            _ => None,
        }
    }

    /// Warm the cache from rows persisted by an earlier run. Keeps startup
    /// independent of aggregator availability.
    pub async fn load_cached(&self) -> Result<usize, AppError> {
        let rows = self.db.all_tokens().await?;
        for row in &rows {
            self.cache.insert(
                row.address.clone(),
                TokenMeta {
                    symbol: row.symbol.clone(),
                    name: row.name.clone(),
                    decimals: row.decimals.clamp(0, u8::MAX as i64) as u8,
                },
            );
        }
        if !rows.is_empty() {
            self.warmed.store(true, Ordering::Release);
        }
        Ok(rows.len())
    }

    /// Re-pull the aggregator token list, persist it and swap the cache
    /// contents. Returns the number of tokens ingested.
    pub async fn refresh(&self, quotes: &QuoteClient) -> Result<usize, AppError> {
        let listed = quotes.token_list().await?;
        let mut ingested = 0usize;
        for token in &listed {
            let Ok(address) = normalize_address(&token.address) else {
                tracing::warn!(
                    target: "registry",
                    address = %token.address,
                    "Skipping token with malformed address"
                );
                continue;
            };
            self.db
                .upsert_token(
                    &address,
                    token.name.as_deref(),
                    &token.symbol,
                    token.decimals as i64,
                    token.token_uri.as_deref(),
                )
                .await?;
            self.cache.insert(
                address,
                TokenMeta {
                    symbol: token.symbol.clone(),
                    name: token.name.clone(),
                    decimals: token.decimals,
                },
            );
            ingested += 1;
        }
        if ingested > 0 {
            self.warmed.store(true, Ordering::Release);
        }
        tracing::info!(target: "registry", tokens = ingested, "Token metadata refreshed");
        Ok(ingested)
    }

    /// Periodic metadata refresh; errors are logged and retried on the next
    /// interval.
    pub async fn run_refresh_loop(
        &self,
        quotes: QuoteClient,
        interval: Duration,
        shutdown: CancellationToken,
    ) {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        ticker.tick().await;
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "registry", "Token refresh loop stopped");
                    return;
                }
                _ = ticker.tick() => {
                    if let Err(e) = self.refresh(&quotes).await {
                        tracing::warn!(target: "registry", error = %e, "Token refresh failed");
                    }
                }
            }
        }
    }

    pub fn is_warmed(&self) -> bool {
        self.warmed.load(Ordering::Acquire)
    }
}

fn is_native(normalized: &str) -> bool {
    normalized == format!("{NATIVE_TOKEN:#x}")
}

fn native_meta() -> TokenMeta {
    TokenMeta {
        symbol: "NATIVE".to_string(),
        name: None,
        decimals: NATIVE_DECIMALS,
    }
}
