// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::domain::error::AppError;
use alloy::primitives::Address;
use config::{Config, Environment, File};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use url::Url;

#[derive(Debug, Deserialize, Clone)]
pub struct Settings {
    // General
    #[serde(default = "default_debug")]
    pub debug: bool,
    /// 0 means auto-detect from the RPC endpoint at startup.
    #[serde(default = "default_chain_id")]
    pub chain_id: u64,
    pub database_url: Option<String>,

    // Identity
    pub wallet_key: String,
    pub wallet_address: Address,

    // Endpoints
    pub rpc_url: String,
    #[serde(default = "default_quote_api_url")]
    pub quote_api_url: String,
    pub quote_api_key: String,

    // Scheduling
    #[serde(default = "default_tick_interval_secs")]
    pub tick_interval_secs: u64,
    #[serde(default = "default_token_refresh_interval_secs")]
    pub token_refresh_interval_secs: u64,

    // Token validity policy: how an Unknown registry answer is resolved.
    #[serde(default = "default_true")]
    pub allow_unknown_tokens: bool,

    // Transaction
    #[serde(default = "default_max_gas")]
    pub max_gas_price_gwei: u64,
    #[serde(default = "default_receipt_poll_ms")]
    pub receipt_poll_ms: u64,
    #[serde(default = "default_receipt_timeout_ms")]
    pub receipt_timeout_ms: u64,
    #[serde(default = "default_receipt_confirm_blocks")]
    pub receipt_confirm_blocks: u64,

    // HTTP
    #[serde(default = "default_http_timeout_secs")]
    pub http_timeout_secs: u64,

    // Observability; 0 disables the listener.
    #[serde(default = "default_stats_port")]
    pub stats_port: u16,
}

// Defaults
fn default_debug() -> bool {
    false
}
fn default_chain_id() -> u64 {
    0
}
fn default_true() -> bool {
    true
}
fn default_quote_api_url() -> String {
    "https://mainnet.api.oogabooga.io".to_string()
}
fn default_tick_interval_secs() -> u64 {
    60
}
fn default_token_refresh_interval_secs() -> u64 {
    86_400
}
fn default_max_gas() -> u64 {
    500
}
fn default_receipt_poll_ms() -> u64 {
    1_500
}
fn default_receipt_timeout_ms() -> u64 {
    120_000
}
fn default_receipt_confirm_blocks() -> u64 {
    1
}
fn default_http_timeout_secs() -> u64 {
    10
}
fn default_stats_port() -> u16 {
    9_464
}

impl Settings {
    pub fn load_with_path(path: Option<&str>) -> Result<Self, AppError> {
        // Load .env file if it exists
        dotenvy::dotenv().ok();

        let mut builder = Config::builder();
        if let Some(selected_path) = path {
            builder = builder.add_source(File::from(Path::new(selected_path)).required(true));
        } else {
            builder = builder.add_source(File::with_name("config").required(false));
        }
        // Deterministic precedence: CLI (in main) > env/.env > config file.
        builder = builder.add_source(Environment::default());

        let settings: Settings = builder.build()?.try_deserialize()?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn load() -> Result<Self, AppError> {
        Self::load_with_path(None)
    }

    fn validate(&self) -> Result<(), AppError> {
        if self.wallet_key.trim().is_empty() {
            return Err(AppError::Config("WALLET_KEY is missing".to_string()));
        }
        Url::parse(&self.rpc_url)
            .map_err(|e| AppError::Config(format!("RPC_URL '{}' is invalid: {e}", self.rpc_url)))?;
        Url::parse(&self.quote_api_url).map_err(|e| {
            AppError::Config(format!(
                "QUOTE_API_URL '{}' is invalid: {e}",
                self.quote_api_url
            ))
        })?;
        if self.quote_api_key.trim().is_empty() {
            return Err(AppError::Config("QUOTE_API_KEY is missing".to_string()));
        }
        if self.tick_interval_secs == 0 {
            return Err(AppError::Config(
                "TICK_INTERVAL_SECS must be at least 1".to_string(),
            ));
        }
        if self.receipt_timeout_ms < self.receipt_poll_ms {
            return Err(AppError::Config(
                "RECEIPT_TIMEOUT_MS must not be below RECEIPT_POLL_MS".to_string(),
            ));
        }
        Ok(())
    }

    pub fn database_url(&self) -> String {
        self.database_url
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
            .unwrap_or_else(|| "sqlite:swap_keeper.db".to_string())
    }

    pub fn tick_interval(&self) -> Duration {
        Duration::from_secs(self.tick_interval_secs)
    }

    pub fn token_refresh_interval(&self) -> Duration {
        Duration::from_secs(self.token_refresh_interval_secs)
    }

    pub fn receipt_poll(&self) -> Duration {
        Duration::from_millis(self.receipt_poll_ms)
    }

    pub fn receipt_timeout(&self) -> Duration {
        Duration::from_millis(self.receipt_timeout_ms)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }
}
