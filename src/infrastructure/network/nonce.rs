// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use crate::common::error::AppError;
use crate::common::retry::retry_async;
use crate::infrastructure::network::provider::HttpProvider;
use alloy::primitives::Address;
use alloy::providers::Provider;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Mutex;

/// Serializes nonce assignment for the keeper wallet. Orders execute one at
/// a time, so a single cached counter is enough; `resync` drops the cache
/// after a rejected submission and the next call re-reads the chain.
#[derive(Clone)]
pub struct NonceManager {
    provider: HttpProvider,
    address: Address,
    cache: Arc<Mutex<Option<u64>>>,
}

impl NonceManager {
    pub fn new(provider: HttpProvider, address: Address) -> Self {
        Self {
            provider,
            address,
            cache: Arc::new(Mutex::new(None)),
        }
    }

    /// Next nonce to sign with. Reads the pending count on a cold cache.
    pub async fn next_nonce(&self) -> Result<u64, AppError> {
        let mut cache = self.cache.lock().await;
        if let Some(nonce) = *cache {
            return Ok(nonce);
        }
        let fetched = self.fetch_pending().await?;
        *cache = Some(fetched);
        Ok(fetched)
    }

    /// Record that `used` was accepted by the node.
    pub async fn advance(&self, used: u64) {
        *self.cache.lock().await = Some(used + 1);
    }

    /// Drop the cache. The node's view may have diverged from ours after a
    /// rejected submission.
    pub async fn resync(&self) {
        tracing::debug!(target: "chain", "Nonce cache dropped, will re-read on next use");
        *self.cache.lock().await = None;
    }

    async fn fetch_pending(&self) -> Result<u64, AppError> {
        let provider = self.provider.clone();
        let address = self.address;
        retry_async(
            move |_| {
                let provider = provider.clone();
                async move { provider.get_transaction_count(address).pending().await }
            },
            3,
            Duration::from_millis(100),
        )
        .await
        .map_err(|e| AppError::Connection(format!("Failed to fetch nonce: {}", e)))
    }
}
