// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::domain::error::AppError;
use alloy::network::Ethereum;
use alloy::providers::{Provider, RootProvider};
use url::Url;

pub type HttpProvider = RootProvider<Ethereum>;

pub struct ConnectionFactory;

impl ConnectionFactory {
    pub fn http(rpc_url: &str) -> Result<HttpProvider, AppError> {
        let url =
            Url::parse(rpc_url).map_err(|e| AppError::Config(format!("Invalid RPC URL: {}", e)))?;

        let provider = RootProvider::new_http(url);
        Ok(provider)
    }

    /// Verify the endpoint serves the configured chain. A configured id of 0
    /// adopts whatever the node reports.
    pub async fn verify_chain(provider: &HttpProvider, configured: u64) -> Result<u64, AppError> {
        let detected = provider
            .get_chain_id()
            .await
            .map_err(|e| AppError::Connection(format!("chain_id detect failed: {e}")))?;
        if configured != 0 && configured != detected {
            return Err(AppError::Config(format!(
                "Configured chain_id {configured} does not match RPC chain_id {detected}"
            )));
        }
        Ok(detected)
    }
}
