// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@on1.no>

use crate::common::error::AppError;
use alloy::primitives::{Address, Bytes, U256};
use reqwest::Client;
use serde::{Deserialize, Deserializer};
use std::time::Duration;
use url::Url;

/// Client for the swap aggregator HTTP API. Two endpoints matter: `/v1/swap`
/// returns a routed quote with ready-to-send calldata, `/v1/tokens` returns
/// the tradeable token universe.
#[derive(Clone)]
pub struct QuoteClient {
    http: Client,
    base_url: String,
    api_key: String,
}

impl QuoteClient {
    pub fn new(base_url: &str, api_key: &str, timeout: Duration) -> Result<Self, AppError> {
        Url::parse(base_url)
            .map_err(|e| AppError::Config(format!("Invalid quote API URL: {}", e)))?;
        let http = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| AppError::Initialization(format!("HTTP client build failed: {}", e)))?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
        })
    }

    /// Fetch a routed swap quote. `amount` is in base units of `token_in`
    /// and `to` receives the output tokens.
    pub async fn swap_quote(
        &self,
        token_in: &str,
        token_out: &str,
        amount: U256,
        to: Address,
        slippage: f64,
    ) -> Result<SwapQuote, AppError> {
        let url = format!("{}/v1/swap", self.base_url);
        let resp = self
            .http
            .get(&url)
            .query(&[
                ("tokenIn", token_in.to_string()),
                ("tokenOut", token_out.to_string()),
                ("amount", amount.to_string()),
                ("to", format!("{to:#x}")),
                ("slippage", slippage.to_string()),
            ])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Connection(format!("Quote request failed: {}", e)))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::ApiCall {
                provider: "swap quote".into(),
                status,
                message: snippet(&body),
            });
        }

        let quote: SwapQuote = resp.json().await.map_err(|e| AppError::ApiCall {
            provider: "swap quote".into(),
            status,
            message: format!("decode failed: {e}"),
        })?;

        tracing::debug!(
            target: "quote",
            token_in,
            token_out,
            amount = %amount,
            amount_out = %quote.assumed_amount_out,
            hops = quote.route.len(),
            "Quote received"
        );
        Ok(quote)
    }

    /// Fetch the aggregator's token universe.
    pub async fn token_list(&self) -> Result<Vec<TokenMetadata>, AppError> {
        let url = format!("{}/v1/tokens", self.base_url);
        let resp = self
            .http
            .get(&url)
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| AppError::Connection(format!("Token list request failed: {}", e)))?;

        let status = resp.status().as_u16();
        if !resp.status().is_success() {
            let body = resp.text().await.unwrap_or_default();
            return Err(AppError::ApiCall {
                provider: "token list".into(),
                status,
                message: snippet(&body),
            });
        }

        resp.json().await.map_err(|e| AppError::ApiCall {
            provider: "token list".into(),
            status,
            message: format!("decode failed: {e}"),
        })
    }
}

fn snippet(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.len() <= 200 {
        trimmed.to_string()
    } else {
        let mut end = 200;
        while !trimmed.is_char_boundary(end) {
            end -= 1;
        }
        trimmed[..end].to_string()
    }
}

// ============================================================================
// Wire types
// ============================================================================

// The aggregator omits or nulls most fields when routing fails, so every
// field beyond the transaction payload carries a lenient default.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SwapQuote {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub router_addr: Option<String>,
    #[serde(default)]
    pub block_number: Option<i64>,
    #[serde(default, deserialize_with = "lenient_number")]
    pub gas_price: Option<String>,
    #[serde(default)]
    pub price_impact: Option<f64>,
    #[serde(default = "zero")]
    pub amount_in: String,
    #[serde(default = "zero")]
    pub assumed_amount_out: String,
    #[serde(default)]
    pub route: Vec<RouteHop>,
    #[serde(default)]
    pub router_params: RouterParams,
    #[serde(default)]
    pub tx: Option<QuoteTransaction>,
}

impl SwapQuote {
    /// Contract the input token must approve. Falls back to the transaction
    /// target, which is the router being called.
    pub fn spender(&self) -> Option<Address> {
        self.router_addr
            .as_deref()
            .and_then(|a| a.parse().ok())
            .or_else(|| self.tx.as_ref().and_then(|t| t.to.parse().ok()))
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct QuoteTransaction {
    pub to: String,
    pub data: String,
    #[serde(default = "zero")]
    pub value: String,
}

impl QuoteTransaction {
    pub fn target(&self) -> Result<Address, AppError> {
        self.to
            .parse()
            .map_err(|_| AppError::InvalidAddress(self.to.clone()))
    }

    pub fn input(&self) -> Result<Bytes, AppError> {
        self.data
            .parse()
            .map_err(|e| AppError::Validation {
                field: "tx.data".into(),
                message: format!("not valid calldata hex: {e}"),
            })
    }

    /// Native value to attach. Decimal and 0x-prefixed forms both occur.
    pub fn amount(&self) -> Result<U256, AppError> {
        self.value.parse().map_err(|e| AppError::Validation {
            field: "tx.value".into(),
            message: format!("not a valid amount: {e}"),
        })
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouterParams {
    #[serde(default)]
    pub path_definition: Option<String>,
    #[serde(default)]
    pub referral_code: Option<i64>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RouteHop {
    #[serde(default)]
    pub pool_name: String,
    #[serde(default)]
    pub liquidity_source: String,
    #[serde(default)]
    pub share: f64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct TokenMetadata {
    pub address: String,
    #[serde(default)]
    pub name: Option<String>,
    pub symbol: String,
    pub decimals: u8,
    #[serde(default, rename = "tokenURI")]
    pub token_uri: Option<String>,
}

fn zero() -> String {
    "0".to_string()
}

fn lenient_number<'de, D>(de: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Numberish {
        Int(u64),
        Float(f64),
        Text(String),
    }
    Ok(match Option::<Numberish>::deserialize(de)? {
        None => None,
        Some(Numberish::Int(v)) => Some(v.to_string()),
        Some(Numberish::Float(v)) => Some(v.to_string()),
        Some(Numberish::Text(v)) => Some(v),
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn full_payload_decodes() {
        let raw = r#"{
            "status": "Success",
            "blockNumber": 12345678,
            "gasPrice": 7,
            "price": 0.99,
            "priceImpact": 0.0012,
            "amountIn": "1000000000000000000",
            "amountOutFee": "500",
            "assumedAmountOut": "995000000",
            "routerAddr": "0xfd88ad4849ba0f729d6ff4bc27ff948ab1ac3de7",
            "routerParams": {
                "pathDefinition": "0x0102abcd",
                "executor": "0x0000000000000000000000000000000000000001",
                "referralCode": 0
            },
            "route": [
                {"poolName": "WBERA/HONEY", "liquiditySource": "Kodiak", "share": 1.0,
                 "poolFee": 0.003, "tokenFrom": 0, "tokenTo": 1}
            ],
            "tx": {
                "to": "0xfd88ad4849ba0f729d6ff4bc27ff948ab1ac3de7",
                "from": "0x0000000000000000000000000000000000000002",
                "data": "0xdeadbeef",
                "value": "1000000000000000000"
            }
        }"#;

        let quote: SwapQuote = serde_json::from_str(raw).unwrap();
        assert_eq!(quote.block_number, Some(12_345_678));
        assert_eq!(quote.gas_price.as_deref(), Some("7"));
        assert_eq!(quote.amount_in, "1000000000000000000");
        assert_eq!(quote.router_params.path_definition.as_deref(), Some("0x0102abcd"));
        assert_eq!(quote.route.len(), 1);

        let tx = quote.tx.as_ref().unwrap();
        assert_eq!(tx.amount().unwrap(), U256::from(10).pow(U256::from(18)));
        assert_eq!(tx.input().unwrap().len(), 4);
        assert!(quote.spender().is_some());
    }

    #[test]
    fn sparse_payload_gets_defaults() {
        let quote: SwapQuote = serde_json::from_str(r#"{"status": "NoRouteFound"}"#).unwrap();
        assert_eq!(quote.amount_in, "0");
        assert_eq!(quote.assumed_amount_out, "0");
        assert!(quote.route.is_empty());
        assert!(quote.router_params.path_definition.is_none());
        assert!(quote.tx.is_none());
        assert!(quote.spender().is_none());
    }

    #[test]
    fn spender_falls_back_to_the_transaction_target() {
        let raw = r#"{
            "tx": {"to": "0x00000000000000000000000000000000000000aa", "data": "0x"}
        }"#;
        let quote: SwapQuote = serde_json::from_str(raw).unwrap();
        assert_eq!(
            quote.spender().unwrap(),
            "0x00000000000000000000000000000000000000aa".parse::<Address>().unwrap()
        );
    }

    #[test]
    fn gas_price_accepts_strings_and_floats() {
        let as_text: SwapQuote = serde_json::from_str(r#"{"gasPrice": "12000000000"}"#).unwrap();
        assert_eq!(as_text.gas_price.as_deref(), Some("12000000000"));

        let as_float: SwapQuote = serde_json::from_str(r#"{"gasPrice": 1.5}"#).unwrap();
        assert_eq!(as_float.gas_price.as_deref(), Some("1.5"));
    }

    #[test]
    fn transaction_value_defaults_to_zero_and_parses_hex() {
        let tx: QuoteTransaction =
            serde_json::from_str(r#"{"to": "0x00000000000000000000000000000000000000aa", "data": "0x"}"#)
                .unwrap();
        assert_eq!(tx.amount().unwrap(), U256::ZERO);

        let hex: QuoteTransaction = serde_json::from_str(
            r#"{"to": "0x00000000000000000000000000000000000000aa", "data": "0x", "value": "0xde"}"#,
        )
        .unwrap();
        assert_eq!(hex.amount().unwrap(), U256::from(222));
    }

    #[test]
    fn token_metadata_uses_the_api_casing() {
        let raw = r#"{
            "address": "0x6969696969696969696969696969696969696969",
            "name": "Wrapped Bera",
            "symbol": "WBERA",
            "decimals": 18,
            "tokenURI": "https://example.org/wbera.png"
        }"#;
        let token: TokenMetadata = serde_json::from_str(raw).unwrap();
        assert_eq!(token.symbol, "WBERA");
        assert_eq!(token.token_uri.as_deref(), Some("https://example.org/wbera.png"));
    }

    #[test]
    fn bad_calldata_is_rejected() {
        let tx = QuoteTransaction {
            to: "0x00000000000000000000000000000000000000aa".into(),
            data: "not-hex".into(),
            value: zero(),
        };
        assert!(tx.input().is_err());
    }
}
