// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@oxidity.com>

use crate::common::error::AppError;
use crate::common::retry::retry_async;
use crate::domain::constants::{GAS_HEADROOM_BPS, MAX_GAS_LIMIT, NATIVE_TOKEN};
use crate::infrastructure::network::gas::{GasFees, GasOracle};
use crate::infrastructure::network::nonce::NonceManager;
use crate::infrastructure::network::provider::HttpProvider;
use alloy::consensus::{SignableTransaction, TxEip1559, TxEnvelope};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, B256, Bytes, TxKind, U256};
use alloy::providers::Provider;
use alloy::rpc::types::eth::{TransactionInput, TransactionRequest};
use alloy::signers::local::PrivateKeySigner;
use alloy::sol;
use alloy_sol_types::SolCall;
use std::time::{Duration, Instant};

sol! {
    #[sol(rpc)]
    contract Erc20 {
        function allowance(address owner, address spender) external view returns (uint256);
        function approve(address spender, uint256 amount) external returns (bool);
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReceiptStatus {
    Success,
    Reverted,
    TimedOut,
}

#[derive(Debug, Clone)]
pub struct Receipt {
    pub hash: B256,
    pub status: ReceiptStatus,
}

impl Receipt {
    pub fn hash_hex(&self) -> String {
        format!("{:#x}", self.hash)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct ReceiptPolicy {
    pub poll: Duration,
    pub timeout: Duration,
    pub confirm_blocks: u64,
}

/// On-chain side of order execution: allowance reads, approvals and swap
/// submission, all signed locally and sent as raw EIP-1559 transactions.
#[derive(Clone)]
pub struct ChainClient {
    provider: HttpProvider,
    signer: PrivateKeySigner,
    chain_id: u64,
    gas: GasOracle,
    nonce: NonceManager,
    receipts: ReceiptPolicy,
}

impl ChainClient {
    pub fn new(
        provider: HttpProvider,
        signer: PrivateKeySigner,
        chain_id: u64,
        gas: GasOracle,
        nonce: NonceManager,
        receipts: ReceiptPolicy,
    ) -> Self {
        Self {
            provider,
            signer,
            chain_id,
            gas,
            nonce,
            receipts,
        }
    }

    /// Wallet that signs and pays for every order.
    pub fn executor_address(&self) -> Address {
        self.signer.address()
    }

    /// Current allowance granted by the keeper wallet to `spender`. The
    /// native token needs no approval and always reads as unlimited.
    pub async fn read_allowance(&self, token: Address, spender: Address) -> Result<U256, AppError> {
        self.allowance_of(token, self.signer.address(), spender).await
    }

    /// Allowance for an arbitrary owner. Used when preparing transactions on
    /// behalf of a caller wallet instead of the keeper's own.
    pub async fn allowance_of(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> Result<U256, AppError> {
        if token == NATIVE_TOKEN {
            return Ok(U256::MAX);
        }

        let provider = self.provider.clone();
        retry_async(
            move |_| {
                let contract = Erc20::new(token, provider.clone());
                async move { contract.allowance(owner, spender).call().await }
            },
            3,
            Duration::from_millis(100),
        )
        .await
        .map_err(|e| AppError::Connection(format!("Allowance read failed: {}", e)))
    }

    /// Grant `spender` an unlimited allowance on `token`. One approval per
    /// token/router pair covers every later trade.
    pub async fn submit_approval(&self, token: Address, spender: Address) -> Result<Receipt, AppError> {
        let calldata = Erc20::approveCall {
            spender,
            amount: U256::MAX,
        }
        .abi_encode();
        self.send_call(token, calldata.into(), U256::ZERO).await
    }

    /// Submit prepared router calldata and wait for its receipt.
    pub async fn submit_transaction(
        &self,
        to: Address,
        data: Bytes,
        value: U256,
    ) -> Result<Receipt, AppError> {
        self.send_call(to, data, value).await
    }

    async fn send_call(&self, to: Address, input: Bytes, value: U256) -> Result<Receipt, AppError> {
        let fees = self.gas.estimate_eip1559_fees().await?;
        let gas_limit = self.estimate_gas_limit(to, input.clone(), value).await?;
        let nonce = self.nonce.next_nonce().await?;

        let (hash, raw) = self.sign_eip1559(to, input, value, gas_limit, &fees, nonce)?;

        if let Err(e) = self.provider.send_raw_transaction(&raw).await {
            self.nonce.resync().await;
            return Err(AppError::Connection(format!(
                "Transaction submit failed: {}",
                e
            )));
        }
        self.nonce.advance(nonce).await;

        tracing::info!(
            target: "chain",
            hash = %format!("{hash:#x}"),
            nonce,
            gas_limit,
            max_fee = fees.max_fee_per_gas,
            "Transaction submitted"
        );

        let status = self.await_receipt(&hash).await;
        Ok(Receipt { hash, status })
    }

    async fn estimate_gas_limit(
        &self,
        to: Address,
        input: Bytes,
        value: U256,
    ) -> Result<u64, AppError> {
        let req = TransactionRequest {
            from: Some(self.signer.address()),
            to: Some(TxKind::Call(to)),
            value: Some(value),
            input: TransactionInput::new(input),
            ..Default::default()
        };

        let provider = self.provider.clone();
        let estimated = retry_async(
            move |_| {
                let provider = provider.clone();
                let req = req.clone();
                async move { provider.estimate_gas(req).await }
            },
            2,
            Duration::from_millis(100),
        )
        .await
        .map_err(|e| AppError::Connection(format!("Gas estimate failed: {}", e)))?;

        Ok(with_headroom(estimated))
    }

    fn sign_eip1559(
        &self,
        to: Address,
        input: Bytes,
        value: U256,
        gas_limit: u64,
        fees: &GasFees,
        nonce: u64,
    ) -> Result<(B256, Vec<u8>), AppError> {
        let mut tx = TxEip1559 {
            chain_id: self.chain_id,
            nonce,
            max_priority_fee_per_gas: fees.max_priority_fee_per_gas,
            max_fee_per_gas: fees.max_fee_per_gas,
            gas_limit,
            to: TxKind::Call(to),
            value,
            input,
            ..Default::default()
        };

        let sig = TxSignerSync::sign_transaction_sync(&self.signer, &mut tx)
            .map_err(|e| AppError::Initialization(format!("Transaction signing failed: {}", e)))?;
        let signed: TxEnvelope = tx.into_signed(sig).into();
        Ok((*signed.tx_hash(), signed.encoded_2718()))
    }

    async fn await_receipt(&self, hash: &B256) -> ReceiptStatus {
        let started = Instant::now();

        loop {
            if started.elapsed() >= self.receipts.timeout {
                break;
            }

            match self.provider.get_transaction_receipt(*hash).await {
                Ok(Some(rcpt)) => {
                    if !rcpt.status() {
                        return ReceiptStatus::Reverted;
                    }
                    match rcpt.block_number {
                        Some(block) if self.receipts.confirm_blocks > 1 => {
                            if self.head_reached(block).await {
                                return ReceiptStatus::Success;
                            }
                        }
                        _ => return ReceiptStatus::Success,
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    tracing::debug!(
                        target: "chain",
                        error = %e,
                        hash = %format!("{hash:#x}"),
                        "Receipt lookup error; retrying"
                    );
                }
            }

            tokio::time::sleep(self.receipts.poll).await;
        }

        ReceiptStatus::TimedOut
    }

    async fn head_reached(&self, receipt_block: u64) -> bool {
        match self.provider.get_block_number().await {
            Ok(head) => receipt_confirmed(head, receipt_block, self.receipts.confirm_blocks),
            Err(_) => false,
        }
    }
}

fn receipt_confirmed(head: u64, receipt_block: u64, confirm_blocks: u64) -> bool {
    head >= receipt_block.saturating_add(confirm_blocks.max(1) - 1)
}

fn with_headroom(estimated: u64) -> u64 {
    let padded = estimated.saturating_add(estimated.saturating_mul(GAS_HEADROOM_BPS) / 10_000);
    padded.min(MAX_GAS_LIMIT)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::network::provider::ConnectionFactory;

    fn offline_client(receipts: ReceiptPolicy) -> ChainClient {
        let provider = ConnectionFactory::http("http://127.0.0.1:1").unwrap();
        let signer = PrivateKeySigner::random();
        let gas = GasOracle::new(provider.clone(), 500);
        let nonce = NonceManager::new(provider.clone(), signer.address());
        ChainClient::new(provider, signer, 80094, gas, nonce, receipts)
    }

    fn default_policy() -> ReceiptPolicy {
        ReceiptPolicy {
            poll: Duration::from_millis(10),
            timeout: Duration::from_millis(60),
            confirm_blocks: 1,
        }
    }

    #[tokio::test]
    async fn native_token_reads_as_unlimited_allowance_offline() {
        let client = offline_client(default_policy());
        let allowance = client
            .read_allowance(NATIVE_TOKEN, Address::repeat_byte(0xaa))
            .await
            .unwrap();
        assert_eq!(allowance, U256::MAX);
    }

    #[tokio::test]
    async fn receipt_wait_times_out_against_a_dead_endpoint() {
        let client = offline_client(default_policy());
        let status = client.await_receipt(&B256::ZERO).await;
        assert_eq!(status, ReceiptStatus::TimedOut);
    }

    #[test]
    fn signing_is_deterministic_per_nonce() {
        let client = offline_client(default_policy());
        let fees = GasFees {
            max_fee_per_gas: 30_000_000_000,
            max_priority_fee_per_gas: 2_000_000_000,
            next_base_fee_per_gas: 28_000_000_000,
            base_fee_per_gas: 25_000_000_000,
        };
        let to = Address::repeat_byte(0x11);
        let data = Bytes::from_static(&[0xde, 0xad]);

        let (first, raw_first) = client
            .sign_eip1559(to, data.clone(), U256::ZERO, 100_000, &fees, 0)
            .unwrap();
        let (again, raw_again) = client
            .sign_eip1559(to, data.clone(), U256::ZERO, 100_000, &fees, 0)
            .unwrap();
        let (bumped, _) = client
            .sign_eip1559(to, data, U256::ZERO, 100_000, &fees, 1)
            .unwrap();

        assert_eq!(first, again);
        assert_eq!(raw_first, raw_again);
        assert_ne!(first, bumped);
    }

    #[test]
    fn headroom_pads_and_caps() {
        assert_eq!(with_headroom(100_000), 120_000);
        assert_eq!(with_headroom(MAX_GAS_LIMIT), MAX_GAS_LIMIT);
        assert_eq!(with_headroom(0), 0);
    }

    #[test]
    fn confirmation_depth_boundaries() {
        assert!(receipt_confirmed(10, 10, 1));
        assert!(!receipt_confirmed(10, 10, 3));
        assert!(receipt_confirmed(12, 10, 3));
        // Zero depth behaves like one confirmation.
        assert!(receipt_confirmed(10, 10, 0));
    }
}
