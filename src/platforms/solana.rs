//! Solana RPC submission and confirmation.
//!
//! Submission skips preflight simulation (legs are time-sensitive) and lets
//! the RPC node rebroadcast a couple of times. Confirmation polls the
//! signature status until it shows up at the configured commitment.

use anyhow::{Context, Result};
use async_trait::async_trait;
use solana_client::nonblocking::rpc_client::RpcClient;
use solana_client::rpc_config::RpcSendTransactionConfig;
use solana_sdk::commitment_config::CommitmentConfig;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use std::time::Duration;
use tracing::debug;

use super::{Ledger, TxStatus};

/// Rebroadcast attempts the RPC node makes on our behalf.
const SUBMIT_MAX_RETRIES: usize = 2;

/// Delay between signature status polls.
const POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Ledger backed by a JSON-RPC endpoint.
pub struct SolanaLedger {
    rpc: RpcClient,
    commitment: CommitmentConfig,
}

impl SolanaLedger {
    /// Connect to `rpc_url` at `confirmed` commitment.
    pub fn new(rpc_url: &str) -> Self {
        let commitment = CommitmentConfig::confirmed();
        Self {
            rpc: RpcClient::new_with_commitment(rpc_url.to_string(), commitment),
            commitment,
        }
    }

    fn send_config() -> RpcSendTransactionConfig {
        RpcSendTransactionConfig {
            skip_preflight: true,
            max_retries: Some(SUBMIT_MAX_RETRIES),
            ..RpcSendTransactionConfig::default()
        }
    }
}

#[async_trait]
impl Ledger for SolanaLedger {
    async fn submit(&self, tx: &VersionedTransaction) -> Result<Signature> {
        let sig = self
            .rpc
            .send_transaction_with_config(tx, Self::send_config())
            .await
            .context("send_transaction_with_config")?;
        debug!(signature = %sig, "Transaction submitted");
        Ok(sig)
    }

    async fn confirm(&self, signature: &Signature) -> Result<TxStatus> {
        loop {
            let status = self
                .rpc
                .get_signature_status_with_commitment(signature, self.commitment)
                .await
                .context("get_signature_status_with_commitment")?;

            match status {
                Some(Ok(())) => return Ok(TxStatus::Confirmed),
                Some(Err(err)) => return Ok(TxStatus::Failed(err.to_string())),
                None => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }
    }
}
