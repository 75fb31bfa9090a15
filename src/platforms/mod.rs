//! External venue integrations.
//!
//! Defines the two seams a swap leg crosses and provides live
//! implementations for them:
//! - `SwapApi`: route quoting and unsigned transaction building (Jupiter)
//! - `Ledger`: signed transaction submission and status polling (Solana RPC)

pub mod jupiter;
pub mod solana;

use anyhow::Result;
use async_trait::async_trait;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;

#[cfg(test)]
use mockall::automock;

use crate::types::{QuoteResult, SwapRequest};

/// Abstraction over a swap aggregator.
///
/// Implementors quote a route for a request and turn an accepted quote
/// into an unsigned, transport-encoded transaction for the signer.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait SwapApi: Send + Sync {
    /// Quote a route. An error payload from the service is an `Err`.
    async fn quote(&self, request: &SwapRequest) -> Result<QuoteResult>;

    /// Build an unsigned transaction for `quote`, addressed to `user`.
    /// Returns the base64-encoded transaction.
    async fn build(
        &self,
        quote: &QuoteResult,
        user: &str,
        priority_fee_lamports: u64,
    ) -> Result<String>;
}

/// Final status of a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TxStatus {
    Confirmed,
    /// Included but failed during execution.
    Failed(String),
}

/// Abstraction over the ledger's submission endpoint.
#[cfg_attr(test, automock)]
#[async_trait]
pub trait Ledger: Send + Sync {
    /// Broadcast a signed transaction without preflight simulation.
    async fn submit(&self, tx: &VersionedTransaction) -> Result<Signature>;

    /// Wait until `signature` reaches the configured commitment.
    ///
    /// Not bounded by a timeout; callers race it against one.
    async fn confirm(&self, signature: &Signature) -> Result<TxStatus>;
}
