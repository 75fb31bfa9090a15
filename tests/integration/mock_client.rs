//! Mock venues for integration testing.
//!
//! `MockClient` is a deterministic `SwapClient` that settles every leg at a
//! fixed output ratio unless told to fail specific calls. `FixedQuoteApi`
//! and `StalledLedger` stand in for Jupiter and the RPC node underneath a
//! real `SwapExecutor`.

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use serde_json::json;
use solana_sdk::message::{Message, VersionedMessage};
use solana_sdk::pubkey::Pubkey;
use solana_sdk::signature::Signature;
use solana_sdk::transaction::VersionedTransaction;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use tokio::time::Instant;

use pingpong::engine::{EventLog, SwapClient};
use pingpong::platforms::{Ledger, SwapApi, TxStatus};
use pingpong::types::{Confirmation, LegInfo, QuoteResult, SwapOutcome, SwapRequest};

/// One recorded `execute` call.
#[derive(Debug, Clone)]
pub struct Call {
    pub request: SwapRequest,
    pub leg: LegInfo,
    pub at: Instant,
}

/// A deterministic swap client for scenario tests.
#[derive(Clone)]
pub struct MockClient {
    ratio: f64,
    /// 1-based call numbers that fail.
    fail_calls: Arc<HashSet<usize>>,
    calls: Arc<Mutex<Vec<Call>>>,
}

impl MockClient {
    pub fn new() -> Self {
        Self {
            ratio: 0.98,
            fail_calls: Arc::new(HashSet::new()),
            calls: Arc::new(Mutex::new(Vec::new())),
        }
    }

    /// Fail the given call numbers (1-based).
    pub fn failing_on(calls: &[usize]) -> Self {
        Self {
            fail_calls: Arc::new(calls.iter().copied().collect()),
            ..Self::new()
        }
    }

    pub fn ratio(&self) -> f64 {
        self.ratio
    }

    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl SwapClient for MockClient {
    async fn execute(&self, request: &SwapRequest, leg: LegInfo, events: &EventLog) -> SwapOutcome {
        let n = {
            let mut calls = self.calls.lock().unwrap();
            calls.push(Call {
                request: request.clone(),
                leg,
                at: Instant::now(),
            });
            calls.len()
        };

        if self.fail_calls.contains(&n) {
            events.error(format!("Swap failed: scripted failure on call {n}"));
            return SwapOutcome::Failed;
        }

        let txid = format!("mocktx{n}");
        let output_ui = leg.amount_ui * self.ratio;
        events.success("Transaction sent", &txid);
        events.settled(format!("Confirmed: received {output_ui:.6}"), &txid);
        SwapOutcome::Settled {
            output_ui,
            txid,
            confirmation: Confirmation::Confirmed,
        }
    }
}

// ---------------------------------------------------------------------------
// Venue stubs
// ---------------------------------------------------------------------------

/// Quote API that always returns the same route and an unsigned transaction
/// paying from `payer`.
pub struct FixedQuoteApi {
    pub out_amount_base: u64,
    pub payer: Pubkey,
}

#[async_trait]
impl SwapApi for FixedQuoteApi {
    async fn quote(&self, _request: &SwapRequest) -> Result<QuoteResult> {
        Ok(QuoteResult {
            route: json!({ "outAmount": self.out_amount_base.to_string() }),
            out_amount_base: self.out_amount_base,
        })
    }

    async fn build(&self, _quote: &QuoteResult, user: &str, _fee: u64) -> Result<String> {
        if user != self.payer.to_string() {
            return Err(anyhow!("unexpected user {user}"));
        }
        let tx = VersionedTransaction {
            signatures: vec![Signature::default()],
            message: VersionedMessage::Legacy(Message::new(&[], Some(&self.payer))),
        };
        Ok(BASE64.encode(bincode::serialize(&tx)?))
    }
}

/// Accepts every submission; confirmation never resolves.
pub struct StalledLedger {
    pub submitted: Arc<Mutex<u32>>,
}

#[async_trait]
impl Ledger for StalledLedger {
    async fn submit(&self, _tx: &VersionedTransaction) -> Result<Signature> {
        *self.submitted.lock().unwrap() += 1;
        Ok(Signature::from([7u8; 64]))
    }

    async fn confirm(&self, _signature: &Signature) -> Result<TxStatus> {
        std::future::pending().await
    }
}
