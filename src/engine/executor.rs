//! Swap executor.
//!
//! Runs one leg through quote → build → sign → submit → confirm and folds
//! every failure into `SwapOutcome::Failed` plus a diagnostic event. The
//! outcome is `Settled` as soon as submission is accepted; what the
//! confirmation step saw is recorded alongside it and logged, but never
//! turns a submitted leg into `Failed`.

use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use solana_sdk::signature::{Keypair, Signature, Signer};
use solana_sdk::transaction::VersionedTransaction;
use std::time::Duration;
use tracing::{debug, warn};

use crate::engine::events::EventLog;
use crate::platforms::{Ledger, SwapApi, TxStatus};
use crate::tokens::TokenRegistry;
use crate::types::{Confirmation, LegInfo, SwapError, SwapOutcome, SwapRequest};

/// Message shown instead of raw 403 errors.
pub const FORBIDDEN_HINT: &str = "Endpoint refused the request (HTTP 403 / rate limited). \
     Public RPC nodes block trading traffic; switch to a private RPC URL or add a Jupiter API key.";

// ---------------------------------------------------------------------------
// Client seam
// ---------------------------------------------------------------------------

/// Executes one swap leg. Implementations never return an error; failure
/// is `SwapOutcome::Failed` plus an error event.
#[async_trait]
pub trait SwapClient: Send + Sync {
    async fn execute(&self, request: &SwapRequest, leg: LegInfo, events: &EventLog) -> SwapOutcome;
}

/// Rephrase access-denied errors; pass everything else through.
pub fn remap_error(err: &SwapError) -> String {
    let text = err.to_string();
    let debug = format!("{err:?}");
    let forbidden = |s: &str| s.contains("403") || s.contains("Access forbidden") || s.contains("Forbidden");
    if forbidden(&text) || forbidden(&debug) {
        FORBIDDEN_HINT.to_string()
    } else {
        text
    }
}

// ---------------------------------------------------------------------------
// Executor
// ---------------------------------------------------------------------------

/// Live swap client over a quoting API and a ledger.
pub struct SwapExecutor<A, L> {
    api: A,
    ledger: L,
    keypair: Keypair,
    tokens: TokenRegistry,
    confirm_timeout: Duration,
}

impl<A: SwapApi, L: Ledger> SwapExecutor<A, L> {
    pub fn new(
        api: A,
        ledger: L,
        keypair: Keypair,
        tokens: TokenRegistry,
        confirm_timeout: Duration,
    ) -> Self {
        Self {
            api,
            ledger,
            keypair,
            tokens,
            confirm_timeout,
        }
    }

    /// Steps 1–4. Returns the quoted output (UI units) and the signature.
    async fn submit_leg(
        &self,
        request: &SwapRequest,
        events: &EventLog,
    ) -> Result<(f64, Signature), SwapError> {
        let quote = self
            .api
            .quote(request)
            .await
            .map_err(|e| SwapError::Quote(format!("{e:#}")))?;
        let output_ui = self
            .tokens
            .to_ui_amount(&request.output_mint, quote.out_amount_base)?;
        debug!(out_amount_base = quote.out_amount_base, output_ui, "Quote accepted");

        let encoded = self
            .api
            .build(
                &quote,
                &self.keypair.pubkey().to_string(),
                request.priority_fee_lamports,
            )
            .await
            .map_err(|e| SwapError::Build(format!("{e:#}")))?;

        let tx = self.sign(&encoded)?;

        let signature = self
            .ledger
            .submit(&tx)
            .await
            .map_err(|e| SwapError::Submit(format!("{e:#}")))?;

        let txid = signature.to_string();
        events.success(format!("Transaction sent: {}...", &txid[..txid.len().min(8)]), &txid);

        Ok((output_ui, signature))
    }

    /// Decode the transport payload and sign it with the held key.
    fn sign(&self, encoded: &str) -> Result<VersionedTransaction, SwapError> {
        let bytes = BASE64
            .decode(encoded.trim())
            .map_err(|e| SwapError::Sign(format!("invalid base64 payload: {e}")))?;
        let unsigned: VersionedTransaction = bincode::deserialize(&bytes)
            .map_err(|e| SwapError::Sign(format!("invalid transaction payload: {e}")))?;
        VersionedTransaction::try_new(unsigned.message, &[&self.keypair])
            .map_err(|e| SwapError::Sign(e.to_string()))
    }

    /// Step 5: race the status poll against the timeout.
    async fn confirm_leg(
        &self,
        signature: &Signature,
        output_ui: f64,
        output_symbol: &str,
        events: &EventLog,
    ) -> Confirmation {
        let txid = signature.to_string();
        match tokio::time::timeout(self.confirm_timeout, self.ledger.confirm(signature)).await {
            Ok(Ok(TxStatus::Confirmed)) => {
                events.settled(
                    format!("Confirmed: received {output_ui:.6} {output_symbol}"),
                    &txid,
                );
                Confirmation::Confirmed
            }
            Ok(Ok(TxStatus::Failed(err))) => {
                events.error(format!("Transaction failed on-chain: {err}"));
                Confirmation::ExecutionFailed(err)
            }
            Ok(Err(err)) => {
                let msg = remap_error(&SwapError::Submit(format!("{err:#}")));
                events.error(format!("Confirmation check failed: {msg}"));
                Confirmation::Unverified(msg)
            }
            Err(_) => {
                warn!(signature = %txid, "Confirmation timed out");
                events.error(format!(
                    "Confirmation timed out after {}s; the transaction may still land",
                    self.confirm_timeout.as_secs()
                ));
                Confirmation::TimedOut
            }
        }
    }
}

#[async_trait]
impl<A: SwapApi, L: Ledger> SwapClient for SwapExecutor<A, L> {
    async fn execute(&self, request: &SwapRequest, leg: LegInfo, events: &EventLog) -> SwapOutcome {
        let sym_in = self.tokens.symbol(&request.input_mint);
        let sym_out = self.tokens.symbol(&request.output_mint);
        events.info(format!(
            "[{}/{}] {} {sym_in}→{sym_out} | amount: {:.6}",
            leg.index + 1,
            leg.total,
            leg.direction,
            leg.amount_ui,
        ));

        match self.submit_leg(request, events).await {
            Ok((output_ui, signature)) => {
                let confirmation = self
                    .confirm_leg(&signature, output_ui, &sym_out, events)
                    .await;
                SwapOutcome::Settled {
                    output_ui,
                    txid: signature.to_string(),
                    confirmation,
                }
            }
            Err(err) => {
                events.error(format!("Swap failed: {}", remap_error(&err)));
                SwapOutcome::Failed
            }
        }
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
