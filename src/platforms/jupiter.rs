//! Jupiter Swap API v1 integration.
//!
//! Quotes routes and builds unsigned swap transactions. Signing and
//! submission happen elsewhere; the private key never reaches this module.
//!
//! API docs: https://dev.jup.ag/docs/swap-api
//! Base URL: https://api.jup.ag/swap/v1
//! Auth: optional `x-api-key` header (keyless access is heavily rate limited).

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use reqwest::{Client, RequestBuilder};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::debug;

use super::SwapApi;
use crate::types::{QuoteResult, SwapRequest};

const API_KEY_HEADER: &str = "x-api-key";

// ---------------------------------------------------------------------------
// API response types
// ---------------------------------------------------------------------------

/// Response from `POST /swap`. We only need the transaction.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SwapResponse {
    #[serde(default)]
    swap_transaction: Option<String>,
    #[serde(default)]
    error: Option<String>,
}

// ---------------------------------------------------------------------------
// Client
// ---------------------------------------------------------------------------

/// Jupiter quote/build client.
pub struct JupiterClient {
    http: Client,
    base_url: String,
    api_key: Option<SecretString>,
}

impl JupiterClient {
    pub fn new(base_url: &str, api_key: Option<SecretString>) -> Result<Self> {
        let http = Client::builder()
            .timeout(std::time::Duration::from_secs(30))
            .user_agent("PINGPONG/0.1.0 (swap-bot)")
            .build()
            .context("Failed to build HTTP client for Jupiter")?;

        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    fn with_key(&self, req: RequestBuilder) -> RequestBuilder {
        match &self.api_key {
            Some(key) => req.header(API_KEY_HEADER, key.expose_secret()),
            None => req,
        }
    }

    fn quote_url(&self, request: &SwapRequest) -> String {
        format!(
            "{}/quote?inputMint={}&outputMint={}&amount={}&slippageBps={}",
            self.base_url,
            urlencoding::encode(&request.input_mint),
            urlencoding::encode(&request.output_mint),
            request.amount_base,
            request.slippage_bps,
        )
    }
}

/// Extract the quoted output from a `/quote` body.
///
/// Jupiter reports failures either as an HTTP error or as a 200 with an
/// `error` field; both end up here as `Err`.
fn parse_quote(body: Value) -> Result<QuoteResult> {
    if let Some(err) = body.get("error") {
        let msg = err.as_str().map(String::from).unwrap_or_else(|| err.to_string());
        return Err(anyhow!("{msg}"));
    }

    let out_amount_base = body
        .get("outAmount")
        .and_then(|v| match v {
            Value::String(s) => s.parse::<u64>().ok(),
            Value::Number(n) => n.as_u64(),
            _ => None,
        })
        .ok_or_else(|| anyhow!("Quote response has no usable outAmount"))?;

    Ok(QuoteResult {
        route: body,
        out_amount_base,
    })
}

/// JSON body for `POST /swap`.
fn swap_body(quote: &QuoteResult, user: &str, priority_fee_lamports: u64) -> Value {
    json!({
        "quoteResponse": quote.route,
        "userPublicKey": user,
        "wrapAndUnwrapSol": true,
        "prioritizationFeeLamports": priority_fee_lamports,
    })
}

#[async_trait]
impl SwapApi for JupiterClient {
    async fn quote(&self, request: &SwapRequest) -> Result<QuoteResult> {
        let url = self.quote_url(request);
        debug!(url = %url, "Fetching Jupiter quote");

        let resp = self
            .with_key(self.http.get(&url))
            .send()
            .await
            .context("Jupiter quote request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Jupiter quote error {status}: {body}");
        }

        let body: Value = resp
            .json()
            .await
            .context("Failed to parse Jupiter quote response")?;

        parse_quote(body)
    }

    async fn build(
        &self,
        quote: &QuoteResult,
        user: &str,
        priority_fee_lamports: u64,
    ) -> Result<String> {
        let url = format!("{}/swap", self.base_url);
        debug!(url = %url, priority_fee_lamports, "Building Jupiter swap transaction");

        let resp = self
            .with_key(self.http.post(&url))
            .json(&swap_body(quote, user, priority_fee_lamports))
            .send()
            .await
            .context("Jupiter swap request failed")?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_default();
            anyhow::bail!("Jupiter swap error {status}: {body}");
        }

        let parsed: SwapResponse = resp
            .json()
            .await
            .context("Failed to parse Jupiter swap response")?;

        if let Some(err) = parsed.error {
            anyhow::bail!("{err}");
        }

        parsed
            .swap_transaction
            .ok_or_else(|| anyhow!("Swap response has no swapTransaction"))
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
