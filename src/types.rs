//! Shared types for the PINGPONG bot.
//!
//! These types form the data model used across all modules: trade
//! direction, swap requests and outcomes, log events and run snapshots.
//! Platform, engine and dashboard modules depend on them without
//! depending on each other.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

// ---------------------------------------------------------------------------
// Direction
// ---------------------------------------------------------------------------

/// Which way the current leg trades.
///
/// `Forward` sells asset A for asset B, `Reverse` sells B back for A.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    #[default]
    Forward,
    Reverse,
}

impl Direction {
    /// The opposite direction.
    pub fn flip(self) -> Self {
        match self {
            Direction::Forward => Direction::Reverse,
            Direction::Reverse => Direction::Forward,
        }
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Direction::Forward => write!(f, "forward"),
            Direction::Reverse => write!(f, "reverse"),
        }
    }
}

// ---------------------------------------------------------------------------
// Swap request / quote / outcome
// ---------------------------------------------------------------------------

/// One leg's trade, fully resolved to base units.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SwapRequest {
    pub input_mint: String,
    pub output_mint: String,
    /// Input amount in the input asset's smallest unit.
    pub amount_base: u64,
    pub slippage_bps: u16,
    /// Prioritization fee budget in lamports.
    pub priority_fee_lamports: u64,
}

/// Position of a leg within the run, used for log lines only.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct LegInfo {
    /// Zero-based count of legs settled so far.
    pub index: u32,
    pub total: u32,
    pub direction: Direction,
    /// UI amount the request was built from.
    pub amount_ui: f64,
}

/// A route quote returned by the quoting service.
#[derive(Debug, Clone)]
pub struct QuoteResult {
    /// Opaque route payload, passed back verbatim to the build call.
    pub route: serde_json::Value,
    /// Quoted output in the output asset's base units.
    pub out_amount_base: u64,
}

/// What the confirmation step observed for a submitted transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Confirmation {
    /// Reached `confirmed` commitment without an execution error.
    Confirmed,
    /// Landed on-chain but the program returned an error.
    ExecutionFailed(String),
    /// The status query itself failed.
    Unverified(String),
    /// No status before the confirmation timeout elapsed.
    TimedOut,
}

impl Confirmation {
    pub fn is_confirmed(&self) -> bool {
        matches!(self, Confirmation::Confirmed)
    }
}

impl fmt::Display for Confirmation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Confirmation::Confirmed => write!(f, "confirmed"),
            Confirmation::ExecutionFailed(e) => write!(f, "execution failed: {e}"),
            Confirmation::Unverified(e) => write!(f, "unverified: {e}"),
            Confirmation::TimedOut => write!(f, "timed out"),
        }
    }
}

/// Result of one quote→build→sign→submit→confirm cycle.
///
/// `Settled` means the transaction was accepted for submission. Whether it
/// reached finality is carried in `confirmation`.
#[derive(Debug, Clone, PartialEq)]
pub enum SwapOutcome {
    Settled {
        output_ui: f64,
        txid: String,
        confirmation: Confirmation,
    },
    Failed,
}

// ---------------------------------------------------------------------------
// Log events
// ---------------------------------------------------------------------------

/// Kind of a log event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogKind {
    Info,
    /// Transaction accepted by the submission endpoint.
    Success,
    /// Transaction confirmed on-chain.
    Settled,
    Error,
}

impl fmt::Display for LogKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogKind::Info => write!(f, "info"),
            LogKind::Success => write!(f, "success"),
            LogKind::Settled => write!(f, "settled"),
            LogKind::Error => write!(f, "error"),
        }
    }
}

impl std::str::FromStr for LogKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "info" => Ok(LogKind::Info),
            "success" => Ok(LogKind::Success),
            "settled" | "success-get" => Ok(LogKind::Settled),
            "error" => Ok(LogKind::Error),
            other => Err(format!("Unknown log kind: {other}")),
        }
    }
}

/// Solscan transaction page prefix.
const EXPLORER_TX_URL: &str = "https://solscan.io/tx/";

/// A single structured, human-readable event from a run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEvent {
    pub id: uuid::Uuid,
    pub timestamp: DateTime<Utc>,
    pub kind: LogKind,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub txid: Option<String>,
}

impl LogEvent {
    pub fn new(kind: LogKind, message: impl Into<String>, txid: Option<String>) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            timestamp: Utc::now(),
            kind,
            message: message.into(),
            txid,
        }
    }

    /// Explorer link for the attached transaction, if any.
    pub fn explorer_url(&self) -> Option<String> {
        self.txid.as_ref().map(|t| format!("{EXPLORER_TX_URL}{t}"))
    }
}

impl fmt::Display for LogEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "[{}] {} {}",
            self.timestamp.format("%H:%M:%S"),
            self.kind,
            self.message
        )
    }
}

// ---------------------------------------------------------------------------
// Run snapshots
// ---------------------------------------------------------------------------

/// Read-only view of a run, published after every state transition.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunProgress {
    pub running: bool,
    pub success_count: u32,
    pub target: u32,
    pub direction: Direction,
    pub consecutive_failures: u32,
}

/// Why a run stopped.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", content = "detail", rename_all = "snake_case")]
pub enum RunEnd {
    /// Target trade count reached.
    Completed,
    Cancelled,
    /// Consecutive failure cap reached.
    FailureLimit,
    /// Setup fault; never retried.
    Fatal(String),
}

impl fmt::Display for RunEnd {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunEnd::Completed => write!(f, "completed"),
            RunEnd::Cancelled => write!(f, "cancelled"),
            RunEnd::FailureLimit => write!(f, "failure limit reached"),
            RunEnd::Fatal(e) => write!(f, "fatal: {e}"),
        }
    }
}

// ---------------------------------------------------------------------------
// Error types
// ---------------------------------------------------------------------------

/// Failures of a single swap leg (steps 1–4 of the protocol).
#[derive(Debug, thiserror::Error)]
pub enum SwapError {
    #[error("Quote rejected: {0}")]
    Quote(String),

    #[error("Swap build failed: {0}")]
    Build(String),

    #[error("Signing failed: {0}")]
    Sign(String),

    #[error("Submission failed: {0}")]
    Submit(String),

    #[error("Unknown token mint: {0}")]
    UnknownMint(String),
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
