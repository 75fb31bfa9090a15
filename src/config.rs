//! Configuration loading from TOML with environment variable resolution.
//!
//! Reads `config.toml` and deserializes into strongly-typed structs.
//! Secrets (private key, Jupiter API key) are referenced by env-var name
//! in the config and resolved at runtime via `std::env::var`, then held
//! as `SecretString` so they never show up in `Debug` output.
//!
//! `AppConfig` is the on-disk shape. `RunConfig` is the validated,
//! immutable input to a single run.

use anyhow::{Context, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::fs;

use crate::tokens::{self, TokenMeta, TokenRegistry};

/// Default Jupiter Swap API v1 base URL.
pub const DEFAULT_JUPITER_URL: &str = "https://api.jup.ag/swap/v1";

/// Top-level application configuration.
#[derive(Debug, Deserialize, Clone)]
pub struct AppConfig {
    pub run: RunSection,
    #[serde(default)]
    pub policy: PolicySection,
    #[serde(default)]
    pub jupiter: JupiterSection,
    #[serde(default)]
    pub dashboard: DashboardSection,
    /// Extra token metadata on top of the built-in SOL/USDC/USDT table.
    #[serde(default)]
    pub tokens: Vec<TokenMeta>,
}

#[derive(Debug, Deserialize, Clone)]
pub struct RunSection {
    pub rpc_url: String,
    /// Name of the env var holding the base58 private key.
    pub private_key_env: String,
    /// Name of the env var holding the Jupiter API key (optional).
    #[serde(default)]
    pub api_key_env: Option<String>,
    pub input_mint: String,
    pub output_mint: String,
    pub min_amount: f64,
    pub max_amount: f64,
    pub trade_count: u32,
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
    /// Slippage tolerance in percent (0.5 = 50 bps).
    pub slippage_pct: f64,
    /// Priority fee budget in SOL.
    #[serde(default)]
    pub priority_fee_sol: f64,
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct PolicySection {
    pub confirmation: ConfirmationPolicy,
    pub failure_delay_ms: u64,
    /// `None` retries forever.
    pub max_consecutive_failures: Option<u32>,
    pub confirm_timeout_secs: u64,
}

impl Default for PolicySection {
    fn default() -> Self {
        let p = RunPolicy::default();
        Self {
            confirmation: p.confirmation,
            failure_delay_ms: p.failure_delay_ms,
            max_consecutive_failures: p.max_consecutive_failures,
            confirm_timeout_secs: p.confirm_timeout_secs,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct JupiterSection {
    pub base_url: String,
}

impl Default for JupiterSection {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_JUPITER_URL.to_string(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct DashboardSection {
    pub enabled: bool,
    pub port: u16,
    /// Start a run immediately instead of waiting for `POST /api/start`.
    pub autostart: bool,
}

impl Default for DashboardSection {
    fn default() -> Self {
        Self {
            enabled: false,
            port: 8080,
            autostart: true,
        }
    }
}

// ---------------------------------------------------------------------------
// Run policy
// ---------------------------------------------------------------------------

/// How a submitted-but-unconfirmed leg is counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum ConfirmationPolicy {
    /// Count the leg and flip direction as soon as submission succeeds.
    #[default]
    Optimistic,
    /// Count the leg only when confirmation succeeded; otherwise it is a
    /// leg failure.
    Strict,
}

/// Retry and confirmation behavior for one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunPolicy {
    pub confirmation: ConfirmationPolicy,
    pub failure_delay_ms: u64,
    pub max_consecutive_failures: Option<u32>,
    pub confirm_timeout_secs: u64,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            confirmation: ConfirmationPolicy::Optimistic,
            failure_delay_ms: 3_000,
            max_consecutive_failures: None,
            confirm_timeout_secs: 10,
        }
    }
}

impl From<&PolicySection> for RunPolicy {
    fn from(p: &PolicySection) -> Self {
        Self {
            confirmation: p.confirmation,
            failure_delay_ms: p.failure_delay_ms,
            max_consecutive_failures: p.max_consecutive_failures,
            confirm_timeout_secs: p.confirm_timeout_secs,
        }
    }
}

// ---------------------------------------------------------------------------
// Validation errors
// ---------------------------------------------------------------------------

#[derive(Debug, thiserror::Error, PartialEq)]
pub enum ConfigError {
    #[error("Private key is required")]
    MissingPrivateKey,

    #[error("Amounts must be positive with min <= max (got {min}..{max})")]
    InvalidAmounts { min: f64, max: f64 },

    #[error("Trade count must be greater than zero")]
    InvalidTradeCount,

    #[error("Intervals must be positive with min <= max (got {min}..{max} ms)")]
    InvalidInterval { min: u64, max: u64 },

    #[error("Slippage must be positive (got {0}%)")]
    InvalidSlippage(f64),

    #[error("Priority fee must not be negative (got {0} SOL)")]
    InvalidPriorityFee(f64),

    #[error("Input and output mint must differ")]
    SamePair,

    #[error("No decimals known for mint {0}; add it under [[tokens]]")]
    UnknownMint(String),

    #[error("Invalid token entry: {0}")]
    InvalidToken(String),
}

// ---------------------------------------------------------------------------
// Run configuration
// ---------------------------------------------------------------------------

/// Immutable input to one run. Build with [`RunConfig::validate`].
#[derive(Debug)]
pub struct RunConfig {
    pub rpc_url: String,
    pub private_key: SecretString,
    pub api_key: Option<SecretString>,
    pub jupiter_url: String,
    /// Asset A: input of every Forward leg.
    pub input_mint: String,
    /// Asset B: output of every Forward leg.
    pub output_mint: String,
    pub min_amount: f64,
    pub max_amount: f64,
    pub trade_count: u32,
    pub min_interval_ms: u64,
    pub max_interval_ms: u64,
    pub slippage_pct: f64,
    pub priority_fee_sol: f64,
    pub policy: RunPolicy,
    pub tokens: TokenRegistry,
}

impl RunConfig {
    /// Check every precondition a run relies on.
    ///
    /// Credential *format* is not checked here; a malformed key is a setup
    /// fault reported when the run starts.
    pub fn validate(self) -> std::result::Result<Self, ConfigError> {
        if self.private_key_is_empty() {
            return Err(ConfigError::MissingPrivateKey);
        }
        let finite = self.min_amount.is_finite() && self.max_amount.is_finite();
        if !(finite && self.min_amount > 0.0 && self.min_amount <= self.max_amount) {
            return Err(ConfigError::InvalidAmounts {
                min: self.min_amount,
                max: self.max_amount,
            });
        }
        if self.trade_count == 0 {
            return Err(ConfigError::InvalidTradeCount);
        }
        if self.min_interval_ms == 0 || self.min_interval_ms > self.max_interval_ms {
            return Err(ConfigError::InvalidInterval {
                min: self.min_interval_ms,
                max: self.max_interval_ms,
            });
        }
        if !(self.slippage_pct.is_finite() && self.slippage_pct > 0.0) {
            return Err(ConfigError::InvalidSlippage(self.slippage_pct));
        }
        if !(self.priority_fee_sol.is_finite() && self.priority_fee_sol >= 0.0) {
            return Err(ConfigError::InvalidPriorityFee(self.priority_fee_sol));
        }
        if self.input_mint == self.output_mint {
            return Err(ConfigError::SamePair);
        }
        for mint in [&self.input_mint, &self.output_mint] {
            if !self.tokens.contains(mint) {
                return Err(ConfigError::UnknownMint(mint.clone()));
            }
        }
        Ok(self)
    }

    fn private_key_is_empty(&self) -> bool {
        use secrecy::ExposeSecret;
        self.private_key.expose_secret().trim().is_empty()
    }

    pub fn slippage_bps(&self) -> u16 {
        tokens::slippage_bps(self.slippage_pct)
    }

    pub fn priority_fee_lamports(&self) -> u64 {
        tokens::sol_to_lamports(self.priority_fee_sol)
    }

    /// A config with sensible defaults for tests: SOL/USDC, 0.01–0.012 SOL,
    /// 3 trades, 1–2 s pacing.
    pub fn sample() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8899".to_string(),
            private_key: SecretString::new("test-key".to_string()),
            api_key: None,
            jupiter_url: DEFAULT_JUPITER_URL.to_string(),
            input_mint: tokens::SOL_MINT.to_string(),
            output_mint: tokens::USDC_MINT.to_string(),
            min_amount: 0.01,
            max_amount: 0.012,
            trade_count: 3,
            min_interval_ms: 1_000,
            max_interval_ms: 2_000,
            slippage_pct: 0.5,
            priority_fee_sol: 0.0001,
            policy: RunPolicy::default(),
            tokens: TokenRegistry::with_defaults(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file.
    pub fn load(path: &str) -> Result<Self> {
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {path}"))?;
        Self::parse(&contents).with_context(|| format!("Failed to parse config file: {path}"))
    }

    /// Parse configuration from a TOML string.
    pub fn parse(contents: &str) -> Result<Self> {
        let config: AppConfig = toml::from_str(contents)?;
        Ok(config)
    }

    /// Resolve an environment variable name to its value.
    /// Useful for loading secrets referenced in the config.
    pub fn resolve_env(env_name: &str) -> Result<String> {
        std::env::var(env_name)
            .with_context(|| format!("Environment variable not set: {env_name}"))
    }

    /// Token registry: built-in defaults plus `[[tokens]]` entries.
    pub fn token_registry(&self) -> std::result::Result<TokenRegistry, ConfigError> {
        let mut reg = TokenRegistry::with_defaults();
        for meta in &self.tokens {
            reg.insert(meta.clone()).map_err(ConfigError::InvalidToken)?;
        }
        Ok(reg)
    }

    /// Resolve secrets from the environment and validate into a `RunConfig`.
    pub fn run_config(&self) -> Result<RunConfig> {
        let private_key = Self::resolve_env(&self.run.private_key_env)
            .map_err(|_| ConfigError::MissingPrivateKey)?;
        let api_key = self
            .run
            .api_key_env
            .as_deref()
            .and_then(|env| std::env::var(env).ok())
            .filter(|k| !k.trim().is_empty())
            .map(SecretString::new);

        let cfg = RunConfig {
            rpc_url: self.run.rpc_url.clone(),
            private_key: SecretString::new(private_key),
            api_key,
            jupiter_url: self.jupiter.base_url.clone(),
            input_mint: self.run.input_mint.clone(),
            output_mint: self.run.output_mint.clone(),
            min_amount: self.run.min_amount,
            max_amount: self.run.max_amount,
            trade_count: self.run.trade_count,
            min_interval_ms: self.run.min_interval_ms,
            max_interval_ms: self.run.max_interval_ms,
            slippage_pct: self.run.slippage_pct,
            priority_fee_sol: self.run.priority_fee_sol,
            policy: RunPolicy::from(&self.policy),
            tokens: self.token_registry()?,
        };

        Ok(cfg.validate()?)
    }
}
