//! Token metadata and unit conversion.
//!
//! Every amount the bot reasons about is in UI units (e.g. `0.25` SOL);
//! every amount the quoting service and the ledger see is in base units
//! (e.g. `250_000_000` lamports). The registry maps a mint to its decimal
//! exponent so the conversion never depends on hardcoded per-asset rules.
//! Entries come from the built-in defaults plus `[[tokens]]` in config.

use rust_decimal::prelude::*;
use rust_decimal_macros::dec;
use serde::Deserialize;
use std::collections::HashMap;

use crate::types::SwapError;

/// Wrapped SOL mint (the native asset as Jupiter addresses it).
pub const SOL_MINT: &str = "So11111111111111111111111111111111111111112";
pub const USDC_MINT: &str = "EPjFWdd5AufqSSqeM2qN1xzybapC8G4wEGGkZwyTDt1v";
pub const USDT_MINT: &str = "Es9vMFrzaCERmJfrF4H2FYD4KCoNkY11McCe8BenwNYB";

/// Largest exponent we accept (10^18 still fits in a u64).
const MAX_DECIMALS: u8 = 18;

/// Static metadata for one SPL asset.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenMeta {
    pub mint: String,
    pub symbol: String,
    pub decimals: u8,
}

impl TokenMeta {
    pub fn new(mint: &str, symbol: &str, decimals: u8) -> Self {
        Self {
            mint: mint.to_string(),
            symbol: symbol.to_string(),
            decimals,
        }
    }
}

/// Lookup table from mint address to [`TokenMeta`].
#[derive(Debug, Clone, Default)]
pub struct TokenRegistry {
    tokens: HashMap<String, TokenMeta>,
}

impl TokenRegistry {
    /// An empty registry.
    pub fn empty() -> Self {
        Self::default()
    }

    /// SOL (9 decimals), USDC and USDT (6 decimals).
    pub fn with_defaults() -> Self {
        let mut reg = Self::empty();
        for meta in [
            TokenMeta::new(SOL_MINT, "SOL", 9),
            TokenMeta::new(USDC_MINT, "USDC", 6),
            TokenMeta::new(USDT_MINT, "USDT", 6),
        ] {
            reg.tokens.insert(meta.mint.clone(), meta);
        }
        reg
    }

    /// Add or replace an entry. Rejects exponents that overflow a u64 scale.
    pub fn insert(&mut self, meta: TokenMeta) -> Result<(), String> {
        if meta.decimals > MAX_DECIMALS {
            return Err(format!(
                "{} has {} decimals (max {MAX_DECIMALS})",
                meta.symbol, meta.decimals
            ));
        }
        self.tokens.insert(meta.mint.clone(), meta);
        Ok(())
    }

    pub fn get(&self, mint: &str) -> Option<&TokenMeta> {
        self.tokens.get(mint)
    }

    pub fn contains(&self, mint: &str) -> bool {
        self.tokens.contains_key(mint)
    }

    /// Display symbol, falling back to a shortened mint.
    pub fn symbol(&self, mint: &str) -> String {
        match self.get(mint) {
            Some(meta) => meta.symbol.clone(),
            None => mint.chars().take(6).collect(),
        }
    }

    fn decimals(&self, mint: &str) -> Result<u8, SwapError> {
        self.get(mint)
            .map(|m| m.decimals)
            .ok_or_else(|| SwapError::UnknownMint(mint.to_string()))
    }

    /// Convert a UI amount to base units, rounding down.
    pub fn to_base_units(&self, mint: &str, amount_ui: f64) -> Result<u64, SwapError> {
        let decimals = self.decimals(mint)?;
        ui_to_base(amount_ui, decimals)
            .ok_or_else(|| SwapError::Quote(format!("amount {amount_ui} is not representable")))
    }

    /// Convert a base-unit amount to UI units.
    pub fn to_ui_amount(&self, mint: &str, amount_base: u64) -> Result<f64, SwapError> {
        let decimals = self.decimals(mint)?;
        Ok(base_to_ui(amount_base, decimals))
    }
}

/// `floor(amount_ui * 10^decimals)`, or `None` for negative/NaN/overflow.
pub fn ui_to_base(amount_ui: f64, decimals: u8) -> Option<u64> {
    if !amount_ui.is_finite() || amount_ui < 0.0 {
        return None;
    }
    let ui = Decimal::from_f64(amount_ui)?;
    let scale = Decimal::from(10u64.checked_pow(decimals as u32)?);
    ui.checked_mul(scale)?.floor().to_u64()
}

/// `amount_base / 10^decimals` as a float.
pub fn base_to_ui(amount_base: u64, decimals: u8) -> f64 {
    Decimal::from_i128_with_scale(amount_base as i128, decimals as u32)
        .to_f64()
        .unwrap_or(0.0)
}

/// Priority fee budget in lamports from a SOL-denominated amount.
pub fn sol_to_lamports(sol: f64) -> u64 {
    ui_to_base(sol, 9).unwrap_or(0)
}

/// Slippage in basis points from a percentage, rounding down.
pub fn slippage_bps(percent: f64) -> u16 {
    let Some(pct) = Decimal::from_f64(percent).filter(|p| p.is_sign_positive()) else {
        return 0;
    };
    pct.checked_mul(dec!(100))
        .and_then(|bps| bps.floor().to_u16())
        .unwrap_or(u16::MAX)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
