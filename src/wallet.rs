//! Signing credential decoding.
//!
//! Accepts the two formats operators actually paste: a base58 secret key
//! (as exported by Phantom and most browser wallets) or a JSON byte array
//! (as written by `solana-keygen` to `id.json`). The decoded keypair stays
//! in memory and is only ever used for local signing.

use anyhow::{anyhow, Context, Result};
use secrecy::{ExposeSecret, SecretString};
use solana_sdk::signature::{Keypair, Signer};

/// Length of an ed25519 keypair (secret ‖ public).
const KEYPAIR_LEN: usize = 64;

/// Decode a secret key string into a keypair.
pub fn keypair_from_secret(secret: &SecretString) -> Result<Keypair> {
    let raw = secret.expose_secret().trim();
    if raw.is_empty() {
        anyhow::bail!("Private key is empty");
    }

    let bytes: Vec<u8> = if raw.starts_with('[') {
        serde_json::from_str(raw).context("Private key JSON array is malformed")?
    } else {
        bs58::decode(raw)
            .into_vec()
            .context("Private key is not valid base58")?
    };

    if bytes.len() != KEYPAIR_LEN {
        return Err(anyhow!(
            "Private key must decode to {KEYPAIR_LEN} bytes, got {}",
            bytes.len()
        ));
    }

    Keypair::from_bytes(&bytes).map_err(|e| anyhow!("Private key rejected: {e}"))
}

/// Short form of a public key for log lines (`AbC123...`).
pub fn short_pubkey(keypair: &Keypair) -> String {
    let full = keypair.pubkey().to_string();
    format!("{}...", &full[..full.len().min(6)])
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
