use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fmt;

use lantern_core::{Intent, IntentHash, TxHash, WalletError};

/// Every sealed transaction transcript starts with this ASCII prefix.
pub const TRANSCRIPT_TAG_PREFIX: &str = "proof-preimage";

/// Binding schemes safe for value-bearing submission.
pub const SEALED_SCHEMES: [&str; 2] = ["pedersen-schnorr[v1]", "embedded-fr[v1]"];

const INTENT_DOMAIN: &[u8] = b"midnight:unshielded-intent:v1";
const BINDING_DOMAIN: &[u8] = b"midnight:binding-commitment:v1";

// ── BindingScheme ────────────────────────────────────────────────────────────

/// How the transaction binds inputs, outputs and proofs together.
///
/// `Pedersen` is the legacy commitment-only form the ledger still emits for
/// intermediate values; it carries no Schnorr seal and must never be
/// submitted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindingScheme {
    PedersenSchnorr,
    EmbeddedFr,
    Pedersen,
}

impl BindingScheme {
    pub fn as_str(&self) -> &'static str {
        match self {
            BindingScheme::PedersenSchnorr => "pedersen-schnorr[v1]",
            BindingScheme::EmbeddedFr => "embedded-fr[v1]",
            BindingScheme::Pedersen => "pedersen[v1]",
        }
    }

    pub fn is_sealed(&self) -> bool {
        !matches!(self, BindingScheme::Pedersen)
    }
}

// ── Digests ──────────────────────────────────────────────────────────────────

/// The canonical 32-byte digest the wallet signs. Commits to the full
/// intent contents: inputs, outputs, ttl and network.
pub fn intent_signing_bytes(intent: &Intent) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(INTENT_DOMAIN);
    hasher.update(intent.body_bytes());
    hasher.finalize().into()
}

/// Commitment tying inputs and outputs together so they cannot be
/// rearranged after signing.
pub fn binding_commitment(intent: &Intent) -> [u8; 32] {
    let mut hasher = Sha256::new();
    hasher.update(BINDING_DOMAIN);
    hasher.update(intent.body_bytes());
    hasher.finalize().into()
}

// ── Sealing ──────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct SealedBody<'a> {
    intent: &'a Intent,
    signatures: Vec<Vec<u8>>,
    binding_commitment: [u8; 32],
}

/// A submittable transaction byte string: `<tag>:<payload>` where the tag
/// names the transcript version and the binding scheme.
#[derive(Clone, PartialEq, Eq)]
pub struct SealedTransaction {
    bytes: Vec<u8>,
}

impl SealedTransaction {
    /// Wrap bytes received from the ledger library verbatim.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Self { bytes }
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn into_bytes(self) -> Vec<u8> {
        self.bytes
    }

    pub fn to_hex(&self) -> String {
        hex::encode(&self.bytes)
    }

    /// The ASCII tag up to the first `:` delimiter.
    pub fn binding_tag(&self) -> Result<&str, WalletError> {
        let colon = self
            .bytes
            .iter()
            .position(|&b| b == b':')
            .ok_or_else(|| WalletError::SealFailed("missing tag delimiter".to_string()))?;
        let tag = std::str::from_utf8(&self.bytes[..colon])
            .map_err(|_| WalletError::SealFailed("tag is not ascii".to_string()))?;
        if !tag.starts_with(TRANSCRIPT_TAG_PREFIX) {
            return Err(WalletError::SealFailed(format!(
                "tag does not start with {TRANSCRIPT_TAG_PREFIX}: {tag}"
            )));
        }
        Ok(tag)
    }

    /// Fail closed unless the tag carries one of the Schnorr-sealed binding
    /// schemes. The submission path must call this before any bytes go out.
    pub fn assert_sealed(&self) -> Result<(), WalletError> {
        let tag = self.binding_tag()?;
        if SEALED_SCHEMES.iter().any(|s| tag.contains(s)) {
            Ok(())
        } else {
            Err(WalletError::UnsealedBindingRejected(tag.to_string()))
        }
    }

    /// Transaction hash: SHA-256 over the full sealed byte string.
    pub fn tx_hash(&self) -> TxHash {
        TxHash::from_bytes(Sha256::digest(&self.bytes).into())
    }

    /// Hash identifying the intent this transaction carries; new outputs
    /// are keyed under it.
    pub fn intent_hash(intent: &Intent) -> IntentHash {
        IntentHash::from_bytes(intent_signing_bytes(intent))
    }
}

impl fmt::Debug for SealedTransaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.binding_tag() {
            Ok(tag) => write!(f, "SealedTransaction({tag}, {}b)", self.bytes.len()),
            Err(_) => write!(f, "SealedTransaction(untagged, {}b)", self.bytes.len()),
        }
    }
}

/// Serialize a signed intent into a submittable transaction.
pub fn seal_transaction(
    intent: &Intent,
    signatures: &[[u8; 64]],
    binding_commitment: &[u8; 32],
    scheme: BindingScheme,
) -> Result<SealedTransaction, WalletError> {
    if intent.inputs.is_empty() || intent.outputs.is_empty() {
        return Err(WalletError::SealFailed(
            "intent has no inputs or no outputs".to_string(),
        ));
    }
    if signatures.is_empty() {
        return Err(WalletError::SealFailed("no signatures supplied".to_string()));
    }

    let body = SealedBody {
        intent,
        signatures: signatures.iter().map(|s| s.to_vec()).collect(),
        binding_commitment: *binding_commitment,
    };
    let payload =
        bincode::serialize(&body).map_err(|e| WalletError::Serialization(e.to_string()))?;

    let mut bytes = format!("{}[v1];{}:", TRANSCRIPT_TAG_PREFIX, scheme.as_str()).into_bytes();
    bytes.extend_from_slice(&payload);
    Ok(SealedTransaction { bytes })
}
