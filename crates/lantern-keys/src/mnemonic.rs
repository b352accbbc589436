use bip39::{Language, Mnemonic};
use zeroize::{Zeroize, ZeroizeOnDrop};

use lantern_core::WalletError;

/// Accepted phrase lengths per BIP-39.
pub const VALID_WORD_COUNTS: [usize; 5] = [12, 15, 18, 21, 24];

// ── Seed ─────────────────────────────────────────────────────────────────────

/// The wallet seed: the FIRST 32 bytes of the 64-byte BIP-39 PBKDF2 output.
///
/// The truncation is an interoperability contract with the reference wallet.
/// The same mnemonic must yield the same addresses there and here, so this
/// must never widen to the full 64 bytes. Wiped on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct Seed([u8; 32]);

impl Seed {
    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl std::fmt::Debug for Seed {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "Seed(32b)")
    }
}

// ── Operations ───────────────────────────────────────────────────────────────

/// Generate a fresh mnemonic with entropy from the OS RNG.
pub fn generate(word_count: usize) -> Result<Mnemonic, WalletError> {
    if !VALID_WORD_COUNTS.contains(&word_count) {
        return Err(WalletError::BadParameter(format!(
            "word count must be one of {VALID_WORD_COUNTS:?}, got {word_count}"
        )));
    }
    Mnemonic::generate_in(Language::English, word_count)
        .map_err(|e| WalletError::BadParameter(e.to_string()))
}

/// Collapse whitespace runs to single spaces and lowercase the words.
/// Normalization is observable: validation and seed derivation accept any
/// whitespace layout a user may paste.
pub fn normalize(phrase: &str) -> String {
    phrase
        .split_whitespace()
        .map(|w| w.to_lowercase())
        .collect::<Vec<_>>()
        .join(" ")
}

/// Wordlist plus checksum validation. Consumes no randomness.
pub fn validate(phrase: &str) -> bool {
    Mnemonic::parse_in_normalized(Language::English, &normalize(phrase)).is_ok()
}

/// Derive the 32-byte wallet seed (PBKDF2-HMAC-SHA512, 2048 iterations,
/// salt `"mnemonic" ∥ passphrase`, truncated). The unused upper half of the
/// PBKDF2 output is zeroized before returning.
pub fn to_seed(phrase: &str, passphrase: &str) -> Result<Seed, WalletError> {
    let mnemonic = Mnemonic::parse_in_normalized(Language::English, &normalize(phrase))
        .map_err(|e| WalletError::BadParameter(e.to_string()))?;
    let mut full = mnemonic.to_seed(passphrase);
    let mut seed = [0u8; 32];
    seed.copy_from_slice(&full[..32]);
    full.zeroize();
    Ok(Seed(seed))
}
