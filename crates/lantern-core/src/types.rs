use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::WalletError;

/// Token amount. u128 covers the full supply of any Midnight token type.
pub type Balance = u128;

/// Unix timestamp (seconds, UTC).
pub type Timestamp = i64;

/// Block height on the consensus chain.
pub type BlockHeight = u64;

/// Globally ordered indexer record id (the subscription cursor unit).
pub type RecordId = u64;

// ── IntentHash ───────────────────────────────────────────────────────────────

/// 32-byte hash of the intent that created a UTXO. Together with the output
/// index it forms the primary key of every unshielded UTXO.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IntentHash(pub [u8; 32]);

impl IntentHash {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, WalletError> {
        Ok(Self(parse_hex32(s)?))
    }
}

impl fmt::Display for IntentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for IntentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IntentHash({}…)", &self.to_hex()[..16])
    }
}

// ── TxHash ───────────────────────────────────────────────────────────────────

/// 32-byte transaction hash as reported by the ledger and the indexer.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TxHash(pub [u8; 32]);

impl TxHash {
    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, WalletError> {
        Ok(Self(parse_hex32(s)?))
    }
}

impl fmt::Display for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl fmt::Debug for TxHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TxHash({}…)", &self.to_hex()[..16])
    }
}

// ── TokenType ────────────────────────────────────────────────────────────────

/// 32-byte token type identifier. The all-zero value is the native token.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TokenType(pub [u8; 32]);

impl TokenType {
    /// The native (NIGHT) token.
    pub const NATIVE: TokenType = TokenType([0u8; 32]);

    pub fn from_bytes(b: [u8; 32]) -> Self {
        Self(b)
    }

    pub fn is_native(&self) -> bool {
        self.0 == [0u8; 32]
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    pub fn from_hex(s: &str) -> Result<Self, WalletError> {
        Ok(Self(parse_hex32(s)?))
    }
}

impl fmt::Display for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_native() {
            write!(f, "native")
        } else {
            write!(f, "{}", self.to_hex())
        }
    }
}

impl fmt::Debug for TokenType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "TokenType({})", self)
    }
}

// ── NetworkTag ───────────────────────────────────────────────────────────────

/// Deployment network. The tag is part of every address HRP and must agree
/// with the indexer endpoint the wallet talks to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum NetworkTag {
    Undeployed,
    Test,
    Preview,
    Mainnet,
}

impl NetworkTag {
    pub fn as_str(&self) -> &'static str {
        match self {
            NetworkTag::Undeployed => "undeployed",
            NetworkTag::Test => "test",
            NetworkTag::Preview => "preview",
            NetworkTag::Mainnet => "mainnet",
        }
    }

    /// Bech32m human-readable prefix for unshielded addresses on this
    /// network. Mainnet carries no tag suffix.
    pub fn hrp(&self) -> String {
        match self {
            NetworkTag::Mainnet => "mn_addr".to_string(),
            other => format!("mn_addr_{}", other.as_str()),
        }
    }

    /// Inverse of [`NetworkTag::hrp`].
    pub fn from_hrp(hrp: &str) -> Option<NetworkTag> {
        match hrp {
            "mn_addr" => Some(NetworkTag::Mainnet),
            "mn_addr_undeployed" => Some(NetworkTag::Undeployed),
            "mn_addr_test" => Some(NetworkTag::Test),
            "mn_addr_preview" => Some(NetworkTag::Preview),
            _ => None,
        }
    }
}

impl FromStr for NetworkTag {
    type Err = WalletError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "undeployed" => Ok(NetworkTag::Undeployed),
            "test" => Ok(NetworkTag::Test),
            "preview" => Ok(NetworkTag::Preview),
            "mainnet" => Ok(NetworkTag::Mainnet),
            other => Err(WalletError::BadParameter(format!(
                "unknown network tag: {other}"
            ))),
        }
    }
}

impl fmt::Display for NetworkTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// ── Helpers ──────────────────────────────────────────────────────────────────

fn parse_hex32(s: &str) -> Result<[u8; 32], WalletError> {
    let bytes = hex::decode(s).map_err(|e| WalletError::BadParameter(e.to_string()))?;
    if bytes.len() != 32 {
        return Err(WalletError::BadLength {
            expected: 32,
            got: bytes.len(),
        });
    }
    let mut arr = [0u8; 32];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn hash_hex_round_trip() {
        let h = IntentHash::from_bytes([0xab; 32]);
        assert_eq!(IntentHash::from_hex(&h.to_hex()).unwrap(), h);
    }

    #[test]
    fn short_hex_is_bad_length() {
        assert!(matches!(
            TxHash::from_hex("abcd"),
            Err(WalletError::BadLength { expected: 32, got: 2 })
        ));
    }

    #[test]
    fn native_token_is_all_zero() {
        assert!(TokenType::NATIVE.is_native());
        assert!(!TokenType::from_bytes([1u8; 32]).is_native());
    }

    #[test]
    fn hrp_round_trip_all_networks() {
        for n in [
            NetworkTag::Undeployed,
            NetworkTag::Test,
            NetworkTag::Preview,
            NetworkTag::Mainnet,
        ] {
            assert_eq!(NetworkTag::from_hrp(&n.hrp()), Some(n));
        }
        assert_eq!(NetworkTag::from_hrp("mn_addr_devnet"), None);
    }
}
