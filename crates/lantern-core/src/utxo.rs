use serde::{Deserialize, Serialize};
use std::fmt;

use crate::address::Address;
use crate::error::WalletError;
use crate::types::{Balance, BlockHeight, IntentHash, TokenType, TxHash};

// ── UtxoRef ──────────────────────────────────────────────────────────────────

/// Primary key of an unshielded UTXO: the creating intent plus the output
/// position within it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct UtxoRef {
    pub intent_hash: IntentHash,
    pub output_index: u32,
}

impl UtxoRef {
    pub fn new(intent_hash: IntentHash, output_index: u32) -> Self {
        Self {
            intent_hash,
            output_index,
        }
    }

    /// Storage key: intent hash followed by the big-endian output index.
    pub fn storage_key(&self) -> [u8; 36] {
        let mut key = [0u8; 36];
        key[..32].copy_from_slice(self.intent_hash.as_bytes());
        key[32..].copy_from_slice(&self.output_index.to_be_bytes());
        key
    }
}

impl fmt::Display for UtxoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.intent_hash, self.output_index)
    }
}

impl fmt::Debug for UtxoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "UtxoRef({}…:{})",
            &self.intent_hash.to_hex()[..16],
            self.output_index
        )
    }
}

// ── UtxoState ────────────────────────────────────────────────────────────────

/// Local lifecycle of a tracked UTXO.
///
/// `Available → Reserved` is taken exclusively by the store's `reserve`;
/// `Reserved → Pending` when a spend of it has been submitted;
/// `→ Spent` once the chain confirms the spend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum UtxoState {
    Available,
    Reserved,
    Pending,
    Spent,
}

// ── ChainPoint ───────────────────────────────────────────────────────────────

/// Where on the chain an event happened.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChainPoint {
    pub height: BlockHeight,
    pub tx_hash: TxHash,
}

// ── Utxo ─────────────────────────────────────────────────────────────────────

/// A tracked unshielded output.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Utxo {
    pub intent_hash: IntentHash,
    pub output_index: u32,
    pub owner: Address,
    pub token: TokenType,
    pub value: Balance,
    pub state: UtxoState,
    pub created_at: ChainPoint,
    /// Set once a spend of this output is confirmed on chain.
    pub spent_at: Option<ChainPoint>,
    /// Hash of the locally submitted transaction spending this output,
    /// set on `Reserved → Pending`.
    pub pending_spend: Option<TxHash>,
}

impl Utxo {
    /// Build a freshly observed, spendable UTXO. Zero-value outputs are
    /// invalid on the ledger and rejected here.
    pub fn created(
        intent_hash: IntentHash,
        output_index: u32,
        owner: Address,
        token: TokenType,
        value: Balance,
        created_at: ChainPoint,
    ) -> Result<Self, WalletError> {
        if value == 0 {
            return Err(WalletError::BadParameter(
                "utxo value must be greater than zero".to_string(),
            ));
        }
        Ok(Self {
            intent_hash,
            output_index,
            owner,
            token,
            value,
            state: UtxoState::Available,
            created_at,
            spent_at: None,
            pending_spend: None,
        })
    }

    pub fn reference(&self) -> UtxoRef {
        UtxoRef::new(self.intent_hash, self.output_index)
    }

    pub fn is_available(&self) -> bool {
        self.state == UtxoState::Available
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::NetworkTag;

    fn addr() -> Address {
        Address::new(NetworkTag::Undeployed, [3u8; 32])
    }

    fn point(height: BlockHeight) -> ChainPoint {
        ChainPoint {
            height,
            tx_hash: TxHash::from_bytes([9u8; 32]),
        }
    }

    #[test]
    fn zero_value_rejected() {
        let r = Utxo::created(
            IntentHash::from_bytes([1u8; 32]),
            0,
            addr(),
            TokenType::NATIVE,
            0,
            point(1),
        );
        assert!(matches!(r, Err(WalletError::BadParameter(_))));
    }

    #[test]
    fn fresh_utxo_is_available_and_unspent() {
        let u = Utxo::created(
            IntentHash::from_bytes([1u8; 32]),
            2,
            addr(),
            TokenType::NATIVE,
            100,
            point(5),
        )
        .unwrap();
        assert!(u.is_available());
        assert_eq!(u.spent_at, None);
        assert_eq!(u.reference().output_index, 2);
    }

    #[test]
    fn storage_key_orders_by_index() {
        let h = IntentHash::from_bytes([7u8; 32]);
        let a = UtxoRef::new(h, 1).storage_key();
        let b = UtxoRef::new(h, 256).storage_key();
        assert!(a < b);
    }
}
