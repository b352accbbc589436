use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::address::Address;
use crate::types::{Balance, BlockHeight, NetworkTag, Timestamp, TokenType, TxHash};
use crate::utxo::{Utxo, UtxoRef};

// ── Intent ───────────────────────────────────────────────────────────────────

/// An input consumed by an intent. Carries the owning address and value so
/// the signing digest commits to what is being spent, not just to a
/// reference.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentInput {
    pub utxo: UtxoRef,
    pub owner: Address,
    pub token: TokenType,
    pub value: Balance,
}

/// An output an intent will create.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct IntentOutput {
    pub recipient: Address,
    pub token: TokenType,
    pub value: Balance,
}

/// The pre-seal description of an unshielded transfer: what is consumed,
/// what is created, and until when the ledger may include it.
///
/// The canonical bincode encoding of this struct is what the signing digest
/// and the binding commitment are computed over.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Intent {
    pub inputs: Vec<IntentInput>,
    pub outputs: Vec<IntentOutput>,
    pub ttl: Timestamp,
    pub network: NetworkTag,
}

impl Intent {
    /// Canonical bytes for hashing and signing.
    pub fn body_bytes(&self) -> Vec<u8> {
        bincode::serialize(self).expect("intent serialization is infallible")
    }

    /// Per-token input and output sums.
    pub fn token_sums(&self) -> (BTreeMap<TokenType, Balance>, BTreeMap<TokenType, Balance>) {
        let mut ins: BTreeMap<TokenType, Balance> = BTreeMap::new();
        let mut outs: BTreeMap<TokenType, Balance> = BTreeMap::new();
        for i in &self.inputs {
            *ins.entry(i.token).or_default() += i.value;
        }
        for o in &self.outputs {
            *outs.entry(o.token).or_default() += o.value;
        }
        (ins, outs)
    }

    /// Value conservation: inputs equal outputs for every token.
    pub fn balanced(&self) -> bool {
        let (ins, outs) = self.token_sums();
        ins == outs
    }
}

// ── PendingTx ────────────────────────────────────────────────────────────────

/// Lifecycle of a submitted transaction.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum PendingState {
    Submitted,
    InBlock { height: BlockHeight },
    Finalized,
    Failed,
    /// TTL exceeded without an inclusion echo. Treated exactly as Failed.
    Abandoned,
}

/// A locally submitted transaction being tracked to finality.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PendingTx {
    pub tx_hash: TxHash,
    /// Inputs held in Reserved/Pending state until the outcome is known.
    pub reserved: Vec<UtxoRef>,
    /// Outputs addressed back to us (change); inserted on finalization if
    /// the subscription echo has not already delivered them.
    pub projected: Vec<Utxo>,
    pub submitted_at: Timestamp,
    pub ttl: Timestamp,
    pub state: PendingState,
}

impl PendingTx {
    pub fn is_terminal(&self) -> bool {
        matches!(
            self.state,
            PendingState::Finalized | PendingState::Failed | PendingState::Abandoned
        )
    }
}
