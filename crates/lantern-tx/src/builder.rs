use std::sync::Arc;
use tracing::info;

use lantern_core::{
    Address, Balance, ChainPoint, Intent, IntentInput, IntentOutput, NetworkTag, PendingState,
    PendingTx, Timestamp, TokenType, TxHash, Utxo, UtxoRef, WalletError, DEFAULT_TTL_SECS,
};
use lantern_keys::DerivedIdentity;
use lantern_ledger::{
    binding_commitment, intent_signing_bytes, seal_transaction, sign, BindingScheme,
    SealedTransaction,
};
use lantern_state::UtxoStore;

use crate::fee::{FeePolicy, FlatFee};
use crate::selector::{select_and_reserve, Reservation};

/// A sealed transfer ready for submission, with the pending record that
/// tracks it to finality.
#[derive(Debug)]
pub struct BuiltTransfer {
    pub tx: SealedTransaction,
    pub tx_hash: TxHash,
    pub pending: PendingTx,
}

// ── TransferBuilder ──────────────────────────────────────────────────────────

/// Assembles, signs and seals unshielded transfers.
///
/// Change goes to the configured change address, which callers derive from
/// the sender's internal role so change never lands on the public receive
/// address.
pub struct TransferBuilder {
    pub network: NetworkTag,
    pub change_address: Address,
    fee: Arc<dyn FeePolicy>,
    pub ttl_window_secs: i64,
}

impl TransferBuilder {
    pub fn new(network: NetworkTag, change_address: Address) -> Self {
        Self {
            network,
            change_address,
            fee: Arc::new(FlatFee::default()),
            ttl_window_secs: DEFAULT_TTL_SECS,
        }
    }

    pub fn with_fee_policy(mut self, fee: Arc<dyn FeePolicy>) -> Self {
        self.fee = fee;
        self
    }

    /// Build a transfer of `amount` of `token` to `recipient`.
    ///
    /// Inputs are reserved before sealing; any failure past that point
    /// releases them. Key material never leaves the sender identity; it is
    /// handed to the ledger boundary for one signature per distinct input
    /// key and wiped with the identity.
    pub fn build_transfer(
        &self,
        store: &UtxoStore,
        sender: &DerivedIdentity,
        recipient: &str,
        token: TokenType,
        amount: Balance,
        ttl_override: Option<Timestamp>,
    ) -> Result<BuiltTransfer, WalletError> {
        let recipient = Address::validate_recipient(recipient, self.network)?;

        // Fee for the worst-case shape (payment + change output).
        let fee = self.fee.fee(1, 2);
        let sender_address = sender.address(self.network);
        let reservation = select_and_reserve(store, &sender_address, token, amount + fee)?;

        let now = chrono::Utc::now().timestamp();
        let ttl = ttl_override.unwrap_or(now + self.ttl_window_secs);

        match self.assemble(sender, &reservation, recipient, token, amount, fee, now, ttl) {
            Ok(built) => Ok(built),
            Err(e) => {
                let refs: Vec<UtxoRef> = reservation.inputs.iter().map(Utxo::reference).collect();
                store.release(&refs)?;
                Err(e)
            }
        }
    }

    #[allow(clippy::too_many_arguments)]
    fn assemble(
        &self,
        sender: &DerivedIdentity,
        reservation: &Reservation,
        recipient: Address,
        token: TokenType,
        amount: Balance,
        fee: Balance,
        now: Timestamp,
        ttl: Timestamp,
    ) -> Result<BuiltTransfer, WalletError> {
        let mut outputs = vec![IntentOutput {
            recipient,
            token,
            value: amount,
        }];
        let change = reservation.total - amount - fee;
        if change > 0 {
            outputs.push(IntentOutput {
                recipient: self.change_address,
                token,
                value: change,
            });
        }

        let inputs: Vec<IntentInput> = reservation
            .inputs
            .iter()
            .map(|u| IntentInput {
                utxo: u.reference(),
                owner: u.owner,
                token: u.token,
                value: u.value,
            })
            .collect();

        let intent = Intent {
            inputs,
            outputs,
            ttl,
            network: self.network,
        };

        // Value conservation per token; fee is the only permitted gap.
        let (ins, outs) = intent.token_sums();
        let spent = ins.get(&token).copied().unwrap_or(0);
        let produced = outs.get(&token).copied().unwrap_or(0);
        if spent != produced + fee {
            return Err(WalletError::SealFailed(format!(
                "intent does not balance: {spent} in, {produced} out, {fee} fee"
            )));
        }

        let digest = intent_signing_bytes(&intent);
        // One signature per distinct input key; every input here belongs to
        // the sender identity.
        let signature = sign(sender.secret_bytes(), &digest)?;
        let commitment = binding_commitment(&intent);
        let sealed = seal_transaction(&intent, &[signature], &commitment, BindingScheme::PedersenSchnorr)?;
        sealed.assert_sealed()?;

        let tx_hash = sealed.tx_hash();
        let intent_hash = SealedTransaction::intent_hash(&intent);

        // Outputs coming back to us become visible once the transaction
        // finalizes, unless the subscription echo delivers them first. The
        // inclusion height is filled in when the echo arrives.
        let sender_address = sender.address(self.network);
        let projected = intent
            .outputs
            .iter()
            .enumerate()
            .filter(|(_, o)| o.recipient == self.change_address || o.recipient == sender_address)
            .map(|(index, o)| {
                Utxo::created(
                    intent_hash,
                    index as u32,
                    o.recipient,
                    o.token,
                    o.value,
                    ChainPoint { height: 0, tx_hash },
                )
            })
            .collect::<Result<Vec<_>, _>>()?;

        let pending = PendingTx {
            tx_hash,
            reserved: reservation.inputs.iter().map(Utxo::reference).collect(),
            projected,
            submitted_at: now,
            ttl,
            state: PendingState::Submitted,
        };

        info!(tx = %tx_hash, inputs = pending.reserved.len(), change, "built transfer");
        Ok(BuiltTransfer {
            tx: sealed,
            tx_hash,
            pending,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_core::{IntentHash, UtxoState};
    use lantern_keys::{identity, master_from_seed, to_seed, Role};
    use lantern_state::WalletDb;

    const PHRASE: &str = "abandon abandon abandon abandon abandon abandon abandon abandon \
                          abandon abandon abandon abandon abandon abandon abandon abandon \
                          abandon abandon abandon abandon abandon abandon abandon art";

    fn sender() -> DerivedIdentity {
        let master = master_from_seed(&to_seed(PHRASE, "").unwrap()).unwrap();
        identity(&master, 0, Role::NightExternal, 0).unwrap()
    }

    fn change_address() -> Address {
        let master = master_from_seed(&to_seed(PHRASE, "").unwrap()).unwrap();
        identity(&master, 0, Role::NightInternal, 0)
            .unwrap()
            .address(NetworkTag::Undeployed)
    }

    fn temp_store(name: &str) -> UtxoStore {
        let dir = std::env::temp_dir().join(format!("lantern_builder_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        UtxoStore::new(std::sync::Arc::new(WalletDb::open(&dir).expect("open temp db")))
    }

    fn seed(store: &UtxoStore, owner: Address, values: &[Balance]) {
        for (i, v) in values.iter().enumerate() {
            store
                .upsert_created(
                    Utxo::created(
                        IntentHash::from_bytes([i as u8 + 1; 32]),
                        0,
                        owner,
                        TokenType::NATIVE,
                        *v,
                        ChainPoint {
                            height: 1,
                            tx_hash: TxHash::from_bytes([i as u8 + 1; 32]),
                        },
                    )
                    .unwrap(),
                )
                .unwrap();
        }
    }

    fn recipient() -> String {
        Address::new(NetworkTag::Undeployed, [0x77; 32]).encode()
    }

    #[test]
    fn exact_send_produces_no_change() {
        let sender = sender();
        let store = temp_store("exact");
        seed(&store, sender.address(NetworkTag::Undeployed), &[100, 50, 200, 75]);

        let builder = TransferBuilder::new(NetworkTag::Undeployed, change_address());
        let built = builder
            .build_transfer(&store, &sender, &recipient(), TokenType::NATIVE, 125, None)
            .unwrap();

        assert_eq!(built.pending.reserved.len(), 2);
        assert!(built.pending.projected.is_empty());
        assert!(built
            .tx
            .binding_tag()
            .unwrap()
            .contains("pedersen-schnorr[v1]"));
    }

    #[test]
    fn overshoot_sends_change_to_the_internal_address() {
        let sender = sender();
        let store = temp_store("change");
        seed(&store, sender.address(NetworkTag::Undeployed), &[100, 100]);

        let builder = TransferBuilder::new(NetworkTag::Undeployed, change_address());
        let built = builder
            .build_transfer(&store, &sender, &recipient(), TokenType::NATIVE, 150, None)
            .unwrap();

        assert_eq!(built.pending.reserved.len(), 2);
        assert_eq!(built.pending.projected.len(), 1);
        let change = &built.pending.projected[0];
        assert_eq!(change.owner, change_address());
        assert_eq!(change.value, 50);
        assert_eq!(change.output_index, 1);
    }

    #[test]
    fn insufficient_funds_leaves_the_store_untouched() {
        let sender = sender();
        let store = temp_store("insufficient");
        seed(&store, sender.address(NetworkTag::Undeployed), &[100]);

        let builder = TransferBuilder::new(NetworkTag::Undeployed, change_address());
        let err = builder
            .build_transfer(&store, &sender, &recipient(), TokenType::NATIVE, 150, None)
            .unwrap_err();
        assert!(matches!(err, WalletError::InsufficientFunds { .. }));

        let unspent = store.unspent(&sender.address(NetworkTag::Undeployed)).unwrap();
        assert_eq!(unspent.len(), 1);
        assert_eq!(unspent[0].state, UtxoState::Available);
    }

    #[test]
    fn recipient_on_the_wrong_network_releases_nothing() {
        let sender = sender();
        let store = temp_store("network");
        seed(&store, sender.address(NetworkTag::Undeployed), &[100]);

        let builder = TransferBuilder::new(NetworkTag::Undeployed, change_address());
        let wrong = Address::new(NetworkTag::Test, [0x77; 32]).encode();
        let err = builder
            .build_transfer(&store, &sender, &wrong, TokenType::NATIVE, 50, None)
            .unwrap_err();
        assert!(matches!(err, WalletError::NetworkMismatch { .. }));
        assert_eq!(
            store.unspent(&sender.address(NetworkTag::Undeployed)).unwrap().len(),
            1
        );
    }

    #[test]
    fn sealed_output_is_stable_and_passes_the_guard() {
        let sender = sender();
        let store = temp_store("sealed");
        seed(&store, sender.address(NetworkTag::Undeployed), &[100]);

        let builder = TransferBuilder::new(NetworkTag::Undeployed, change_address());
        let built = builder
            .build_transfer(&store, &sender, &recipient(), TokenType::NATIVE, 100, None)
            .unwrap();

        assert_eq!(built.tx_hash, built.tx.tx_hash());
        built.tx.assert_sealed().unwrap();
    }
}
