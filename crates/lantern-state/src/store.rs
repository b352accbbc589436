use std::sync::{Arc, Mutex};
use tokio::sync::watch;

use lantern_core::{
    Address, Balance, ChainPoint, TokenType, TxHash, Utxo, UtxoRef, UtxoState, WalletError,
};

use crate::db::WalletDb;

/// Shared-mutable UTXO store.
///
/// All writes are serialized behind one lock and each operation commits as a
/// single unit; callers never pair a read with a later write. A version
/// counter is published after every commit so observers can recompute their
/// projections. No operation awaits while holding the lock.
pub struct UtxoStore {
    db: Arc<WalletDb>,
    lock: Mutex<()>,
    version: watch::Sender<u64>,
}

impl UtxoStore {
    pub fn new(db: Arc<WalletDb>) -> Self {
        let (version, _) = watch::channel(0);
        Self {
            db,
            lock: Mutex::new(()),
            version,
        }
    }

    /// Change notifications: the value is a commit counter, observers
    /// re-read whatever projection they need on each tick.
    pub fn observe(&self) -> watch::Receiver<u64> {
        self.version.subscribe()
    }

    fn notify(&self) {
        self.version.send_modify(|v| *v += 1);
    }

    // ── Reads ────────────────────────────────────────────────────────────────

    pub fn get(&self, reference: &UtxoRef) -> Result<Option<Utxo>, WalletError> {
        let _guard = self.lock.lock().expect("utxo store lock poisoned");
        self.db.get_utxo(reference)
    }

    /// Available UTXOs of `address`. Read path only; selection goes through
    /// `reserve`.
    pub fn unspent(&self, address: &Address) -> Result<Vec<Utxo>, WalletError> {
        let _guard = self.lock.lock().expect("utxo store lock poisoned");
        Ok(self
            .db
            .iter_utxos_for(address)?
            .into_iter()
            .filter(Utxo::is_available)
            .collect())
    }

    /// Every tracked UTXO of `address`, any state.
    pub fn all_for(&self, address: &Address) -> Result<Vec<Utxo>, WalletError> {
        let _guard = self.lock.lock().expect("utxo store lock poisoned");
        self.db.iter_utxos_for(address)
    }

    // ── Reconciliation writes ────────────────────────────────────────────────

    /// Record a chain-created UTXO. Idempotent: an already-tracked output is
    /// left untouched. Returns whether a row was inserted.
    pub fn upsert_created(&self, utxo: Utxo) -> Result<bool, WalletError> {
        let _guard = self.lock.lock().expect("utxo store lock poisoned");
        if self.db.get_utxo(&utxo.reference())?.is_some() {
            return Ok(false);
        }
        self.db.put_utxo(&utxo)?;
        drop(_guard);
        self.notify();
        Ok(true)
    }

    /// Record a confirmed spend. Idempotent; unknown references are ignored
    /// (the global log carries spends of outputs we never tracked).
    pub fn mark_spent(&self, reference: &UtxoRef, at: ChainPoint) -> Result<(), WalletError> {
        let _guard = self.lock.lock().expect("utxo store lock poisoned");
        let Some(mut utxo) = self.db.get_utxo(reference)? else {
            return Ok(());
        };
        if utxo.state == UtxoState::Spent && utxo.spent_at == Some(at) {
            return Ok(());
        }
        utxo.state = UtxoState::Spent;
        utxo.spent_at = Some(at);
        self.db.put_utxo(&utxo)?;
        drop(_guard);
        self.notify();
        Ok(())
    }

    /// Reorg recovery: forget a creation that is no longer on the chain.
    pub fn remove(&self, reference: &UtxoRef) -> Result<(), WalletError> {
        let _guard = self.lock.lock().expect("utxo store lock poisoned");
        self.db.remove_utxo(reference)?;
        drop(_guard);
        self.notify();
        Ok(())
    }

    /// Reorg recovery: a spend fell off the chain, the output is live again.
    pub fn unmark_spent(&self, reference: &UtxoRef) -> Result<(), WalletError> {
        let _guard = self.lock.lock().expect("utxo store lock poisoned");
        let Some(mut utxo) = self.db.get_utxo(reference)? else {
            return Ok(());
        };
        utxo.state = UtxoState::Available;
        utxo.spent_at = None;
        utxo.pending_spend = None;
        self.db.put_utxo(&utxo)?;
        drop(_guard);
        self.notify();
        Ok(())
    }

    /// Drop every row of `address`. Used by deep-reorg resync.
    pub fn clear_address(&self, address: &Address) -> Result<(), WalletError> {
        let _guard = self.lock.lock().expect("utxo store lock poisoned");
        for utxo in self.db.iter_utxos_for(address)? {
            self.db.remove_utxo(&utxo.reference())?;
        }
        drop(_guard);
        self.notify();
        Ok(())
    }

    // ── Spending writes ──────────────────────────────────────────────────────

    /// Select smallest-first and transition the selection to Reserved in one
    /// atomic unit. No intermediate state is observable: concurrent callers
    /// serialize on the store lock and each sees either none or all of a
    /// reservation.
    ///
    /// Ties are broken by (intent_hash, output_index) so selection is
    /// deterministic. Smallest-first deliberately spends many small coins
    /// before one large one.
    pub fn reserve(
        &self,
        address: &Address,
        token: TokenType,
        amount: Balance,
    ) -> Result<Vec<Utxo>, WalletError> {
        if amount == 0 {
            return Err(WalletError::BadParameter(
                "amount must be greater than zero".to_string(),
            ));
        }
        let _guard = self.lock.lock().expect("utxo store lock poisoned");

        let mut candidates: Vec<Utxo> = self
            .db
            .iter_utxos_for(address)?
            .into_iter()
            .filter(|u| u.is_available() && u.token == token)
            .collect();
        candidates.sort_by(|a, b| {
            (a.value, a.intent_hash, a.output_index).cmp(&(b.value, b.intent_hash, b.output_index))
        });

        let available: Balance = candidates.iter().map(|u| u.value).sum();
        if available < amount {
            return Err(WalletError::InsufficientFunds {
                required: amount,
                available,
            });
        }

        let mut selected = Vec::new();
        let mut total: Balance = 0;
        for mut utxo in candidates {
            utxo.state = UtxoState::Reserved;
            self.db.put_utxo(&utxo)?;
            total += utxo.value;
            selected.push(utxo);
            if total >= amount {
                break;
            }
        }
        drop(_guard);
        self.notify();
        Ok(selected)
    }

    /// Return reserved inputs to the spendable set.
    pub fn release(&self, refs: &[UtxoRef]) -> Result<(), WalletError> {
        let _guard = self.lock.lock().expect("utxo store lock poisoned");
        for reference in refs {
            if let Some(mut utxo) = self.db.get_utxo(reference)? {
                if matches!(utxo.state, UtxoState::Reserved | UtxoState::Pending) {
                    utxo.state = UtxoState::Available;
                    utxo.pending_spend = None;
                    self.db.put_utxo(&utxo)?;
                }
            }
        }
        drop(_guard);
        self.notify();
        Ok(())
    }

    /// Reserved → Pending once a spend of these inputs has been submitted,
    /// tagged with the submitted transaction hash.
    pub fn promote_pending(&self, refs: &[UtxoRef], tx_hash: TxHash) -> Result<(), WalletError> {
        let _guard = self.lock.lock().expect("utxo store lock poisoned");
        for reference in refs {
            if let Some(mut utxo) = self.db.get_utxo(reference)? {
                if utxo.state == UtxoState::Reserved {
                    utxo.state = UtxoState::Pending;
                    utxo.pending_spend = Some(tx_hash);
                    self.db.put_utxo(&utxo)?;
                }
            }
        }
        drop(_guard);
        self.notify();
        Ok(())
    }
}
