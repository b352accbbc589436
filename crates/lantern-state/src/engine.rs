use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use lantern_core::{
    Address, BlockHeight, ChainPoint, RecordId, WalletError, CURSOR_CHECKPOINT_RING,
    SHALLOW_REORG_DEPTH,
};
use lantern_indexer::{
    spawn_subscription, IndexerConfig, TransactionUpdate, WalletUpdate,
};

use crate::db::{SyncState, WalletDb};
use crate::store::UtxoStore;

/// Outcome of applying one update record.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Applied {
    /// Cursor advanced; store may have changed.
    Advanced,
    /// Replay echo or foreign record; nothing to do.
    Ignored,
    /// Reorg recovery ran; the caller must resubscribe from the rolled-back
    /// cursor so the fork is replayed.
    RolledBack,
}

// ── SyncEngine ───────────────────────────────────────────────────────────────

/// Applies the per-address update stream to the UTXO store.
///
/// The engine is the sole store mutator on the reconciliation path. Each
/// record is applied atomically (store writes commit per record); applying
/// any prefix of the stream twice leaves the store unchanged.
pub struct SyncEngine {
    /// Subscription address; sync state is keyed under it.
    address: Address,
    /// Every address whose created outputs we track — the subscription
    /// address plus internal-role change addresses.
    owned: Vec<Address>,
    store: Arc<UtxoStore>,
    db: Arc<WalletDb>,
    shallow_depth: u64,
    cursor_tx: watch::Sender<RecordId>,
    echoes: broadcast::Sender<TransactionUpdate>,
}

impl SyncEngine {
    pub fn new(
        address: Address,
        owned: Vec<Address>,
        store: Arc<UtxoStore>,
        db: Arc<WalletDb>,
    ) -> Result<Self, WalletError> {
        let initial = db.get_sync(&address)?.unwrap_or_default().cursor;
        let (cursor_tx, _) = watch::channel(initial);
        let (echoes, _) = broadcast::channel(64);
        let mut owned = owned;
        if !owned.contains(&address) {
            owned.push(address);
        }
        Ok(Self {
            address,
            owned,
            store,
            db,
            shallow_depth: SHALLOW_REORG_DEPTH,
            cursor_tx,
            echoes,
        })
    }

    pub fn address(&self) -> Address {
        self.address
    }

    /// Resume cursor channel, consumed by the subscription session.
    pub fn cursor(&self) -> watch::Receiver<RecordId> {
        self.cursor_tx.subscribe()
    }

    /// Applied transaction records, for submission-lifecycle correlation.
    pub fn echoes(&self) -> broadcast::Receiver<TransactionUpdate> {
        self.echoes.subscribe()
    }

    // ── Record application ───────────────────────────────────────────────────

    pub fn apply(&self, update: WalletUpdate) -> Result<Applied, WalletError> {
        match update {
            WalletUpdate::Transaction(tx) => self.apply_transaction(tx),
            WalletUpdate::Progress { last_id } => self.apply_progress(last_id),
        }
    }

    fn apply_transaction(&self, tx: TransactionUpdate) -> Result<Applied, WalletError> {
        let mut sync = self.db.get_sync(&self.address)?.unwrap_or_default();

        // Cursor-replay echoes arrive after every reconnect; the store is
        // already in this state.
        if tx.id <= sync.cursor {
            return Ok(Applied::Ignored);
        }

        // A spend we already recorded under a different transaction means
        // the chain we mirrored is gone.
        for reference in &tx.spent {
            if let Some(existing) = self.store.get(reference)? {
                if let Some(prev) = existing.spent_at {
                    if prev.tx_hash != tx.tx_hash {
                        let fork = prev.height.min(tx.block_height).saturating_sub(1);
                        let depth = sync.height.saturating_sub(fork);
                        warn!(depth, fork, tx = %tx.tx_hash, "conflicting spend; entering reorg recovery");
                        if depth <= self.shallow_depth && self.rollback_to(&mut sync, fork)? {
                            return Ok(Applied::RolledBack);
                        }
                        self.full_resync(&mut sync)?;
                        return Ok(Applied::RolledBack);
                    }
                }
            }
        }

        // The event log is global: records may reference addresses we do
        // not own. Keep only our outputs, touch only tracked spends.
        for created in &tx.created {
            if self.owned.contains(&created.owner) {
                self.store.upsert_created(created.clone())?;
            }
        }
        let spend_point = ChainPoint {
            height: tx.block_height,
            tx_hash: tx.tx_hash,
        };
        for reference in &tx.spent {
            if self.store.get(reference)?.is_some() {
                self.store.mark_spent(reference, spend_point)?;
            }
        }

        sync.cursor = tx.id;
        sync.height = sync.height.max(tx.block_height);
        push_checkpoint(&mut sync, tx.block_height, tx.id);
        self.db.put_sync(&self.address, &sync)?;
        self.cursor_tx.send_replace(sync.cursor);

        info!(id = tx.id, height = tx.block_height, tx = %tx.tx_hash, "applied update record");
        let _ = self.echoes.send(tx);
        Ok(Applied::Advanced)
    }

    fn apply_progress(&self, last_id: RecordId) -> Result<Applied, WalletError> {
        let mut sync = self.db.get_sync(&self.address)?.unwrap_or_default();
        if last_id < sync.cursor {
            // The server went backwards without any reorg signal. Refusing
            // to continue beats silently rewinding the store.
            return Err(WalletError::CursorRegression {
                stored: sync.cursor,
                received: last_id,
            });
        }
        if last_id == sync.cursor {
            return Ok(Applied::Ignored);
        }
        sync.cursor = last_id;
        self.db.put_sync(&self.address, &sync)?;
        self.cursor_tx.send_replace(sync.cursor);
        Ok(Applied::Advanced)
    }

    // ── Reorg recovery ───────────────────────────────────────────────────────

    /// Roll store and cursor back to the newest checkpoint at or below
    /// `fork_height`. Returns false when no such checkpoint survives, in
    /// which case only a full resync is safe.
    fn rollback_to(&self, sync: &mut SyncState, fork_height: BlockHeight) -> Result<bool, WalletError> {
        let Some(&(height, cursor)) = sync
            .checkpoints
            .iter()
            .rev()
            .find(|(h, _)| *h <= fork_height)
        else {
            return Ok(false);
        };

        for owned in &self.owned {
            for utxo in self.store.all_for(owned)? {
                if utxo.created_at.height > fork_height {
                    self.store.remove(&utxo.reference())?;
                } else if utxo.spent_at.is_some_and(|p| p.height > fork_height) {
                    self.store.unmark_spent(&utxo.reference())?;
                }
            }
        }

        sync.checkpoints.retain(|(h, _)| *h <= fork_height);
        sync.cursor = cursor;
        sync.height = height;
        self.db.put_sync(&self.address, sync)?;
        self.cursor_tx.send_replace(cursor);
        warn!(height, cursor, "rolled back to fork checkpoint");
        Ok(true)
    }

    /// Deep reorg: drop all address state and replay from the beginning.
    fn full_resync(&self, sync: &mut SyncState) -> Result<(), WalletError> {
        for owned in &self.owned {
            self.store.clear_address(owned)?;
        }
        *sync = SyncState::default();
        self.db.put_sync(&self.address, sync)?;
        self.cursor_tx.send_replace(0);
        warn!(address = %self.address, "deep reorg; full resync from cursor 0");
        Ok(())
    }

    // ── Sync loop ────────────────────────────────────────────────────────────

    /// Drive the subscription until shutdown. Reconnects and cursor-based
    /// replay are handled by the session; this loop resubscribes after
    /// reorg recovery and turns a cursor regression into a fatal exit.
    pub async fn run(
        self: Arc<Self>,
        config: IndexerConfig,
        mut shutdown: watch::Receiver<bool>,
    ) -> Result<(), WalletError> {
        loop {
            if *shutdown.borrow() {
                return Ok(());
            }
            let mut handle = spawn_subscription(config.clone(), self.address, self.cursor());
            let exit: Option<Result<(), WalletError>> = loop {
                tokio::select! {
                    _ = shutdown.changed() => break Some(Ok(())),
                    update = handle.updates.recv() => match update {
                        Some(update) => match self.apply(update) {
                            Ok(Applied::RolledBack) => break None,
                            Ok(_) => {}
                            Err(e @ WalletError::CursorRegression { .. }) => break Some(Err(e)),
                            Err(e) => {
                                warn!(error = %e, "failed to apply update record");
                                break None;
                            }
                        },
                        None => break None,
                    }
                }
            };
            handle.cancel().await;
            match exit {
                Some(result) => return result,
                None => tokio::time::sleep(Duration::from_millis(500)).await,
            }
        }
    }
}

fn push_checkpoint(sync: &mut SyncState, height: BlockHeight, cursor: RecordId) {
    match sync.checkpoints.last_mut() {
        Some((h, c)) if *h == height => *c = cursor,
        _ => sync.checkpoints.push((height, cursor)),
    }
    if sync.checkpoints.len() > CURSOR_CHECKPOINT_RING {
        let excess = sync.checkpoints.len() - CURSOR_CHECKPOINT_RING;
        sync.checkpoints.drain(..excess);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_core::{
        Balance, IntentHash, NetworkTag, TokenType, TxHash, Utxo, UtxoRef, UtxoState,
    };

    fn setup(name: &str) -> (Arc<SyncEngine>, Arc<UtxoStore>) {
        let dir = std::env::temp_dir().join(format!("lantern_engine_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        let db = Arc::new(WalletDb::open(&dir).expect("open temp db"));
        let store = Arc::new(UtxoStore::new(Arc::clone(&db)));
        let engine = Arc::new(
            SyncEngine::new(addr(), vec![addr(), change_addr()], Arc::clone(&store), db).unwrap(),
        );
        (engine, store)
    }

    fn addr() -> Address {
        Address::new(NetworkTag::Undeployed, [1u8; 32])
    }

    fn change_addr() -> Address {
        Address::new(NetworkTag::Undeployed, [7u8; 32])
    }

    fn other_addr() -> Address {
        Address::new(NetworkTag::Undeployed, [2u8; 32])
    }

    fn created(owner: Address, seed: u8, value: Balance, height: u64, tx: TxHash) -> Utxo {
        Utxo::created(
            IntentHash::from_bytes([seed; 32]),
            0,
            owner,
            TokenType::NATIVE,
            value,
            ChainPoint { height, tx_hash: tx },
        )
        .unwrap()
    }

    fn tx_hash(seed: u8) -> TxHash {
        TxHash::from_bytes([seed; 32])
    }

    fn record(id: u64, height: u64, tx: TxHash, created: Vec<Utxo>, spent: Vec<UtxoRef>) -> WalletUpdate {
        WalletUpdate::Transaction(TransactionUpdate {
            id,
            tx_hash: tx,
            block_height: height,
            timestamp: 1_700_000_000 + id as i64,
            finalized: false,
            created,
            spent,
        })
    }

    #[test]
    fn creates_and_spends_are_applied_in_order() {
        let (engine, store) = setup("apply");
        let u = created(addr(), 10, 500, 1, tx_hash(1));
        let r = u.reference();
        assert_eq!(
            engine.apply(record(1, 1, tx_hash(1), vec![u], vec![])).unwrap(),
            Applied::Advanced
        );
        assert_eq!(
            engine.apply(record(2, 2, tx_hash(2), vec![], vec![r])).unwrap(),
            Applied::Advanced
        );
        let got = store.get(&r).unwrap().unwrap();
        assert_eq!(got.state, UtxoState::Spent);
        assert_eq!(got.spent_at.unwrap().tx_hash, tx_hash(2));
    }

    #[test]
    fn change_outputs_to_the_internal_address_are_tracked() {
        let (engine, store) = setup("change_tracked");
        let change = created(change_addr(), 10, 50, 1, tx_hash(1));
        engine
            .apply(record(1, 1, tx_hash(1), vec![change.clone()], vec![]))
            .unwrap();
        assert!(store.get(&change.reference()).unwrap().is_some());
    }

    #[test]
    fn foreign_addresses_are_ignored() {
        let (engine, store) = setup("foreign");
        let u = created(other_addr(), 10, 500, 1, tx_hash(1));
        engine.apply(record(1, 1, tx_hash(1), vec![u.clone()], vec![])).unwrap();
        assert!(store.get(&u.reference()).unwrap().is_none());
        // Spends of outputs we never tracked are also no-ops.
        engine
            .apply(record(2, 2, tx_hash(2), vec![], vec![u.reference()]))
            .unwrap();
    }

    #[test]
    fn applying_a_prefix_twice_is_idempotent() {
        let (engine, store) = setup("idempotent");
        let (replayed, replay_store) = setup("idempotent_replay");

        let records: Vec<WalletUpdate> = (1..=10u64)
            .map(|i| {
                record(
                    i,
                    i,
                    tx_hash(i as u8),
                    vec![created(addr(), i as u8, 100 * i as u128, i, tx_hash(i as u8))],
                    vec![],
                )
            })
            .collect();

        for r in &records {
            engine.apply(r.clone()).unwrap();
        }
        // The replayed engine sees 1..=10, then 5..=10 again after a
        // "reconnect", then nothing new.
        for r in &records {
            replayed.apply(r.clone()).unwrap();
        }
        for r in &records[4..] {
            assert_eq!(replayed.apply(r.clone()).unwrap(), Applied::Ignored);
        }

        let mut a = store.all_for(&addr()).unwrap();
        let mut b = replay_store.all_for(&addr()).unwrap();
        a.sort_by_key(Utxo::reference);
        b.sort_by_key(Utxo::reference);
        assert_eq!(a, b);
    }

    #[test]
    fn progress_advances_and_regression_is_fatal() {
        let (engine, _) = setup("progress");
        engine.apply(WalletUpdate::Progress { last_id: 10 }).unwrap();
        assert_eq!(
            engine.apply(WalletUpdate::Progress { last_id: 10 }).unwrap(),
            Applied::Ignored
        );
        assert!(matches!(
            engine.apply(WalletUpdate::Progress { last_id: 5 }),
            Err(WalletError::CursorRegression {
                stored: 10,
                received: 5
            })
        ));
    }

    #[test]
    fn shallow_reorg_rolls_back_to_fork_and_replays() {
        let (engine, store) = setup("shallow_reorg");
        let u = created(addr(), 10, 500, 1, tx_hash(1));
        let r = u.reference();

        engine.apply(record(1, 1, tx_hash(1), vec![u], vec![])).unwrap();
        engine.apply(record(2, 2, tx_hash(2), vec![], vec![r])).unwrap();

        // The chain reorganized: a different transaction spends the same
        // output at height 2.
        let conflicting = record(3, 2, tx_hash(3), vec![], vec![r]);
        assert_eq!(engine.apply(conflicting.clone()).unwrap(), Applied::RolledBack);

        // Rolled back to the height-1 checkpoint: the output is live again
        // and the cursor rewound so the fork gets replayed.
        let rolled = store.get(&r).unwrap().unwrap();
        assert_eq!(rolled.state, UtxoState::Available);
        assert_eq!(*engine.cursor().borrow(), 1);

        // Replay of the winning branch converges.
        engine.apply(conflicting).unwrap();
        let got = store.get(&r).unwrap().unwrap();
        assert_eq!(got.state, UtxoState::Spent);
        assert_eq!(got.spent_at.unwrap().tx_hash, tx_hash(3));
    }

    #[test]
    fn reorg_without_a_checkpoint_forces_full_resync() {
        let (engine, store) = setup("deep_reorg");
        // Single record far up the chain: no checkpoint at or below the
        // fork will exist.
        let u = created(addr(), 10, 500, 100, tx_hash(1));
        let r = u.reference();
        engine.apply(record(1, 100, tx_hash(1), vec![u], vec![])).unwrap();
        engine.apply(record(2, 101, tx_hash(2), vec![], vec![r])).unwrap();

        // Conflict whose fork point is below every checkpoint.
        let conflict = WalletUpdate::Transaction(TransactionUpdate {
            id: 3,
            tx_hash: tx_hash(3),
            block_height: 50,
            timestamp: 0,
            finalized: false,
            created: vec![],
            spent: vec![r],
        });
        assert_eq!(engine.apply(conflict).unwrap(), Applied::RolledBack);
        assert!(store.all_for(&addr()).unwrap().is_empty());
        assert_eq!(*engine.cursor().borrow(), 0);
    }

    #[test]
    fn checkpoint_ring_is_bounded() {
        let mut sync = SyncState::default();
        for h in 0..200u64 {
            push_checkpoint(&mut sync, h, h);
        }
        assert_eq!(sync.checkpoints.len(), CURSOR_CHECKPOINT_RING);
        assert_eq!(sync.checkpoints.last(), Some(&(199, 199)));
    }
}
