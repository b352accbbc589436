use serde_json::json;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};

use lantern_core::{
    BlockHeight, ChainPoint, PendingState, PendingTx, Timestamp, TxHash, WalletError,
    CONFIRMATION_DEPTH, PENDING_TICK_SECS,
};
use lantern_indexer::{GraphQlClient, TransactionUpdate};
use lantern_state::{UtxoStore, WalletDb};

use crate::builder::BuiltTransfer;

const SUBMIT_TRANSACTION: &str = "\
mutation SubmitTransaction($tx: String!) {
  submitTransaction(tx: $tx) {
    transactionHash
  }
}";

// ── SubmissionController ─────────────────────────────────────────────────────

/// Submits sealed transactions and drives their lifecycle:
/// Submitted → InBlock → Finalized, or Failed / Abandoned with the
/// reservation released.
///
/// Inclusion is learned by correlating reconciliation echoes with the set
/// of outstanding transaction hashes; finality by confirmation depth above
/// the inclusion height; expiry by comparing wall-clock time to each
/// pending TTL.
pub struct SubmissionController {
    client: GraphQlClient,
    store: Arc<UtxoStore>,
    db: Arc<WalletDb>,
    confirm_depth: u64,
    tip: AtomicU64,
}

impl SubmissionController {
    pub fn new(client: GraphQlClient, store: Arc<UtxoStore>, db: Arc<WalletDb>) -> Self {
        Self {
            client,
            store,
            db,
            confirm_depth: CONFIRMATION_DEPTH,
            tip: AtomicU64::new(0),
        }
    }

    // ── Submission ───────────────────────────────────────────────────────────

    /// Send sealed bytes to the indexer's submission endpoint.
    ///
    /// The sealed-binding guard runs first: an unsealed transaction never
    /// reaches the wire. Transport retries happen inside the request
    /// channel; a final failure releases the reservation and records the
    /// pending transaction as Failed.
    pub async fn submit(&self, built: BuiltTransfer) -> Result<TxHash, WalletError> {
        built.tx.assert_sealed()?;

        let tx_hash = built.tx_hash;
        let pending = built.pending;
        let variables = json!({ "tx": built.tx.to_hex() });

        match self.client.query(SUBMIT_TRANSACTION, variables).await {
            Ok(_) => {
                self.store.promote_pending(&pending.reserved, tx_hash)?;
                self.db.put_pending(&pending)?;
                info!(tx = %tx_hash, "transaction submitted");
                Ok(tx_hash)
            }
            Err(e) => {
                self.store.release(&pending.reserved)?;
                let mut failed = pending;
                failed.state = PendingState::Failed;
                self.db.put_pending(&failed)?;
                warn!(tx = %tx_hash, error = %e, "submission failed; reservations released");
                Err(match e {
                    WalletError::RemoteError { message, .. } => {
                        WalletError::SubmissionRejected { reason: message }
                    }
                    other => other,
                })
            }
        }
    }

    // ── Lifecycle ────────────────────────────────────────────────────────────

    /// Correlate one reconciliation echo with the outstanding set.
    pub fn on_echo(&self, echo: &TransactionUpdate) -> Result<(), WalletError> {
        self.tip.fetch_max(echo.block_height, Ordering::Relaxed);

        if let Some(mut pending) = self.db.get_pending(&echo.tx_hash)? {
            if !pending.is_terminal() {
                if pending.state == PendingState::Submitted {
                    pending.state = PendingState::InBlock {
                        height: echo.block_height,
                    };
                    for projected in &mut pending.projected {
                        projected.created_at = ChainPoint {
                            height: echo.block_height,
                            tx_hash: echo.tx_hash,
                        };
                    }
                    self.db.put_pending(&pending)?;
                    info!(tx = %echo.tx_hash, height = echo.block_height, "transaction in block");
                }
                if echo.finalized {
                    self.finalize(&mut pending, echo.block_height)?;
                }
            }
        }
        self.sweep_confirmations()
    }

    /// Wall-clock sweep: expire Submitted transactions past their TTL and
    /// finalize anything that reached confirmation depth.
    pub fn tick(&self, now: Timestamp) -> Result<(), WalletError> {
        for mut pending in self.db.iter_pending()? {
            if pending.state == PendingState::Submitted && now > pending.ttl {
                self.store.release(&pending.reserved)?;
                pending.projected.clear();
                pending.state = PendingState::Abandoned;
                self.db.put_pending(&pending)?;
                warn!(tx = %pending.tx_hash, "pending transaction expired; reservations released");
            }
        }
        self.sweep_confirmations()
    }

    fn sweep_confirmations(&self) -> Result<(), WalletError> {
        let tip = self.tip.load(Ordering::Relaxed);
        for mut pending in self.db.iter_pending()? {
            if let PendingState::InBlock { height } = pending.state {
                if tip >= height + self.confirm_depth {
                    self.finalize(&mut pending, height)?;
                }
            }
        }
        Ok(())
    }

    fn finalize(&self, pending: &mut PendingTx, height: BlockHeight) -> Result<(), WalletError> {
        let at = ChainPoint {
            height,
            tx_hash: pending.tx_hash,
        };
        for reference in &pending.reserved {
            self.store.mark_spent(reference, at)?;
        }
        // No-ops where the subscription echo already inserted the outputs.
        for projected in &pending.projected {
            self.store.upsert_created(projected.clone())?;
        }
        pending.state = PendingState::Finalized;
        self.db.put_pending(pending)?;
        info!(tx = %pending.tx_hash, height, "transaction finalized");
        Ok(())
    }

    // ── Polling task ─────────────────────────────────────────────────────────

    /// Consume reconciliation echoes and run the wall-clock sweep until
    /// shutdown.
    pub async fn run(
        self: Arc<Self>,
        mut echoes: broadcast::Receiver<TransactionUpdate>,
        mut shutdown: watch::Receiver<bool>,
    ) {
        let mut ticker = tokio::time::interval(Duration::from_secs(PENDING_TICK_SECS));
        loop {
            tokio::select! {
                _ = shutdown.changed() => return,
                _ = ticker.tick() => {
                    let now = chrono::Utc::now().timestamp();
                    if let Err(e) = self.tick(now) {
                        warn!(error = %e, "pending sweep failed");
                    }
                }
                echo = echoes.recv() => match echo {
                    Ok(echo) => {
                        if let Err(e) = self.on_echo(&echo) {
                            warn!(error = %e, "echo correlation failed");
                        }
                    }
                    Err(broadcast::error::RecvError::Lagged(skipped)) => {
                        warn!(skipped, "lagged behind reconciliation echoes");
                    }
                    Err(broadcast::error::RecvError::Closed) => return,
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lantern_core::{
        Address, Balance, IntentHash, NetworkTag, TokenType, Utxo, UtxoRef, UtxoState,
    };
    use lantern_indexer::IndexerConfig;
    use lantern_ledger::SealedTransaction;

    fn setup(name: &str) -> (SubmissionController, Arc<UtxoStore>, Arc<WalletDb>) {
        let dir = std::env::temp_dir().join(format!("lantern_submit_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        let db = Arc::new(WalletDb::open(&dir).expect("open temp db"));
        let store = Arc::new(UtxoStore::new(Arc::clone(&db)));
        // Loopback port with nothing listening: any attempt to reach the
        // endpoint fails fast.
        let client = GraphQlClient::new(IndexerConfig::with_base_url(
            NetworkTag::Undeployed,
            "http://127.0.0.1:1",
        ));
        let controller = SubmissionController::new(client, Arc::clone(&store), Arc::clone(&db));
        (controller, store, db)
    }

    fn addr() -> Address {
        Address::new(NetworkTag::Undeployed, [1u8; 32])
    }

    fn tracked_utxo(store: &UtxoStore, seed: u8, value: Balance) -> Utxo {
        let utxo = Utxo::created(
            IntentHash::from_bytes([seed; 32]),
            0,
            addr(),
            TokenType::NATIVE,
            value,
            ChainPoint {
                height: 1,
                tx_hash: TxHash::from_bytes([seed; 32]),
            },
        )
        .unwrap();
        store.upsert_created(utxo.clone()).unwrap();
        utxo
    }

    fn pending_spend(
        store: &UtxoStore,
        db: &WalletDb,
        tx_hash: TxHash,
        inputs: &[UtxoRef],
        ttl: Timestamp,
    ) -> PendingTx {
        store.reserve(&addr(), TokenType::NATIVE, 100).unwrap();
        store.promote_pending(inputs, tx_hash).unwrap();
        let pending = PendingTx {
            tx_hash,
            reserved: inputs.to_vec(),
            projected: vec![],
            submitted_at: 0,
            ttl,
            state: PendingState::Submitted,
        };
        db.put_pending(&pending).unwrap();
        pending
    }

    fn echo(tx_hash: TxHash, height: BlockHeight, spent: Vec<UtxoRef>) -> TransactionUpdate {
        TransactionUpdate {
            id: height,
            tx_hash,
            block_height: height,
            timestamp: 0,
            finalized: false,
            created: vec![],
            spent,
        }
    }

    #[tokio::test]
    async fn unsealed_bytes_never_reach_the_endpoint() {
        let (controller, store, _db) = setup("unsealed");
        let utxo = tracked_utxo(&store, 1, 100);
        let tx = SealedTransaction::from_bytes(b"proof-preimage[v1];pedersen[v1]:junk".to_vec());
        let built = BuiltTransfer {
            tx_hash: tx.tx_hash(),
            pending: PendingTx {
                tx_hash: tx.tx_hash(),
                reserved: vec![utxo.reference()],
                projected: vec![],
                submitted_at: 0,
                ttl: i64::MAX,
                state: PendingState::Submitted,
            },
            tx,
        };
        // An unreachable endpoint would yield NotConnected; the guard must
        // fire before any connection is attempted.
        let err = controller.submit(built).await.unwrap_err();
        assert!(matches!(err, WalletError::UnsealedBindingRejected(_)));
    }

    #[tokio::test]
    async fn transport_failure_releases_the_reservation() {
        let (controller, store, _db) = setup("transport");
        let utxo = tracked_utxo(&store, 1, 100);
        store.reserve(&addr(), TokenType::NATIVE, 100).unwrap();

        let tx = SealedTransaction::from_bytes(
            b"proof-preimage[v1];pedersen-schnorr[v1]:junk".to_vec(),
        );
        let built = BuiltTransfer {
            tx_hash: tx.tx_hash(),
            pending: PendingTx {
                tx_hash: tx.tx_hash(),
                reserved: vec![utxo.reference()],
                projected: vec![],
                submitted_at: 0,
                ttl: i64::MAX,
                state: PendingState::Submitted,
            },
            tx,
        };
        let err = controller.submit(built).await.unwrap_err();
        assert!(matches!(err, WalletError::NotConnected));
        assert_eq!(
            store.get(&utxo.reference()).unwrap().unwrap().state,
            UtxoState::Available
        );
    }

    #[tokio::test]
    async fn echo_then_depth_finalizes_the_spend() {
        let (controller, store, db) = setup("finalize");
        let utxo = tracked_utxo(&store, 1, 100);
        let refs = [utxo.reference()];
        let tx_hash = TxHash::from_bytes([0xaa; 32]);
        pending_spend(&store, &db, tx_hash, &refs, i64::MAX);

        controller.on_echo(&echo(tx_hash, 10, refs.to_vec())).unwrap();
        assert_eq!(
            db.get_pending(&tx_hash).unwrap().unwrap().state,
            PendingState::InBlock { height: 10 }
        );

        // An unrelated echo pushes the tip past confirmation depth.
        controller
            .on_echo(&echo(TxHash::from_bytes([0xbb; 32]), 10 + CONFIRMATION_DEPTH, vec![]))
            .unwrap();
        assert_eq!(
            db.get_pending(&tx_hash).unwrap().unwrap().state,
            PendingState::Finalized
        );
        assert_eq!(
            store.get(&utxo.reference()).unwrap().unwrap().state,
            UtxoState::Spent
        );
    }

    #[tokio::test]
    async fn ttl_expiry_abandons_and_releases() {
        let (controller, store, db) = setup("expiry");
        let utxo = tracked_utxo(&store, 1, 100);
        let refs = [utxo.reference()];
        let tx_hash = TxHash::from_bytes([0xcc; 32]);
        pending_spend(&store, &db, tx_hash, &refs, 1_000);

        controller.tick(2_000).unwrap();
        assert_eq!(
            db.get_pending(&tx_hash).unwrap().unwrap().state,
            PendingState::Abandoned
        );
        assert_eq!(
            store.get(&utxo.reference()).unwrap().unwrap().state,
            UtxoState::Available
        );
    }
}
