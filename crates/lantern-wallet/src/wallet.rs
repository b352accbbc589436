use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::watch;
use tokio::task::JoinHandle;

use lantern_core::{Address, Balance, NetworkTag, TokenType, TxHash, WalletError};
use lantern_indexer::{GraphQlClient, IndexerConfig};
use lantern_keys::{identity, master_from_seed, to_seed, DerivedIdentity, Role};
use lantern_state::{balance_by_token, SyncEngine, UtxoStore, WalletDb};
use lantern_tx::{SubmissionController, TransferBuilder};

// ── Wallet ───────────────────────────────────────────────────────────────────

/// The assembled wallet: derived identities, local state, reconciliation
/// and the spending pipeline, wired for one account on one network.
pub struct Wallet {
    network: NetworkTag,
    config: IndexerConfig,
    store: Arc<UtxoStore>,
    engine: Arc<SyncEngine>,
    controller: Arc<SubmissionController>,
    builder: TransferBuilder,
    identity: DerivedIdentity,
}

impl Wallet {
    /// Derive identities from the mnemonic and open the local database.
    /// The mnemonic itself is dropped before this returns; only derived
    /// key material lives in the wallet.
    pub fn open<P: AsRef<Path>>(
        phrase: &str,
        passphrase: &str,
        network: NetworkTag,
        config: IndexerConfig,
        db_path: P,
    ) -> Result<Self, WalletError> {
        let seed = to_seed(phrase, passphrase)?;
        let master = master_from_seed(&seed)?;
        let external = identity(&master, 0, Role::NightExternal, 0)?;
        let internal = identity(&master, 0, Role::NightInternal, 0)?;

        let db = Arc::new(WalletDb::open(db_path)?);
        let store = Arc::new(UtxoStore::new(Arc::clone(&db)));
        let engine = Arc::new(SyncEngine::new(
            external.address(network),
            vec![external.address(network), internal.address(network)],
            Arc::clone(&store),
            Arc::clone(&db),
        )?);
        let controller = Arc::new(SubmissionController::new(
            GraphQlClient::new(config.clone()),
            Arc::clone(&store),
            Arc::clone(&db),
        ));
        let builder = TransferBuilder::new(network, internal.address(network));

        Ok(Self {
            network,
            config,
            store,
            engine,
            controller,
            builder,
            identity: external,
        })
    }

    pub fn network(&self) -> NetworkTag {
        self.network
    }

    /// The receive address (NightExternal/0/0).
    pub fn address(&self) -> Address {
        self.identity.address(self.network)
    }

    pub fn store(&self) -> &Arc<UtxoStore> {
        &self.store
    }

    /// Spendable balances per token from the local store.
    pub fn balances(&self) -> Result<BTreeMap<TokenType, Balance>, WalletError> {
        balance_by_token(&self.store, &self.address())
    }

    /// Build, seal and submit a transfer. Returns the transaction hash the
    /// sync loop will track to finality.
    pub async fn send(
        &self,
        recipient: &str,
        token: TokenType,
        amount: Balance,
    ) -> Result<TxHash, WalletError> {
        let built = self.builder.build_transfer(
            &self.store,
            &self.identity,
            recipient,
            token,
            amount,
            None,
        )?;
        self.controller.submit(built).await
    }

    /// Spawn the reconciliation loop and the submission poller.
    pub fn start_sync(&self) -> SyncHandle {
        let (shutdown, shutdown_rx) = watch::channel(false);
        let engine_task = tokio::spawn(
            Arc::clone(&self.engine).run(self.config.clone(), shutdown_rx.clone()),
        );
        let controller_task =
            tokio::spawn(Arc::clone(&self.controller).run(self.engine.echoes(), shutdown_rx));
        SyncHandle {
            shutdown,
            engine_task,
            controller_task,
        }
    }
}

// ── SyncHandle ───────────────────────────────────────────────────────────────

/// Running sync tasks; dropping without `stop` aborts them with the
/// runtime.
pub struct SyncHandle {
    shutdown: watch::Sender<bool>,
    engine_task: JoinHandle<Result<(), WalletError>>,
    controller_task: JoinHandle<()>,
}

impl SyncHandle {
    /// Stop both tasks and surface any fatal reconciliation error.
    pub async fn stop(self) -> Result<(), WalletError> {
        let _ = self.shutdown.send(true);
        let engine_result = self
            .engine_task
            .await
            .map_err(|e| WalletError::Storage(e.to_string()))?;
        let _ = self.controller_task.await;
        engine_result
    }
}
