use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::warn;

use lantern_core::{Address, BlockHeight, PendingTx, RecordId, TxHash, Utxo, UtxoRef, WalletError};

/// Bumped on storage-layout changes. A mismatch on open wipes the UTXO and
/// sync trees so the replay from cursor 0 rebuilds them; UTXO identity is
/// preserved because the primary key (intent hash, output index) comes from
/// the chain, not from this schema.
pub const SCHEMA_VERSION: u32 = 1;

const SCHEMA_KEY: &str = "schema_version";

// ── SyncState ────────────────────────────────────────────────────────────────

/// Per-address subscription progress.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SyncState {
    /// Last update-record id successfully applied.
    pub cursor: RecordId,
    /// Highest block height seen.
    pub height: BlockHeight,
    /// Recent (height → cursor) checkpoints, oldest first, bounded by
    /// `CURSOR_CHECKPOINT_RING`. Safe resume points for shallow reorgs.
    pub checkpoints: Vec<(BlockHeight, RecordId)>,
}

// ── WalletDb ─────────────────────────────────────────────────────────────────

/// Persistent wallet database backed by sled (pure-Rust, no C dependencies).
///
/// Named trees:
///   utxos   — intent_hash ∥ output_index_be → bincode(Utxo)
///   sync    — address bech32 bytes          → bincode(SyncState)
///   pending — tx_hash bytes                 → bincode(PendingTx)
///   meta    — utf8 key bytes                → raw bytes
pub struct WalletDb {
    _db: sled::Db,
    utxos: sled::Tree,
    sync: sled::Tree,
    pending: sled::Tree,
    meta: sled::Tree,
}

impl WalletDb {
    /// Open or create the wallet database at `path`, enforcing the schema
    /// version gate.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, WalletError> {
        let db = sled::open(path).map_err(|e| WalletError::Storage(e.to_string()))?;
        let utxos   = db.open_tree("utxos").map_err(|e| WalletError::Storage(e.to_string()))?;
        let sync    = db.open_tree("sync").map_err(|e| WalletError::Storage(e.to_string()))?;
        let pending = db.open_tree("pending").map_err(|e| WalletError::Storage(e.to_string()))?;
        let meta    = db.open_tree("meta").map_err(|e| WalletError::Storage(e.to_string()))?;

        let this = Self { _db: db, utxos, sync, pending, meta };
        this.enforce_schema()?;
        Ok(this)
    }

    fn enforce_schema(&self) -> Result<(), WalletError> {
        let stored = self
            .meta
            .get(SCHEMA_KEY.as_bytes())
            .map_err(|e| WalletError::Storage(e.to_string()))?
            .map(|b| {
                let arr: [u8; 4] = b.as_ref().try_into().map_err(|_| {
                    WalletError::Storage("corrupt schema_version entry".to_string())
                })?;
                Ok::<u32, WalletError>(u32::from_be_bytes(arr))
            })
            .transpose()?;
        match stored {
            Some(v) if v == SCHEMA_VERSION => Ok(()),
            Some(v) => {
                warn!(stored = v, current = SCHEMA_VERSION, "schema changed; forcing resync");
                self.utxos
                    .clear()
                    .map_err(|e| WalletError::Storage(e.to_string()))?;
                self.sync
                    .clear()
                    .map_err(|e| WalletError::Storage(e.to_string()))?;
                self.write_schema()
            }
            None => self.write_schema(),
        }
    }

    fn write_schema(&self) -> Result<(), WalletError> {
        self.meta
            .insert(SCHEMA_KEY.as_bytes(), &SCHEMA_VERSION.to_be_bytes())
            .map_err(|e| WalletError::Storage(e.to_string()))?;
        Ok(())
    }

    // ── UTXOs ────────────────────────────────────────────────────────────────

    pub fn get_utxo(&self, reference: &UtxoRef) -> Result<Option<Utxo>, WalletError> {
        match self
            .utxos
            .get(reference.storage_key())
            .map_err(|e| WalletError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let utxo = bincode::deserialize(&bytes)
                    .map_err(|e| WalletError::Serialization(e.to_string()))?;
                Ok(Some(utxo))
            }
            None => Ok(None),
        }
    }

    pub fn put_utxo(&self, utxo: &Utxo) -> Result<(), WalletError> {
        let bytes =
            bincode::serialize(utxo).map_err(|e| WalletError::Serialization(e.to_string()))?;
        self.utxos
            .insert(utxo.reference().storage_key(), bytes)
            .map_err(|e| WalletError::Storage(e.to_string()))?;
        Ok(())
    }

    pub fn remove_utxo(&self, reference: &UtxoRef) -> Result<(), WalletError> {
        self.utxos
            .remove(reference.storage_key())
            .map_err(|e| WalletError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Every tracked UTXO owned by `address`.
    pub fn iter_utxos_for(&self, address: &Address) -> Result<Vec<Utxo>, WalletError> {
        let mut result = Vec::new();
        for item in self.utxos.iter() {
            let (_, bytes) = item.map_err(|e| WalletError::Storage(e.to_string()))?;
            let utxo: Utxo = bincode::deserialize(&bytes)
                .map_err(|e| WalletError::Serialization(e.to_string()))?;
            if utxo.owner == *address {
                result.push(utxo);
            }
        }
        Ok(result)
    }

    // ── Sync state ───────────────────────────────────────────────────────────

    pub fn get_sync(&self, address: &Address) -> Result<Option<SyncState>, WalletError> {
        match self
            .sync
            .get(address.encode().as_bytes())
            .map_err(|e| WalletError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let state = bincode::deserialize(&bytes)
                    .map_err(|e| WalletError::Serialization(e.to_string()))?;
                Ok(Some(state))
            }
            None => Ok(None),
        }
    }

    pub fn put_sync(&self, address: &Address, state: &SyncState) -> Result<(), WalletError> {
        let bytes =
            bincode::serialize(state).map_err(|e| WalletError::Serialization(e.to_string()))?;
        self.sync
            .insert(address.encode().as_bytes(), bytes)
            .map_err(|e| WalletError::Storage(e.to_string()))?;
        Ok(())
    }

    // ── Pending transactions ─────────────────────────────────────────────────

    pub fn get_pending(&self, tx_hash: &TxHash) -> Result<Option<PendingTx>, WalletError> {
        match self
            .pending
            .get(tx_hash.as_bytes())
            .map_err(|e| WalletError::Storage(e.to_string()))?
        {
            Some(bytes) => {
                let pending = bincode::deserialize(&bytes)
                    .map_err(|e| WalletError::Serialization(e.to_string()))?;
                Ok(Some(pending))
            }
            None => Ok(None),
        }
    }

    pub fn put_pending(&self, pending: &PendingTx) -> Result<(), WalletError> {
        let bytes =
            bincode::serialize(pending).map_err(|e| WalletError::Serialization(e.to_string()))?;
        self.pending
            .insert(pending.tx_hash.as_bytes(), bytes)
            .map_err(|e| WalletError::Storage(e.to_string()))?;
        Ok(())
    }

    /// Every pending transaction, terminal ones included.
    pub fn iter_pending(&self) -> Result<Vec<PendingTx>, WalletError> {
        let mut result = Vec::new();
        for item in self.pending.iter() {
            let (_, bytes) = item.map_err(|e| WalletError::Storage(e.to_string()))?;
            let pending: PendingTx = bincode::deserialize(&bytes)
                .map_err(|e| WalletError::Serialization(e.to_string()))?;
            result.push(pending);
        }
        Ok(result)
    }

    /// Flush all pending writes to disk.
    pub fn flush(&self) -> Result<(), WalletError> {
        self._db
            .flush()
            .map_err(|e| WalletError::Storage(e.to_string()))?;
        Ok(())
    }
}
