use serde::Deserialize;
use serde_json::{json, Value};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{info, warn};

use lantern_core::{
    Address, BlockHeight, ChainPoint, IntentHash, RecordId, Timestamp, TokenType, TxHash, Utxo,
    UtxoRef, WalletError,
};

use crate::config::{backoff_delay, IndexerConfig};
use crate::ws::{SubscribePayload, WsConnection, WsMessage};

/// The per-address update stream. The optional `transactionId` is the
/// resume cursor; the server backfills every record after it before going
/// live.
const UNSHIELDED_TRANSACTIONS: &str = "\
subscription UnshieldedTransactions($address: String!, $transactionId: Int) {
  unshieldedTransactions(address: $address, transactionId: $transactionId) {
    __typename
    ... on UnshieldedTransaction {
      id
      transactionHash
      blockHeight
      timestamp
      finalized
      createdUtxos { intentHash outputIndex owner tokenType value }
      spentUtxos { intentHash outputIndex }
    }
    ... on UnshieldedTransactionsProgress {
      lastTransactionId
    }
  }
}";

// ── Update records ───────────────────────────────────────────────────────────

/// One globally ordered update record from the indexer.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum WalletUpdate {
    Transaction(TransactionUpdate),
    Progress { last_id: RecordId },
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct TransactionUpdate {
    pub id: RecordId,
    pub tx_hash: TxHash,
    pub block_height: BlockHeight,
    pub timestamp: Timestamp,
    pub finalized: bool,
    pub created: Vec<Utxo>,
    pub spent: Vec<UtxoRef>,
}

// ── Wire shapes ──────────────────────────────────────────────────────────────

#[derive(Deserialize)]
#[serde(tag = "__typename")]
enum WireEvent {
    #[serde(rename = "UnshieldedTransaction")]
    Transaction(WireTransaction),
    #[serde(rename = "UnshieldedTransactionsProgress")]
    Progress(WireProgress),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireTransaction {
    id: RecordId,
    transaction_hash: String,
    block_height: BlockHeight,
    timestamp: Timestamp,
    #[serde(default)]
    finalized: bool,
    created_utxos: Vec<WireUtxo>,
    spent_utxos: Vec<WireUtxoRef>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUtxo {
    intent_hash: String,
    output_index: u32,
    owner: String,
    token_type: String,
    /// u128 values travel as strings; JSON numbers cannot hold them.
    value: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireUtxoRef {
    intent_hash: String,
    output_index: u32,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireProgress {
    last_transaction_id: RecordId,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct WireData {
    unshielded_transactions: WireEvent,
}

fn parse_update(payload: &Value) -> Result<WalletUpdate, WalletError> {
    let data = payload
        .get("data")
        .cloned()
        .ok_or_else(|| WalletError::InvalidResponse("next payload has no data".to_string()))?;
    let wire: WireData =
        serde_json::from_value(data).map_err(|e| WalletError::InvalidResponse(e.to_string()))?;
    match wire.unshielded_transactions {
        WireEvent::Progress(p) => Ok(WalletUpdate::Progress {
            last_id: p.last_transaction_id,
        }),
        WireEvent::Transaction(t) => {
            let tx_hash = TxHash::from_hex(&t.transaction_hash)?;
            let point = ChainPoint {
                height: t.block_height,
                tx_hash,
            };
            let created = t
                .created_utxos
                .into_iter()
                .map(|u| {
                    // Created outputs may belong to any address on the
                    // global log; any of the four networks is accepted here
                    // and ownership is filtered downstream.
                    let (hrp, payload) = Address::decode(&u.owner)?;
                    let network = lantern_core::NetworkTag::from_hrp(&hrp)
                        .ok_or(WalletError::NotAnUnshieldedAddress)?;
                    if payload.len() != 32 {
                        return Err(WalletError::BadLength {
                            expected: 32,
                            got: payload.len(),
                        });
                    }
                    let mut owner_payload = [0u8; 32];
                    owner_payload.copy_from_slice(&payload);
                    let value: u128 = u
                        .value
                        .parse()
                        .map_err(|_| WalletError::InvalidResponse("bad utxo value".to_string()))?;
                    Utxo::created(
                        IntentHash::from_hex(&u.intent_hash)?,
                        u.output_index,
                        Address::new(network, owner_payload),
                        TokenType::from_hex(&u.token_type)?,
                        value,
                        point,
                    )
                })
                .collect::<Result<Vec<_>, _>>()?;
            let spent = t
                .spent_utxos
                .into_iter()
                .map(|r| {
                    Ok(UtxoRef::new(
                        IntentHash::from_hex(&r.intent_hash)?,
                        r.output_index,
                    ))
                })
                .collect::<Result<Vec<_>, WalletError>>()?;
            Ok(WalletUpdate::Transaction(TransactionUpdate {
                id: t.id,
                tx_hash,
                block_height: t.block_height,
                timestamp: t.timestamp,
                finalized: t.finalized,
                created,
                spent,
            }))
        }
    }
}

// ── Session ──────────────────────────────────────────────────────────────────

/// A running subscription task plus its local receiver.
pub struct SubscriptionHandle {
    pub updates: mpsc::Receiver<WalletUpdate>,
    shutdown: watch::Sender<bool>,
    task: tokio::task::JoinHandle<()>,
}

impl SubscriptionHandle {
    /// Tear down the wire subscription and the local task.
    pub async fn cancel(self) {
        let _ = self.shutdown.send(true);
        let _ = self.task.await;
    }
}

/// Open one subscription for `address`, resuming from whatever cursor the
/// `cursor` channel currently holds. Records are emitted in server order.
/// The session reconnects on transport failure with jittered backoff,
/// re-registering from the latest cursor.
pub fn spawn_subscription(
    config: IndexerConfig,
    address: Address,
    cursor: watch::Receiver<RecordId>,
) -> SubscriptionHandle {
    let (updates_tx, updates_rx) = mpsc::channel(64);
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let task = tokio::spawn(session_loop(config, address, cursor, updates_tx, shutdown_rx));
    SubscriptionHandle {
        updates: updates_rx,
        shutdown: shutdown_tx,
        task,
    }
}

async fn session_loop(
    config: IndexerConfig,
    address: Address,
    cursor: watch::Receiver<RecordId>,
    updates: mpsc::Sender<WalletUpdate>,
    mut shutdown: watch::Receiver<bool>,
) {
    let sub_id = "1";
    let mut attempt = 0u32;
    loop {
        if *shutdown.borrow() {
            return;
        }

        let mut conn = match WsConnection::connect(&config).await {
            Ok(conn) => conn,
            Err(e) => {
                let delay = backoff_delay(attempt, config.backoff_base, config.backoff_max);
                attempt = attempt.saturating_add(1);
                warn!(error = %e, attempt, "stream connect failed; backing off");
                tokio::select! {
                    _ = tokio::time::sleep(delay) => continue,
                    _ = shutdown.changed() => return,
                }
            }
        };
        attempt = 0;

        let resume = *cursor.borrow();
        let variables = json!({
            "address": address.encode(),
            "transactionId": if resume == 0 { Value::Null } else { json!(resume) },
        });
        info!(address = %address, resume, "subscribing to unshielded transactions");
        let subscribe = WsMessage::Subscribe {
            id: sub_id.to_string(),
            payload: SubscribePayload {
                query: UNSHIELDED_TRANSACTIONS.to_string(),
                variables,
            },
        };
        if let Err(e) = conn.send(&subscribe).await {
            warn!(error = %e, "subscribe failed");
            continue;
        }

        loop {
            tokio::select! {
                _ = shutdown.changed() => {
                    let _ = conn.send(&WsMessage::Complete { id: sub_id.to_string() }).await;
                    conn.close().await;
                    return;
                }
                message = conn.recv() => match message {
                    Ok(Some(WsMessage::Next { payload, .. })) => match parse_update(&payload) {
                        Ok(update) => {
                            if updates.send(update).await.is_err() {
                                conn.close().await;
                                return;
                            }
                        }
                        Err(e) => {
                            warn!(error = %e, "malformed update record; failing subscription");
                            break;
                        }
                    },
                    Ok(Some(WsMessage::Ping { .. })) => {
                        let _ = conn.send(&WsMessage::Pong { payload: None }).await;
                    }
                    Ok(Some(WsMessage::Error { payload, .. })) => {
                        warn!(%payload, "subscription error from server");
                        break;
                    }
                    Ok(Some(WsMessage::Complete { .. })) => break,
                    Ok(Some(_)) => {}
                    Ok(None) => break,
                    Err(e) => {
                        warn!(error = %e, "stream receive failed");
                        break;
                    }
                }
            }
        }
        conn.close().await;
        // Reconnect and re-register from the latest cursor.
        tokio::select! {
            _ = tokio::time::sleep(Duration::from_millis(500)) => {}
            _ = shutdown.changed() => return,
        }
    }
}
