use std::collections::BTreeMap;
use std::sync::Arc;
use tokio_stream::wrappers::WatchStream;
use tokio_stream::{Stream, StreamExt};

use lantern_core::{Address, Balance, TokenType, WalletError};

use crate::store::UtxoStore;

/// Spendable balance per token: the sum of Available UTXOs. Reserved and
/// Pending outputs are excluded; the user cannot respend them. Tokens with
/// no Available value do not appear.
pub fn balance_by_token(
    store: &UtxoStore,
    address: &Address,
) -> Result<BTreeMap<TokenType, Balance>, WalletError> {
    let mut balances: BTreeMap<TokenType, Balance> = BTreeMap::new();
    for utxo in store.unspent(address)? {
        *balances.entry(utxo.token).or_default() += utxo.value;
    }
    Ok(balances)
}

/// Reactive balance view: recomputed on every store commit, starting with
/// the current state.
pub fn observe_balances(
    store: Arc<UtxoStore>,
    address: Address,
) -> impl Stream<Item = BTreeMap<TokenType, Balance>> {
    WatchStream::new(store.observe())
        .map(move |_| balance_by_token(&store, &address).unwrap_or_default())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::WalletDb;
    use lantern_core::{ChainPoint, IntentHash, NetworkTag, TxHash, Utxo};

    fn temp_store(name: &str) -> Arc<UtxoStore> {
        let dir = std::env::temp_dir().join(format!("lantern_balance_test_{name}"));
        let _ = std::fs::remove_dir_all(&dir);
        Arc::new(UtxoStore::new(Arc::new(
            WalletDb::open(&dir).expect("open temp db"),
        )))
    }

    fn addr() -> Address {
        Address::new(NetworkTag::Undeployed, [1u8; 32])
    }

    fn utxo(seed: u8, token: TokenType, value: Balance) -> Utxo {
        Utxo::created(
            IntentHash::from_bytes([seed; 32]),
            0,
            addr(),
            token,
            value,
            ChainPoint {
                height: 1,
                tx_hash: TxHash::from_bytes([seed; 32]),
            },
        )
        .unwrap()
    }

    #[test]
    fn balances_aggregate_by_token() {
        let store = temp_store("aggregate");
        let other = TokenType::from_bytes([9u8; 32]);
        store.upsert_created(utxo(1, TokenType::NATIVE, 100)).unwrap();
        store.upsert_created(utxo(2, TokenType::NATIVE, 50)).unwrap();
        store.upsert_created(utxo(3, other, 7)).unwrap();

        let balances = balance_by_token(&store, &addr()).unwrap();
        assert_eq!(balances.get(&TokenType::NATIVE), Some(&150));
        assert_eq!(balances.get(&other), Some(&7));
    }

    #[test]
    fn reserved_value_does_not_count() {
        let store = temp_store("reserved");
        store.upsert_created(utxo(1, TokenType::NATIVE, 100)).unwrap();
        store.upsert_created(utxo(2, TokenType::NATIVE, 60)).unwrap();
        store.reserve(&addr(), TokenType::NATIVE, 60).unwrap();

        let balances = balance_by_token(&store, &addr()).unwrap();
        assert_eq!(balances.get(&TokenType::NATIVE), Some(&100));
    }

    #[test]
    fn fully_spent_tokens_are_omitted() {
        let store = temp_store("omitted");
        let u = utxo(1, TokenType::NATIVE, 100);
        store.upsert_created(u.clone()).unwrap();
        store
            .mark_spent(
                &u.reference(),
                ChainPoint {
                    height: 2,
                    tx_hash: TxHash::from_bytes([2u8; 32]),
                },
            )
            .unwrap();
        assert!(balance_by_token(&store, &addr()).unwrap().is_empty());
    }

    #[tokio::test]
    async fn observer_sees_commits() {
        let store = temp_store("observer");
        let mut stream = Box::pin(observe_balances(Arc::clone(&store), addr()));

        // Initial snapshot: empty.
        assert!(stream.next().await.unwrap().is_empty());

        store.upsert_created(utxo(1, TokenType::NATIVE, 42)).unwrap();
        let after = stream.next().await.unwrap();
        assert_eq!(after.get(&TokenType::NATIVE), Some(&42));
    }
}
