use tracing::warn;

use lantern_core::{
    Address, Balance, TokenType, Utxo, WalletError, RESERVE_RETRY_MAX,
};
use lantern_state::UtxoStore;

/// A successful coin selection, already held in Reserved state.
#[derive(Clone, Debug)]
pub struct Reservation {
    pub inputs: Vec<Utxo>,
    pub total: Balance,
    pub change: Balance,
}

/// Select and reserve inputs covering `amount` of `token` for `address`.
///
/// Selection and the Available → Reserved transition happen inside the
/// store's single atomic `reserve`; a concurrent send can never observe or
/// take the same inputs. Transient storage failures are retried with fresh
/// reads; funds and parameter errors surface immediately.
pub fn select_and_reserve(
    store: &UtxoStore,
    address: &Address,
    token: TokenType,
    amount: Balance,
) -> Result<Reservation, WalletError> {
    if amount == 0 {
        return Err(WalletError::BadParameter(
            "amount must be greater than zero".to_string(),
        ));
    }

    let mut attempt = 0u32;
    loop {
        match store.reserve(address, token, amount) {
            Ok(inputs) => {
                let total: Balance = inputs.iter().map(|u| u.value).sum();
                return Ok(Reservation {
                    inputs,
                    total,
                    change: total - amount,
                });
            }
            Err(e @ WalletError::Storage(_)) if attempt + 1 < RESERVE_RETRY_MAX => {
                warn!(error = %e, attempt, "reserve failed; retrying with fresh reads");
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
