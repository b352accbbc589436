pub mod address;
pub mod constants;
pub mod error;
pub mod intent;
pub mod types;
pub mod utxo;

pub use address::Address;
pub use constants::*;
pub use error::WalletError;
pub use intent::{Intent, IntentInput, IntentOutput, PendingState, PendingTx};
pub use types::*;
pub use utxo::{ChainPoint, Utxo, UtxoRef, UtxoState};
