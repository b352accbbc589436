pub mod balance;
pub mod db;
pub mod engine;
pub mod store;

pub use balance::{balance_by_token, observe_balances};
pub use db::{SyncState, WalletDb};
pub use engine::{Applied, SyncEngine};
pub use store::UtxoStore;
