pub mod wallet;

pub use wallet::{SyncHandle, Wallet};
