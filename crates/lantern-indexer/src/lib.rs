pub mod config;
pub mod http;
pub mod subscription;
pub mod ws;

pub use config::{backoff_delay, IndexerConfig};
pub use http::GraphQlClient;
pub use subscription::{
    spawn_subscription, SubscriptionHandle, TransactionUpdate, WalletUpdate,
};
