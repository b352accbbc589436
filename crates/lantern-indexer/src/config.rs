use once_cell::sync::Lazy;
use rand::Rng;
use std::collections::HashMap;
use std::time::Duration;

use lantern_core::{NetworkTag, BACKOFF_BASE_MS, BACKOFF_MAX_MS, REQUEST_ATTEMPTS_MAX};

const QUERY_PATH: &str = "/api/v3/graphql";
const STREAM_PATH: &str = "/api/v3/graphql/ws";

static DEFAULT_BASE_URLS: Lazy<HashMap<NetworkTag, &'static str>> = Lazy::new(|| {
    HashMap::from([
        (NetworkTag::Undeployed, "http://127.0.0.1:8088"),
        (NetworkTag::Test, "https://indexer.test.midnight.network"),
        (NetworkTag::Preview, "https://indexer.preview.midnight.network"),
        (NetworkTag::Mainnet, "https://indexer.midnight.network"),
    ])
});

// ── IndexerConfig ────────────────────────────────────────────────────────────

/// Endpoint and retry knobs for one indexer deployment. The network tag and
/// the base URL must describe the same deployment; addresses validated
/// against `network` are the ones this indexer knows about.
#[derive(Clone, Debug)]
pub struct IndexerConfig {
    pub network: NetworkTag,
    pub base_url: String,
    pub attempts: u32,
    pub backoff_base: Duration,
    pub backoff_max: Duration,
    pub request_timeout: Duration,
}

impl IndexerConfig {
    /// Config for a network's well-known indexer endpoint.
    pub fn for_network(network: NetworkTag) -> Self {
        Self::with_base_url(network, DEFAULT_BASE_URLS[&network])
    }

    /// Config for an explicit base URL (scheme + host, no path).
    pub fn with_base_url(network: NetworkTag, base_url: impl Into<String>) -> Self {
        Self {
            network,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            attempts: REQUEST_ATTEMPTS_MAX,
            backoff_base: Duration::from_millis(BACKOFF_BASE_MS),
            backoff_max: Duration::from_millis(BACKOFF_MAX_MS),
            request_timeout: Duration::from_secs(15),
        }
    }

    /// HTTPS query endpoint.
    pub fn query_url(&self) -> String {
        format!("{}{}", self.base_url, QUERY_PATH)
    }

    /// WebSocket endpoint, with the scheme switched to ws/wss.
    pub fn stream_url(&self) -> String {
        let ws_base = if let Some(rest) = self.base_url.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = self.base_url.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            self.base_url.clone()
        };
        format!("{ws_base}{STREAM_PATH}")
    }
}

// ── Backoff ──────────────────────────────────────────────────────────────────

/// Truncated exponential backoff with downward jitter.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let base_ms = base.as_millis() as u64;
    let max_ms = max.as_millis() as u64;
    let exp = base_ms.saturating_mul(1u64 << attempt.min(16));
    let capped = exp.min(max_ms).max(1);
    let jitter = rand::thread_rng().gen_range(0..=capped / 4);
    Duration::from_millis(capped - jitter)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn urls_are_joined_with_versioned_paths() {
        let cfg = IndexerConfig::with_base_url(NetworkTag::Test, "https://indexer.example.com/");
        assert_eq!(cfg.query_url(), "https://indexer.example.com/api/v3/graphql");
        assert_eq!(
            cfg.stream_url(),
            "wss://indexer.example.com/api/v3/graphql/ws"
        );
    }

    #[test]
    fn plain_http_maps_to_plain_ws() {
        let cfg = IndexerConfig::for_network(NetworkTag::Undeployed);
        assert!(cfg.stream_url().starts_with("ws://127.0.0.1:8088"));
    }

    #[test]
    fn backoff_is_truncated() {
        let base = Duration::from_millis(250);
        let max = Duration::from_millis(10_000);
        for attempt in 0..20 {
            let d = backoff_delay(attempt, base, max);
            assert!(d <= max, "attempt {attempt} exceeded the cap: {d:?}");
        }
        // High attempts saturate near the cap even after jitter.
        assert!(backoff_delay(30, base, max) >= Duration::from_millis(7_500));
    }
}
