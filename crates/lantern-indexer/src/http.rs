use serde_json::{json, Value};
use tracing::warn;

use lantern_core::WalletError;

use crate::config::{backoff_delay, IndexerConfig};

/// GraphQL request channel.
///
/// POSTs `{query, variables}` to the query endpoint and returns the `data`
/// field. Transport failures are retried with truncated exponential backoff
/// up to the configured attempt cap; GraphQL-level errors surface
/// immediately as `RemoteError`.
pub struct GraphQlClient {
    config: IndexerConfig,
    client: reqwest::Client,
}

impl GraphQlClient {
    pub fn new(config: IndexerConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &IndexerConfig {
        &self.config
    }

    /// Run a query or mutation and return its `data` object.
    pub async fn query(&self, query: &str, variables: Value) -> Result<Value, WalletError> {
        let mut attempt = 0u32;
        loop {
            match self.execute(query, &variables).await {
                Ok(data) => return Ok(data),
                Err(e) if e.is_transient() && attempt + 1 < self.config.attempts => {
                    let delay =
                        backoff_delay(attempt, self.config.backoff_base, self.config.backoff_max);
                    warn!(error = %e, attempt, delay_ms = delay.as_millis() as u64, "request failed; backing off");
                    tokio::time::sleep(delay).await;
                    attempt += 1;
                }
                Err(e) => return Err(e),
            }
        }
    }

    async fn execute(&self, query: &str, variables: &Value) -> Result<Value, WalletError> {
        let body = json!({
            "query": query,
            "variables": variables,
        });

        let resp = self
            .client
            .post(self.config.query_url())
            .timeout(self.config.request_timeout)
            .json(&body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    WalletError::TimedOut
                } else {
                    WalletError::NotConnected
                }
            })?;

        let body: Value = resp
            .json()
            .await
            .map_err(|e| WalletError::InvalidResponse(e.to_string()))?;

        if let Some(errors) = body.get("errors").and_then(Value::as_array) {
            if let Some(first) = errors.first() {
                let message = first
                    .get("message")
                    .and_then(Value::as_str)
                    .unwrap_or("unknown error")
                    .to_string();
                let code = first
                    .pointer("/extensions/code")
                    .and_then(Value::as_str)
                    .unwrap_or("UNKNOWN")
                    .to_string();
                return Err(WalletError::RemoteError { code, message });
            }
        }

        body.get("data")
            .cloned()
            .ok_or_else(|| WalletError::InvalidResponse("response has no data field".to_string()))
    }
}
