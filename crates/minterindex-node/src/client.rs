//! HTTP client for the Minter node API, backed by `reqwest`.
//!
//! Every call goes through the circuit breaker: while the node is unreachable
//! calls fail fast with [`IndexerError::CircuitOpen`] and the caller can ask
//! [`NodeApi::retry_after`] how long to wait.

use std::time::Duration;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use minterindex_core::response::{BlockResult, Envelope, StatusResult, ValidatorEntry};
use minterindex_core::IndexerError;

use crate::policy::{CircuitBreaker, CircuitBreakerConfig, CircuitState};

/// The three node endpoints the indexer consumes.
#[async_trait]
pub trait NodeApi: Send + Sync {
    /// Current head height.
    async fn status(&self) -> Result<u64, IndexerError>;

    /// Block at `height`, `None` if the node does not have it.
    async fn block(&self, height: u64) -> Result<Option<BlockResult>, IndexerError>;

    /// Validator set at `height`.
    async fn validators(&self, height: u64) -> Result<Vec<ValidatorEntry>, IndexerError>;

    /// How long calls will keep being rejected, if the client is refusing them.
    fn retry_after(&self) -> Option<Duration> {
        None
    }
}

/// Configuration for [`HttpNodeClient`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct NodeConfig {
    /// Base URL, e.g. `http://localhost:8841`.
    pub url: String,
    /// Per-request timeout in milliseconds.
    pub timeout_ms: u64,
    pub circuit_breaker: CircuitBreakerConfig,
}

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8841".into(),
            timeout_ms: 1000,
            circuit_breaker: CircuitBreakerConfig::default(),
        }
    }
}

/// Node API client with a per-request timeout and a circuit breaker.
pub struct HttpNodeClient {
    base: String,
    http: reqwest::Client,
    circuit: CircuitBreaker,
}

impl HttpNodeClient {
    pub fn new(config: NodeConfig) -> Result<Self, IndexerError> {
        if config.url.trim().is_empty() {
            return Err(IndexerError::Config("node url is empty".into()));
        }
        let http = reqwest::Client::builder()
            .timeout(Duration::from_millis(config.timeout_ms))
            .build()
            .map_err(|e| IndexerError::Config(format!("http client: {e}")))?;

        Ok(Self {
            base: config.url.trim_end_matches('/').to_string(),
            http,
            circuit: CircuitBreaker::new(config.circuit_breaker),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base
    }

    pub fn circuit_state(&self) -> CircuitState {
        self.circuit.state()
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/api/{}", self.base, path)
    }

    /// GET `path` and unwrap the envelope. `Ok(None)` on HTTP 404.
    async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, IndexerError> {
        if let Err(wait) = self.circuit.admit() {
            tracing::trace!(wait_ms = wait.as_millis() as u64, "node circuit open, call rejected");
            return Err(IndexerError::CircuitOpen(self.base.clone()));
        }

        let result = self.get_once(path).await;
        // A domain error means the node is up and answering.
        let answered = matches!(result, Ok(_) | Err(IndexerError::Node { .. }));
        self.circuit.observe(answered);
        result
    }

    async fn get_once<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, IndexerError> {
        let url = self.endpoint(path);
        tracing::trace!(%url, "GET");

        let resp = self
            .http
            .get(&url)
            .send()
            .await
            .map_err(|e| IndexerError::Transport(e.to_string()))?;

        let status = resp.status();
        if status == reqwest::StatusCode::NOT_FOUND {
            return Ok(None);
        }

        let body = resp
            .bytes()
            .await
            .map_err(|e| IndexerError::Transport(e.to_string()))?;

        if !status.is_success() {
            // The node reports domain errors with a non-2xx status and an envelope body.
            if let Ok(env) = serde_json::from_slice::<Envelope<serde_json::Value>>(&body) {
                if env.code != 0 || env.log.is_some() {
                    env.into_result()?;
                }
            }
            return Err(IndexerError::Transport(format!(
                "HTTP {}: {}",
                status.as_u16(),
                String::from_utf8_lossy(&body)
            )));
        }

        let env: Envelope<T> =
            serde_json::from_slice(&body).map_err(|e| IndexerError::Decode(e.to_string()))?;
        env.into_result().map(Some)
    }
}

#[async_trait]
impl NodeApi for HttpNodeClient {
    async fn status(&self) -> Result<u64, IndexerError> {
        let status: StatusResult = self
            .get("status")
            .await?
            .ok_or_else(|| IndexerError::Transport("status endpoint not found".into()))?;
        Ok(status.latest_block_height)
    }

    async fn block(&self, height: u64) -> Result<Option<BlockResult>, IndexerError> {
        self.get(&format!("block/{height}")).await
    }

    async fn validators(&self, height: u64) -> Result<Vec<ValidatorEntry>, IndexerError> {
        Ok(self
            .get(&format!("validators?height={height}"))
            .await?
            .unwrap_or_default())
    }

    fn retry_after(&self) -> Option<Duration> {
        self.circuit.remaining_open()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(url: &str, failure_threshold: u32) -> HttpNodeClient {
        HttpNodeClient::new(NodeConfig {
            url: url.into(),
            timeout_ms: 200,
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold,
                open_duration_ms: 60_000,
                success_threshold: 1,
            },
        })
        .unwrap()
    }

    #[test]
    fn endpoints_are_built_from_trimmed_base() {
        let c = client("http://node:8841/", 5);
        assert_eq!(c.base_url(), "http://node:8841");
        assert_eq!(c.endpoint("block/12"), "http://node:8841/api/block/12");
        assert_eq!(
            c.endpoint("validators?height=3"),
            "http://node:8841/api/validators?height=3"
        );
    }

    #[test]
    fn empty_url_is_a_config_error() {
        let err = HttpNodeClient::new(NodeConfig {
            url: "  ".into(),
            ..Default::default()
        })
        .err()
        .unwrap();
        assert!(matches!(err, IndexerError::Config(_)));
    }

    #[tokio::test]
    async fn unreachable_node_trips_circuit() {
        // Port 1 on loopback refuses connections.
        let c = client("http://127.0.0.1:1", 2);
        assert!(matches!(c.status().await, Err(IndexerError::Transport(_))));
        assert!(matches!(c.block(5).await, Err(IndexerError::Transport(_))));
        assert_eq!(c.circuit_state(), CircuitState::Open);
        assert!(c.retry_after().is_some());

        match c.validators(5).await {
            Err(IndexerError::CircuitOpen(url)) => assert_eq!(url, "http://127.0.0.1:1"),
            other => panic!("expected CircuitOpen, got {other:?}"),
        }
    }
}
