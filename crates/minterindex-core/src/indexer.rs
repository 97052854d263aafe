//! Indexer configuration and state types.

use serde::{Deserialize, Serialize};

use crate::error::IndexerError;

/// Configuration for the ingestion loop and its workers.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexerConfig {
    /// First height to ingest into an empty store.
    pub from_height: u64,
    /// Stop after this height. `None` = run forever.
    pub to_height: Option<u64>,
    /// Sleep between head queries once caught up (milliseconds).
    pub poll_interval_ms: u64,
    /// Capacity of the validator reconciliation queue. A full queue makes the
    /// loop wait.
    pub validator_queue_capacity: usize,
    /// Capacity of the coin notification queue. A full queue drops
    /// notifications.
    pub coin_queue_capacity: usize,
    /// Retries per height before the validator worker gives up on it.
    pub validator_max_retries: u32,
    /// Backoff applied to a failing height.
    pub retry: RetrySettings,
    /// Register coins from create-coin transactions.
    pub register_coins: bool,
    /// Log every ingested block at `info` with its processing time.
    pub debug: bool,
}

impl Default for IndexerConfig {
    fn default() -> Self {
        Self {
            from_height: 1,
            to_height: None,
            poll_interval_ms: 1000,
            validator_queue_capacity: 256,
            coin_queue_capacity: 1024,
            validator_max_retries: 3,
            retry: RetrySettings::default(),
            register_coins: true,
            debug: false,
        }
    }
}

impl IndexerConfig {
    pub fn validate(&self) -> Result<(), IndexerError> {
        if self.validator_queue_capacity == 0 {
            return Err(IndexerError::Config("validator_queue_capacity must be > 0".into()));
        }
        if self.coin_queue_capacity == 0 {
            return Err(IndexerError::Config("coin_queue_capacity must be > 0".into()));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(IndexerError::Config(
                "retry.initial_backoff_ms exceeds retry.max_backoff_ms".into(),
            ));
        }
        if self.retry.multiplier < 1.0 {
            return Err(IndexerError::Config("retry.multiplier must be >= 1.0".into()));
        }
        if let Some(to) = self.to_height {
            if to < self.from_height {
                return Err(IndexerError::Config(format!(
                    "to_height {to} is below from_height {}",
                    self.from_height
                )));
            }
        }
        Ok(())
    }
}

/// Exponential backoff for a height that keeps failing.
///
/// The loop never gives up on a height; once `stall_after` attempts have
/// failed each further failure is logged at `error` instead of `warn`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
    pub multiplier: f64,
    pub stall_after: u32,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            initial_backoff_ms: 100,
            max_backoff_ms: 10_000,
            multiplier: 2.0,
            stall_after: 10,
        }
    }
}

/// Runtime state of the indexer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum IndexerState {
    /// Not yet started.
    Idle,
    /// Deleting the last stored height before resuming.
    Recovering,
    /// Ingesting known heights up to the last seen head.
    CatchingUp,
    /// Caught up; polling the node for a new head.
    Following,
    /// Reached `to_height` and drained the workers.
    Stopped,
}

impl std::fmt::Display for IndexerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Idle => write!(f, "idle"),
            Self::Recovering => write!(f, "recovering"),
            Self::CatchingUp => write!(f, "catching-up"),
            Self::Following => write!(f, "following"),
            Self::Stopped => write!(f, "stopped"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        IndexerConfig::default().validate().unwrap();
    }

    #[test]
    fn partial_yaml_like_json_uses_defaults() {
        let cfg: IndexerConfig = serde_json::from_str(r#"{"to_height": 10, "debug": true}"#).unwrap();
        assert_eq!(cfg.to_height, Some(10));
        assert!(cfg.debug);
        assert_eq!(cfg.validator_queue_capacity, 256);
        assert_eq!(cfg.retry, RetrySettings::default());
    }

    #[test]
    fn nested_retry_overrides() {
        let cfg: IndexerConfig =
            serde_json::from_str(r#"{"retry": {"max_backoff_ms": 500}}"#).unwrap();
        assert_eq!(cfg.retry.max_backoff_ms, 500);
        assert_eq!(cfg.retry.initial_backoff_ms, 100);
    }

    #[test]
    fn rejects_shrinking_multiplier() {
        let mut cfg = IndexerConfig::default();
        cfg.retry.multiplier = 0.5;
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn rejects_inverted_range() {
        let cfg = IndexerConfig {
            from_height: 10,
            to_height: Some(5),
            ..Default::default()
        };
        assert!(matches!(cfg.validate(), Err(IndexerError::Config(_))));
    }
}
