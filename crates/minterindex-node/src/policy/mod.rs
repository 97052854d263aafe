//! Reliability policies for talking to the node.
//!
//! ```text
//! IngestionLoop → [RetryPolicy] → HttpNodeClient → [CircuitBreaker] → node
//! ```

pub mod circuit_breaker;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitBreakerConfig, CircuitState};
pub use retry::{RetryConfig, RetryPolicy};
