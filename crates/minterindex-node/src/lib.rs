//! minterindex-node: client for the Minter node's JSON API.
//!
//! [`NodeApi`] is the seam the ingestion loop talks to; [`HttpNodeClient`] is
//! the reqwest-backed implementation. The [`policy`] module holds the retry
//! and circuit-breaker primitives shared with the sync crate.

pub mod client;
pub mod policy;

pub use client::{HttpNodeClient, NodeApi, NodeConfig};
pub use policy::{CircuitBreaker, CircuitBreakerConfig, CircuitState, RetryConfig, RetryPolicy};
