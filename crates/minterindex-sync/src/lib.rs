//! minterindex-sync: drives a [`ChainStore`](minterindex_core::ChainStore)
//! towards the node's chain head.
//!
//! [`IngestionLoop`] ingests heights strictly in order. Validator
//! reconciliation and coin registration run on their own workers fed by
//! bounded queues. A full validator queue holds the loop back; a full coin
//! queue drops the notification.

pub mod builder;
pub mod coins;
pub mod index_loop;
pub mod validators;

#[cfg(test)]
pub(crate) mod test_utils;

pub use builder::IndexerBuilder;
pub use coins::{coin_channel, run_coin_consumer, QueuedCoinNotifier};
pub use index_loop::IngestionLoop;
pub use validators::ValidatorWorker;
