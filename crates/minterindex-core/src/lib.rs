//! minterindex-core: data model and pure ingestion logic for the MinterIndex
//! block indexer.
//!
//! # Architecture
//!
//! ```text
//! IndexerBuilder → IngestionLoop
//!                      ├── NodeApi            (status / block / validators)
//!                      ├── transform_block    (block response → Block aggregate)
//!                      ├── ValidatorWorker    (reconcile → upsert → link)
//!                      ├── CoinNotifier       (create-coin side effect)
//!                      └── ChainStore backend (memory / SQLite / Postgres)
//! ```

pub mod cursor;
pub mod error;
pub mod indexer;
pub mod notify;
pub mod reconcile;
pub mod response;
pub mod sanitize;
pub mod store;
pub mod tags;
pub mod transform;
pub mod types;

pub use cursor::Cursor;
pub use error::IndexerError;
pub use indexer::{IndexerConfig, IndexerState, RetrySettings};
pub use notify::{CoinNotifier, NoopCoinNotifier, RecordingCoinNotifier};
pub use reconcile::reconcile;
pub use store::ChainStore;
pub use tags::{TagKey, TxTag};
pub use transform::transform_block;
pub use types::{
    Block, Coin, Reward, Slash, Transaction, TxType, Validator, ValidatorChange, ValidatorRecord,
};
