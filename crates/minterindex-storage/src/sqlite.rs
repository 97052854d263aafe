//! SQLite storage backend.
//!
//! Persists the whole indexed chain to a single SQLite file. Uses `sqlx` with
//! WAL mode and foreign keys enabled so that deleting a block cascades to its
//! transactions, tags, rewards, slashes and validator links.
//!
//! # Usage
//! ```rust,no_run
//! use minterindex_storage::sqlite::SqliteStorage;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! // File-backed (persistent)
//! let store = SqliteStorage::open("./minter.db").await?;
//!
//! // In-memory (tests / ephemeral)
//! let store = SqliteStorage::in_memory().await?;
//! # Ok(())
//! # }
//! ```

use std::collections::HashMap;
use std::str::FromStr;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions, SqliteRow};
use sqlx::{QueryBuilder, Row, Sqlite, SqlitePool};
use tracing::debug;

use minterindex_core::error::IndexerError;
use minterindex_core::store::ChainStore;
use minterindex_core::types::{Block, Coin, Validator, ValidatorChange, ValidatorRecord};

const SCHEMA: &[&str] = &[
    "CREATE TABLE IF NOT EXISTS blocks (
        height       INTEGER PRIMARY KEY,
        hash         TEXT    NOT NULL,
        timestamp    INTEGER NOT NULL,
        tx_count     INTEGER NOT NULL,
        size         INTEGER NOT NULL,
        block_time   REAL    NOT NULL,
        block_reward TEXT    NOT NULL,
        created_at   TEXT    NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_blocks_created_at ON blocks (created_at);",
    "CREATE TABLE IF NOT EXISTS transactions (
        id                     INTEGER PRIMARY KEY AUTOINCREMENT,
        block_id               INTEGER NOT NULL REFERENCES blocks (height) ON DELETE CASCADE,
        hash                   TEXT    NOT NULL,
        from_address           TEXT    NOT NULL,
        to_address             TEXT,
        tx_type                INTEGER NOT NULL,
        nonce                  INTEGER NOT NULL,
        gas_price              INTEGER NOT NULL,
        fee                    INTEGER NOT NULL,
        gas_coin               TEXT    NOT NULL,
        coin                   TEXT,
        coin_to_sell           TEXT,
        coin_to_buy            TEXT,
        payload                TEXT    NOT NULL,
        service_data           TEXT    NOT NULL,
        status                 INTEGER NOT NULL,
        value                  TEXT,
        value_to_sell          TEXT,
        value_to_buy           TEXT,
        stake                  TEXT,
        commission             INTEGER,
        initial_amount         TEXT,
        initial_reserve        TEXT,
        constant_reserve_ratio INTEGER,
        name                   TEXT,
        address                TEXT,
        pub_key                TEXT,
        proof                  TEXT,
        raw_check              TEXT,
        threshold              INTEGER,
        created_at             TEXT    NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_transactions_block ON transactions (block_id);",
    "CREATE INDEX IF NOT EXISTS idx_transactions_hash ON transactions (hash);",
    "CREATE INDEX IF NOT EXISTS idx_transactions_from ON transactions (from_address);",
    "CREATE INDEX IF NOT EXISTS idx_transactions_to ON transactions (to_address);",
    "CREATE INDEX IF NOT EXISTS idx_transactions_pub_key ON transactions (pub_key);",
    "CREATE INDEX IF NOT EXISTS idx_transactions_address ON transactions (address);",
    "CREATE TABLE IF NOT EXISTS tx_tags (
        id             INTEGER PRIMARY KEY AUTOINCREMENT,
        transaction_id INTEGER NOT NULL REFERENCES transactions (id) ON DELETE CASCADE,
        key            TEXT    NOT NULL,
        value          TEXT    NOT NULL
    );",
    "CREATE INDEX IF NOT EXISTS idx_tx_tags_tx ON tx_tags (transaction_id);",
    "CREATE TABLE IF NOT EXISTS rewards (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        block_id     INTEGER NOT NULL REFERENCES blocks (height) ON DELETE CASCADE,
        role         TEXT    NOT NULL,
        amount       TEXT    NOT NULL,
        address      TEXT    NOT NULL,
        validator_pk TEXT    NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS slashes (
        id           INTEGER PRIMARY KEY AUTOINCREMENT,
        block_id     INTEGER NOT NULL REFERENCES blocks (height) ON DELETE CASCADE,
        coin         TEXT    NOT NULL,
        amount       TEXT    NOT NULL,
        address      TEXT    NOT NULL,
        validator_pk TEXT    NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS validators (
        id                 INTEGER PRIMARY KEY AUTOINCREMENT,
        public_key         TEXT    NOT NULL UNIQUE,
        name               TEXT,
        address            TEXT    NOT NULL,
        total_stake        TEXT    NOT NULL,
        accumulated_reward TEXT    NOT NULL,
        absent_times       INTEGER NOT NULL,
        commission         INTEGER NOT NULL,
        created_at_block   INTEGER NOT NULL,
        status             INTEGER NOT NULL
    );",
    "CREATE TABLE IF NOT EXISTS block_validator (
        block_id     INTEGER NOT NULL REFERENCES blocks (height) ON DELETE CASCADE,
        validator_id INTEGER NOT NULL REFERENCES validators (id),
        PRIMARY KEY (block_id, validator_id)
    );",
    "CREATE TABLE IF NOT EXISTS coins (
        symbol                 TEXT PRIMARY KEY,
        name                   TEXT,
        constant_reserve_ratio INTEGER,
        initial_amount         TEXT,
        initial_reserve        TEXT,
        creator                TEXT NOT NULL,
        creation_tx_hash       TEXT NOT NULL,
        created_at             TEXT NOT NULL
    );",
];

/// SQLite-backed chain store.
#[derive(Clone)]
pub struct SqliteStorage {
    pool: SqlitePool,
}

impl SqliteStorage {
    /// Open (or create) a SQLite database at `path`.
    ///
    /// The path may be a plain file path (`"./minter.db"`) or a full
    /// SQLite URL (`"sqlite:./minter.db"`).
    pub async fn open(path: &str) -> Result<Self, IndexerError> {
        Self::open_with_pool_size(path, 4).await
    }

    pub async fn open_with_pool_size(
        path: &str,
        max_connections: u32,
    ) -> Result<Self, IndexerError> {
        let url = if path.starts_with("sqlite:") {
            path.to_string()
        } else {
            format!("sqlite:{path}")
        };

        let options = SqliteConnectOptions::from_str(&url)
            .map_err(|e| IndexerError::Config(format!("sqlite url: {e}")))?
            .create_if_missing(true)
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections.max(1))
            .connect_with(options)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Open an in-memory SQLite database.
    ///
    /// Uses a single connection, since every connection to `:memory:` sees its
    /// own database. All data is lost when the pool is dropped.
    pub async fn in_memory() -> Result<Self, IndexerError> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")
            .map_err(|e| IndexerError::Config(e.to_string()))?
            .foreign_keys(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        let storage = Self { pool };
        storage.init_schema().await?;
        Ok(storage)
    }

    /// Create tables and enable WAL mode.
    async fn init_schema(&self) -> Result<(), IndexerError> {
        sqlx::query("PRAGMA journal_mode=WAL;")
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        for stmt in SCHEMA {
            sqlx::query(stmt)
                .execute(&self.pool)
                .await
                .map_err(|e| IndexerError::Storage(e.to_string()))?;
        }
        Ok(())
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    // ─── Read helpers ────────────────────────────────────────────────────────

    pub async fn block_hash(&self, height: u64) -> Result<Option<String>, IndexerError> {
        let row = sqlx::query("SELECT hash FROM blocks WHERE height = ?")
            .bind(height as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(row.map(|r| r.get("hash")))
    }

    pub async fn transaction_count(&self) -> Result<u64, IndexerError> {
        self.count("SELECT COUNT(*) AS cnt FROM transactions").await
    }

    pub async fn validator_count(&self) -> Result<u64, IndexerError> {
        self.count("SELECT COUNT(*) AS cnt FROM validators").await
    }

    pub async fn link_count(&self) -> Result<u64, IndexerError> {
        self.count("SELECT COUNT(*) AS cnt FROM block_validator").await
    }

    pub async fn reward_count(&self) -> Result<u64, IndexerError> {
        self.count("SELECT COUNT(*) AS cnt FROM rewards").await
    }

    /// Tags of the transaction with `hash`, as stored (`key`, `value`).
    pub async fn tags_for(&self, hash: &str) -> Result<Vec<(String, String)>, IndexerError> {
        let rows = sqlx::query(
            "SELECT g.key, g.value FROM tx_tags g
             JOIN transactions t ON t.id = g.transaction_id
             WHERE t.hash = ? ORDER BY g.id",
        )
        .bind(hash)
        .fetch_all(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(rows
            .into_iter()
            .map(|r| (r.get("key"), r.get("value")))
            .collect())
    }

    pub async fn coin(&self, symbol: &str) -> Result<Option<Coin>, IndexerError> {
        let row = sqlx::query(
            "SELECT symbol, name, constant_reserve_ratio, initial_amount, initial_reserve,
                    creator, creation_tx_hash, created_at
             FROM coins WHERE symbol = ?",
        )
        .bind(symbol)
        .fetch_optional(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(row.map(|r| Coin {
            symbol: r.get("symbol"),
            name: r.get("name"),
            constant_reserve_ratio: r
                .get::<Option<i64>, _>("constant_reserve_ratio")
                .map(|v| v as u64),
            initial_amount: r.get("initial_amount"),
            initial_reserve: r.get("initial_reserve"),
            creator: r.get("creator"),
            creation_tx_hash: r.get("creation_tx_hash"),
            created_at: r.get("created_at"),
        }))
    }

    async fn count(&self, sql: &str) -> Result<u64, IndexerError> {
        let row = sqlx::query(sql)
            .fetch_one(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        let cnt: i64 = row.get("cnt");
        Ok(cnt as u64)
    }
}

fn validator_from_row(r: &SqliteRow) -> Validator {
    Validator {
        id: r.get("id"),
        record: ValidatorRecord {
            public_key: r.get("public_key"),
            name: r.get("name"),
            address: r.get("address"),
            total_stake: r.get("total_stake"),
            accumulated_reward: r.get("accumulated_reward"),
            absent_times: r.get::<i64, _>("absent_times") as u64,
            commission: r.get::<i64, _>("commission") as u64,
            created_at_block: r.get::<i64, _>("created_at_block") as u64,
            status: r.get::<i64, _>("status") as u8,
        },
    }
}

// ─── ChainStore impl ─────────────────────────────────────────────────────────

#[async_trait]
impl ChainStore for SqliteStorage {
    async fn last_height(&self) -> Result<u64, IndexerError> {
        let row = sqlx::query("SELECT COALESCE(MAX(height), 0) AS h FROM blocks")
            .fetch_one(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(row.get::<i64, _>("h") as u64)
    }

    async fn block_timestamp(&self, height: u64) -> Result<Option<DateTime<Utc>>, IndexerError> {
        let row = sqlx::query("SELECT created_at FROM blocks WHERE height = ?")
            .bind(height as i64)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(row.map(|r| r.get("created_at")))
    }

    async fn insert_block(&self, block: &Block) -> Result<(), IndexerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        sqlx::query(
            "INSERT INTO blocks
             (height, hash, timestamp, tx_count, size, block_time, block_reward, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(block.height as i64)
        .bind(&block.hash)
        .bind(block.timestamp)
        .bind(block.tx_count as i64)
        .bind(block.size as i64)
        .bind(block.block_time)
        .bind(&block.block_reward)
        .bind(block.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        for t in &block.transactions {
            let row = sqlx::query(
                "INSERT INTO transactions
                 (block_id, hash, from_address, to_address, tx_type, nonce, gas_price, fee,
                  gas_coin, coin, coin_to_sell, coin_to_buy, payload, service_data, status,
                  value, value_to_sell, value_to_buy, stake, commission, initial_amount,
                  initial_reserve, constant_reserve_ratio, name, address, pub_key, proof,
                  raw_check, threshold, created_at)
                 VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?,
                         ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
                 RETURNING id",
            )
            .bind(block.height as i64)
            .bind(&t.hash)
            .bind(&t.from)
            .bind(&t.to)
            .bind(t.tx_type.code() as i64)
            .bind(t.nonce as i64)
            .bind(t.gas_price as i64)
            .bind(t.fee as i64)
            .bind(&t.gas_coin)
            .bind(&t.coin)
            .bind(&t.coin_to_sell)
            .bind(&t.coin_to_buy)
            .bind(&t.payload)
            .bind(&t.service_data)
            .bind(t.status)
            .bind(&t.value)
            .bind(&t.value_to_sell)
            .bind(&t.value_to_buy)
            .bind(&t.stake)
            .bind(t.commission.map(|v| v as i64))
            .bind(&t.initial_amount)
            .bind(&t.initial_reserve)
            .bind(t.constant_reserve_ratio.map(|v| v as i64))
            .bind(&t.name)
            .bind(&t.address)
            .bind(&t.pub_key)
            .bind(&t.proof)
            .bind(&t.raw_check)
            .bind(t.threshold.map(|v| v as i64))
            .bind(t.created_at)
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
            let tx_id: i64 = row.get("id");

            for tag in &t.tags {
                sqlx::query("INSERT INTO tx_tags (transaction_id, key, value) VALUES (?, ?, ?)")
                    .bind(tx_id)
                    .bind(tag.key.as_str())
                    .bind(&tag.value)
                    .execute(&mut *tx)
                    .await
                    .map_err(|e| IndexerError::Storage(e.to_string()))?;
            }
        }

        for r in &block.rewards {
            sqlx::query(
                "INSERT INTO rewards (block_id, role, amount, address, validator_pk)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(block.height as i64)
            .bind(&r.role)
            .bind(&r.amount)
            .bind(&r.address)
            .bind(&r.validator_pk)
            .execute(&mut *tx)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        }

        for s in &block.slashes {
            sqlx::query(
                "INSERT INTO slashes (block_id, coin, amount, address, validator_pk)
                 VALUES (?, ?, ?, ?, ?)",
            )
            .bind(block.height as i64)
            .bind(&s.coin)
            .bind(&s.amount)
            .bind(&s.address)
            .bind(&s.validator_pk)
            .execute(&mut *tx)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        debug!(height = block.height, txs = block.transactions.len(), "block stored");
        Ok(())
    }

    async fn delete_block(&self, height: u64) -> Result<bool, IndexerError> {
        let result = sqlx::query("DELETE FROM blocks WHERE height = ?")
            .bind(height as i64)
            .execute(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(result.rows_affected() > 0)
    }

    async fn validators_by_pub_key(
        &self,
        public_keys: &[String],
    ) -> Result<HashMap<String, Validator>, IndexerError> {
        if public_keys.is_empty() {
            return Ok(HashMap::new());
        }

        let mut qb = QueryBuilder::<Sqlite>::new(
            "SELECT id, public_key, name, address, total_stake, accumulated_reward,
                    absent_times, commission, created_at_block, status
             FROM validators WHERE public_key IN (",
        );
        let mut sep = qb.separated(", ");
        for pk in public_keys {
            sep.push_bind(pk);
        }
        sep.push_unseparated(")");

        let rows = qb
            .build()
            .fetch_all(&self.pool)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        Ok(rows
            .iter()
            .map(validator_from_row)
            .map(|v| (v.record.public_key.clone(), v))
            .collect())
    }

    async fn apply_validator_changes(
        &self,
        changes: &[ValidatorChange],
    ) -> Result<Vec<i64>, IndexerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        let mut ids = Vec::with_capacity(changes.len());

        for change in changes {
            let id: i64 = match change {
                ValidatorChange::Insert(v) => sqlx::query(
                    "INSERT INTO validators
                     (public_key, name, address, total_stake, accumulated_reward,
                      absent_times, commission, created_at_block, status)
                     VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)
                     ON CONFLICT (public_key) DO UPDATE SET
                        total_stake        = excluded.total_stake,
                        accumulated_reward = excluded.accumulated_reward,
                        absent_times       = excluded.absent_times,
                        status             = excluded.status
                     RETURNING id",
                )
                .bind(&v.public_key)
                .bind(&v.name)
                .bind(&v.address)
                .bind(&v.total_stake)
                .bind(&v.accumulated_reward)
                .bind(v.absent_times as i64)
                .bind(v.commission as i64)
                .bind(v.created_at_block as i64)
                .bind(v.status as i64)
                .fetch_one(&mut *tx)
                .await
                .map_err(|e| IndexerError::Storage(e.to_string()))?
                .get("id"),
                ValidatorChange::Update(v) => sqlx::query(
                    "UPDATE validators SET
                        total_stake = ?, accumulated_reward = ?, absent_times = ?, status = ?
                     WHERE id = ?
                     RETURNING id",
                )
                .bind(&v.record.total_stake)
                .bind(&v.record.accumulated_reward)
                .bind(v.record.absent_times as i64)
                .bind(v.record.status as i64)
                .bind(v.id)
                .fetch_optional(&mut *tx)
                .await
                .map_err(|e| IndexerError::Storage(e.to_string()))?
                .ok_or_else(|| IndexerError::Storage(format!("validator {} does not exist", v.id)))?
                .get("id"),
            };
            ids.push(id);
        }

        tx.commit()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        Ok(ids)
    }

    async fn link_block_validators(
        &self,
        height: u64,
        validator_ids: &[i64],
    ) -> Result<(), IndexerError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;

        for id in validator_ids {
            sqlx::query(
                "INSERT INTO block_validator (block_id, validator_id) VALUES (?, ?)
                 ON CONFLICT (block_id, validator_id) DO NOTHING",
            )
            .bind(height as i64)
            .bind(*id)
            .execute(&mut *tx)
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))?;
        }

        tx.commit()
            .await
            .map_err(|e| IndexerError::Storage(e.to_string()))
    }

    async fn upsert_coin(&self, coin: &Coin) -> Result<(), IndexerError> {
        sqlx::query(
            "INSERT INTO coins
             (symbol, name, constant_reserve_ratio, initial_amount, initial_reserve,
              creator, creation_tx_hash, created_at)
             VALUES (?, ?, ?, ?, ?, ?, ?, ?)
             ON CONFLICT (symbol) DO UPDATE SET
                name                   = excluded.name,
                constant_reserve_ratio = excluded.constant_reserve_ratio,
                initial_amount         = excluded.initial_amount,
                initial_reserve        = excluded.initial_reserve,
                creator                = excluded.creator,
                creation_tx_hash       = excluded.creation_tx_hash,
                created_at             = excluded.created_at",
        )
        .bind(&coin.symbol)
        .bind(&coin.name)
        .bind(coin.constant_reserve_ratio.map(|v| v as i64))
        .bind(&coin.initial_amount)
        .bind(&coin.initial_reserve)
        .bind(&coin.creator)
        .bind(&coin.creation_tx_hash)
        .bind(coin.created_at)
        .execute(&self.pool)
        .await
        .map_err(|e| IndexerError::Storage(e.to_string()))?;

        debug!(symbol = %coin.symbol, "coin stored");
        Ok(())
    }
}

// ─── Tests ───────────────────────────────────────────────────────────────────
