//! Persistence behind a thin repository interface
//!
//! Every record type gets its own [`Repository`]; [`Store`] bundles the four
//! the poller needs. Two backends exist:
//! - [`SqliteRepository`]: one shared `rusqlite` connection, WAL mode
//! - [`MemoryRepository`]: a `Mutex<Vec<T>>`, used by `simulate` and tests
//!
//! "Most recent" means most recently appended. Price ticks are appended in
//! ascending trade id order, so this is also the newest trade.

pub mod memory;
pub mod sqlite;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::types::{OrderBookSnapshot, PriceTick, SimulatedOrder, TickerSnapshot};

pub use memory::MemoryRepository;
pub use sqlite::{SqliteRepository, SqlRecord};

/// A storable record
pub trait Record: Clone + Send + Sync + 'static {
    /// Time the record describes, used by range queries
    fn recorded_at(&self) -> DateTime<Utc>;

    /// Natural key used to skip duplicates, if the record has one
    fn unique_key(&self) -> Option<u64> {
        None
    }

    /// Receive the row id assigned by the backend
    fn assign_id(&mut self, _id: i64) {}
}

impl Record for PriceTick {
    fn recorded_at(&self) -> DateTime<Utc> {
        self.timestamp
    }

    fn unique_key(&self) -> Option<u64> {
        Some(self.id)
    }
}

impl Record for TickerSnapshot {
    fn recorded_at(&self) -> DateTime<Utc> {
        self.timestamp
    }
}

impl Record for OrderBookSnapshot {
    fn recorded_at(&self) -> DateTime<Utc> {
        self.captured_at
    }
}

impl Record for SimulatedOrder {
    fn recorded_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    fn assign_id(&mut self, id: i64) {
        self.id = Some(id);
    }
}

/// Append-only access to one record type
pub trait Repository<T: Record>: Send + Sync {
    /// Store one record and return it as stored
    fn append(&self, record: T) -> Result<T>;

    /// Store several records in order, returning how many were new
    fn append_all(&self, records: Vec<T>) -> Result<usize> {
        let mut inserted = 0;
        for record in records {
            if self.contains_key(&record)? {
                continue;
            }
            self.append(record)?;
            inserted += 1;
        }
        Ok(inserted)
    }

    /// Up to `limit` records, most recent first
    fn query_recent(&self, limit: usize) -> Result<Vec<T>>;

    /// Up to `limit` records with `from <= recorded_at <= to`, most recent first
    fn query_between(&self, from: DateTime<Utc>, to: DateTime<Utc>, limit: usize)
        -> Result<Vec<T>>;

    fn latest(&self) -> Result<Option<T>> {
        Ok(self.query_recent(1)?.into_iter().next())
    }

    fn count(&self) -> Result<usize>;

    /// Whether a record with the same natural key is already stored
    fn contains_key(&self, _record: &T) -> Result<bool> {
        Ok(false)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    #[default]
    Sqlite,
    Memory,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub path: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackend::Sqlite,
            path: PathBuf::from("data/market.db"),
        }
    }
}

/// The repositories used by one poller
#[derive(Clone)]
pub struct Store {
    pub ticks: Arc<dyn Repository<PriceTick>>,
    pub tickers: Arc<dyn Repository<TickerSnapshot>>,
    pub order_books: Arc<dyn Repository<OrderBookSnapshot>>,
    pub orders: Arc<dyn Repository<SimulatedOrder>>,
}

impl Store {
    pub fn open(config: &StorageConfig) -> Result<Self> {
        match config.backend {
            StorageBackend::Sqlite => Self::sqlite(&config.path),
            StorageBackend::Memory => Ok(Self::in_memory()),
        }
    }

    pub fn in_memory() -> Self {
        Self {
            ticks: Arc::new(MemoryRepository::new()),
            tickers: Arc::new(MemoryRepository::new()),
            order_books: Arc::new(MemoryRepository::new()),
            orders: Arc::new(MemoryRepository::new()),
        }
    }

    pub fn sqlite(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let conn = sqlite::open_connection(path.as_ref())?;

        Ok(Self {
            ticks: Arc::new(SqliteRepository::<PriceTick>::new(conn.clone())?),
            tickers: Arc::new(SqliteRepository::<TickerSnapshot>::new(conn.clone())?),
            order_books: Arc::new(SqliteRepository::<OrderBookSnapshot>::new(conn.clone())?),
            orders: Arc::new(SqliteRepository::<SimulatedOrder>::new(conn)?),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Side;
    use chrono::Utc;
    use rust_decimal_macros::dec;

    #[test]
    fn test_storage_config_defaults() {
        let config: StorageConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(config.backend, StorageBackend::Sqlite);
        assert_eq!(config.path, PathBuf::from("data/market.db"));

        let config: StorageConfig = serde_json::from_str(r#"{"backend": "memory"}"#).unwrap();
        assert_eq!(config.backend, StorageBackend::Memory);
    }

    #[test]
    fn test_open_memory_store() {
        let store = Store::open(&StorageConfig {
            backend: StorageBackend::Memory,
            path: PathBuf::new(),
        })
        .unwrap();

        let order = SimulatedOrder {
            id: None,
            side: Side::Buy,
            rate: dec!(100),
            amount: dec!(0.05),
            pair: "btc_jpy".into(),
            created_at: Utc::now(),
        };
        let stored = store.orders.append(order).unwrap();
        assert_eq!(stored.id, Some(1));
        assert_eq!(store.orders.latest().unwrap(), Some(stored));
    }
}
