//! SQLite repositories
//!
//! All repositories of one Store share a single connection. Decimals are
//! stored as TEXT to keep them exact; timestamps use rusqlite's chrono mapping.

use std::marker::PhantomData;
use std::path::Path;
use std::str::FromStr;
use std::sync::{Arc, Mutex, MutexGuard};

use anyhow::{anyhow, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Type;
use rusqlite::{params, Connection, Row};
use rust_decimal::Decimal;
use tracing::{debug, info};

use super::{Record, Repository};
use crate::types::{OrderBookSnapshot, PriceTick, SimulatedOrder, Side, TickerSnapshot};

pub type SharedConnection = Arc<Mutex<Connection>>;

/// Open (or create) the database file and enable WAL
pub fn open_connection(path: &Path) -> Result<SharedConnection> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory: {}", parent.display()))?;
    }

    let conn = Connection::open(path)
        .with_context(|| format!("Failed to open database: {}", path.display()))?;
    conn.pragma_update(None, "journal_mode", "WAL")?;

    info!(path = %path.display(), "SQLite store opened");
    Ok(Arc::new(Mutex::new(conn)))
}

/// Table mapping for a record type
pub trait SqlRecord: Record {
    const TABLE: &'static str;
    const SCHEMA: &'static str;
    /// Selects the newest rows first; `?1` is the limit
    const SELECT_RECENT: &'static str;
    /// Like `SELECT_RECENT` within an inclusive time range; `?1`/`?2` are the
    /// bounds, `?3` the limit. Timestamps share one text format, so they
    /// compare as strings.
    const SELECT_BETWEEN: &'static str;

    /// Insert the record, returning the number of rows written
    fn insert(&self, conn: &Connection) -> rusqlite::Result<usize>;

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self>;
}

fn decimal_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Decimal> {
    let text: String = row.get(idx)?;
    Decimal::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

fn side_at(row: &Row<'_>, idx: usize) -> rusqlite::Result<Side> {
    let text: String = row.get(idx)?;
    text.parse()
        .map_err(|e: String| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, e.into()))
}

fn json_at<T: serde::de::DeserializeOwned>(row: &Row<'_>, idx: usize) -> rusqlite::Result<T> {
    let text: String = row.get(idx)?;
    serde_json::from_str(&text)
        .map_err(|e| rusqlite::Error::FromSqlConversionFailure(idx, Type::Text, Box::new(e)))
}

impl SqlRecord for PriceTick {
    const TABLE: &'static str = "price_ticks";
    const SCHEMA: &'static str = "CREATE TABLE IF NOT EXISTS price_ticks (
            id INTEGER PRIMARY KEY,
            pair TEXT NOT NULL,
            rate TEXT NOT NULL,
            amount TEXT NOT NULL,
            side TEXT NOT NULL,
            timestamp TEXT NOT NULL
        )";
    const SELECT_RECENT: &'static str = "SELECT id, pair, rate, amount, side, timestamp
         FROM price_ticks ORDER BY id DESC LIMIT ?1";
    const SELECT_BETWEEN: &'static str = "SELECT id, pair, rate, amount, side, timestamp
         FROM price_ticks WHERE timestamp BETWEEN ?1 AND ?2 ORDER BY id DESC LIMIT ?3";

    fn insert(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT OR IGNORE INTO price_ticks (id, pair, rate, amount, side, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
            params![
                self.id as i64,
                self.pair,
                self.rate.to_string(),
                self.amount.to_string(),
                self.side.as_str(),
                self.timestamp,
            ],
        )
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(PriceTick {
            id: row.get::<_, i64>(0)? as u64,
            pair: row.get(1)?,
            rate: decimal_at(row, 2)?,
            amount: decimal_at(row, 3)?,
            side: side_at(row, 4)?,
            timestamp: row.get(5)?,
        })
    }
}

impl SqlRecord for TickerSnapshot {
    const TABLE: &'static str = "ticker_snapshots";
    const SCHEMA: &'static str = "CREATE TABLE IF NOT EXISTS ticker_snapshots (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            last TEXT NOT NULL,
            bid TEXT NOT NULL,
            ask TEXT NOT NULL,
            high TEXT NOT NULL,
            low TEXT NOT NULL,
            volume TEXT NOT NULL,
            timestamp TEXT NOT NULL
        )";
    const SELECT_RECENT: &'static str = "SELECT last, bid, ask, high, low, volume, timestamp
         FROM ticker_snapshots ORDER BY row_id DESC LIMIT ?1";
    const SELECT_BETWEEN: &'static str = "SELECT last, bid, ask, high, low, volume, timestamp
         FROM ticker_snapshots WHERE timestamp BETWEEN ?1 AND ?2
         ORDER BY row_id DESC LIMIT ?3";

    fn insert(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO ticker_snapshots (last, bid, ask, high, low, volume, timestamp)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                self.last.to_string(),
                self.bid.to_string(),
                self.ask.to_string(),
                self.high.to_string(),
                self.low.to_string(),
                self.volume.to_string(),
                self.timestamp,
            ],
        )
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(TickerSnapshot {
            last: decimal_at(row, 0)?,
            bid: decimal_at(row, 1)?,
            ask: decimal_at(row, 2)?,
            high: decimal_at(row, 3)?,
            low: decimal_at(row, 4)?,
            volume: decimal_at(row, 5)?,
            timestamp: row.get(6)?,
        })
    }
}

impl SqlRecord for OrderBookSnapshot {
    const TABLE: &'static str = "order_books";
    const SCHEMA: &'static str = "CREATE TABLE IF NOT EXISTS order_books (
            row_id INTEGER PRIMARY KEY AUTOINCREMENT,
            asks TEXT NOT NULL,
            bids TEXT NOT NULL,
            captured_at TEXT NOT NULL
        )";
    const SELECT_RECENT: &'static str = "SELECT asks, bids, captured_at
         FROM order_books ORDER BY row_id DESC LIMIT ?1";
    const SELECT_BETWEEN: &'static str = "SELECT asks, bids, captured_at
         FROM order_books WHERE captured_at BETWEEN ?1 AND ?2 ORDER BY row_id DESC LIMIT ?3";

    fn insert(&self, conn: &Connection) -> rusqlite::Result<usize> {
        let asks = serde_json::to_string(&self.asks)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;
        let bids = serde_json::to_string(&self.bids)
            .map_err(|e| rusqlite::Error::ToSqlConversionFailure(Box::new(e)))?;

        conn.execute(
            "INSERT INTO order_books (asks, bids, captured_at) VALUES (?1, ?2, ?3)",
            params![asks, bids, self.captured_at],
        )
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(OrderBookSnapshot {
            asks: json_at(row, 0)?,
            bids: json_at(row, 1)?,
            captured_at: row.get(2)?,
        })
    }
}

impl SqlRecord for SimulatedOrder {
    const TABLE: &'static str = "simulated_orders";
    const SCHEMA: &'static str = "CREATE TABLE IF NOT EXISTS simulated_orders (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            side TEXT NOT NULL,
            rate TEXT NOT NULL,
            amount TEXT NOT NULL,
            pair TEXT NOT NULL,
            created_at TEXT NOT NULL
        )";
    const SELECT_RECENT: &'static str = "SELECT id, side, rate, amount, pair, created_at
         FROM simulated_orders ORDER BY id DESC LIMIT ?1";
    const SELECT_BETWEEN: &'static str = "SELECT id, side, rate, amount, pair, created_at
         FROM simulated_orders WHERE created_at BETWEEN ?1 AND ?2 ORDER BY id DESC LIMIT ?3";

    fn insert(&self, conn: &Connection) -> rusqlite::Result<usize> {
        conn.execute(
            "INSERT INTO simulated_orders (side, rate, amount, pair, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                self.side.as_str(),
                self.rate.to_string(),
                self.amount.to_string(),
                self.pair,
                self.created_at,
            ],
        )
    }

    fn from_row(row: &Row<'_>) -> rusqlite::Result<Self> {
        Ok(SimulatedOrder {
            id: Some(row.get(0)?),
            side: side_at(row, 1)?,
            rate: decimal_at(row, 2)?,
            amount: decimal_at(row, 3)?,
            pair: row.get(4)?,
            created_at: row.get(5)?,
        })
    }
}

pub struct SqliteRepository<T> {
    conn: SharedConnection,
    _record: PhantomData<fn() -> T>,
}

impl<T: SqlRecord> SqliteRepository<T> {
    /// Wrap a shared connection, creating the table if needed
    pub fn new(conn: SharedConnection) -> Result<Self> {
        let repo = Self {
            conn,
            _record: PhantomData,
        };
        repo.lock()?
            .execute_batch(T::SCHEMA)
            .with_context(|| format!("Failed to create table {}", T::TABLE))?;
        Ok(repo)
    }

    fn lock(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow!("sqlite connection lock poisoned"))
    }
}

impl<T: SqlRecord> Repository<T> for SqliteRepository<T> {
    fn append(&self, mut record: T) -> Result<T> {
        let conn = self.lock()?;
        let written = record
            .insert(&conn)
            .with_context(|| format!("Failed to insert into {}", T::TABLE))?;
        if written > 0 {
            record.assign_id(conn.last_insert_rowid());
        }
        Ok(record)
    }

    /// Inserts in one transaction; rows ignored by the table's conflict rule
    /// are not counted
    fn append_all(&self, records: Vec<T>) -> Result<usize> {
        let mut conn = self.lock()?;
        let tx = conn.transaction()?;
        let mut inserted = 0;
        for record in &records {
            inserted += record
                .insert(&tx)
                .with_context(|| format!("Failed to insert into {}", T::TABLE))?;
        }
        tx.commit()?;

        debug!(table = T::TABLE, received = records.len(), inserted, "Batch stored");
        Ok(inserted)
    }

    fn query_recent(&self, limit: usize) -> Result<Vec<T>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(T::SELECT_RECENT)?;
        let rows = stmt
            .query_map(params![limit as i64], T::from_row)?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to read {}", T::TABLE))?;
        Ok(rows)
    }

    fn query_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<T>> {
        let conn = self.lock()?;
        let mut stmt = conn.prepare(T::SELECT_BETWEEN)?;
        let rows = stmt
            .query_map(params![from, to, limit as i64], T::from_row)?
            .collect::<Result<Vec<_>, _>>()
            .with_context(|| format!("Failed to read {} between {} and {}", T::TABLE, from, to))?;
        Ok(rows)
    }

    fn count(&self) -> Result<usize> {
        let conn = self.lock()?;
        let count: i64 = conn.query_row(
            &format!("SELECT COUNT(*) FROM {}", T::TABLE),
            [],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::Store;
    use crate::types::BookLevel;
    use chrono::{Duration, TimeZone, Utc};
    use rust_decimal_macros::dec;
    use tempfile::tempdir;

    fn tick(id: u64) -> PriceTick {
        PriceTick {
            id,
            pair: "btc_jpy".into(),
            rate: Decimal::from(5_000_000 + id) + dec!(0.5),
            amount: dec!(0.01),
            side: Side::Buy,
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::seconds(id as i64),
        }
    }

    fn order(side: Side) -> SimulatedOrder {
        SimulatedOrder {
            id: None,
            side,
            rate: dec!(5000000.5),
            amount: dec!(0.05),
            pair: "btc_jpy".into(),
            created_at: Utc::now(),
        }
    }

    #[test]
    fn test_ticks_roundtrip_and_dedupe() {
        let dir = tempdir().unwrap();
        let store = Store::sqlite(dir.path().join("market.db")).unwrap();

        assert_eq!(store.ticks.append_all((1..=3).map(tick).collect()).unwrap(), 3);
        assert_eq!(store.ticks.append_all((2..=5).map(tick).collect()).unwrap(), 2);
        assert_eq!(store.ticks.count().unwrap(), 5);

        let recent = store.ticks.query_recent(2).unwrap();
        assert_eq!(recent, vec![tick(5), tick(4)]);
    }

    #[test]
    fn test_ticks_between() {
        let dir = tempdir().unwrap();
        let store = Store::sqlite(dir.path().join("market.db")).unwrap();
        store.ticks.append_all((1..=10).map(tick).collect()).unwrap();

        let day = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let range = store
            .ticks
            .query_between(day + Duration::seconds(3), day + Duration::seconds(6), 100)
            .unwrap();
        assert_eq!(range, vec![tick(6), tick(5), tick(4), tick(3)]);

        let limited = store
            .ticks
            .query_between(day, day + Duration::seconds(6), 2)
            .unwrap();
        assert_eq!(limited, vec![tick(6), tick(5)]);

        // sub-second timestamps still sort inside the range
        let mut late = tick(11);
        late.timestamp = day + Duration::milliseconds(6_500);
        store.ticks.append(late.clone()).unwrap();
        let range = store
            .ticks
            .query_between(day + Duration::seconds(6), day + Duration::seconds(7), 100)
            .unwrap();
        assert_eq!(range, vec![late, tick(7), tick(6)]);

        assert!(store
            .ticks
            .query_between(day + Duration::days(1), day + Duration::days(2), 100)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_orders_get_row_ids() {
        let dir = tempdir().unwrap();
        let store = Store::sqlite(dir.path().join("market.db")).unwrap();

        let first = store.orders.append(order(Side::Buy)).unwrap();
        let second = store.orders.append(order(Side::Sell)).unwrap();
        assert_eq!(first.id, Some(1));
        assert_eq!(second.id, Some(2));

        let latest = store.orders.latest().unwrap().unwrap();
        assert_eq!(latest.side, Side::Sell);
        assert_eq!(latest.rate, dec!(5000000.5));
    }

    #[test]
    fn test_snapshots_roundtrip() {
        let dir = tempdir().unwrap();
        let store = Store::sqlite(dir.path().join("nested/dir/market.db")).unwrap();

        let book = OrderBookSnapshot {
            asks: vec![BookLevel {
                price: dec!(101.5),
                quantity: dec!(0.3),
            }],
            bids: vec![BookLevel {
                price: dec!(100),
                quantity: dec!(1.25),
            }],
            captured_at: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        };
        store.order_books.append(book.clone()).unwrap();
        assert_eq!(store.order_books.latest().unwrap(), Some(book));

        let ticker = TickerSnapshot {
            last: dec!(100),
            bid: dec!(99),
            ask: dec!(101),
            high: dec!(110),
            low: dec!(90),
            volume: dec!(1234.5678),
            timestamp: Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap(),
        };
        store.tickers.append(ticker.clone()).unwrap();
        assert_eq!(store.tickers.latest().unwrap(), Some(ticker));
    }

    #[test]
    fn test_data_survives_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("market.db");

        {
            let store = Store::sqlite(&path).unwrap();
            store.orders.append(order(Side::Buy)).unwrap();
        }

        let store = Store::sqlite(&path).unwrap();
        assert_eq!(store.orders.count().unwrap(), 1);
        assert_eq!(store.orders.latest().unwrap().unwrap().side, Side::Buy);
    }
}
