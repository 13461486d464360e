//! In-memory repository

use std::sync::{Mutex, MutexGuard};

use anyhow::{anyhow, Result};
use chrono::{DateTime, Utc};

use super::{Record, Repository};

pub struct MemoryRepository<T> {
    records: Mutex<Vec<T>>,
}

impl<T> MemoryRepository<T> {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    fn lock(&self) -> Result<MutexGuard<'_, Vec<T>>> {
        self.records
            .lock()
            .map_err(|_| anyhow!("memory repository lock poisoned"))
    }
}

impl<T> Default for MemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Record> Repository<T> for MemoryRepository<T> {
    fn append(&self, mut record: T) -> Result<T> {
        let mut records = self.lock()?;
        record.assign_id(records.len() as i64 + 1);
        records.push(record.clone());
        Ok(record)
    }

    fn query_recent(&self, limit: usize) -> Result<Vec<T>> {
        let records = self.lock()?;
        Ok(records.iter().rev().take(limit).cloned().collect())
    }

    fn query_between(
        &self,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
        limit: usize,
    ) -> Result<Vec<T>> {
        let records = self.lock()?;
        Ok(records
            .iter()
            .rev()
            .filter(|r| (from..=to).contains(&r.recorded_at()))
            .take(limit)
            .cloned()
            .collect())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.lock()?.len())
    }

    fn contains_key(&self, record: &T) -> Result<bool> {
        let Some(key) = record.unique_key() else {
            return Ok(false);
        };
        Ok(self
            .lock()?
            .iter()
            .any(|r| r.unique_key() == Some(key)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{PriceTick, Side};
    use chrono::{Duration, Utc};
    use rust_decimal::Decimal;

    fn tick(id: u64) -> PriceTick {
        PriceTick {
            id,
            pair: "btc_jpy".into(),
            rate: Decimal::from(100 + id),
            amount: Decimal::ONE,
            side: Side::Sell,
            timestamp: Utc::now(),
        }
    }

    #[test]
    fn test_query_recent_is_most_recent_first() {
        let repo = MemoryRepository::new();
        repo.append_all((1..=5).map(tick).collect()).unwrap();

        let recent = repo.query_recent(3).unwrap();
        let ids: Vec<u64> = recent.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![5, 4, 3]);
        assert_eq!(repo.latest().unwrap().map(|t| t.id), Some(5));
        assert_eq!(repo.query_recent(100).unwrap().len(), 5);
    }

    #[test]
    fn test_duplicate_ticks_are_skipped() {
        let repo = MemoryRepository::new();
        assert_eq!(repo.append_all(vec![tick(1), tick(2)]).unwrap(), 2);
        assert_eq!(repo.append_all(vec![tick(2), tick(3)]).unwrap(), 1);
        assert_eq!(repo.count().unwrap(), 3);
    }

    #[test]
    fn test_query_between_is_inclusive() {
        let start = Utc::now();
        let repo = MemoryRepository::new();
        let ticks: Vec<PriceTick> = (1..=6)
            .map(|id| PriceTick {
                timestamp: start + Duration::minutes(id as i64),
                ..tick(id)
            })
            .collect();
        repo.append_all(ticks).unwrap();

        let range = repo
            .query_between(start + Duration::minutes(2), start + Duration::minutes(5), 10)
            .unwrap();
        let ids: Vec<u64> = range.iter().map(|t| t.id).collect();
        assert_eq!(ids, vec![5, 4, 3, 2]);

        let limited = repo
            .query_between(start, start + Duration::minutes(5), 2)
            .unwrap();
        assert_eq!(limited.iter().map(|t| t.id).collect::<Vec<_>>(), vec![5, 4]);

        assert!(repo
            .query_between(start + Duration::hours(1), start + Duration::hours(2), 10)
            .unwrap()
            .is_empty());
    }

    #[test]
    fn test_empty_repository() {
        let repo: MemoryRepository<PriceTick> = MemoryRepository::default();
        assert!(repo.latest().unwrap().is_none());
        assert!(repo.query_recent(10).unwrap().is_empty());
    }
}
