use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use dashmap::DashMap;
use gatekeeper_common::id::prefix;
use gatekeeper_common::PrefixedId;

use crate::error::StoreError;
use crate::models::UserId;

/// Rolling per-user counter of invite issuances.
///
/// Only entries newer than `now - window` count. Older entries are purged when
/// the window is queried.
#[async_trait]
pub trait QuotaStore: Send + Sync {
    async fn count_in_window(&self, user: UserId, now: DateTime<Utc>) -> Result<usize, StoreError>;
    async fn record_issuance(&self, user: UserId, at: DateTime<Utc>) -> Result<(), StoreError>;
}

/// One quota entry's unique member name.
pub struct IssuanceEntry;

impl PrefixedId for IssuanceEntry {
    const PREFIX: &'static str = prefix::ISSUANCE;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

struct QuotaRecord {
    entries: Vec<(DateTime<Utc>, String)>,
    /// Whole-record TTL, pushed forward on every issuance.
    expires_at: DateTime<Utc>,
}

pub struct MemoryQuotaStore {
    window: Duration,
    records: DashMap<UserId, QuotaRecord>,
}

impl MemoryQuotaStore {
    pub fn new(window: Duration) -> Self {
        Self {
            window,
            records: DashMap::new(),
        }
    }

    /// Number of users with a live record.
    pub fn tracked_users(&self) -> usize {
        self.records.len()
    }
}

#[async_trait]
impl QuotaStore for MemoryQuotaStore {
    async fn count_in_window(&self, user: UserId, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let cutoff = now - self.window;

        // Idle past its TTL. The predicate runs under the shard lock.
        if self
            .records
            .remove_if(&user, |_, record| now >= record.expires_at)
            .is_some()
        {
            return Ok(0);
        }

        Ok(self
            .records
            .get_mut(&user)
            .map(|mut record| {
                record.entries.retain(|(at, _)| *at > cutoff);
                record.entries.len()
            })
            .unwrap_or(0))
    }

    async fn record_issuance(&self, user: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let mut record = self.records.entry(user).or_insert_with(|| QuotaRecord {
            entries: Vec::new(),
            expires_at: at,
        });
        record.entries.push((at, IssuanceEntry::generate()));
        record.expires_at = at + self.window;
        Ok(())
    }
}
