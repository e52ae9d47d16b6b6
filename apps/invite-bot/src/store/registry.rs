use async_trait::async_trait;
use chrono::{DateTime, Utc};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;

use crate::error::StoreError;
use crate::models::invite::{InviteRecord, Redemption};
use crate::models::UserId;

/// Durable record of every minted invite token.
#[async_trait]
pub trait InviteRegistry: Send + Sync {
    /// Insert a new record. Fails with [`StoreError::AlreadyExists`] if the token is taken.
    async fn create(&self, record: InviteRecord) -> Result<(), StoreError>;

    /// Redeem `token` for `user`. Exactly one concurrent caller can get `Redeemed`.
    async fn mark_used(
        &self,
        token: &str,
        user: UserId,
        now: DateTime<Utc>,
    ) -> Result<Redemption, StoreError>;

    async fn lookup(&self, token: &str) -> Result<Option<InviteRecord>, StoreError>;

    /// Delete the record for `token`. Returns whether one existed.
    async fn remove(&self, token: &str) -> Result<bool, StoreError>;

    /// Drop records that expired before `before`. Returns how many were removed.
    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<usize, StoreError>;
}

// ---------------------------------------------------------------------------
// In-memory implementation
// ---------------------------------------------------------------------------

pub struct MemoryInviteRegistry {
    records: DashMap<String, InviteRecord>,
}

impl MemoryInviteRegistry {
    pub fn new() -> Self {
        Self {
            records: DashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

impl Default for MemoryInviteRegistry {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl InviteRegistry for MemoryInviteRegistry {
    async fn create(&self, record: InviteRecord) -> Result<(), StoreError> {
        match self.records.entry(record.token.clone()) {
            Entry::Occupied(_) => Err(StoreError::AlreadyExists),
            Entry::Vacant(slot) => {
                slot.insert(record);
                Ok(())
            }
        }
    }

    async fn mark_used(
        &self,
        token: &str,
        user: UserId,
        now: DateTime<Utc>,
    ) -> Result<Redemption, StoreError> {
        // The shard write lock makes check-and-set a single step.
        let Some(mut record) = self.records.get_mut(token) else {
            return Ok(Redemption::NotFound);
        };
        if record.is_used() {
            return Ok(Redemption::AlreadyUsed(record.clone()));
        }
        if record.is_expired(now) {
            return Ok(Redemption::Expired(record.clone()));
        }
        record.used_by = Some(user);
        Ok(Redemption::Redeemed(record.clone()))
    }

    async fn lookup(&self, token: &str) -> Result<Option<InviteRecord>, StoreError> {
        Ok(self.records.get(token).map(|r| r.clone()))
    }

    async fn remove(&self, token: &str) -> Result<bool, StoreError> {
        Ok(self.records.remove(token).is_some())
    }

    async fn purge_expired(&self, before: DateTime<Utc>) -> Result<usize, StoreError> {
        let start = self.records.len();
        self.records.retain(|_, record| record.expires_at >= before);
        Ok(start.saturating_sub(self.records.len()))
    }
}
