//! Redis-backed quota store and invite registry.
//!
//! Keys:
//! - `quota:{user_id}`: sorted set, member = issuance id, score = unix millis
//! - `invite:{token}`: hash with the [`InviteRecord`] fields

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use gatekeeper_common::PrefixedId;
use redis::aio::ConnectionManager;
use redis::Script;

use super::quota::{IssuanceEntry, QuotaStore};
use super::registry::InviteRegistry;
use crate::error::StoreError;
use crate::models::invite::{InviteRecord, Redemption};
use crate::models::UserId;

fn quota_key(user: UserId) -> String {
    format!("quota:{}", user)
}

fn invite_key(token: &str) -> String {
    format!("invite:{}", token)
}

/// Open a managed connection; reconnects are handled by the manager.
pub async fn connect(redis_url: &str) -> Result<ConnectionManager, StoreError> {
    let client = redis::Client::open(redis_url)?;
    let conn = ConnectionManager::new(client).await?;
    tracing::info!("redis connection established");
    Ok(conn)
}

// ---------------------------------------------------------------------------
// Quota store
// ---------------------------------------------------------------------------

pub struct RedisQuotaStore {
    conn: ConnectionManager,
    window: Duration,
}

impl RedisQuotaStore {
    pub fn new(conn: ConnectionManager, window: Duration) -> Self {
        Self { conn, window }
    }
}

#[async_trait]
impl QuotaStore for RedisQuotaStore {
    async fn count_in_window(&self, user: UserId, now: DateTime<Utc>) -> Result<usize, StoreError> {
        let key = quota_key(user);
        let cutoff = (now - self.window).timestamp_millis();
        let mut conn = self.conn.clone();

        let (count,): (usize,) = redis::pipe()
            .atomic()
            .zrembyscore(&key, "-inf", cutoff)
            .ignore()
            .zcard(&key)
            .query_async(&mut conn)
            .await?;
        Ok(count)
    }

    async fn record_issuance(&self, user: UserId, at: DateTime<Utc>) -> Result<(), StoreError> {
        let key = quota_key(user);
        let mut conn = self.conn.clone();

        let _: () = redis::pipe()
            .atomic()
            .zadd(&key, IssuanceEntry::generate(), at.timestamp_millis())
            .ignore()
            .expire(&key, self.window.num_seconds())
            .ignore()
            .query_async(&mut conn)
            .await?;
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Invite registry
// ---------------------------------------------------------------------------

const CREATE_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 1 then
  return 0
end
redis.call('HSET', KEYS[1],
  'token', ARGV[1],
  'referrer', ARGV[2],
  'created_at', ARGV[3],
  'expires_at', ARGV[4],
  'member_limit', ARGV[5])
redis.call('EXPIRE', KEYS[1], ARGV[6])
return 1
";

const MARK_USED_SCRIPT: &str = r"
if redis.call('EXISTS', KEYS[1]) == 0 then
  return 'not_found'
end
if redis.call('HEXISTS', KEYS[1], 'used_by') == 1 then
  return 'already_used'
end
if tonumber(redis.call('HGET', KEYS[1], 'expires_at')) < tonumber(ARGV[2]) then
  return 'expired'
end
redis.call('HSET', KEYS[1], 'used_by', ARGV[1])
return 'redeemed'
";

pub struct RedisInviteRegistry {
    conn: ConnectionManager,
    /// Retention past `expires_at` before Redis drops the key.
    grace: Duration,
    create: Script,
    mark_used: Script,
}

impl RedisInviteRegistry {
    pub fn new(conn: ConnectionManager, grace: Duration) -> Self {
        Self {
            conn,
            grace,
            create: Script::new(CREATE_SCRIPT),
            mark_used: Script::new(MARK_USED_SCRIPT),
        }
    }

    async fn fetch(&self, token: &str) -> Result<Option<InviteRecord>, StoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let fields: HashMap<String, String> = conn.hgetall(invite_key(token)).await?;
        record_from_fields(&fields)
    }
}

#[async_trait]
impl InviteRegistry for RedisInviteRegistry {
    async fn create(&self, record: InviteRecord) -> Result<(), StoreError> {
        let ttl = (record.expires_at + self.grace - Utc::now()).num_seconds().max(1);
        let referrer = record.referrer.map(|r| r.to_string()).unwrap_or_default();
        let mut conn = self.conn.clone();

        let created: i64 = self
            .create
            .key(invite_key(&record.token))
            .arg(&record.token)
            .arg(referrer)
            .arg(record.created_at.timestamp_millis())
            .arg(record.expires_at.timestamp_millis())
            .arg(record.member_limit)
            .arg(ttl)
            .invoke_async(&mut conn)
            .await?;

        if created == 1 {
            Ok(())
        } else {
            Err(StoreError::AlreadyExists)
        }
    }

    async fn mark_used(
        &self,
        token: &str,
        user: UserId,
        now: DateTime<Utc>,
    ) -> Result<Redemption, StoreError> {
        let mut conn = self.conn.clone();
        let outcome: String = self
            .mark_used
            .key(invite_key(token))
            .arg(user.0)
            .arg(now.timestamp_millis())
            .invoke_async(&mut conn)
            .await?;

        if outcome == "not_found" {
            return Ok(Redemption::NotFound);
        }

        // The key can only vanish here through TTL, which is past expiry anyway.
        let Some(record) = self.fetch(token).await? else {
            return Ok(Redemption::NotFound);
        };

        match outcome.as_str() {
            "redeemed" => Ok(Redemption::Redeemed(record)),
            "already_used" => Ok(Redemption::AlreadyUsed(record)),
            "expired" => Ok(Redemption::Expired(record)),
            other => Err(StoreError::Corrupt(format!("unexpected script result {other:?}"))),
        }
    }

    async fn lookup(&self, token: &str) -> Result<Option<InviteRecord>, StoreError> {
        self.fetch(token).await
    }

    async fn remove(&self, token: &str) -> Result<bool, StoreError> {
        use redis::AsyncCommands;
        let mut conn = self.conn.clone();
        let removed: i64 = conn.del(invite_key(token)).await?;
        Ok(removed > 0)
    }

    async fn purge_expired(&self, _before: DateTime<Utc>) -> Result<usize, StoreError> {
        // Key TTLs set in `create` already evict expired records.
        Ok(0)
    }
}

fn record_from_fields(fields: &HashMap<String, String>) -> Result<Option<InviteRecord>, StoreError> {
    if fields.is_empty() {
        return Ok(None);
    }

    let get = |name: &str| {
        fields
            .get(name)
            .ok_or_else(|| StoreError::Corrupt(format!("missing field {name}")))
    };
    let millis = |name: &str| -> Result<DateTime<Utc>, StoreError> {
        get(name)?
            .parse::<i64>()
            .ok()
            .and_then(DateTime::from_timestamp_millis)
            .ok_or_else(|| StoreError::Corrupt(format!("bad timestamp in {name}")))
    };
    let user = |raw: Option<&String>| -> Result<Option<UserId>, StoreError> {
        match raw.map(String::as_str) {
            None | Some("") => Ok(None),
            Some(v) => v
                .parse()
                .map(|id| Some(UserId(id)))
                .map_err(|_| StoreError::Corrupt(format!("bad user id {v:?}"))),
        }
    };

    Ok(Some(InviteRecord {
        token: get("token")?.clone(),
        referrer: user(fields.get("referrer"))?,
        created_at: millis("created_at")?,
        expires_at: millis("expires_at")?,
        member_limit: get("member_limit")?
            .parse()
            .map_err(|_| StoreError::Corrupt("bad member_limit".into()))?,
        used_by: user(fields.get("used_by"))?,
    }))
}
