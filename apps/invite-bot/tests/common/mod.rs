#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use invite_bot::engine::{Engine, EngineSettings};
use invite_bot::error::{ProviderError, StoreError};
use invite_bot::models::invite::{InviteRecord, Redemption};
use invite_bot::models::membership::{MembershipMode, MembershipStatus};
use invite_bot::models::{Person, UserId};
use invite_bot::ports::{
    CallbackAnswerer, Collaborators, GroupManager, InviteProvider, MembershipGate, ProfileLookup,
};
use invite_bot::store::quota::{MemoryQuotaStore, QuotaStore};
use invite_bot::store::registry::{InviteRegistry, MemoryInviteRegistry};
use invite_bot::store::Stores;

pub const GROUP: &str = "-1001234567890";
pub const GROUP_CHAT: i64 = -1001234567890;

/// Fixed reference instant so scenarios read as offsets.
pub fn t0() -> DateTime<Utc> {
    DateTime::from_timestamp(1_700_000_000, 0).unwrap()
}

pub fn person(id: i64, name: &str) -> Person {
    Person {
        id: UserId(id),
        first_name: name.to_string(),
        username: None,
    }
}

pub fn settings(mode: MembershipMode) -> EngineSettings {
    let mut s = EngineSettings::new(GROUP, mode);
    s.provider_timeout = Duration::from_millis(200);
    s.rules_url = Some("https://example.org/rules".to_string());
    s
}

/// Scripted stand-in for the Bot API.
#[derive(Default)]
pub struct FakeTelegram {
    pub statuses: Mutex<HashMap<UserId, MembershipStatus>>,
    pub default_status: Mutex<Option<MembershipStatus>>,
    pub names: Mutex<HashMap<UserId, String>>,
    pub gate_down: AtomicBool,
    pub provider_down: AtomicBool,
    pub provider_delay: Mutex<Duration>,
    pub restrict_down: AtomicBool,
    pub links_created: AtomicUsize,
    pub link_names: Mutex<Vec<String>>,
    pub restricted: Mutex<Vec<(i64, UserId, DateTime<Utc>)>>,
    pub answered_callbacks: Mutex<Vec<String>>,
}

impl FakeTelegram {
    pub fn set_status(&self, user: i64, status: MembershipStatus) {
        self.statuses.lock().insert(UserId(user), status);
    }

    pub fn set_name(&self, user: i64, name: &str) {
        self.names.lock().insert(UserId(user), name.to_string());
    }
}

#[async_trait]
impl MembershipGate for FakeTelegram {
    async fn get_membership_status(
        &self,
        _group: &str,
        user: UserId,
    ) -> Result<MembershipStatus, ProviderError> {
        if self.gate_down.load(Ordering::SeqCst) {
            return Err(ProviderError::Transport("connection refused".into()));
        }
        let status = self.statuses.lock().get(&user).copied();
        Ok(status
            .or(*self.default_status.lock())
            .unwrap_or(MembershipStatus::Left))
    }
}

#[async_trait]
impl InviteProvider for FakeTelegram {
    async fn create_single_use_link(
        &self,
        _group: &str,
        _expires_at: DateTime<Utc>,
        name: &str,
    ) -> Result<String, ProviderError> {
        let delay = *self.provider_delay.lock();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if self.provider_down.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                code: 400,
                description: "Bad Request: not enough rights to manage chat invite link".into(),
            });
        }
        let n = self.links_created.fetch_add(1, Ordering::SeqCst);
        self.link_names.lock().push(name.to_string());
        Ok(format!("https://t.me/+fake{n}"))
    }
}

#[async_trait]
impl GroupManager for FakeTelegram {
    async fn restrict_member(
        &self,
        chat_id: i64,
        user: UserId,
        until: DateTime<Utc>,
    ) -> Result<(), ProviderError> {
        if self.restrict_down.load(Ordering::SeqCst) {
            return Err(ProviderError::Api {
                code: 400,
                description: "Bad Request: not enough rights to restrict/unrestrict chat member"
                    .into(),
            });
        }
        self.restricted.lock().push((chat_id, user, until));
        Ok(())
    }
}

#[async_trait]
impl CallbackAnswerer for FakeTelegram {
    async fn answer_callback(&self, callback_id: &str) -> Result<(), ProviderError> {
        self.answered_callbacks.lock().push(callback_id.to_string());
        Ok(())
    }
}

#[async_trait]
impl ProfileLookup for FakeTelegram {
    async fn get_display_name(&self, user: UserId) -> Result<Option<String>, ProviderError> {
        Ok(self.names.lock().get(&user).cloned())
    }
}

/// Registry that claims every token is taken.
pub struct CollidingRegistry;

#[async_trait]
impl InviteRegistry for CollidingRegistry {
    async fn create(&self, _record: InviteRecord) -> Result<(), StoreError> {
        Err(StoreError::AlreadyExists)
    }

    async fn mark_used(
        &self,
        _token: &str,
        _user: UserId,
        _now: DateTime<Utc>,
    ) -> Result<Redemption, StoreError> {
        Ok(Redemption::NotFound)
    }

    async fn lookup(&self, _token: &str) -> Result<Option<InviteRecord>, StoreError> {
        Ok(None)
    }

    async fn remove(&self, _token: &str) -> Result<bool, StoreError> {
        Ok(false)
    }

    async fn purge_expired(&self, _before: DateTime<Utc>) -> Result<usize, StoreError> {
        Ok(0)
    }
}

/// Quota store whose backend is down.
pub struct DownQuotaStore;

#[async_trait]
impl QuotaStore for DownQuotaStore {
    async fn count_in_window(&self, _user: UserId, _now: DateTime<Utc>) -> Result<usize, StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }

    async fn record_issuance(&self, _user: UserId, _at: DateTime<Utc>) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("connection refused".into()))
    }
}

/// Quota store that reads fine but fails every write.
pub struct ReadOnlyQuotaStore(pub Arc<MemoryQuotaStore>);

#[async_trait]
impl QuotaStore for ReadOnlyQuotaStore {
    async fn count_in_window(&self, user: UserId, now: DateTime<Utc>) -> Result<usize, StoreError> {
        self.0.count_in_window(user, now).await
    }

    async fn record_issuance(&self, _user: UserId, _at: DateTime<Utc>) -> Result<(), StoreError> {
        Err(StoreError::Unavailable("write rejected".into()))
    }
}

/// An engine on in-memory stores with handles to inspect them.
pub struct Harness {
    pub engine: Arc<Engine>,
    pub stores: Stores,
    pub quota: Arc<MemoryQuotaStore>,
    pub registry: Arc<MemoryInviteRegistry>,
    pub telegram: Arc<FakeTelegram>,
}

impl Harness {
    pub fn new(settings: EngineSettings) -> Self {
        let quota = Arc::new(MemoryQuotaStore::new(chrono::Duration::days(7)));
        let registry = Arc::new(MemoryInviteRegistry::new());
        let telegram = Arc::new(FakeTelegram::default());
        let stores = Stores::from_parts(quota.clone(), registry.clone(), "memory");
        let engine = Arc::new(Engine::new(
            settings,
            &stores,
            Collaborators::from_single(telegram.clone()),
        ));
        Self {
            engine,
            stores,
            quota,
            registry,
            telegram,
        }
    }

    /// Quota count and registry size, for before/after comparisons.
    pub async fn snapshot(&self, user: i64, now: DateTime<Utc>) -> (usize, usize) {
        let count = self.quota.count_in_window(UserId(user), now).await.unwrap();
        (count, self.registry.len())
    }
}

pub const WEBHOOK_SECRET: &str = "s3cret";

pub fn test_config(mode: MembershipMode) -> invite_bot::config::Config {
    invite_bot::config::Config {
        bot_token: "123:test".to_string(),
        group_id: GROUP.to_string(),
        redis_url: None,
        port: 0,
        webhook_url: None,
        webhook_secret: WEBHOOK_SECRET.to_string(),
        admin_username: "@gate_admin".to_string(),
        rules_url: Some("https://example.org/rules".to_string()),
        weekly_invite_limit: 2,
        invite_expire_seconds: 3600,
        mute_seconds: 86_400,
        quota_window_seconds: 7 * 24 * 3600,
        membership_mode: mode,
        provider_timeout_ms: 200,
        registry_grace_seconds: 60,
        sweep_interval_seconds: 300,
    }
}

/// Router wired to a harness built from [`test_config`].
pub fn test_app(mode: MembershipMode) -> (axum::Router, Harness) {
    let config = test_config(mode);
    let harness = Harness::new(config.engine_settings());
    let state = invite_bot::AppState {
        engine: harness.engine.clone(),
        stores: harness.stores.clone(),
        config: Arc::new(config),
        callbacks: harness.telegram.clone(),
    };
    let app = invite_bot::routes::router().with_state(state);
    (app, harness)
}
