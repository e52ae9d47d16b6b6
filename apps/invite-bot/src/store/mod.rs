pub mod quota;
pub mod redis_backend;
pub mod registry;

use std::sync::Arc;

use chrono::Duration;

use crate::config::Config;
use crate::error::StoreError;
use quota::{MemoryQuotaStore, QuotaStore};
use registry::{InviteRegistry, MemoryInviteRegistry};

/// The engine's two pieces of shared state, opened once at start-up.
#[derive(Clone)]
pub struct Stores {
    pub quota: Arc<dyn QuotaStore>,
    pub registry: Arc<dyn InviteRegistry>,
    backend: &'static str,
}

impl Stores {
    /// Redis when `REDIS_URL` is configured, in-memory otherwise.
    pub async fn open(config: &Config) -> Result<Self, StoreError> {
        let window = Duration::seconds(config.quota_window_seconds);
        let grace = Duration::seconds(config.registry_grace_seconds);

        let Some(url) = config.redis_url.as_deref() else {
            tracing::warn!("REDIS_URL not set, quota and invites are kept in memory only");
            return Ok(Self::memory(window));
        };

        let conn = redis_backend::connect(url).await?;
        Ok(Self::from_parts(
            Arc::new(redis_backend::RedisQuotaStore::new(conn.clone(), window)),
            Arc::new(redis_backend::RedisInviteRegistry::new(conn, grace)),
            "redis",
        ))
    }

    pub fn memory(window: Duration) -> Self {
        Self::from_parts(
            Arc::new(MemoryQuotaStore::new(window)),
            Arc::new(MemoryInviteRegistry::new()),
            "memory",
        )
    }

    pub fn from_parts(
        quota: Arc<dyn QuotaStore>,
        registry: Arc<dyn InviteRegistry>,
        backend: &'static str,
    ) -> Self {
        Self {
            quota,
            registry,
            backend,
        }
    }

    pub fn backend(&self) -> &'static str {
        self.backend
    }

    /// Drop this handle to the backends. Connections close once the last
    /// clone is gone, so drop the engine and router before calling this.
    pub fn close(self) {
        let others = Arc::strong_count(&self.quota).saturating_sub(1)
            + Arc::strong_count(&self.registry).saturating_sub(1);
        if others > 0 {
            tracing::warn!(backend = self.backend, others, "closing stores while still shared");
        } else {
            tracing::info!(backend = self.backend, "closing stores");
        }
    }
}
