//! Quota check and invite minting.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gatekeeper_common::token;
use serde::Serialize;
use tokio::time::timeout;

use super::locks::KeyedLocks;
use super::EngineSettings;
use crate::error::{IssueError, ProviderError, StoreError};
use crate::models::invite::InviteRecord;
use crate::models::membership::MembershipStatus;
use crate::models::UserId;
use crate::ports::{InviteProvider, MembershipGate};
use crate::store::quota::QuotaStore;
use crate::store::registry::InviteRegistry;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "snake_case")]
pub enum IssueOutcome {
    Issued {
        link: String,
        token: String,
        expires_at: DateTime<Utc>,
        remaining: usize,
    },
    Denied(Denial),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "reason", rename_all = "kebab-case")]
pub enum Denial {
    MembershipPrecondition { status: MembershipStatus },
    QuotaExceeded { remaining: usize },
}

pub struct IssuanceService {
    settings: Arc<EngineSettings>,
    quota: Arc<dyn QuotaStore>,
    registry: Arc<dyn InviteRegistry>,
    gate: Arc<dyn MembershipGate>,
    provider: Arc<dyn InviteProvider>,
    locks: KeyedLocks<UserId>,
}

impl IssuanceService {
    pub fn new(
        settings: Arc<EngineSettings>,
        quota: Arc<dyn QuotaStore>,
        registry: Arc<dyn InviteRegistry>,
        gate: Arc<dyn MembershipGate>,
        provider: Arc<dyn InviteProvider>,
    ) -> Self {
        Self {
            settings,
            quota,
            registry,
            gate,
            provider,
            locks: KeyedLocks::new(),
        }
    }

    /// Decide whether `requester` may have a new invite and mint it.
    ///
    /// The provider is called before anything is written, so a failed or
    /// cancelled request never charges quota or leaves a registry entry.
    /// A quota write failure removes the registry entry again.
    pub async fn request_invite(
        &self,
        requester: UserId,
        now: DateTime<Utc>,
    ) -> Result<IssueOutcome, IssueError> {
        let settings = &self.settings;

        let status = timeout(
            settings.provider_timeout,
            self.gate
                .get_membership_status(&settings.group_id, requester),
        )
        .await
        .unwrap_or(Err(ProviderError::Timeout))
        .map_err(|err| {
            tracing::warn!(user_id = %requester, ?err, "membership check failed");
            IssueError::MembershipUnavailable(err)
        })?;

        if !settings.membership_mode.admits(status) {
            tracing::info!(user_id = %requester, ?status, mode = ?settings.membership_mode, "invite denied by membership precondition");
            return Ok(IssueOutcome::Denied(Denial::MembershipPrecondition { status }));
        }

        // Count, mint, and record as one unit per requester.
        let _guard = self.locks.lock(requester).await;

        let count = self
            .quota
            .count_in_window(requester, now)
            .await
            .map_err(IssueError::TransientStore)?;
        if count >= settings.weekly_invite_limit {
            tracing::info!(user_id = %requester, count, "invite denied, quota exhausted");
            return Ok(IssueOutcome::Denied(Denial::QuotaExceeded { remaining: 0 }));
        }

        let expires_at = now + settings.invite_expiry;
        let token = token::encode(requester.0);

        let link = match timeout(
            settings.provider_timeout,
            self.provider
                .create_single_use_link(&settings.group_id, expires_at, &token),
        )
        .await
        {
            Ok(Ok(link)) => link,
            Ok(Err(err)) => {
                tracing::error!(user_id = %requester, ?err, "failed creating invite link");
                return Err(IssueError::Provider(err));
            }
            Err(_) => {
                tracing::error!(user_id = %requester, "invite provider timed out");
                return Err(IssueError::ProviderTimeout);
            }
        };

        let record = InviteRecord::new(token.clone(), Some(requester), now, expires_at);
        self.registry.create(record).await.map_err(|err| match err {
            StoreError::AlreadyExists => {
                tracing::error!(%token, "freshly minted invite token already registered");
                IssueError::TokenCollision(token.clone())
            }
            other => IssueError::TransientStore(other),
        })?;

        if let Err(err) = self.quota.record_issuance(requester, now).await {
            // Roll back the registry write so the aborted request leaves nothing behind.
            if let Err(undo) = self.registry.remove(&token).await {
                tracing::error!(%token, ?undo, "failed removing invite after quota write failed");
            }
            tracing::error!(user_id = %requester, ?err, "failed recording issuance");
            return Err(IssueError::TransientStore(err));
        }

        let remaining = settings.weekly_invite_limit - count - 1;
        tracing::info!(user_id = %requester, %token, remaining, "invite issued");

        Ok(IssueOutcome::Issued {
            link,
            token,
            expires_at,
            remaining,
        })
    }

    /// Drop per-user locks nobody is waiting on.
    pub fn sweep_locks(&self) -> usize {
        self.locks.sweep()
    }
}
