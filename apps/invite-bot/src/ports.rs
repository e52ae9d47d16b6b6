//! External collaborators the engine talks to.
//!
//! The Bot API client in [`crate::telegram`] implements all of them; tests
//! substitute scripted fakes.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::error::ProviderError;
use crate::models::membership::MembershipStatus;
use crate::models::UserId;

#[async_trait]
pub trait MembershipGate: Send + Sync {
    /// A reachable API that says "not a member" is `Ok(Left)`; an unreachable
    /// API is an `Err`. The two are never conflated.
    async fn get_membership_status(
        &self,
        group: &str,
        user: UserId,
    ) -> Result<MembershipStatus, ProviderError>;
}

#[async_trait]
pub trait InviteProvider: Send + Sync {
    /// Create a link that admits one member and stops working at `expires_at`.
    async fn create_single_use_link(
        &self,
        group: &str,
        expires_at: DateTime<Utc>,
        name: &str,
    ) -> Result<String, ProviderError>;
}

#[async_trait]
pub trait GroupManager: Send + Sync {
    /// Take away posting rights until `until`.
    async fn restrict_member(
        &self,
        chat_id: i64,
        user: UserId,
        until: DateTime<Utc>,
    ) -> Result<(), ProviderError>;
}

#[async_trait]
pub trait ProfileLookup: Send + Sync {
    async fn get_display_name(&self, user: UserId) -> Result<Option<String>, ProviderError>;
}

#[async_trait]
pub trait CallbackAnswerer: Send + Sync {
    /// Acknowledge a button press so the client stops showing progress.
    async fn answer_callback(&self, callback_id: &str) -> Result<(), ProviderError>;
}

/// Everything outside the engine, bundled for construction.
#[derive(Clone)]
pub struct Collaborators {
    pub gate: Arc<dyn MembershipGate>,
    pub provider: Arc<dyn InviteProvider>,
    pub group: Arc<dyn GroupManager>,
    pub profiles: Arc<dyn ProfileLookup>,
}

impl Collaborators {
    /// One object (usually the Bot API client) playing every role.
    pub fn from_single<T>(client: Arc<T>) -> Self
    where
        T: MembershipGate + InviteProvider + GroupManager + ProfileLookup + 'static,
    {
        Self {
            gate: client.clone(),
            provider: client.clone(),
            group: client.clone(),
            profiles: client,
        }
    }
}
