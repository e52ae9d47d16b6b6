//! The invite quota and referral attribution engine.

pub mod attribution;
pub mod issuance;
pub mod locks;

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use serde::Serialize;

use crate::error::IssueError;
use crate::models::announcement::Announcement;
use crate::models::membership::MembershipMode;
use crate::models::Person;
use crate::ports::Collaborators;
use crate::store::Stores;
use attribution::AttributionService;
use issuance::{IssuanceService, IssueOutcome};

/// Knobs the engine needs. Built from [`crate::config::Config`].
#[derive(Debug, Clone)]
pub struct EngineSettings {
    pub group_id: String,
    pub weekly_invite_limit: usize,
    pub invite_expiry: Duration,
    pub mute: Duration,
    pub membership_mode: MembershipMode,
    pub provider_timeout: std::time::Duration,
    pub rules_url: Option<String>,
}

impl EngineSettings {
    pub fn new(group_id: impl Into<String>, membership_mode: MembershipMode) -> Self {
        Self {
            group_id: group_id.into(),
            weekly_invite_limit: 2,
            invite_expiry: Duration::seconds(3600),
            mute: Duration::seconds(86_400),
            membership_mode,
            provider_timeout: std::time::Duration::from_secs(10),
            rules_url: None,
        }
    }
}

/// Inbound events the engine understands.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Event {
    InviteRequested {
        user: Person,
    },
    MemberJoined {
        chat_id: i64,
        user: Person,
        invite_name: Option<String>,
    },
}

#[derive(Debug)]
pub enum Outcome {
    Invite(Result<IssueOutcome, IssueError>),
    Joined(Announcement),
}

impl Outcome {
    /// Serializable view for structured logs.
    pub fn summary(&self) -> OutcomeSummary<'_> {
        match self {
            Self::Invite(Ok(outcome)) => OutcomeSummary::Invite { outcome },
            Self::Invite(Err(err)) => OutcomeSummary::Failed {
                error: err.to_string(),
                retryable: err.is_retryable(),
            },
            Self::Joined(announcement) => OutcomeSummary::Joined { announcement },
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum OutcomeSummary<'a> {
    Invite { outcome: &'a IssueOutcome },
    Failed { error: String, retryable: bool },
    Joined { announcement: &'a Announcement },
}

pub struct Engine {
    pub issuance: IssuanceService,
    pub attribution: AttributionService,
}

impl Engine {
    pub fn new(settings: EngineSettings, stores: &Stores, collaborators: Collaborators) -> Self {
        let settings = Arc::new(settings);
        Self {
            issuance: IssuanceService::new(
                settings.clone(),
                stores.quota.clone(),
                stores.registry.clone(),
                collaborators.gate,
                collaborators.provider,
            ),
            attribution: AttributionService::new(
                settings,
                stores.registry.clone(),
                collaborators.group,
                collaborators.profiles,
            ),
        }
    }

    pub async fn handle(&self, event: Event, now: DateTime<Utc>) -> Outcome {
        match event {
            Event::InviteRequested { user } => {
                Outcome::Invite(self.issuance.request_invite(user.id, now).await)
            }
            Event::MemberJoined {
                chat_id,
                user,
                invite_name,
            } => Outcome::Joined(
                self.attribution
                    .on_member_joined(chat_id, user, invite_name.as_deref(), now)
                    .await,
            ),
        }
    }
}
