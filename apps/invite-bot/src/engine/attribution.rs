//! Join handling: redeem the token, mute the newcomer, say who brought them.
//!
//! By the time a join reaches us the member is already in the group, so
//! nothing here can fail the join. Every step degrades on its own.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use gatekeeper_common::token;
use tokio::time::timeout;

use super::EngineSettings;
use crate::models::announcement::{Announcement, Referrer, UnknownReason};
use crate::models::invite::Redemption;
use crate::models::{Person, UserId};
use crate::ports::{GroupManager, ProfileLookup};
use crate::store::registry::InviteRegistry;

pub struct AttributionService {
    settings: Arc<EngineSettings>,
    registry: Arc<dyn InviteRegistry>,
    group: Arc<dyn GroupManager>,
    profiles: Arc<dyn ProfileLookup>,
}

impl AttributionService {
    pub fn new(
        settings: Arc<EngineSettings>,
        registry: Arc<dyn InviteRegistry>,
        group: Arc<dyn GroupManager>,
        profiles: Arc<dyn ProfileLookup>,
    ) -> Self {
        Self {
            settings,
            registry,
            group,
            profiles,
        }
    }

    pub async fn on_member_joined(
        &self,
        chat_id: i64,
        member: Person,
        invite_name: Option<&str>,
        now: DateTime<Utc>,
    ) -> Announcement {
        let referrer = match invite_name {
            Some(name) => self.attribute(name, member.id, now).await,
            None => Referrer::unknown(UnknownReason::NoToken),
        };

        let muted_until = now + self.settings.mute;
        let restriction_applied = self.restrict(chat_id, member.id, muted_until).await;

        tracing::info!(
            chat_id,
            user_id = %member.id,
            ?referrer,
            restriction_applied,
            "member joined"
        );

        Announcement {
            chat_id,
            member,
            referrer,
            muted_until,
            mute_seconds: self.settings.mute.num_seconds(),
            restriction_applied,
            rules_url: self.settings.rules_url.clone(),
        }
    }

    async fn attribute(&self, name: &str, user: UserId, now: DateTime<Utc>) -> Referrer {
        let record = match self.registry.mark_used(name, user, now).await {
            Ok(Redemption::Redeemed(record)) => record,
            Ok(Redemption::AlreadyUsed(record)) => {
                tracing::warn!(
                    token = name,
                    user_id = %user,
                    first_user = ?record.used_by,
                    "second join on a single-use invite"
                );
                return Referrer::unknown(UnknownReason::AlreadyUsed);
            }
            Ok(Redemption::Expired(record)) => {
                tracing::warn!(
                    token = name,
                    user_id = %user,
                    expires_at = %record.expires_at,
                    "join through an expired invite"
                );
                return Referrer::unknown(UnknownReason::Expired);
            }
            Ok(Redemption::NotFound) => {
                tracing::debug!(token = name, "invite not tracked by this bot");
                return Referrer::unknown(UnknownReason::NotTracked);
            }
            Err(err) => {
                tracing::warn!(token = name, ?err, "invite registry unavailable during join");
                return Referrer::unknown(UnknownReason::RegistryUnavailable);
            }
        };

        let Some(id) = record
            .referrer
            .or_else(|| token::decode(&record.token).map(UserId))
        else {
            return Referrer::unknown(UnknownReason::NotTracked);
        };

        Referrer::Known {
            id,
            display_name: self.display_name(id).await,
        }
    }

    async fn display_name(&self, id: UserId) -> Option<String> {
        match timeout(self.settings.provider_timeout, self.profiles.get_display_name(id)).await {
            Ok(Ok(name)) => name,
            Ok(Err(err)) => {
                tracing::debug!(user_id = %id, ?err, "profile lookup failed");
                None
            }
            Err(_) => {
                tracing::debug!(user_id = %id, "profile lookup timed out");
                None
            }
        }
    }

    async fn restrict(&self, chat_id: i64, user: UserId, until: DateTime<Utc>) -> bool {
        match timeout(
            self.settings.provider_timeout,
            self.group.restrict_member(chat_id, user, until),
        )
        .await
        {
            Ok(Ok(())) => true,
            Ok(Err(err)) => {
                tracing::warn!(chat_id, user_id = %user, ?err, "could not restrict new member");
                false
            }
            Err(_) => {
                tracing::warn!(chat_id, user_id = %user, "restrict request timed out");
                false
            }
        }
    }
}
