use chrono::{DateTime, Utc};
use serde::Serialize;

use super::{Person, UserId};

/// Why a join couldn't be attributed to anyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UnknownReason {
    /// Joined without an invite link (public link, added by an admin).
    NoToken,
    /// Link we never minted.
    NotTracked,
    /// Link whose expiry had passed when the join arrived.
    Expired,
    /// Second join on a single-use link.
    AlreadyUsed,
    /// The registry couldn't be reached.
    RegistryUnavailable,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Referrer {
    Known {
        id: UserId,
        display_name: Option<String>,
    },
    Unknown {
        reason: UnknownReason,
    },
}

impl Referrer {
    pub fn unknown(reason: UnknownReason) -> Self {
        Self::Unknown { reason }
    }
}

/// What the messaging side renders after someone joins.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Announcement {
    pub chat_id: i64,
    pub member: Person,
    pub referrer: Referrer,
    pub muted_until: DateTime<Utc>,
    pub mute_seconds: i64,
    /// False when the group refused the restriction (bot lacks rights).
    pub restriction_applied: bool,
    pub rules_url: Option<String>,
}
