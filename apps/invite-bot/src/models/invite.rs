use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::UserId;

/// Every invite link this engine minted.
///
/// `used_by` is written once, by the first join that redeems the token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InviteRecord {
    pub token: String,
    pub referrer: Option<UserId>,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
    pub member_limit: u32,
    pub used_by: Option<UserId>,
}

impl InviteRecord {
    pub fn new(
        token: String,
        referrer: Option<UserId>,
        created_at: DateTime<Utc>,
        expires_at: DateTime<Utc>,
    ) -> Self {
        Self {
            token,
            referrer,
            created_at,
            expires_at,
            member_limit: 1,
            used_by: None,
        }
    }

    pub fn is_used(&self) -> bool {
        self.used_by.is_some()
    }

    /// Expiry is derived at read time; it is never stored as a state.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        now > self.expires_at
    }

    pub fn status(&self, now: DateTime<Utc>) -> InviteStatus {
        if self.is_used() {
            InviteStatus::Used
        } else if self.is_expired(now) {
            InviteStatus::Expired
        } else {
            InviteStatus::Unused
        }
    }
}

/// Lifecycle of a token: `Unused -> Used` or `Unused -> Expired`, both terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum InviteStatus {
    Unused,
    Used,
    Expired,
}

/// Result of trying to redeem a token on join.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Redemption {
    /// This call won; the returned record has `used_by` set.
    Redeemed(InviteRecord),
    NotFound,
    AlreadyUsed(InviteRecord),
    Expired(InviteRecord),
}
