//! Referral token codec.
//!
//! An invite link's name doubles as the registry key and as the carrier of
//! the referring user's identity. Names look like `ref:<referrer_id>:<salt>`,
//! where the salt is random alphanumeric so that two links minted for the
//! same referrer never share a name.
//!
//! Anything that doesn't follow the scheme (links made by hand in the group
//! settings, legacy names) decodes to `None` instead of failing.

use std::fmt;

use rand::distributions::{Alphanumeric, DistString};

/// Tag in front of every name this codec produces.
pub const TAG: &str = "ref";

/// Alphanumeric characters in the salt, about 53 bits of randomness.
///
/// `ref:` plus a 16-digit user id plus this salt stays within Telegram's
/// 32-character invite link name limit.
pub const SALT_LEN: usize = 9;

/// A decoded referral token.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct ReferralToken {
    pub referrer_id: i64,
    pub salt: String,
}

impl ReferralToken {
    /// Mint a fresh token for `referrer_id` with a random salt.
    pub fn mint(referrer_id: i64) -> Self {
        Self {
            referrer_id,
            salt: Alphanumeric.sample_string(&mut rand::thread_rng(), SALT_LEN),
        }
    }

    /// Parse a link name. Returns `None` for names this codec didn't produce.
    pub fn parse(name: &str) -> Option<Self> {
        let mut parts = name.splitn(3, ':');
        if parts.next()? != TAG {
            return None;
        }
        let id = parts.next()?;
        let salt = parts.next()?;

        let digits = id.strip_prefix('-').unwrap_or(id);
        if digits.is_empty() || !digits.bytes().all(|b| b.is_ascii_digit()) {
            return None;
        }
        if salt.is_empty() || !salt.bytes().all(|b| b.is_ascii_alphanumeric()) {
            return None;
        }

        Some(Self {
            referrer_id: id.parse().ok()?,
            salt: salt.to_string(),
        })
    }
}

impl fmt::Display for ReferralToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{TAG}:{}:{}", self.referrer_id, self.salt)
    }
}

/// Encode `referrer_id` into a new, unique link name.
pub fn encode(referrer_id: i64) -> String {
    ReferralToken::mint(referrer_id).to_string()
}

/// Recover the referrer from a link name, if it is one of ours.
pub fn decode(name: &str) -> Option<i64> {
    ReferralToken::parse(name).map(|t| t.referrer_id)
}
