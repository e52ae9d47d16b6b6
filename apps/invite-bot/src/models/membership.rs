use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A user's relationship to the group, as reported by the membership gate.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipStatus {
    Member,
    Admin,
    Creator,
    Left,
    Kicked,
    Unknown,
}

impl MembershipStatus {
    pub fn is_member(self) -> bool {
        matches!(self, Self::Member | Self::Admin | Self::Creator)
    }

    pub fn is_non_member(self) -> bool {
        matches!(self, Self::Left | Self::Kicked)
    }
}

/// Who may ask for an invite.
///
/// `RequireMember` is the referral model: only people already in the group can
/// hand out links. `RequireNonMember` is self-service: outsiders request a way in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MembershipMode {
    RequireMember,
    RequireNonMember,
}

impl MembershipMode {
    /// `Unknown` never satisfies either mode.
    pub fn admits(self, status: MembershipStatus) -> bool {
        match self {
            Self::RequireMember => status.is_member(),
            Self::RequireNonMember => status.is_non_member(),
        }
    }
}

impl FromStr for MembershipMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "require_member" => Ok(Self::RequireMember),
            "require_non_member" => Ok(Self::RequireNonMember),
            other => Err(format!(
                "unknown membership mode {other:?} (expected require_member or require_non_member)"
            )),
        }
    }
}
