use std::str::FromStr;

use chrono::Duration;

use crate::engine::EngineSettings;
use crate::models::membership::MembershipMode;

/// Invite bot configuration, loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bot API token.
    pub bot_token: String,
    /// Target group: numeric `-100…` id or `@username`.
    pub group_id: String,
    /// Redis connection string. Unset means in-memory stores.
    pub redis_url: Option<String>,
    /// Port the HTTP server binds to.
    pub port: u16,
    /// Public origin of this service; when set the webhook is registered at start-up.
    pub webhook_url: Option<String>,
    /// Path secret for `/webhook/{secret}`.
    pub webhook_secret: String,
    /// Who to contact when something goes wrong.
    pub admin_username: String,
    /// Link to the group rules, shown in join announcements.
    pub rules_url: Option<String>,
    pub weekly_invite_limit: usize,
    pub invite_expire_seconds: i64,
    pub mute_seconds: i64,
    pub quota_window_seconds: i64,
    /// Who may request invites. Deliberately has no default.
    pub membership_mode: MembershipMode,
    /// Upper bound on every Bot API call.
    pub provider_timeout_ms: u64,
    /// How long invite records are kept after they expire.
    pub registry_grace_seconds: i64,
    pub sweep_interval_seconds: u64,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// Panics with a descriptive message if a required variable is missing.
    pub fn from_env() -> Self {
        let membership_mode = required_var("MEMBERSHIP_MODE")
            .parse::<MembershipMode>()
            .unwrap_or_else(|e| panic!("MEMBERSHIP_MODE: {e}"));

        Self {
            bot_token: required_var("BOT_TOKEN"),
            group_id: required_var("GROUP_ID"),
            redis_url: optional_var("REDIS_URL"),
            port: parsed_var("PORT", 8080),
            webhook_url: optional_var("WEBHOOK_URL").map(|u| u.trim_end_matches('/').to_string()),
            webhook_secret: required_var("WEBHOOK_SECRET"),
            admin_username: optional_var("ADMIN_USERNAME").unwrap_or_else(|| "@privep2p".to_string()),
            rules_url: optional_var("RULES_URL"),
            weekly_invite_limit: parsed_var("WEEKLY_INVITE_LIMIT", 2),
            invite_expire_seconds: parsed_var("INVITE_EXPIRE_SECONDS", 3600),
            mute_seconds: parsed_var("MUTE_SECONDS", 86_400),
            quota_window_seconds: parsed_var("QUOTA_WINDOW_SECONDS", 7 * 24 * 3600),
            membership_mode,
            provider_timeout_ms: parsed_var("PROVIDER_TIMEOUT_MS", 10_000),
            registry_grace_seconds: parsed_var("REGISTRY_GRACE_SECONDS", 60),
            sweep_interval_seconds: parsed_var("SWEEP_INTERVAL_SECONDS", 300),
        }
    }

    pub fn engine_settings(&self) -> EngineSettings {
        EngineSettings {
            group_id: self.group_id.clone(),
            weekly_invite_limit: self.weekly_invite_limit,
            invite_expiry: Duration::seconds(self.invite_expire_seconds),
            mute: Duration::seconds(self.mute_seconds),
            membership_mode: self.membership_mode,
            provider_timeout: std::time::Duration::from_millis(self.provider_timeout_ms),
            rules_url: self.rules_url.clone(),
        }
    }

    /// Numeric chat id of the group, if `GROUP_ID` is one (not an `@username`).
    pub fn group_chat_id(&self) -> Option<i64> {
        self.group_id.trim().parse().ok()
    }
}

fn required_var(name: &str) -> String {
    std::env::var(name).unwrap_or_else(|_| panic!("{name} env var is required"))
}

fn optional_var(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn parsed_var<T: FromStr>(name: &str, default: T) -> T {
    parse_or(std::env::var(name).ok().as_deref(), default)
}

fn parse_or<T: FromStr>(raw: Option<&str>, default: T) -> T {
    raw.and_then(|v| v.trim().parse().ok()).unwrap_or(default)
}
