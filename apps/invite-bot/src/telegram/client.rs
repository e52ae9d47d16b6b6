//! Minimal Bot API client.

use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::ProviderError;
use crate::models::membership::MembershipStatus;
use crate::models::UserId;
use crate::ports::{
    CallbackAnswerer, GroupManager, InviteProvider, MembershipGate, ProfileLookup,
};

const DEFAULT_API_URL: &str = "https://api.telegram.org";

/// Envelope every Bot API method answers with.
#[derive(Debug, Deserialize)]
struct ApiResponse<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
    error_code: Option<i64>,
}

#[derive(Debug, Deserialize)]
struct ChatMember {
    status: String,
    #[serde(default)]
    is_member: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct ChatInviteLink {
    invite_link: String,
}

#[derive(Debug, Deserialize)]
struct Chat {
    first_name: Option<String>,
    last_name: Option<String>,
    username: Option<String>,
}

#[derive(Clone)]
pub struct BotApi {
    base: String,
    http: reqwest::Client,
}

impl BotApi {
    pub fn new(token: &str, timeout: Duration) -> Result<Self, ProviderError> {
        Self::with_api_url(DEFAULT_API_URL, token, timeout)
    }

    /// Point at a different server (local Bot API server, tests).
    pub fn with_api_url(api_url: &str, token: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base: format!("{}/bot{}", api_url.trim_end_matches('/'), token),
            http,
        })
    }

    async fn call<T: DeserializeOwned>(&self, method: &str, body: Value) -> Result<T, ProviderError> {
        let url = format!("{}/{}", self.base, method);
        let resp: ApiResponse<T> = self.http.post(&url).json(&body).send().await?.json().await?;

        match resp {
            ApiResponse {
                ok: true,
                result: Some(result),
                ..
            } => Ok(result),
            ApiResponse {
                error_code,
                description,
                ..
            } => Err(ProviderError::Api {
                code: error_code.unwrap_or_default(),
                description: description.unwrap_or_else(|| format!("{method} failed")),
            }),
        }
    }

    /// Register `url` as the webhook, subscribing to the updates the bot handles.
    pub async fn set_webhook(&self, url: &str) -> Result<(), ProviderError> {
        let _: bool = self
            .call(
                "setWebhook",
                json!({
                    "url": url,
                    "allowed_updates": ["message", "callback_query", "chat_member"],
                }),
            )
            .await?;
        tracing::info!("webhook registered");
        Ok(())
    }
}

fn membership_from(member: &ChatMember) -> MembershipStatus {
    match member.status.as_str() {
        "creator" => MembershipStatus::Creator,
        "administrator" => MembershipStatus::Admin,
        "member" => MembershipStatus::Member,
        // Restricted users may or may not still be in the chat.
        "restricted" if member.is_member.unwrap_or(false) => MembershipStatus::Member,
        "restricted" | "left" => MembershipStatus::Left,
        "kicked" => MembershipStatus::Kicked,
        _ => MembershipStatus::Unknown,
    }
}

fn display_name_from(chat: Chat) -> Option<String> {
    if let Some(username) = chat.username {
        return Some(format!("@{username}"));
    }
    match (chat.first_name, chat.last_name) {
        (Some(first), Some(last)) => Some(format!("{first} {last}")),
        (Some(first), None) => Some(first),
        (None, Some(last)) => Some(last),
        (None, None) => None,
    }
}

#[async_trait]
impl MembershipGate for BotApi {
    async fn get_membership_status(
        &self,
        group: &str,
        user: UserId,
    ) -> Result<MembershipStatus, ProviderError> {
        let member: ChatMember = self
            .call("getChatMember", json!({ "chat_id": group, "user_id": user.0 }))
            .await?;
        Ok(membership_from(&member))
    }
}

#[async_trait]
impl InviteProvider for BotApi {
    async fn create_single_use_link(
        &self,
        group: &str,
        expires_at: DateTime<Utc>,
        name: &str,
    ) -> Result<String, ProviderError> {
        let link: ChatInviteLink = self
            .call(
                "createChatInviteLink",
                json!({
                    "chat_id": group,
                    "name": name,
                    "expire_date": expires_at.timestamp(),
                    "member_limit": 1,
                }),
            )
            .await?;
        Ok(link.invite_link)
    }
}

#[async_trait]
impl GroupManager for BotApi {
    async fn restrict_member(
        &self,
        chat_id: i64,
        user: UserId,
        until: DateTime<Utc>,
    ) -> Result<(), ProviderError> {
        let _: bool = self
            .call(
                "restrictChatMember",
                json!({
                    "chat_id": chat_id,
                    "user_id": user.0,
                    "until_date": until.timestamp(),
                    "use_independent_chat_permissions": true,
                    "permissions": {
                        "can_send_messages": false,
                        "can_send_audios": false,
                        "can_send_documents": false,
                        "can_send_photos": false,
                        "can_send_videos": false,
                        "can_send_video_notes": false,
                        "can_send_voice_notes": false,
                        "can_send_polls": false,
                        "can_send_other_messages": false,
                        "can_add_web_page_previews": false,
                    },
                }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl CallbackAnswerer for BotApi {
    async fn answer_callback(&self, callback_id: &str) -> Result<(), ProviderError> {
        let _: bool = self
            .call(
                "answerCallbackQuery",
                json!({ "callback_query_id": callback_id }),
            )
            .await?;
        Ok(())
    }
}

#[async_trait]
impl ProfileLookup for BotApi {
    async fn get_display_name(&self, user: UserId) -> Result<Option<String>, ProviderError> {
        let chat: Chat = self.call("getChat", json!({ "chat_id": user.0 })).await?;
        Ok(display_name_from(chat))
    }
}
