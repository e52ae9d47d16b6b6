//! Telegram webhook delivery.
//!
//! Replies ride back in the response body as a Bot API method call, so a
//! handled update costs no extra request. Button presses are answered
//! separately first. Engine failures still answer 200; a non-2xx would make
//! Telegram redeliver the same update.

use std::time::Duration;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::post;
use axum::{Json, Router};
use chrono::Utc;
use serde_json::{json, Value};
use tokio::time::timeout;

use crate::config::Config;
use crate::engine::issuance::{Denial, IssueOutcome};
use crate::engine::Outcome;
use crate::error::ApiError;
use crate::models::announcement::{Announcement, Referrer};
use crate::models::membership::MembershipMode;
use crate::telegram::update::{Inbound, Update, REQUEST_INVITE};
use crate::AppState;

pub fn router() -> Router<AppState> {
    Router::new().route("/webhook/{secret}", post(webhook))
}

async fn webhook(
    State(state): State<AppState>,
    Path(secret): Path<String>,
    Json(update): Json<Update>,
) -> Result<Response, ApiError> {
    if secret != state.config.webhook_secret {
        return Err(ApiError::not_found("Not found"));
    }

    let update_id = update.update_id;
    let reply = match update.into_inbound(state.config.group_chat_id()) {
        Inbound::Ignored => {
            tracing::debug!(update_id, "update ignored");
            return Ok(StatusCode::OK.into_response());
        }
        Inbound::Health { chat_id } => send_message(chat_id, "Bot is alive.", None),
        Inbound::Start { chat_id } => start_reply(&state.config, chat_id),
        Inbound::Engine {
            event,
            reply_to,
            callback_id,
        } => {
            if let Some(id) = callback_id {
                answer_callback(&state, &id).await;
            }
            let outcome = state.engine.handle(event, Utc::now()).await;
            let summary = serde_json::to_string(&outcome.summary()).unwrap_or_default();
            tracing::debug!(update_id, %summary, "update handled");
            render(&state.config, reply_to, &outcome)
        }
    };

    Ok(Json(reply).into_response())
}

/// Stop the button spinner. The link itself goes out in the response body.
async fn answer_callback(state: &AppState, callback_id: &str) {
    let limit = Duration::from_millis(state.config.provider_timeout_ms);
    match timeout(limit, state.callbacks.answer_callback(callback_id)).await {
        Ok(Ok(())) => {}
        Ok(Err(err)) => tracing::warn!(callback_id, ?err, "failed answering callback query"),
        Err(_) => tracing::warn!(callback_id, "answering callback query timed out"),
    }
}

fn send_message(chat_id: i64, text: &str, reply_markup: Option<Value>) -> Value {
    let mut body = json!({
        "method": "sendMessage",
        "chat_id": chat_id,
        "text": text,
    });
    if let Some(markup) = reply_markup {
        body["reply_markup"] = markup;
    }
    body
}

fn start_reply(config: &Config, chat_id: i64) -> Value {
    let audience = match config.membership_mode {
        MembershipMode::RequireMember => "Members can invite one friend at a time.",
        MembershipMode::RequireNonMember => "You can request a way into the group.",
    };
    let text = format!(
        "{audience}\nContact admin {} if urgent.\n\n\
         Tap below to get a one-time invite link (single use, {} minute expiry).",
        config.admin_username,
        config.invite_expire_seconds / 60,
    );
    let keyboard = json!({
        "inline_keyboard": [[{ "text": "Request Invite", "callback_data": REQUEST_INVITE }]]
    });
    send_message(chat_id, &text, Some(keyboard))
}

fn render(config: &Config, chat_id: i64, outcome: &Outcome) -> Value {
    match outcome {
        Outcome::Invite(Ok(IssueOutcome::Issued {
            link, remaining, ..
        })) => {
            let text = format!(
                "Here's your invite link. It works once and expires in {} minutes.\n\
                 Invites left this week: {remaining}.",
                config.invite_expire_seconds / 60,
            );
            let keyboard = json!({
                "inline_keyboard": [[{ "text": "Join Group", "url": link }]]
            });
            send_message(chat_id, &text, Some(keyboard))
        }
        Outcome::Invite(Ok(IssueOutcome::Denied(Denial::QuotaExceeded { .. }))) => {
            let text = format!(
                "Limit reached: you already took {} invites this week.\n\
                 Try next week, or contact admin {}.",
                config.weekly_invite_limit, config.admin_username,
            );
            send_message(chat_id, &text, None)
        }
        Outcome::Invite(Ok(IssueOutcome::Denied(Denial::MembershipPrecondition { .. }))) => {
            let text = match config.membership_mode {
                MembershipMode::RequireMember => "Only group members can request invites.",
                MembershipMode::RequireNonMember => "You're already a member of the group.",
            };
            send_message(chat_id, text, None)
        }
        Outcome::Invite(Err(err)) if err.is_retryable() => {
            let text = format!(
                "Sorry, couldn't create an invite link right now ({err}).\n\
                 Try again later or contact admin {}.",
                config.admin_username,
            );
            send_message(chat_id, &text, None)
        }
        Outcome::Invite(Err(_)) => {
            let text = format!(
                "Something went wrong. Please contact admin {}.",
                config.admin_username
            );
            send_message(chat_id, &text, None)
        }
        Outcome::Joined(announcement) => send_message(chat_id, &welcome_text(announcement), None),
    }
}

fn welcome_text(a: &Announcement) -> String {
    let referrer = match &a.referrer {
        Referrer::Known {
            display_name: Some(name),
            ..
        } => name.clone(),
        Referrer::Known { id, .. } => format!("user {id}"),
        Referrer::Unknown { .. } => "unknown".to_string(),
    };

    let mut text = format!("Welcome {}! Invited by: {referrer}.", a.member.first_name);
    if a.restriction_applied {
        let hours = (a.mute_seconds + 3599) / 3600;
        text.push_str(&format!(
            "\nYou can read along now and post in {hours}h."
        ));
    }
    if let Some(rules) = &a.rules_url {
        text.push_str(&format!("\nPlease read the rules: {rules}"));
    }
    text
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::announcement::UnknownReason;
    use crate::models::{Person, UserId};

    fn announcement(referrer: Referrer, restriction_applied: bool) -> Announcement {
        Announcement {
            chat_id: -1,
            member: Person {
                id: UserId(7),
                first_name: "Ravi".into(),
                username: None,
            },
            referrer,
            muted_until: Utc::now(),
            mute_seconds: 86_400,
            restriction_applied,
            rules_url: Some("https://example.org/rules".into()),
        }
    }

    #[test]
    fn welcome_names_referrer() {
        let text = welcome_text(&announcement(
            Referrer::Known {
                id: UserId(42),
                display_name: Some("@asha".into()),
            },
            true,
        ));
        assert!(text.contains("Invited by: @asha."));
        assert!(text.contains("post in 24h"));
        assert!(text.contains("https://example.org/rules"));
    }

    #[test]
    fn welcome_falls_back_to_unknown() {
        let text = welcome_text(&announcement(
            Referrer::unknown(UnknownReason::Expired),
            false,
        ));
        assert!(text.contains("Invited by: unknown."));
        assert!(!text.contains("post in"));
    }
}
