use serde::Deserialize;

use crate::engine::Event;
use crate::models::{Person, UserId};

/// Callback data carried by the "Request Invite" button.
pub const REQUEST_INVITE: &str = "request_invite";

/// The subset of a Bot API `Update` the bot reacts to.
#[derive(Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    pub message: Option<Message>,
    pub callback_query: Option<CallbackQuery>,
    pub chat_member: Option<ChatMemberUpdated>,
}

#[derive(Debug, Deserialize)]
pub struct User {
    pub id: i64,
    pub first_name: String,
    pub username: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    pub from: Option<User>,
    pub text: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CallbackQuery {
    pub id: String,
    pub from: User,
    pub data: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct ChatMemberUpdated {
    pub chat: Chat,
    pub old_chat_member: MemberState,
    pub new_chat_member: MemberState,
    pub invite_link: Option<InviteLink>,
}

#[derive(Debug, Deserialize)]
pub struct MemberState {
    pub status: String,
    pub user: User,
    pub is_member: Option<bool>,
}

impl MemberState {
    fn is_in_chat(&self) -> bool {
        match self.status.as_str() {
            "creator" | "administrator" | "member" => true,
            "restricted" => self.is_member.unwrap_or(false),
            _ => false,
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct InviteLink {
    pub invite_link: String,
    pub name: Option<String>,
}

impl From<User> for Person {
    fn from(user: User) -> Self {
        Person {
            id: UserId(user.id),
            first_name: user.first_name,
            username: user.username,
        }
    }
}

/// What an update means for the bot.
#[derive(Debug, PartialEq, Eq)]
pub enum Inbound {
    /// Hand to the engine; replies go to `reply_to`. Button presses carry
    /// the callback id that must be answered.
    Engine {
        event: Event,
        reply_to: i64,
        callback_id: Option<String>,
    },
    /// `/start`: offer the request button.
    Start { chat_id: i64 },
    /// `/health`: liveness ping from a chat.
    Health { chat_id: i64 },
    Ignored,
}

impl Update {
    /// `group_chat` is the managed group's numeric id. When set, joins in
    /// any other chat are ignored.
    pub fn into_inbound(self, group_chat: Option<i64>) -> Inbound {
        if let Some(query) = self.callback_query {
            if query.data.as_deref() == Some(REQUEST_INVITE) {
                let reply_to = query.from.id;
                return Inbound::Engine {
                    event: Event::InviteRequested {
                        user: query.from.into(),
                    },
                    reply_to,
                    callback_id: Some(query.id),
                };
            }
            return Inbound::Ignored;
        }

        if let Some(update) = self.chat_member {
            // Only transitions from outside to inside the chat are joins.
            if update.old_chat_member.is_in_chat() || !update.new_chat_member.is_in_chat() {
                return Inbound::Ignored;
            }
            let chat_id = update.chat.id;
            if group_chat.is_some_and(|group| group != chat_id) {
                return Inbound::Ignored;
            }
            return Inbound::Engine {
                event: Event::MemberJoined {
                    chat_id,
                    user: update.new_chat_member.user.into(),
                    invite_name: update.invite_link.and_then(|l| l.name),
                },
                reply_to: chat_id,
                callback_id: None,
            };
        }

        if let Some(message) = self.message {
            let chat_id = message.chat.id;
            let Some(cmd) = message.text.as_deref().and_then(command) else {
                return Inbound::Ignored;
            };
            return match (cmd, message.from) {
                ("start", _) => Inbound::Start { chat_id },
                ("health", _) => Inbound::Health { chat_id },
                ("invite", Some(from)) => Inbound::Engine {
                    event: Event::InviteRequested { user: from.into() },
                    reply_to: chat_id,
                    callback_id: None,
                },
                _ => Inbound::Ignored,
            };
        }

        Inbound::Ignored
    }
}

/// `/start@my_bot arg` -> `start`.
fn command(text: &str) -> Option<&str> {
    let first = text.split_whitespace().next()?;
    let name = first.strip_prefix('/')?;
    let name = name.split('@').next().unwrap_or(name);
    (!name.is_empty()).then_some(name)
}
