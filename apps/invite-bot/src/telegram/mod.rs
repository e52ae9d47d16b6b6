//! Bot API glue: an HTTP client implementing the collaborator ports and the
//! mapping from webhook updates to engine events.

pub mod client;
pub mod update;

pub use client::BotApi;
