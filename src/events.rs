//! Zdarzenia wejściowe rdzenia – płaskie kopie danych z gatewaya.
//! Handler serenity (`discord/mod.rs`) mapuje na nie typy serenity, dzięki czemu
//! silnik i workflow nie zależą od modelu Discorda.

use chrono::{DateTime, Utc};

use crate::config::TemplateKind;

#[derive(Debug, Clone)]
pub struct MessageCreated {
    pub guild_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
    pub author_id: u64,
    pub author_display_name: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct MemberJoined {
    pub guild_id: u64,
    pub user_id: u64,
    pub display_name: String,
    pub account_created_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct ReactionAdded {
    pub guild_id: u64,
    pub channel_id: u64,
    pub message_id: u64,
    pub user_id: u64,
    pub emoji: String,
}

#[derive(Debug, Clone)]
pub struct ChannelDeleted {
    pub guild_id: u64,
    pub channel_id: u64,
    pub name: String,
    /// None = typ, którego nie odtwarzamy (kategoria, wątek, stage …).
    pub kind: Option<TemplateKind>,
    pub parent_id: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct MessageDeleted {
    pub channel_id: u64,
    pub message_id: u64,
}
