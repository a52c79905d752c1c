// src/discord/mod.rs
use std::future::Future;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;

use anyhow::Result;
use chrono::{DateTime, Utc};
use futures_util::FutureExt;
use serenity::all::*;
use serenity::async_trait;

use crate::AppContext;
use crate::commands::Commands;
use crate::config::TemplateKind;
use crate::events::{ChannelDeleted, MemberJoined, MessageCreated, MessageDeleted, ReactionAdded};

pub struct Handler {
    pub app: Arc<AppContext>,
}

impl Handler {
    /// 0 w konfiguracji = obsługuj każdą gildię.
    fn our_guild(&self, gid: GuildId) -> bool {
        let want = self.app.settings.discord.guild_id;
        want == 0 || want == gid.get()
    }
}

/// Panika w handlerze nie może położyć pętli zdarzeń.
async fn guarded<F: Future<Output = ()>>(event: &'static str, fut: F) {
    if AssertUnwindSafe(fut).catch_unwind().await.is_err() {
        tracing::error!(event, "handler panicked");
    }
}

#[async_trait]
impl EventHandler for Handler {
    async fn ready(&self, ctx: Context, ready: Ready) {
        tracing::info!("Logged in as {}", ready.user.name);

        // Rejestr komend slash dla obsługiwanych gildii
        for g in ready.guilds.iter().filter(|g| self.our_guild(g.id)) {
            if let Err(e) = Commands::register_commands(&ctx, g.id).await {
                tracing::warn!(error=?e, gid=%g.id.get(), "register commands failed");
            }
        }

        // READY przychodzi też po reconnectach – pętle startują raz
        self.app.start_background();
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        guarded("interaction", Commands::on_interaction(&ctx, &self.app, interaction)).await;
    }

    async fn message(&self, _ctx: Context, msg: Message) {
        let Some(gid) = msg.guild_id else {
            return;
        };
        if msg.author.bot || !self.our_guild(gid) {
            return;
        }

        let display_name = msg
            .member
            .as_ref()
            .and_then(|m| m.nick.clone())
            .or_else(|| msg.author.global_name.clone())
            .unwrap_or_else(|| msg.author.name.clone());

        let ev = MessageCreated {
            guild_id: gid.get(),
            channel_id: msg.channel_id.get(),
            message_id: msg.id.get(),
            author_id: msg.author.id.get(),
            author_display_name: display_name,
            text: msg.content.clone(),
        };
        guarded("message", async {
            self.app.handle_message(&ev).await;
        })
        .await;
    }

    async fn message_delete(
        &self,
        _ctx: Context,
        channel_id: ChannelId,
        message_id: MessageId,
        guild_id: Option<GuildId>,
    ) {
        if !guild_id.is_some_and(|g| self.our_guild(g)) {
            return;
        }
        let ev = MessageDeleted {
            channel_id: channel_id.get(),
            message_id: message_id.get(),
        };
        guarded("message_delete", self.app.handle_message_deleted(&ev)).await;
    }

    async fn reaction_add(&self, _ctx: Context, reaction: Reaction) {
        let (Some(gid), Some(uid)) = (reaction.guild_id, reaction.user_id) else {
            return;
        };
        if !self.our_guild(gid) {
            return;
        }
        let emoji = match &reaction.emoji {
            ReactionType::Unicode(s) => s.clone(),
            other => other.to_string(),
        };
        let ev = ReactionAdded {
            guild_id: gid.get(),
            channel_id: reaction.channel_id.get(),
            message_id: reaction.message_id.get(),
            user_id: uid.get(),
            emoji,
        };
        guarded("reaction_add", async {
            self.app.handle_reaction(&ev).await;
        })
        .await;
    }

    async fn channel_delete(
        &self,
        _ctx: Context,
        channel: GuildChannel,
        _messages: Option<Vec<Message>>,
    ) {
        if !self.our_guild(channel.guild_id) {
            return;
        }
        let ev = ChannelDeleted {
            guild_id: channel.guild_id.get(),
            channel_id: channel.id.get(),
            name: channel.name.clone(),
            kind: template_kind(channel.kind),
            parent_id: channel.parent_id.map(|p| p.get()),
        };
        guarded("channel_delete", async {
            self.app.handle_channel_deleted(&ev).await;
        })
        .await;
    }

    async fn guild_member_addition(&self, _ctx: Context, member: Member) {
        if member.user.bot || !self.our_guild(member.guild_id) {
            return;
        }
        let created = member.user.id.created_at();
        let ev = MemberJoined {
            guild_id: member.guild_id.get(),
            user_id: member.user.id.get(),
            display_name: member.display_name().to_string(),
            account_created_at: DateTime::from_timestamp(created.unix_timestamp(), 0)
                .unwrap_or_else(Utc::now),
        };
        guarded("member_join", async {
            self.app.handle_member_joined(&ev).await;
        })
        .await;
    }
}

fn intents_from_settings(names: &[String]) -> GatewayIntents {
    let mut i = GatewayIntents::empty();
    for n in names {
        match n.as_str() {
            "GUILDS" => i |= GatewayIntents::GUILDS,
            "GUILD_MEMBERS" => i |= GatewayIntents::GUILD_MEMBERS,
            "GUILD_MESSAGES" => i |= GatewayIntents::GUILD_MESSAGES,
            "GUILD_MESSAGE_REACTIONS" => i |= GatewayIntents::GUILD_MESSAGE_REACTIONS,
            "MESSAGE_CONTENT" => i |= GatewayIntents::MESSAGE_CONTENT,
            other => tracing::warn!(intent = other, "unknown gateway intent in config, ignored"),
        }
    }
    i
}

fn template_kind(kind: ChannelType) -> Option<TemplateKind> {
    match kind {
        ChannelType::Text | ChannelType::News => Some(TemplateKind::Text),
        ChannelType::Voice => Some(TemplateKind::Voice),
        _ => None,
    }
}

pub async fn run_bot(ctx: Arc<AppContext>) -> Result<()> {
    let token = &ctx.settings.discord.token;
    if token.is_empty() {
        anyhow::bail!("Missing Discord token (KG_DISCORD__TOKEN). Set it in .env.");
    }

    let mut intents = intents_from_settings(&ctx.settings.discord.intents);
    if intents.is_empty() {
        intents = crate::default_gateway_intents();
    }

    let handler = Handler { app: ctx.clone() };

    let mut client = serenity::Client::builder(token, intents)
        .event_handler(handler)
        .await?;

    tracing::info!("Discord client starting…");
    client.start().await?;
    Ok(())
}
