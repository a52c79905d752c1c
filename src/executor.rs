//! ActionExecutor – wąski interfejs do REST-a Discorda.
//!
//! Rdzeń (remediation, metrics, verify, templates) woła wyłącznie ten trait;
//! `SerenityExecutor` to produkcyjna implementacja na `serenity::http::Http`;
//! w testach podmieniamy go mockiem.
//!
//! Każde wywołanie REST ma górny limit czasu. Wbudowany ratelimiter serenity czeka na
//! reset bucketu bez limitu; jego zgłoszenia trafiają do `RateLimitLog`, więc rename,
//! który utknął na ratelimicie, kończy się `RateLimited { retry_after }` zamiast wisieć.

use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use serenity::all::{
    ChannelId, ChannelType, CreateChannel, CreateMessage, EditChannel, GetMessages, GuildId,
    MessageId, RoleId, UserId,
};
use serenity::async_trait;
use serenity::http::Http;
use serenity::http::RatelimitInfo;

use crate::config::TemplateKind;
use crate::error::{PlatformError, PlatformResult};

/// Wiadomość z historii kanału (tylko to, czego potrzebuje purge).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecentMessage {
    pub message_id: u64,
    pub author_id: u64,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewChannel {
    pub name: String,
    pub kind: TemplateKind,
    pub parent_id: Option<u64>,
}

#[async_trait]
pub trait ActionExecutor: Send + Sync {
    async fn send_direct_message(&self, user_id: u64, text: &str) -> PlatformResult<()>;
    /// Zwraca id wysłanej wiadomości.
    async fn send_channel_message(&self, channel_id: u64, text: &str) -> PlatformResult<u64>;
    async fn delete_message(&self, channel_id: u64, message_id: u64) -> PlatformResult<()>;
    async fn timeout_user(&self, user_id: u64, duration: Duration, reason: &str) -> PlatformResult<()>;
    async fn kick_user(&self, user_id: u64, reason: &str) -> PlatformResult<()>;
    async fn ban_user(&self, user_id: u64, reason: &str) -> PlatformResult<()>;
    async fn set_channel_display_name(&self, channel_id: u64, text: &str) -> PlatformResult<()>;
    /// Najnowsze wiadomości kanału młodsze niż `since`, maks. `limit` sztuk.
    async fn fetch_recent_messages(
        &self,
        channel_id: u64,
        since: DateTime<Utc>,
        limit: usize,
    ) -> PlatformResult<Vec<RecentMessage>>;
    async fn list_text_channels(&self) -> PlatformResult<Vec<u64>>;
    async fn count_role_members(&self, role_id: u64) -> PlatformResult<usize>;
    async fn add_role(&self, user_id: u64, role_id: u64, reason: &str) -> PlatformResult<()>;
    /// Zwraca id nowego kanału.
    async fn create_channel(&self, spec: &NewChannel) -> PlatformResult<u64>;
}

/* ==============================
   Ratelimity i limity czasu
   ============================== */

/// Ostatnie oczekiwania zgłoszone przez ratelimiter serenity, per ścieżka route'u.
#[derive(Debug, Clone, Default)]
pub struct RateLimitLog(Arc<DashMap<String, (Instant, Duration)>>);

impl RateLimitLog {
    pub fn record(&self, path: &str, wait: Duration) {
        self.0.insert(path.to_string(), (Instant::now(), wait));
    }

    /// Pozostały czas oczekiwania na route kanału; wpis jest zdejmowany.
    pub fn take_for_channel(&self, channel_id: u64) -> Option<Duration> {
        let id = channel_id.to_string();
        let key = self
            .0
            .iter()
            .find(|e| route_targets_channel(e.key(), &id))
            .map(|e| e.key().clone())?;
        let (_, (at, wait)) = self.0.remove(&key)?;
        Some(wait.saturating_sub(at.elapsed()))
    }

    /// Podpina log pod callback ratelimitera klienta (jeśli ratelimiter jest włączony).
    pub fn install(&self, http: &mut Http) {
        let Some(rl) = http.ratelimiter.as_mut() else {
            return;
        };
        let log = self.clone();
        rl.set_ratelimit_callback(Box::new(move |info: RatelimitInfo| {
            tracing::debug!(path = %info.path, wait = ?info.timeout, global = info.global, "discord: ratelimited");
            log.record(&info.path, info.timeout);
        }));
    }
}

fn route_targets_channel(path: &str, id: &str) -> bool {
    let segments: Vec<&str> = path.split(['/', '?']).collect();
    segments.windows(2).any(|w| w[0] == "channels" && w[1] == id)
}

/// Wywołanie REST z limitem czasu; przekroczenie = `PlatformError::Timeout`.
pub async fn bounded<T, F>(limit: Duration, fut: F) -> PlatformResult<T>
where
    F: Future<Output = serenity::Result<T>>,
{
    match tokio::time::timeout(limit, fut).await {
        Ok(res) => res.map_err(PlatformError::from),
        Err(_) => Err(PlatformError::Timeout),
    }
}

/// Timeout na kanale, dla którego serenity zgłosiło ratelimit, to w praktyce 429.
pub fn stalled_on_channel(log: &RateLimitLog, channel_id: u64) -> PlatformError {
    match log.take_for_channel(channel_id) {
        Some(wait) => PlatformError::RateLimited {
            retry_after: Some(wait),
        },
        None => PlatformError::Timeout,
    }
}

/* ==============================
   Implementacja serenity
   ============================== */

const PAGE: u8 = 100;
const MEMBERS_PAGE: u64 = 1000;

pub struct SerenityExecutor {
    http: Arc<Http>,
    guild_id: GuildId,
    call_timeout: Duration,
    rate_limits: RateLimitLog,
}

impl SerenityExecutor {
    pub fn new(http: Arc<Http>, guild_id: u64, call_timeout: Duration, rate_limits: RateLimitLog) -> Self {
        Self {
            http,
            guild_id: GuildId::new(guild_id.max(1)),
            call_timeout,
            rate_limits,
        }
    }

    async fn call<T, F>(&self, fut: F) -> PlatformResult<T>
    where
        F: Future<Output = serenity::Result<T>>,
    {
        bounded(self.call_timeout, fut).await
    }
}

#[async_trait]
impl ActionExecutor for SerenityExecutor {
    async fn send_direct_message(&self, user_id: u64, text: &str) -> PlatformResult<()> {
        let dm = self.call(UserId::new(user_id).create_dm_channel(&self.http)).await?;
        self.call(dm.id.send_message(&self.http, CreateMessage::new().content(text)))
            .await?;
        Ok(())
    }

    async fn send_channel_message(&self, channel_id: u64, text: &str) -> PlatformResult<u64> {
        let m = self
            .call(ChannelId::new(channel_id).send_message(&self.http, CreateMessage::new().content(text)))
            .await?;
        Ok(m.id.get())
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> PlatformResult<()> {
        self.call(ChannelId::new(channel_id).delete_message(&self.http, MessageId::new(message_id)))
            .await
    }

    async fn timeout_user(&self, user_id: u64, duration: Duration, reason: &str) -> PlatformResult<()> {
        let until = Utc::now()
            + chrono::Duration::from_std(duration)
                .map_err(|e| PlatformError::Other(e.to_string()))?;
        let mut member = self
            .call(self.guild_id.member(&self.http, UserId::new(user_id)))
            .await?;
        self.call(member.disable_communication_until_datetime(&self.http, until.into()))
            .await?;
        tracing::debug!(user_id, reason, "executor: timeout applied");
        Ok(())
    }

    async fn kick_user(&self, user_id: u64, reason: &str) -> PlatformResult<()> {
        self.call(self.guild_id.kick_with_reason(&self.http, UserId::new(user_id), reason))
            .await
    }

    async fn ban_user(&self, user_id: u64, reason: &str) -> PlatformResult<()> {
        // historię czyścimy sami (purge), więc delete_message_days = 0
        self.call(self.guild_id.ban_with_reason(&self.http, UserId::new(user_id), 0, reason))
            .await
    }

    async fn set_channel_display_name(&self, channel_id: u64, text: &str) -> PlatformResult<()> {
        // Discord: 2 zmiany nazwy na 10 minut per kanał
        let edit = ChannelId::new(channel_id).edit(&self.http, EditChannel::new().name(text));
        match self.call(edit).await {
            Ok(_) => Ok(()),
            Err(PlatformError::Timeout) => Err(stalled_on_channel(&self.rate_limits, channel_id)),
            Err(e) => Err(e),
        }
    }

    async fn fetch_recent_messages(
        &self,
        channel_id: u64,
        since: DateTime<Utc>,
        limit: usize,
    ) -> PlatformResult<Vec<RecentMessage>> {
        let ch = ChannelId::new(channel_id);
        let mut out = Vec::new();
        let mut before: Option<MessageId> = None;

        // Stronicujemy od najnowszych do `since` (jak /mdel).
        'pages: while out.len() < limit {
            let to_get = (limit - out.len()).min(PAGE as usize) as u8;
            let mut builder = GetMessages::new().limit(to_get);
            if let Some(b) = before {
                builder = builder.before(b);
            }
            let msgs = self.call(ch.messages(&self.http, builder)).await?;
            if msgs.is_empty() {
                break;
            }
            for m in &msgs {
                let at: DateTime<Utc> = DateTime::from_timestamp(m.timestamp.unix_timestamp(), 0)
                    .unwrap_or_else(Utc::now);
                if at < since {
                    break 'pages;
                }
                out.push(RecentMessage {
                    message_id: m.id.get(),
                    author_id: m.author.id.get(),
                    created_at: at,
                });
            }
            before = msgs.last().map(|m| m.id);
        }

        Ok(out)
    }

    async fn list_text_channels(&self) -> PlatformResult<Vec<u64>> {
        let map = self.call(self.guild_id.channels(&self.http)).await?;
        let mut ids: Vec<u64> = map
            .into_iter()
            .filter(|(_, gc)| matches!(gc.kind, ChannelType::Text | ChannelType::News))
            .map(|(id, _)| id.get())
            .collect();
        ids.sort_unstable();
        Ok(ids)
    }

    async fn count_role_members(&self, role_id: u64) -> PlatformResult<usize> {
        let role = RoleId::new(role_id);
        let mut count = 0usize;
        let mut after: Option<UserId> = None;
        loop {
            let page = self
                .call(self.guild_id.members(&self.http, Some(MEMBERS_PAGE), after))
                .await?;
            count += page.iter().filter(|m| m.roles.contains(&role)).count();
            if (page.len() as u64) < MEMBERS_PAGE {
                break;
            }
            after = page.last().map(|m| m.user.id);
        }
        Ok(count)
    }

    async fn add_role(&self, user_id: u64, role_id: u64, reason: &str) -> PlatformResult<()> {
        self.call(self.http.add_member_role(
            self.guild_id,
            UserId::new(user_id),
            RoleId::new(role_id),
            Some(reason),
        ))
        .await
    }

    async fn create_channel(&self, spec: &NewChannel) -> PlatformResult<u64> {
        let kind = match spec.kind {
            TemplateKind::Text => ChannelType::Text,
            TemplateKind::Voice => ChannelType::Voice,
        };
        let mut builder = CreateChannel::new(spec.name.clone()).kind(kind);
        if let Some(parent) = spec.parent_id {
            builder = builder.category(ChannelId::new(parent));
        }
        let created = self.call(self.guild_id.create_channel(&self.http, builder)).await?;
        Ok(created.id.get())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ratelimit_wait_is_matched_to_its_channel() {
        let log = RateLimitLog::default();
        log.record("https://discord.com/api/v10/channels/123", Duration::from_secs(30));

        assert_eq!(log.take_for_channel(12), None);
        assert_eq!(log.take_for_channel(1234), None);

        let wait = log.take_for_channel(123).unwrap();
        assert!(wait <= Duration::from_secs(30) && wait > Duration::from_secs(29));
        // zdjęty po odczycie
        assert_eq!(log.take_for_channel(123), None);
    }

    #[test]
    fn stalled_rename_maps_to_rate_limited_only_with_a_recorded_wait() {
        let log = RateLimitLog::default();
        assert_eq!(stalled_on_channel(&log, 7), PlatformError::Timeout);

        log.record("channels/7", Duration::from_secs(480));
        match stalled_on_channel(&log, 7) {
            PlatformError::RateLimited { retry_after: Some(d) } => {
                assert!(d > Duration::from_secs(479));
            }
            other => panic!("expected RateLimited with a hint, got {other:?}"),
        }
    }

    #[tokio::test(start_paused = true)]
    async fn hanging_call_becomes_timeout() {
        let res: PlatformResult<()> =
            bounded(Duration::from_secs(15), std::future::pending::<serenity::Result<()>>()).await;
        assert_eq!(res, Err(PlatformError::Timeout));

        let ok: PlatformResult<u8> = bounded(Duration::from_secs(15), async { Ok(3) }).await;
        assert_eq!(ok, Ok(3));
    }
}
