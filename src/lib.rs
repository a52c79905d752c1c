// src/lib.rs

pub mod audit;
pub mod behavior;
pub mod commands;
pub mod config;
pub mod decision;
pub mod discord;
pub mod engine;
pub mod error;
pub mod events;
pub mod executor;
pub mod logging;
pub mod metrics;
pub mod msglog;
pub mod policy;
pub mod provider;
pub mod remediation;
pub mod templates;
pub mod verify;

use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context as _, Result};
use chrono::Utc;
use serenity::all::GatewayIntents;
use serenity::http::Http;

use audit::{AuditSink, ChannelAuditSink};
use behavior::BehaviorStore;
use config::Settings;
use decision::Decision;
use engine::ModerationEngine;
use events::{ChannelDeleted, MemberJoined, MessageCreated, MessageDeleted, ReactionAdded};
use executor::{ActionExecutor, RateLimitLog, SerenityExecutor};
use metrics::MetricsSync;
use msglog::MessageLog;
use policy::ModerationPolicy;
use provider::{DataProvider, HttpDataProvider};
use remediation::Remediation;
use templates::ChannelTemplates;
use verify::Verify;

/// Ile ostatnich wiadomości trzymamy na potrzeby logu usunięć.
const MSGLOG_CAPACITY: u64 = 50_000;
const MSGLOG_TTL: Duration = Duration::from_secs(7 * 24 * 3600);

/// Globalny kontekst aplikacji: konfiguracja + gotowe serwisy.
pub struct AppContext {
    pub settings: Settings,
    engine: ModerationEngine,
    remediation: Remediation,
    provider: Arc<dyn DataProvider>,
    metrics: Option<Arc<MetricsSync>>,
    verify: Verify,
    templates: ChannelTemplates,
    msglog: MessageLog,
}

impl AppContext {
    /// Bootstrap całej aplikacji:
    /// - logi
    /// - klient REST Discorda
    /// - max supply (bez tego nie startujemy)
    /// - serwisy moderacji i metryk
    pub async fn bootstrap(settings: Settings) -> Result<Arc<Self>> {
        // 1) logi
        logging::init(&settings);

        // 2) REST
        if settings.discord.token.trim().is_empty() {
            anyhow::bail!("Missing Discord token (KG_DISCORD__TOKEN). Set it in .env.");
        }
        let rate_limits = RateLimitLog::default();
        let mut http = Http::new(&settings.discord.token);
        rate_limits.install(&mut http);
        let http = Arc::new(http);
        let executor: Arc<dyn ActionExecutor> = Arc::new(SerenityExecutor::new(
            http.clone(),
            settings.discord.guild_id,
            settings.discord.request_timeout(),
            rate_limits,
        ));
        let audit: Arc<dyn AuditSink> =
            Arc::new(ChannelAuditSink::new(http, settings.discord.log_channel_id));

        // 3) dane zewnętrzne
        let provider: Arc<dyn DataProvider> =
            Arc::new(HttpDataProvider::new(&settings.metrics).context("building data provider")?);
        let metrics = if settings.metrics.enabled {
            let sync = MetricsSync::bootstrap(provider.clone(), executor.clone(), settings.metrics.clone())
                .await
                .context("fetching max supply")?;
            Some(Arc::new(sync))
        } else {
            None
        };

        tracing::info!(
            env = %settings.env,
            guild_id = settings.discord.guild_id,
            metrics = metrics.is_some(),
            "bootstrap complete"
        );

        Ok(Arc::new(Self::from_parts(settings, executor, provider, audit, metrics)))
    }

    /// Składanie kontekstu z gotowych zależności (także w testach, z mockami).
    pub fn from_parts(
        settings: Settings,
        executor: Arc<dyn ActionExecutor>,
        provider: Arc<dyn DataProvider>,
        audit: Arc<dyn AuditSink>,
        metrics: Option<Arc<MetricsSync>>,
    ) -> Self {
        let m = &settings.moderation;
        let policy = Arc::new(ModerationPolicy::from_config(m));
        let store = Arc::new(BehaviorStore::new(
            policy.spam_window,
            m.state_capacity,
            Duration::from_secs(m.state_idle_secs),
        ));

        Self {
            engine: ModerationEngine::new(policy, store),
            remediation: Remediation::new(executor.clone(), audit.clone(), settings.remediation.clone()),
            verify: Verify::new(executor.clone(), audit.clone(), settings.verify.clone()),
            templates: ChannelTemplates::new(executor, audit.clone(), metrics.clone(), settings.templates.clone()),
            msglog: MessageLog::new(audit, MSGLOG_CAPACITY, MSGLOG_TTL),
            provider,
            metrics,
            settings,
        }
    }

    /// Wersja bez sieci: audyt tylko do tracing.
    pub fn new_testing(
        settings: Settings,
        executor: Arc<dyn ActionExecutor>,
        provider: Arc<dyn DataProvider>,
    ) -> Self {
        Self::from_parts(settings, executor, provider, Arc::new(ChannelAuditSink::tracing_only()), None)
    }

    pub fn engine(&self) -> &ModerationEngine {
        &self.engine
    }

    pub fn remediation(&self) -> &Remediation {
        &self.remediation
    }

    pub fn provider(&self) -> Arc<dyn DataProvider> {
        self.provider.clone()
    }

    pub fn metrics(&self) -> Option<Arc<MetricsSync>> {
        self.metrics.clone()
    }

    /// Środowisko z konfiguracji ("production" | "development" | …).
    #[inline]
    pub fn env(&self) -> &str {
        &self.settings.env
    }

    /* --------- zdarzenia --------- */

    pub async fn handle_message(&self, ev: &MessageCreated) -> Decision {
        self.msglog.remember(ev).await;

        let decision = self.engine.evaluate_message(ev, Utc::now());
        if !decision.is_allow() {
            self.remediation.execute(&decision, ev.author_id).await;
        }
        decision
    }

    pub async fn handle_member_joined(&self, ev: &MemberJoined) -> Decision {
        let decision = self.engine.evaluate_join(ev, Utc::now());
        tracing::info!(
            guild_id = ev.guild_id,
            user_id = ev.user_id,
            name = %ev.display_name,
            account_created_at = %ev.account_created_at,
            decision = decision.label(),
            "member joined"
        );
        if !decision.is_allow() {
            self.remediation.execute(&decision, ev.user_id).await;
        }
        decision
    }

    pub async fn handle_reaction(&self, ev: &ReactionAdded) -> bool {
        self.verify.on_reaction(ev).await
    }

    pub async fn handle_channel_deleted(&self, ev: &ChannelDeleted) -> Option<u64> {
        self.templates.on_channel_delete(ev).await
    }

    pub async fn handle_message_deleted(&self, ev: &MessageDeleted) {
        self.msglog.on_delete(ev).await;
    }

    /// Pętle metryk – wołane po READY; kolejne wywołania nic nie robią.
    pub fn start_background(&self) {
        if let Some(m) = &self.metrics {
            m.spawn();
        }
    }
}

/// Gotowy zestaw intents:
/// - GUILDS, GUILD_MESSAGES, MESSAGE_CONTENT (filtr treści, log usunięć),
/// - GUILD_MEMBERS (wejścia, licznik roli),
/// - GUILD_MESSAGE_REACTIONS (weryfikacja).
pub fn default_gateway_intents() -> GatewayIntents {
    GatewayIntents::GUILDS
        | GatewayIntents::GUILD_MESSAGES
        | GatewayIntents::MESSAGE_CONTENT
        | GatewayIntents::GUILD_MEMBERS
        | GatewayIntents::GUILD_MESSAGE_REACTIONS
}

/// Start klienta Discorda (Gateway + slash commands).
pub async fn run(ctx: Arc<AppContext>) -> Result<()> {
    discord::run_bot(ctx).await
}
