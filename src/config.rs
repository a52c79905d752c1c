use std::time::Duration;

use anyhow::Result;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};

use crate::metrics::{Formatter, MetricKey};

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Settings {
    pub env: String,
    pub app: App,
    pub discord: Discord,
    pub logging: Logging,
    pub moderation: ModerationConfig,
    pub remediation: RemediationConfig,
    pub metrics: MetricsConfig,
    pub verify: VerifyConfig,
    pub commands: CommandsConfig,
    #[serde(default)]
    pub templates: Vec<ChannelTemplate>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct App {
    pub name: String,
}

impl Default for App {
    fn default() -> Self {
        Self {
            name: "Karlsen Guard".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Discord {
    pub token: String,
    pub guild_id: u64,
    /// Kanał logów moderacji (0 = tylko tracing).
    pub log_channel_id: u64,
    pub intents: Vec<String>,
    /// Górny limit na pojedyncze wywołanie REST (razem z czekaniem na ratelimit).
    pub request_timeout_secs: u64,
}

impl Discord {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs.max(1))
    }
}

impl Default for Discord {
    fn default() -> Self {
        Self {
            token: String::new(),
            guild_id: 0,
            log_channel_id: 0,
            intents: vec![
                "GUILDS".into(),
                "GUILD_MEMBERS".into(),
                "GUILD_MESSAGES".into(),
                "MESSAGE_CONTENT".into(),
                "GUILD_MESSAGE_REACTIONS".into(),
            ],
            request_timeout_secs: 15,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Logging {
    pub level: Option<String>,
}

impl Default for Logging {
    fn default() -> Self {
        Self {
            level: Some("info".into()),
        }
    }
}

/// Co robimy z kontem młodszym niż `min_account_age_secs` (poza raidem).
#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum NewAccountAction {
    Ban,
    Kick,
    Tiered,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct ModerationConfig {
    pub flagged_name_keywords: Vec<String>,
    pub banned_message_keywords: Vec<String>,
    pub min_account_age_secs: u64,
    pub spam_window: usize,
    pub spam_cooldown_secs: u64,
    pub raid_max_joins: usize,
    pub raid_window_secs: u64,
    pub spam_excluded_channels: Vec<u64>,
    pub new_account_action: NewAccountAction,
    /// Tylko dla `tiered`; brak → połowa `min_account_age_secs`.
    pub new_account_ban_below_secs: Option<u64>,
    pub state_capacity: u64,
    pub state_idle_secs: u64,
}

impl Default for ModerationConfig {
    fn default() -> Self {
        Self {
            flagged_name_keywords: vec![],
            banned_message_keywords: vec![],
            min_account_age_secs: 24 * 3600,
            spam_window: 4,
            spam_cooldown_secs: 30 * 60,
            raid_max_joins: 10,
            raid_window_secs: 60,
            spam_excluded_channels: vec![],
            new_account_action: NewAccountAction::Tiered,
            new_account_ban_below_secs: None,
            state_capacity: 10_000,
            state_idle_secs: 24 * 3600,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemediationConfig {
    pub server_name: String,
    pub dm_attempts: u32,
    pub dm_retry_delay_ms: u64,
    pub pre_action_delay_ms: u64,
    pub purge_lookback_secs: u64,
    pub purge_fetch_limit: usize,
    pub purge_delete_delay_ms: u64,
    pub timeout_notice_ttl_secs: u64,
}

impl Default for RemediationConfig {
    fn default() -> Self {
        Self {
            server_name: "Karlsen Network".into(),
            dm_attempts: 3,
            dm_retry_delay_ms: 1_000,
            pre_action_delay_ms: 1_000,
            purge_lookback_secs: 7 * 24 * 3600,
            purge_fetch_limit: 10_000,
            purge_delete_delay_ms: 1_000,
            timeout_notice_ttl_secs: 300,
        }
    }
}

impl RemediationConfig {
    pub fn dm_retry_delay(&self) -> Duration {
        Duration::from_millis(self.dm_retry_delay_ms)
    }
    pub fn pre_action_delay(&self) -> Duration {
        Duration::from_millis(self.pre_action_delay_ms)
    }
    pub fn purge_lookback(&self) -> Duration {
        Duration::from_secs(self.purge_lookback_secs)
    }
    pub fn purge_delete_delay(&self) -> Duration {
        Duration::from_millis(self.purge_delete_delay_ms)
    }
    pub fn timeout_notice_ttl(&self) -> Duration {
        Duration::from_secs(self.timeout_notice_ttl_secs)
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct BindingConfig {
    pub key: MetricKey,
    pub channel_id: u64,
    pub label: String,
    #[serde(default)]
    pub formatter: Option<Formatter>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MemberCountConfig {
    pub role_id: u64,
    pub channel_id: u64,
    pub interval_secs: u64,
    pub label: String,
}

impl Default for MemberCountConfig {
    fn default() -> Self {
        Self {
            role_id: 0,
            channel_id: 0,
            interval_secs: 600,
            label: "Members:".into(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub interval_secs: u64,
    pub rate_limit_fallback_secs: u64,
    pub max_rate_limit_retries: u32,
    pub skip_unchanged: bool,
    pub http_timeout_secs: u64,
    pub api_base_url: String,
    pub volume_url: String,
    pub category_id: u64,
    pub category_name: Option<String>,
    pub max_supply_channel_id: u64,
    pub max_supply_label: String,
    pub bindings: Vec<BindingConfig>,
    pub members: MemberCountConfig,
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: 600,
            rate_limit_fallback_secs: 60,
            max_rate_limit_retries: 1,
            skip_unchanged: true,
            http_timeout_secs: 15,
            api_base_url: "https://api.karlsencoin.com".into(),
            volume_url: "https://api.coingecko.com/api/v3/coins/karlsen".into(),
            category_id: 0,
            category_name: Some("--Karlsen Network Stats--".into()),
            max_supply_channel_id: 0,
            max_supply_label: "Max Supply:".into(),
            bindings: vec![],
            members: MemberCountConfig::default(),
        }
    }
}

impl MetricsConfig {
    pub fn interval(&self) -> Duration {
        Duration::from_secs(self.interval_secs.max(1))
    }
    pub fn rate_limit_fallback(&self) -> Duration {
        Duration::from_secs(self.rate_limit_fallback_secs)
    }
    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct VerifyConfig {
    pub channel_id: u64,
    pub message_id: u64,
    pub emoji: String,
    pub role_id: u64,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            channel_id: 0,
            message_id: 0,
            emoji: "👍".into(),
            role_id: 0,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
#[serde(default)]
pub struct CommandsConfig {
    pub balance_channel_id: u64,
    pub calc_channel_id: u64,
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum TemplateKind {
    Text,
    Voice,
}

/// Kanał odtwarzany po usunięciu (np. kanały statystyk).
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ChannelTemplate {
    pub channel_id: u64,
    pub name: String,
    pub kind: TemplateKind,
    #[serde(default)]
    pub parent_id: Option<u64>,
}

impl Settings {
    pub fn load() -> Result<Self> {
        // Które środowisko?
        let env = std::env::var("KG_ENV").unwrap_or_else(|_| "development".to_string());

        // Załaduj .env.<env> i .env (jeśli są)
        let _ = dotenvy::from_filename(format!(".env.{}", env));
        let _ = dotenvy::dotenv();

        let defaults = Settings {
            env: env.clone(),
            ..Settings::default()
        };

        // Warstwy: domyślne -> plik TOML -> zmienne środowiskowe KG_*
        let figment = Figment::from(Serialized::defaults(defaults))
            .merge(Toml::file(format!("config/{}.toml", env)))
            // KG_DISCORD__TOKEN => discord.token (pojedynczy "_" zostaje w nazwie pola)
            .merge(Env::prefixed("KG_").split("__"));

        let mut s: Settings = figment.extract()?;
        s.env = env;

        Ok(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partial_toml_keeps_defaults() {
        let s: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::string(
                r#"
                [moderation]
                spam_window = 6
                banned_message_keywords = ["Word1"]
                new_account_action = "ban"

                [[metrics.bindings]]
                key = "price"
                channel_id = 42
                label = "Price:"
                "#,
            ))
            .extract()
            .unwrap();

        assert_eq!(s.moderation.spam_window, 6);
        assert_eq!(s.moderation.spam_cooldown_secs, 30 * 60);
        assert_eq!(s.moderation.new_account_action, NewAccountAction::Ban);
        assert_eq!(s.metrics.bindings.len(), 1);
        assert_eq!(s.metrics.bindings[0].key, MetricKey::Price);
        assert!(s.metrics.bindings[0].formatter.is_none());
        assert_eq!(s.remediation.dm_attempts, 3);
    }

    #[test]
    fn development_profile_restricts_both_commands() {
        let s: Settings = Figment::from(Serialized::defaults(Settings::default()))
            .merge(Toml::file("config/development.toml"))
            .extract()
            .unwrap();

        assert_eq!(s.commands.balance_channel_id, 1249349276471922819);
        assert_ne!(s.commands.calc_channel_id, 0);
        assert_eq!(s.metrics.bindings.len(), 9);
    }
}
