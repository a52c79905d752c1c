//! Policy Store – niezmienna polityka moderacji, budowana raz przy starcie.

use std::collections::HashSet;
use std::time::Duration;

use crate::config::{ModerationConfig, NewAccountAction};

/// Reguła dla zbyt młodych kont (poza raidem).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NewAccountRule {
    Ban,
    Kick,
    /// Ban, gdy wiek konta < `ban_below`; w przeciwnym razie kick.
    Tiered { ban_below: Duration },
}

/// Słowo kluczowe: oryginalna pisownia (do logów) + wersja lowercase (do porównań).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Keyword {
    pub display: String,
    pub folded: String,
}

impl Keyword {
    fn new(raw: &str) -> Option<Self> {
        let display = raw.trim();
        if display.is_empty() {
            return None;
        }
        Some(Self {
            display: display.to_string(),
            folded: display.to_lowercase(),
        })
    }
}

#[derive(Debug, Clone)]
pub struct ModerationPolicy {
    pub flagged_name_keywords: Vec<Keyword>,
    pub banned_message_keywords: Vec<Keyword>,
    pub min_account_age: Duration,
    pub spam_window: usize,
    pub spam_cooldown: Duration,
    pub raid_max_joins: usize,
    pub raid_window: Duration,
    pub spam_excluded_channels: HashSet<u64>,
    pub new_account_rule: NewAccountRule,
}

impl ModerationPolicy {
    pub fn from_config(cfg: &ModerationConfig) -> Self {
        let min_account_age = Duration::from_secs(cfg.min_account_age_secs);
        let new_account_rule = match cfg.new_account_action {
            NewAccountAction::Ban => NewAccountRule::Ban,
            NewAccountAction::Kick => NewAccountRule::Kick,
            NewAccountAction::Tiered => NewAccountRule::Tiered {
                ban_below: cfg
                    .new_account_ban_below_secs
                    .map(Duration::from_secs)
                    .unwrap_or(min_account_age / 2)
                    .min(min_account_age),
            },
        };

        Self {
            flagged_name_keywords: keywords(&cfg.flagged_name_keywords),
            banned_message_keywords: keywords(&cfg.banned_message_keywords),
            min_account_age,
            // okno 1 = każda wiadomość to "spam"
            spam_window: cfg.spam_window.max(2),
            spam_cooldown: Duration::from_secs(cfg.spam_cooldown_secs),
            raid_max_joins: cfg.raid_max_joins.max(1),
            raid_window: Duration::from_secs(cfg.raid_window_secs.max(1)),
            spam_excluded_channels: cfg.spam_excluded_channels.iter().copied().collect(),
            new_account_rule,
        }
    }

    /// Pierwsze (wg kolejności z konfiguracji) słowo z listy zawarte w `haystack`.
    pub fn first_match<'a>(list: &'a [Keyword], haystack: &str) -> Option<&'a Keyword> {
        if list.is_empty() {
            return None;
        }
        let hay = haystack.to_lowercase();
        list.iter().find(|k| hay.contains(&k.folded))
    }

    pub fn flagged_name(&self, display_name: &str) -> Option<&Keyword> {
        Self::first_match(&self.flagged_name_keywords, display_name)
    }

    pub fn banned_content(&self, text: &str) -> Option<&Keyword> {
        Self::first_match(&self.banned_message_keywords, text)
    }

    pub fn is_spam_excluded(&self, channel_id: u64) -> bool {
        self.spam_excluded_channels.contains(&channel_id)
    }
}

fn keywords(raw: &[String]) -> Vec<Keyword> {
    let mut out: Vec<Keyword> = Vec::with_capacity(raw.len());
    for k in raw.iter().filter_map(|r| Keyword::new(r)) {
        if !out.iter().any(|o| o.folded == k.folded) {
            out.push(k);
        }
    }
    out
}
