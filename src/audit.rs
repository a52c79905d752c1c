//! Dziennik audytu: jeden wpis na wynik moderacji / synchronizacji.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serenity::all::{ChannelId, Colour, CreateEmbed, CreateEmbedFooter, CreateMessage};
use serenity::async_trait;
use serenity::http::Http;

use crate::decision::{Decision, ViolationKind};
use crate::executor::bounded;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AuditEntry {
    pub at: DateTime<Utc>,
    /// "ban" | "kick" | "timeout" | "delete" | "verify" | "template" | "message_deleted" …
    pub action: String,
    pub user_id: Option<u64>,
    pub kind: Option<ViolationKind>,
    pub reason: String,
    /// Widoczne tylko dla moderatorów.
    pub matched_keyword: Option<String>,
    pub ok: bool,
    pub detail: Option<String>,
}

impl AuditEntry {
    pub fn new(action: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            at: Utc::now(),
            action: action.into(),
            user_id: None,
            kind: None,
            reason: reason.into(),
            matched_keyword: None,
            ok: true,
            detail: None,
        }
    }

    pub fn for_decision(decision: &Decision, user_id: u64, ok: bool) -> Self {
        let (kind, reason, keyword) = match decision.reason() {
            Some(r) => (Some(r.kind), r.text.clone(), r.matched_keyword.clone()),
            None => (None, String::new(), None),
        };
        Self {
            at: Utc::now(),
            action: decision.label().to_string(),
            user_id: Some(user_id),
            kind,
            reason,
            matched_keyword: keyword,
            ok,
            detail: None,
        }
    }

    pub fn user(mut self, user_id: u64) -> Self {
        self.user_id = Some(user_id);
        self
    }

    pub fn ok(mut self, ok: bool) -> Self {
        self.ok = ok;
        self
    }

    pub fn detail(mut self, detail: impl Into<String>) -> Self {
        self.detail = Some(detail.into());
        self
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn record(&self, entry: &AuditEntry);
}

const SEND_TIMEOUT: Duration = Duration::from_secs(15);

/// Audyt do tracing + (opcjonalnie) embed na kanale logów.
pub struct ChannelAuditSink {
    http: Option<Arc<Http>>,
    channel_id: u64,
}

impl ChannelAuditSink {
    pub fn new(http: Arc<Http>, channel_id: u64) -> Self {
        Self {
            http: Some(http),
            channel_id,
        }
    }

    /// Tylko tracing (brak kanału / testy).
    pub fn tracing_only() -> Self {
        Self {
            http: None,
            channel_id: 0,
        }
    }

    fn embed(entry: &AuditEntry) -> CreateEmbed {
        let colour = if entry.ok { 0xE67E22 } else { 0xE74C3C };
        let mut e = CreateEmbed::new()
            .title(format!("🛡️ {}", entry.action))
            .colour(Colour::new(colour))
            .timestamp(entry.at)
            .footer(CreateEmbedFooter::new("Karlsen Guard – audit"));
        if let Some(uid) = entry.user_id {
            e = e.field("User", format!("<@{uid}> (`{uid}`)"), true);
        }
        if let Some(kind) = entry.kind {
            e = e.field("Kind", kind.to_string(), true);
        }
        e = e.field("Status", if entry.ok { "ok" } else { "failed" }, true);
        if !entry.reason.is_empty() {
            e = e.field("Reason", &entry.reason, false);
        }
        if let Some(kw) = &entry.matched_keyword {
            e = e.field("Matched", format!("`{kw}`"), true);
        }
        if let Some(d) = &entry.detail {
            e = e.field("Detail", truncate(d, 1000), false);
        }
        e
    }
}

#[async_trait]
impl AuditSink for ChannelAuditSink {
    async fn record(&self, entry: &AuditEntry) {
        tracing::info!(
            action = %entry.action,
            user_id = ?entry.user_id,
            kind = ?entry.kind,
            matched = ?entry.matched_keyword,
            ok = entry.ok,
            "audit"
        );

        let Some(http) = &self.http else {
            return;
        };
        if self.channel_id == 0 {
            return;
        }
        let send = ChannelId::new(self.channel_id).send_message(http, CreateMessage::new().embed(Self::embed(entry)));
        if let Err(e) = bounded(SEND_TIMEOUT, send).await {
            tracing::warn!(error = ?e, channel_id = self.channel_id, "audit: log channel send failed");
        }
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out: String = s.chars().take(max.saturating_sub(1)).collect();
    out.push('…');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::decision::Reason;

    #[test]
    fn decision_entry_keeps_keyword_for_moderators() {
        let d = Decision::Ban {
            reason: Reason::new(ViolationKind::Content, "bad").with_keyword("Word1"),
            delete_message: None,
        };
        let e = AuditEntry::for_decision(&d, 9, false);
        assert_eq!(e.action, "ban");
        assert_eq!(e.user_id, Some(9));
        assert_eq!(e.matched_keyword.as_deref(), Some("Word1"));
        assert!(!e.ok);
    }

    #[test]
    fn truncate_respects_char_boundaries() {
        assert_eq!(truncate("żółw", 10), "żółw");
        assert_eq!(truncate("żółwżółw", 4), "żół…");
    }
}
