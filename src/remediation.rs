//! Remediation Workflow – wykonanie decyzji silnika.
//!
//! Kolejność: DM → opóźnienie → kara (usuń wiadomość, ban/kick/timeout) → audyt → purge.
//! Każdy krok toleruje porażkę poprzedniego; nic tu nie zwraca błędu do handlera.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;

use crate::audit::{AuditEntry, AuditSink};
use crate::config::RemediationConfig;
use crate::decision::Decision;
use crate::error::PlatformError;
use crate::executor::ActionExecutor;

/// Wynik sprzątania historii zbanowanego/wyrzuconego użytkownika.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PurgeReport {
    pub channels_scanned: usize,
    pub channels_failed: usize,
    pub deleted: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RemediationReport {
    pub notified: bool,
    pub action_ok: bool,
    pub purge: Option<PurgeReport>,
}

impl RemediationReport {
    fn skipped() -> Self {
        Self {
            notified: false,
            action_ok: true,
            purge: None,
        }
    }
}

#[derive(Clone)]
pub struct Remediation {
    executor: Arc<dyn ActionExecutor>,
    audit: Arc<dyn AuditSink>,
    cfg: RemediationConfig,
}

impl Remediation {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        audit: Arc<dyn AuditSink>,
        cfg: RemediationConfig,
    ) -> Self {
        Self {
            executor,
            audit,
            cfg,
        }
    }

    pub fn config(&self) -> &RemediationConfig {
        &self.cfg
    }

    pub async fn execute(&self, decision: &Decision, user_id: u64) -> RemediationReport {
        if decision.is_allow() {
            return RemediationReport::skipped();
        }

        // 1) DM (best effort)
        let notified = match self.notice_text(decision) {
            Some(text) => self.notify(user_id, &text).await,
            None => false,
        };

        // 2) powiadomienie przed karą
        tokio::time::sleep(self.cfg.pre_action_delay()).await;

        // 3) kara
        let action_ok = self.apply(decision, user_id).await;

        // 4) audyt
        self.audit
            .record(&AuditEntry::for_decision(decision, user_id, action_ok))
            .await;

        // 5) purge
        let purge = if decision.purges_history() {
            let report = self.purge_user_messages(user_id).await;
            tracing::info!(
                user_id,
                deleted = report.deleted,
                failed = report.failed,
                channels = report.channels_scanned,
                "remediation: purge finished"
            );
            Some(report)
        } else {
            None
        };

        RemediationReport {
            notified,
            action_ok,
            purge,
        }
    }

    /// Treść DM-a. Nigdy nie zawiera dopasowanego słowa.
    pub fn notice_text(&self, decision: &Decision) -> Option<String> {
        let server = &self.cfg.server_name;
        let reason = &decision.reason()?.text;
        let text = match decision {
            Decision::Allow => return None,
            Decision::DeleteMessage { .. } => {
                format!("Your message in {server} was removed. Reason: {reason}")
            }
            Decision::Timeout { duration, .. } => format!(
                "You have been timed out in {server} for {} minutes. Reason: {reason}",
                duration.as_secs() / 60
            ),
            Decision::Kick { .. } => format!("You have been kicked from {server}. Reason: {reason}"),
            Decision::Ban { .. } => format!("You have been banned from {server}. Reason: {reason}"),
        };
        Some(text)
    }

    /// DM z ponowieniem tylko na `Forbidden` (zamknięte DM-y potrafią się „otworzyć” chwilę później).
    async fn notify(&self, user_id: u64, text: &str) -> bool {
        let attempts = self.cfg.dm_attempts.max(1);
        for attempt in 1..=attempts {
            match self.executor.send_direct_message(user_id, text).await {
                Ok(()) => return true,
                Err(PlatformError::Forbidden) if attempt < attempts => {
                    tracing::debug!(user_id, attempt, "remediation: DM forbidden, retrying");
                    tokio::time::sleep(self.cfg.dm_retry_delay()).await;
                }
                Err(e) => {
                    tracing::warn!(error = %e, user_id, attempt, "remediation: DM not delivered");
                    return false;
                }
            }
        }
        false
    }

    async fn apply(&self, decision: &Decision, user_id: u64) -> bool {
        let mut ok = true;

        if let Some(m) = decision.message_to_delete() {
            if let Err(e) = self.executor.delete_message(m.channel_id, m.message_id).await {
                tracing::warn!(
                    error = %e,
                    channel_id = m.channel_id,
                    message_id = m.message_id,
                    "remediation: offending message not deleted"
                );
                ok = false;
            }
        }

        let result = match decision {
            Decision::Allow | Decision::DeleteMessage { .. } => Ok(()),
            Decision::Timeout {
                duration,
                reason,
                channel_id,
            } => {
                let r = self.executor.timeout_user(user_id, *duration, &reason.text).await;
                if r.is_ok() {
                    if let Some(ch) = channel_id {
                        self.post_timeout_notice(*ch, user_id, *duration).await;
                    }
                }
                r
            }
            Decision::Kick { reason } => self.executor.kick_user(user_id, &reason.text).await,
            Decision::Ban { reason, .. } => self.executor.ban_user(user_id, &reason.text).await,
        };

        if let Err(e) = result {
            tracing::warn!(error = %e, user_id, action = decision.label(), "remediation: action failed");
            ok = false;
        }
        ok
    }

    /// Publiczna notka o timeoucie, kasowana po `timeout_notice_ttl`.
    async fn post_timeout_notice(&self, channel_id: u64, user_id: u64, duration: Duration) {
        let text = format!(
            "<@{user_id}> has been timed out for {} minutes for spamming.",
            duration.as_secs() / 60
        );
        let message_id = match self.executor.send_channel_message(channel_id, &text).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, channel_id, "remediation: timeout notice not sent");
                return;
            }
        };

        let executor = self.executor.clone();
        let ttl = self.cfg.timeout_notice_ttl();
        tokio::spawn(async move {
            tokio::time::sleep(ttl).await;
            if let Err(e) = executor.delete_message(channel_id, message_id).await {
                tracing::debug!(error = %e, channel_id, message_id, "remediation: timeout notice cleanup failed");
            }
        });
    }

    /// Usuń wiadomości użytkownika z ostatnich `purge_lookback` we wszystkich kanałach tekstowych.
    pub async fn purge_user_messages(&self, user_id: u64) -> PurgeReport {
        let mut report = PurgeReport::default();
        let lookback = chrono::Duration::from_std(self.cfg.purge_lookback())
            .unwrap_or_else(|_| chrono::Duration::days(7));
        let since = Utc::now() - lookback;

        let channels = match self.executor.list_text_channels().await {
            Ok(c) => c,
            Err(e) => {
                tracing::warn!(error = %e, user_id, "remediation: cannot list channels for purge");
                return report;
            }
        };

        for channel_id in channels {
            report.channels_scanned += 1;
            let recent = match self
                .executor
                .fetch_recent_messages(channel_id, since, self.cfg.purge_fetch_limit)
                .await
            {
                Ok(v) => v,
                Err(e) => {
                    tracing::warn!(error = %e, channel_id, "remediation: history fetch failed, skipping channel");
                    report.channels_failed += 1;
                    continue;
                }
            };

            for m in recent.iter().filter(|m| m.author_id == user_id) {
                match self.executor.delete_message(channel_id, m.message_id).await {
                    Ok(()) => report.deleted += 1,
                    Err(e) => {
                        tracing::warn!(
                            error = %e,
                            channel_id,
                            message_id = m.message_id,
                            "remediation: purge delete failed"
                        );
                        report.failed += 1;
                    }
                }
                tokio::time::sleep(self.cfg.purge_delete_delay()).await;
            }
        }

        report
    }
}
