//! Weryfikacja reakcją: 👍 pod wiadomością regulaminu → rola „verified”.

use std::sync::Arc;

use crate::audit::{AuditEntry, AuditSink};
use crate::config::VerifyConfig;
use crate::events::ReactionAdded;
use crate::executor::ActionExecutor;

pub struct Verify {
    executor: Arc<dyn ActionExecutor>,
    audit: Arc<dyn AuditSink>,
    cfg: VerifyConfig,
}

impl Verify {
    pub fn new(executor: Arc<dyn ActionExecutor>, audit: Arc<dyn AuditSink>, cfg: VerifyConfig) -> Self {
        Self {
            executor,
            audit,
            cfg,
        }
    }

    /// Czy reakcja dotyczy skonfigurowanej wiadomości, kanału i emoji.
    pub fn matches(&self, r: &ReactionAdded) -> bool {
        self.cfg.role_id != 0
            && r.message_id == self.cfg.message_id
            && r.channel_id == self.cfg.channel_id
            && r.emoji == self.cfg.emoji
    }

    /// Zwraca `true`, gdy rola została nadana.
    pub async fn on_reaction(&self, r: &ReactionAdded) -> bool {
        if !self.matches(r) {
            return false;
        }

        let ok = match self
            .executor
            .add_role(r.user_id, self.cfg.role_id, "reaction verification")
            .await
        {
            Ok(()) => {
                tracing::info!(user_id = r.user_id, role_id = self.cfg.role_id, "verify: role assigned");
                true
            }
            Err(e) => {
                tracing::warn!(error = %e, user_id = r.user_id, "verify: role assignment failed");
                false
            }
        };

        self.audit
            .record(
                &AuditEntry::new("verify", "Assigned verified role")
                    .user(r.user_id)
                    .ok(ok),
            )
            .await;
        ok
    }
}
