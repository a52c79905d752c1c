//! Moderation Decision Engine.
//!
//! Kolejność dla wiadomości: nick (flagged) → treść (banned) → spam.
//! Pierwsze trafienie wygrywa, bez punktacji i bez agregacji wielu trafień.
//! Silnik nie dotyka Discorda – tylko czyta politykę i aktualizuje `BehaviorStore`.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::behavior::BehaviorStore;
use crate::decision::{Decision, MessageRef, Reason, ViolationKind};
use crate::events::{MemberJoined, MessageCreated};
use crate::policy::{NewAccountRule, ModerationPolicy};

pub const REASON_IDENTITY: &str =
    "Display name contains inappropriate content that violates our guidelines.";
pub const REASON_CONTENT: &str =
    "Message contains inappropriate content that violates our guidelines.";
pub const REASON_RAID: &str = "raid: join burst";
pub const REASON_NEW_ACCOUNT: &str = "Account age less than required minimum";
pub const REASON_SPAM: &str = "repeated identical messages";

#[derive(Debug, Clone)]
pub struct ModerationEngine {
    policy: Arc<ModerationPolicy>,
    store: Arc<BehaviorStore>,
}

impl ModerationEngine {
    pub fn new(policy: Arc<ModerationPolicy>, store: Arc<BehaviorStore>) -> Self {
        Self { policy, store }
    }

    pub fn policy(&self) -> &ModerationPolicy {
        &self.policy
    }

    pub fn store(&self) -> &BehaviorStore {
        &self.store
    }

    /* --------- JOIN --------- */

    pub fn evaluate_join(&self, member: &MemberJoined, now: DateTime<Utc>) -> Decision {
        let p = &self.policy;

        self.store
            .record_member_join(member.user_id, now, p.raid_window);
        let joins = self
            .store
            .record_join_and_count(member.guild_id, now, p.raid_window);

        // ściśle "więcej niż N"
        if joins > p.raid_max_joins {
            tracing::warn!(
                guild_id = member.guild_id,
                user_id = member.user_id,
                joins,
                threshold = p.raid_max_joins,
                "engine: join burst detected"
            );
            return Decision::Ban {
                reason: Reason::new(ViolationKind::Raid, REASON_RAID),
                delete_message: None,
            };
        }

        let age = (now - member.account_created_at)
            .to_std()
            .unwrap_or_default();
        if age >= p.min_account_age {
            return Decision::Allow;
        }

        let reason = Reason::new(ViolationKind::NewAccount, REASON_NEW_ACCOUNT);
        let ban = match p.new_account_rule {
            NewAccountRule::Ban => true,
            NewAccountRule::Kick => false,
            NewAccountRule::Tiered { ban_below } => age < ban_below,
        };
        tracing::debug!(
            user_id = member.user_id,
            age_secs = age.as_secs(),
            ban,
            "engine: account younger than minimum"
        );
        if ban {
            Decision::Ban { reason, delete_message: None }
        } else {
            Decision::Kick { reason }
        }
    }

    /* --------- MESSAGE --------- */

    pub fn evaluate_message(&self, msg: &MessageCreated, now: DateTime<Utc>) -> Decision {
        let p = &self.policy;

        if let Some(kw) = p.flagged_name(&msg.author_display_name) {
            return Decision::Ban {
                reason: Reason::new(ViolationKind::Identity, REASON_IDENTITY)
                    .with_keyword(kw.display.clone()),
                delete_message: None,
            };
        }

        if let Some(kw) = p.banned_content(&msg.text) {
            return Decision::Ban {
                reason: Reason::new(ViolationKind::Content, REASON_CONTENT)
                    .with_keyword(kw.display.clone()),
                delete_message: Some(MessageRef {
                    channel_id: msg.channel_id,
                    message_id: msg.message_id,
                }),
            };
        }

        self.check_spam(msg, now)
    }

    /// Okno K identycznych wiadomości + cooldown na ponowne ostrzeżenie.
    pub fn check_spam(&self, msg: &MessageCreated, now: DateTime<Utc>) -> Decision {
        let p = &self.policy;
        if p.is_spam_excluded(msg.channel_id) {
            return Decision::Allow;
        }

        let cap = self.store.window();
        let warned = self.store.with_user(msg.author_id, |st| {
            st.push_message(&msg.text, cap);
            if st.window_is_uniform(cap) && st.cooldown_elapsed(now, p.spam_cooldown) {
                st.clear_window();
                st.last_warning_at = Some(now);
                true
            } else {
                false
            }
        });

        if !warned {
            return Decision::Allow;
        }

        tracing::info!(
            user_id = msg.author_id,
            channel_id = msg.channel_id,
            "engine: identical message streak"
        );
        Decision::Timeout {
            duration: p.spam_cooldown,
            reason: Reason::new(ViolationKind::Spam, REASON_SPAM),
            channel_id: Some(msg.channel_id),
        }
    }
}
