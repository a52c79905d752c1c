//! Log usuniętych wiadomości.
//!
//! Gateway przy MESSAGE_DELETE nie podaje treści, więc trzymamy ostatnie wiadomości
//! w ograniczonym cache (moka) i przy usunięciu wrzucamy je do audytu.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;

use crate::audit::{AuditEntry, AuditSink};
use crate::events::{MessageCreated, MessageDeleted};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachedMessage {
    pub author_id: u64,
    pub channel_id: u64,
    pub text: String,
}

pub struct MessageLog {
    cache: Cache<u64, CachedMessage>,
    audit: Arc<dyn AuditSink>,
}

impl MessageLog {
    pub fn new(audit: Arc<dyn AuditSink>, capacity: u64, ttl: Duration) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(capacity.max(1))
                .time_to_live(ttl)
                .build(),
            audit,
        }
    }

    pub async fn remember(&self, m: &MessageCreated) {
        if m.text.trim().is_empty() {
            return;
        }
        self.cache
            .insert(
                m.message_id,
                CachedMessage {
                    author_id: m.author_id,
                    channel_id: m.channel_id,
                    text: m.text.clone(),
                },
            )
            .await;
    }

    /// Zwraca zalogowaną wiadomość (None = nie było jej w cache).
    pub async fn on_delete(&self, ev: &MessageDeleted) -> Option<CachedMessage> {
        let Some(m) = self.cache.remove(&ev.message_id).await else {
            tracing::debug!(channel_id = ev.channel_id, message_id = ev.message_id, "msglog: deleted message not cached");
            return None;
        };

        let text = format!(
            "User <@{}> has deleted the following message: {}",
            m.author_id, m.text
        );
        self.audit
            .record(
                &AuditEntry::new("message_deleted", text)
                    .user(m.author_id)
                    .detail(format!("channel <#{}>", m.channel_id)),
            )
            .await;
        Some(m)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serenity::async_trait;
    use tokio::sync::Mutex;

    #[derive(Default)]
    struct Collect(Mutex<Vec<AuditEntry>>);

    #[async_trait]
    impl AuditSink for Collect {
        async fn record(&self, entry: &AuditEntry) {
            self.0.lock().await.push(entry.clone());
        }
    }

    #[tokio::test]
    async fn deleted_message_is_logged_once() {
        let sink = Arc::new(Collect::default());
        let log = MessageLog::new(sink.clone(), 100, Duration::from_secs(3600));
        log.remember(&MessageCreated {
            guild_id: 1,
            channel_id: 2,
            message_id: 3,
            author_id: 4,
            author_display_name: "a".into(),
            text: "hello".into(),
        })
        .await;

        let ev = MessageDeleted {
            channel_id: 2,
            message_id: 3,
        };
        assert!(log.on_delete(&ev).await.is_some());
        assert!(log.on_delete(&ev).await.is_none());

        let entries = sink.0.lock().await;
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].reason, "User <@4> has deleted the following message: hello");
    }
}
