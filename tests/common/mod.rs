#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serenity::async_trait;
use tokio::sync::Mutex;

use karlsen_guard::audit::{AuditEntry, AuditSink};
use karlsen_guard::error::{PlatformError, PlatformResult, ProviderError};
use karlsen_guard::executor::{ActionExecutor, NewChannel, RecentMessage};
use karlsen_guard::provider::{DataProvider, MetricSource, MetricValue};

#[derive(Debug, Clone, PartialEq)]
pub enum Call {
    Dm { user: u64, text: String },
    Say { channel: u64, text: String },
    Delete { channel: u64, message: u64 },
    Timeout { user: u64, secs: u64 },
    Kick { user: u64 },
    Ban { user: u64 },
    Rename { channel: u64, text: String },
    AddRole { user: u64, role: u64 },
    CreateChannel { name: String, parent: Option<u64> },
}

#[derive(Default)]
pub struct MockExecutor {
    pub calls: Mutex<Vec<Call>>,
    pub dm_error: Mutex<Option<PlatformError>>,
    /// message_id -> błąd przy usuwaniu
    pub delete_errors: Mutex<HashMap<u64, PlatformError>>,
    /// kolejne błędy zmiany nazwy (po jednym na wywołanie)
    pub rename_errors: Mutex<VecDeque<PlatformError>>,
    /// jeśli ustawione – każda zmiana nazwy kończy się tym błędem
    pub rename_always: Mutex<Option<PlatformError>>,
    pub channels: Mutex<Vec<u64>>,
    pub history: Mutex<HashMap<u64, Vec<RecentMessage>>>,
    pub history_errors: Mutex<HashMap<u64, PlatformError>>,
    pub role_members: Mutex<usize>,
    pub next_channel_id: AtomicU64,
}

impl MockExecutor {
    pub async fn calls(&self) -> Vec<Call> {
        self.calls.lock().await.clone()
    }

    pub async fn renames(&self) -> Vec<(u64, String)> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|c| match c {
                Call::Rename { channel, text } => Some((*channel, text.clone())),
                _ => None,
            })
            .collect()
    }

    pub async fn dms(&self) -> Vec<String> {
        self.calls
            .lock()
            .await
            .iter()
            .filter_map(|c| match c {
                Call::Dm { text, .. } => Some(text.clone()),
                _ => None,
            })
            .collect()
    }
}

#[async_trait]
impl ActionExecutor for MockExecutor {
    async fn send_direct_message(&self, user_id: u64, text: &str) -> PlatformResult<()> {
        self.calls.lock().await.push(Call::Dm {
            user: user_id,
            text: text.into(),
        });
        match self.dm_error.lock().await.clone() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn send_channel_message(&self, channel_id: u64, text: &str) -> PlatformResult<u64> {
        self.calls.lock().await.push(Call::Say {
            channel: channel_id,
            text: text.into(),
        });
        Ok(900_000 + channel_id)
    }

    async fn delete_message(&self, channel_id: u64, message_id: u64) -> PlatformResult<()> {
        self.calls.lock().await.push(Call::Delete {
            channel: channel_id,
            message: message_id,
        });
        match self.delete_errors.lock().await.get(&message_id) {
            Some(e) => Err(e.clone()),
            None => Ok(()),
        }
    }

    async fn timeout_user(&self, user_id: u64, duration: Duration, _reason: &str) -> PlatformResult<()> {
        self.calls.lock().await.push(Call::Timeout {
            user: user_id,
            secs: duration.as_secs(),
        });
        Ok(())
    }

    async fn kick_user(&self, user_id: u64, _reason: &str) -> PlatformResult<()> {
        self.calls.lock().await.push(Call::Kick { user: user_id });
        Ok(())
    }

    async fn ban_user(&self, user_id: u64, _reason: &str) -> PlatformResult<()> {
        self.calls.lock().await.push(Call::Ban { user: user_id });
        Ok(())
    }

    async fn set_channel_display_name(&self, channel_id: u64, text: &str) -> PlatformResult<()> {
        self.calls.lock().await.push(Call::Rename {
            channel: channel_id,
            text: text.into(),
        });
        if let Some(e) = self.rename_always.lock().await.clone() {
            return Err(e);
        }
        match self.rename_errors.lock().await.pop_front() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    async fn fetch_recent_messages(
        &self,
        channel_id: u64,
        since: DateTime<Utc>,
        limit: usize,
    ) -> PlatformResult<Vec<RecentMessage>> {
        if let Some(e) = self.history_errors.lock().await.get(&channel_id) {
            return Err(e.clone());
        }
        Ok(self
            .history
            .lock()
            .await
            .get(&channel_id)
            .map(|v| {
                v.iter()
                    .filter(|m| m.created_at >= since)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn list_text_channels(&self) -> PlatformResult<Vec<u64>> {
        Ok(self.channels.lock().await.clone())
    }

    async fn count_role_members(&self, _role_id: u64) -> PlatformResult<usize> {
        Ok(*self.role_members.lock().await)
    }

    async fn add_role(&self, user_id: u64, role_id: u64, _reason: &str) -> PlatformResult<()> {
        self.calls.lock().await.push(Call::AddRole {
            user: user_id,
            role: role_id,
        });
        Ok(())
    }

    async fn create_channel(&self, spec: &NewChannel) -> PlatformResult<u64> {
        self.calls.lock().await.push(Call::CreateChannel {
            name: spec.name.clone(),
            parent: spec.parent_id,
        });
        Ok(self.next_channel_id.fetch_add(1, Ordering::SeqCst) + 5_000)
    }
}

/// Provider z tabeli; brak wpisu albo `Err` = błąd „malformed”.
#[derive(Default)]
pub struct MockProvider {
    pub values: Mutex<HashMap<MetricSource, Result<MetricValue, String>>>,
    pub fetches: Mutex<Vec<MetricSource>>,
    pub balance: Mutex<Option<f64>>,
}

impl MockProvider {
    pub fn with(values: Vec<(MetricSource, Result<MetricValue, String>)>) -> Self {
        Self {
            values: Mutex::new(values.into_iter().collect()),
            ..Default::default()
        }
    }
}

#[async_trait]
impl DataProvider for MockProvider {
    async fn fetch(&self, source: MetricSource) -> Result<MetricValue, ProviderError> {
        self.fetches.lock().await.push(source);
        match self.values.lock().await.get(&source) {
            Some(Ok(v)) => Ok(v.clone()),
            Some(Err(msg)) => Err(ProviderError::Malformed(msg.clone())),
            None => Err(ProviderError::Status {
                status: 503,
                url: format!("mock://{}", source.as_str()),
            }),
        }
    }

    async fn wallet_balance(&self, _address: &str) -> Result<f64, ProviderError> {
        self.balance
            .lock()
            .await
            .ok_or_else(|| ProviderError::Malformed("no balance".into()))
    }
}

#[derive(Default)]
pub struct CollectAudit {
    pub entries: Mutex<Vec<AuditEntry>>,
}

#[async_trait]
impl AuditSink for CollectAudit {
    async fn record(&self, entry: &AuditEntry) {
        self.entries.lock().await.push(entry.clone());
    }
}
