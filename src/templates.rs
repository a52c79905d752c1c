//! Szablony kanałów: usunięty kanał z listy `[[templates]]` jest odtwarzany,
//! a metryki, które na niego pisały, przepinane na nowe id.

use std::sync::Arc;

use crate::audit::{AuditEntry, AuditSink};
use crate::config::ChannelTemplate;
use crate::events::ChannelDeleted;
use crate::executor::{ActionExecutor, NewChannel};
use crate::metrics::MetricsSync;
use tokio::sync::Mutex;

pub struct ChannelTemplates {
    executor: Arc<dyn ActionExecutor>,
    audit: Arc<dyn AuditSink>,
    metrics: Option<Arc<MetricsSync>>,
    // id zmienia się po każdym odtworzeniu
    templates: Mutex<Vec<ChannelTemplate>>,
}

impl ChannelTemplates {
    pub fn new(
        executor: Arc<dyn ActionExecutor>,
        audit: Arc<dyn AuditSink>,
        metrics: Option<Arc<MetricsSync>>,
        templates: Vec<ChannelTemplate>,
    ) -> Self {
        Self {
            executor,
            audit,
            metrics,
            templates: Mutex::new(templates),
        }
    }

    /// Zwraca id odtworzonego kanału (None = kanał spoza szablonów albo błąd).
    pub async fn on_channel_delete(&self, ev: &ChannelDeleted) -> Option<u64> {
        let mut templates = self.templates.lock().await;
        let tpl = templates.iter_mut().find(|t| t.channel_id == ev.channel_id)?;

        // kategoria z szablonu, a bez niej ta, w której kanał był
        let spec = NewChannel {
            name: tpl.name.clone(),
            kind: tpl.kind,
            parent_id: tpl.parent_id.or(ev.parent_id),
        };

        let created = match self.executor.create_channel(&spec).await {
            Ok(id) => id,
            Err(e) => {
                tracing::warn!(error = %e, channel_id = ev.channel_id, name = %tpl.name, "templates: recreate failed");
                self.audit
                    .record(
                        &AuditEntry::new("template", format!("Recreate of #{} failed", tpl.name))
                            .ok(false)
                            .detail(e.to_string()),
                    )
                    .await;
                return None;
            }
        };

        let old = tpl.channel_id;
        tpl.channel_id = created;
        let name = tpl.name.clone();
        drop(templates);

        tracing::info!(old_channel = old, new_channel = created, %name, "templates: channel recreated");

        let rebound = match &self.metrics {
            Some(m) => m.rebind(old, created).await,
            None => false,
        };

        let detail = if rebound {
            format!("{old} → {created} (metric rebound)")
        } else {
            format!("{old} → {created}")
        };
        self.audit
            .record(&AuditEntry::new("template", format!("Recreated deleted channel #{name}")).detail(detail))
            .await;

        Some(created)
    }

    pub async fn current(&self) -> Vec<ChannelTemplate> {
        self.templates.lock().await.clone()
    }
}
