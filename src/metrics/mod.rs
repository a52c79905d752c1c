//! Metrics Synchronizer – statystyki sieci Karlsen w nazwach kanałów.
//!
//! Start: max supply pobierane raz (błąd = brak startu), potem pętla co `interval`.
//! Każda metryka jest izolowana: błąd pobrania/formatowania/zmiany nazwy nie przerywa cyklu.

pub mod format;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;

use crate::config::{BindingConfig, MetricsConfig};
use crate::error::{PlatformError, PlatformResult, ProviderError};
use crate::executor::ActionExecutor;
use crate::provider::{DataProvider, MetricSource, MetricValue};

pub use format::{FormatError, Formatter};

/// Metryka publikowana w nazwie kanału.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MetricKey {
    Price,
    CirculatingSupply,
    MinedPercent,
    Hashrate,
    BlockReward,
    NextReward,
    NextReduction,
    MarketCap,
    Volume24h,
}

impl MetricKey {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Price => "price",
            Self::CirculatingSupply => "circulating_supply",
            Self::MinedPercent => "mined_percent",
            Self::Hashrate => "hashrate",
            Self::BlockReward => "block_reward",
            Self::NextReward => "next_reward",
            Self::NextReduction => "next_reduction",
            Self::MarketCap => "market_cap",
            Self::Volume24h => "volume_24h",
        }
    }

    pub fn source(self) -> MetricSource {
        match self {
            Self::Price => MetricSource::Price,
            Self::CirculatingSupply | Self::MinedPercent => MetricSource::CirculatingSupply,
            Self::Hashrate => MetricSource::Hashrate,
            Self::BlockReward => MetricSource::BlockReward,
            Self::NextReward | Self::NextReduction => MetricSource::Halving,
            Self::MarketCap => MetricSource::MarketCap,
            Self::Volume24h => MetricSource::Volume24h,
        }
    }

    pub fn default_formatter(self) -> Formatter {
        match self {
            Self::Price => Formatter::Currency { decimals: 6 },
            Self::CirculatingSupply => Formatter::Scaled {
                divisor: 1e9,
                unit: "billion".into(),
                decimals: 4,
            },
            Self::MinedPercent => Formatter::Percentage { decimals: 2 },
            Self::Hashrate => Formatter::Hashrate,
            Self::BlockReward => Formatter::Fixed {
                decimals: 3,
                suffix: None,
            },
            Self::NextReward => Formatter::HalvingAmount,
            Self::NextReduction => Formatter::HalvingDate,
            Self::MarketCap => Formatter::Scaled {
                divisor: 1e6,
                unit: "million $".into(),
                decimals: 2,
            },
            Self::Volume24h => Formatter::Currency { decimals: 1 },
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct MetricBinding {
    pub key: MetricKey,
    pub channel_id: u64,
    pub label: String,
    pub formatter: Formatter,
    pub last_known_value: Option<String>,
}

impl MetricBinding {
    pub fn from_config(c: &BindingConfig) -> Self {
        Self {
            key: c.key,
            channel_id: c.channel_id,
            label: c.label.clone(),
            formatter: c.formatter.clone().unwrap_or_else(|| c.key.default_formatter()),
            last_known_value: None,
        }
    }

    /// "Price: 0.001200 $"; pusta etykieta = sama wartość.
    pub fn render(&self, value: &MetricValue, max_supply: Option<f64>) -> Result<String, FormatError> {
        let v = self.formatter.format(value, max_supply)?;
        let label = self.label.trim();
        Ok(if label.is_empty() { v } else { format!("{label} {v}") })
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CycleReport {
    pub updated: usize,
    pub skipped: usize,
    pub failed: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Updated,
    Unchanged,
    Failed,
}

pub struct MetricsSync {
    provider: Arc<dyn DataProvider>,
    executor: Arc<dyn ActionExecutor>,
    cfg: MetricsConfig,
    max_supply: f64,
    bindings: Mutex<Vec<MetricBinding>>,
    max_supply_channel: AtomicU64,
    members_channel: AtomicU64,
    started: AtomicBool,
}

impl MetricsSync {
    /// Pobiera max supply; błąd jest fatalny dla startu.
    pub async fn bootstrap(
        provider: Arc<dyn DataProvider>,
        executor: Arc<dyn ActionExecutor>,
        cfg: MetricsConfig,
    ) -> Result<Self, ProviderError> {
        let max_supply = match provider.fetch(MetricSource::MaxSupply).await? {
            MetricValue::Number(n) if n > 0.0 => n,
            other => {
                return Err(ProviderError::Malformed(format!(
                    "max supply must be a positive number, got {other:?}"
                )));
            }
        };
        tracing::info!(max_supply, "metrics: max supply fetched");
        Ok(Self::with_max_supply(provider, executor, cfg, max_supply))
    }

    pub fn with_max_supply(
        provider: Arc<dyn DataProvider>,
        executor: Arc<dyn ActionExecutor>,
        cfg: MetricsConfig,
        max_supply: f64,
    ) -> Self {
        let bindings = cfg.bindings.iter().map(MetricBinding::from_config).collect();
        Self {
            provider,
            executor,
            max_supply,
            bindings: Mutex::new(bindings),
            max_supply_channel: AtomicU64::new(cfg.max_supply_channel_id),
            members_channel: AtomicU64::new(cfg.members.channel_id),
            started: AtomicBool::new(false),
            cfg,
        }
    }

    pub fn max_supply(&self) -> f64 {
        self.max_supply
    }

    pub async fn bindings(&self) -> Vec<MetricBinding> {
        self.bindings.lock().await.clone()
    }

    pub fn max_supply_label(&self) -> String {
        format!("{} {:.3} billion", self.cfg.max_supply_label.trim(), self.max_supply / 1e9)
    }

    /// Jednorazowo po READY: nazwa kategorii + Max Supply.
    pub async fn announce(&self) {
        if let (Some(name), cat) = (&self.cfg.category_name, self.cfg.category_id) {
            if cat != 0 {
                if let Err(e) = self.push_label(cat, name).await {
                    tracing::warn!(error = %e, channel_id = cat, "metrics: category rename failed");
                }
            }
        }

        let ch = self.max_supply_channel.load(Ordering::Relaxed);
        if ch != 0 {
            let label = self.max_supply_label();
            match self.push_label(ch, &label).await {
                Ok(()) => tracing::info!(channel_id = ch, %label, "metrics: max supply published"),
                Err(e) => tracing::warn!(error = %e, channel_id = ch, "metrics: max supply publish failed"),
            }
        }
    }

    /// Jeden przebieg po wszystkich bindingach.
    pub async fn run_cycle(&self) -> CycleReport {
        let snapshot = self.bindings().await;
        let mut fetched: HashMap<MetricSource, MetricValue> = HashMap::new();
        let mut report = CycleReport::default();

        tracing::info!(bindings = snapshot.len(), "metrics: cycle started");
        for binding in &snapshot {
            match self.sync_binding(binding, &mut fetched).await {
                Outcome::Updated => report.updated += 1,
                Outcome::Unchanged => report.skipped += 1,
                Outcome::Failed => report.failed += 1,
            }
        }
        tracing::info!(
            updated = report.updated,
            skipped = report.skipped,
            failed = report.failed,
            "metrics: cycle finished"
        );
        report
    }

    async fn sync_binding(
        &self,
        binding: &MetricBinding,
        fetched: &mut HashMap<MetricSource, MetricValue>,
    ) -> Outcome {
        let metric = binding.key.as_str();
        let source = binding.key.source();

        // jedno źródło (np. circulating) zasila kilka bindingów – pobieramy raz na cykl
        let value = match fetched.get(&source) {
            Some(v) => v.clone(),
            None => match self.provider.fetch(source).await {
                Ok(v) => {
                    fetched.insert(source, v.clone());
                    v
                }
                Err(e) => {
                    tracing::warn!(error = %e, metric, "metrics: fetch failed, skipping");
                    return Outcome::Failed;
                }
            },
        };

        let label = match binding.render(&value, Some(self.max_supply)) {
            Ok(l) => l,
            Err(e) => {
                tracing::warn!(error = %e, metric, "metrics: malformed data, skipping");
                return Outcome::Failed;
            }
        };

        if self.cfg.skip_unchanged && binding.last_known_value.as_deref() == Some(label.as_str()) {
            tracing::debug!(metric, %label, "metrics: unchanged");
            return Outcome::Unchanged;
        }

        match self.push_label(binding.channel_id, &label).await {
            Ok(()) => {
                tracing::info!(metric, channel_id = binding.channel_id, %label, "metrics: label updated");
                self.remember(binding.key, binding.channel_id, label).await;
                Outcome::Updated
            }
            Err(e) => {
                tracing::warn!(error = %e, metric, channel_id = binding.channel_id, "metrics: label push failed");
                Outcome::Failed
            }
        }
    }

    async fn remember(&self, key: MetricKey, channel_id: u64, label: String) {
        let mut guard = self.bindings.lock().await;
        if let Some(b) = guard
            .iter_mut()
            .find(|b| b.key == key && b.channel_id == channel_id)
        {
            b.last_known_value = Some(label);
        }
    }

    /// Zmiana nazwy kanału z ograniczoną liczbą ponowień po 429.
    pub async fn push_label(&self, channel_id: u64, text: &str) -> PlatformResult<()> {
        let mut retries = 0u32;
        loop {
            match self.executor.set_channel_display_name(channel_id, text).await {
                Ok(()) => return Ok(()),
                Err(PlatformError::RateLimited { retry_after })
                    if retries < self.cfg.max_rate_limit_retries =>
                {
                    let wait = retry_after.unwrap_or_else(|| self.cfg.rate_limit_fallback());
                    retries += 1;
                    tracing::warn!(channel_id, wait_secs = wait.as_secs_f64(), retries, "metrics: rate limited, retrying");
                    tokio::time::sleep(wait).await;
                }
                Err(e) => return Err(e),
            }
        }
    }

    /// "Members: N" dla roli z konfiguracji.
    pub async fn update_member_count(&self) -> PlatformResult<usize> {
        let m = &self.cfg.members;
        let channel_id = self.members_channel.load(Ordering::Relaxed);
        if m.role_id == 0 || channel_id == 0 {
            return Ok(0);
        }
        let count = self.executor.count_role_members(m.role_id).await?;
        let label = format!("{} {count}", m.label.trim());
        self.push_label(channel_id, &label).await?;
        tracing::info!(channel_id, count, "metrics: member count updated");
        Ok(count)
    }

    /// Kanał odtworzony pod nowym id – przepnij wszystko, co na niego pisało.
    pub async fn rebind(&self, old_channel: u64, new_channel: u64) -> bool {
        let mut hit = false;
        for b in self.bindings.lock().await.iter_mut() {
            if b.channel_id == old_channel {
                b.channel_id = new_channel;
                b.last_known_value = None;
                hit = true;
            }
        }
        for target in [&self.max_supply_channel, &self.members_channel] {
            if target
                .compare_exchange(old_channel, new_channel, Ordering::Relaxed, Ordering::Relaxed)
                .is_ok()
            {
                hit = true;
            }
        }
        if hit {
            tracing::info!(old_channel, new_channel, "metrics: binding moved to recreated channel");
        }
        hit
    }

    /// Uruchamia pętle w tle; tylko raz na proces (READY bywa wysyłane ponownie).
    pub fn spawn(self: &Arc<Self>) -> bool {
        if !self.cfg.enabled || self.started.swap(true, Ordering::SeqCst) {
            return false;
        }

        let sync = self.clone();
        tokio::spawn(async move {
            sync.announce().await;
            loop {
                sync.run_cycle().await;
                tokio::time::sleep(sync.cfg.interval()).await;
            }
        });

        let m = &self.cfg.members;
        if m.role_id != 0 && m.channel_id != 0 {
            let sync = self.clone();
            let every = std::time::Duration::from_secs(m.interval_secs.max(1));
            tokio::spawn(async move {
                loop {
                    if let Err(e) = sync.update_member_count().await {
                        tracing::warn!(error = %e, "metrics: member count update failed");
                    }
                    tokio::time::sleep(every).await;
                }
            });
        }

        tracing::info!(interval_secs = self.cfg.interval_secs, "metrics: background loops started");
        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_label_renders_value_only() {
        let b = MetricBinding {
            key: MetricKey::NextReduction,
            channel_id: 1,
            label: String::new(),
            formatter: Formatter::HalvingDate,
            last_known_value: None,
        };
        let v = MetricValue::Json(serde_json::json!({"nextHalvingDate": "2030-01-01"}));
        assert_eq!(b.render(&v, None).unwrap(), "2030-01-01");
    }

    #[test]
    fn default_formatters_follow_key() {
        let cfg = BindingConfig {
            key: MetricKey::MarketCap,
            channel_id: 9,
            label: "mcap:".into(),
            formatter: None,
        };
        let b = MetricBinding::from_config(&cfg);
        assert_eq!(b.render(&MetricValue::Number(12_500_000.0), None).unwrap(), "mcap: 12.50 million $");
        assert_eq!(MetricKey::MinedPercent.source(), MetricSource::CirculatingSupply);
    }
}
