//! DataProvider – źródła danych sieci Karlsen (REST api.karlsencoin.com + CoinGecko).

use std::time::Duration;

use reqwest::Client;
use serde_json::Value;
use serenity::async_trait;
use url::Url;

use crate::config::MetricsConfig;
use crate::error::ProviderError;

/// Zewnętrzne źródło wartości.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MetricSource {
    MaxSupply,
    CirculatingSupply,
    Hashrate,
    BlockReward,
    Halving,
    Price,
    MarketCap,
    Volume24h,
}

impl MetricSource {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::MaxSupply => "max_supply",
            Self::CirculatingSupply => "circulating_supply",
            Self::Hashrate => "hashrate",
            Self::BlockReward => "block_reward",
            Self::Halving => "halving",
            Self::Price => "price",
            Self::MarketCap => "market_cap",
            Self::Volume24h => "volume_24h",
        }
    }

    /// Ścieżka względem `api_base_url` (Volume24h ma własny URL).
    fn path(self) -> &'static str {
        match self {
            Self::MaxSupply => "info/coinsupply/max",
            Self::CirculatingSupply => "info/coinsupply/circulating?in_billion=false",
            Self::Hashrate => "info/hashrate?stringOnly=false",
            Self::BlockReward => "info/blockreward?stringOnly=false",
            Self::Halving => "info/halving",
            Self::Price => "info/price?stringOnly=false",
            Self::MarketCap => "info/marketcap?stringOnly=false",
            Self::Volume24h => "",
        }
    }
}

/// Surowa wartość z providera.
#[derive(Debug, Clone, PartialEq)]
pub enum MetricValue {
    Number(f64),
    Json(Value),
    Text(String),
}

#[async_trait]
pub trait DataProvider: Send + Sync {
    async fn fetch(&self, source: MetricSource) -> Result<MetricValue, ProviderError>;

    /// Saldo adresu w najmniejszych jednostkach (1 KLS = 1e8).
    async fn wallet_balance(&self, address: &str) -> Result<f64, ProviderError>;
}

/* ==============================
   HTTP (reqwest)
   ============================== */

pub struct HttpDataProvider {
    client: Client,
    base: Url,
    volume_url: Url,
}

impl HttpDataProvider {
    pub fn new(cfg: &MetricsConfig) -> Result<Self, ProviderError> {
        Self::with_urls(&cfg.api_base_url, &cfg.volume_url, cfg.http_timeout())
    }

    pub fn with_urls(base: &str, volume_url: &str, timeout: Duration) -> Result<Self, ProviderError> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("karlsen_guard/", env!("CARGO_PKG_VERSION")))
            .build()?;

        // join() traktuje ostatni segment bez "/" jak plik
        let mut base = base.to_string();
        if !base.ends_with('/') {
            base.push('/');
        }

        Ok(Self {
            client,
            base: Url::parse(&base)?,
            volume_url: Url::parse(volume_url)?,
        })
    }

    pub fn endpoint(&self, source: MetricSource) -> Result<Url, ProviderError> {
        match source {
            MetricSource::Volume24h => Ok(self.volume_url.clone()),
            s => Ok(self.base.join(s.path())?),
        }
    }

    async fn get(&self, url: Url) -> Result<reqwest::Response, ProviderError> {
        let resp = self
            .client
            .get(url.clone())
            .header(reqwest::header::ACCEPT, "application/json")
            .send()
            .await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ProviderError::Status {
                status: status.as_u16(),
                url: url.to_string(),
            });
        }
        Ok(resp)
    }

    async fn get_text(&self, url: Url) -> Result<String, ProviderError> {
        Ok(self.get(url).await?.text().await?)
    }

    async fn get_json(&self, url: Url) -> Result<Value, ProviderError> {
        Ok(self.get(url).await?.json::<Value>().await?)
    }
}

#[async_trait]
impl DataProvider for HttpDataProvider {
    async fn fetch(&self, source: MetricSource) -> Result<MetricValue, ProviderError> {
        let url = self.endpoint(source)?;
        let value = match source {
            MetricSource::MaxSupply | MetricSource::CirculatingSupply => {
                MetricValue::Number(parse_number_text(&self.get_text(url).await?)?)
            }
            MetricSource::Halving => MetricValue::Json(self.get_json(url).await?),
            MetricSource::Volume24h => {
                let body = self.get_json(url).await?;
                MetricValue::Number(number_at(&body, &["market_data", "total_volume", "usd"])?)
            }
            MetricSource::Hashrate => MetricValue::Number(number_at(&self.get_json(url).await?, &["hashrate"])?),
            MetricSource::BlockReward => {
                MetricValue::Number(number_at(&self.get_json(url).await?, &["blockreward"])?)
            }
            MetricSource::Price => MetricValue::Number(number_at(&self.get_json(url).await?, &["price"])?),
            MetricSource::MarketCap => {
                MetricValue::Number(number_at(&self.get_json(url).await?, &["marketcap"])?)
            }
        };
        tracing::debug!(metric = source.as_str(), ?value, "provider: fetched");
        Ok(value)
    }

    async fn wallet_balance(&self, address: &str) -> Result<f64, ProviderError> {
        let url = self.base.join(&format!("addresses/{address}/balance"))?;
        number_at(&self.get_json(url).await?, &["balance"])
    }
}

/* ==============================
   Parsowanie odpowiedzi
   ============================== */

/// Liczba pod ścieżką `path`; akceptuje też liczby zapisane jako string.
pub fn number_at(body: &Value, path: &[&str]) -> Result<f64, ProviderError> {
    let mut cur = body;
    for key in path {
        cur = cur
            .get(key)
            .ok_or_else(|| ProviderError::Malformed(format!("missing field `{}`", path.join("."))))?;
    }
    let n = match cur {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    };
    match n {
        Some(v) if v.is_finite() => Ok(v),
        _ => Err(ProviderError::Malformed(format!(
            "field `{}` is not a number: {cur}",
            path.join(".")
        ))),
    }
}

pub fn parse_number_text(body: &str) -> Result<f64, ProviderError> {
    let t = body.trim().trim_matches('"');
    match t.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(v),
        _ => Err(ProviderError::Malformed(format!("not a number: {t:?}"))),
    }
}
