//! Błędy na granicach z systemami zewnętrznymi (Discord, API danych).

use std::time::Duration;

use thiserror::Error;

/// Błąd wywołania platformy czatu (REST Discorda).
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PlatformError {
    #[error("forbidden")]
    Forbidden,

    #[error("not found")]
    NotFound,

    #[error("rate limited (retry after {retry_after:?})")]
    RateLimited { retry_after: Option<Duration> },

    #[error("timed out")]
    Timeout,

    #[error("http status {0}")]
    Http(u16),

    #[error("{0}")]
    Other(String),
}

impl PlatformError {
    /// Mapowanie kodu HTTP na klasę błędu.
    pub fn from_status(status: u16) -> Self {
        match status {
            403 => Self::Forbidden,
            404 => Self::NotFound,
            429 => Self::RateLimited { retry_after: None },
            s => Self::Http(s),
        }
    }
}

impl From<serenity::Error> for PlatformError {
    fn from(e: serenity::Error) -> Self {
        match &e {
            serenity::Error::Http(he) => match he.status_code() {
                Some(code) => Self::from_status(code.as_u16()),
                None if e.to_string().contains("timed out") => Self::Timeout,
                None => Self::Other(e.to_string()),
            },
            _ => Self::Other(e.to_string()),
        }
    }
}

pub type PlatformResult<T> = Result<T, PlatformError>;

/// Błąd pobierania danych zewnętrznych (API Karlsen / CoinGecko).
#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("bad endpoint url: {0}")]
    Url(#[from] url::ParseError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_mapping() {
        assert_eq!(PlatformError::from_status(403), PlatformError::Forbidden);
        assert_eq!(PlatformError::from_status(404), PlatformError::NotFound);
        assert_eq!(
            PlatformError::from_status(429),
            PlatformError::RateLimited { retry_after: None }
        );
        assert_eq!(PlatformError::from_status(500), PlatformError::Http(500));
        assert_eq!(PlatformError::Forbidden.to_string(), "forbidden");
    }
}
