//! Per-fetch HTTP sessions.
//!
//! A session is the connection context for one lookback loop: default
//! headers for the exchange and a cookie jar that survives between the
//! warm-up request and the data requests. The fetcher opens one session per
//! `fetch` call and drops it when the loop ends; nothing is shared across
//! calls.

use crate::error::{FetchError, TransportError};
use crate::exchange::ExchangeAdapter;
use crate::response::HttpResponse;
use reqwest::header::{HeaderMap, HeaderName, HeaderValue, CONTENT_TYPE};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One open connection context.
pub trait HttpSession {
    fn get(&mut self, url: &str) -> Result<HttpResponse, TransportError>;
}

/// Opens sessions configured for an exchange.
pub trait SessionFactory {
    type Session: HttpSession;

    fn open(&self, adapter: &dyn ExchangeAdapter) -> Result<Self::Session, FetchError>;
}

/// HTTP settings shared by every session a factory opens.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct HttpConfig {
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
    /// Overrides the adapter's user agent when set.
    pub user_agent: Option<String>,
}

impl Default for HttpConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 20,
            user_agent: None,
        }
    }
}

/// Opens blocking reqwest sessions with a cookie store.
#[derive(Debug, Clone, Default)]
pub struct ReqwestSessionFactory {
    config: HttpConfig,
}

impl ReqwestSessionFactory {
    pub fn new(config: HttpConfig) -> Self {
        Self { config }
    }
}

impl SessionFactory for ReqwestSessionFactory {
    type Session = ReqwestSession;

    fn open(&self, adapter: &dyn ExchangeAdapter) -> Result<ReqwestSession, FetchError> {
        let mut headers = HeaderMap::new();
        for (name, value) in adapter.headers() {
            let name = HeaderName::from_bytes(name.as_bytes())
                .map_err(|e| FetchError::Session(format!("invalid header name '{name}': {e}")))?;
            let value = HeaderValue::from_str(&value)
                .map_err(|e| FetchError::Session(format!("invalid header value for '{name}': {e}")))?;
            headers.insert(name, value);
        }
        if let Some(ua) = &self.config.user_agent {
            let value = HeaderValue::from_str(ua)
                .map_err(|e| FetchError::Session(format!("invalid user agent: {e}")))?;
            headers.insert(reqwest::header::USER_AGENT, value);
        }

        let client = reqwest::blocking::Client::builder()
            .default_headers(headers)
            .cookie_store(true)
            .timeout(Duration::from_secs(self.config.timeout_secs))
            .build()
            .map_err(|e| FetchError::Session(e.to_string()))?;

        Ok(ReqwestSession { client })
    }
}

/// Blocking session; cookies set by one response are sent with the next.
pub struct ReqwestSession {
    client: reqwest::blocking::Client,
}

impl HttpSession for ReqwestSession {
    fn get(&mut self, url: &str) -> Result<HttpResponse, TransportError> {
        let resp = self.client.get(url).send().map_err(transport_error)?;

        let status = resp.status().as_u16();
        let content_type = resp
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|h| h.to_str().ok())
            .map(str::to_string);
        let body = resp.bytes().map_err(transport_error)?.to_vec();

        Ok(HttpResponse {
            status,
            content_type,
            body,
        })
    }
}

fn transport_error(e: reqwest::Error) -> TransportError {
    if e.is_timeout() {
        TransportError::Timeout(e.to_string())
    } else if e.is_connect() {
        TransportError::Connect(e.to_string())
    } else {
        TransportError::Other(e.to_string())
    }
}
