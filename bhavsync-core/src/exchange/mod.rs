//! Exchange adapters.
//!
//! One fetch routine serves both exchanges; everything exchange-specific
//! (archive URL, date format, request headers, warm-up page, metadata
//! resolution, default column names) lives behind `ExchangeAdapter`.

pub mod bse;
pub mod nse;

use crate::columns::ColumnMap;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub use bse::BseAdapter;
pub use nse::NseAdapter;

/// Browser-like user agent; both exchanges reject obvious bots.
pub const BROWSER_USER_AGENT: &str =
    "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/124.0 Safari/537.36";

/// Supported exchanges.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Exchange {
    /// National Stock Exchange of India.
    Nse,
    /// BSE (Bombay Stock Exchange).
    Bse,
}

impl Exchange {
    pub const ALL: [Exchange; 2] = [Exchange::Nse, Exchange::Bse];

    /// Default adapter for this exchange.
    pub fn adapter(self) -> Box<dyn ExchangeAdapter> {
        match self {
            Exchange::Nse => Box::new(NseAdapter::default()),
            Exchange::Bse => Box::new(BseAdapter::default()),
        }
    }
}

impl fmt::Display for Exchange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Exchange::Nse => f.write_str("NSE"),
            Exchange::Bse => f.write_str("BSE"),
        }
    }
}

impl FromStr for Exchange {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "nse" => Ok(Exchange::Nse),
            "bse" => Ok(Exchange::Bse),
            _ => Err(format!("unknown exchange '{s}'. Valid: nse, bse")),
        }
    }
}

/// Everything the fetcher needs to know about one exchange.
pub trait ExchangeAdapter: Send + Sync {
    fn exchange(&self) -> Exchange;

    /// Page to request once per session before any data request, so the
    /// exchange hands out the cookies its bot checks expect.
    fn warm_up_url(&self) -> Option<String>;

    /// Headers sent with every request in the session.
    fn headers(&self) -> Vec<(String, String)>;

    /// Location of the bhavcopy for `date`.
    fn archive_url(&self, date: NaiveDate) -> String;

    /// Follow-up URL named by a JSON metadata response, if the adapter
    /// understands the shape.
    fn resolve_metadata(&self, metadata: &serde_json::Value) -> Option<String>;

    /// Column renames applied when the caller doesn't supply its own.
    fn default_columns(&self) -> ColumnMap;
}

/// Join `path` onto `base` unless it is already absolute.
pub(crate) fn absolutize(base: &str, path: &str) -> String {
    let path = path.trim();
    if path.starts_with("http://") || path.starts_with("https://") {
        return path.to_string();
    }
    format!(
        "{}/{}",
        base.trim_end_matches('/'),
        path.trim_start_matches('/')
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exchange_parse_and_display() {
        assert_eq!("NSE".parse::<Exchange>().unwrap(), Exchange::Nse);
        assert_eq!(" bse ".parse::<Exchange>().unwrap(), Exchange::Bse);
        assert!("lse".parse::<Exchange>().is_err());
        assert_eq!(Exchange::Bse.to_string(), "BSE");
    }

    #[test]
    fn adapters_match_their_exchange() {
        for ex in Exchange::ALL {
            assert_eq!(ex.adapter().exchange(), ex);
        }
    }

    #[test]
    fn absolutize_paths() {
        assert_eq!(
            absolutize("https://a.example/", "/content/x.zip"),
            "https://a.example/content/x.zip"
        );
        assert_eq!(
            absolutize("https://a.example", "https://b.example/y.zip"),
            "https://b.example/y.zip"
        );
    }
}
