//! BSE adapter.
//!
//! BSE serves the equity bhavcopy as a static file keyed by date. No warm-up
//! is needed, but requests without a browser user agent and a BSE referer
//! are refused.

use super::{absolutize, Exchange, ExchangeAdapter, BROWSER_USER_AGENT};
use crate::columns::ColumnMap;
use chrono::NaiveDate;
use serde_json::Value;

const DOWNLOAD_BASE: &str = "https://www.bseindia.com/download/BhavCopy/Equity";
const REFERER: &str = "https://www.bseindia.com/";

#[derive(Debug, Clone)]
pub struct BseAdapter {
    pub download_base: String,
}

impl Default for BseAdapter {
    fn default() -> Self {
        Self {
            download_base: DOWNLOAD_BASE.to_string(),
        }
    }
}

impl BseAdapter {
    /// Date as it appears in BSE file names: `20240315`.
    pub fn format_date(date: NaiveDate) -> String {
        date.format("%Y%m%d").to_string()
    }
}

impl ExchangeAdapter for BseAdapter {
    fn exchange(&self) -> Exchange {
        Exchange::Bse
    }

    fn warm_up_url(&self) -> Option<String> {
        None
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("User-Agent".into(), BROWSER_USER_AGENT.into()),
            ("Accept".into(), "*/*".into()),
            ("Referer".into(), REFERER.into()),
        ]
    }

    fn archive_url(&self, date: NaiveDate) -> String {
        format!(
            "{}/BhavCopy_BSE_CM_0_0_0_{}_F_0000.CSV",
            self.download_base.trim_end_matches('/'),
            Self::format_date(date)
        )
    }

    /// BSE does not answer with metadata; a bare string is still followed.
    fn resolve_metadata(&self, metadata: &Value) -> Option<String> {
        metadata
            .as_str()
            .filter(|s| !s.trim().is_empty())
            .map(|p| absolutize(REFERER, p))
    }

    fn default_columns(&self) -> ColumnMap {
        ColumnMap::from_sources("ISIN_CODE", "TRADE_DATE", "SC_NAME", "CLOSE")
    }
}
