//! National Stock Exchange adapter.
//!
//! NSE publishes the UDiFF common bhavcopy through its reports API. The API
//! checks for cookies set by the home page, so the session warms up there
//! first. Depending on the day the API returns the zip itself or a JSON
//! document naming the archive path.

use super::{absolutize, Exchange, ExchangeAdapter, BROWSER_USER_AGENT};
use crate::columns::ColumnMap;
use chrono::NaiveDate;
use serde_json::Value;

const HOME_URL: &str = "https://www.nseindia.com";
const REPORTS_API_URL: &str = "https://www.nseindia.com/api/reports";
const ARCHIVE_HOST: &str = "https://nsearchives.nseindia.com";
const REFERER: &str = "https://www.nseindia.com/all-reports";

/// Report descriptor for the final UDiFF common bhavcopy zip.
const UDIFF_ARCHIVE: &str = r#"[{"name":"CM-UDiFF Common Bhavcopy Final (zip)","type":"daily-reports","category":"capital-market","section":"equities"}]"#;

/// Keys under which the reports API has been seen to name the file.
const PATH_KEYS: [&str; 5] = ["filePath", "path", "file", "url", "link"];

#[derive(Debug, Clone)]
pub struct NseAdapter {
    pub home_url: String,
    pub api_url: String,
    pub archive_host: String,
}

impl Default for NseAdapter {
    fn default() -> Self {
        Self {
            home_url: HOME_URL.to_string(),
            api_url: REPORTS_API_URL.to_string(),
            archive_host: ARCHIVE_HOST.to_string(),
        }
    }
}

impl NseAdapter {
    /// Date as the reports API expects it: `15-Mar-2024`.
    pub fn format_date(date: NaiveDate) -> String {
        date.format("%d-%b-%Y").to_string()
    }
}

impl ExchangeAdapter for NseAdapter {
    fn exchange(&self) -> Exchange {
        Exchange::Nse
    }

    fn warm_up_url(&self) -> Option<String> {
        Some(self.home_url.clone())
    }

    fn headers(&self) -> Vec<(String, String)> {
        vec![
            ("User-Agent".into(), BROWSER_USER_AGENT.into()),
            ("Accept".into(), "*/*".into()),
            ("Referer".into(), REFERER.into()),
            ("X-Requested-With".into(), "XMLHttpRequest".into()),
        ]
    }

    fn archive_url(&self, date: NaiveDate) -> String {
        let date = Self::format_date(date);
        let params = [
            ("archives", UDIFF_ARCHIVE),
            ("date", date.as_str()),
            ("type", "equities"),
            ("mode", "single"),
        ];
        match reqwest::Url::parse_with_params(&self.api_url, &params) {
            Ok(url) => url.into(),
            Err(_) => {
                let query: Vec<String> = params.iter().map(|(k, v)| format!("{k}={v}")).collect();
                format!("{}?{}", self.api_url, query.join("&"))
            }
        }
    }

    fn resolve_metadata(&self, metadata: &Value) -> Option<String> {
        find_path(metadata).map(|p| absolutize(&self.archive_host, p))
    }

    fn default_columns(&self) -> ColumnMap {
        ColumnMap::identity()
    }
}

fn find_path(value: &Value) -> Option<&str> {
    match value {
        Value::Object(map) => PATH_KEYS
            .iter()
            .filter_map(|k| map.get(*k).and_then(Value::as_str))
            .map(str::trim)
            .find(|s| !s.is_empty())
            .or_else(|| map.get("data").and_then(find_path)),
        Value::Array(items) => items.iter().find_map(find_path),
        _ => None,
    }
}
