//! Structured error types for fetch operations.
//!
//! Transient errors describe a single candidate date that could not be
//! resolved; the fetcher moves on to the next candidate when it sees one.
//! Fatal errors end the run and are what callers of `BhavcopyFetcher::fetch`
//! actually receive.

use crate::exchange::Exchange;
use chrono::NaiveDate;
use thiserror::Error;

/// Errors produced while resolving a bhavcopy.
///
/// Designed to be displayable directly in CLI output.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error for {date}: {reason}")]
    Network { date: NaiveDate, reason: String },

    #[error("bhavcopy for {date} not available yet: {reason}")]
    NotAvailableYet { date: NaiveDate, reason: String },

    #[error("malformed archive for {date}: {reason}")]
    MalformedArchive { date: NaiveDate, reason: String },

    #[error(
        "schema mismatch in bhavcopy for {date}: missing columns [{}] (found [{}]; tried {})",
        .missing.join(", "),
        .found.join(", "),
        format_dates(.tried)
    )]
    SchemaMismatch {
        date: NaiveDate,
        missing: Vec<String>,
        found: Vec<String>,
        tried: Vec<NaiveDate>,
    },

    #[error(
        "no {exchange} bhavcopy found after trying {}{}",
        format_dates(.tried),
        .last_reason.as_deref().map(|r| format!(" (last failure: {r})")).unwrap_or_default()
    )]
    LookbackExhausted {
        exchange: Exchange,
        tried: Vec<NaiveDate>,
        last_reason: Option<String>,
    },

    #[error("invalid fetch request: {0}")]
    Config(String),

    #[error("could not open HTTP session: {0}")]
    Session(String),
}

impl FetchError {
    /// Whether the fetcher should move on to the next candidate date.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            FetchError::Network { .. }
                | FetchError::NotAvailableYet { .. }
                | FetchError::MalformedArchive { .. }
        )
    }

    /// Candidate date this error is bound to, if any.
    pub fn date(&self) -> Option<NaiveDate> {
        match self {
            FetchError::Network { date, .. }
            | FetchError::NotAvailableYet { date, .. }
            | FetchError::MalformedArchive { date, .. }
            | FetchError::SchemaMismatch { date, .. } => Some(*date),
            _ => None,
        }
    }
}

/// Transport-level failure: the request never produced an HTTP response.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("connection failed: {0}")]
    Connect(String),

    #[error("request failed: {0}")]
    Other(String),
}

fn format_dates(dates: &[NaiveDate]) -> String {
    if dates.is_empty() {
        return "no candidate dates".to_string();
    }
    let list: Vec<String> = dates.iter().map(|d| d.to_string()).collect();
    list.join(", ")
}
