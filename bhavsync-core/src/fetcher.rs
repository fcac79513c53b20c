//! The bhavcopy fetch loop.
//!
//! Walks candidate dates newest first. Each candidate gets one request (plus
//! at most one follow-up when the exchange answers with metadata); the first
//! candidate whose response yields a valid table wins. Transient failures
//! move on to the next candidate, a schema mismatch stops the run, and an
//! exhausted window is reported with every date tried.

use crate::archive::extract_table;
use crate::calendar::{
    ReferenceDate, TradeDateCandidate, TradingCalendar, DEFAULT_LOOKBACK_DAYS, MAX_LOOKBACK_DAYS,
};
use crate::columns::{ColumnError, ColumnMap};
use crate::error::{FetchError, TransportError};
use crate::exchange::{Exchange, ExchangeAdapter};
use crate::response::{classify, ResponseKind};
use crate::session::{HttpSession, SessionFactory};
use crate::table::{BhavcopyTable, RawTable};
use chrono::NaiveDate;
use std::time::Duration;

/// What to fetch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    /// Where the candidate walk starts.
    pub reference: ReferenceDate,
    /// Lookback window in calendar days, including the reference date.
    pub lookback_days: u32,
    /// Column renames; the adapter's defaults when `None`.
    pub columns: Option<ColumnMap>,
}

impl Default for FetchRequest {
    fn default() -> Self {
        Self {
            reference: ReferenceDate::Today,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            columns: None,
        }
    }
}

impl FetchRequest {
    pub fn on(date: NaiveDate) -> Self {
        Self {
            reference: ReferenceDate::On(date),
            ..Self::default()
        }
    }

    pub fn with_lookback(mut self, days: u32) -> Self {
        self.lookback_days = days;
        self
    }

    pub fn with_columns(mut self, columns: ColumnMap) -> Self {
        self.columns = Some(columns);
        self
    }

    fn validate(&self) -> Result<(), FetchError> {
        if self.lookback_days == 0 || self.lookback_days > MAX_LOOKBACK_DAYS {
            return Err(FetchError::Config(format!(
                "lookback window must be between 1 and {MAX_LOOKBACK_DAYS} days, got {}",
                self.lookback_days
            )));
        }
        Ok(())
    }
}

/// How one candidate ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttemptOutcome {
    Succeeded { rows: usize },
    Failed { reason: String },
}

/// One candidate date the fetcher tried.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttemptRecord {
    pub date: NaiveDate,
    pub url: String,
    pub outcome: AttemptOutcome,
}

/// A resolved bhavcopy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fetched {
    pub exchange: Exchange,
    /// The candidate date whose file was used.
    pub trade_date: NaiveDate,
    pub table: BhavcopyTable,
    /// URL the table was finally read from (after any metadata hop).
    pub source_url: String,
    /// Name of the archive entry, when the table came out of a zip.
    pub entry_name: Option<String>,
    /// Every attempt, oldest first; the last one succeeded.
    pub attempts: Vec<AttemptRecord>,
}

/// Progress callbacks for a fetch run.
pub trait FetchProgress {
    /// Called before a candidate is requested.
    fn on_attempt(&self, exchange: Exchange, candidate: &TradeDateCandidate, index: usize, total: usize);

    /// Called when a candidate resolves either way.
    fn on_outcome(&self, exchange: Exchange, attempt: &AttemptRecord);

    /// Called once when the run ends.
    fn on_finish(&self, exchange: Exchange, result: Result<&Fetched, &FetchError>);
}

/// Progress reporter that writes to the `log` facade.
pub struct LogProgress;

impl FetchProgress for LogProgress {
    fn on_attempt(&self, exchange: Exchange, candidate: &TradeDateCandidate, index: usize, total: usize) {
        log::info!(
            "[{exchange} {}/{total}] trying {} ({})",
            index + 1,
            candidate.date,
            candidate.weekday
        );
    }

    fn on_outcome(&self, exchange: Exchange, attempt: &AttemptRecord) {
        match &attempt.outcome {
            AttemptOutcome::Succeeded { rows } => {
                log::info!("[{exchange}] {}: {rows} rows", attempt.date)
            }
            AttemptOutcome::Failed { reason } => {
                log::warn!("[{exchange}] {}: {reason}", attempt.date)
            }
        }
    }

    fn on_finish(&self, exchange: Exchange, result: Result<&Fetched, &FetchError>) {
        match result {
            Ok(f) => log::info!(
                "[{exchange}] resolved bhavcopy for {} after {} attempt(s)",
                f.trade_date,
                f.attempts.len()
            ),
            Err(e) => match e.date() {
                Some(date) => log::error!("[{exchange}] stopped at {date}: {e}"),
                None => log::error!("[{exchange}] {e}"),
            },
        }
    }
}

/// Fetches bhavcopies through sessions opened by `F`.
pub struct BhavcopyFetcher<F: SessionFactory> {
    factory: F,
    calendar: TradingCalendar,
    pause: Duration,
    today: Option<NaiveDate>,
}

impl<F: SessionFactory> BhavcopyFetcher<F> {
    pub fn new(factory: F) -> Self {
        Self {
            factory,
            calendar: TradingCalendar::default(),
            pause: Duration::ZERO,
            today: None,
        }
    }

    pub fn with_calendar(mut self, calendar: TradingCalendar) -> Self {
        self.calendar = calendar;
        self
    }

    /// Wait between consecutive candidate requests.
    pub fn with_pause(mut self, pause: Duration) -> Self {
        self.pause = pause;
        self
    }

    /// Pin "today" instead of reading the local clock.
    pub fn with_today(mut self, today: NaiveDate) -> Self {
        self.today = Some(today);
        self
    }

    /// Candidate dates `request` would try, newest first.
    pub fn candidates(&self, request: &FetchRequest) -> Vec<TradeDateCandidate> {
        let today = self
            .today
            .unwrap_or_else(|| chrono::Local::now().date_naive());
        let reference = request.reference.resolve(today);
        self.calendar.candidates(reference, request.lookback_days)
    }

    /// Resolve the most recent available bhavcopy for `request`.
    pub fn fetch(
        &self,
        adapter: &dyn ExchangeAdapter,
        request: &FetchRequest,
        progress: &dyn FetchProgress,
    ) -> Result<Fetched, FetchError> {
        let result = self.run(adapter, request, progress);
        progress.on_finish(adapter.exchange(), result.as_ref());
        result
    }

    fn run(
        &self,
        adapter: &dyn ExchangeAdapter,
        request: &FetchRequest,
        progress: &dyn FetchProgress,
    ) -> Result<Fetched, FetchError> {
        request.validate()?;
        let exchange = adapter.exchange();
        let columns = request
            .columns
            .clone()
            .unwrap_or_else(|| adapter.default_columns());
        let candidates = self.candidates(request);

        let mut tried: Vec<NaiveDate> = Vec::with_capacity(candidates.len());
        let mut attempts: Vec<AttemptRecord> = Vec::with_capacity(candidates.len());
        let mut last_reason = None;

        if candidates.is_empty() {
            return Err(FetchError::LookbackExhausted {
                exchange,
                tried,
                last_reason: Some("the market is closed on every day in the window".into()),
            });
        }

        // Dropped on every return path below.
        let mut session = self.factory.open(adapter)?;
        warm_up(&mut session, adapter);

        let total = candidates.len();
        for (i, candidate) in candidates.iter().enumerate() {
            if i > 0 && !self.pause.is_zero() {
                std::thread::sleep(self.pause);
            }
            progress.on_attempt(exchange, candidate, i, total);
            tried.push(candidate.date);

            let url = adapter.archive_url(candidate.date);
            match resolve_candidate(&mut session, adapter, &columns, candidate.date, &url) {
                Ok(resolved) => {
                    let attempt = AttemptRecord {
                        date: candidate.date,
                        url,
                        outcome: AttemptOutcome::Succeeded {
                            rows: resolved.table.len(),
                        },
                    };
                    progress.on_outcome(exchange, &attempt);
                    attempts.push(attempt);
                    if resolved.table.dropped_rows > 0 {
                        log::warn!(
                            "[{exchange}] {}: dropped {} row(s) with empty required values",
                            candidate.date,
                            resolved.table.dropped_rows
                        );
                    }
                    return Ok(Fetched {
                        exchange,
                        trade_date: candidate.date,
                        table: resolved.table,
                        source_url: resolved.source_url,
                        entry_name: resolved.entry_name,
                        attempts,
                    });
                }
                Err(e) if e.is_transient() => {
                    let attempt = AttemptRecord {
                        date: candidate.date,
                        url,
                        outcome: AttemptOutcome::Failed {
                            reason: e.to_string(),
                        },
                    };
                    progress.on_outcome(exchange, &attempt);
                    attempts.push(attempt);
                    last_reason = Some(e.to_string());
                }
                Err(FetchError::SchemaMismatch {
                    date,
                    missing,
                    found,
                    ..
                }) => {
                    let attempt = AttemptRecord {
                        date: candidate.date,
                        url,
                        outcome: AttemptOutcome::Failed {
                            reason: format!("missing columns [{}]", missing.join(", ")),
                        },
                    };
                    progress.on_outcome(exchange, &attempt);
                    return Err(FetchError::SchemaMismatch {
                        date,
                        missing,
                        found,
                        tried,
                    });
                }
                Err(e) => return Err(e),
            }
        }

        Err(FetchError::LookbackExhausted {
            exchange,
            tried,
            last_reason,
        })
    }
}

struct Resolved {
    table: BhavcopyTable,
    source_url: String,
    entry_name: Option<String>,
}

/// Request the warm-up page, if any. Failures are logged and ignored; the
/// data requests will report their own errors.
fn warm_up<S: HttpSession>(session: &mut S, adapter: &dyn ExchangeAdapter) {
    let Some(url) = adapter.warm_up_url() else {
        return;
    };
    match session.get(&url) {
        Ok(resp) if resp.is_success() => {
            log::debug!("[{}] warm-up {url}: HTTP {}", adapter.exchange(), resp.status)
        }
        Ok(resp) => log::warn!(
            "[{}] warm-up {url} returned HTTP {}",
            adapter.exchange(),
            resp.status
        ),
        Err(e) => log::warn!("[{}] warm-up {url} failed: {e}", adapter.exchange()),
    }
}

fn resolve_candidate<S: HttpSession>(
    session: &mut S,
    adapter: &dyn ExchangeAdapter,
    columns: &ColumnMap,
    date: NaiveDate,
    url: &str,
) -> Result<Resolved, FetchError> {
    let mut current_url = url.to_string();
    let mut followed_metadata = false;

    loop {
        log::debug!("[{}] GET {current_url}", adapter.exchange());
        let resp = session
            .get(&current_url)
            .map_err(|e| network_error(date, e))?;

        let kind = classify(resp);
        match kind {
            ResponseKind::Archive(bytes) => {
                let entry = extract_table(&bytes).map_err(|e| FetchError::MalformedArchive {
                    date,
                    reason: e.to_string(),
                })?;
                let table = parse_table(&entry.bytes, columns, date)?;
                return Ok(Resolved {
                    table,
                    source_url: current_url,
                    entry_name: Some(entry.name),
                });
            }
            ResponseKind::Table(bytes) => {
                let table = parse_table(&bytes, columns, date)?;
                return Ok(Resolved {
                    table,
                    source_url: current_url,
                    entry_name: None,
                });
            }
            ResponseKind::Metadata(value) if !followed_metadata => {
                match adapter.resolve_metadata(&value) {
                    Some(next) => {
                        log::debug!("[{}] metadata points to {next}", adapter.exchange());
                        followed_metadata = true;
                        current_url = next;
                    }
                    None => {
                        return Err(FetchError::NotAvailableYet {
                            date,
                            reason: "json response names no file".into(),
                        })
                    }
                }
            }
            ResponseKind::Metadata(_) => {
                return Err(FetchError::NotAvailableYet {
                    date,
                    reason: format!("metadata at {current_url} points to more metadata"),
                })
            }
            other @ (ResponseKind::Status(_)
            | ResponseKind::Html
            | ResponseKind::Unrecognized { .. }) => {
                return Err(FetchError::NotAvailableYet {
                    date,
                    reason: format!("{} from {current_url}", other.label()),
                })
            }
        }
    }
}

fn parse_table(bytes: &[u8], columns: &ColumnMap, date: NaiveDate) -> Result<BhavcopyTable, FetchError> {
    let raw = RawTable::from_csv(bytes).map_err(|e| FetchError::MalformedArchive {
        date,
        reason: format!("unreadable csv: {e}"),
    })?;

    let table = columns.normalize(&raw).map_err(|e| match e {
        ColumnError::Missing { missing, found } => FetchError::SchemaMismatch {
            date,
            missing,
            found,
            tried: vec![date],
        },
    })?;

    if table.is_empty() {
        return Err(FetchError::MalformedArchive {
            date,
            reason: format!("table has no complete rows ({} source rows)", raw.rows.len()),
        });
    }
    Ok(table)
}

fn network_error(date: NaiveDate, e: TransportError) -> FetchError {
    FetchError::Network {
        date,
        reason: e.to_string(),
    }
}
