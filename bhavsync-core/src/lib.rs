//! Bhavsync core: resolve the most recent end-of-day bhavcopy an exchange
//! has published and hand it to a sink.
//!
//! - Trading calendar and candidate dates (newest first, bounded window)
//! - Exchange adapters for NSE and BSE (URLs, headers, metadata hops)
//! - Response classification, zip extraction and CSV parsing
//! - Column normalization onto `ISIN`, `TradDt`, `TckrSymb`, `ClsPric`
//! - The fetch loop, with per-fetch HTTP sessions
//! - Full-replace sinks and TOML job files

pub mod archive;
pub mod calendar;
pub mod columns;
pub mod config;
pub mod error;
pub mod exchange;
pub mod fetcher;
pub mod response;
pub mod session;
pub mod sink;
pub mod table;

pub use calendar::{ReferenceDate, TradeDateCandidate, TradingCalendar};
pub use columns::ColumnMap;
pub use config::{AppConfig, JobConfig, OutputTarget};
pub use error::{FetchError, TransportError};
pub use exchange::{BseAdapter, Exchange, ExchangeAdapter, NseAdapter};
pub use fetcher::{BhavcopyFetcher, FetchProgress, FetchRequest, Fetched, LogProgress};
pub use response::{HttpResponse, ResponseKind};
pub use session::{HttpConfig, HttpSession, ReqwestSessionFactory, SessionFactory};
pub use sink::{publish, CsvFileSink, CsvWriterSink, Sink, SinkError};
pub use table::BhavcopyTable;

#[cfg(test)]
mod tests {
    use super::*;

    /// Compile-time check: values handed between threads by callers that
    /// run several jobs concurrently are Send + Sync.
    #[allow(dead_code)]
    fn assert_send_sync() {
        fn require_send<T: Send>() {}
        fn require_sync<T: Sync>() {}

        require_send::<Fetched>();
        require_sync::<Fetched>();
        require_send::<FetchError>();
        require_sync::<FetchError>();
        require_send::<FetchRequest>();
        require_sync::<FetchRequest>();
        require_send::<TradingCalendar>();
        require_sync::<TradingCalendar>();
        require_send::<AppConfig>();
        require_sync::<AppConfig>();
        require_send::<NseAdapter>();
        require_sync::<NseAdapter>();
        require_send::<BseAdapter>();
        require_sync::<BseAdapter>();
        require_send::<BhavcopyFetcher<ReqwestSessionFactory>>();
        require_sync::<BhavcopyFetcher<ReqwestSessionFactory>>();
    }

    /// The fetch loop only sees adapters through the trait object.
    #[test]
    fn adapters_are_object_safe() {
        let adapters: Vec<Box<dyn ExchangeAdapter>> =
            Exchange::ALL.iter().map(|e| e.adapter()).collect();
        let names: Vec<Exchange> = adapters.iter().map(|a| a.exchange()).collect();
        assert_eq!(names, vec![Exchange::Nse, Exchange::Bse]);
    }
}
