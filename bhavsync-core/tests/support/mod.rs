//! Scripted HTTP sessions and fixture builders shared by the integration tests.

#![allow(dead_code)]

use bhavsync_core::error::{FetchError, TransportError};
use bhavsync_core::exchange::ExchangeAdapter;
use bhavsync_core::response::HttpResponse;
use bhavsync_core::session::{HttpSession, SessionFactory};
use chrono::NaiveDate;
use std::collections::HashMap;
use std::io::{Cursor, Write};
use std::sync::{Arc, Mutex};
use zip::write::FileOptions;
use zip::ZipWriter;

pub const NSE_HEADER: &str =
    "TradDt,BizDt,Sgmt,Src,FinInstrmTp,FinInstrmId,ISIN,TckrSymb,SctySrs,OpnPric,HghPric,LwPric,ClsPric,LastPric";

pub const BSE_HEADER: &str = "SC_CODE,SC_NAME,ISIN_CODE,TRADE_DATE,OPEN,HIGH,LOW,CLOSE";

pub fn d(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

/// NSE UDiFF-style table for `date` with `rows` securities.
pub fn nse_csv(date: NaiveDate, rows: usize) -> String {
    let mut out = format!("{NSE_HEADER}\n");
    for i in 0..rows {
        out.push_str(&format!(
            "{date},{date},CM,NSE,STK,{id},INE{i:07}01,SYM{i},EQ,10.00,11.00,9.00,{close}.50,10.40\n",
            id = 1000 + i,
            close = 10 + i,
        ));
    }
    out
}

/// BSE-style table for `date` with `rows` securities.
pub fn bse_csv(date: NaiveDate, rows: usize) -> String {
    let mut out = format!("{BSE_HEADER}\n");
    for i in 0..rows {
        out.push_str(&format!(
            "{code},SCRIP{i},INE{i:07}02,{date},20,22,19,{close}.25\n",
            code = 500000 + i,
            close = 20 + i,
        ));
    }
    out
}

pub fn zip_bytes(entries: &[(&str, &str)]) -> Vec<u8> {
    let mut w = ZipWriter::new(Cursor::new(Vec::new()));
    for (name, contents) in entries {
        w.start_file(*name, FileOptions::default()).unwrap();
        w.write_all(contents.as_bytes()).unwrap();
    }
    w.finish().unwrap().into_inner()
}

pub fn zip_response(name: &str, csv: &str) -> HttpResponse {
    HttpResponse::new(200, Some("application/zip"), zip_bytes(&[(name, csv)]))
}

pub fn csv_response(csv: &str) -> HttpResponse {
    HttpResponse::new(200, Some("text/csv"), csv.as_bytes().to_vec())
}

pub fn json_response(json: &str) -> HttpResponse {
    HttpResponse::new(200, Some("application/json"), json.as_bytes().to_vec())
}

pub fn html_response() -> HttpResponse {
    HttpResponse::new(
        200,
        Some("text/html; charset=utf-8"),
        b"<!DOCTYPE html><html><body>Access Denied</body></html>".to_vec(),
    )
}

pub fn not_found() -> HttpResponse {
    HttpResponse::new(404, Some("text/html"), b"Not Found".to_vec())
}

#[derive(Default)]
struct MockState {
    routes: HashMap<String, Result<HttpResponse, TransportError>>,
    requests: Vec<String>,
    opened: usize,
    dropped: usize,
}

/// Session factory answering from a URL table; unknown URLs get a 404.
#[derive(Clone, Default)]
pub struct MockFactory {
    state: Arc<Mutex<MockState>>,
}

impl MockFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(self, url: impl Into<String>, response: HttpResponse) -> Self {
        self.state
            .lock()
            .unwrap()
            .routes
            .insert(url.into(), Ok(response));
        self
    }

    pub fn fail(self, url: impl Into<String>, error: TransportError) -> Self {
        self.state
            .lock()
            .unwrap()
            .routes
            .insert(url.into(), Err(error));
        self
    }

    /// Route the archive URL `adapter` builds for `date`.
    pub fn route_date(self, adapter: &dyn ExchangeAdapter, date: NaiveDate, response: HttpResponse) -> Self {
        self.route(adapter.archive_url(date), response)
    }

    /// Every URL requested so far, across sessions, in order.
    pub fn requests(&self) -> Vec<String> {
        self.state.lock().unwrap().requests.clone()
    }

    pub fn opened(&self) -> usize {
        self.state.lock().unwrap().opened
    }

    pub fn dropped(&self) -> usize {
        self.state.lock().unwrap().dropped
    }
}

impl SessionFactory for MockFactory {
    type Session = MockSession;

    fn open(&self, _adapter: &dyn ExchangeAdapter) -> Result<MockSession, FetchError> {
        self.state.lock().unwrap().opened += 1;
        Ok(MockSession {
            state: Arc::clone(&self.state),
        })
    }
}

pub struct MockSession {
    state: Arc<Mutex<MockState>>,
}

impl HttpSession for MockSession {
    fn get(&mut self, url: &str) -> Result<HttpResponse, TransportError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(url.to_string());
        state
            .routes
            .get(url)
            .cloned()
            .unwrap_or_else(|| Ok(not_found()))
    }
}

impl Drop for MockSession {
    fn drop(&mut self) {
        if let Ok(mut state) = self.state.lock() {
            state.dropped += 1;
        }
    }
}
