//! Output sinks.
//!
//! A sink receives a header row and data rows and replaces whatever it held
//! before (clear-then-write). Failed fetches never reach a sink, so a sink
//! either keeps its previous contents or holds one complete bhavcopy.
//!
//! `CsvFileSink` writes to `{path}.tmp` and renames it into place, and can
//! leave a `{path}.meta.json` sidecar describing where the rows came from.

use crate::exchange::Exchange;
use crate::fetcher::Fetched;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::ffi::OsString;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SinkError {
    #[error("I/O error writing {path}: {reason}")]
    Io { path: String, reason: String },

    #[error("csv encoding failed: {0}")]
    Csv(String),

    #[error("metadata serialization failed: {0}")]
    Meta(String),
}

/// Where a published table came from.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Provenance {
    pub exchange: Exchange,
    pub trade_date: NaiveDate,
    pub row_count: usize,
    pub source_url: String,
    /// Candidate dates tried, newest first.
    pub attempted_dates: Vec<NaiveDate>,
}

impl Provenance {
    pub fn from_fetched(fetched: &Fetched) -> Self {
        Self {
            exchange: fetched.exchange,
            trade_date: fetched.trade_date,
            row_count: fetched.table.len(),
            source_url: fetched.source_url.clone(),
            attempted_dates: fetched.attempts.iter().map(|a| a.date).collect(),
        }
    }
}

/// Full-replace destination for a table.
pub trait Sink {
    /// Replace the sink's contents with `headers` and `rows`.
    fn replace(&mut self, headers: &[String], rows: &[Vec<String>]) -> Result<(), SinkError>;

    /// Record where the last `replace` came from. Sinks without a place for
    /// it ignore the call.
    fn record_provenance(&mut self, _provenance: &Provenance) -> Result<(), SinkError> {
        Ok(())
    }

    /// Human-readable destination, for logs.
    fn describe(&self) -> String;
}

/// Write a fetched bhavcopy to `sink`.
pub fn publish(fetched: &Fetched, sink: &mut dyn Sink) -> Result<(), SinkError> {
    sink.replace(&fetched.table.header_row(), &fetched.table.rows())?;
    sink.record_provenance(&Provenance::from_fetched(fetched))?;
    log::info!(
        "[{}] wrote {} rows for {} to {}",
        fetched.exchange,
        fetched.table.len(),
        fetched.trade_date,
        sink.describe()
    );
    Ok(())
}

/// Encode a header row and data rows as CSV.
pub fn render_csv(headers: &[String], rows: &[Vec<String>]) -> Result<Vec<u8>, SinkError> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    wtr.write_record(headers)
        .map_err(|e| SinkError::Csv(e.to_string()))?;
    for row in rows {
        wtr.write_record(row)
            .map_err(|e| SinkError::Csv(e.to_string()))?;
    }
    wtr.into_inner()
        .map_err(|e| SinkError::Csv(e.to_string()))
}

// ── CSV file ─────────────────────────────────────────────────────────

/// Sidecar written next to a CSV file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SinkMeta {
    #[serde(flatten)]
    pub provenance: Provenance,
    /// BLAKE3 of the CSV bytes.
    pub data_hash: String,
    pub fetched_at: chrono::NaiveDateTime,
}

/// Local CSV file, replaced atomically.
#[derive(Debug, Clone)]
pub struct CsvFileSink {
    path: PathBuf,
    write_meta: bool,
    last_hash: Option<String>,
}

impl CsvFileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            write_meta: true,
            last_hash: None,
        }
    }

    /// Skip the `.meta.json` sidecar.
    pub fn without_meta(mut self) -> Self {
        self.write_meta = false;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn meta_path(&self) -> PathBuf {
        suffixed(&self.path, ".meta.json")
    }

    /// Read the sidecar left by a previous run, if any.
    pub fn load_meta(&self) -> Option<SinkMeta> {
        let content = fs::read_to_string(self.meta_path()).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn io_error(path: &Path, e: std::io::Error) -> SinkError {
        SinkError::Io {
            path: path.display().to_string(),
            reason: e.to_string(),
        }
    }

    fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), SinkError> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).map_err(|e| Self::io_error(parent, e))?;
            }
        }
        let tmp_path = suffixed(path, ".tmp");
        fs::write(&tmp_path, bytes).map_err(|e| Self::io_error(&tmp_path, e))?;
        fs::rename(&tmp_path, path).map_err(|e| {
            let _ = fs::remove_file(&tmp_path);
            Self::io_error(path, e)
        })
    }
}

impl Sink for CsvFileSink {
    fn replace(&mut self, headers: &[String], rows: &[Vec<String>]) -> Result<(), SinkError> {
        let bytes = render_csv(headers, rows)?;
        Self::write_atomic(&self.path, &bytes)?;
        self.last_hash = Some(blake3::hash(&bytes).to_hex().to_string());
        Ok(())
    }

    fn record_provenance(&mut self, provenance: &Provenance) -> Result<(), SinkError> {
        if !self.write_meta {
            return Ok(());
        }
        let Some(data_hash) = self.last_hash.clone() else {
            return Ok(());
        };
        let meta = SinkMeta {
            provenance: provenance.clone(),
            data_hash,
            fetched_at: chrono::Local::now().naive_local(),
        };
        let json =
            serde_json::to_string_pretty(&meta).map_err(|e| SinkError::Meta(e.to_string()))?;
        Self::write_atomic(&self.meta_path(), json.as_bytes())
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

fn suffixed(path: &Path, suffix: &str) -> PathBuf {
    let mut s: OsString = path.as_os_str().to_owned();
    s.push(suffix);
    PathBuf::from(s)
}

// ── Any writer ───────────────────────────────────────────────────────

/// CSV to an arbitrary writer (stdout in the CLI).
pub struct CsvWriterSink<W: Write> {
    writer: W,
    name: String,
}

impl<W: Write> CsvWriterSink<W> {
    pub fn new(writer: W, name: impl Into<String>) -> Self {
        Self {
            writer,
            name: name.into(),
        }
    }

    pub fn into_inner(self) -> W {
        self.writer
    }
}

impl<W: Write> Sink for CsvWriterSink<W> {
    fn replace(&mut self, headers: &[String], rows: &[Vec<String>]) -> Result<(), SinkError> {
        let bytes = render_csv(headers, rows)?;
        let io = |e: std::io::Error| SinkError::Io {
            path: self.name.clone(),
            reason: e.to_string(),
        };
        self.writer.write_all(&bytes).map_err(io)?;
        self.writer.flush().map_err(io)
    }

    fn describe(&self) -> String {
        self.name.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn headers() -> Vec<String> {
        ["ISIN", "TradDt", "TckrSymb", "ClsPric"]
            .iter()
            .map(|s| s.to_string())
            .collect()
    }

    fn row(v: [&str; 4]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn renders_and_quotes() {
        let bytes = render_csv(&headers(), &[row(["INE1", "2024-03-14", "A,B", "1.5"])]).unwrap();
        assert_eq!(
            String::from_utf8(bytes).unwrap(),
            "ISIN,TradDt,TckrSymb,ClsPric\nINE1,2024-03-14,\"A,B\",1.5\n"
        );
    }

    #[test]
    fn writer_sink() {
        let mut sink = CsvWriterSink::new(Vec::new(), "memory");
        sink.replace(&headers(), &[row(["INE1", "2024-03-14", "AAA", "1.5"])])
            .unwrap();
        assert_eq!(sink.describe(), "memory");
        let out = String::from_utf8(sink.into_inner()).unwrap();
        assert!(out.starts_with("ISIN,TradDt"));
        assert!(out.ends_with("AAA,1.5\n"));
    }

    #[test]
    fn file_sink_replaces_content() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out/nse.csv");
        let mut sink = CsvFileSink::new(&path).without_meta();

        sink.replace(
            &headers(),
            &[
                row(["INE1", "2024-03-13", "AAA", "1"]),
                row(["INE2", "2024-03-13", "BBB", "2"]),
            ],
        )
        .unwrap();
        sink.replace(&headers(), &[row(["INE3", "2024-03-14", "CCC", "3"])])
            .unwrap();

        let content = fs::read_to_string(&path).unwrap();
        assert_eq!(content, "ISIN,TradDt,TckrSymb,ClsPric\nINE3,2024-03-14,CCC,3\n");
        assert!(!suffixed(&path, ".tmp").exists());
        assert!(!sink.meta_path().exists());
    }

    #[test]
    fn provenance_without_write_is_ignored() {
        let dir = tempfile::tempdir().unwrap();
        let mut sink = CsvFileSink::new(dir.path().join("x.csv"));
        let p = Provenance {
            exchange: Exchange::Bse,
            trade_date: NaiveDate::from_ymd_opt(2024, 3, 14).unwrap(),
            row_count: 0,
            source_url: String::new(),
            attempted_dates: vec![],
        };
        sink.record_provenance(&p).unwrap();
        assert!(sink.load_meta().is_none());
    }
}
