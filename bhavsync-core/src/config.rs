//! Job files.
//!
//! A job file is TOML: shared calendar and HTTP settings at the top level,
//! then one `[[jobs]]` table per exchange to fetch.
//!
//! ```toml
//! pause_ms = 350
//!
//! [calendar]
//! holidays = ["2024-03-25"]
//!
//! [[jobs]]
//! exchange = "nse"
//! output = "out/nse.csv"
//!
//! [[jobs]]
//! exchange = "bse"
//! date = "2024-03-15"
//! lookback_days = 5
//! output = "-"
//! ```

use crate::calendar::{ReferenceDate, TradingCalendar, DEFAULT_LOOKBACK_DAYS, MAX_LOOKBACK_DAYS};
use crate::columns::{ColumnMap, ColumnOverrides};
use crate::exchange::{Exchange, ExchangeAdapter};
use crate::fetcher::FetchRequest;
use crate::session::HttpConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Pause between candidate requests when a job file does not set one.
pub const DEFAULT_PAUSE_MS: u64 = 350;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("read job file {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("parse job file: {0}")]
    Parse(String),

    #[error("job {job}: {reason}")]
    InvalidJob { job: String, reason: String },

    #[error("job file defines no jobs")]
    NoJobs,
}

/// Where a job's table goes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputTarget {
    Stdout,
    File(PathBuf),
}

impl OutputTarget {
    /// `-` means stdout; anything else is a file path.
    pub fn parse(s: &str) -> Self {
        if s.trim() == "-" {
            OutputTarget::Stdout
        } else {
            OutputTarget::File(PathBuf::from(s))
        }
    }
}

/// One exchange to fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct JobConfig {
    /// Label used in logs; defaults to the exchange name.
    #[serde(default)]
    pub name: Option<String>,
    pub exchange: Exchange,
    /// `today`, `yesterday` or `YYYY-MM-DD`. Today when absent.
    #[serde(default)]
    pub date: Option<String>,
    /// Falls back to the file-level `lookback_days`.
    #[serde(default)]
    pub lookback_days: Option<u32>,
    /// Source column names replacing the exchange defaults.
    #[serde(default)]
    pub columns: ColumnOverrides,
    /// CSV path, or `-` for stdout.
    #[serde(default = "default_output")]
    pub output: String,
    /// Write a `.meta.json` sidecar next to file outputs.
    #[serde(default = "default_true")]
    pub write_meta: bool,
}

fn default_output() -> String {
    "-".to_string()
}

fn default_true() -> bool {
    true
}

impl JobConfig {
    pub fn new(exchange: Exchange) -> Self {
        Self {
            name: None,
            exchange,
            date: None,
            lookback_days: None,
            columns: ColumnOverrides::default(),
            output: default_output(),
            write_meta: true,
        }
    }

    pub fn label(&self) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| self.exchange.to_string())
    }

    pub fn output_target(&self) -> OutputTarget {
        OutputTarget::parse(&self.output)
    }

    pub fn reference(&self) -> Result<ReferenceDate, ConfigError> {
        match &self.date {
            None => Ok(ReferenceDate::Today),
            Some(s) => s.parse().map_err(|reason| self.invalid(reason)),
        }
    }

    /// Column map for this job: the adapter's defaults with overrides applied.
    pub fn column_map(&self, adapter: &dyn ExchangeAdapter) -> ColumnMap {
        self.columns.apply(adapter.default_columns())
    }

    /// Build the fetch request, using `default_lookback` when the job sets none.
    pub fn request(&self, default_lookback: u32) -> Result<FetchRequest, ConfigError> {
        let lookback = self.lookback_days.unwrap_or(default_lookback);
        check_lookback(lookback).map_err(|reason| self.invalid(reason))?;
        let mut request = FetchRequest {
            reference: self.reference()?,
            lookback_days: lookback,
            columns: None,
        };
        if !self.columns.is_empty() {
            request.columns = Some(self.column_map(self.exchange.adapter().as_ref()));
        }
        Ok(request)
    }

    fn invalid(&self, reason: impl Into<String>) -> ConfigError {
        ConfigError::InvalidJob {
            job: self.label(),
            reason: reason.into(),
        }
    }
}

/// A whole job file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct AppConfig {
    #[serde(default)]
    pub calendar: TradingCalendar,
    #[serde(default)]
    pub http: HttpConfig,
    #[serde(default = "default_pause_ms")]
    pub pause_ms: u64,
    #[serde(default = "default_lookback")]
    pub lookback_days: u32,
    #[serde(default)]
    pub jobs: Vec<JobConfig>,
}

fn default_pause_ms() -> u64 {
    DEFAULT_PAUSE_MS
}

fn default_lookback() -> u32 {
    DEFAULT_LOOKBACK_DAYS
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            calendar: TradingCalendar::default(),
            http: HttpConfig::default(),
            pause_ms: DEFAULT_PAUSE_MS,
            lookback_days: DEFAULT_LOOKBACK_DAYS,
            jobs: Vec::new(),
        }
    }
}

impl AppConfig {
    /// Load and validate a job file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        Self::from_toml(&content)
    }

    /// Parse and validate a job file from a string.
    pub fn from_toml(content: &str) -> Result<Self, ConfigError> {
        let config: AppConfig =
            toml::from_str(content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Every job must produce a valid request, no two file outputs may share
    /// a path, and at most one job may write to stdout.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.jobs.is_empty() {
            return Err(ConfigError::NoJobs);
        }
        check_lookback(self.lookback_days).map_err(|reason| ConfigError::InvalidJob {
            job: "<defaults>".into(),
            reason,
        })?;

        let mut paths: Vec<&PathBuf> = Vec::new();
        let mut stdout_taken = false;
        let targets: Vec<OutputTarget> = self.jobs.iter().map(JobConfig::output_target).collect();
        for (job, target) in self.jobs.iter().zip(&targets) {
            job.request(self.lookback_days)?;
            match target {
                OutputTarget::File(path) => {
                    if paths.contains(&path) {
                        return Err(job.invalid(format!(
                            "output {} is used by another job",
                            path.display()
                        )));
                    }
                    paths.push(path);
                }
                OutputTarget::Stdout => {
                    if stdout_taken {
                        return Err(job.invalid("stdout is used by another job"));
                    }
                    stdout_taken = true;
                }
            }
        }
        Ok(())
    }

    pub fn pause(&self) -> std::time::Duration {
        std::time::Duration::from_millis(self.pause_ms)
    }
}

fn check_lookback(days: u32) -> Result<(), String> {
    if days == 0 || days > MAX_LOOKBACK_DAYS {
        Err(format!(
            "lookback_days must be between 1 and {MAX_LOOKBACK_DAYS}, got {days}"
        ))
    } else {
        Ok(())
    }
}
