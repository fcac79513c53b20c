//! Bhavsync CLI: fetch end-of-day bhavcopies and write them out.
//!
//! Commands:
//! - `fetch` — resolve the latest bhavcopy for one exchange
//! - `run` — process every job in a TOML job file
//! - `candidates` — list the dates and URLs a fetch would try, without fetching

use anyhow::{Context, Result};
use bhavsync_core::calendar::{
    ReferenceDate, TradingCalendar, DEFAULT_LOOKBACK_DAYS, MAX_LOOKBACK_DAYS,
};
use bhavsync_core::columns::ColumnOverrides;
use bhavsync_core::config::{AppConfig, JobConfig, OutputTarget, DEFAULT_PAUSE_MS};
use bhavsync_core::exchange::Exchange;
use bhavsync_core::fetcher::{BhavcopyFetcher, FetchRequest, LogProgress};
use bhavsync_core::session::{HttpConfig, ReqwestSessionFactory};
use bhavsync_core::sink::{publish, CsvFileSink, CsvWriterSink, Sink};
use chrono::NaiveDate;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "bhavsync",
    version,
    about = "Fetch the latest NSE/BSE end-of-day bhavcopy"
)]
struct Cli {
    /// Log at debug level (RUST_LOG takes precedence).
    #[arg(short, long, global = true, default_value_t = false)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Fetch the most recent bhavcopy for one exchange.
    Fetch {
        /// Exchange: nse or bse.
        #[arg(long)]
        exchange: Exchange,

        /// Reference date: today, yesterday or YYYY-MM-DD. Defaults to today.
        #[arg(long)]
        date: Option<String>,

        /// Lookback window in calendar days, including the reference date.
        #[arg(long, default_value_t = DEFAULT_LOOKBACK_DAYS)]
        lookback: u32,

        /// Output CSV path, or "-" for stdout.
        #[arg(long, short, default_value = "-")]
        output: String,

        /// Don't write the .meta.json sidecar next to file outputs.
        #[arg(long, default_value_t = false)]
        no_meta: bool,

        #[command(flatten)]
        columns: ColumnArgs,

        #[command(flatten)]
        calendar: CalendarArgs,

        #[command(flatten)]
        http: HttpArgs,
    },
    /// Run every job in a TOML job file.
    Run {
        /// Path to the job file.
        #[arg(long)]
        config: PathBuf,

        /// Only run jobs for this exchange.
        #[arg(long)]
        only: Option<Exchange>,
    },
    /// List candidate dates and request URLs without fetching.
    Candidates {
        /// Exchange whose URLs to show.
        #[arg(long, default_value = "nse")]
        exchange: Exchange,

        /// Reference date: today, yesterday or YYYY-MM-DD. Defaults to today.
        #[arg(long)]
        date: Option<String>,

        /// Lookback window in calendar days.
        #[arg(long, default_value_t = DEFAULT_LOOKBACK_DAYS)]
        lookback: u32,

        #[command(flatten)]
        calendar: CalendarArgs,
    },
}

/// Source column names overriding the exchange defaults.
#[derive(Args)]
struct ColumnArgs {
    /// Source column holding the ISIN.
    #[arg(long)]
    isin_col: Option<String>,

    /// Source column holding the trade date.
    #[arg(long)]
    date_col: Option<String>,

    /// Source column holding the ticker symbol.
    #[arg(long)]
    symbol_col: Option<String>,

    /// Source column holding the closing price.
    #[arg(long)]
    close_col: Option<String>,
}

impl ColumnArgs {
    fn into_overrides(self) -> ColumnOverrides {
        ColumnOverrides {
            isin: self.isin_col,
            trade_date: self.date_col,
            symbol: self.symbol_col,
            close: self.close_col,
        }
    }
}

#[derive(Args)]
struct CalendarArgs {
    /// Exchange holiday (YYYY-MM-DD). Repeatable.
    #[arg(long = "holiday")]
    holidays: Vec<NaiveDate>,

    /// Treat Saturday as a trading day.
    #[arg(long, default_value_t = false)]
    sunday_only: bool,
}

impl CalendarArgs {
    fn calendar(&self) -> TradingCalendar {
        let base = if self.sunday_only {
            TradingCalendar::sunday_only()
        } else {
            TradingCalendar::default()
        };
        base.with_holidays(self.holidays.iter().copied())
    }
}

#[derive(Args)]
struct HttpArgs {
    /// Per-request timeout in seconds.
    #[arg(long, default_value_t = 20)]
    timeout: u64,

    /// Pause between candidate requests, in milliseconds.
    #[arg(long, default_value_t = DEFAULT_PAUSE_MS)]
    pause_ms: u64,
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    match cli.command {
        Commands::Fetch {
            exchange,
            date,
            lookback,
            output,
            no_meta,
            columns,
            calendar,
            http,
        } => {
            let job = JobConfig {
                date,
                lookback_days: Some(lookback),
                columns: columns.into_overrides(),
                output,
                write_meta: !no_meta,
                ..JobConfig::new(exchange)
            };
            let config = AppConfig {
                calendar: calendar.calendar(),
                http: HttpConfig {
                    timeout_secs: http.timeout,
                    ..HttpConfig::default()
                },
                pause_ms: http.pause_ms,
                lookback_days: lookback,
                jobs: vec![job],
            };
            config.validate()?;
            run_jobs(&config)
        }
        Commands::Run { config, only } => {
            let mut config = AppConfig::from_file(&config)
                .with_context(|| format!("loading job file {}", config.display()))?;
            if let Some(exchange) = only {
                config.jobs.retain(|j| j.exchange == exchange);
                if config.jobs.is_empty() {
                    anyhow::bail!("job file has no {exchange} jobs");
                }
            }
            run_jobs(&config)
        }
        Commands::Candidates {
            exchange,
            date,
            lookback,
            calendar,
        } => run_candidates(exchange, date, lookback, &calendar),
    }
}

fn init_logging(verbose: bool) {
    let default_level = if verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(default_level))
        .format_timestamp_millis()
        .init();
}

/// Run each job in order. Every job runs even if an earlier one fails; the
/// process exits non-zero if any did.
fn run_jobs(config: &AppConfig) -> Result<()> {
    let fetcher = BhavcopyFetcher::new(ReqwestSessionFactory::new(config.http.clone()))
        .with_calendar(config.calendar.clone())
        .with_pause(config.pause());

    let mut failures = Vec::new();
    for job in &config.jobs {
        if let Err(e) = run_job(&fetcher, job, config.lookback_days) {
            log::error!("[{}] {e:#}", job.label());
            failures.push(job.label());
        }
    }

    if !failures.is_empty() {
        log::error!(
            "{} of {} job(s) failed: {}",
            failures.len(),
            config.jobs.len(),
            failures.join(", ")
        );
        std::process::exit(1);
    }
    Ok(())
}

fn run_job(
    fetcher: &BhavcopyFetcher<ReqwestSessionFactory>,
    job: &JobConfig,
    default_lookback: u32,
) -> Result<()> {
    let request = job.request(default_lookback)?;
    let adapter = job.exchange.adapter();

    let fetched = fetcher.fetch(adapter.as_ref(), &request, &LogProgress)?;

    let mut sink: Box<dyn Sink> = match job.output_target() {
        OutputTarget::Stdout => Box::new(CsvWriterSink::new(std::io::stdout().lock(), "stdout")),
        OutputTarget::File(path) => {
            let sink = CsvFileSink::new(path);
            if job.write_meta {
                Box::new(sink)
            } else {
                Box::new(sink.without_meta())
            }
        }
    };
    publish(&fetched, sink.as_mut())
        .with_context(|| format!("writing {} bhavcopy to {}", job.exchange, sink.describe()))?;
    Ok(())
}

fn run_candidates(
    exchange: Exchange,
    date: Option<String>,
    lookback: u32,
    calendar: &CalendarArgs,
) -> Result<()> {
    if lookback == 0 || lookback > MAX_LOOKBACK_DAYS {
        anyhow::bail!("--lookback must be between 1 and {MAX_LOOKBACK_DAYS}, got {lookback}");
    }
    let reference: ReferenceDate = match date {
        Some(s) => s.parse().map_err(anyhow::Error::msg)?,
        None => ReferenceDate::Today,
    };
    let request = FetchRequest {
        reference,
        lookback_days: lookback,
        columns: None,
    };
    let fetcher = BhavcopyFetcher::new(ReqwestSessionFactory::default())
        .with_calendar(calendar.calendar());
    let adapter = exchange.adapter();

    let candidates = fetcher.candidates(&request);
    if candidates.is_empty() {
        println!("No trading days in the {lookback}-day window.");
        return Ok(());
    }
    for (i, c) in candidates.iter().enumerate() {
        println!("{:>2}. {} {}  {}", i + 1, c.date, c.weekday, adapter.archive_url(c.date));
    }
    Ok(())
}
