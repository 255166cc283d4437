use std::io::{self, Write};
use std::path::{Path, PathBuf};
use anyhow::{Context, Result};
use chrono::Local;
use clap::{ArgAction, ColorChoice, CommandFactory, Parser, ValueEnum};
use clap_complete::Shell;
use log::{LevelFilter, info};
use serde::{Deserialize, Serialize};
mod analyzer;
mod classify;
mod counters;
mod error;
mod export;
mod registry;
mod report;
mod sources;
mod temper;
mod window;

use crate::analyzer::Analyzer;
use crate::registry::ReferenceTables;
use crate::report::ReportModes;
use crate::temper::{Cadence, StartTime, END_OF_TIME};
use crate::window::WindowController;

const DEFAULT_TABLES_DIR: &str = "/apps/n2t/n2t_create/tlog";
const DEFAULT_LIVE_LOG: &str = "/apps/n2t/sv/cur/apache2/logs/transaction_log";
const DEFAULT_CONFIG: &str = "tlog.toml";

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogLevel { Error, Warn, Info, Debug, Trace }

#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
enum LogFormat { Text, Json }

#[derive(Parser, Debug)]
#[command(
    name = "tlog",
    about = "Transaction log analyzer",
    long_about = "Counts resolution requests by scheme and naming authority, and identifier modifications by operation, in name-resolver transaction logs. Reports per day, per month, or once for the whole run.",
    after_long_help = "Examples:\n  tlog --when monthly 2021 transaction_log.2021.*\n  tlog --mods 2021.01.23 -\n  tlog --iddump --when daily 2021.01.13_12:26:53.867470 -\n  tlog 0 -2000",
    color = ColorChoice::Auto,
    allow_negative_numbers = true
)]
struct Args {
    /// Start time in TEMPER form (2021 | 2021.01 | 2021.01.23 | 2021.01.13_12:26:53.867470), 0 for the first line, - for today
    #[arg(required_unless_present = "completions")]
    starttime: Option<String>,
    /// Log files in chronological order; - alone for the dated logs plus the live log, -N for the last N lines of the live log
    #[arg(required_unless_present = "completions", num_args = 1..)]
    files: Vec<String>,
    /// Report resolutions (default when no other report is chosen)
    #[arg(long, default_value_t = false)]
    res: bool,
    /// Report modifications
    #[arg(long, default_value_t = false)]
    mods: bool,
    /// Dump modified identifiers for harvesting
    #[arg(long, default_value_t = false)]
    iddump: bool,
    #[arg(long, value_enum, default_value = "end")]
    when: Cadence,
    #[arg(long, hide = true, default_value_t = false)]
    daily: bool,
    /// Stop counting at this TEMPER time
    #[arg(long, default_value = END_OF_TIME)]
    endtime: String,
    /// Directory holding naan_table.txt, doi_naans.txt and prefixes.txt
    #[arg(long)]
    tables_dir: Option<String>,
    #[arg(long)]
    live_log: Option<String>,
    #[arg(short = 'v', long, action = ArgAction::Count)]
    verbose: u8,
    #[arg(short = 'q', long, default_value_t = false)]
    quiet: bool,
    #[arg(long, value_enum)]
    log_level: Option<LogLevel>,
    #[arg(long, value_enum)]
    log_format: Option<LogFormat>,
    #[arg(long)]
    log_path: Option<String>,
    #[arg(long, default_value_t = false)]
    progress: bool,
    /// Write one CSV row per reported window
    #[arg(long)]
    csv_path: Option<String>,
    /// Write the run summary as JSON
    #[arg(long, short = 'j')]
    json_path: Option<String>,
    #[arg(long, value_enum)]
    completions: Option<Shell>,
    #[arg(long)]
    completions_out: Option<String>,
    #[arg(long)]
    config: Option<String>,
}

impl Default for Args {
    fn default() -> Self {
        Self {
            starttime: None,
            files: vec![],
            res: false,
            mods: false,
            iddump: false,
            when: Cadence::End,
            daily: false,
            endtime: END_OF_TIME.to_string(),
            tables_dir: None,
            live_log: None,
            verbose: 0,
            quiet: false,
            log_level: None,
            log_format: None,
            log_path: None,
            progress: false,
            csv_path: None,
            json_path: None,
            completions: None,
            completions_out: None,
            config: None,
        }
    }
}

#[derive(Deserialize)]
struct AppConfig {
    tables_dir: Option<String>,
    live_log: Option<String>,
    when: Option<Cadence>,
    endtime: Option<String>,
    log_format: Option<LogFormat>,
    log_path: Option<String>,
    csv_path: Option<String>,
    json_path: Option<String>,
    progress: Option<bool>,
}

fn main() {
    let mut args = Args::parse();
    if let Some(sh) = args.completions {
        let mut cmd = Args::command();
        if let Some(path) = args.completions_out.as_ref() {
            if let Ok(mut f) = std::fs::File::create(path) { clap_complete::generate(sh, &mut cmd, "tlog", &mut f); } else { clap_complete::generate(sh, &mut cmd, "tlog", &mut io::stdout()); }
        } else {
            clap_complete::generate(sh, &mut cmd, "tlog", &mut io::stdout());
        }
        return;
    }
    if let Some(cfg) = load_config(args.config.as_deref()) { apply_config(&mut args, cfg); }
    if args.daily { args.when = Cadence::Daily; }
    init_logging(&args);
    if let Err(e) = run(&args) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn load_config(explicit: Option<&str>) -> Option<AppConfig> {
    let path = explicit.unwrap_or(DEFAULT_CONFIG);
    let s = match std::fs::read_to_string(path) {
        Ok(s) => s,
        Err(e) => {
            if explicit.is_some() { eprintln!("Failed to read config {}: {}", path, e); }
            return None;
        }
    };
    match toml::from_str::<AppConfig>(&s) {
        Ok(cfg) => Some(cfg),
        Err(e) => { eprintln!("Ignoring config {}: {}", path, e); None }
    }
}

fn apply_config(args: &mut Args, cfg: AppConfig) {
    if args.tables_dir.is_none() && let Some(v) = cfg.tables_dir { args.tables_dir = Some(v); }
    if args.live_log.is_none() && let Some(v) = cfg.live_log { args.live_log = Some(v); }
    if args.when == Cadence::End && let Some(v) = cfg.when { args.when = v; }
    if args.endtime == END_OF_TIME && let Some(v) = cfg.endtime { args.endtime = v; }
    if args.log_format.is_none() && let Some(v) = cfg.log_format { args.log_format = Some(v); }
    if args.log_path.is_none() && let Some(v) = cfg.log_path { args.log_path = Some(v); }
    if args.csv_path.is_none() && let Some(v) = cfg.csv_path { args.csv_path = Some(v); }
    if args.json_path.is_none() && let Some(v) = cfg.json_path { args.json_path = Some(v); }
    if let Some(v) = cfg.progress { args.progress = args.progress || v; }
}

/// `--quiet` beats `--log-level`, which beats `-v`; `None` defers to RUST_LOG.
fn level_filter(args: &Args) -> Option<LevelFilter> {
    if args.quiet { return Some(LevelFilter::Error); }
    if let Some(lvl) = args.log_level {
        return Some(match lvl { LogLevel::Error => LevelFilter::Error, LogLevel::Warn => LevelFilter::Warn, LogLevel::Info => LevelFilter::Info, LogLevel::Debug => LevelFilter::Debug, LogLevel::Trace => LevelFilter::Trace });
    }
    match args.verbose {
        0 => None,
        1 => Some(LevelFilter::Info),
        2 => Some(LevelFilter::Debug),
        _ => Some(LevelFilter::Trace),
    }
}

fn init_logging(args: &Args) {
    let mut builder = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("warn"));
    if let Some(f) = level_filter(args) { builder.filter_level(f); }
    match args.log_format {
        Some(LogFormat::Json) => {
            builder.format(|buf, record| {
                let obj = serde_json::json!({
                    "ts": Local::now().to_rfc3339(),
                    "level": record.level().to_string(),
                    "target": record.target(),
                    "msg": record.args().to_string(),
                });
                writeln!(buf, "{}", obj)
            });
        }
        Some(LogFormat::Text) => {
            builder.format(|buf, record| {
                writeln!(buf, "[{:<5} {}] {}", record.level(), Local::now().format("%H:%M:%S"), record.args())
            });
        }
        None => {}
    }
    if let Some(path) = args.log_path.as_ref() {
        match std::fs::File::create(path) {
            Ok(f) => { builder.target(env_logger::Target::Pipe(Box::new(f))); }
            Err(e) => { eprintln!("Failed to open log file {}: {}", path, e); }
        }
    }
    builder.init();
}

/// CLI or config value, else the environment, else the built-in default.
fn pick_path(cli: Option<&str>, env: Option<String>, default: &str) -> PathBuf {
    cli.map(PathBuf::from).or_else(|| env.filter(|v| !v.is_empty()).map(PathBuf::from)).unwrap_or_else(|| PathBuf::from(default))
}

fn run(args: &Args) -> Result<()> {
    let start = temper::parse_start(args.starttime.as_deref().unwrap_or("0"), Local::now().date_naive())?;
    let live = pick_path(args.live_log.as_deref(), std::env::var("TLOG_LIVE_LOG").ok(), DEFAULT_LIVE_LOG);
    let day = match &start { StartTime::At(s) => s.get(..10), StartTime::Beginning => None };
    let sources = sources::resolve(&args.files, &live, day)?;

    let tables_dir = pick_path(args.tables_dir.as_deref(), std::env::var("TLOG_TABLES_DIR").ok(), DEFAULT_TABLES_DIR);
    let tables = ReferenceTables::load(&tables_dir)?;

    let wc = WindowController::new(start, args.when, args.endtime.clone())?;
    let modes = ReportModes::new(args.res, args.mods, args.iddump);
    let out = io::BufWriter::new(io::stdout().lock());
    let mut analyzer = Analyzer::new(&tables, wc, modes, out).with_progress(args.progress);
    let summary = analyzer.run(&sources)?;
    drop(analyzer);

    if let Some(p) = args.csv_path.as_ref() {
        export::write_windows_csv(Path::new(p), &summary.windows)?;
        info!("Wrote {} window row(s) to {}", summary.windows.len(), p);
    }
    if let Some(p) = args.json_path.as_ref() {
        export::write_summary_json(Path::new(p), &summary).with_context(|| format!("exporting summary to {}", p))?;
        info!("Wrote run summary to {}", p);
    }
    Ok(())
}
