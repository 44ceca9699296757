//! railscan - 検査履歴の CLI
//!
//! # 学習ポイント
//! - clap derive でサブコマンドを定義
//! - コアのドメイン型は CLI 側の ValueEnum から変換する（コアは clap に依存しない）
//! - エラーは CliError に集約し、main で 1 回だけ表示して終了コードにする

use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use thiserror::Error;
use tokio::runtime::Handle;
use tracing_subscriber::EnvFilter;

use railscan_core::app::{App, AppBuilder, AppConfig, BuildError, ConfigError};
use railscan_core::domain::{AnalysisMode, AnalysisResult, HistoryEntry, NotificationMessage, Severity};

const DEFAULT_DATA_DIR: &str = ".railscan";

#[derive(Debug, Parser)]
#[command(name = "railscan", version, about = "Railway track inspection history")]
struct Cli {
    /// JSON config file; every field is optional.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Storage directory. Overrides `data_dir` from the config.
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Debug, Subcommand)]
enum Commands {
    /// Save an analysis response (JSON file) and show the result toast.
    Record {
        file: PathBuf,
        #[arg(long, value_enum)]
        mode: Option<ModeArg>,
    },
    /// List saved analyses, newest first.
    List,
    /// Print one saved analysis as JSON.
    Show { index: usize },
    /// Delete one saved analysis by its list position.
    Delete { index: usize },
    /// Delete every saved analysis.
    Clear {
        #[arg(long)]
        yes: bool,
    },
    /// Show a toast until it expires.
    Toast {
        #[arg(value_enum)]
        severity: SeverityArg,
        text: String,
        #[arg(long)]
        duration_ms: Option<u64>,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum ModeArg {
    Standard,
    Deep,
}

impl From<ModeArg> for AnalysisMode {
    fn from(mode: ModeArg) -> Self {
        match mode {
            ModeArg::Standard => AnalysisMode::Standard,
            ModeArg::Deep => AnalysisMode::Deep,
        }
    }
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum SeverityArg {
    Success,
    Error,
    Warning,
    Info,
}

impl From<SeverityArg> for Severity {
    fn from(severity: SeverityArg) -> Self {
        match severity {
            SeverityArg::Success => Severity::Success,
            SeverityArg::Error => Severity::Error,
            SeverityArg::Warning => Severity::Warning,
            SeverityArg::Info => Severity::Info,
        }
    }
}

#[derive(Debug, Error)]
enum CliError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Build(#[from] BuildError),

    #[error("failed to read {path:?}: {source}")]
    Input {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("{path:?} is not an analysis result: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("no entry at index {index} (history has {len})")]
    NoSuchEntry { index: usize, len: usize },

    #[error("refusing to clear history without --yes")]
    ConfirmationRequired,

    #[error("failed to render entry: {0}")]
    Render(#[source] serde_json::Error),
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(error) => {
            eprintln!("error: {error}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<(), CliError> {
    let app = open_app(cli.config, cli.data_dir)?;
    let _printer = app.bus.subscribe(print_toast);

    match cli.command {
        Commands::Record { file, mode } => record(&app, file, mode),
        Commands::List => {
            list(&app);
            Ok(())
        }
        Commands::Show { index } => show(&app, index),
        Commands::Delete { index } => delete(&app, index),
        Commands::Clear { yes } => clear(&app, yes),
        Commands::Toast {
            severity,
            text,
            duration_ms,
        } => {
            toast(&app, severity.into(), text, duration_ms).await;
            Ok(())
        }
    }
}

fn open_app(config: Option<PathBuf>, data_dir: Option<PathBuf>) -> Result<App, CliError> {
    let mut config = match config {
        Some(path) => AppConfig::load(path)?,
        None => AppConfig::default(),
    };
    if let Some(dir) = data_dir {
        config.data_dir = Some(dir);
    }
    if config.data_dir.is_none() {
        config.data_dir = Some(PathBuf::from(DEFAULT_DATA_DIR));
    }
    Ok(AppBuilder::new().config(config).build()?)
}

fn print_toast(message: &NotificationMessage) {
    println!("[{}] {}", message.severity, message.text);
}

fn record(app: &App, file: PathBuf, mode: Option<ModeArg>) -> Result<(), CliError> {
    let raw = std::fs::read_to_string(&file).map_err(|source| CliError::Input {
        path: file.clone(),
        source,
    })?;
    let mut result: AnalysisResult =
        serde_json::from_str(&raw).map_err(|source| CliError::Parse { path: file, source })?;

    if !result.success {
        let reason = result.extra.get("error").and_then(|value| value.as_str());
        app.recorder.report_failure(reason);
        return Ok(());
    }
    if let Some(mode) = mode {
        result = result.with_mode(mode.into());
    }
    let entry = app.recorder.record(result);
    println!("saved {}", entry.id());
    Ok(())
}

fn list(app: &App) {
    let entries = app.history.list();
    if entries.is_empty() {
        println!("No history yet");
        return;
    }
    for (index, entry) in entries.iter().enumerate() {
        print_row(index, entry);
    }
}

fn print_row(index: usize, entry: &HistoryEntry) {
    let summary = entry.summary();
    let marker = if summary.defect_detected { "!" } else { " " };
    println!("{index:>3} {marker} {}  {}", summary.date, summary.title);
}

fn show(app: &App, index: usize) -> Result<(), CliError> {
    let entry = app.history.get(index).ok_or_else(|| CliError::NoSuchEntry {
        index,
        len: app.history.len(),
    })?;
    let rendered = serde_json::to_string_pretty(&entry).map_err(CliError::Render)?;
    println!("{rendered}");
    Ok(())
}

fn delete(app: &App, index: usize) -> Result<(), CliError> {
    let len = app.history.len();
    let removed = app
        .history
        .delete_at(index)
        .ok_or(CliError::NoSuchEntry { index, len })?;
    println!("deleted {}", removed.id());
    Ok(())
}

fn clear(app: &App, yes: bool) -> Result<(), CliError> {
    if !yes {
        return Err(CliError::ConfirmationRequired);
    }
    app.history.clear();
    println!("history cleared");
    Ok(())
}

async fn toast(app: &App, severity: Severity, text: String, duration_ms: Option<u64>) {
    let tray = app.toast_tray(Handle::current());
    let duration = duration_ms.map_or(app.bus.default_duration(), Duration::from_millis);

    app.bus.publish(NotificationMessage::new(text, severity).with_duration(duration));

    tray.wait_until_empty().await;
    tracing::debug!("toast expired");
}
