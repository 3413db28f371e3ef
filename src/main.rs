//! CLI entry point for the SBB intercity reliability dashboard.
//!
//! Provides subcommands for a one-shot report, listing the available lines,
//! and an interactive session that re-renders on every selection change.

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use sbb_reliability::config::DashboardConfig;
use sbb_reliability::dashboard::Dashboard;
use sbb_reliability::error::DashboardError;
use sbb_reliability::filter::Selection;
use sbb_reliability::keys::{EnvKeyStore, KeyStore, SsmKeyStore, TokenSpec, resolve_token};
use sbb_reliability::output;
use sbb_reliability::render::render_charts;
use sbb_reliability::session::{self, Session};
use sbb_reliability::source::{SourceConfig, TableSource};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    filter::LevelFilter,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

#[derive(Parser)]
#[command(name = "sbb_reliability")]
#[command(about = "Reliability dashboard for SBB intercity lines", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Compute the metrics once, print them and write the charts
    Report {
        #[command(flatten)]
        source: SourceArgs,

        /// Lines to include, comma-separated (default: all lines)
        #[arg(short, long, value_delimiter = ',')]
        lines: Option<Vec<String>>,

        /// Drop closure days and weekends
        #[arg(short, long, default_value_t = false)]
        neutralize: bool,

        /// Directory the SVG charts are written to
        #[arg(short, long, default_value = "charts")]
        out_dir: PathBuf,

        /// Also write the full report as JSON to this file
        #[arg(long)]
        json: Option<PathBuf>,

        /// Also write the worst journeys as CSV to this file
        #[arg(long)]
        worst_csv: Option<PathBuf>,

        /// Log the full report as JSON
        #[arg(long, default_value_t = false)]
        print_json: bool,
    },
    /// List the lines present in the data and their journey counts
    Lines {
        #[command(flatten)]
        source: SourceArgs,
    },
    /// Interactive session reading commands from stdin
    Explore {
        #[command(flatten)]
        source: SourceArgs,

        /// Initially selected lines, comma-separated (default: all lines)
        #[arg(short, long, value_delimiter = ',')]
        lines: Option<Vec<String>>,

        /// Start with neutralization on
        #[arg(short, long, default_value_t = false)]
        neutralize: bool,

        /// Directory the SVG charts are written to
        #[arg(short, long, default_value = "charts")]
        out_dir: PathBuf,
    },
}

#[derive(Args)]
struct SourceArgs {
    /// Path or URL of the journey table (.parquet, .csv, .csv.gz)
    #[arg(short, long, value_name = "FILE_OR_URL", default_value = "sbb_master_data.parquet")]
    source: String,

    /// Download remote files into the cache directory instead of scanning them
    #[arg(long, default_value_t = false)]
    download: bool,

    /// Dataset repository on the hub, e.g. "someone/sbb-2025"; overrides --source
    #[arg(long)]
    hub_repo: Option<String>,

    /// File inside the hub repository
    #[arg(long, default_value = "sbb_master_data.parquet")]
    hub_file: String,

    /// Hub revision (branch, tag or commit)
    #[arg(long, default_value = "main")]
    revision: String,

    /// Where downloaded files are kept
    #[arg(long, default_value = ".cache/sbb_reliability")]
    cache_dir: PathBuf,

    /// Access token, taking precedence over the secret store and the environment
    #[arg(long)]
    token: Option<String>,

    /// Environment variable holding the access token
    #[arg(long, default_value = sbb_reliability::keys::DEFAULT_TOKEN_ENV)]
    token_env: String,

    /// SSM parameter holding the access token, tried before the environment
    #[arg(long)]
    token_parameter: Option<String>,

    /// JSON configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,
}

impl SourceArgs {
    fn source_config(&self) -> SourceConfig {
        match &self.hub_repo {
            Some(repo) => SourceConfig::Hub {
                repo: repo.clone(),
                file: self.hub_file.clone(),
                revision: self.revision.clone(),
                download: self.download,
            },
            None => SourceConfig::from_location(&self.source, self.download),
        }
    }

    fn load_config(&self) -> Result<DashboardConfig> {
        let config = match &self.config {
            Some(path) => DashboardConfig::load(path)?,
            None => DashboardConfig::default(),
        };
        info!(
            blacklist = config.blacklist.len(),
            failure_threshold_min = config.failure_threshold_min,
            "Configuration loaded"
        );
        Ok(config)
    }

    /// Resolves credentials and builds the table source.
    async fn open(&self) -> Result<Box<dyn TableSource>> {
        let source = self.source_config();
        let token = if source.is_remote() {
            let spec = TokenSpec {
                explicit: self.token.clone(),
                ssm_parameter: self.token_parameter.clone(),
                env_var: Some(self.token_env.clone()),
            };
            let ssm = match &self.token_parameter {
                Some(_) => Some(SsmKeyStore::from_env().await),
                None => None,
            };
            resolve_token(&spec, ssm.as_ref().map(|s| s as &dyn KeyStore), &EnvKeyStore).await
        } else {
            None
        };
        Ok(source.build(token, &self.cache_dir)?)
    }

    async fn dashboard(&self, pushdown: Option<Vec<String>>) -> Result<Dashboard> {
        let config = self.load_config()?;
        let source = self.open().await?;
        info!(source = %source.describe(), "Source ready");
        Ok(Dashboard::new(source, config, pushdown))
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/sbb_reliability.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("sbb_reliability.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(env_filter("RUST_LOG", LevelFilter::INFO));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(env_filter("RUST_LOG_JSON", LevelFilter::DEBUG));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Report {
            source,
            lines,
            neutralize,
            out_dir,
            json,
            worst_csv,
            print_json,
        } => {
            let mut dashboard = source.dashboard(lines.clone()).await?;
            let exports = Exports {
                json,
                worst_csv,
                print_json,
            };
            report(&mut dashboard, lines, neutralize, &out_dir, exports).await?;
        }
        Commands::Lines { source } => {
            let mut dashboard = source.dashboard(None).await?;
            let table = dashboard.table().await?;
            println!("{}", output::lines_table(&table.line_counts()));
            info!(lines = table.lines().len(), rows = table.len(), "Lines listed");
        }
        Commands::Explore {
            source,
            lines,
            neutralize,
            out_dir,
        } => {
            let dashboard = source.dashboard(None).await?;
            let session = Session::new(dashboard, lines, neutralize, out_dir);
            let stdin = tokio::io::BufReader::new(tokio::io::stdin());
            session::run(session, stdin, tokio::io::stdout()).await?;
        }
    }

    Ok(())
}

/// Builds a filter from `var`, falling back to `default` when it is unset or unparsable.
fn env_filter(var: &str, default: LevelFilter) -> EnvFilter {
    EnvFilter::builder()
        .with_default_directive(default.into())
        .with_env_var(var)
        .from_env_lossy()
}

/// Optional outputs of `report` besides the terminal view and the charts.
struct Exports {
    json: Option<PathBuf>,
    worst_csv: Option<PathBuf>,
    print_json: bool,
}

/// One-shot pipeline. Acquisition and decoding failures propagate; an empty
/// selection is only a warning.
#[tracing::instrument(skip_all, fields(neutralize = neutralize, out_dir = %out_dir.display()))]
async fn report(
    dashboard: &mut Dashboard,
    lines: Option<Vec<String>>,
    neutralize: bool,
    out_dir: &Path,
    exports: Exports,
) -> Result<()> {
    let selection = match lines {
        Some(lines) => Selection::new(lines, neutralize),
        None => Selection::all(&dashboard.table().await?, neutralize),
    };

    let report = match dashboard.report(&selection).await {
        Ok(report) => report,
        Err(e @ DashboardError::EmptySelection) => {
            warn!(error = %e, "Nothing to render");
            eprintln!("warning: {e}");
            return Ok(());
        }
        Err(e) => return Err(e.into()),
    };
    if report.total == 0 {
        warn!("No journeys match the selection");
    }

    print!("{}", output::render_text(&report));
    output::print_pretty(&report);
    if exports.print_json {
        output::print_json(&report)?;
    }

    let charts = render_charts(&report, out_dir, dashboard.config().chaos_threshold_pct)?;
    println!(
        "\nCharts: {} and {}",
        charts.daily.display(),
        charts.hourly.display()
    );

    if let Some(path) = exports.json {
        output::write_json(&path, &report)
            .with_context(|| format!("writing JSON report to {}", path.display()))?;
        info!(path = %path.display(), "JSON report written");
    }
    if let Some(path) = exports.worst_csv {
        output::write_worst_csv(&path, &report)
            .with_context(|| format!("writing worst journeys to {}", path.display()))?;
        info!(path = %path.display(), "Worst journeys written");
    }
    Ok(())
}
