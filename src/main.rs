use std::io::Write;
use std::path::PathBuf;

use anyhow::Context;
use clap::{Args, Parser, Subcommand, ValueEnum};

use chat_analytics::models::{Granularity, Grouping, Source};
use chat_analytics::report::{self, Table};
use chat_analytics::{DashboardConfig, RecordFilter, SessionContext};

#[derive(Parser)]
#[command(name = "chat-analytics")]
#[command(about = "Intent, sentiment and escalation analytics for chatbot sessions", long_about = None)]
struct Cli {
    /// TOML configuration file (defaults to ./chat-analytics.toml when present)
    #[arg(long, global = true)]
    config: Option<PathBuf>,
    /// Log debug output
    #[arg(long, short, global = true)]
    verbose: bool,
    /// Only log errors
    #[arg(long, short, global = true)]
    quiet: bool,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct InputArgs {
    /// CSV table or JSON session export; repeat to combine files
    #[arg(long, short, required = true)]
    input: Vec<PathBuf>,
    /// Keep only these sources (e.g. "IT Support", helpdesk)
    #[arg(long = "source")]
    sources: Vec<String>,
    /// Keep only sessions whose primary intent is one of these
    #[arg(long = "intent")]
    intents: Vec<String>,
    /// Keep only sessions loaded from these file names
    #[arg(long = "data-source")]
    data_sources: Vec<String>,
    /// Keep only escalated (true) or non-escalated (false) sessions
    #[arg(long)]
    escalated: Option<bool>,
    /// Override the configured time granularity
    #[arg(long, value_enum)]
    granularity: Option<GranularityArg>,
}

#[derive(Clone, Copy, ValueEnum)]
enum GranularityArg {
    Day,
    Week,
}

#[derive(Clone, Copy, Default, ValueEnum)]
enum Format {
    #[default]
    Table,
    Json,
    Csv,
}

#[derive(Clone, Copy, ValueEnum)]
enum GroupingArg {
    Intent,
    PrimaryIntent,
    Sentiment,
    Urgency,
    Source,
    Day,
    Week,
    EscalationLevel,
    RiskFlag,
    IntentCount,
    DataSource,
}

impl From<GroupingArg> for Grouping {
    fn from(value: GroupingArg) -> Self {
        match value {
            GroupingArg::Intent => Grouping::Intent,
            GroupingArg::PrimaryIntent => Grouping::PrimaryIntent,
            GroupingArg::Sentiment => Grouping::Sentiment,
            GroupingArg::Urgency => Grouping::Urgency,
            GroupingArg::Source => Grouping::Source,
            GroupingArg::Day => Grouping::Day,
            GroupingArg::Week => Grouping::Week,
            GroupingArg::EscalationLevel => Grouping::EscalationLevel,
            GroupingArg::RiskFlag => Grouping::RiskFlag,
            GroupingArg::IntentCount => Grouping::IntentCount,
            GroupingArg::DataSource => Grouping::DataSource,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Session totals and overall escalation rate
    Overview {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, value_enum, default_value_t)]
        format: Format,
    },
    /// Counts and rates grouped by one dimension
    Groups {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, value_enum)]
        by: GroupingArg,
        #[arg(long, value_enum, default_value_t)]
        format: Format,
    },
    /// Session volume and escalation rate per day or week
    Trend {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, value_enum, default_value_t)]
        format: Format,
    },
    /// Session volume per day or week for each source
    Sources {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, value_enum, default_value_t)]
        format: Format,
    },
    /// One row per session after filtering
    Sessions {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, value_enum, default_value_t)]
        format: Format,
    },
    /// Escalation spikes against the rolling baseline
    Alerts {
        #[command(flatten)]
        input: InputArgs,
        /// Include evaluated buckets that did not trigger
        #[arg(long)]
        all: bool,
        #[arg(long, value_enum, default_value_t)]
        format: Format,
    },
    /// Generate a markdown report
    Report {
        #[command(flatten)]
        input: InputArgs,
        #[arg(long, default_value = "report.md")]
        out: PathBuf,
    },
}

fn main() {
    if let Err(error) = run() {
        eprintln!("error: {error:#}");
        std::process::exit(1);
    }
}

fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.quiet, cli.verbose)?;

    let config = DashboardConfig::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Overview { input, format } => {
            let (session, filter) = open_session(config, &input)?;
            let dashboard = session.dashboard(&filter);
            emit(&report::overview_table(&dashboard.overview)?, format)?;
        }
        Commands::Groups { input, by, format } => {
            let (session, filter) = open_session(config, &input)?;
            let grouping = Grouping::from(by);
            let buckets = session.buckets(&filter, grouping);
            emit(&report::bucket_table(&buckets, grouping)?, format)?;
        }
        Commands::Trend { input, format } => {
            let (session, filter) = open_session(config, &input)?;
            let dashboard = session.dashboard(&filter);
            emit(&report::series_table(&dashboard.series, dashboard.granularity)?, format)?;
        }
        Commands::Sources { input, format } => {
            let (session, filter) = open_session(config, &input)?;
            let dashboard = session.dashboard(&filter);
            emit(
                &report::source_series_table(&dashboard.source_series, dashboard.granularity)?,
                format,
            )?;
        }
        Commands::Sessions { input, format } => {
            let (session, filter) = open_session(config, &input)?;
            let records = session.select(&filter);
            emit(&report::records_table(&records)?, format)?;
        }
        Commands::Alerts { input, all, format } => {
            let (session, filter) = open_session(config, &input)?;
            let dashboard = session.dashboard(&filter);
            let alerts: Vec<_> = dashboard
                .alerts
                .iter()
                .filter(|alert| all || alert.triggered)
                .cloned()
                .collect();

            if alerts.is_empty() && matches!(format, Format::Table) {
                println!("No escalation spikes detected.");
                return Ok(());
            }
            emit(&report::alert_table(&alerts, dashboard.granularity)?, format)?;
        }
        Commands::Report { input, out } => {
            let (session, filter) = open_session(config, &input)?;
            let dashboard = session.dashboard(&filter);
            let report = report::build_report(&dashboard)?;
            std::fs::write(&out, report)
                .with_context(|| format!("failed to write {}", out.display()))?;
            println!("Report written to {}.", out.display());
        }
    }

    Ok(())
}

fn open_session(
    mut config: DashboardConfig,
    input: &InputArgs,
) -> anyhow::Result<(SessionContext, RecordFilter)> {
    if let Some(granularity) = input.granularity {
        config.granularity = match granularity {
            GranularityArg::Day => Granularity::Day,
            GranularityArg::Week => Granularity::Week,
        };
    }

    let mut session = SessionContext::new(config).context("invalid configuration")?;
    session
        .load(input.input.as_slice())
        .context("failed to load conversation records")?;

    let sources = input
        .sources
        .iter()
        .map(|value| value.parse::<Source>())
        .collect::<Result<Vec<_>, _>>()
        .context("invalid --source filter")?;

    let filter = RecordFilter {
        sources,
        intents: input.intents.clone(),
        data_sources: input.data_sources.clone(),
        escalated: input.escalated,
    };

    Ok((session, filter))
}

fn emit(table: &Table, format: Format) -> anyhow::Result<()> {
    let stdout = std::io::stdout();
    let mut out = stdout.lock();
    match format {
        Format::Table => write!(out, "{}", table.to_text())?,
        Format::Json => writeln!(out, "{}", table.to_json()?)?,
        Format::Csv => table.write_csv(&mut out)?,
    }
    Ok(())
}

fn init_tracing(quiet: bool, verbose: bool) -> anyhow::Result<()> {
    let level = if quiet {
        "error"
    } else if verbose {
        "debug"
    } else {
        "warn"
    };

    let filter = tracing_subscriber::EnvFilter::try_from_env("CHAT_ANALYTICS_LOG")
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|error| anyhow::anyhow!("failed to initialize tracing subscriber: {error}"))?;

    Ok(())
}
