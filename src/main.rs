//! CLI entry point for the arc speed estimator.
//!
//! Provides subcommands for the full historical + streaming pipeline, a single
//! partitioned job, and a look at the built route graphs.

use anyhow::Result;
use clap::{Parser, Subcommand};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{
    EnvFilter, Layer,
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
};

use transit_arc_speeds::compute::{
    ArcSpeeds, DistributedEstimator, SpeedEstimator, SpeedReport, StreamingEstimator,
    combine_with_precedence,
};
use transit_arc_speeds::config::Settings;
use transit_arc_speeds::output::{log_sample, print_json, write_speeds};
use transit_arc_speeds::parser::load_topology;
use transit_arc_speeds::topology::{ArcIndex, GraphSummary, RouteGraphs, build_graphs};

#[derive(Parser)]
#[command(name = "transit_arc_speeds")]
#[command(about = "Estimate average bus speeds per route arc from GPS telemetry", long_about = None)]
struct Cli {
    /// JSON settings file
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Directory holding the topology and telemetry CSVs
    #[arg(short, long, global = true)]
    data_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Historical pass, then streaming update with precedence
    Run {
        /// Use the partitioned coordinator for the historical file instead of a streaming pass
        #[arg(long, default_value_t = false)]
        distributed: bool,

        /// CSV file to write the final speed table to
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Number of results to log
        #[arg(long, default_value_t = 20)]
        sample: usize,
    },
    /// Run one partitioned job over a telemetry file
    Distribute {
        /// Telemetry file (defaults to the historical file of the data layout)
        #[arg(value_name = "TELEMETRY")]
        telemetry: Option<PathBuf>,

        /// Worker pool size
        #[arg(short, long)]
        workers: Option<usize>,

        /// Deadline for the whole job
        #[arg(short, long)]
        timeout_secs: Option<u64>,

        /// Only load the first N rows
        #[arg(short, long)]
        max_rows: Option<usize>,

        /// Number of results to log
        #[arg(long, default_value_t = 20)]
        sample: usize,
    },
    /// Build the route graphs and report their size
    Graphs,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    // Logging setup: colored stderr + JSON rolling log file
    let log_file_path = std::env::var("LOG_FILE_PATH")
        .unwrap_or_else(|_| "logs/transit_arc_speeds.log".to_string());
    let log_dir = Path::new(&log_file_path)
        .parent()
        .unwrap_or(Path::new("logs"));
    let log_file_name = Path::new(&log_file_path)
        .file_name()
        .unwrap_or(OsStr::new("transit_arc_speeds.log"));

    let file_appender = tracing_appender::rolling::daily(log_dir, log_file_name);
    let (non_blocking_file, _file_guard) = tracing_appender::non_blocking(file_appender);

    let stderr_layer = fmt::layer()
        .with_target(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(true)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::from_env("RUST_LOG").add_directive("info".parse()?));

    let json_layer = fmt::layer()
        .json()
        .with_current_span(true)
        .with_span_list(true)
        .with_writer(non_blocking_file)
        .with_filter(EnvFilter::from_env("RUST_LOG_JSON").add_directive("debug".parse()?));

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(json_layer)
        .init();

    let cli = Cli::parse();

    let mut settings = Settings::load_or_default(cli.config.as_deref())?;
    if let Some(dir) = cli.data_dir {
        settings.data.data_dir = dir;
    }

    match cli.command {
        Commands::Run {
            distributed,
            output,
            sample,
        } => {
            settings.validate()?;
            run_pipeline(&settings, distributed, output.as_deref(), sample).await?;
        }
        Commands::Distribute {
            telemetry,
            workers,
            timeout_secs,
            max_rows,
            sample,
        } => {
            if let Some(w) = workers {
                settings.job.workers = w;
                settings.job.partitions = Some(w);
            }
            if let Some(t) = timeout_secs {
                settings.job.timeout_secs = t;
            }
            if max_rows.is_some() {
                settings.job.max_rows = max_rows;
            }
            settings.validate()?;

            let telemetry = telemetry.unwrap_or_else(|| settings.data.historical_path());
            let graphs = Arc::new(load_graphs(&settings)?);
            let index = ArcIndex::build(&graphs);

            let estimator = DistributedEstimator::new(
                Arc::new(settings.engine.clone()),
                settings.job.clone(),
            );
            let report = estimator.estimate(&telemetry, graphs).await?;
            log_report(estimator.name(), &report);
            log_sample(&report.averages, &index, sample);
        }
        Commands::Graphs => {
            let graphs = load_graphs(&settings)?;

            let mut line_ids: Vec<_> = graphs.keys().copied().collect();
            line_ids.sort_unstable();
            for line_id in line_ids {
                let graph = &graphs[&line_id];
                info!(
                    line_id,
                    short_name = %graph.line().short_name,
                    description = %graph.line().description,
                    stops = graph.total_stops(),
                    outbound = graph.outbound().len(),
                    inbound = graph.inbound().len(),
                    "Route"
                );
            }
        }
    }

    Ok(())
}

/// Loads the topology (all three files are required) and builds the graphs.
fn load_graphs(settings: &Settings) -> Result<RouteGraphs> {
    let topology = load_topology(&settings.data)?;
    if topology.skipped_rows > 0 {
        warn!(skipped = topology.skipped_rows, "Some topology rows were skipped");
    }
    let graphs = build_graphs(&topology.lines, &topology.stops, &topology.line_stops);
    print_json(&GraphSummary::from_graphs(&graphs))?;
    Ok(graphs)
}

/// Historical phase followed by the streaming phase. Either telemetry file may
/// be absent; the phase is then skipped.
#[tracing::instrument(skip(settings, output))]
async fn run_pipeline(
    settings: &Settings,
    distributed: bool,
    output: Option<&Path>,
    sample: usize,
) -> Result<()> {
    let graphs = Arc::new(load_graphs(settings)?);
    let index = ArcIndex::build(&graphs);
    let engine = Arc::new(settings.engine.clone());

    let historical: Box<dyn SpeedEstimator> = if distributed {
        Box::new(DistributedEstimator::new(engine.clone(), settings.job.clone()))
    } else {
        Box::new(StreamingEstimator::new(engine.clone()))
    };

    let mut speeds = ArcSpeeds::new();

    let historical_path = settings.data.historical_path();
    if historical_path.exists() {
        info!(path = %historical_path.display(), "Computing historical speeds");
        let report = historical.estimate(&historical_path, graphs.clone()).await?;
        log_report(historical.name(), &report);
        speeds = report.averages;
    } else {
        warn!(path = %historical_path.display(), "Historical telemetry not found, skipping");
    }

    let streaming_path = settings.data.streaming_path();
    if streaming_path.exists() {
        info!(path = %streaming_path.display(), "Updating with streaming telemetry");
        let streaming = StreamingEstimator::new(engine);
        let report = streaming.estimate(&streaming_path, graphs.clone()).await?;
        log_report(streaming.name(), &report);
        speeds = combine_with_precedence(speeds, &report.averages);
        info!(arcs = speeds.len(), "Arcs with speed after streaming update");
    } else {
        warn!(path = %streaming_path.display(), "Streaming telemetry not found, skipping");
    }

    log_sample(&speeds, &index, sample);

    if let Some(path) = output {
        let rows = write_speeds(path, &speeds, &index)?;
        info!(path = %path.display(), rows, "Speed table written");
    }

    info!(arcs = speeds.len(), "Analysis complete");
    Ok(())
}

fn log_report(strategy: &str, report: &SpeedReport) {
    info!(
        strategy,
        arcs = report.averages.len(),
        received = report.partitions_received,
        total = report.partitions_total,
        complete = report.is_complete(),
        elapsed_ms = report.elapsed.as_millis() as u64,
        match_pct = report.stats.match_pct(),
        "Speed estimation finished"
    );
    if !report.is_complete() {
        warn!(
            missing = report.partitions_total - report.partitions_received,
            "Result is partial"
        );
    }
    let _ = print_json(&report.stats);
}
