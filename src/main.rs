//! Command-line runner: evaluate one sequence/tracker pair over a frame window.
//!
//! ```text
//! frame-window-eval --sequence MOT16-02 --tracker MPNTrack --t0 10 --t1 20 \
//!     --benchmark MOT16 --metrics HOTA,CLEAR --set GT_FOLDER=data/gt/mot_challenge
//! ```
//!
//! Logging goes to stderr and is controlled through `RUST_LOG`.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;

use frame_window_eval::{
    CommandEngine, ConfigLayers, EvaluationRequest, EvaluationService, FrameWindow, Overrides,
};

const DEFAULT_RUNNER: &str = "scripts/run_mot_challenge.py";

#[derive(Debug, Parser)]
#[command(name = "frame-window-eval", version, about)]
struct Cli {
    /// First frame of the window (1-based, inclusive)
    #[arg(long)]
    t0: u64,

    /// Last frame of the window (inclusive)
    #[arg(long)]
    t1: u64,

    /// Ground-truth sequence name, e.g. MOT16-02
    #[arg(long)]
    sequence: String,

    /// Tracker name, e.g. MPNTrack
    #[arg(long)]
    tracker: String,

    #[arg(long)]
    benchmark: Option<String>,

    #[arg(long)]
    split: Option<String>,

    /// Metric families, comma separated
    #[arg(long, value_delimiter = ',')]
    metrics: Option<Vec<String>>,

    /// Tracker record file to evaluate instead of the tracker's own file
    #[arg(long)]
    tracker_file: Option<PathBuf>,

    /// Configuration override KEY=VALUE[,VALUE...]; repeatable
    #[arg(long = "set", value_name = "KEY=VALUE")]
    settings: Vec<String>,

    /// JSON file with EVAL/DATASET/METRICS configuration layers
    #[arg(long)]
    config: Option<PathBuf>,

    /// Program running the evaluation engine
    #[arg(long, default_value = "python3")]
    engine_program: PathBuf,

    /// Leading engine argument; repeatable (defaults to the TrackEval runner)
    #[arg(long = "engine-arg")]
    engine_args: Vec<String>,

    #[arg(long)]
    timeout_secs: Option<u64>,

    /// Write the result here instead of stdout
    #[arg(long)]
    output: Option<PathBuf>,
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let layers = match &cli.config {
        Some(path) => ConfigLayers::from_json_file(path)
            .with_context(|| format!("loading configuration from {}", path.display()))?,
        None => ConfigLayers::default(),
    };

    let mut overrides = Overrides::new();
    for setting in &cli.settings {
        overrides.parse_assignment(setting)?;
    }

    let mut request = EvaluationRequest::new(&cli.sequence, &cli.tracker, FrameWindow::new(cli.t0, cli.t1)?)
        .with_overrides(overrides);
    if let Some(benchmark) = &cli.benchmark {
        request = request.with_benchmark(benchmark);
    }
    if let Some(split) = &cli.split {
        request = request.with_split(split);
    }
    if let Some(metrics) = &cli.metrics {
        request = request.with_metrics(metrics.iter().map(String::as_str));
    }
    if let Some(path) = &cli.tracker_file {
        request = request.with_tracker_file(path);
    }

    let engine_args = if cli.engine_args.is_empty() {
        vec![DEFAULT_RUNNER.to_string()]
    } else {
        cli.engine_args.clone()
    };
    let engine = CommandEngine::new(&cli.engine_program).args(engine_args);

    let mut service = EvaluationService::new(Arc::new(engine), layers);
    if let Some(secs) = cli.timeout_secs {
        service = service.with_timeout(Duration::from_secs(secs));
    }

    let result = service
        .submit(request)?
        .wait()
        .with_context(|| format!("evaluating {} / {} over frames {}..={}", cli.sequence, cli.tracker, cli.t0, cli.t1))?;

    let json = serde_json::to_string_pretty(&result)?;
    match &cli.output {
        Some(path) => fs::write(path, json + "\n")
            .with_context(|| format!("writing result to {}", path.display()))?,
        None => println!("{}", json),
    }
    Ok(())
}
