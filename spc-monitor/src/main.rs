// SPC Monitor - Command-line SPC monitor
// Copyright (c) 2025 David Martin Venti
//
// Dual-licensed under AGPL-3.0 and Commercial License.
// See LICENSE file for details.

//! # SPC Monitor
//!
//! Runs the SPC monitoring loop over a measurement file or demo data.
//!
//! ## Usage
//!
//! ```bash
//! # Monitor a CSV file, reloading every minute
//! spc-monitor --quality quality.csv --interval-ms 60000
//!
//! # One pass over demo data, snapshot JSON on stdout
//! spc-monitor --demo --seed 42 --once
//!
//! # Fall back to production quantities and export metrics
//! spc-monitor --quality quality.json --production production.json --metrics-file spc.prom
//! ```

use clap::Parser;
use spc::SpcEngine;
use spc_monitor::{
    CsvMeasurementSource, DemoConfig, DemoSource, Feed, JsonMeasurementSource,
    JsonProductionSource, MeasurementLoader, MeasurementSource, Monitor, MonitorConfig,
    MonitorError, Result,
};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

/// SPC monitor
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Quality measurements file (.csv or .json)
    #[arg(short, long)]
    quality: Option<PathBuf>,

    /// Production records file (.json) used when quality data is thin
    #[arg(short, long)]
    production: Option<PathBuf>,

    /// Monitor configuration file (.json)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Subgroup size (overrides the configuration file)
    #[arg(long)]
    sample_size: Option<usize>,

    /// Reload interval in milliseconds (overrides the configuration file)
    #[arg(long)]
    interval_ms: Option<u64>,

    /// Monitor generated demonstration data instead of a file
    #[arg(long)]
    demo: bool,

    /// Random seed for demo data
    #[arg(long)]
    seed: Option<u64>,

    /// Poll the quality source for recent readings between reloads
    #[arg(long)]
    feed: bool,

    /// Print the snapshot JSON after the first cycle and exit
    #[arg(long)]
    once: bool,

    /// Rewrite a Prometheus text file after every cycle
    #[arg(long)]
    metrics_file: Option<PathBuf>,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() {
    let args = Args::parse();

    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let level = match args.log_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::INFO,
        };
        EnvFilter::from_default_env().add_directive(level.into())
    });

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    info!("SPC Monitor v{}", env!("CARGO_PKG_VERSION"));

    if let Err(e) = run(args).await {
        error!("{}", e);
        std::process::exit(1);
    }
}

async fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;
    let quality = quality_source(&args)?;

    let mut loader = MeasurementLoader::new(quality, &config);
    if let Some(path) = &args.production {
        loader = loader.with_production(Arc::new(JsonProductionSource::new(path)));
    }

    let engine = SpcEngine::new(config.spc.clone())?;
    let mut monitor = Monitor::new(engine, loader.clone(), &config);
    if let Some(path) = &args.metrics_file {
        info!("Writing metrics to {}", path.display());
        monitor = monitor.with_metrics_file(path);
    }
    let mut handle = monitor.spawn();

    if args.once {
        handle.flush().await?;
        let json = handle.snapshot().await.to_json_pretty()?;
        println!("{}", json);
        return handle.stop().await;
    }

    let mut feed = if args.feed {
        Some(Feed::new(loader, handle.notifier(), &config).spawn())
    } else {
        None
    };

    tokio::signal::ctrl_c().await?;
    info!("Shutting down");

    if let Some(feed) = feed.as_mut() {
        feed.stop().await;
    }
    handle.stop().await
}

fn load_config(args: &Args) -> Result<MonitorConfig> {
    let mut config = match &args.config {
        Some(path) => MonitorConfig::from_json_file(path)?,
        None => MonitorConfig::default(),
    };
    if let Some(sample_size) = args.sample_size {
        config.spc.sample_size = sample_size;
    }
    if let Some(interval_ms) = args.interval_ms {
        config.spc.update_interval_ms = interval_ms;
    }
    config.validate()?;
    Ok(config)
}

fn quality_source(args: &Args) -> Result<Arc<dyn MeasurementSource>> {
    if args.demo {
        let mut demo = DemoConfig::default();
        demo.seed = args.seed;
        info!("Using {} demo readings", demo.count);
        return Ok(Arc::new(DemoSource::new(demo)));
    }

    match &args.quality {
        Some(path) if is_json(path) => Ok(Arc::new(JsonMeasurementSource::new(path))),
        Some(path) => Ok(Arc::new(CsvMeasurementSource::new(path))),
        None => Err(MonitorError::Config(
            "a quality source is required (--quality or --demo)".to_string(),
        )),
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|ext| ext.to_str())
        .map_or(false, |ext| ext.eq_ignore_ascii_case("json"))
}
