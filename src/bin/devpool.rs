//! devpool CLI: run a JSONL dataset through a command hook, one worker per
//! device.

use anyhow::Context;
use clap::{Args, Parser, Subcommand};
use devpool::config::{Config, RunConfig};
use devpool::coordinator::Coordinator;
use devpool::dataset::JsonlDataset;
use devpool::device::{self, DeviceBinding};
use devpool::hook::CommandFactory;
use devpool::progress::Progress;
use devpool::sink::JsonlSink;
use devpool::telemetry::{TelemetryConfig, TelemetryGuard, init_telemetry};
use std::path::{Path, PathBuf};
use tracing::{error, info};

#[derive(Parser)]
#[command(name = "devpool", about = "Run work items across one worker per device")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run a dataset through the processor hook
    Run(RunArgs),
    /// Show the devices a run would bind and their environment
    Devices {
        /// Run config TOML
        #[arg(long, short)]
        config: Option<PathBuf>,
        /// Override the discovered device count
        #[arg(long)]
        devices: Option<usize>,
    },
}

#[derive(Args)]
struct RunArgs {
    /// Run config TOML
    #[arg(long, short)]
    config: Option<PathBuf>,
    /// Outcomes to finalize
    #[arg(long)]
    target: Option<usize>,
    /// Dataset records to skip first
    #[arg(long)]
    offset: Option<u64>,
    /// Replace skipped outcomes with fresh items
    #[arg(long)]
    replace_skips: bool,
    /// Device count (default: discover)
    #[arg(long)]
    devices: Option<usize>,
    /// JSONL dataset
    #[arg(long)]
    dataset: Option<PathBuf>,
    /// JSONL results file
    #[arg(long)]
    output: Option<PathBuf>,
    /// Don't echo results to stdout
    #[arg(long, short)]
    quiet: bool,
    /// Hook command and arguments
    #[arg(last = true)]
    command: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let env = Config::from_env();

    let guard = init_telemetry(TelemetryConfig {
        endpoint: env.otel_endpoint.clone(),
        service_name: "devpool".to_string(),
        default_filter: env.log_level.clone(),
    })?;

    match cli.command {
        Command::Run(args) => cmd_run(args, &guard).await,
        Command::Devices { config, devices } => cmd_devices(config.as_deref(), devices),
    }
}

fn load_run_config(path: Option<&Path>) -> anyhow::Result<RunConfig> {
    Ok(match path {
        Some(path) => RunConfig::from_toml_file(path)?,
        None => RunConfig::default(),
    })
}

async fn cmd_run(args: RunArgs, guard: &TelemetryGuard) -> anyhow::Result<()> {
    let mut config = load_run_config(args.config.as_deref())?;
    if let Some(target) = args.target {
        config.target = target;
    }
    if let Some(offset) = args.offset {
        config.offset = offset;
    }
    if args.devices.is_some() {
        config.devices = args.devices;
    }
    if args.dataset.is_some() {
        config.dataset = args.dataset;
    }
    if args.output.is_some() {
        config.output = args.output;
    }
    if !args.command.is_empty() {
        config.processor.command = args.command;
    }
    config.replace_skips |= args.replace_skips;
    config.quiet |= args.quiet;
    config.validate()?;

    let devices = device::discover(&config)?;
    let dataset_path = config
        .dataset
        .clone()
        .context("no dataset configured")?;
    let dataset = JsonlDataset::open(&dataset_path, config.offset)?;
    let sink = JsonlSink::create(config.output.as_deref(), config.quiet)?;
    let progress = Progress::new(config.target, !config.quiet);

    info!(
        devices,
        target = config.target,
        replace_skips = config.replace_skips,
        dataset = %dataset_path.display(),
        "starting run"
    );

    let mut coordinator = Coordinator::new(config, dataset, sink).with_progress(progress);
    let run = tokio::task::spawn_blocking(move || coordinator.run(CommandFactory, devices));

    let report = tokio::select! {
        joined = run => joined.context("coordinator thread panicked")?,
        _ = tokio::signal::ctrl_c() => {
            error!("interrupted");
            guard.force_flush();
            // Workers are blocking threads; the runtime would wait on them.
            std::process::exit(130);
        }
    };

    let report = match report {
        Ok(report) => report,
        Err(e) => {
            error!(error = %e, "run failed");
            guard.force_flush();
            return Err(e.into());
        }
    };

    println!();
    println!("Run:              {}", report.run_id);
    println!("Started:          {}", report.started_at.format("%Y-%m-%d %H:%M:%S"));
    println!(
        "Finalized:        {}/{}",
        report.state.finalized(),
        report.state.target()
    );
    println!("Replaced skips:   {}", report.state.requeued());
    println!("Setup time:       {:.2}s", report.setup.as_secs_f64());
    println!("Processing time:  {:.2}s", report.processing.as_secs_f64());
    Ok(())
}

fn cmd_devices(config: Option<&Path>, devices: Option<usize>) -> anyhow::Result<()> {
    let mut config = load_run_config(config)?;
    if devices.is_some() {
        config.devices = devices;
    }
    let n = device::discover(&config)?;

    println!("{n} device(s)");
    for device in 0..n {
        let binding = DeviceBinding::bind(device, &config.device_env);
        let env = binding
            .env()
            .map(|(k, v)| format!("{k}={v}"))
            .collect::<Vec<_>>()
            .join(" ");
        println!("  worker {device}: {env}");
    }
    Ok(())
}
