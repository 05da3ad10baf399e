//! Clipfit - Size-Capped Video Transcoding
//!
//! Entry point for the clipfit command line tool, which re-encodes video
//! clips so that each one fits under an upload size cap.

use anyhow::Result;
use clap::Parser;
use std::sync::Arc;
use tracing::{error, info, Level};
use tracing_appender::{non_blocking, rolling};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use clipfit::batch::{BatchDriver, BatchReport};
use clipfit::cli::{Args, Commands};
use clipfit::config::Config;
use clipfit::engine::process::ProcessEngine;
use clipfit::engine::{EngineClient, LoadConfig};
use clipfit::input::pending_media;
use clipfit::job::{JobResult, JobSettings, Orchestrator};
use clipfit::output::DirectorySink;
use clipfit::planner;
use clipfit::progress::ProgressBars;

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    setup_logging(args.verbose)?;

    // Load configuration
    let mut config = match &args.config {
        Some(config_path) => Config::from_file(config_path)?,
        None => {
            if std::path::Path::new("config.toml").exists() {
                info!("Found config.toml in current directory, loading...");
                Config::from_file("config.toml")?
            } else {
                Config::default()
            }
        }
    };

    match args.command {
        Commands::Batch { paths, target_mib, output_dir, json } => {
            if let Some(mib) = target_mib {
                config.target.size_mib = mib;
            }
            if let Some(dir) = output_dir {
                config.output.dir = dir;
            }
            config.validate()?;

            let inputs = pending_media(&paths)?;

            let backend = Arc::new(ProcessEngine::new(&config.engine)?);
            let load_config = LoadConfig::resolve(&config.engine.asset_base, config.engine.multi_threaded);
            let engine = Arc::new(EngineClient::new(backend, load_config));
            let sink = Arc::new(DirectorySink::new(&config.output.dir));
            let orchestrator = Orchestrator::new(engine, sink, JobSettings::from_config(&config))
                .with_observer(Arc::new(ProgressBars::new()));
            let driver = BatchDriver::new(orchestrator);

            let report = match driver.run(inputs).await {
                Ok(report) => report,
                Err(e) => {
                    error!("Batch aborted: {}", e);
                    return Err(e.into());
                }
            };

            if json {
                println!("{}", report.to_json()?);
            } else {
                print_report(&report);
            }
        }
        Commands::Plan { duration, target_mib } => {
            if let Some(mib) = target_mib {
                config.target.size_mib = mib;
            }
            config.validate()?;

            let plan = planner::plan(config.target.size_bits(), duration, &config.audio.policy)?;
            println!("Target:   {} MiB ({} bits)", config.target.size_mib, plan.target_size_bits);
            println!("Duration: {:.3}s", plan.duration_seconds);
            println!("Audio:    {} bps", plan.audio_bitrate_bps);
            println!("Video:    {} bps", plan.video_bitrate_bps);
            println!("Projected size: {:.0} bits", plan.projected_bits());
        }
        Commands::InitConfig { path } => {
            config.save_to_file(&path)?;
            println!("Wrote configuration to {}", path.display());
        }
    }

    Ok(())
}

fn print_report(report: &BatchReport) {
    println!("\n{:<40} {:<10} {:<50}", "File", "Status", "Detail");
    println!("{}", "-".repeat(100));

    for entry in &report.results {
        let (status, detail) = match &entry.result {
            JobResult::Succeeded { output_name, bytes } => {
                ("done", format!("{} ({:.2} MiB)", output_name, *bytes as f64 / 1024.0 / 1024.0))
            }
            JobResult::Skipped { reason } => ("skipped", reason.to_string()),
            JobResult::Failed { stage, cause } => ("failed", format!("{}: {}", stage, cause)),
        };
        println!("{:<40} {:<10} {:<50}", entry.name, status, detail);
    }

    println!(
        "\n{} succeeded, {} skipped, {} failed",
        report.succeeded(),
        report.skipped(),
        report.failed()
    );
}

/// Setup logging to both console and file
fn setup_logging(verbose: bool) -> Result<()> {
    let log_dir = std::env::current_dir()?.join(".clipfit").join("log");
    std::fs::create_dir_all(&log_dir)?;

    // Set up file appender with daily rotation
    let file_appender = rolling::daily(&log_dir, "clipfit.log");
    let (non_blocking_file, guard) = non_blocking(file_appender);
    // Keep the guard alive for the duration of the program
    std::mem::forget(guard);

    let log_level = if verbose { Level::DEBUG } else { Level::INFO };

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_file(verbose)
        .with_line_number(verbose);

    let file_layer = fmt::layer()
        .with_writer(non_blocking_file)
        .with_target(true)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .with_ansi(false);

    tracing_subscriber::registry()
        .with(EnvFilter::from_default_env().add_directive(log_level.into()))
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| anyhow::anyhow!("Failed to initialize logging: {}", e))?;

    info!("Logging initialized - console: {}, file: {}",
          log_level, log_dir.join("clipfit.log").display());

    Ok(())
}
