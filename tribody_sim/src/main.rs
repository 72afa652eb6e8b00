//! Tribody simulator CLI
//!
//! Run N-body scenarios through the real-time worker/render pipeline.

use anyhow::{bail, Result};
use clap::Parser;
use tracing::{debug, error, info};
use tracing_subscriber::filter::{EnvFilter, LevelFilter};
use tracing_subscriber::FmtSubscriber;
use tribody_sim::cli::{Cli, Command, RunArgs};
use tribody_sim::scenarios::ScenarioId;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Worker mode and --json keep stdout for machine-readable output
    let to_stderr = match &cli.command {
        Command::Worker(_) => true,
        Command::Run(run) => run.json,
        Command::List => false,
    };

    // RUST_LOG refines the filter; --verbose only moves the default level
    let level = if cli.verbose {
        LevelFilter::DEBUG
    } else {
        LevelFilter::INFO
    };
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();
    let builder = FmtSubscriber::builder().with_env_filter(filter);
    if to_stderr {
        let subscriber = builder.with_writer(std::io::stderr).finish();
        tracing::subscriber::set_global_default(subscriber)?;
    } else {
        tracing::subscriber::set_global_default(builder.finish())?;
    }

    match cli.command {
        Command::List => {
            for scenario in ScenarioId::all() {
                println!("{:<14} {}", scenario.name(), scenario.description());
            }
            Ok(())
        }
        Command::Worker(args) => run_worker(args).await,
        Command::Run(args) => run(args, cli.verbose).await,
    }
}

async fn run(args: RunArgs, verbose: bool) -> Result<()> {
    if let Err(e) = args.validate() {
        bail!(e);
    }

    if !args.json {
        info!("Tribody Simulator v{}", env!("CARGO_PKG_VERSION"));
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!(
            "scenario={} solver={} isolation={:?} policy={:?} queue={}",
            args.worker.scenario,
            args.worker.solver,
            args.isolation,
            args.policy,
            args.worker.queue_bound()
        );
        if let Some(duration) = args.expected_duration() {
            info!(
                "Running for {} ticks (~{:.1}s)",
                args.ticks.unwrap_or_default(),
                duration.as_secs_f64()
            );
        } else {
            info!("Running until Ctrl-C");
        }
    }

    let summary = tribody_sim::run(&args, verbose).await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        info!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
        info!(
            "{} ticks, {} frames, {} overruns, t={:.3}s, worker: {}",
            summary.stats.ticks,
            summary.stats.frames_rendered,
            summary.stats.overruns,
            summary.stats.last_sim_time,
            summary.worker_exit
        );
        if summary.clean {
            info!("✓ {} finished cleanly", summary.scenario);
        } else {
            error!(
                "✗ {} FAILED: {}",
                summary.scenario,
                summary.failure.as_deref().unwrap_or("unknown")
            );
        }
    }

    // Exit with proper code for scripts
    if !summary.clean {
        std::process::exit(1);
    }
    Ok(())
}

async fn run_worker(args: tribody_sim::cli::WorkerArgs) -> Result<()> {
    // Ctrl-C reaches the whole process group; the parent turns it into STOP
    tokio::spawn(async {
        while tokio::signal::ctrl_c().await.is_ok() {
            debug!("Worker ignoring Ctrl-C, waiting for STOP from the parent");
        }
    });

    let report =
        tokio::task::spawn_blocking(move || tribody_sim::run_worker_process(&args)).await??;
    debug!("Worker report: {:?}", report);

    if !report.exit.is_clean() {
        bail!("worker exited with {:?}", report.exit);
    }
    Ok(())
}
