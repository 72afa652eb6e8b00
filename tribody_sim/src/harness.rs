//! Run orchestration for the CLI.
//!
//! ```text
//! tribody-sim run ──▶ scenario ──▶ SimulationState ─┐
//!                     solver ───────────────────────┼─▶ Worker (thread | child process)
//!                     HarnessRenderer ──▶ RenderLoop ◀┘        frames / commands
//! ```

use crate::cli::{Isolation, RunArgs, WorkerArgs};
use crate::exporter::ExportRenderer;
use crate::process::WorkerProcess;
use crate::trace::TraceRenderer;
use anyhow::{Context, Result};
use nalgebra::Vector3;
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{info, warn};
use tribody_core::{
    RenderFailure, RenderLoop, RenderStats, RenderSummary, Renderer, ThreadedPipeline, Worker,
    WorkerReport,
};
use tribody_env::{worker_stream_endpoint, ControlHandle, Frame};

/// Trace logging plus optional export.
pub struct HarnessRenderer {
    pub trace: TraceRenderer,
    pub export: Option<ExportRenderer>,
}

impl HarnessRenderer {
    pub fn new(args: &RunArgs) -> Self {
        let export = args.export.as_ref().map(|_| {
            ExportRenderer::new(args.worker.scenario.name(), args.worker.seed, args.export_every)
        });
        Self {
            trace: TraceRenderer::new(args.trace_every),
            export,
        }
    }
}

impl Renderer for HarnessRenderer {
    fn draw(&mut self, positions: &[Vector3<f64>]) {
        self.trace.draw(positions);
        if let Some(export) = &mut self.export {
            export.draw(positions);
        }
    }

    fn diagnostics(&mut self, frame: &Frame) {
        self.trace.diagnostics(frame);
        if let Some(export) = &mut self.export {
            export.diagnostics(frame);
        }
    }
}

/// Outcome of one `run`, printable as JSON.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub scenario: String,
    pub solver: String,
    pub isolation: String,
    pub clean: bool,
    pub worker_exit: String,

    /// Steps reported by an in-process worker (unknown across processes)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub worker_steps: Option<u64>,

    #[serde(flatten)]
    pub stats: RenderStats,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_step: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub energy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<f64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub failure: Option<String>,
}

impl RunSummary {
    fn new(
        args: &RunArgs,
        worker_exit: String,
        worker_clean: bool,
        render: &Result<RenderSummary<HarnessRenderer>, RenderFailure>,
    ) -> Self {
        let (stats, last_frame) = match render {
            Ok(summary) => (summary.stats.clone(), summary.last_frame.as_ref()),
            Err(failure) => (failure.stats.clone(), failure.last_frame.as_ref()),
        };
        let failure = match render {
            Err(e) => Some(e.to_string()),
            Ok(_) if !worker_clean => Some(format!("worker exited with {}", worker_exit)),
            Ok(_) => None,
        };

        Self {
            scenario: args.worker.scenario.name().to_string(),
            solver: args.worker.solver.name().to_string(),
            isolation: format!("{:?}", args.isolation).to_lowercase(),
            clean: failure.is_none(),
            worker_exit,
            worker_steps: None,
            stats,
            last_step: last_frame.map(|f| f.step),
            energy: last_frame.map(|f| f.energy),
            error: last_frame.map(|f| f.error),
            failure,
        }
    }
}

/// Sends `Stop` through `control` on the first Ctrl-C.
pub fn stop_on_ctrl_c(control: ControlHandle) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Ctrl-C received, stopping worker");
            let _ = control.stop();
        }
    })
}

/// Runs one scenario end to end.
pub async fn run(args: &RunArgs, verbose: bool) -> Result<RunSummary> {
    let state = args
        .worker
        .scenario
        .build(&args.worker.scenario_params())
        .with_context(|| format!("invalid initial state for scenario {}", args.worker.scenario))?;
    let renderer = HarnessRenderer::new(args);

    let (summary, renderer) = match args.isolation {
        Isolation::Thread => {
            let solver = args.worker.solver.build();
            let pipeline =
                ThreadedPipeline::launch(solver, state, renderer, args.pipeline_config())
                    .context("failed to start worker thread")?;
            let ctrl_c = stop_on_ctrl_c(pipeline.control_handle());
            let report = pipeline.run().await;
            ctrl_c.abort();

            let mut summary = RunSummary::new(
                args,
                format!("{:?}", report.worker.exit),
                report.worker.exit.is_clean(),
                &report.render,
            );
            summary.worker_steps = Some(report.worker.steps);
            (summary, report.render.ok().map(|r| r.renderer))
        }
        Isolation::Process => {
            // The child builds its own state; the local build above only validated it
            drop(state);
            let exe = std::env::current_exe().context("cannot locate own executable")?;
            let (child, port) = WorkerProcess::spawn(&exe, &args.worker, verbose)?;
            let control = port.control_handle();
            let ctrl_c = stop_on_ctrl_c(control.clone());

            let render = RenderLoop::new(port, renderer, args.render_config())
                .run()
                .await;
            ctrl_c.abort();
            if render.is_err() {
                let _ = control.stop();
            }

            let status = child.wait().await?;
            let exit = format!("process {}", status);
            let summary = RunSummary::new(args, exit, status.success(), &render);
            (summary, render.ok().map(|r| r.renderer))
        }
    };

    if let (Some(path), Some(renderer)) = (&args.export, renderer) {
        if let Some(mut export) = renderer.export.map(ExportRenderer::into_export) {
            export.finalize(summary.clean, summary.stats.overruns);
            export
                .write_to_file(path)
                .with_context(|| format!("failed to write export {}", path.display()))?;
            info!("Exported {} frames to {}", export.frames.len(), path.display());
        }
    }

    Ok(summary)
}

/// Body of the `worker` subcommand: a worker over stdin/stdout.
///
/// Blocks until the worker stops and every queued frame is written.
pub fn run_worker_process(args: &WorkerArgs) -> Result<WorkerReport> {
    let state = args
        .scenario
        .build(&args.scenario_params())
        .with_context(|| format!("invalid initial state for scenario {}", args.scenario))?;

    let (port, writer) =
        worker_stream_endpoint(std::io::stdin(), std::io::stdout(), args.queue_bound());
    let report = Worker::new(args.solver.build(), state, port, args.worker_config()).run();
    writer.join();
    Ok(report)
}
