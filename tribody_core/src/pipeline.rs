//! Pipeline - wires a worker thread and a render loop through one channel.
//!
//! ```text
//! ┌──────────────────────┐   frames (FIFO)    ┌──────────────────────┐
//! │ Worker (OS thread)   │ ─────────────────▶ │ RenderLoop (tokio)   │
//! │  SimulationState     │                    │  current frame       │
//! │  Solver              │ ◀───────────────── │  Renderer            │
//! └──────────────────────┘  STOP/PAUSE/RESUME └──────────────────────┘
//! ```
//!
//! The state is moved into the worker when the pipeline launches. From then
//! on the consumer side only ever sees frame snapshots.

use crate::error::SolverFault;
use crate::render::{RenderConfig, RenderFailure, RenderLoop, RenderSummary, Renderer};
use crate::solver::Solver;
use crate::state::SimulationState;
use crate::worker::{Worker, WorkerConfig, WorkerExit, WorkerHandle, WorkerReport, WorkerStatus};
use tracing::{info, warn};
use tribody_env::{duplex, ConsumerPort, ControlHandle, QueueBound};

/// Configuration for a whole pipeline.
#[derive(Debug, Clone, Default)]
pub struct PipelineConfig {
    /// Worker-side settings (step length, step limit)
    pub worker: WorkerConfig,

    /// Consumer-side settings (tick rate, overrun policy)
    pub render: RenderConfig,

    /// Frame queue capacity (default: unbounded)
    pub queue_bound: QueueBound,
}

/// Both halves' results.
pub struct PipelineReport<R> {
    pub worker: WorkerReport,
    pub render: Result<RenderSummary<R>, RenderFailure>,
}

impl<R> PipelineReport<R> {
    /// True when the worker exited on request and the render loop saw no fault.
    pub fn is_clean(&self) -> bool {
        self.worker.exit.is_clean() && self.render.is_ok()
    }
}

/// A launched in-process pipeline.
pub struct ThreadedPipeline<R: Renderer> {
    render: RenderLoop<ConsumerPort, R>,
    control: ControlHandle,
    worker: WorkerHandle,
}

impl<R: Renderer> ThreadedPipeline<R> {
    /// Hands `state` to a new worker thread and prepares the render loop.
    ///
    /// The worker starts stepping immediately; frames queue until
    /// [`ThreadedPipeline::run`] begins consuming them. The render loop is
    /// told the worker's step limit, so running out of steps is a clean end.
    pub fn launch<S>(
        solver: S,
        state: SimulationState,
        renderer: R,
        mut config: PipelineConfig,
    ) -> std::io::Result<Self>
    where
        S: Solver + 'static,
    {
        config.render.step_limit = config.render.step_limit.or(config.worker.step_limit);
        let (worker_port, consumer_port) = duplex(config.queue_bound);
        let control = consumer_port.control_handle();

        info!(
            "Launching pipeline: {} bodies, {:.1} fps sim, {:.1} Hz render, queue {}",
            state.len(),
            config.worker.fps,
            config.render.tick_rate_hz,
            config.queue_bound
        );

        let worker = Worker::new(solver, state, worker_port, config.worker).spawn()?;
        let render = RenderLoop::new(consumer_port, renderer, config.render);

        Ok(Self {
            render,
            control,
            worker,
        })
    }

    /// Handle for sending commands while the pipeline runs.
    pub fn control_handle(&self) -> ControlHandle {
        self.control.clone()
    }

    /// Runs the render loop to completion, then joins the worker.
    ///
    /// A render fault still stops the worker before returning.
    pub async fn run(self) -> PipelineReport<R> {
        let Self {
            render,
            control,
            worker,
        } = self;

        let render = render.run().await;
        if let Err(e) = &render {
            warn!("Render loop failed: {}", e);
            // The worker may already be gone; nothing more to do then
            let _ = control.stop();
        }

        let worker = match tokio::task::spawn_blocking(move || worker.join()).await {
            Ok(report) => report,
            Err(e) => WorkerReport {
                status: WorkerStatus::Stopped,
                exit: WorkerExit::SolverFault(SolverFault::Collaborator(e.to_string())),
                steps: 0,
                frames_sent: 0,
                sim_time: f64::NAN,
            },
        };

        PipelineReport { worker, render }
    }
}
