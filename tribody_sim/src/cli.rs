//! Command-line interface.

use crate::scenarios::{ScenarioId, ScenarioParams};
use crate::solvers::SolverKind;
use clap::{Args, Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::time::Duration;
use tribody_core::{OverrunPolicy, PipelineConfig, RenderConfig, WorkerConfig};
use tribody_env::QueueBound;

/// Tribody real-time N-body pipeline
#[derive(Parser, Debug)]
#[command(name = "tribody-sim")]
#[command(
    about = "Run an N-body simulation worker against a fixed-rate render loop",
    long_about = None
)]
pub struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Run a scenario through the pipeline
    Run(RunArgs),

    /// List available scenarios
    List,

    /// Worker process entry point (frames on stdout, commands on stdin)
    #[command(hide = true)]
    Worker(WorkerArgs),
}

/// Everything the worker side needs. Shared by `run` and `worker`.
#[derive(Args, Debug, Clone)]
pub struct WorkerArgs {
    /// Scenario to run (triangle, figure_eight, binary, cluster)
    #[arg(short = 'S', long, default_value = "triangle")]
    pub scenario: ScenarioId,

    /// Simulated frames per second; the step length is 1/fps
    #[arg(long, default_value = "60")]
    pub fps: f64,

    /// Solver error tolerance
    #[arg(short, long, default_value = "0.001")]
    pub tolerance: f64,

    /// Solver (verlet, drift)
    #[arg(long, default_value = "verlet")]
    pub solver: SolverKind,

    /// Frame queue capacity (0 = unbounded)
    #[arg(long, default_value = "0")]
    pub queue_bound: usize,

    /// Stop the worker after this many steps
    #[arg(long)]
    pub steps: Option<u64>,

    /// Seed for randomized scenarios
    #[arg(short, long, default_value = "42")]
    pub seed: u64,

    /// Body count for randomized scenarios
    #[arg(long, default_value = "16")]
    pub bodies: usize,
}

impl WorkerArgs {
    pub fn scenario_params(&self) -> ScenarioParams {
        ScenarioParams {
            tolerance: self.tolerance,
            seed: self.seed,
            bodies: self.bodies,
        }
    }

    pub fn queue_bound(&self) -> QueueBound {
        QueueBound::from_capacity(self.queue_bound)
    }

    pub fn worker_config(&self) -> WorkerConfig {
        WorkerConfig {
            fps: self.fps,
            step_limit: self.steps,
            ..Default::default()
        }
    }

    /// Arguments that re-create these settings in a `worker` child process.
    pub fn to_child_args(&self, verbose: bool) -> Vec<String> {
        let mut args = vec![
            "worker".to_string(),
            "--scenario".to_string(),
            self.scenario.name().to_string(),
            "--fps".to_string(),
            self.fps.to_string(),
            "--tolerance".to_string(),
            self.tolerance.to_string(),
            "--solver".to_string(),
            self.solver.name().to_string(),
            "--queue-bound".to_string(),
            self.queue_bound.to_string(),
            "--seed".to_string(),
            self.seed.to_string(),
            "--bodies".to_string(),
            self.bodies.to_string(),
        ];
        if let Some(steps) = self.steps {
            args.push("--steps".to_string());
            args.push(steps.to_string());
        }
        if verbose {
            args.push("--verbose".to_string());
        }
        args
    }
}

/// Where the worker runs.
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Isolation {
    /// Dedicated OS thread in this process
    #[default]
    Thread,

    /// Child process speaking the line protocol over stdin/stdout
    Process,
}

/// CLI spelling of [`OverrunPolicy`].
#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Policy {
    /// Wait for the next frame
    #[default]
    Block,

    /// Redraw the previous frame
    Hold,
}

impl From<Policy> for OverrunPolicy {
    fn from(policy: Policy) -> Self {
        match policy {
            Policy::Block => OverrunPolicy::Block,
            Policy::Hold => OverrunPolicy::HoldLast,
        }
    }
}

#[derive(Args, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub worker: WorkerArgs,

    /// Render ticks per second
    #[arg(long, default_value = "60")]
    pub tick_rate: f64,

    /// Stop after this many render ticks
    #[arg(long)]
    pub ticks: Option<u64>,

    /// What a tick does when no frame is waiting
    #[arg(long, value_enum, default_value_t = Policy::Block)]
    pub policy: Policy,

    /// Run the worker on a thread or in a child process
    #[arg(long, value_enum, default_value_t = Isolation::Thread)]
    pub isolation: Isolation,

    /// Export rendered frames to this JSON file
    #[arg(long)]
    pub export: Option<PathBuf>,

    /// Export one frame out of every N
    #[arg(long, default_value = "10")]
    pub export_every: u64,

    /// Log a frame summary every N draws
    #[arg(long, default_value = "60")]
    pub trace_every: u64,

    /// JSON summary output
    #[arg(long)]
    pub json: bool,
}

impl RunArgs {
    pub fn render_config(&self) -> RenderConfig {
        RenderConfig {
            tick_rate_hz: self.tick_rate,
            overrun_policy: self.policy.into(),
            max_ticks: self.ticks,
            step_limit: self.worker.steps,
        }
    }

    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig {
            worker: self.worker.worker_config(),
            render: self.render_config(),
            queue_bound: self.worker.queue_bound(),
        }
    }

    /// Rejects settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<(), String> {
        if !(self.worker.fps.is_finite() && self.worker.fps > 0.0) {
            return Err(format!("--fps must be positive, got {}", self.worker.fps));
        }
        if let Err(e) = self.render_config().tick_period() {
            return Err(format!("--tick-rate: {}", e));
        }
        if self.ticks == Some(0) {
            return Err("--ticks must be at least 1".to_string());
        }
        if self.worker.steps == Some(0) {
            return Err("--steps must be at least 1".to_string());
        }
        Ok(())
    }

    /// Wall-clock budget implied by `--ticks`, if any.
    pub fn expected_duration(&self) -> Option<Duration> {
        self.ticks
            .and_then(|ticks| Duration::try_from_secs_f64(ticks as f64 / self.tick_rate).ok())
    }
}
