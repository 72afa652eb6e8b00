//! Tribody Simulation Harness
//!
//! Drives the real-time pipeline from the command line: builds an initial
//! state from a preset, picks a reference solver, and runs the worker either
//! on a thread or in a child process while a render loop consumes frames.
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────┐
//! │                      tribody-sim run                        │
//! │  ┌──────────────┐   ┌──────────────┐   ┌────────────────┐   │
//! │  │  Scenarios   │──▶│   Worker     │──▶│  RenderLoop    │   │
//! │  │ (presets)    │   │ thread|child │◀──│ Trace + Export │   │
//! │  └──────────────┘   └──────────────┘   └────────────────┘   │
//! │                      Verlet | Drift                         │
//! └─────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use tribody_sim::scenarios::{ScenarioId, ScenarioParams};
//! use tribody_sim::solvers::VerletSolver;
//! use tribody_core::{PipelineConfig, ThreadedPipeline};
//!
//! let state = ScenarioId::FigureEight.build(&ScenarioParams::default())?;
//! let config = PipelineConfig::default();
//! let pipeline = ThreadedPipeline::launch(VerletSolver::default(), state, renderer, config)?;
//! let report = pipeline.run().await;
//! ```

pub mod cli;
pub mod exporter;
pub mod harness;
pub mod process;
pub mod scenarios;
pub mod solvers;
pub mod trace;

pub use exporter::{ExportRenderer, SimExport};
pub use harness::{run, run_worker_process, HarnessRenderer, RunSummary};
pub use process::WorkerProcess;
pub use scenarios::{ScenarioId, ScenarioParams};
pub use solvers::{DriftSolver, SolverKind, VerletSolver};
pub use trace::TraceRenderer;
