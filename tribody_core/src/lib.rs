//! Tribody Core - real-time N-body computation/rendering pipeline
//!
//! A background worker advances a gravitational N-body system through an
//! external solver as fast as it can and publishes a snapshot per step. A
//! fixed-rate render loop consumes those snapshots, detects when production
//! falls behind display rate (overrun), and controls the worker with
//! STOP/PAUSE/RESUME.
//!
//! 1. **State**: body set plus tolerance, handed to exactly one worker
//! 2. **Solver**: opaque integrator contract, initialized once, stepped in place
//! 3. **Worker/RenderLoop**: producer and consumer joined by a FIFO channel

pub mod error;
pub mod pipeline;
pub mod render;
pub mod solver;
pub mod state;
pub mod worker;

// Re-export key types for convenience
pub use error::{RenderError, SolverFault, ValidationError};
pub use pipeline::{PipelineConfig, PipelineReport, ThreadedPipeline};
pub use render::{
    OverrunPolicy, RenderConfig, RenderFailure, RenderLoop, RenderStats, RenderSummary, Renderer,
    TickOutcome,
};
pub use solver::{BodyBuffers, Solver, SolverSession, StepReport};
pub use state::{BodyInputs, BodyUpdate, SimulationState, DEFAULT_TOLERANCE};
pub use worker::{
    Worker, WorkerConfig, WorkerExit, WorkerHandle, WorkerReport, WorkerStatus,
};
