//! Error taxonomy for the pipeline core.

use thiserror::Error;
use tribody_env::TransportError;

/// Malformed construction input or bad index.
///
/// Raised synchronously to the caller; never crosses the channel.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ValidationError {
    /// Masses, positions and velocities must have the same length
    #[error(
        "Length mismatch: {masses} masses, {positions} positions, {velocities} velocities"
    )]
    LengthMismatch {
        masses: usize,
        positions: usize,
        velocities: usize,
    },

    /// Body index outside `0..len`
    #[error("Body index {index} out of range (count {count})")]
    IndexOutOfRange { index: usize, count: usize },

    /// Tolerance must be finite and strictly positive
    #[error("Invalid tolerance: {0}")]
    InvalidTolerance(f64),

    /// NaN or infinite component in an input body
    #[error("Non-finite value in body {index}")]
    NonFinite { index: usize },
}

/// Solver collaborator failure. Fatal to the worker.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SolverFault {
    /// `step` was called before `initialize`
    #[error("Solver stepped before initialization")]
    Uninitialized,

    /// Integration produced non-finite values or the collaborator gave up
    #[error("Solver diverged at step {step}: {detail}")]
    Diverged { step: u64, detail: String },

    /// Body count differs from the one bound at initialization
    #[error("Buffer layout mismatch: expected {expected} bodies, found {found}")]
    LayoutMismatch { expected: usize, found: usize },

    /// Any other collaborator-reported failure
    #[error("Solver error: {0}")]
    Collaborator(String),
}

/// Fatal render-loop failure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RenderError {
    /// The channel closed without a `Stop` from this side (worker gone)
    #[error("Transport fault: {0}")]
    Transport(#[from] TransportError),

    /// Tick rate with no usable timer period
    #[error("Invalid tick rate: {0} Hz")]
    InvalidTickRate(f64),
}
