//! Solver contract - the opaque integrator the worker delegates to.
//!
//! The core never integrates anything itself. It only requires the two
//! operations below and guards the calling discipline around them:
//!
//! 1. `initialize` exactly once, before any `step`
//! 2. no one but the solver touches the bodies between steps
//! 3. the body count never changes after `initialize`
//!
//! [`SolverSession`] enforces all three by construction.

use crate::error::SolverFault;
use crate::state::SimulationState;
use tribody_env::{Body, Frame};

/// What one solver step reports back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct StepReport {
    /// Simulated time after the step
    pub time: f64,

    /// Local error estimate
    pub error: f64,

    /// Total energy (conserved-quantity check)
    pub energy: f64,
}

/// External integrator contract.
///
/// Implementations may keep internal history (multi-step methods), which is
/// why the bodies must only ever be advanced through `step`.
pub trait Solver: Send {
    /// Binds the solver to a state layout. Called exactly once.
    fn initialize(
        &mut self,
        initial_time: f64,
        step_length: f64,
        tolerance: f64,
        state: &SimulationState,
    ) -> Result<(), SolverFault>;

    /// Advances `bodies` in place by one step length.
    ///
    /// The slice length equals the body count given to `initialize`.
    fn step(&mut self, bodies: &mut [Body]) -> Result<StepReport, SolverFault>;
}

impl<S: Solver + ?Sized> Solver for Box<S> {
    fn initialize(
        &mut self,
        initial_time: f64,
        step_length: f64,
        tolerance: f64,
        state: &SimulationState,
    ) -> Result<(), SolverFault> {
        (**self).initialize(initial_time, step_length, tolerance, state)
    }

    fn step(&mut self, bodies: &mut [Body]) -> Result<StepReport, SolverFault> {
        (**self).step(bodies)
    }
}

/// An initialized solver bound to the state it owns.
///
/// The only way to obtain one is [`SolverSession::start`], so `step` can never
/// run before `initialize`. The state is private: nothing outside the session
/// can mutate bodies between steps.
pub struct SolverSession<S: Solver> {
    solver: S,
    state: SimulationState,
    step_length: f64,
    steps: u64,
    sim_time: f64,
}

impl<S: Solver> SolverSession<S> {
    /// Initializes `solver` with `state` and takes ownership of both.
    pub fn start(
        mut solver: S,
        state: SimulationState,
        initial_time: f64,
        step_length: f64,
    ) -> Result<Self, SolverFault> {
        solver.initialize(initial_time, step_length, state.tolerance(), &state)?;
        Ok(Self {
            solver,
            state,
            step_length,
            steps: 0,
            sim_time: initial_time,
        })
    }

    /// Runs one solver step and snapshots the result.
    ///
    /// Non-finite diagnostics or bodies are reported as `Diverged`; a
    /// garbage frame is never produced.
    pub fn step(&mut self) -> Result<Frame, SolverFault> {
        let step = self.steps + 1;
        let report = self.solver.step(self.state.bodies_mut())?;

        if !(report.time.is_finite() && report.error.is_finite() && report.energy.is_finite()) {
            return Err(SolverFault::Diverged {
                step,
                detail: format!(
                    "non-finite report (t={}, err={}, E={})",
                    report.time, report.error, report.energy
                ),
            });
        }
        if let Some(index) = self.state.bodies().iter().position(|b| !b.is_finite()) {
            return Err(SolverFault::Diverged {
                step,
                detail: format!("body {} left the finite range", index),
            });
        }

        self.steps = step;
        self.sim_time = report.time;

        Ok(Frame {
            step,
            sim_time: report.time,
            error: report.error,
            energy: report.energy,
            bodies: self.state.bodies().to_vec(),
        })
    }

    /// Steps completed so far.
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Simulated time after the last completed step.
    pub fn sim_time(&self) -> f64 {
        self.sim_time
    }

    pub fn step_length(&self) -> f64 {
        self.step_length
    }

    pub fn body_count(&self) -> usize {
        self.state.len()
    }
}

/// Bodies in the collaborator's buffer layout.
///
/// Positions and velocities are `N x 3` column-major: all x components, then
/// all y, then all z. The layout is fixed to `N` for the life of a solver.
#[derive(Debug, Clone, PartialEq)]
pub struct BodyBuffers {
    pub count: usize,
    pub masses: Vec<f64>,
    pub positions: Vec<f64>,
    pub velocities: Vec<f64>,
}

impl BodyBuffers {
    /// Packs bodies into column-major buffers.
    pub fn pack(bodies: &[Body]) -> Self {
        let n = bodies.len();
        let mut positions = vec![0.0; 3 * n];
        let mut velocities = vec![0.0; 3 * n];
        for (i, body) in bodies.iter().enumerate() {
            for k in 0..3 {
                positions[k * n + i] = body.position[k];
                velocities[k * n + i] = body.velocity[k];
            }
        }
        Self {
            count: n,
            masses: bodies.iter().map(|b| b.mass).collect(),
            positions,
            velocities,
        }
    }

    /// Writes positions and velocities back. Masses are left as they are.
    pub fn unpack_into(&self, bodies: &mut [Body]) -> Result<(), SolverFault> {
        if bodies.len() != self.count {
            return Err(SolverFault::LayoutMismatch {
                expected: self.count,
                found: bodies.len(),
            });
        }
        let n = self.count;
        for (i, body) in bodies.iter_mut().enumerate() {
            for k in 0..3 {
                body.position[k] = self.positions[k * n + i];
                body.velocity[k] = self.velocities[k * n + i];
            }
        }
        Ok(())
    }

    /// Copies positions and velocities from `bodies` into the existing buffers.
    pub fn refresh_from(&mut self, bodies: &[Body]) -> Result<(), SolverFault> {
        if bodies.len() != self.count {
            return Err(SolverFault::LayoutMismatch {
                expected: self.count,
                found: bodies.len(),
            });
        }
        let n = self.count;
        for (i, body) in bodies.iter().enumerate() {
            for k in 0..3 {
                self.positions[k * n + i] = body.position[k];
                self.velocities[k * n + i] = body.velocity[k];
            }
        }
        Ok(())
    }

    /// Position of body `i` as `[x, y, z]`.
    pub fn position(&self, i: usize) -> [f64; 3] {
        let n = self.count;
        [self.positions[i], self.positions[n + i], self.positions[2 * n + i]]
    }

    /// Velocity of body `i` as `[vx, vy, vz]`.
    pub fn velocity(&self, i: usize) -> [f64; 3] {
        let n = self.count;
        [self.velocities[i], self.velocities[n + i], self.velocities[2 * n + i]]
    }
}
