//! Reference solvers standing in for the native integrator.
//!
//! # Velocity Verlet
//!
//! ```text
//! v(t + h/2) = v(t) + (h/2) a(t)
//! x(t + h)   = x(t) + h v(t + h/2)
//! v(t + h)   = v(t + h/2) + (h/2) a(t + h)
//! ```
//!
//! One frame step of length `dt` is split into `ceil(dt / sqrt(tol))`
//! substeps, so a tighter tolerance buys accuracy with more force
//! evaluations. The reported error is the relative drift of total energy
//! since initialization.

use std::str::FromStr;
use tribody_core::{BodyBuffers, SimulationState, Solver, SolverFault, StepReport};
use tribody_env::Body;

/// Upper bound on substeps per frame step.
const MAX_SUBSTEPS: usize = 4096;

/// Which reference solver to run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SolverKind {
    /// Direct-sum Newtonian gravity, velocity Verlet
    #[default]
    Verlet,

    /// Zero gravity, uniform motion
    Drift,
}

impl SolverKind {
    pub fn name(&self) -> &'static str {
        match self {
            SolverKind::Verlet => "verlet",
            SolverKind::Drift => "drift",
        }
    }

    /// Builds a fresh, uninitialized solver of this kind.
    pub fn build(&self) -> Box<dyn Solver> {
        match self {
            SolverKind::Verlet => Box::new(VerletSolver::default()),
            SolverKind::Drift => Box::new(DriftSolver::default()),
        }
    }
}

impl std::fmt::Display for SolverKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl FromStr for SolverKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "verlet" | "gravity" => Ok(SolverKind::Verlet),
            "drift" | "free" => Ok(SolverKind::Drift),
            _ => Err(format!("Unknown solver: {} (expected verlet or drift)", s)),
        }
    }
}

/// Closed-form uniform motion: `x(t) = x0 + v t`.
///
/// Reports kinetic energy (constant) and zero error.
#[derive(Debug, Default)]
pub struct DriftSolver {
    step_length: Option<f64>,
    time: f64,
}

impl Solver for DriftSolver {
    fn initialize(
        &mut self,
        initial_time: f64,
        step_length: f64,
        _tolerance: f64,
        _state: &SimulationState,
    ) -> Result<(), SolverFault> {
        self.time = initial_time;
        self.step_length = Some(step_length);
        Ok(())
    }

    fn step(&mut self, bodies: &mut [Body]) -> Result<StepReport, SolverFault> {
        let dt = self.step_length.ok_or(SolverFault::Uninitialized)?;
        for body in bodies.iter_mut() {
            body.position += body.velocity * dt;
        }
        self.time += dt;

        Ok(StepReport {
            time: self.time,
            error: 0.0,
            energy: bodies.iter().map(|b| 0.5 * b.mass * b.velocity.norm_squared()).sum(),
        })
    }
}

/// Velocity Verlet on column-major body buffers.
#[derive(Debug)]
pub struct VerletSolver {
    /// Gravitational constant (default: 1)
    pub gravity: f64,

    /// Plummer softening length (default: 1e-3)
    pub softening: f64,

    bound: Option<Bound>,
}

/// Everything fixed by `initialize`.
#[derive(Debug)]
struct Bound {
    time: f64,
    step_length: f64,
    substeps: usize,
    buffers: BodyBuffers,
    accel: Vec<f64>,
    initial_energy: f64,
}

impl Default for VerletSolver {
    fn default() -> Self {
        Self {
            gravity: 1.0,
            softening: 1e-3,
            bound: None,
        }
    }
}

impl VerletSolver {
    /// Substeps per frame step for the given tolerance.
    pub fn substeps_for(step_length: f64, tolerance: f64) -> usize {
        let n = (step_length.abs() / tolerance.sqrt()).ceil();
        if n.is_finite() {
            (n as usize).clamp(1, MAX_SUBSTEPS)
        } else {
            MAX_SUBSTEPS
        }
    }

    /// Substeps chosen at initialization.
    pub fn substeps(&self) -> Option<usize> {
        self.bound.as_ref().map(|b| b.substeps)
    }

    /// Kinetic plus potential energy of `buffers`.
    pub fn energy(&self, buffers: &BodyBuffers) -> f64 {
        let n = buffers.count;
        let eps2 = self.softening * self.softening;
        let mut kinetic = 0.0;
        let mut potential = 0.0;

        for i in 0..n {
            let v = buffers.velocity(i);
            kinetic += 0.5 * buffers.masses[i] * (v[0] * v[0] + v[1] * v[1] + v[2] * v[2]);

            let xi = buffers.position(i);
            for j in (i + 1)..n {
                let xj = buffers.position(j);
                let r2 = (0..3).map(|k| (xi[k] - xj[k]).powi(2)).sum::<f64>();
                let mm = buffers.masses[i] * buffers.masses[j];
                potential -= self.gravity * mm / (r2 + eps2).sqrt();
            }
        }
        kinetic + potential
    }

    /// Pairwise accelerations into `accel` (same column-major layout).
    fn accelerations(&self, buffers: &BodyBuffers, accel: &mut [f64]) {
        let n = buffers.count;
        let eps2 = self.softening * self.softening;
        accel.iter_mut().for_each(|a| *a = 0.0);

        for i in 0..n {
            let xi = buffers.position(i);
            for j in (i + 1)..n {
                let xj = buffers.position(j);
                let d = [xj[0] - xi[0], xj[1] - xi[1], xj[2] - xi[2]];
                let r2 = d[0] * d[0] + d[1] * d[1] + d[2] * d[2] + eps2;
                let inv_r3 = self.gravity / (r2 * r2.sqrt());

                for k in 0..3 {
                    accel[k * n + i] += buffers.masses[j] * d[k] * inv_r3;
                    accel[k * n + j] -= buffers.masses[i] * d[k] * inv_r3;
                }
            }
        }
    }
}

impl Solver for VerletSolver {
    fn initialize(
        &mut self,
        initial_time: f64,
        step_length: f64,
        tolerance: f64,
        state: &SimulationState,
    ) -> Result<(), SolverFault> {
        if !(step_length.is_finite() && step_length > 0.0) {
            return Err(SolverFault::Collaborator(format!("invalid step length {}", step_length)));
        }

        let buffers = BodyBuffers::pack(state.bodies());
        let mut accel = vec![0.0; 3 * buffers.count];
        self.accelerations(&buffers, &mut accel);
        let initial_energy = self.energy(&buffers);

        self.bound = Some(Bound {
            time: initial_time,
            step_length,
            substeps: Self::substeps_for(step_length, tolerance),
            buffers,
            accel,
            initial_energy,
        });
        Ok(())
    }

    fn step(&mut self, bodies: &mut [Body]) -> Result<StepReport, SolverFault> {
        let mut bound = self.bound.take().ok_or(SolverFault::Uninitialized)?;
        let result = self.advance(&mut bound, bodies);
        self.bound = Some(bound);
        result
    }
}

impl VerletSolver {
    fn advance(&self, bound: &mut Bound, bodies: &mut [Body]) -> Result<StepReport, SolverFault> {
        bound.buffers.refresh_from(bodies)?;

        let n3 = 3 * bound.buffers.count;
        let h = bound.step_length / bound.substeps as f64;
        let half = 0.5 * h;

        for _ in 0..bound.substeps {
            // Kick
            for k in 0..n3 {
                bound.buffers.velocities[k] += half * bound.accel[k];
            }
            // Drift
            for k in 0..n3 {
                bound.buffers.positions[k] += h * bound.buffers.velocities[k];
            }
            // Kick with the new accelerations
            self.accelerations(&bound.buffers, &mut bound.accel);
            for k in 0..n3 {
                bound.buffers.velocities[k] += half * bound.accel[k];
            }
        }

        bound.time += bound.step_length;
        bound.buffers.unpack_into(bodies)?;

        let energy = self.energy(&bound.buffers);
        let error = if bound.initial_energy != 0.0 {
            ((energy - bound.initial_energy) / bound.initial_energy).abs()
        } else {
            (energy - bound.initial_energy).abs()
        };

        Ok(StepReport {
            time: bound.time,
            error,
            energy,
        })
    }
}
