//! Simulation state - the bodies a worker integrates.
//!
//! A `SimulationState` is built and edited by its creator, then moved into a
//! [`Worker`](crate::worker::Worker). Ownership transfer is the handoff: once
//! moved, the creator can no longer read or write it, and the worker is the
//! single writer for the rest of the run.

use crate::error::ValidationError;
use nalgebra::Vector3;
use tribody_env::Body;

/// Default solver error bound.
pub const DEFAULT_TOLERANCE: f64 = 1e-3;

/// Raw per-body arrays, as accepted by [`SimulationState::from_inputs`].
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BodyInputs {
    pub masses: Vec<f64>,
    pub positions: Vec<[f64; 3]>,
    pub velocities: Vec<[f64; 3]>,
}

/// Partial update for [`SimulationState::set_body`]. `None` fields are left alone.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct BodyUpdate {
    pub mass: Option<f64>,
    pub position: Option<[f64; 3]>,
    pub velocity: Option<[f64; 3]>,
}

impl BodyUpdate {
    pub fn mass(mass: f64) -> Self {
        Self {
            mass: Some(mass),
            ..Default::default()
        }
    }

    pub fn position(position: [f64; 3]) -> Self {
        Self {
            position: Some(position),
            ..Default::default()
        }
    }

    pub fn velocity(velocity: [f64; 3]) -> Self {
        Self {
            velocity: Some(velocity),
            ..Default::default()
        }
    }
}

/// Ordered set of N bodies plus the solver tolerance.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulationState {
    bodies: Vec<Body>,
    tolerance: f64,
}

impl SimulationState {
    /// Creates a state from parallel arrays.
    ///
    /// # Errors
    /// * `LengthMismatch` - the three arrays differ in length
    /// * `InvalidTolerance` - tolerance is not finite and positive
    /// * `NonFinite` - any input component is NaN or infinite
    pub fn new(
        masses: &[f64],
        positions: &[[f64; 3]],
        velocities: &[[f64; 3]],
        tolerance: f64,
    ) -> Result<Self, ValidationError> {
        if masses.len() != positions.len() || positions.len() != velocities.len() {
            return Err(ValidationError::LengthMismatch {
                masses: masses.len(),
                positions: positions.len(),
                velocities: velocities.len(),
            });
        }
        check_tolerance(tolerance)?;

        let bodies = masses
            .iter()
            .zip(positions)
            .zip(velocities)
            .enumerate()
            .map(|(index, ((&m, &x), &v))| {
                let body = Body::new(m, x, v);
                if body.is_finite() {
                    Ok(body)
                } else {
                    Err(ValidationError::NonFinite { index })
                }
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Self { bodies, tolerance })
    }

    /// Creates a state from optional inputs, falling back to the debug
    /// fixture when none are given.
    pub fn from_inputs(
        inputs: Option<BodyInputs>,
        tolerance: f64,
    ) -> Result<Self, ValidationError> {
        match inputs {
            Some(BodyInputs {
                masses,
                positions,
                velocities,
            }) => Self::new(&masses, &positions, &velocities, tolerance),
            None => {
                check_tolerance(tolerance)?;
                Ok(Self {
                    bodies: debug_fixture_bodies(),
                    tolerance,
                })
            }
        }
    }

    /// The built-in 4-body fixture used for debug/demo runs.
    ///
    /// Three unit masses on an equilateral triangle of side 2 moving on the
    /// Lagrange choreography, plus one massless test particle at the origin.
    pub fn debug_fixture() -> Self {
        Self {
            bodies: debug_fixture_bodies(),
            tolerance: DEFAULT_TOLERANCE,
        }
    }

    /// Adds one body at the end. Existing bodies keep their indices.
    ///
    /// A body with a NaN or infinite component is rejected and the state is
    /// left unchanged.
    pub fn append_body(
        &mut self,
        mass: f64,
        position: [f64; 3],
        velocity: [f64; 3],
    ) -> Result<(), ValidationError> {
        let body = Body::new(mass, position, velocity);
        if !body.is_finite() {
            return Err(ValidationError::NonFinite {
                index: self.bodies.len(),
            });
        }
        self.bodies.push(body);
        Ok(())
    }

    /// Partially updates the body at `index` in place.
    ///
    /// The update is applied only if the resulting body is finite.
    pub fn set_body(&mut self, index: usize, update: BodyUpdate) -> Result<(), ValidationError> {
        let count = self.bodies.len();
        let body = self
            .bodies
            .get_mut(index)
            .ok_or(ValidationError::IndexOutOfRange { index, count })?;

        let mut updated = *body;
        if let Some(mass) = update.mass {
            updated.mass = mass;
        }
        if let Some(position) = update.position {
            updated.position = Vector3::from(position);
        }
        if let Some(velocity) = update.velocity {
            updated.velocity = Vector3::from(velocity);
        }
        if !updated.is_finite() {
            return Err(ValidationError::NonFinite { index });
        }

        *body = updated;
        Ok(())
    }

    /// Returns a copy of the body at `index`.
    pub fn get_body(&self, index: usize) -> Result<Body, ValidationError> {
        self.bodies
            .get(index)
            .copied()
            .ok_or(ValidationError::IndexOutOfRange {
                index,
                count: self.bodies.len(),
            })
    }

    pub fn len(&self) -> usize {
        self.bodies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.bodies.is_empty()
    }

    pub fn tolerance(&self) -> f64 {
        self.tolerance
    }

    pub fn bodies(&self) -> &[Body] {
        &self.bodies
    }

    /// Fixed-length view for the solver session.
    pub(crate) fn bodies_mut(&mut self) -> &mut [Body] {
        &mut self.bodies
    }

    /// Total mass of all bodies.
    pub fn total_mass(&self) -> f64 {
        self.bodies.iter().map(|b| b.mass).sum()
    }

    /// Mass-weighted mean position, or `None` when the total mass is zero.
    pub fn center_of_mass(&self) -> Option<Vector3<f64>> {
        let total = self.total_mass();
        if total == 0.0 {
            return None;
        }
        let weighted = self
            .bodies
            .iter()
            .fold(Vector3::zeros(), |acc, b| acc + b.position * b.mass);
        Some(weighted / total)
    }
}

fn check_tolerance(tolerance: f64) -> Result<(), ValidationError> {
    if tolerance.is_finite() && tolerance > 0.0 {
        Ok(())
    } else {
        Err(ValidationError::InvalidTolerance(tolerance))
    }
}

fn debug_fixture_bodies() -> Vec<Body> {
    let s = 0.5_f64.sqrt();
    let c = 1.5_f64.sqrt();
    vec![
        Body::new(1.0, [0.0, 3.0_f64.sqrt(), 0.0], [-s, 0.0, 0.0]),
        Body::new(1.0, [-1.0, 0.0, 0.0], [s * 0.5, -c * 0.5, 0.0]),
        Body::new(1.0, [1.0, 0.0, 0.0], [s * 0.5, c * 0.5, 0.0]),
        Body::new(0.0, [0.0, 0.0, 0.0], [0.0, 0.0, 0.0]),
    ]
}
