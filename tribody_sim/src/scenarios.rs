//! Initial-condition presets.
//!
//! Every preset uses G = 1 units and produces a validated
//! [`SimulationState`] ready to hand to a worker.

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rand_distr::StandardNormal;
use thiserror::Error;
use tribody_core::{BodyInputs, SimulationState, ValidationError};

/// Chenciner-Montgomery figure-eight initial position of body 1.
const FIGURE_EIGHT_X1: [f64; 2] = [0.970_004_36, -0.243_087_53];

/// Chenciner-Montgomery figure-eight initial velocity of body 3.
const FIGURE_EIGHT_V3: [f64; 2] = [-0.932_407_37, -0.864_731_46];

/// Scenario identifiers
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScenarioId {
    /// Three unit masses on an equilateral triangle plus a test particle
    Triangle,

    /// Three unit masses chasing each other along a figure eight
    FigureEight,

    /// Two unit masses on a circular orbit
    Binary,

    /// Seeded random cluster
    Cluster,
}

/// Knobs shared by every preset.
#[derive(Debug, Clone)]
pub struct ScenarioParams {
    /// Solver tolerance
    pub tolerance: f64,

    /// Seed for randomized presets
    pub seed: u64,

    /// Body count for randomized presets (default: 16)
    pub bodies: usize,
}

impl Default for ScenarioParams {
    fn default() -> Self {
        Self {
            tolerance: tribody_core::DEFAULT_TOLERANCE,
            seed: 42,
            bodies: 16,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("Unknown scenario: {0} (try `tribody-sim list`)")]
pub struct UnknownScenario(String);

impl ScenarioId {
    /// Returns a list of all scenarios.
    pub fn all() -> Vec<ScenarioId> {
        vec![
            ScenarioId::Triangle,
            ScenarioId::FigureEight,
            ScenarioId::Binary,
            ScenarioId::Cluster,
        ]
    }

    /// Returns the scenario name.
    pub fn name(&self) -> &'static str {
        match self {
            ScenarioId::Triangle => "triangle",
            ScenarioId::FigureEight => "figure_eight",
            ScenarioId::Binary => "binary",
            ScenarioId::Cluster => "cluster",
        }
    }

    /// Returns a description of the scenario.
    pub fn description(&self) -> &'static str {
        match self {
            ScenarioId::Triangle => {
                "Built-in 4-body debug fixture: rotating triangle + massless test particle"
            }
            ScenarioId::FigureEight => {
                "Chenciner-Montgomery figure-eight choreography of three equal masses"
            }
            ScenarioId::Binary => "Equal-mass circular binary, separation 1, period 2*pi/sqrt(2)",
            ScenarioId::Cluster => {
                "Seeded Gaussian cluster at rest in its centre-of-mass frame (--bodies, --seed)"
            }
        }
    }

    /// Builds the initial state for this scenario.
    pub fn build(&self, params: &ScenarioParams) -> Result<SimulationState, ValidationError> {
        let inputs = match self {
            ScenarioId::Triangle => None,
            ScenarioId::FigureEight => Some(figure_eight()),
            ScenarioId::Binary => Some(binary()),
            ScenarioId::Cluster => Some(cluster(params.bodies, params.seed)),
        };
        SimulationState::from_inputs(inputs, params.tolerance)
    }
}

impl std::fmt::Display for ScenarioId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ScenarioId {
    type Err = UnknownScenario;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "triangle" | "debug" | "fixture" => Ok(ScenarioId::Triangle),
            "figure_eight" | "figure-eight" | "figure8" => Ok(ScenarioId::FigureEight),
            "binary" => Ok(ScenarioId::Binary),
            "cluster" => Ok(ScenarioId::Cluster),
            _ => Err(UnknownScenario(s.to_string())),
        }
    }
}

fn figure_eight() -> BodyInputs {
    let [x, y] = FIGURE_EIGHT_X1;
    let [vx, vy] = FIGURE_EIGHT_V3;

    BodyInputs {
        masses: vec![1.0; 3],
        positions: vec![[x, y, 0.0], [-x, -y, 0.0], [0.0, 0.0, 0.0]],
        velocities: vec![
            [-vx / 2.0, -vy / 2.0, 0.0],
            [-vx / 2.0, -vy / 2.0, 0.0],
            [vx, vy, 0.0],
        ],
    }
}

fn binary() -> BodyInputs {
    // v^2 / r = G m / d^2 with r = 0.5, d = 1
    let v = 0.5_f64.sqrt();
    BodyInputs {
        masses: vec![1.0, 1.0],
        positions: vec![[0.5, 0.0, 0.0], [-0.5, 0.0, 0.0]],
        velocities: vec![[0.0, v, 0.0], [0.0, -v, 0.0]],
    }
}

fn cluster(count: usize, seed: u64) -> BodyInputs {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let count = count.max(1);

    let mut masses = Vec::with_capacity(count);
    let mut positions = Vec::with_capacity(count);
    let mut velocities = Vec::with_capacity(count);

    for _ in 0..count {
        masses.push(rng.gen_range(0.5..1.5) / count as f64);
        positions.push(gaussian3(&mut rng, 1.0));
        velocities.push(gaussian3(&mut rng, 0.1));
    }

    // Remove net momentum so the cluster does not drift off screen
    let total: f64 = masses.iter().sum();
    let mut momentum = [0.0; 3];
    for (m, v) in masses.iter().zip(&velocities) {
        for k in 0..3 {
            momentum[k] += m * v[k];
        }
    }
    for v in velocities.iter_mut() {
        for k in 0..3 {
            v[k] -= momentum[k] / total;
        }
    }

    BodyInputs {
        masses,
        positions,
        velocities,
    }
}

fn gaussian3(rng: &mut ChaCha8Rng, scale: f64) -> [f64; 3] {
    [
        scale * rng.sample::<f64, _>(StandardNormal),
        scale * rng.sample::<f64, _>(StandardNormal),
        scale * rng.sample::<f64, _>(StandardNormal),
    ]
}
