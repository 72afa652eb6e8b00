//! Message types carried by the Tribody control channel.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};

/// A single point mass.
///
/// Bodies are plain values: frames carry copies, never references into the
/// worker's simulation state.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Body {
    /// Mass (simulation units)
    pub mass: f64,

    /// Position [x, y, z]
    pub position: Vector3<f64>,

    /// Velocity [vx, vy, vz]
    pub velocity: Vector3<f64>,
}

impl Body {
    /// Creates a body from plain arrays.
    pub fn new(mass: f64, position: [f64; 3], velocity: [f64; 3]) -> Self {
        Self {
            mass,
            position: Vector3::from(position),
            velocity: Vector3::from(velocity),
        }
    }

    /// Returns true if every component is finite.
    pub fn is_finite(&self) -> bool {
        self.mass.is_finite()
            && self.position.iter().all(|c| c.is_finite())
            && self.velocity.iter().all(|c| c.is_finite())
    }
}

/// Snapshot produced by one solver step (worker → consumer).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Frame {
    /// 1-based index of the step that produced this frame
    pub step: u64,

    /// Simulated time after the step
    pub sim_time: f64,

    /// Solver-reported local error estimate
    pub error: f64,

    /// Solver-reported total energy
    pub energy: f64,

    /// Full copy of every body at `sim_time`
    pub bodies: Vec<Body>,
}

impl Frame {
    /// Returns the body positions in body order.
    pub fn positions(&self) -> Vec<Vector3<f64>> {
        self.bodies.iter().map(|b| b.position).collect()
    }

    /// Number of bodies in the snapshot.
    pub fn body_count(&self) -> usize {
        self.bodies.len()
    }
}

/// Control command (consumer → worker). No payload.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ControlCommand {
    /// Terminate the worker loop.
    Stop,
    /// Stop stepping until `Resume`.
    Pause,
    /// Continue stepping after `Pause`.
    Resume,
}

impl std::fmt::Display for ControlCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            ControlCommand::Stop => "STOP",
            ControlCommand::Pause => "PAUSE",
            ControlCommand::Resume => "RESUME",
        };
        write!(f, "{}", name)
    }
}

/// Envelope used when the channel crosses a byte stream.
///
/// One JSON document per line. The transport does not enforce direction;
/// correct callers only send `Command` towards the worker and `Frame` back.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "body", rename_all = "snake_case")]
pub enum WireMessage {
    Command(ControlCommand),
    Frame(Frame),
}

/// Capacity of the frame queue between worker and consumer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum QueueBound {
    /// Frames queue without limit; a slow consumer never throttles the worker.
    #[default]
    Unbounded,

    /// At most `n` frames wait; the worker backs off when the queue is full.
    Bounded(usize),
}

impl QueueBound {
    /// Maps `0` to `Unbounded`, anything else to `Bounded(n)`.
    pub fn from_capacity(capacity: usize) -> Self {
        if capacity == 0 {
            QueueBound::Unbounded
        } else {
            QueueBound::Bounded(capacity)
        }
    }
}

impl std::fmt::Display for QueueBound {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            QueueBound::Unbounded => write!(f, "unbounded"),
            QueueBound::Bounded(n) => write!(f, "bounded({})", n),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frame_positions_preserve_order() {
        let frame = Frame {
            step: 1,
            sim_time: 0.5,
            error: 0.0,
            energy: -1.0,
            bodies: vec![
                Body::new(1.0, [1.0, 0.0, 0.0], [0.0; 3]),
                Body::new(2.0, [0.0, 2.0, 0.0], [0.0; 3]),
            ],
        };

        let positions = frame.positions();
        assert_eq!(positions.len(), 2);
        assert_eq!(positions[0], Vector3::new(1.0, 0.0, 0.0));
        assert_eq!(positions[1], Vector3::new(0.0, 2.0, 0.0));
    }

    #[test]
    fn test_body_is_finite() {
        assert!(Body::new(1.0, [0.0; 3], [0.0; 3]).is_finite());
        assert!(!Body::new(1.0, [f64::NAN, 0.0, 0.0], [0.0; 3]).is_finite());
        assert!(!Body::new(f64::INFINITY, [0.0; 3], [0.0; 3]).is_finite());
    }

    #[test]
    fn test_wire_message_json_shape() {
        let json = serde_json::to_string(&WireMessage::Command(ControlCommand::Pause)).unwrap();
        assert_eq!(json, r#"{"kind":"command","body":"pause"}"#);
    }

    #[test]
    fn test_queue_bound_from_capacity() {
        assert_eq!(QueueBound::from_capacity(0), QueueBound::Unbounded);
        assert_eq!(QueueBound::from_capacity(8), QueueBound::Bounded(8));
    }
}
