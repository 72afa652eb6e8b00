//! JSON exporter for offline plotting.
//!
//! Records every n-th rendered frame and writes one JSON document at the
//! end of the run.

use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;
use tribody_core::Renderer;
use tribody_env::Frame;

/// One exported frame.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportFrame {
    /// Solver step that produced the frame
    pub step: u64,

    /// Simulation time in seconds
    pub time_sec: f64,

    /// Total energy
    pub energy: f64,

    /// Solver error estimate
    pub error: f64,

    /// Body positions in index order
    pub bodies: Vec<BodyPosition>,
}

/// Position of a body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BodyPosition {
    pub index: usize,
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl BodyPosition {
    pub fn new(index: usize, pos: Vector3<f64>) -> Self {
        Self {
            index,
            x: pos.x,
            y: pos.y,
            z: pos.z,
        }
    }
}

/// Complete run export.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimExport {
    /// Scenario name
    pub scenario: String,

    /// Seed used
    pub seed: u64,

    /// Simulated duration covered by the frames
    pub duration_sec: f64,

    /// Recorded frames
    pub frames: Vec<ExportFrame>,

    /// Render ticks that found no frame waiting
    pub overruns: u64,

    /// True when the pipeline ended without a fault
    pub clean: bool,
}

impl SimExport {
    /// Creates a new export container.
    pub fn new(scenario: &str, seed: u64) -> Self {
        Self {
            scenario: scenario.to_string(),
            seed,
            duration_sec: 0.0,
            frames: Vec::new(),
            overruns: 0,
            clean: false,
        }
    }

    /// Adds a frame.
    pub fn add_frame(&mut self, frame: &Frame) {
        self.duration_sec = frame.sim_time;
        self.frames.push(ExportFrame {
            step: frame.step,
            time_sec: frame.sim_time,
            energy: frame.energy,
            error: frame.error,
            bodies: frame
                .bodies
                .iter()
                .enumerate()
                .map(|(i, b)| BodyPosition::new(i, b.position))
                .collect(),
        });
    }

    /// Finalizes the export.
    pub fn finalize(&mut self, clean: bool, overruns: u64) {
        self.clean = clean;
        self.overruns = overruns;
    }

    /// Writes to a JSON file.
    pub fn write_to_file<P: AsRef<Path>>(&self, path: P) -> std::io::Result<()> {
        let json = serde_json::to_string_pretty(self)?;
        let mut file = File::create(path)?;
        file.write_all(json.as_bytes())?;
        Ok(())
    }
}

/// Renderer that records frames into a [`SimExport`].
pub struct ExportRenderer {
    export: SimExport,
    every: u64,
    seen: u64,
}

impl ExportRenderer {
    /// Records one frame out of every `every` (minimum 1).
    pub fn new(scenario: &str, seed: u64, every: u64) -> Self {
        Self {
            export: SimExport::new(scenario, seed),
            every: every.max(1),
            seen: 0,
        }
    }

    pub fn into_export(self) -> SimExport {
        self.export
    }
}

impl Renderer for ExportRenderer {
    fn draw(&mut self, _positions: &[Vector3<f64>]) {}

    fn diagnostics(&mut self, frame: &Frame) {
        if self.seen % self.every == 0 {
            self.export.add_frame(frame);
        }
        self.seen += 1;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tribody_env::Body;

    fn frame(step: u64) -> Frame {
        Frame {
            step,
            sim_time: step as f64 * 0.5,
            error: 1e-9,
            energy: -0.5,
            bodies: vec![
                Body::new(1.0, [step as f64, 0.0, 0.0], [0.0; 3]),
                Body::new(1.0, [0.0, -(step as f64), 0.0], [0.0; 3]),
            ],
        }
    }

    #[test]
    fn test_records_every_nth_frame() {
        let mut renderer = ExportRenderer::new("binary", 42, 3);
        for step in 1..=7 {
            let f = frame(step);
            renderer.draw(&f.positions());
            renderer.diagnostics(&f);
        }

        let export = renderer.into_export();
        let steps: Vec<u64> = export.frames.iter().map(|f| f.step).collect();
        assert_eq!(steps, vec![1, 4, 7]);
        assert_eq!(export.duration_sec, 3.5);
        assert_eq!(export.frames[2].bodies[1].y, -7.0);
    }

    #[test]
    fn test_writes_json_document() {
        let mut renderer = ExportRenderer::new("triangle", 7, 1);
        renderer.diagnostics(&frame(1));
        let mut export = renderer.into_export();
        export.finalize(true, 2);

        let path = std::env::temp_dir().join(format!("tribody-export-{}.json", std::process::id()));
        export.write_to_file(&path).unwrap();

        let text = std::fs::read_to_string(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        let value: serde_json::Value = serde_json::from_str(&text).unwrap();

        assert_eq!(value["scenario"], "triangle");
        assert_eq!(value["seed"], 7);
        assert_eq!(value["overruns"], 2);
        assert_eq!(value["clean"], true);
        assert_eq!(value["frames"][0]["bodies"][0]["x"], 1.0);
    }
}
