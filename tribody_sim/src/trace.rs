//! Log renderer: prints the bodies through `tracing` instead of a plot.

use nalgebra::Vector3;
use tracing::{debug, info};
use tribody_core::Renderer;
use tribody_env::Frame;

/// Logs a summary every `every` draws.
pub struct TraceRenderer {
    every: u64,
    draws: u64,
    spread: f64,
}

impl TraceRenderer {
    pub fn new(every: u64) -> Self {
        Self {
            every: every.max(1),
            draws: 0,
            spread: 0.0,
        }
    }

    /// Draw calls so far (held frames included).
    pub fn draws(&self) -> u64 {
        self.draws
    }

    /// Largest distance from the origin in the last drawn frame.
    pub fn spread(&self) -> f64 {
        self.spread
    }
}

impl Renderer for TraceRenderer {
    fn draw(&mut self, positions: &[Vector3<f64>]) {
        self.draws += 1;
        self.spread = positions.iter().map(|p| p.norm()).fold(0.0, f64::max);

        if self.draws % self.every == 0 {
            for (i, p) in positions.iter().enumerate().take(8) {
                debug!("  body {:>2}: ({:>9.4}, {:>9.4}, {:>9.4})", i, p.x, p.y, p.z);
            }
        }
    }

    fn diagnostics(&mut self, frame: &Frame) {
        if self.draws % self.every == 0 {
            info!(
                "t={:>8.3}s | step={:>7} | bodies={} | E={:.9} | err={:.3e} | spread={:.3}",
                frame.sim_time,
                frame.step,
                frame.body_count(),
                frame.energy,
                frame.error,
                self.spread
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_counts_draws_and_spread() {
        let mut renderer = TraceRenderer::new(2);
        renderer.draw(&[Vector3::new(3.0, 4.0, 0.0), Vector3::new(1.0, 0.0, 0.0)]);
        renderer.draw(&[Vector3::new(0.0, 0.0, 2.0)]);

        assert_eq!(renderer.draws(), 2);
        assert_relative_eq!(renderer.spread(), 2.0);
    }
}
