//! Render loop - the fixed-cadence consumer of worker frames.
//!
//! # Tick Protocol
//!
//! ```text
//! prime():  blocking recv ──▶ draw            (first tick only)
//! tick():   try_recv ──┬── frame ──────────────────▶ draw
//!                      └── empty ──▶ OVERRUN ──┬── Block:    recv().await ──▶ draw
//!                                              └── HoldLast: redraw previous frame
//! ```
//!
//! An overrun means production is not keeping pace with the display rate.
//! It is advisory: it is logged and counted, never returned as an error.
//! The channel closing without a `Stop` from this side is a fatal
//! transport fault: the timer stops and the error is surfaced. The one
//! exception is a worker that ran to its configured step limit: the stream
//! closing right after that final frame is a normal end.

use crate::error::RenderError;
use nalgebra::Vector3;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};
use tribody_env::{ConsumerEndpoint, ControlCommand, Frame, TransportError};

/// Rendering collaborator.
///
/// Receives body positions once per tick. Nothing it returns is consumed.
pub trait Renderer: Send {
    /// Updates every body's displayed position.
    fn draw(&mut self, positions: &[Vector3<f64>]);

    /// Optional diagnostic display (error estimate, energy).
    fn diagnostics(&mut self, _frame: &Frame) {}
}

impl<R: Renderer + ?Sized> Renderer for Box<R> {
    fn draw(&mut self, positions: &[Vector3<f64>]) {
        (**self).draw(positions)
    }

    fn diagnostics(&mut self, frame: &Frame) {
        (**self).diagnostics(frame)
    }
}

/// What a tick does when no frame is waiting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OverrunPolicy {
    /// Wait for the next frame (the tick runs late)
    #[default]
    Block,

    /// Redraw the previously rendered frame and move on
    HoldLast,
}

/// Configuration for the render loop.
#[derive(Debug, Clone)]
pub struct RenderConfig {
    /// Target ticks per second (default: 60)
    pub tick_rate_hz: f64,

    /// Behaviour on overrun (default: Block)
    pub overrun_policy: OverrunPolicy,

    /// Stop the worker after this many ticks (default: unlimited)
    pub max_ticks: Option<u64>,

    /// The worker's step limit, if it has one. The stream closing after the
    /// frame of that step ends the loop normally.
    pub step_limit: Option<u64>,
}

impl Default for RenderConfig {
    fn default() -> Self {
        Self {
            tick_rate_hz: 60.0,
            overrun_policy: OverrunPolicy::Block,
            max_ticks: None,
            step_limit: None,
        }
    }
}

impl RenderConfig {
    /// Wall-clock time between ticks.
    ///
    /// Fails for rates whose period is not a positive, representable
    /// `Duration` (zero, negative, NaN, or absurdly small or large).
    pub fn tick_period(&self) -> Result<Duration, RenderError> {
        Duration::try_from_secs_f64(self.tick_rate_hz.recip())
            .ok()
            .filter(|period| !period.is_zero())
            .ok_or(RenderError::InvalidTickRate(self.tick_rate_hz))
    }
}

/// Result of a single tick.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// A new frame was drawn; `overrun` if the tick had to wait for it
    Fresh {
        step: u64,
        sim_time: f64,
        overrun: bool,
    },

    /// Overrun under `HoldLast`: the previous frame was redrawn
    Held { step: u64 },

    /// The worker finished after this side asked it to stop
    EndOfStream,
}

/// Counters kept across ticks.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RenderStats {
    /// Ticks executed, including the priming tick
    pub ticks: u64,

    /// Frames drawn
    pub frames_rendered: u64,

    /// Ticks that found no frame waiting
    pub overruns: u64,

    /// Overrun ticks that redrew the previous frame
    pub held: u64,

    /// Frames received after `Stop` and dropped undrawn
    pub discarded: u64,

    /// Simulated time of the newest drawn frame
    pub last_sim_time: f64,
}

/// Everything the loop hands back when it ends.
pub struct RenderSummary<R> {
    pub stats: RenderStats,
    pub last_frame: Option<Frame>,
    pub renderer: R,
}

/// A loop that ended on a fault, with what it managed to draw before.
#[derive(Debug, Error)]
#[error("{error} (after {} frames)", .stats.frames_rendered)]
pub struct RenderFailure {
    pub error: RenderError,
    pub stats: RenderStats,
    pub last_frame: Option<Frame>,
}

/// Fixed-rate consumer of worker frames.
///
/// The previously rendered frame lives here, not in any global, so the
/// `HoldLast` policy and diagnostics always see the loop's own state.
pub struct RenderLoop<E, R>
where
    E: ConsumerEndpoint,
    R: Renderer,
{
    endpoint: E,
    renderer: R,
    config: RenderConfig,
    stats: RenderStats,
    current: Option<Frame>,
}

impl<E, R> RenderLoop<E, R>
where
    E: ConsumerEndpoint,
    R: Renderer,
{
    pub fn new(endpoint: E, renderer: R, config: RenderConfig) -> Self {
        Self {
            endpoint,
            renderer,
            config,
            stats: RenderStats::default(),
            current: None,
        }
    }

    pub fn stats(&self) -> &RenderStats {
        &self.stats
    }

    /// The most recently drawn frame.
    pub fn current_frame(&self) -> Option<&Frame> {
        self.current.as_ref()
    }

    pub fn renderer(&self) -> &R {
        &self.renderer
    }

    pub fn pause(&self) -> Result<(), RenderError> {
        self.command(ControlCommand::Pause)
    }

    pub fn resume(&self) -> Result<(), RenderError> {
        self.command(ControlCommand::Resume)
    }

    pub fn stop(&self) -> Result<(), RenderError> {
        self.command(ControlCommand::Stop)
    }

    fn command(&self, command: ControlCommand) -> Result<(), RenderError> {
        debug!("Render loop sending {}", command);
        self.endpoint.send_command(command).map_err(RenderError::from)
    }

    /// First tick: waits for the first frame.
    ///
    /// There is nothing sensible to show before one exists.
    pub async fn prime(&mut self) -> Result<TickOutcome, RenderError> {
        self.stats.ticks += 1;
        match self.endpoint.recv_frame().await {
            Some(frame) => Ok(self.show(frame, false)),
            None => self.closed(),
        }
    }

    /// One timer tick.
    pub async fn tick(&mut self) -> Result<TickOutcome, RenderError> {
        if self.current.is_none() {
            return self.prime().await;
        }
        self.stats.ticks += 1;

        match self.endpoint.try_recv_frame() {
            Ok(Some(frame)) => Ok(self.show(frame, false)),
            Ok(None) => {
                self.stats.overruns += 1;
                warn!(
                    "can't keep up! no frame ready at tick {} ({} overruns)",
                    self.stats.ticks, self.stats.overruns
                );
                match self.config.overrun_policy {
                    OverrunPolicy::Block => match self.endpoint.recv_frame().await {
                        Some(frame) => Ok(self.show(frame, true)),
                        None => self.closed(),
                    },
                    OverrunPolicy::HoldLast => Ok(self.hold()),
                }
            }
            Err(TransportError::Closed) => self.closed(),
            Err(e) => Err(e.into()),
        }
    }

    /// Drives ticks from a fixed-rate timer until the stream ends.
    ///
    /// Ends normally when a `Stop` was issued (by this loop on `max_ticks`, or
    /// through a control handle). Remaining queued frames are then drained
    /// without drawing until the worker closes its end. On a fault the stats
    /// gathered so far come back with the error.
    pub async fn run(mut self) -> Result<RenderSummary<R>, RenderFailure> {
        info!(
            "Render loop starting at {:.1} Hz ({:?} on overrun)",
            self.config.tick_rate_hz, self.config.overrun_policy
        );

        match self.drive().await {
            Ok(()) => Ok(self.finish()),
            Err(error) => Err(RenderFailure {
                error,
                stats: self.stats,
                last_frame: self.current,
            }),
        }
    }

    async fn drive(&mut self) -> Result<(), RenderError> {
        let period = self.config.tick_period()?;

        if self.prime().await? == TickOutcome::EndOfStream {
            return Ok(());
        }

        let mut interval = tokio::time::interval(period);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first interval tick completes immediately; priming used it
        interval.tick().await;

        loop {
            if self.endpoint.stop_requested() {
                break;
            }
            if self.config.max_ticks.is_some_and(|max| self.stats.ticks >= max) {
                if let Err(e) = self.stop() {
                    debug!("Stop after max ticks not delivered: {}", e);
                }
                break;
            }

            interval.tick().await;
            if self.tick().await? == TickOutcome::EndOfStream {
                return Ok(());
            }
        }

        while self.endpoint.recv_frame().await.is_some() {
            self.stats.discarded += 1;
        }
        Ok(())
    }

    fn show(&mut self, frame: Frame, overrun: bool) -> TickOutcome {
        self.renderer.draw(&frame.positions());
        self.renderer.diagnostics(&frame);

        self.stats.frames_rendered += 1;
        self.stats.last_sim_time = frame.sim_time;
        if self.stats.frames_rendered % 600 == 0 {
            debug!(
                "t={:.3} step={} E={:.9} err={:.3e}",
                frame.sim_time, frame.step, frame.energy, frame.error
            );
        }

        let outcome = TickOutcome::Fresh {
            step: frame.step,
            sim_time: frame.sim_time,
            overrun,
        };
        self.current = Some(frame);
        outcome
    }

    fn hold(&mut self) -> TickOutcome {
        self.stats.held += 1;
        match &self.current {
            Some(frame) => {
                self.renderer.draw(&frame.positions());
                TickOutcome::Held { step: frame.step }
            }
            None => TickOutcome::Held { step: 0 },
        }
    }

    fn closed(&self) -> Result<TickOutcome, RenderError> {
        let last_step = self.current.as_ref().map(|frame| frame.step);
        if self.endpoint.stop_requested() {
            Ok(TickOutcome::EndOfStream)
        } else if let (Some(limit), Some(step)) = (self.config.step_limit, last_step) {
            if step >= limit {
                info!("Worker finished its {} steps", limit);
                Ok(TickOutcome::EndOfStream)
            } else {
                error!("Frame stream closed at step {} of {}", step, limit);
                Err(RenderError::Transport(TransportError::Closed))
            }
        } else {
            error!("Frame stream closed without a stop request");
            Err(RenderError::Transport(TransportError::Closed))
        }
    }

    fn finish(self) -> RenderSummary<R> {
        info!(
            "Render loop finished: {} ticks, {} frames, {} overruns",
            self.stats.ticks, self.stats.frames_rendered, self.stats.overruns
        );
        RenderSummary {
            stats: self.stats,
            last_frame: self.current,
            renderer: self.renderer,
        }
    }
}
