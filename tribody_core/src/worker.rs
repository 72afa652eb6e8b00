//! Worker - the background unit that owns the state and drives the solver.
//!
//! # State Machine
//!
//! ```text
//! Created ──▶ Initializing ──▶ Running ◀──▶ Paused
//!                  │              │            │
//!                  └──────────────┴────────────┴──▶ Stopped (terminal)
//! ```
//!
//! Each loop iteration drains every pending command in arrival order, then
//! either steps once (Running) or sleeps a short interval (Paused). The
//! worker never paces itself to wall-clock time: while Running it produces
//! frames as fast as the solver allows.

use crate::error::SolverFault;
use crate::solver::{Solver, SolverSession};
use crate::state::SimulationState;
use serde::Serialize;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};
use tribody_env::{ControlCommand, Frame, SendError, TransportError, WorkerEndpoint};

/// Configuration for a worker.
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    /// Frames per simulated second; the step length is `1 / fps`
    pub fps: f64,

    /// Simulated time at initialization
    pub initial_time: f64,

    /// Sleep between command polls while paused (default: 100ms)
    pub pause_poll_interval: Duration,

    /// Sleep before retrying a send on a full bounded queue (default: 1ms)
    pub full_queue_backoff: Duration,

    /// Exit after this many steps (default: run until stopped)
    pub step_limit: Option<u64>,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self {
            fps: 60.0,
            initial_time: 0.0,
            pause_poll_interval: Duration::from_millis(100),
            full_queue_backoff: Duration::from_millis(1),
            step_limit: None,
        }
    }
}

impl WorkerConfig {
    /// Simulated seconds advanced per step.
    pub fn step_length(&self) -> f64 {
        1.0 / self.fps
    }
}

/// Lifecycle status of a worker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerStatus {
    Created,
    Initializing,
    Running,
    Paused,
    Stopped,
}

/// Why a worker reached `Stopped`.
#[derive(Debug, Clone, PartialEq)]
pub enum WorkerExit {
    /// `Stop` command received
    Stopped,

    /// Configured step limit reached
    StepLimit,

    /// Solver failed (initialization or step)
    SolverFault(SolverFault),

    /// Channel closed or broken
    Transport(TransportError),
}

impl WorkerExit {
    /// True for the exits that were asked for.
    pub fn is_clean(&self) -> bool {
        matches!(self, WorkerExit::Stopped | WorkerExit::StepLimit)
    }
}

/// Summary returned when a worker finishes.
#[derive(Debug, Clone, PartialEq)]
pub struct WorkerReport {
    pub status: WorkerStatus,
    pub exit: WorkerExit,

    /// Solver steps completed
    pub steps: u64,

    /// Frames accepted by the channel (a frame stepped while a full queue
    /// was interrupted by `Stop` is never sent)
    pub frames_sent: u64,

    /// Simulated time after the last completed step
    pub sim_time: f64,
}

/// Outcome of draining the command queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Drained {
    /// Keep looping in the given status
    Continue(WorkerStatus),

    /// A `Stop` was seen; remaining commands are ignored
    Stop,
}

/// Applies one command to a status.
///
/// Only a live worker (Running or Paused) moves; `Stop` always wins.
pub fn apply_command(status: WorkerStatus, command: ControlCommand) -> Drained {
    match (status, command) {
        (_, ControlCommand::Stop) => Drained::Stop,
        (WorkerStatus::Running | WorkerStatus::Paused, ControlCommand::Pause) => {
            Drained::Continue(WorkerStatus::Paused)
        }
        (WorkerStatus::Running | WorkerStatus::Paused, ControlCommand::Resume) => {
            Drained::Continue(WorkerStatus::Running)
        }
        (other, _) => Drained::Continue(other),
    }
}

/// Takes every command currently available, in arrival order.
///
/// Never blocks. A `Pause` followed by `Resume` in the same batch nets to
/// `Running`.
pub fn drain_commands<E: WorkerEndpoint>(
    endpoint: &mut E,
    mut status: WorkerStatus,
) -> Result<Drained, TransportError> {
    while let Some(command) = endpoint.poll_command()? {
        debug!("Worker received {}", command);
        match apply_command(status, command) {
            Drained::Stop => return Ok(Drained::Stop),
            Drained::Continue(next) => status = next,
        }
    }
    Ok(Drained::Continue(status))
}

/// The simulation worker.
///
/// Owns one solver, one state and the worker end of the channel. Generic
/// over both so tests can plug in closed-form solvers and in-process
/// channels while production uses the real collaborator and, optionally, a
/// process boundary.
pub struct Worker<S, E>
where
    S: Solver,
    E: WorkerEndpoint,
{
    solver: S,
    state: SimulationState,
    endpoint: E,
    config: WorkerConfig,
    status: WorkerStatus,
}

impl<S, E> Worker<S, E>
where
    S: Solver + 'static,
    E: WorkerEndpoint,
{
    /// Creates a worker. Takes ownership of the state (the handoff).
    pub fn new(solver: S, state: SimulationState, endpoint: E, config: WorkerConfig) -> Self {
        Self {
            solver,
            state,
            endpoint,
            config,
            status: WorkerStatus::Created,
        }
    }

    pub fn status(&self) -> WorkerStatus {
        self.status
    }

    /// Runs the worker on a dedicated OS thread.
    pub fn spawn(self) -> std::io::Result<WorkerHandle> {
        let inner = thread::Builder::new()
            .name("tribody-worker".to_string())
            .spawn(move || self.run())?;
        Ok(WorkerHandle { inner })
    }

    /// Runs the stepping loop on the current thread until it stops.
    ///
    /// Solver, state and endpoint are all dropped on return, which closes
    /// the frame stream for the consumer.
    pub fn run(self) -> WorkerReport {
        let Worker {
            solver,
            state,
            mut endpoint,
            config,
            mut status,
        } = self;

        status = transition(status, WorkerStatus::Initializing);
        let body_count = state.len();
        let tolerance = state.tolerance();
        let step_length = config.step_length();

        let started = SolverSession::start(solver, state, config.initial_time, step_length);
        let mut session = match started {
            Ok(session) => session,
            Err(fault) => {
                error!("Solver initialization failed: {}", fault);
                return WorkerReport {
                    status: transition(status, WorkerStatus::Stopped),
                    exit: WorkerExit::SolverFault(fault),
                    steps: 0,
                    frames_sent: 0,
                    sim_time: config.initial_time,
                };
            }
        };

        info!(
            "Worker started: {} bodies, dt={:.6}, tol={:e}",
            body_count, step_length, tolerance
        );
        status = transition(status, WorkerStatus::Running);
        let mut frames_sent = 0;

        let exit = loop {
            match drain_commands(&mut endpoint, status) {
                Ok(Drained::Stop) => break WorkerExit::Stopped,
                Ok(Drained::Continue(next)) => status = transition(status, next),
                Err(e) => break WorkerExit::Transport(e),
            }

            if status == WorkerStatus::Paused {
                thread::sleep(config.pause_poll_interval);
                continue;
            }

            if config.step_limit.is_some_and(|limit| session.steps() >= limit) {
                break WorkerExit::StepLimit;
            }

            let frame = match session.step() {
                Ok(frame) => frame,
                Err(fault) => {
                    error!("Solver fault after {} steps: {}", session.steps(), fault);
                    break WorkerExit::SolverFault(fault);
                }
            };

            match deliver(&mut endpoint, frame, &config, &mut status) {
                Ok(Delivery::Sent) => frames_sent += 1,
                Ok(Delivery::Stopped) => break WorkerExit::Stopped,
                Err(e) => break WorkerExit::Transport(e),
            }
        };

        let status = transition(status, WorkerStatus::Stopped);
        match &exit {
            WorkerExit::Transport(e) => warn!("Worker lost its channel: {}", e),
            other => info!(
                "Worker stopped ({:?}) after {} steps, t={:.4}",
                other,
                session.steps(),
                session.sim_time()
            ),
        }

        WorkerReport {
            status,
            exit,
            steps: session.steps(),
            frames_sent,
            sim_time: session.sim_time(),
        }
    }
}

fn transition(from: WorkerStatus, to: WorkerStatus) -> WorkerStatus {
    if from != to {
        debug!("Worker {:?} -> {:?}", from, to);
    }
    to
}

enum Delivery {
    Sent,
    Stopped,
}

/// Pushes one frame, waiting out a full bounded queue.
///
/// While waiting, commands are still drained so `Stop` is honoured; a
/// `Pause` takes effect once the pending frame is out.
fn deliver<E: WorkerEndpoint>(
    endpoint: &mut E,
    frame: Frame,
    config: &WorkerConfig,
    status: &mut WorkerStatus,
) -> Result<Delivery, TransportError> {
    let mut pending = frame;
    loop {
        match endpoint.try_send_frame(pending) {
            Ok(()) => return Ok(Delivery::Sent),
            Err(SendError::Closed(_)) => return Err(TransportError::Closed),
            Err(SendError::Full(frame)) => {
                pending = frame;
                match drain_commands(endpoint, *status)? {
                    Drained::Stop => return Ok(Delivery::Stopped),
                    Drained::Continue(next) => *status = transition(*status, next),
                }
                thread::sleep(config.full_queue_backoff);
            }
        }
    }
}

/// Join handle for a worker running on its own thread.
pub struct WorkerHandle {
    inner: JoinHandle<WorkerReport>,
}

impl WorkerHandle {
    /// Waits for the worker to finish.
    ///
    /// A panicking solver is reported as a collaborator fault.
    pub fn join(self) -> WorkerReport {
        self.inner.join().unwrap_or_else(|_| WorkerReport {
            status: WorkerStatus::Stopped,
            exit: WorkerExit::SolverFault(SolverFault::Collaborator(
                "worker thread panicked".to_string(),
            )),
            steps: 0,
            frames_sent: 0,
            sim_time: f64::NAN,
        })
    }

    pub fn is_finished(&self) -> bool {
        self.inner.is_finished()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::solver::StepReport;
    use approx::assert_relative_eq;
    use std::time::Instant;
    use tribody_env::{duplex, Body, ConsumerEndpoint, ConsumerPort, QueueBound};

    /// Zero-gravity drift: x(t) = x0 + v t.
    struct Drift {
        dt: f64,
        t: f64,
    }

    impl Drift {
        fn new() -> Self {
            Self { dt: 0.0, t: 0.0 }
        }
    }

    impl Solver for Drift {
        fn initialize(
            &mut self,
            t0: f64,
            dt: f64,
            _: f64,
            _: &SimulationState,
        ) -> Result<(), SolverFault> {
            self.t = t0;
            self.dt = dt;
            Ok(())
        }

        fn step(&mut self, bodies: &mut [Body]) -> Result<StepReport, SolverFault> {
            for b in bodies.iter_mut() {
                b.position += b.velocity * self.dt;
            }
            self.t += self.dt;
            Ok(StepReport {
                time: self.t,
                error: 0.0,
                energy: 0.0,
            })
        }
    }

    /// Fails on a given step.
    struct FailsAt(u64, u64);

    impl Solver for FailsAt {
        fn initialize(
            &mut self,
            _: f64,
            _: f64,
            _: f64,
            _: &SimulationState,
        ) -> Result<(), SolverFault> {
            Ok(())
        }

        fn step(&mut self, _: &mut [Body]) -> Result<StepReport, SolverFault> {
            self.1 += 1;
            if self.1 == self.0 {
                return Err(SolverFault::Collaborator("diverged".to_string()));
            }
            Ok(StepReport {
                time: self.1 as f64,
                error: 0.0,
                energy: 0.0,
            })
        }
    }

    struct RefusesInit;

    impl Solver for RefusesInit {
        fn initialize(
            &mut self,
            _: f64,
            _: f64,
            _: f64,
            _: &SimulationState,
        ) -> Result<(), SolverFault> {
            Err(SolverFault::Collaborator("no library".to_string()))
        }

        fn step(&mut self, _: &mut [Body]) -> Result<StepReport, SolverFault> {
            Err(SolverFault::Uninitialized)
        }
    }

    fn fast_config() -> WorkerConfig {
        WorkerConfig {
            pause_poll_interval: Duration::from_millis(5),
            ..Default::default()
        }
    }

    fn drain_all(consumer: &mut ConsumerPort) -> Vec<Frame> {
        let mut frames = Vec::new();
        while let Ok(Some(frame)) = consumer.try_recv_frame() {
            frames.push(frame);
        }
        frames
    }

    fn wait_for_frame(consumer: &mut ConsumerPort) -> Frame {
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            if let Some(frame) = consumer.try_recv_frame().unwrap() {
                return frame;
            }
            assert!(Instant::now() < deadline, "no frame arrived");
            thread::sleep(Duration::from_millis(1));
        }
    }

    #[test]
    fn test_pause_then_resume_in_one_batch_nets_running() {
        let (mut worker, consumer) = duplex(QueueBound::Unbounded);
        consumer.send_command(ControlCommand::Pause).unwrap();
        consumer.send_command(ControlCommand::Resume).unwrap();

        let drained = drain_commands(&mut worker, WorkerStatus::Running).unwrap();
        assert_eq!(drained, Drained::Continue(WorkerStatus::Running));
    }

    #[test]
    fn test_resume_then_pause_nets_paused() {
        let (mut worker, consumer) = duplex(QueueBound::Unbounded);
        consumer.send_command(ControlCommand::Resume).unwrap();
        consumer.send_command(ControlCommand::Pause).unwrap();

        let drained = drain_commands(&mut worker, WorkerStatus::Running).unwrap();
        assert_eq!(drained, Drained::Continue(WorkerStatus::Paused));
    }

    #[test]
    fn test_stop_ignores_rest_of_batch() {
        let (mut worker, consumer) = duplex(QueueBound::Unbounded);
        consumer.send_command(ControlCommand::Stop).unwrap();
        consumer.send_command(ControlCommand::Resume).unwrap();

        assert_eq!(drain_commands(&mut worker, WorkerStatus::Paused).unwrap(), Drained::Stop);
    }

    #[test]
    fn test_apply_command_leaves_terminal_status() {
        assert_eq!(
            apply_command(WorkerStatus::Stopped, ControlCommand::Resume),
            Drained::Continue(WorkerStatus::Stopped)
        );
        assert_eq!(apply_command(WorkerStatus::Created, ControlCommand::Stop), Drained::Stop);
    }

    #[test]
    fn test_step_limit_produces_exact_frames() {
        let (port, mut consumer) = duplex(QueueBound::Unbounded);
        let config = WorkerConfig {
            fps: 50.0,
            step_limit: Some(25),
            ..fast_config()
        };

        let state = SimulationState::debug_fixture();
        let report = Worker::new(Drift::new(), state, port, config).run();

        assert_eq!(report.exit, WorkerExit::StepLimit);
        assert_eq!(report.status, WorkerStatus::Stopped);
        assert_eq!(report.steps, 25);
        assert_eq!(report.frames_sent, 25);

        let frames = drain_all(&mut consumer);
        assert_eq!(frames.len(), 25);
        assert!(frames.windows(2).all(|w| w[1].step == w[0].step + 1));
        assert_relative_eq!(frames[24].sim_time, 25.0 / 50.0, epsilon = 1e-12);
        assert_eq!(consumer.try_recv_frame(), Err(TransportError::Closed));
    }

    #[test]
    fn test_stop_ends_stream_after_last_frame() {
        let (port, mut consumer) = duplex(QueueBound::Bounded(16));
        let state = SimulationState::debug_fixture();
        let handle = Worker::new(Drift::new(), state, port, fast_config())
            .spawn()
            .unwrap();

        let mut last_step = wait_for_frame(&mut consumer).step;
        consumer.send_command(ControlCommand::Stop).unwrap();

        // Keep the bounded queue moving so Stop is seen promptly
        let report = loop {
            for frame in drain_all(&mut consumer) {
                last_step = frame.step;
            }
            if handle.is_finished() {
                break handle.join();
            }
            thread::sleep(Duration::from_millis(1));
        };
        for frame in drain_all(&mut consumer) {
            last_step = frame.step;
        }

        assert_eq!(report.exit, WorkerExit::Stopped);
        assert_eq!(last_step, report.frames_sent);
        assert_eq!(consumer.try_recv_frame(), Err(TransportError::Closed));
    }

    #[test]
    fn test_stop_is_honoured_on_full_queue() {
        let (port, mut consumer) = duplex(QueueBound::Bounded(1));
        let state = SimulationState::debug_fixture();
        let handle = Worker::new(Drift::new(), state, port, fast_config())
            .spawn()
            .unwrap();

        // Nobody reads: the worker fills the queue and backs off
        thread::sleep(Duration::from_millis(30));
        consumer.send_command(ControlCommand::Stop).unwrap();
        let report = handle.join();

        assert_eq!(report.exit, WorkerExit::Stopped);
        assert_eq!(drain_all(&mut consumer).len(), 1);
    }

    #[test]
    fn test_solver_fault_is_fatal() {
        let (port, mut consumer) = duplex(QueueBound::Unbounded);
        let state = SimulationState::debug_fixture();
        let report = Worker::new(FailsAt(4, 0), state, port, fast_config()).run();

        assert!(matches!(report.exit, WorkerExit::SolverFault(SolverFault::Collaborator(_))));
        assert!(!report.exit.is_clean());
        assert_eq!(report.steps, 3);
        assert_eq!(drain_all(&mut consumer).len(), 3);
        assert_eq!(consumer.try_recv_frame(), Err(TransportError::Closed));
    }

    #[test]
    fn test_failed_initialization_never_steps() {
        let (port, mut consumer) = duplex(QueueBound::Unbounded);
        let state = SimulationState::debug_fixture();
        let report = Worker::new(RefusesInit, state, port, fast_config()).run();

        assert_eq!(report.status, WorkerStatus::Stopped);
        assert_eq!(report.steps, 0);
        assert!(matches!(report.exit, WorkerExit::SolverFault(_)));
        assert_eq!(consumer.try_recv_frame(), Err(TransportError::Closed));
    }

    #[test]
    fn test_consumer_gone_is_transport_fault() {
        let (port, consumer) = duplex(QueueBound::Unbounded);
        drop(consumer);

        let state = SimulationState::debug_fixture();
        let report = Worker::new(Drift::new(), state, port, fast_config()).run();
        assert_eq!(report.exit, WorkerExit::Transport(TransportError::Closed));
    }

    #[test]
    fn test_paused_worker_does_not_step() {
        let (port, mut consumer) = duplex(QueueBound::Unbounded);
        consumer.send_command(ControlCommand::Pause).unwrap();

        let state = SimulationState::debug_fixture();
        let worker = Worker::new(Drift::new(), state, port, fast_config());
        assert_eq!(worker.status(), WorkerStatus::Created);
        let handle = worker.spawn().unwrap();

        thread::sleep(Duration::from_millis(50));
        assert_eq!(consumer.try_recv_frame(), Ok(None));

        consumer.send_command(ControlCommand::Stop).unwrap();
        let report = handle.join();
        assert_eq!(report.steps, 0);
        assert_eq!(report.exit, WorkerExit::Stopped);
    }
}
