//! End-to-end pipeline scenarios over the in-process channel.

use approx::assert_relative_eq;
use nalgebra::Vector3;
use std::thread;
use std::time::Duration;
use tribody_core::{
    OverrunPolicy, PipelineConfig, RenderConfig, Renderer, SimulationState, Solver, SolverFault,
    StepReport, ThreadedPipeline, Worker, WorkerConfig, WorkerExit,
};
use tribody_env::{duplex, Body, ConsumerEndpoint, QueueBound};

/// Zero-gravity drift with an optional per-step delay.
struct Drift {
    dt: f64,
    t: f64,
    delay: Duration,
}

impl Drift {
    fn fast() -> Self {
        Self::slow(Duration::ZERO)
    }

    fn slow(delay: Duration) -> Self {
        Self {
            dt: 0.0,
            t: 0.0,
            delay,
        }
    }
}

impl Solver for Drift {
    fn initialize(
        &mut self,
        t0: f64,
        dt: f64,
        _tol: f64,
        _state: &SimulationState,
    ) -> Result<(), SolverFault> {
        self.t = t0;
        self.dt = dt;
        Ok(())
    }

    fn step(&mut self, bodies: &mut [Body]) -> Result<StepReport, SolverFault> {
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
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

struct Discard;

impl Renderer for Discard {
    fn draw(&mut self, _positions: &[Vector3<f64>]) {}
}

#[tokio::test]
async fn fixture_runs_exactly_k_steps() {
    const K: u64 = 120;
    let config = WorkerConfig {
        step_limit: Some(K),
        ..Default::default()
    };
    let step_length = config.step_length();

    let (worker_port, mut consumer) = duplex(QueueBound::Unbounded);
    let state = SimulationState::debug_fixture();
    let initial = state.bodies().to_vec();
    let handle = Worker::new(Drift::fast(), state, worker_port, config).spawn().unwrap();

    let mut frames = Vec::new();
    while let Some(frame) = consumer.recv_frame().await {
        frames.push(frame);
    }
    let report = handle.join();

    assert_eq!(report.exit, WorkerExit::StepLimit);
    assert_eq!(report.steps, K);
    assert_eq!(frames.len() as u64, K);

    let last = frames.last().unwrap();
    assert_eq!(last.step, K);
    assert_relative_eq!(last.sim_time, K as f64 * step_length, epsilon = 1e-9);
    assert_eq!(last.body_count(), 4);

    // Drift moves each body by v * t; the massless particle never moves
    let expected = initial[0].position + initial[0].velocity * last.sim_time;
    assert_relative_eq!(last.bodies[0].position, expected, epsilon = 1e-9);
    assert_eq!(last.bodies[3].position, initial[3].position);

    for pair in frames.windows(2) {
        assert_eq!(pair[1].step, pair[0].step + 1);
        assert!(pair[1].sim_time > pair[0].sim_time);
    }
}

#[tokio::test]
async fn paused_worker_produces_nothing_until_resumed() {
    let (worker_port, mut consumer) = duplex(QueueBound::Bounded(4));
    let control = consumer.control_handle();

    // Queued before the worker starts, so it is applied before the first step
    control.pause().unwrap();

    let config = WorkerConfig {
        pause_poll_interval: Duration::from_millis(10),
        step_limit: Some(10_000),
        ..Default::default()
    };
    let state = SimulationState::debug_fixture();
    let handle = Worker::new(Drift::fast(), state, worker_port, config)
        .spawn()
        .unwrap();

    tokio::time::sleep(Duration::from_millis(200)).await;
    assert_eq!(consumer.try_recv_frame().unwrap(), None);

    control.resume().unwrap();
    let frame = tokio::time::timeout(Duration::from_secs(5), consumer.recv_frame())
        .await
        .expect("frame after resume")
        .expect("stream still open");
    assert_eq!(frame.step, 1);

    control.stop().unwrap();
    while consumer.recv_frame().await.is_some() {}
    assert_eq!(handle.join().exit, WorkerExit::Stopped);
}

#[tokio::test]
async fn fast_consumer_sees_overruns() {
    let config = PipelineConfig {
        worker: WorkerConfig::default(),
        render: RenderConfig {
            tick_rate_hz: 200.0,
            overrun_policy: OverrunPolicy::HoldLast,
            max_ticks: Some(20),
            ..Default::default()
        },
        queue_bound: QueueBound::Unbounded,
    };

    let pipeline = ThreadedPipeline::launch(
        Drift::slow(Duration::from_millis(25)),
        SimulationState::debug_fixture(),
        Discard,
        config,
    )
    .unwrap();
    let report = pipeline.run().await;

    assert!(report.is_clean());
    let stats = report.render.unwrap().stats;
    assert_eq!(stats.ticks, 20);
    assert!(stats.overruns >= 1, "expected overruns, got {:?}", stats);
    assert_eq!(stats.held, stats.overruns);
}

#[tokio::test]
async fn slow_consumer_sees_no_overruns() {
    let config = PipelineConfig {
        worker: WorkerConfig {
            step_limit: Some(100_000),
            ..Default::default()
        },
        render: RenderConfig {
            tick_rate_hz: 50.0,
            overrun_policy: OverrunPolicy::Block,
            max_ticks: Some(10),
            ..Default::default()
        },
        queue_bound: QueueBound::Bounded(8),
    };

    let state = SimulationState::debug_fixture();
    let pipeline = ThreadedPipeline::launch(Drift::fast(), state, Discard, config).unwrap();
    let report = pipeline.run().await;

    assert!(report.is_clean(), "worker exit {:?}", report.worker.exit);
    let summary = report.render.unwrap();
    assert_eq!(summary.stats.overruns, 0);
    assert_eq!(summary.stats.frames_rendered, 10);

    // Oldest-first: ten ticks render steps 1..=10
    assert_eq!(summary.last_frame.unwrap().step, 10);
}
