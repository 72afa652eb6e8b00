//! In-process channel implementation backed by tokio mpsc queues.

use crate::channel::{ConsumerEndpoint, WorkerEndpoint};
use crate::error::{SendError, TransportError};
use crate::types::{ControlCommand, Frame, QueueBound};
use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::{TryRecvError, TrySendError};

/// Creates a connected worker/consumer endpoint pair.
///
/// Commands always travel on an unbounded queue. Frames use `bound`.
/// Both endpoints work from plain threads; only `ConsumerPort::recv_frame`
/// needs an async context.
pub fn duplex(bound: QueueBound) -> (WorkerPort, ConsumerPort) {
    let (command_tx, command_rx) = mpsc::unbounded_channel();
    let (frame_tx, frame_rx) = match bound {
        QueueBound::Unbounded => {
            let (tx, rx) = mpsc::unbounded_channel();
            (FrameSender::Unbounded(tx), FrameReceiver::Unbounded(rx))
        }
        QueueBound::Bounded(capacity) => {
            let (tx, rx) = mpsc::channel(capacity.max(1));
            (FrameSender::Bounded(tx), FrameReceiver::Bounded(rx))
        }
    };

    let worker = WorkerPort {
        commands: command_rx,
        frames: frame_tx,
    };
    let consumer = ConsumerPort {
        frames: frame_rx,
        control: ControlHandle {
            tx: command_tx,
            stop_sent: Arc::new(AtomicBool::new(false)),
        },
    };

    (worker, consumer)
}

pub(crate) enum FrameSender {
    Unbounded(mpsc::UnboundedSender<Frame>),
    Bounded(mpsc::Sender<Frame>),
}

impl FrameSender {
    fn try_send(&self, frame: Frame) -> Result<(), SendError<Frame>> {
        match self {
            FrameSender::Unbounded(tx) => tx.send(frame).map_err(|e| SendError::Closed(e.0)),
            FrameSender::Bounded(tx) => tx.try_send(frame).map_err(|e| match e {
                TrySendError::Full(frame) => SendError::Full(frame),
                TrySendError::Closed(frame) => SendError::Closed(frame),
            }),
        }
    }

    pub(crate) async fn send(&self, frame: Frame) -> Result<(), TransportError> {
        match self {
            FrameSender::Unbounded(tx) => tx.send(frame).map_err(|_| TransportError::Closed),
            FrameSender::Bounded(tx) => tx.send(frame).await.map_err(|_| TransportError::Closed),
        }
    }
}

pub(crate) enum FrameReceiver {
    Unbounded(mpsc::UnboundedReceiver<Frame>),
    Bounded(mpsc::Receiver<Frame>),
}

impl FrameReceiver {
    async fn recv(&mut self) -> Option<Frame> {
        match self {
            FrameReceiver::Unbounded(rx) => rx.recv().await,
            FrameReceiver::Bounded(rx) => rx.recv().await,
        }
    }

    fn try_recv(&mut self) -> Result<Frame, TryRecvError> {
        match self {
            FrameReceiver::Unbounded(rx) => rx.try_recv(),
            FrameReceiver::Bounded(rx) => rx.try_recv(),
        }
    }

    /// Must not be called from inside an async context.
    pub(crate) fn blocking_recv(&mut self) -> Option<Frame> {
        match self {
            FrameReceiver::Unbounded(rx) => rx.blocking_recv(),
            FrameReceiver::Bounded(rx) => rx.blocking_recv(),
        }
    }
}

/// Worker end of an in-process channel.
pub struct WorkerPort {
    commands: mpsc::UnboundedReceiver<ControlCommand>,
    frames: FrameSender,
}

impl WorkerPort {
    pub(crate) fn into_parts(self) -> (mpsc::UnboundedReceiver<ControlCommand>, FrameSender) {
        (self.commands, self.frames)
    }
}

impl WorkerEndpoint for WorkerPort {
    fn poll_command(&mut self) -> Result<Option<ControlCommand>, TransportError> {
        match self.commands.try_recv() {
            Ok(command) => Ok(Some(command)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn try_send_frame(&mut self, frame: Frame) -> Result<(), SendError<Frame>> {
        self.frames.try_send(frame)
    }
}

/// Consumer end of an in-process channel.
pub struct ConsumerPort {
    frames: FrameReceiver,
    control: ControlHandle,
}

impl ConsumerPort {
    /// Returns a cloneable handle for issuing commands from elsewhere
    /// (signal handlers, UI callbacks).
    pub fn control_handle(&self) -> ControlHandle {
        self.control.clone()
    }

    pub(crate) fn into_parts(self) -> (FrameReceiver, ControlHandle) {
        (self.frames, self.control)
    }
}

#[async_trait]
impl ConsumerEndpoint for ConsumerPort {
    async fn recv_frame(&mut self) -> Option<Frame> {
        self.frames.recv().await
    }

    fn try_recv_frame(&mut self) -> Result<Option<Frame>, TransportError> {
        match self.frames.try_recv() {
            Ok(frame) => Ok(Some(frame)),
            Err(TryRecvError::Empty) => Ok(None),
            Err(TryRecvError::Disconnected) => Err(TransportError::Closed),
        }
    }

    fn send_command(&self, command: ControlCommand) -> Result<(), TransportError> {
        self.control.send(command)
    }

    fn stop_requested(&self) -> bool {
        self.control.stop_requested()
    }
}

/// Cloneable command sender tied to one consumer endpoint.
#[derive(Clone)]
pub struct ControlHandle {
    tx: mpsc::UnboundedSender<ControlCommand>,
    stop_sent: Arc<AtomicBool>,
}

impl ControlHandle {
    /// Sends a command without blocking.
    pub fn send(&self, command: ControlCommand) -> Result<(), TransportError> {
        if command == ControlCommand::Stop {
            self.stop_sent.store(true, Ordering::SeqCst);
        }
        self.tx.send(command).map_err(|_| TransportError::Closed)
    }

    pub fn pause(&self) -> Result<(), TransportError> {
        self.send(ControlCommand::Pause)
    }

    pub fn resume(&self) -> Result<(), TransportError> {
        self.send(ControlCommand::Resume)
    }

    pub fn stop(&self) -> Result<(), TransportError> {
        self.send(ControlCommand::Stop)
    }

    /// True once `Stop` went through this handle or one of its clones.
    pub fn stop_requested(&self) -> bool {
        self.stop_sent.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::Body;

    fn frame(step: u64) -> Frame {
        Frame {
            step,
            sim_time: step as f64 * 0.1,
            error: 0.0,
            energy: 0.0,
            bodies: vec![Body::new(1.0, [step as f64, 0.0, 0.0], [0.0; 3])],
        }
    }

    #[test]
    fn test_commands_arrive_in_order() {
        let (mut worker, consumer) = duplex(QueueBound::Unbounded);

        consumer.send_command(ControlCommand::Pause).unwrap();
        consumer.send_command(ControlCommand::Resume).unwrap();
        consumer.send_command(ControlCommand::Stop).unwrap();

        assert_eq!(worker.poll_command(), Ok(Some(ControlCommand::Pause)));
        assert_eq!(worker.poll_command(), Ok(Some(ControlCommand::Resume)));
        assert_eq!(worker.poll_command(), Ok(Some(ControlCommand::Stop)));
        assert_eq!(worker.poll_command(), Ok(None));
        assert!(consumer.stop_requested());
    }

    #[test]
    fn test_poll_reports_closed_consumer() {
        let (mut worker, consumer) = duplex(QueueBound::Unbounded);
        drop(consumer);

        assert_eq!(worker.poll_command(), Err(TransportError::Closed));
        assert!(matches!(worker.try_send_frame(frame(1)), Err(SendError::Closed(_))));
    }

    #[test]
    fn test_frames_fifo_then_end_of_stream() {
        let (mut worker, mut consumer) = duplex(QueueBound::Unbounded);

        assert_eq!(consumer.try_recv_frame(), Ok(None));

        for step in 1..=3 {
            worker.try_send_frame(frame(step)).unwrap();
        }
        drop(worker);

        // Queued frames are still delivered after the worker is gone
        for step in 1..=3 {
            assert_eq!(consumer.try_recv_frame().unwrap().map(|f| f.step), Some(step));
        }
        assert_eq!(consumer.try_recv_frame(), Err(TransportError::Closed));
    }

    #[test]
    fn test_bounded_queue_reports_full() {
        let (mut worker, mut consumer) = duplex(QueueBound::Bounded(2));

        worker.try_send_frame(frame(1)).unwrap();
        worker.try_send_frame(frame(2)).unwrap();

        match worker.try_send_frame(frame(3)) {
            Err(SendError::Full(rejected)) => assert_eq!(rejected.step, 3),
            other => panic!("expected Full, got {:?}", other.map(|_| ())),
        }

        assert_eq!(consumer.try_recv_frame().unwrap().map(|f| f.step), Some(1));
        worker.try_send_frame(frame(3)).unwrap();
    }

    #[tokio::test]
    async fn test_recv_frame_waits_for_worker_thread() {
        let (mut worker, mut consumer) = duplex(QueueBound::Unbounded);

        let producer = std::thread::spawn(move || {
            std::thread::sleep(std::time::Duration::from_millis(20));
            worker.try_send_frame(frame(7)).unwrap();
        });

        let received = consumer.recv_frame().await.expect("frame");
        assert_eq!(received.step, 7);

        producer.join().unwrap();
        assert!(consumer.recv_frame().await.is_none());
    }

    #[test]
    fn test_control_handle_clone_shares_stop_flag() {
        let (_worker, consumer) = duplex(QueueBound::Unbounded);
        let handle = consumer.control_handle();

        assert!(!consumer.stop_requested());
        handle.stop().unwrap();
        assert!(consumer.stop_requested());
    }
}
