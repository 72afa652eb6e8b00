//! Channel endpoint abstraction shared by the worker and the consumer.

use async_trait::async_trait;
use crate::error::{SendError, TransportError};
use crate::types::{ControlCommand, Frame};

/// Worker side of the control channel.
///
/// The worker runs a blocking stepping loop on its own thread, so this side
/// is synchronous. Neither method may block: the worker must stay responsive
/// to `Stop` while racing ahead of the renderer.
///
/// # Message Flow
///
/// ```text
/// Worker                    Channel                   Consumer
///   |-- try_send_frame ------>|---- FIFO frames -------->| recv_frame
///   |<-- poll_command --------|<--- FIFO commands -------| send_command
/// ```
pub trait WorkerEndpoint: Send + 'static {
    /// Takes the oldest pending command, if any.
    ///
    /// # Returns
    /// * `Ok(Some(cmd))` - A command was waiting
    /// * `Ok(None)` - Nothing pending
    /// * `Err(TransportError::Closed)` - The consumer is gone
    fn poll_command(&mut self) -> Result<Option<ControlCommand>, TransportError>;

    /// Queues a frame for the consumer without blocking.
    ///
    /// `SendError::Full` only happens on a bounded queue.
    fn try_send_frame(&mut self, frame: Frame) -> Result<(), SendError<Frame>>;
}

/// Consumer side of the control channel.
///
/// Driven from the render loop's async timer.
#[async_trait]
pub trait ConsumerEndpoint: Send + 'static {
    /// Waits for the oldest queued frame.
    ///
    /// Returns `None` once the worker has dropped its end and every queued
    /// frame has been delivered (end of stream).
    async fn recv_frame(&mut self) -> Option<Frame>;

    /// Non-blocking availability check that also takes the frame.
    ///
    /// # Returns
    /// * `Ok(Some(frame))` - Oldest queued frame
    /// * `Ok(None)` - Nothing produced yet
    /// * `Err(TransportError::Closed)` - Drained and the worker is gone
    fn try_recv_frame(&mut self) -> Result<Option<Frame>, TransportError>;

    /// Sends a command to the worker. Never blocks.
    fn send_command(&self, command: ControlCommand) -> Result<(), TransportError>;

    /// True once `Stop` has been sent through this endpoint or any of its
    /// control handles.
    fn stop_requested(&self) -> bool;
}
