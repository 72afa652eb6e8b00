//! Tribody Channel Abstraction Layer
//!
//! This crate provides the message-passing boundary between the simulation
//! **worker** (which owns the state and drives the solver) and the
//! **consumer** (the fixed-rate render loop).
//!
//! # Core Concept: Two Endpoints, Two Directions
//!
//! - Control commands (`Stop`, `Pause`, `Resume`) flow consumer → worker
//! - Frames (body snapshots + solver diagnostics) flow worker → consumer
//!
//! Both directions are FIFO and lossless. Nothing is shared between the two
//! sides except the queues, so the worker may live on another thread or in
//! another process without changing either endpoint's code.
//!
//! # Example
//!
//! ```ignore
//! use tribody_env::{duplex, QueueBound, WorkerEndpoint, ConsumerEndpoint};
//!
//! let (mut worker, mut consumer) = duplex(QueueBound::Unbounded);
//! std::thread::spawn(move || loop {
//!     while let Some(cmd) = worker.poll_command()? { /* apply */ }
//!     worker.try_send_frame(next_frame())?;
//! });
//! let frame = consumer.recv_frame().await;
//! ```

mod channel;
mod error;
pub mod local;
pub mod stream;
mod types;

pub use channel::{ConsumerEndpoint, WorkerEndpoint};
pub use error::{SendError, TransportError};
pub use local::{duplex, ConsumerPort, ControlHandle, WorkerPort};
pub use stream::{consumer_stream_endpoint, worker_stream_endpoint, FrameWriter};
pub use types::{Body, ControlCommand, Frame, QueueBound, WireMessage};
