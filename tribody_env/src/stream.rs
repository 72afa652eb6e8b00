//! Byte-stream channel bridges for running the worker in another process.
//!
//! Both directions use newline-delimited JSON [`WireMessage`]s. Each bridge
//! pumps a byte stream into one half of a [`local::duplex`](crate::local::duplex)
//! pair, so the worker and the render loop see exactly the same endpoint
//! types whether the peer is a thread or a process.
//!
//! ```text
//!  parent process                             child process
//!  RenderLoop ── ConsumerPort                 WorkerPort ── Worker
//!                  │  ▲                         ▲  │
//!        writer task  reader task      reader thread  writer thread
//!                  ▼  │                         │  ▼
//!              child stdin  ───────────────▶  stdin
//!              child stdout ◀───────────────  stdout
//! ```

use crate::error::TransportError;
use crate::local::{duplex, ConsumerPort, WorkerPort};
use crate::types::{ControlCommand, Frame, QueueBound, WireMessage};
use std::io::{BufRead, BufReader, Write};
use std::thread;
use tokio::io::{AsyncBufReadExt, AsyncRead, AsyncWrite, AsyncWriteExt};
use tracing::{debug, error, warn};

/// Encodes one message as a single line (including the trailing newline).
pub fn encode_line(message: &WireMessage) -> Result<String, TransportError> {
    let mut line = serde_json::to_string(message).map_err(TransportError::codec)?;
    line.push('\n');
    Ok(line)
}

/// Decodes one line produced by [`encode_line`].
pub fn decode_line(line: &str) -> Result<WireMessage, TransportError> {
    serde_json::from_str(line.trim_end()).map_err(TransportError::codec)
}

/// Worker-side bridge over blocking streams (typically stdin/stdout).
///
/// Spawns a reader thread that turns incoming lines into commands and a
/// writer thread that serializes outgoing frames. `bound` limits how many
/// frames may wait for the writer.
///
/// When `reader` hits EOF or a malformed line, the reader thread exits and
/// the worker's next `poll_command` reports `TransportError::Closed`. When
/// `writer` fails, the writer thread exits and the next `try_send_frame`
/// reports `Closed`.
///
/// Join the returned [`FrameWriter`] after dropping the port so queued frames
/// reach `writer` before the process exits.
pub fn worker_stream_endpoint<R, W>(
    reader: R,
    writer: W,
    bound: QueueBound,
) -> (WorkerPort, FrameWriter)
where
    R: std::io::Read + Send + 'static,
    W: std::io::Write + Send + 'static,
{
    let (worker, consumer) = duplex(bound);
    let (mut frames, control) = consumer.into_parts();

    let spawned = thread::Builder::new()
        .name("tribody-cmd-reader".to_string())
        .spawn(move || {
            for line in BufReader::new(reader).lines() {
                let line = match line {
                    Ok(line) => line,
                    Err(e) => {
                        error!("Command stream read failed: {}", e);
                        return;
                    }
                };
                if line.trim().is_empty() {
                    continue;
                }
                match decode_line(&line) {
                    Ok(WireMessage::Command(command)) => {
                        debug!("Received {} over stream", command);
                        if control.send(command).is_err() {
                            return;
                        }
                    }
                    Ok(WireMessage::Frame(_)) => {
                        warn!("Ignoring frame sent towards the worker");
                    }
                    Err(e) => {
                        error!("Malformed command line: {}", e);
                        return;
                    }
                }
            }
            debug!("Command stream reached EOF");
        });
    if let Err(e) = spawned {
        error!("Failed to spawn command reader: {}", e);
    }

    let writer_thread = thread::Builder::new()
        .name("tribody-frame-writer".to_string())
        .spawn(move || {
            let mut writer = std::io::BufWriter::new(writer);
            while let Some(frame) = frames.blocking_recv() {
                if let Err(e) = write_frame(&mut writer, frame) {
                    error!("Frame stream write failed: {}", e);
                    return;
                }
            }
            if let Err(e) = writer.flush() {
                error!("Frame stream final flush failed: {}", e);
            }
        });
    let inner = match writer_thread {
        Ok(handle) => Some(handle),
        Err(e) => {
            error!("Failed to spawn frame writer: {}", e);
            None
        }
    };

    (worker, FrameWriter { inner })
}

/// Writer thread of a worker-side stream bridge.
pub struct FrameWriter {
    inner: Option<thread::JoinHandle<()>>,
}

impl FrameWriter {
    /// Blocks until every frame queued before the port was dropped is written.
    pub fn join(self) {
        if let Some(handle) = self.inner {
            if handle.join().is_err() {
                error!("Frame writer panicked");
            }
        }
    }
}

fn write_frame<W: Write>(writer: &mut W, frame: Frame) -> Result<(), TransportError> {
    let line = encode_line(&WireMessage::Frame(frame))?;
    writer.write_all(line.as_bytes()).map_err(TransportError::io)?;
    writer.flush().map_err(TransportError::io)
}

/// Consumer-side bridge over async streams (typically a child's stdout/stdin).
///
/// Must be called inside a tokio runtime. The frame queue on this side is
/// unbounded; any bound is applied by the worker process.
pub fn consumer_stream_endpoint<R, W>(reader: R, writer: W) -> ConsumerPort
where
    R: AsyncRead + Unpin + Send + 'static,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let (worker, consumer) = duplex(QueueBound::Unbounded);
    let (mut commands, frames) = worker.into_parts();

    tokio::spawn(async move {
        let mut lines = tokio::io::BufReader::new(reader).lines();
        loop {
            let line = match lines.next_line().await {
                Ok(Some(line)) => line,
                Ok(None) => {
                    debug!("Frame stream reached EOF");
                    return;
                }
                Err(e) => {
                    error!("Frame stream read failed: {}", e);
                    return;
                }
            };
            if line.trim().is_empty() {
                continue;
            }
            match decode_line(&line) {
                Ok(WireMessage::Frame(frame)) => {
                    if frames.send(frame).await.is_err() {
                        return;
                    }
                }
                Ok(WireMessage::Command(command)) => {
                    warn!("Ignoring {} sent towards the consumer", command);
                }
                Err(e) => {
                    error!("Malformed frame line: {}", e);
                    return;
                }
            }
        }
    });

    tokio::spawn(async move {
        let mut writer = writer;
        while let Some(command) = commands.recv().await {
            if let Err(e) = write_command(&mut writer, command).await {
                error!("Command stream write failed: {}", e);
                return;
            }
        }
        let _ = writer.shutdown().await;
    });

    consumer
}

async fn write_command<W>(writer: &mut W, command: ControlCommand) -> Result<(), TransportError>
where
    W: AsyncWrite + Unpin,
{
    let line = encode_line(&WireMessage::Command(command))?;
    writer.write_all(line.as_bytes()).await.map_err(TransportError::io)?;
    writer.flush().await.map_err(TransportError::io)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channel::{ConsumerEndpoint, WorkerEndpoint};
    use crate::types::Body;
    use std::io::Cursor;
    use std::sync::{Arc, Mutex};
    use std::time::{Duration, Instant};

    /// Write half that lands in a shared buffer.
    #[derive(Clone, Default)]
    struct SharedBuf(Arc<Mutex<Vec<u8>>>);

    impl Write for SharedBuf {
        fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
            self.0.lock().unwrap().extend_from_slice(buf);
            Ok(buf.len())
        }

        fn flush(&mut self) -> std::io::Result<()> {
            Ok(())
        }
    }

    fn frame(step: u64) -> Frame {
        Frame {
            step,
            sim_time: step as f64 / 60.0,
            error: 1e-9,
            energy: -0.5,
            bodies: vec![Body::new(1.0, [0.25, -1.0, 3.0], [0.0, 1.0, 0.0])],
        }
    }

    fn poll_until<T>(mut f: impl FnMut() -> Option<T>) -> T {
        let deadline = Instant::now() + Duration::from_secs(2);
        loop {
            if let Some(value) = f() {
                return value;
            }
            assert!(Instant::now() < deadline, "timed out");
            std::thread::sleep(Duration::from_millis(5));
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(decode_line("not json"), Err(TransportError::Codec(_))));
    }

    #[test]
    fn test_encode_line_is_single_line() {
        let line = encode_line(&WireMessage::Frame(frame(3))).unwrap();
        assert!(line.ends_with('\n'));
        assert_eq!(line.matches('\n').count(), 1);
        assert_eq!(decode_line(&line).unwrap(), WireMessage::Frame(frame(3)));
    }

    #[test]
    fn test_worker_bridge_reads_commands_then_reports_eof() {
        let mut input = String::new();
        input.push_str(&encode_line(&WireMessage::Command(ControlCommand::Pause)).unwrap());
        input.push_str(&encode_line(&WireMessage::Command(ControlCommand::Resume)).unwrap());

        let (mut worker, _writer) = worker_stream_endpoint(
            Cursor::new(input.into_bytes()),
            SharedBuf::default(),
            QueueBound::Unbounded,
        );

        let first = poll_until(|| worker.poll_command().unwrap());
        assert_eq!(first, ControlCommand::Pause);
        let second = poll_until(|| worker.poll_command().unwrap());
        assert_eq!(second, ControlCommand::Resume);

        // Reader hit EOF: the consumer is considered gone
        poll_until(|| worker.poll_command().err());
    }

    #[test]
    fn test_worker_bridge_malformed_line_closes_channel() {
        let input = b"{\"kind\":\"command\",\"body\":\"sto".to_vec();
        let (mut worker, _writer) =
            worker_stream_endpoint(Cursor::new(input), SharedBuf::default(), QueueBound::Unbounded);

        let err = poll_until(|| worker.poll_command().err());
        assert_eq!(err, TransportError::Closed);
    }

    #[test]
    fn test_worker_bridge_writes_frames_as_lines() {
        let out = SharedBuf::default();
        let (mut worker, writer) =
            worker_stream_endpoint(Cursor::new(Vec::new()), out.clone(), QueueBound::Unbounded);

        worker.try_send_frame(frame(1)).unwrap();
        worker.try_send_frame(frame(2)).unwrap();
        drop(worker);
        writer.join();

        let text = String::from_utf8(out.0.lock().unwrap().clone()).unwrap();
        assert_eq!(text.lines().count(), 2);

        let steps: Vec<u64> = text
            .lines()
            .map(|l| match decode_line(l).unwrap() {
                WireMessage::Frame(f) => f.step,
                other => panic!("unexpected {:?}", other),
            })
            .collect();
        assert_eq!(steps, vec![1, 2]);
    }

    #[tokio::test]
    async fn test_consumer_bridge_round_trip() {
        let (child_stdout, mut worker_side_out) = tokio::io::duplex(4096);
        let (worker_side_in, child_stdin) = tokio::io::duplex(4096);

        let mut consumer = consumer_stream_endpoint(child_stdout, child_stdin);

        // Play the worker process: emit two frames, then hang up
        for step in 1..=2 {
            let line = encode_line(&WireMessage::Frame(frame(step))).unwrap();
            worker_side_out.write_all(line.as_bytes()).await.unwrap();
        }
        drop(worker_side_out);

        assert_eq!(consumer.recv_frame().await.map(|f| f.step), Some(1));
        assert_eq!(consumer.recv_frame().await.map(|f| f.step), Some(2));
        assert!(consumer.recv_frame().await.is_none());

        consumer.send_command(ControlCommand::Stop).unwrap();
        let mut lines = tokio::io::BufReader::new(worker_side_in).lines();
        let line = lines.next_line().await.unwrap().expect("command line");
        assert_eq!(decode_line(&line).unwrap(), WireMessage::Command(ControlCommand::Stop));
        assert!(consumer.stop_requested());
    }
}
