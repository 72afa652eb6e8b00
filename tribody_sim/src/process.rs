//! Worker in a child process.
//!
//! Re-executes this binary with the `worker` subcommand and bridges its
//! stdout (frames) and stdin (commands) into a [`ConsumerPort`]. The child
//! shares no memory with the parent; only the line protocol crosses.

use crate::cli::WorkerArgs;
use anyhow::{anyhow, Context, Result};
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tracing::{debug, info};
use tribody_env::{consumer_stream_endpoint, ConsumerPort};

/// A running worker child.
pub struct WorkerProcess {
    child: Child,
}

impl WorkerProcess {
    /// Spawns `exe worker ...` and connects to its pipes.
    ///
    /// Must be called inside a tokio runtime. The child inherits stderr so
    /// its logs interleave with the parent's.
    pub fn spawn(exe: &Path, args: &WorkerArgs, verbose: bool) -> Result<(Self, ConsumerPort)> {
        let child_args = args.to_child_args(verbose);
        debug!("Spawning {} {}", exe.display(), child_args.join(" "));

        let mut child = Command::new(exe)
            .args(&child_args)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::inherit())
            .kill_on_drop(true)
            .spawn()
            .with_context(|| format!("failed to spawn worker process {}", exe.display()))?;

        let stdin = child.stdin.take().ok_or_else(|| anyhow!("worker stdin not captured"))?;
        let stdout = child.stdout.take().ok_or_else(|| anyhow!("worker stdout not captured"))?;

        info!("Worker process started (pid {})", child.id().unwrap_or_default());
        let port = consumer_stream_endpoint(stdout, stdin);
        Ok((Self { child }, port))
    }

    pub fn id(&self) -> Option<u32> {
        self.child.id()
    }

    /// Waits for the child to exit.
    pub async fn wait(mut self) -> Result<ExitStatus> {
        let status = self.child.wait().await.context("failed to wait for worker process")?;
        debug!("Worker process exited with {}", status);
        Ok(status)
    }
}
