// Worker Supervision
// Spawns one aligner process and kills it when the group is cancelled

use std::fs::File;
use std::io;
use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use tokio::process::{Child, Command};
use tokio_util::sync::CancellationToken;

/// Exit code reported when a command cannot be started
pub const SPAWN_FAILED: i32 = 127;

/// Where a process output stream goes
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OutputSink {
    /// Truncate and write the file
    File(PathBuf),
    /// `/dev/null`
    Discard,
}

impl OutputSink {
    pub fn stdio(&self) -> io::Result<Stdio> {
        match self {
            OutputSink::File(path) => Ok(Stdio::from(File::create(path)?)),
            OutputSink::Discard => Ok(Stdio::null()),
        }
    }

    /// Path for tools that take an output file argument
    pub fn path_arg(&self) -> String {
        match self {
            OutputSink::File(path) => path.to_string_lossy().into_owned(),
            OutputSink::Discard => "/dev/null".to_string(),
        }
    }

    pub fn file(&self) -> Option<&PathBuf> {
        match self {
            OutputSink::File(path) => Some(path),
            OutputSink::Discard => None,
        }
    }
}

/// One process of a worker group
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerCommand {
    pub argv: Vec<String>,
    pub stdout: OutputSink,
    pub stderr: OutputSink,
}

impl WorkerCommand {
    /// Command line for logs and dry runs
    pub fn display(&self) -> String {
        self.argv.join(" ")
    }
}

/// How a worker ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// The process exited on its own
    Exited(i32),
    /// The process was killed because the group ran out of time
    TimedOut,
}

impl WorkerExit {
    /// Exit code, `None` for a timed-out worker
    pub fn code(&self) -> Option<i32> {
        match self {
            WorkerExit::Exited(code) => Some(*code),
            WorkerExit::TimedOut => None,
        }
    }
}

pub(crate) fn exit_code(status: ExitStatus) -> i32 {
    if let Some(code) = status.code() {
        return code;
    }
    #[cfg(unix)]
    {
        use std::os::unix::process::ExitStatusExt;
        if let Some(signal) = status.signal() {
            return 128 + signal;
        }
    }
    -1
}

fn spawn(command: &WorkerCommand) -> io::Result<Child> {
    let (program, args) = command
        .argv
        .split_first()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "empty command"))?;
    Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .stdout(command.stdout.stdio()?)
        .stderr(command.stderr.stdio()?)
        .kill_on_drop(true)
        .spawn()
}

/// Run `command` to completion, or kill it once `token` is cancelled
pub async fn supervise(command: WorkerCommand, token: CancellationToken) -> WorkerExit {
    tracing::debug!(command = %command.display(), "starting worker");
    let mut child = match spawn(&command) {
        Ok(child) => child,
        Err(e) => {
            tracing::warn!(command = %command.display(), error = %e, "failed to start worker");
            return WorkerExit::Exited(SPAWN_FAILED);
        }
    };

    tokio::select! {
        status = child.wait() => {
            return match status {
                Ok(status) => WorkerExit::Exited(exit_code(status)),
                Err(e) => {
                    tracing::warn!(error = %e, "failed to wait on worker");
                    WorkerExit::Exited(-1)
                }
            };
        }
        _ = token.cancelled() => {}
    }

    if let Ok(Some(status)) = child.try_wait() {
        return WorkerExit::Exited(exit_code(status));
    }
    if let Err(e) = child.kill().await {
        tracing::warn!(pid = ?child.id(), error = %e, "failed to kill worker");
    }
    WorkerExit::TimedOut
}
