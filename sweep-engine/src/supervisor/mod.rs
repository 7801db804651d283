// Process Supervisor
// Runs a worker group under one wall-clock deadline and kills the whole
// group together when the deadline passes

pub mod telemetry;
pub mod worker;

pub use telemetry::{Telemetry, TelemetryHandle, TelemetrySinks};
pub use worker::{supervise, OutputSink, WorkerCommand, WorkerExit, SPAWN_FAILED};

use serde::Serialize;
use std::fmt;
use std::time::{Duration, Instant};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

/// Terminal status of a run attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum RunStatus {
    Succeed,
    Fail,
    TimeOut,
}

impl RunStatus {
    /// Extension of the sentinel file marking this status
    pub fn sentinel(&self) -> &'static str {
        match self {
            RunStatus::Succeed => "SUCCEED",
            RunStatus::Fail => "FAIL",
            RunStatus::TimeOut => "TIME_OUT",
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.sentinel())
    }
}

/// Any timeout wins over any failure; otherwise success
pub fn classify(exits: &[WorkerExit]) -> RunStatus {
    if exits.iter().any(|e| *e == WorkerExit::TimedOut) {
        RunStatus::TimeOut
    } else if exits.iter().any(|e| *e != WorkerExit::Exited(0)) {
        RunStatus::Fail
    } else {
        RunStatus::Succeed
    }
}

/// Result of one supervised worker group
#[derive(Debug, Clone)]
pub struct GroupResult {
    /// Per-command outcome, in command order
    pub exits: Vec<WorkerExit>,
    pub status: RunStatus,
    /// From batch start to the last join
    pub elapsed: Duration,
}

impl GroupResult {
    pub fn exit_codes(&self) -> Vec<Option<i32>> {
        self.exits.iter().map(WorkerExit::code).collect()
    }
}

/// Starts worker groups and enforces their timeout
pub struct Supervisor {
    timeout: Duration,
    telemetry: Telemetry,
}

impl Supervisor {
    pub fn new(timeout: Duration) -> Self {
        Self {
            timeout,
            telemetry: Telemetry::disabled(),
        }
    }

    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// Start every command, then join them all against one deadline.
    ///
    /// If any command is still running at the deadline the shared token is
    /// cancelled, every still-running command is killed, and the remaining
    /// joins wait without a bound. Telemetry samplers run from just before
    /// the first start until just after the last join.
    pub async fn run(&self, commands: Vec<WorkerCommand>, sinks: &TelemetrySinks) -> GroupResult {
        let token = CancellationToken::new();
        let samplers = self.telemetry.start(sinks);

        tracing::info!(workers = commands.len(), "starting processes");
        let started = Instant::now();
        let deadline = tokio::time::Instant::now() + self.timeout;
        let mut handles: Vec<JoinHandle<WorkerExit>> = commands
            .into_iter()
            .map(|command| tokio::spawn(supervise(command, token.clone())))
            .collect();

        let mut exits = Vec::with_capacity(handles.len());
        for handle in handles.iter_mut() {
            if !token.is_cancelled() {
                match tokio::time::timeout_at(deadline, &mut *handle).await {
                    Ok(joined) => {
                        exits.push(joined_exit(joined));
                        continue;
                    }
                    Err(_) => {
                        tracing::warn!(
                            timeout_secs = self.timeout.as_secs_f64(),
                            "process still alive at the deadline; terminating all processes"
                        );
                        token.cancel();
                    }
                }
            }
            exits.push(joined_exit(handle.await));
        }

        samplers.kill().await;
        let elapsed = started.elapsed();
        tracing::info!(elapsed_secs = elapsed.as_secs_f64(), "all processes joined");

        GroupResult {
            status: classify(&exits),
            exits,
            elapsed,
        }
    }
}

fn joined_exit(joined: Result<WorkerExit, tokio::task::JoinError>) -> WorkerExit {
    joined.unwrap_or_else(|e| {
        tracing::warn!(error = %e, "worker task panicked");
        WorkerExit::Exited(-1)
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn argv(args: &[&str]) -> WorkerCommand {
        WorkerCommand {
            argv: args.iter().map(|s| s.to_string()).collect(),
            stdout: OutputSink::Discard,
            stderr: OutputSink::Discard,
        }
    }

    #[test]
    fn test_classify() {
        use WorkerExit::*;
        assert_eq!(classify(&[Exited(0), Exited(0)]), RunStatus::Succeed);
        assert_eq!(classify(&[Exited(0), Exited(1)]), RunStatus::Fail);
        assert_eq!(classify(&[Exited(1), TimedOut]), RunStatus::TimeOut);
        assert_eq!(classify(&[]), RunStatus::Succeed);
    }

    #[test]
    fn test_sentinel_names() {
        assert_eq!(RunStatus::Succeed.sentinel(), "SUCCEED");
        assert_eq!(RunStatus::Fail.sentinel(), "FAIL");
        assert_eq!(RunStatus::TimeOut.to_string(), "TIME_OUT");
    }

    #[tokio::test]
    async fn test_group_succeeds() {
        let supervisor = Supervisor::new(Duration::from_secs(30));
        let result = supervisor
            .run(
                vec![argv(&["true"]), argv(&["sh", "-c", "exit 0"])],
                &TelemetrySinks::discard(),
            )
            .await;

        assert_eq!(result.status, RunStatus::Succeed);
        assert_eq!(result.exit_codes(), vec![Some(0), Some(0)]);
    }

    #[tokio::test]
    async fn test_group_failure_keeps_codes() {
        let supervisor = Supervisor::new(Duration::from_secs(30));
        let result = supervisor
            .run(
                vec![argv(&["sh", "-c", "exit 0"]), argv(&["sh", "-c", "exit 5"])],
                &TelemetrySinks::discard(),
            )
            .await;

        assert_eq!(result.status, RunStatus::Fail);
        assert_eq!(result.exit_codes(), vec![Some(0), Some(5)]);
    }

    #[tokio::test]
    async fn test_group_timeout_kills_everyone() {
        let supervisor = Supervisor::new(Duration::from_millis(300));
        let result = supervisor
            .run(
                vec![
                    argv(&["true"]),
                    argv(&["sleep", "30"]),
                    argv(&["sleep", "30"]),
                ],
                &TelemetrySinks::discard(),
            )
            .await;

        assert_eq!(result.status, RunStatus::TimeOut);
        assert_eq!(result.exits[0], WorkerExit::Exited(0));
        assert_eq!(result.exits[1], WorkerExit::TimedOut);
        assert_eq!(result.exits[2], WorkerExit::TimedOut);
        assert!(result.elapsed < Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_spawn_failure_is_a_failure() {
        let supervisor = Supervisor::new(Duration::from_secs(30));
        let result = supervisor
            .run(vec![argv(&["/nonexistent/aligner"])], &TelemetrySinks::discard())
            .await;

        assert_eq!(result.status, RunStatus::Fail);
        assert_eq!(result.exit_codes(), vec![Some(SPAWN_FAILED)]);
    }

    #[tokio::test]
    async fn test_batch_start_measures_concurrency() {
        let supervisor = Supervisor::new(Duration::from_secs(30));
        let sleepers = (0..4).map(|_| argv(&["sleep", "0.5"])).collect();
        let result = supervisor.run(sleepers, &TelemetrySinks::discard()).await;

        assert_eq!(result.status, RunStatus::Succeed);
        assert!(result.elapsed < Duration::from_millis(1800));
    }
}
