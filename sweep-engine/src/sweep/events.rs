// Sweep Events
// Progress reporting for a running sweep

use crate::build::{BuildAction, ResolveSummary};
use crate::catalog::{ScalingRegime, Tool};
use crate::supervisor::RunStatus;

use std::time::Duration;
use tokio::sync::mpsc;

/// Sender for sweep progress events
pub type ProgressSender = mpsc::UnboundedSender<SweepEvent>;

/// Receiver for sweep progress events
pub type ProgressReceiver = mpsc::UnboundedReceiver<SweepEvent>;

/// Create a new progress channel
pub fn progress_channel() -> (ProgressSender, ProgressReceiver) {
    mpsc::unbounded_channel()
}

/// Events emitted while a sweep runs
#[derive(Debug, Clone)]
pub enum SweepEvent {
    /// Inputs were verified and the sweep is about to build
    SweepStarted {
        tool: Tool,
        entries: usize,
        thread_series: Vec<u32>,
        dry_run: bool,
    },

    /// One catalog entry has an executable (or a planned one in a dry run)
    BinaryResolved { name: String, action: BuildAction },

    /// Every catalog entry has an executable
    BinariesResolved { summary: ResolveSummary },

    /// The pair cannot run: thread count not divisible by threads per process
    PairSkipped {
        name: String,
        thread_count: u32,
        threads_per_process: u32,
    },

    /// The tool's index files were found
    IndexVerified { tool: Tool },

    /// Read sets were (re)built for a new regime
    ReadsPrepared {
        name: String,
        thread_count: u32,
        regime: ScalingRegime,
        blocked: bool,
        read_sets: usize,
    },

    /// A worker group is about to start
    AttemptStarted {
        name: String,
        run_name: String,
        thread_count: u32,
        process_count: u32,
        warmup: bool,
    },

    /// A command that a dry run would have started
    CommandPlanned { run_name: String, command: String },

    /// A worker group finished
    AttemptCompleted {
        name: String,
        run_name: String,
        status: RunStatus,
        warmup: bool,
        exit_codes: Vec<Option<i32>>,
        duration: Duration,
    },

    /// Every pair was visited
    SweepCompleted {
        attempts: usize,
        failed: usize,
        timed_out: usize,
        duration: Duration,
    },
}

impl SweepEvent {
    /// Create an attempt started event
    pub fn attempt_started(
        name: impl Into<String>,
        run_name: impl Into<String>,
        thread_count: u32,
        process_count: u32,
        warmup: bool,
    ) -> Self {
        Self::AttemptStarted {
            name: name.into(),
            run_name: run_name.into(),
            thread_count,
            process_count,
            warmup,
        }
    }

    /// Create an attempt completed event
    pub fn attempt_completed(
        name: impl Into<String>,
        run_name: impl Into<String>,
        status: RunStatus,
        warmup: bool,
        exit_codes: Vec<Option<i32>>,
        duration: Duration,
    ) -> Self {
        Self::AttemptCompleted {
            name: name.into(),
            run_name: run_name.into(),
            status,
            warmup,
            exit_codes,
            duration,
        }
    }

    /// Create a pair skipped event
    pub fn pair_skipped(name: impl Into<String>, thread_count: u32, threads_per_process: u32) -> Self {
        Self::PairSkipped {
            name: name.into(),
            thread_count,
            threads_per_process,
        }
    }
}
