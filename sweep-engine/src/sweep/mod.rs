// Sweep Module
// The controller that runs a thread-count series across a catalog

pub mod command;
pub mod controller;
pub mod events;
pub mod report;
pub mod state;

// Re-export key types
pub use command::{run_name, AlignerCall, OutputLayout, WorkerSinks, RECORDED_REPETITION};
pub use controller::{Preflight, SweepController};
pub use events::{progress_channel, ProgressReceiver, ProgressSender, SweepEvent};
pub use report::{write_sentinel, AttemptRecord, SkippedPair, SweepReport, JOIN_SENTINEL, SUMMARY_FILE};
pub use state::{RegimeKey, SweepState};
