// Sweep Engine Library
// Thread-scaling benchmark sweeps for sequence aligners

pub mod build;
pub mod catalog;
pub mod config;
pub mod error;
pub mod index;
pub mod partition;
pub mod probe;
pub mod supervisor;
pub mod sweep;

// Re-export commonly used types
pub use config::SweepConfig;
pub use error::{ErrorKind, SweepError, SweepResult};

// Re-export catalog types
pub use catalog::{Catalog, CatalogError, ConfigEntry, ScalingRegime, Tool, WorkerLayout};

// Re-export build types
pub use build::{BuildAction, BuildResolver, BuildTool, Git, Make, ResolveSummary, VersionControl};

// Re-export partition and probe types
pub use partition::{Partitioner, ReadInputs, ReadSet};
pub use probe::{FsProbe, LocalFs};

// Re-export supervisor types
pub use supervisor::{GroupResult, RunStatus, Supervisor, Telemetry};

// Re-export sweep types
pub use sweep::{
    progress_channel, Preflight, ProgressReceiver, ProgressSender, SweepController, SweepEvent,
    SweepReport,
};
