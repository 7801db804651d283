// Sweep Errors
// Fatal error taxonomy for catalog, setup and run escalation failures

use crate::catalog::CatalogError;

use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Result alias used across the engine
pub type SweepResult<T> = Result<T, SweepError>;

/// Broad class of a fatal error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Bad catalog, options or inputs; raised before any run starts
    Configuration,
    /// Build, index or partitioning failure; aborts the sweep
    Setup,
    /// A run outcome escalated by stop-on-fail
    Run,
}

/// Errors that abort a sweep
#[derive(Debug, Error)]
pub enum SweepError {
    #[error("Catalog error: {0}")]
    Catalog(#[from] CatalogError),

    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("No such reads file as \"{}\"", .0.display())]
    MissingReads(PathBuf),

    #[error("Reads required for biggest experiment ({needed}) exceed number of input reads ({available})")]
    InsufficientReads { needed: u64, available: u64 },

    #[error("Unexpected combination of multiprocessing ({0} threads per process) and blocked input")]
    BlockedMultiprocess(u32),

    #[error("Line count mismatch between unblocked ({unblocked}) and blocked ({blocked}) inputs")]
    BlockedCountMismatch { unblocked: u64, blocked: u64 },

    #[error("Command `{command}` for {tool} version '{name}' exited with {code}")]
    BuildFailed {
        tool: String,
        name: String,
        command: String,
        code: i32,
    },

    #[error("Index \"{basename}\" for {tool} is incomplete; missing {}", .missing.join(", "))]
    IndexIncomplete {
        tool: String,
        basename: String,
        missing: Vec<String>,
    },

    #[error("Expected {expected} lines, found {found} in \"{}\"", .path.display())]
    SliceLineCount {
        path: PathBuf,
        expected: u64,
        found: u64,
    },

    #[error("Split failed to create file \"{}\"", .0.display())]
    SplitMissing(PathBuf),

    #[error("Got one more output file than expected from split: \"{}\"", .0.display())]
    SplitExtra(PathBuf),

    #[error("Cannot split into {0} slices; at most 17576 three-letter suffixes exist")]
    TooManySlices(u32),

    #[error("At least one process of '{run_name}' exited with non-zero exit level. Exit levels: {exit_codes:?}")]
    RunFailed {
        run_name: String,
        exit_codes: Vec<Option<i32>>,
    },

    #[error("Failed to parse settings file \"{}\": {source}", .path.display())]
    Settings {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("Failed to write sweep summary: {0}")]
    Summary(#[from] serde_json::Error),

    #[error("IO error on \"{}\": {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },
}

impl SweepError {
    /// Wrap an IO error with the path it occurred on
    pub fn io(path: impl Into<PathBuf>, source: io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Which class of failure this is
    pub fn kind(&self) -> ErrorKind {
        match self {
            SweepError::Catalog(_)
            | SweepError::InvalidConfig(_)
            | SweepError::MissingReads(_)
            | SweepError::InsufficientReads { .. }
            | SweepError::BlockedMultiprocess(_)
            | SweepError::BlockedCountMismatch { .. }
            | SweepError::Settings { .. } => ErrorKind::Configuration,
            SweepError::BuildFailed { .. }
            | SweepError::IndexIncomplete { .. }
            | SweepError::SliceLineCount { .. }
            | SweepError::SplitMissing(_)
            | SweepError::SplitExtra(_)
            | SweepError::TooManySlices(_)
            | SweepError::Summary(_)
            | SweepError::Io { .. } => ErrorKind::Setup,
            SweepError::RunFailed { .. } => ErrorKind::Run,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_kinds() {
        let err = SweepError::InsufficientReads {
            needed: 10,
            available: 5,
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = SweepError::SplitExtra(PathBuf::from("/tmp/1_aac"));
        assert_eq!(err.kind(), ErrorKind::Setup);

        let err = SweepError::RunFailed {
            run_name: "x".to_string(),
            exit_codes: vec![Some(1)],
        };
        assert_eq!(err.kind(), ErrorKind::Run);
    }

    #[test]
    fn test_error_messages_name_the_file() {
        let err = SweepError::SliceLineCount {
            path: PathBuf::from("/tmp/1.fq"),
            expected: 400,
            found: 396,
        };
        assert_eq!(
            err.to_string(),
            "Expected 400 lines, found 396 in \"/tmp/1.fq\""
        );

        let err = SweepError::IndexIncomplete {
            tool: "bwa".to_string(),
            basename: "hg38".to_string(),
            missing: vec!["hg38.sa".to_string(), "hg38.pac".to_string()],
        };
        assert!(err.to_string().contains("hg38.sa, hg38.pac"));
    }
}
