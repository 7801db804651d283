// Sweep Configuration
// Every option of a sweep, loadable from a YAML settings file

use crate::error::{SweepError, SweepResult};
use crate::partition::ReadInputs;

use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default per-attempt timeout: 20 minutes
pub const DEFAULT_TIMEOUT_SECS: u64 = 1200;

/// Options for one thread-scaling sweep
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SweepConfig {
    /// Index basename, without the tool-specific suffixes
    pub index: PathBuf,
    /// Tab-separated catalog of configurations
    pub catalog: PathBuf,
    /// Where timings, logs and sentinels go
    pub output_dir: PathBuf,
    /// Where working copies and binaries go
    pub build_dir: PathBuf,
    /// Source read files
    pub reads: ReadInputs,
    /// Seconds before a worker group is killed
    pub timeout_secs: u64,
    /// Total thread counts to run, in order
    pub thread_series: Vec<u32>,
    /// Reads aligned per thread
    pub reads_per_thread: u64,
    /// Repository to clone instead of the tool's default
    pub repo_url: Option<String>,
    /// Scratch space for read slices and alignment output; should be local storage
    pub temp_dir: Option<PathBuf>,
    /// Build flags appended to every catalog entry
    pub extra_build_flags: Option<String>,
    pub force_builds: bool,
    pub pull: bool,
    pub dry_run: bool,
    /// Put alignment output under the output directory instead of the temp directory
    pub sam_output_dir: bool,
    /// Send alignment output to /dev/null
    pub sam_dev_null: bool,
    /// Delete alignment output as soon as each attempt finishes
    pub delete_sam: bool,
    /// Abort the sweep on the first failed attempt
    pub stop_on_fail: bool,
    /// Skip counting input reads up front
    pub no_count: bool,
    /// Sample iostat/top around every attempt
    pub telemetry: bool,
    /// Require blocked and unblocked mate-1 inputs to have equal line counts
    pub strict_blocked_count: bool,
}

impl Default for SweepConfig {
    fn default() -> Self {
        Self {
            index: PathBuf::new(),
            catalog: PathBuf::new(),
            output_dir: PathBuf::new(),
            build_dir: PathBuf::from("build"),
            reads: ReadInputs::default(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
            thread_series: Vec::new(),
            reads_per_thread: 0,
            repo_url: None,
            temp_dir: None,
            extra_build_flags: None,
            force_builds: false,
            pull: false,
            dry_run: false,
            sam_output_dir: false,
            sam_dev_null: false,
            delete_sam: false,
            stop_on_fail: false,
            no_count: false,
            telemetry: true,
            strict_blocked_count: false,
        }
    }
}

impl SweepConfig {
    /// Load settings from a YAML file; absent keys keep their defaults
    pub fn from_yaml_file<P: AsRef<Path>>(path: P) -> SweepResult<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path).map_err(|e| SweepError::io(path, e))?;
        serde_yaml::from_str(&content).map_err(|source| SweepError::Settings {
            path: path.to_path_buf(),
            source,
        })
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// `pe` or `unp`
    pub fn pairing(&self) -> &'static str {
        self.reads.pairing()
    }

    pub fn max_threads(&self) -> u32 {
        self.thread_series.iter().copied().max().unwrap_or(0)
    }

    /// Reads the largest experiment consumes
    pub fn reads_needed(&self) -> u64 {
        self.reads_per_thread * u64::from(self.max_threads())
    }

    /// Reject missing or contradictory options
    pub fn validate(&self) -> SweepResult<()> {
        let required = [
            ("index", &self.index),
            ("catalog", &self.catalog),
            ("output directory", &self.output_dir),
            ("mate-1 reads", &self.reads.m1),
        ];
        for (what, path) in required {
            if path.as_os_str().is_empty() {
                return Err(SweepError::InvalidConfig(format!("{} must be set", what)));
            }
        }
        if self.thread_series.is_empty() {
            return Err(SweepError::InvalidConfig(
                "thread series is empty".to_string(),
            ));
        }
        if self.thread_series.contains(&0) {
            return Err(SweepError::InvalidConfig(
                "thread series must contain only positive thread counts".to_string(),
            ));
        }
        if self.reads_per_thread == 0 {
            return Err(SweepError::InvalidConfig(
                "reads per thread must be positive".to_string(),
            ));
        }
        if self.timeout_secs == 0 {
            return Err(SweepError::InvalidConfig(
                "timeout must be positive".to_string(),
            ));
        }
        if self.reads.m2_blocked.is_some() && self.reads.m2.is_none() {
            return Err(SweepError::InvalidConfig(
                "blocked mate-2 reads given without unblocked mate-2 reads".to_string(),
            ));
        }
        Ok(())
    }
}
