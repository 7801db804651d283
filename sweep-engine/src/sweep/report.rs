// Sweep Report
// Sentinel files and the machine-readable summary of recorded attempts

use crate::build::ResolveSummary;
use crate::catalog::{ScalingRegime, Tool};
use crate::error::{SweepError, SweepResult};
use crate::supervisor::RunStatus;

use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};

/// Marker written once every worker of an attempt has been joined
pub const JOIN_SENTINEL: &str = "JOIN";

/// File name of the JSON summary under `outputDir/{pairing}`
pub const SUMMARY_FILE: &str = "sweep_summary.json";

/// Create the empty marker file `{dir}/{run_name}.{marker}`
pub fn write_sentinel(dir: &Path, run_name: &str, marker: &str) -> SweepResult<PathBuf> {
    let path = dir.join(format!("{}.{}", run_name, marker));
    fs::write(&path, b"").map_err(|e| SweepError::io(&path, e))?;
    Ok(path)
}

/// One recorded run attempt
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttemptRecord {
    pub name: String,
    pub run_name: String,
    pub regime: ScalingRegime,
    pub thread_count: u32,
    pub process_count: u32,
    pub threads_per_process: u32,
    /// Whether a discarded warm-up run preceded this one
    pub warmed_up: bool,
    pub status: RunStatus,
    /// Per process; `null` for a process killed at the deadline
    pub exit_codes: Vec<Option<i32>>,
    pub elapsed_secs: f64,
}

/// A pair skipped because the thread count was not divisible
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkippedPair {
    pub name: String,
    pub thread_count: u32,
    pub threads_per_process: u32,
}

/// Everything a sweep did
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SweepReport {
    pub tool: Tool,
    pub pairing: String,
    pub thread_series: Vec<u32>,
    pub dry_run: bool,
    pub builds: ResolveSummary,
    pub attempts: Vec<AttemptRecord>,
    pub skipped: Vec<SkippedPair>,
    pub elapsed_secs: f64,
}

impl SweepReport {
    pub fn new(tool: Tool, pairing: &str, thread_series: Vec<u32>, dry_run: bool) -> Self {
        Self {
            tool,
            pairing: pairing.to_string(),
            thread_series,
            dry_run,
            builds: ResolveSummary::default(),
            attempts: Vec::new(),
            skipped: Vec::new(),
            elapsed_secs: 0.0,
        }
    }

    pub fn count(&self, status: RunStatus) -> usize {
        self.attempts.iter().filter(|a| a.status == status).count()
    }

    pub fn all_succeeded(&self) -> bool {
        self.attempts.iter().all(|a| a.status == RunStatus::Succeed)
    }

    /// Write the report as pretty JSON to `{dir}/sweep_summary.json`
    pub fn write_json(&self, dir: &Path) -> SweepResult<PathBuf> {
        fs::create_dir_all(dir).map_err(|e| SweepError::io(dir, e))?;
        let path = dir.join(SUMMARY_FILE);
        let json = serde_json::to_string_pretty(self)?;
        fs::write(&path, json).map_err(|e| SweepError::io(&path, e))?;
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt(status: RunStatus) -> AttemptRecord {
        AttemptRecord {
            name: "v1".to_string(),
            run_name: "v1_unp_0_0_4_1".to_string(),
            regime: ScalingRegime::MultiThread,
            thread_count: 4,
            process_count: 1,
            threads_per_process: 4,
            warmed_up: true,
            status,
            exit_codes: vec![None],
            elapsed_secs: 1.5,
        }
    }

    #[test]
    fn test_write_sentinel() {
        let temp = tempfile::tempdir().unwrap();
        let path = write_sentinel(temp.path(), "v1_unp_0_0_4_1", JOIN_SENTINEL).unwrap();
        assert_eq!(path, temp.path().join("v1_unp_0_0_4_1.JOIN"));
        assert_eq!(fs::metadata(&path).unwrap().len(), 0);
    }

    #[test]
    fn test_counts() {
        let mut report = SweepReport::new(Tool::Bowtie2, "unp", vec![4], false);
        assert!(report.all_succeeded());
        report.attempts.push(attempt(RunStatus::Succeed));
        report.attempts.push(attempt(RunStatus::TimeOut));
        assert_eq!(report.count(RunStatus::TimeOut), 1);
        assert_eq!(report.count(RunStatus::Fail), 0);
        assert!(!report.all_succeeded());
    }

    #[test]
    fn test_write_json() {
        let temp = tempfile::tempdir().unwrap();
        let mut report = SweepReport::new(Tool::Bowtie2, "unp", vec![4], false);
        report.attempts.push(attempt(RunStatus::TimeOut));

        let path = report.write_json(&temp.path().join("unp")).unwrap();
        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap();
        assert_eq!(value["tool"], "bowtie2");
        assert_eq!(value["attempts"][0]["status"], "TIME_OUT");
        assert_eq!(value["attempts"][0]["regime"], "MT");
        assert!(value["attempts"][0]["exit_codes"][0].is_null());
    }
}
