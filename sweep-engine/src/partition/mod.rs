// Dataset Partitioner
// Slices the mate files into per-process read sets for each scaling regime

pub mod slice;

pub use slice::{slice_label, slice_path, LINES_PER_READ, MAX_SLICES};

use crate::error::{SweepError, SweepResult};
use crate::probe::FsProbe;

use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

const MATE1_MT: &str = "1.fq";
const MATE2_MT: &str = "2.fq";
const MATE1_PREFIX: &str = "1_";
const MATE2_PREFIX: &str = "2_";

/// The read files a sweep slices its inputs from
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReadInputs {
    /// Mate-1 FASTQ (or unpaired reads)
    pub m1: PathBuf,
    /// Mate-2 FASTQ; its presence makes the sweep paired-end
    #[serde(default)]
    pub m2: Option<PathBuf>,
    /// Blocked-format mate-1
    #[serde(default)]
    pub m1_blocked: Option<PathBuf>,
    /// Blocked-format mate-2
    #[serde(default)]
    pub m2_blocked: Option<PathBuf>,
}

impl ReadInputs {
    pub fn is_paired(&self) -> bool {
        self.m2.is_some()
    }

    /// `pe` for paired-end inputs, `unp` otherwise
    pub fn pairing(&self) -> &'static str {
        if self.is_paired() {
            "pe"
        } else {
            "unp"
        }
    }

    /// Fail on the first declared input that is not a regular file
    pub fn verify(&self, probe: &dyn FsProbe) -> SweepResult<()> {
        let declared = std::iter::once(&self.m1)
            .chain(self.m2.iter())
            .chain(self.m1_blocked.iter())
            .chain(self.m2_blocked.iter());
        for path in declared {
            if !probe.exists(path) || !probe.is_file(path) {
                return Err(SweepError::MissingReads(path.clone()));
            }
        }
        Ok(())
    }

    /// Fail unless every mate has a blocked-format counterpart
    pub fn verify_blocked(&self) -> SweepResult<()> {
        self.mate1_source(true)?;
        self.mate2_source(true)?;
        Ok(())
    }

    fn mate1_source(&self, blocked: bool) -> SweepResult<&Path> {
        if blocked {
            self.m1_blocked.as_deref().ok_or_else(|| {
                SweepError::InvalidConfig(
                    "blocked input requested but no blocked mate-1 file is configured".to_string(),
                )
            })
        } else {
            Ok(&self.m1)
        }
    }

    fn mate2_source(&self, blocked: bool) -> SweepResult<Option<&Path>> {
        match (&self.m2, blocked) {
            (None, _) => Ok(None),
            (Some(m2), false) => Ok(Some(m2.as_path())),
            (Some(_), true) => self.m2_blocked.as_deref().map(Some).ok_or_else(|| {
                SweepError::InvalidConfig(
                    "blocked input requested but no blocked mate-2 file is configured".to_string(),
                )
            }),
        }
    }
}

/// Input files for one worker process
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ReadSet {
    pub mate1: PathBuf,
    pub mate2: Option<PathBuf>,
}

impl ReadSet {
    pub fn files(&self) -> Vec<&Path> {
        std::iter::once(self.mate1.as_path())
            .chain(self.mate2.as_deref())
            .collect()
    }
}

/// Produces read sets sized to the thread count of a run
pub struct Partitioner {
    probe: Arc<dyn FsProbe>,
    inputs: ReadInputs,
    reads_per_thread: u64,
}

impl Partitioner {
    pub fn new(probe: Arc<dyn FsProbe>, inputs: ReadInputs, reads_per_thread: u64) -> Self {
        Self {
            probe,
            inputs,
            reads_per_thread,
        }
    }

    pub fn inputs(&self) -> &ReadInputs {
        &self.inputs
    }

    /// Slice the inputs for `total_threads` threads split into processes of
    /// `threads_per_process` threads (0: one process) and verify the result.
    pub fn prepare(
        &self,
        total_threads: u32,
        threads_per_process: u32,
        output_dir: &Path,
        blocked: bool,
    ) -> SweepResult<Vec<ReadSet>> {
        fs::create_dir_all(output_dir).map_err(|e| SweepError::io(output_dir, e))?;
        if threads_per_process == 0 {
            self.prepare_single(total_threads, output_dir, blocked)
        } else {
            self.prepare_split(total_threads, threads_per_process, output_dir, blocked)
        }
    }

    /// The read sets [`prepare`](Self::prepare) would produce, without touching
    /// the filesystem
    pub fn plan(
        &self,
        total_threads: u32,
        threads_per_process: u32,
        output_dir: &Path,
        blocked: bool,
    ) -> SweepResult<Vec<ReadSet>> {
        if threads_per_process == 0 {
            return Ok(vec![self.mt_read_set(output_dir)]);
        }
        let process_count = checked_process_count(total_threads, threads_per_process, blocked)?;
        Ok(self.mp_read_sets(output_dir, process_count))
    }

    fn mt_read_set(&self, output_dir: &Path) -> ReadSet {
        ReadSet {
            mate1: output_dir.join(MATE1_MT),
            mate2: self.inputs.m2.as_ref().map(|_| output_dir.join(MATE2_MT)),
        }
    }

    fn mp_read_sets(&self, output_dir: &Path, process_count: u32) -> Vec<ReadSet> {
        (0..process_count)
            .map(|i| ReadSet {
                mate1: slice_path(output_dir, MATE1_PREFIX, i),
                mate2: self
                    .inputs
                    .m2
                    .as_ref()
                    .map(|_| slice_path(output_dir, MATE2_PREFIX, i)),
            })
            .collect()
    }

    fn prepare_single(
        &self,
        total_threads: u32,
        output_dir: &Path,
        blocked: bool,
    ) -> SweepResult<Vec<ReadSet>> {
        let reads = self.reads_per_thread * u64::from(total_threads);
        let read_set = self.mt_read_set(output_dir);

        let src = self.inputs.mate1_source(blocked)?;
        self.range_slice_checked(src, &read_set.mate1, reads)?;
        if let (Some(src), Some(dst)) = (self.inputs.mate2_source(blocked)?, &read_set.mate2) {
            self.range_slice_checked(src, dst, reads)?;
        }
        Ok(vec![read_set])
    }

    fn range_slice_checked(&self, src: &Path, dst: &Path, reads: u64) -> SweepResult<()> {
        tracing::debug!(src = %src.display(), dst = %dst.display(), reads, "range slice");
        slice::range_slice(src, dst, 0, reads).map_err(|e| SweepError::io(src, e))?;
        self.expect_lines(dst, reads * LINES_PER_READ)
    }

    fn prepare_split(
        &self,
        total_threads: u32,
        threads_per_process: u32,
        output_dir: &Path,
        blocked: bool,
    ) -> SweepResult<Vec<ReadSet>> {
        let process_count = checked_process_count(total_threads, threads_per_process, blocked)?;
        let reads_per_process = self.reads_per_thread * u64::from(threads_per_process);

        self.split_checked(&self.inputs.m1, output_dir, MATE1_PREFIX, reads_per_process, process_count)?;
        if let Some(m2) = &self.inputs.m2 {
            self.split_checked(m2, output_dir, MATE2_PREFIX, reads_per_process, process_count)?;
        }

        let read_sets = self.mp_read_sets(output_dir, process_count);
        for read_set in &read_sets {
            for path in read_set.files() {
                if !self.probe.exists(path) {
                    return Err(SweepError::SplitMissing(path.to_path_buf()));
                }
            }
        }
        let extra = slice_path(output_dir, MATE1_PREFIX, process_count);
        if process_count < MAX_SLICES && self.probe.exists(&extra) {
            return Err(SweepError::SplitExtra(extra));
        }
        Ok(read_sets)
    }

    fn split_checked(
        &self,
        src: &Path,
        output_dir: &Path,
        prefix: &str,
        reads_per_process: u64,
        process_count: u32,
    ) -> SweepResult<()> {
        tracing::debug!(
            src = %src.display(),
            prefix,
            reads_per_process,
            process_count,
            "head-then-split"
        );
        slice::split_slices(src, output_dir, prefix, reads_per_process, process_count)
            .map_err(|e| SweepError::io(src, e))?;
        for i in 0..process_count {
            let path = slice_path(output_dir, prefix, i);
            if !self.probe.exists(&path) {
                return Err(SweepError::SplitMissing(path));
            }
            self.expect_lines(&path, reads_per_process * LINES_PER_READ)?;
        }
        Ok(())
    }

    fn expect_lines(&self, path: &Path, expected: u64) -> SweepResult<()> {
        let found = self
            .probe
            .line_count(path)
            .map_err(|e| SweepError::io(path, e))?;
        if found != expected {
            return Err(SweepError::SliceLineCount {
                path: path.to_path_buf(),
                expected,
                found,
            });
        }
        Ok(())
    }
}

fn checked_process_count(
    total_threads: u32,
    threads_per_process: u32,
    blocked: bool,
) -> SweepResult<u32> {
    if blocked {
        return Err(SweepError::BlockedMultiprocess(threads_per_process));
    }
    if total_threads % threads_per_process != 0 {
        return Err(SweepError::InvalidConfig(format!(
            "{} threads cannot be split into processes of {} threads",
            total_threads, threads_per_process
        )));
    }
    let process_count = total_threads / threads_per_process;
    if process_count > MAX_SLICES {
        return Err(SweepError::TooManySlices(process_count));
    }
    Ok(process_count)
}

/// Delete every file of `read_sets`; returns how many were removed.
/// Failures are logged, not raised.
pub fn purge(read_sets: &[ReadSet]) -> usize {
    let mut removed = 0;
    for path in read_sets.iter().flat_map(ReadSet::files) {
        match fs::remove_file(path) {
            Ok(()) => removed += 1,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to purge read file"),
        }
    }
    removed
}

/// Remove slice files left in `dir` by an interrupted earlier sweep
pub fn purge_stale(dir: &Path) -> io::Result<usize> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e),
    };
    let mut removed = 0;
    for entry in entries {
        let entry = entry?;
        let name = entry.file_name();
        if is_slice_name(&name.to_string_lossy()) && entry.file_type()?.is_file() {
            fs::remove_file(entry.path())?;
            removed += 1;
        }
    }
    Ok(removed)
}

fn is_slice_name(name: &str) -> bool {
    if name == MATE1_MT || name == MATE2_MT {
        return true;
    }
    [MATE1_PREFIX, MATE2_PREFIX].iter().any(|prefix| {
        name.strip_prefix(prefix).is_some_and(|suffix| {
            suffix.len() == slice::SUFFIX_LEN && suffix.bytes().all(|b| b.is_ascii_lowercase())
        })
    })
}
