use std::path::PathBuf;

use clap::Args;
use color_eyre::Result;

use sweep_engine::SweepConfig;

/// Options shared by every command that reads a sweep definition
#[derive(Args, Debug, Default)]
pub struct SweepArgs {
    /// YAML settings file; flags given on the command line take precedence
    #[arg(long, value_name = "FILE")]
    pub settings: Option<PathBuf>,

    /// Index basename, without the tool-specific suffixes
    #[arg(long, value_name = "BASENAME")]
    pub index: Option<PathBuf>,

    /// Tab-separated catalog of configurations to sweep
    #[arg(long = "config", value_name = "FILE")]
    pub catalog: Option<PathBuf>,

    /// Directory for timings, logs and sentinel files
    #[arg(long, value_name = "DIR")]
    pub output_dir: Option<PathBuf>,

    /// Directory for working copies and binaries [default: build]
    #[arg(long, value_name = "DIR")]
    pub build_dir: Option<PathBuf>,

    /// Mate-1 (or unpaired) reads
    #[arg(long, value_name = "FASTQ")]
    pub m1: Option<PathBuf>,

    /// Blocked-format mate-1 reads
    #[arg(long, value_name = "FASTQ")]
    pub m1b: Option<PathBuf>,

    /// Mate-2 reads; makes the sweep paired-end
    #[arg(long, value_name = "FASTQ")]
    pub m2: Option<PathBuf>,

    /// Blocked-format mate-2 reads
    #[arg(long, value_name = "FASTQ")]
    pub m2b: Option<PathBuf>,

    /// Seconds before a worker group is killed [default: 1200]
    #[arg(long, value_name = "SECS")]
    pub timeout: Option<u64>,

    /// Comma-separated total thread counts [default: available parallelism]
    #[arg(long, value_name = "N,N,...", value_delimiter = ',')]
    pub nthread_series: Option<Vec<u32>>,

    /// Reads aligned per thread
    #[arg(long, value_name = "N")]
    pub reads_per_thread: Option<u64>,

    /// Repository to clone instead of the tool's default
    #[arg(long, value_name = "URL")]
    pub repo: Option<String>,

    /// Scratch directory for read slices; should be local storage [default: fresh temp dir]
    #[arg(long, value_name = "DIR")]
    pub tempdir: Option<PathBuf>,

    /// Build flags appended to every catalog entry
    #[arg(long, value_name = "FLAGS")]
    pub preproc: Option<String>,

    /// Delete existing builds and build again
    #[arg(long)]
    pub force_builds: bool,

    /// Pull and rebuild existing builds
    #[arg(long)]
    pub pull: bool,

    /// Verify everything and print the commands without building or running
    #[arg(long)]
    pub dry_run: bool,

    /// Put alignment output under the output directory
    #[arg(long)]
    pub sam_output_dir: bool,

    /// Send alignment output to /dev/null
    #[arg(long)]
    pub sam_dev_null: bool,

    /// Delete alignment output after each run
    #[arg(long)]
    pub delete_sam: bool,

    /// Abort the sweep on the first failed run
    #[arg(long)]
    pub stop_on_fail: bool,

    /// Skip counting input reads up front
    #[arg(long)]
    pub no_count: bool,

    /// Do not sample iostat and top during runs
    #[arg(long)]
    pub no_telemetry: bool,

    /// Fail when blocked and unblocked mate-1 inputs differ in line count
    #[arg(long)]
    pub strict_blocked_count: bool,
}

impl SweepArgs {
    /// Settings file values, overridden by every flag given on the command line
    pub fn into_config(self) -> Result<SweepConfig> {
        let mut config = match &self.settings {
            Some(path) => SweepConfig::from_yaml_file(path)?,
            None => SweepConfig::default(),
        };

        override_with(&mut config.index, self.index);
        override_with(&mut config.catalog, self.catalog);
        override_with(&mut config.output_dir, self.output_dir);
        override_with(&mut config.build_dir, self.build_dir);
        override_with(&mut config.reads.m1, self.m1);
        override_with(&mut config.timeout_secs, self.timeout);
        override_with(&mut config.thread_series, self.nthread_series);
        override_with(&mut config.reads_per_thread, self.reads_per_thread);
        if self.m1b.is_some() {
            config.reads.m1_blocked = self.m1b;
        }
        if self.m2.is_some() {
            config.reads.m2 = self.m2;
        }
        if self.m2b.is_some() {
            config.reads.m2_blocked = self.m2b;
        }
        if self.repo.is_some() {
            config.repo_url = self.repo;
        }
        if self.tempdir.is_some() {
            config.temp_dir = self.tempdir;
        }
        if self.preproc.is_some() {
            config.extra_build_flags = self.preproc;
        }

        config.force_builds |= self.force_builds;
        config.pull |= self.pull;
        config.dry_run |= self.dry_run;
        config.sam_output_dir |= self.sam_output_dir;
        config.sam_dev_null |= self.sam_dev_null;
        config.delete_sam |= self.delete_sam;
        config.stop_on_fail |= self.stop_on_fail;
        config.no_count |= self.no_count;
        config.strict_blocked_count |= self.strict_blocked_count;
        if self.no_telemetry {
            config.telemetry = false;
        }

        if config.thread_series.is_empty() {
            let threads = std::thread::available_parallelism().map_or(1, |n| n.get());
            config.thread_series = vec![u32::try_from(threads).unwrap_or(u32::MAX)];
        }

        Ok(config)
    }
}

fn override_with<T>(slot: &mut T, value: Option<T>) {
    if let Some(value) = value {
        *slot = value;
    }
}
