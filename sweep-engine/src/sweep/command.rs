// Aligner Commands
// Run naming, output placement and per-tool command lines

use crate::catalog::{ConfigEntry, Tool};
use crate::partition::ReadSet;
use crate::supervisor::{OutputSink, TelemetrySinks, WorkerCommand};

use std::path::{Path, PathBuf};

/// Repetition index of the recorded run; a warm-up counts down to it
pub const RECORDED_REPETITION: u32 = 1;

/// `{name}_{pairing}_{threadsPerProcess}_{worker}_{threadCount}_{repetition}`
pub fn run_name(
    entry: &ConfigEntry,
    pairing: &str,
    worker: u32,
    thread_count: u32,
    repetition: u32,
) -> String {
    format!(
        "{}_{}_{}_{}_{}_{}",
        entry.name, pairing, entry.threads_per_process, worker, thread_count, repetition
    )
}

/// Where the outputs of recorded runs are placed
#[derive(Debug, Clone)]
pub struct OutputLayout {
    output_root: PathBuf,
    temp_dir: PathBuf,
    pairing: &'static str,
    sam_in_output_dir: bool,
    discard_sam: bool,
}

impl OutputLayout {
    pub fn new(
        output_dir: &Path,
        temp_dir: &Path,
        pairing: &'static str,
        sam_in_output_dir: bool,
        discard_sam: bool,
    ) -> Self {
        Self {
            output_root: output_dir.join(pairing),
            temp_dir: temp_dir.to_path_buf(),
            pairing,
            sam_in_output_dir,
            discard_sam,
        }
    }

    pub fn pairing(&self) -> &'static str {
        self.pairing
    }

    /// `outputDir/{pairing}`
    pub fn root(&self) -> &Path {
        &self.output_root
    }

    /// `outputDir/{pairing}/{name}`: logs, telemetry and sentinels
    pub fn entry_dir(&self, name: &str) -> PathBuf {
        self.output_root.join(name)
    }

    /// Scratch directory the entry's read slices are written to
    pub fn read_dir(&self, name: &str) -> PathBuf {
        self.temp_dir.join(name).join(self.pairing)
    }

    pub fn log_sink(&self, name: &str, run_name: &str, ext: &str) -> OutputSink {
        OutputSink::File(self.entry_dir(name).join(format!("{}.{}", run_name, ext)))
    }

    /// Alignment output for a recorded run
    pub fn sam_sink(&self, name: &str, run_name: &str) -> OutputSink {
        if self.discard_sam {
            return OutputSink::Discard;
        }
        let root = if self.sam_in_output_dir {
            self.entry_dir(name)
        } else {
            self.temp_dir.clone()
        };
        OutputSink::File(
            root.join(name)
                .join(self.pairing)
                .join(run_name)
                .join("out.sam"),
        )
    }

    pub fn telemetry_sinks(&self, name: &str, run_name: &str) -> TelemetrySinks {
        TelemetrySinks {
            iostat: self.log_sink(name, run_name, "iostat"),
            top: self.log_sink(name, run_name, "top"),
        }
    }
}

/// Sinks for one worker process
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkerSinks {
    pub stdout: OutputSink,
    pub stderr: OutputSink,
    pub sam: OutputSink,
}

impl WorkerSinks {
    pub fn discard() -> Self {
        Self {
            stdout: OutputSink::Discard,
            stderr: OutputSink::Discard,
            sam: OutputSink::Discard,
        }
    }
}

/// One aligner invocation over one read set
#[derive(Debug, Clone)]
pub struct AlignerCall<'a> {
    pub tool: Tool,
    pub executable: &'a Path,
    pub index: &'a Path,
    /// Threads given to this process
    pub threads: u32,
    /// Whether the entry runs several processes at once
    pub multiprocess: bool,
    pub aligner_args: &'a [String],
    pub reads: &'a ReadSet,
}

impl AlignerCall<'_> {
    /// Command line and redirections for this invocation.
    ///
    /// bwa writes alignments to stdout, so its stdout goes to the alignment
    /// sink and the stdout sink is unused.
    pub fn command(&self, sinks: WorkerSinks) -> WorkerCommand {
        let mut argv = vec![path(self.executable)];

        if self.tool == Tool::Bwa {
            argv.extend(["mem".to_string(), "-t".to_string(), self.threads.to_string()]);
            argv.extend(self.aligner_args.iter().cloned());
            argv.push(path(self.index));
            argv.extend(self.reads.files().into_iter().map(path));
            return WorkerCommand {
                argv,
                stdout: sinks.sam,
                stderr: sinks.stderr,
            };
        }

        argv.extend(["-p".to_string(), self.threads.to_string()]);
        argv.extend(self.aligner_args.iter().cloned());
        if self.tool != Tool::Bowtie {
            argv.push("-x".to_string());
        }
        argv.push(path(self.index));
        argv.push("-t".to_string());
        if self.multiprocess {
            argv.push("--mm".to_string());
        }
        match &self.reads.mate2 {
            Some(mate2) => {
                argv.extend(["-1".to_string(), path(&self.reads.mate1)]);
                argv.extend(["-2".to_string(), path(mate2)]);
            }
            None if self.tool == Tool::Bowtie => argv.push(path(&self.reads.mate1)),
            None => argv.extend(["-U".to_string(), path(&self.reads.mate1)]),
        }
        argv.extend(["-S".to_string(), sinks.sam.path_arg()]);

        WorkerCommand {
            argv,
            stdout: sinks.stdout,
            stderr: sinks.stderr,
        }
    }
}

fn path(p: &Path) -> String {
    p.to_string_lossy().into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(tool: Tool, threads_per_process: u32) -> ConfigEntry {
        ConfigEntry {
            name: "v1".to_string(),
            tool,
            branch: "master".to_string(),
            threads_per_process,
            build_flags: String::new(),
            aligner_args: "--reorder".to_string(),
        }
    }

    fn reads(paired: bool) -> ReadSet {
        ReadSet {
            mate1: PathBuf::from("/tmp/r/1_aaa"),
            mate2: paired.then(|| PathBuf::from("/tmp/r/2_aaa")),
        }
    }

    fn sinks() -> WorkerSinks {
        WorkerSinks {
            stdout: OutputSink::File(PathBuf::from("/out/run.out")),
            stderr: OutputSink::File(PathBuf::from("/out/run.err")),
            sam: OutputSink::File(PathBuf::from("/tmp/out.sam")),
        }
    }

    fn argv(tool: Tool, threads: u32, multiprocess: bool, paired: bool) -> WorkerCommand {
        let args = vec!["--reorder".to_string()];
        let reads = reads(paired);
        AlignerCall {
            tool,
            executable: Path::new("/b/bt2"),
            index: Path::new("/idx/hg38"),
            threads,
            multiprocess,
            aligner_args: &args,
            reads: &reads,
        }
        .command(sinks())
    }

    #[test]
    fn test_run_name() {
        assert_eq!(run_name(&entry(Tool::Bowtie2, 2), "pe", 0, 8, 1), "v1_pe_2_0_8_1");
        assert_eq!(run_name(&entry(Tool::Bowtie2, 0), "unp", 3, 16, 2), "v1_unp_0_3_16_2");
    }

    #[test]
    fn test_bowtie2_paired_multiprocess() {
        let command = argv(Tool::Bowtie2, 2, true, true);
        assert_eq!(
            command.display(),
            "/b/bt2 -p 2 --reorder -x /idx/hg38 -t --mm -1 /tmp/r/1_aaa -2 /tmp/r/2_aaa -S /tmp/out.sam"
        );
        assert_eq!(command.stdout, OutputSink::File(PathBuf::from("/out/run.out")));
    }

    #[test]
    fn test_hisat_unpaired() {
        let command = argv(Tool::Hisat, 8, false, false);
        assert_eq!(
            command.display(),
            "/b/bt2 -p 8 --reorder -x /idx/hg38 -t -U /tmp/r/1_aaa -S /tmp/out.sam"
        );
    }

    #[test]
    fn test_bowtie_bare_path() {
        let command = argv(Tool::Bowtie, 4, false, false);
        assert_eq!(
            command.display(),
            "/b/bt2 -p 4 --reorder /idx/hg38 -t /tmp/r/1_aaa -S /tmp/out.sam"
        );
    }

    #[test]
    fn test_bwa_writes_alignments_to_stdout() {
        let command = argv(Tool::Bwa, 4, false, true);
        assert_eq!(
            command.display(),
            "/b/bt2 mem -t 4 --reorder /idx/hg38 /tmp/r/1_aaa /tmp/r/2_aaa"
        );
        assert_eq!(command.stdout, OutputSink::File(PathBuf::from("/tmp/out.sam")));
        assert_eq!(command.stderr, OutputSink::File(PathBuf::from("/out/run.err")));
    }

    #[test]
    fn test_discarded_alignment_goes_to_dev_null() {
        let args = Vec::new();
        let reads = reads(false);
        let command = AlignerCall {
            tool: Tool::Bowtie2,
            executable: Path::new("bt2"),
            index: Path::new("idx"),
            threads: 1,
            multiprocess: true,
            aligner_args: &args,
            reads: &reads,
        }
        .command(WorkerSinks::discard());
        assert_eq!(command.argv.last().map(String::as_str), Some("/dev/null"));
        assert_eq!(command.stdout, OutputSink::Discard);
    }

    #[test]
    fn test_output_layout() {
        let layout = OutputLayout::new(Path::new("/res"), Path::new("/scratch"), "pe", false, false);
        assert_eq!(layout.entry_dir("v1"), PathBuf::from("/res/pe/v1"));
        assert_eq!(layout.read_dir("v1"), PathBuf::from("/scratch/v1/pe"));
        assert_eq!(
            layout.sam_sink("v1", "v1_pe_0_0_4_1"),
            OutputSink::File(PathBuf::from("/scratch/v1/pe/v1_pe_0_0_4_1/out.sam"))
        );
        assert_eq!(
            layout.log_sink("v1", "v1_pe_0_0_4_1", "err"),
            OutputSink::File(PathBuf::from("/res/pe/v1/v1_pe_0_0_4_1.err"))
        );

        let in_output = OutputLayout::new(Path::new("/res"), Path::new("/scratch"), "pe", true, false);
        assert_eq!(
            in_output.sam_sink("v1", "r"),
            OutputSink::File(PathBuf::from("/res/pe/v1/v1/pe/r/out.sam"))
        );

        let discard = OutputLayout::new(Path::new("/res"), Path::new("/scratch"), "pe", true, true);
        assert_eq!(discard.sam_sink("v1", "r"), OutputSink::Discard);
    }
}
