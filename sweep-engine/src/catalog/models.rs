// Catalog Models
// Typed configuration entries, aligner tools and scaling regimes

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Aligners the sweep knows how to build, index-check and invoke
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Tool {
    Bowtie,
    Bowtie2,
    Hisat,
    Bwa,
}

impl Tool {
    pub fn as_str(&self) -> &'static str {
        match self {
            Tool::Bowtie => "bowtie",
            Tool::Bowtie2 => "bowtie2",
            Tool::Hisat => "hisat",
            Tool::Bwa => "bwa",
        }
    }

    /// Name of the executable, which is also the build target
    pub fn executable(&self) -> &'static str {
        match self {
            Tool::Bowtie => "bowtie-align-s",
            Tool::Bowtie2 => "bowtie2-align-s",
            Tool::Hisat => "hisat-align-s",
            Tool::Bwa => "bwa",
        }
    }

    /// Upstream repository cloned when no override is configured
    pub fn default_repo_url(&self) -> String {
        format!("https://github.com/BenLangmead/{}.git", self.as_str())
    }

    /// File name suffixes that must exist next to the index basename
    pub fn index_suffixes(&self) -> Vec<String> {
        let stems: &[&str] = &[".1.", ".2.", ".3.", ".4.", ".rev.1.", ".rev.2."];
        match self {
            Tool::Bwa => [".amb", ".ann", ".pac", ".bwt", ".sa"]
                .iter()
                .map(|s| s.to_string())
                .collect(),
            Tool::Bowtie => stems.iter().map(|s| format!("{}ebwt", s)).collect(),
            Tool::Bowtie2 => stems.iter().map(|s| format!("{}bt2", s)).collect(),
            Tool::Hisat => stems
                .iter()
                .chain([".5.", ".6.", ".rev.5.", ".rev.6."].iter())
                .map(|s| format!("{}bt2", s))
                .collect(),
        }
    }
}

impl fmt::Display for Tool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Tool {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "bowtie" => Ok(Tool::Bowtie),
            "bowtie2" => Ok(Tool::Bowtie2),
            "hisat" => Ok(Tool::Hisat),
            "bwa" => Ok(Tool::Bwa),
            other => Err(format!("Unknown tool: \"{}\"", other)),
        }
    }
}

/// How one run spreads its threads over processes
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum ScalingRegime {
    /// One process, all threads
    #[serde(rename = "MT")]
    MultiThread,
    /// Single-threaded processes
    #[serde(rename = "MP")]
    MultiProcess,
    /// Fixed-width multi-threaded processes
    #[serde(rename = "MP+MT")]
    Hybrid,
}

impl ScalingRegime {
    pub fn from_threads_per_process(threads_per_process: u32) -> Self {
        match threads_per_process {
            0 => ScalingRegime::MultiThread,
            1 => ScalingRegime::MultiProcess,
            _ => ScalingRegime::Hybrid,
        }
    }

    pub fn is_multiprocess(&self) -> bool {
        !matches!(self, ScalingRegime::MultiThread)
    }
}

impl fmt::Display for ScalingRegime {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ScalingRegime::MultiThread => f.write_str("MT"),
            ScalingRegime::MultiProcess => f.write_str("MP"),
            ScalingRegime::Hybrid => f.write_str("MP+MT"),
        }
    }
}

/// Process and thread counts for one run attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct WorkerLayout {
    pub process_count: u32,
    pub threads_per_process: u32,
}

impl WorkerLayout {
    pub fn total_threads(&self) -> u32 {
        self.process_count * self.threads_per_process
    }
}

/// One row of the catalog
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConfigEntry {
    /// Short name; names the build and output directories
    pub name: String,
    pub tool: Tool,
    /// Branch, tag or 40-character commit to build
    pub branch: String,
    /// 0 runs a single multi-threaded process
    pub threads_per_process: u32,
    /// Extra make arguments (macros, variables)
    pub build_flags: String,
    /// Extra aligner arguments, whitespace separated
    pub aligner_args: String,
}

impl ConfigEntry {
    pub fn regime(&self) -> ScalingRegime {
        ScalingRegime::from_threads_per_process(self.threads_per_process)
    }

    /// Whether this entry reads the blocked-format inputs
    pub fn is_blocked(&self) -> bool {
        self.aligner_args.contains("block-bytes")
    }

    pub fn aligner_arg_list(&self) -> Vec<String> {
        self.aligner_args
            .split_whitespace()
            .map(str::to_string)
            .collect()
    }

    /// Worker layout at `thread_count`, or `None` when the count is not a
    /// multiple of the per-process quota and the pair must be skipped.
    pub fn layout(&self, thread_count: u32) -> Option<WorkerLayout> {
        match self.threads_per_process {
            0 => Some(WorkerLayout {
                process_count: 1,
                threads_per_process: thread_count,
            }),
            tpp if thread_count % tpp == 0 => Some(WorkerLayout {
                process_count: thread_count / tpp,
                threads_per_process: tpp,
            }),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(threads_per_process: u32, aligner_args: &str) -> ConfigEntry {
        ConfigEntry {
            name: "bt2".to_string(),
            tool: Tool::Bowtie2,
            branch: "master".to_string(),
            threads_per_process,
            build_flags: String::new(),
            aligner_args: aligner_args.to_string(),
        }
    }

    #[test]
    fn test_tool_round_trip() {
        for tool in [Tool::Bowtie, Tool::Bowtie2, Tool::Hisat, Tool::Bwa] {
            assert_eq!(tool.as_str().parse::<Tool>().unwrap(), tool);
        }
        assert!("star".parse::<Tool>().is_err());
    }

    #[test]
    fn test_index_suffixes() {
        assert_eq!(Tool::Bowtie.index_suffixes()[0], ".1.ebwt");
        assert_eq!(Tool::Bowtie2.index_suffixes().len(), 6);
        assert_eq!(Tool::Hisat.index_suffixes().len(), 10);
        assert!(Tool::Hisat
            .index_suffixes()
            .contains(&".rev.6.bt2".to_string()));
        assert_eq!(Tool::Bwa.index_suffixes().len(), 5);
    }

    #[test]
    fn test_layout_divisible_pairs() {
        for tpp in 1..=8u32 {
            for threads in 1..=64u32 {
                let e = entry(tpp, "");
                match e.layout(threads) {
                    Some(layout) => {
                        assert_eq!(threads % tpp, 0);
                        assert_eq!(layout.process_count, threads / tpp);
                        assert_eq!(layout.total_threads(), threads);
                    }
                    None => assert_ne!(threads % tpp, 0),
                }
            }
        }
    }

    #[test]
    fn test_layout_multithread() {
        let layout = entry(0, "").layout(12).unwrap();
        assert_eq!(layout.process_count, 1);
        assert_eq!(layout.threads_per_process, 12);
    }

    #[test]
    fn test_regime_and_blocked() {
        assert_eq!(entry(0, "").regime(), ScalingRegime::MultiThread);
        assert_eq!(entry(1, "").regime(), ScalingRegime::MultiProcess);
        assert_eq!(entry(4, "").regime(), ScalingRegime::Hybrid);
        assert!(entry(0, "--block-bytes 12288 --reads-per-block 70").is_blocked());
        assert!(!entry(0, "--reorder").is_blocked());
        assert_eq!(entry(0, "--reorder  -I 250").aligner_arg_list().len(), 3);
    }
}
