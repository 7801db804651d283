// Sweep State
// What the controller remembers between successive pairs

use crate::catalog::{ConfigEntry, Tool};
use crate::partition::{self, ReadSet};

use std::collections::HashSet;

/// Inputs that determine whether existing read sets can be reused
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RegimeKey {
    pub threads_per_process: u32,
    pub blocked: bool,
}

impl RegimeKey {
    pub fn of(entry: &ConfigEntry) -> Self {
        Self {
            threads_per_process: entry.threads_per_process,
            blocked: entry.is_blocked(),
        }
    }
}

/// Mutable state threaded through the sweep loop
#[derive(Debug, Default)]
pub struct SweepState {
    verified_tools: HashSet<Tool>,
    regime: Option<RegimeKey>,
    active_read_sets: Vec<ReadSet>,
    /// False in a dry run, where read sets are only planned
    owns_read_sets: bool,
}

impl SweepState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `tool` as verified; true the first time it is seen
    pub fn first_use_of(&mut self, tool: Tool) -> bool {
        self.verified_tools.insert(tool)
    }

    pub fn is_verified(&self, tool: Tool) -> bool {
        self.verified_tools.contains(&tool)
    }

    /// Forget the active regime; read sets are sized by the thread count, so
    /// every thread count starts fresh
    pub fn start_thread_count(&mut self) {
        self.regime = None;
    }

    pub fn needs_reads(&self, key: RegimeKey) -> bool {
        self.regime != Some(key)
    }

    pub fn read_sets(&self) -> &[ReadSet] {
        &self.active_read_sets
    }

    /// Replace the active read sets after the previous ones were purged
    pub fn activate(&mut self, key: RegimeKey, read_sets: Vec<ReadSet>, owned: bool) {
        self.regime = Some(key);
        self.active_read_sets = read_sets;
        self.owns_read_sets = owned;
    }

    /// Delete the active read sets from disk, if any were written. Best effort.
    pub fn purge(&mut self) -> usize {
        let read_sets = std::mem::take(&mut self.active_read_sets);
        self.regime = None;
        if !std::mem::take(&mut self.owns_read_sets) {
            return 0;
        }
        let removed = partition::purge(&read_sets);
        if removed > 0 {
            tracing::debug!(removed, "purged read files");
        }
        removed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn entry(threads_per_process: u32, aligner_args: &str) -> ConfigEntry {
        ConfigEntry {
            name: "v1".to_string(),
            tool: Tool::Bowtie2,
            branch: "master".to_string(),
            threads_per_process,
            build_flags: String::new(),
            aligner_args: aligner_args.to_string(),
        }
    }

    #[test]
    fn test_first_use_of_tool() {
        let mut state = SweepState::new();
        assert!(state.first_use_of(Tool::Bowtie2));
        assert!(!state.first_use_of(Tool::Bowtie2));
        assert!(state.is_verified(Tool::Bowtie2));
        assert!(!state.is_verified(Tool::Bwa));
    }

    #[test]
    fn test_regime_changes() {
        let mut state = SweepState::new();
        let mt = RegimeKey::of(&entry(0, ""));
        let blocked = RegimeKey::of(&entry(0, "--block-bytes 1024"));
        assert!(blocked.blocked);

        assert!(state.needs_reads(mt));
        state.activate(mt, Vec::new(), false);
        assert!(!state.needs_reads(mt));
        assert!(state.needs_reads(blocked));

        state.start_thread_count();
        assert!(state.needs_reads(mt));
    }

    #[test]
    fn test_purge_only_owned_read_sets() {
        let temp = tempfile::tempdir().unwrap();
        let mate1 = temp.path().join("1.fq");
        fs::write(&mate1, "@r\nA\n+\nI\n").unwrap();
        let sets = vec![ReadSet {
            mate1: mate1.clone(),
            mate2: None,
        }];
        let key = RegimeKey::of(&entry(0, ""));

        let mut state = SweepState::new();
        state.activate(key, sets.clone(), false);
        assert_eq!(state.purge(), 0);
        assert!(mate1.exists());

        state.activate(key, sets, true);
        assert_eq!(state.purge(), 1);
        assert!(!mate1.exists());
        assert!(state.read_sets().is_empty());
        assert!(state.needs_reads(key));
        assert_eq!(state.purge(), 0);
    }
}
