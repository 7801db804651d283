// Index Verification
// Checks that every file of a pre-built aligner index is present

use crate::catalog::Tool;
use crate::error::{SweepError, SweepResult};
use crate::probe::FsProbe;

use std::path::{Path, PathBuf};

/// Paths of the index files `tool` expects next to `basename`
pub fn index_files(basename: &Path, tool: Tool) -> Vec<PathBuf> {
    let base = basename.as_os_str().to_string_lossy();
    tool.index_suffixes()
        .into_iter()
        .map(|suffix| PathBuf::from(format!("{}{}", base, suffix)))
        .collect()
}

/// Fail unless every index file for `tool` exists
pub fn verify_index(probe: &dyn FsProbe, basename: &Path, tool: Tool) -> SweepResult<()> {
    let missing: Vec<String> = index_files(basename, tool)
        .into_iter()
        .filter(|path| {
            tracing::debug!(path = %path.display(), "checking index file");
            !probe.exists(path)
        })
        .map(|path| path.display().to_string())
        .collect();

    if missing.is_empty() {
        Ok(())
    } else {
        Err(SweepError::IndexIncomplete {
            tool: tool.to_string(),
            basename: basename.display().to_string(),
            missing,
        })
    }
}
