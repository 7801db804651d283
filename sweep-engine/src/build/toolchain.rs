// Toolchain Collaborators
// Version control and build tool invocations used by the resolver

use std::io;
use std::path::Path;
use std::process::{ExitStatus, Stdio};
use tokio::process::Command;

/// Outcome of an external toolchain command
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolStatus {
    /// Rendered command line, for error messages
    pub command: String,
    /// Exit code; -1 when the process was killed by a signal
    pub code: i32,
}

impl ToolStatus {
    pub fn success(&self) -> bool {
        self.code == 0
    }
}

/// Fetches and updates working copies
#[async_trait::async_trait]
pub trait VersionControl: Send + Sync {
    /// Create a working copy of `url` at `dest`, checked out at `reference`
    async fn clone_at(&self, url: &str, reference: &str, dest: &Path) -> io::Result<ToolStatus>;

    /// Bring an existing working copy up to date with its upstream
    async fn pull(&self, dir: &Path) -> io::Result<ToolStatus>;
}

/// Compiles a target inside a working copy
#[async_trait::async_trait]
pub trait BuildTool: Send + Sync {
    async fn build(&self, dir: &Path, flags: &str, target: &str) -> io::Result<ToolStatus>;
}

/// A 40-character alphanumeric reference is a commit, anything else a branch or tag
pub fn is_commit_hash(reference: &str) -> bool {
    reference.len() == 40 && reference.chars().all(|c| c.is_ascii_alphanumeric())
}

fn exit_code(status: ExitStatus) -> i32 {
    status.code().unwrap_or(-1)
}

async fn run_inherited(program: &str, args: &[&str], rendered: String) -> io::Result<ToolStatus> {
    tracing::info!(command = %rendered, "running");
    let status = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .status()
        .await?;
    Ok(ToolStatus {
        command: rendered,
        code: exit_code(status),
    })
}

/// `git` on the PATH
#[derive(Debug, Clone, Default)]
pub struct Git;

#[async_trait::async_trait]
impl VersionControl for Git {
    async fn clone_at(&self, url: &str, reference: &str, dest: &Path) -> io::Result<ToolStatus> {
        let dest_str = dest.to_string_lossy();
        if !is_commit_hash(reference) {
            let rendered = format!("git clone {} -b {} -- {}", url, reference, dest_str);
            return run_inherited("git", &["clone", url, "-b", reference, "--", &dest_str], rendered)
                .await;
        }

        let rendered = format!("git clone {} -- {}", url, dest_str);
        let cloned = run_inherited("git", &["clone", url, "--", &dest_str], rendered).await?;
        if !cloned.success() {
            return Ok(cloned);
        }
        let rendered = format!("git -C {} reset --hard {}", dest_str, reference);
        run_inherited("git", &["-C", &dest_str, "reset", "--hard", reference], rendered).await
    }

    async fn pull(&self, dir: &Path) -> io::Result<ToolStatus> {
        let dir_str = dir.to_string_lossy();
        let rendered = format!("git -C {} pull", dir_str);
        run_inherited("git", &["-C", &dir_str, "pull"], rendered).await
    }
}

/// `make -e`, with the flags word-split by the shell so quoted macro values
/// survive
#[derive(Debug, Clone, Default)]
pub struct Make;

#[async_trait::async_trait]
impl BuildTool for Make {
    async fn build(&self, dir: &Path, flags: &str, target: &str) -> io::Result<ToolStatus> {
        let dir_str = dir.to_string_lossy();
        let script = format!("make -e -C \"$1\" {} \"$2\"", flags);
        let rendered = format!("make -e -C {} {} {}", dir_str, flags, target);
        run_inherited("sh", &["-c", &script, "sh", &dir_str, target], rendered).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    #[test]
    fn test_is_commit_hash() {
        assert!(is_commit_hash("0123456789abcdef0123456789abcdef01234567"));
        assert!(!is_commit_hash("master"));
        assert!(!is_commit_hash("v2.3.4.3"));
        assert!(!is_commit_hash("0123456789abcdef0123456789abcdef0123456-"));
        assert!(!is_commit_hash("0123456789abcdef0123456789abcdef012345678"));
    }

    #[tokio::test]
    async fn test_make_passes_flags_and_target() {
        if which::which("make").is_err() {
            return;
        }
        let temp = tempfile::tempdir().unwrap();
        fs::write(
            temp.path().join("Makefile"),
            "demo:\n\techo \"$(EXTRA)\" > built.txt\n",
        )
        .unwrap();

        let status = Make
            .build(temp.path(), "EXTRA=\"-DONE -DTWO\"", "demo")
            .await
            .unwrap();

        assert!(status.success(), "{}", status.command);
        let built = fs::read_to_string(temp.path().join("built.txt")).unwrap();
        assert_eq!(built.trim(), "-DONE -DTWO");
    }

    #[tokio::test]
    async fn test_make_failure_code() {
        if which::which("make").is_err() {
            return;
        }
        let temp = tempfile::tempdir().unwrap();
        fs::write(temp.path().join("Makefile"), "demo:\n\texit 3\n").unwrap();

        let status = Make.build(temp.path(), "", "demo").await.unwrap();
        assert!(!status.success());
        assert!(status.command.contains("demo"));
    }
}
