// Build Artifact Resolver
// Produces an executable per catalog entry, reusing the previous entry's
// working copy whenever the build requirements allow it

use crate::build::toolchain::{BuildTool, ToolStatus, VersionControl};
use crate::catalog::{ConfigEntry, Tool};
use crate::error::{SweepError, SweepResult};

use serde::Serialize;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// What the resolver does to make an entry's executable available
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum BuildAction {
    /// Trust the existing working copy and executable as they are
    Reuse,
    /// Fetch upstream changes into the existing working copy and rebuild
    Pull,
    /// Symlink to the previous entry's artifact; nothing is compiled
    Link { target: PathBuf },
    /// Copy the previous entry's working copy, then rebuild with new flags
    Copy { from: PathBuf },
    /// Clone fresh from the repository, then build
    Fetch,
}

/// A ready-to-invoke executable for one catalog entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedArtifact {
    pub name: String,
    pub dir: PathBuf,
    pub executable: PathBuf,
    pub action: BuildAction,
}

/// Counts of what the resolver did
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct ResolveSummary {
    pub built: usize,
    pub pulled: usize,
    pub copied: usize,
    pub linked: usize,
    pub reused: usize,
}

/// Options controlling reuse and rebuilding
#[derive(Debug, Clone, Default)]
pub struct ResolverOptions {
    /// Directory holding one artifact directory per entry name
    pub build_root: PathBuf,
    /// Delete existing artifacts and rebuild them
    pub force: bool,
    /// Pull and rebuild existing artifacts instead of trusting them
    pub pull: bool,
    /// Appended to every entry's build flags
    pub extra_flags: Option<String>,
    /// Repository to clone instead of the tool's default
    pub repo_url: Option<String>,
}

#[derive(Debug, Clone)]
struct PreviousArtifact {
    name: String,
    tool: Tool,
    branch: String,
    flags: String,
    dir: PathBuf,
}

/// Resolves catalog entries in order, remembering only the previous one
pub struct BuildResolver {
    options: ResolverOptions,
    vcs: Box<dyn VersionControl>,
    builder: Box<dyn BuildTool>,
    previous: Option<PreviousArtifact>,
    summary: ResolveSummary,
}

impl BuildResolver {
    pub fn new(
        options: ResolverOptions,
        vcs: Box<dyn VersionControl>,
        builder: Box<dyn BuildTool>,
    ) -> Self {
        Self {
            options,
            vcs,
            builder,
            previous: None,
            summary: ResolveSummary::default(),
        }
    }

    pub fn summary(&self) -> ResolveSummary {
        self.summary
    }

    /// Artifact directory for an entry
    pub fn artifact_dir(&self, entry: &ConfigEntry) -> PathBuf {
        self.options.build_root.join(&entry.name)
    }

    /// Build flags after the global suffix is applied
    pub fn effective_flags(&self, entry: &ConfigEntry) -> String {
        match self.options.extra_flags.as_deref().map(str::trim) {
            Some(extra) if !extra.is_empty() => {
                format!("{} {}", entry.build_flags, extra).trim().to_string()
            }
            _ => entry.build_flags.clone(),
        }
    }

    /// Decide how `entry` will be resolved, without touching the filesystem
    pub fn plan(&self, entry: &ConfigEntry) -> BuildAction {
        let dir = self.artifact_dir(entry);
        let exists = dir.symlink_metadata().is_ok();

        if exists && !self.options.force {
            return if self.options.pull {
                BuildAction::Pull
            } else {
                BuildAction::Reuse
            };
        }

        let flags = self.effective_flags(entry);
        match &self.previous {
            Some(prev) if prev.tool == entry.tool && prev.branch == entry.branch => {
                if prev.flags == flags {
                    BuildAction::Link {
                        target: PathBuf::from(&prev.name),
                    }
                } else {
                    BuildAction::Copy {
                        from: prev.dir.clone(),
                    }
                }
            }
            _ => BuildAction::Fetch,
        }
    }

    /// Carry out the plan for `entry` and remember it as the previous entry
    pub async fn resolve(&mut self, entry: &ConfigEntry) -> SweepResult<ResolvedArtifact> {
        let action = self.plan(entry);
        let dir = self.artifact_dir(entry);
        let flags = self.effective_flags(entry);
        let target = entry.tool.executable();

        if self.options.force && dir.symlink_metadata().is_ok() {
            tracing::info!(dir = %dir.display(), "removing existing artifact because of --force");
            remove_artifact(&dir).map_err(|e| SweepError::io(&dir, e))?;
        }

        match &action {
            BuildAction::Reuse => {
                tracing::debug!(name = %entry.name, "reusing existing artifact");
                self.summary.reused += 1;
            }
            BuildAction::Pull => {
                tracing::info!(name = %entry.name, "pulling");
                let status = self
                    .vcs
                    .pull(&dir)
                    .await
                    .map_err(|e| SweepError::io(&dir, e))?;
                check(entry, status)?;
                self.build(entry, &dir, &flags, target).await?;
                self.summary.pulled += 1;
            }
            BuildAction::Link { target: link } => {
                tracing::info!(name = %entry.name, target = %link.display(), "linking");
                ensure_parent(&dir)?;
                symlink_dir(link, &dir).map_err(|e| SweepError::io(&dir, e))?;
                self.summary.linked += 1;
            }
            BuildAction::Copy { from } => {
                tracing::info!(name = %entry.name, from = %from.display(), "copying");
                ensure_parent(&dir)?;
                copy_dir_all(from, &dir).map_err(|e| SweepError::io(&dir, e))?;
                let stale = dir.join(target);
                match fs::remove_file(&stale) {
                    Ok(()) => {}
                    Err(e) if e.kind() == io::ErrorKind::NotFound => {}
                    Err(e) => return Err(SweepError::io(stale, e)),
                }
                self.build(entry, &dir, &flags, target).await?;
                self.summary.copied += 1;
            }
            BuildAction::Fetch => {
                tracing::info!(name = %entry.name, branch = %entry.branch, "building");
                ensure_parent(&dir)?;
                let url = self
                    .options
                    .repo_url
                    .clone()
                    .unwrap_or_else(|| entry.tool.default_repo_url());
                let status = self
                    .vcs
                    .clone_at(&url, &entry.branch, &dir)
                    .await
                    .map_err(|e| SweepError::io(&dir, e))?;
                check(entry, status)?;
                self.build(entry, &dir, &flags, target).await?;
                self.summary.built += 1;
            }
        }

        self.remember(entry, flags, &dir);
        Ok(ResolvedArtifact {
            name: entry.name.clone(),
            executable: dir.join(target),
            dir,
            action,
        })
    }

    /// Plan `entry` and remember it as the previous entry without acting on
    /// the plan, so a dry run reports the same lineage a real run would
    pub fn resolve_dry(&mut self, entry: &ConfigEntry) -> ResolvedArtifact {
        let action = self.plan(entry);
        let dir = self.artifact_dir(entry);
        self.remember(entry, self.effective_flags(entry), &dir);
        ResolvedArtifact {
            name: entry.name.clone(),
            executable: dir.join(entry.tool.executable()),
            dir,
            action,
        }
    }

    fn remember(&mut self, entry: &ConfigEntry, flags: String, dir: &Path) {
        self.previous = Some(PreviousArtifact {
            name: entry.name.clone(),
            tool: entry.tool,
            branch: entry.branch.clone(),
            flags,
            dir: dir.to_path_buf(),
        });
    }

    async fn build(
        &self,
        entry: &ConfigEntry,
        dir: &Path,
        flags: &str,
        target: &str,
    ) -> SweepResult<()> {
        let status = self
            .builder
            .build(dir, flags, target)
            .await
            .map_err(|e| SweepError::io(dir, e))?;
        check(entry, status)
    }
}

fn check(entry: &ConfigEntry, status: ToolStatus) -> SweepResult<()> {
    if status.success() {
        Ok(())
    } else {
        Err(SweepError::BuildFailed {
            tool: entry.tool.to_string(),
            name: entry.name.clone(),
            command: status.command,
            code: status.code,
        })
    }
}

fn ensure_parent(dir: &Path) -> SweepResult<()> {
    if let Some(parent) = dir.parent() {
        fs::create_dir_all(parent).map_err(|e| SweepError::io(parent, e))?;
    }
    Ok(())
}

fn remove_artifact(dir: &Path) -> io::Result<()> {
    if dir.symlink_metadata()?.file_type().is_symlink() {
        fs::remove_file(dir)
    } else {
        fs::remove_dir_all(dir)
    }
}

#[cfg(unix)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(target, link)
}

#[cfg(windows)]
fn symlink_dir(target: &Path, link: &Path) -> io::Result<()> {
    std::os::windows::fs::symlink_dir(target, link)
}

/// Recursively copy a working copy; links inside it are recreated, not followed
fn copy_dir_all(from: &Path, to: &Path) -> io::Result<()> {
    fs::create_dir_all(to)?;
    for entry in fs::read_dir(from)? {
        let entry = entry?;
        let file_type = entry.file_type()?;
        let dest = to.join(entry.file_name());
        if file_type.is_symlink() {
            copy_link(&entry.path(), &dest)?;
        } else if file_type.is_dir() {
            copy_dir_all(&entry.path(), &dest)?;
        } else {
            fs::copy(entry.path(), &dest)?;
        }
    }
    Ok(())
}

#[cfg(unix)]
fn copy_link(link: &Path, dest: &Path) -> io::Result<()> {
    std::os::unix::fs::symlink(fs::read_link(link)?, dest)
}

#[cfg(windows)]
fn copy_link(link: &Path, dest: &Path) -> io::Result<()> {
    let target = fs::read_link(link)?;
    if link.is_dir() {
        symlink_dir(&target, dest)
    } else {
        std::os::windows::fs::symlink_file(&target, dest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::{Arc, Mutex};

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Call {
        Clone { url: String, reference: String },
        Pull(PathBuf),
        Build { dir: PathBuf, flags: String, stale_exe: bool },
    }

    #[derive(Clone, Default)]
    struct Recorder {
        calls: Arc<Mutex<Vec<Call>>>,
        fail_build: bool,
    }

    impl Recorder {
        fn calls(&self) -> Vec<Call> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait::async_trait]
    impl VersionControl for Recorder {
        async fn clone_at(&self, url: &str, reference: &str, dest: &Path) -> io::Result<ToolStatus> {
            fs::create_dir_all(dest)?;
            fs::write(dest.join("Makefile"), "all:\n")?;
            self.calls.lock().unwrap().push(Call::Clone {
                url: url.to_string(),
                reference: reference.to_string(),
            });
            Ok(ToolStatus {
                command: "clone".to_string(),
                code: 0,
            })
        }

        async fn pull(&self, dir: &Path) -> io::Result<ToolStatus> {
            self.calls.lock().unwrap().push(Call::Pull(dir.to_path_buf()));
            Ok(ToolStatus {
                command: "pull".to_string(),
                code: 0,
            })
        }
    }

    #[async_trait::async_trait]
    impl BuildTool for Recorder {
        async fn build(&self, dir: &Path, flags: &str, target: &str) -> io::Result<ToolStatus> {
            let stale_exe = dir.join(target).exists();
            self.calls.lock().unwrap().push(Call::Build {
                dir: dir.to_path_buf(),
                flags: flags.to_string(),
                stale_exe,
            });
            if self.fail_build {
                return Ok(ToolStatus {
                    command: format!("make {}", target),
                    code: 2,
                });
            }
            fs::write(dir.join(target), flags)?;
            Ok(ToolStatus {
                command: format!("make {}", target),
                code: 0,
            })
        }
    }

    fn entry(name: &str, branch: &str, flags: &str) -> ConfigEntry {
        ConfigEntry {
            name: name.to_string(),
            tool: Tool::Bowtie2,
            branch: branch.to_string(),
            threads_per_process: 0,
            build_flags: flags.to_string(),
            aligner_args: String::new(),
        }
    }

    fn resolver(root: &Path, recorder: &Recorder, options: ResolverOptions) -> BuildResolver {
        BuildResolver::new(
            ResolverOptions {
                build_root: root.to_path_buf(),
                ..options
            },
            Box::new(recorder.clone()),
            Box::new(recorder.clone()),
        )
    }

    #[tokio::test]
    async fn test_lineage_link_then_copy() {
        let temp = tempfile::tempdir().unwrap();
        let root = temp.path().join("unp");
        let recorder = Recorder::default();
        let mut r = resolver(&root, &recorder, ResolverOptions::default());

        let a = r.resolve(&entry("a", "master", "F1=1")).await.unwrap();
        let b = r.resolve(&entry("b", "master", "F1=1")).await.unwrap();
        let c = r.resolve(&entry("c", "master", "F2=1")).await.unwrap();

        assert_eq!(a.action, BuildAction::Fetch);
        assert_eq!(
            b.action,
            BuildAction::Link {
                target: PathBuf::from("a")
            }
        );
        assert_eq!(
            c.action,
            BuildAction::Copy {
                from: root.join("b")
            }
        );

        assert!(root.join("b").symlink_metadata().unwrap().file_type().is_symlink());
        assert!(b.executable.exists());
        assert_eq!(fs::read_to_string(&c.executable).unwrap(), "F2=1");

        let calls = recorder.calls();
        assert_eq!(calls.len(), 3);
        assert!(matches!(&calls[0], Call::Clone { reference, .. } if reference == "master"));
        assert_eq!(
            calls[2],
            Call::Build {
                dir: root.join("c"),
                flags: "F2=1".to_string(),
                stale_exe: false,
            }
        );

        let summary = r.summary();
        assert_eq!((summary.built, summary.linked, summary.copied), (1, 1, 1));
    }

    #[tokio::test]
    async fn test_different_branch_fetches() {
        let temp = tempfile::tempdir().unwrap();
        let recorder = Recorder::default();
        let mut r = resolver(temp.path(), &recorder, ResolverOptions::default());

        r.resolve(&entry("a", "master", "")).await.unwrap();
        let b = r.resolve(&entry("b", "v2.4.1", "")).await.unwrap();

        assert_eq!(b.action, BuildAction::Fetch);
        assert_eq!(r.summary().built, 2);
    }

    #[tokio::test]
    async fn test_existing_artifact_trusted_without_pull() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("a")).unwrap();
        let recorder = Recorder::default();
        let mut r = resolver(temp.path(), &recorder, ResolverOptions::default());

        let a = r.resolve(&entry("a", "master", "")).await.unwrap();
        assert_eq!(a.action, BuildAction::Reuse);
        assert!(recorder.calls().is_empty());
        assert_eq!(a.executable, temp.path().join("a").join("bowtie2-align-s"));
    }

    #[tokio::test]
    async fn test_existing_artifact_pulled() {
        let temp = tempfile::tempdir().unwrap();
        fs::create_dir_all(temp.path().join("a")).unwrap();
        let recorder = Recorder::default();
        let options = ResolverOptions {
            pull: true,
            ..Default::default()
        };
        let mut r = resolver(temp.path(), &recorder, options);

        let a = r.resolve(&entry("a", "master", "")).await.unwrap();
        assert_eq!(a.action, BuildAction::Pull);
        let calls = recorder.calls();
        assert_eq!(calls[0], Call::Pull(temp.path().join("a")));
        assert!(matches!(calls[1], Call::Build { .. }));
    }

    #[tokio::test]
    async fn test_force_rebuilds() {
        let temp = tempfile::tempdir().unwrap();
        let old = temp.path().join("a");
        fs::create_dir_all(&old).unwrap();
        fs::write(old.join("leftover"), "x").unwrap();
        let recorder = Recorder::default();
        let options = ResolverOptions {
            force: true,
            pull: true,
            ..Default::default()
        };
        let mut r = resolver(temp.path(), &recorder, options);

        let a = r.resolve(&entry("a", "master", "")).await.unwrap();
        assert_eq!(a.action, BuildAction::Fetch);
        assert!(!old.join("leftover").exists());
        assert!(a.executable.exists());
    }

    #[tokio::test]
    async fn test_copy_removes_stale_binary() {
        let temp = tempfile::tempdir().unwrap();
        let recorder = Recorder::default();
        let mut r = resolver(temp.path(), &recorder, ResolverOptions::default());

        r.resolve(&entry("a", "master", "X=1")).await.unwrap();
        r.resolve(&entry("b", "master", "X=2")).await.unwrap();

        let calls = recorder.calls();
        assert!(matches!(calls.last(), Some(Call::Build { stale_exe: false, .. })));
        assert!(temp.path().join("b").join("Makefile").exists());
    }

    #[cfg(unix)]
    #[test]
    fn test_copy_keeps_links_as_links() {
        let temp = tempfile::tempdir().unwrap();
        let src = temp.path().join("src");
        fs::create_dir_all(src.join("sub")).unwrap();
        fs::write(src.join("sub").join("Makefile"), "all:").unwrap();
        std::os::unix::fs::symlink("missing", src.join("dangling")).unwrap();
        std::os::unix::fs::symlink(".", src.join("sub").join("loop")).unwrap();

        let dest = temp.path().join("dest");
        copy_dir_all(&src, &dest).unwrap();

        assert_eq!(fs::read_to_string(dest.join("sub").join("Makefile")).unwrap(), "all:");
        assert_eq!(fs::read_link(dest.join("dangling")).unwrap(), PathBuf::from("missing"));
        let looped = dest.join("sub").join("loop");
        assert!(looped.symlink_metadata().unwrap().file_type().is_symlink());
        assert_eq!(fs::read_link(looped).unwrap(), PathBuf::from("."));
    }

    #[tokio::test]
    async fn test_extra_flags_and_repo_override() {
        let temp = tempfile::tempdir().unwrap();
        let recorder = Recorder::default();
        let options = ResolverOptions {
            extra_flags: Some("WITH_TBB=1".to_string()),
            repo_url: Some("file:///srv/bowtie2.git".to_string()),
            ..Default::default()
        };
        let mut r = resolver(temp.path(), &recorder, options);

        r.resolve(&entry("a", "master", "X=1")).await.unwrap();
        let calls = recorder.calls();
        assert!(matches!(&calls[0], Call::Clone { url, .. } if url == "file:///srv/bowtie2.git"));
        assert!(matches!(&calls[1], Call::Build { flags, .. } if flags == "X=1 WITH_TBB=1"));
    }

    #[test]
    fn test_resolve_dry_reports_lineage() {
        let temp = tempfile::tempdir().unwrap();
        let recorder = Recorder::default();
        let mut r = resolver(temp.path(), &recorder, ResolverOptions::default());

        let a = r.resolve_dry(&entry("a", "master", "X=1"));
        let b = r.resolve_dry(&entry("b", "master", "X=1"));
        let c = r.resolve_dry(&entry("c", "master", "X=2"));

        assert_eq!(a.action, BuildAction::Fetch);
        assert!(matches!(b.action, BuildAction::Link { .. }));
        assert!(matches!(c.action, BuildAction::Copy { .. }));
        assert!(recorder.calls().is_empty());
        assert!(fs::read_dir(temp.path()).unwrap().next().is_none());
    }

    #[tokio::test]
    async fn test_build_failure_is_fatal() {
        let temp = tempfile::tempdir().unwrap();
        let recorder = Recorder {
            fail_build: true,
            ..Default::default()
        };
        let mut r = resolver(temp.path(), &recorder, ResolverOptions::default());

        let err = r.resolve(&entry("a", "master", "")).await.unwrap_err();
        match err {
            SweepError::BuildFailed { name, code, .. } => {
                assert_eq!(name, "a");
                assert_eq!(code, 2);
            }
            other => panic!("unexpected error: {other}"),
        }
    }
}
