// Sweep Controller
// Drives the thread-count series across the catalog: resolves binaries,
// prepares read sets per regime, supervises each attempt and records outcomes

use crate::build::{BuildResolver, BuildTool, Git, Make, ResolvedArtifact, ResolverOptions, VersionControl};
use crate::catalog::{Catalog, ConfigEntry, Tool, WorkerLayout};
use crate::config::SweepConfig;
use crate::error::{SweepError, SweepResult};
use crate::index::verify_index;
use crate::partition::{self, Partitioner, ReadSet, LINES_PER_READ};
use crate::probe::{FsProbe, LocalFs};
use crate::supervisor::{OutputSink, RunStatus, Supervisor, Telemetry, TelemetrySinks};
use crate::sweep::command::{run_name, AlignerCall, OutputLayout, WorkerSinks, RECORDED_REPETITION};
use crate::sweep::events::{ProgressSender, SweepEvent};
use crate::sweep::report::{write_sentinel, AttemptRecord, SkippedPair, SweepReport, JOIN_SENTINEL};
use crate::sweep::state::{RegimeKey, SweepState};

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// What a successful preflight established
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Preflight {
    pub tool: Tool,
    /// Reads in the mate-1 input; `None` when counting is disabled
    pub available_reads: Option<u64>,
    pub reads_needed: u64,
}

/// One run attempt of one pair
struct Attempt<'a> {
    entry: &'a ConfigEntry,
    artifact: &'a ResolvedArtifact,
    workers: WorkerLayout,
    thread_count: u32,
    repetition: u32,
    repetitions: u32,
}

impl Attempt<'_> {
    fn is_recorded(&self) -> bool {
        self.repetition == RECORDED_REPETITION
    }

    /// Run name of worker 0, which also names the sentinels and telemetry
    fn lead_name(&self, pairing: &str) -> String {
        run_name(self.entry, pairing, 0, self.thread_count, self.repetition)
    }
}

/// Runs one sweep end to end
pub struct SweepController {
    config: SweepConfig,
    catalog: Catalog,
    probe: Arc<dyn FsProbe>,
    resolver: BuildResolver,
    telemetry: Telemetry,
    progress: Option<ProgressSender>,
}

impl SweepController {
    pub fn new(config: SweepConfig, catalog: Catalog) -> Self {
        let resolver = BuildResolver::new(resolver_options(&config), Box::new(Git), Box::new(Make));
        Self {
            config,
            catalog,
            probe: Arc::new(LocalFs),
            resolver,
            telemetry: Telemetry::disabled(),
            progress: None,
        }
    }

    /// Replace the version control and build tool collaborators
    pub fn with_toolchain(
        mut self,
        vcs: Box<dyn VersionControl>,
        builder: Box<dyn BuildTool>,
    ) -> Self {
        self.resolver = BuildResolver::new(resolver_options(&self.config), vcs, builder);
        self
    }

    pub fn with_probe(mut self, probe: Arc<dyn FsProbe>) -> Self {
        self.probe = probe;
        self
    }

    /// Samplers to run around each attempt; ignored when telemetry is off
    pub fn with_telemetry(mut self, telemetry: Telemetry) -> Self {
        self.telemetry = telemetry;
        self
    }

    pub fn with_progress(mut self, tx: ProgressSender) -> Self {
        self.progress = Some(tx);
        self
    }

    pub fn config(&self) -> &SweepConfig {
        &self.config
    }

    fn emit(&self, event: SweepEvent) {
        if let Some(tx) = &self.progress {
            let _ = tx.send(event);
        }
    }

    /// Configuration checks that must pass before anything is built
    pub fn preflight(&self) -> SweepResult<Preflight> {
        self.config.validate()?;
        let tool = self.catalog.tool()?;
        let reads = &self.config.reads;
        reads.verify(self.probe.as_ref())?;
        for entry in self.catalog.iter().filter(|e| e.is_blocked()) {
            if entry.threads_per_process > 0 {
                return Err(SweepError::BlockedMultiprocess(entry.threads_per_process));
            }
            reads.verify_blocked()?;
        }

        let reads_needed = self.config.reads_needed();
        if self.config.no_count {
            return Ok(Preflight {
                tool,
                available_reads: None,
                reads_needed,
            });
        }

        let lines = self.count_lines(&reads.m1)?;
        let available = lines / LINES_PER_READ;
        tracing::info!(reads = available, needed = reads_needed, "counted input reads");
        if reads_needed > available {
            return Err(SweepError::InsufficientReads {
                needed: reads_needed,
                available,
            });
        }

        if let Some(blocked) = &reads.m1_blocked {
            let blocked_lines = self.count_lines(blocked)?;
            if blocked_lines != lines {
                if self.config.strict_blocked_count {
                    return Err(SweepError::BlockedCountMismatch {
                        unblocked: lines,
                        blocked: blocked_lines,
                    });
                }
                tracing::debug!(
                    unblocked = lines,
                    blocked = blocked_lines,
                    "blocked and unblocked inputs differ in line count"
                );
            }
        }

        Ok(Preflight {
            tool,
            available_reads: Some(available),
            reads_needed,
        })
    }

    /// Preflight plus index verification; builds and runs nothing
    pub fn validate(&self) -> SweepResult<Preflight> {
        let preflight = self.preflight()?;
        verify_index(self.probe.as_ref(), &self.config.index, preflight.tool)?;
        Ok(preflight)
    }

    fn count_lines(&self, path: &Path) -> SweepResult<u64> {
        self.probe
            .line_count(path)
            .map_err(|e| SweepError::io(path, e))
    }

    /// Run the whole sweep and return what happened.
    ///
    /// Read sets written by the sweep are purged on every exit path.
    pub async fn run(mut self) -> SweepResult<SweepReport> {
        let started = Instant::now();
        let preflight = self.preflight()?;
        let temp_dir = self.config.temp_dir.clone().ok_or_else(|| {
            SweepError::InvalidConfig("temporary directory must be set".to_string())
        })?;
        let dry_run = self.config.dry_run;
        let layout = OutputLayout::new(
            &self.config.output_dir,
            &temp_dir,
            self.config.pairing(),
            self.config.sam_output_dir,
            self.config.sam_dev_null,
        );

        tracing::info!(
            tool = %preflight.tool,
            entries = self.catalog.len(),
            series = ?self.config.thread_series,
            dry_run,
            "starting sweep"
        );
        self.emit(SweepEvent::SweepStarted {
            tool: preflight.tool,
            entries: self.catalog.len(),
            thread_series: self.config.thread_series.clone(),
            dry_run,
        });

        if !dry_run {
            self.prepare_directories(&layout)?;
        }

        let mut report = SweepReport::new(
            preflight.tool,
            layout.pairing(),
            self.config.thread_series.clone(),
            dry_run,
        );
        let artifacts = self.resolve_binaries().await?;
        report.builds = self.resolver.summary();
        self.emit(SweepEvent::BinariesResolved {
            summary: report.builds,
        });

        let telemetry = if self.config.telemetry {
            self.telemetry.clone()
        } else {
            Telemetry::disabled()
        };
        let supervisor = Supervisor::new(self.config.timeout()).with_telemetry(telemetry);

        let mut state = SweepState::new();
        let outcome = self
            .sweep(&layout, &artifacts, &supervisor, &mut state, &mut report)
            .await;
        state.purge();
        outcome?;

        let duration = started.elapsed();
        report.elapsed_secs = duration.as_secs_f64();
        if !dry_run {
            let path = report.write_json(layout.root())?;
            tracing::info!(path = %path.display(), "wrote sweep summary");
        }

        self.emit(SweepEvent::SweepCompleted {
            attempts: report.attempts.len(),
            failed: report.count(RunStatus::Fail),
            timed_out: report.count(RunStatus::TimeOut),
            duration,
        });
        Ok(report)
    }

    fn prepare_directories(&self, layout: &OutputLayout) -> SweepResult<()> {
        fs::create_dir_all(layout.root()).map_err(|e| SweepError::io(layout.root(), e))?;
        for entry in self.catalog.iter() {
            let dir = layout.read_dir(&entry.name);
            let removed = partition::purge_stale(&dir).map_err(|e| SweepError::io(&dir, e))?;
            if removed > 0 {
                tracing::info!(dir = %dir.display(), removed, "removed stale read slices");
            }
        }
        Ok(())
    }

    /// One artifact per catalog entry, in catalog order
    async fn resolve_binaries(&mut self) -> SweepResult<Vec<ResolvedArtifact>> {
        let mut artifacts = Vec::with_capacity(self.catalog.len());
        for entry in self.catalog.iter() {
            let artifact = if self.config.dry_run {
                self.resolver.resolve_dry(entry)
            } else {
                self.resolver.resolve(entry).await?
            };
            tracing::debug!(
                name = %artifact.name,
                executable = %artifact.executable.display(),
                "resolved"
            );
            self.emit(SweepEvent::BinaryResolved {
                name: artifact.name.clone(),
                action: artifact.action.clone(),
            });
            artifacts.push(artifact);
        }
        Ok(artifacts)
    }

    async fn sweep(
        &self,
        layout: &OutputLayout,
        artifacts: &[ResolvedArtifact],
        supervisor: &Supervisor,
        state: &mut SweepState,
        report: &mut SweepReport,
    ) -> SweepResult<()> {
        let partitioner = Partitioner::new(
            self.probe.clone(),
            self.config.reads.clone(),
            self.config.reads_per_thread,
        );

        for &thread_count in &self.config.thread_series {
            state.start_thread_count();
            for (entry, artifact) in self.catalog.iter().zip(artifacts) {
                let Some(workers) = entry.layout(thread_count) else {
                    tracing::info!(
                        name = %entry.name,
                        thread_count,
                        threads_per_process = entry.threads_per_process,
                        "skipping: thread count is not a multiple of threads per process"
                    );
                    report.skipped.push(SkippedPair {
                        name: entry.name.clone(),
                        thread_count,
                        threads_per_process: entry.threads_per_process,
                    });
                    self.emit(SweepEvent::pair_skipped(
                        &entry.name,
                        thread_count,
                        entry.threads_per_process,
                    ));
                    continue;
                };

                let mut repetitions = 1;
                if state.first_use_of(entry.tool) {
                    verify_index(self.probe.as_ref(), &self.config.index, entry.tool)?;
                    tracing::info!(tool = %entry.tool, index = %self.config.index.display(), "index verified");
                    self.emit(SweepEvent::IndexVerified { tool: entry.tool });
                    repetitions = 2;
                }

                let key = RegimeKey::of(entry);
                if state.needs_reads(key) {
                    state.purge();
                    let dir = layout.read_dir(&entry.name);
                    let read_sets = if self.config.dry_run {
                        partitioner.plan(thread_count, entry.threads_per_process, &dir, key.blocked)?
                    } else {
                        partitioner.prepare(thread_count, entry.threads_per_process, &dir, key.blocked)?
                    };
                    tracing::info!(
                        name = %entry.name,
                        thread_count,
                        regime = %entry.regime(),
                        blocked = key.blocked,
                        read_sets = read_sets.len(),
                        "prepared reads"
                    );
                    self.emit(SweepEvent::ReadsPrepared {
                        name: entry.name.clone(),
                        thread_count,
                        regime: entry.regime(),
                        blocked: key.blocked,
                        read_sets: read_sets.len(),
                    });
                    state.activate(key, read_sets, !self.config.dry_run);
                    repetitions = 2;
                }

                for repetition in (RECORDED_REPETITION..=repetitions).rev() {
                    let attempt = Attempt {
                        entry,
                        artifact,
                        workers,
                        thread_count,
                        repetition,
                        repetitions,
                    };
                    self.run_attempt(attempt, state.read_sets(), layout, supervisor, report)
                        .await?;
                }
            }
        }
        Ok(())
    }

    async fn run_attempt(
        &self,
        attempt: Attempt<'_>,
        read_sets: &[ReadSet],
        layout: &OutputLayout,
        supervisor: &Supervisor,
        report: &mut SweepReport,
    ) -> SweepResult<()> {
        let entry = attempt.entry;
        let pairing = layout.pairing();
        let recorded = attempt.is_recorded();
        let lead = attempt.lead_name(pairing);
        let entry_dir = layout.entry_dir(&entry.name);
        let args = entry.aligner_arg_list();
        let multiprocess = entry.regime().is_multiprocess();

        let mut sam_files = Vec::new();
        let mut commands = Vec::with_capacity(read_sets.len());
        for (worker, reads) in (0..attempt.workers.process_count).zip(read_sets) {
            let sinks = if recorded {
                let name = run_name(entry, pairing, worker, attempt.thread_count, attempt.repetition);
                WorkerSinks {
                    stdout: layout.log_sink(&entry.name, &name, "out"),
                    stderr: layout.log_sink(&entry.name, &name, "err"),
                    sam: layout.sam_sink(&entry.name, &name),
                }
            } else {
                WorkerSinks::discard()
            };
            if let OutputSink::File(path) = &sinks.sam {
                sam_files.push(path.clone());
            }
            let call = AlignerCall {
                tool: entry.tool,
                executable: &attempt.artifact.executable,
                index: &self.config.index,
                threads: attempt.workers.threads_per_process,
                multiprocess,
                aligner_args: &args,
                reads,
            };
            commands.push(call.command(sinks));
        }

        if self.config.dry_run {
            for command in &commands {
                tracing::info!(run_name = %lead, command = %command.display(), "dry run");
                self.emit(SweepEvent::CommandPlanned {
                    run_name: lead.clone(),
                    command: command.display(),
                });
            }
            return Ok(());
        }

        let telemetry_sinks = if recorded {
            fs::create_dir_all(&entry_dir).map_err(|e| SweepError::io(&entry_dir, e))?;
            for sam in &sam_files {
                if let Some(parent) = sam.parent() {
                    fs::create_dir_all(parent).map_err(|e| SweepError::io(parent, e))?;
                }
            }
            layout.telemetry_sinks(&entry.name, &lead)
        } else {
            TelemetrySinks::discard()
        };

        tracing::info!(
            run_name = %lead,
            processes = attempt.workers.process_count,
            threads_per_process = attempt.workers.threads_per_process,
            repetition = attempt.repetition,
            "starting attempt"
        );
        for command in &commands {
            tracing::debug!(command = %command.display(), "worker command");
        }
        self.emit(SweepEvent::attempt_started(
            &entry.name,
            &lead,
            attempt.thread_count,
            attempt.workers.process_count,
            !recorded,
        ));

        let result = supervisor.run(commands, &telemetry_sinks).await;
        let exit_codes = result.exit_codes();
        self.emit(SweepEvent::attempt_completed(
            &entry.name,
            &lead,
            result.status,
            !recorded,
            exit_codes.clone(),
            result.elapsed,
        ));
        if !recorded {
            tracing::info!(run_name = %lead, status = %result.status, "warm-up finished");
            return Ok(());
        }

        write_sentinel(&entry_dir, &lead, JOIN_SENTINEL)?;
        write_sentinel(&entry_dir, &lead, result.status.sentinel())?;
        tracing::info!(
            run_name = %lead,
            status = %result.status,
            elapsed_secs = result.elapsed.as_secs_f64(),
            "attempt finished"
        );

        if self.config.delete_sam {
            delete_outputs(&sam_files);
        }

        report.attempts.push(AttemptRecord {
            name: entry.name.clone(),
            run_name: lead.clone(),
            regime: entry.regime(),
            thread_count: attempt.thread_count,
            process_count: attempt.workers.process_count,
            threads_per_process: attempt.workers.threads_per_process,
            warmed_up: attempt.repetitions > RECORDED_REPETITION,
            status: result.status,
            exit_codes: exit_codes.clone(),
            elapsed_secs: result.elapsed.as_secs_f64(),
        });

        if result.status == RunStatus::Fail && self.config.stop_on_fail {
            return Err(SweepError::RunFailed {
                run_name: lead,
                exit_codes,
            });
        }
        Ok(())
    }
}

fn resolver_options(config: &SweepConfig) -> ResolverOptions {
    ResolverOptions {
        build_root: config.build_dir.join(config.pairing()),
        force: config.force_builds,
        pull: config.pull,
        extra_flags: config.extra_build_flags.clone(),
        repo_url: config.repo_url.clone(),
    }
}

fn delete_outputs(files: &[PathBuf]) {
    for path in files {
        match fs::remove_file(path) {
            Ok(()) => tracing::debug!(path = %path.display(), "deleted alignment output"),
            Err(e) if e.kind() == io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!(path = %path.display(), error = %e, "failed to delete alignment output"),
        }
    }
}
