use crate::commands::args::SweepArgs;
use crate::output;

use clap::Args;
use color_eyre::Result;

use sweep_engine::supervisor::Telemetry;
use sweep_engine::{progress_channel, BuildAction, Catalog, RunStatus, SweepController, SweepEvent};

/// Build every configuration and run the thread-count series
#[derive(Args, Debug)]
pub struct RunArgs {
    #[command(flatten)]
    pub sweep: SweepArgs,
}

pub async fn execute(args: RunArgs) -> Result<()> {
    let mut config = args.sweep.into_config()?;
    config.validate()?;

    output::status("Reading", &format!("{}", config.catalog.display()));
    let catalog = Catalog::from_file(&config.catalog)?;

    if config.temp_dir.is_none() {
        let dir = if config.dry_run {
            std::env::temp_dir().join("thread-sweep")
        } else {
            tempfile::Builder::new()
                .prefix("thread-sweep-")
                .tempdir()?
                .keep()
        };
        output::info(&format!("Temporary files in {}", dir.display()));
        config.temp_dir = Some(dir);
    }

    let telemetry = if config.telemetry && !config.dry_run {
        Telemetry::detect().await
    } else {
        Telemetry::disabled()
    };
    if config.telemetry && !config.dry_run && !telemetry.is_enabled() {
        output::warning("Neither iostat nor top found; running without telemetry");
    }

    let summary_path = config
        .output_dir
        .join(config.pairing())
        .join(sweep_engine::sweep::SUMMARY_FILE);

    // Create progress channel and controller
    let (tx, mut rx) = progress_channel();
    let controller = SweepController::new(config, catalog)
        .with_telemetry(telemetry)
        .with_progress(tx);

    // Spawn the sweep in background
    let sweep_handle = tokio::spawn(controller.run());

    // Process events in the foreground
    while let Some(event) = rx.recv().await {
        match &event {
            SweepEvent::SweepStarted {
                tool,
                entries,
                thread_series,
                dry_run,
            } => {
                println!();
                output::header(&format!(
                    "Sweeping {} configurations of {} over {:?} threads",
                    entries, tool, thread_series
                ));
                if *dry_run {
                    output::info("Dry run: nothing is built, sliced or run");
                }
            }

            SweepEvent::BinaryResolved { name, action } => {
                let verb = match action {
                    BuildAction::Reuse => "Reusing",
                    BuildAction::Pull => "Pulled",
                    BuildAction::Link { .. } => "Linked",
                    BuildAction::Copy { .. } => "Rebuilt",
                    BuildAction::Fetch => "Built",
                };
                output::status(verb, name);
            }

            SweepEvent::BinariesResolved { summary } => {
                output::info(&format!(
                    "Binaries: {} built, {} pulled, {} copied, {} linked, {} reused",
                    summary.built, summary.pulled, summary.copied, summary.linked, summary.reused
                ));
            }

            SweepEvent::PairSkipped {
                name,
                thread_count,
                threads_per_process,
            } => {
                output::warning(&format!(
                    "{} skipped at {} threads: not a multiple of {} threads per process",
                    name, thread_count, threads_per_process
                ));
            }

            SweepEvent::IndexVerified { tool } => {
                output::check(&format!("{} index complete", tool));
            }

            SweepEvent::ReadsPrepared {
                name,
                thread_count,
                regime,
                blocked,
                read_sets,
            } => {
                let blocked = if *blocked { ", blocked" } else { "" };
                output::status(
                    "Slicing",
                    &format!(
                        "{} reads for {} at {} threads ({} read sets{})",
                        regime, name, thread_count, read_sets, blocked
                    ),
                );
            }

            SweepEvent::AttemptStarted {
                run_name,
                process_count,
                warmup,
                ..
            } => {
                let kind = if *warmup { "Warming" } else { "Running" };
                output::status(kind, &format!("{} ({} processes)", run_name, process_count));
            }

            SweepEvent::CommandPlanned { run_name, command } => {
                output::dim(&format!("  [{}] {}", run_name, command));
            }

            SweepEvent::AttemptCompleted {
                run_name,
                status,
                warmup,
                exit_codes,
                duration,
                ..
            } => {
                if *warmup {
                    continue;
                }
                let line = format!("  {} {} ({:.2}s)", run_name, status, duration.as_secs_f64());
                match status {
                    RunStatus::Succeed => output::dim_success(&line),
                    RunStatus::Fail => output::dim_failure(&format!("{} exit codes: {:?}", line, exit_codes)),
                    RunStatus::TimeOut => output::dim_failure(&line),
                }
            }

            SweepEvent::SweepCompleted {
                attempts,
                failed,
                timed_out,
                duration,
            } => {
                println!();
                if *failed == 0 && *timed_out == 0 {
                    output::success(&format!(
                        "{} runs succeeded in {:.2}s",
                        attempts,
                        duration.as_secs_f64()
                    ));
                } else {
                    output::failure(&format!(
                        "{} runs, {} failed, {} timed out ({:.2}s)",
                        attempts,
                        failed,
                        timed_out,
                        duration.as_secs_f64()
                    ));
                }
            }
        }
    }

    // Wait for the sweep to finish
    let report = sweep_handle.await??;
    if !report.dry_run {
        output::dim(&format!("Summary written to {}", summary_path.display()));
    }

    Ok(())
}
