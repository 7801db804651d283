use crate::commands::args::SweepArgs;
use crate::output;

use clap::Args;
use color_eyre::Result;

use sweep_engine::{Catalog, SweepController};

/// Check the catalog, read inputs and index without building or running
#[derive(Args, Debug)]
pub struct ValidateArgs {
    #[command(flatten)]
    pub sweep: SweepArgs,
}

pub fn execute(args: ValidateArgs) -> Result<()> {
    let config = args.sweep.into_config()?;

    // Step 1: Options
    output::status("Validating", &format!("{}", config.catalog.display()));
    if let Err(e) = config.validate() {
        output::error(&e.to_string());
        std::process::exit(1);
    }
    output::check("Options valid");

    // Step 2: Catalog
    let catalog = match Catalog::from_file(&config.catalog) {
        Ok(catalog) => catalog,
        Err(e) => {
            output::error(&e.to_string());
            std::process::exit(1);
        }
    };
    let multiprocess = catalog.iter().filter(|e| e.regime().is_multiprocess()).count();
    output::check(&format!(
        "Catalog: {} configurations ({} multi-process)",
        catalog.len(),
        multiprocess
    ));

    for entry in catalog.iter() {
        let skipped: Vec<String> = config
            .thread_series
            .iter()
            .filter(|&&threads| entry.layout(threads).is_none())
            .map(u32::to_string)
            .collect();
        if !skipped.is_empty() {
            output::warning(&format!(
                "{} will be skipped at {} threads",
                entry.name,
                skipped.join(", ")
            ));
        }
    }

    // Step 3: Inputs and index
    let controller = SweepController::new(config, catalog);
    match controller.validate() {
        Ok(preflight) => {
            match preflight.available_reads {
                Some(available) => output::check(&format!(
                    "Reads: {} available, {} needed",
                    available, preflight.reads_needed
                )),
                None => output::check("Reads present (not counted)"),
            }
            output::check(&format!("{} index complete", preflight.tool));
        }
        Err(e) => {
            output::error(&e.to_string());
            std::process::exit(1);
        }
    }

    println!();
    output::success("Sweep is valid");

    Ok(())
}
