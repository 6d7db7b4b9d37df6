//! CLI execution and command dispatch logic.
//!
//! This module keeps `main` minimal by providing a single entry point that
//! loads the model, runs one generation pass and persists the artefacts.

use anyhow::{Context, Result, bail};
use camino::Utf8Path;
use tracing::{debug, error, info};

use crate::cli::{self, Cli, Commands, GenerateArgs};
use crate::config::MAKEFILE_NAME;
use crate::make_gen;
use crate::model::{self, Project};
use crate::output;

/// Execute the parsed [`Cli`] commands.
///
/// # Errors
///
/// Returns an error if the model cannot be loaded, the generation pass hits
/// a fatal problem, or an artefact cannot be written.
pub fn run(cli: &Cli) -> Result<()> {
    let command = cli
        .command
        .clone()
        .unwrap_or_else(|| Commands::Generate(GenerateArgs::default()));
    match command {
        Commands::Generate(args) => generate(&args),
        Commands::Check { model } => {
            let project = load(&model)?;
            project
                .validate()
                .with_context(|| format!("validate model {model}"))?;
            info!(
                "Model {model} is valid: {} targets",
                project.targets.len()
            );
            Ok(())
        }
    }
}

fn load(path: &Utf8Path) -> Result<Project> {
    let project = model::from_path(path)?;
    debug!(
        targets = project.targets.len(),
        sources = project.sources.len(),
        "model loaded"
    );
    Ok(project)
}

/// Run one generation pass for the model named by `args` and write its
/// artefacts.
///
/// # Errors
///
/// Returns an error when loading, generating or writing fails. Problems the
/// pass reports without aborting are logged but do not fail the run.
fn generate(args: &GenerateArgs) -> Result<()> {
    let mut project = load(&args.model)?;
    project.options = cli::merge_options(&project.options, &args.options)
        .with_context(|| format!("merge generator options for {}", args.model))?;
    debug!(options = ?project.options, "options merged");
    let generated = make_gen::generate(&project, &project.options)
        .with_context(|| format!("generate Makefile for {}", args.model))?;
    if !generated.diagnostics.is_empty() {
        info!(
            count = generated.diagnostics.len(),
            "generation finished with reported problems"
        );
    }
    let dir = args
        .output_dir
        .as_deref()
        .unwrap_or(project.binary_dir.as_path());
    let report = output::write_artifacts(dir, &generated, &project.options);
    for err in &report.errors {
        error!(error = %err, "write failed");
    }
    if !report.is_success() {
        bail!(
            "{} of {} artefacts could not be written to {dir}",
            report.errors.len(),
            report.errors.len() + report.written.len()
        );
    }
    info!("Generated Makefile at {}", dir.join(MAKEFILE_NAME));
    Ok(())
}
