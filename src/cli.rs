use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};
use landing_pipeline::config::{ENV_STORE_ROOT, Settings, TableParameters};
use landing_pipeline::orchestrator::{Collaborators, Invocation, Orchestrator};
use landing_pipeline::pipeline::{FunctionRegistry, NamingRule, OutputName, validate_parameters};
use landing_pipeline::store::LocalObjectStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;

#[derive(Parser)]
#[command(
    name = "landing-pipeline",
    about = "Transforms landing-zone files into the transient zone"
)]
pub struct Cli {
    /// Path to a JSON settings file
    #[arg(long, global = true)]
    pub settings: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Process one landing-zone file
    Process {
        /// Bucket holding the file
        #[arg(long)]
        bucket: String,

        /// Object key of the file, relative to the bucket
        #[arg(long)]
        file_path: String,

        /// Table folder relative to `landing-zone/` (e.g. `sales`)
        #[arg(long)]
        path_local: String,

        /// Logical table name recorded in tracking
        #[arg(long)]
        table_name: String,

        /// Parameter document id. Derived from the landing path when absent.
        #[arg(long)]
        config_id: Option<String>,

        /// Directory that holds one sub-directory per bucket
        #[arg(long, env = ENV_STORE_ROOT)]
        store_root: Option<PathBuf>,
    },
    /// Check a table parameter document and list every problem
    Validate {
        /// Path to the parameter JSON document
        params: PathBuf,
    },
    /// Show the output name a file would receive
    Name {
        /// Source file name
        file: String,

        /// Naming pattern (must match the whole base name)
        #[arg(long)]
        pattern: String,

        /// Output template, or `{match}` to keep the base name
        #[arg(long)]
        template: String,
    },
}

pub fn run_command(command: Commands, settings: Settings) -> Result<()> {
    match command {
        Commands::Process {
            bucket,
            file_path,
            path_local,
            table_name,
            config_id,
            store_root,
        } => {
            let invocation = Invocation {
                path_local,
                bucket,
                file_key: file_path,
                table_name,
                config_id,
            };
            handle_process(&invocation, store_root, settings)
        }
        Commands::Validate { params } => handle_validate(&params),
        Commands::Name {
            file,
            pattern,
            template,
        } => {
            handle_name(&file, &pattern, &template);
            Ok(())
        }
    }
}

fn handle_process(
    invocation: &Invocation,
    store_root: Option<PathBuf>,
    mut settings: Settings,
) -> Result<()> {
    if let Some(root) = store_root {
        settings.store_root = root;
    }
    let store = Arc::new(LocalObjectStore::new(&settings.store_root));
    let collaborators = Collaborators::for_store(store, &invocation.bucket, &settings);
    let orchestrator = Orchestrator::new(settings, collaborators);

    let outcome = orchestrator
        .run(invocation)
        .with_context(|| format!("Failed to process {}", invocation.source()))?;

    println!("State: {}", outcome.state);
    println!("Source moved to: {}", outcome.destination);
    match (&outcome.output, &outcome.quarantine) {
        (Some(output), _) => {
            println!("Output: {output} ({} rows, {} columns)", outcome.rows, outcome.columns);
        }
        (None, Some(reason)) => println!("Quarantined: {reason:?}"),
        (None, None) => {}
    }
    if let Some(report) = &outcome.report {
        println!("{}", report.summary());
    }
    Ok(())
}

fn handle_validate(path: &Path) -> Result<()> {
    let json = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let params = TableParameters::from_json(&json)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    let issues = validate_parameters(&params, &FunctionRegistry::builtin());
    if issues.is_empty() {
        println!("{}: OK", path.display());
        return Ok(());
    }
    for issue in &issues {
        println!("{issue}");
    }
    anyhow::bail!("{} problem(s) found in {}", issues.len(), path.display())
}

fn handle_name(file: &str, pattern: &str, template: &str) {
    match NamingRule::new(pattern, template).resolve(file) {
        OutputName::Valid(stem) => println!("{stem}"),
        OutputName::Invalid(sentinel) => println!("{sentinel} (file would be quarantined)"),
    }
}
