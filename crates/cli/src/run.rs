//! `docrecon`: load, reconcile, write.

use std::ffi::OsString;
use std::io::IsTerminal;

use clap::error::ErrorKind;
use clap::FromArgMatches;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

use docrecon_config::ProcessConfig;
use docrecon_engine::{ActionRegistry, WorkerPool};
use docrecon_io::{DocumentError, SourcePath};
use docrecon_recon::{Job, JobResult, ReconError};

use crate::args::{self, Cli};
use crate::exit_codes::{EXIT_INVALID_CONFIG, EXIT_PATH_NOT_FOUND, EXIT_RUNTIME, EXIT_USAGE, EXIT_WRITE};
use crate::CliError;

/// Install the stderr subscriber. `RUST_LOG` wins over `-v`.
pub fn init_logging(verbose: bool) {
    let default = if verbose { "docrecon=debug" } else { "docrecon=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    // A second init (tests) is not an error worth reporting.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_ansi(std::io::stderr().is_terminal())
        .try_init();
}

pub fn cmd_run(raw_args: Vec<OsString>) -> Result<(), CliError> {
    let probe = args::probe(&raw_args);
    init_logging(probe.verbose);

    // Without a configuration there are no dynamic arguments; let clap
    // report the missing --config (or print help).
    let Some(config_path) = probe.config else {
        return parse_fixed(&raw_args);
    };

    let config = ProcessConfig::from_path(&config_path).map_err(|e| {
        CliError::config(format!("{}: {e}", config_path.display()))
            .with_hint("check the file against the configuration reference in demos/")
    })?;

    let matches = match args::command(&config).try_get_matches_from(&raw_args) {
        Ok(m) => m,
        Err(e) => return clap_outcome(e),
    };
    let cli = Cli::from_arg_matches(&matches).map_err(|e| CliError::usage(e.to_string()))?;

    let workers = cli.workers.or(config.process.workers);
    let pool = match workers {
        Some(n) => WorkerPool::new(n),
        None => WorkerPool::with_available_parallelism(),
    }
    .map_err(|e| CliError::runtime(e.to_string()))?;

    let job = Job::new(&config, ActionRegistry::builtin()).map_err(|e| CliError::config(e.to_string()))?;

    let sources = args::resolve_sources(&config, &matches).map_err(path_error)?;
    let output_dir = match sources.outputs.get(&config.job.output) {
        Some(SourcePath::Folder { dir, .. }) => dir.clone(),
        Some(SourcePath::File(path)) => {
            return Err(CliError::usage(format!("{} is a file, expected a directory", path.display())))
        }
        None => {
            return Err(CliError::usage(format!("no path given for output '{}'", config.job.output))
                .with_hint(format!("pass --{}", output_flag(&config))))
        }
    };
    debug!(workers = pool.workers(), output = %output_dir.display(), "starting run");

    let result = job.run(&sources.inputs, &pool).map_err(|e| match e {
        ReconError::MissingInput(ref key) => {
            let hint = config
                .inputs
                .get(key)
                .map(|(kind, _)| format!("pass --{}", args::long_name(key, kind)));
            let err = CliError::usage(e.to_string());
            match hint {
                Some(hint) => err.with_hint(hint),
                None => err,
            }
        }
        other => CliError::runtime(other.to_string()),
    })?;

    let written = job
        .write(&result, &output_dir, &pool)
        .map_err(|e| CliError::write(e.to_string()))?;
    pool.shutdown();
    info!(partitions = written.len(), dir = %output_dir.display(), "run complete");

    if cli.json {
        println!("{}", result.to_json());
    } else {
        print_summary(&result);
    }
    Ok(())
}

fn output_flag(config: &ProcessConfig) -> String {
    config
        .outputs
        .get(&config.job.output)
        .map(|(kind, _)| args::long_name(&config.job.output, kind))
        .unwrap_or_else(|| config.job.output.clone())
}

/// Parse with the fixed flags only; reached when no configuration is known.
fn parse_fixed(raw_args: &[OsString]) -> Result<(), CliError> {
    use clap::CommandFactory;
    match Cli::command().try_get_matches_from(raw_args) {
        Ok(_) => Err(CliError::usage("no configuration given").with_hint("pass --config <PATH>")),
        Err(e) => clap_outcome(e),
    }
}

/// Help and version are successes; everything else is a usage error.
fn clap_outcome(e: clap::Error) -> Result<(), CliError> {
    // Printing goes to stdout or stderr as clap decides; failure to print is moot.
    let _ = e.print();
    match e.kind() {
        ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => Ok(()),
        _ => Err(CliError {
            code: EXIT_USAGE,
            message: String::new(),
            hint: None,
        }),
    }
}

fn path_error(e: DocumentError) -> CliError {
    match e {
        DocumentError::NotFound(ref path) => CliError {
            code: EXIT_PATH_NOT_FOUND,
            message: e.to_string(),
            hint: Some(format!(
                "{} does not exist; set create_if_absent on the source to create it",
                path.display()
            )),
        },
        other => CliError {
            code: EXIT_PATH_NOT_FOUND,
            message: other.to_string(),
            hint: None,
        },
    }
}

fn print_summary(result: &JobResult) {
    for side in &result.summary.sides {
        eprintln!(
            "{}: {} rows from {} documents, {} set aside, {} carried forward, {} unique, {} duplicates, {} inverse pairs",
            side.name,
            side.loaded,
            side.documents,
            side.set_aside,
            side.carried_forward,
            side.unique,
            side.duplicates,
            side.inverse_pairs,
        );
        eprintln!("{}: {} reconciled, {} outstanding", side.name, side.reconciled, side.outstanding);
    }
    for partition in &result.summary.partitions {
        eprintln!("  {:<32} {:>8}", partition.name, partition.rows);
    }
}

impl CliError {
    pub fn usage(msg: impl Into<String>) -> Self {
        Self { code: EXIT_USAGE, message: msg.into(), hint: None }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_INVALID_CONFIG, message: msg.into(), hint: None }
    }

    pub fn runtime(msg: impl Into<String>) -> Self {
        Self { code: EXIT_RUNTIME, message: msg.into(), hint: None }
    }

    pub fn write(msg: impl Into<String>) -> Self {
        Self { code: EXIT_WRITE, message: msg.into(), hint: None }
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
