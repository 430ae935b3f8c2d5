//! Argument surface: fixed flags plus one path argument per configured source.

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::path::PathBuf;

use clap::{Arg, ArgAction, ArgMatches, Command, CommandFactory, Parser};

use docrecon_config::{ProcessConfig, SourceDefinition, SourceKind};
use docrecon_io::SourcePath;

#[derive(Parser, Debug)]
#[command(name = "docrecon")]
#[command(about = "Reconcile transaction documents as described by a job configuration")]
#[command(version)]
#[command(long_version = long_version())]
#[command(after_help = "\
Every input and output declared in the configuration adds one argument,
named after its key and kind, e.g. --ledger-file or --main-output-folder.

Examples:
  docrecon --config settlement.toml --ledger-file gl.csv --atm-folder atm/ --main-output-folder out/
  docrecon --config settlement.toml --help
  RUST_LOG=docrecon=debug docrecon --config settlement.toml ...")]
pub struct Cli {
    /// Job configuration (TOML)
    #[arg(long, short = 'c', env = "DOCRECON_CONFIG", value_name = "PATH")]
    pub config: PathBuf,

    /// Worker threads for chunked mutations [default: process.workers, then all cores]
    #[arg(long, value_name = "N")]
    pub workers: Option<usize>,

    /// Print the run summary as JSON on stdout
    #[arg(long)]
    pub json: bool,

    /// Debug logging
    #[arg(short, long)]
    pub verbose: bool,
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("DOCRECON_COMMIT"), ")",
        "\nbuild:   ", env!("DOCRECON_PROFILE"),
        "\ntarget:  ", env!("DOCRECON_TARGET"),
    )
}

/// Fixed flags read before the configuration is known.
#[derive(Debug, Default)]
pub struct Probe {
    pub config: Option<PathBuf>,
    pub verbose: bool,
}

/// Scan for `--config` and `-v` only. The dynamic arguments are unknown
/// until the configuration is loaded, so this cannot go through clap; the
/// full command validates everything afterwards.
pub fn probe(args: &[OsString]) -> Probe {
    let mut probe = Probe {
        config: std::env::var_os("DOCRECON_CONFIG").map(PathBuf::from),
        verbose: false,
    };
    let mut iter = args.iter().skip(1);
    while let Some(arg) = iter.next() {
        let Some(arg) = arg.to_str() else { continue };
        match arg {
            "--" => break,
            "--config" | "-c" => probe.config = iter.next().map(PathBuf::from),
            "--verbose" | "-v" => probe.verbose = true,
            _ => {
                if let Some(path) = arg.strip_prefix("--config=") {
                    probe.config = Some(PathBuf::from(path));
                }
            }
        }
    }
    probe
}

/// `--<key>-<file|folder>`, underscores in the key becoming dashes.
pub fn long_name(key: &str, kind: SourceKind) -> String {
    format!("{}-{}", key.replace('_', "-"), kind.label())
}

/// Argument id of a source. Kept apart from the fixed flags' ids, so a
/// source may be called `config` or `json`.
pub fn source_id(key: &str) -> String {
    format!("source:{key}")
}

fn source_arg(key: &str, kind: SourceKind, definition: &SourceDefinition) -> Arg {
    let cli = &definition.config.cli;
    let mut arg = Arg::new(source_id(key))
        .long(long_name(key, kind))
        .value_name(kind.label().to_uppercase())
        .value_parser(clap::value_parser!(PathBuf))
        .action(ArgAction::Set)
        .required(cli.required && cli.default.is_none());
    if !definition.info.is_empty() {
        arg = arg.help(definition.info.clone());
    }
    if let Some(ref default) = cli.default {
        arg = arg.default_value(default.clone());
    }
    arg
}

/// The full command for `config`: fixed flags, the process description as
/// `about`, and one argument per input and output.
pub fn command(config: &ProcessConfig) -> Command {
    let mut cmd = Cli::command();
    if !config.process.description.is_empty() {
        cmd = cmd.about(config.process.description.clone());
    }
    for (kind, key, definition) in config.inputs.iter().chain(config.outputs.iter()) {
        cmd = cmd.arg(source_arg(key, kind, definition));
    }
    cmd
}

/// Resolved paths by source key, inputs and outputs kept apart.
#[derive(Debug, Default)]
pub struct ResolvedSources {
    pub inputs: BTreeMap<String, SourcePath>,
    pub outputs: BTreeMap<String, SourcePath>,
}

/// Resolve every supplied source path. Sources left unset are skipped; the
/// job reports the ones it needed.
pub fn resolve_sources(config: &ProcessConfig, matches: &ArgMatches) -> docrecon_io::Result<ResolvedSources> {
    let mut resolved = ResolvedSources::default();
    for (catalog, out) in [
        (&config.inputs, &mut resolved.inputs),
        (&config.outputs, &mut resolved.outputs),
    ] {
        for (_, key, definition) in catalog.iter() {
            if let Some(path) = matches.get_one::<PathBuf>(&source_id(key)) {
                out.insert(
                    key.to_string(),
                    SourcePath::resolve(path, definition.config.create_if_absent)?,
                );
            }
        }
    }
    Ok(resolved)
}
