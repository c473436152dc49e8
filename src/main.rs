use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use dialoguer::Input;

use mixamo_export::{
    batch::{BatchPipeline, EmptySkeleton},
    config::VersionTable,
    profile::ExportProfile,
};

/// Gathers the top-level joints of every FBX file in a directory under a "World" root joint
/// and writes the results into a "MixamoExport" subdirectory.
#[derive(Parser)]
#[command(version)]
struct Cli {
    /// The directory with the FBX files. Asked for interactively when omitted.
    directory: Option<PathBuf>,

    /// The host application version that selects the FBX file version.
    #[arg(long, env = "MIXAMO_HOST_VERSION", default_value = "2019")]
    host_version: String,

    /// A TOML file with extra host versions, in a `[versions]` table.
    #[arg(long, env = "MIXAMO_VERSION_TABLE")]
    versions: Option<PathBuf>,

    /// What to do with files that have no joint to put under the root.
    #[arg(long, value_enum, default_value_t = EmptySkeleton::Export)]
    empty_skeleton: EmptySkeleton,

    /// Increase logging verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, conflicts_with = "verbose")]
    quiet: bool,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = match (cli.quiet, cli.verbose) {
        (true, _) => "error",
        (false, 0) => "warn",
        (false, 1) => "info",
        (false, 2) => "debug",
        _ => "trace",
    };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level)).init();

    // Resolve everything the whole batch depends on before touching any file.
    let table = match &cli.versions {
        Some(path) => VersionTable::load(path)?,
        None => VersionTable::default(),
    };
    let file_version = table.resolve(&cli.host_version).with_context(|| {
        let known: Vec<_> = table.host_versions().collect();
        format!("Known host versions: {}", known.join(", "))
    })?;
    let profile = ExportProfile::new(file_version);

    let directory = match cli.directory {
        Some(directory) => directory,
        None => PathBuf::from(
            Input::<String>::new()
                .with_prompt("Directory with the FBX files")
                .interact_text()?,
        ),
    };

    let mut pipeline = BatchPipeline::new(profile).empty_skeleton(cli.empty_skeleton);
    let report = pipeline.run(&directory)?;
    println!("{}", report);

    if report.failed() > 0 {
        std::process::exit(1);
    }

    Ok(())
}
