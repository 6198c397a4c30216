use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Result, bail};
use clap::{ArgAction, Args, Parser, Subcommand, ValueEnum};
use snapkit_io_snapshot::{
    EnumFinalizePhase, EnumMaterializeMode, SnapshotExportError, SpecSnapshotOptions,
    inspect_export_state, load_metadata_feed, load_snapshot_options, run_snapshot_export,
};
use tracing_subscriber::EnvFilter;

#[derive(Debug, Parser)]
#[command(
    name = "snapkit",
    version,
    about = "Export a media library into versioned hard-link snapshots."
)]
struct SnapkitCli {
    /// Increase log verbosity (-v info, -vv debug, -vvv trace).
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,
    #[command(subcommand)]
    command: CommandSnapkit,
}

#[derive(Debug, Subcommand)]
enum CommandSnapkit {
    /// Run one export and promote it to the current snapshot.
    Export(ArgsExport),
    /// Show whether the last export under a target root finished.
    Status(ArgsStatus),
}

#[derive(Debug, Args)]
struct ArgsExport {
    /// Options file (JSON); command-line flags override its fields.
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,
    /// Metadata feed listing the items of every category (JSON).
    #[arg(long, value_name = "FILE")]
    feed: PathBuf,
    /// Target root holding `InProgress/` and `Snapshot/`.
    #[arg(long, value_name = "DIR")]
    target: Option<PathBuf>,
    /// Earlier export tree used as link source.
    #[arg(long, value_name = "DIR")]
    base: Option<PathBuf>,
    /// Materialization mode.
    #[arg(long, value_enum)]
    mode: Option<ModeMaterialize>,
    /// Remove the flat folders before promotion.
    #[arg(long)]
    delete_flat: bool,
    /// Remove a staging tree left by an earlier attempt instead of failing.
    #[arg(long)]
    reset_staging: bool,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum ModeMaterialize {
    /// Hard link from the previous snapshot when possible, copy otherwise.
    #[value(name = "link_or_copy")]
    LinkOrCopy,
    /// Always copy.
    #[value(name = "copy_only")]
    CopyOnly,
}

impl From<ModeMaterialize> for EnumMaterializeMode {
    fn from(mode: ModeMaterialize) -> Self {
        match mode {
            ModeMaterialize::LinkOrCopy => Self::LinkOrCopy,
            ModeMaterialize::CopyOnly => Self::CopyOnly,
        }
    }
}

#[derive(Debug, Args)]
struct ArgsStatus {
    /// Target root to inspect.
    #[arg(long, value_name = "DIR")]
    target: PathBuf,
}

fn main() -> ExitCode {
    let cli = SnapkitCli::parse();
    init_tracing(cli.verbose);

    let res = match &cli.command {
        CommandSnapkit::Export(args) => cmd_export(args),
        CommandSnapkit::Status(args) => cmd_status(args),
    };

    match res {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("{}", describe_failure(&err));
            ExitCode::FAILURE
        }
    }
}

/// Message for a failed command; finalize failures name what to inspect.
fn describe_failure(err: &anyhow::Error) -> String {
    match err.downcast_ref::<SnapshotExportError>() {
        Some(SnapshotExportError::Promotion(e)) => format!("[PROMOTION FAILED] {e}"),
        Some(SnapshotExportError::Deletion(e))
            if matches!(
                e.phase,
                EnumFinalizePhase::SnapshotRemoval | EnumFinalizePhase::SnapshotSetAside
            ) =>
        {
            format!(
                "[SNAPSHOT NOT REPLACED] {e}\n\
                 The current snapshot was not modified and the new export is left in \
                 the staging folder. Inspect both, then rerun with --reset-staging."
            )
        }
        _ => format!("Error: {err:#}"),
    }
}

fn init_tracing(verbose: u8) {
    let level = match verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!("snapkit_io_snapshot={level},snapkit={level}"))
    });

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .with_level(true)
        .finish();

    let _ = tracing::subscriber::set_global_default(subscriber);
}

fn cmd_export(args: &ArgsExport) -> Result<()> {
    let spec_options = build_options(args)?;
    let spec_feed = load_metadata_feed(&args.feed)?;
    tracing::debug!(
        target_root = %spec_options.path_target.display(),
        mode = ?spec_options.rule_materialize,
        "options resolved"
    );

    let report = run_snapshot_export(&spec_options, &spec_feed)?;
    println!("{}", report.format("[EXPORT]"));
    for warning in &report.warnings {
        eprintln!("warning: {warning}");
    }
    Ok(())
}

fn cmd_status(args: &ArgsStatus) -> Result<()> {
    let spec_options = SpecSnapshotOptions::new(&args.target);
    let enum_state = inspect_export_state(&spec_options);
    println!("{}: {enum_state}", args.target.display());
    Ok(())
}

fn build_options(args: &ArgsExport) -> Result<SpecSnapshotOptions> {
    let mut spec_options = match &args.config {
        Some(path_config) => load_snapshot_options(path_config)?,
        None => SpecSnapshotOptions::default(),
    };

    if let Some(path_target) = &args.target {
        spec_options.path_target = path_target.clone();
    }
    if let Some(path_base) = &args.base {
        spec_options.path_base_export = Some(path_base.clone());
    }
    if let Some(mode) = args.mode {
        spec_options.rule_materialize = mode.into();
    }
    if args.delete_flat {
        spec_options.if_delete_flat = true;
    }
    if args.reset_staging {
        spec_options.if_reset_staging = true;
    }

    if spec_options.path_target.as_os_str().is_empty() {
        bail!("No target root: pass `--target` or set `path_target` in the options file.");
    }
    Ok(spec_options)
}
