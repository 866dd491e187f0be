#![forbid(unsafe_code)]

//! `zfs-autosnap`: config-driven automatic snapshot rotation.
//!
//! Reads a YAML file of retention series, selects target datasets (the `//`
//! sentinel or explicit paths), and runs the retention engine once. Exit
//! status 0 means the run completed cleanly; 1 means it completed with
//! per-pair errors; fatal configuration errors abort before any mutation.

mod output;
mod zfs;

use autosnap_core::engine::{Engine, EngineOptions};
use autosnap_core::{ConfigFile, TargetSpec};
use clap::Parser;
use output::OutputMode;
use std::env;
use std::path::PathBuf;
use std::sync::atomic::AtomicBool;
use tracing::info;
use tracing_subscriber::{EnvFilter, fmt, prelude::*};

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Automatic ZFS snapshot rotation with per-series retention",
    long_about = None,
    after_help = "EXAMPLES:\n    # Rotate every dataset per /etc/zfs-autosnap.yaml\n    zfs-autosnap --config /etc/zfs-autosnap.yaml //\n\n    # One subtree, preview only\n    zfs-autosnap --config conf.yaml --recursive --dry-run tank/home\n\n    # Machine-readable report\n    zfs-autosnap --config conf.yaml --json //"
)]
struct Cli {
    /// Dataset paths to manage, or '//' for all datasets.
    #[arg(value_name = "DATASET|//", required = true)]
    datasets: Vec<String>,

    /// Path to the series configuration file.
    #[arg(short, long, value_name = "PATH")]
    config: PathBuf,

    /// Prefix embedded in snapshot names owned by this tool.
    #[arg(long, default_value = "zfs-auto-snap")]
    prefix: String,

    /// Also manage all descendants of the named datasets.
    #[arg(short, long)]
    recursive: bool,

    /// Exclude datasets unless com.sun:auto-snapshot is set to true.
    #[arg(long)]
    default_exclude: bool,

    /// Snapshot datasets even while their pool is scrubbing or resilvering.
    #[arg(long)]
    no_skip_scrub: bool,

    /// Never create snapshots, even when one is due.
    #[arg(long)]
    no_create: bool,

    /// Never destroy snapshots, even when over the keep count.
    #[arg(long)]
    no_destroy: bool,

    /// Report actions without performing any. Overrides the other toggles.
    #[arg(short = 'n', long)]
    dry_run: bool,

    /// Emit the run report as JSON instead of text.
    #[arg(long)]
    json: bool,

    /// Enable verbose logging.
    #[arg(short, long)]
    verbose: bool,
}

impl Cli {
    fn engine_options(&self) -> EngineOptions {
        EngineOptions {
            prefix: self.prefix.clone(),
            recursive: self.recursive,
            default_exclude: self.default_exclude,
            skip_scrub: !self.no_skip_scrub,
            allow_create: !self.no_create,
            allow_destroy: !self.no_destroy,
            dry_run: self.dry_run,
        }
    }

    const fn output_mode(&self) -> OutputMode {
        if self.json {
            OutputMode::Json
        } else {
            OutputMode::Human
        }
    }
}

fn init_tracing(verbose: bool) {
    let filter = EnvFilter::try_from_env("AUTOSNAP_LOG").unwrap_or_else(|_| {
        EnvFilter::new(if verbose || env::var("DEBUG").is_ok() {
            "autosnap_core=debug,autosnap_cli=debug,info"
        } else {
            "autosnap_core=info,autosnap_cli=info,warn"
        })
    });

    let format = env::var("AUTOSNAP_LOG_FORMAT").unwrap_or_else(|_| "compact".to_string());

    let registry = tracing_subscriber::registry().with(filter);
    match format.as_str() {
        "json" => {
            registry
                .with(fmt::layer().json().with_ansi(false).with_writer(std::io::stderr))
                .init();
        }
        _ => {
            registry
                .with(fmt::layer().compact().with_writer(std::io::stderr))
                .init();
        }
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    // Fatal phase: config and target parsing happen before the storage
    // layer is touched at all.
    let conf = ConfigFile::load(&cli.config)?;
    let spec = TargetSpec::from_args(&cli.datasets)?;

    info!(series_qty = conf.series.len(), "loaded configuration file");
    for series in &conf.series {
        info!(
            label = %series.label,
            interval = %humantime::format_duration(series.interval),
            keep = series.keep,
            "loaded series configuration"
        );
    }

    let store = zfs::ZfsCommandStore::new();
    let engine = Engine::new(&store, cli.engine_options());
    let stop = AtomicBool::new(false);

    let report = engine.run(&spec, &conf.series, chrono::Utc::now(), &stop)?;

    let mut stdout = std::io::stdout().lock();
    output::render_report(&report, cli.output_mode(), &mut stdout)?;

    if !report.completed_cleanly() {
        std::process::exit(1);
    }
    Ok(())
}
