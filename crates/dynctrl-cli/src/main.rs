//! uvcdynctrl - Main entry point
//!
//! Imports dynamic controls from a dynctrl XML file into every uvcvideo
//! device on the system, or lists the video devices found.

mod config;
mod output;

use anyhow::Result;
use clap::{CommandFactory, Parser};
use dynctrl_core::mock::{MockBackend, MockDevice};
use dynctrl_core::{load_and_apply, DeviceBackend, Options, Report};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "uvcdynctrl")]
#[command(about = "Manage dynamic controls in uvcvideo")]
#[command(version)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, default_value = "dynctrl.toml")]
    config: PathBuf,

    /// Import dynamic controls from the given dynctrl XML file
    #[arg(short, long, value_name = "FILE")]
    import: Option<PathBuf>,

    /// List all available video devices
    #[arg(short, long)]
    list: bool,

    /// Print meta information and processing statistics
    #[arg(short, long)]
    verbose: bool,

    /// Do not warn about unknown document sections
    #[arg(long)]
    no_validate: bool,

    /// Apply to a simulated uvcvideo device and print what would be sent
    #[arg(long)]
    dry_run: bool,

    /// Print the import report as JSON
    #[arg(long)]
    json: bool,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, default_value = "warn")]
    log_level: String,
}

fn main() -> Result<()> {
    let args = Args::parse();

    // Initialize logging
    let level = match args.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "info" => Level::INFO,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::WARN,
    };

    let subscriber = FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(true)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber)?;

    info!("uvcdynctrl v{}", env!("CARGO_PKG_VERSION"));

    let config = config::load_config(&args.config)?;

    if args.list {
        let devices = system_backend(&config.v4l2.dev_dir)?.list_candidate_devices()?;
        if devices.is_empty() {
            println!("No devices found.");
        }
        for device in &devices {
            println!("{}", output::render_device(device, args.verbose));
        }
        return Ok(());
    }

    let Some(file) = args.import.as_deref() else {
        Args::command().print_help()?;
        return Ok(());
    };

    let mut options = config.to_options();
    if args.verbose {
        options.retrieve_meta = true;
    }
    if args.no_validate {
        options.skip_validation = true;
    }

    if !args.json {
        println!("Importing dynamic controls from file {}.", file.display());
    }

    let report = if args.dry_run {
        dry_run(file, &options, !args.json)
    } else {
        let mut backend = system_backend(&config.v4l2.dev_dir)?;
        load_and_apply(file, &options, &mut backend)
    };

    if args.json {
        println!("{}", report.to_json()?);
    } else {
        if !report.succeeded() {
            eprintln!("ERROR: Unable to import dynamic controls: {}.", report.status);
        }
        print!("{}", output::render_report(&report, &file.display().to_string(), args.verbose));
    }

    if !report.succeeded() {
        std::process::exit(1);
    }
    Ok(())
}

fn dry_run(file: &Path, options: &Options, print_calls: bool) -> Report {
    let mut backend = MockBackend::new().with_device(MockDevice::uvc("video0"));
    let report = load_and_apply(file, options, &mut backend);
    if print_calls {
        for call in backend.calls() {
            println!("{}", output::render_call(&call));
        }
    }
    report
}

#[cfg(target_os = "linux")]
fn system_backend(dev_dir: &Path) -> Result<dynctrl_v4l2::V4l2Backend> {
    Ok(dynctrl_v4l2::V4l2Backend::new(dev_dir))
}

#[cfg(not(target_os = "linux"))]
fn system_backend(_dev_dir: &Path) -> Result<MockBackend> {
    anyhow::bail!("video devices can only be accessed on Linux; use --dry-run")
}
