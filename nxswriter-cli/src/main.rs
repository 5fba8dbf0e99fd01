//! nxswriter CLI
//!
//! Records a NeXus entry from a JSON layout and a JSON file of step records.

mod steps;

use clap::{Parser, Subcommand};
use log::{info, LevelFilter};
use nxswriter_core::DecoderPool;
use nxswriter_engine::{EntryLayout, NexusWriter, WriterConfig};
use nxswriter_io::{Backend, Node};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;
use steps::Steps;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Writer error: {0}")]
    Writer(#[from] nxswriter_core::Error),

    #[error("No file backend to write {0}: build with the hdf5 feature")]
    NoBackend(PathBuf),

    #[error("Step {step} failed: {source}")]
    Step {
        step: usize,
        source: nxswriter_core::Error,
    },
}

/// Growing-field NeXus writer.
#[derive(Parser)]
#[command(name = "nxswriter")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Record one entry from a layout and a steps file
    Record {
        /// Entry layout (JSON)
        #[arg(short, long)]
        layout: PathBuf,

        /// Step records (JSON)
        #[arg(short, long)]
        steps: PathBuf,

        /// Output file path
        #[arg(short, long)]
        output: PathBuf,

        /// Replace missing or invalid step data with sentinels
        #[arg(long)]
        canfail: bool,

        /// Writer configuration (JSON)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// List the registered data decoders
    Decoders,
}

/// What a recording session wrote.
#[derive(Default)]
struct Summary {
    steps: usize,
    written: usize,
    filled: usize,
    shapes: Vec<(String, Vec<usize>)>,
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };
    env_logger::Builder::new()
        .filter_level(level)
        .parse_default_env()
        .init();

    match cli.command {
        Commands::Record {
            layout,
            steps,
            output,
            canfail,
            config,
        } => {
            let config = match config {
                Some(path) => WriterConfig::from_file(path)?,
                None => WriterConfig::default(),
            };
            let layout = EntryLayout::from_file(&layout)?;
            let mut pool = DecoderPool::new();
            let steps = Steps::from_file(&steps, &mut pool)?;

            let start = Instant::now();
            let summary = record_with_default_backend(&output, &layout, &steps, config, canfail)?;
            let elapsed = start.elapsed();

            println!(
                "Recorded {} steps into {} in {:.2}s",
                summary.steps,
                output.display(),
                elapsed.as_secs_f64()
            );
            println!("Values written: {}", summary.written);
            println!("Sentinel fills: {}", summary.filled);
            for (path, shape) in &summary.shapes {
                println!("  {path} {shape:?}");
            }
        }

        Commands::Decoders => {
            let pool = DecoderPool::new();
            for name in pool.names() {
                println!("{name}");
            }
        }
    }

    Ok(())
}

#[cfg(feature = "hdf5")]
fn record_with_default_backend(
    output: &Path,
    layout: &EntryLayout,
    steps: &Steps,
    config: WriterConfig,
    canfail: bool,
) -> Result<Summary> {
    record(Arc::new(nxswriter_io::Hdf5Backend::new()), output, layout, steps, config, canfail)
}

#[cfg(not(feature = "hdf5"))]
fn record_with_default_backend(
    output: &Path,
    _layout: &EntryLayout,
    _steps: &Steps,
    _config: WriterConfig,
    _canfail: bool,
) -> Result<Summary> {
    Err(CliError::NoBackend(output.to_path_buf()))
}

#[cfg_attr(not(feature = "hdf5"), allow(dead_code))]
fn record<B: Backend>(
    backend: Arc<B>,
    output: &Path,
    layout: &EntryLayout,
    steps: &Steps,
    config: WriterConfig,
    canfail: bool,
) -> Result<Summary> {
    let mut writer = NexusWriter::new(backend, config);
    if canfail {
        writer.set_canfail(Some(true));
    }
    writer.open_file(output)?;

    let mut summary = Summary::default();
    let report = writer.open_entry(layout, &steps.init)?;
    summary.written += report.written;
    summary.filled += report.failed.len();

    for (index, record) in steps.steps.iter().enumerate() {
        let report = writer.record(record).map_err(|source| CliError::Step {
            step: index + 1,
            source,
        })?;
        summary.steps += 1;
        summary.written += report.written;
        summary.filled += report.failed.len();
        for path in &report.failed {
            info!("step {}: {path} filled with its sentinel", report.step);
        }
    }

    summary.shapes = writer
        .fields()
        .iter()
        .map(|field_writer| {
            let field = field_writer.field();
            Ok((field.path(), field.shape()?))
        })
        .collect::<std::result::Result<_, nxswriter_core::Error>>()?;

    let report = writer.close_entry(&steps.last)?;
    summary.written += report.written;
    summary.filled += report.failed.len();
    writer.close_file()?;
    Ok(summary)
}
