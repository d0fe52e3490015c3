//! calocell command-line interface.
//!
//! Reconstructs calorimeter cells from JSON-lines truth hits using a JSON
//! detector description.
#![allow(clippy::cast_precision_loss, clippy::too_many_lines)]

use calocell_algorithms::{CaloCellBuilder, CellBuilderConfig, OutputLevel, PulseGeneratorConfig};
use calocell_core::{EventState, SamplingId};
use calocell_io::{
    load_detector, write_histograms, BunchWindow, CellFileWriter, HitEventReader,
};
use clap::{Parser, Subcommand};
use log::info;
use std::path::PathBuf;
use std::time::Instant;
use thiserror::Error;

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    CalocellIo(#[from] calocell_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] calocell_core::Error),

    #[error("Thread pool error: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

/// Calorimeter cell reconstruction from truth hits.
#[derive(Parser)]
#[command(name = "calocell")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Message verbosity: 0 verbose, 1 debug, 2 info, 3 warning, 4 error, 5 fatal
    #[arg(long, global = true, default_value = "2", value_parser = clap::value_parser!(u8).range(0..=5))]
    output_level: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Reconstruct cells for every event of a hit file
    Reconstruct {
        /// Detector description (JSON)
        #[arg(short, long)]
        detector: PathBuf,

        /// Input hits, one JSON event per line
        #[arg(long)]
        hits: PathBuf,

        /// Output file (.csv or .bin)
        #[arg(short, long)]
        output: PathBuf,

        /// Append the cross-talk stage
        #[arg(long)]
        do_crosstalk: bool,

        /// Capacitive cross-talk amplitude (%)
        #[arg(long, default_value = "4.2")]
        xt_amp_capacitive: f32,

        /// Inductive cross-talk amplitude (%)
        #[arg(long, default_value = "2.3")]
        xt_amp_inductive: f32,

        /// Resistive cross-talk amplitude (%)
        #[arg(long, default_value = "1.0")]
        xt_amp_resistive: f32,

        /// Cross-talk source threshold in units of the cell noise
        #[arg(long, default_value = "2.0")]
        sigma_noise_cut: f32,

        /// Restrict cross-talk sources to these samplings
        #[arg(long, value_delimiter = ',')]
        xt_samplings: Vec<u16>,

        /// Monitoring root path
        #[arg(long, default_value = "Expert")]
        histogram_path: String,

        /// Write monitoring histograms to this JSON file
        #[arg(long)]
        histograms: Option<PathBuf>,

        /// Run seed for noise and deformation
        #[arg(long, default_value = "0")]
        seed: u64,

        /// Pedestal added to every sample
        #[arg(long, default_value = "0.0")]
        pedestal: f32,

        /// Standard deviation of the additive sample noise
        #[arg(long, default_value = "0.0")]
        noise_std: f32,

        /// Events processed in parallel per batch
        #[arg(long, default_value = "64")]
        batch_size: usize,

        /// Worker threads (defaults to the number of cores)
        #[arg(short = 'j', long)]
        threads: Option<usize>,
    },

    /// Show the sampling layers of a detector description
    Info {
        /// Detector description (JSON)
        detector: PathBuf,
    },
}

fn init_logging(level: OutputLevel) {
    // RUST_LOG takes precedence over the configured level
    env_logger::Builder::new()
        .filter_level(level.level_filter())
        .parse_default_env()
        .init();
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    let output_level = OutputLevel::from_level(cli.output_level)?;
    init_logging(output_level);

    match cli.command {
        Commands::Reconstruct {
            detector,
            hits,
            output,
            do_crosstalk,
            xt_amp_capacitive,
            xt_amp_inductive,
            xt_amp_resistive,
            sigma_noise_cut,
            xt_samplings,
            histogram_path,
            histograms,
            seed,
            pedestal,
            noise_std,
            batch_size,
            threads,
        } => {
            if let Some(n) = threads {
                rayon::ThreadPoolBuilder::new()
                    .num_threads(n)
                    .build_global()?;
            }

            let start = Instant::now();
            let detector = load_detector(&detector)?;
            let window = BunchWindow::for_detector(&detector);

            let mut config = CellBuilderConfig::default()
                .with_histogram_path(histogram_path)
                .with_crosstalk(do_crosstalk)
                .with_xt_amplitudes(xt_amp_capacitive, xt_amp_inductive, xt_amp_resistive)
                .with_sigma_noise_cut(sigma_noise_cut)
                .with_output_level(output_level)
                .with_pulse(
                    PulseGeneratorConfig::default()
                        .with_pedestal(pedestal)
                        .with_noise(0.0, noise_std),
                )
                .with_seed(seed);
            if !xt_samplings.is_empty() {
                config.crosstalk = config
                    .crosstalk
                    .with_samplings(xt_samplings.into_iter().map(SamplingId).collect());
            }

            let pipeline = CaloCellBuilder::new(detector, config).configure()?;
            info!("Stages: {}", pipeline.stages().join(" -> "));

            let mut monitor = if histograms.is_some() {
                Some(pipeline.book_monitoring()?)
            } else {
                None
            };

            let mut reader = HitEventReader::open(&hits)?
                .with_hits_key(pipeline.hits_key())
                .with_bunch_window(window);
            let mut writer = CellFileWriter::create(&output)?;
            info!("Writing output to: {}", output.display());

            let mut total_events = 0usize;
            let mut total_cells = 0usize;
            let mut total_out_of_window = 0usize;

            loop {
                let mut batch = reader.read_batch(batch_size.max(1))?;
                if batch.is_empty() {
                    break;
                }
                let reports = pipeline.execute_all(&mut batch)?;
                for (store, report) in batch.iter_mut().zip(&reports) {
                    if let Some(monitor) = monitor.as_mut() {
                        pipeline.fill_monitoring(monitor, store);
                    }
                    writer.write_event(store)?;
                    store.advance(EventState::Persisted)?;
                    total_cells += report.cells;
                    total_out_of_window += report.hits_out_of_window();
                }
                total_events += batch.len();
            }
            writer.flush()?;

            if let (Some(path), Some(monitor)) = (histograms, monitor.as_ref()) {
                write_histograms(&path, monitor)?;
                info!("Histograms written to: {}", path.display());
            }

            let elapsed = start.elapsed();
            println!(
                "Processed {total_events} events in {:.2}s",
                elapsed.as_secs_f64()
            );
            println!("Total cells: {total_cells}");
            println!("Records written: {}", writer.records());
            println!("Hits outside bunch window: {total_out_of_window}");
            println!(
                "Hits without bunch crossing skipped: {}",
                reader.hits_skipped()
            );
        }

        Commands::Info { detector } => {
            let path = detector;
            let detector = load_detector(&path)?;

            println!("Detector: {}", path.display());
            println!("Sampling layers: {}", detector.samplings.len());
            println!(
                "{:<8} | {:>8} | {:<16} | {:>5} x {:<5} | {:>7} | {:>9}",
                "Layer", "Sampling", "Collection", "eta", "phi", "Samples", "Noise"
            );
            println!("{:-<78}", "");
            for layer in &detector.samplings {
                println!(
                    "{:<8} | {:>8} | {:<16} | {:>5} x {:<5} | {:>7} | {:>9.2}",
                    layer.name,
                    layer.sampling.0,
                    layer.collection_key.as_str(),
                    layer.n_eta(),
                    layer.n_phi(),
                    layer.samples,
                    layer.noise
                );
            }
            let total: usize = detector
                .samplings
                .iter()
                .map(|l| l.n_eta() * l.n_phi())
                .sum();
            println!("Total cells: {total}");
        }
    }

    Ok(())
}
