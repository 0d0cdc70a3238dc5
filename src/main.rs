use std::path::PathBuf;

use clap::{Parser, Subcommand};
use log::LevelFilter;
use log4rs::append::console::ConsoleAppender;
use log4rs::append::file::FileAppender;
use log4rs::config::{Appender, Config, Root};
use log4rs::encode::pattern::PatternEncoder;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;

use rusty_ephys::correlation::correlogram::{CorrelogramConfig, CorrelogramEngine};
use rusty_ephys::error::EphysError;
use rusty_ephys::recording::Recording;
use rusty_ephys::spikes::SpikeTable;
use rusty_ephys::stimulus::pipeline::{extract_onsets_from_recording, Protocol};
use rusty_ephys::NUM_CHANNELS;

#[derive(Parser, Debug)]
#[command(version, about)]
struct Args {
    /// Also write the log to this file
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    /// Log debug messages
    #[arg(short, long, global = true)]
    verbose: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Extract the stimulus onsets from the photodiode channel of a raw recording
    Onsets {
        /// The raw recording (interleaved little-endian i16 samples)
        #[arg(long)]
        data: PathBuf,
        /// The stimulation protocol, one of: fh, pg
        #[arg(long, default_value = "fh")]
        protocol: Protocol,
        /// The start of the analysed segment, in minutes
        #[arg(long, default_value = "0")]
        start: usize,
        /// The end of the analysed segment, in minutes (end of recording by default)
        #[arg(long)]
        end: Option<usize>,
        /// The output file (stim_samples.json next to the recording by default)
        #[arg(long)]
        output: Option<PathBuf>,
    },
    /// Cross-correlate all cluster pairs of a spike table
    Xcorr {
        /// The spike table (JSON)
        #[arg(long)]
        spikes: PathBuf,
        /// The output file (JSON)
        #[arg(long)]
        output: PathBuf,
        /// The bin width, in milliseconds
        #[arg(long, default_value = "1")]
        bin_width: u32,
        /// The maximum lag, in milliseconds
        #[arg(long, default_value = "50")]
        max_lag: u32,
        /// The significance threshold on the correlation probability
        #[arg(long, default_value = "0.1")]
        cp_sig: f64,
        /// The start of the analysis window, in seconds
        #[arg(long, requires = "window_end")]
        window_start: Option<f64>,
        /// The end of the analysis window, in seconds
        #[arg(long, requires = "window_start")]
        window_end: Option<f64>,
        /// The seed of the shuffled null
        #[arg(long, default_value = "0")]
        seed: u64,
    },
}

fn init_logging(log_file: Option<&PathBuf>, verbose: bool) -> Result<(), EphysError> {
    let level = if verbose {
        LevelFilter::Debug
    } else {
        LevelFilter::Info
    };

    let stderr = ConsoleAppender::builder()
        .target(log4rs::append::console::Target::Stderr)
        .encoder(Box::new(PatternEncoder::new("{l} - {m}\n")))
        .build();
    let mut config =
        Config::builder().appender(Appender::builder().build("stderr", Box::new(stderr)));
    let mut root = Root::builder().appender("stderr");

    if let Some(path) = log_file {
        let logfile = FileAppender::builder()
            .encoder(Box::new(PatternEncoder::new("{d} {l} - {m}\n")))
            .build(path)
            .map_err(|e| EphysError::IOError(e.to_string()))?;
        config = config.appender(Appender::builder().build("logfile", Box::new(logfile)));
        root = root.appender("logfile");
    }

    let config = config
        .build(root.build(level))
        .map_err(|e| EphysError::IOError(e.to_string()))?;
    log4rs::init_config(config).map_err(|e| EphysError::IOError(e.to_string()))?;
    Ok(())
}

fn main() -> Result<(), EphysError> {
    let args = Args::parse();
    init_logging(args.log_file.as_ref(), args.verbose)?;
    log::debug!("{:?}", args);

    match args.command {
        Command::Onsets {
            data,
            protocol,
            start,
            end,
            output,
        } => {
            let recording = Recording::open(&data, NUM_CHANNELS)?;
            log::info!(
                "Recording {} opened: {} samples",
                data.display(),
                recording.num_samples()
            );

            let onsets =
                extract_onsets_from_recording(&recording, &protocol.profile(), start, end)?;

            let output = output.unwrap_or_else(|| data.with_file_name("stim_samples.json"));
            onsets.save_to(&output)?;
            log::info!("{} onsets saved to {}", onsets.len(), output.display());
        }
        Command::Xcorr {
            spikes,
            output,
            bin_width,
            max_lag,
            cp_sig,
            window_start,
            window_end,
            seed,
        } => {
            let spike_table = SpikeTable::load_from(&spikes)?;
            log::info!(
                "{} spikes loaded from {} ({} clusters)",
                spike_table.len(),
                spikes.display(),
                spike_table.clusters().len()
            );

            let config = CorrelogramConfig {
                bin_width_ms: bin_width,
                max_lag_ms: max_lag,
                cp_sig,
                window: window_start.zip(window_end),
            };
            let engine = CorrelogramEngine::new(config)?;
            let mut rng = ChaCha8Rng::seed_from_u64(seed);
            let table = engine.compute(&spike_table, &mut rng)?;

            for significant in engine.significant_pairs(&table, &spike_table) {
                log::info!(
                    "Pair {:?} (sites {:?}): correlation probability {:.3}",
                    significant.pair,
                    significant.sites,
                    significant.probability
                );
            }

            table.save_to(&output)?;
            log::info!("Correlograms saved to {}", output.display());
        }
    }
    Ok(())
}
