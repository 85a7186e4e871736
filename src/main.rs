use clap::{Args, Parser, Subcommand};
use log::{info, warn};
use std::error::Error;
use std::path::PathBuf;
use std::process::ExitCode;

use state_rates::rates::{firing_rates_multiple_sessions, summarize};
use state_rates::{
    load_session_with, load_sessions_with, read_session_list, AnalysisConfig, BrainState,
    HistogramParams, LoadOptions, Region, DEFAULT_SAMPLE_RATE,
};

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run every comparison listed in an analysis config
    Run {
        /// Path to the analysis TOML
        #[arg(long, default_value = "analysis.toml")]
        config: PathBuf,
    },
    /// Scatter plot of rates in one state against another
    Scatter(Selection),
    /// Rate distribution histograms for both states
    Histogram {
        #[command(flatten)]
        selection: Selection,
        /// Number of log-spaced bin edges
        #[arg(long, default_value_t = 50)]
        bin_edges: usize,
        /// Lowest bin edge (Hz)
        #[arg(long, default_value_t = 0.1)]
        lower: f64,
        /// Highest bin edge (Hz)
        #[arg(long, default_value_t = 100.0)]
        upper: f64,
    },
    /// Print per-group rate statistics
    Summary(Selection),
    /// Spike raster of one session over a time window
    Raster {
        /// Session directory
        #[arg(long)]
        session: PathBuf,
        /// Window start (s)
        #[arg(long)]
        start: f64,
        /// Window end (s)
        #[arg(long)]
        end: f64,
        /// State whose intervals are shaded
        #[arg(long)]
        state: Option<BrainState>,
        /// Output PNG
        #[arg(long, default_value = "raster.png")]
        out: PathBuf,
        /// Sample rate for Neuroscope sessions (Hz)
        #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
        sample_rate: f32,
    },
    /// Convert Neuroscope .res/.clu files of a session to spikes.bin
    ImportNeuroscope {
        /// Session directory
        #[arg(long)]
        session: PathBuf,
        /// Sample rate of the .res sample indices (Hz)
        #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
        sample_rate: f32,
    },
}

#[derive(Args, Debug)]
struct Selection {
    /// File listing session directories, one per line
    #[arg(long)]
    sessions: PathBuf,
    /// Brain region (Hpc or BLA)
    #[arg(long, default_value = "Hpc")]
    region: Region,
    /// Two states, comma separated (wake, sws, Rem, drowsy)
    #[arg(long, value_delimiter = ',', default_values = ["wake", "sws"])]
    states: Vec<BrainState>,
    /// Output directory
    #[arg(long, default_value = "plots")]
    out_dir: PathBuf,
    /// Sample rate for Neuroscope sessions (Hz)
    #[arg(long, default_value_t = DEFAULT_SAMPLE_RATE)]
    sample_rate: f32,
}

impl Selection {
    fn states(&self) -> Result<[BrainState; 2], Box<dyn Error>> {
        match self.states.as_slice() {
            [a, b] if a != b => Ok([*a, *b]),
            _ => Err(format!("expected two distinct states, got {:?}", self.states).into()),
        }
    }

    fn load(&self) -> Result<Vec<state_rates::Session>, Box<dyn Error>> {
        if !self.region.is_recorded() {
            warn!(
                "Region '{}' is neither Hpc nor BLA, only unclassified cells will be found",
                self.region
            );
        }
        let paths = read_session_list(&self.sessions)?;
        load_sessions_with(
            &paths,
            &LoadOptions {
                sample_rate: self.sample_rate,
            },
        )
    }
}

fn run(command: Command) -> Result<(), Box<dyn Error>> {
    match command {
        Command::Run { config } => {
            let config = AnalysisConfig::load(&config)?;
            state_rates::run_analysis(&config)?;
        }
        Command::Scatter(selection) => {
            let states = selection.states()?;
            let sessions = selection.load()?;
            state_rates::plot_scatter(&sessions, states, &selection.region, &selection.out_dir)?;
        }
        Command::Histogram {
            selection,
            bin_edges,
            lower,
            upper,
        } => {
            let states = selection.states()?;
            let params = HistogramParams {
                bin_edges,
                lower,
                upper,
            };
            params.validate()?;
            let sessions = selection.load()?;
            state_rates::plot_both_histograms(
                &sessions,
                states,
                &selection.region,
                &params,
                &selection.out_dir,
            )?;
        }
        Command::Summary(selection) => {
            let states = selection.states()?;
            let sessions = selection.load()?;
            let (first, second) = firing_rates_multiple_sessions(&sessions, states, &selection.region);
            for rates in [&first, &second] {
                println!("{} at {}:", rates.state, rates.region);
                for summary in summarize(rates) {
                    println!(
                        "  {:<13} n={:<5} defined={:<5} mean={:.3} Hz median={:.3} Hz",
                        summary.group.label(),
                        summary.count,
                        summary.defined,
                        summary.mean,
                        summary.median
                    );
                }
            }
        }
        Command::Raster {
            session,
            start,
            end,
            state,
            out,
            sample_rate,
        } => {
            let session = load_session_with(&session, &LoadOptions { sample_rate })?;
            state_rates::plot_raster(&session, start, end, state, &out)?;
        }
        Command::ImportNeuroscope {
            session,
            sample_rate,
        } => {
            let path = state_rates::import_neuroscope(&session, sample_rate)?;
            info!("Imported {}", path.display());
        }
    }
    Ok(())
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli.command) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
