mod reader;
pub mod config;
pub mod histogram;
pub mod plot;
pub mod rates;
pub mod types;

use log::info;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

// Re-export types
pub use config::{AnalysisConfig, Comparison};
pub use histogram::HistogramParams;
pub use reader::{
    read_neuroscope_dir, read_session_list, read_spike_file, write_spike_file, LoadOptions,
    DEFAULT_SAMPLE_RATE, NEURONS_FILE, SPIKES_FILE, STATES_FILE,
};
pub use types::*;

/// Loads a session directory and returns its neurons and scored states
///
/// # Examples
///
/// ```no_run
/// use state_rates::load_session;
///
/// let result = load_session("/data/Rat08/Rat08-20130708");
/// match result {
///     Ok(session) => println!("{} neurons", session.num_neurons()),
///     Err(e) => println!("Error loading session: {}", e),
/// }
/// ```
pub fn load_session<P: AsRef<Path>>(session_dir: P) -> Result<Session, Box<dyn Error>> {
    load_session_with(session_dir, &LoadOptions::default())
}

/// Like [`load_session`], with explicit loading options.
pub fn load_session_with<P: AsRef<Path>>(session_dir: P, options: &LoadOptions) -> Result<Session, Box<dyn Error>> {
    Ok(reader::load_session_dir(session_dir.as_ref(), options)?)
}

/// Loads every session directory in `session_dirs`, in order.
pub fn load_sessions<P: AsRef<Path>>(session_dirs: &[P]) -> Result<Vec<Session>, Box<dyn Error>> {
    load_sessions_with(session_dirs, &LoadOptions::default())
}

/// Like [`load_sessions`], with explicit loading options.
pub fn load_sessions_with<P: AsRef<Path>>(
    session_dirs: &[P],
    options: &LoadOptions,
) -> Result<Vec<Session>, Box<dyn Error>> {
    let dirs: Vec<PathBuf> = session_dirs.iter().map(|p| p.as_ref().to_path_buf()).collect();
    if dirs.is_empty() {
        return Err(Box::new(RatesError::Other("No sessions to load".to_string())));
    }
    Ok(reader::load_session_dirs(&dirs, options)?)
}

/// Draws the scatter plot of `states[0]` rates (x) against `states[1]`
/// rates (y) at `region` and returns the path of the PNG written to
/// `out_dir`.
pub fn plot_scatter(
    sessions: &[Session],
    states: [BrainState; 2],
    region: &Region,
    out_dir: &Path,
) -> Result<PathBuf, Box<dyn Error>> {
    let (first, second) = rates::firing_rates_multiple_sessions(sessions, states, region);

    fs::create_dir_all(out_dir)?;
    let out_path = out_dir.join(format!("scatter_{}_{}_vs_{}.png", region, states[0], states[1]));
    plot::render_scatter(&out_path, &first, &second)?;
    Ok(out_path)
}

/// Draws one rate distribution per state at `region` and returns the paths
/// of the two PNGs written to `out_dir`.
pub fn plot_both_histograms(
    sessions: &[Session],
    states: [BrainState; 2],
    region: &Region,
    params: &HistogramParams,
    out_dir: &Path,
) -> Result<[PathBuf; 2], Box<dyn Error>> {
    params.validate()?;
    let (first, second) = rates::firing_rates_multiple_sessions(sessions, states, region);

    fs::create_dir_all(out_dir)?;
    let mut paths = [PathBuf::new(), PathBuf::new()];
    for (slot, state_rates) in paths.iter_mut().zip([&first, &second]) {
        let title = format!(
            "Firing rate distribution at {} during {}",
            region, state_rates.state
        );
        let out_path = out_dir.join(format!("histogram_{}_{}.png", region, state_rates.state));
        plot::render_histogram(&out_path, &title, state_rates, params)?;
        *slot = out_path;
    }
    Ok(paths)
}

/// Draws a spike raster of every neuron in `session` between `start` and
/// `end` seconds, shading the intervals of `state` if given.
pub fn plot_raster(
    session: &Session,
    start: f64,
    end: f64,
    state: Option<BrainState>,
    out_path: &Path,
) -> Result<(), Box<dyn Error>> {
    let neurons: Vec<&Neuron> = session.neurons.iter().collect();
    let shade = match state {
        Some(state) => Some(session.state(state).ok_or_else(|| {
            RatesError::Other(format!("Session {} has no {} intervals", session.name, state))
        })?),
        None => None,
    };
    let title = format!("{} : {:.1}-{:.1} s", session.name, start, end);
    plot::render_raster(out_path, &title, &neurons, start, end, shade)
}

/// Converts the Neuroscope `.res.N`/`.clu.N` files of a session directory
/// into `spikes.bin`, and writes a `neurons.csv` template if none exists.
///
/// Returns the path of the written spike file.
pub fn import_neuroscope(session_dir: &Path, sample_rate: f32) -> Result<PathBuf, Box<dyn Error>> {
    let trains = reader::read_neuroscope_dir(session_dir)?;
    if trains.is_empty() {
        return Err(Box::new(RatesError::Other(format!(
            "No Neuroscope .res/.clu pairs in {}",
            session_dir.display()
        ))));
    }

    let spikes_path = session_dir.join(SPIKES_FILE);
    reader::write_spike_file(&spikes_path, sample_rate, &trains)?;
    info!(
        "Wrote {} unit{} to {}",
        trains.len(),
        if trains.len() != 1 { "s" } else { "" },
        spikes_path.display()
    );

    let neurons_path = session_dir.join(NEURONS_FILE);
    if !neurons_path.exists() {
        reader::write_neuron_template(&neurons_path, &trains)?;
        info!("Wrote metadata template {}", neurons_path.display());
    }

    Ok(spikes_path)
}

/// Runs every comparison of `config`: one scatter plot and two histograms
/// each. Sessions are loaded once and shared by all comparisons.
///
/// Returns the paths of all written plots.
pub fn run_analysis(config: &AnalysisConfig) -> Result<Vec<PathBuf>, Box<dyn Error>> {
    config.validate()?;
    let sessions = load_sessions_with(&config.session_paths()?, &config.load_options())?;

    let mut written = Vec::new();
    for comparison in &config.comparisons {
        let region = comparison.region()?;
        let states = comparison.states()?;
        info!("Comparing {} vs {} at {}", states[0], states[1], region);

        written.push(plot_scatter(&sessions, states, &region, &config.output_dir)?);
        written.extend(plot_both_histograms(
            &sessions,
            states,
            &region,
            &config.histogram,
            &config.output_dir,
        )?);
    }

    info!(
        "Done! Wrote {} plot{} to {}",
        written.len(),
        if written.len() != 1 { "s" } else { "" },
        config.output_dir.display()
    );
    Ok(written)
}
