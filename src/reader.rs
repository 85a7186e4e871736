use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use log::{debug, info, warn};
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::fs::{self, File};
use std::io::{BufRead, BufReader, BufWriter, Read, Seek, Write};
use std::path::{Path, PathBuf};
use std::time::Instant;

use crate::types::*;

// Constants used throughout the reader
const SPIKE_MAGIC_NUMBER: u32 = 0x5354_5254;
const SPIKE_FILE_VERSION: Version = Version { major: 1, minor: 0 };
const READ_BUFFER_CAPACITY: usize = 65536;
const UNIT_HEADER_SIZE: u64 = 12;

/// Spike train file inside a session directory.
pub const SPIKES_FILE: &str = "spikes.bin";
/// Per-neuron metadata table inside a session directory.
pub const NEURONS_FILE: &str = "neurons.csv";
/// Brain state scoring table inside a session directory.
pub const STATES_FILE: &str = "states.csv";

/// Sample rate assumed for Neuroscope `.res` files when none is given (Hz).
pub const DEFAULT_SAMPLE_RATE: f32 = 20_000.0;

// Neuroscope reserves cluster 0 for noise and cluster 1 for unsorted multi-unit activity
const FIRST_UNIT_CLUSTER: u32 = 2;

/// Options controlling how a session directory is read.
#[derive(Debug, Clone)]
pub struct LoadOptions {
    /// Sample rate used when spike trains come from Neuroscope text files (Hz)
    pub sample_rate: f32,
}

impl Default for LoadOptions {
    fn default() -> Self {
        LoadOptions {
            sample_rate: DEFAULT_SAMPLE_RATE,
        }
    }
}

#[derive(Debug, Deserialize)]
struct NeuronRecord {
    id: u32,
    #[serde(default)]
    shank: Option<u32>,
    #[serde(rename = "type")]
    cell_type: String,
    region: String,
}

#[derive(Debug, Deserialize)]
struct StateRecord {
    state: String,
    start: f64,
    end: f64,
}

/// Loads one session directory.
///
/// The directory must hold `neurons.csv`, `states.csv`, and either
/// `spikes.bin` or Neuroscope `.res.N`/`.clu.N` pairs.
pub fn load_session_dir(dir: &Path, options: &LoadOptions) -> Result<Session, RatesError> {
    let tic = Instant::now();

    if !dir.is_dir() {
        return Err(RatesError::MissingFile(dir.to_path_buf()));
    }

    let name = dir
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .unwrap_or_else(|| dir.display().to_string());

    info!("Reading session {}", name);

    let (sample_rate, trains) = load_spike_trains(dir, options)?;
    let records = read_neuron_table(&dir.join(NEURONS_FILE))?;
    let states = read_state_table(&dir.join(STATES_FILE))?;

    let neurons = attach_metadata(&name, records, trains, sample_rate)?;

    print_session_summary(&name, &neurons, &states);

    debug!(
        "Session {} read in {:.1} seconds",
        name,
        tic.elapsed().as_secs_f64()
    );

    Ok(Session {
        name,
        path: dir.to_path_buf(),
        sample_rate,
        neurons,
        states,
    })
}

/// Loads several sessions in order, failing on the first unreadable one.
pub fn load_session_dirs(dirs: &[PathBuf], options: &LoadOptions) -> Result<Vec<Session>, RatesError> {
    let mut sessions = Vec::with_capacity(dirs.len());
    for (i, dir) in dirs.iter().enumerate() {
        info!("Loading session {}/{}: {}", i + 1, dirs.len(), dir.display());
        sessions.push(load_session_dir(dir, options)?);
    }
    Ok(sessions)
}

/// Reads a list of session directories, one per line.
///
/// Blank lines and lines starting with `#` are skipped. Relative paths are
/// resolved against the directory containing the list file.
pub fn read_session_list(list_path: &Path) -> Result<Vec<PathBuf>, RatesError> {
    let file = File::open(list_path).map_err(|e| match e.kind() {
        std::io::ErrorKind::NotFound => RatesError::MissingFile(list_path.to_path_buf()),
        _ => RatesError::IoError(e),
    })?;
    let base = list_path.parent().unwrap_or_else(|| Path::new(""));

    let mut paths = Vec::new();
    for line in BufReader::new(file).lines() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() || trimmed.starts_with('#') {
            continue;
        }
        let path = PathBuf::from(trimmed);
        paths.push(if path.is_absolute() { path } else { base.join(path) });
    }

    debug!("Session list {} names {} sessions", list_path.display(), paths.len());
    Ok(paths)
}

// Picks spikes.bin when present, Neuroscope files otherwise
fn load_spike_trains(dir: &Path, options: &LoadOptions) -> Result<(f32, Vec<SpikeTrain>), RatesError> {
    let spikes_path = dir.join(SPIKES_FILE);
    if spikes_path.is_file() {
        let spike_file = read_spike_file(&spikes_path)?;
        return Ok((spike_file.sample_rate, spike_file.trains));
    }

    let trains = read_neuroscope_dir(dir)?;
    if trains.is_empty() {
        return Err(RatesError::MissingFile(spikes_path));
    }
    info!(
        "No {} found, using {} Neuroscope unit{} at {:.2} kS/s",
        SPIKES_FILE,
        trains.len(),
        if trains.len() != 1 { "s" } else { "" },
        options.sample_rate / 1000.0
    );
    Ok((options.sample_rate, trains))
}

/// Reads a binary spike file.
///
/// Layout (little-endian): magic number, version (two `i16`), sample rate
/// (`f32`), unit count (`u32`), then for each unit its id, shank and spike
/// count (`u32` each) followed by that many `u64` sample indices.
pub fn read_spike_file(path: &Path) -> Result<SpikeFile, RatesError> {
    let file = File::open(path)?;
    let file_size = file.metadata()?.len();
    let mut reader = BufReader::with_capacity(READ_BUFFER_CAPACITY, file);

    check_magic_number(&mut reader)?;
    let version = read_version_number(&mut reader)?;
    let sample_rate = reader.read_f32::<LittleEndian>()?;
    if !(sample_rate.is_finite() && sample_rate > 0.0) {
        return Err(RatesError::Other(format!(
            "Invalid sample rate {} in {}",
            sample_rate,
            path.display()
        )));
    }
    let num_units = reader.read_u32::<LittleEndian>()? as u64;

    // Every unit record holds at least its id, shank and spike count
    let bytes_remaining = file_size.saturating_sub(reader.stream_position()?);
    if num_units * UNIT_HEADER_SIZE > bytes_remaining {
        return Err(RatesError::FileSizeError);
    }

    let mut trains = Vec::with_capacity(num_units as usize);
    for _ in 0..num_units {
        trains.push(read_spike_train(&mut reader, file_size)?);
    }

    check_end_of_file(file_size, &mut reader)?;

    debug!(
        "Read {} unit{} from {} (version {}.{}, {:.2} kS/s)",
        trains.len(),
        if trains.len() != 1 { "s" } else { "" },
        path.display(),
        version.major,
        version.minor,
        sample_rate / 1000.0
    );

    Ok(SpikeFile {
        version,
        sample_rate,
        trains,
    })
}

/// Helper function to check the magic number that identifies spike files
fn check_magic_number<R: Read>(reader: &mut R) -> Result<(), RatesError> {
    let magic_number = reader.read_u32::<LittleEndian>()?;
    if magic_number != SPIKE_MAGIC_NUMBER {
        return Err(RatesError::UnrecognizedFileFormat);
    }
    Ok(())
}

/// Helper function to read the version number
fn read_version_number<R: Read>(reader: &mut R) -> Result<Version, RatesError> {
    let major = reader.read_i16::<LittleEndian>()? as i32;
    let minor = reader.read_i16::<LittleEndian>()? as i32;
    if major != SPIKE_FILE_VERSION.major {
        return Err(RatesError::UnsupportedVersion(major, minor));
    }
    Ok(Version { major, minor })
}

fn read_spike_train<R: Read + Seek>(reader: &mut R, file_size: u64) -> Result<SpikeTrain, RatesError> {
    let id = reader.read_u32::<LittleEndian>()?;
    let shank = reader.read_u32::<LittleEndian>()?;
    let num_spikes = reader.read_u32::<LittleEndian>()? as u64;

    // Guard against a corrupt count before allocating
    let bytes_remaining = file_size.saturating_sub(reader.stream_position()?);
    if num_spikes * 8 > bytes_remaining {
        return Err(RatesError::FileSizeError);
    }

    let mut samples = Vec::with_capacity(num_spikes as usize);
    for _ in 0..num_spikes {
        samples.push(reader.read_u64::<LittleEndian>()?);
    }

    Ok(SpikeTrain { id, shank, samples })
}

fn check_end_of_file<R: Read + Seek>(file_size: u64, reader: &mut R) -> Result<(), RatesError> {
    let position = reader.stream_position()?;
    if position != file_size {
        return Err(RatesError::FileSizeError);
    }
    Ok(())
}

/// Writes spike trains in the binary spike file layout read by [`read_spike_file`].
pub fn write_spike_file(path: &Path, sample_rate: f32, trains: &[SpikeTrain]) -> Result<(), RatesError> {
    let mut writer = BufWriter::new(File::create(path)?);

    writer.write_u32::<LittleEndian>(SPIKE_MAGIC_NUMBER)?;
    writer.write_i16::<LittleEndian>(SPIKE_FILE_VERSION.major as i16)?;
    writer.write_i16::<LittleEndian>(SPIKE_FILE_VERSION.minor as i16)?;
    writer.write_f32::<LittleEndian>(sample_rate)?;
    writer.write_u32::<LittleEndian>(trains.len() as u32)?;

    for train in trains {
        writer.write_u32::<LittleEndian>(train.id)?;
        writer.write_u32::<LittleEndian>(train.shank)?;
        writer.write_u32::<LittleEndian>(train.samples.len() as u32)?;
        for &sample in &train.samples {
            writer.write_u64::<LittleEndian>(sample)?;
        }
    }

    writer.flush()?;
    Ok(())
}

/// Reads every Neuroscope `.res.N`/`.clu.N` pair in `dir`.
///
/// Units are numbered from zero, ordered by shank and then by cluster.
/// Noise and multi-unit clusters are dropped. Two `.res` files for the same
/// shank (under different names) are rejected.
pub fn read_neuroscope_dir(dir: &Path) -> Result<Vec<SpikeTrain>, RatesError> {
    let mut shanks: BTreeMap<u32, (PathBuf, PathBuf)> = BTreeMap::new();

    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        let file_name = match path.file_name() {
            Some(n) => n.to_string_lossy().to_string(),
            None => continue,
        };
        let Some((stem, shank)) = split_res_name(&file_name) else {
            continue;
        };
        let clu_path = dir.join(format!("{}.clu.{}", stem, shank));
        if !clu_path.is_file() {
            warn!("{} has no matching cluster file, skipping", file_name);
            continue;
        }
        if let Some((previous, _)) = shanks.get(&shank) {
            return Err(RatesError::Other(format!(
                "Shank {} has two Neuroscope file sets in {}: {} and {}",
                shank,
                dir.display(),
                previous.display(),
                path.display()
            )));
        }
        shanks.insert(shank, (path, clu_path));
    }

    let mut trains = Vec::new();
    for (shank, (res_path, clu_path)) in shanks {
        let mut by_cluster = read_neuroscope_shank(&res_path, &clu_path)?;
        let clusters: Vec<u32> = by_cluster.keys().copied().collect();
        for cluster in clusters {
            if cluster < FIRST_UNIT_CLUSTER {
                continue;
            }
            let samples = by_cluster.remove(&cluster).unwrap_or_default();
            trains.push(SpikeTrain {
                id: trains.len() as u32,
                shank,
                samples,
            });
        }
    }

    Ok(trains)
}

// "Rat08-20130708.res.3" -> ("Rat08-20130708", 3)
fn split_res_name(file_name: &str) -> Option<(&str, u32)> {
    let (rest, shank) = file_name.rsplit_once('.')?;
    let shank = shank.parse::<u32>().ok()?;
    let stem = rest.strip_suffix(".res")?;
    Some((stem, shank))
}

fn read_neuroscope_shank(res_path: &Path, clu_path: &Path) -> Result<BTreeMap<u32, Vec<u64>>, RatesError> {
    let samples = read_number_lines::<u64>(res_path)?;
    let mut clusters = read_number_lines::<u32>(clu_path)?;

    // First line of a .clu file is the cluster count
    if clusters.is_empty() {
        return Err(RatesError::Other(format!("Empty cluster file {}", clu_path.display())));
    }
    clusters.remove(0);

    if clusters.len() != samples.len() {
        return Err(RatesError::Other(format!(
            "{} has {} spikes but {} has {} cluster labels",
            res_path.display(),
            samples.len(),
            clu_path.display(),
            clusters.len()
        )));
    }

    let mut by_cluster: BTreeMap<u32, Vec<u64>> = BTreeMap::new();
    for (sample, cluster) in samples.into_iter().zip(clusters) {
        by_cluster.entry(cluster).or_default().push(sample);
    }
    Ok(by_cluster)
}

fn read_number_lines<T: std::str::FromStr>(path: &Path) -> Result<Vec<T>, RatesError> {
    let reader = BufReader::with_capacity(READ_BUFFER_CAPACITY, File::open(path)?);
    let mut values = Vec::new();
    for (line_number, line) in reader.lines().enumerate() {
        let line = line?;
        let trimmed = line.trim();
        if trimmed.is_empty() {
            continue;
        }
        let value = trimmed.parse::<T>().map_err(|_| {
            RatesError::Other(format!(
                "{}:{}: not a number: '{}'",
                path.display(),
                line_number + 1,
                trimmed
            ))
        })?;
        values.push(value);
    }
    Ok(values)
}

/// Writes a `neurons.csv` listing every unit as unclassified.
///
/// Used after importing Neuroscope files, so that cell types and regions
/// can be filled in by hand.
pub fn write_neuron_template(path: &Path, trains: &[SpikeTrain]) -> Result<(), RatesError> {
    let mut writer = csv::Writer::from_path(path)?;
    writer.write_record(["id", "shank", "type", "region"])?;
    for train in trains {
        writer.write_record([
            train.id.to_string(),
            train.shank.to_string(),
            CellType::Unknown.to_string(),
            "unassigned".to_string(),
        ])?;
    }
    writer.flush()?;
    Ok(())
}

fn read_neuron_table(path: &Path) -> Result<Vec<NeuronRecord>, RatesError> {
    if !path.is_file() {
        return Err(RatesError::MissingFile(path.to_path_buf()));
    }
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;
    let mut records = Vec::new();
    for record in reader.deserialize() {
        records.push(record?);
    }
    Ok(records)
}

fn read_state_table(path: &Path) -> Result<HashMap<BrainState, IntervalSet>, RatesError> {
    if !path.is_file() {
        return Err(RatesError::MissingFile(path.to_path_buf()));
    }
    let mut reader = csv::ReaderBuilder::new().trim(csv::Trim::All).from_path(path)?;

    let mut intervals: HashMap<BrainState, Vec<(f64, f64)>> = HashMap::new();
    for record in reader.deserialize() {
        let record: StateRecord = record?;
        match record.state.parse::<BrainState>() {
            Ok(state) => intervals.entry(state).or_default().push((record.start, record.end)),
            Err(_) => warn!(
                "Skipping unknown state '{}' in {}",
                record.state,
                path.display()
            ),
        }
    }

    intervals
        .into_iter()
        .map(|(state, list)| Ok((state, IntervalSet::new(list)?)))
        .collect()
}

// Joins metadata rows with spike trains by unit id
fn attach_metadata(
    session_name: &str,
    records: Vec<NeuronRecord>,
    trains: Vec<SpikeTrain>,
    sample_rate: f32,
) -> Result<Vec<Neuron>, RatesError> {
    let mut trains_by_id: HashMap<u32, SpikeTrain> =
        trains.into_iter().map(|train| (train.id, train)).collect();

    let mut neurons = Vec::with_capacity(records.len());
    for record in records {
        let cell_type = record.cell_type.parse::<CellType>()?;
        let region = record.region.parse::<Region>()?;

        let (spike_times, train_shank) = match trains_by_id.remove(&record.id) {
            Some(train) => (train.times(sample_rate), Some(train.shank)),
            None => {
                warn!(
                    "Session {}: neuron {} has no spike train, treating it as silent",
                    session_name, record.id
                );
                (ndarray::Array1::zeros(0), None)
            }
        };

        neurons.push(Neuron {
            id: record.id,
            shank: record.shank.or(train_shank).unwrap_or(0),
            cell_type,
            region,
            spike_times,
        });
    }

    if !trains_by_id.is_empty() {
        let mut orphans: Vec<u32> = trains_by_id.keys().copied().collect();
        orphans.sort_unstable();
        warn!(
            "Session {}: dropping {} spike train{} without metadata: {:?}",
            session_name,
            orphans.len(),
            if orphans.len() != 1 { "s" } else { "" },
            orphans
        );
    }

    Ok(neurons)
}

// Helper function to print session summary
fn print_session_summary(name: &str, neurons: &[Neuron], states: &HashMap<BrainState, IntervalSet>) {
    info!(
        "Session {}: found {} neuron{}.",
        name,
        neurons.len(),
        if neurons.len() != 1 { "s" } else { "" }
    );

    for state in BrainState::ALL {
        match states.get(&state) {
            Some(set) => info!(
                "Session {}: {:.1} s of {} in {} interval{}.",
                name,
                set.tot_length(),
                state,
                set.len(),
                if set.len() != 1 { "s" } else { "" }
            ),
            None => debug!("Session {}: no {} intervals scored.", name, state),
        }
    }
}
