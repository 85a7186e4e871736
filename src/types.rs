use ndarray::Array1;
use std::collections::HashMap;
use std::error::Error;
use std::fmt;
use std::io;
use std::path::PathBuf;
use std::str::FromStr;

/// Physiological class of a sorted unit, as labelled in the session metadata.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellType {
    /// Putative pyramidal cell (`Pyr`)
    Pyramidal,
    /// Putative interneuron (`Int`)
    Interneuron,
    /// Unclassified unit (`Unk`)
    Unknown,
}

impl FromStr for CellType {
    type Err = RatesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "pyr" | "pyramidal" => Ok(CellType::Pyramidal),
            "int" | "interneuron" => Ok(CellType::Interneuron),
            "unk" | "unknown" => Ok(CellType::Unknown),
            _ => Err(RatesError::InvalidLabel {
                kind: "cell type",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for CellType {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            CellType::Pyramidal => write!(f, "Pyr"),
            CellType::Interneuron => write!(f, "Int"),
            CellType::Unknown => write!(f, "Unk"),
        }
    }
}

/// Brain structure a unit was recorded from.
///
/// The analysis targets the hippocampus and the basolateral amygdala; any
/// other label found in the metadata is preserved verbatim.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Region {
    /// Hippocampus (`Hpc`)
    Hpc,
    /// Basolateral amygdala (`BLA`)
    Bla,
    /// Any other structure label
    Other(String),
}

impl FromStr for Region {
    type Err = RatesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        if trimmed.is_empty() {
            return Err(RatesError::InvalidLabel {
                kind: "region",
                value: s.to_string(),
            });
        }
        match trimmed.to_ascii_lowercase().as_str() {
            "hpc" => Ok(Region::Hpc),
            "bla" => Ok(Region::Bla),
            _ => Ok(Region::Other(trimmed.to_string())),
        }
    }
}

impl Region {
    /// Whether cells of this region are split into pyramidal and interneuron groups.
    pub fn is_recorded(&self) -> bool {
        matches!(self, Region::Hpc | Region::Bla)
    }
}

impl fmt::Display for Region {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Region::Hpc => write!(f, "Hpc"),
            Region::Bla => write!(f, "BLA"),
            Region::Other(name) => write!(f, "{}", name),
        }
    }
}

/// Vigilance state scored for a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BrainState {
    /// Active or quiet wakefulness
    Wake,
    /// Slow-wave (non-REM) sleep
    Sws,
    /// Rapid eye movement sleep
    Rem,
    /// Drowsiness, between wake and sleep
    Drowsy,
}

impl BrainState {
    /// All states in scoring order.
    pub const ALL: [BrainState; 4] = [
        BrainState::Wake,
        BrainState::Sws,
        BrainState::Rem,
        BrainState::Drowsy,
    ];
}

impl FromStr for BrainState {
    type Err = RatesError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "wake" => Ok(BrainState::Wake),
            "sws" | "nrem" => Ok(BrainState::Sws),
            "rem" => Ok(BrainState::Rem),
            "drowsy" => Ok(BrainState::Drowsy),
            _ => Err(RatesError::InvalidLabel {
                kind: "brain state",
                value: s.to_string(),
            }),
        }
    }
}

impl fmt::Display for BrainState {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            BrainState::Wake => write!(f, "wake"),
            BrainState::Sws => write!(f, "sws"),
            BrainState::Rem => write!(f, "Rem"),
            BrainState::Drowsy => write!(f, "drowsy"),
        }
    }
}

/// The three disjoint groups neurons are split into for plotting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CellGroup {
    Pyramidal,
    Interneuron,
    Other,
}

impl CellGroup {
    /// Groups in storage order.
    pub const ALL: [CellGroup; 3] = [CellGroup::Pyramidal, CellGroup::Interneuron, CellGroup::Other];

    /// Position of the group inside per-group arrays.
    pub fn index(self) -> usize {
        match self {
            CellGroup::Pyramidal => 0,
            CellGroup::Interneuron => 1,
            CellGroup::Other => 2,
        }
    }

    /// Legend label.
    pub fn label(self) -> &'static str {
        match self {
            CellGroup::Pyramidal => "Pyramidal",
            CellGroup::Interneuron => "Interneurons",
            CellGroup::Other => "Other",
        }
    }

    /// Plot colour as RGB (red, blue, gray).
    pub fn rgb(self) -> (u8, u8, u8) {
        match self {
            CellGroup::Pyramidal => (255, 0, 0),
            CellGroup::Interneuron => (0, 0, 255),
            CellGroup::Other => (128, 128, 128),
        }
    }
}

/// A set of closed time intervals, in seconds.
///
/// Intervals are kept sorted by start time and never overlap: construction
/// merges any intervals that touch or overlap.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct IntervalSet {
    intervals: Vec<(f64, f64)>,
}

impl IntervalSet {
    /// Builds a set from `(start, end)` pairs in seconds.
    ///
    /// Returns an error if any bound is not finite or if `end < start`.
    pub fn new(mut intervals: Vec<(f64, f64)>) -> Result<Self, RatesError> {
        for &(start, end) in &intervals {
            if !start.is_finite() || !end.is_finite() || end < start {
                return Err(RatesError::InvalidInterval { start, end });
            }
        }

        intervals.sort_by(|a, b| a.0.total_cmp(&b.0));

        let mut merged: Vec<(f64, f64)> = Vec::with_capacity(intervals.len());
        for (start, end) in intervals {
            match merged.last_mut() {
                Some(last) if start <= last.1 => last.1 = last.1.max(end),
                _ => merged.push((start, end)),
            }
        }

        Ok(IntervalSet { intervals: merged })
    }

    /// An interval set with no intervals.
    pub fn empty() -> Self {
        IntervalSet::default()
    }

    pub fn len(&self) -> usize {
        self.intervals.len()
    }

    pub fn is_empty(&self) -> bool {
        self.intervals.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        self.intervals.iter().copied()
    }

    /// Total duration covered by the set, in seconds.
    pub fn tot_length(&self) -> f64 {
        self.intervals.iter().map(|(start, end)| end - start).sum()
    }

    /// Returns true if `t` falls inside one of the intervals (bounds included).
    pub fn contains(&self, t: f64) -> bool {
        let idx = self.intervals.partition_point(|&(start, _)| start <= t);
        idx > 0 && t <= self.intervals[idx - 1].1
    }

    /// Keeps only the spike times that fall inside the set.
    pub fn restrict(&self, spike_times: &Array1<f64>) -> Array1<f64> {
        spike_times
            .iter()
            .copied()
            .filter(|&t| self.contains(t))
            .collect()
    }

    /// Number of spike times that fall inside the set.
    pub fn count_in(&self, spike_times: &Array1<f64>) -> usize {
        spike_times.iter().filter(|&&t| self.contains(t)).count()
    }

    /// Clips the set to the window `[start, end]`.
    pub fn clip(&self, start: f64, end: f64) -> IntervalSet {
        let intervals = self
            .intervals
            .iter()
            .filter(|&&(s, e)| e >= start && s <= end)
            .map(|&(s, e)| (s.max(start), e.min(end)))
            .collect();
        IntervalSet { intervals }
    }
}

/// Version information for the spike file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Version {
    /// Major version number
    pub major: i32,
    /// Minor version number
    pub minor: i32,
}

/// Spike samples of one unit as stored on disk, before metadata is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct SpikeTrain {
    /// Unit identifier
    pub id: u32,
    /// Electrode shank the unit was sorted on
    pub shank: u32,
    /// Spike times as sample indices
    pub samples: Vec<u64>,
}

impl SpikeTrain {
    /// Converts sample indices to sorted spike times in seconds.
    pub fn times(&self, sample_rate: f32) -> Array1<f64> {
        let mut times: Vec<f64> = self
            .samples
            .iter()
            .map(|&s| s as f64 / sample_rate as f64)
            .collect();
        times.sort_by(f64::total_cmp);
        Array1::from(times)
    }
}

/// Contents of a binary spike file.
#[derive(Debug, Clone)]
pub struct SpikeFile {
    /// File format version
    pub version: Version,
    /// Sample rate of the spike sample indices (Hz)
    pub sample_rate: f32,
    /// One train per unit, in file order
    pub trains: Vec<SpikeTrain>,
}

/// A single sorted unit with its metadata and spike train.
#[derive(Debug, Clone)]
pub struct Neuron {
    /// Identifier shared by the metadata table and the spike file
    pub id: u32,
    /// Electrode shank the unit was sorted on
    pub shank: u32,
    /// Physiological class
    pub cell_type: CellType,
    /// Recording location
    pub region: Region,
    /// Spike times in seconds, sorted ascending
    pub spike_times: Array1<f64>,
}

impl Neuron {
    pub fn num_spikes(&self) -> usize {
        self.spike_times.len()
    }
}

/// Everything loaded from one session directory.
///
/// # Examples
///
/// ```no_run
/// use state_rates::{load_session, BrainState};
///
/// let session = load_session("/data/Rat08/Rat08-20130708").unwrap();
/// if let Some(rem) = session.state(BrainState::Rem) {
///     println!("{} s of REM sleep", rem.tot_length());
/// }
/// ```
#[derive(Debug, Clone)]
pub struct Session {
    /// Session name (the directory's base name)
    pub name: String,
    /// Directory the session was loaded from
    pub path: PathBuf,
    /// Sample rate the spike times were converted with (Hz)
    pub sample_rate: f32,
    /// All units of the session, in metadata order
    pub neurons: Vec<Neuron>,
    /// Scored intervals for each brain state present in the session
    pub states: HashMap<BrainState, IntervalSet>,
}

impl Session {
    /// Returns the intervals scored as `state`, if any were scored.
    pub fn state(&self, state: BrainState) -> Option<&IntervalSet> {
        self.states.get(&state)
    }

    pub fn num_neurons(&self) -> usize {
        self.neurons.len()
    }

    /// Time of the last spike or last scored interval end, in seconds.
    pub fn duration(&self) -> f64 {
        let last_spike = self
            .neurons
            .iter()
            .filter_map(|n| n.spike_times.last().copied())
            .fold(0.0f64, f64::max);
        let last_state = self
            .states
            .values()
            .filter_map(|set| set.iter().last().map(|(_, end)| end))
            .fold(0.0f64, f64::max);
        last_spike.max(last_state)
    }
}

/// Error types for session loading and rate analysis.
#[derive(Debug)]
pub enum RatesError {
    /// The spike file does not start with the expected magic number
    UnrecognizedFileFormat,
    /// The spike file was written by an unsupported format version
    UnsupportedVersion(i32, i32),
    /// The spike file is truncated or has trailing bytes
    FileSizeError,
    /// A required session file is missing
    MissingFile(PathBuf),
    /// A label in a metadata or state table could not be parsed
    InvalidLabel { kind: &'static str, value: String },
    /// An interval with non-finite bounds or with end before start
    InvalidInterval { start: f64, end: f64 },
    /// Histogram bounds or bin count are unusable
    InvalidHistogram(String),
    /// The analysis configuration is inconsistent
    InvalidConfig(String),
    /// An I/O error occurred
    IoError(io::Error),
    /// A CSV table could not be read
    CsvError(csv::Error),
    /// The configuration file is not valid TOML
    TomlError(toml::de::Error),
    /// A general error with a custom message
    Other(String),
}

impl fmt::Display for RatesError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            RatesError::UnrecognizedFileFormat => write!(f, "Unrecognized spike file format"),
            RatesError::UnsupportedVersion(major, minor) => {
                write!(f, "Unsupported spike file version {}.{}", major, minor)
            }
            RatesError::FileSizeError => write!(f, "File size error"),
            RatesError::MissingFile(path) => write!(f, "Missing file: {}", path.display()),
            RatesError::InvalidLabel { kind, value } => {
                write!(f, "Invalid {} label: '{}'", kind, value)
            }
            RatesError::InvalidInterval { start, end } => {
                write!(f, "Invalid interval [{}, {}]", start, end)
            }
            RatesError::InvalidHistogram(msg) => write!(f, "Invalid histogram parameters: {}", msg),
            RatesError::InvalidConfig(msg) => write!(f, "Invalid configuration: {}", msg),
            RatesError::IoError(e) => write!(f, "IO error: {}", e),
            RatesError::CsvError(e) => write!(f, "CSV error: {}", e),
            RatesError::TomlError(e) => write!(f, "TOML error: {}", e),
            RatesError::Other(msg) => write!(f, "{}", msg),
        }
    }
}

impl Error for RatesError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            RatesError::IoError(e) => Some(e),
            RatesError::CsvError(e) => Some(e),
            RatesError::TomlError(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for RatesError {
    fn from(error: io::Error) -> Self {
        RatesError::IoError(error)
    }
}

impl From<csv::Error> for RatesError {
    fn from(error: csv::Error) -> Self {
        RatesError::CsvError(error)
    }
}

impl From<toml::de::Error> for RatesError {
    fn from(error: toml::de::Error) -> Self {
        RatesError::TomlError(error)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn labels_parse_case_insensitively() {
        assert_eq!("Pyr".parse::<CellType>().unwrap(), CellType::Pyramidal);
        assert_eq!("int".parse::<CellType>().unwrap(), CellType::Interneuron);
        assert_eq!("UNK".parse::<CellType>().unwrap(), CellType::Unknown);
        assert!("glia".parse::<CellType>().is_err());

        assert_eq!("BLA".parse::<Region>().unwrap(), Region::Bla);
        assert_eq!("hpc".parse::<Region>().unwrap(), Region::Hpc);
        assert_eq!(
            "Pir".parse::<Region>().unwrap(),
            Region::Other("Pir".to_string())
        );

        assert_eq!("Rem".parse::<BrainState>().unwrap(), BrainState::Rem);
        assert_eq!("REM".parse::<BrainState>().unwrap(), BrainState::Rem);
        assert_eq!("sws".parse::<BrainState>().unwrap(), BrainState::Sws);
        assert!("awake".parse::<BrainState>().is_err());
    }

    #[test]
    fn only_hpc_and_bla_are_recorded_regions() {
        assert!(Region::Hpc.is_recorded());
        assert!(Region::Bla.is_recorded());
        assert!(!"Hcp".parse::<Region>().unwrap().is_recorded());
    }

    #[test]
    fn state_display_round_trips() {
        for state in BrainState::ALL {
            assert_eq!(state.to_string().parse::<BrainState>().unwrap(), state);
        }
    }

    #[test]
    fn intervals_are_sorted_and_merged() {
        let set = IntervalSet::new(vec![(10.0, 12.0), (0.0, 2.0), (1.5, 3.0), (12.0, 13.0)]).unwrap();
        let intervals: Vec<_> = set.iter().collect();
        assert_eq!(intervals, vec![(0.0, 3.0), (10.0, 13.0)]);
        assert_eq!(set.tot_length(), 6.0);
    }

    #[test]
    fn reversed_interval_is_rejected() {
        assert!(matches!(
            IntervalSet::new(vec![(5.0, 4.0)]),
            Err(RatesError::InvalidInterval { .. })
        ));
        assert!(IntervalSet::new(vec![(f64::NAN, 1.0)]).is_err());
    }

    #[test]
    fn restrict_keeps_spikes_on_bounds() {
        let set = IntervalSet::new(vec![(1.0, 2.0), (5.0, 6.0)]).unwrap();
        let spikes = array![0.5, 1.0, 1.5, 2.0, 3.0, 5.5, 6.5];
        assert_eq!(set.restrict(&spikes), array![1.0, 1.5, 2.0, 5.5]);
        assert_eq!(set.count_in(&spikes), 4);
        assert_eq!(IntervalSet::empty().count_in(&spikes), 0);
    }

    #[test]
    fn clip_trims_to_window() {
        let set = IntervalSet::new(vec![(0.0, 4.0), (6.0, 8.0), (20.0, 30.0)]).unwrap();
        let clipped: Vec<_> = set.clip(2.0, 7.0).iter().collect();
        assert_eq!(clipped, vec![(2.0, 4.0), (6.0, 7.0)]);
    }
}
