use log::warn;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::histogram::HistogramParams;
use crate::reader::{self, LoadOptions, DEFAULT_SAMPLE_RATE};
use crate::types::{BrainState, RatesError, Region};

/// One region and pair of states to compare.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Comparison {
    /// Region label, e.g. `Hpc` or `BLA`
    pub region: String,
    /// Two state labels; the first goes on the x axis of the scatter plot
    pub states: [String; 2],
}

impl Comparison {
    pub fn new(region: &str, first: &str, second: &str) -> Self {
        Comparison {
            region: region.to_string(),
            states: [first.to_string(), second.to_string()],
        }
    }

    pub fn region(&self) -> Result<Region, RatesError> {
        let region: Region = self.region.parse()?;
        if !region.is_recorded() {
            warn!(
                "Comparison region '{}' is neither Hpc nor BLA, only unclassified cells will be found",
                region
            );
        }
        Ok(region)
    }

    /// Parses both states, rejecting a pair that names the same state twice.
    pub fn states(&self) -> Result<[BrainState; 2], RatesError> {
        let first: BrainState = self.states[0].parse()?;
        let second: BrainState = self.states[1].parse()?;
        if first == second {
            return Err(RatesError::InvalidConfig(format!(
                "comparison at {} uses {} twice",
                self.region, first
            )));
        }
        Ok([first, second])
    }
}

/// Analysis settings read from a TOML file.
///
/// ```toml
/// sessions_file = "sessions.txt"
/// output_dir = "plots"
///
/// [[comparison]]
/// region = "Hpc"
/// states = ["wake", "sws"]
///
/// [histogram]
/// bin_edges = 50
/// lower = 0.1
/// upper = 100.0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisConfig {
    /// Session directories listed inline
    #[serde(default)]
    pub sessions: Vec<PathBuf>,
    /// File listing session directories, one per line
    #[serde(default)]
    pub sessions_file: Option<PathBuf>,
    /// Directory the plots are written to
    #[serde(default = "AnalysisConfig::default_output_dir")]
    pub output_dir: PathBuf,
    /// Sample rate for sessions stored as Neuroscope text files (Hz)
    #[serde(default = "AnalysisConfig::default_sample_rate")]
    pub sample_rate: f32,
    #[serde(default = "AnalysisConfig::default_comparisons", rename = "comparison")]
    pub comparisons: Vec<Comparison>,
    #[serde(default)]
    pub histogram: HistogramParams,
}

impl AnalysisConfig {
    fn default_output_dir() -> PathBuf {
        PathBuf::from("plots")
    }
    fn default_sample_rate() -> f32 {
        DEFAULT_SAMPLE_RATE
    }
    fn default_comparisons() -> Vec<Comparison> {
        let mut comparisons = Vec::new();
        for region in ["Hpc", "BLA"] {
            comparisons.push(Comparison::new(region, "wake", "sws"));
            comparisons.push(Comparison::new(region, "wake", "Rem"));
        }
        comparisons
    }

    /// Reads and validates a configuration file.
    ///
    /// Relative session and output paths are resolved against the
    /// directory holding the configuration file.
    pub fn load(path: &Path) -> Result<Self, RatesError> {
        if !path.is_file() {
            return Err(RatesError::MissingFile(path.to_path_buf()));
        }
        let contents = fs::read_to_string(path)?;
        let mut config: AnalysisConfig = toml::from_str(&contents)?;

        let base = path.parent().unwrap_or_else(|| Path::new(""));
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        let resolve = |p: &PathBuf| if p.is_absolute() { p.clone() } else { base.join(p) };
        self.sessions = self.sessions.iter().map(resolve).collect();
        self.sessions_file = self.sessions_file.as_ref().map(resolve);
        self.output_dir = resolve(&self.output_dir);
    }

    /// Checks every comparison and the histogram parameters.
    pub fn validate(&self) -> Result<(), RatesError> {
        if self.sessions.is_empty() && self.sessions_file.is_none() {
            return Err(RatesError::InvalidConfig(
                "no sessions given, set `sessions` or `sessions_file`".to_string(),
            ));
        }
        if !(self.sample_rate.is_finite() && self.sample_rate > 0.0) {
            return Err(RatesError::InvalidConfig(format!(
                "sample rate must be positive, got {}",
                self.sample_rate
            )));
        }
        for comparison in &self.comparisons {
            comparison.region()?;
            comparison.states()?;
        }
        self.histogram.validate()
    }

    /// Inline sessions followed by those listed in `sessions_file`.
    pub fn session_paths(&self) -> Result<Vec<PathBuf>, RatesError> {
        let mut paths = self.sessions.clone();
        if let Some(list) = &self.sessions_file {
            paths.extend(reader::read_session_list(list)?);
        }
        Ok(paths)
    }

    pub fn load_options(&self) -> LoadOptions {
        LoadOptions {
            sample_rate: self.sample_rate,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_reproduce_driver_comparisons() {
        let config: AnalysisConfig = toml::from_str(r#"sessions = ["/data/Rat08-20130708"]"#).unwrap();
        config.validate().unwrap();
        assert_eq!(config.comparisons.len(), 4);
        assert_eq!(config.comparisons[0], Comparison::new("Hpc", "wake", "sws"));
        assert_eq!(config.comparisons[3], Comparison::new("BLA", "wake", "Rem"));
        assert_eq!(config.histogram, HistogramParams::default());
        assert_eq!(config.output_dir, PathBuf::from("plots"));
        assert_eq!(config.sample_rate, 20_000.0);
    }

    #[test]
    fn explicit_comparisons_and_histogram() {
        let config: AnalysisConfig = toml::from_str(
            r#"
            sessions = ["a", "b"]
            output_dir = "out"

            [[comparison]]
            region = "BLA"
            states = ["sws", "drowsy"]

            [histogram]
            bin_edges = 20
            upper = 50.0
            "#,
        )
        .unwrap();
        config.validate().unwrap();
        assert_eq!(config.comparisons.len(), 1);
        assert_eq!(
            config.comparisons[0].states().unwrap(),
            [BrainState::Sws, BrainState::Drowsy]
        );
        assert_eq!(config.comparisons[0].region().unwrap(), Region::Bla);
        assert_eq!(config.histogram.bin_edges, 20);
        assert_eq!(config.histogram.lower, 0.1);
        assert_eq!(config.histogram.upper, 50.0);
    }

    #[test]
    fn same_state_twice_is_invalid() {
        let comparison = Comparison::new("Hpc", "wake", "Wake");
        assert!(matches!(comparison.states(), Err(RatesError::InvalidConfig(_))));
    }

    #[test]
    fn missing_sessions_is_invalid() {
        let config: AnalysisConfig = toml::from_str("output_dir = \"out\"").unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn bad_histogram_is_invalid() {
        let config: AnalysisConfig = toml::from_str(
            r#"
            sessions = ["a"]
            [histogram]
            lower = 0.0
            "#,
        )
        .unwrap();
        assert!(matches!(config.validate(), Err(RatesError::InvalidHistogram(_))));
    }
}
