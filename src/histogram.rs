use ndarray::Array1;
use serde::{Deserialize, Serialize};

use crate::types::RatesError;

/// Log-scale binning used for firing rate distributions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct HistogramParams {
    /// Number of bin edges; the histogram has one bin fewer
    #[serde(default = "HistogramParams::default_bin_edges")]
    pub bin_edges: usize,
    /// Lowest edge (Hz)
    #[serde(default = "HistogramParams::default_lower")]
    pub lower: f64,
    /// Highest edge (Hz)
    #[serde(default = "HistogramParams::default_upper")]
    pub upper: f64,
}

impl HistogramParams {
    fn default_bin_edges() -> usize {
        50
    }
    fn default_lower() -> f64 {
        0.1
    }
    fn default_upper() -> f64 {
        100.0
    }

    /// Checks the bounds and edge count.
    pub fn validate(&self) -> Result<(), RatesError> {
        if !(self.lower.is_finite() && self.lower > 0.0) {
            return Err(RatesError::InvalidHistogram(format!(
                "lower bound must be positive, got {}",
                self.lower
            )));
        }
        if !(self.upper.is_finite() && self.upper > self.lower) {
            return Err(RatesError::InvalidHistogram(format!(
                "upper bound {} must exceed lower bound {}",
                self.upper, self.lower
            )));
        }
        if self.bin_edges < 2 {
            return Err(RatesError::InvalidHistogram(format!(
                "need at least 2 bin edges, got {}",
                self.bin_edges
            )));
        }
        Ok(())
    }

    /// Edges for these parameters, see [`log_bin_edges`].
    pub fn edges(&self) -> Result<Array1<f64>, RatesError> {
        log_bin_edges(self.lower, self.upper, self.bin_edges)
    }
}

impl Default for HistogramParams {
    fn default() -> Self {
        Self {
            bin_edges: Self::default_bin_edges(),
            lower: Self::default_lower(),
            upper: Self::default_upper(),
        }
    }
}

/// Returns `n` edges spaced evenly in log10 between `lower` and `upper`.
///
/// Both bounds are included exactly. The edges depend only on the bounds,
/// never on the data being binned.
pub fn log_bin_edges(lower: f64, upper: f64, n: usize) -> Result<Array1<f64>, RatesError> {
    HistogramParams {
        bin_edges: n,
        lower,
        upper,
    }
    .validate()?;

    let mut edges = Array1::logspace(10.0, lower.log10(), upper.log10(), n);
    // Pin the ends so rounding in powf cannot push them off the bounds
    edges[0] = lower;
    edges[n - 1] = upper;
    Ok(edges)
}

/// Counts values per bin.
///
/// Bins are half-open `[e_i, e_{i+1})` except the last one, which also
/// includes its upper edge. NaN and values outside the edges are ignored.
pub fn histogram_counts(values: &Array1<f64>, edges: &Array1<f64>) -> Vec<usize> {
    let num_bins = edges.len().saturating_sub(1);
    let mut counts = vec![0usize; num_bins];
    if num_bins == 0 {
        return counts;
    }

    let (first, last) = (edges[0], edges[num_bins]);
    let edges = edges.to_vec();

    for &value in values.iter() {
        if value.is_nan() || value < first || value > last {
            continue;
        }
        // Number of edges <= value, minus one, is the bin index
        let bin = edges.partition_point(|&e| e <= value).saturating_sub(1).min(num_bins - 1);
        counts[bin] += 1;
    }

    counts
}
