//! PNG rendering of rate comparisons, rate distributions and spike rasters.

use log::info;
use ndarray::Array1;
use plotters::prelude::*;
use std::error::Error;
use std::path::Path;

use crate::histogram::{histogram_counts, HistogramParams};
use crate::rates::StateRates;
use crate::types::{CellGroup, IntervalSet, Neuron};

const FIGURE_SIZE: (u32, u32) = (1200, 900);
const RASTER_SIZE: (u32, u32) = (1600, 700);
const POINT_ALPHA: f64 = 0.5;
const HISTOGRAM_ALPHA: f64 = 0.6;
const SHADE_ALPHA: f64 = 0.5;

// Draw order: gray cells underneath, then pyramidal, then interneurons
const DRAW_ORDER: [CellGroup; 3] = [CellGroup::Other, CellGroup::Pyramidal, CellGroup::Interneuron];

fn group_color(group: CellGroup) -> RGBColor {
    let (r, g, b) = group.rgb();
    RGBColor(r, g, b)
}

/// Pairs up the rates of the same neurons in two states.
///
/// Pairs where either rate is undefined or not positive are dropped, since
/// they cannot be placed on a log axis.
pub fn scatter_points(x: &Array1<f64>, y: &Array1<f64>) -> Vec<(f64, f64)> {
    x.iter()
        .zip(y.iter())
        .filter(|(a, b)| a.is_finite() && b.is_finite() && **a > 0.0 && **b > 0.0)
        .map(|(a, b)| (*a, *b))
        .collect()
}

/// Range for a log axis covering every positive finite value, padded by
/// half a decade on both sides. Falls back to `fallback` when no value
/// qualifies.
pub fn log_axis_range<I>(values: I, fallback: (f64, f64)) -> (f64, f64)
where
    I: IntoIterator<Item = f64>,
{
    let (min, max) = values
        .into_iter()
        .filter(|v| v.is_finite() && *v > 0.0)
        .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| (lo.min(v), hi.max(v)));

    if !min.is_finite() {
        return fallback;
    }

    let pad = 10f64.sqrt();
    (min / pad, max * pad)
}

/// Scatter plot of the rates in `x_rates` against those in `y_rates`, on
/// log-log axes, with an identity line.
///
/// Both arguments must come from the same call to
/// [`firing_rates_multiple_sessions`](crate::rates::firing_rates_multiple_sessions)
/// so that neurons line up.
pub fn render_scatter(out_path: &Path, x_rates: &StateRates, y_rates: &StateRates) -> Result<(), Box<dyn Error>> {
    let mut series = Vec::with_capacity(DRAW_ORDER.len());
    for group in DRAW_ORDER {
        let points = scatter_points(&x_rates.flatten(group), &y_rates.flatten(group));
        series.push((group, points));
    }

    let (lo, hi) = log_axis_range(
        series.iter().flat_map(|(_, pts)| pts.iter().flat_map(|&(a, b)| [a, b])),
        (0.1, 100.0),
    );

    let title = format!(
        "Firing rates at {} : {} vs {}",
        x_rates.region, x_rates.state, y_rates.state
    );

    let root = BitMapBackend::new(out_path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(&title, ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d((lo..hi).log_scale(), (lo..hi).log_scale())?;

    chart
        .configure_mesh()
        .x_desc(format!("{} rate (Hz)", x_rates.state))
        .y_desc(format!("{} rate (Hz)", y_rates.state))
        .draw()?;

    chart
        .draw_series(LineSeries::new(vec![(lo, lo), (hi, hi)], &BLACK))?
        .label("Identity line")
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &BLACK));

    for (group, points) in series {
        let color = group_color(group);
        chart
            .draw_series(
                points
                    .into_iter()
                    .map(move |(x, y)| Circle::new((x, y), 4, color.mix(POINT_ALPHA).filled())),
            )?
            .label(group.label())
            .legend(move |(x, y)| Circle::new((x + 10, y), 4, color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .position(SeriesLabelPosition::UpperLeft)
        .draw()?;

    root.present()?;
    info!("Wrote {}", out_path.display());
    Ok(())
}

/// Overlaid log-binned histograms of the rates of each cell group.
pub fn render_histogram(
    out_path: &Path,
    title: &str,
    rates: &StateRates,
    params: &HistogramParams,
) -> Result<(), Box<dyn Error>> {
    let edges = params.edges()?;

    let mut series = Vec::with_capacity(DRAW_ORDER.len());
    for group in DRAW_ORDER {
        series.push((group, histogram_counts(&rates.flatten(group), &edges)));
    }

    let y_max = series
        .iter()
        .flat_map(|(_, counts)| counts.iter().copied())
        .max()
        .unwrap_or(0)
        .max(1) as f64;

    let root = BitMapBackend::new(out_path, FIGURE_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d((params.lower..params.upper).log_scale(), 0.0f64..(y_max * 1.1))?;

    chart
        .configure_mesh()
        .x_desc("Firing rate (Hz)")
        .y_desc("Number of cells")
        .draw()?;

    for (group, counts) in series {
        let color = group_color(group);
        let bars: Vec<_> = counts
            .iter()
            .enumerate()
            .filter(|&(_, &count)| count > 0)
            .map(|(i, &count)| {
                Rectangle::new(
                    [(edges[i], 0.0), (edges[i + 1], count as f64)],
                    color.mix(HISTOGRAM_ALPHA).filled(),
                )
            })
            .collect();
        chart
            .draw_series(bars)?
            .label(group.label())
            .legend(move |(x, y)| Rectangle::new([(x, y - 5), (x + 15, y + 5)], color.filled()));
    }

    chart
        .configure_series_labels()
        .background_style(&WHITE.mix(0.8))
        .border_style(&BLACK)
        .draw()?;

    root.present()?;
    info!("Wrote {}", out_path.display());
    Ok(())
}

/// Spike raster of `neurons` between `start` and `end` seconds, one row per
/// neuron, with `shade` intervals drawn behind the spikes.
pub fn render_raster(
    out_path: &Path,
    title: &str,
    neurons: &[&Neuron],
    start: f64,
    end: f64,
    shade: Option<&IntervalSet>,
) -> Result<(), Box<dyn Error>> {
    if !(end > start) {
        return Err(format!("Raster window [{}, {}] is empty", start, end).into());
    }

    let window = IntervalSet::new(vec![(start, end)])?;
    let rows = neurons.len().max(1) as f64;

    let root = BitMapBackend::new(out_path, RASTER_SIZE).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(15)
        .x_label_area_size(50)
        .y_label_area_size(70)
        .build_cartesian_2d(start..end, -0.5f64..(rows - 0.5))?;

    chart
        .configure_mesh()
        .disable_y_mesh()
        .x_desc("Time(s)")
        .y_desc("Neurons")
        .draw()?;

    if let Some(intervals) = shade {
        let orange = RGBColor(255, 165, 0);
        chart.draw_series(intervals.clip(start, end).iter().map(|(s, e)| {
            Rectangle::new([(s, -0.5), (e, rows - 0.5)], orange.mix(SHADE_ALPHA).filled())
        }))?;
    }

    for (row, neuron) in neurons.iter().enumerate() {
        let y = row as f64;
        let spikes = window.restrict(&neuron.spike_times);
        chart.draw_series(
            spikes
                .iter()
                .map(|&t| PathElement::new(vec![(t, y - 0.5), (t, y + 0.5)], BLACK.stroke_width(1))),
        )?;
    }

    root.present()?;
    info!("Wrote {}", out_path.display());
    Ok(())
}
