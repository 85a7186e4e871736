use log::{debug, info};
use ndarray::Array1;

use crate::types::*;

/// Neurons of one session split into the three plotting groups.
///
/// Pyramidal cells and interneurons are taken from the requested region
/// only; unclassified units are kept whatever their region.
#[derive(Debug)]
pub struct GroupedNeurons<'a> {
    groups: [Vec<&'a Neuron>; 3],
}

impl<'a> GroupedNeurons<'a> {
    pub fn get(&self, group: CellGroup) -> &[&'a Neuron] {
        &self.groups[group.index()]
    }

    /// Total number of neurons across the three groups.
    pub fn len(&self) -> usize {
        self.groups.iter().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Splits the neurons of `session` by cell type and region.
pub fn categorize_types_regions<'a>(session: &'a Session, region: &Region) -> GroupedNeurons<'a> {
    let mut groups: [Vec<&Neuron>; 3] = Default::default();

    for neuron in &session.neurons {
        let group = match neuron.cell_type {
            CellType::Pyramidal if neuron.region == *region => CellGroup::Pyramidal,
            CellType::Interneuron if neuron.region == *region => CellGroup::Interneuron,
            CellType::Unknown => CellGroup::Other,
            _ => continue,
        };
        groups[group.index()].push(neuron);
    }

    debug!(
        "Session {} at {}: {} pyramidal, {} interneurons, {} other",
        session.name,
        region,
        groups[0].len(),
        groups[1].len(),
        groups[2].len()
    );

    GroupedNeurons { groups }
}

/// Mean firing rate of one neuron over a set of intervals, in Hz.
///
/// Returns NaN when there are no intervals to measure over (state not
/// scored, or scored with zero total length).
pub fn firing_rate(neuron: &Neuron, intervals: Option<&IntervalSet>) -> f64 {
    match intervals {
        Some(set) if set.tot_length() > 0.0 => set.count_in(&neuron.spike_times) as f64 / set.tot_length(),
        _ => f64::NAN,
    }
}

/// Mean firing rate of each neuron during the given state intervals.
pub fn firing_rate_per_state(neurons: &[&Neuron], intervals: Option<&IntervalSet>) -> Array1<f64> {
    neurons
        .iter()
        .map(|neuron| firing_rate(neuron, intervals))
        .collect()
}

/// Per-neuron rates for each of the three cell groups.
#[derive(Debug, Clone, PartialEq)]
pub struct GroupRates {
    rates: [Array1<f64>; 3],
}

impl GroupRates {
    pub fn new(pyramidal: Array1<f64>, interneurons: Array1<f64>, other: Array1<f64>) -> Self {
        GroupRates {
            rates: [pyramidal, interneurons, other],
        }
    }

    pub fn get(&self, group: CellGroup) -> &Array1<f64> {
        &self.rates[group.index()]
    }

    /// Number of neurons across the three groups.
    pub fn len(&self) -> usize {
        self.rates.iter().map(|r| r.len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// Rates of one session, grouped by cell type.
#[derive(Debug, Clone)]
pub struct SessionRates {
    /// Session name
    pub session: String,
    /// Per-group rates
    pub groups: GroupRates,
}

/// Rates during one brain state for a list of sessions.
///
/// Indexed as session, then cell group, then neuron.
#[derive(Debug, Clone)]
pub struct StateRates {
    /// State the rates were measured in
    pub state: BrainState,
    /// Region the pyramidal and interneuron groups were taken from
    pub region: Region,
    /// One entry per session, in input order
    pub sessions: Vec<SessionRates>,
}

impl StateRates {
    /// Concatenates the rates of one group across all sessions.
    pub fn flatten(&self, group: CellGroup) -> Array1<f64> {
        self.sessions
            .iter()
            .flat_map(|s| s.groups.get(group).iter())
            .copied()
            .collect()
    }

    /// Flattens every group at once.
    pub fn flatten_all(&self) -> GroupRates {
        GroupRates::new(
            self.flatten(CellGroup::Pyramidal),
            self.flatten(CellGroup::Interneuron),
            self.flatten(CellGroup::Other),
        )
    }

    /// Number of neurons across all sessions and groups.
    pub fn num_neurons(&self) -> usize {
        self.sessions.iter().map(|s| s.groups.len()).sum()
    }
}

/// Rates of every cell group of `session` during two states.
pub fn firing_rates_per_state_per_type(
    session: &Session,
    states: [BrainState; 2],
    region: &Region,
) -> (GroupRates, GroupRates) {
    let grouped = categorize_types_regions(session, region);

    let per_state = |state: BrainState| {
        let intervals = session.state(state);
        if intervals.is_none() {
            debug!("Session {} has no {} intervals", session.name, state);
        }
        GroupRates::new(
            firing_rate_per_state(grouped.get(CellGroup::Pyramidal), intervals),
            firing_rate_per_state(grouped.get(CellGroup::Interneuron), intervals),
            firing_rate_per_state(grouped.get(CellGroup::Other), intervals),
        )
    };

    (per_state(states[0]), per_state(states[1]))
}

/// Rates of every cell group during two states, for every session.
///
/// # Examples
///
/// ```no_run
/// use state_rates::{load_sessions, BrainState, CellGroup, Region};
/// use state_rates::rates::firing_rates_multiple_sessions;
///
/// let sessions = load_sessions(&["/data/Rat08-20130708"]).unwrap();
/// let (wake, sws) =
///     firing_rates_multiple_sessions(&sessions, [BrainState::Wake, BrainState::Sws], &Region::Hpc);
/// println!("{} pyramidal cells", wake.flatten(CellGroup::Pyramidal).len());
/// # let _ = sws;
/// ```
pub fn firing_rates_multiple_sessions(
    sessions: &[Session],
    states: [BrainState; 2],
    region: &Region,
) -> (StateRates, StateRates) {
    let mut first = StateRates {
        state: states[0],
        region: region.clone(),
        sessions: Vec::with_capacity(sessions.len()),
    };
    let mut second = StateRates {
        state: states[1],
        region: region.clone(),
        sessions: Vec::with_capacity(sessions.len()),
    };

    for session in sessions {
        let (rates0, rates1) = firing_rates_per_state_per_type(session, states, region);
        first.sessions.push(SessionRates {
            session: session.name.clone(),
            groups: rates0,
        });
        second.sessions.push(SessionRates {
            session: session.name.clone(),
            groups: rates1,
        });
    }

    info!(
        "Computed {} vs {} rates at {} for {} neuron{} in {} session{}",
        states[0],
        states[1],
        region,
        first.num_neurons(),
        if first.num_neurons() != 1 { "s" } else { "" },
        sessions.len(),
        if sessions.len() != 1 { "s" } else { "" }
    );

    (first, second)
}

/// Descriptive statistics of one group's rates.
#[derive(Debug, Clone, PartialEq)]
pub struct RateSummary {
    pub group: CellGroup,
    /// Number of neurons in the group
    pub count: usize,
    /// Number of neurons with a defined (non-NaN) rate
    pub defined: usize,
    /// Mean of the defined rates, NaN if none
    pub mean: f64,
    /// Median of the defined rates, NaN if none
    pub median: f64,
}

impl RateSummary {
    pub fn from_rates(group: CellGroup, rates: &Array1<f64>) -> Self {
        let mut defined: Vec<f64> = rates.iter().copied().filter(|r| !r.is_nan()).collect();
        defined.sort_by(f64::total_cmp);

        let n = defined.len();
        let mean = if n == 0 {
            f64::NAN
        } else {
            defined.iter().sum::<f64>() / n as f64
        };
        let median = match n {
            0 => f64::NAN,
            _ if n % 2 == 1 => defined[n / 2],
            _ => (defined[n / 2 - 1] + defined[n / 2]) / 2.0,
        };

        RateSummary {
            group,
            count: rates.len(),
            defined: n,
            mean,
            median,
        }
    }
}

/// Summaries of all three groups across every session of `rates`.
pub fn summarize(rates: &StateRates) -> Vec<RateSummary> {
    CellGroup::ALL
        .iter()
        .map(|&group| RateSummary::from_rates(group, &rates.flatten(group)))
        .collect()
}
