/// Hits, misses and false alarms for one observed/predicted pair, and the
/// parallel driver that produces a `LabeledTable<Hits>` over every station
/// and criterion combination.

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::iter::Sum;
use std::ops::Add;
use std::sync::{Arc, mpsc};
use threadpool::ThreadPool;

use crate::analysis::groupings::Season;
use crate::criteria::persistence::{LeadtimeSelection, exceedance_to_events};
use crate::error::{Result, SkillError};
use crate::exceedance::grid::{ExceedanceArray, TimeAxis};
use crate::model::{Coord, Dim, Persistence};
use crate::scoring::buffer::{BufferWindow, EventFlag, count_events};
use crate::series::EventTable;
use crate::table::{Coords, LabeledTable, Row};

/// Contingency counts. `hits + misses` is the number of observed events.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Hits {
    #[serde(rename = "TP")]
    pub hits: u64,
    #[serde(rename = "FN")]
    pub misses: u64,
    #[serde(rename = "FP")]
    pub false_alarms: u64,
}

impl Hits {
    pub fn new(hits: u64, misses: u64, false_alarms: u64) -> Self {
        Self {
            hits,
            misses,
            false_alarms,
        }
    }

    pub fn observed(&self) -> u64 {
        self.hits + self.misses
    }

    pub fn predicted(&self) -> u64 {
        self.hits + self.false_alarms
    }
}

impl Add for Hits {
    type Output = Hits;

    fn add(self, rhs: Hits) -> Hits {
        Hits {
            hits: self.hits + rhs.hits,
            misses: self.misses + rhs.misses,
            false_alarms: self.false_alarms + rhs.false_alarms,
        }
    }
}

impl Sum for Hits {
    fn sum<I: Iterator<Item = Hits>>(iter: I) -> Hits {
        iter.fold(Hits::default(), Add::add)
    }
}

/// Which series the predicted-event count is taken from.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictedCount {
    /// Count onsets of the buffered prediction.
    #[default]
    Buffered,
    /// Count onsets of the raw prediction.
    Raw,
}

/// Hits plus the intermediate series they were derived from.
#[derive(Debug, Clone, PartialEq)]
pub struct HitsBreakdown {
    pub hits: Hits,
    /// Prediction after the tolerance window.
    pub buffered: Vec<u8>,
    /// Buffered prediction masked by the observation.
    pub true_positives: Vec<u8>,
}

/// Scores one predicted series against one observed series.
pub fn events_to_hits<O: EventFlag, P: EventFlag>(
    observed: &[O],
    predicted: &[P],
    buffer: BufferWindow,
    count: PredictedCount,
) -> Result<HitsBreakdown> {
    if observed.len() != predicted.len() {
        return Err(SkillError::ShapeMismatch {
            what: "observed vs predicted series".to_string(),
            expected: observed.len(),
            found: predicted.len(),
        });
    }

    let buffered = buffer.apply(predicted);
    let true_positives: Vec<u8> = observed
        .iter()
        .zip(&buffered)
        .map(|(o, b)| u8::from(o.state() == Some(true) && *b == 1))
        .collect();

    let n_obs = count_events(observed);
    let n_pred = match count {
        PredictedCount::Buffered => count_events(&buffered),
        PredictedCount::Raw => count_events(predicted),
    };
    let tp = count_events(&true_positives).min(n_obs);

    Ok(HitsBreakdown {
        hits: Hits::new(tp, n_obs - tp, n_pred.saturating_sub(tp)),
        buffered,
        true_positives,
    })
}

// ---------------------------------------------------------------------------
// Whole-grid scoring
// ---------------------------------------------------------------------------

/// Criteria grid evaluated by `compute_hits`.
#[derive(Debug, Clone)]
pub struct HitsOptions {
    pub probabilities: Vec<f64>,
    pub persistences: Vec<Persistence>,
    pub leadtime: LeadtimeSelection,
    pub buffer: BufferWindow,
    pub predicted_count: PredictedCount,
    pub seasonal: bool,
    pub workers: usize,
}

impl HitsOptions {
    pub fn validate(&self) -> Result<()> {
        if self.probabilities.is_empty() {
            return Err(SkillError::config("probabilities", "at least one value is required"));
        }
        if let Some(p) = self.probabilities.iter().find(|p| !(0.0..=1.0).contains(*p)) {
            return Err(SkillError::config("probabilities", format!("{} is outside [0, 1]", p)));
        }
        if self.persistences.is_empty() {
            return Err(SkillError::config("persistence", "at least one pair is required"));
        }
        if self.workers == 0 {
            return Err(SkillError::config("workers", "must be at least 1"));
        }
        self.leadtime.validate()
    }
}

/// Runs prediction and scoring for every station × model × probability ×
/// persistence × leadtime bucket (× season) of a valid-time exceedance grid.
///
/// Stations of the exceedance grid must all be observed. Timesteps are the
/// intersection of both time indices. Series with no forecast data at all
/// produce no row.
pub fn compute_hits(observed: &EventTable, exceedance: &ExceedanceArray, options: &HitsOptions) -> Result<LabeledTable<Hits>> {
    options.validate()?;
    if exceedance.time_axis() != TimeAxis::Valid {
        return Err(SkillError::config(
            "exceedance",
            "must be on the valid-time axis before scoring",
        ));
    }

    let missing: Vec<String> = exceedance
        .stations()
        .iter()
        .filter(|s| observed.column(s).is_none())
        .cloned()
        .collect();
    if !missing.is_empty() {
        return Err(SkillError::StationMismatch {
            left: "exceedance",
            right: "observed events",
            missing,
            extra: Vec::new(),
        });
    }

    // (grid time index, observed time index) pairs common to both
    let obs_index: HashMap<_, _> = observed
        .times()
        .iter()
        .enumerate()
        .map(|(i, t)| (*t, i))
        .collect();
    let common: Vec<(usize, usize)> = exceedance
        .times()
        .iter()
        .enumerate()
        .filter_map(|(g, t)| obs_index.get(t).map(|&o| (g, o)))
        .collect();
    if common.is_empty() {
        warn!("observed events and forecasts share no timesteps");
        return Ok(LabeledTable::new());
    }
    let seasons: Vec<Season> = common
        .iter()
        .map(|&(g, _)| Season::of(&exceedance.times()[g]))
        .collect();

    info!(
        "Scoring {} stations × {} models over {} timesteps ({} workers)",
        exceedance.stations().len(),
        exceedance.models().len(),
        common.len(),
        options.workers
    );

    let shared = Arc::new(Shared {
        exceedance: exceedance.clone(),
        options: options.clone(),
        common,
        seasons,
    });

    let pool = ThreadPool::new(options.workers);
    let (tx, rx) = mpsc::channel();
    for (s, station) in exceedance.stations().iter().enumerate() {
        let obs: Vec<bool> = observed.column(station).map(<[bool]>::to_vec).unwrap_or_default();
        let shared = Arc::clone(&shared);
        let tx = tx.clone();
        pool.execute(move || {
            let result = score_station(&shared, s, &obs);
            // receiver outlives every job
            let _ = tx.send(result);
        });
    }
    drop(tx);

    let mut table = LabeledTable::new();
    for result in rx {
        for row in result? {
            table.push(row.coords, row.value);
        }
    }
    table.sort();
    debug!("compute_hits produced {} rows", table.len());
    Ok(table)
}

struct Shared {
    exceedance: ExceedanceArray,
    options: HitsOptions,
    common: Vec<(usize, usize)>,
    seasons: Vec<Season>,
}

fn score_station(shared: &Shared, s: usize, observed: &[bool]) -> Result<Vec<Row<Hits>>> {
    let station = &shared.exceedance.stations()[s];
    let grid = shared.exceedance.select_station(s);
    let obs: Vec<bool> = shared.common.iter().map(|&(_, o)| observed[o]).collect();
    let opts = &shared.options;
    let mut rows = Vec::new();

    for &probability in &opts.probabilities {
        for &persistence in &opts.persistences {
            let predicted = exceedance_to_events(&grid, Some(probability), persistence, &opts.leadtime)?;
            for (m, model) in predicted.models().iter().enumerate() {
                for (l, &leadtime) in predicted.leadtimes().iter().enumerate() {
                    let series: Vec<Option<u8>> = shared
                        .common
                        .iter()
                        .map(|&(g, _)| *predicted.get(0, m, g, l))
                        .collect();
                    if series.iter().all(Option::is_none) {
                        continue;
                    }

                    let mut coords = Coords::new();
                    coords.insert(Dim::Station, Coord::from(station.as_str()));
                    coords.insert(Dim::Model, Coord::from(model.as_str()));
                    coords.insert(Dim::Probability, Coord::from(probability));
                    coords.insert(Dim::Persistence, Coord::from(persistence));
                    coords.insert(Dim::Leadtime, Coord::from(leadtime));

                    if opts.seasonal {
                        for season in Season::ALL {
                            let idx: Vec<usize> = (0..series.len())
                                .filter(|&i| shared.seasons[i] == season)
                                .collect();
                            let sub_pred: Vec<Option<u8>> = idx.iter().map(|&i| series[i]).collect();
                            if sub_pred.iter().all(Option::is_none) {
                                continue;
                            }
                            let sub_obs: Vec<bool> = idx.iter().map(|&i| obs[i]).collect();
                            let breakdown = events_to_hits(&sub_obs, &sub_pred, opts.buffer, opts.predicted_count)?;
                            let mut coords = coords.clone();
                            coords.insert(Dim::Season, Coord::from(season.name()));
                            rows.push(Row {
                                coords,
                                value: breakdown.hits,
                            });
                        }
                    } else {
                        let breakdown = events_to_hits(&obs, &series, opts.buffer, opts.predicted_count)?;
                        rows.push(Row {
                            coords,
                            value: breakdown.hits,
                        });
                    }
                }
            }
        }
    }
    debug!("station {}: {} hit rows", station, rows.len());
    Ok(rows)
}
