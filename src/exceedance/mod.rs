/// Forecast discharge → probability of exceeding a threshold.
///
/// A `ModelRun` pairs a `ModelSpec` with the forecasts of that model, each
/// behind a `ForecastSource` so that files are read one at a time and
/// dropped before the next one is loaded. `build_exceedance` produces the
/// member-mean exceedance grid on the issue-time axis;
/// `build_member_exceedance` keeps the member axis.

pub mod grid;

use chrono::NaiveDateTime;
use log::{debug, info, warn};
use std::borrow::Cow;
use std::collections::{BTreeSet, HashMap};

use crate::error::{Result, SkillError};
use crate::model::ModelSpec;
use crate::series::StationThreshold;
use grid::{ExceedanceArray, LeadtimeGrid, TimeAxis};

// ---------------------------------------------------------------------------
// Forecast inputs
// ---------------------------------------------------------------------------

/// Discharge of one forecast: station × member × step. Step 0 is the
/// analysis (no forecast information).
#[derive(Debug, Clone, PartialEq)]
pub struct ForecastArray {
    stations: Vec<String>,
    members: usize,
    steps: usize,
    values: Vec<f64>,
}

impl ForecastArray {
    pub fn new(stations: Vec<String>, members: usize, steps: usize, values: Vec<f64>) -> Result<Self> {
        let expected = stations.len() * members * steps;
        if values.len() != expected {
            return Err(SkillError::ShapeMismatch {
                what: "forecast array".to_string(),
                expected,
                found: values.len(),
            });
        }
        Ok(Self {
            stations,
            members,
            steps,
            values,
        })
    }

    pub fn stations(&self) -> &[String] {
        &self.stations
    }

    pub fn members(&self) -> usize {
        self.members
    }

    pub fn steps(&self) -> usize {
        self.steps
    }

    pub fn get(&self, station: usize, member: usize, step: usize) -> f64 {
        self.values[(station * self.members + member) * self.steps + step]
    }
}

/// Where one forecast comes from.
pub trait ForecastSource {
    fn issue_time(&self) -> NaiveDateTime;
    fn load(&self) -> Result<ForecastArray>;

    fn describe(&self) -> String {
        format!("forecast issued {}", self.issue_time().format("%Y-%m-%d %H:%M"))
    }
}

/// A forecast already in memory.
#[derive(Debug, Clone)]
pub struct InMemoryForecast {
    pub issue_time: NaiveDateTime,
    pub array: ForecastArray,
}

impl ForecastSource for InMemoryForecast {
    fn issue_time(&self) -> NaiveDateTime {
        self.issue_time
    }

    fn load(&self) -> Result<ForecastArray> {
        Ok(self.array.clone())
    }
}

/// All forecasts of one model.
pub struct ModelRun {
    pub spec: ModelSpec,
    pub sources: Vec<Box<dyn ForecastSource + Send>>,
}

impl ModelRun {
    pub fn new(spec: ModelSpec, sources: Vec<Box<dyn ForecastSource + Send>>) -> Self {
        Self { spec, sources }
    }
}

// ---------------------------------------------------------------------------
// Exceedance
// ---------------------------------------------------------------------------

/// Per-member exceedance: station × model × time × member × leadtime.
/// Models with fewer members than the widest model are NaN-padded.
#[derive(Debug, Clone, PartialEq)]
pub struct MemberExceedance {
    members: usize,
    /// One grid per member.
    grids: Vec<ExceedanceArray>,
}

impl MemberExceedance {
    pub fn members(&self) -> usize {
        self.members
    }

    pub fn member(&self, i: usize) -> Option<&ExceedanceArray> {
        self.grids.get(i)
    }

    /// Member-mean exceedance, ignoring padded and missing members.
    pub fn probability(&self) -> Result<ExceedanceArray> {
        let first = self
            .grids
            .first()
            .ok_or_else(|| SkillError::config("members", "member exceedance has no members"))?;
        let mut sum = vec![0.0; first.stations().len() * first.models().len() * first.times().len() * first.leadtimes().len()];
        let mut count = vec![0usize; sum.len()];
        for grid in &self.grids {
            let mut i = 0;
            for s in 0..grid.stations().len() {
                for m in 0..grid.models().len() {
                    for t in 0..grid.times().len() {
                        for v in grid.row(s, m, t) {
                            if !v.is_nan() {
                                sum[i] += v;
                                count[i] += 1;
                            }
                            i += 1;
                        }
                    }
                }
            }
        }
        let data = sum
            .into_iter()
            .zip(count)
            .map(|(s, n)| if n == 0 { f64::NAN } else { s / n as f64 })
            .collect();
        LeadtimeGrid::from_vec(
            first.stations().to_vec(),
            first.models().to_vec(),
            first.times().to_vec(),
            first.leadtimes().to_vec(),
            first.time_axis(),
            data,
        )
    }
}

/// Anything that can be reduced to an exceedance-probability grid.
pub trait ProbabilityGrid {
    fn probability_grid(&self) -> Result<Cow<'_, ExceedanceArray>>;
}

impl ProbabilityGrid for ExceedanceArray {
    fn probability_grid(&self) -> Result<Cow<'_, ExceedanceArray>> {
        Ok(Cow::Borrowed(self))
    }
}

impl ProbabilityGrid for MemberExceedance {
    fn probability_grid(&self) -> Result<Cow<'_, ExceedanceArray>> {
        Ok(Cow::Owned(self.probability()?))
    }
}

/// Axes shared by every model of a build.
struct Axes {
    stations: Vec<String>,
    models: Vec<String>,
    times: Vec<NaiveDateTime>,
    leadtimes: Vec<u32>,
    time_index: HashMap<NaiveDateTime, usize>,
    leadtime_index: HashMap<u32, usize>,
}

impl Axes {
    fn new(runs: &[ModelRun], thresholds: &StationThreshold) -> Result<Self> {
        if runs.is_empty() {
            return Err(SkillError::config("models", "at least one model run is required"));
        }
        for run in runs {
            run.spec.validate()?;
        }
        let times: Vec<NaiveDateTime> = runs
            .iter()
            .flat_map(|r| r.sources.iter().map(|s| s.issue_time()))
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        let leadtimes: Vec<u32> = runs
            .iter()
            .flat_map(|r| r.spec.leadtime_hours())
            .collect::<BTreeSet<_>>()
            .into_iter()
            .collect();
        Ok(Self {
            stations: thresholds.stations().to_vec(),
            models: runs.iter().map(|r| r.spec.name.clone()).collect(),
            time_index: times.iter().enumerate().map(|(i, t)| (*t, i)).collect(),
            leadtime_index: leadtimes.iter().enumerate().map(|(i, l)| (*l, i)).collect(),
            times,
            leadtimes,
        })
    }

    fn grid(&self) -> Result<ExceedanceArray> {
        LeadtimeGrid::filled(
            self.stations.clone(),
            self.models.clone(),
            self.times.clone(),
            self.leadtimes.clone(),
            TimeAxis::Issue,
            f64::NAN,
        )
    }
}

/// Visits every usable (station, issue time, leadtime) cell of every
/// forecast, streaming one source at a time. `visit` receives the grid
/// coordinates, the threshold, and the forecast with its station row.
/// Returns, per threshold station, whether any forecast contained it.
fn stream_forecasts(
    runs: &[ModelRun],
    thresholds: &StationThreshold,
    axes: &Axes,
    mut visit: impl FnMut(usize, usize, usize, usize, f64, &ForecastArray, usize, usize),
) -> Vec<bool> {
    let mut seen = vec![false; axes.stations.len()];
    for (m, run) in runs.iter().enumerate() {
        let spec = &run.spec;
        if run.sources.is_empty() {
            warn!("{}: no forecasts, leaving its slice empty", spec.name);
            continue;
        }
        info!("{}: processing {} forecasts", spec.name, run.sources.len());

        for source in &run.sources {
            let array = match source.load() {
                Ok(a) => a,
                Err(e) => {
                    warn!("{}: skipping {}: {}", spec.name, source.describe(), e);
                    continue;
                }
            };
            let Some(&t) = axes.time_index.get(&source.issue_time()) else {
                continue;
            };
            let usable = array.steps().saturating_sub(1).min(spec.leadtimes);
            debug!(
                "{}: {} ({} stations, {} members, {} steps)",
                spec.name,
                source.describe(),
                array.stations().len(),
                array.members(),
                usable
            );
            let rows: HashMap<&str, usize> = array
                .stations()
                .iter()
                .enumerate()
                .map(|(i, st)| (st.as_str(), i))
                .collect();

            for (s, (station, threshold)) in thresholds.iter().enumerate() {
                let Some(&row) = rows.get(station) else {
                    continue;
                };
                seen[s] = true;
                for step in 1..=usable {
                    let hours = step as u32 * spec.resolution_hours;
                    let Some(&l) = axes.leadtime_index.get(&hours) else {
                        continue;
                    };
                    visit(s, m, t, l, threshold, &array, row, step);
                }
            }
        }
    }
    seen
}

fn exceeds(value: f64, threshold: f64) -> f64 {
    if value.is_nan() || threshold.is_nan() {
        f64::NAN
    } else if value > threshold {
        1.0
    } else {
        0.0
    }
}

/// Member-mean probability of exceeding `thresholds`, on the issue-time
/// axis. Stations never present in a forecast are dropped.
pub fn build_exceedance(runs: &[ModelRun], thresholds: &StationThreshold) -> Result<ExceedanceArray> {
    let axes = Axes::new(runs, thresholds)?;
    let mut grid = axes.grid()?;

    let seen = stream_forecasts(runs, thresholds, &axes, |s, m, t, l, threshold, array, row, step| {
        let mut exceeding = 0usize;
        let mut valid = 0usize;
        for member in 0..array.members() {
            let flag = exceeds(array.get(row, member, step), threshold);
            if !flag.is_nan() {
                valid += 1;
                exceeding += flag as usize;
            }
        }
        if valid > 0 {
            grid.set(s, m, t, l, exceeding as f64 / valid as f64);
        }
    });

    let grid = grid.retain_stations(|s| seen[s]);
    info!(
        "Exceedance grid: {} stations × {} models × {} issue times × {} leadtimes",
        grid.stations().len(),
        grid.models().len(),
        grid.times().len(),
        grid.leadtimes().len()
    );
    Ok(grid)
}

/// Per-member 0/1 exceedance. Member `i` of a model with fewer than `i + 1`
/// members is NaN.
pub fn build_member_exceedance(runs: &[ModelRun], thresholds: &StationThreshold) -> Result<MemberExceedance> {
    let axes = Axes::new(runs, thresholds)?;
    let members = runs.iter().map(|r| r.spec.members).max().unwrap_or(1);
    let mut grids = Vec::with_capacity(members);
    for _ in 0..members {
        grids.push(axes.grid()?);
    }

    let seen = stream_forecasts(runs, thresholds, &axes, |s, m, t, l, threshold, array, row, step| {
        for member in 0..array.members().min(members) {
            grids[member].set(s, m, t, l, exceeds(array.get(row, member, step), threshold));
        }
    });

    Ok(MemberExceedance {
        members,
        grids: grids.into_iter().map(|g| g.retain_stations(|s| seen[s])).collect(),
    })
}
