/// Dense station × model × time × leadtime grid.
///
/// Storage is a single row-major `Vec<T>` with the leadtime axis innermost,
/// so `row(s, m, t)` is the contiguous leadtime profile of one forecast (or,
/// on the valid-time axis, of one verification time). Persistence runs
/// along those rows.

use chrono::{Duration, NaiveDateTime};
use serde::Serialize;

use crate::error::{Result, SkillError};

/// What the time axis of a grid indexes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeAxis {
    /// Forecast issue time; leadtime is hours after issue.
    Issue,
    /// Verification time; leadtime labels groups of forecasts by age.
    Valid,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LeadtimeGrid<T> {
    stations: Vec<String>,
    models: Vec<String>,
    times: Vec<NaiveDateTime>,
    /// Hours.
    leadtimes: Vec<u32>,
    time_axis: TimeAxis,
    data: Vec<T>,
}

/// Fraction of members above threshold, `NaN` where unknown.
pub type ExceedanceArray = LeadtimeGrid<f64>;

/// 0/1 predicted events, `None` where no forecast contributed.
pub type PredictedEventArray = LeadtimeGrid<Option<u8>>;

fn check_increasing<V: PartialOrd>(values: &[V], what: &str) -> Result<()> {
    match values.windows(2).position(|w| w[0] >= w[1]) {
        Some(pos) => Err(SkillError::UnorderedTimeIndex {
            what: what.to_string(),
            position: pos + 1,
        }),
        None => Ok(()),
    }
}

impl<T: Clone> LeadtimeGrid<T> {
    pub fn filled(
        stations: Vec<String>,
        models: Vec<String>,
        times: Vec<NaiveDateTime>,
        leadtimes: Vec<u32>,
        time_axis: TimeAxis,
        fill: T,
    ) -> Result<Self> {
        let len = stations.len() * models.len() * times.len() * leadtimes.len();
        Self::from_vec(stations, models, times, leadtimes, time_axis, vec![fill; len])
    }

    pub fn from_vec(
        stations: Vec<String>,
        models: Vec<String>,
        times: Vec<NaiveDateTime>,
        leadtimes: Vec<u32>,
        time_axis: TimeAxis,
        data: Vec<T>,
    ) -> Result<Self> {
        check_increasing(&times, "grid time axis")?;
        check_increasing(&leadtimes, "grid leadtime axis")?;
        let expected = stations.len() * models.len() * times.len() * leadtimes.len();
        if data.len() != expected {
            return Err(SkillError::ShapeMismatch {
                what: "leadtime grid".to_string(),
                expected,
                found: data.len(),
            });
        }
        Ok(Self {
            stations,
            models,
            times,
            leadtimes,
            time_axis,
            data,
        })
    }

    pub fn stations(&self) -> &[String] {
        &self.stations
    }

    pub fn models(&self) -> &[String] {
        &self.models
    }

    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    pub fn leadtimes(&self) -> &[u32] {
        &self.leadtimes
    }

    pub fn time_axis(&self) -> TimeAxis {
        self.time_axis
    }

    pub fn station_index(&self, station: &str) -> Option<usize> {
        self.stations.iter().position(|s| s == station)
    }

    pub fn model_index(&self, model: &str) -> Option<usize> {
        self.models.iter().position(|m| m == model)
    }

    pub fn leadtime_index(&self, hours: u32) -> Option<usize> {
        self.leadtimes.binary_search(&hours).ok()
    }

    fn offset(&self, s: usize, m: usize, t: usize) -> usize {
        ((s * self.models.len() + m) * self.times.len() + t) * self.leadtimes.len()
    }

    pub fn get(&self, s: usize, m: usize, t: usize, l: usize) -> &T {
        &self.data[self.offset(s, m, t) + l]
    }

    pub fn set(&mut self, s: usize, m: usize, t: usize, l: usize, value: T) {
        let i = self.offset(s, m, t) + l;
        self.data[i] = value;
    }

    /// Leadtime profile at one (station, model, time).
    pub fn row(&self, s: usize, m: usize, t: usize) -> &[T] {
        let start = self.offset(s, m, t);
        &self.data[start..start + self.leadtimes.len()]
    }

    /// Values along the time axis at one (station, model, leadtime).
    pub fn series(&self, s: usize, m: usize, l: usize) -> Vec<T> {
        (0..self.times.len()).map(|t| self.get(s, m, t, l).clone()).collect()
    }

    /// One-station grid.
    pub fn select_station(&self, s: usize) -> Self {
        let start = self.offset(s, 0, 0);
        let len = self.models.len() * self.times.len() * self.leadtimes.len();
        Self {
            stations: vec![self.stations[s].clone()],
            models: self.models.clone(),
            times: self.times.clone(),
            leadtimes: self.leadtimes.clone(),
            time_axis: self.time_axis,
            data: self.data[start..start + len].to_vec(),
        }
    }

    /// Keeps the stations for which `keep(index)` holds.
    pub fn retain_stations(&self, keep: impl Fn(usize) -> bool) -> Self {
        let per_station = self.models.len() * self.times.len() * self.leadtimes.len();
        let mut stations = Vec::new();
        let mut data = Vec::new();
        for (s, station) in self.stations.iter().enumerate() {
            if keep(s) {
                stations.push(station.clone());
                data.extend_from_slice(&self.data[s * per_station..(s + 1) * per_station]);
            }
        }
        Self {
            stations,
            models: self.models.clone(),
            times: self.times.clone(),
            leadtimes: self.leadtimes.clone(),
            time_axis: self.time_axis,
            data,
        }
    }

    /// Rebuilds every leadtime row with `f`, which must return one value per
    /// entry of `leadtimes`.
    pub fn map_rows<U: Clone>(
        &self,
        leadtimes: Vec<u32>,
        mut f: impl FnMut(&[T]) -> Result<Vec<U>>,
    ) -> Result<LeadtimeGrid<U>> {
        let mut data = Vec::with_capacity(self.stations.len() * self.models.len() * self.times.len() * leadtimes.len());
        for s in 0..self.stations.len() {
            for m in 0..self.models.len() {
                for t in 0..self.times.len() {
                    let row = f(self.row(s, m, t))?;
                    if row.len() != leadtimes.len() {
                        return Err(SkillError::ShapeMismatch {
                            what: "mapped leadtime row".to_string(),
                            expected: leadtimes.len(),
                            found: row.len(),
                        });
                    }
                    data.extend(row);
                }
            }
        }
        LeadtimeGrid::from_vec(
            self.stations.clone(),
            self.models.clone(),
            self.times.clone(),
            leadtimes,
            self.time_axis,
            data,
        )
    }
}

impl LeadtimeGrid<f64> {
    /// Re-indexes an issue-time grid by valid time.
    ///
    /// With forecasts every F hours and leadtime steps of S hours
    /// (F = r·S), leadtime group `j` holds steps `j·r .. j·r + r - 1` and is
    /// labelled `(j + 1)·F`. Cell `(t, j)` is the value of the unique
    /// forecast in that group verifying at `t`. With `trim`, valid times for
    /// which some group has no data anywhere are dropped.
    pub fn to_valid_time(&self, trim: bool) -> Result<Self> {
        if self.time_axis != TimeAxis::Issue {
            return Err(SkillError::config("time axis", "grid is already on the valid-time axis"));
        }
        if self.times.is_empty() || self.leadtimes.is_empty() {
            return Err(SkillError::IrregularAxis {
                axis: "time",
                detail: "grid has no issue times or no leadtimes".to_string(),
            });
        }

        let step = match self.leadtimes.as_slice() {
            [only] => *only,
            lts => lts[1] - lts[0],
        };
        if step == 0 || self.leadtimes.windows(2).any(|w| w[1] - w[0] != step) {
            return Err(SkillError::IrregularAxis {
                axis: "leadtime",
                detail: format!("steps differ from {} h", step),
            });
        }

        let gaps: Vec<i64> = self
            .times
            .windows(2)
            .map(|w| (w[1] - w[0]).num_hours())
            .collect();
        let frequency = gaps.iter().copied().min().unwrap_or(step as i64);
        if frequency <= 0 || frequency % step as i64 != 0 {
            return Err(SkillError::IrregularAxis {
                axis: "time",
                detail: format!(
                    "forecast frequency {} h is not a multiple of the {} h leadtime step",
                    frequency, step
                ),
            });
        }
        if let Some(gap) = gaps.iter().find(|g| *g % frequency != 0) {
            return Err(SkillError::IrregularAxis {
                axis: "time",
                detail: format!("gap of {} h between issue times is not a multiple of {} h", gap, frequency),
            });
        }

        let ratio = (frequency / step as i64) as usize;
        let n_groups = self.leadtimes.len().div_ceil(ratio);
        let groups: Vec<u32> = (1..=n_groups).map(|j| j as u32 * frequency as u32).collect();

        let first_lt = self.leadtimes[0] as i64;
        let last_lt = self.leadtimes[self.leadtimes.len() - 1] as i64;
        let origin = self.times[0] + Duration::hours(first_lt);
        let end = self.times[self.times.len() - 1] + Duration::hours(last_lt);
        let n_valid = ((end - origin).num_hours() / step as i64) as usize + 1;
        let valid_times: Vec<NaiveDateTime> = (0..n_valid)
            .map(|i| origin + Duration::hours(i as i64 * step as i64))
            .collect();

        let mut out = LeadtimeGrid::filled(
            self.stations.clone(),
            self.models.clone(),
            valid_times,
            groups,
            TimeAxis::Valid,
            f64::NAN,
        )?;
        for s in 0..self.stations.len() {
            for m in 0..self.models.len() {
                for (i, issued) in self.times.iter().enumerate() {
                    let base = (*issued - self.times[0]).num_hours() / step as i64;
                    for (k, value) in self.row(s, m, i).iter().enumerate() {
                        let t = base as usize + k;
                        out.set(s, m, t, k / ratio, *value);
                    }
                }
            }
        }

        if !trim {
            return Ok(out);
        }
        let keep: Vec<usize> = (0..out.times.len())
            .filter(|&t| {
                (0..out.leadtimes.len()).all(|j| {
                    (0..out.stations.len())
                        .any(|s| (0..out.models.len()).any(|m| !out.get(s, m, t, j).is_nan()))
                })
            })
            .collect();
        let mut data = Vec::with_capacity(out.stations.len() * out.models.len() * keep.len() * out.leadtimes.len());
        for s in 0..out.stations.len() {
            for m in 0..out.models.len() {
                for &t in &keep {
                    data.extend_from_slice(out.row(s, m, t));
                }
            }
        }
        let times = keep.iter().map(|&t| out.times[t]).collect();
        LeadtimeGrid::from_vec(out.stations, out.models, times, out.leadtimes, TimeAxis::Valid, data)
    }
}
