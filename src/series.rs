/// Station-indexed time series and discharge thresholds.
///
/// `StationTable<T>` is the in-memory form of the reanalysis discharge
/// (`T = f64`) and of the observed event onsets (`T = bool`). Columns are
/// stored per station so the event detector and the scoring engine can hand
/// a station's whole series to a worker without copying the table.

use chrono::{NaiveDate, NaiveDateTime};
use std::collections::{BTreeMap, HashMap, HashSet};

use crate::error::{Result, SkillError};
use crate::model::ReturnPeriod;
use crate::scoring::buffer::count_events;

const DATETIME_FORMATS: [&str; 4] = [
    "%Y-%m-%d %H:%M:%S",
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%d %H:%M",
    "%Y-%m-%dT%H:%M",
];

/// Parses the timestamp formats found in reanalysis files and config.
/// A bare date is midnight.
pub fn parse_datetime(s: &str) -> Option<NaiveDateTime> {
    let s = s.trim();
    for fmt in DATETIME_FORMATS {
        if let Ok(dt) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(dt);
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
}

// ---------------------------------------------------------------------------
// StationTable
// ---------------------------------------------------------------------------

/// Time index × station columns.
///
/// Invariants: timestamps strictly increasing, station ids unique, every
/// column as long as the time index.
#[derive(Debug, Clone, PartialEq)]
pub struct StationTable<T> {
    times: Vec<NaiveDateTime>,
    stations: Vec<String>,
    columns: Vec<Vec<T>>,
}

pub type DischargeTable = StationTable<f64>;

/// Observed event onsets: `true` exactly at onset timesteps.
pub type EventTable = StationTable<bool>;

impl<T: Clone> StationTable<T> {
    pub fn new(times: Vec<NaiveDateTime>, stations: Vec<String>, columns: Vec<Vec<T>>) -> Result<Self> {
        if let Some(pos) = times.windows(2).position(|w| w[0] >= w[1]) {
            return Err(SkillError::UnorderedTimeIndex {
                what: "station table".to_string(),
                position: pos + 1,
            });
        }
        if columns.len() != stations.len() {
            return Err(SkillError::ShapeMismatch {
                what: "station columns".to_string(),
                expected: stations.len(),
                found: columns.len(),
            });
        }
        for (station, column) in stations.iter().zip(&columns) {
            if column.len() != times.len() {
                return Err(SkillError::ShapeMismatch {
                    what: format!("column of station {}", station),
                    expected: times.len(),
                    found: column.len(),
                });
            }
        }
        let mut seen = HashSet::new();
        if let Some(dup) = stations.iter().find(|s| !seen.insert(s.as_str())) {
            return Err(SkillError::config("stations", format!("duplicate station id '{}'", dup)));
        }
        Ok(Self {
            times,
            stations,
            columns,
        })
    }

    pub fn times(&self) -> &[NaiveDateTime] {
        &self.times
    }

    pub fn stations(&self) -> &[String] {
        &self.stations
    }

    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn column(&self, station: &str) -> Option<&[T]> {
        self.stations
            .iter()
            .position(|s| s == station)
            .map(|i| self.columns[i].as_slice())
    }

    /// Iterates `(station, column)` in station order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &[T])> {
        self.stations
            .iter()
            .map(String::as_str)
            .zip(self.columns.iter().map(Vec::as_slice))
    }

    /// Restricts the table to `ids`, in the order given. Unknown ids are
    /// an error.
    pub fn select_stations(&self, ids: &[String]) -> Result<Self> {
        let index: HashMap<&str, usize> = self
            .stations
            .iter()
            .enumerate()
            .map(|(i, s)| (s.as_str(), i))
            .collect();
        let mut columns = Vec::with_capacity(ids.len());
        let mut missing = Vec::new();
        for id in ids {
            match index.get(id.as_str()) {
                Some(&i) => columns.push(self.columns[i].clone()),
                None => missing.push(id.clone()),
            }
        }
        if !missing.is_empty() {
            return Err(SkillError::StationMismatch {
                left: "selection",
                right: "station table",
                missing,
                extra: Vec::new(),
            });
        }
        Ok(Self {
            times: self.times.clone(),
            stations: ids.to_vec(),
            columns,
        })
    }

    /// Keeps timesteps within `[start, end]` (either bound optional).
    pub fn slice_period(&self, start: Option<NaiveDateTime>, end: Option<NaiveDateTime>) -> Self {
        let lo = start.map_or(0, |s| self.times.partition_point(|t| *t < s));
        let hi = end.map_or(self.times.len(), |e| self.times.partition_point(|t| *t <= e));
        let hi = hi.max(lo);
        Self {
            times: self.times[lo..hi].to_vec(),
            stations: self.stations.clone(),
            columns: self.columns.iter().map(|c| c[lo..hi].to_vec()).collect(),
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(&T) -> U) -> StationTable<U> {
        StationTable {
            times: self.times.clone(),
            stations: self.stations.clone(),
            columns: self
                .columns
                .iter()
                .map(|c| c.iter().map(&mut f).collect())
                .collect(),
        }
    }
}

impl EventTable {
    /// Number of observed events per station.
    pub fn event_counts(&self) -> BTreeMap<String, u64> {
        self.iter()
            .map(|(station, column)| (station.to_string(), count_events(column)))
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Thresholds
// ---------------------------------------------------------------------------

/// Discharge thresholds per station and return period.
#[derive(Debug, Clone, PartialEq)]
pub struct Thresholds {
    return_periods: Vec<ReturnPeriod>,
    stations: Vec<String>,
    /// `values[station][return_period]`
    values: Vec<Vec<f64>>,
}

impl Thresholds {
    pub fn new(return_periods: Vec<ReturnPeriod>, stations: Vec<String>, values: Vec<Vec<f64>>) -> Result<Self> {
        if values.len() != stations.len() {
            return Err(SkillError::ShapeMismatch {
                what: "threshold rows".to_string(),
                expected: stations.len(),
                found: values.len(),
            });
        }
        if let Some((station, row)) = stations
            .iter()
            .zip(&values)
            .find(|(_, row)| row.len() != return_periods.len())
        {
            return Err(SkillError::ShapeMismatch {
                what: format!("thresholds of station {}", station),
                expected: return_periods.len(),
                found: row.len(),
            });
        }
        Ok(Self {
            return_periods,
            stations,
            values,
        })
    }

    pub fn return_periods(&self) -> &[ReturnPeriod] {
        &self.return_periods
    }

    pub fn stations(&self) -> &[String] {
        &self.stations
    }

    /// Thresholds of every station for one return period.
    pub fn level(&self, rp: ReturnPeriod) -> Result<StationThreshold> {
        let col = self
            .return_periods
            .iter()
            .position(|r| (r.0 - rp.0).abs() < 1e-9)
            .ok_or_else(|| SkillError::UnknownReturnPeriod(rp.label()))?;
        Ok(StationThreshold {
            stations: self.stations.clone(),
            values: self.values.iter().map(|row| row[col]).collect(),
        })
    }
}

/// One threshold value per station.
#[derive(Debug, Clone, PartialEq)]
pub struct StationThreshold {
    stations: Vec<String>,
    values: Vec<f64>,
}

impl StationThreshold {
    pub fn new(stations: Vec<String>, values: Vec<f64>) -> Result<Self> {
        if stations.len() != values.len() {
            return Err(SkillError::ShapeMismatch {
                what: "station thresholds".to_string(),
                expected: stations.len(),
                found: values.len(),
            });
        }
        Ok(Self { stations, values })
    }

    pub fn stations(&self) -> &[String] {
        &self.stations
    }

    pub fn get(&self, station: &str) -> Option<f64> {
        self.stations
            .iter()
            .position(|s| s == station)
            .map(|i| self.values[i])
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, f64)> {
        self.stations
            .iter()
            .map(String::as_str)
            .zip(self.values.iter().copied())
    }

    /// Multiplies every threshold by `factor` (lower hysteresis level).
    pub fn scaled(&self, factor: f64) -> Self {
        Self {
            stations: self.stations.clone(),
            values: self.values.iter().map(|v| v * factor).collect(),
        }
    }
}
