/// Station grouping by catchment area and timestep grouping by season.
///
/// Skill is usually reported for "stations with a catchment of at least
/// N km²", for a ladder of N. `define_area_ranges` builds the ladder,
/// `summarize_by_area` says how many stations and observed events sit above
/// each rung, and `hits_by_area` sums a hits table over those stations.
///
/// Seasons are calendar quarters (winter = Jan–Mar); `compute_hits` uses
/// `Season::of` to split series when seasonal scoring is enabled.

use chrono::{Datelike, NaiveDateTime};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::error::{Result, SkillError};
use crate::model::{Coord, Dim};
use crate::scoring::hits::Hits;
use crate::table::LabeledTable;

// ---------------------------------------------------------------------------
// Seasons
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Season {
    Winter,
    Spring,
    Summer,
    Autumn,
}

impl Season {
    pub const ALL: [Season; 4] = [Season::Winter, Season::Spring, Season::Summer, Season::Autumn];

    /// Month 1–12 to season. Out-of-range months fold into autumn.
    pub fn from_month(month: u32) -> Self {
        match month {
            1..=3 => Season::Winter,
            4..=6 => Season::Spring,
            7..=9 => Season::Summer,
            _ => Season::Autumn,
        }
    }

    pub fn of(t: &NaiveDateTime) -> Self {
        Self::from_month(t.month())
    }

    pub fn name(&self) -> &'static str {
        match self {
            Season::Winter => "winter",
            Season::Spring => "spring",
            Season::Summer => "summer",
            Season::Autumn => "autumn",
        }
    }
}

// ---------------------------------------------------------------------------
// Catchment area ladder
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AreaScale {
    /// `area_min, 2·area_min, …` below `area_max`.
    Linear,
    /// 100 log-spaced values from `area_min` to `area_max`.
    Log,
    /// 1, 1.5, 2, 3, 5, 7 × 10ⁿ, up to the first value above `area_max`.
    #[default]
    Semilog,
}

const SEMILOG_MANTISSAS: [f64; 6] = [1.0, 1.5, 2.0, 3.0, 5.0, 7.0];

/// Catchment area thresholds (km²) between `area_min` and `area_max`.
pub fn define_area_ranges(area_min: u64, area_max: u64, scale: AreaScale) -> Result<Vec<u64>> {
    if area_min == 0 {
        return Err(SkillError::config("area_ranges.min", "must be positive"));
    }
    if area_max <= area_min {
        return Err(SkillError::config(
            "area_ranges.max",
            format!("{} must exceed the minimum {}", area_max, area_min),
        ));
    }

    let areas = match scale {
        AreaScale::Linear => (area_min..area_max).step_by(area_min as usize).collect(),
        AreaScale::Log => {
            let (lo, hi) = ((area_min as f64).log10(), (area_max as f64).log10());
            let n = 100;
            (0..n)
                .map(|i| 10f64.powf(lo + (hi - lo) * i as f64 / (n - 1) as f64).round() as u64)
                .collect()
        }
        AreaScale::Semilog => {
            let min_order = area_min.to_string().len() as i32 - 1;
            let max_order = area_max.to_string().len() as i32 + 1;
            let ladder: Vec<f64> = (min_order..=max_order)
                .flat_map(|order| SEMILOG_MANTISSAS.iter().map(move |m| m * 10f64.powi(order)))
                .collect();
            let cap = ladder
                .iter()
                .copied()
                .find(|a| *a > area_max as f64)
                .unwrap_or(f64::INFINITY);
            ladder
                .into_iter()
                .filter(|a| *a >= area_min as f64 && *a <= cap)
                .map(|a| a.round() as u64)
                .collect()
        }
    };
    Ok(areas)
}

/// Stations and observed events at or above one area threshold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AreaSummary {
    pub area: u64,
    pub n_stations: usize,
    pub n_events_obs: u64,
}

/// Counts stations and observed events with catchment area ≥ each
/// threshold. Stations without a known area are left out.
pub fn summarize_by_area(
    station_area: &BTreeMap<String, f64>,
    station_events: &BTreeMap<String, u64>,
    area_ranges: &[u64],
) -> Vec<AreaSummary> {
    area_ranges
        .iter()
        .map(|&area| {
            let stations: Vec<&String> = station_area
                .iter()
                .filter(|(_, a)| **a >= area as f64)
                .map(|(s, _)| s)
                .collect();
            AreaSummary {
                area,
                n_stations: stations.len(),
                n_events_obs: stations.iter().filter_map(|s| station_events.get(*s)).sum(),
            }
        })
        .collect()
}

/// Sums hits over the stations with catchment area ≥ each threshold,
/// adding an `area` dimension. Thresholds with no station give no rows.
pub fn hits_by_area(
    hits: &LabeledTable<Hits>,
    station_area: &BTreeMap<String, f64>,
    area_ranges: &[u64],
) -> Result<LabeledTable<Hits>> {
    if !hits.dims().contains(&Dim::Station) {
        return Err(SkillError::MissingDimension(Dim::Station.to_string()));
    }
    let mut parts = Vec::with_capacity(area_ranges.len());
    for &area in area_ranges {
        let subset = hits.filter(|coords| {
            coords
                .get(&Dim::Station)
                .and_then(Coord::as_label)
                .and_then(|s| station_area.get(s))
                .is_some_and(|a| *a >= area as f64)
        });
        if subset.is_empty() {
            continue;
        }
        parts.push((Coord::Int(area as i64), subset.sum_over(&[Dim::Station])?));
    }
    Ok(LabeledTable::stack(Dim::Area, parts))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Coords;

    fn areas() -> BTreeMap<String, f64> {
        [("A", 600.0), ("B", 2500.0), ("C", 12000.0)]
            .into_iter()
            .map(|(s, a)| (s.to_string(), a))
            .collect()
    }

    // --- Seasons -------------------------------------------------------------

    #[test]
    fn test_season_from_month_uses_calendar_quarters() {
        assert_eq!(Season::from_month(1), Season::Winter);
        assert_eq!(Season::from_month(3), Season::Winter);
        assert_eq!(Season::from_month(4), Season::Spring);
        assert_eq!(Season::from_month(9), Season::Summer);
        assert_eq!(Season::from_month(12), Season::Autumn);
    }

    // --- Area ladder ---------------------------------------------------------

    #[test]
    fn test_semilog_ladder_stops_after_first_value_above_max() {
        let ladder = define_area_ranges(500, 20_000, AreaScale::Semilog).expect("valid range");
        assert_eq!(
            ladder,
            vec![500, 700, 1000, 1500, 2000, 3000, 5000, 7000, 10_000, 15_000, 20_000, 30_000]
        );
    }

    #[test]
    fn test_linear_ladder_steps_by_minimum() {
        let ladder = define_area_ranges(500, 2000, AreaScale::Linear).expect("valid range");
        assert_eq!(ladder, vec![500, 1000, 1500]);
    }

    #[test]
    fn test_log_ladder_spans_range() {
        let ladder = define_area_ranges(100, 10_000, AreaScale::Log).expect("valid range");
        assert_eq!(ladder.len(), 100);
        assert_eq!(ladder[0], 100);
        assert_eq!(ladder[99], 10_000);
    }

    #[test]
    fn test_area_ladder_rejects_inverted_range() {
        assert!(define_area_ranges(2000, 500, AreaScale::Semilog).is_err());
        assert!(define_area_ranges(0, 500, AreaScale::Linear).is_err());
    }

    // --- Area summaries ------------------------------------------------------

    #[test]
    fn test_summarize_by_area_counts_stations_and_events() {
        let events: BTreeMap<String, u64> = [("A", 3), ("B", 2), ("C", 1)]
            .into_iter()
            .map(|(s, n)| (s.to_string(), n))
            .collect();
        let summary = summarize_by_area(&areas(), &events, &[500, 2000, 10_000, 50_000]);
        let counts: Vec<(usize, u64)> = summary.iter().map(|s| (s.n_stations, s.n_events_obs)).collect();
        assert_eq!(counts, vec![(3, 6), (2, 3), (1, 1), (0, 0)]);
    }

    #[test]
    fn test_hits_by_area_sums_large_catchments() {
        let mut hits = LabeledTable::new();
        for (station, h) in [("A", Hits::new(1, 0, 0)), ("B", Hits::new(0, 1, 0)), ("C", Hits::new(2, 0, 1))] {
            let mut coords = Coords::new();
            coords.insert(Dim::Station, Coord::from(station));
            hits.push(coords, h);
        }
        let by_area = hits_by_area(&hits, &areas(), &[500, 2000, 50_000]).expect("station dim present");
        assert_eq!(by_area.len(), 2, "no station above 50 000 km²");

        let mut at_2000 = Coords::new();
        at_2000.insert(Dim::Area, Coord::Int(2000));
        assert_eq!(by_area.select(&at_2000), Some(&Hits::new(2, 1, 1)));
    }
}
