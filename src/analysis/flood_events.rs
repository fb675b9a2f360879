/// Observed flood event detection
///
/// Turns reanalysis discharge into event onsets per station.
///
/// # Detection Process
///
/// 1. **Station alignment**
///    - Discharge columns and thresholds are matched by station id
///    - Strict alignment fails on any difference, inner alignment drops
///      the unmatched stations with a warning
///
/// 2. **Onset candidates**
///    - A candidate is a timestep where discharge rises above the upper
///      threshold (the first timestep never qualifies)
///    - Missing discharge counts as below threshold
///
/// 3. **Hysteresis** (optional lower threshold)
///    - A close is a timestep where discharge falls to or below the lower
///      threshold
///    - A candidate is kept only if a close happened since the last kept
///      onset, so an oscillation around the upper threshold during one
///      flood is a single event

use log::{debug, info, warn};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;

use crate::error::{Result, SkillError};
use crate::series::{DischargeTable, EventTable, StationThreshold, StationTable};

/// How station sets of discharge and thresholds are reconciled.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Alignment {
    /// Any station in one input but not the other is an error.
    #[default]
    Strict,
    /// Keep the intersection, warn about the rest.
    Inner,
}

/// Onset flags for one station. `lower`, when given, must be below `upper`.
pub fn detect_station_events(discharge: &[f64], upper: f64, lower: Option<f64>) -> Vec<bool> {
    let above = |q: f64, thr: f64| q > thr;
    let mut onsets = vec![false; discharge.len()];

    let mut kept: Option<usize> = None;
    let mut closed_since_kept = false;
    for i in 1..discharge.len() {
        let rises = !above(discharge[i - 1], upper) && above(discharge[i], upper);
        if let Some(low) = lower {
            // close: exceedance of the lower threshold goes 1 -> 0
            if above(discharge[i - 1], low) && !above(discharge[i], low) {
                closed_since_kept = true;
            }
        }
        if !rises {
            continue;
        }
        let keep = match (lower, kept) {
            (None, _) | (_, None) => true,
            (Some(_), Some(_)) => closed_since_kept,
        };
        if keep {
            onsets[i] = true;
            kept = Some(i);
            closed_since_kept = false;
        }
    }
    onsets
}

/// Detects event onsets for every station of `discharge`.
pub fn detect_events(
    discharge: &DischargeTable,
    upper: &StationThreshold,
    lower: Option<&StationThreshold>,
    alignment: Alignment,
) -> Result<EventTable> {
    let stations = align_stations(discharge, upper, alignment)?;

    let mut columns = Vec::with_capacity(stations.len());
    let mut total = 0usize;
    for station in &stations {
        let series = discharge.column(station).unwrap_or_default();
        let up = upper.get(station).unwrap_or(f64::NAN);
        let low = match lower {
            Some(l) => {
                let value = l.get(station).ok_or_else(|| SkillError::StationMismatch {
                    left: "upper thresholds",
                    right: "lower thresholds",
                    missing: vec![station.clone()],
                    extra: Vec::new(),
                })?;
                if !(value < up) {
                    return Err(SkillError::config(
                        "lower threshold",
                        format!("station {}: {} is not below the upper threshold {}", station, value, up),
                    ));
                }
                Some(value)
            }
            None => None,
        };
        let onsets = detect_station_events(series, up, low);
        let n = onsets.iter().filter(|o| **o).count();
        debug!("station {}: {} events above {:.1}", station, n, up);
        total += n;
        columns.push(onsets);
    }

    info!("Detected {} observed events at {} stations", total, stations.len());
    StationTable::new(discharge.times().to_vec(), stations, columns)
}

fn align_stations(discharge: &DischargeTable, upper: &StationThreshold, alignment: Alignment) -> Result<Vec<String>> {
    let have: HashSet<&str> = upper.stations().iter().map(String::as_str).collect();
    let want: HashSet<&str> = discharge.stations().iter().map(String::as_str).collect();

    let missing: Vec<String> = discharge
        .stations()
        .iter()
        .filter(|s| !have.contains(s.as_str()))
        .cloned()
        .collect();
    let extra: Vec<String> = upper
        .stations()
        .iter()
        .filter(|s| !want.contains(s.as_str()))
        .cloned()
        .collect();

    if !missing.is_empty() || !extra.is_empty() {
        match alignment {
            Alignment::Strict => {
                return Err(SkillError::StationMismatch {
                    left: "discharge",
                    right: "thresholds",
                    missing,
                    extra,
                });
            }
            Alignment::Inner => {
                warn!(
                    "Dropping {} stations without thresholds ({}) and {} thresholds without discharge ({})",
                    missing.len(),
                    missing.join(", "),
                    extra.len(),
                    extra.join(", ")
                );
            }
        }
    }

    Ok(discharge
        .stations()
        .iter()
        .filter(|s| have.contains(s.as_str()))
        .cloned()
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, NaiveDateTime};

    fn times(n: usize) -> Vec<NaiveDateTime> {
        let start = NaiveDate::from_ymd_opt(2021, 7, 12)
            .unwrap()
            .and_hms_opt(0, 0, 0)
            .unwrap();
        (0..n).map(|i| start + Duration::hours(6 * i as i64)).collect()
    }

    fn ids(v: &[&str]) -> Vec<String> {
        v.iter().map(|s| s.to_string()).collect()
    }

    fn onset_positions(flags: &[bool]) -> Vec<usize> {
        flags.iter().enumerate().filter(|(_, f)| **f).map(|(i, _)| i).collect()
    }

    #[test]
    fn test_single_threshold_onsets() {
        let q = [1.0, 6.0, 6.0, 2.0, 7.0, 7.0];
        assert_eq!(onset_positions(&detect_station_events(&q, 5.0, None)), vec![1, 4]);
    }

    #[test]
    fn test_first_timestep_is_never_an_onset() {
        let q = [9.0, 9.0, 1.0, 9.0];
        assert_eq!(onset_positions(&detect_station_events(&q, 5.0, None)), vec![3]);
    }

    #[test]
    fn test_hysteresis_requires_close_between_onsets() {
        // dips to 4 stay above the lower threshold 3: one event
        let q = [3.0, 6.0, 4.0, 6.0, 4.0, 6.0];
        assert_eq!(onset_positions(&detect_station_events(&q, 5.0, Some(3.0))), vec![1]);

        // dropping to 2 closes the first event
        let q = [3.0, 6.0, 6.0, 6.0, 2.0, 6.0];
        assert_eq!(onset_positions(&detect_station_events(&q, 5.0, Some(3.0))), vec![1, 5]);
    }

    #[test]
    fn test_missing_discharge_is_below_threshold() {
        let q = [1.0, f64::NAN, 9.0, f64::NAN, 9.0];
        assert_eq!(onset_positions(&detect_station_events(&q, 5.0, None)), vec![2, 4]);
    }

    #[test]
    fn test_station_without_exceedance_is_all_false() {
        let q = [1.0, 2.0, 1.0];
        assert!(detect_station_events(&q, 5.0, None).iter().all(|f| !f));
    }

    #[test]
    fn test_detect_events_strict_alignment_names_stations() {
        let discharge = StationTable::new(times(3), ids(&["A", "B"]), vec![vec![1.0; 3], vec![1.0; 3]]).unwrap();
        let upper = StationThreshold::new(ids(&["A", "C"]), vec![5.0, 5.0]).unwrap();
        let err = detect_events(&discharge, &upper, None, Alignment::Strict).unwrap_err();
        match err {
            SkillError::StationMismatch { missing, extra, .. } => {
                assert_eq!(missing, ids(&["B"]));
                assert_eq!(extra, ids(&["C"]));
            }
            other => panic!("unexpected error: {}", other),
        }
    }

    #[test]
    fn test_detect_events_inner_alignment_keeps_intersection() {
        let discharge = StationTable::new(
            times(4),
            ids(&["A", "B"]),
            vec![vec![1.0, 6.0, 6.0, 1.0], vec![1.0; 4]],
        )
        .unwrap();
        let upper = StationThreshold::new(ids(&["A", "C"]), vec![5.0, 5.0]).unwrap();
        let events = detect_events(&discharge, &upper, None, Alignment::Inner).unwrap();
        assert_eq!(events.stations(), &ids(&["A"]));
        assert_eq!(events.column("A").unwrap(), &[false, true, false, false]);
    }

    #[test]
    fn test_detect_events_rejects_lower_above_upper() {
        let discharge = StationTable::new(times(3), ids(&["A"]), vec![vec![1.0; 3]]).unwrap();
        let upper = StationThreshold::new(ids(&["A"]), vec![5.0]).unwrap();
        let lower = upper.scaled(1.2);
        assert!(detect_events(&discharge, &upper, Some(&lower), Alignment::Strict).is_err());
    }

    #[test]
    fn test_detect_events_is_idempotent() {
        let discharge = StationTable::new(
            times(6),
            ids(&["A"]),
            vec![vec![3.0, 6.0, 6.0, 6.0, 2.0, 6.0]],
        )
        .unwrap();
        let upper = StationThreshold::new(ids(&["A"]), vec![5.0]).unwrap();
        let lower = StationThreshold::new(ids(&["A"]), vec![3.0]).unwrap();
        let first = detect_events(&discharge, &upper, Some(&lower), Alignment::Strict).unwrap();
        let second = detect_events(&discharge, &upper, Some(&lower), Alignment::Strict).unwrap();
        assert_eq!(first, second);
        assert_eq!(first.column("A").unwrap(), &[false, true, false, false, false, true]);
    }
}
