/// Exceedance probability → predicted events.
///
/// A forecast cell becomes a notification when its probability reaches the
/// threshold and the persistence criterion (a, b) holds: at least `a` of
/// the `b` most recent forecasts are positive. "Most recent" walks the
/// leadtime axis from the longest leadtime down, so the window at a
/// leadtime covers it and the next `b − 1` longer ones. The leadtime
/// selection then collapses leadtimes with a logical OR.

use serde::{Deserialize, Deserializer};

use crate::error::{Result, SkillError};
use crate::exceedance::ProbabilityGrid;
use crate::exceedance::grid::PredictedEventArray;
use crate::model::Persistence;

/// How leadtimes are collapsed after persistence.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum LeadtimeSelection {
    /// One bucket per leadtime L: any positive at leadtime ≥ L.
    #[default]
    All,
    /// A single bucket: any positive at leadtime ≥ L.
    From(u32),
    /// Buckets `[b_i, b_{i+1})`, the last one open-ended.
    Bins(Vec<u32>),
}

impl LeadtimeSelection {
    pub fn validate(&self) -> Result<()> {
        if let LeadtimeSelection::Bins(breaks) = self {
            if breaks.is_empty() {
                return Err(SkillError::config("leadtime", "bins need at least one breakpoint"));
            }
            if breaks.windows(2).any(|w| w[0] >= w[1]) {
                return Err(SkillError::config("leadtime", "bin breakpoints must be strictly increasing"));
            }
        }
        Ok(())
    }

    /// `(label, leadtime indices)` for each bucket over `leadtimes`.
    fn buckets(&self, leadtimes: &[u32]) -> Result<Vec<(u32, Vec<usize>)>> {
        self.validate()?;
        let n = leadtimes.len();
        Ok(match self {
            LeadtimeSelection::All => (0..n).map(|k| (leadtimes[k], (k..n).collect())).collect(),
            LeadtimeSelection::From(lt) => {
                let k = leadtimes
                    .iter()
                    .position(|l| l == lt)
                    .ok_or(SkillError::UnknownLeadtime(*lt))?;
                vec![(*lt, (k..n).collect())]
            }
            LeadtimeSelection::Bins(breaks) => breaks
                .iter()
                .enumerate()
                .filter_map(|(i, lo)| {
                    let hi = breaks.get(i + 1).copied().unwrap_or(u32::MAX);
                    let members: Vec<usize> = (0..n)
                        .filter(|&k| leadtimes[k] >= *lo && (leadtimes[k] < hi || i + 1 == breaks.len()))
                        .collect();
                    members.first().copied().map(|k| (leadtimes[k], members))
                })
                .collect(),
        })
    }
}

impl<'de> Deserialize<'de> for LeadtimeSelection {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum Raw {
            Keyword(String),
            Single(u32),
            Breaks(Vec<u32>),
        }
        match Raw::deserialize(deserializer)? {
            Raw::Keyword(s) if s == "all" => Ok(LeadtimeSelection::All),
            Raw::Keyword(s) => Err(serde::de::Error::custom(format!(
                "leadtime must be \"all\", an hour value or a list of breakpoints, got '{}'",
                s
            ))),
            Raw::Single(lt) => Ok(LeadtimeSelection::From(lt)),
            Raw::Breaks(b) => Ok(LeadtimeSelection::Bins(b)),
        }
    }
}

/// Positive flags of one leadtime row; `None` where the cell is missing.
fn positives(row: &[f64], probability: Option<f64>) -> Result<Vec<Option<bool>>> {
    row.iter()
        .map(|&v| {
            if v.is_nan() {
                return Ok(None);
            }
            match probability {
                Some(p) => Ok(Some(v >= p)),
                None if v == 0.0 || v == 1.0 => Ok(Some(v == 1.0)),
                None => Err(SkillError::config(
                    "probability",
                    format!("exceedance value {} is not 0/1; a probability threshold is required", v),
                )),
            }
        })
        .collect()
}

/// Applies persistence along one leadtime row (shortest leadtime first).
pub fn apply_persistence(cells: &[Option<bool>], persistence: Persistence) -> Vec<Option<bool>> {
    let n = cells.len();
    (0..n)
        .map(|k| {
            let own = cells[k]?;
            let end = (k + persistence.window()).min(n);
            let count = cells[k..end].iter().filter(|c| **c == Some(true)).count();
            Some(own && count >= persistence.positives())
        })
        .collect()
}

/// Predicted events per station, model, time and leadtime bucket.
///
/// With `probability`, a cell is positive when its exceedance reaches it;
/// without, the input must already be 0/1. A bucket is `None` only when
/// every cell feeding it was missing.
pub fn exceedance_to_events<E: ProbabilityGrid + ?Sized>(
    exceedance: &E,
    probability: Option<f64>,
    persistence: Persistence,
    leadtime: &LeadtimeSelection,
) -> Result<PredictedEventArray> {
    if let Some(p) = probability {
        if !(0.0..=1.0).contains(&p) {
            return Err(SkillError::config("probability", format!("{} is outside [0, 1]", p)));
        }
    }
    let grid = exceedance.probability_grid()?;
    let buckets = leadtime.buckets(grid.leadtimes())?;
    let labels: Vec<u32> = buckets.iter().map(|(label, _)| *label).collect();

    grid.map_rows(labels, |row| {
        let events = apply_persistence(&positives(row, probability)?, persistence);
        Ok(buckets
            .iter()
            .map(|(_, members)| {
                let known: Vec<bool> = members.iter().filter_map(|&k| events[k]).collect();
                if known.is_empty() {
                    None
                } else {
                    Some(u8::from(known.iter().any(|e| *e)))
                }
            })
            .collect())
    })
}
