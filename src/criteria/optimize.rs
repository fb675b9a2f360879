/// Selection of notification criteria from a skill table.
///
/// Each optimisation step reduces one dimension (probability, persistence,
/// …): within every group of the remaining coordinates, the coordinates
/// whose metric lies within `tolerance` of the group maximum are
/// candidates; with `min_spread` the candidate with the most balanced
/// recall and precision wins, otherwise the smallest coordinate. Steps are
/// chained in the order given and the selected coordinates accumulate in a
/// `CriteriaSelection`.

use log::{debug, warn};
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use std::collections::BTreeMap;

use crate::error::{Result, SkillError};
use crate::model::{Coord, Dim};
use crate::scoring::skill::{Metric, Skill, finite};
use crate::table::{Coords, LabeledTable, Row};

/// One reduction of the chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OptimizationStep {
    pub dim: Dim,
    #[serde(default = "default_min_spread")]
    pub min_spread: bool,
}

fn default_min_spread() -> bool {
    true
}

impl OptimizationStep {
    pub fn new(dim: Dim, min_spread: bool) -> Self {
        Self { dim, min_spread }
    }
}

/// Target of the optimisation.
#[derive(Debug, Clone, PartialEq)]
pub struct Objective {
    pub steps: Vec<OptimizationStep>,
    pub metric: Metric,
    pub tolerance: f64,
}

impl Objective {
    pub fn validate(&self) -> Result<()> {
        if self.steps.is_empty() {
            return Err(SkillError::config("optimization.steps", "at least one step is required"));
        }
        for (i, step) in self.steps.iter().enumerate() {
            if self.steps[..i].iter().any(|s| s.dim == step.dim) {
                return Err(SkillError::config(
                    "optimization.steps",
                    format!("dimension '{}' appears twice", step.dim),
                ));
            }
        }
        validate_tolerance(self.tolerance)
    }
}

fn validate_tolerance(tolerance: f64) -> Result<()> {
    if !(tolerance >= 0.0) {
        return Err(SkillError::config("tolerance", format!("{} must not be negative", tolerance)));
    }
    Ok(())
}

/// Criteria chosen for one group, with the skill they achieve.
#[derive(Debug, Clone, PartialEq)]
pub struct CriteriaSelection {
    pub criteria: BTreeMap<Dim, Coord>,
    pub skill: Skill,
}

impl Serialize for CriteriaSelection {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let metrics = self.skill.metrics();
        let mut map = serializer.serialize_map(Some(self.criteria.len() + metrics.len()))?;
        for (dim, coord) in &self.criteria {
            map.serialize_entry(dim.as_str(), coord)?;
        }
        for (name, value) in metrics {
            map.serialize_entry(&name, &finite(value))?;
        }
        map.end()
    }
}

fn describe(coords: &Coords) -> String {
    coords
        .iter()
        .map(|(d, c)| format!("{}={}", d, c))
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reduces `dim` in a table of selections carried through earlier steps.
pub fn reduce(
    table: &LabeledTable<CriteriaSelection>,
    dim: Dim,
    metric: &Metric,
    tolerance: f64,
    min_spread: bool,
) -> Result<LabeledTable<CriteriaSelection>> {
    validate_tolerance(tolerance)?;
    if table.is_empty() || table.rows().iter().any(|r| !r.coords.contains_key(&dim)) {
        return Err(SkillError::MissingDimension(dim.to_string()));
    }

    let mut out = LabeledTable::new();
    for (group, mut rows) in table.group_without(&[dim]) {
        rows.sort_by(|a, b| a.coords[&dim].cmp(&b.coords[&dim]));

        let scores = rows
            .iter()
            .map(|r| {
                r.value.skill.get(metric).ok_or_else(|| {
                    SkillError::config("metric", format!("'{}' is not in the skill table", metric))
                })
            })
            .collect::<Result<Vec<f64>>>()?;
        let best = scores
            .iter()
            .copied()
            .filter(|v| !v.is_nan())
            .fold(f64::NEG_INFINITY, f64::max);
        if best == f64::NEG_INFINITY {
            return Err(SkillError::NoCandidates {
                dim: dim.to_string(),
                group: describe(&group),
            });
        }

        // the maximum itself is always a candidate, also at zero tolerance
        let candidates: Vec<&Row<CriteriaSelection>> = rows
            .iter()
            .zip(&scores)
            .filter(|(_, v)| !v.is_nan() && (best - **v < tolerance || **v == best))
            .map(|(r, _)| *r)
            .collect();

        let chosen = if min_spread {
            candidates
                .iter()
                .filter(|r| !r.value.skill.spread().is_nan())
                .min_by(|a, b| a.value.skill.spread().total_cmp(&b.value.skill.spread()))
                .or(candidates.first())
        } else {
            candidates.first()
        };
        let Some(chosen) = chosen else {
            return Err(SkillError::NoCandidates {
                dim: dim.to_string(),
                group: describe(&group),
            });
        };

        let mut criteria = chosen.value.criteria.clone();
        criteria.insert(dim, chosen.coords[&dim].clone());
        debug!(
            "[{}] {} = {} ({} = {:.3}, {} candidates)",
            describe(&group),
            dim,
            chosen.coords[&dim],
            metric,
            chosen.value.skill.get(metric).unwrap_or(f64::NAN),
            candidates.len()
        );
        out.push(
            group,
            CriteriaSelection {
                criteria,
                skill: chosen.value.skill.clone(),
            },
        );
    }
    Ok(out)
}

fn lift(skill: &LabeledTable<Skill>) -> LabeledTable<CriteriaSelection> {
    skill.map(|s| CriteriaSelection {
        criteria: BTreeMap::new(),
        skill: s.clone(),
    })
}

/// Selects the best coordinate along `dim` for every group of the other
/// coordinates.
pub fn find_best_criterion(
    skill: &LabeledTable<Skill>,
    dim: Dim,
    metric: &Metric,
    tolerance: f64,
    min_spread: bool,
) -> Result<LabeledTable<CriteriaSelection>> {
    reduce(&lift(skill), dim, metric, tolerance, min_spread)
}

/// Chains `find_best_criterion` over the objective's steps.
pub fn find_best_criteria(skill: &LabeledTable<Skill>, objective: &Objective) -> Result<LabeledTable<CriteriaSelection>> {
    objective.validate()?;
    let mut table = lift(skill);
    for step in &objective.steps {
        table = reduce(&table, step.dim, &objective.metric, objective.tolerance, step.min_spread)?;
    }
    Ok(table)
}

/// Rows on which the objective's metric is defined.
///
/// A group whose metric is `NaN` for every criterion (no observed and no
/// predicted events) cannot be optimised; it is dropped with a warning so
/// the remaining groups still get a selection.
pub fn defined_rows(skill: &LabeledTable<Skill>, objective: &Objective) -> LabeledTable<Skill> {
    let kept: LabeledTable<Skill> = skill
        .rows()
        .iter()
        .filter(|r| r.value.get(&objective.metric).map_or(true, |v| !v.is_nan()))
        .cloned()
        .collect();

    let step_dims: Vec<Dim> = objective.steps.iter().map(|s| s.dim).collect();
    let before = skill.group_without(&step_dims);
    let after = kept.group_without(&step_dims);
    for group in before.keys().filter(|g| !after.contains_key(*g)) {
        warn!(
            "{} is undefined for every criterion in [{}]; group skipped",
            objective.metric,
            describe(group)
        );
    }
    kept
}
