/// Recall, precision and F-scores from hit counts.

use serde::ser::SerializeMap;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use std::fmt;
use std::str::FromStr;

use crate::error::{Result, SkillError};
use crate::scoring::hits::Hits;
use crate::table::LabeledTable;

/// A skill metric the optimiser can maximise.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Metric {
    Recall,
    Precision,
    FBeta(f64),
}

impl Metric {
    /// Column name: `recall`, `precision`, `f1`, `f0.5`, …
    pub fn name(&self) -> String {
        match self {
            Metric::Recall => "recall".to_string(),
            Metric::Precision => "precision".to_string(),
            Metric::FBeta(beta) => fscore_name(*beta),
        }
    }
}

fn fscore_name(beta: f64) -> String {
    if beta.fract() == 0.0 {
        format!("f{}", beta as i64)
    } else {
        format!("f{:.1}", beta)
    }
}

impl fmt::Display for Metric {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.name())
    }
}

impl FromStr for Metric {
    type Err = SkillError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "recall" => Ok(Metric::Recall),
            "precision" => Ok(Metric::Precision),
            other => {
                let beta = other
                    .strip_prefix('f')
                    .and_then(|b| b.parse::<f64>().ok())
                    .filter(|b| *b > 0.0)
                    .ok_or_else(|| SkillError::config("metric", format!("unknown metric '{}'", s)))?;
                Ok(Metric::FBeta(beta))
            }
        }
    }
}

impl Serialize for Metric {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(&self.name())
    }
}

impl<'de> Deserialize<'de> for Metric {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FScore {
    pub beta: f64,
    pub value: f64,
}

/// Skill of one hits cell. `NaN` wherever a denominator is zero.
#[derive(Debug, Clone, PartialEq)]
pub struct Skill {
    pub recall: f64,
    pub precision: f64,
    pub fscores: Vec<FScore>,
}

impl Skill {
    pub fn get(&self, metric: &Metric) -> Option<f64> {
        match metric {
            Metric::Recall => Some(self.recall),
            Metric::Precision => Some(self.precision),
            Metric::FBeta(beta) => self
                .fscores
                .iter()
                .find(|f| (f.beta - beta).abs() < 1e-9)
                .map(|f| f.value),
        }
    }

    /// |recall − precision|
    pub fn spread(&self) -> f64 {
        (self.recall - self.precision).abs()
    }

    /// Field-wise mean ignoring `NaN`; `None` for an empty input. All
    /// inputs must carry the same betas.
    pub fn nan_mean<'a>(skills: impl IntoIterator<Item = &'a Skill>) -> Option<Skill> {
        let skills: Vec<&Skill> = skills.into_iter().collect();
        let first = skills.first()?;
        let mean = |values: Vec<f64>| {
            let valid: Vec<f64> = values.into_iter().filter(|v| !v.is_nan()).collect();
            if valid.is_empty() {
                f64::NAN
            } else {
                valid.iter().sum::<f64>() / valid.len() as f64
            }
        };
        Some(Skill {
            recall: mean(skills.iter().map(|s| s.recall).collect()),
            precision: mean(skills.iter().map(|s| s.precision).collect()),
            fscores: first
                .fscores
                .iter()
                .map(|f| FScore {
                    beta: f.beta,
                    value: mean(
                        skills
                            .iter()
                            .filter_map(|s| s.get(&Metric::FBeta(f.beta)))
                            .collect(),
                    ),
                })
                .collect(),
        })
    }

    /// `(name, value)` for every metric, recall and precision first.
    pub fn metrics(&self) -> Vec<(String, f64)> {
        let mut out = vec![
            ("recall".to_string(), self.recall),
            ("precision".to_string(), self.precision),
        ];
        out.extend(self.fscores.iter().map(|f| (fscore_name(f.beta), f.value)));
        out
    }
}

impl Serialize for Skill {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let metrics = self.metrics();
        let mut map = serializer.serialize_map(Some(metrics.len()))?;
        for (name, value) in metrics {
            map.serialize_entry(&name, &finite(value))?;
        }
        map.end()
    }
}

/// JSON has no NaN; undefined scores serialise as null.
pub(crate) fn finite(value: f64) -> Option<f64> {
    if value.is_finite() { Some(value) } else { None }
}

fn ratio(num: u64, den: u64) -> f64 {
    if den == 0 { f64::NAN } else { num as f64 / den as f64 }
}

/// Converts hits into recall, precision and one F-score per beta.
pub fn hits_to_skill(hits: &Hits, betas: &[f64]) -> Skill {
    let recall = ratio(hits.hits, hits.hits + hits.misses);
    let precision = ratio(hits.hits, hits.hits + hits.false_alarms);
    let tp = hits.hits as f64;
    let fscores = betas
        .iter()
        .map(|&beta| {
            let b2 = beta * beta;
            let den = (1.0 + b2) * tp + b2 * hits.misses as f64 + hits.false_alarms as f64;
            let value = if den == 0.0 { f64::NAN } else { (1.0 + b2) * tp / den };
            FScore { beta, value }
        })
        .collect();
    Skill {
        recall,
        precision,
        fscores,
    }
}

pub fn validate_betas(betas: &[f64]) -> Result<()> {
    if betas.is_empty() {
        return Err(SkillError::config("beta", "at least one value is required"));
    }
    if let Some(b) = betas.iter().find(|b| !(**b > 0.0) || !b.is_finite()) {
        return Err(SkillError::config("beta", format!("{} must be positive", b)));
    }
    // scores are keyed by name, which rounds to one decimal
    for (i, b) in betas.iter().enumerate() {
        if let Some(other) = betas[..i].iter().find(|o| fscore_name(**o) == fscore_name(*b)) {
            return Err(SkillError::config(
                "beta",
                format!("{} and {} share the score name '{}'", other, b, fscore_name(*b)),
            ));
        }
    }
    Ok(())
}

/// Skill of every row of a hits table.
pub fn skill_table(hits: &LabeledTable<Hits>, betas: &[f64]) -> Result<LabeledTable<Skill>> {
    validate_betas(betas)?;
    Ok(hits.map(|h| hits_to_skill(h, betas)))
}
