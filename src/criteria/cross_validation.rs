/// Cross-validated criteria selection over stations.
///
/// Stations are split into folds, either plain shuffled K-fold or a
/// stratified shuffle split that keeps the share of stations with 0, 1, 2…
/// observed events equal between training and validation. Skill is
/// computed on each fold's training stations, averaged over folds, and the
/// criteria are selected on the average. The selection is then scored on
/// each fold's validation stations.

use log::{debug, info};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::criteria::optimize::{CriteriaSelection, Objective, defined_rows, find_best_criteria};
use crate::error::{Result, SkillError};
use crate::model::{Coord, Dim};
use crate::scoring::hits::Hits;
use crate::scoring::skill::{Skill, skill_table};
use crate::table::{Coords, LabeledTable};

/// Fold settings.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CrossValidation {
    pub kfold: usize,
    /// Share of stations used for training (stratified split only).
    #[serde(default = "default_train_size")]
    pub train_size: f64,
    #[serde(default)]
    pub stratify: bool,
    #[serde(default)]
    pub seed: u64,
}

pub(crate) fn default_train_size() -> f64 {
    0.8
}

impl CrossValidation {
    pub fn validate(&self) -> Result<()> {
        if self.kfold < 2 {
            return Err(SkillError::config("kfold", format!("{} must be at least 2", self.kfold)));
        }
        if !(self.train_size > 0.0 && self.train_size < 1.0) {
            return Err(SkillError::config(
                "train_size",
                format!("{} must lie strictly between 0 and 1", self.train_size),
            ));
        }
        Ok(())
    }
}

/// Station split of one fold.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Fold {
    pub index: usize,
    pub train: Vec<String>,
    pub validation: Vec<String>,
}

/// Splits stations into `cv.kfold` folds. Deterministic for a given seed.
pub fn split_stations(station_events: &BTreeMap<String, u64>, cv: &CrossValidation) -> Result<Vec<Fold>> {
    cv.validate()?;
    let n = station_events.len();
    let min_stations = if cv.stratify { 2 } else { cv.kfold };
    if n < min_stations.max(2) {
        return Err(SkillError::config(
            "kfold",
            format!("{} stations cannot be split into {} folds", n, cv.kfold),
        ));
    }
    let mut rng = StdRng::seed_from_u64(cv.seed);
    let folds = if cv.stratify {
        stratified_splits(station_events, cv, &mut rng)
    } else {
        kfold_splits(station_events, cv.kfold, &mut rng)
    };
    for fold in &folds {
        debug!(
            "fold {}: {} training / {} validation stations",
            fold.index,
            fold.train.len(),
            fold.validation.len()
        );
    }
    Ok(folds)
}

fn kfold_splits(station_events: &BTreeMap<String, u64>, k: usize, rng: &mut StdRng) -> Vec<Fold> {
    let mut ids: Vec<String> = station_events.keys().cloned().collect();
    ids.shuffle(rng);
    let n = ids.len();
    let mut start = 0;
    (0..k)
        .map(|i| {
            let size = n / k + usize::from(i < n % k);
            let validation: Vec<String> = ids[start..start + size].to_vec();
            let train: Vec<String> = ids[..start].iter().chain(&ids[start + size..]).cloned().collect();
            start += size;
            Fold {
                index: i,
                train: sorted(train),
                validation: sorted(validation),
            }
        })
        .collect()
}

fn stratified_splits(station_events: &BTreeMap<String, u64>, cv: &CrossValidation, rng: &mut StdRng) -> Vec<Fold> {
    let mut classes: BTreeMap<u64, Vec<String>> = BTreeMap::new();
    for (station, events) in station_events {
        classes.entry(*events).or_default().push(station.clone());
    }
    let n = station_events.len();
    let n_train = ((cv.train_size * n as f64).round() as usize).clamp(1, n - 1);

    // largest remainder allocation of training slots per class
    let exact: Vec<(u64, f64)> = classes
        .iter()
        .map(|(c, ids)| (*c, n_train as f64 * ids.len() as f64 / n as f64))
        .collect();
    let mut alloc: BTreeMap<u64, usize> = exact.iter().map(|(c, e)| (*c, e.floor() as usize)).collect();
    let mut remaining = n_train - alloc.values().sum::<usize>();
    let mut order: Vec<&(u64, f64)> = exact.iter().collect();
    order.sort_by(|a, b| (b.1 - b.1.floor()).total_cmp(&(a.1 - a.1.floor())).then(a.0.cmp(&b.0)));
    for (class, _) in order {
        if remaining == 0 {
            break;
        }
        let cap = classes[class].len();
        if let Some(slot) = alloc.get_mut(class) {
            if *slot < cap {
                *slot += 1;
                remaining -= 1;
            }
        }
    }

    (0..cv.kfold)
        .map(|index| {
            let mut train = Vec::with_capacity(n_train);
            let mut validation = Vec::with_capacity(n - n_train);
            for (class, ids) in &classes {
                let mut ids = ids.clone();
                ids.shuffle(rng);
                let take = alloc.get(class).copied().unwrap_or(0);
                train.extend_from_slice(&ids[..take]);
                validation.extend_from_slice(&ids[take..]);
            }
            Fold {
                index,
                train: sorted(train),
                validation: sorted(validation),
            }
        })
        .collect()
}

fn sorted(mut ids: Vec<String>) -> Vec<String> {
    ids.sort();
    ids
}

/// Everything produced by a cross-validated selection.
#[derive(Debug, Clone)]
pub struct CvOutcome {
    pub folds: Vec<Fold>,
    /// Training skill per fold (`fold` dimension).
    pub fold_skill: LabeledTable<Skill>,
    /// Fold-averaged training skill.
    pub mean_skill: LabeledTable<Skill>,
    /// Criteria selected on the averaged skill.
    pub best: LabeledTable<CriteriaSelection>,
    /// Selected criteria scored on each fold's validation stations.
    pub validation: LabeledTable<CriteriaSelection>,
}

fn station_subset(hits: &LabeledTable<Hits>, stations: &[String]) -> Result<LabeledTable<Hits>> {
    let keep: BTreeSet<&str> = stations.iter().map(String::as_str).collect();
    let subset = hits.filter(|coords| {
        coords
            .get(&Dim::Station)
            .and_then(Coord::as_label)
            .is_some_and(|s| keep.contains(s))
    });
    if subset.is_empty() {
        return Ok(subset);
    }
    subset.sum_over(&[Dim::Station])
}

/// Cross-validated `find_best_criteria`. `hits` must have a station
/// dimension; stations absent from `station_events` never enter a fold.
pub fn find_best_criteria_cv(
    hits: &LabeledTable<Hits>,
    station_events: &BTreeMap<String, u64>,
    objective: &Objective,
    betas: &[f64],
    cv: &CrossValidation,
) -> Result<CvOutcome> {
    objective.validate()?;
    if !hits.dims().contains(&Dim::Station) {
        return Err(SkillError::MissingDimension(Dim::Station.to_string()));
    }
    let folds = split_stations(station_events, cv)?;

    let mut per_fold = Vec::with_capacity(folds.len());
    for fold in &folds {
        let train = station_subset(hits, &fold.train)?;
        per_fold.push((Coord::Int(fold.index as i64), skill_table(&train, betas)?));
    }
    let fold_skill = LabeledTable::stack(Dim::Fold, per_fold);

    let mut mean_skill = LabeledTable::new();
    for (coords, rows) in fold_skill.group_without(&[Dim::Fold]) {
        if let Some(mean) = Skill::nan_mean(rows.iter().map(|r| &r.value)) {
            mean_skill.push(coords, mean);
        }
    }

    let best = find_best_criteria(&defined_rows(&mean_skill, objective), objective)?;
    info!(
        "Cross-validated selection over {} folds: {} groups",
        folds.len(),
        best.len()
    );

    let mut validation = LabeledTable::new();
    for fold in &folds {
        let val_skill = skill_table(&station_subset(hits, &fold.validation)?, betas)?;
        for row in best.rows() {
            let mut key: Coords = row.coords.clone();
            key.extend(row.value.criteria.iter().map(|(d, c)| (*d, c.clone())));
            let Some(skill) = val_skill.select(&key) else {
                continue;
            };
            let mut coords = row.coords.clone();
            coords.insert(Dim::Fold, Coord::Int(fold.index as i64));
            validation.push(
                coords,
                CriteriaSelection {
                    criteria: row.value.criteria.clone(),
                    skill: skill.clone(),
                },
            );
        }
    }
    validation.sort();

    Ok(CvOutcome {
        folds,
        fold_skill,
        mean_skill,
        best,
        validation,
    })
}
